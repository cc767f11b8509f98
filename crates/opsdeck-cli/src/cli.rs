//! CLI argument definitions for opsdeck.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch one resource for a tenant |
//! | `ping` | Probe upstream health |
//! | `fallback` | Print the local fallback envelope |
//! | `config` | Print the resolved configuration |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--endpoint` | env | Upstream base URL |
//! | `--api-key` | env | Bearer token |
//! | `--mock` | `false` | Never contact the upstream |
//! | `--timeout-ms` | env / `5000` | Per-attempt timeout |
//! | `--max-retries` | env / `3` | Total attempts per call |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! opsdeck fetch inventory-signal --tenant acme --param warehouse=north
//! opsdeck fetch recommendations --tenant acme --from 2024-05-01 --to 2024-05-31 --pretty
//! opsdeck ping --endpoint https://analytics.example.test
//! opsdeck fallback seo_opportunity
//! ```

use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use opsdeck_core::ResourceKind;

/// Operations dashboard upstream client.
#[derive(Debug, Parser)]
#[command(
    name = "opsdeck",
    author,
    version,
    about = "Resilient client for the opsdeck analytics upstream",
    long_about = "Fetches recommendations, inventory signals and SEO opportunities from the \
analytics upstream. Failing, slow or missing upstreams are answered with local fallback \
data (source \"mock\") and exit code 3."
)]
pub struct Cli {
    /// Upstream base URL (overrides OPSDECK_UPSTREAM_ENDPOINT).
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Bearer token (overrides OPSDECK_UPSTREAM_API_KEY).
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Serve fallback data without contacting the upstream.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// Per-attempt timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Total attempts per call, including the first.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch one resource for a tenant.
    ///
    /// # Examples
    ///
    ///   opsdeck fetch recommendation --tenant acme
    ///   opsdeck fetch inventory-signal --tenant acme --param warehouse=north
    Fetch(FetchArgs),

    /// Probe `GET {endpoint}/health` once.
    Ping,

    /// Print the local fallback envelope for a resource. No network I/O.
    Fallback(FallbackArgs),

    /// Print the resolved configuration with the API key redacted.
    Config,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// recommendation, inventory_signal or seo_opportunity.
    #[arg(value_parser = parse_resource)]
    pub resource: ResourceKind,

    /// Tenant the request is made for.
    #[arg(long)]
    pub tenant: String,

    /// Request parameter as key=value. Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Start of the reporting window (YYYY-MM-DD or RFC3339 UTC).
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// End of the reporting window (YYYY-MM-DD or RFC3339 UTC).
    #[arg(long, requires = "from")]
    pub to: Option<String>,
}

#[derive(Debug, Args)]
pub struct FallbackArgs {
    #[arg(value_parser = parse_resource)]
    pub resource: ResourceKind,
}

fn parse_resource(raw: &str) -> Result<ResourceKind, String> {
    ResourceKind::from_str(raw).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn argument_definitions_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_fetch_with_params_and_window() {
        let cli = Cli::try_parse_from([
            "opsdeck",
            "fetch",
            "inventory-signal",
            "--tenant",
            "acme",
            "--param",
            "warehouse=north",
            "--param",
            "limit=5",
            "--from",
            "2024-05-01",
            "--to",
            "2024-05-31",
            "--pretty",
        ])
        .expect("valid arguments");

        assert!(cli.pretty);
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.resource, ResourceKind::InventorySignal);
        assert_eq!(args.params, vec!["warehouse=north", "limit=5"]);
    }

    #[test]
    fn window_bounds_must_come_together() {
        let result = Cli::try_parse_from([
            "opsdeck",
            "fetch",
            "recommendation",
            "--tenant",
            "acme",
            "--from",
            "2024-05-01",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_resource_is_rejected() {
        let result = Cli::try_parse_from(["opsdeck", "fallback", "weather"]);
        assert!(result.is_err());
    }
}
