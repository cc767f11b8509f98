mod config;
mod fallback;
mod fetch;
mod ping;

use opsdeck_core::{ClientConfig, ClientOverrides};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Rendered command result.
pub struct CommandOutput {
    pub data: Value,
    /// Output came from fallback data or reports an unhealthy upstream.
    pub degraded: bool,
}

impl CommandOutput {
    pub fn new(data: Value, degraded: bool) -> Self {
        Self { data, degraded }
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let resolved = ClientConfig::from_env(&overrides(cli))?;

    match &cli.command {
        Command::Fetch(args) => fetch::run(args, resolved).await,
        Command::Ping => ping::run(resolved).await,
        Command::Fallback(args) => fallback::run(args),
        Command::Config => config::run(&resolved),
    }
}

/// Command-line flags take precedence over the environment.
fn overrides(cli: &Cli) -> ClientOverrides {
    ClientOverrides {
        endpoint: cli.endpoint.clone(),
        api_key: cli.api_key.clone(),
        max_retries: cli.max_retries,
        timeout_ms: cli.timeout_ms,
        use_mocks: cli.mock.then_some(true),
        ..ClientOverrides::default()
    }
}
