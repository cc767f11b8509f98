use opsdeck_core::{ClientConfig, UpstreamClient};

use crate::error::CliError;

use super::CommandOutput;

pub async fn run(config: ClientConfig) -> Result<CommandOutput, CliError> {
    let probe = UpstreamClient::new(config).ping().await;
    let degraded = !probe.healthy;
    Ok(CommandOutput::new(serde_json::to_value(probe)?, degraded))
}
