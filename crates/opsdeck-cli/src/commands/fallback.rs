use opsdeck_core::FallbackProvider;

use crate::cli::FallbackArgs;
use crate::error::CliError;

use super::CommandOutput;

pub fn run(args: &FallbackArgs) -> Result<CommandOutput, CliError> {
    let envelope = FallbackProvider::default().get(args.resource);
    Ok(CommandOutput::new(serde_json::to_value(envelope)?, true))
}
