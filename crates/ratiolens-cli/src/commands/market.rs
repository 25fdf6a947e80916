use ratiolens_core::EngineConfig;

use crate::error::CliError;

use super::CommandResult;

pub fn run(config: &EngineConfig) -> Result<CommandResult, CliError> {
    let status = config.calendar.status_now();
    Ok(CommandResult::ok(serde_json::to_value(status)?, Vec::new()))
}
