use crate::cli::OverviewArgs;
use crate::error::CliError;

use super::{CommandResult, Context};

pub async fn run(args: &OverviewArgs, context: &Context) -> Result<CommandResult, CliError> {
    let overview = context.engine.market_overview(&args.sector).await?;
    let source_chain = context.engine.provider_order().to_vec();
    let errors = overview.errors.clone();
    let quoted = overview.quoted;
    let sector = overview.sector.clone();

    let mut result =
        CommandResult::ok(serde_json::to_value(overview)?, source_chain).with_errors(errors);
    if quoted == 0 {
        result = result.with_warning(format!("no listing in sector '{sector}' could be quoted"));
    }
    Ok(result)
}
