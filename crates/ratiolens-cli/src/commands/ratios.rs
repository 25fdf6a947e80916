use ratiolens_core::SnapshotStore;
use uuid::Uuid;

use crate::cli::SymbolArgs;
use crate::error::CliError;

use super::{CommandResult, Context};

pub async fn run(args: &SymbolArgs, context: &Context) -> Result<CommandResult, CliError> {
    let ratios = context.engine.ratios(&args.symbol).await?;
    let request_id = Uuid::new_v4().to_string();

    let mut result = CommandResult::ok(
        serde_json::to_value(&ratios)?,
        ratios.providers_attempted.clone(),
    )
    .with_request_id(request_id.as_str())
    .with_errors(ratios.errors.clone());

    if let Some(store) = &context.store {
        if !ratios.is_empty() {
            if let Err(error) = store.save_ratios(&request_id, &ratios) {
                result = result.with_warning(format!("warehouse write (ratios) failed: {error}"));
            }
        }
    }
    Ok(result)
}
