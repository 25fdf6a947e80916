use ratiolens_core::{PeerAnalysis, RatioSet};
use serde::Serialize;

use crate::cli::PeerArgs;
use crate::error::CliError;

use super::{peer_request, CommandResult, Context};

#[derive(Debug, Serialize)]
struct PeerResponseData {
    primary: RatioSet,
    analysis: PeerAnalysis,
}

pub async fn run(args: &PeerArgs, context: &Context) -> Result<CommandResult, CliError> {
    let request = peer_request(&args.selection);
    let (primary, analysis) = context.engine.peers(&args.symbol, &request).await?;

    let source_chain = primary.providers_attempted.clone();
    let mut errors = primary.errors.clone();
    errors.extend(analysis.errors.iter().cloned());

    let mut result = CommandResult::ok(
        serde_json::to_value(PeerResponseData { primary, analysis })?,
        source_chain,
    )
    .with_errors(errors);
    if result.data["analysis"]["comparisons"]
        .as_array()
        .is_some_and(Vec::is_empty)
    {
        result = result.with_warning("no metric could be compared with peers");
    }
    Ok(result)
}
