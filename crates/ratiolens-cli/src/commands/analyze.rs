use ratiolens_core::AnalysisRequest;

use crate::cli::AnalyzeArgs;
use crate::error::CliError;

use super::{peer_request, CommandResult, Context};

pub async fn run(args: &AnalyzeArgs, context: &Context) -> Result<CommandResult, CliError> {
    let mut request = AnalysisRequest::new(args.symbol.as_str());
    request = if args.no_peers {
        request.without_peers()
    } else {
        request.with_peers(peer_request(&args.selection))
    };

    let report = context.engine.analyze(&request).await?;
    let source_chain = report.ratios.providers_attempted.clone();
    let errors = report.errors.clone();
    let request_id = report.request_id.to_string();

    let mut result = CommandResult::ok(serde_json::to_value(&report)?, source_chain)
        .with_request_id(request_id)
        .with_errors(errors);
    if report.from_store {
        result = result.with_warning("ratios served from the local warehouse");
    }
    Ok(result)
}
