use std::time::Instant;

use uuid::Uuid;

use crate::cli::HistoryArgs;
use crate::error::CliError;

use super::{elapsed_ms, CommandResult, Context};

pub async fn run(args: &HistoryArgs, context: &Context) -> Result<CommandResult, CliError> {
    let started = Instant::now();
    let (_, routed) = context.engine.price_history(&args.symbol, args.days).await?;
    let route = match routed {
        Ok(route) => route,
        Err(failure) => return Ok(CommandResult::failed_route(failure)),
    };
    let latency_ms = elapsed_ms(started);

    let mut warnings = Vec::new();
    if route.data.bars.is_empty() {
        warnings.push(format!("provider returned no bars for the last {} days", args.days));
    }
    if let Some(store) = &context.store {
        let request_id = Uuid::new_v4().to_string();
        if let Err(error) =
            store.save_bars(&request_id, &route.data, route.selected_source, latency_ms)
        {
            warnings.push(format!("warehouse write (bars_1d) failed: {error}"));
        }
    }

    let mut result = CommandResult::ok(serde_json::to_value(&route.data)?, route.source_chain)
        .with_errors(route.errors)
        .with_latency(latency_ms);
    for warning in warnings {
        result = result.with_warning(warning);
    }
    Ok(result)
}
