use std::time::Instant;

use ratiolens_core::BatchQuotes;
use serde::Serialize;
use uuid::Uuid;

use crate::cli::QuotesArgs;
use crate::error::CliError;

use super::{elapsed_ms, CommandResult, Context};

#[derive(Debug, Serialize)]
struct BatchResponseData {
    #[serde(flatten)]
    batch: BatchQuotes,
    /// Percentage of fetched symbols that returned a quote.
    success_rate: Option<f64>,
}

pub async fn run(args: &QuotesArgs, context: &Context) -> Result<CommandResult, CliError> {
    let started = Instant::now();
    let batch = context.engine.quote_batch(args.symbols.as_slice()).await?;
    let latency_ms = elapsed_ms(started);

    let mut warnings = Vec::new();
    if let Some(store) = &context.store {
        let request_id = Uuid::new_v4().to_string();
        for entry in &batch.quotes {
            if let Err(error) = store.save_quote(&request_id, &entry.quote, entry.provider, latency_ms) {
                warnings.push(format!("warehouse write (quote {}) failed: {error}", entry.symbol));
            }
        }
    }
    if !batch.skipped.is_empty() {
        warnings.push(format!(
            "batch limited to {} symbols; skipped {}",
            context.engine.config().max_batch,
            batch.skipped.join(",")
        ));
    }

    let source_chain = context.engine.provider_order().to_vec();
    let errors = batch.failed.clone();
    let data = BatchResponseData {
        success_rate: batch.success_rate(),
        batch,
    };
    let mut result = CommandResult::ok(serde_json::to_value(data)?, source_chain)
        .with_errors(errors)
        .with_latency(latency_ms);
    for warning in warnings {
        result = result.with_warning(warning);
    }
    Ok(result)
}
