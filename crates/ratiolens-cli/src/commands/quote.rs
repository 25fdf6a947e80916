use std::time::Instant;

use ratiolens_core::{Quote, QuoteRecord, UtcDateTime};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::QuoteArgs;
use crate::error::CliError;

use super::{elapsed_ms, CommandResult, Context};

#[derive(Debug, Serialize)]
struct QuoteResponseData {
    quote: Quote,
    /// Position of the price inside the 52 week range, in percent.
    range_position: Option<f64>,
}

#[derive(Debug, Serialize)]
struct QuoteHistoryData {
    symbol: String,
    days: u32,
    quotes: Vec<QuoteRecord>,
}

pub async fn run(args: &QuoteArgs, context: &Context) -> Result<CommandResult, CliError> {
    if let Some(days) = args.history_days {
        return stored_history(args, days, context);
    }

    let started = Instant::now();
    let (_, routed) = context.engine.quote(&args.symbol).await?;
    let route = match routed {
        Ok(route) => route,
        Err(failure) => return Ok(CommandResult::failed_route(failure)),
    };
    let latency_ms = elapsed_ms(started);

    let warehouse_warning = context.store.as_ref().and_then(|store| {
        let request_id = Uuid::new_v4().to_string();
        store
            .save_quote(&request_id, &route.data, route.selected_source, latency_ms)
            .err()
            .map(|error| format!("warehouse write (quote) failed: {error}"))
    });

    let data = QuoteResponseData {
        range_position: route.data.range_position(),
        quote: route.data,
    };
    let mut result = CommandResult::ok(serde_json::to_value(data)?, route.source_chain)
        .with_errors(route.errors)
        .with_latency(latency_ms);
    if let Some(warning) = warehouse_warning {
        result = result.with_warning(warning);
    }
    Ok(result)
}

fn stored_history(args: &QuoteArgs, days: u32, context: &Context) -> Result<CommandResult, CliError> {
    if days == 0 {
        return Err(CliError::Command(String::from(
            "--history-days must be greater than zero",
        )));
    }
    let symbol = context.engine.normalizer().parse(&args.symbol)?;
    let store = context.require_store()?;
    let quotes = store.quote_history(&symbol, days, UtcDateTime::now())?;

    let mut result = CommandResult::ok(
        serde_json::to_value(QuoteHistoryData {
            symbol: symbol.base().to_owned(),
            days,
            quotes,
        })?,
        Vec::new(),
    );
    if result.data["quotes"].as_array().is_some_and(Vec::is_empty) {
        result = result.with_warning(format!(
            "no stored quotes for {} in the last {days} days (fetch with --persist first)",
            symbol.base()
        ));
    }
    Ok(result)
}
