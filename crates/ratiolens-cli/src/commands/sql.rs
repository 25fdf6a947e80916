use ratiolens_warehouse::{QueryGuardrails, Warehouse};
use serde_json::Value;

use crate::cli::SqlArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &SqlArgs) -> Result<CommandResult, CliError> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(CliError::Command(String::from("query must not be empty")));
    }

    let warehouse = Warehouse::open_default()?;
    let guardrails = QueryGuardrails {
        max_rows: args.max_rows,
        query_timeout_ms: args.query_timeout_ms,
    };
    let result = warehouse.execute_query(query, guardrails)?;

    let truncated = result.truncated;
    let row_count = result.row_count;
    let mut command_result = CommandResult::ok(serde_json::to_value(&result)?, Vec::new());
    if truncated {
        command_result = command_result.with_warning(format!(
            "result truncated at {row_count} rows (use --max-rows to increase limit)"
        ));
    }
    Ok(command_result)
}

/// Flattens a cell for one-line display.
pub fn format_sql_value(value: &Value) -> String {
    match value {
        Value::Null => String::from("null"),
        Value::String(text) => text.clone(),
        _ => value.to_string(),
    }
}
