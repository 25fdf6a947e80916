use ratiolens_core::{ErrorDetail, ProviderId, UtcDateTime};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::cli::OutputFormat;
use crate::commands::{format_sql_value, CommandResult};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct Meta {
    pub request_id: String,
    pub generated_at: UtcDateTime,
    pub source_chain: Vec<ProviderId>,
    pub latency_ms: u64,
    pub warnings: Vec<String>,
}

/// Output wrapper shared by every command.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub meta: Meta,
    pub data: Value,
    pub errors: Vec<ErrorDetail>,
}

impl Envelope {
    pub fn from_result(result: CommandResult) -> Self {
        Self {
            meta: Meta {
                request_id: result
                    .request_id
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                generated_at: UtcDateTime::now(),
                source_chain: result.source_chain,
                latency_ms: result.latency_ms,
                warnings: result.warnings,
            },
            data: result.data,
            errors: result.errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub fn render(envelope: &Envelope, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => print!("{}", render_table(envelope)?),
    }
    Ok(())
}

fn render_table(envelope: &Envelope) -> Result<String, CliError> {
    let mut out = String::new();
    push_line(&mut out, format!("request_id  : {}", envelope.meta.request_id));
    push_line(&mut out, format!("generated_at: {}", envelope.meta.generated_at));
    push_line(
        &mut out,
        format!(
            "sources     : {}",
            envelope
                .meta
                .source_chain
                .iter()
                .map(|source| source.as_str())
                .collect::<Vec<_>>()
                .join(",")
        ),
    );
    push_line(&mut out, format!("latency_ms  : {}", envelope.meta.latency_ms));

    if !envelope.meta.warnings.is_empty() {
        push_line(&mut out, "warnings:");
        for warning in &envelope.meta.warnings {
            push_line(&mut out, format!("  - {warning}"));
        }
    }

    push_line(&mut out, "data:");
    if let Some(grid) = sql_grid(&envelope.data) {
        for line in grid {
            push_line(&mut out, format!("  {line}"));
        }
    } else {
        let pretty_data = serde_json::to_string_pretty(&envelope.data)?;
        for line in pretty_data.lines() {
            push_line(&mut out, format!("  {line}"));
        }
    }

    if !envelope.errors.is_empty() {
        push_line(&mut out, "errors:");
        for error in &envelope.errors {
            let provider = error
                .provider
                .map(|provider| format!(" [{provider}]"))
                .unwrap_or_default();
            push_line(
                &mut out,
                format!("  - {}{provider}: {}", error.code, error.message),
            );
        }
    }
    Ok(out)
}

/// Tab separated rows for `sql` results, header first.
fn sql_grid(data: &Value) -> Option<Vec<String>> {
    let columns = data.get("columns")?.as_array()?;
    let rows = data.get("rows")?.as_array()?;

    let header = columns
        .iter()
        .map(|column| {
            column
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_owned()
        })
        .collect::<Vec<_>>()
        .join("\t");

    let mut lines = vec![header];
    for row in rows {
        let cells = row.as_array()?;
        lines.push(
            cells
                .iter()
                .map(format_sql_value)
                .collect::<Vec<_>>()
                .join("\t"),
        );
    }
    Some(lines)
}

fn push_line(out: &mut String, line: impl AsRef<str>) {
    out.push_str(line.as_ref());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use ratiolens_core::ErrorDetail;
    use serde_json::json;

    use super::*;

    fn envelope(data: Value) -> Envelope {
        Envelope::from_result(
            CommandResult::ok(data, vec![ProviderId::Fmp, ProviderId::Yahoo])
                .with_request_id("req-1")
                .with_warning("served from warehouse")
                .with_errors(vec![ErrorDetail::new("provider.network", "timed out")
                    .with_provider(ProviderId::Fmp)]),
        )
    }

    #[test]
    fn missing_request_id_is_generated() {
        let envelope = Envelope::from_result(CommandResult::ok(Value::Null, Vec::new()));
        assert!(Uuid::parse_str(&envelope.meta.request_id).is_ok());
        assert!(!envelope.has_errors());
    }

    #[test]
    fn table_lists_sources_warnings_and_errors() {
        let rendered = render_table(&envelope(json!({ "total": 16 }))).expect("table renders");

        assert!(rendered.contains("request_id  : req-1"));
        assert!(rendered.contains("sources     : fmp,yahoo"));
        assert!(rendered.contains("  - served from warehouse"));
        assert!(rendered.contains("  - provider.network [fmp]: timed out"));
        assert!(rendered.contains("\"total\": 16"));
    }

    #[test]
    fn sql_results_render_as_rows() {
        let data = json!({
            "columns": [{ "name": "symbol", "type": "VARCHAR" }, { "name": "total", "type": "INTEGER" }],
            "rows": [["ABC", 16], ["XYZ", null]],
            "row_count": 2,
            "truncated": false
        });
        let rendered = render_table(&envelope(data)).expect("table renders");

        assert!(rendered.contains("  symbol\ttotal\n"));
        assert!(rendered.contains("  ABC\t16\n"));
        assert!(rendered.contains("  XYZ\tnull\n"));
    }
}
