//! Guardrailed execution of ad-hoc SQL.

use std::time::{Duration, Instant};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{Connection, ToSql};
use serde::Serialize;
use serde_json::{Number, Value};

use crate::WarehouseError;

#[derive(Debug, Clone, Copy)]
pub struct QueryGuardrails {
    pub max_rows: usize,
    pub query_timeout_ms: u64,
}

impl Default for QueryGuardrails {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl QueryGuardrails {
    fn timeout(self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.max(1))
    }

    pub(crate) fn validate(self) -> Result<(), WarehouseError> {
        if self.max_rows == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--max-rows must be greater than zero",
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--query-timeout-ms must be greater than zero",
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<SqlColumn>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    /// Set when `max_rows` cut the result short.
    pub truncated: bool,
}

pub(crate) fn normalize_sql(sql: &str) -> Result<&str, WarehouseError> {
    let normalized = sql.trim().trim_end_matches(';').trim();
    if normalized.is_empty() {
        return Err(WarehouseError::QueryRejected(String::from(
            "query must not be empty",
        )));
    }
    Ok(normalized)
}

pub(crate) fn enforce_read_only(sql: &str) -> Result<(), WarehouseError> {
    if !is_select_like(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "only SELECT/CTE queries are accepted",
        )));
    }
    if has_multiple_statements(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "multiple SQL statements are not allowed",
        )));
    }
    Ok(())
}

pub(crate) fn execute(
    connection: &Connection,
    sql: &str,
    guardrails: QueryGuardrails,
) -> Result<QueryResult, WarehouseError> {
    select(connection, sql, guardrails, Instant::now())
}

fn select(
    connection: &Connection,
    sql: &str,
    guardrails: QueryGuardrails,
    started: Instant,
) -> Result<QueryResult, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    // Column metadata is only populated once the statement has run.
    let _ = statement.query([] as [&dyn ToSql; 0])?;

    let column_count = statement.column_count();
    let columns = (0..column_count)
        .map(|index| SqlColumn {
            name: statement
                .column_name(index)
                .map_or_else(|_| format!("col{index}"), ToString::to_string),
            r#type: statement.column_type(index).to_string(),
        })
        .collect::<Vec<_>>();

    let mut cursor = statement.query([] as [&dyn ToSql; 0])?;
    let mut rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = cursor.next()? {
        ensure_within(started, guardrails.timeout())?;
        if rows.len() >= guardrails.max_rows {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(column_count);
        for index in 0..column_count {
            let value: DuckValue = row.get(index)?;
            values.push(to_json_value(value));
        }
        rows.push(values);
    }
    ensure_within(started, guardrails.timeout())?;

    Ok(QueryResult {
        columns,
        row_count: rows.len(),
        rows,
        truncated,
    })
}

fn to_json_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Bool(value),
        DuckValue::TinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::SmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::Int(value) => Value::Number(Number::from(value)),
        DuckValue::BigInt(value) => Value::Number(Number::from(value)),
        DuckValue::UTinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::USmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::UInt(value) => Value::Number(Number::from(value)),
        DuckValue::UBigInt(value) => Value::Number(Number::from(value)),
        DuckValue::Float(value) => finite_number(f64::from(value)),
        DuckValue::Double(value) => finite_number(value),
        DuckValue::Text(value) => Value::String(value),
        DuckValue::Blob(value) => Value::String(hex::encode(value)),
        other => Value::String(format!("{other:?}")),
    }
}

fn finite_number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn is_select_like(sql: &str) -> bool {
    let keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        keyword.as_str(),
        "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "DESCRIBE" | "SUMMARIZE"
    )
}

fn has_multiple_statements(sql: &str) -> bool {
    sql.split(';').filter(|part| !part.trim().is_empty()).count() > 1
}

fn ensure_within(started: Instant, timeout: Duration) -> Result<(), WarehouseError> {
    if started.elapsed() > timeout {
        return Err(WarehouseError::QueryTimeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_semicolons_are_stripped() {
        assert_eq!(normalize_sql("  SELECT 1;; ").expect("sql"), "SELECT 1");
        assert!(normalize_sql(" ; ").is_err());
    }

    #[test]
    fn read_only_rejects_writes_and_batches() {
        assert!(enforce_read_only("select * from quotes").is_ok());
        assert!(enforce_read_only("WITH x AS (SELECT 1) SELECT * FROM x").is_ok());
        assert!(enforce_read_only("DELETE FROM quotes").is_err());
        assert!(enforce_read_only("SELECT 1; DROP TABLE quotes").is_err());
    }

    #[test]
    fn non_finite_doubles_become_null() {
        assert_eq!(to_json_value(DuckValue::Double(f64::NAN)), Value::Null);
        assert_eq!(
            to_json_value(DuckValue::Blob(vec![0xde, 0xad])),
            Value::String(String::from("dead"))
        );
    }
}
