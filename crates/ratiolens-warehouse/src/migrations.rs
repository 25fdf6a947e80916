use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_ratio_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS ratio_snapshots (
    snapshot_id TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    provider TEXT,
    fetched_unix BIGINT NOT NULL,
    payload TEXT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS ratio_values (
    snapshot_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    category TEXT NOT NULL,
    metric TEXT NOT NULL,
    value DOUBLE NOT NULL,
    source TEXT NOT NULL,
    PRIMARY KEY(snapshot_id, metric)
);

CREATE TABLE IF NOT EXISTS health_scores (
    snapshot_id TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    profitability INTEGER NOT NULL,
    liquidity INTEGER NOT NULL,
    leverage INTEGER NOT NULL,
    valuation INTEGER NOT NULL,
    efficiency INTEGER NOT NULL,
    total INTEGER NOT NULL,
    grade TEXT NOT NULL,
    scored_unix BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS ingest_log (
    request_id TEXT NOT NULL,
    symbol TEXT,
    source TEXT NOT NULL,
    dataset TEXT NOT NULL,
    status TEXT NOT NULL,
    latency_ms BIGINT,
    timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0002_market_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS quotes (
    symbol TEXT NOT NULL,
    price DOUBLE NOT NULL,
    change DOUBLE,
    change_percent DOUBLE,
    volume BIGINT,
    market_cap DOUBLE,
    source TEXT NOT NULL,
    as_of TEXT NOT NULL,
    as_of_unix BIGINT NOT NULL,
    PRIMARY KEY(symbol, as_of_unix)
);

CREATE TABLE IF NOT EXISTS bars_1d (
    symbol TEXT NOT NULL,
    ts TIMESTAMP NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT,
    source TEXT,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(symbol, ts)
);
"#,
    },
    Migration {
        version: "0003_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_ratio_snapshots_symbol_fetched ON ratio_snapshots(symbol, fetched_unix);
CREATE INDEX IF NOT EXISTS idx_ratio_values_symbol_metric ON ratio_values(symbol, metric);
CREATE INDEX IF NOT EXISTS idx_quotes_symbol_as_of ON quotes(symbol, as_of_unix);
CREATE INDEX IF NOT EXISTS idx_bars_1d_symbol_ts ON bars_1d(symbol, ts);
CREATE INDEX IF NOT EXISTS idx_ingest_log_source_dataset_ts ON ingest_log(source, dataset, timestamp);
"#,
    },
];

/// Applies every migration not yet recorded in `schema_migrations`.
pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;
        if applied > 0 {
            continue;
        }

        connection.execute_batch(migration.sql)?;
        connection.execute(
            "INSERT INTO schema_migrations (version) VALUES (?)",
            [migration.version],
        )?;
    }

    Ok(())
}

pub fn latest_version() -> &'static str {
    MIGRATIONS.last().map_or("", |migration| migration.version)
}
