//! Analytical views for the `sql` surface.

use ::duckdb::Connection;

/// Creates or refreshes:
/// - `v_latest_ratios`: values of the most recent snapshot per symbol
/// - `v_health_history`: score rows joined with the snapshot provider
/// - `vw_returns_daily`: daily close-to-close returns from `bars_1d`
/// - `vw_source_latency`: average ingest latency by source and dataset
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW v_latest_ratios AS
WITH ranked AS (
    SELECT
        snapshot_id,
        symbol,
        fetched_unix,
        ROW_NUMBER() OVER (PARTITION BY symbol ORDER BY fetched_unix DESC) AS rn
    FROM ratio_snapshots
)
SELECT
    v.symbol,
    v.category,
    v.metric,
    v.value,
    v.source,
    to_timestamp(r.fetched_unix) AS fetched_at
FROM ratio_values v
JOIN ranked r ON r.snapshot_id = v.snapshot_id
WHERE r.rn = 1;

CREATE OR REPLACE VIEW v_health_history AS
SELECT
    h.symbol,
    h.total,
    h.grade,
    h.profitability,
    h.liquidity,
    h.leverage,
    h.valuation,
    h.efficiency,
    s.provider,
    to_timestamp(h.scored_unix) AS scored_at
FROM health_scores h
LEFT JOIN ratio_snapshots s ON s.snapshot_id = h.snapshot_id;

CREATE OR REPLACE VIEW vw_returns_daily AS
SELECT
    symbol,
    CAST(ts AS DATE) AS date,
    CASE
        WHEN LAG(close) OVER (PARTITION BY symbol ORDER BY ts) IS NULL THEN NULL
        WHEN LAG(close) OVER (PARTITION BY symbol ORDER BY ts) = 0 THEN NULL
        ELSE (close / LAG(close) OVER (PARTITION BY symbol ORDER BY ts)) - 1.0
    END AS return_pct
FROM bars_1d;

CREATE OR REPLACE VIEW vw_source_latency AS
SELECT
    source,
    dataset,
    AVG(latency_ms)::DOUBLE AS avg_latency_ms
FROM ingest_log
WHERE latency_ms IS NOT NULL
GROUP BY source, dataset;
",
    )?;

    Ok(())
}
