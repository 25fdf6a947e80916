//! Persistence seam for assembled results.
//!
//! The engine only sees [`SnapshotStore`]; [`WarehouseStore`] maps it onto the
//! DuckDB warehouse.

use std::time::Duration;

use ratiolens_warehouse::{
    BarRecord, HealthScoreRecord, QuoteRecord, RatioSnapshotRecord, RatioValueRecord, Warehouse,
};
use time::macros::format_description;
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;
use crate::scoring::HealthScore;
use crate::{BarSeries, ProviderId, Quote, RatioSet, Symbol, UtcDateTime};

/// Identifier assigned to a persisted ratio set.
pub type SnapshotId = String;

pub trait SnapshotStore: Send + Sync {
    /// Most recent stored ratio set for `symbol` no older than `max_age` at `now`.
    fn load_fresh(
        &self,
        symbol: &Symbol,
        max_age: Duration,
        now: UtcDateTime,
    ) -> Result<Option<RatioSet>, CoreError>;

    fn save_ratios(&self, request_id: &str, ratios: &RatioSet) -> Result<SnapshotId, CoreError>;

    fn save_health(
        &self,
        request_id: &str,
        snapshot_id: &str,
        symbol: &Symbol,
        score: &HealthScore,
        scored_at: UtcDateTime,
    ) -> Result<(), CoreError>;
}

#[derive(Clone)]
pub struct WarehouseStore {
    warehouse: Warehouse,
}

impl WarehouseStore {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    pub fn save_quote(
        &self,
        request_id: &str,
        quote: &Quote,
        provider: ProviderId,
        latency_ms: u64,
    ) -> Result<(), CoreError> {
        let record = QuoteRecord {
            symbol: quote.symbol.clone(),
            price: quote.price,
            change: quote.change,
            change_percent: quote.change_percent,
            volume: quote.volume,
            market_cap: quote.market_cap,
            source: provider.as_str().to_owned(),
            as_of: quote.as_of.format_rfc3339(),
            as_of_unix: unix_seconds(quote.as_of),
        };
        self.warehouse
            .ingest_quotes(request_id, &[record], latency_ms)?;
        Ok(())
    }

    pub fn save_bars(
        &self,
        request_id: &str,
        series: &BarSeries,
        provider: ProviderId,
        latency_ms: u64,
    ) -> Result<usize, CoreError> {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let rows = series
            .bars
            .iter()
            .filter_map(|bar| {
                let ts = bar.ts.into_inner().format(&format).ok()?;
                Some(BarRecord {
                    symbol: series.symbol.clone(),
                    ts,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                })
            })
            .collect::<Vec<_>>();
        self.warehouse
            .ingest_bars(provider.as_str(), request_id, &rows, latency_ms)?;
        Ok(rows.len())
    }

    /// Stored quotes for the last `days` days, newest first.
    pub fn quote_history(
        &self,
        symbol: &Symbol,
        days: u32,
        now: UtcDateTime,
    ) -> Result<Vec<QuoteRecord>, CoreError> {
        let floor = unix_seconds(now) - i64::from(days) * 86_400;
        Ok(self.warehouse.quote_history(symbol.base(), floor)?)
    }
}

impl SnapshotStore for WarehouseStore {
    fn load_fresh(
        &self,
        symbol: &Symbol,
        max_age: Duration,
        now: UtcDateTime,
    ) -> Result<Option<RatioSet>, CoreError> {
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        let floor = unix_seconds(now).saturating_sub(max_age);
        let Some(stored) = self.warehouse.latest_snapshot(symbol.base(), floor)? else {
            return Ok(None);
        };

        let mut ratios: RatioSet = serde_json::from_str(&stored.payload)?;
        // Errors belong to the request that produced the snapshot.
        ratios.errors.clear();
        debug!(
            symbol = %symbol,
            snapshot_id = %stored.snapshot_id,
            "serving ratios from store"
        );
        Ok(Some(ratios))
    }

    fn save_ratios(&self, request_id: &str, ratios: &RatioSet) -> Result<SnapshotId, CoreError> {
        let snapshot_id = Uuid::new_v4().to_string();
        let values = ratios
            .populated()
            .map(|(metric, value, source)| RatioValueRecord {
                category: metric.category().as_str().to_owned(),
                metric: metric.as_str().to_owned(),
                value,
                source: source.as_str().to_owned(),
            })
            .collect();
        let record = RatioSnapshotRecord {
            snapshot_id: snapshot_id.clone(),
            symbol: ratios.symbol.base().to_owned(),
            provider: ratios.adopted.map(|provider| provider.as_str().to_owned()),
            fetched_unix: unix_seconds(ratios.as_of),
            payload: serde_json::to_string(ratios)?,
            values,
        };
        self.warehouse.ingest_ratio_snapshot(request_id, &record, 0)?;
        Ok(snapshot_id)
    }

    fn save_health(
        &self,
        request_id: &str,
        snapshot_id: &str,
        symbol: &Symbol,
        score: &HealthScore,
        scored_at: UtcDateTime,
    ) -> Result<(), CoreError> {
        let record = HealthScoreRecord {
            snapshot_id: snapshot_id.to_owned(),
            symbol: symbol.base().to_owned(),
            profitability: i32::from(score.profitability),
            liquidity: i32::from(score.liquidity),
            leverage: i32::from(score.leverage),
            valuation: i32::from(score.valuation),
            efficiency: i32::from(score.efficiency),
            total: i32::from(score.total),
            grade: score.grade.as_str().to_owned(),
            scored_unix: unix_seconds(scored_at),
        };
        self.warehouse.ingest_health_score(request_id, &record)?;
        Ok(())
    }
}

fn unix_seconds(at: UtcDateTime) -> i64 {
    at.into_inner().unix_timestamp()
}
