//! Row shapes accepted and returned by the warehouse.
//!
//! Timestamps travel as RFC3339 text plus unix seconds; enums as their string names.

use serde::Serialize;

use crate::WarehouseError;

/// One assembled ratio set. `payload` is the full serialized set; `values`
/// are its populated metrics flattened for SQL access.
#[derive(Debug, Clone)]
pub struct RatioSnapshotRecord {
    pub snapshot_id: String,
    pub symbol: String,
    /// Provider whose response was adopted, if any.
    pub provider: Option<String>,
    pub fetched_unix: i64,
    pub payload: String,
    pub values: Vec<RatioValueRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatioValueRecord {
    pub category: String,
    pub metric: String,
    pub value: f64,
    pub source: String,
}

/// Snapshot row as read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSnapshot {
    pub snapshot_id: String,
    pub symbol: String,
    pub provider: Option<String>,
    pub fetched_unix: i64,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthScoreRecord {
    pub snapshot_id: String,
    pub symbol: String,
    pub profitability: i32,
    pub liquidity: i32,
    pub leverage: i32,
    pub valuation: i32,
    pub efficiency: i32,
    pub total: i32,
    pub grade: String,
    pub scored_unix: i64,
}

impl HealthScoreRecord {
    pub(crate) fn validate(&self) -> Result<(), WarehouseError> {
        let parts = [
            self.profitability,
            self.liquidity,
            self.leverage,
            self.valuation,
            self.efficiency,
        ];
        if parts.iter().any(|part| !(0..=20).contains(part)) {
            return Err(WarehouseError::InvalidRecord(format!(
                "health subscore out of range for '{}'",
                self.symbol
            )));
        }
        if parts.iter().sum::<i32>() != self.total {
            return Err(WarehouseError::InvalidRecord(format!(
                "health total {} does not equal the sum of subscores for '{}'",
                self.total, self.symbol
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteRecord {
    pub symbol: String,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
    pub source: String,
    /// RFC3339 timestamp as reported.
    pub as_of: String,
    pub as_of_unix: i64,
}

impl QuoteRecord {
    pub(crate) fn validate(&self) -> Result<(), WarehouseError> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(WarehouseError::InvalidRecord(format!(
                "quote price for '{}' must be finite and non-negative",
                self.symbol
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarRecord {
    pub symbol: String,
    /// UTC bar timestamp, `YYYY-MM-DD HH:MM:SS`.
    pub ts: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(total: i32) -> HealthScoreRecord {
        HealthScoreRecord {
            snapshot_id: String::from("s-1"),
            symbol: String::from("ABC"),
            profitability: 0,
            liquidity: 4,
            leverage: 0,
            valuation: 2,
            efficiency: 10,
            total,
            grade: String::from("F"),
            scored_unix: 0,
        }
    }

    #[test]
    fn health_total_must_match_subscores() {
        assert!(score(16).validate().is_ok());
        assert!(matches!(
            score(17).validate(),
            Err(WarehouseError::InvalidRecord(_))
        ));
    }

    #[test]
    fn negative_quote_price_is_rejected() {
        let quote = QuoteRecord {
            symbol: String::from("TD"),
            price: -1.0,
            change: None,
            change_percent: None,
            volume: None,
            market_cap: None,
            source: String::from("fmp"),
            as_of: String::from("2024-06-04T15:15:00Z"),
            as_of_unix: 1_717_514_100,
        };
        assert!(quote.validate().is_err());
    }
}
