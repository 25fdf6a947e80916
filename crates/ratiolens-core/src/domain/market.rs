use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// Latest trading snapshot for one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
    pub as_of: UtcDateTime,
}

impl Quote {
    /// Position of the price inside the 52 week range, as a percentage.
    pub fn range_position(&self) -> Option<f64> {
        let (high, low) = (self.year_high?, self.year_low?);
        if high <= low {
            return None;
        }
        Some((self.price - low) / (high - low) * 100.0)
    }
}

/// Daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
}

impl Bar {
    pub fn new(
        ts: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<u64>,
    ) -> Result<Self, ValidationError> {
        let fields = [("open", open), ("high", high), ("low", low), ("close", close)];
        if let Some((field, _)) = fields
            .into_iter()
            .find(|(_, price)| !price.is_finite() || *price < 0.0)
        {
            return Err(ValidationError::InvalidPrice { field });
        }
        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }
        if open > high || open < low || close > high || close < low {
            return Err(ValidationError::InvalidBarBounds);
        }
        Ok(Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Price history for one symbol. An empty series is a valid "no data" answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    pub symbol: String,
    pub bars: Vec<Bar>,
}

/// Look-back window for price history requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRange {
    days: u32,
}

impl HistoryRange {
    pub fn days(days: u32) -> Result<Self, ValidationError> {
        if days == 0 {
            return Err(ValidationError::EmptyHistoryRange);
        }
        Ok(Self { days })
    }

    pub const fn as_days(self) -> u32 {
        self.days
    }

    /// Chart API range token (`5d`, `1mo`, `1y`, ...), rounded up.
    pub fn as_chart_range(self) -> &'static str {
        match self.days {
            0..=1 => "1d",
            2..=5 => "5d",
            6..=31 => "1mo",
            32..=93 => "3mo",
            94..=186 => "6mo",
            187..=366 => "1y",
            367..=731 => "2y",
            732..=1827 => "5y",
            _ => "max",
        }
    }
}
