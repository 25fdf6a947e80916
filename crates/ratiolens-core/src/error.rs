use thiserror::Error;

/// Request and configuration errors raised before any provider is contacted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid provider '{value}', expected one of fmp, yahoo")]
    InvalidProvider { value: String },
    #[error("invalid metric '{value}'")]
    InvalidMetric { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite and non-negative")]
    InvalidPrice { field: &'static str },
    #[error("bar high must be >= low")]
    InvalidBarRange,
    #[error("bar open/close must be within high/low range")]
    InvalidBarBounds,

    #[error("peer limit must be greater than zero")]
    ZeroPeerLimit,
    #[error("explicit peer list must contain at least one symbol")]
    EmptyPeerList,
    #[error("history range must be greater than zero days")]
    EmptyHistoryRange,
    #[error("unknown sector '{sector}', available: {available}")]
    UnknownSector { sector: String, available: String },
    #[error("batch quote request must contain at least one symbol")]
    EmptyBatch,

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl ValidationError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Warehouse(#[from] ratiolens_warehouse::WarehouseError),
}
