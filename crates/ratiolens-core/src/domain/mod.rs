pub mod market;
pub mod ratios;
pub mod symbol;
pub mod timestamp;

pub use market::{Bar, BarSeries, HistoryRange, Quote};
pub use ratios::{
    Metric, MetricValue, RatioCategory, RatioCategoryKind, RatioSet, RatioSnapshot, Trend,
};
pub use symbol::{validate_ticker, Symbol, SymbolNormalizer, VenueTable};
pub use timestamp::UtcDateTime;
