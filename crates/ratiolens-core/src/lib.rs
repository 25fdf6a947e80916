//! # ratiolens-core
//!
//! Financial-health engine for exchange-listed equities.
//!
//! ## Overview
//!
//! - **Symbol normalization** from user input to per-provider wire forms
//! - **Provider calls** with per-attempt timeout, retry by failure kind and exponential backoff
//! - **Ratio aggregation** with ordered fallback and single-provider provenance
//! - **Health scoring** from immutable band tables
//! - **Peer comparison** with bounded fan-out, means and percentiles
//! - **Market overview and batch quotes** over the same fan-out
//! - **Report assembly** that turns provider failures into data, never into errors
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | FMP-style and Yahoo-style provider adapters |
//! | [`aggregator`] | Provider fallback and ratio aggregation |
//! | [`calendar`] | Exchange trading-hours status |
//! | [`config`] | Engine configuration |
//! | [`data_source`] | Adapter trait and capabilities |
//! | [`domain`] | Symbols, ratios, quotes, bars, timestamps |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`outcome`] | Fetch outcomes and error details |
//! | [`overview`] | Sector market overview and batch quotes |
//! | [`peers`] | Peer selection and statistics |
//! | [`provider`] | Retrying provider client |
//! | [`report`] | Report assembly and engine facade |
//! | [`scoring`] | Health score computation |
//! | [`store`] | Persistence seam |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ratiolens_core::{AnalysisRequest, Engine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::from_config(EngineConfig::from_env()?)?;
//!     let report = engine.analyze(&AnalysisRequest::new("TD")).await?;
//!     if let Some(health) = report.health {
//!         println!("{} scores {}/100 ({})", report.symbol, health.total, health.grade);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Security
//!
//! API keys come from configuration only, are redacted from logged URLs and
//! never appear in `Debug` output.

pub mod adapters;
pub mod aggregator;
pub mod calendar;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod outcome;
pub mod overview;
pub mod peers;
pub mod provider;
pub mod provider_policy;
pub mod report;
pub mod retry;
pub mod scoring;
pub mod source;
pub mod store;
pub mod throttling;

pub use adapters::{FmpAdapter, YahooAdapter};

pub use aggregator::{RatioAggregator, RouteFailure, RouteResult, RouteSuccess};

pub use calendar::{MarketCalendar, MarketSession, MarketStatus};

pub use config::EngineConfig;

pub use data_source::{CapabilitySet, Endpoint, RatioSource, SourceFuture};

pub use domain::{
    validate_ticker, Bar, BarSeries, HistoryRange, Metric, MetricValue, Quote, RatioCategory,
    RatioCategoryKind, RatioSet, RatioSnapshot, Symbol, SymbolNormalizer, Trend, UtcDateTime,
    VenueTable,
};

pub use error::{CoreError, ValidationError};

pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, RecordedCall,
    ReqwestHttpClient, ScriptedHttpClient, ScriptedReply,
};

pub use outcome::{ErrorDetail, FailureKind, FetchOutcome};

pub use overview::{BatchQuotes, MarketOverview, Mover, QuoteBoard, QuotedSymbol, SectorTrend};

pub use peers::{
    PeerAnalysis, PeerComparator, PeerCriterion, PeerMetricComparison, PeerPerformance,
    PeerRequest, PeerSelection, Standing, Universe, UniverseEntry,
};

pub use provider::{Decoded, ProviderCall, ProviderClient};

pub use provider_policy::ProviderPolicy;

pub use report::{AnalysisRequest, DataQuality, Engine, Report, ReportAssembler};

pub use retry::{Backoff, RetryConfig};

pub use scoring::{Assessment, Grade, HealthScore, HealthScorer, ScoringTable};

pub use source::ProviderId;

pub use store::{SnapshotStore, WarehouseStore};

pub use throttling::{CallPacer, TokioClock};

// Warehouse types surfaced through the store seam.
pub use ratiolens_warehouse::{
    QueryGuardrails, QueryResult, QuoteRecord, Warehouse, WarehouseConfig, WarehouseError,
};
