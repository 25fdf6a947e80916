//! Provider adapter contract.
//!
//! | Endpoint | Method | Payload |
//! |----------|--------|---------|
//! | Ratios | [`RatioSource::current_ratios`] | [`RatioSnapshot`] |
//! | RatioHistory | [`RatioSource::ratio_history`] | `Vec<RatioSnapshot>`, newest first |
//! | Quote | [`RatioSource::quote`] | [`Quote`] |
//! | PriceHistory | [`RatioSource::price_history`] | [`BarSeries`] |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::outcome::FetchOutcome;
use crate::{BarSeries, HistoryRange, ProviderId, Quote, RatioSnapshot, Symbol};

/// Data endpoint used for capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Ratios,
    RatioHistory,
    Quote,
    PriceHistory,
}

impl Endpoint {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ratios => "ratios",
            Self::RatioHistory => "ratio_history",
            Self::Quote => "quote",
            Self::PriceHistory => "price_history",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported endpoint matrix for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub ratios: bool,
    pub ratio_history: bool,
    pub quote: bool,
    pub price_history: bool,
}

impl CapabilitySet {
    pub const fn new(ratios: bool, ratio_history: bool, quote: bool, price_history: bool) -> Self {
        Self {
            ratios,
            ratio_history,
            quote,
            price_history,
        }
    }

    pub const fn supports(self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::Ratios => self.ratios,
            Endpoint::RatioHistory => self.ratio_history,
            Endpoint::Quote => self.quote,
            Endpoint::PriceHistory => self.price_history,
        }
    }
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = FetchOutcome<T>> + Send + 'a>>;

/// Provider adapter. Every method resolves to a [`FetchOutcome`]; nothing here returns `Err`.
///
/// Endpoints a provider lacks keep the default implementation, which reports
/// [`FailureKind::Unsupported`](crate::FailureKind::Unsupported) without any I/O.
pub trait RatioSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> CapabilitySet;

    /// Trailing / most current ratio snapshot.
    fn current_ratios<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, RatioSnapshot>;

    /// Annual ratio snapshots, newest first.
    fn ratio_history<'a>(
        &'a self,
        _symbol: &'a Symbol,
        _limit: usize,
    ) -> SourceFuture<'a, Vec<RatioSnapshot>> {
        let provider = self.id();
        Box::pin(async move { FetchOutcome::unsupported(provider, Endpoint::RatioHistory.as_str()) })
    }

    fn quote<'a>(&'a self, _symbol: &'a Symbol) -> SourceFuture<'a, Quote> {
        let provider = self.id();
        Box::pin(async move { FetchOutcome::unsupported(provider, Endpoint::Quote.as_str()) })
    }

    fn price_history<'a>(
        &'a self,
        _symbol: &'a Symbol,
        _range: HistoryRange,
    ) -> SourceFuture<'a, BarSeries> {
        let provider = self.id();
        Box::pin(async move { FetchOutcome::unsupported(provider, Endpoint::PriceHistory.as_str()) })
    }
}
