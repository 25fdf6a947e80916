//! Sector market overview and batch quotes.
//!
//! Both fan out [`RatioAggregator::route_quote`] through the same bounded, paced
//! fetch used for peers. A symbol whose quote cannot be routed is reported as
//! `quote.unavailable` and never fails the whole request.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::{RatioAggregator, RouteFailure, RouteResult};
use crate::outcome::ErrorDetail;
use crate::peers::Universe;
use crate::throttling::CallPacer;
use crate::{ProviderId, Quote, Symbol, SymbolNormalizer, UtcDateTime, ValidationError};

pub const QUOTE_UNAVAILABLE: &str = "quote.unavailable";

/// Sector name that selects every universe entry.
pub const ALL_SECTORS: &str = "major";

/// Daily move, in percent, at which a listing counts as a gainer or loser.
pub const MOVER_THRESHOLD_PERCENT: f64 = 2.0;

/// Share volume above which a listing counts as high volume.
pub const HIGH_VOLUME_SHARES: u64 = 1_000_000;

/// One listing picked out of an overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub symbol: String,
    pub price: f64,
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
}

impl Mover {
    fn from_quote(symbol: &str, quote: &Quote) -> Self {
        Self {
            symbol: symbol.to_owned(),
            price: quote.price,
            change_percent: quote.change_percent,
            volume: quote.volume,
        }
    }

    fn change(&self) -> f64 {
        self.change_percent.unwrap_or_default()
    }
}

/// Direction of the average sector move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorTrend {
    Strong,
    Neutral,
    Weak,
}

impl SectorTrend {
    /// Above +1% is strong, below -1% is weak.
    pub fn from_average(average_change_percent: f64) -> Self {
        if average_change_percent > 1.0 {
            Self::Strong
        } else if average_change_percent < -1.0 {
            Self::Weak
        } else {
            Self::Neutral
        }
    }
}

impl Display for SectorTrend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Strong => "strong",
            Self::Neutral => "neutral",
            Self::Weak => "weak",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOverview {
    pub sector: String,
    pub generated_at: UtcDateTime,
    /// Every symbol that was asked for, in universe order.
    pub symbols: Vec<String>,
    pub quoted: usize,
    /// Largest gain first.
    pub gainers: Vec<Mover>,
    /// Largest loss first.
    pub losers: Vec<Mover>,
    /// Highest volume first.
    pub high_volume: Vec<Mover>,
    /// Mean daily change of the quotes that carry one, two decimals.
    pub average_change_percent: Option<f64>,
    pub trend: Option<SectorTrend>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

/// Quote adopted for one batch symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedSymbol {
    pub symbol: String,
    pub provider: ProviderId,
    pub quote: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchQuotes {
    /// Symbols as submitted, before de-duplication and the batch cap.
    pub requested: usize,
    pub quotes: Vec<QuotedSymbol>,
    pub failed: Vec<ErrorDetail>,
    /// Distinct symbols beyond the batch cap, never fetched.
    pub skipped: Vec<String>,
}

impl BatchQuotes {
    /// Percentage of fetched symbols that produced a quote, one decimal.
    pub fn success_rate(&self) -> Option<f64> {
        let attempted = self.quotes.len() + self.failed.len();
        if attempted == 0 {
            return None;
        }
        Some(round_to(self.quotes.len() as f64 / attempted as f64 * 100.0, 1))
    }
}

/// Fans quote routing out over many symbols.
#[derive(Clone)]
pub struct QuoteBoard {
    aggregator: Arc<RatioAggregator>,
    normalizer: SymbolNormalizer,
    universe: Universe,
    max_batch: usize,
    concurrency: usize,
    pacer: CallPacer,
}

impl QuoteBoard {
    pub fn new(aggregator: Arc<RatioAggregator>, normalizer: SymbolNormalizer, universe: Universe) -> Self {
        Self {
            aggregator,
            normalizer,
            universe,
            max_batch: 5,
            concurrency: 1,
            pacer: CallPacer::disabled(),
        }
    }

    /// `concurrency` 1 means sequential, paced fetches.
    pub fn with_limits(mut self, max_batch: usize, concurrency: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_pacer(mut self, pacer: CallPacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Canonical sector name and its members. [`ALL_SECTORS`] covers the whole
    /// universe; other names match case-insensitively.
    pub fn sector_members(&self, sector: &str) -> Result<(String, Vec<String>), ValidationError> {
        let requested = sector.trim();
        let entries = self.universe.entries();
        if requested.eq_ignore_ascii_case(ALL_SECTORS) {
            let members = entries.iter().map(|entry| entry.symbol.clone()).collect();
            return Ok((ALL_SECTORS.to_owned(), members));
        }

        let members = entries
            .iter()
            .filter(|entry| entry.sector.eq_ignore_ascii_case(requested))
            .collect::<Vec<_>>();
        match members.first() {
            Some(first) => Ok((
                first.sector.clone(),
                members.iter().map(|entry| entry.symbol.clone()).collect(),
            )),
            None => Err(ValidationError::UnknownSector {
                sector: requested.to_owned(),
                available: self.available_sectors().join(", "),
            }),
        }
    }

    /// [`ALL_SECTORS`] followed by each universe sector in declaration order.
    pub fn available_sectors(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        std::iter::once(ALL_SECTORS.to_owned())
            .chain(
                self.universe
                    .entries()
                    .iter()
                    .filter(|entry| seen.insert(entry.sector.to_ascii_lowercase()))
                    .map(|entry| entry.sector.clone()),
            )
            .collect()
    }

    pub async fn overview(&self, sector: &str) -> Result<MarketOverview, ValidationError> {
        let (sector, members) = self.sector_members(sector)?;
        let symbols = members
            .iter()
            .map(|member| self.normalizer.normalize(member))
            .collect::<Vec<_>>();
        let fetched = self.quote_all(symbols).await;

        let mut overview = MarketOverview {
            sector,
            generated_at: UtcDateTime::now(),
            symbols: members,
            quoted: 0,
            gainers: Vec::new(),
            losers: Vec::new(),
            high_volume: Vec::new(),
            average_change_percent: None,
            trend: None,
            errors: Vec::new(),
        };
        let mut changes = Vec::new();

        for (symbol, routed) in fetched {
            let quote = match routed {
                Ok(success) => success.data,
                Err(failure) => {
                    overview.errors.push(unavailable(&symbol, &failure));
                    continue;
                }
            };
            overview.quoted += 1;
            let mover = Mover::from_quote(symbol.base(), &quote);

            if let Some(change) = quote.change_percent.filter(|change| change.is_finite()) {
                changes.push(change);
                if change >= MOVER_THRESHOLD_PERCENT {
                    overview.gainers.push(mover.clone());
                } else if change <= -MOVER_THRESHOLD_PERCENT {
                    overview.losers.push(mover.clone());
                }
            }
            if quote.volume.is_some_and(|volume| volume > HIGH_VOLUME_SHARES) {
                overview.high_volume.push(mover);
            }
        }

        overview
            .gainers
            .sort_by(|left, right| right.change().total_cmp(&left.change()));
        overview
            .losers
            .sort_by(|left, right| left.change().total_cmp(&right.change()));
        overview
            .high_volume
            .sort_by(|left, right| right.volume.cmp(&left.volume));

        if !changes.is_empty() {
            let average = changes.iter().sum::<f64>() / changes.len() as f64;
            let average = round_to(average, 2);
            overview.average_change_percent = Some(average);
            overview.trend = Some(SectorTrend::from_average(average));
        }

        info!(
            sector = %overview.sector,
            symbols = overview.symbols.len(),
            quoted = overview.quoted,
            failed = overview.errors.len(),
            "market overview assembled"
        );
        Ok(overview)
    }

    /// Quotes up to the batch cap of distinct symbols. Every symbol is validated
    /// before any provider is contacted.
    pub async fn batch<S: AsRef<str>>(&self, symbols: &[S]) -> Result<BatchQuotes, ValidationError> {
        if symbols.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }

        let mut seen = BTreeSet::new();
        let mut parsed = Vec::with_capacity(symbols.len());
        for raw in symbols {
            let symbol = self.normalizer.parse(raw.as_ref())?;
            if seen.insert(symbol.base().to_owned()) {
                parsed.push(symbol);
            }
        }
        let skipped = if parsed.len() > self.max_batch {
            parsed
                .split_off(self.max_batch)
                .iter()
                .map(|symbol| symbol.base().to_owned())
                .collect()
        } else {
            Vec::new()
        };
        if !skipped.is_empty() {
            debug!(skipped = ?skipped, cap = self.max_batch, "batch cap reached");
        }

        let mut batch = BatchQuotes {
            requested: symbols.len(),
            quotes: Vec::new(),
            failed: Vec::new(),
            skipped,
        };
        for (symbol, routed) in self.quote_all(parsed).await {
            match routed {
                Ok(success) => batch.quotes.push(QuotedSymbol {
                    symbol: symbol.base().to_owned(),
                    provider: success.selected_source,
                    quote: success.data,
                }),
                Err(failure) => batch.failed.push(unavailable(&symbol, &failure)),
            }
        }

        info!(
            requested = batch.requested,
            quoted = batch.quotes.len(),
            failed = batch.failed.len(),
            skipped = batch.skipped.len(),
            "batch quotes collected"
        );
        Ok(batch)
    }

    async fn quote_all(&self, symbols: Vec<Symbol>) -> Vec<(Symbol, RouteResult<Quote>)> {
        self.pacer
            .fan_out(self.concurrency, symbols, |symbol| async move {
                let routed = self.aggregator.route_quote(&symbol).await;
                (symbol, routed)
            })
            .await
    }
}

fn unavailable(symbol: &Symbol, failure: &RouteFailure) -> ErrorDetail {
    let cause = failure
        .errors
        .first()
        .map(|error| error.code.clone())
        .unwrap_or_else(|| String::from("no data"));
    debug!(symbol = %symbol, cause = %cause, "quote unavailable");
    ErrorDetail::new(
        QUOTE_UNAVAILABLE,
        format!("no provider returned a quote for '{}' ({cause})", symbol.base()),
    )
    .with_symbol(symbol.base())
    .with_retryable(failure.errors.iter().any(|error| error.retryable))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::UniverseEntry;
    use crate::VenueTable;

    fn board() -> QuoteBoard {
        let aggregator = Arc::new(RatioAggregator::new(Vec::new(), &[ProviderId::Fmp]));
        let universe = Universe::new(vec![
            UniverseEntry::new("TD", "Toronto-Dominion Bank", "Financial Services"),
            UniverseEntry::new("SU", "Suncor Energy", "Energy"),
            UniverseEntry::new("RY", "Royal Bank of Canada", "Financial Services"),
        ]);
        QuoteBoard::new(aggregator, SymbolNormalizer::new(VenueTable::default()), universe)
    }

    #[test]
    fn sector_names_match_case_insensitively() {
        let (sector, members) = board().sector_members(" financial services ").expect("known");
        assert_eq!(sector, "Financial Services");
        assert_eq!(members, vec!["TD", "RY"]);

        let (sector, members) = board().sector_members("MAJOR").expect("all");
        assert_eq!(sector, "major");
        assert_eq!(members, vec!["TD", "SU", "RY"]);
    }

    #[test]
    fn unknown_sector_lists_the_alternatives() {
        let error = board().sector_members("mining").expect_err("unknown");
        assert_eq!(
            error,
            ValidationError::UnknownSector {
                sector: String::from("mining"),
                available: String::from("major, Financial Services, Energy"),
            }
        );
    }

    #[test]
    fn trend_thresholds_are_exclusive() {
        assert_eq!(SectorTrend::from_average(1.0), SectorTrend::Neutral);
        assert_eq!(SectorTrend::from_average(1.01), SectorTrend::Strong);
        assert_eq!(SectorTrend::from_average(-1.0), SectorTrend::Neutral);
        assert_eq!(SectorTrend::from_average(-1.5), SectorTrend::Weak);
    }

    #[test]
    fn success_rate_ignores_skipped_symbols() {
        let batch = BatchQuotes {
            requested: 7,
            quotes: Vec::new(),
            failed: vec![ErrorDetail::new(QUOTE_UNAVAILABLE, "x")],
            skipped: vec![String::from("AC")],
        };
        assert_eq!(batch.success_rate(), Some(0.0));

        let empty = BatchQuotes {
            requested: 0,
            quotes: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        };
        assert_eq!(empty.success_rate(), None);
    }
}
