//! Peer selection and relative statistics.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::RatioAggregator;
use crate::outcome::ErrorDetail;
use crate::throttling::CallPacer;
use crate::{validate_ticker, Metric, RatioSet, Symbol, SymbolNormalizer, ValidationError};

pub const PEER_UNAVAILABLE: &str = "peer.unavailable";

/// One listing known to the peer universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseEntry {
    /// Canonical base ticker.
    pub symbol: String,
    pub name: String,
    pub sector: String,
}

impl UniverseEntry {
    pub fn new(symbol: &str, name: &str, sector: &str) -> Self {
        Self {
            symbol: symbol.to_ascii_uppercase(),
            name: name.to_owned(),
            sector: sector.to_owned(),
        }
    }
}

/// Sector classification used for automatic peer selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    entries: Vec<UniverseEntry>,
    /// Peers used when the sector is unknown or has no other members.
    fallback: Vec<String>,
}

impl Universe {
    /// The fallback set defaults to every entry in declaration order.
    pub fn new(entries: Vec<UniverseEntry>) -> Self {
        let fallback = entries.iter().map(|entry| entry.symbol.clone()).collect();
        Self { entries, fallback }
    }

    pub fn with_fallback<I, S>(mut self, fallback: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fallback = fallback
            .into_iter()
            .map(|symbol| symbol.as_ref().trim().to_ascii_uppercase())
            .collect();
        self
    }

    /// Major TSX listings.
    pub fn tsx_major() -> Self {
        Self::new(vec![
            UniverseEntry::new("SHOP", "Shopify Inc", "Technology"),
            UniverseEntry::new("TD", "Toronto-Dominion Bank", "Financial Services"),
            UniverseEntry::new("RY", "Royal Bank of Canada", "Financial Services"),
            UniverseEntry::new("CNR", "Canadian National Railway", "Industrials"),
            UniverseEntry::new("SU", "Suncor Energy", "Energy"),
            UniverseEntry::new("WEED", "Canopy Growth", "Healthcare"),
            UniverseEntry::new("AC", "Air Canada", "Industrials"),
            UniverseEntry::new("BBD-B", "Bombardier Inc", "Industrials"),
        ])
    }

    pub fn entries(&self) -> &[UniverseEntry] {
        &self.entries
    }

    pub fn fallback(&self) -> &[String] {
        &self.fallback
    }

    pub fn sector_of(&self, base: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.symbol.eq_ignore_ascii_case(base))
            .map(|entry| entry.sector.as_str())
    }

    /// Sector co-members excluding `base`.
    pub fn sector_peers(&self, sector: &str, base: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.sector.eq_ignore_ascii_case(sector))
            .filter(|entry| !entry.symbol.eq_ignore_ascii_case(base))
            .map(|entry| entry.symbol.clone())
            .collect()
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::tsx_major()
    }
}

/// How peers are chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerCriterion {
    /// Sector co-members; `None` detects the sector from the universe.
    Sector(Option<String>),
    Explicit(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRequest {
    pub criterion: PeerCriterion,
    pub limit: usize,
}

impl Default for PeerRequest {
    fn default() -> Self {
        Self {
            criterion: PeerCriterion::Sector(None),
            limit: 3,
        }
    }
}

impl PeerRequest {
    pub fn sector(sector: Option<String>, limit: usize) -> Self {
        Self {
            criterion: PeerCriterion::Sector(sector),
            limit,
        }
    }

    pub fn explicit<I, S>(peers: I, limit: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            criterion: PeerCriterion::Explicit(peers.into_iter().map(Into::into).collect()),
            limit,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.limit == 0 {
            return Err(ValidationError::ZeroPeerLimit);
        }
        if let PeerCriterion::Explicit(peers) = &self.criterion {
            if peers.is_empty() {
                return Err(ValidationError::EmptyPeerList);
            }
            for peer in peers {
                validate_ticker(peer.trim())?;
            }
        }
        Ok(())
    }
}

/// Resolved peer list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSelection {
    pub sector: Option<String>,
    pub peers: Vec<Symbol>,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    AboveAverage,
    BelowAverage,
}

impl Display for Standing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::AboveAverage => "above average",
            Self::BelowAverage => "below average",
        })
    }
}

/// Primary value against the peer distribution for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMetricComparison {
    pub metric: Metric,
    pub primary_value: f64,
    pub peer_mean: f64,
    pub peer_values: BTreeMap<String, f64>,
    pub standing: Standing,
    /// Share of `peers ∪ {primary}` strictly below the primary value, 0-100, one decimal.
    pub percentile: f64,
}

/// Statistics for one metric. `None` when no peer reports it.
///
/// Ties with the primary value count as not-less-than, so the primary's own
/// value never counts toward its percentile.
pub fn compare_metric(
    metric: Metric,
    primary_value: f64,
    peer_values: BTreeMap<String, f64>,
) -> Option<PeerMetricComparison> {
    if peer_values.is_empty() {
        return None;
    }
    let peer_mean = peer_values.values().sum::<f64>() / peer_values.len() as f64;
    let pool = peer_values.len() + 1;
    let below = peer_values
        .values()
        .filter(|value| **value < primary_value)
        .count();
    let percentile = (below as f64 / pool as f64 * 100.0 * 10.0).round() / 10.0;
    let standing = if primary_value > peer_mean {
        Standing::AboveAverage
    } else {
        Standing::BelowAverage
    };

    Some(PeerMetricComparison {
        metric,
        primary_value,
        peer_mean,
        peer_values,
        standing,
        percentile,
    })
}

/// Share of compared metrics where the primary is above the peer mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerPerformance {
    Outperforming,
    Mixed,
    Underperforming,
}

impl PeerPerformance {
    pub fn from_counts(above: usize, total: usize) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let share = above as f64 / total as f64;
        Some(if share >= 0.7 {
            Self::Outperforming
        } else if share >= 0.4 {
            Self::Mixed
        } else {
            Self::Underperforming
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerAnalysis {
    pub sector: Option<String>,
    pub peers: Vec<String>,
    pub used_fallback: bool,
    pub comparisons: Vec<PeerMetricComparison>,
    pub above_average: usize,
    pub performance: Option<PeerPerformance>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

impl PeerAnalysis {
    pub fn comparison(&self, metric: Metric) -> Option<&PeerMetricComparison> {
        self.comparisons.iter().find(|entry| entry.metric == metric)
    }

    pub fn is_available(&self) -> bool {
        !self.comparisons.is_empty()
    }
}

/// Fetches peer ratio sets and compares them with the primary.
#[derive(Clone)]
pub struct PeerComparator {
    aggregator: Arc<RatioAggregator>,
    normalizer: SymbolNormalizer,
    universe: Universe,
    metrics: Vec<Metric>,
    max_peers: usize,
    concurrency: usize,
    pacer: CallPacer,
}

impl PeerComparator {
    pub fn new(aggregator: Arc<RatioAggregator>, normalizer: SymbolNormalizer, universe: Universe) -> Self {
        Self {
            aggregator,
            normalizer,
            universe,
            metrics: vec![
                Metric::PeRatio,
                Metric::PbRatio,
                Metric::Roe,
                Metric::CurrentRatio,
                Metric::DebtToEquity,
            ],
            max_peers: 3,
            concurrency: 1,
            pacer: CallPacer::disabled(),
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics = metrics;
        self
    }

    /// `max_peers` caps every request; `concurrency` 1 means sequential, paced fetches.
    pub fn with_limits(mut self, max_peers: usize, concurrency: usize) -> Self {
        self.max_peers = max_peers.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_pacer(mut self, pacer: CallPacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn select_peers(&self, primary: &Symbol, request: &PeerRequest) -> PeerSelection {
        let limit = request.limit.min(self.max_peers);
        let base = primary.base();

        let (sector, mut candidates) = match &request.criterion {
            PeerCriterion::Explicit(peers) => (None, peers.clone()),
            PeerCriterion::Sector(sector) => {
                let sector = sector
                    .clone()
                    .or_else(|| self.universe.sector_of(base).map(str::to_owned));
                let members = sector
                    .as_deref()
                    .map(|sector| self.universe.sector_peers(sector, base))
                    .unwrap_or_default();
                (sector, members)
            }
        };

        let used_fallback =
            matches!(request.criterion, PeerCriterion::Sector(_)) && candidates.is_empty();
        if used_fallback {
            candidates = self.universe.fallback().to_vec();
        }

        let mut seen = BTreeSet::new();
        let peers = candidates
            .iter()
            .map(|raw| self.normalizer.normalize(raw))
            .filter(|peer| peer.base() != base)
            .filter(|peer| seen.insert(peer.base().to_owned()))
            .take(limit)
            .collect();

        PeerSelection {
            sector,
            peers,
            used_fallback,
        }
    }

    /// Compares `primary` with its peers. A peer that yields no ratios is left out
    /// of every metric and reported as `peer.unavailable`.
    pub async fn compare(&self, primary: &RatioSet, request: &PeerRequest) -> PeerAnalysis {
        let selection = self.select_peers(&primary.symbol, request);
        let fetched = self
            .pacer
            .fan_out(self.concurrency, selection.peers.iter().cloned(), |peer| async move {
                let set = self.aggregator.aggregate(&peer).await;
                (peer, set)
            })
            .await;

        let mut errors = Vec::new();
        let mut available = Vec::with_capacity(fetched.len());
        for (peer, set) in fetched {
            if set.is_empty() {
                let cause = set
                    .errors
                    .first()
                    .map(|error| error.code.clone())
                    .unwrap_or_else(|| String::from("no data"));
                debug!(peer = %peer, cause = %cause, "peer excluded from comparison");
                errors.push(
                    ErrorDetail::new(
                        PEER_UNAVAILABLE,
                        format!("peer '{}' returned no usable ratios ({cause})", peer.base()),
                    )
                    .with_symbol(peer.base()),
                );
            } else {
                available.push((peer, set));
            }
        }

        let comparisons = self
            .metrics
            .iter()
            .filter_map(|metric| {
                let primary_value = primary.value(*metric)?;
                let peer_values = available
                    .iter()
                    .filter_map(|(peer, set)| Some((peer.base().to_owned(), set.value(*metric)?)))
                    .collect::<BTreeMap<_, _>>();
                compare_metric(*metric, primary_value, peer_values)
            })
            .collect::<Vec<_>>();

        let above_average = comparisons
            .iter()
            .filter(|comparison| comparison.standing == Standing::AboveAverage)
            .count();
        let performance = PeerPerformance::from_counts(above_average, comparisons.len());

        info!(
            symbol = %primary.symbol,
            peers = selection.peers.len(),
            fetched = available.len(),
            metrics = comparisons.len(),
            "peer comparison finished"
        );

        PeerAnalysis {
            sector: selection.sector,
            peers: selection
                .peers
                .iter()
                .map(|peer| peer.base().to_owned())
                .collect(),
            used_fallback: selection.used_fallback,
            comparisons,
            above_average,
            performance,
            errors,
        }
    }
}
