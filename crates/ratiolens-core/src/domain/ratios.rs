use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::outcome::ErrorDetail;
use crate::{ProviderId, Symbol, UtcDateTime, ValidationError};

/// Themed group a metric belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioCategoryKind {
    Valuation,
    Profitability,
    Liquidity,
    Leverage,
    Efficiency,
}

impl RatioCategoryKind {
    pub const ALL: [Self; 5] = [
        Self::Valuation,
        Self::Profitability,
        Self::Liquidity,
        Self::Leverage,
        Self::Efficiency,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valuation => "valuation",
            Self::Profitability => "profitability",
            Self::Liquidity => "liquidity",
            Self::Leverage => "leverage",
            Self::Efficiency => "efficiency",
        }
    }
}

impl Display for RatioCategoryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of financial ratios the engine understands.
///
/// Margins and returns are fractions (`0.15` is 15%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PeRatio,
    ForwardPe,
    PbRatio,
    PsRatio,
    PegRatio,
    EvToEbitda,
    PriceToCashFlow,
    Roe,
    Roa,
    Roic,
    GrossMargin,
    OperatingMargin,
    NetMargin,
    CurrentRatio,
    QuickRatio,
    CashRatio,
    DebtToEquity,
    DebtToAssets,
    InterestCoverage,
    AssetTurnover,
    InventoryTurnover,
    ReceivablesTurnover,
    PayablesTurnover,
}

impl Metric {
    pub const ALL: [Self; 23] = [
        Self::PeRatio,
        Self::ForwardPe,
        Self::PbRatio,
        Self::PsRatio,
        Self::PegRatio,
        Self::EvToEbitda,
        Self::PriceToCashFlow,
        Self::Roe,
        Self::Roa,
        Self::Roic,
        Self::GrossMargin,
        Self::OperatingMargin,
        Self::NetMargin,
        Self::CurrentRatio,
        Self::QuickRatio,
        Self::CashRatio,
        Self::DebtToEquity,
        Self::DebtToAssets,
        Self::InterestCoverage,
        Self::AssetTurnover,
        Self::InventoryTurnover,
        Self::ReceivablesTurnover,
        Self::PayablesTurnover,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PeRatio => "pe_ratio",
            Self::ForwardPe => "forward_pe",
            Self::PbRatio => "pb_ratio",
            Self::PsRatio => "ps_ratio",
            Self::PegRatio => "peg_ratio",
            Self::EvToEbitda => "ev_to_ebitda",
            Self::PriceToCashFlow => "price_to_cash_flow",
            Self::Roe => "roe",
            Self::Roa => "roa",
            Self::Roic => "roic",
            Self::GrossMargin => "gross_margin",
            Self::OperatingMargin => "operating_margin",
            Self::NetMargin => "net_margin",
            Self::CurrentRatio => "current_ratio",
            Self::QuickRatio => "quick_ratio",
            Self::CashRatio => "cash_ratio",
            Self::DebtToEquity => "debt_to_equity",
            Self::DebtToAssets => "debt_to_assets",
            Self::InterestCoverage => "interest_coverage",
            Self::AssetTurnover => "asset_turnover",
            Self::InventoryTurnover => "inventory_turnover",
            Self::ReceivablesTurnover => "receivables_turnover",
            Self::PayablesTurnover => "payables_turnover",
        }
    }

    pub const fn category(self) -> RatioCategoryKind {
        match self {
            Self::PeRatio
            | Self::ForwardPe
            | Self::PbRatio
            | Self::PsRatio
            | Self::PegRatio
            | Self::EvToEbitda
            | Self::PriceToCashFlow => RatioCategoryKind::Valuation,
            Self::Roe
            | Self::Roa
            | Self::Roic
            | Self::GrossMargin
            | Self::OperatingMargin
            | Self::NetMargin => RatioCategoryKind::Profitability,
            Self::CurrentRatio | Self::QuickRatio | Self::CashRatio => RatioCategoryKind::Liquidity,
            Self::DebtToEquity | Self::DebtToAssets | Self::InterestCoverage => {
                RatioCategoryKind::Leverage
            }
            Self::AssetTurnover
            | Self::InventoryTurnover
            | Self::ReceivablesTurnover
            | Self::PayablesTurnover => RatioCategoryKind::Efficiency,
        }
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|metric| metric.as_str() == needle)
            .ok_or(ValidationError::InvalidMetric { value: needle })
    }
}

/// Flat metric map decoded from one provider response.
///
/// A key with a `None` value means the provider reported the field without a number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatioSnapshot {
    /// Reporting period label (fiscal date) for historical rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    pub values: BTreeMap<Metric, Option<f64>>,
}

impl RatioSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = Some(period.into());
        self
    }

    /// Records a metric; non-finite numbers are kept as "reported but missing".
    pub fn insert(&mut self, metric: Metric, value: Option<f64>) {
        self.values
            .insert(metric, value.filter(|number| number.is_finite()));
    }

    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.insert(metric, Some(value));
        self
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied().flatten()
    }

    pub fn populated_count(&self) -> usize {
        self.values.values().filter(|value| value.is_some()).count()
    }

    pub fn is_usable(&self) -> bool {
        self.populated_count() > 0
    }
}

/// Value plus provenance for a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: Option<f64>,
    pub source: ProviderId,
}

/// One themed group of metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioCategory {
    pub kind: RatioCategoryKind,
    pub metrics: BTreeMap<Metric, MetricValue>,
}

impl RatioCategory {
    pub fn empty(kind: RatioCategoryKind) -> Self {
        Self {
            kind,
            metrics: BTreeMap::new(),
        }
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).and_then(|entry| entry.value)
    }

    pub fn is_populated(&self) -> bool {
        self.metrics.values().any(|entry| entry.value.is_some())
    }
}

/// Derived period-over-period change for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub current: f64,
    pub prior: f64,
    /// `(current - prior) / prior * 100`, rounded to two decimals.
    pub percent: f64,
    pub provider: ProviderId,
}

impl Trend {
    /// Returns `None` when the prior value is zero.
    pub fn between(current: f64, prior: f64, provider: ProviderId) -> Option<Self> {
        if prior == 0.0 || current == 0.0 || !current.is_finite() || !prior.is_finite() {
            return None;
        }
        let percent = ((current - prior) / prior * 100.0 * 100.0).round() / 100.0;
        Some(Self {
            current,
            prior,
            percent,
            provider,
        })
    }
}

/// All ratios gathered for one symbol in one aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioSet {
    pub symbol: Symbol,
    pub valuation: RatioCategory,
    pub profitability: RatioCategory,
    pub liquidity: RatioCategory,
    pub leverage: RatioCategory,
    pub efficiency: RatioCategory,
    #[serde(default)]
    pub trends: BTreeMap<Metric, Trend>,
    /// Provider whose response was adopted, if any.
    pub adopted: Option<ProviderId>,
    pub providers_attempted: Vec<ProviderId>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
    pub as_of: UtcDateTime,
}

impl RatioSet {
    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            valuation: RatioCategory::empty(RatioCategoryKind::Valuation),
            profitability: RatioCategory::empty(RatioCategoryKind::Profitability),
            liquidity: RatioCategory::empty(RatioCategoryKind::Liquidity),
            leverage: RatioCategory::empty(RatioCategoryKind::Leverage),
            efficiency: RatioCategory::empty(RatioCategoryKind::Efficiency),
            trends: BTreeMap::new(),
            adopted: None,
            providers_attempted: Vec::new(),
            errors: Vec::new(),
            as_of: UtcDateTime::now(),
        }
    }

    /// Adopts a full snapshot from one provider; every metric carries that provider as source.
    pub fn adopt(&mut self, snapshot: &RatioSnapshot, provider: ProviderId, as_of: UtcDateTime) {
        for kind in RatioCategoryKind::ALL {
            self.category_mut(kind).metrics.clear();
        }
        for (metric, value) in &snapshot.values {
            self.category_mut(metric.category()).metrics.insert(
                *metric,
                MetricValue {
                    value: *value,
                    source: provider,
                },
            );
        }
        self.adopted = Some(provider);
        self.as_of = as_of;
    }

    pub fn category(&self, kind: RatioCategoryKind) -> &RatioCategory {
        match kind {
            RatioCategoryKind::Valuation => &self.valuation,
            RatioCategoryKind::Profitability => &self.profitability,
            RatioCategoryKind::Liquidity => &self.liquidity,
            RatioCategoryKind::Leverage => &self.leverage,
            RatioCategoryKind::Efficiency => &self.efficiency,
        }
    }

    fn category_mut(&mut self, kind: RatioCategoryKind) -> &mut RatioCategory {
        match kind {
            RatioCategoryKind::Valuation => &mut self.valuation,
            RatioCategoryKind::Profitability => &mut self.profitability,
            RatioCategoryKind::Liquidity => &mut self.liquidity,
            RatioCategoryKind::Leverage => &mut self.leverage,
            RatioCategoryKind::Efficiency => &mut self.efficiency,
        }
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.category(metric.category()).get(metric)
    }

    pub fn source_of(&self, metric: Metric) -> Option<ProviderId> {
        self.category(metric.category())
            .metrics
            .get(&metric)
            .map(|entry| entry.source)
    }

    /// True when no category holds a single usable number.
    pub fn is_empty(&self) -> bool {
        RatioCategoryKind::ALL
            .into_iter()
            .all(|kind| !self.category(kind).is_populated())
    }

    /// Iterates every populated metric with its provenance.
    pub fn populated(&self) -> impl Iterator<Item = (Metric, f64, ProviderId)> + '_ {
        RatioCategoryKind::ALL.into_iter().flat_map(move |kind| {
            self.category(kind)
                .metrics
                .iter()
                .filter_map(|(metric, entry)| entry.value.map(|value| (*metric, value, entry.source)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SymbolNormalizer;

    #[test]
    fn every_metric_round_trips_through_its_name() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>(), Ok(metric));
        }
    }

    #[test]
    fn adopt_distributes_metrics_into_categories_with_one_source() {
        let symbol = SymbolNormalizer::default().normalize("TD");
        let snapshot = RatioSnapshot::new()
            .with(Metric::PeRatio, 11.2)
            .with(Metric::Roe, 0.14)
            .with(Metric::CurrentRatio, 1.1);
        let mut set = RatioSet::empty(symbol);

        set.adopt(&snapshot, ProviderId::Yahoo, UtcDateTime::now());

        assert_eq!(set.valuation.get(Metric::PeRatio), Some(11.2));
        assert_eq!(set.profitability.get(Metric::Roe), Some(0.14));
        assert!(set.leverage.metrics.is_empty());
        assert!(set
            .populated()
            .all(|(_, _, provider)| provider == ProviderId::Yahoo));
        assert!(!set.is_empty());
    }

    #[test]
    fn null_only_snapshot_is_not_usable() {
        let mut snapshot = RatioSnapshot::new();
        snapshot.insert(Metric::PeRatio, None);
        snapshot.insert(Metric::PbRatio, Some(f64::NAN));

        assert!(!snapshot.is_usable());
        assert_eq!(snapshot.values.len(), 2);
    }

    #[test]
    fn trend_is_rounded_and_skips_zero_prior() {
        let trend = Trend::between(0.15, 0.12, ProviderId::Fmp).expect("trend");
        assert_eq!(trend.percent, 25.0);

        let trend = Trend::between(0.1, 0.3, ProviderId::Fmp).expect("trend");
        assert_eq!(trend.percent, -66.67);

        assert!(Trend::between(0.1, 0.0, ProviderId::Fmp).is_none());
    }
}
