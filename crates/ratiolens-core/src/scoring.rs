//! Deterministic 0-100 financial health score.
//!
//! Each of the five categories scores 0-20 from piecewise band tables. The
//! first matching band wins and a value that matches no band scores 0.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Metric, RatioCategoryKind, RatioSet};

pub const CATEGORY_MAX: u8 = 20;

/// One half of a band edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Edge {
    Unbounded,
    Inclusive(f64),
    Exclusive(f64),
}

/// Interval of metric values worth a fixed number of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeBand {
    pub lower: Edge,
    pub upper: Edge,
    pub points: u8,
}

impl RangeBand {
    pub const fn new(lower: Edge, upper: Edge, points: u8) -> Self {
        Self {
            lower,
            upper,
            points,
        }
    }

    /// `value > min`
    pub const fn above(min: f64, points: u8) -> Self {
        Self::new(Edge::Exclusive(min), Edge::Unbounded, points)
    }

    /// `value >= min`
    pub const fn at_least(min: f64, points: u8) -> Self {
        Self::new(Edge::Inclusive(min), Edge::Unbounded, points)
    }

    /// `min <= value <= max`
    pub const fn within(min: f64, max: f64, points: u8) -> Self {
        Self::new(Edge::Inclusive(min), Edge::Inclusive(max), points)
    }

    /// Every finite value.
    pub const fn any(points: u8) -> Self {
        Self::new(Edge::Unbounded, Edge::Unbounded, points)
    }

    pub fn contains(&self, value: f64) -> bool {
        let lower_ok = match self.lower {
            Edge::Unbounded => true,
            Edge::Inclusive(min) => value >= min,
            Edge::Exclusive(min) => value > min,
        };
        let upper_ok = match self.upper {
            Edge::Unbounded => true,
            Edge::Inclusive(max) => value <= max,
            Edge::Exclusive(max) => value < max,
        };
        lower_ok && upper_ok
    }
}

/// Ordered list of bands for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandTable {
    bands: Vec<RangeBand>,
}

impl BandTable {
    pub fn new(bands: Vec<RangeBand>) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &[RangeBand] {
        &self.bands
    }

    /// Points for `value`; missing and non-finite values score 0.
    pub fn score(&self, value: Option<f64>) -> u8 {
        let Some(value) = value.filter(|value| value.is_finite()) else {
            return 0;
        };
        self.bands
            .iter()
            .find(|band| band.contains(value))
            .map_or(0, |band| band.points)
    }
}

/// Threshold tables for every scored metric.
///
/// ROE and net margin bands are expressed in percent; the scorer multiplies
/// the stored fractions by 100 before looking them up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTable {
    pub roe_pct: BandTable,
    pub net_margin_pct: BandTable,
    pub current_ratio: BandTable,
    pub quick_ratio: BandTable,
    pub debt_to_equity: BandTable,
    pub pe_ratio: BandTable,
    pub pb_ratio: BandTable,
    pub asset_turnover: BandTable,
    /// Efficiency subscore when asset turnover is unavailable.
    pub efficiency_when_missing: u8,
}

impl Default for ScoringTable {
    fn default() -> Self {
        use Edge::{Exclusive, Inclusive};

        Self {
            roe_pct: BandTable::new(vec![
                RangeBand::above(20.0, 10),
                RangeBand::above(15.0, 8),
                RangeBand::above(10.0, 6),
                RangeBand::above(5.0, 4),
            ]),
            net_margin_pct: BandTable::new(vec![
                RangeBand::above(15.0, 10),
                RangeBand::above(10.0, 8),
                RangeBand::above(5.0, 6),
                RangeBand::above(0.0, 4),
            ]),
            current_ratio: BandTable::new(vec![
                RangeBand::within(1.5, 3.0, 10),
                RangeBand::new(Inclusive(1.0), Exclusive(1.5), 7),
                RangeBand::above(3.0, 6),
                RangeBand::new(Inclusive(0.8), Exclusive(1.0), 4),
            ]),
            quick_ratio: BandTable::new(vec![
                RangeBand::at_least(1.0, 10),
                RangeBand::at_least(0.7, 7),
                RangeBand::at_least(0.5, 4),
            ]),
            debt_to_equity: BandTable::new(vec![
                RangeBand::within(0.0, 0.3, 20),
                RangeBand::new(Exclusive(0.3), Inclusive(0.6), 15),
                RangeBand::new(Exclusive(0.6), Inclusive(1.0), 10),
                RangeBand::new(Exclusive(1.0), Inclusive(2.0), 5),
            ]),
            pe_ratio: BandTable::new(vec![
                RangeBand::within(10.0, 20.0, 10),
                RangeBand::new(Inclusive(8.0), Exclusive(10.0), 8),
                RangeBand::new(Exclusive(20.0), Inclusive(25.0), 8),
                RangeBand::new(Inclusive(5.0), Exclusive(8.0), 6),
                RangeBand::new(Exclusive(25.0), Inclusive(30.0), 6),
                RangeBand::above(30.0, 2),
            ]),
            pb_ratio: BandTable::new(vec![
                RangeBand::within(1.0, 3.0, 10),
                RangeBand::new(Inclusive(0.5), Exclusive(1.0), 8),
                RangeBand::new(Exclusive(3.0), Inclusive(5.0), 8),
                RangeBand::above(5.0, 4),
            ]),
            asset_turnover: BandTable::new(vec![
                RangeBand::at_least(1.0, 20),
                RangeBand::at_least(0.75, 15),
                RangeBand::at_least(0.5, 10),
                RangeBand::any(5),
            ]),
            efficiency_when_missing: 10,
        }
    }
}

/// Letter grade derived from the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub const fn from_total(total: u8) -> Self {
        match total {
            80.. => Self::A,
            70..=79 => Self::B,
            60..=69 => Self::C,
            50..=59 => Self::D,
            _ => Self::F,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::A => "Excellent",
            Self::B => "Good",
            Self::C => "Fair",
            Self::D => "Poor",
            Self::F => "Very Poor",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }
}

impl Display for Grade {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative read of one category subscore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Strong,
    Solid,
    Adequate,
    Weak,
}

impl Assessment {
    pub const fn for_subscore(subscore: u8) -> Self {
        match subscore {
            16.. => Self::Strong,
            12..=15 => Self::Solid,
            8..=11 => Self::Adequate,
            _ => Self::Weak,
        }
    }
}

/// Composite score. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthScore {
    pub profitability: u8,
    pub liquidity: u8,
    pub leverage: u8,
    pub valuation: u8,
    pub efficiency: u8,
    pub total: u8,
    pub grade: Grade,
}

impl HealthScore {
    fn from_subscores(
        profitability: u8,
        liquidity: u8,
        leverage: u8,
        valuation: u8,
        efficiency: u8,
    ) -> Self {
        let [profitability, liquidity, leverage, valuation, efficiency] =
            [profitability, liquidity, leverage, valuation, efficiency]
                .map(|subscore| subscore.min(CATEGORY_MAX));
        let total = profitability + liquidity + leverage + valuation + efficiency;
        Self {
            profitability,
            liquidity,
            leverage,
            valuation,
            efficiency,
            total,
            grade: Grade::from_total(total),
        }
    }

    pub const fn subscore(&self, kind: RatioCategoryKind) -> u8 {
        match kind {
            RatioCategoryKind::Profitability => self.profitability,
            RatioCategoryKind::Liquidity => self.liquidity,
            RatioCategoryKind::Leverage => self.leverage,
            RatioCategoryKind::Valuation => self.valuation,
            RatioCategoryKind::Efficiency => self.efficiency,
        }
    }

    pub fn assessment(&self, kind: RatioCategoryKind) -> Assessment {
        Assessment::for_subscore(self.subscore(kind))
    }

    /// Categories scoring strong or solid.
    pub fn strengths(&self) -> Vec<RatioCategoryKind> {
        RatioCategoryKind::ALL
            .into_iter()
            .filter(|kind| {
                matches!(
                    self.assessment(*kind),
                    Assessment::Strong | Assessment::Solid
                )
            })
            .collect()
    }

    pub fn weaknesses(&self) -> Vec<RatioCategoryKind> {
        RatioCategoryKind::ALL
            .into_iter()
            .filter(|kind| self.assessment(*kind) == Assessment::Weak)
            .collect()
    }
}

/// Pure scorer over a [`ScoringTable`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthScorer {
    table: ScoringTable,
}

impl HealthScorer {
    pub fn new(table: ScoringTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ScoringTable {
        &self.table
    }

    pub fn score(&self, ratios: &RatioSet) -> HealthScore {
        let table = &self.table;
        let percent = |metric| ratios.value(metric).map(|fraction| fraction * 100.0);

        let profitability = table
            .roe_pct
            .score(percent(Metric::Roe))
            .saturating_add(table.net_margin_pct.score(percent(Metric::NetMargin)));
        let liquidity = table
            .current_ratio
            .score(ratios.value(Metric::CurrentRatio))
            .saturating_add(table.quick_ratio.score(ratios.value(Metric::QuickRatio)));
        let leverage = table
            .debt_to_equity
            .score(ratios.value(Metric::DebtToEquity));
        let valuation = table
            .pe_ratio
            .score(ratios.value(Metric::PeRatio))
            .saturating_add(table.pb_ratio.score(ratios.value(Metric::PbRatio)));
        // Zero turnover is treated as missing.
        let efficiency = match ratios
            .value(Metric::AssetTurnover)
            .filter(|value| value.is_finite() && *value != 0.0)
        {
            Some(turnover) => table.asset_turnover.score(Some(turnover)),
            None => table.efficiency_when_missing,
        };

        HealthScore::from_subscores(profitability, liquidity, leverage, valuation, efficiency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProviderId, RatioSnapshot, SymbolNormalizer, UtcDateTime};

    fn ratios(snapshot: RatioSnapshot) -> RatioSet {
        let mut set = RatioSet::empty(SymbolNormalizer::default().normalize("ABC"));
        set.adopt(&snapshot, ProviderId::Yahoo, UtcDateTime::now());
        set
    }

    #[test]
    fn distressed_profile_grades_f() {
        let set = ratios(
            RatioSnapshot::new()
                .with(Metric::CurrentRatio, 0.8)
                .with(Metric::DebtToEquity, 2.5)
                .with(Metric::PeRatio, 35.0)
                .with(Metric::Roe, 0.04),
        );

        let score = HealthScorer::default().score(&set);

        assert_eq!(score.liquidity, 4);
        assert_eq!(score.leverage, 0);
        assert_eq!(score.valuation, 2);
        assert_eq!(score.profitability, 0);
        assert_eq!(score.efficiency, 10);
        assert_eq!(score.total, 16);
        assert_eq!(score.grade, Grade::F);
        assert!(score.weaknesses().contains(&RatioCategoryKind::Leverage));
    }

    #[test]
    fn strong_profile_hits_the_ceiling() {
        let set = ratios(
            RatioSnapshot::new()
                .with(Metric::Roe, 0.25)
                .with(Metric::NetMargin, 0.18)
                .with(Metric::CurrentRatio, 2.0)
                .with(Metric::QuickRatio, 1.2)
                .with(Metric::DebtToEquity, 0.2)
                .with(Metric::PeRatio, 15.0)
                .with(Metric::PbRatio, 2.0)
                .with(Metric::AssetTurnover, 1.1),
        );

        let score = HealthScorer::default().score(&set);

        assert_eq!(score.total, 100);
        assert_eq!(score.grade, Grade::A);
        assert_eq!(score.strengths().len(), 5);
    }

    #[test]
    fn empty_set_scores_only_the_efficiency_default() {
        let set = RatioSet::empty(SymbolNormalizer::default().normalize("ABC"));

        let score = HealthScorer::default().score(&set);

        assert_eq!(score.total, 10);
        assert_eq!(score.efficiency, 10);
    }

    #[test]
    fn band_edges_follow_the_table() {
        let table = ScoringTable::default();

        assert_eq!(table.current_ratio.score(Some(1.5)), 10);
        assert_eq!(table.current_ratio.score(Some(3.0)), 10);
        assert_eq!(table.current_ratio.score(Some(3.01)), 6);
        assert_eq!(table.current_ratio.score(Some(0.79)), 0);
        assert_eq!(table.debt_to_equity.score(Some(0.3)), 20);
        assert_eq!(table.debt_to_equity.score(Some(2.0)), 5);
        assert_eq!(table.debt_to_equity.score(Some(-0.5)), 0);
        assert_eq!(table.pe_ratio.score(Some(-4.0)), 0);
        assert_eq!(table.pe_ratio.score(Some(4.0)), 0);
        assert_eq!(table.pe_ratio.score(Some(22.0)), 8);
        assert_eq!(table.pb_ratio.score(Some(0.0)), 0);
        assert_eq!(table.asset_turnover.score(Some(0.1)), 5);
        assert_eq!(table.roe_pct.score(Some(20.0)), 8);
    }

    #[test]
    fn zero_asset_turnover_counts_as_missing() {
        let zero = ratios(RatioSnapshot::new().with(Metric::AssetTurnover, 0.0));
        let negative = ratios(RatioSnapshot::new().with(Metric::AssetTurnover, -0.2));

        let scorer = HealthScorer::default();

        assert_eq!(scorer.score(&zero).efficiency, 10);
        assert_eq!(scorer.score(&negative).efficiency, 5);
    }

    #[test]
    fn oversized_custom_bands_are_capped_instead_of_overflowing() {
        let table = ScoringTable {
            roe_pct: BandTable::new(vec![RangeBand::any(200)]),
            net_margin_pct: BandTable::new(vec![RangeBand::any(200)]),
            pe_ratio: BandTable::new(vec![RangeBand::any(u8::MAX)]),
            pb_ratio: BandTable::new(vec![RangeBand::any(u8::MAX)]),
            efficiency_when_missing: u8::MAX,
            ..ScoringTable::default()
        };
        let set = ratios(
            RatioSnapshot::new()
                .with(Metric::Roe, 0.1)
                .with(Metric::NetMargin, 0.1)
                .with(Metric::PeRatio, 12.0)
                .with(Metric::PbRatio, 1.4),
        );

        let score = HealthScorer::new(table).score(&set);

        assert_eq!(score.profitability, CATEGORY_MAX);
        assert_eq!(score.valuation, CATEGORY_MAX);
        assert_eq!(score.efficiency, CATEGORY_MAX);
        assert!(score.total <= 100);
    }

    #[test]
    fn grade_thresholds() {
        assert_eq!(Grade::from_total(80), Grade::A);
        assert_eq!(Grade::from_total(79), Grade::B);
        assert_eq!(Grade::from_total(60), Grade::C);
        assert_eq!(Grade::from_total(50), Grade::D);
        assert_eq!(Grade::from_total(49), Grade::F);
    }

    #[test]
    fn scores_stay_bounded_and_repeatable_across_a_grid() {
        let scorer = HealthScorer::default();
        let samples = [-5.0, 0.0, 0.3, 0.8, 1.0, 1.5, 2.5, 7.0, 18.0, 40.0, f64::NAN];

        for a in samples {
            for b in samples {
                let set = ratios(
                    RatioSnapshot::new()
                        .with(Metric::Roe, a)
                        .with(Metric::NetMargin, b)
                        .with(Metric::CurrentRatio, a)
                        .with(Metric::QuickRatio, b)
                        .with(Metric::DebtToEquity, a)
                        .with(Metric::PeRatio, b)
                        .with(Metric::PbRatio, a)
                        .with(Metric::AssetTurnover, b),
                );
                let first = scorer.score(&set);
                let second = scorer.score(&set);

                assert_eq!(first, second);
                for kind in RatioCategoryKind::ALL {
                    assert!(first.subscore(kind) <= CATEGORY_MAX);
                }
                assert!(first.total <= 100);
                assert_eq!(
                    first.total,
                    RatioCategoryKind::ALL
                        .into_iter()
                        .map(|kind| first.subscore(kind))
                        .sum::<u8>()
                );
            }
        }
    }
}
