//! Report assembly and the engine facade.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::{FmpAdapter, YahooAdapter};
use crate::aggregator::{RatioAggregator, RouteResult};
use crate::calendar::{MarketCalendar, MarketStatus};
use crate::config::EngineConfig;
use crate::data_source::RatioSource;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::outcome::ErrorDetail;
use crate::overview::{BatchQuotes, MarketOverview, QuoteBoard};
use crate::peers::{PeerAnalysis, PeerComparator, PeerRequest};
use crate::provider::ProviderClient;
use crate::scoring::{HealthScore, HealthScorer};
use crate::store::SnapshotStore;
use crate::throttling::CallPacer;
use crate::{
    BarSeries, HistoryRange, ProviderId, Quote, RatioSet, Symbol, SymbolNormalizer, UtcDateTime,
    ValidationError,
};

pub const HEALTH_SKIPPED: &str = "health.skipped";
pub const PEERS_SKIPPED: &str = "peers.skipped";
pub const STORE_READ: &str = "store.read";
pub const STORE_WRITE: &str = "store.write";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub symbol: String,
    /// `None` skips peer comparison.
    pub peers: Option<PeerRequest>,
}

impl AnalysisRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            peers: Some(PeerRequest::default()),
        }
    }

    pub fn with_peers(mut self, peers: PeerRequest) -> Self {
        self.peers = Some(peers);
        self
    }

    pub fn without_peers(mut self) -> Self {
        self.peers = None;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuality {
    pub ratios_available: bool,
    pub health_available: bool,
    pub peers_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub request_id: Uuid,
    pub generated_at: UtcDateTime,
    pub symbol: Symbol,
    pub ratios: RatioSet,
    /// True when `ratios` came from the store rather than a live fetch.
    pub from_store: bool,
    pub health: Option<HealthScore>,
    pub peers: Option<PeerAnalysis>,
    pub market: MarketStatus,
    pub errors: Vec<ErrorDetail>,
    pub quality: DataQuality,
}

impl Report {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Composes ratios, score, peers and market status into one [`Report`].
///
/// Provider failures never fail assembly; they end up in `Report::errors`.
#[derive(Clone)]
pub struct ReportAssembler {
    normalizer: SymbolNormalizer,
    aggregator: Arc<RatioAggregator>,
    scorer: HealthScorer,
    comparator: PeerComparator,
    calendar: MarketCalendar,
    store: Option<Arc<dyn SnapshotStore>>,
    store_max_age: Duration,
}

impl ReportAssembler {
    pub fn new(
        normalizer: SymbolNormalizer,
        aggregator: Arc<RatioAggregator>,
        scorer: HealthScorer,
        comparator: PeerComparator,
        calendar: MarketCalendar,
    ) -> Self {
        Self {
            normalizer,
            aggregator,
            scorer,
            comparator,
            calendar,
            store: None,
            store_max_age: Duration::ZERO,
        }
    }

    /// Serves ratio sets younger than `max_age` from `store` and writes fresh results back.
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>, max_age: Duration) -> Self {
        self.store = Some(store);
        self.store_max_age = max_age;
        self
    }

    /// Rejects malformed input before any provider or store is touched.
    pub fn validate(&self, request: &AnalysisRequest) -> Result<Symbol, ValidationError> {
        let symbol = self.normalizer.parse(&request.symbol)?;
        if let Some(peers) = &request.peers {
            peers.validate()?;
        }
        Ok(symbol)
    }

    pub async fn assemble(&self, request: &AnalysisRequest) -> Result<Report, ValidationError> {
        let symbol = self.validate(request)?;
        let request_id = Uuid::new_v4();
        let request_tag = request_id.to_string();
        let mut errors = Vec::new();

        let (ratios, from_store) = match self.load_stored(&symbol, &mut errors).await {
            Some(ratios) => (ratios, true),
            None => (self.aggregator.aggregate(&symbol).await, false),
        };
        errors.extend(ratios.errors.iter().cloned());
        let ratios_available = !ratios.is_empty();

        let health = if ratios_available {
            Some(self.scorer.score(&ratios))
        } else {
            errors.push(
                ErrorDetail::new(HEALTH_SKIPPED, "no ratios available to score")
                    .with_symbol(symbol.base()),
            );
            None
        };

        let peers = match &request.peers {
            Some(peer_request) if ratios_available => {
                let analysis = self.comparator.compare(&ratios, peer_request).await;
                errors.extend(analysis.errors.iter().cloned());
                Some(analysis)
            }
            Some(_) => {
                errors.push(
                    ErrorDetail::new(PEERS_SKIPPED, "no ratios available to compare with peers")
                        .with_symbol(symbol.base()),
                );
                None
            }
            None => None,
        };

        if ratios_available && !from_store {
            self.persist(&request_tag, &ratios, health, &mut errors).await;
        }

        let quality = DataQuality {
            ratios_available,
            health_available: health.is_some(),
            peers_available: peers.as_ref().is_some_and(PeerAnalysis::is_available),
        };
        let report = Report {
            request_id,
            generated_at: UtcDateTime::now(),
            symbol,
            ratios,
            from_store,
            health,
            peers,
            market: self.calendar.status_now(),
            errors,
            quality,
        };

        info!(
            request_id = %report.request_id,
            symbol = %report.symbol,
            grade = report.health.map(|score| score.grade.as_str()).unwrap_or("-"),
            from_store = report.from_store,
            errors = report.errors.len(),
            "report assembled"
        );
        Ok(report)
    }

    async fn load_stored(&self, symbol: &Symbol, errors: &mut Vec<ErrorDetail>) -> Option<RatioSet> {
        let store = Arc::clone(self.store.as_ref()?);
        if self.store_max_age.is_zero() {
            return None;
        }
        let max_age = self.store_max_age;
        let lookup = symbol.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            store
                .load_fresh(&lookup, max_age, UtcDateTime::now())
                .map_err(|error| error.to_string())
        })
        .await
        .unwrap_or_else(|join| Err(format!("store read task failed: {join}")));

        match loaded {
            Ok(found) => found.filter(|ratios| !ratios.is_empty()),
            Err(error) => {
                warn!(symbol = %symbol, error = %error, "store read failed, fetching live");
                errors.push(ErrorDetail::new(STORE_READ, error).with_symbol(symbol.base()));
                None
            }
        }
    }

    async fn persist(
        &self,
        request_id: &str,
        ratios: &RatioSet,
        health: Option<HealthScore>,
        errors: &mut Vec<ErrorDetail>,
    ) {
        let Some(store) = self.store.as_ref().map(Arc::clone) else {
            return;
        };
        let request_id = request_id.to_owned();
        let ratios = ratios.clone();
        let base = ratios.symbol.base().to_owned();
        let written = tokio::task::spawn_blocking(move || {
            store
                .save_ratios(&request_id, &ratios)
                .and_then(|snapshot_id| match health {
                    Some(score) => store.save_health(
                        &request_id,
                        &snapshot_id,
                        &ratios.symbol,
                        &score,
                        UtcDateTime::now(),
                    ),
                    None => Ok(()),
                })
                .map_err(|error| error.to_string())
        })
        .await
        .unwrap_or_else(|join| Err(format!("store write task failed: {join}")));

        if let Err(error) = written {
            warn!(symbol = %base, error = %error, "store write failed");
            errors.push(ErrorDetail::new(STORE_WRITE, error).with_symbol(base));
        }
    }
}

/// Fully wired engine: adapters, aggregator, scorer, comparator and calendar
/// built from one [`EngineConfig`].
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    normalizer: SymbolNormalizer,
    aggregator: Arc<RatioAggregator>,
    comparator: PeerComparator,
    board: QuoteBoard,
    assembler: ReportAssembler,
}

impl Engine {
    /// Engine backed by real HTTP.
    pub fn from_config(config: EngineConfig) -> Result<Self, ValidationError> {
        Self::with_http(config, Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_http(
        config: EngineConfig,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        let client = ProviderClient::with_budget(http, config.max_in_flight);
        let sources: Vec<Arc<dyn RatioSource>> = vec![
            Arc::new(FmpAdapter::new(
                client.clone(),
                config.fmp_policy.clone(),
                config.fmp_base_url.clone(),
                config.fmp_api_key.clone(),
            )),
            Arc::new(
                YahooAdapter::new(
                    client,
                    config.yahoo_policy.clone(),
                    config.yahoo_base_url.clone(),
                )
                .with_session(config.yahoo_crumb.clone(), config.yahoo_cookie.clone()),
            ),
        ];
        Ok(Self::with_sources(config, sources))
    }

    /// Engine over caller-supplied adapters.
    pub fn with_sources(config: EngineConfig, sources: Vec<Arc<dyn RatioSource>>) -> Self {
        let normalizer = SymbolNormalizer::new(config.venue.clone());
        let aggregator = Arc::new(
            RatioAggregator::new(sources, &config.provider_order)
                .with_trends(config.trend_metrics.clone(), config.ratio_history_limit),
        );
        let comparator = PeerComparator::new(
            Arc::clone(&aggregator),
            normalizer.clone(),
            config.universe.clone(),
        )
        .with_metrics(config.peer_metrics.clone())
        .with_limits(config.max_peers, config.peer_concurrency)
        .with_pacer(CallPacer::new(config.peer_spacing));
        let board = QuoteBoard::new(
            Arc::clone(&aggregator),
            normalizer.clone(),
            config.universe.clone(),
        )
        .with_limits(config.max_batch, config.peer_concurrency)
        .with_pacer(CallPacer::new(config.peer_spacing));
        let assembler = ReportAssembler::new(
            normalizer.clone(),
            Arc::clone(&aggregator),
            HealthScorer::new(config.scoring.clone()),
            comparator.clone(),
            config.calendar,
        );

        Self {
            config,
            normalizer,
            aggregator,
            comparator,
            board,
            assembler,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.assembler = self
            .assembler
            .with_store(store, self.config.store_max_age);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &SymbolNormalizer {
        &self.normalizer
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<Report, ValidationError> {
        self.assembler.assemble(request).await
    }

    pub async fn ratios(&self, symbol: &str) -> Result<RatioSet, ValidationError> {
        let symbol = self.normalizer.parse(symbol)?;
        Ok(self.aggregator.aggregate(&symbol).await)
    }

    /// Primary ratios plus peer comparison, without scoring.
    pub async fn peers(
        &self,
        symbol: &str,
        request: &PeerRequest,
    ) -> Result<(RatioSet, PeerAnalysis), ValidationError> {
        let symbol = self.normalizer.parse(symbol)?;
        request.validate()?;
        let primary = self.aggregator.aggregate(&symbol).await;
        let analysis = self.comparator.compare(&primary, request).await;
        Ok((primary, analysis))
    }

    pub async fn quote(&self, symbol: &str) -> Result<(Symbol, RouteResult<Quote>), ValidationError> {
        let symbol = self.normalizer.parse(symbol)?;
        let routed = self.aggregator.route_quote(&symbol).await;
        Ok((symbol, routed))
    }

    pub async fn price_history(
        &self,
        symbol: &str,
        days: u32,
    ) -> Result<(Symbol, RouteResult<BarSeries>), ValidationError> {
        let symbol = self.normalizer.parse(symbol)?;
        let range = HistoryRange::days(days)?;
        let routed = self.aggregator.route_price_history(&symbol, range).await;
        Ok((symbol, routed))
    }

    /// Gainers, losers and high-volume listings across a universe sector.
    pub async fn market_overview(&self, sector: &str) -> Result<MarketOverview, ValidationError> {
        self.board.overview(sector).await
    }

    /// Quotes several symbols; one failing symbol does not affect the others.
    pub async fn quote_batch<S: AsRef<str>>(
        &self,
        symbols: &[S],
    ) -> Result<BatchQuotes, ValidationError> {
        self.board.batch(symbols).await
    }

    pub fn market_status(&self) -> MarketStatus {
        self.config.calendar.status_now()
    }

    pub fn provider_order(&self) -> &[ProviderId] {
        self.aggregator.order()
    }
}
