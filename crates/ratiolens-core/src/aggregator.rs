//! Ordered provider fallback.
//!
//! Every endpoint goes through [`RatioAggregator::route_endpoint`]: providers are
//! tried once each in preference order and the first acceptable payload is adopted
//! as a whole. Failures are collected as [`ErrorDetail`] records, never raised.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::data_source::{Endpoint, RatioSource, SourceFuture};
use crate::outcome::{ErrorDetail, FetchOutcome};
use crate::{
    BarSeries, HistoryRange, Metric, ProviderId, Quote, RatioSet, RatioSnapshot, Symbol, Trend,
    UtcDateTime,
};

pub const NO_USABLE_FIELDS: &str = "provider.no_usable_fields";

/// Payload adopted from the first acceptable provider.
#[derive(Debug, Clone)]
pub struct RouteSuccess<T> {
    pub data: T,
    pub selected_source: ProviderId,
    pub fetched_at: UtcDateTime,
    pub source_chain: Vec<ProviderId>,
    pub errors: Vec<ErrorDetail>,
}

/// Every candidate failed or was skipped.
#[derive(Debug, Clone)]
pub struct RouteFailure {
    pub source_chain: Vec<ProviderId>,
    pub errors: Vec<ErrorDetail>,
}

pub type RouteResult<T> = Result<RouteSuccess<T>, RouteFailure>;

/// Produces provenance-tagged [`RatioSet`]s from an ordered provider list.
#[derive(Clone)]
pub struct RatioAggregator {
    sources: HashMap<ProviderId, Arc<dyn RatioSource>>,
    order: Vec<ProviderId>,
    trend_metrics: Vec<Metric>,
    history_limit: usize,
}

impl RatioAggregator {
    /// `order` is the preference list; duplicates are dropped.
    pub fn new(sources: Vec<Arc<dyn RatioSource>>, order: &[ProviderId]) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| (source.id(), source))
            .collect();
        Self {
            sources,
            order: dedupe_chain(order),
            trend_metrics: vec![Metric::Roe, Metric::NetMargin],
            history_limit: 5,
        }
    }

    /// Metrics that get a period-over-period trend from the history endpoint.
    pub fn with_trends(mut self, metrics: Vec<Metric>, history_limit: usize) -> Self {
        self.trend_metrics = metrics;
        self.history_limit = history_limit;
        self
    }

    pub fn order(&self) -> &[ProviderId] {
        &self.order
    }

    /// One aggregation pass. Always returns a set; when every provider fails all
    /// categories are empty and the failures are listed in `errors`.
    pub async fn aggregate(&self, symbol: &Symbol) -> RatioSet {
        let mut set = RatioSet::empty(symbol.clone());
        let routed = self
            .route_endpoint(
                Endpoint::Ratios,
                symbol,
                |source, symbol| source.current_ratios(symbol),
                RatioSnapshot::is_usable,
            )
            .await;

        match routed {
            Ok(success) => {
                set.adopt(&success.data, success.selected_source, success.fetched_at);
                set.providers_attempted = success.source_chain;
                set.errors = success.errors;

                let first_preference = set.providers_attempted.len() == 1;
                if first_preference && !self.trend_metrics.is_empty() {
                    self.enrich_trends(&mut set, success.selected_source).await;
                }
                info!(
                    symbol = %symbol,
                    provider = %success.selected_source,
                    metrics = set.populated().count(),
                    trends = set.trends.len(),
                    "ratios aggregated"
                );
            }
            Err(failure) => {
                set.providers_attempted = failure.source_chain;
                set.errors = failure.errors;
                warn!(
                    symbol = %symbol,
                    errors = set.errors.len(),
                    "no provider produced usable ratios"
                );
            }
        }
        set
    }

    /// Latest quote through the same fallback order.
    pub async fn route_quote(&self, symbol: &Symbol) -> RouteResult<Quote> {
        self.route_endpoint(
            Endpoint::Quote,
            symbol,
            |source, symbol| source.quote(symbol),
            |_| true,
        )
        .await
    }

    /// Daily bars; an empty series from a provider is accepted as "no data".
    pub async fn route_price_history(
        &self,
        symbol: &Symbol,
        range: HistoryRange,
    ) -> RouteResult<BarSeries> {
        self.route_endpoint(
            Endpoint::PriceHistory,
            symbol,
            move |source, symbol| source.price_history(symbol, range),
            |_| true,
        )
        .await
    }

    async fn enrich_trends(&self, set: &mut RatioSet, provider: ProviderId) {
        let Some(source) = self.sources.get(&provider) else {
            return;
        };
        if !source.capabilities().supports(Endpoint::RatioHistory) {
            return;
        }

        let outcome = source.ratio_history(&set.symbol, self.history_limit).await;
        match outcome {
            FetchOutcome::Success { payload, .. } => {
                let (Some(current), Some(prior)) = (payload.first(), payload.get(1)) else {
                    debug!(symbol = %set.symbol, rows = payload.len(), "not enough history for trends");
                    return;
                };
                for metric in &self.trend_metrics {
                    let trend = current
                        .get(*metric)
                        .zip(prior.get(*metric))
                        .and_then(|(current, prior)| Trend::between(current, prior, provider));
                    if let Some(trend) = trend {
                        set.trends.insert(*metric, trend);
                    }
                }
            }
            FetchOutcome::Failure { detail, .. } => {
                debug!(symbol = %set.symbol, provider = %provider, "trend enrichment failed: {detail}");
                set.errors.push(detail);
            }
        }
    }

    async fn route_endpoint<T, F, A>(
        &self,
        endpoint: Endpoint,
        symbol: &Symbol,
        invoke: F,
        acceptable: A,
    ) -> RouteResult<T>
    where
        F: for<'a> Fn(&'a dyn RatioSource, &'a Symbol) -> SourceFuture<'a, T>,
        A: Fn(&T) -> bool,
    {
        let mut source_chain = Vec::with_capacity(self.order.len());
        let mut errors = Vec::new();

        for provider in &self.order {
            let provider = *provider;
            source_chain.push(provider);

            let Some(source) = self.sources.get(&provider) else {
                errors.push(
                    ErrorDetail::new(
                        "provider.not_registered",
                        format!("no adapter registered for '{provider}'"),
                    )
                    .with_provider(provider)
                    .with_symbol(symbol.base()),
                );
                continue;
            };
            if !source.capabilities().supports(endpoint) {
                let outcome: FetchOutcome<()> =
                    FetchOutcome::unsupported(provider, endpoint.as_str()).for_symbol(symbol.base());
                if let FetchOutcome::Failure { detail, .. } = outcome {
                    errors.push(detail);
                }
                continue;
            }

            match invoke(source.as_ref(), symbol).await {
                FetchOutcome::Success {
                    payload,
                    provider,
                    fetched_at,
                } if acceptable(&payload) => {
                    if !errors.is_empty() {
                        warn!(
                            symbol = %symbol,
                            endpoint = %endpoint,
                            provider = %provider,
                            failed = errors.len(),
                            "fallback provider succeeded"
                        );
                    }
                    return Ok(RouteSuccess {
                        data: payload,
                        selected_source: provider,
                        fetched_at,
                        source_chain,
                        errors,
                    });
                }
                FetchOutcome::Success { provider, .. } => {
                    warn!(symbol = %symbol, endpoint = %endpoint, provider = %provider, "response held no usable fields");
                    errors.push(
                        ErrorDetail::new(
                            NO_USABLE_FIELDS,
                            format!("'{provider}' returned {endpoint} without any usable field"),
                        )
                        .with_provider(provider)
                        .with_symbol(symbol.base()),
                    );
                }
                FetchOutcome::Failure { detail, .. } => {
                    warn!(symbol = %symbol, endpoint = %endpoint, provider = %provider, code = %detail.code, "provider failed, trying next");
                    errors.push(detail);
                }
            }
        }

        if errors.is_empty() {
            errors.push(
                ErrorDetail::new(
                    "provider.no_candidate",
                    format!("no providers configured for endpoint '{endpoint}'"),
                )
                .with_symbol(symbol.base()),
            );
        }

        Err(RouteFailure {
            source_chain,
            errors,
        })
    }
}

fn dedupe_chain(chain: &[ProviderId]) -> Vec<ProviderId> {
    let mut seen = HashSet::new();
    chain
        .iter()
        .copied()
        .filter(|provider| seen.insert(*provider))
        .collect()
}
