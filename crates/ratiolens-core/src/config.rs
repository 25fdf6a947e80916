use std::env;
use std::fmt::{Debug, Formatter};
use std::str::FromStr;
use std::time::Duration;

use crate::adapters::{FMP_DEFAULT_BASE_URL, YAHOO_DEFAULT_BASE_URL};
use crate::calendar::MarketCalendar;
use crate::peers::Universe;
use crate::provider_policy::ProviderPolicy;
use crate::scoring::ScoringTable;
use crate::source::parse_provider_order;
use crate::{Metric, ProviderId, ValidationError, VenueTable};

/// Immutable engine settings, fixed at construction.
#[derive(Clone)]
pub struct EngineConfig {
    pub fmp_api_key: String,
    pub fmp_base_url: String,
    pub yahoo_base_url: String,
    pub yahoo_crumb: Option<String>,
    pub yahoo_cookie: Option<String>,
    pub provider_order: Vec<ProviderId>,
    pub fmp_policy: ProviderPolicy,
    pub yahoo_policy: ProviderPolicy,
    /// Outbound calls allowed in flight across all providers.
    pub max_in_flight: usize,
    pub max_peers: usize,
    /// Symbols quoted by one batch request; extra symbols are skipped.
    pub max_batch: usize,
    pub peer_concurrency: usize,
    /// Minimum gap between sequential peer fetches.
    pub peer_spacing: Duration,
    /// Stored ratio sets younger than this are served instead of a live fetch.
    pub store_max_age: Duration,
    pub trend_metrics: Vec<Metric>,
    pub ratio_history_limit: usize,
    pub peer_metrics: Vec<Metric>,
    pub scoring: ScoringTable,
    pub universe: Universe,
    pub venue: VenueTable,
    pub calendar: MarketCalendar,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fmp_api_key: String::from("demo"),
            fmp_base_url: String::from(FMP_DEFAULT_BASE_URL),
            yahoo_base_url: String::from(YAHOO_DEFAULT_BASE_URL),
            yahoo_crumb: None,
            yahoo_cookie: None,
            provider_order: vec![ProviderId::Fmp, ProviderId::Yahoo],
            fmp_policy: ProviderPolicy::fmp_default(),
            yahoo_policy: ProviderPolicy::yahoo_default(),
            max_in_flight: 4,
            max_peers: 3,
            max_batch: 5,
            peer_concurrency: 1,
            peer_spacing: Duration::from_millis(250),
            store_max_age: Duration::from_secs(24 * 60 * 60),
            trend_metrics: vec![Metric::Roe, Metric::NetMargin],
            ratio_history_limit: 5,
            peer_metrics: vec![
                Metric::PeRatio,
                Metric::PbRatio,
                Metric::Roe,
                Metric::CurrentRatio,
                Metric::DebtToEquity,
            ],
            scoring: ScoringTable::default(),
            universe: Universe::default(),
            venue: VenueTable::default(),
            calendar: MarketCalendar::default(),
        }
    }
}

impl Debug for EngineConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("fmp_api_key", &"<redacted>")
            .field("fmp_base_url", &self.fmp_base_url)
            .field("yahoo_base_url", &self.yahoo_base_url)
            .field("yahoo_session", &self.yahoo_cookie.is_some())
            .field("provider_order", &self.provider_order)
            .field("max_in_flight", &self.max_in_flight)
            .field("max_peers", &self.max_peers)
            .field("max_batch", &self.max_batch)
            .field("peer_concurrency", &self.peer_concurrency)
            .field("peer_spacing", &self.peer_spacing)
            .field("store_max_age", &self.store_max_age)
            .finish_non_exhaustive()
    }
}

impl EngineConfig {
    /// Defaults overridden by `RATIOLENS_*` environment variables.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(key) = var("RATIOLENS_FMP_API_KEY").or_else(|| var("FMP_API_KEY")) {
            config.fmp_api_key = key;
        }
        if let Some(url) = var("RATIOLENS_FMP_BASE_URL") {
            config.fmp_base_url = url;
        }
        if let Some(url) = var("RATIOLENS_YAHOO_BASE_URL") {
            config.yahoo_base_url = url;
        }
        config.yahoo_crumb = var("RATIOLENS_YAHOO_CRUMB");
        config.yahoo_cookie = var("RATIOLENS_YAHOO_COOKIE");
        if let Some(order) = var("RATIOLENS_PROVIDER_ORDER") {
            config.provider_order = parse_provider_order(&order)?;
        }
        if let Some(value) = var("RATIOLENS_MAX_PEERS") {
            config.max_peers = parse_number("RATIOLENS_MAX_PEERS", &value)?;
        }
        if let Some(value) = var("RATIOLENS_MAX_BATCH") {
            config.max_batch = parse_number("RATIOLENS_MAX_BATCH", &value)?;
        }
        if let Some(value) = var("RATIOLENS_PEER_CONCURRENCY") {
            config.peer_concurrency = parse_number("RATIOLENS_PEER_CONCURRENCY", &value)?;
        }
        if let Some(value) = var("RATIOLENS_MAX_IN_FLIGHT") {
            config.max_in_flight = parse_number("RATIOLENS_MAX_IN_FLIGHT", &value)?;
        }
        if let Some(value) = var("RATIOLENS_PEER_SPACING_MS") {
            config.peer_spacing =
                Duration::from_millis(parse_number("RATIOLENS_PEER_SPACING_MS", &value)?);
        }
        if let Some(value) = var("RATIOLENS_STORE_MAX_AGE_SECS") {
            config.store_max_age =
                Duration::from_secs(parse_number("RATIOLENS_STORE_MAX_AGE_SECS", &value)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.provider_order.is_empty() {
            return Err(ValidationError::config("provider order must not be empty"));
        }
        if self.max_in_flight == 0 {
            return Err(ValidationError::config("max in-flight calls must be greater than zero"));
        }
        if self.max_peers == 0 {
            return Err(ValidationError::config("max peers must be greater than zero"));
        }
        if self.max_batch == 0 {
            return Err(ValidationError::config("max batch size must be greater than zero"));
        }
        if self.peer_concurrency == 0 {
            return Err(ValidationError::config("peer concurrency must be greater than zero"));
        }
        for (name, url) in [("fmp", &self.fmp_base_url), ("yahoo", &self.yahoo_base_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ValidationError::config(format!(
                    "{name} base url must be http(s): '{url}'"
                )));
            }
        }
        if self.fmp_policy.provider_id != ProviderId::Fmp
            || self.yahoo_policy.provider_id != ProviderId::Yahoo
        {
            return Err(ValidationError::config("provider policy assigned to the wrong provider"));
        }
        Ok(())
    }

    pub fn policy_for(&self, provider: ProviderId) -> &ProviderPolicy {
        match provider {
            ProviderId::Fmp => &self.fmp_policy,
            ProviderId::Yahoo => &self.yahoo_policy,
        }
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, ValidationError> {
    value
        .parse::<T>()
        .map_err(|_| ValidationError::config(format!("{name} must be a non-negative integer, got '{value}'")))
}
