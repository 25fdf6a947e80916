use std::time::Duration;

use crate::retry::RetryConfig;
use crate::ProviderId;

/// Per-provider call policy: attempt timeout and retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl ProviderPolicy {
    /// FMP free tier: three attempts, one second base delay doubling per retry.
    pub fn fmp_default() -> Self {
        Self {
            provider_id: ProviderId::Fmp,
            timeout: Duration::from_secs(10),
            retry: RetryConfig::exponential(2, Duration::from_secs(1), Duration::from_secs(8)),
        }
    }

    pub fn yahoo_default() -> Self {
        Self {
            provider_id: ProviderId::Yahoo,
            timeout: Duration::from_secs(10),
            retry: RetryConfig::exponential(2, Duration::from_millis(500), Duration::from_secs(4)),
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Fmp => Self::fmp_default(),
            ProviderId::Yahoo => Self::yahoo_default(),
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis().min(u128::from(u64::MAX)) as u64
    }
}
