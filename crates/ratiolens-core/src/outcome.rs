//! Tagged results for provider calls and the error records collected along the way.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{ProviderId, UtcDateTime};

/// Why a provider call did not produce a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused, reset, or a retryable HTTP status.
    Network,
    /// No response within the per-attempt timeout.
    Timeout,
    /// The provider explicitly reported an error or refused the request.
    Provider,
    /// Well-formed response without any rows.
    EmptyData,
    /// Response did not match the expected schema.
    Parse,
    /// The provider has no such endpoint.
    Unsupported,
}

impl FailureKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "provider.network",
            Self::Timeout => "provider.timeout",
            Self::Provider => "provider.error",
            Self::EmptyData => "provider.empty",
            Self::Parse => "provider.parse",
            Self::Unsupported => "provider.unsupported",
        }
    }

    /// Transient kinds are retried by the provider client; the rest fail fast.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::EmptyData)
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Structured error carried in ratio sets and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            provider: None,
            symbol: None,
            retryable: false,
        }
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl Display for ErrorDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.provider {
            Some(provider) => write!(f, "[{provider}] {} ({})", self.message, self.code),
            None => write!(f, "{} ({})", self.message, self.code),
        }
    }
}

/// Result of one logical provider call. Never both a payload and an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome<T> {
    Success {
        payload: T,
        provider: ProviderId,
        fetched_at: UtcDateTime,
    },
    Failure {
        kind: FailureKind,
        detail: ErrorDetail,
        provider: ProviderId,
        attempts: u32,
    },
}

impl<T> FetchOutcome<T> {
    pub fn success(provider: ProviderId, payload: T) -> Self {
        Self::Success {
            payload,
            provider,
            fetched_at: UtcDateTime::now(),
        }
    }

    pub fn failure(
        provider: ProviderId,
        kind: FailureKind,
        message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        let detail = ErrorDetail::new(kind.code(), message)
            .with_provider(provider)
            .with_retryable(kind.is_transient());
        Self::Failure {
            kind,
            detail,
            provider,
            attempts,
        }
    }

    pub fn unsupported(provider: ProviderId, operation: &str) -> Self {
        Self::failure(
            provider,
            FailureKind::Unsupported,
            format!("operation '{operation}' is not supported by '{provider}'"),
            0,
        )
    }

    pub const fn provider(&self) -> ProviderId {
        match self {
            Self::Success { provider, .. } | Self::Failure { provider, .. } => *provider,
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn map<U, F>(self, f: F) -> FetchOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success {
                payload,
                provider,
                fetched_at,
            } => FetchOutcome::Success {
                payload: f(payload),
                provider,
                fetched_at,
            },
            Self::Failure {
                kind,
                detail,
                provider,
                attempts,
            } => FetchOutcome::Failure {
                kind,
                detail,
                provider,
                attempts,
            },
        }
    }

    /// Attaches the symbol to the failure detail so reports can name it.
    pub fn for_symbol(self, symbol: &str) -> Self {
        match self {
            Self::Failure {
                kind,
                detail,
                provider,
                attempts,
            } => Self::Failure {
                kind,
                detail: detail.with_symbol(symbol),
                provider,
                attempts,
            },
            success => success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_timeout_and_empty_are_transient() {
        let transient = [FailureKind::Network, FailureKind::Timeout, FailureKind::EmptyData];
        let definitive = [FailureKind::Provider, FailureKind::Parse, FailureKind::Unsupported];

        assert!(transient.iter().all(|kind| kind.is_transient()));
        assert!(definitive.iter().all(|kind| !kind.is_transient()));
    }

    #[test]
    fn failure_detail_carries_provider_and_code() {
        let outcome: FetchOutcome<()> =
            FetchOutcome::failure(ProviderId::Fmp, FailureKind::Parse, "bad json", 1)
                .for_symbol("TD");

        let FetchOutcome::Failure { detail, attempts, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(detail.code, "provider.parse");
        assert_eq!(detail.provider, Some(ProviderId::Fmp));
        assert_eq!(detail.symbol.as_deref(), Some("TD"));
        assert!(!detail.retryable);
        assert_eq!(attempts, 1);
    }

    #[test]
    fn serializes_with_status_tag() {
        let outcome = FetchOutcome::success(ProviderId::Yahoo, 42_u32);
        let value = serde_json::to_value(&outcome).expect("serialize");

        assert_eq!(value["status"], "success");
        assert_eq!(value["provider"], "yahoo");
        assert_eq!(value["payload"], 42);
    }
}
