//! Single-provider call execution: timeout, retry with backoff, outbound budget.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::http_client::{HttpClient, HttpErrorKind, HttpRequest};
use crate::outcome::{FailureKind, FetchOutcome};
use crate::provider_policy::ProviderPolicy;

/// Classification of a response body by a provider adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Payload(T),
    /// Structurally valid body without rows.
    Empty,
    /// The provider's own error payload.
    ProviderReported(String),
    /// Body does not match the expected schema.
    Malformed(String),
}

/// Describes one logical provider operation.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub operation: &'static str,
    pub symbol: String,
    pub request: HttpRequest,
}

impl ProviderCall {
    pub fn new(operation: &'static str, symbol: impl Into<String>, request: HttpRequest) -> Self {
        Self {
            operation,
            symbol: symbol.into(),
            request,
        }
    }
}

/// Executes provider calls against a shared transport and outbound-call budget.
#[derive(Clone)]
pub struct ProviderClient {
    http: Arc<dyn HttpClient>,
    outbound: Arc<Semaphore>,
}

impl ProviderClient {
    pub fn new(http: Arc<dyn HttpClient>, outbound: Arc<Semaphore>) -> Self {
        Self { http, outbound }
    }

    pub fn with_budget(http: Arc<dyn HttpClient>, max_in_flight: usize) -> Self {
        Self::new(http, Arc::new(Semaphore::new(max_in_flight.max(1))))
    }

    /// Number of outbound permits currently free.
    pub fn available_permits(&self) -> usize {
        self.outbound.available_permits()
    }

    /// Runs `call` until it succeeds, fails definitively, or the retry budget is spent.
    pub async fn fetch<T, D>(
        &self,
        policy: &ProviderPolicy,
        call: ProviderCall,
        decode: D,
    ) -> FetchOutcome<T>
    where
        D: Fn(&str) -> Decoded<T>,
    {
        let provider = policy.provider_id;
        let max_attempts = policy.retry.attempts();
        let mut attempt = 0_u32;

        loop {
            attempt += 1;
            debug!(
                provider = %provider,
                operation = call.operation,
                symbol = %call.symbol,
                attempt,
                url = %call.request.redacted_url(),
                "provider attempt"
            );

            let (kind, message) = match self.attempt_once(policy, &call).await {
                Ok(body) => match decode(&body) {
                    Decoded::Payload(payload) => {
                        return FetchOutcome::success(provider, payload);
                    }
                    Decoded::Empty => (
                        FailureKind::EmptyData,
                        format!("{} returned no data for '{}'", call.operation, call.symbol),
                    ),
                    Decoded::ProviderReported(message) => (FailureKind::Provider, message),
                    Decoded::Malformed(message) => (FailureKind::Parse, message),
                },
                Err(failure) => failure,
            };

            if attempt >= max_attempts || !policy.retry.should_retry(kind) {
                warn!(
                    provider = %provider,
                    operation = call.operation,
                    symbol = %call.symbol,
                    attempts = attempt,
                    code = kind.code(),
                    "provider call failed: {message}"
                );
                return FetchOutcome::failure(provider, kind, message, attempt)
                    .for_symbol(&call.symbol);
            }

            let delay = policy.retry.delay_for_attempt(attempt - 1);
            warn!(
                provider = %provider,
                operation = call.operation,
                symbol = %call.symbol,
                attempt,
                delay_ms = delay.as_millis() as u64,
                code = kind.code(),
                "transient provider failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One bounded attempt. The permit is held only for the duration of the request.
    async fn attempt_once(
        &self,
        policy: &ProviderPolicy,
        call: &ProviderCall,
    ) -> Result<String, (FailureKind, String)> {
        let _permit = self.outbound.acquire().await.map_err(|_| {
            (
                FailureKind::Network,
                String::from("outbound call budget is closed"),
            )
        })?;

        let request = call.request.clone().with_timeout_ms(policy.timeout_ms());
        let response = match tokio::time::timeout(policy.timeout, self.http.execute(request)).await {
            Err(_) => {
                return Err((
                    FailureKind::Timeout,
                    format!("no response within {}ms", policy.timeout_ms()),
                ))
            }
            Ok(Err(error)) => {
                let kind = match error.kind() {
                    HttpErrorKind::Timeout => FailureKind::Timeout,
                    HttpErrorKind::Connect | HttpErrorKind::Transport => FailureKind::Network,
                    HttpErrorKind::Invalid => FailureKind::Provider,
                };
                return Err((kind, error.message().to_owned()));
            }
            Ok(Ok(response)) => response,
        };

        if response.is_success() {
            return Ok(response.body);
        }

        let kind = if policy.retry.should_retry_status(response.status) {
            FailureKind::Network
        } else {
            FailureKind::Provider
        };
        Err((
            kind,
            format!("upstream returned status {}", response.status),
        ))
    }
}
