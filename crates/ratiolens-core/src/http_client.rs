use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// HTTP request envelope used by provider adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// URL with percent-encoded query parameters appended.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.url)
    }

    /// Same as [`full_url`](Self::full_url) with secret query values masked, for logs.
    pub fn redacted_url(&self) -> String {
        let mut redacted = self.clone();
        for (name, value) in redacted.query.iter_mut() {
            if matches!(name.as_str(), "apikey" | "api_key" | "crumb" | "token") {
                *value = String::from("***");
            }
        }
        redacted.full_url()
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Connect,
    Transport,
    /// Request could not be built or sent at all; retrying will not help.
    Invalid,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Connect, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Timeout, message)
    }

    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        !matches!(self.kind, HttpErrorKind::Invalid)
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract used by every provider adapter.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production HTTP client backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("ratiolens/", env!("CARGO_PKG_VERSION")))
                    .cookie_store(true)
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(request.full_url())
                .timeout(std::time::Duration::from_millis(request.timeout_ms));

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::timeout(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::connect(format!("connection failed: {e}"))
                } else if e.is_builder() {
                    HttpError::new(HttpErrorKind::Invalid, format!("invalid request: {e}"))
                } else {
                    HttpError::new(HttpErrorKind::Transport, format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| {
                HttpError::new(
                    HttpErrorKind::Transport,
                    format!("failed to read response body: {e}"),
                )
            })?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Reply produced by a [`ScriptedHttpClient`] route.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond(HttpResponse),
    Fail(HttpError),
    /// Responds once the delay has elapsed on tokio's clock.
    Delayed(HttpResponse, Duration),
    /// Never completes; exercises caller timeouts.
    Hang,
}

impl ScriptedReply {
    pub fn json(body: impl Into<String>) -> Self {
        Self::Respond(HttpResponse::ok_json(body))
    }

    pub fn status(status: u16) -> Self {
        Self::Respond(HttpResponse::status(status, ""))
    }

    pub fn connect_error() -> Self {
        Self::Fail(HttpError::connect("connection refused"))
    }

    pub fn json_after(body: impl Into<String>, delay: Duration) -> Self {
        Self::Delayed(HttpResponse::ok_json(body), delay)
    }
}

/// One request observed by a [`ScriptedHttpClient`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub at: tokio::time::Instant,
}

#[derive(Debug)]
struct ScriptedRoute {
    pattern: String,
    replies: VecDeque<ScriptedReply>,
}

/// Deterministic offline transport. Routes match by URL substring in registration
/// order; queued replies are consumed in order and the last one repeats.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<ScriptedRoute>>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight count when a scripted call finishes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: impl Into<String>, reply: ScriptedReply) -> Self {
        let pattern = pattern.into();
        {
            let mut routes = self
                .routes
                .lock()
                .expect("scripted routes should not be poisoned");
            match routes.iter_mut().find(|route| route.pattern == pattern) {
                Some(route) => route.replies.push_back(reply),
                None => routes.push(ScriptedRoute {
                    pattern,
                    replies: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .expect("scripted calls should not be poisoned")
            .clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.url.contains(pattern))
            .collect()
    }

    /// Highest number of requests that were executing at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> ScriptedReply {
        let mut routes = self
            .routes
            .lock()
            .expect("scripted routes should not be poisoned");
        let Some(route) = routes.iter_mut().find(|route| url.contains(&route.pattern)) else {
            return ScriptedReply::Respond(HttpResponse::status(404, "no scripted route"));
        };
        if route.replies.len() > 1 {
            route
                .replies
                .pop_front()
                .unwrap_or(ScriptedReply::status(404))
        } else {
            route
                .replies
                .front()
                .cloned()
                .unwrap_or(ScriptedReply::status(404))
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let url = request.full_url();
        self.calls
            .lock()
            .expect("scripted calls should not be poisoned")
            .push(RecordedCall {
                url: url.clone(),
                at: tokio::time::Instant::now(),
            });
        let reply = self.next_reply(&url);

        Box::pin(async move {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
            let _in_flight = InFlight(&self.in_flight);

            match reply {
                ScriptedReply::Respond(response) => Ok(response),
                ScriptedReply::Fail(error) => Err(error),
                ScriptedReply::Delayed(response, delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                ScriptedReply::Hang => std::future::pending().await,
            }
        })
    }
}
