use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::time::Instant;

/// Governor clock that reads `tokio::time::Instant`.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    type Instant = Nanos;

    fn now(&self) -> Self::Instant {
        Nanos::from(self.origin.elapsed())
    }
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<Nanos>>;

/// Enforces a minimum spacing between outbound calls that are not otherwise
/// rate-limited by concurrency. A zero spacing disables pacing.
#[derive(Clone)]
pub struct CallPacer {
    limiter: Option<Arc<DirectRateLimiter>>,
    clock: TokioClock,
    spacing: Duration,
}

impl CallPacer {
    pub fn new(min_spacing: Duration) -> Self {
        let clock = TokioClock::new();
        let limiter = Quota::with_period(min_spacing)
            .map(|quota| Arc::new(RateLimiter::direct_with_clock(quota, &clock)));
        Self {
            limiter,
            clock,
            spacing: min_spacing,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Takes one cell of budget, or returns how long until one is available.
    pub fn check(&self) -> Result<(), Duration> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Waits until the next call may go out.
    pub async fn pace(&self) {
        while let Err(wait) = self.check() {
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Runs `fetch` for every item with at most `concurrency` in progress and
    /// returns the results in input order. With `concurrency` 1 each fetch is
    /// paced.
    pub async fn fan_out<I, F, Fut>(&self, concurrency: usize, items: I, fetch: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future,
    {
        let sequential = concurrency <= 1;
        stream::iter(items)
            .map(|item| {
                let fetched = fetch(item);
                async move {
                    if sequential {
                        self.pace().await;
                    }
                    fetched.await
                }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}

impl Default for CallPacer {
    fn default() -> Self {
        Self::disabled()
    }
}
