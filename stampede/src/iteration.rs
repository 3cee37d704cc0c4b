use crate::aggregator::Recorder;
use crate::error::RequestFailure;
use crate::signal::StopSignal;
use futures_util::FutureExt;
use governor::DefaultDirectRateLimiter;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Everything a worker needs around the iteration itself.
#[derive(Clone)]
pub(crate) struct IterationContext {
    pub recorder: Arc<Recorder>,
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pub think_time: Option<Duration>,
}

impl IterationContext {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self {
            recorder,
            limiter: None,
            think_time: None,
        }
    }

    /// Run one timed iteration and record its outcome. A panic inside the iteration is recorded
    /// as a failure and does not unwind into the worker.
    ///
    /// Returns `false` without starting the iteration if `stop` fired first, including while
    /// waiting on the rate limiter.
    pub async fn run<T, F>(&self, iteration: &T, stop: &StopSignal) -> bool
    where
        T: Fn() -> F,
        F: Future<Output = Result<(), RequestFailure>>,
    {
        if let Some(limiter) = &self.limiter {
            tokio::select! {
                _ = limiter.until_ready() => {}
                _ = stop.stopped() => return false,
            }
        }
        if stop.is_stopped() {
            return false;
        }

        let start = Instant::now();
        let outcome = match AssertUnwindSafe(async { iteration().await })
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Iteration for {} panicked.", self.recorder.scenario());
                Err(RequestFailure::Panicked)
            }
        };
        let elapsed = start.elapsed();

        self.recorder.record(&outcome, elapsed);
        true
    }

    /// Idle for the think time. Returns `false` if `stop` fired in the meantime.
    pub async fn think(&self, stop: &StopSignal) -> bool {
        match self.think_time {
            Some(think_time) if !think_time.is_zero() => {
                tokio::select! {
                    _ = tokio::time::sleep(think_time) => !stop.is_stopped(),
                    _ = stop.stopped() => false,
                }
            }
            _ => !stop.is_stopped(),
        }
    }
}
