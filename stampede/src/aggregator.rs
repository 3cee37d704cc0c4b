use crate::error::RequestFailure;
use metrics_util::AtomicBucket;
use pdatastructs::tdigest::{TDigest, K1};
use stampede_core::{ExecutorKind, FailureBreakdown, LatencySummary, RunSnapshot, ScenarioSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Latencies are folded into the digest every this many records.
const DRAIN_EVERY: u64 = 4096;

/// Collects the outcome of every iteration of every scenario in a run.
///
/// Each `(scenario, target)` pair gets its own [`Recorder`]; workers only ever touch their
/// recorder, and [`ResultAggregator::snapshot`] reads all of them without stopping anyone.
pub struct ResultAggregator {
    recorders: RwLock<Vec<Arc<Recorder>>>,
    created: Instant,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            recorders: RwLock::new(vec![]),
            created: Instant::now(),
        }
    }

    pub fn register(&self, scenario: &str, target: &str, executor: ExecutorKind) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::new(scenario, target, executor));
        self.recorders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(recorder.clone());
        recorder
    }

    pub fn recorder(&self, scenario: &str) -> Option<Arc<Recorder>> {
        self.recorders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.scenario == scenario)
            .cloned()
    }

    /// Point-in-time view of every registered scenario. `complete` once all of them finished.
    pub fn snapshot(&self) -> RunSnapshot {
        let recorders: Vec<Arc<Recorder>> = self
            .recorders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let complete = !recorders.is_empty() && recorders.iter().all(|r| r.is_finished());
        RunSnapshot {
            elapsed: self.created.elapsed(),
            complete,
            scenarios: recorders.iter().map(|r| r.snapshot()).collect(),
        }
    }
}

struct LatencyDigest {
    digest: TDigest<K1>,
    count: u64,
}

impl LatencyDigest {
    fn new() -> Self {
        Self {
            digest: TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE),
            count: 0,
        }
    }

    fn insert(&mut self, latencies: &[Duration]) {
        for latency in latencies {
            self.digest.insert(latency.as_secs_f64());
        }
        self.count += latencies.len() as u64;
    }

    fn quantile(&self, q: f64) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }

        let secs = self.digest.quantile(q);
        // NOTE: TDigest can return NaN on degenerate inputs.
        if secs.is_finite() && secs >= 0. {
            Duration::from_secs_f64(secs)
        } else {
            error!("Non-finite latency quantile {q}; reporting zero.");
            Duration::ZERO
        }
    }
}

/// Thread-safe counters for one scenario against one target.
pub struct Recorder {
    scenario: String,
    target: String,
    executor: ExecutorKind,

    success: AtomicU64,
    failure: AtomicU64,
    dropped: AtomicU64,
    panics: AtomicU64,
    status: AtomicU64,
    timeout: AtomicU64,
    connect: AtomicU64,
    other: AtomicU64,
    active_vus: AtomicU64,

    latency_sum_nanos: AtomicU64,
    latency_min_nanos: AtomicU64,
    latency_max_nanos: AtomicU64,
    pending: AtomicBucket<Duration>,
    pending_count: AtomicU64,
    digest: Mutex<LatencyDigest>,

    started: OnceLock<Instant>,
    finished: OnceLock<Instant>,

    #[cfg(feature = "metrics")]
    metrics: RecorderMetrics,
}

impl Recorder {
    fn new(scenario: &str, target: &str, executor: ExecutorKind) -> Self {
        Self {
            scenario: scenario.to_string(),
            target: target.to_string(),
            executor,
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            panics: AtomicU64::new(0),
            status: AtomicU64::new(0),
            timeout: AtomicU64::new(0),
            connect: AtomicU64::new(0),
            other: AtomicU64::new(0),
            active_vus: AtomicU64::new(0),
            latency_sum_nanos: AtomicU64::new(0),
            latency_min_nanos: AtomicU64::new(u64::MAX),
            latency_max_nanos: AtomicU64::new(0),
            pending: AtomicBucket::new(),
            pending_count: AtomicU64::new(0),
            digest: Mutex::new(LatencyDigest::new()),
            started: OnceLock::new(),
            finished: OnceLock::new(),
            #[cfg(feature = "metrics")]
            metrics: RecorderMetrics::new(scenario, target),
        }
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Record the outcome of a completed iteration.
    pub fn record(&self, outcome: &Result<(), RequestFailure>, latency: Duration) {
        match outcome {
            Ok(()) => {
                self.success.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                self.metrics.success.increment(1);
            }
            Err(failure) => {
                let bucket = match failure {
                    RequestFailure::Status(_) => &self.status,
                    RequestFailure::Timeout => &self.timeout,
                    RequestFailure::Connect(_) => &self.connect,
                    RequestFailure::Other(_) | RequestFailure::Panicked => &self.other,
                };
                bucket.fetch_add(1, Ordering::Relaxed);
                if *failure == RequestFailure::Panicked {
                    self.panics.fetch_add(1, Ordering::Relaxed);
                }
                self.failure.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                self.metrics.failure.increment(1);
            }
        }

        self.record_latency(latency);
    }

    /// An arrival that found no free worker. Not an iteration, so not part of `total`.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        self.metrics.dropped.increment(1);
    }

    pub fn vu_started(&self) {
        let vus = self.active_vus.fetch_add(1, Ordering::Relaxed) + 1;
        self.report_vus(vus);
    }

    pub fn vu_stopped(&self) {
        let vus = self
            .active_vus
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        self.report_vus(vus);
    }

    pub fn active_vus(&self) -> u64 {
        self.active_vus.load(Ordering::Relaxed)
    }

    /// Idempotent; the first call fixes the start of `elapsed`.
    pub fn mark_started(&self) {
        let _ = self.started.set(Instant::now());
    }

    pub fn mark_finished(&self) {
        self.mark_started();
        let _ = self.finished.set(Instant::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished.get().is_some()
    }

    pub fn snapshot(&self) -> ScenarioSnapshot {
        let success = self.success.load(Ordering::Relaxed);
        let failure = self.failure.load(Ordering::Relaxed);
        let total = success + failure;

        let elapsed = match (self.started.get(), self.finished.get()) {
            (Some(start), Some(end)) => end.duration_since(*start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };
        let iteration_rate = if elapsed.is_zero() {
            0.
        } else {
            total as f64 / elapsed.as_secs_f64()
        };

        ScenarioSnapshot {
            scenario: self.scenario.clone(),
            target: self.target.clone(),
            executor: self.executor,
            total,
            success,
            failure,
            dropped: self.dropped.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            failures: FailureBreakdown {
                status: self.status.load(Ordering::Relaxed),
                timeout: self.timeout.load(Ordering::Relaxed),
                connect: self.connect.load(Ordering::Relaxed),
                other: self.other.load(Ordering::Relaxed),
            },
            active_vus: self.active_vus(),
            elapsed,
            iteration_rate,
            latency: self.latency_summary(),
        }
    }

    #[cfg(feature = "metrics")]
    fn report_vus(&self, vus: u64) {
        self.metrics.active_vus.set(vus as f64);
    }

    #[cfg(not(feature = "metrics"))]
    fn report_vus(&self, _vus: u64) {}

    fn record_latency(&self, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.latency_sum_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.latency_min_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.latency_max_nanos.fetch_max(nanos, Ordering::Relaxed);
        self.pending.push(latency);

        #[cfg(feature = "metrics")]
        self.metrics.latency.record(latency.as_secs_f64());

        let pending = self.pending_count.fetch_add(1, Ordering::Relaxed) + 1;
        if pending % DRAIN_EVERY == 0 {
            // NOTE: Someone else draining is as good as us draining.
            if let Ok(mut digest) = self.digest.try_lock() {
                self.pending.clear_with(|batch| digest.insert(batch));
            }
        }
    }

    fn latency_summary(&self) -> LatencySummary {
        let mut digest = self.digest.lock().unwrap_or_else(PoisonError::into_inner);
        self.pending.clear_with(|batch| digest.insert(batch));

        if digest.count == 0 {
            return LatencySummary::default();
        }

        let sum = self.latency_sum_nanos.load(Ordering::Relaxed);
        let mean = Duration::from_nanos(sum / digest.count);

        LatencySummary {
            min: Duration::from_nanos(self.latency_min_nanos.load(Ordering::Relaxed)),
            mean,
            p50: digest.quantile(0.5),
            p90: digest.quantile(0.9),
            p95: digest.quantile(0.95),
            p99: digest.quantile(0.99),
            max: Duration::from_nanos(self.latency_max_nanos.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(feature = "metrics")]
struct RecorderMetrics {
    success: metrics::Counter,
    failure: metrics::Counter,
    dropped: metrics::Counter,
    active_vus: metrics::Gauge,
    latency: metrics::Histogram,
}

#[cfg(feature = "metrics")]
impl RecorderMetrics {
    fn new(scenario: &str, target: &str) -> Self {
        let labels = vec![
            metrics::Label::new("scenario", scenario.to_string()),
            metrics::Label::new("target", target.to_string()),
        ];
        metrics::describe_histogram!(
            "stampede_iteration_latency",
            metrics::Unit::Seconds,
            "Iteration latency"
        );
        Self {
            success: metrics::counter!("stampede_iteration_success", labels.clone()),
            failure: metrics::counter!("stampede_iteration_failure", labels.clone()),
            dropped: metrics::counter!("stampede_iteration_dropped", labels.clone()),
            active_vus: metrics::gauge!("stampede_active_vus", labels.clone()),
            latency: metrics::histogram!("stampede_iteration_latency", labels),
        }
    }
}
