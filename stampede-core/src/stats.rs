use crate::ExecutorKind;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSecondsWithFrac};
use std::fmt;
use std::time::Duration;

/// Latency distribution of the successful and failed iterations of a scenario.
///
/// Quantiles are t-digest estimates; `min`, `max` and `mean` are exact.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub min: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub mean: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p50: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p90: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p95: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p99: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub max: Duration,
}

/// Why failed iterations failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBreakdown {
    /// Unexpected status code.
    pub status: u64,
    pub timeout: u64,
    pub connect: u64,
    /// Any other transport error, or a panicking iteration.
    pub other: u64,
}

/// Aggregates of one scenario against one target at a point in time.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSnapshot {
    pub scenario: String,
    pub target: String,
    pub executor: ExecutorKind,
    /// Always `success + failure`.
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    /// Arrivals that could not start because every worker was busy.
    pub dropped: u64,
    /// Iterations that panicked. Also counted in `failure`.
    pub panics: u64,
    pub failures: FailureBreakdown,
    pub active_vus: u64,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub elapsed: Duration,
    /// Completed iterations per second since the scenario started.
    pub iteration_rate: f64,
    pub latency: LatencySummary,
}

impl ScenarioSnapshot {
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.
        } else {
            self.failure as f64 / self.total as f64
        }
    }
}

impl fmt::Display for ScenarioSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: total={}, rate={:.2}/s, ErrorRate={:.3}, dropped={}, vus={}, p50={:?}, p90={:?}, p99={:?}",
            self.scenario,
            self.target,
            self.total,
            self.iteration_rate,
            self.error_rate(),
            self.dropped,
            self.active_vus,
            self.latency.p50,
            self.latency.p90,
            self.latency.p99,
        )
    }
}

/// Immutable copy of every scenario's aggregates.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub elapsed: Duration,
    /// Set on the final snapshot of a run.
    pub complete: bool,
    pub scenarios: Vec<ScenarioSnapshot>,
}

impl RunSnapshot {
    pub fn scenario(&self, name: &str) -> Option<&ScenarioSnapshot> {
        self.scenarios.iter().find(|s| s.scenario == name)
    }

    pub fn total(&self) -> u64 {
        self.scenarios.iter().map(|s| s.total).sum()
    }

    pub fn success(&self) -> u64 {
        self.scenarios.iter().map(|s| s.success).sum()
    }

    pub fn failure(&self) -> u64 {
        self.scenarios.iter().map(|s| s.failure).sum()
    }

    pub fn dropped(&self) -> u64 {
        self.scenarios.iter().map(|s| s.dropped).sum()
    }
}
