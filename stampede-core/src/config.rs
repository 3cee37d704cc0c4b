use crate::{
    duration_str, ConfigError, Schedule, Stage, Target, DEFAULT_EXPECTED_STATUS,
    DEFAULT_GRACEFUL_STOP, DEFAULT_MAX_VUS_FACTOR, DEFAULT_PRE_ALLOCATED_FACTOR,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TIME_UNIT, MAX_SCENARIO_DURATION,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use url::Url;

/// How a scenario turns its schedule into load.
///
/// Concurrency executors keep a number of workers busy; arrival-rate executors start iterations
/// at a given rate regardless of how many are still in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum Executor {
    #[serde(alias = "constant-vus")]
    ConstantConcurrency {
        vus: u64,
        #[serde(with = "duration_str")]
        duration: Duration,
        #[serde(default)]
        max_vus: Option<u64>,
    },

    #[serde(alias = "ramping-vus")]
    RampingConcurrency {
        #[serde(default)]
        start_vus: u64,
        stages: Vec<Stage>,
        #[serde(default)]
        max_vus: Option<u64>,
    },

    ConstantArrivalRate {
        rate: u64,
        #[serde(default = "default_time_unit", with = "duration_str")]
        time_unit: Duration,
        #[serde(with = "duration_str")]
        duration: Duration,
        #[serde(default)]
        pre_allocated_vus: Option<u64>,
        #[serde(default)]
        max_vus: Option<u64>,
    },

    RampingArrivalRate {
        #[serde(default)]
        start_rate: u64,
        #[serde(default = "default_time_unit", with = "duration_str")]
        time_unit: Duration,
        stages: Vec<Stage>,
        #[serde(default)]
        pre_allocated_vus: Option<u64>,
        #[serde(default)]
        max_vus: Option<u64>,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    ConstantConcurrency,
    RampingConcurrency,
    ConstantArrivalRate,
    RampingArrivalRate,
}

impl ExecutorKind {
    pub fn is_arrival_rate(self) -> bool {
        matches!(self, Self::ConstantArrivalRate | Self::RampingArrivalRate)
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConstantConcurrency => "constant-concurrency",
            Self::RampingConcurrency => "ramping-concurrency",
            Self::ConstantArrivalRate => "constant-arrival-rate",
            Self::RampingArrivalRate => "ramping-arrival-rate",
        };
        f.write_str(name)
    }
}

/// Worker bounds of an arrival-rate scenario after defaults are applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VuBounds {
    pub pre_allocated: u64,
    pub max: u64,
}

impl Executor {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            Self::ConstantConcurrency { .. } => ExecutorKind::ConstantConcurrency,
            Self::RampingConcurrency { .. } => ExecutorKind::RampingConcurrency,
            Self::ConstantArrivalRate { .. } => ExecutorKind::ConstantArrivalRate,
            Self::RampingArrivalRate { .. } => ExecutorKind::RampingArrivalRate,
        }
    }

    /// The load curve: concurrency for concurrency executors, iterations per `time_unit`
    /// otherwise.
    pub fn schedule(&self) -> Schedule {
        match self {
            Self::ConstantConcurrency { vus, duration, .. } => Schedule::constant(*duration, *vus),
            Self::RampingConcurrency {
                start_vus, stages, ..
            } => Schedule::new(stages.clone()).starting_at(*start_vus),
            Self::ConstantArrivalRate { rate, duration, .. } => {
                Schedule::constant(*duration, *rate)
            }
            Self::RampingArrivalRate {
                start_rate, stages, ..
            } => Schedule::new(stages.clone()).starting_at(*start_rate),
        }
    }

    /// Same executor shape driven by a different load curve.
    ///
    /// Constant executors take the schedule's peak as their load.
    pub fn with_schedule(&self, schedule: &Schedule) -> Executor {
        let mut executor = self.clone();
        match &mut executor {
            Self::ConstantConcurrency { vus, .. } => *vus = schedule.peak_target(),
            Self::ConstantArrivalRate { rate, .. } => *rate = schedule.peak_target(),
            Self::RampingConcurrency {
                start_vus, stages, ..
            } => {
                *start_vus = schedule.start_target();
                *stages = schedule.stages().to_vec();
            }
            Self::RampingArrivalRate {
                start_rate, stages, ..
            } => {
                *start_rate = schedule.start_target();
                *stages = schedule.stages().to_vec();
            }
        }
        executor
    }

    pub fn time_unit(&self) -> Duration {
        match self {
            Self::ConstantArrivalRate { time_unit, .. }
            | Self::RampingArrivalRate { time_unit, .. } => *time_unit,
            _ => DEFAULT_TIME_UNIT,
        }
    }

    /// Explicit upper bound on workers, if any.
    pub fn max_vus(&self) -> Option<u64> {
        match self {
            Self::ConstantConcurrency { max_vus, .. }
            | Self::RampingConcurrency { max_vus, .. }
            | Self::ConstantArrivalRate { max_vus, .. }
            | Self::RampingArrivalRate { max_vus, .. } => *max_vus,
        }
    }

    /// Worker bounds for arrival-rate executors, with unset values derived from the peak rate.
    pub fn vu_bounds(&self) -> Option<VuBounds> {
        let (pre_allocated_vus, max_vus) = match self {
            Self::ConstantArrivalRate {
                pre_allocated_vus,
                max_vus,
                ..
            }
            | Self::RampingArrivalRate {
                pre_allocated_vus,
                max_vus,
                ..
            } => (*pre_allocated_vus, *max_vus),
            _ => return None,
        };

        let peak_per_sec =
            self.schedule().peak_target() as f64 / self.time_unit().as_secs_f64().max(1e-9);

        let pre_allocated = pre_allocated_vus
            .unwrap_or_else(|| (peak_per_sec * DEFAULT_PRE_ALLOCATED_FACTOR).ceil() as u64)
            .max(1);
        let max = max_vus
            .unwrap_or_else(|| (peak_per_sec * DEFAULT_MAX_VUS_FACTOR).ceil() as u64)
            .max(pre_allocated);

        Some(VuBounds { pre_allocated, max })
    }

    fn validate(&self, scenario: &str) -> Result<(), ConfigError> {
        let total = self
            .schedule()
            .stages()
            .iter()
            .try_fold(Duration::ZERO, |total, stage| total.checked_add(stage.duration));
        if !total.is_some_and(|total| total <= MAX_SCENARIO_DURATION) {
            return Err(ConfigError::scenario(
                scenario,
                format!(
                    "schedule runs longer than {}",
                    humantime::format_duration(MAX_SCENARIO_DURATION)
                ),
            ));
        }

        if self.kind().is_arrival_rate() {
            if self.time_unit().is_zero() {
                return Err(ConfigError::scenario(scenario, "time_unit must be non-zero"));
            }
            match self {
                Self::ConstantArrivalRate {
                    pre_allocated_vus: Some(pre),
                    max_vus: Some(max),
                    ..
                }
                | Self::RampingArrivalRate {
                    pre_allocated_vus: Some(pre),
                    max_vus: Some(max),
                    ..
                } if pre > max => {
                    return Err(ConfigError::scenario(
                        scenario,
                        format!("pre_allocated_vus ({pre}) exceeds max_vus ({max})"),
                    ));
                }
                _ => {}
            }
        }

        if self.max_vus() == Some(0) {
            return Err(ConfigError::scenario(scenario, "max_vus must be at least 1"));
        }

        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// Where and how each iteration sends its request. The host comes from the [`Target`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub method: Method,
    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    #[serde(default)]
    pub discard_response_bodies: bool,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            port: None,
            path: default_path(),
            method: Method::default(),
            timeout: default_timeout(),
            expected_status: default_expected_status(),
            discard_response_bodies: false,
        }
    }
}

impl Endpoint {
    pub fn url_for(&self, target: &Target) -> Result<Url, ConfigError> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        let raw = match self.port {
            Some(port) => format!("{}://{}:{}{}", self.scheme, target.address, port, path),
            None => format!("{}://{}{}", self.scheme, target.address, path),
        };

        Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { url: raw, source })
    }

    fn validate(&self, scenario: &str, target: &Target) -> Result<(), ConfigError> {
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::scenario(
                scenario,
                format!("unsupported scheme `{}`", self.scheme),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::scenario(scenario, "timeout must be non-zero"));
        }
        if !(100..=599).contains(&self.expected_status) {
            return Err(ConfigError::scenario(
                scenario,
                format!("invalid expected status {}", self.expected_status),
            ));
        }
        self.url_for(target)?;
        Ok(())
    }
}

/// A single scenario: one executor driving one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(flatten)]
    pub executor: Executor,
    pub target: Target,
    #[serde(default)]
    pub endpoint: Endpoint,
    /// Offset from the start of the run before this scenario begins.
    #[serde(default, with = "duration_str")]
    pub start_time: Duration,
    /// Idle period after each iteration.
    #[serde(default, with = "duration_str::option")]
    pub think_time: Option<Duration>,
    #[serde(default = "default_graceful_stop", with = "duration_str")]
    pub graceful_stop: Duration,
    /// Cap on requests per second for concurrency executors.
    #[serde(default)]
    pub max_rate: Option<NonZeroU32>,
}

impl ScenarioConfig {
    pub fn new(name: &str, executor: Executor, target: Target) -> Self {
        Self {
            name: name.to_string(),
            executor,
            target,
            endpoint: Endpoint::default(),
            start_time: Duration::ZERO,
            think_time: None,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            max_rate: None,
        }
    }

    pub fn schedule(&self) -> Schedule {
        self.executor.schedule()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        self.target.validate()?;
        self.executor.validate(&self.name)?;
        for (field, value) in [
            ("start_time", self.start_time),
            ("graceful_stop", self.graceful_stop),
        ] {
            if value > MAX_SCENARIO_DURATION {
                return Err(ConfigError::scenario(
                    &self.name,
                    format!(
                        "{field} exceeds {}",
                        humantime::format_duration(MAX_SCENARIO_DURATION)
                    ),
                ));
            }
        }
        self.endpoint.validate(&self.name, &self.target)?;
        if self.max_rate.is_some() && self.executor.kind().is_arrival_rate() {
            return Err(ConfigError::scenario(
                &self.name,
                "max_rate only applies to concurrency executors",
            ));
        }
        Ok(())
    }
}

/// How the aggregate load of a [`DistributedConfig`] is shared between targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// Proportional split of the executor's load.
    Weights(Vec<u32>),
    /// Per-target load. Constant executors use it directly; ramping executors are scaled so
    /// their peak matches it.
    Explicit(Vec<u64>),
}

impl Distribution {
    pub fn len(&self) -> usize {
        match self {
            Self::Weights(w) => w.len(),
            Self::Explicit(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse a comma separated `DISTRIBUTIONS` value as explicit per-target loads.
    pub fn explicit_from_list(list: &str) -> Result<Self, ConfigError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u64>().map_err(|_| {
                    ConfigError::scenario("distribution", format!("`{s}` is not a whole number"))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Explicit)
    }
}

/// One logical scenario fanned out over every target of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedConfig {
    #[serde(flatten)]
    pub executor: Executor,
    pub distribution: Distribution,
    #[serde(default)]
    pub endpoint: Endpoint,
    #[serde(default, with = "duration_str")]
    pub start_time: Duration,
    /// Extra start offset added per target index.
    #[serde(default, with = "duration_str")]
    pub stagger: Duration,
    #[serde(default, with = "duration_str::option")]
    pub think_time: Option<Duration>,
    #[serde(default = "default_graceful_stop", with = "duration_str")]
    pub graceful_stop: Duration,
}

/// Everything needed to set up a run, as read from a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
    #[serde(default)]
    pub distributed: Option<DistributedConfig>,
    #[serde(default, with = "duration_str::option")]
    pub report_interval: Option<Duration>,
}

/// Validate a full set of scenarios before anything runs.
pub fn validate_scenarios(scenarios: &[ScenarioConfig]) -> Result<(), ConfigError> {
    if scenarios.is_empty() {
        return Err(ConfigError::NoScenarios);
    }

    let mut names = HashSet::new();
    for scenario in scenarios {
        scenario.validate()?;
        if !names.insert(scenario.name.as_str()) {
            return Err(ConfigError::DuplicateScenario(scenario.name.clone()));
        }
    }
    Ok(())
}

fn default_time_unit() -> Duration {
    DEFAULT_TIME_UNIT
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_expected_status() -> u16 {
    DEFAULT_EXPECTED_STATUS
}

fn default_graceful_stop() -> Duration {
    DEFAULT_GRACEFUL_STOP
}
