//! Command line runtime
//!
//! Loads a run configuration and target list, runs every scenario, logs a progress snapshot
//! periodically, and emits the final snapshot as JSON.
use crate::error::RuntimeError;
use clap::Parser;
use stampede::core::{ConfigError, Distribution, RunConfig, RunSnapshot, ScenarioConfig, Target};
use stampede::{plan, Dispatcher, ResultAggregator, StopSignal, Timer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn, Instrument};

const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "stampede", version, about = "Staged HTTP load generator")]
struct StampedeCli {
    /// JSON run configuration.
    #[arg(short, long, env = "STAMPEDE_CONFIG")]
    config: PathBuf,

    /// JSON manifest of `{"hostname": ..., "ip": ...}` targets.
    #[arg(long)]
    targets_file: Option<PathBuf>,

    /// Comma separated target addresses. Ignored when a targets file is given.
    #[arg(long, env = "TARGETS")]
    targets: Option<String>,

    /// Comma separated per-target loads, overriding the configured distribution.
    #[arg(long, env = "DISTRIBUTIONS")]
    distributions: Option<String>,

    /// How often progress is logged, e.g. `30s`.
    #[arg(long, value_parser = humantime::parse_duration)]
    report_interval: Option<Duration>,

    /// Write the final snapshot here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Runs a configured set of scenarios to completion.
///
/// # Example
///
/// ```no_run
/// use stampede_runtime::StampedeRuntime;
///
/// #[tokio::main]
/// async fn main() {
///     if let Err(err) = StampedeRuntime::new().with_args().run().await {
///         std::process::exit(err.exit_code());
///     }
/// }
/// ```
#[derive(Debug, Default)]
pub struct StampedeRuntime {
    config: Option<RunConfig>,
    config_path: Option<PathBuf>,
    targets: Option<Vec<Target>>,
    targets_file: Option<PathBuf>,
    targets_list: Option<String>,
    distributions: Option<String>,
    report_interval: Option<Duration>,
    output: Option<PathBuf>,
}

impl StampedeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure from the command line and environment.
    ///
    /// `-c`, `--config` (or `STAMPEDE_CONFIG`) for the run configuration.
    ///
    /// `--targets-file` for a JSON target manifest, or `--targets` (or `TARGETS`) for a comma
    /// separated address list.
    ///
    /// `--distributions` (or `DISTRIBUTIONS`) for explicit per-target loads.
    ///
    /// # Example
    /// ```ignore
    /// $ stampede -c run.json --targets-file targets.json --report-interval 30s
    /// $ TARGETS=10.0.0.1,10.0.0.2 DISTRIBUTIONS=100,50 stampede -c run.json
    /// ```
    pub fn with_args(mut self) -> Self {
        let args = StampedeCli::parse();
        self.config_path = Some(args.config);
        self.targets_file = args.targets_file;
        self.targets_list = args.targets;
        self.distributions = args.distributions;
        self.report_interval = args.report_interval;
        self.output = args.output;
        self
    }

    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn targets_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.targets_file = Some(path.into());
        self
    }

    pub fn targets_list(mut self, list: &str) -> Self {
        self.targets_list = Some(list.to_string());
        self
    }

    pub fn distributions(mut self, list: &str) -> Self {
        self.distributions = Some(list.to_string());
        self
    }

    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Every scenario the run will execute: the explicitly configured ones followed by the
    /// distributed scenario fanned out over the targets.
    pub fn scenarios(&self) -> Result<Vec<ScenarioConfig>, RuntimeError> {
        let config = self.load_config()?;
        let mut scenarios = config.scenarios;

        if let Some(mut distributed) = config.distributed {
            if let Some(list) = &self.distributions {
                distributed.distribution = Distribution::explicit_from_list(list)?;
            }
            let targets = self.load_targets()?;
            debug!("Distributing over {} targets", targets.len());
            scenarios.extend(plan(&distributed, &targets)?);
        }

        Ok(scenarios)
    }

    #[instrument(name = "stampede", skip_all)]
    pub async fn run(self) -> Result<RunSnapshot, RuntimeError> {
        let report_interval = self.resolve_report_interval()?;
        let dispatcher = Dispatcher::new(self.scenarios()?)?;
        info!(
            "Loaded {} scenarios; reporting every {}",
            dispatcher.scenarios().len(),
            humantime::format_duration(report_interval)
        );

        let reporter = tokio::spawn(
            report_task(dispatcher.aggregator(), report_interval).in_current_span(),
        );
        let interrupt = tokio::spawn(interrupt_task(dispatcher.stop_signal()).in_current_span());

        let result = dispatcher.run().await;
        reporter.abort();
        interrupt.abort();

        let snapshot = result?;
        self.emit(&snapshot)?;
        Ok(snapshot)
    }

    fn load_config(&self) -> Result<RunConfig, RuntimeError> {
        if let Some(config) = &self.config {
            return Ok(config.clone());
        }
        match &self.config_path {
            Some(path) => parse_config(&read(path)?, path),
            None => Ok(RunConfig::default()),
        }
    }

    fn load_targets(&self) -> Result<Vec<Target>, RuntimeError> {
        if let Some(targets) = &self.targets {
            return Ok(targets.clone());
        }
        if let Some(path) = &self.targets_file {
            return Ok(Target::from_manifest(&read(path)?)?);
        }
        match &self.targets_list {
            Some(list) => Ok(Target::from_list(list)?),
            None => Err(ConfigError::NoTargets.into()),
        }
    }

    fn resolve_report_interval(&self) -> Result<Duration, RuntimeError> {
        let interval = match self.report_interval {
            Some(interval) => interval,
            None => self
                .load_config()?
                .report_interval
                .unwrap_or(DEFAULT_REPORT_INTERVAL),
        };
        if interval.is_zero() {
            return Err(ConfigError::ZeroReportInterval.into());
        }
        Ok(interval)
    }

    fn emit(&self, snapshot: &RunSnapshot) -> Result<(), RuntimeError> {
        let json = serde_json::to_string_pretty(snapshot).map_err(RuntimeError::Serialize)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, json).map_err(|source| RuntimeError::Write {
                    path: path.clone(),
                    source,
                })?;
                info!("Final snapshot written to {}", path.display());
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, RuntimeError> {
    std::fs::read_to_string(path).map_err(|source| RuntimeError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_config(json: &str, path: &Path) -> Result<RunConfig, RuntimeError> {
    serde_json::from_str(json).map_err(|source| RuntimeError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })
}

async fn report_task(aggregator: Arc<ResultAggregator>, interval: Duration) {
    let mut timer = Timer::new(interval).await;
    debug!("Reporting every {timer}");
    loop {
        timer.tick().await;
        let snapshot = aggregator.snapshot();
        for scenario in &snapshot.scenarios {
            info!("{scenario}");
        }
    }
}

async fn interrupt_task(stop: StopSignal) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupted; stopping all scenarios.");
            stop.stop();
        }
        Err(err) => error!("Unable to listen for interrupts: {err}"),
    }
}
