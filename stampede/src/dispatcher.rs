use crate::aggregator::ResultAggregator;
use crate::error::{Error, RequestFailure};
use crate::http::{self, HttpRequest};
use crate::scenario::run_scenario;
use crate::signal::StopSignal;
use stampede_core::{
    validate_scenarios, ConfigError, DistributedConfig, Distribution, Executor, RunSnapshot,
    ScenarioConfig, Schedule, Target,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// Fan one distributed scenario out into one scenario per target.
///
/// Target `i` gets the `i`-th distribution entry and starts `i * stagger` after `start_time`.
/// Scenarios are named after their target's hostname.
pub fn plan(
    config: &DistributedConfig,
    targets: &[Target],
) -> Result<Vec<ScenarioConfig>, ConfigError> {
    if targets.is_empty() {
        return Err(ConfigError::NoTargets);
    }
    if config.distribution.len() != targets.len() {
        return Err(ConfigError::DistributionMismatch {
            targets: targets.len(),
            distributions: config.distribution.len(),
        });
    }

    let executors = split_executor(&config.executor, &config.distribution)?;

    Ok(targets
        .iter()
        .zip(executors)
        .enumerate()
        .map(|(idx, (target, executor))| ScenarioConfig {
            name: target.hostname.clone(),
            executor,
            target: target.clone(),
            endpoint: config.endpoint.clone(),
            start_time: config
                .start_time
                .saturating_add(config.stagger.saturating_mul(idx as u32)),
            think_time: config.think_time,
            graceful_stop: config.graceful_stop,
            max_rate: None,
        })
        .collect())
}

fn split_executor(
    executor: &Executor,
    distribution: &Distribution,
) -> Result<Vec<Executor>, ConfigError> {
    let schedule = executor.schedule();
    match distribution {
        Distribution::Weights(weights) => {
            if weights.iter().all(|w| *w == 0) {
                return Err(ConfigError::ZeroWeights);
            }
            Ok(schedule
                .split(weights)
                .iter()
                .map(|part| executor.with_schedule(part))
                .collect())
        }
        Distribution::Explicit(loads) => loads
            .iter()
            .map(|load| match executor {
                Executor::ConstantConcurrency { .. } | Executor::ConstantArrivalRate { .. } => {
                    Ok(executor.with_schedule(&Schedule::constant(Duration::ZERO, *load)))
                }
                Executor::RampingConcurrency { .. } | Executor::RampingArrivalRate { .. } => {
                    let peak = schedule.peak_target();
                    if peak == 0 {
                        return Err(ConfigError::InvalidScenario {
                            scenario: "distributed".to_string(),
                            reason: "explicit loads need a ramping schedule with a non-zero peak"
                                .to_string(),
                        });
                    }
                    Ok(executor.with_schedule(&schedule.scaled(*load as f64 / peak as f64)))
                }
            })
            .collect(),
    }
}

/// Runs a set of scenarios concurrently, each with its own clock and workers, all feeding one
/// [`ResultAggregator`].
pub struct Dispatcher {
    scenarios: Vec<ScenarioConfig>,
    aggregator: Arc<ResultAggregator>,
    stop: StopSignal,
}

impl Dispatcher {
    pub fn new(scenarios: Vec<ScenarioConfig>) -> Result<Self, ConfigError> {
        validate_scenarios(&scenarios)?;
        Ok(Self {
            scenarios,
            aggregator: Arc::new(ResultAggregator::new()),
            stop: StopSignal::new(),
        })
    }

    pub fn scenarios(&self) -> &[ScenarioConfig] {
        &self.scenarios
    }

    /// Shared with reporters that snapshot while the run is in progress.
    pub fn aggregator(&self) -> Arc<ResultAggregator> {
        self.aggregator.clone()
    }

    /// Stopping it ends every scenario early; in-flight iterations still get their graceful stop.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run every scenario as HTTP requests against its target.
    pub async fn run(&self) -> Result<RunSnapshot, Error> {
        let client = http::client()?;
        let iterations = self
            .scenarios
            .iter()
            .map(|config| {
                let request = Arc::new(HttpRequest::new(
                    client.clone(),
                    &config.endpoint,
                    &config.target,
                )?);
                Ok(move || {
                    let request = request.clone();
                    async move { request.send().await }
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(self.run_iterations(iterations).await)
    }

    /// Run every scenario with a custom iteration built by `make`.
    pub async fn run_with<M, T, F>(&self, make: M) -> RunSnapshot
    where
        M: Fn(&ScenarioConfig) -> T,
        T: Fn() -> F + Send + Sync + 'static + Clone,
        F: Future<Output = Result<(), RequestFailure>> + Send + 'static,
    {
        let iterations = self.scenarios.iter().map(make).collect();
        self.run_iterations(iterations).await
    }

    async fn run_iterations<T, F>(&self, iterations: Vec<T>) -> RunSnapshot
    where
        T: Fn() -> F + Send + Sync + 'static + Clone,
        F: Future<Output = Result<(), RequestFailure>> + Send + 'static,
    {
        info!("Starting run with {} scenarios", self.scenarios.len());

        // NOTE: Register everything up front so early snapshots list every scenario.
        let recorders: Vec<_> = self
            .scenarios
            .iter()
            .map(|config| {
                self.aggregator.register(
                    &config.name,
                    &config.target.hostname,
                    config.executor.kind(),
                )
            })
            .collect();

        let handles: Vec<_> = self
            .scenarios
            .iter()
            .zip(iterations)
            .zip(recorders.iter())
            .map(|((config, iteration), recorder)| {
                tokio::spawn(
                    run_scenario(iteration, config.clone(), recorder.clone(), self.stop.clone())
                        .in_current_span(),
                )
            })
            .collect();

        for (handle, recorder) in handles.into_iter().zip(recorders) {
            if let Err(err) = handle.await {
                error!("Scenario {} did not finish cleanly: {err}", recorder.scenario());
                recorder.mark_finished();
            }
        }

        let snapshot = self.aggregator.snapshot();
        info!(
            "Run complete: {} iterations, {} failed, {} dropped",
            snapshot.total(),
            snapshot.failure(),
            snapshot.dropped()
        );
        snapshot
    }
}
