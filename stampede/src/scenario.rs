use crate::aggregator::Recorder;
use crate::arrival::ArrivalScheduler;
use crate::controller::{LoadController, LoadTarget};
use crate::error::RequestFailure;
use crate::iteration::IterationContext;
use crate::pool::WorkerPool;
use crate::signal::StopSignal;
use crate::timer::Timer;
use governor::{Quota, RateLimiter};
use stampede_core::{ScenarioConfig, ScenarioSnapshot, Schedule, VuBounds};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// How often a concurrency pool is brought in line with the schedule.
const RECONCILE_INTERVAL: Duration = Duration::from_millis(50);

#[instrument(name="scenario", skip_all, fields(name=config.name, target=config.target.hostname))]
pub(crate) async fn run_scenario<T, F>(
    iteration: T,
    config: ScenarioConfig,
    recorder: Arc<Recorder>,
    stop: StopSignal,
) -> ScenarioSnapshot
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = Result<(), RequestFailure>> + Send + 'static,
{
    if !config.start_time.is_zero() {
        debug!(
            "Waiting {} before starting",
            humantime::format_duration(config.start_time)
        );
        tokio::select! {
            _ = tokio::time::sleep(config.start_time) => {}
            _ = stop.stopped() => {
                info!("Stopped before start");
                recorder.mark_finished();
                return recorder.snapshot();
            }
        }
    }

    let schedule = config.schedule();
    info!(
        "Running {} ({}) against {} for {}",
        config.name,
        config.executor.kind(),
        config.target,
        humantime::format_duration(schedule.total_duration())
    );
    recorder.mark_started();

    let mut context = IterationContext::new(recorder.clone());
    context.think_time = config.think_time;
    context.limiter = config.max_rate.map(|max_rate| {
        Arc::new(RateLimiter::direct(
            Quota::per_second(max_rate).allow_burst(NonZeroU32::MIN),
        ))
    });

    let aborted = match config.executor.vu_bounds() {
        Some(bounds) => {
            run_arrival_rate(
                iteration,
                context,
                &schedule,
                config.executor.time_unit(),
                bounds,
                &stop,
                config.graceful_stop,
            )
            .await
        }
        None => {
            run_concurrency(
                iteration,
                context,
                schedule,
                config.executor.max_vus(),
                &stop,
                config.graceful_stop,
            )
            .await
        }
    };
    if aborted > 0 {
        warn!("{aborted} iterations were cut off by the graceful stop period");
    }

    recorder.mark_finished();
    let snapshot = recorder.snapshot();
    info!("Scenario complete: {snapshot}");
    snapshot
}

async fn run_concurrency<T, F>(
    iteration: T,
    context: IterationContext,
    schedule: Schedule,
    max_vus: Option<u64>,
    stop: &StopSignal,
    grace: Duration,
) -> usize
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = Result<(), RequestFailure>> + Send + 'static,
{
    let end = tokio::time::Instant::now() + schedule.total_duration();
    let controller = LoadController::new(schedule);
    let mut pool = WorkerPool::new(iteration, context);
    let mut timer = Timer::new(RECONCILE_INTERVAL).await;

    loop {
        match controller.current() {
            LoadTarget::Active(target) => {
                let mut concurrency = target.ceil() as u64;
                if let Some(max_vus) = max_vus {
                    concurrency = concurrency.min(max_vus);
                }
                pool.set_concurrency(concurrency as usize);
            }
            LoadTarget::Complete => break,
        }

        tokio::select! {
            _ = timer.tick() => {}
            _ = tokio::time::sleep_until(end) => break,
            _ = stop.stopped() => {
                info!("Stop requested");
                break;
            }
        }
    }

    debug!("Draining {} workers", pool.active());
    pool.shutdown(grace).await
}

async fn run_arrival_rate<T, F>(
    iteration: T,
    context: IterationContext,
    schedule: &Schedule,
    time_unit: Duration,
    bounds: VuBounds,
    stop: &StopSignal,
    grace: Duration,
) -> usize
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = Result<(), RequestFailure>> + Send + 'static,
{
    debug!(
        "Arrival pool: {} pre-allocated, {} max",
        bounds.pre_allocated, bounds.max
    );
    let mut scheduler = ArrivalScheduler::new(iteration, context, bounds);
    scheduler.run(schedule, time_unit, stop).await;
    debug!(
        "Dispatched {} arrivals over {} workers",
        scheduler.dispatched(),
        scheduler.workers()
    );
    scheduler.shutdown(grace).await
}
