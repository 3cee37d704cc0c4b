use crate::error::RequestFailure;
use crate::iteration::IterationContext;
use crate::pool::{join_or_abort, VuGuard};
use crate::signal::StopSignal;
use async_channel::{Receiver, Sender};
use stampede_core::{Schedule, VuBounds};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Starts iterations on an open-model clock.
///
/// Arrival `n` is due when the area under the schedule reaches `n * time_unit`, independently of
/// how many iterations are in flight. Each arrival is handed to an idle worker; if there is
/// none the pool grows up to `max` workers, and past that the arrival is dropped.
pub(crate) struct ArrivalScheduler<T> {
    iteration: T,
    context: IterationContext,
    bounds: VuBounds,
    jobs_tx: Sender<()>,
    jobs_rx: Receiver<()>,
    busy: Arc<AtomicUsize>,
    halt: StopSignal,
    workers: Vec<JoinHandle<()>>,
    dispatched: u64,
}

impl<T, F> ArrivalScheduler<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = Result<(), RequestFailure>> + Send + 'static,
{
    pub fn new(iteration: T, context: IterationContext, bounds: VuBounds) -> Self {
        let (jobs_tx, jobs_rx) = async_channel::unbounded();
        let mut scheduler = Self {
            iteration,
            context,
            bounds,
            jobs_tx,
            jobs_rx,
            busy: Arc::new(AtomicUsize::new(0)),
            halt: StopSignal::new(),
            workers: vec![],
            dispatched: 0,
        };
        for _ in 0..bounds.pre_allocated {
            scheduler.spawn_worker();
        }
        debug!("Pre-allocated {} workers", bounds.pre_allocated);
        scheduler
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::Relaxed)
    }

    /// Arrivals handed to a worker so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Hand one arrival to a worker. Returns `false` if it had to be dropped.
    pub fn dispatch(&mut self) -> bool {
        // NOTE: Only the scheduler increments `busy`, so queued arrivals never outnumber
        // idle workers.
        if self.busy() >= self.workers.len() {
            if (self.workers.len() as u64) < self.bounds.max {
                self.spawn_worker();
                trace!("Grew arrival pool to {} workers", self.workers.len());
            } else {
                self.context.recorder.record_dropped();
                trace!("Dropped arrival; all {} workers busy", self.workers.len());
                return false;
            }
        }

        self.busy.fetch_add(1, Ordering::Relaxed);
        if self.jobs_tx.try_send(()).is_err() {
            self.busy.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        self.dispatched += 1;
        true
    }

    /// Drive arrivals until the schedule completes or `stop` fires.
    pub async fn run(&mut self, schedule: &Schedule, time_unit: Duration, stop: &StopSignal) {
        let start = Instant::now();
        let unit = time_unit.as_secs_f64();
        let mut n: u64 = 0;
        let mut dropped: u64 = 0;

        while let Some(due) = schedule.time_of_area(n as f64 * unit) {
            let deadline = start + due;
            // NOTE: When behind, arrivals are dispatched back to back; the clock never slips.
            if deadline > Instant::now() {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = stop.stopped() => return,
                }
            } else if stop.is_stopped() {
                return;
            }

            if !self.dispatch() {
                dropped += 1;
                if dropped.is_power_of_two() {
                    warn!(
                        "{} arrivals dropped for {}; max_vus ({}) is saturated.",
                        dropped,
                        self.context.recorder.scenario(),
                        self.bounds.max
                    );
                }
            }
            n += 1;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(start + schedule.total_duration()) => {}
            _ = stop.stopped() => {}
        }
    }

    /// Stop accepting arrivals and wait up to `grace` for in-flight iterations. Returns the
    /// number of aborted workers.
    pub async fn shutdown(mut self, grace: Duration) -> usize {
        self.halt.stop();
        self.jobs_tx.close();
        join_or_abort(std::mem::take(&mut self.workers), grace).await
    }

    fn spawn_worker(&mut self) {
        let iteration = self.iteration.clone();
        let context = self.context.clone();
        let jobs = self.jobs_rx.clone();
        let busy = self.busy.clone();
        let halt = self.halt.clone();

        context.recorder.vu_started();
        self.workers.push(tokio::spawn(async move {
            let _guard = VuGuard(&context);
            while jobs.recv().await.is_ok() {
                // NOTE: The worker stays busy through its think time.
                if context.run(&iteration, &halt).await {
                    context.think(&halt).await;
                }
                busy.fetch_sub(1, Ordering::Relaxed);
            }
        }));
    }
}
