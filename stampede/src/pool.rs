use crate::error::RequestFailure;
use crate::iteration::IterationContext;
use crate::signal::StopSignal;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// A set of long-lived workers, each running iterations back to back.
///
/// Worker `i` keeps going while `i < concurrency`, so lowering the concurrency lets the excess
/// workers finish their current iteration and exit on their own. Slots are refilled by
/// [`WorkerPool::reconcile`].
pub(crate) struct WorkerPool<T> {
    iteration: T,
    context: IterationContext,
    concurrency: Arc<AtomicUsize>,
    halt: StopSignal,
    workers: Vec<JoinHandle<()>>,
}

impl<T, F> WorkerPool<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = Result<(), RequestFailure>> + Send + 'static,
{
    pub fn new(iteration: T, context: IterationContext) -> Self {
        Self {
            iteration,
            context,
            concurrency: Arc::new(AtomicUsize::new(0)),
            halt: StopSignal::new(),
            workers: vec![],
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.load(Ordering::Relaxed)
    }

    pub fn set_concurrency(&mut self, concurrency: usize) {
        let previous = self.concurrency.swap(concurrency, Ordering::Relaxed);
        if previous != concurrency {
            trace!("Setting concurrency to: {concurrency}");
        }
        self.reconcile();
    }

    /// Bring the set of running workers in line with the current concurrency.
    pub fn reconcile(&mut self) {
        if self.halt.is_stopped() {
            return;
        }
        let concurrency = self.concurrency();

        // NOTE: A slot below the target can be finished if the target dipped and came back.
        for id in 0..self.workers.len().min(concurrency) {
            if self.workers[id].is_finished() {
                let worker = self.spawn_worker(id);
                self.workers[id] = worker;
            }
        }

        while self.workers.len() < concurrency {
            let worker = self.spawn_worker(self.workers.len());
            self.workers.push(worker);
        }

        while self.workers.len() > concurrency
            && self.workers.last().is_some_and(JoinHandle::is_finished)
        {
            self.workers.pop();
        }
    }

    /// Workers that have not exited yet, including ones draining their last iteration.
    pub fn active(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Stop every worker. In-flight iterations get until `grace` elapses to finish, after which
    /// they are aborted. Returns the number of aborted workers.
    pub async fn shutdown(mut self, grace: Duration) -> usize {
        self.halt.stop();
        self.concurrency.store(0, Ordering::Relaxed);
        join_or_abort(std::mem::take(&mut self.workers), grace).await
    }

    fn spawn_worker(&self, id: usize) -> JoinHandle<()> {
        let iteration = self.iteration.clone();
        let context = self.context.clone();
        let concurrency = self.concurrency.clone();
        let halt = self.halt.clone();

        context.recorder.vu_started();
        tokio::spawn(async move {
            let _guard = VuGuard(&context);
            while id < concurrency.load(Ordering::Relaxed) && !halt.is_stopped() {
                if !context.run(&iteration, &halt).await || !context.think(&halt).await {
                    break;
                }
            }
        })
    }
}

/// Keeps the active worker count right even when a worker is aborted mid-iteration.
pub(crate) struct VuGuard<'a>(pub &'a IterationContext);

impl Drop for VuGuard<'_> {
    fn drop(&mut self) {
        self.0.recorder.vu_stopped();
    }
}

/// Await every handle until `grace` from now, then abort whatever is left.
pub(crate) async fn join_or_abort(workers: Vec<JoinHandle<()>>, grace: Duration) -> usize {
    let deadline = Instant::now() + grace;
    let mut aborted = 0;
    for mut worker in workers {
        if tokio::time::timeout_at(deadline, &mut worker).await.is_err() {
            worker.abort();
            aborted += 1;
        }
    }
    if aborted > 0 {
        warn!("Aborted {aborted} workers still running after the graceful stop period.");
    }
    aborted
}
