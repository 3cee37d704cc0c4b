use stampede_core::Schedule;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum LoadTarget {
    /// Instantaneous concurrency, or arrivals per time unit.
    Active(f64),
    Complete,
}

/// Maps wall-clock time since the scenario started onto its [`Schedule`].
///
/// All the logic lives in [`LoadController::target_at`], a pure function of the elapsed time; the
/// controller only pins the monotonic start instant.
#[derive(Debug, Clone)]
pub struct LoadController {
    schedule: Schedule,
    start: Instant,
}

impl LoadController {
    pub fn new(schedule: Schedule) -> Self {
        Self::starting_at(schedule, Instant::now())
    }

    pub fn starting_at(schedule: Schedule, start: Instant) -> Self {
        Self { schedule, start }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn target_at(&self, elapsed: Duration) -> LoadTarget {
        match self.schedule.target_at(elapsed) {
            Some(target) => LoadTarget::Active(target),
            None => LoadTarget::Complete,
        }
    }

    pub fn current(&self) -> LoadTarget {
        self.target_at(self.elapsed())
    }
}
