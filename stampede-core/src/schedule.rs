//! Stage schedules and their load curves.
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One leg of a [`Schedule`]: ramp linearly to `target` over `duration`.
///
/// A zero `duration` is an instantaneous jump to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "crate::duration_str")]
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub const fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Ordered stages describing how load (concurrency or arrival rate) evolves over a scenario.
///
/// The curve starts at `start` and is piecewise linear between stage boundaries. Once the elapsed
/// time passes the sum of all stage durations the schedule is complete. An empty schedule is
/// complete immediately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    start: u64,
    stages: Vec<Stage>,
}

impl Schedule {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { start: 0, stages }
    }

    /// A flat schedule holding `target` for `duration`.
    pub fn constant(duration: Duration, target: u64) -> Self {
        Self {
            start: target,
            stages: vec![Stage::new(duration, target)],
        }
    }

    pub fn starting_at(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    pub fn start_target(&self) -> u64 {
        self.start
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest load the curve ever reaches.
    pub fn peak_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u64::max)
    }

    /// Instantaneous target load at `elapsed`, or `None` once the schedule is complete.
    ///
    /// At a stage boundary the later stage wins, so the value at the first instant of a stage is
    /// that stage's start target (the previous stage's end target).
    pub fn target_at(&self, elapsed: Duration) -> Option<f64> {
        let mut from = self.start as f64;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                // NOTE: elapsed >= stage_start here, so the stage has a non-zero duration.
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return Some(from + (stage.target as f64 - from) * progress);
            }
            from = stage.target as f64;
            stage_start = stage_end;
        }

        if !self.stages.is_empty() && elapsed <= stage_start {
            Some(from)
        } else {
            None
        }
    }

    /// Area under the load curve from zero to `elapsed`, in target-seconds.
    ///
    /// For an arrival-rate schedule expressed per second this is the number of iterations that
    /// should have started by `elapsed`.
    pub fn area_until(&self, elapsed: Duration) -> f64 {
        let mut from = self.start as f64;
        let mut stage_start = Duration::ZERO;
        let mut area = 0.;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            let to = stage.target as f64;
            let secs = stage.duration.as_secs_f64();

            if elapsed < stage_end {
                let tau = (elapsed - stage_start).as_secs_f64();
                return area + from * tau + (to - from) * tau * tau / (2. * secs);
            }

            area += (from + to) / 2. * secs;
            from = to;
            stage_start = stage_end;
        }

        area
    }

    /// Inverse of [`Schedule::area_until`]: the elapsed time at which the area under the curve
    /// reaches `area`, or `None` if the schedule completes first.
    pub fn time_of_area(&self, area: f64) -> Option<Duration> {
        let mut remaining = area.max(0.);
        let mut from = self.start as f64;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let to = stage.target as f64;
            let secs = stage.duration.as_secs_f64();
            let stage_area = (from + to) / 2. * secs;

            if stage_area > 0. && remaining < stage_area {
                let tau = solve_ramp(from, to, secs, remaining).clamp(0., secs);
                return Some(stage_start + Duration::from_secs_f64(tau));
            }

            remaining -= stage_area;
            from = to;
            stage_start += stage.duration;
        }

        None
    }

    /// Every target multiplied by `factor`, rounded to the nearest integer.
    pub fn scaled(&self, factor: f64) -> Schedule {
        let scale = |v: u64| (v as f64 * factor).round().max(0.) as u64;
        Schedule {
            start: scale(self.start),
            stages: self
                .stages
                .iter()
                .map(|s| Stage::new(s.duration, scale(s.target)))
                .collect(),
        }
    }

    /// Split the schedule into one schedule per weight.
    ///
    /// Every target is apportioned with the largest-remainder method, so at each stage boundary
    /// the split targets sum exactly to the original target.
    pub fn split(&self, weights: &[u32]) -> Vec<Schedule> {
        let starts = apportion(self.start, weights);
        let mut parts: Vec<Schedule> = starts
            .into_iter()
            .map(|start| Schedule {
                start,
                stages: Vec::with_capacity(self.stages.len()),
            })
            .collect();

        for stage in &self.stages {
            for (part, target) in parts.iter_mut().zip(apportion(stage.target, weights)) {
                part.stages.push(Stage::new(stage.duration, target));
            }
        }

        parts
    }
}

/// Time into a linear ramp (`from` to `to` over `secs`) at which the covered area equals `area`.
fn solve_ramp(from: f64, to: f64, secs: f64, area: f64) -> f64 {
    if area <= 0. {
        return 0.;
    }
    let slope = (to - from) / secs;
    let disc = (from * from + 2. * slope * area).max(0.);
    // Rationalised root of slope/2 t^2 + from t - area = 0; stable as slope approaches zero.
    2. * area / (from + disc.sqrt())
}

/// Largest-remainder apportionment of `total` across `weights`.
pub fn apportion(total: u64, weights: &[u32]) -> Vec<u64> {
    let sum: u128 = weights.iter().map(|w| *w as u128).sum();
    if sum == 0 {
        return vec![0; weights.len()];
    }

    let mut shares = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (idx, w) in weights.iter().enumerate() {
        let exact = total as u128 * *w as u128;
        shares.push((exact / sum) as u64);
        remainders.push((exact % sum, idx));
    }

    let assigned: u64 = shares.iter().sum();
    let leftover = (total - assigned) as usize;
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, idx) in remainders.into_iter().take(leftover) {
        shares[idx] += 1;
    }

    shares
}
