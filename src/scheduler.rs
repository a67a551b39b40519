//! Fixed-interval driver for the motion tick.
//!
//! Ticks run back to back on the calling thread and never overlap. The
//! interval is measured from the start of one tick to the start of the next;
//! a tick that outlasts the interval is counted as an overrun and the next one
//! starts immediately. Shutdown is checked between ticks and during waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::monitor::TickOutcome;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub triggers: u64,
    pub capture_failures: u64,
    pub overruns: u64,
    pub worst_case: Duration,
}

pub struct Scheduler {
    interval: Duration,
    startup_delay: Duration,
    shutdown: Arc<AtomicBool>,
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(interval: Duration, startup_delay: Duration, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            interval,
            startup_delay,
            shutdown,
            stats: SchedulerStats::default(),
        }
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Record one tick's outcome and duration.
    pub fn record(&mut self, outcome: &TickOutcome, elapsed: Duration) {
        self.stats.ticks += 1;
        match outcome {
            TickOutcome::Triggered { .. } => self.stats.triggers += 1,
            TickOutcome::CaptureFailed => self.stats.capture_failures += 1,
            _ => {}
        }
        if elapsed > self.interval {
            self.stats.overruns += 1;
            log::warn!(
                "motion tick took {:?}, longer than the {:?} interval",
                elapsed,
                self.interval
            );
        }
        if elapsed > self.stats.worst_case {
            self.stats.worst_case = elapsed;
        }
    }

    /// Tick until the shutdown flag is raised.
    pub fn run<F>(&mut self, mut tick: F) -> &SchedulerStats
    where
        F: FnMut() -> TickOutcome,
    {
        log::info!(
            "scheduler starting in {:?}, checking every {:?}",
            self.startup_delay,
            self.interval
        );
        self.sleep_until(Instant::now() + self.startup_delay);

        while !self.stopping() {
            let started = Instant::now();
            let outcome = tick();
            let elapsed = started.elapsed();
            self.record(&outcome, elapsed);
            self.sleep_until(started + self.interval);
        }

        log::info!(
            "scheduler stopped after {} ticks ({} triggers, {} capture failures, {} overruns, worst case {:?})",
            self.stats.ticks,
            self.stats.triggers,
            self.stats.capture_failures,
            self.stats.overruns,
            self.stats.worst_case
        );
        &self.stats
    }

    fn sleep_until(&self, deadline: Instant) {
        loop {
            if self.stopping() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
