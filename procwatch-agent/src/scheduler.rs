//! Cycle scheduling for the agent
//!
//! - `interval == 0`: run one cycle and return
//! - `interval > 0`: run forever on a fixed grid, target(n+1) = target(n) + interval
//!
//! An interval too large to add to an `Instant` falls back to a plain
//! sleep of one interval per cycle.
//!
//! An overrunning cycle is followed immediately by the next one; the
//! sleep is clamped at zero and the grid is kept, so lateness never
//! accumulates.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::Clock;

/// Unit of work executed once per cycle
pub trait Job {
    fn run_cycle(&mut self) -> impl Future<Output = ()>;
}

pub struct Scheduler<C> {
    interval: Duration,
    clock: C,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(interval: Duration, clock: C) -> Self {
        Self { interval, clock }
    }

    pub fn is_one_shot(&self) -> bool {
        self.interval.is_zero()
    }

    /// Runs the job per the configured mode. Only returns in one-shot mode.
    pub async fn run<J: Job>(&self, job: &mut J) {
        self.drive(job, None).await;
    }

    /// Returns the number of completed cycles.
    pub(crate) async fn drive<J: Job>(&self, job: &mut J, max_cycles: Option<u64>) -> u64 {
        if self.is_one_shot() {
            job.run_cycle().await;
            return 1;
        }

        let mut target = self.clock.now();
        let mut completed = 0u64;

        loop {
            job.run_cycle().await;
            completed += 1;
            if max_cycles.is_some_and(|max| completed >= max) {
                return completed;
            }

            match target.checked_add(self.interval) {
                Some(next) => {
                    target = next;
                    let wait = target.saturating_duration_since(self.clock.now());
                    if wait.is_zero() {
                        debug!(cycle = completed, "cycle overran interval, starting next immediately");
                    } else {
                        self.clock.sleep(wait).await;
                    }
                }
                None => {
                    // next target not representable as an Instant
                    warn!(cycle = completed, "interval too large for the schedule grid, sleeping a full interval");
                    self.clock.sleep(self.interval).await;
                }
            }
        }
    }
}
