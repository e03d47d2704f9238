//! Idle job: paces workers when there is little to do
//!
//! Every worker runs the idle job once per lap of the job list. Each run
//! sleeps for whatever is left of the cycle period since that worker last
//! left the idle job, so a busy worker passes straight through and an idle
//! one goes round at most once per period.

use std::thread;
use std::time::{Duration, Instant};

use jobpool_core::{JobResult, Step};

use crate::job::ReadOnlyJob;
use crate::local_store::LocalStore;

pub struct Idle {
    period: Duration,
    /// When each worker last left this job
    left_at: LocalStore<Option<Instant>>,
}

impl Idle {
    pub fn new(period: Duration) -> Self {
        Idle {
            period,
            left_at: LocalStore::new(),
        }
    }

    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time this thread would sleep if it ran the job now
    fn remaining(&self, now: Instant) -> Duration {
        self.left_at.with(|left_at| {
            // A worker's first visit counts as having just left
            let elapsed = left_at.map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
            self.period.saturating_sub(elapsed)
        })
    }
}

impl ReadOnlyJob for Idle {
    fn run(&self) -> JobResult {
        let wait = self.remaining(Instant::now());
        if !wait.is_zero() {
            thread::sleep(wait);
        }
        self.left_at.with(|left_at| *left_at = Some(Instant::now()));
        Ok(Step::Yield)
    }

    fn name(&self) -> &str {
        "idle"
    }
}

impl std::fmt::Debug for Idle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Idle").field("period", &self.period).finish()
    }
}
