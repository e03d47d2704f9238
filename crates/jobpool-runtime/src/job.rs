//! The job contract
//!
//! A job is a unit of cooperative work. Each call to `run` does a short
//! slice of work and reports whether the job wants to be run again
//! (`Step::Yield`) or is done (`Step::Finish`).
//!
//! Jobs that are safe to run on several workers at once implement
//! `ReadOnlyJob` instead of `Job`: `run` takes `&self` and the type must
//! be `Sync`, so the compiler checks the concurrency claim.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use jobpool_core::kprint::LogLevel;
use jobpool_core::{JobError, JobResult, Step};

use crate::logger::JobLogger;

/// A job run by at most one worker at a time
pub trait Job: Send {
    /// Do one slice of work
    fn run(&mut self) -> JobResult;

    /// Label used in log lines
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A job that may be run by many workers at the same time
pub trait ReadOnlyJob: Send + Sync {
    /// Do one slice of work; may be called concurrently
    fn run(&self) -> JobResult;

    /// Label used in log lines
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Job that does nothing and never finishes
///
/// Used as the body of the list sentinels.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyJob;

impl ReadOnlyJob for EmptyJob {
    #[inline]
    fn run(&self) -> JobResult {
        Ok(Step::Yield)
    }

    fn name(&self) -> &str {
        "empty"
    }
}

/// Job built from a closure
pub struct FnJob<F> {
    name: String,
    f: F,
}

impl<F> FnJob<F>
where
    F: FnMut() -> JobResult + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        FnJob { name: name.into(), f }
    }
}

impl<F> Job for FnJob<F>
where
    F: FnMut() -> JobResult + Send,
{
    #[inline]
    fn run(&mut self) -> JobResult {
        (self.f)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnJob<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Wrap a closure as an anonymous job
///
/// ```ignore
/// let mut left = 3;
/// pool.add(job_fn(move || {
///     left -= 1;
///     Ok(if left == 0 { Step::Finish } else { Step::Yield })
/// }));
/// ```
pub fn job_fn<F>(f: F) -> FnJob<F>
where
    F: FnMut() -> JobResult + Send,
{
    FnJob::new("fn-job", f)
}

/// A job as stored by the pool
pub(crate) enum JobBody {
    Exclusive(Box<dyn Job>),
    ReadOnly(Box<dyn ReadOnlyJob>),
}

// Safety: `Exclusive` is only reached through the write side of the node's
// run lock, so a `dyn Job` is never touched by two threads at once.
// `ReadOnly` bodies are `Sync` themselves.
unsafe impl Sync for JobBody {}

impl fmt::Debug for JobBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobBody::Exclusive(_) => write!(f, "JobBody::Exclusive"),
            JobBody::ReadOnly(job) => write!(f, "JobBody::ReadOnly({})", job.name()),
        }
    }
}

/// Run an exclusive job once, containing failure
///
/// An `Err` or a panic from `run` is logged at error level and turned
/// into `Step::Finish`, so the job is removed and the worker carries on.
pub fn safe_run<J: Job + ?Sized>(job: &mut J, logger: &dyn JobLogger) -> Step {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run()));
    contain(outcome, job.name(), logger)
}

/// Run a read-only job once, containing failure
pub fn safe_run_read_only<J: ReadOnlyJob + ?Sized>(job: &J, logger: &dyn JobLogger) -> Step {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run()));
    contain(outcome, job.name(), logger)
}

fn contain(outcome: thread::Result<JobResult>, name: &str, logger: &dyn JobLogger) -> Step {
    let err = match outcome {
        Ok(Ok(step)) => return step,
        Ok(Err(err)) => err,
        Err(payload) => JobError::Panicked(panic_message(payload.as_ref())),
    };
    logger.log(LogLevel::Error, format_args!("job '{}' failed: {}", name, err));
    Step::Finish
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemoryLogger;

    struct Countdown(u32);

    impl Job for Countdown {
        fn run(&mut self) -> JobResult {
            self.0 -= 1;
            Ok(if self.0 == 0 { Step::Finish } else { Step::Yield })
        }
    }

    #[test]
    fn test_safe_run_passes_step_through() {
        let logger = MemoryLogger::new();
        let mut job = Countdown(2);

        assert_eq!(safe_run(&mut job, &logger), Step::Yield);
        assert_eq!(safe_run(&mut job, &logger), Step::Finish);
        assert!(logger.lines().is_empty());
    }

    #[test]
    fn test_safe_run_contains_error() {
        let logger = MemoryLogger::new();
        let mut job = FnJob::new("loader", || Err(JobError::failed("module missing")));

        assert_eq!(safe_run(&mut job, &logger), Step::Finish);
        assert!(logger.contains(LogLevel::Error, "job 'loader' failed: module missing"));
    }

    #[test]
    fn test_safe_run_contains_panic() {
        let logger = MemoryLogger::new();
        let mut job = FnJob::new("boom", || -> JobResult { panic!("bad state {}", 7) });

        assert_eq!(safe_run(&mut job, &logger), Step::Finish);
        assert!(logger.contains(LogLevel::Error, "panicked: bad state 7"));
    }

    #[test]
    fn test_read_only_and_empty_job() {
        let logger = MemoryLogger::new();
        assert_eq!(safe_run_read_only(&EmptyJob, &logger), Step::Yield);
        assert_eq!(EmptyJob.name(), "empty");
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert!(Countdown(1).name().ends_with("Countdown"));
        assert_eq!(job_fn(|| Ok(Step::Finish)).name(), "fn-job");
    }
}
