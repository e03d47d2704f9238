//! Error types for the jobpool scheduler

use core::fmt;

use crate::state::Step;

/// Result type for host-facing pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Result of one invocation of a job
pub type JobResult = Result<Step, JobError>;

/// Errors reported to the process hosting a pool
///
/// Scheduling itself never fails; these cover setup and teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Configuration rejected by validation
    InvalidConfig(&'static str),

    /// Worker thread error
    Worker(WorkerError),

    /// Runtime already started
    AlreadyStarted,

    /// Runtime not started
    NotStarted,

    /// Every job slot index is in use
    ArenaExhausted,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
            PoolError::Worker(e) => write!(f, "worker error: {}", e),
            PoolError::AlreadyStarted => write!(f, "runtime already started"),
            PoolError::NotStarted => write!(f, "runtime not started"),
            PoolError::ArenaExhausted => write!(f, "job arena exhausted"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Worker thread related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Failed to spawn worker thread
    SpawnFailed(String),

    /// Worker thread panicked outside job containment
    Panicked,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed(reason) => {
                write!(f, "failed to spawn worker thread: {}", reason)
            }
            WorkerError::Panicked => write!(f, "worker thread panicked"),
        }
    }
}

impl From<WorkerError> for PoolError {
    fn from(e: WorkerError) -> Self {
        PoolError::Worker(e)
    }
}

/// Failure of a job's `run`
///
/// Contained by the pool: logged, then treated as `Step::Finish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The job reported an error
    Failed(String),

    /// The job panicked; holds the panic message
    Panicked(String),
}

impl JobError {
    /// Build a `Failed` error from any message
    pub fn failed(msg: impl Into<String>) -> Self {
        JobError::Failed(msg.into())
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Failed(msg) => write!(f, "{}", msg),
            JobError::Panicked(msg) => write!(f, "panicked: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

impl From<String> for JobError {
    fn from(msg: String) -> Self {
        JobError::Failed(msg)
    }
}

impl From<&str> for JobError {
    fn from(msg: &str) -> Self {
        JobError::Failed(msg.to_string())
    }
}

impl From<std::io::Error> for JobError {
    fn from(e: std::io::Error) -> Self {
        JobError::Failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = PoolError::InvalidConfig("num_workers must be at least 1");
        assert_eq!(format!("{}", e), "invalid configuration: num_workers must be at least 1");

        let e = PoolError::Worker(WorkerError::Panicked);
        assert_eq!(format!("{}", e), "worker error: worker thread panicked");

        let e = JobError::Panicked("index out of bounds".into());
        assert_eq!(format!("{}", e), "panicked: index out of bounds");
    }

    #[test]
    fn test_error_conversion() {
        let pool_err: PoolError = WorkerError::SpawnFailed("EAGAIN".into()).into();
        assert!(matches!(pool_err, PoolError::Worker(WorkerError::SpawnFailed(_))));

        let job_err: JobError = "socket closed".into();
        assert_eq!(job_err, JobError::failed("socket closed"));

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let job_err: JobError = io.into();
        assert_eq!(job_err, JobError::Failed("pipe gone".into()));
    }

    #[test]
    fn test_question_mark_in_job_body() {
        fn step(fail: bool) -> JobResult {
            if fail {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "no route"))?;
            }
            Ok(Step::Yield)
        }

        assert_eq!(step(false), Ok(Step::Yield));
        assert_eq!(step(true), Err(JobError::Failed("no route".into())));
    }
}
