//! # jobpool - Cooperative Job Scheduler
//!
//! A fixed set of worker threads shares one list of jobs. Each worker
//! walks the list, runs every job it can claim for one short slice, and
//! removes the jobs that report they are done. There is no dispatcher
//! thread and no global lock: workers move through the list with lock
//! coupling and restructure it with per-node locks.
//!
//! ## Quick Start
//!
//! ```ignore
//! use jobpool::{job_fn, PoolConfig, Runtime, Step};
//!
//! fn main() -> jobpool::PoolResult<()> {
//!     let mut runtime = Runtime::new(PoolConfig::from_env().num_workers(4))?;
//!
//!     let mut left = 10;
//!     runtime.add(job_fn(move || {
//!         left -= 1;
//!         Ok(if left == 0 { Step::Finish } else { Step::Yield })
//!     }));
//!
//!     runtime.block_on(|pool| {
//!         while pool.count() > 1 {
//!             std::thread::sleep(std::time::Duration::from_millis(1));
//!         }
//!     })
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Host code                              │
//! │         Runtime::new, add, add_read_only, block_on          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       JobPool                               │
//! │     HEAD <-> job <-> job <-> ... <-> TAIL  (+ parked adds)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!          ┌───────────────────┼───────────────────┐
//!          │                   │                   │
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Worker   │      │  Worker   │      │  Worker   │
//!    │  Thread   │      │  Thread   │      │  Thread   │
//!    └───────────┘      └───────────┘      └───────────┘
//! ```

// Re-export core types
pub use jobpool_core::{
    JobError,
    JobId,
    JobResult,
    JobState,
    PoolError,
    PoolResult,
    ReadGuard,
    ReadWriteLock,
    Step,
    WorkerError,
    WriteGuard,
};

// Re-export kprint macros for logging
pub use jobpool_core::{kerror, kinfo, kdebug};
pub use jobpool_core::kprint::{LogLevel, log_level, set_log_level};

// Re-export env utilities
pub use jobpool_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use jobpool_runtime::{
    job_fn,
    Cursor,
    EmptyJob,
    FnJob,
    Identifier,
    Idle,
    Job,
    JobLogger,
    JobPool,
    KprintLogger,
    LocalStore,
    MemoryLogger,
    PoolConfig,
    ReadOnlyJob,
    Worker,
    WorkerGroup,
};

use std::sync::Arc;

/// Runtime handle owning a pool and its workers
///
/// Workers are always joined before the pool can be dropped: the runtime
/// joins them in `shutdown` or on drop, and every worker keeps the pool
/// alive through its own `Arc`.
pub struct Runtime {
    config: PoolConfig,
    pool: Arc<JobPool>,
    workers: Option<WorkerGroup>,
    idle: Option<JobId>,
}

impl Runtime {
    /// Create a runtime with a validated configuration
    ///
    /// No worker runs until `start()` or `block_on()`.
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        Self::with_logger(config, Arc::new(KprintLogger))
    }

    /// Create a runtime whose pool logs through `logger`
    pub fn with_logger(config: PoolConfig, logger: Arc<dyn JobLogger>) -> PoolResult<Self> {
        config.validate()?;
        if config.debug_logging {
            set_log_level(LogLevel::Debug);
        }

        Ok(Self {
            config,
            pool: Arc::new(JobPool::with_logger(logger)),
            workers: None,
            idle: None,
        })
    }

    #[inline]
    pub fn pool(&self) -> &Arc<JobPool> {
        &self.pool
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Hand a job to the pool
    pub fn add<J: Job + 'static>(&self, job: J) -> JobId {
        self.pool.add(job)
    }

    /// Hand a job that may run on many workers at once to the pool
    pub fn add_read_only<J: ReadOnlyJob + 'static>(&self, job: J) -> JobId {
        self.pool.add_read_only(job)
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.workers.is_some()
    }

    /// Id of the idle job, once registered by `start`
    #[inline]
    pub fn idle_job(&self) -> Option<JobId> {
        self.idle
    }

    /// Spawn the workers
    ///
    /// Registers the idle job first if enabled (only once per runtime).
    pub fn start(&mut self) -> PoolResult<()> {
        if self.workers.is_some() {
            return Err(PoolError::AlreadyStarted);
        }

        if self.config.enable_idle && self.idle.is_none() {
            self.idle = Some(self.pool.add_read_only(Idle::new(self.config.idle_period)));
        }

        let workers = WorkerGroup::spawn_named(
            &self.pool,
            self.config.num_workers,
            &self.config.thread_name_prefix,
        )?;
        kinfo!(
            "jobpool started: {} workers, idle {}",
            workers.len(),
            if self.idle.is_some() { "on" } else { "off" }
        );
        self.workers = Some(workers);
        Ok(())
    }

    /// Stop and join every worker
    ///
    /// Jobs stay in the pool; a later `start` resumes them.
    pub fn shutdown(&mut self) -> PoolResult<()> {
        let workers = self.workers.take().ok_or(PoolError::NotStarted)?;
        let result = workers.join();
        kinfo!("jobpool stopped: {} jobs left", self.pool.count());
        result
    }

    /// Start the workers, run `f`, then shut down
    ///
    /// This is the typical entry point for applications.
    pub fn block_on<F, T>(&mut self, f: F) -> PoolResult<T>
    where
        F: FnOnce(&JobPool) -> T,
    {
        self.start()?;
        let result = f(&*self.pool);
        self.shutdown()?;
        Ok(result)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.workers.is_some() {
            if let Err(e) = self.shutdown() {
                kerror!("jobpool shutdown: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("started", &self.is_started())
            .finish()
    }
}
