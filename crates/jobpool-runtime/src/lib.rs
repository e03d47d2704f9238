//! # jobpool-runtime
//!
//! The scheduler proper, built on the primitives of `jobpool-core`.
//!
//! This crate provides:
//! - The job contract (`Job`, `ReadOnlyJob`) and failure containment
//! - `JobPool`, a lock-coupled list of jobs shared by many workers
//! - Worker threads and worker groups
//! - Per-thread storage for jobs (`LocalStore`) and the `Idle` pacing job
//! - Configuration with environment overrides
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jobpool_runtime::{job_fn, JobPool, WorkerGroup};
//! use jobpool_core::Step;
//!
//! let pool = Arc::new(JobPool::new());
//! pool.add(job_fn(|| Ok(Step::Finish)));
//! let workers = WorkerGroup::spawn(&pool, 4)?;
//! // ...
//! workers.join()?;
//! ```

mod arena;

pub mod config;
pub mod idle;
pub mod job;
pub mod local_store;
pub mod logger;
pub mod pool;
pub mod tls;
pub mod worker;

// Re-exports
pub use config::PoolConfig;
pub use idle::Idle;
pub use job::{job_fn, safe_run, safe_run_read_only, EmptyJob, FnJob, Job, ReadOnlyJob};
pub use local_store::LocalStore;
pub use logger::{JobLogger, KprintLogger, MemoryLogger};
pub use pool::{Cursor, JobPool, HEAD_SENTINEL, TAIL_SENTINEL};
pub use tls::Identifier;
pub use worker::{Worker, WorkerGroup};
