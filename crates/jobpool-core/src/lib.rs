//! # jobpool-core
//!
//! Core types for the jobpool cooperative scheduler.
//!
//! This crate knows nothing about worker threads or the job list. It
//! provides the synchronization primitive the scheduler is built on and
//! the small value types shared with the runtime.
//!
//! ## Modules
//!
//! - `rwlock` - Spinning reader/writer lock (`ReadWriteLock`)
//! - `guard` - RAII read and write guards for `ReadWriteLock`
//! - `id` - Job identifier type
//! - `state` - Job lifecycle state and run outcome
//! - `slot` - Slot allocator for arena-resident job nodes
//! - `error` - Error types
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

pub mod rwlock;
pub mod guard;
pub mod id;
pub mod state;
pub mod slot;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use rwlock::{RawRwSpinLock, ReadWriteLock, MAX_READERS};
pub use guard::{ReadGuard, WriteGuard};
pub use id::JobId;
pub use state::{JobState, Step};
pub use slot::SlotAllocator;
pub use error::{JobError, JobResult, PoolError, PoolResult, WorkerError};
pub use env::{env_get, env_get_bool, env_get_micros, env_get_opt, env_get_str, env_is_set};

/// Constants shared by the runtime
pub mod constants {
    /// Maximum workers (OS threads) a single pool is configured for
    pub const MAX_WORKERS: usize = 64;

    /// Largest slot index the arena hands out; `u32::MAX` is `JobId::NONE`
    pub const MAX_JOB_SLOTS: u32 = u32::MAX - 1;

    /// Cache line size for alignment
    pub const CACHE_LINE_SIZE: usize = 64;
}
