//! Pool configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls on the config value
//! 2. Environment variables (`from_env`)
//! 3. Library defaults (`defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use jobpool_runtime::config::PoolConfig;
//!
//! let config = PoolConfig::from_env()
//!     .num_workers(8)
//!     .idle_period(Duration::from_millis(10));
//! config.validate()?;
//! ```

use std::time::Duration;

use jobpool_core::constants::MAX_WORKERS;
use jobpool_core::env::{env_get, env_get_bool, env_get_micros, env_get_str};
use jobpool_core::{PoolError, PoolResult};

/// Library defaults
pub mod defaults {
    /// Run the idle job so workers sleep when there is nothing to do
    pub const ENABLE_IDLE: bool = true;

    /// Idle cycle period in microseconds
    pub const IDLE_PERIOD_US: u64 = 100_000;

    pub const DEBUG_LOGGING: bool = false;

    /// Worker threads are named `{prefix}-{index}`
    pub const THREAD_NAME_PREFIX: &str = "jobpool-worker";

    /// One worker per available CPU, capped at `MAX_WORKERS`
    pub fn num_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(super::MAX_WORKERS)
    }
}

/// Configuration for a pool and its workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads
    pub num_workers: usize,
    /// Register the idle job on start
    pub enable_idle: bool,
    /// Cycle period of the idle job
    pub idle_period: Duration,
    /// Log scheduler events at debug level
    pub debug_logging: bool,
    /// Worker thread name prefix
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PoolConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `JP_NUM_WORKERS` - Number of worker threads
    /// - `JP_ENABLE_IDLE` - Register the idle job (0/1)
    /// - `JP_IDLE_PERIOD_US` - Idle cycle period in microseconds
    /// - `JP_DEBUG` - Enable debug logging (0/1)
    /// - `JP_THREAD_PREFIX` - Worker thread name prefix
    pub fn from_env() -> Self {
        let base = Self::new();
        Self {
            num_workers: env_get("JP_NUM_WORKERS", base.num_workers),
            enable_idle: env_get_bool("JP_ENABLE_IDLE", base.enable_idle),
            idle_period: env_get_micros("JP_IDLE_PERIOD_US", base.idle_period),
            debug_logging: env_get_bool("JP_DEBUG", base.debug_logging),
            thread_name_prefix: env_get_str("JP_THREAD_PREFIX", &base.thread_name_prefix),
        }
    }

    /// Create config with library defaults (no env override).
    /// Useful for testing or when you want full control.
    pub fn new() -> Self {
        Self {
            num_workers: defaults::num_workers(),
            enable_idle: defaults::ENABLE_IDLE,
            idle_period: Duration::from_micros(defaults::IDLE_PERIOD_US),
            debug_logging: defaults::DEBUG_LOGGING,
            thread_name_prefix: defaults::THREAD_NAME_PREFIX.to_string(),
        }
    }

    // Builder methods

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn enable_idle(mut self, enable: bool) -> Self {
        self.enable_idle = enable;
        self
    }

    pub fn idle_period(mut self, d: Duration) -> Self {
        self.idle_period = d;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> PoolResult<()> {
        if self.num_workers == 0 {
            return Err(PoolError::InvalidConfig("num_workers must be > 0"));
        }
        if self.num_workers > MAX_WORKERS {
            return Err(PoolError::InvalidConfig("num_workers must be <= 64"));
        }
        if self.enable_idle && self.idle_period.is_zero() {
            return Err(PoolError::InvalidConfig(
                "idle_period must be > 0 when the idle job is enabled",
            ));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(PoolError::InvalidConfig("thread_name_prefix must not be empty"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("jobpool configuration:");
        eprintln!("  num_workers:          {}", self.num_workers);
        eprintln!("  enable_idle:          {}", self.enable_idle);
        eprintln!("  idle_period:          {:?}", self.idle_period);
        eprintln!("  debug_logging:        {}", self.debug_logging);
        eprintln!("  thread_name_prefix:   {}", self.thread_name_prefix);
    }
}
