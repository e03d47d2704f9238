//! Environment variable utilities
//!
//! Generic `env_get<T>` function for parsing environment variables with defaults.
//! All jobpool knobs live under the `JP_` prefix.
//!
//! # Usage
//!
//! ```ignore
//! use jobpool_core::env::{env_get, env_get_bool, env_get_micros};
//!
//! let workers: usize = env_get("JP_NUM_WORKERS", 4);
//! let idle = env_get_micros("JP_IDLE_PERIOD_US", Duration::from_millis(100));
//! let debug: bool = env_get_bool("JP_DEBUG", false);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as type T, or return default
///
/// Works with any type that implements `FromStr`. A value that fails to
/// parse is treated as unset.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts: "1", "true", "yes", "on" (case-insensitive) as true.
/// Any other value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as optional value
///
/// Returns `Some(T)` if the variable is set and parses successfully,
/// `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a duration given in whole microseconds, or return default
#[inline]
pub fn env_get_micros(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key)
        .map(Duration::from_micros)
        .unwrap_or(default)
}

/// Check if environment variable is set (regardless of value)
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}
