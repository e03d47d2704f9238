//! Kernel-style print macros for jobpool
//!
//! Leveled output to stderr, one locked write per line, similar to the
//! Linux kernel's printk. Lines written from a worker thread carry the
//! worker's tag (`[w3]`) once the worker has called `set_worker_tag`.
//!
//! # Environment Variables
//!
//! - `JP_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0..5)
//!
//! # Usage
//!
//! ```ignore
//! use jobpool_core::{kdebug, kinfo, kerror};
//!
//! kinfo!("worker {} started", index);
//! kdebug!("job {} yielded", id);
//! kerror!("job '{}' failed: {}", name, err);
//! ```

use std::cell::Cell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or number as accepted by `JP_LOG_LEVEL`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

// Global configuration (initialized once)
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Sentinel for "not a worker thread"
const NO_WORKER: u32 = u32::MAX;

thread_local! {
    /// Worker index shown in the line prefix
    static WORKER_TAG: Cell<u32> = const { Cell::new(NO_WORKER) };
}

/// Read `JP_LOG_LEVEL` on first use
fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(val) = std::env::var("JP_LOG_LEVEL") {
        let level = LogLevel::parse(&val).unwrap_or(LogLevel::Info);
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

/// Get current log level
#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically (overrides `JP_LOG_LEVEL`)
pub fn set_log_level(level: LogLevel) {
    // Claim init first so a later lazy init cannot clobber this
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Check if a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as u8 <= log_level() as u8
}

/// Tag this thread's log lines with a worker index
pub fn set_worker_tag(index: u32) {
    WORKER_TAG.with(|cell| cell.set(index));
}

/// Stop tagging this thread's log lines
pub fn clear_worker_tag() {
    WORKER_TAG.with(|cell| cell.set(NO_WORKER));
}

/// Worker index this thread is tagged with, if any
pub fn worker_tag() -> Option<u32> {
    let tag = WORKER_TAG.with(|cell| cell.get());
    if tag == NO_WORKER {
        None
    } else {
        Some(tag)
    }
}

/// Internal: Leveled print
#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = match worker_tag() {
        Some(tag) => write!(handle, "{} [w{}] ", level.prefix(), tag),
        None => write!(handle, "{} ", level.prefix()),
    };
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
}

// ============================================================================
// Public Macros
// ============================================================================

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Error,
            format_args!($($arg)*)
        );
    }};
}

/// Info level log
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Info,
            format_args!($($arg)*)
        );
    }};
}

/// Debug level log
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Debug,
            format_args!($($arg)*)
        );
    }};
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse(" WARN "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("5"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_worker_tag_is_thread_local() {
        set_worker_tag(7);
        assert_eq!(worker_tag(), Some(7));

        let other = std::thread::spawn(worker_tag).join().unwrap();
        assert_eq!(other, None);

        clear_worker_tag();
        assert_eq!(worker_tag(), None);
    }

    #[test]
    fn test_macros_compile() {
        let prev = log_level();
        set_log_level(LogLevel::Off);

        kerror!("error {}", "msg");
        kinfo!("info");
        kdebug!("debug");
        assert!(!level_enabled(LogLevel::Error));

        set_log_level(prev);
    }
}
