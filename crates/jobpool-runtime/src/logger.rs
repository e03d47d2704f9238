//! Logging capability handed to a pool
//!
//! The pool never writes to stderr directly. It logs through an injected
//! `JobLogger` so a host can route scheduler messages wherever it wants;
//! `KprintLogger` forwards to the `kprint` macros and `MemoryLogger`
//! keeps the lines for inspection.

use std::fmt;

use jobpool_core::kprint::{self, LogLevel};
use jobpool_core::ReadWriteLock;

/// Sink for scheduler log lines
pub trait JobLogger: Send + Sync {
    /// Emit one line at `level`
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>);
}

/// Default logger: leveled lines on stderr through `kprint`
#[derive(Debug, Default, Clone, Copy)]
pub struct KprintLogger;

impl JobLogger for KprintLogger {
    #[inline]
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        kprint::_klog_impl(level, args);
    }
}

/// Logger that records every line in memory
///
/// Ignores `JP_LOG_LEVEL`; every line is kept.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: ReadWriteLock<Vec<(LogLevel, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded lines
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.wait_read().clone()
    }

    /// Check whether any line at `level` contains `needle`
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lines
            .wait_read()
            .iter()
            .any(|(l, line)| *l == level && line.contains(needle))
    }

    /// Number of lines recorded at `level`
    pub fn count(&self, level: LogLevel) -> usize {
        self.lines.wait_read().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn clear(&self) {
        self.lines.wait_write().clear();
    }
}

impl JobLogger for MemoryLogger {
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let line = fmt::format(args);
        self.lines.wait_write().push((level, line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_logger_records() {
        let logger = MemoryLogger::new();
        logger.log(LogLevel::Error, format_args!("job '{}' failed", "loader"));
        logger.log(LogLevel::Debug, format_args!("added {}", 3));

        assert_eq!(logger.lines().len(), 2);
        assert!(logger.contains(LogLevel::Error, "loader"));
        assert!(!logger.contains(LogLevel::Warn, "loader"));
        assert_eq!(logger.count(LogLevel::Debug), 1);

        logger.clear();
        assert!(logger.lines().is_empty());
    }

    #[test]
    fn test_logger_as_trait_object() {
        let logger: std::sync::Arc<dyn JobLogger> = std::sync::Arc::new(KprintLogger);
        let prev = kprint::log_level();
        kprint::set_log_level(LogLevel::Off);
        logger.log(LogLevel::Info, format_args!("discarded"));
        kprint::set_log_level(prev);
    }
}
