//! RAII guards for `ReadWriteLock`
//!
//! A guard acquires on construction (through the lock's `try_*`/`wait_*`
//! methods) and releases exactly once: on drop, including during
//! unwinding, or earlier through `release`. `leak` detaches a guard from
//! its lock without releasing it, for protocols that keep a lock held
//! across calls and release it later with the lock's unsafe `unlock_*`.

use core::fmt;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

use crate::rwlock::ReadWriteLock;

/// Shared access to the value guarded by a `ReadWriteLock`
#[must_use = "if unused the read lock is released immediately"]
pub struct ReadGuard<'a, T> {
    lock: &'a ReadWriteLock<T>,
}

impl<'a, T> ReadGuard<'a, T> {
    /// Caller must already hold a read lock on `lock`
    #[inline]
    pub(crate) fn new(lock: &'a ReadWriteLock<T>) -> Self {
        ReadGuard { lock }
    }

    /// Release the read lock now
    #[inline]
    pub fn release(self) {
        drop(self);
    }

    /// Keep the read lock held but forget the guard.
    ///
    /// The lock stays held until `ReadWriteLock::unlock_read` is called.
    #[inline]
    pub fn leak(self) -> &'a T {
        let guard = ManuallyDrop::new(self);
        // Safety: the read lock is still held and is never released by this guard
        unsafe { &*guard.lock.data_ptr() }
    }
}

impl<'a, T> Deref for ReadGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: we hold a read lock
        unsafe { &*self.lock.data_ptr() }
    }
}

impl<'a, T> Drop for ReadGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        // Safety: a live guard always owns one read lock
        unsafe { self.lock.unlock_read() }
    }
}

impl<'a, T: fmt::Debug> fmt::Debug for ReadGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Exclusive access to the value guarded by a `ReadWriteLock`
#[must_use = "if unused the write lock is released immediately"]
pub struct WriteGuard<'a, T> {
    lock: &'a ReadWriteLock<T>,
}

impl<'a, T> WriteGuard<'a, T> {
    /// Caller must already hold the write lock on `lock`
    #[inline]
    pub(crate) fn new(lock: &'a ReadWriteLock<T>) -> Self {
        WriteGuard { lock }
    }

    /// Release the write lock now
    #[inline]
    pub fn release(self) {
        drop(self);
    }

    /// Keep the write lock held but forget the guard.
    ///
    /// The lock stays held until `ReadWriteLock::unlock_write` is called.
    #[inline]
    pub fn leak(self) -> &'a mut T {
        let guard = ManuallyDrop::new(self);
        // Safety: the write lock is still held and is never released by this guard
        unsafe { &mut *guard.lock.data_ptr() }
    }
}

impl<'a, T> Deref for WriteGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: we hold the write lock
        unsafe { &*self.lock.data_ptr() }
    }
}

impl<'a, T> DerefMut for WriteGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: we hold the write lock
        unsafe { &mut *self.lock.data_ptr() }
    }
}

impl<'a, T> Drop for WriteGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        // Safety: a live guard always owns the write lock
        unsafe { self.lock.unlock_write() }
    }
}

impl<'a, T: fmt::Debug> fmt::Debug for WriteGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_guard_release_early() {
        let lock = ReadWriteLock::new(1u32);

        let guard = lock.wait_write();
        assert!(lock.is_write_locked());
        guard.release();
        assert!(!lock.is_write_locked());

        let guard = lock.wait_read();
        assert_eq!(lock.reader_count(), 1);
        guard.release();
        assert_eq!(lock.reader_count(), 0);
    }

    #[test]
    fn test_guard_released_on_unwind() {
        let lock = ReadWriteLock::new(Vec::<u32>::new());

        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut guard = lock.wait_write();
            guard.push(1);
            panic!("boom");
        }));

        assert!(result.is_err());
        assert!(!lock.is_write_locked());
        assert_eq!(*lock.wait_read(), vec![1]);

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.wait_read();
            panic!("boom");
        }));

        assert!(result.is_err());
        assert!(!lock.is_read_locked());
    }

    #[test]
    fn test_leak_keeps_lock_held() {
        let lock = ReadWriteLock::new(5u32);

        let value = lock.wait_read().leak();
        assert_eq!(*value, 5);
        assert!(lock.is_read_locked());
        assert!(lock.try_write().is_none());
        unsafe { lock.unlock_read() };
        assert!(!lock.is_read_locked());

        let value = lock.wait_write().leak();
        *value = 6;
        assert!(lock.try_read().is_none());
        unsafe { lock.unlock_write() };
        assert_eq!(*lock.wait_read(), 6);
    }

    #[test]
    fn test_guard_debug_shows_value() {
        let lock = ReadWriteLock::new(42u32);
        let guard = lock.wait_read();
        assert_eq!(format!("{:?}", guard), "42");
    }
}
