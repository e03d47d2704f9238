//! Spinning reader/writer lock
//!
//! One `AtomicU32` state word per lock: bit 31 is the writer flag, bit 30
//! marks a writer waiting for the lock, the low 30 bits count active
//! readers. Every transition is a single compare-exchange on that word, so
//! "no writer" checks and reader increments can never be split by a
//! competing writer.
//!
//! A waiting writer blocks new readers. Without that, a lock that always
//! has at least one reader (a node whose job sleeps while it runs) would
//! never be handed to a writer.
//!
//! Critical sections guarded by these locks are a handful of loads and
//! stores (list pointer updates), so waiters spin instead of parking.

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::guard::{ReadGuard, WriteGuard};

/// Writer flag in the state word
const WRITER: u32 = 1 << 31;

/// A writer is waiting; set by `wait_write`, cleared when a writer gets in
const PENDING: u32 = 1 << 30;

/// Reader count bits in the state word
const READER_MASK: u32 = PENDING - 1;

/// Maximum number of concurrent readers a lock can count.
///
/// Reaching it is a fatal assertion; the count never carries into the
/// flag bits.
pub const MAX_READERS: u32 = READER_MASK;

/// Spin rounds (as a power of two) before falling back to `yield_now`
const SPIN_LIMIT: u32 = 6;

/// Exponential spin backoff used by the waiting acquire paths
struct Backoff {
    step: u32,
}

impl Backoff {
    #[inline]
    fn new() -> Self {
        Backoff { step: 0 }
    }

    #[inline]
    fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                core::hint::spin_loop();
            }
            self.step += 1;
        } else {
            // Holder was probably descheduled; let it run.
            std::thread::yield_now();
        }
    }
}

/// Reader/writer spin lock state without guarded data.
///
/// Used directly by structures that need the locking protocol but keep
/// their protected fields elsewhere, and as the state of `ReadWriteLock`.
pub struct RawRwSpinLock {
    state: AtomicU32,
}

impl RawRwSpinLock {
    /// Create an unlocked lock
    #[inline]
    pub const fn new() -> Self {
        RawRwSpinLock {
            state: AtomicU32::new(0),
        }
    }

    /// Try to take the write lock without spinning.
    ///
    /// Succeeds only if there is no writer and no reader. Taking the lock
    /// clears the pending mark; other waiting writers set it again.
    #[inline]
    pub fn try_write(&self) -> bool {
        let current = self.state.load(Ordering::Relaxed);
        current & !PENDING == 0
            && self
                .state
                .compare_exchange(current, WRITER, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    /// Take the write lock, spinning until no writer and no reader remain.
    ///
    /// While waiting, the pending mark keeps new readers out, so the
    /// readers already inside drain away. The writer flag is only ever set
    /// while the reader count is zero; a waiting writer never holds the
    /// flag against readers.
    #[inline]
    pub fn wait_write(&self) {
        let mut backoff = Backoff::new();
        loop {
            if self.try_write() {
                return;
            }
            let current = self.state.load(Ordering::Relaxed);
            if current & PENDING == 0 {
                self.state.fetch_or(PENDING, Ordering::Relaxed);
            }
            backoff.snooze();
        }
    }

    /// Release the write lock.
    ///
    /// # Safety
    ///
    /// The calling context must hold the write lock.
    #[inline]
    pub unsafe fn unlock_write(&self) {
        let prev = self.state.fetch_and(!WRITER, Ordering::Release);
        debug_assert!(prev & WRITER != 0, "unlock_write on a lock not write-held");
    }

    /// Try to take a read lock without waiting for a writer.
    ///
    /// Retries internally only when another reader changed the count
    /// between the load and the compare-exchange; a writer, holding or
    /// waiting, always makes this fail.
    #[inline]
    pub fn try_read(&self) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            if current & (WRITER | PENDING) != 0 {
                return false;
            }
            assert!(current < MAX_READERS, "reader count overflow");
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Take a read lock, spinning while a writer holds or waits for the
    /// lock.
    #[inline]
    pub fn wait_read(&self) {
        let mut backoff = Backoff::new();
        loop {
            if self.try_read() {
                return;
            }
            while self.state.load(Ordering::Relaxed) & (WRITER | PENDING) != 0 {
                backoff.snooze();
            }
        }
    }

    /// Release one read lock.
    ///
    /// # Safety
    ///
    /// The calling context must hold a read lock.
    #[inline]
    pub unsafe fn unlock_read(&self) {
        let prev = self.state.fetch_sub(1, Ordering::Release);
        debug_assert!(prev & READER_MASK != 0, "unlock_read on a lock not read-held");
    }

    /// Check if the write lock is currently held (snapshot)
    #[inline]
    pub fn is_write_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WRITER != 0
    }

    /// Check if any read lock is currently held (snapshot)
    #[inline]
    pub fn is_read_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) & READER_MASK != 0
    }

    /// Number of readers currently holding the lock (snapshot)
    #[inline]
    pub fn reader_count(&self) -> u32 {
        self.state.load(Ordering::Relaxed) & READER_MASK
    }

    /// Check if a writer is waiting for the lock (snapshot)
    #[inline]
    pub fn is_write_pending(&self) -> bool {
        self.state.load(Ordering::Relaxed) & PENDING != 0
    }

    #[cfg(test)]
    fn with_readers(count: u32) -> Self {
        RawRwSpinLock {
            state: AtomicU32::new(count & READER_MASK),
        }
    }
}

impl Default for RawRwSpinLock {
    fn default() -> Self {
        RawRwSpinLock::new()
    }
}

impl fmt::Debug for RawRwSpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRwSpinLock")
            .field("write_locked", &self.is_write_locked())
            .field("write_pending", &self.is_write_pending())
            .field("readers", &self.reader_count())
            .finish()
    }
}

/// A spinning reader/writer lock bound to the value it guards.
///
/// Any number of readers or a single writer may hold the lock. Waiting
/// acquisitions spin with backoff; use this only around short critical
/// sections.
///
/// The guard-returning methods are the normal interface. The unsafe
/// `unlock_*` methods exist for protocols that hold a lock across calls
/// (see `ReadGuard::leak` / `WriteGuard::leak`).
pub struct ReadWriteLock<T> {
    raw: RawRwSpinLock,
    data: UnsafeCell<T>,
}

// Safety: writers get exclusive access, readers get shared `&T` from many
// threads at once, hence `Sync` additionally requires `T: Sync`.
unsafe impl<T: Send> Send for ReadWriteLock<T> {}
unsafe impl<T: Send + Sync> Sync for ReadWriteLock<T> {}

impl<T> ReadWriteLock<T> {
    /// Create a new unlocked lock guarding `value`
    #[inline]
    pub const fn new(value: T) -> Self {
        ReadWriteLock {
            raw: RawRwSpinLock::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Try to lock for exclusive access without spinning
    #[inline]
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        if self.raw.try_write() {
            Some(WriteGuard::new(self))
        } else {
            None
        }
    }

    /// Lock for exclusive access, spinning until available
    #[inline]
    pub fn wait_write(&self) -> WriteGuard<'_, T> {
        self.raw.wait_write();
        WriteGuard::new(self)
    }

    /// Try to lock for shared access without waiting for a writer
    #[inline]
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        if self.raw.try_read() {
            Some(ReadGuard::new(self))
        } else {
            None
        }
    }

    /// Lock for shared access, spinning while a writer holds or waits for
    /// the lock
    #[inline]
    pub fn wait_read(&self) -> ReadGuard<'_, T> {
        self.raw.wait_read();
        ReadGuard::new(self)
    }

    /// Release a write lock previously detached with `WriteGuard::leak`.
    ///
    /// # Safety
    ///
    /// The calling context must hold the write lock and must no longer use
    /// the `&mut T` it obtained.
    #[inline]
    pub unsafe fn unlock_write(&self) {
        self.raw.unlock_write();
    }

    /// Release a read lock previously detached with `ReadGuard::leak`.
    ///
    /// # Safety
    ///
    /// The calling context must hold a read lock.
    #[inline]
    pub unsafe fn unlock_read(&self) {
        self.raw.unlock_read();
    }

    /// Shared access to the value without locking.
    ///
    /// # Safety
    ///
    /// The caller must hold a read or write lock on `self` for as long as
    /// the returned reference is used, and must not create a `&mut T`
    /// through another path meanwhile.
    #[inline]
    pub unsafe fn get_unchecked(&self) -> &T {
        &*self.data.get()
    }

    /// Check if the write lock is currently held (snapshot)
    #[inline]
    pub fn is_write_locked(&self) -> bool {
        self.raw.is_write_locked()
    }

    /// Check if any read lock is currently held (snapshot)
    #[inline]
    pub fn is_read_locked(&self) -> bool {
        self.raw.is_read_locked()
    }

    /// Number of readers currently holding the lock (snapshot)
    #[inline]
    pub fn reader_count(&self) -> u32 {
        self.raw.reader_count()
    }

    /// Check if a writer is waiting for the lock (snapshot)
    #[inline]
    pub fn is_write_pending(&self) -> bool {
        self.raw.is_write_pending()
    }

    /// Mutable access through a unique borrow; no locking needed
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consume the lock and return the guarded value
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    #[inline]
    pub(crate) fn data_ptr(&self) -> *mut T {
        self.data.get()
    }
}

impl<T: Default> Default for ReadWriteLock<T> {
    fn default() -> Self {
        ReadWriteLock::new(T::default())
    }
}

impl<T> fmt::Debug for ReadWriteLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadWriteLock")
            .field("write_locked", &self.is_write_locked())
            .field("readers", &self.reader_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_write_excludes_everything() {
        let lock = ReadWriteLock::new(0u32);

        let guard = lock.try_write();
        assert!(guard.is_some());
        assert!(lock.is_write_locked());
        assert!(lock.try_write().is_none());
        assert!(lock.try_read().is_none());

        drop(guard);
        assert!(!lock.is_write_locked());
        assert!(lock.try_read().is_some());
    }

    #[test]
    fn test_readers_share_and_block_writer() {
        let lock = ReadWriteLock::new(7u32);

        let r1 = lock.try_read().unwrap();
        let r2 = lock.wait_read();
        assert_eq!(*r1 + *r2, 14);
        assert_eq!(lock.reader_count(), 2);
        assert!(lock.try_write().is_none());

        drop(r1);
        assert!(lock.try_write().is_none());
        drop(r2);
        assert!(!lock.is_read_locked());
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn test_wait_write_waits_for_readers() {
        let lock = Arc::new(ReadWriteLock::new(0u32));
        let released = Arc::new(AtomicBool::new(false));

        let reader = lock.wait_read();

        let handle = {
            let lock = Arc::clone(&lock);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                let mut guard = lock.wait_write();
                // The reader must be gone before we get here
                assert!(released.load(Ordering::Acquire));
                *guard = 1;
            })
        };

        thread::sleep(Duration::from_millis(20));
        released.store(true, Ordering::Release);
        drop(reader);

        handle.join().unwrap();
        assert_eq!(*lock.wait_read(), 1);
    }

    #[test]
    fn test_wait_read_waits_for_writer() {
        let lock = Arc::new(ReadWriteLock::new(0u32));
        let mut writer = lock.wait_write();

        let handle = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let value = *lock.wait_read();
                value
            })
        };

        thread::sleep(Duration::from_millis(20));
        *writer = 99;
        drop(writer);

        assert_eq!(handle.join().unwrap(), 99);
    }

    #[test]
    fn test_concurrent_writers() {
        let lock = Arc::new(ReadWriteLock::new(0u32));
        let mut handles = vec![];

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let mut guard = lock.wait_write();
                    *guard += 1;
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*lock.wait_read(), 4000);
    }

    #[test]
    fn test_readers_never_see_writer_inside() {
        let lock = Arc::new(ReadWriteLock::new(()));
        let writing = Arc::new(AtomicBool::new(false));
        let violations = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for i in 0..4 {
            let lock = Arc::clone(&lock);
            let writing = Arc::clone(&writing);
            let violations = Arc::clone(&violations);
            handles.push(thread::spawn(move || {
                for _ in 0..2000 {
                    if i == 0 {
                        let _guard = lock.wait_write();
                        writing.store(true, Ordering::SeqCst);
                        core::hint::spin_loop();
                        writing.store(false, Ordering::SeqCst);
                    } else {
                        let _guard = lock.wait_read();
                        if writing.load(Ordering::SeqCst) {
                            violations.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(violations.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_raw_lock_roundtrip() {
        let raw = RawRwSpinLock::new();
        assert!(raw.try_read());
        assert!(raw.try_read());
        assert_eq!(raw.reader_count(), 2);
        unsafe {
            raw.unlock_read();
            raw.unlock_read();
        }
        raw.wait_write();
        assert!(raw.is_write_locked());
        assert!(!raw.try_read());
        unsafe { raw.unlock_write() };
        assert!(!raw.is_write_locked());
    }

    #[test]
    #[should_panic(expected = "reader count overflow")]
    fn test_reader_overflow_is_fatal() {
        let raw = RawRwSpinLock::with_readers(MAX_READERS);
        raw.try_read();
    }

    #[test]
    fn test_reader_count_stays_clear_of_flag_bits() {
        let raw = RawRwSpinLock::with_readers(MAX_READERS - 1);
        assert!(raw.try_read());
        assert_eq!(raw.reader_count(), MAX_READERS);
        assert!(!raw.is_write_locked());
        assert!(!raw.is_write_pending());
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let lock = Arc::new(ReadWriteLock::new(0u32));
        let reader = lock.wait_read();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                *lock.wait_write() += 1;
            })
        };

        while !lock.is_write_pending() {
            thread::yield_now();
        }
        assert!(lock.try_read().is_none());
        assert!(lock.try_write().is_none());

        drop(reader);
        writer.join().unwrap();
        assert!(!lock.is_write_pending());
        assert_eq!(*lock.wait_read(), 1);
    }

    #[test]
    fn test_writer_gets_in_under_overlapping_readers() {
        // Readers hand the lock to each other so the count never drops to
        // zero on its own
        let lock = Arc::new(ReadWriteLock::new(0u32));
        let stop = Arc::new(AtomicBool::new(false));
        let mut readers = vec![];

        for _ in 0..3 {
            let lock = Arc::clone(&lock);
            let stop = Arc::clone(&stop);
            readers.push(thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let _guard = lock.wait_read();
                    thread::sleep(Duration::from_millis(2));
                }
            }));
        }

        thread::sleep(Duration::from_millis(20));
        for _ in 0..10 {
            *lock.wait_write() += 1;
        }
        stop.store(true, Ordering::Release);

        for h in readers {
            h.join().unwrap();
        }
        assert_eq!(*lock.wait_read(), 10);
    }
}
