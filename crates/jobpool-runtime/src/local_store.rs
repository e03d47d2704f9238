//! Per-thread storage owned by a job
//!
//! A read-only job runs on many workers at once but often needs a little
//! state of its own per worker (a timer, a scratch buffer, a counter).
//! `LocalStore<T>` gives each calling thread its own `T`, created on first
//! use and kept until the store is dropped.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use jobpool_core::ReadWriteLock;

use crate::tls::{self, Identifier};

struct Entry<T> {
    /// Set while the owning thread is inside `with`
    busy: AtomicBool,
    value: UnsafeCell<T>,
}

// Safety: an entry's value is only reached by the thread that owns it
// (and only one call deep, see `busy`), or through `&mut LocalStore`.
unsafe impl<T: Send> Sync for Entry<T> {}

/// Clears `busy` when `with` returns or unwinds
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One value of `T` per thread that touches the store
pub struct LocalStore<T> {
    /// Entries are boxed so they keep their address while the vector grows
    entries: ReadWriteLock<Vec<(Identifier, Box<Entry<T>>)>>,
}

impl<T> LocalStore<T> {
    pub fn new() -> Self {
        LocalStore {
            entries: ReadWriteLock::new(Vec::new()),
        }
    }

    /// Number of threads that have a value in this store
    pub fn len(&self) -> usize {
        self.entries.wait_read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every thread's value, for aggregation once the workers are done
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Identifier, &mut T)> {
        self.entries
            .get_mut()
            .iter_mut()
            .map(|(id, entry)| (*id, entry.value.get_mut()))
    }

    fn find(&self, id: Identifier) -> Option<*const Entry<T>> {
        self.entries
            .wait_read()
            .iter()
            .find(|(owner, _)| *owner == id)
            .map(|(_, entry)| &**entry as *const Entry<T>)
    }
}

impl<T: Default> LocalStore<T> {
    /// Run `f` on the calling thread's value, creating it on first use
    ///
    /// # Panics
    ///
    /// Panics if called again from inside `f` on the same store.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let me = tls::current_thread_id();
        let entry = match self.find(me) {
            Some(entry) => entry,
            None => {
                // Build the value before locking; `T::default` may be slow
                let fresh = Box::new(Entry {
                    busy: AtomicBool::new(false),
                    value: UnsafeCell::new(T::default()),
                });
                let ptr = &*fresh as *const Entry<T>;
                self.entries.wait_write().push((me, fresh));
                ptr
            }
        };

        // Safety: entries are boxed and only freed when the store drops,
        // which cannot happen while `&self` is borrowed.
        let entry = unsafe { &*entry };
        assert!(
            !entry.busy.swap(true, Ordering::Acquire),
            "re-entrant LocalStore access from one thread"
        );
        let _busy = BusyGuard(&entry.busy);

        // Safety: only this thread uses this entry, and `busy` rules out a
        // second `&mut` from a nested call.
        f(unsafe { &mut *entry.value.get() })
    }
}

impl<T> Default for LocalStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LocalStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStore")
            .field("threads", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_value_is_created_once_per_thread() {
        let store: LocalStore<u32> = LocalStore::new();
        assert!(store.is_empty());

        store.with(|v| *v += 1);
        store.with(|v| *v += 1);
        assert_eq!(store.with(|v| *v), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_threads_get_separate_values() {
        let store = Arc::new(LocalStore::<u64>::new());
        // Keep every thread alive until all are done; exited threads'
        // ids may be handed out again
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (1..=4u64)
            .map(|n| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.with(|v| *v += n);
                    }
                    let mine = store.with(|v| *v);
                    barrier.wait();
                    mine
                })
            })
            .collect();

        let results: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![1000, 2000, 3000, 4000]);

        let mut store = Arc::try_unwrap(store).unwrap();
        assert_eq!(store.len(), 4);
        let total: u64 = store.iter_mut().map(|(_, v)| *v).sum();
        assert_eq!(total, 10_000);
    }

    #[test]
    #[should_panic(expected = "re-entrant LocalStore access")]
    fn test_reentrant_access_panics() {
        let store: LocalStore<u32> = LocalStore::new();
        store.with(|_| store.with(|v| *v));
    }

    #[test]
    fn test_busy_flag_cleared_after_panic() {
        let store: LocalStore<u32> = LocalStore::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.with(|_| panic!("inside"));
        }));
        assert!(result.is_err());
        assert_eq!(store.with(|v| *v), 0);
    }
}
