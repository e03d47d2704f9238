//! Thread-local worker context
//!
//! Provides fast access to the current worker's index and an opaque
//! identifier for the calling OS thread.

use std::cell::Cell;

/// Opaque identifier of an OS thread
pub type Identifier = u64;

thread_local! {
    /// Index of the worker running on this OS thread
    static WORKER_INDEX: Cell<usize> = const { Cell::new(usize::MAX) };
}

/// Mark this thread as worker `index`
#[inline]
pub fn set_worker_index(index: usize) {
    WORKER_INDEX.with(|cell| cell.set(index));
}

/// Forget this thread's worker index
#[inline]
pub fn clear_worker_index() {
    WORKER_INDEX.with(|cell| cell.set(usize::MAX));
}

/// Index of the worker on this thread, `None` off worker threads
#[inline]
pub fn worker_index() -> Option<usize> {
    let index = WORKER_INDEX.with(|cell| cell.get());
    if index == usize::MAX {
        None
    } else {
        Some(index)
    }
}

/// Check if we're running on a worker thread
#[inline]
pub fn is_worker_thread() -> bool {
    worker_index().is_some()
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Identifier of the calling OS thread (its pthread id)
        ///
        /// Ids of exited threads may be reused by the OS.
        #[inline]
        pub fn current_thread_id() -> Identifier {
            // Safety: pthread_self has no preconditions
            unsafe { libc::pthread_self() as Identifier }
        }
    } else {
        /// Identifier of the calling OS thread (hash of its `ThreadId`)
        #[inline]
        pub fn current_thread_id() -> Identifier {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};

            let mut hasher = DefaultHasher::new();
            std::thread::current().id().hash(&mut hasher);
            hasher.finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_worker_index_roundtrip() {
        assert_eq!(worker_index(), None);
        set_worker_index(3);
        assert_eq!(worker_index(), Some(3));
        assert!(is_worker_thread());
        clear_worker_index();
        assert!(!is_worker_thread());
    }

    #[test]
    fn test_thread_ids_differ_across_threads() {
        let here = current_thread_id();
        assert_eq!(here, current_thread_id());

        let there = thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
    }
}
