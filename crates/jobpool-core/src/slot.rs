//! Slot allocator for arena-resident job nodes
//!
//! Hands out `JobId`s. Freed ids go on a LIFO stack and are reused before
//! fresh ones, so the arena stays dense and recently touched nodes are
//! recycled while still warm in cache.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{PoolError, PoolResult};
use crate::id::JobId;
use crate::rwlock::ReadWriteLock;

/// Slot allocator for job node slots
pub struct SlotAllocator {
    /// LIFO stack of free slot ids (for reuse)
    free_stack: ReadWriteLock<Vec<u32>>,

    /// Next fresh slot id to allocate (never used before)
    next_fresh: AtomicU32,

    /// Maximum number of slots
    max_slots: u32,

    /// Number of currently allocated slots
    allocated_count: AtomicU32,
}

impl SlotAllocator {
    /// Create a new slot allocator handing out ids `0..max_slots`
    pub fn new(max_slots: u32) -> Self {
        Self {
            free_stack: ReadWriteLock::new(Vec::new()),
            next_fresh: AtomicU32::new(0),
            max_slots: max_slots.min(u32::MAX - 1),
            allocated_count: AtomicU32::new(0),
        }
    }

    /// Allocate a slot, returning its id
    ///
    /// Prefers reusing recently freed slots (LIFO). Falls back to fresh
    /// ids if the free stack is empty.
    pub fn allocate(&self) -> PoolResult<JobId> {
        if let Some(id) = self.free_stack.wait_write().pop() {
            self.allocated_count.fetch_add(1, Ordering::Relaxed);
            return Ok(JobId::new(id));
        }

        loop {
            let current = self.next_fresh.load(Ordering::Acquire);
            if current >= self.max_slots {
                return Err(PoolError::ArenaExhausted);
            }

            match self.next_fresh.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.allocated_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(JobId::new(current));
                }
                Err(_) => continue,
            }
        }
    }

    /// Release a slot back to the allocator
    pub fn release(&self, id: JobId) {
        if id.is_none() {
            return;
        }

        self.free_stack.wait_write().push(id.as_u32());
        self.allocated_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of currently allocated slots
    #[inline]
    pub fn allocated_count(&self) -> u32 {
        self.allocated_count.load(Ordering::Relaxed)
    }

    /// Highest id ever handed out plus one
    #[inline]
    pub fn high_water(&self) -> u32 {
        self.next_fresh.load(Ordering::Acquire)
    }

    /// Maximum number of slots
    #[inline]
    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocate_fresh_then_reuse() {
        let slots = SlotAllocator::new(16);

        let a = slots.allocate().unwrap();
        let b = slots.allocate().unwrap();
        assert_eq!(a, JobId::new(0));
        assert_eq!(b, JobId::new(1));
        assert_eq!(slots.allocated_count(), 2);

        slots.release(a);
        assert_eq!(slots.allocated_count(), 1);

        // Freed slot is reused before a fresh one
        assert_eq!(slots.allocate().unwrap(), a);
        assert_eq!(slots.high_water(), 2);
    }

    #[test]
    fn test_exhaustion() {
        let slots = SlotAllocator::new(2);
        slots.allocate().unwrap();
        slots.allocate().unwrap();
        assert_eq!(slots.allocate(), Err(PoolError::ArenaExhausted));
    }

    #[test]
    fn test_release_none_is_ignored() {
        let slots = SlotAllocator::new(4);
        slots.release(JobId::NONE);
        assert_eq!(slots.allocated_count(), 0);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let slots = Arc::new(SlotAllocator::new(10_000));
        let mut handles = vec![];

        for _ in 0..4 {
            let slots = Arc::clone(&slots);
            handles.push(thread::spawn(move || {
                (0..500).map(|_| slots.allocate().unwrap()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate slot {:?}", id);
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
