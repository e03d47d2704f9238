//! Owning storage for job nodes
//!
//! Nodes live in segments that are allocated on demand and never move or
//! shrink while the arena lives, so a `&JobNode` obtained from a `JobId`
//! stays valid for the arena's whole life even while other threads grow
//! it. Segment `s` holds `64 << s` nodes; 27 segments cover every id a
//! `SlotAllocator` can hand out.
//!
//! ```text
//! segment 0: ids 0..64
//! segment 1: ids 64..192
//! segment 2: ids 192..448
//! ...
//! ```

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, Ordering};

use jobpool_core::constants::MAX_JOB_SLOTS;
use jobpool_core::{JobId, JobState, PoolResult, ReadWriteLock, SlotAllocator};

use crate::job::JobBody;

/// log2 of the first segment's length
const FIRST_SEGMENT_SHIFT: u32 = 6;

/// Number of segments; enough for `MAX_JOB_SLOTS` ids
const SEGMENT_COUNT: usize = 27;

/// List neighbours of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Links {
    pub next: JobId,
    pub prev: JobId,
}

impl Links {
    pub const UNLINKED: Links = Links {
        next: JobId::NONE,
        prev: JobId::NONE,
    };
}

/// One slot of the arena
///
/// `links` is the node lock: shared while a worker stands on the node,
/// exclusive while the list is restructured around it. `body` is the run
/// lock: exclusive while an exclusive job runs, shared while a read-only
/// job runs.
#[repr(align(64))]
pub(crate) struct JobNode {
    pub links: ReadWriteLock<Links>,
    pub body: ReadWriteLock<Option<JobBody>>,
    pub read_only: AtomicBool,
    pub state: AtomicU8,
}

impl JobNode {
    fn new() -> Self {
        JobNode {
            links: ReadWriteLock::new(Links::UNLINKED),
            body: ReadWriteLock::new(None),
            read_only: AtomicBool::new(false),
            state: AtomicU8::new(JobState::Free as u8),
        }
    }

    #[inline]
    pub fn state(&self) -> JobState {
        JobState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_state(&self, state: JobState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move `from -> to`; fails if another thread changed the state first
    #[inline]
    pub fn transition(&self, from: JobState, to: JobState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }
}

/// Segment index and offset for a slot index
#[inline]
fn locate(index: u32) -> (usize, usize) {
    let v = index as u64 + (1u64 << FIRST_SEGMENT_SHIFT);
    let top = 63 - v.leading_zeros();
    let segment = top - FIRST_SEGMENT_SHIFT;
    let offset = v - (1u64 << top);
    (segment as usize, offset as usize)
}

#[inline]
fn segment_len(segment: usize) -> usize {
    1usize << (segment as u32 + FIRST_SEGMENT_SHIFT)
}

/// Segmented node storage plus the slot allocator that indexes it
pub(crate) struct NodeArena {
    segments: [AtomicPtr<JobNode>; SEGMENT_COUNT],
    /// Serializes segment allocation
    grow: ReadWriteLock<()>,
    slots: SlotAllocator,
}

impl NodeArena {
    pub fn new() -> Self {
        NodeArena {
            segments: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            grow: ReadWriteLock::new(()),
            slots: SlotAllocator::new(MAX_JOB_SLOTS),
        }
    }

    /// Reserve a free slot, growing the arena if needed
    ///
    /// The slot's node is in its reset state (`Free`, unlinked, no body).
    pub fn allocate(&self) -> PoolResult<JobId> {
        let id = self.slots.allocate()?;
        let (segment, _) = locate(id.as_u32());
        self.ensure_segment(segment);
        Ok(id)
    }

    /// Return a slot; its node must already be reset
    pub fn release(&self, id: JobId) {
        debug_assert_eq!(self.get(id).state(), JobState::Free);
        self.slots.release(id);
    }

    /// Node for an id handed out by `allocate`
    #[inline]
    pub fn get(&self, id: JobId) -> &JobNode {
        match self.try_get(id) {
            Some(node) => node,
            None => panic!("{} is not an arena slot", id),
        }
    }

    /// Node for an id, or `None` if its segment was never allocated
    #[inline]
    pub fn try_get(&self, id: JobId) -> Option<&JobNode> {
        if id.is_none() {
            return None;
        }
        let (segment, offset) = locate(id.as_u32());
        let base = self.segments[segment].load(Ordering::Acquire);
        if base.is_null() {
            return None;
        }
        // Safety: a published segment is fully initialized, holds
        // `segment_len(segment)` nodes and is only freed in `Drop`.
        Some(unsafe { &*base.add(offset) })
    }

    /// Number of slots in use
    #[inline]
    pub fn live_slots(&self) -> u32 {
        self.slots.allocated_count()
    }

    fn ensure_segment(&self, segment: usize) {
        if !self.segments[segment].load(Ordering::Acquire).is_null() {
            return;
        }

        let _grow = self.grow.wait_write();
        // Another thread may have won the race while we waited
        if !self.segments[segment].load(Ordering::Acquire).is_null() {
            return;
        }

        let nodes: Box<[JobNode]> = (0..segment_len(segment)).map(|_| JobNode::new()).collect();
        let base = Box::into_raw(nodes) as *mut JobNode;
        self.segments[segment].store(base, Ordering::Release);
    }
}

impl Drop for NodeArena {
    fn drop(&mut self) {
        for (segment, slot) in self.segments.iter_mut().enumerate() {
            let base = *slot.get_mut();
            if base.is_null() {
                continue;
            }
            // Safety: `base` came from `Box::into_raw` on a boxed slice of
            // exactly this length, and `&mut self` rules out other users.
            unsafe {
                let nodes = ptr::slice_from_raw_parts_mut(base, segment_len(segment));
                drop(Box::from_raw(nodes));
            }
        }
    }
}
