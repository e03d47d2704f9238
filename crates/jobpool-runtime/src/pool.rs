//! The shared job list
//!
//! A `JobPool` owns every job added to it and keeps them in a doubly
//! linked list between two permanent sentinels:
//!
//! ```text
//! HEAD <-> job <-> job <-> ... <-> TAIL
//! ```
//!
//! Workers walk the list forward with lock coupling: a worker holds a
//! shared lock on the node it stands on and takes the shared lock on the
//! next node before letting go of the current one, so the node it moves to
//! cannot be unlinked under it. Structural changes take exclusive node
//! locks in list order (`prev`, then the node, then `next`), which keeps
//! the lock graph acyclic. The walk is a ring: past TAIL a worker drops
//! the tail lock and starts again at HEAD without coupling, which is safe
//! because sentinels are never unlinked.
//!
//! New jobs go in just before TAIL. Splicing needs the last node's lock
//! exclusively; a job that adds work while it runs on the last node holds
//! that lock shared, so such splices are parked in a queue and linked
//! later by a worker that holds no node lock.

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use jobpool_core::kprint::LogLevel;
use jobpool_core::{JobId, JobState, ReadGuard, ReadWriteLock, Step, WriteGuard};

use crate::arena::{JobNode, Links, NodeArena};
use crate::job::{safe_run, safe_run_read_only, EmptyJob, Job, JobBody, ReadOnlyJob};
use crate::logger::{JobLogger, KprintLogger};

/// Id of the sentinel at the front of the list
pub const HEAD_SENTINEL: JobId = JobId::new(0);

/// Id of the sentinel at the back of the list
pub const TAIL_SENTINEL: JobId = JobId::new(1);

/// A worker's position in the list
///
/// Holds a shared node lock on the job it points at. Hand it back to
/// `run_next_job` to continue from there; dropping it (or passing it to
/// `release_job`) releases the lock.
pub struct Cursor<'a> {
    pool: &'a JobPool,
    id: JobId,
    links: ReadGuard<'a, Links>,
}

impl<'a> Cursor<'a> {
    /// Job the cursor stands on
    #[inline]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Check if the cursor stands on the head sentinel
    #[inline]
    pub fn is_head(&self) -> bool {
        self.id == HEAD_SENTINEL
    }
}

impl<'a> fmt::Debug for Cursor<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("next", &self.links.next)
            .finish()
    }
}

/// Concurrent list of jobs shared by a set of workers
pub struct JobPool {
    arena: NodeArena,

    /// Jobs owned by the pool but not yet spliced in
    pending: SegQueue<JobId>,

    /// Jobs in `pending` plus the one parked in `drain`
    pending_len: AtomicUsize,

    /// Held by whoever drains `pending`; holds a job whose splice failed
    drain: ReadWriteLock<Option<JobId>>,

    /// Live non-sentinel jobs (added, not yet removed)
    count: AtomicUsize,

    logger: Arc<dyn JobLogger>,
}

impl JobPool {
    /// Create an empty pool logging through `kprint`
    pub fn new() -> Self {
        Self::with_logger(Arc::new(KprintLogger))
    }

    /// Create an empty pool logging through `logger`
    pub fn with_logger(logger: Arc<dyn JobLogger>) -> Self {
        let pool = JobPool {
            arena: NodeArena::new(),
            pending: SegQueue::new(),
            pending_len: AtomicUsize::new(0),
            drain: ReadWriteLock::new(None),
            count: AtomicUsize::new(0),
            logger,
        };
        pool.install_sentinel(HEAD_SENTINEL, Links { next: TAIL_SENTINEL, prev: JobId::NONE });
        pool.install_sentinel(TAIL_SENTINEL, Links { next: JobId::NONE, prev: HEAD_SENTINEL });
        pool
    }

    fn install_sentinel(&self, expected: JobId, links: Links) {
        let id = self
            .arena
            .allocate()
            .expect("a new arena has room for the sentinels");
        assert_eq!(id, expected);

        let node = self.node(id);
        *node.body.wait_write() = Some(JobBody::ReadOnly(Box::new(EmptyJob)));
        *node.links.wait_write() = links;
        node.read_only.store(true, Ordering::Release);
        node.set_state(JobState::Linked);
    }

    #[inline]
    fn node(&self, id: JobId) -> &JobNode {
        self.arena.get(id)
    }

    #[inline]
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        self.logger.log(level, args);
    }

    /// Logger this pool reports through
    pub fn logger(&self) -> &Arc<dyn JobLogger> {
        &self.logger
    }

    // ------------------------------------------------------------------
    // Adding jobs
    // ------------------------------------------------------------------

    /// Take ownership of a job and append it before the tail sentinel
    ///
    /// Safe to call from inside a running job. If the splice cannot be
    /// done without waiting, the job is linked by a later drain (see
    /// `flush_pending`); it is counted from the moment `add` returns.
    pub fn add<J: Job + 'static>(&self, job: J) -> JobId {
        self.add_boxed(Box::new(job))
    }

    /// `add` for an already boxed job
    pub fn add_boxed(&self, job: Box<dyn Job>) -> JobId {
        self.insert(JobBody::Exclusive(job), false)
    }

    /// Take ownership of a job that many workers may run at once
    pub fn add_read_only<J: ReadOnlyJob + 'static>(&self, job: J) -> JobId {
        self.insert(JobBody::ReadOnly(Box::new(job)), true)
    }

    fn insert(&self, body: JobBody, read_only: bool) -> JobId {
        let id = match self.arena.allocate() {
            Ok(id) => id,
            Err(e) => panic!("cannot add job: {}", e),
        };

        // The slot is Free and unreachable; nobody else touches it yet
        let node = self.node(id);
        *node.body.wait_write() = Some(body);
        *node.links.wait_write() = Links::UNLINKED;
        node.read_only.store(read_only, Ordering::Release);
        node.set_state(JobState::Pending);
        self.count.fetch_add(1, Ordering::Relaxed);

        self.pending_len.fetch_add(1, Ordering::AcqRel);
        self.pending.push(id);
        self.log(
            LogLevel::Debug,
            format_args!("added {}{}", id, if read_only { " (read-only)" } else { "" }),
        );

        self.drain_pending(false);
        id
    }

    /// Link every parked job, waiting for locks as needed
    ///
    /// Must not be called while holding a cursor. Returns how many jobs
    /// were linked.
    pub fn flush_pending(&self) -> usize {
        self.drain_pending(true)
    }

    /// Number of jobs added but not yet linked into the list
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending_len.load(Ordering::Acquire)
    }

    /// Splice parked jobs in; non-blocking mode gives up on the first
    /// lock it cannot take immediately
    fn drain_pending(&self, blocking: bool) -> usize {
        let mut parked = if blocking {
            self.drain.wait_write()
        } else {
            match self.drain.try_write() {
                Some(guard) => guard,
                None => return 0,
            }
        };

        let mut linked = 0;
        while let Some(id) = parked.take().or_else(|| self.pending.pop()) {
            if !self.link_at_tail(id, blocking) {
                *parked = Some(id);
                break;
            }
            self.pending_len.fetch_sub(1, Ordering::AcqRel);
            linked += 1;
        }
        linked
    }

    fn lock_links<'a>(&self, node: &'a JobNode, blocking: bool) -> Option<WriteGuard<'a, Links>> {
        if blocking {
            Some(node.links.wait_write())
        } else {
            node.links.try_write()
        }
    }

    /// Splice a pending job in just before TAIL
    fn link_at_tail(&self, id: JobId, blocking: bool) -> bool {
        let tail = self.node(TAIL_SENTINEL);
        loop {
            let last = {
                let links = if blocking {
                    tail.links.wait_read()
                } else {
                    match tail.links.try_read() {
                        Some(links) => links,
                        None => return false,
                    }
                };
                links.prev
            };

            // `last` may have been removed since the peek; the checks below
            // catch that once both locks are held.
            let last_node = self.node(last);
            let Some(mut last_links) = self.lock_links(last_node, blocking) else {
                return false;
            };
            let Some(mut tail_links) = self.lock_links(tail, blocking) else {
                return false;
            };
            if last_links.next != TAIL_SENTINEL || tail_links.prev != last {
                continue;
            }

            let node = self.node(id);
            *node.links.wait_write() = Links { next: TAIL_SENTINEL, prev: last };
            node.set_state(JobState::Linked);
            last_links.next = id;
            tail_links.prev = id;
            self.log(LogLevel::Trace, format_args!("linked {} after {}", id, last));
            return true;
        }
    }

    // ------------------------------------------------------------------
    // Running jobs
    // ------------------------------------------------------------------

    /// Find and run the next runnable job after `last`
    ///
    /// With no cursor the walk starts at HEAD. Returns a cursor on the job
    /// that just yielded, or on HEAD if that job finished and was removed.
    /// Sentinels always yield, so every lap of the list returns at least
    /// twice.
    ///
    /// # Panics
    ///
    /// Panics if `last` was produced by a different pool.
    pub fn run_next_job<'a>(&'a self, last: Option<Cursor<'a>>) -> Cursor<'a> {
        let (mut current, mut held) = match last {
            Some(cursor) => {
                assert!(ptr::eq(cursor.pool, self), "cursor belongs to another pool");
                (cursor.id, cursor.links)
            }
            None => (HEAD_SENTINEL, self.node(HEAD_SENTINEL).links.wait_read()),
        };

        loop {
            let next = held.next;
            if next.is_none() {
                debug_assert_eq!(current, TAIL_SENTINEL);
                // Wrap without coupling, then link parked jobs while no
                // node lock is held
                held.release();
                if self.pending_len.load(Ordering::Acquire) > 0 {
                    self.drain_pending(true);
                }
                current = HEAD_SENTINEL;
                held = self.node(HEAD_SENTINEL).links.wait_read();
            } else {
                // Assigning drops the old guard after the new lock is held
                held = self.node(next).links.wait_read();
                current = next;
            }

            match self.try_run(current) {
                None => continue,
                Some(Step::Yield) => {
                    return Cursor { pool: self, id: current, links: held };
                }
                Some(Step::Finish) => {
                    let prev = held.prev;
                    held.release();
                    self.remove(current, prev);
                    return Cursor {
                        pool: self,
                        id: HEAD_SENTINEL,
                        links: self.node(HEAD_SENTINEL).links.wait_read(),
                    };
                }
            }
        }
    }

    /// Run the job at `id` once if it is runnable and its run lock is free
    ///
    /// Returns `Finish` only to the one caller that retired the job. The
    /// caller holds a shared node lock on `id`.
    fn try_run(&self, id: JobId) -> Option<Step> {
        let node = self.node(id);
        if !node.state().is_runnable() {
            return None;
        }

        if node.is_read_only() {
            let body = node.body.try_read()?;
            // Re-check under the run lock: the job may have retired since
            if !node.state().is_runnable() {
                return None;
            }
            let Some(JobBody::ReadOnly(job)) = body.as_ref() else {
                return None;
            };
            let step = safe_run_read_only(job.as_ref(), &*self.logger);
            Some(self.settle(node, id, step))
        } else {
            let mut body = node.body.try_write()?;
            if !node.state().is_runnable() {
                return None;
            }
            let Some(JobBody::Exclusive(job)) = body.as_mut() else {
                return None;
            };
            let step = safe_run(job.as_mut(), &*self.logger);
            // Retire while still holding the run lock so no other worker
            // can start the job after it finished
            Some(self.settle(node, id, step))
        }
    }

    fn settle(&self, node: &JobNode, id: JobId, step: Step) -> Step {
        match step {
            Step::Yield => Step::Yield,
            Step::Finish if node.transition(JobState::Linked, JobState::Retired) => {
                self.log(LogLevel::Debug, format_args!("{} finished", id));
                Step::Finish
            }
            // A concurrent run of the same read-only job already retired it
            Step::Finish => Step::Yield,
        }
    }

    /// Unlink a retired job, drop it and free its slot
    ///
    /// The caller holds no node lock.
    fn remove(&self, id: JobId, prev_hint: JobId) {
        self.unlink(id, prev_hint);

        let node = self.node(id);
        // Waits out read-only runs still using the body
        let body = node.body.wait_write().take();
        node.read_only.store(false, Ordering::Release);
        node.set_state(JobState::Free);
        self.arena.release(id);
        self.count.fetch_sub(1, Ordering::Relaxed);
        self.log(LogLevel::Debug, format_args!("removed {}", id));

        // The job's destructor runs with no pool lock held; it may add jobs
        drop(body);
    }

    /// Take `prev`, `id` and `next` exclusively in list order and splice
    /// `id` out
    fn unlink(&self, id: JobId, prev_hint: JobId) {
        let node = self.node(id);
        let mut prev = prev_hint;
        loop {
            let mut prev_links = self.node(prev).links.wait_write();
            if prev_links.next != id {
                // `prev` was removed or changed before we locked it
                prev_links.release();
                prev = node.links.wait_read().prev;
                continue;
            }

            let mut links = node.links.wait_write();
            debug_assert_eq!(links.prev, prev);
            let next = links.next;
            let mut next_links = self.node(next).links.wait_write();
            debug_assert_eq!(next_links.prev, id);

            prev_links.next = next;
            next_links.prev = prev;
            *links = Links::UNLINKED;
            return;
        }
    }

    /// Give back the position of a worker that stops calling
    /// `run_next_job`
    pub fn release_job(&self, last: Option<Cursor<'_>>) {
        if let Some(cursor) = last {
            assert!(ptr::eq(cursor.pool, self), "cursor belongs to another pool");
            drop(cursor);
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Approximate number of jobs added and not yet removed
    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn head(&self) -> JobId {
        HEAD_SENTINEL
    }

    #[inline]
    pub fn tail(&self) -> JobId {
        TAIL_SENTINEL
    }

    /// Ids in list order, sentinels included
    ///
    /// Walks with lock coupling, so the result is a consistent path
    /// through the list even while workers run.
    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids = vec![HEAD_SENTINEL];
        let mut held = self.node(HEAD_SENTINEL).links.wait_read();
        while held.next.is_some() {
            let next = held.next;
            held = self.node(next).links.wait_read();
            ids.push(next);
        }
        ids
    }

    /// Lifecycle state of the slot `id`; `Free` for unknown ids
    pub fn job_state(&self, id: JobId) -> JobState {
        self.arena.try_get(id).map_or(JobState::Free, JobNode::state)
    }

    /// Check if `id` holds a read-only job
    pub fn is_read_only(&self, id: JobId) -> bool {
        self.arena.try_get(id).is_some_and(JobNode::is_read_only)
    }

    /// Check if any worker holds a shared node lock on `id`
    pub fn is_node_read_locked(&self, id: JobId) -> bool {
        self.arena.try_get(id).is_some_and(|node| node.links.is_read_locked())
    }

    /// Check if the list is being restructured around `id`
    pub fn is_node_write_locked(&self, id: JobId) -> bool {
        self.arena.try_get(id).is_some_and(|node| node.links.is_write_locked())
    }

    /// Check if `id` is currently being run
    pub fn is_run_locked(&self, id: JobId) -> bool {
        self.arena
            .try_get(id)
            .is_some_and(|node| node.body.is_write_locked() || node.body.is_read_locked())
    }
}

impl Default for JobPool {
    fn default() -> Self {
        JobPool::new()
    }
}

impl fmt::Debug for JobPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobPool")
            .field("count", &self.count())
            .field("pending", &self.pending_count())
            .field("slots", &self.arena.live_slots())
            .finish_non_exhaustive()
    }
}
