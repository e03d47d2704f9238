//! Worker thread management
//!
//! A worker is one OS thread bound to a pool. It walks the pool's job
//! list until told to stop, then gives back its position and exits.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use jobpool_core::{kdebug, kerror, kprint, PoolResult, WorkerError};

use crate::config::defaults;
use crate::pool::JobPool;
use crate::tls::{self, Identifier};

/// Index handed to workers created without an explicit one
static NEXT_WORKER_INDEX: AtomicUsize = AtomicUsize::new(0);

/// One OS thread running jobs from a pool
///
/// Dropping a worker stops it and waits for its thread to exit.
pub struct Worker {
    index: usize,
    terminate: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker on `pool` with the next free index
    pub fn new(pool: Arc<JobPool>) -> PoolResult<Self> {
        let index = NEXT_WORKER_INDEX.fetch_add(1, Ordering::Relaxed);
        Self::with_index(pool, index)
    }

    /// Spawn a worker on `pool` named `jobpool-worker-{index}`
    pub fn with_index(pool: Arc<JobPool>, index: usize) -> PoolResult<Self> {
        Self::spawn_named(pool, index, defaults::THREAD_NAME_PREFIX)
    }

    /// Spawn a worker on `pool` named `{prefix}-{index}`
    pub fn spawn_named(pool: Arc<JobPool>, index: usize, prefix: &str) -> PoolResult<Self> {
        let terminate = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&terminate);

        let handle = thread::Builder::new()
            .name(format!("{}-{}", prefix, index))
            .spawn(move || {
                tls::set_worker_index(index);
                kprint::set_worker_tag(index as u32);
                kdebug!("worker {} started on thread {:#x}", index, Worker::current());

                worker_loop(&pool, &flag);

                kdebug!("worker {} exiting", index);
                kprint::clear_worker_tag();
                tls::clear_worker_index();
            })
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        Ok(Worker {
            index,
            terminate,
            handle: Some(handle),
        })
    }

    /// Identifier of the calling OS thread
    #[inline]
    pub fn current() -> Identifier {
        tls::current_thread_id()
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Ask the worker to stop after its current job; does not wait
    #[inline]
    pub fn terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Check if the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the worker and wait for its thread
    pub fn join(mut self) -> PoolResult<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> PoolResult<()> {
        self.terminate();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked.into()),
            None => Ok(()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            kerror!("worker {}: {}", self.index, e);
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Main loop of a worker thread
fn worker_loop(pool: &JobPool, terminate: &AtomicBool) {
    let mut last = None;
    while !terminate.load(Ordering::Acquire) {
        last = Some(pool.run_next_job(last));
    }
    pool.release_job(last);
}

/// A set of workers sharing one pool
#[derive(Debug, Default)]
pub struct WorkerGroup {
    workers: Vec<Worker>,
}

impl WorkerGroup {
    /// Spawn `count` workers on `pool`, indexed `0..count`
    pub fn spawn(pool: &Arc<JobPool>, count: usize) -> PoolResult<Self> {
        Self::spawn_named(pool, count, defaults::THREAD_NAME_PREFIX)
    }

    /// Spawn `count` workers named `{prefix}-{index}`
    ///
    /// If a spawn fails, the workers already started are stopped.
    pub fn spawn_named(pool: &Arc<JobPool>, count: usize, prefix: &str) -> PoolResult<Self> {
        let mut group = WorkerGroup {
            workers: Vec::with_capacity(count),
        };
        for index in 0..count {
            group
                .workers
                .push(Worker::spawn_named(Arc::clone(pool), index, prefix)?);
        }
        Ok(group)
    }

    /// Ask every worker to stop; does not wait
    pub fn terminate_all(&self) {
        for worker in &self.workers {
            worker.terminate();
        }
    }

    /// Stop every worker and wait for all of them
    ///
    /// Returns the first error; every worker is joined regardless.
    pub fn join(mut self) -> PoolResult<()> {
        self.terminate_all();
        let mut result = Ok(());
        for worker in self.workers.drain(..) {
            let joined = worker.join();
            if result.is_ok() {
                result = joined;
            }
        }
        result
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        // Stop everyone first so the joins below do not run back to back
        self.terminate_all();
    }
}
