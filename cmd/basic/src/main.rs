//! Basic jobpool example
//!
//! A tiny server: an idle job paces the workers, a ticker job counts
//! laps, a read-only stats job samples per-worker counters, and a loader
//! job adds one module job per second from inside the pool.
//!
//! Usage: `basic [seconds]` (default 3)
//!
//! # Environment Variables
//!
//! - `JP_NUM_WORKERS=<n>` - Number of worker threads
//! - `JP_IDLE_PERIOD_US=<us>` - Idle cycle period
//! - `JP_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use jobpool::{kdebug, kerror, kinfo};
use jobpool::{Job, JobPool, JobResult, LocalStore, PoolConfig, ReadOnlyJob, Runtime, Step};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// JP_LOG_LEVEL=debug cargo run -p jobpool-basic -- 5

/// Counts its own runs; never finishes
struct Ticker {
    ticks: Arc<AtomicU64>,
}

impl Job for Ticker {
    fn run(&mut self) -> JobResult {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        Ok(Step::Yield)
    }

    fn name(&self) -> &str {
        "ticker"
    }
}

/// Counts how often each worker passes by
struct Stats {
    visits: LocalStore<u64>,
}

impl ReadOnlyJob for Stats {
    fn run(&self) -> JobResult {
        self.visits.with(|n| *n += 1);
        Ok(Step::Yield)
    }

    fn name(&self) -> &str {
        "stats"
    }
}

/// A module that does a fixed amount of work, then unloads
struct Module {
    index: usize,
    steps_left: u32,
}

impl Job for Module {
    fn run(&mut self) -> JobResult {
        self.steps_left -= 1;
        if self.steps_left == 0 {
            kdebug!("module {} unloaded", self.index);
            return Ok(Step::Finish);
        }
        Ok(Step::Yield)
    }

    fn name(&self) -> &str {
        "module"
    }
}

/// Adds one module per period until it has loaded them all
struct Loader {
    pool: Arc<JobPool>,
    period: Duration,
    next_load: Instant,
    loaded: usize,
    total: usize,
}

impl Job for Loader {
    fn run(&mut self) -> JobResult {
        if Instant::now() < self.next_load {
            return Ok(Step::Yield);
        }

        let id = self.pool.add(Module {
            index: self.loaded,
            steps_left: 1_000,
        });
        kinfo!("loader: module {} added as {}", self.loaded, id);

        self.loaded += 1;
        self.next_load += self.period;
        Ok(if self.loaded == self.total { Step::Finish } else { Step::Yield })
    }

    fn name(&self) -> &str {
        "loader"
    }
}

fn main() {
    println!("=== jobpool Basic Example ===\n");

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    let config = PoolConfig::from_env();
    config.print();

    let mut runtime = match Runtime::new(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            kerror!("cannot create runtime: {}", e);
            std::process::exit(1);
        }
    };

    let ticks = Arc::new(AtomicU64::new(0));
    runtime.add(Ticker { ticks: Arc::clone(&ticks) });
    let stats = Arc::new(Stats { visits: LocalStore::new() });
    runtime.add_read_only(SharedStats(Arc::clone(&stats)));
    runtime.add(Loader {
        pool: Arc::clone(runtime.pool()),
        period: Duration::from_secs(1),
        next_load: Instant::now(),
        loaded: 0,
        total: seconds.max(1) as usize,
    });

    let result = runtime.block_on(|pool| {
        kinfo!("running for {}s with {} jobs", seconds, pool.count());
        for _ in 0..seconds {
            std::thread::sleep(Duration::from_secs(1));
            kinfo!(
                "ticks: {}, live jobs: {}, parked: {}",
                ticks.load(Ordering::Relaxed),
                pool.count(),
                pool.pending_count()
            );
        }
    });

    if let Err(e) = result {
        kerror!("runtime error: {}", e);
        std::process::exit(1);
    }

    println!("\n=== Results ===");
    println!("Ticker runs:     {}", ticks.load(Ordering::Relaxed));
    println!("Jobs left:       {}", runtime.pool().count());
    drop(runtime);

    // Every worker has exited; the per-worker counters can be read
    match Arc::try_unwrap(stats) {
        Ok(mut stats) => {
            for (thread, visits) in stats.visits.iter_mut() {
                println!("Thread {:#x}: {} stats visits", thread, visits);
            }
        }
        Err(_) => kerror!("stats job still shared"),
    }

    println!("\n=== Example Complete ===");
}

/// Lets `main` keep a handle on the stats job while the pool owns it
struct SharedStats(Arc<Stats>);

impl ReadOnlyJob for SharedStats {
    fn run(&self) -> JobResult {
        self.0.run()
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}
