//! Stress test - many short jobs
//!
//! Adds a large number of jobs that each yield a few times and finish,
//! half from the host thread and half from spawner jobs running inside the
//! pool, then reports how fast the workers drain the list.
//!
//! Usage: `stress [jobs] [workers]` (defaults 100000, 8)

use jobpool::{job_fn, JobPool, PoolConfig, Runtime, Step};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const YIELDS_PER_JOB: u32 = 10;
const SPAWNERS: usize = 16;
const TIMEOUT: Duration = Duration::from_secs(30);

fn short_job(completed: &Arc<AtomicU64>) -> impl FnMut() -> jobpool::JobResult + Send + 'static {
    let completed = Arc::clone(completed);
    let mut left = YIELDS_PER_JOB;
    move || {
        if left == 0 {
            completed.fetch_add(1, Ordering::Relaxed);
            return Ok(Step::Finish);
        }
        left -= 1;
        Ok(Step::Yield)
    }
}

/// A job that adds `quota` short jobs to `pool`, one per run
fn spawner(
    pool: Arc<JobPool>,
    completed: &Arc<AtomicU64>,
    quota: usize,
) -> impl FnMut() -> jobpool::JobResult + Send + 'static {
    let completed = Arc::clone(completed);
    let mut added = 0;
    move || {
        if added == quota {
            return Ok(Step::Finish);
        }
        pool.add(job_fn(short_job(&completed)));
        added += 1;
        Ok(Step::Yield)
    }
}

fn main() {
    println!("=== jobpool Stress Test ===\n");

    let mut args = std::env::args().skip(1);
    let num_jobs: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(100_000);
    let num_workers: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(8);

    let config = PoolConfig::from_env()
        .num_workers(num_workers)
        .enable_idle(false);

    let mut runtime = match Runtime::new(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("cannot create runtime: {}", e);
            std::process::exit(1);
        }
    };

    let completed = Arc::new(AtomicU64::new(0));
    let from_host = num_jobs / 2;
    let per_spawner = (num_jobs - from_host) / SPAWNERS;
    let expected = (from_host + per_spawner * SPAWNERS) as u64;

    let shared = Arc::clone(runtime.pool());
    let result = runtime.block_on(|pool| {
        let start = Instant::now();

        // Jobs added from inside the pool
        for _ in 0..SPAWNERS {
            pool.add(job_fn(spawner(Arc::clone(&shared), &completed, per_spawner)));
        }

        // Jobs added from the host thread while workers run
        for i in 0..from_host {
            pool.add(job_fn(short_job(&completed)));
            if (i + 1) % 10_000 == 0 {
                print!("\rAdded: {}/{}", i + 1, from_host);
            }
        }
        let add_time = start.elapsed();
        println!("\n\nHost add time: {:?}", add_time);
        println!("Host add rate: {:.0} jobs/sec", from_host as f64 / add_time.as_secs_f64());

        println!("\nWaiting for completion...");
        let run_start = Instant::now();
        loop {
            let done = completed.load(Ordering::Relaxed);
            if done >= expected {
                break;
            }
            if run_start.elapsed() > TIMEOUT {
                println!("\nTimeout! Only {}/{} completed", done, expected);
                break;
            }
            print!("\rCompleted: {}/{}", done, expected);
            std::thread::sleep(Duration::from_millis(100));
        }

        start.elapsed()
    });

    let total_time = match result {
        Ok(elapsed) => elapsed,
        Err(e) => {
            eprintln!("runtime error: {}", e);
            std::process::exit(1);
        }
    };

    let done = completed.load(Ordering::Relaxed);
    println!("\n\n=== Results ===");
    println!("Workers:         {}", num_workers);
    println!("Jobs:            {}", expected);
    println!("Completed:       {}", done);
    println!("Runs:            {}", done * (YIELDS_PER_JOB as u64 + 1));
    println!("Jobs left:       {}", runtime.pool().count());
    println!("Total time:      {:?}", total_time);
    println!("Throughput:      {:.0} jobs/sec", done as f64 / total_time.as_secs_f64());

    println!("\n=== Stress Test Complete ===");
}
