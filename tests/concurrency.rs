//! Concurrent get/put traffic against shared pools

use bufpool::slab::NUM_CLASSES;
use bufpool::{AdaptivePool, PoolConfig, PoolRegistry, SlabStore};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn get_put(pool: &AdaptivePool, n: usize) {
    let mut buf = pool.get();
    buf.resize(n, 0xab);
    assert_eq!(buf.len(), n);
    assert!(buf.as_bytes().iter().all(|&b| b == 0xab));
    pool.put(buf);
}

/// Sizes around every power of two up to 1 MiB
fn various_sizes(pool: &AdaptivePool) -> usize {
    let mut cycles = 0;
    for i in 0..=NUM_CLASSES {
        let n = 1usize << i;
        get_put(pool, n);
        get_put(pool, n + 1);
        get_put(pool, n - 1);
        cycles += 3;

        for j in 0..10 {
            get_put(pool, j + n);
            cycles += 1;
        }
    }
    cycles
}

fn run_workers<F>(workers: usize, timeout: Duration, work: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let (done_tx, done_rx) = mpsc::channel();
    for worker in 0..workers {
        let work = work.clone();
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            work(worker);
            done_tx.send(()).ok();
        });
    }

    for _ in 0..workers {
        done_rx
            .recv_timeout(timeout)
            .expect("worker panicked or timed out");
    }
}

#[test]
fn test_various_sizes_serial() {
    let pool = AdaptivePool::default();
    let cycles = various_sizes(&pool) as u64;

    let stats = pool.stats();
    assert_eq!(stats.gets, cycles);
    assert_eq!(stats.puts, cycles);
}

#[test]
fn test_various_sizes_concurrent() {
    let pool = Arc::new(AdaptivePool::default());
    let shared = pool.clone();

    run_workers(5, Duration::from_secs(30), move |_| {
        various_sizes(&shared);
    });

    let stats = pool.stats();
    assert_eq!(stats.gets, stats.puts);
}

#[test]
fn test_concurrent_calibration() {
    let pool = Arc::new(AdaptivePool::with_config(
        Arc::new(SlabStore::new()),
        PoolConfig {
            calibrate_threshold: 50,
            ..PoolConfig::default()
        },
    ));
    let shared = pool.clone();

    const WORKERS: usize = 8;
    const CYCLES: usize = 5_000;
    run_workers(WORKERS, Duration::from_secs(30), move |worker| {
        for i in 0..CYCLES {
            let n = if (i + worker) % 10 == 0 { 9000 } else { 700 };
            get_put(&shared, n);
        }
    });

    let stats = pool.stats();
    assert_eq!(stats.gets, (WORKERS * CYCLES) as u64);
    assert_eq!(stats.puts, (WORKERS * CYCLES) as u64);
    assert!(stats.calibrations > 0);

    // Small windows under contention can land on either populated class
    assert!(pool.is_calibrated());
    let serve = pool.serve_size();
    assert!(serve == 1024 || serve == 16384, "serve size {serve}");
    assert!(pool.discard_size().unwrap() >= serve);
}

#[test]
fn test_registry_pools_under_contention() {
    let registry = Arc::new(PoolRegistry::default());
    let shared = registry.clone();

    run_workers(6, Duration::from_secs(30), move |worker| {
        let name = if worker % 2 == 0 { "even" } else { "odd" };
        let pool = shared.pool(name);
        for i in 0..2_000 {
            get_put(&pool, 100 + (i % 50) * worker);
        }
    });

    assert_eq!(registry.names(), vec!["default", "even", "odd"]);
    let total: u64 = registry.stats().iter().map(|stats| stats.puts).sum();
    assert_eq!(total, 6 * 2_000);
}
