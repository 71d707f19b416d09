//! Load runs against a store: repeated, mixed, batched and concurrent
//! lesson writes and reads, each summarized as a [`StressReport`].

use learnstore_core::{Engine, IndexFilter};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Collection the stress runs write to. Its `courseId` index is exercised
/// by the read runs.
pub const STRESS_COLLECTION: &str = "lessons";

/// Outcome of one stress run against a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StressReport {
    /// Calls that returned `Ok`.
    pub succeeded: usize,
    /// Calls that returned an error.
    pub failed: usize,
    /// Wall time of the run, setup excluded.
    pub elapsed: Duration,
    /// Journal frames in the store once the run finished.
    pub journal_frames: u64,
}

impl StressReport {
    fn finish(engine: &Engine, tally: &Tally, started: Instant) -> Self {
        let elapsed = started.elapsed();
        Self {
            succeeded: tally.succeeded.load(Ordering::Relaxed),
            failed: tally.failed.load(Ordering::Relaxed),
            elapsed,
            journal_frames: engine.stats().map_or(0, |stats| stats.journal_frames),
        }
    }

    /// Calls per second over the run.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.succeeded + self.failed) as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ok, {} failed in {:?} ({:.0}/s), journal at {} frames",
            self.succeeded,
            self.failed,
            self.elapsed,
            self.throughput(),
            self.journal_frames
        )
    }
}

/// Success and failure counters shared by the threads of a run.
#[derive(Debug, Default)]
struct Tally {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record<T, E>(&self, result: Result<T, E>) {
        self.add(result.is_ok(), 1);
    }

    fn add(&self, ok: bool, n: usize) {
        let counter = if ok { &self.succeeded } else { &self.failed };
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Number of distinct records.
    pub record_count: usize,
    /// Records per batch (for batch tests).
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            record_count: 1_000,
            batch_size: 100,
        }
    }
}

fn lesson(i: usize) -> serde_json::Value {
    json!({
        "id": lesson_id(i),
        "courseId": "stress",
        "title": format!("Lesson {i}"),
        "order": i,
    })
}

fn populate(engine: &Engine, config: &StressConfig) {
    engine
        .batch_put(STRESS_COLLECTION, (0..config.record_count).map(lesson))
        .expect("Failed to populate stress collection");
}

fn lesson_id(i: usize) -> String {
    format!("stress-{i}")
}

/// Puts the same `record_count` lessons over and over.
pub fn stress_sequential_writes(engine: &Engine, config: &StressConfig) -> StressReport {
    let tally = Tally::default();
    let started = Instant::now();
    for i in 0..config.operations {
        tally.record(engine.put(STRESS_COLLECTION, lesson(i % config.record_count.max(1))));
    }
    StressReport::finish(engine, &tally, started)
}

/// Cycles put, get and delete over the lesson ids.
pub fn stress_mixed_operations(engine: &Engine, config: &StressConfig) -> StressReport {
    let tally = Tally::default();
    let started = Instant::now();
    for i in 0..config.operations {
        let idx = i % config.record_count.max(1);
        match i % 3 {
            0 => tally.record(engine.put(STRESS_COLLECTION, lesson(idx))),
            1 => tally.record(engine.get(STRESS_COLLECTION, &lesson_id(idx))),
            _ => tally.record(engine.delete(STRESS_COLLECTION, &lesson_id(idx))),
        }
    }
    StressReport::finish(engine, &tally, started)
}

/// Readers split over threads, alternating id lookups with `courseId`
/// index reads.
pub fn stress_concurrent_reads(engine: Arc<Engine>, config: &StressConfig) -> StressReport {
    populate(&engine, config);

    let tally = Arc::new(Tally::default());
    let per_thread = config.operations / config.threads.max(1);
    let record_count = config.record_count.max(1);
    let started = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let tally = Arc::clone(&tally);
            thread::spawn(move || {
                let filter = IndexFilter::new("courseId", "stress");
                for i in 0..per_thread {
                    if i % 2 == 0 {
                        let idx = (t * per_thread + i) % record_count;
                        tally.record(engine.get(STRESS_COLLECTION, &lesson_id(idx)));
                    } else {
                        tally.record(engine.get_all(STRESS_COLLECTION, Some(&filter), Some(10)));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    StressReport::finish(&engine, &tally, started)
}

/// Writers split over threads, each adding its own range of ids.
pub fn stress_concurrent_writes(engine: Arc<Engine>, config: &StressConfig) -> StressReport {
    let tally = Arc::new(Tally::default());
    let per_thread = config.operations / config.threads.max(1);
    let started = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let tally = Arc::clone(&tally);
            thread::spawn(move || {
                for i in 0..per_thread {
                    tally.record(engine.add(STRESS_COLLECTION, lesson(t * per_thread + i)));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    StressReport::finish(&engine, &tally, started)
}

/// Writes `operations` lessons in batches of `batch_size`, one journal frame
/// per batch.
pub fn stress_batch_writes(engine: &Engine, config: &StressConfig) -> StressReport {
    let batch_size = config.batch_size.max(1);
    let tally = Tally::default();
    let started = Instant::now();
    for batch in 0..(config.operations / batch_size) {
        let records = (0..batch_size).map(|i| lesson(batch * batch_size + i));
        match engine.batch_put(STRESS_COLLECTION, records) {
            Ok(written) => tally.add(true, written),
            Err(_) => tally.add(false, batch_size),
        }
    }
    StressReport::finish(engine, &tally, started)
}
