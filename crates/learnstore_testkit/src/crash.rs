//! Crash recovery testing for LearnStore.
//!
//! The journal is the only durable state of a store, so a crash is modelled
//! as a backend that stops accepting bytes part way through a write. The
//! harness keeps a handle on the bytes that did reach storage and reopens a
//! fresh engine over them, the way the next process start would.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use learnstore_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! assert!(harness.run_all().iter().all(|r| r.passed));
//! ```

use learnstore_core::{Config, CoreResult, Engine};
use learnstore_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use serde_json::json;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Collection used by the harness.
pub const CRASH_COLLECTION: &str = "lessons";

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected records after recovery.
    pub expected_records: usize,
    /// Actual records after recovery.
    pub actual_records: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    fn check(description: &str, expected: usize, actual: usize) -> Self {
        Self {
            passed: expected == actual,
            description: description.to_string(),
            expected_records: expected,
            actual_records: actual,
            error: (expected != actual).then(|| "record count differs after recovery".into()),
        }
    }

    fn error(description: &str, expected: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_records: expected,
            actual_records: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Shared controls of a [`CrashableBackend`].
///
/// The engine owns the backend; tests arm and inspect it through this
/// handle.
#[derive(Debug)]
pub struct CrashSwitch {
    crash_after_bytes: AtomicU64,
    bytes_written: AtomicU64,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

impl CrashSwitch {
    fn new() -> Self {
        Self {
            crash_after_bytes: AtomicU64::new(u64::MAX),
            bytes_written: AtomicU64::new(0),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        }
    }

    /// Crashes once `bytes` more bytes have been written.
    pub fn crash_after(&self, bytes: u64) {
        let written = self.bytes_written.load(Ordering::SeqCst);
        self.crash_after_bytes
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Sets whether the next sync crashes.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    fn crash(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }
}

/// A storage backend wrapper that can simulate crashes.
///
/// Once crashed, every write is refused: the process is gone and nothing
/// else reaches storage.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    switch: Arc<CrashSwitch>,
}

impl CrashableBackend {
    /// Wraps `inner`. Returns the backend and its switch.
    pub fn new(inner: Box<dyn StorageBackend>) -> (Self, Arc<CrashSwitch>) {
        let switch = Arc::new(CrashSwitch::new());
        let backend = Self {
            inner,
            switch: Arc::clone(&switch),
        };
        (backend, switch)
    }

    fn refuse_if_crashed(&self) -> StorageResult<()> {
        if self.switch.has_crashed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.refuse_if_crashed()?;
        let len = data.len() as u64;
        let current = self.switch.bytes_written.fetch_add(len, Ordering::SeqCst);
        let threshold = self.switch.crash_after_bytes.load(Ordering::SeqCst);

        if current >= threshold {
            return Err(self.switch.crash("write"));
        }
        if current + len > threshold {
            let partial = usize::try_from(threshold - current).unwrap_or(data.len());
            if partial > 0 {
                self.inner.append(&data[..partial])?;
            }
            return Err(self.switch.crash("partial write"));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.refuse_if_crashed()?;
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.refuse_if_crashed()?;
        if self.switch.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.switch.crash("sync"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.refuse_if_crashed()?;
        self.inner.truncate(new_size)
    }
}

/// Test harness for crash recovery scenarios.
#[derive(Debug, Default)]
pub struct CrashRecoveryHarness {
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new harness.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an engine over a crashable in-memory journal. Returns the
    /// engine, the crash switch and a handle on the stored bytes.
    pub fn open_crashable() -> CoreResult<(Engine, Arc<CrashSwitch>, InMemoryBackend)> {
        let storage = InMemoryBackend::new();
        let (backend, switch) = CrashableBackend::new(Box::new(storage.clone()));
        let engine = Engine::new(Config::default(), Box::new(backend));
        engine.initialize()?;
        Ok((engine, switch, storage))
    }

    /// Opens a fresh engine over whatever reached storage.
    pub fn recover(storage: &InMemoryBackend) -> CoreResult<Engine> {
        let engine = Engine::new(
            Config::default(),
            Box::new(InMemoryBackend::with_data(storage.snapshot())),
        );
        engine.initialize()?;
        Ok(engine)
    }

    fn write(engine: &Engine, i: usize) -> CoreResult<String> {
        engine.add(
            CRASH_COLLECTION,
            json!({ "id": format!("lesson-{i}"), "title": format!("Lesson {i}"), "order": i }),
        )
    }

    fn record(
        &mut self,
        description: &str,
        expected: usize,
        run: impl FnOnce() -> CoreResult<usize>,
    ) -> CrashRecoveryResult {
        let result = match run() {
            Ok(actual) => CrashRecoveryResult::check(description, expected, actual),
            Err(err) => CrashRecoveryResult::error(description, expected, &err.to_string()),
        };
        self.results.push(result.clone());
        result
    }

    /// Tests that acknowledged writes survive a crash.
    pub fn test_acknowledged_writes_survive(&mut self) -> CrashRecoveryResult {
        self.record("Acknowledged writes survive a crash", 10, || {
            let (engine, switch, storage) = Self::open_crashable()?;
            for i in 0..10 {
                Self::write(&engine, i)?;
            }
            switch.crash_after(0);
            let _ = Self::write(&engine, 10);

            let recovered = Self::recover(&storage)?;
            recovered.count(CRASH_COLLECTION, None)
        })
    }

    /// Tests that a write torn part way is dropped on recovery.
    pub fn test_torn_write_discarded(&mut self) -> CrashRecoveryResult {
        self.record("Torn write is discarded, earlier writes kept", 3, || {
            let (engine, switch, storage) = Self::open_crashable()?;
            for i in 0..3 {
                Self::write(&engine, i)?;
            }
            switch.crash_after(7);
            let torn = Self::write(&engine, 3);
            if torn.is_ok() || !switch.has_crashed() {
                return Ok(usize::MAX);
            }
            // The failed write must not be visible in the running engine either.
            if engine.get(CRASH_COLLECTION, "lesson-3")?.is_some() {
                return Ok(usize::MAX);
            }

            let recovered = Self::recover(&storage)?;
            if recovered.get(CRASH_COLLECTION, "lesson-3")?.is_some() {
                return Ok(usize::MAX);
            }
            recovered.count(CRASH_COLLECTION, None)
        })
    }

    /// Tests that a batch torn part way is dropped as a whole.
    pub fn test_torn_batch_is_all_or_nothing(&mut self) -> CrashRecoveryResult {
        self.record("Torn batch is dropped as a whole", 1, || {
            let (engine, switch, storage) = Self::open_crashable()?;
            Self::write(&engine, 0)?;
            switch.crash_after(40);
            let batch = (1..6).map(|i| json!({ "id": format!("lesson-{i}"), "order": i }));
            let _ = engine.batch_put(CRASH_COLLECTION, batch);

            let recovered = Self::recover(&storage)?;
            recovered.count(CRASH_COLLECTION, None)
        })
    }

    /// Tests that a frame written before a failed sync is replayed.
    pub fn test_unsynced_frame_replayed(&mut self) -> CrashRecoveryResult {
        self.record("Frame written before a failed sync is replayed", 2, || {
            let (engine, switch, storage) = Self::open_crashable()?;
            Self::write(&engine, 0)?;
            switch.set_fail_on_sync(true);
            let _ = Self::write(&engine, 1);

            let recovered = Self::recover(&storage)?;
            recovered.count(CRASH_COLLECTION, None)
        })
    }

    /// Tests that the compacted journal recovers the latest versions.
    pub fn test_recovery_after_vacuum(&mut self) -> CrashRecoveryResult {
        self.record("Latest versions survive vacuum and crash", 1, || {
            let (engine, switch, storage) = Self::open_crashable()?;
            for order in 0..5 {
                engine.put(CRASH_COLLECTION, json!({ "id": "lesson-0", "order": order }))?;
            }
            engine.vacuum()?;
            switch.crash_after(0);

            let recovered = Self::recover(&storage)?;
            let latest = recovered
                .get(CRASH_COLLECTION, "lesson-0")?
                .and_then(|r| r.get("order").and_then(serde_json::Value::as_i64));
            if latest != Some(4) {
                return Ok(usize::MAX);
            }
            recovered.count(CRASH_COLLECTION, None)
        })
    }

    /// Runs every scenario.
    pub fn run_all(&mut self) -> &[CrashRecoveryResult] {
        self.test_acknowledged_writes_survive();
        self.test_torn_write_discarded();
        self.test_torn_batch_is_all_or_nothing();
        self.test_unsynced_frame_replayed();
        self.test_recovery_after_vacuum();
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_passed(result: &CrashRecoveryResult) {
        assert!(
            result.passed,
            "{}: expected {}, got {} ({:?})",
            result.description, result.expected_records, result.actual_records, result.error
        );
    }

    #[test]
    fn test_acknowledged_writes_survive() {
        assert_passed(&CrashRecoveryHarness::new().test_acknowledged_writes_survive());
    }

    #[test]
    fn test_torn_write_discarded() {
        assert_passed(&CrashRecoveryHarness::new().test_torn_write_discarded());
    }

    #[test]
    fn test_torn_batch_is_all_or_nothing() {
        assert_passed(&CrashRecoveryHarness::new().test_torn_batch_is_all_or_nothing());
    }

    #[test]
    fn test_unsynced_frame_replayed() {
        assert_passed(&CrashRecoveryHarness::new().test_unsynced_frame_replayed());
    }

    #[test]
    fn test_recovery_after_vacuum() {
        assert_passed(&CrashRecoveryHarness::new().test_recovery_after_vacuum());
    }

    #[test]
    fn test_run_all_collects_results() {
        let mut harness = CrashRecoveryHarness::new();
        let results = harness.run_all();
        assert_eq!(results.len(), 5);
        results.iter().for_each(assert_passed);
    }

    #[test]
    fn test_crashed_backend_refuses_writes() {
        let (mut backend, switch) = CrashableBackend::new(Box::new(InMemoryBackend::new()));
        backend.append(b"abc").unwrap();
        switch.crash_after(2);
        assert!(backend.append(b"defg").is_err());
        assert!(switch.has_crashed());
        assert_eq!(backend.size().unwrap(), 5);
        assert!(backend.append(b"h").is_err());
        assert!(backend.truncate(0).is_err());
    }
}
