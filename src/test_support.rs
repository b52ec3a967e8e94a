//! Store fakes shared by unit tests.

use crate::error::{StorageError, StorageResult};
use crate::storage::{EligibilityStore, MemoryStore};
use crate::types::{
    EligibilityRun, EligibilityVerdict, NewTestResult, PopulationSnapshot, TestResult,
    ThresholdPolicy, Worker,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use uuid::Uuid;

/// Wraps a [`MemoryStore`] with switchable failures and an optional gate
/// that parks `load_snapshot` after it has read the data, until released.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_snapshot: AtomicBool,
    pub fail_commit: AtomicBool,
    pub panic_on_snapshot: AtomicBool,
    gate: Mutex<Option<Gate>>,
}

struct Gate {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

/// Test-side handles for a gated snapshot
pub struct GateHandle {
    pub entered: mpsc::Receiver<()>,
    pub release: mpsc::Sender<()>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park the next `load_snapshot` call until the returned handle releases it
    pub fn gate_next_snapshot(&self) -> GateHandle {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.gate.lock() = Some(Gate {
            entered: entered_tx,
            release: release_rx,
        });
        GateHandle {
            entered: entered_rx,
            release: release_tx,
        }
    }
}

impl EligibilityStore for FlakyStore {
    fn load_policy(&self) -> StorageResult<Option<ThresholdPolicy>> {
        self.inner.load_policy()
    }

    fn save_policy(&self, policy: &ThresholdPolicy) -> StorageResult<()> {
        self.inner.save_policy(policy)
    }

    fn upsert_worker(&self, worker_id: &str, tester_name: &str) -> StorageResult<Worker> {
        self.inner.upsert_worker(worker_id, tester_name)
    }

    fn get_worker(&self, worker_id: &str) -> StorageResult<Option<Worker>> {
        self.inner.get_worker(worker_id)
    }

    fn list_workers(&self) -> StorageResult<Vec<Worker>> {
        self.inner.list_workers()
    }

    fn record_test_result(
        &self,
        result: &TestResult,
        tester_name: Option<&str>,
    ) -> StorageResult<()> {
        self.inner.record_test_result(result, tester_name)
    }

    fn list_test_results(&self, worker_id: Option<&str>) -> StorageResult<Vec<TestResult>> {
        self.inner.list_test_results(worker_id)
    }

    fn load_snapshot(&self) -> StorageResult<PopulationSnapshot> {
        let snapshot = self.inner.load_snapshot();
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
        if self.panic_on_snapshot.load(Ordering::SeqCst) {
            panic!("snapshot exploded");
        }
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(StorageError::Database("snapshot unavailable".to_string()));
        }
        snapshot
    }

    fn commit_run(
        &self,
        run: &EligibilityRun,
        verdicts: &[EligibilityVerdict],
    ) -> StorageResult<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StorageError::Database("disk I/O error".to_string()));
        }
        self.inner.commit_run(run, verdicts)
    }

    fn record_failed_run(&self, run: &EligibilityRun) -> StorageResult<()> {
        self.inner.record_failed_run(run)
    }

    fn latest_verdicts(&self) -> StorageResult<Vec<EligibilityVerdict>> {
        self.inner.latest_verdicts()
    }

    fn latest_run(&self) -> StorageResult<Option<EligibilityRun>> {
        self.inner.latest_run()
    }
}

/// Register `worker_id` and append one result per score
pub fn seed_worker(store: &dyn EligibilityStore, worker_id: &str, scores: &[f64]) {
    store.upsert_worker(worker_id, &format!("Tester {}", worker_id)).unwrap();
    for (i, score) in scores.iter().enumerate() {
        store
            .record_test_result(
                &TestResult {
                    id: Uuid::new_v4(),
                    worker_id: worker_id.to_string(),
                    test_id: format!("test-{}", i),
                    score: *score,
                    feedback: None,
                    created_at: Utc::now(),
                },
                None,
            )
            .unwrap();
    }
}

pub fn new_result(worker_id: &str, score: f64) -> NewTestResult {
    NewTestResult {
        worker_id: worker_id.to_string(),
        tester_name: None,
        test_id: "test-x".to_string(),
        score,
        feedback: None,
    }
}
