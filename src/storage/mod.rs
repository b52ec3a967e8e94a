//! Data persistence layer.
//!
//! The engine only talks to [`EligibilityStore`]; the service runs on
//! [`SqliteStore`], tests and embedders can use [`MemoryStore`].

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StorageResult;
use crate::types::{
    EligibilityRun, EligibilityVerdict, PopulationSnapshot, TestResult, ThresholdPolicy, Worker,
};

pub trait EligibilityStore: Send + Sync {
    // ==================== Threshold Policy ====================

    fn load_policy(&self) -> StorageResult<Option<ThresholdPolicy>>;
    fn save_policy(&self, policy: &ThresholdPolicy) -> StorageResult<()>;

    // ==================== Workers ====================

    /// Insert the worker, or update its display name if it already exists
    fn upsert_worker(&self, worker_id: &str, tester_name: &str) -> StorageResult<Worker>;
    fn get_worker(&self, worker_id: &str) -> StorageResult<Option<Worker>>;
    fn list_workers(&self) -> StorageResult<Vec<Worker>>;

    // ==================== Test Results ====================

    /// Append a result and register its worker in the same write, so a failed
    /// append never leaves a new worker behind. `tester_name` renames the
    /// worker; without one an unknown worker is named after its id.
    fn record_test_result(&self, result: &TestResult, tester_name: Option<&str>)
        -> StorageResult<()>;
    /// Oldest first
    fn list_test_results(&self, worker_id: Option<&str>) -> StorageResult<Vec<TestResult>>;

    // ==================== Runs ====================

    /// Policy plus every worker's scores, read as one consistent view.
    /// Falls back to the default policy when none was ever saved.
    fn load_snapshot(&self) -> StorageResult<PopulationSnapshot>;

    /// Replace the whole verdict set and record the run, all-or-nothing
    fn commit_run(&self, run: &EligibilityRun, verdicts: &[EligibilityVerdict])
        -> StorageResult<()>;

    /// Record a run that produced no verdicts
    fn record_failed_run(&self, run: &EligibilityRun) -> StorageResult<()>;

    fn latest_verdicts(&self) -> StorageResult<Vec<EligibilityVerdict>>;
    fn latest_run(&self) -> StorageResult<Option<EligibilityRun>>;
}
