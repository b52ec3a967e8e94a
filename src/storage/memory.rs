//! In-memory storage
//!
//! Whole state behind one `RwLock`; snapshot and commit each take the lock
//! once, which gives the same isolation as the SQLite transactions.

use crate::error::{StorageError, StorageResult};
use crate::storage::EligibilityStore;
use crate::types::{
    EligibilityRun, EligibilityVerdict, PopulationSnapshot, TestResult, ThresholdPolicy, Worker,
    WorkerAccuracyRecord,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    policy: Option<ThresholdPolicy>,
    workers: BTreeMap<String, Worker>,
    results: Vec<TestResult>,
    result_ids: HashSet<Uuid>,
    verdicts: BTreeMap<String, EligibilityVerdict>,
    runs: Vec<EligibilityRun>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EligibilityStore for MemoryStore {
    fn load_policy(&self) -> StorageResult<Option<ThresholdPolicy>> {
        Ok(self.state.read().policy.clone())
    }

    fn save_policy(&self, policy: &ThresholdPolicy) -> StorageResult<()> {
        self.state.write().policy = Some(policy.clone());
        Ok(())
    }

    fn upsert_worker(&self, worker_id: &str, tester_name: &str) -> StorageResult<Worker> {
        let mut state = self.state.write();
        let worker = state
            .workers
            .entry(worker_id.to_string())
            .and_modify(|w| w.tester_name = tester_name.to_string())
            .or_insert_with(|| Worker {
                worker_id: worker_id.to_string(),
                tester_name: tester_name.to_string(),
                created_at: Utc::now(),
            });
        Ok(worker.clone())
    }

    fn get_worker(&self, worker_id: &str) -> StorageResult<Option<Worker>> {
        Ok(self.state.read().workers.get(worker_id).cloned())
    }

    fn list_workers(&self) -> StorageResult<Vec<Worker>> {
        Ok(self.state.read().workers.values().cloned().collect())
    }

    fn record_test_result(
        &self,
        result: &TestResult,
        tester_name: Option<&str>,
    ) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.result_ids.contains(&result.id) {
            return Err(StorageError::InvalidData(format!(
                "duplicate test result id {}",
                result.id
            )));
        }

        state
            .workers
            .entry(result.worker_id.clone())
            .and_modify(|w| {
                if let Some(name) = tester_name {
                    w.tester_name = name.to_string();
                }
            })
            .or_insert_with(|| Worker {
                worker_id: result.worker_id.clone(),
                tester_name: tester_name.unwrap_or(&result.worker_id).to_string(),
                created_at: Utc::now(),
            });
        state.result_ids.insert(result.id);
        state.results.push(result.clone());
        Ok(())
    }

    fn list_test_results(&self, worker_id: Option<&str>) -> StorageResult<Vec<TestResult>> {
        let state = self.state.read();
        Ok(state
            .results
            .iter()
            .filter(|r| worker_id.map_or(true, |id| r.worker_id == id))
            .cloned()
            .collect())
    }

    fn load_snapshot(&self) -> StorageResult<PopulationSnapshot> {
        let state = self.state.read();

        let mut records: BTreeMap<&str, WorkerAccuracyRecord> = state
            .workers
            .values()
            .map(|w| {
                (
                    w.worker_id.as_str(),
                    WorkerAccuracyRecord {
                        worker_id: w.worker_id.clone(),
                        tester_name: w.tester_name.clone(),
                        scores: Vec::new(),
                    },
                )
            })
            .collect();

        for result in &state.results {
            if let Some(record) = records.get_mut(result.worker_id.as_str()) {
                record.scores.push(result.score);
            }
        }

        Ok(PopulationSnapshot {
            policy: state.policy.clone().unwrap_or_default(),
            workers: records.into_values().collect(),
        })
    }

    fn commit_run(
        &self,
        run: &EligibilityRun,
        verdicts: &[EligibilityVerdict],
    ) -> StorageResult<()> {
        let mut state = self.state.write();
        state.verdicts = verdicts
            .iter()
            .map(|v| (v.worker_id.clone(), v.clone()))
            .collect();
        state.runs.push(run.clone());
        Ok(())
    }

    fn record_failed_run(&self, run: &EligibilityRun) -> StorageResult<()> {
        self.state.write().runs.push(run.clone());
        Ok(())
    }

    fn latest_verdicts(&self) -> StorageResult<Vec<EligibilityVerdict>> {
        Ok(self.state.read().verdicts.values().cloned().collect())
    }

    fn latest_run(&self) -> StorageResult<Option<EligibilityRun>> {
        Ok(self.state.read().runs.last().cloned())
    }
}
