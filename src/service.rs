//! Eligibility service
//!
//! One object per process wiring the policy store, the coordinator and the
//! persistence collaborator together. Everything the HTTP layer and the
//! embedding binaries need goes through here.

use crate::aggregator::validate_score;
use crate::config::EligibilityConfig;
use crate::coordinator::EligibilityUpdateCoordinator;
use crate::error::{EligibilityError, EligibilityResult};
use crate::policy::{PolicyUpdate, ThresholdPolicyStore};
use crate::storage::EligibilityStore;
use crate::types::{
    Accuracy, Eligibility, EligibilityRun, EligibilityVerdict, NewTestResult, RunSummary, RunTrigger,
    TestResult, TestResultView, TesterAnalysis, ThresholdPolicy, Worker,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Upper bound on identifier length accepted at intake
const MAX_ID_LEN: usize = 128;

/// Stored policy plus the cutoff it resolves to right now
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdSettings {
    #[serde(flatten)]
    pub policy: ThresholdPolicy,
    pub effective_threshold: Option<f64>,
    /// Workers with an available accuracy
    pub population_size: usize,
    pub quorum: usize,
}

pub struct EligibilityService {
    store: Arc<dyn EligibilityStore>,
    policies: Arc<ThresholdPolicyStore>,
    coordinator: Arc<EligibilityUpdateCoordinator>,
}

impl EligibilityService {
    pub fn new(store: Arc<dyn EligibilityStore>, config: &EligibilityConfig) -> EligibilityResult<Self> {
        let policies = Arc::new(ThresholdPolicyStore::new(store.clone())?);
        let coordinator = Arc::new(EligibilityUpdateCoordinator::from_config(
            store.clone(),
            config,
        ));
        Ok(Self {
            store,
            policies,
            coordinator,
        })
    }

    pub fn store(&self) -> &Arc<dyn EligibilityStore> {
        &self.store
    }

    pub fn policies(&self) -> &Arc<ThresholdPolicyStore> {
        &self.policies
    }

    pub fn coordinator(&self) -> &Arc<EligibilityUpdateCoordinator> {
        &self.coordinator
    }

    // ==================== Threshold Settings ====================

    pub fn threshold_settings(&self) -> EligibilityResult<ThresholdSettings> {
        let snapshot = self.store.load_snapshot()?;
        let population: Vec<f64> = snapshot
            .workers
            .iter()
            .filter_map(|w| self.coordinator.aggregator().compute_accuracy(w).value())
            .collect();
        let classifier = self.coordinator.classifier();
        let threshold = classifier.resolve_threshold(&snapshot.policy, &population);

        Ok(ThresholdSettings {
            policy: snapshot.policy,
            effective_threshold: threshold.value(),
            population_size: population.len(),
            quorum: classifier.quorum(),
        })
    }

    pub fn update_threshold_settings(
        &self,
        update: &PolicyUpdate,
    ) -> EligibilityResult<ThresholdPolicy> {
        self.policies.apply(update)
    }

    // ==================== Runs ====================

    pub fn trigger_update(&self) -> EligibilityResult<RunSummary> {
        self.coordinator.trigger_update(RunTrigger::Manual)
    }

    /// The active run if there is one, else the most recent persisted run
    pub fn latest_run(&self) -> EligibilityResult<Option<EligibilityRun>> {
        if let Some(run) = self.coordinator.current_run().filter(|r| r.is_running()) {
            return Ok(Some(run));
        }
        Ok(self.store.latest_run()?)
    }

    // ==================== Intake ====================

    pub fn register_worker(&self, worker_id: &str, tester_name: &str) -> EligibilityResult<Worker> {
        let worker_id = require_id("workerId", worker_id)?;
        let tester_name = tester_name.trim();
        if tester_name.is_empty() {
            return Err(EligibilityError::Validation(
                "testerName must not be empty".to_string(),
            ));
        }

        let worker = self.store.upsert_worker(worker_id, tester_name)?;
        info!("Registered worker {} ({})", worker.worker_id, worker.tester_name);
        Ok(worker)
    }

    /// Validate and append a test result, registering the worker on first sight.
    /// Does not trigger a run.
    pub fn submit_test_result(&self, input: NewTestResult) -> EligibilityResult<TestResult> {
        let worker_id = require_id("workerId", &input.worker_id)?.to_string();
        let test_id = require_id("testId", &input.test_id)?.to_string();
        validate_score(input.score)?;

        let tester_name = input
            .tester_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let result = TestResult {
            id: Uuid::new_v4(),
            worker_id,
            test_id,
            score: input.score,
            feedback: input.feedback,
            created_at: Utc::now(),
        };
        self.store.record_test_result(&result, tester_name)?;

        debug!(
            "Recorded result {} for worker {} (score {:.3})",
            result.id, result.worker_id, result.score
        );
        Ok(result)
    }

    // ==================== Read Models ====================

    /// Live accuracy for one worker; `Unavailable` below the score minimum
    pub fn worker_accuracy(&self, worker_id: &str) -> EligibilityResult<Accuracy> {
        let worker = self
            .store
            .get_worker(worker_id)?
            .ok_or_else(|| EligibilityError::NotFound(format!("worker {}", worker_id)))?;
        let scores: Vec<f64> = self
            .store
            .list_test_results(Some(&worker.worker_id))?
            .iter()
            .map(|r| r.score)
            .collect();
        Ok(self.coordinator.aggregator().aggregate(&scores))
    }

    /// Every known worker with live accuracy and last committed verdict
    pub fn tester_analysis(&self) -> EligibilityResult<Vec<TesterAnalysis>> {
        let snapshot = self.store.load_snapshot()?;
        let verdicts = self.verdict_index()?;
        let aggregator = self.coordinator.aggregator();

        Ok(snapshot
            .workers
            .iter()
            .map(|record| {
                let (is_eligible, computed_at) = verdict_status(&verdicts, &record.worker_id);
                TesterAnalysis {
                    worker_id: record.worker_id.clone(),
                    tester_name: record.tester_name.clone(),
                    accuracy: aggregator.compute_accuracy(record).value(),
                    score_count: record.scores.len(),
                    is_eligible,
                    computed_at,
                }
            })
            .collect())
    }

    /// Test results, oldest first, each tagged with its worker's current verdict
    pub fn test_results(&self, worker_id: Option<&str>) -> EligibilityResult<Vec<TestResultView>> {
        if let Some(id) = worker_id {
            if self.store.get_worker(id)?.is_none() {
                return Err(EligibilityError::NotFound(format!("worker {}", id)));
            }
        }

        let verdicts = self.verdict_index()?;
        Ok(self
            .store
            .list_test_results(worker_id)?
            .into_iter()
            .map(|r| {
                let (eligibility_status, _) = verdict_status(&verdicts, &r.worker_id);
                TestResultView {
                    id: r.id,
                    worker_id: r.worker_id,
                    test_id: r.test_id,
                    score: r.score,
                    feedback: r.feedback,
                    eligibility_status,
                    created_at: r.created_at,
                }
            })
            .collect())
    }

    fn verdict_index(&self) -> EligibilityResult<HashMap<String, EligibilityVerdict>> {
        Ok(self
            .store
            .latest_verdicts()?
            .into_iter()
            .map(|v| (v.worker_id.clone(), v))
            .collect())
    }
}

fn verdict_status(
    verdicts: &HashMap<String, EligibilityVerdict>,
    worker_id: &str,
) -> (Eligibility, Option<DateTime<Utc>>) {
    verdicts
        .get(worker_id)
        .map(|v| (v.is_eligible, Some(v.computed_at)))
        .unwrap_or((Eligibility::Pending, None))
}

fn require_id<'a>(field: &str, value: &'a str) -> EligibilityResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EligibilityError::Validation(format!(
            "{} must not be empty",
            field
        )));
    }
    if value.len() > MAX_ID_LEN {
        return Err(EligibilityError::Validation(format!(
            "{} exceeds {} characters",
            field, MAX_ID_LEN
        )));
    }
    Ok(value)
}
