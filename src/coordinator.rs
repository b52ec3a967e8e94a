//! Eligibility update coordinator
//!
//! Runs one full recomputation at a time:
//!
//! ```text
//! trigger ──► claim run slot ──► snapshot (policy + scores)
//!                  │                      │
//!                  │               aggregate + classify
//!                  │                      │
//!                  └── release ◄── commit verdict batch
//! ```
//!
//! Key invariants:
//! - At most one run is `running`; a second trigger fails fast
//! - The threshold is resolved once per snapshot, never per worker
//! - Verdicts are committed as one batch or not at all
//! - Failed runs are never retried automatically

use crate::aggregator::AccuracyAggregator;
use crate::classifier::EligibilityClassifier;
use crate::config::EligibilityConfig;
use crate::error::{EligibilityError, EligibilityResult};
use crate::storage::EligibilityStore;
use crate::types::{
    Eligibility, EligibilityRun, EligibilityVerdict, PopulationSnapshot, RunStatus, RunSummary,
    RunTrigger, ThresholdPolicy,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Verdicts and summary computed from one snapshot
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub verdicts: Vec<EligibilityVerdict>,
    pub summary: RunSummary,
}

pub struct EligibilityUpdateCoordinator {
    store: Arc<dyn EligibilityStore>,
    aggregator: AccuracyAggregator,
    classifier: EligibilityClassifier,
    /// Last known run; `Running` while a run holds the slot
    slot: Mutex<Option<EligibilityRun>>,
}

impl EligibilityUpdateCoordinator {
    pub fn new(
        store: Arc<dyn EligibilityStore>,
        aggregator: AccuracyAggregator,
        classifier: EligibilityClassifier,
    ) -> Self {
        Self {
            store,
            aggregator,
            classifier,
            slot: Mutex::new(None),
        }
    }

    pub fn from_config(store: Arc<dyn EligibilityStore>, config: &EligibilityConfig) -> Self {
        Self::new(
            store,
            AccuracyAggregator::new(config.aggregation, config.min_scores_per_worker),
            EligibilityClassifier::new(config.quorum),
        )
    }

    pub fn aggregator(&self) -> &AccuracyAggregator {
        &self.aggregator
    }

    pub fn classifier(&self) -> &EligibilityClassifier {
        &self.classifier
    }

    /// Run currently holding the slot, or the last finished one in this process
    pub fn current_run(&self) -> Option<EligibilityRun> {
        self.slot.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|r| r.is_running())
    }

    /// Recompute every worker's verdict.
    ///
    /// Fails with [`EligibilityError::RunAlreadyInProgress`] if another run holds
    /// the slot, and with [`EligibilityError::RunFailed`] if the snapshot or the
    /// commit fails; in that case the previous verdict batch stays in place.
    pub fn trigger_update(&self, trigger: RunTrigger) -> EligibilityResult<RunSummary> {
        let guard = self.claim(trigger)?;
        let run = guard.run.clone();

        info!(
            "Eligibility run {} started ({})",
            run.id,
            run.trigger.as_str()
        );

        match self.execute(&run) {
            Ok((finished, summary)) => {
                info!(
                    "Eligibility run {} succeeded: {} eligible, {} not eligible, {} pending (threshold {:?})",
                    run.id,
                    summary.eligible_count,
                    summary.not_eligible_count,
                    summary.pending_count,
                    summary.threshold
                );
                guard.finish(finished);
                Ok(summary)
            }
            Err(reason) => {
                error!("Eligibility run {} failed: {}", run.id, reason);
                let mut failed = run;
                failed.status = RunStatus::Failed;
                failed.finished_at = Some(Utc::now());
                failed.error = Some(reason.clone());
                if let Err(e) = self.store.record_failed_run(&failed) {
                    warn!("Could not record failed run {}: {}", failed.id, e);
                }
                guard.finish(failed);
                Err(EligibilityError::RunFailed(reason))
            }
        }
    }

    fn claim(&self, trigger: RunTrigger) -> EligibilityResult<RunGuard<'_>> {
        let mut slot = self.slot.lock();
        if let Some(active) = slot.as_ref().filter(|r| r.is_running()) {
            debug!("Rejecting trigger: run {} in progress", active.id);
            return Err(EligibilityError::RunAlreadyInProgress(active.id));
        }
        let run = EligibilityRun::start(trigger);
        *slot = Some(run.clone());
        Ok(RunGuard {
            slot: &self.slot,
            run,
            finished: false,
        })
    }

    /// Snapshot, evaluate, commit. Returns the finished run record and its summary.
    fn execute(&self, run: &EligibilityRun) -> Result<(EligibilityRun, RunSummary), String> {
        let snapshot = self
            .store
            .load_snapshot()
            .map_err(|e| format!("snapshot: {}", e))?;

        let Evaluation { verdicts, summary } = self.evaluate(&snapshot, run.id, run.started_at);

        let mut finished = run.clone();
        finished.status = RunStatus::Succeeded;
        finished.finished_at = Some(Utc::now());
        finished.summary = Some(summary.clone());

        self.store
            .commit_run(&finished, &verdicts)
            .map_err(|e| format!("commit: {}", e))?;

        Ok((finished, summary))
    }

    /// Pure evaluation of a snapshot: no I/O, deterministic apart from the
    /// ids and timestamps passed in.
    pub fn evaluate(
        &self,
        snapshot: &PopulationSnapshot,
        run_id: Uuid,
        computed_at: DateTime<Utc>,
    ) -> Evaluation {
        let accuracies: Vec<_> = snapshot
            .workers
            .iter()
            .map(|w| (w, self.aggregator.compute_accuracy(w)))
            .collect();

        let population: Vec<f64> = accuracies.iter().filter_map(|(_, a)| a.value()).collect();
        let threshold = self
            .classifier
            .resolve_threshold(&snapshot.policy, &population);

        let verdicts: Vec<EligibilityVerdict> = accuracies
            .iter()
            .map(|(worker, accuracy)| EligibilityVerdict {
                worker_id: worker.worker_id.clone(),
                is_eligible: self.classifier.classify_with(*accuracy, threshold),
                accuracy: accuracy.value(),
                threshold: threshold.value(),
                run_id,
                computed_at,
            })
            .collect();

        let summary = summarize(run_id, &snapshot.policy, threshold.value(), &verdicts);
        Evaluation { verdicts, summary }
    }
}

fn summarize(
    run_id: Uuid,
    policy: &ThresholdPolicy,
    threshold: Option<f64>,
    verdicts: &[EligibilityVerdict],
) -> RunSummary {
    let count = |status: Eligibility| verdicts.iter().filter(|v| v.is_eligible == status).count();

    RunSummary {
        run_id,
        eligible_count: count(Eligibility::Eligible),
        not_eligible_count: count(Eligibility::NotEligible),
        pending_count: count(Eligibility::Pending),
        threshold,
        policy: policy.clone(),
        verdict_digest: verdict_digest(verdicts),
    }
}

/// SHA-256 over `worker:status` lines, sorted by worker id
pub fn verdict_digest(verdicts: &[EligibilityVerdict]) -> String {
    let mut pairs: Vec<(&str, &str)> = verdicts
        .iter()
        .map(|v| (v.worker_id.as_str(), v.is_eligible.as_str()))
        .collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    for (worker, status) in pairs {
        hasher.update(worker.as_bytes());
        hasher.update(b":");
        hasher.update(status.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Holds the run slot; a run that never reaches `finish` (panic, early
/// return) is marked failed when the guard drops.
struct RunGuard<'a> {
    slot: &'a Mutex<Option<EligibilityRun>>,
    run: EligibilityRun,
    finished: bool,
}

impl RunGuard<'_> {
    fn finish(mut self, record: EligibilityRun) {
        *self.slot.lock() = Some(record);
        self.finished = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut aborted = self.run.clone();
        aborted.status = RunStatus::Failed;
        aborted.finished_at = Some(Utc::now());
        aborted.error = Some("run aborted".to_string());
        warn!("Eligibility run {} aborted", aborted.id);
        *self.slot.lock() = Some(aborted);
    }
}

// ============================================================================
// POLICY CHANGE LISTENER
// ============================================================================

/// Poll interval while a policy-change run waits for the active run
const BUSY_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Recompute verdicts after every published policy change.
///
/// A change that lands while another run holds the slot waits for that run
/// to finish and then recomputes, since the active run may have taken its
/// snapshot under the old policy. Changes published while waiting coalesce
/// into the one pending recompute.
pub fn spawn_policy_listener(
    coordinator: Arc<EligibilityUpdateCoordinator>,
    mut changes: watch::Receiver<ThresholdPolicy>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let policy = changes.borrow_and_update().clone();
            debug!("Policy changed to {}, recomputing", policy.threshold_type);

            match recompute_after_change(&coordinator).await {
                Ok(summary) => debug!("Policy-change run {} done", summary.run_id),
                Err(e) => error!("Policy-change run failed: {}", e),
            }
        }
        debug!("Policy listener stopped");
    })
}

async fn recompute_after_change(
    coordinator: &Arc<EligibilityUpdateCoordinator>,
) -> EligibilityResult<RunSummary> {
    loop {
        let worker = coordinator.clone();
        let outcome =
            tokio::task::spawn_blocking(move || worker.trigger_update(RunTrigger::PolicyChange))
                .await
                .map_err(|e| EligibilityError::RunFailed(format!("run panicked: {}", e)))?;

        match outcome {
            Err(EligibilityError::RunAlreadyInProgress(active)) => {
                info!(
                    "Policy changed while run {} was active; recomputing once it finishes",
                    active
                );
                while coordinator.is_running() {
                    tokio::time::sleep(BUSY_POLL_INTERVAL).await;
                }
            }
            other => return other,
        }
    }
}
