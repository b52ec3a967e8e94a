//! Core eligibility types
//!
//! Threshold policies, test results, verdicts and run records shared by the
//! engine, the storage layer and the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// THRESHOLD POLICY
// ============================================================================

/// Rule used to turn the population of accuracies into a single cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdType {
    Median,
    Mean,
    Custom,
}

impl ThresholdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdType::Median => "MEDIAN",
            ThresholdType::Mean => "MEAN",
            ThresholdType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for ThresholdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MEDIAN" => Ok(ThresholdType::Median),
            "MEAN" => Ok(ThresholdType::Mean),
            "CUSTOM" => Ok(ThresholdType::Custom),
            other => Err(format!("unknown threshold type: {}", other)),
        }
    }
}

/// Active threshold configuration.
///
/// `value` is only ever `Some` for [`ThresholdType::Custom`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdPolicy {
    #[serde(rename = "type")]
    pub threshold_type: ThresholdType,
    pub value: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl ThresholdPolicy {
    pub fn median() -> Self {
        Self {
            threshold_type: ThresholdType::Median,
            value: None,
            last_updated: Utc::now(),
        }
    }

    pub fn mean() -> Self {
        Self {
            threshold_type: ThresholdType::Mean,
            value: None,
            last_updated: Utc::now(),
        }
    }

    /// Build a CUSTOM policy without validating `value`; use
    /// [`crate::policy::ThresholdPolicyStore::set_policy`] for checked updates.
    pub fn custom(value: f64) -> Self {
        Self {
            threshold_type: ThresholdType::Custom,
            value: Some(value),
            last_updated: Utc::now(),
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::median()
    }
}

// ============================================================================
// WORKERS AND TEST RESULTS
// ============================================================================

/// A crowd participant known to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub worker_id: String,
    pub tester_name: String,
    pub created_at: DateTime<Utc>,
}

/// One recorded test outcome. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: Uuid,
    pub worker_id: String,
    pub test_id: String,
    pub score: f64,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a test outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTestResult {
    pub worker_id: String,
    #[serde(default)]
    pub tester_name: Option<String>,
    pub test_id: String,
    pub score: f64,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Worker plus its ordered score history (oldest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerAccuracyRecord {
    pub worker_id: String,
    pub tester_name: String,
    pub scores: Vec<f64>,
}

/// Point-in-time view of everything a run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationSnapshot {
    pub policy: ThresholdPolicy,
    pub workers: Vec<WorkerAccuracyRecord>,
}

// ============================================================================
// ACCURACY AND ELIGIBILITY
// ============================================================================

/// Aggregated accuracy of a worker. `Unavailable` means "not enough data".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Accuracy {
    Available(f64),
    Unavailable,
}

impl Accuracy {
    pub fn value(&self) -> Option<f64> {
        match self {
            Accuracy::Available(v) => Some(*v),
            Accuracy::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Accuracy::Available(_))
    }
}

/// Tri-state eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    NotEligible,
    Pending,
}

impl Eligibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Eligibility::Eligible => "eligible",
            Eligibility::NotEligible => "not_eligible",
            Eligibility::Pending => "pending",
        }
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Eligibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eligible" => Ok(Eligibility::Eligible),
            "not_eligible" => Ok(Eligibility::NotEligible),
            "pending" => Ok(Eligibility::Pending),
            other => Err(format!("unknown eligibility status: {}", other)),
        }
    }
}

/// Per-worker outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityVerdict {
    pub worker_id: String,
    pub is_eligible: Eligibility,
    pub accuracy: Option<f64>,
    pub threshold: Option<f64>,
    pub run_id: Uuid,
    pub computed_at: DateTime<Utc>,
}

// ============================================================================
// RUNS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Manual,
    PolicyChange,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Manual => "manual",
            RunTrigger::PolicyChange => "policy_change",
        }
    }
}

impl FromStr for RunTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RunTrigger::Manual),
            "policy_change" => Ok(RunTrigger::PolicyChange),
            other => Err(format!("unknown run trigger: {}", other)),
        }
    }
}

/// Counts and digest reported by a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub eligible_count: usize,
    pub not_eligible_count: usize,
    pub pending_count: usize,
    pub threshold: Option<f64>,
    pub policy: ThresholdPolicy,
    /// SHA-256 over the ordered (worker, verdict) pairs
    pub verdict_digest: String,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.eligible_count + self.not_eligible_count + self.pending_count
    }
}

/// One complete recomputation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

impl EligibilityRun {
    pub fn start(trigger: RunTrigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Running,
            trigger,
            started_at: Utc::now(),
            finished_at: None,
            summary: None,
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

// ============================================================================
// READ MODELS
// ============================================================================

/// Row of the tester analysis view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TesterAnalysis {
    pub worker_id: String,
    pub tester_name: String,
    pub accuracy: Option<f64>,
    pub score_count: usize,
    pub is_eligible: Eligibility,
    pub computed_at: Option<DateTime<Utc>>,
}

/// Test result joined with the worker's current verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultView {
    pub id: Uuid,
    pub worker_id: String,
    pub test_id: String,
    pub score: f64,
    pub feedback: Option<String>,
    pub eligibility_status: Eligibility,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_type_parse() {
        assert_eq!("median".parse::<ThresholdType>(), Ok(ThresholdType::Median));
        assert_eq!("MEAN".parse::<ThresholdType>(), Ok(ThresholdType::Mean));
        assert_eq!("Custom".parse::<ThresholdType>(), Ok(ThresholdType::Custom));
        assert!("mode".parse::<ThresholdType>().is_err());
    }

    #[test]
    fn test_policy_json_shape() {
        let policy = ThresholdPolicy::custom(0.7);
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["type"], "CUSTOM");
        assert_eq!(json["value"], 0.7);
        assert!(json["lastUpdated"].is_string());
    }

    #[test]
    fn test_median_policy_serializes_null_value() {
        let json = serde_json::to_value(ThresholdPolicy::median()).unwrap();
        assert_eq!(json["type"], "MEDIAN");
        assert!(json["value"].is_null());
    }

    #[test]
    fn test_eligibility_round_trip_str() {
        for status in [
            Eligibility::Eligible,
            Eligibility::NotEligible,
            Eligibility::Pending,
        ] {
            assert_eq!(status.as_str().parse::<Eligibility>(), Ok(status));
        }
        assert_eq!(
            serde_json::to_value(Eligibility::NotEligible).unwrap(),
            "not_eligible"
        );
    }

    #[test]
    fn test_run_start_is_running() {
        let run = EligibilityRun::start(RunTrigger::Manual);
        assert!(run.is_running());
        assert!(run.finished_at.is_none());
    }
}
