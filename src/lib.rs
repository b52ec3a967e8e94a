//! Worker Eligibility Engine
//!
//! Decides which crowd testers qualify for premium testing resources by
//! comparing each worker's accuracy against a configurable threshold.
//!
//! ## Module Structure
//!
//! - `types`: domain model (policies, workers, verdicts, runs)
//! - `error`: engine and storage errors
//! - `aggregator`: score history → accuracy
//! - `classifier`: threshold resolution and tri-state verdicts
//! - `policy`: the single active threshold policy
//! - `coordinator`: one-at-a-time recomputation runs
//! - `service`: intake, read models and wiring for the API
//! - `storage/`: SQLite and in-memory persistence
//! - `api/`: REST API
//! - `server`: HTTP server startup
//! - `client`: HTTP client for the API
//! - `config`: TOML/env configuration
//! - `auth`: bearer token checks

// ============================================================================
// CORE
// ============================================================================

pub mod aggregator;
pub mod classifier;
pub mod error;
pub mod types;

// ============================================================================
// ENGINE
// ============================================================================

pub mod coordinator;
pub mod policy;
pub mod service;

/// Data persistence layer
pub mod storage;

// ============================================================================
// SURFACES
// ============================================================================

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use aggregator::{AccuracyAggregator, AggregationRule};
pub use classifier::{EligibilityClassifier, Threshold, DEFAULT_QUORUM};
pub use client::{ClientError, EligibilityClient};
pub use config::{ConfigError, EngineConfig};
pub use coordinator::{spawn_policy_listener, EligibilityUpdateCoordinator};
pub use error::{EligibilityError, EligibilityResult, StorageError, StorageResult};
pub use policy::{PolicyUpdate, ThresholdPolicyStore};
pub use service::{EligibilityService, ThresholdSettings};
pub use storage::{EligibilityStore, MemoryStore, SqliteStore};
pub use types::{
    Accuracy, Eligibility, EligibilityRun, EligibilityVerdict, NewTestResult, RunStatus,
    RunSummary, RunTrigger, TestResult, TestResultView, TesterAnalysis, ThresholdPolicy,
    ThresholdType, Worker,
};
