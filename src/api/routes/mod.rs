//! API route handlers.
//!
//! Each submodule handles a specific group of endpoints:
//! - `settings`: threshold policy read/update
//! - `eligibility`: recomputation runs
//! - `results`: test-result intake, worker registry and read models

pub mod eligibility;
pub mod results;
pub mod settings;

pub use eligibility::{latest_run, trigger_update};
pub use results::{list_test_results, register_worker, submit_test_result, tester_analysis};
pub use settings::{get_threshold_settings, update_threshold_settings};

use crate::api::errors::ApiError;
use crate::error::EligibilityResult;

/// Run a synchronous service call on the blocking pool
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> EligibilityResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

pub async fn health_check() -> &'static str {
    "OK"
}
