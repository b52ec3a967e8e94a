//! Threshold policy store
//!
//! Holds the single active [`ThresholdPolicy`]. Updates are validated before
//! anything is written, and every accepted update is published on a watch
//! channel so the coordinator can recompute verdicts.

use crate::error::{EligibilityError, EligibilityResult};
use crate::storage::EligibilityStore;
use crate::types::{ThresholdPolicy, ThresholdType};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Requested policy change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyUpdate {
    #[serde(rename = "type")]
    pub threshold_type: ThresholdType,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Check an update and normalise it: CUSTOM keeps its value, MEDIAN/MEAN drop it.
pub fn validate_update(
    threshold_type: ThresholdType,
    value: Option<f64>,
) -> EligibilityResult<Option<f64>> {
    match threshold_type {
        ThresholdType::Custom => {
            let value = value.ok_or_else(|| {
                EligibilityError::Validation("CUSTOM threshold requires a value".to_string())
            })?;
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(EligibilityError::Validation(format!(
                    "CUSTOM threshold must be within [0, 1], got {}",
                    value
                )));
            }
            Ok(Some(value))
        }
        ThresholdType::Median | ThresholdType::Mean => Ok(None),
    }
}

pub struct ThresholdPolicyStore {
    store: Arc<dyn EligibilityStore>,
    write_lock: Mutex<()>,
    changes: watch::Sender<ThresholdPolicy>,
}

impl ThresholdPolicyStore {
    /// Load the persisted policy, seeding the default when none exists yet
    pub fn new(store: Arc<dyn EligibilityStore>) -> EligibilityResult<Self> {
        let policy = match store.load_policy()? {
            Some(policy) => policy,
            None => {
                let policy = ThresholdPolicy::default();
                store.save_policy(&policy)?;
                info!("Seeded default threshold policy ({})", policy.threshold_type);
                policy
            }
        };
        let (changes, _) = watch::channel(policy);

        Ok(Self {
            store,
            write_lock: Mutex::new(()),
            changes,
        })
    }

    pub fn get_policy(&self) -> EligibilityResult<ThresholdPolicy> {
        Ok(self.store.load_policy()?.unwrap_or_default())
    }

    /// Validate, persist and publish a new policy. Last writer wins.
    pub fn set_policy(
        &self,
        threshold_type: ThresholdType,
        value: Option<f64>,
    ) -> EligibilityResult<ThresholdPolicy> {
        let value = validate_update(threshold_type, value)?;

        let policy = ThresholdPolicy {
            threshold_type,
            value,
            last_updated: Utc::now(),
        };

        {
            let _guard = self.write_lock.lock();
            self.store.save_policy(&policy)?;
            self.changes.send_replace(policy.clone());
        }

        info!(
            "Threshold policy set to {}{}",
            policy.threshold_type,
            policy
                .value
                .map(|v| format!(" ({:.3})", v))
                .unwrap_or_default()
        );
        Ok(policy)
    }

    pub fn apply(&self, update: &PolicyUpdate) -> EligibilityResult<ThresholdPolicy> {
        self.set_policy(update.threshold_type, update.value)
    }

    /// Receiver that observes every accepted policy change
    pub fn subscribe(&self) -> watch::Receiver<ThresholdPolicy> {
        self.changes.subscribe()
    }
}
