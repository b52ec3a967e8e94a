//! Accuracy aggregation
//!
//! Turns a worker's append-only score history into a single accuracy value.
//! Everything here is pure: same records in, same accuracy out.

use crate::error::{EligibilityError, EligibilityResult};
use crate::types::{Accuracy, WorkerAccuracyRecord};
use serde::{Deserialize, Serialize};

/// How scores are combined into an accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AggregationRule {
    /// Unweighted arithmetic mean over every recorded score
    #[default]
    Mean,
    /// Newest score has weight 1, a score `n` places older has `0.5^(n / half_life)`
    RecencyWeighted { half_life: f64 },
}

/// Reject anything that is not a finite number in [0, 1].
pub fn validate_score(score: f64) -> EligibilityResult<()> {
    if !score.is_finite() {
        return Err(EligibilityError::Validation(format!(
            "score must be a finite number, got {}",
            score
        )));
    }
    if !(0.0..=1.0).contains(&score) {
        return Err(EligibilityError::Validation(format!(
            "score must be within [0, 1], got {}",
            score
        )));
    }
    Ok(())
}

pub struct AccuracyAggregator {
    rule: AggregationRule,
    min_scores: usize,
}

impl Default for AccuracyAggregator {
    fn default() -> Self {
        Self {
            rule: AggregationRule::Mean,
            min_scores: 1,
        }
    }
}

impl AccuracyAggregator {
    pub fn new(rule: AggregationRule, min_scores: usize) -> Self {
        Self {
            rule,
            min_scores: min_scores.max(1),
        }
    }

    pub fn rule(&self) -> AggregationRule {
        self.rule
    }

    /// Accuracy for one worker's record
    pub fn compute_accuracy(&self, record: &WorkerAccuracyRecord) -> Accuracy {
        self.aggregate(&record.scores)
    }

    /// Aggregate an ordered (oldest first) score list.
    ///
    /// Invalid scores never make it into storage, but a corrupt row is skipped
    /// here rather than poisoning the whole population.
    pub fn aggregate(&self, scores: &[f64]) -> Accuracy {
        let valid: Vec<f64> = scores
            .iter()
            .copied()
            .filter(|s| validate_score(*s).is_ok())
            .collect();

        if valid.len() < self.min_scores {
            return Accuracy::Unavailable;
        }

        let value = match self.rule {
            AggregationRule::Mean => mean(&valid),
            AggregationRule::RecencyWeighted { half_life } => {
                recency_weighted_mean(&valid, half_life)
            }
        };

        match value {
            Some(v) => Accuracy::Available(v.clamp(0.0, 1.0)),
            None => Accuracy::Unavailable,
        }
    }
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn recency_weighted_mean(scores: &[f64], half_life: f64) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let half_life = if half_life > 0.0 { half_life } else { 1.0 };

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (age, score) in scores.iter().rev().enumerate() {
        let weight = 0.5_f64.powf(age as f64 / half_life);
        weighted_sum += score * weight;
        weight_total += weight;
    }

    if weight_total > 0.0 {
        Some(weighted_sum / weight_total)
    } else {
        None
    }
}
