//! Eligibility classification
//!
//! Resolves the effective threshold for a policy and a population of
//! accuracies, then compares each worker against it. Equality counts as
//! eligible.

use crate::aggregator::mean;
use crate::types::{Accuracy, Eligibility, ThresholdPolicy, ThresholdType};

/// Default minimum population for MEDIAN/MEAN thresholds
pub const DEFAULT_QUORUM: usize = 3;

/// Threshold resolved for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    Resolved(f64),
    /// Population below quorum, or a CUSTOM policy stored without a value
    Unavailable,
}

impl Threshold {
    pub fn value(&self) -> Option<f64> {
        match self {
            Threshold::Resolved(v) => Some(*v),
            Threshold::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EligibilityClassifier {
    quorum: usize,
}

impl Default for EligibilityClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_QUORUM)
    }
}

impl EligibilityClassifier {
    pub fn new(quorum: usize) -> Self {
        Self { quorum }
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Cutoff for `policy` given every available accuracy in the population
    pub fn resolve_threshold(&self, policy: &ThresholdPolicy, population: &[f64]) -> Threshold {
        match policy.threshold_type {
            ThresholdType::Custom => match policy.value {
                Some(v) => Threshold::Resolved(v),
                None => Threshold::Unavailable,
            },
            ThresholdType::Median | ThresholdType::Mean if population.len() < self.quorum => {
                Threshold::Unavailable
            }
            ThresholdType::Median => median(population)
                .map(Threshold::Resolved)
                .unwrap_or(Threshold::Unavailable),
            ThresholdType::Mean => mean(population)
                .map(Threshold::Resolved)
                .unwrap_or(Threshold::Unavailable),
        }
    }

    /// Verdict for one worker against an already resolved threshold
    pub fn classify_with(&self, accuracy: Accuracy, threshold: Threshold) -> Eligibility {
        match (accuracy, threshold) {
            (Accuracy::Unavailable, _) | (_, Threshold::Unavailable) => Eligibility::Pending,
            (Accuracy::Available(a), Threshold::Resolved(t)) => {
                if a >= t {
                    Eligibility::Eligible
                } else {
                    Eligibility::NotEligible
                }
            }
        }
    }

    /// Resolve and classify in one step
    pub fn classify(
        &self,
        accuracy: Accuracy,
        policy: &ThresholdPolicy,
        population: &[f64],
    ) -> Eligibility {
        if !accuracy.is_available() {
            return Eligibility::Pending;
        }
        let threshold = self.resolve_threshold(policy, population);
        self.classify_with(accuracy, threshold)
    }
}

/// Median of the values; even counts average the two middle values
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[0.9, 0.5, 0.6]), Some(0.6));
        assert_eq!(median(&[0.2, 0.4, 0.6, 0.8]), Some(0.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_median_policy_scenario() {
        let classifier = EligibilityClassifier::default();
        let policy = ThresholdPolicy::median();
        let population = [0.5, 0.6, 0.9];

        let verdicts: Vec<Eligibility> = population
            .iter()
            .map(|a| classifier.classify(Accuracy::Available(*a), &policy, &population))
            .collect();

        assert_eq!(
            verdicts,
            vec![
                Eligibility::NotEligible,
                Eligibility::Eligible,
                Eligibility::Eligible
            ]
        );
    }

    #[test]
    fn test_tie_is_eligible() {
        let classifier = EligibilityClassifier::default();
        let policy = ThresholdPolicy::custom(0.7);
        assert_eq!(
            classifier.classify(Accuracy::Available(0.7), &policy, &[]),
            Eligibility::Eligible
        );
    }

    #[test]
    fn test_below_quorum_is_pending() {
        let classifier = EligibilityClassifier::default();
        let population = [0.4, 0.95];
        for policy in [ThresholdPolicy::median(), ThresholdPolicy::mean()] {
            for accuracy in population {
                assert_eq!(
                    classifier.classify(Accuracy::Available(accuracy), &policy, &population),
                    Eligibility::Pending
                );
            }
        }
    }

    #[test]
    fn test_empty_population_is_pending() {
        let classifier = EligibilityClassifier::default();
        assert_eq!(
            classifier.resolve_threshold(&ThresholdPolicy::mean(), &[]),
            Threshold::Unavailable
        );
    }

    #[test]
    fn test_custom_ignores_quorum() {
        let classifier = EligibilityClassifier::new(10);
        assert_eq!(
            classifier.resolve_threshold(&ThresholdPolicy::custom(0.3), &[]),
            Threshold::Resolved(0.3)
        );
    }

    #[test]
    fn test_mean_threshold() {
        let classifier = EligibilityClassifier::default();
        let threshold = classifier.resolve_threshold(&ThresholdPolicy::mean(), &[0.2, 0.4, 0.9]);
        let value = threshold.value().unwrap();
        assert!((value - 0.5).abs() < 1e-12);
        assert_eq!(
            classifier.classify_with(Accuracy::Available(0.4), threshold),
            Eligibility::NotEligible
        );
    }

    #[test]
    fn test_unavailable_accuracy_is_pending() {
        let classifier = EligibilityClassifier::default();
        assert_eq!(
            classifier.classify(Accuracy::Unavailable, &ThresholdPolicy::custom(0.0), &[]),
            Eligibility::Pending
        );
    }
}
