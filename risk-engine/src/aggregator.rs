//! Fraud score aggregation

use crate::evaluators::names;
use crate::types::{FraudAssessment, FraudScore};
use scoring_core::config::{FraudWeights, LevelThresholds};
use scoring_core::{push_unique, EngineConfig, RiskLevel, SignalResult};

/// Combines evaluator contributions into a 0-100 fraud score.
///
/// Weights are point caps: each evaluator adds `contribution x weight`.
#[derive(Debug, Clone)]
pub struct FraudAggregator {
    weights: FraudWeights,
    levels: LevelThresholds,
}

impl FraudAggregator {
    /// Create new aggregator
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            weights: config.fraud.weights.clone(),
            levels: config.fraud.levels.clone(),
        }
    }

    /// Weighted score of a set of signals
    pub fn score(&self, signals: &[SignalResult]) -> FraudScore {
        let total: f64 = signals
            .iter()
            .map(|s| s.contribution * self.weights.for_evaluator(&s.evaluator_name))
            .sum();
        FraudScore::new(total)
    }

    /// Level for a score
    pub fn level(&self, score: FraudScore) -> RiskLevel {
        let score = score.value();
        if score >= self.levels.high {
            RiskLevel::High
        } else if score >= self.levels.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Assess a full set of evaluator outputs
    pub fn aggregate(&self, signals: Vec<SignalResult>) -> FraudAssessment {
        let score = self.score(&signals);
        let level = self.level(score);

        let mut reasons = Vec::new();
        for reason in signals.iter().flat_map(|s| s.reasons.iter()) {
            push_unique(&mut reasons, reason.clone());
        }

        let model_score = signals
            .iter()
            .find(|s| s.evaluator_name == names::MODEL)
            .and_then(|s| s.raw_score);

        FraudAssessment {
            score,
            level,
            signals,
            reasons,
            model_score,
            short_circuited: false,
            whitelisted: false,
        }
    }
}
