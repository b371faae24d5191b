//! Predictive model evaluator

use super::{names, SignalEvaluator};
use crate::model::{extract_features, FraudModel};
use async_trait::async_trait;
use scoring_core::config::ModelConfig;
use scoring_core::{
    EngineConfig, Error, EvaluationContext, Result, SignalResult, TransactionSnapshot,
};
use std::sync::Arc;

/// Maps the model probability onto a contribution
pub struct ModelEvaluator {
    config: ModelConfig,
    model: Arc<dyn FraudModel>,
}

impl std::fmt::Debug for ModelEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEvaluator")
            .field("model", &self.model.name())
            .field("config", &self.config)
            .finish()
    }
}

impl ModelEvaluator {
    /// Create new model evaluator
    pub fn new(config: &EngineConfig, model: Arc<dyn FraudModel>) -> Self {
        Self {
            config: config.fraud.model.clone(),
            model,
        }
    }

    /// Contribution for a probability
    pub fn contribution_for(&self, probability: f64) -> f64 {
        if probability >= self.config.threshold {
            1.0
        } else if probability >= self.config.partial_threshold() {
            0.5
        } else {
            0.0
        }
    }
}

#[async_trait]
impl SignalEvaluator for ModelEvaluator {
    fn name(&self) -> &'static str {
        names::MODEL
    }

    async fn evaluate(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> Result<SignalResult> {
        let features = extract_features(snapshot, context);
        let probability = self.model.predict(&features).await?;

        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(Error::Model(format!(
                "{} returned {} outside [0, 1]",
                self.model.name(),
                probability
            )));
        }

        let contribution = self.contribution_for(probability);
        let reasons = if contribution >= 1.0 {
            vec![format!("model fraud probability {:.2} above threshold", probability)]
        } else if contribution > 0.0 {
            vec![format!("model fraud probability {:.2} elevated", probability)]
        } else {
            Vec::new()
        };

        Ok(SignalResult::new(self.name(), contribution, reasons).with_raw_score(probability))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeatureMap;
    use rust_decimal_macros::dec;
    use scoring_core::Merchant;
    use uuid::Uuid;

    struct FixedModel(f64);

    #[async_trait]
    impl FraudModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn predict(&self, _features: &FeatureMap) -> Result<f64> {
            Ok(self.0)
        }
    }

    async fn run(probability: f64) -> Result<SignalResult> {
        let evaluator = ModelEvaluator::new(&EngineConfig::default(), Arc::new(FixedModel(probability)));
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(10), "USD");
        evaluator
            .evaluate(&tx, &EvaluationContext::new(Merchant::new("Shop")))
            .await
    }

    #[tokio::test]
    async fn test_probability_mapping() {
        assert_eq!(run(0.85).await.unwrap().contribution, 1.0);
        assert_eq!(run(0.6).await.unwrap().contribution, 0.5);
        assert_eq!(run(0.595).await.unwrap().contribution, 0.5);
        assert_eq!(run(0.59).await.unwrap().contribution, 0.0);

        let result = run(0.9).await.unwrap();
        assert_eq!(result.raw_score, Some(0.9));
        assert_eq!(result.reasons.len(), 1);
    }

    #[tokio::test]
    async fn test_contract_violation_is_an_error() {
        assert!(matches!(run(1.2).await, Err(Error::Model(_))));
        assert!(matches!(run(f64::NAN).await, Err(Error::Model(_))));
    }
}
