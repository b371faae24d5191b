//! Decision policy
//!
//! Folds the fraud assessment and the compliance assessment into one
//! [`RiskDecision`]. The two sub-engines use different scales (0-100 and
//! 0.0-1.0); they are only combined through the configured blend.

use crate::types::{FraudAssessment, FraudScore};
use compliance_service::screening::level_for;
use compliance_service::ComplianceAssessment;
use chrono::Utc;
use scoring_core::config::{BlendConfig, ComplianceThresholds, LevelThresholds};
use scoring_core::{
    push_unique, Action, ComplianceStatus, EngineConfig, EvaluationMode, FraudSummary,
    RiskDecision, RiskLevel, ScoreScale,
};
use uuid::Uuid;

/// Weighting and threshold policy for final decisions
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    blend: BlendConfig,
    fraud_levels: LevelThresholds,
    compliance_thresholds: ComplianceThresholds,
    total_budget_ms: u64,
}

impl DecisionPolicy {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            blend: config.blend.clone(),
            fraud_levels: config.fraud.levels.clone(),
            compliance_thresholds: config.compliance.thresholds.clone(),
            total_budget_ms: config.timeouts.total_budget_ms,
        }
    }

    /// Actions implied by a fraud assessment
    pub fn fraud_actions(fraud: &FraudAssessment) -> Vec<Action> {
        let mut actions = Vec::new();
        if fraud.short_circuited {
            actions.push(Action::BlockTransaction);
        }
        match fraud.level {
            RiskLevel::High | RiskLevel::Blocked => actions.push(Action::ManualReview),
            RiskLevel::Medium => actions.push(Action::EnhancedMonitoring),
            RiskLevel::Low => {}
        }
        actions
    }

    /// Build the decision for one evaluation
    pub fn decide(
        &self,
        transaction_id: Uuid,
        mode: EvaluationMode,
        fraud: Option<&FraudAssessment>,
        compliance: Option<&ComplianceAssessment>,
    ) -> RiskDecision {
        let blacklisted = fraud.is_some_and(|f| f.short_circuited);

        let fraud_level = fraud.map(|f| f.level).unwrap_or(RiskLevel::Low);
        let fraud_score = fraud.map(|f| f.score.value()).unwrap_or(0.0);

        let actions = Action::union([
            fraud.map(Self::fraud_actions).unwrap_or_default(),
            compliance.map(|c| c.actions.clone()).unwrap_or_default(),
        ]);

        let mut reasons = Vec::new();
        let triggered = fraud
            .map(|f| f.reasons.as_slice())
            .unwrap_or_default()
            .iter()
            .chain(compliance.map(|c| c.reasons.as_slice()).unwrap_or_default());
        for reason in triggered {
            push_unique(&mut reasons, reason.clone());
        }

        // A blacklisted request never reaches the compliance checks
        let compliance_risk = match compliance {
            Some(c) => c.risk,
            None if blacklisted => 1.0,
            None => 0.0,
        };

        let status = match mode {
            EvaluationMode::Fraud => None,
            _ if blacklisted => Some(ComplianceStatus::Rejected),
            _ => compliance.map(|c| {
                let downgrade = fraud_level >= RiskLevel::High || actions.contains(&Action::BlockTransaction);
                if c.status == ComplianceStatus::Approved && downgrade {
                    ComplianceStatus::Review
                } else {
                    c.status
                }
            }),
        };

        let compliance_level = match (mode, status) {
            (EvaluationMode::Fraud, _) | (_, None) => RiskLevel::Low,
            (_, Some(status)) => level_for(
                status,
                compliance.map(|c| c.actions.as_slice()).unwrap_or_default(),
            ),
        };
        let level = fraud_level.max(compliance_level);

        let (overall_score, scale) = match mode {
            EvaluationMode::Fraud => (fraud_score, ScoreScale::Fraud),
            EvaluationMode::Compliance => (compliance_risk, ScoreScale::Compliance),
            EvaluationMode::Full => (self.blended(fraud_score, compliance_risk), ScoreScale::Blended),
        };

        RiskDecision {
            transaction_id,
            mode,
            overall_score,
            scale,
            level,
            status,
            fraud: fraud.map(|f| FraudSummary {
                score: f.score.value(),
                level: f.level,
                short_circuited: f.short_circuited,
            }),
            compliance: compliance.map(ComplianceAssessment::summary),
            actions,
            reasons,
            model_score: fraud.and_then(|f| f.model_score),
            conservative: false,
            evaluated_at: Utc::now(),
        }
    }

    /// `fraud_weight x fraud/100 + compliance_weight x compliance_risk`
    pub fn blended(&self, fraud_score: f64, compliance_risk: f64) -> f64 {
        let fraud = FraudScore::new(fraud_score).value() / FraudScore::MAX;
        let blended = self.blend.fraud_weight * fraud + self.blend.compliance_weight * compliance_risk;
        blended.clamp(0.0, 1.0)
    }

    /// Medium/review decision returned when the request budget runs out
    pub fn conservative(&self, transaction_id: Uuid, mode: EvaluationMode) -> RiskDecision {
        let (overall_score, scale) = match mode {
            EvaluationMode::Fraud => (self.fraud_levels.medium, ScoreScale::Fraud),
            EvaluationMode::Compliance => (self.compliance_thresholds.medium, ScoreScale::Compliance),
            EvaluationMode::Full => (
                self.blended(self.fraud_levels.medium, self.compliance_thresholds.medium),
                ScoreScale::Blended,
            ),
        };

        let status = match mode {
            EvaluationMode::Fraud => None,
            _ => Some(ComplianceStatus::Review),
        };

        RiskDecision {
            transaction_id,
            mode,
            overall_score,
            scale,
            level: RiskLevel::Medium,
            status,
            fraud: None,
            compliance: None,
            actions: vec![Action::ManualReview],
            reasons: vec![format!(
                "evaluation exceeded {}ms budget; conservative decision",
                self.total_budget_ms
            )],
            model_score: None,
            conservative: true,
            evaluated_at: Utc::now(),
        }
    }
}
