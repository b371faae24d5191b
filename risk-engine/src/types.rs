//! Core types for the risk engine

use scoring_core::{EvaluationMode, RiskLevel, SignalResult, TransactionSnapshot};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fraud score on the 0-100 scale
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct FraudScore(f64);

impl FraudScore {
    /// Maximum fraud score
    pub const MAX: f64 = 100.0;

    /// Create a fraud score, clamped into [0, 100]
    pub fn new(score: f64) -> Self {
        if score.is_nan() {
            return Self(0.0);
        }
        Self(score.clamp(0.0, Self::MAX))
    }

    /// Raw score
    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Fraud sub-engine outcome before it is folded into a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAssessment {
    /// Aggregated score
    pub score: FraudScore,

    /// Level from the score thresholds
    pub level: RiskLevel,

    /// Per-evaluator outputs, in evaluator order
    pub signals: Vec<SignalResult>,

    /// Flattened reasons from triggered evaluators
    pub reasons: Vec<String>,

    /// Predictive model probability, when the model ran
    pub model_score: Option<f64>,

    /// Blacklisted IP short-circuit
    pub short_circuited: bool,

    /// Fraud scoring skipped for a whitelisted customer
    pub whitelisted: bool,
}

impl FraudAssessment {
    /// Short-circuit assessment for a blacklisted IP
    pub fn blacklisted(ip: &str) -> Self {
        Self {
            score: FraudScore::new(FraudScore::MAX),
            level: RiskLevel::High,
            signals: Vec::new(),
            reasons: vec![format!("IP address {} is blacklisted", ip)],
            model_score: None,
            short_circuited: true,
            whitelisted: false,
        }
    }

    /// Whitelisted customers are not scored
    pub fn whitelisted() -> Self {
        Self {
            score: FraudScore::default(),
            level: RiskLevel::Low,
            signals: Vec::new(),
            reasons: Vec::new(),
            model_score: None,
            short_circuited: false,
            whitelisted: true,
        }
    }

    /// Signal of one evaluator
    pub fn signal(&self, evaluator_name: &str) -> Option<&SignalResult> {
        self.signals
            .iter()
            .find(|s| s.evaluator_name == evaluator_name)
    }
}

/// Per-call evaluation options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateOptions {
    /// Sub-engines to run
    #[serde(default)]
    pub mode: EvaluationMode,

    /// Re-evaluate even when the compliance status is terminal
    #[serde(default)]
    pub force: bool,

    /// Caller-supplied user agent, recorded during enrichment
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl EvaluateOptions {
    /// Options for `mode`
    pub fn mode(mode: EvaluationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Force re-evaluation
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Inbound evaluation request; the context is resolved by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Transaction to evaluate
    pub snapshot: TransactionSnapshot,

    /// Caller-supplied IP address
    #[serde(default)]
    pub ip_address: Option<String>,

    /// Caller-supplied device fingerprint
    #[serde(default)]
    pub device_fingerprint: Option<String>,

    /// Options
    #[serde(default)]
    pub options: EvaluateOptions,
}

impl EvaluationRequest {
    /// Request with default options
    pub fn new(snapshot: TransactionSnapshot) -> Self {
        Self {
            snapshot,
            ip_address: None,
            device_fingerprint: None,
            options: EvaluateOptions::default(),
        }
    }

    /// Transaction ID
    pub fn transaction_id(&self) -> Uuid {
        self.snapshot.id
    }
}
