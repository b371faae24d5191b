//! Predictive fraud model contract
//!
//! A model maps a flattened feature map to a probability in [0, 1]. The
//! engine ships [`HeuristicModel`], a deterministic placeholder; production
//! deployments plug in a real model through [`FraudModel`].

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use rust_decimal::prelude::ToPrimitive;
use scoring_core::{EvaluationContext, Result, TransactionSnapshot};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Flattened model input
pub type FeatureMap = BTreeMap<String, Value>;

/// Build the feature map for a transaction
pub fn extract_features(snapshot: &TransactionSnapshot, context: &EvaluationContext) -> FeatureMap {
    let mut features = FeatureMap::new();

    features.insert(
        "amount".to_string(),
        json!(snapshot.amount.to_f64().unwrap_or(0.0)),
    );
    features.insert("currency".to_string(), json!(snapshot.currency));
    features.insert(
        "instrument_type".to_string(),
        json!(snapshot.instrument.as_ref().map(|i| i.kind())),
    );

    let customer = context
        .customer
        .as_ref()
        .map(|c| c.id)
        .or(snapshot.customer_id);
    features.insert(
        "customer_id".to_string(),
        json!(customer.map(|id| id.to_string())),
    );
    features.insert(
        "merchant_id".to_string(),
        json!(snapshot.merchant_id.to_string()),
    );
    features.insert(
        "ip_address".to_string(),
        json!(context
            .ip_address
            .as_deref()
            .or(snapshot.metadata.ip_address.as_deref())),
    );
    features.insert(
        "device_fingerprint".to_string(),
        json!(context
            .device_fingerprint
            .as_deref()
            .or(snapshot.metadata.device_fingerprint.as_deref())),
    );
    features.insert("hour_of_day".to_string(), json!(snapshot.created_at.hour()));
    features.insert(
        "day_of_week".to_string(),
        json!(snapshot.created_at.weekday().num_days_from_monday()),
    );

    if let Some(browser) = &snapshot.metadata.browser {
        features.insert("browser".to_string(), json!(browser));
    }
    if let Some(os) = &snapshot.metadata.os {
        features.insert("os".to_string(), json!(os));
    }

    features
}

/// Fraud probability model
#[async_trait]
pub trait FraudModel: Send + Sync {
    /// Model identifier for logs
    fn name(&self) -> &str;

    /// Fraud probability in [0, 1]
    async fn predict(&self, features: &FeatureMap) -> Result<f64>;
}

/// Deterministic placeholder: simple amount and night-time heuristics
/// blended with a hash-derived term.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicModel;

impl HeuristicModel {
    const BASE: f64 = 0.1;
    const CAP: f64 = 0.95;
    const HASH_WEIGHT: f64 = 0.3;

    /// Stable pseudo-random term in [0, 1] derived from the features
    fn hash_term(features: &FeatureMap) -> f64 {
        let encoded = Value::Object(features.clone().into_iter().collect()).to_string();
        let digest = Sha256::digest(encoded.as_bytes());

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix) as f64 / u64::MAX as f64
    }
}

#[async_trait]
impl FraudModel for HeuristicModel {
    fn name(&self) -> &str {
        "heuristic-v1"
    }

    async fn predict(&self, features: &FeatureMap) -> Result<f64> {
        let mut score = Self::BASE;

        if features.get("instrument_type").and_then(Value::as_str) == Some("card") {
            score += 0.05;
        }

        let amount = features.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
        if amount > 10_000.0 {
            score += 0.2;
        } else if amount > 5_000.0 {
            score += 0.1;
        }

        let hour = features.get("hour_of_day").and_then(Value::as_u64).unwrap_or(12);
        if (1..=5).contains(&hour) {
            score += 0.15;
        }

        score += Self::hash_term(features) * Self::HASH_WEIGHT;

        Ok(score.min(Self::CAP))
    }
}
