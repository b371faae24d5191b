//! Fraud signal evaluators
//!
//! Each evaluator is a pure function of the (enriched) snapshot, the
//! request context and read-only history. History queries run under the
//! configured per-query budget; an elapsed budget surfaces as
//! `Error::HistoryQueryTimeout` and the engine substitutes the evaluator's
//! fallback contribution at the fan-out boundary.

mod amount;
mod device;
mod email;
mod instrument;
mod location;
mod model;
mod velocity;

pub use amount::AmountEvaluator;
pub use device::{BrowserAnomalyDetector, DeviceEvaluator, NoBrowserAnomalies};
pub use email::EmailEvaluator;
pub use instrument::InstrumentEvaluator;
pub use location::LocationEvaluator;
pub use model::ModelEvaluator;
pub use velocity::VelocityEvaluator;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use scoring_core::{
    query_within, EvaluationContext, HistoryKey, HistoryQuery, HistoryRecord, Result,
    SignalResult, TransactionHistory, TransactionSnapshot,
};
use std::time::Duration;
use uuid::Uuid;

/// Evaluator names, also the keys of the weight and fallback tables
pub mod names {
    /// Transaction velocity
    pub const VELOCITY: &str = "velocity";
    /// IP geolocation
    pub const LOCATION: &str = "location";
    /// Device fingerprint
    pub const DEVICE: &str = "device";
    /// Payment instrument reuse
    pub const INSTRUMENT: &str = "instrument";
    /// Amount anomaly
    pub const AMOUNT: &str = "amount";
    /// Email reputation
    pub const EMAIL: &str = "email";
    /// Predictive model
    pub const MODEL: &str = "model";
}

/// One fraud risk dimension
#[async_trait]
pub trait SignalEvaluator: Send + Sync {
    /// Evaluator name (weight table key)
    fn name(&self) -> &'static str;

    /// Contribution in [0, 1] with reasons
    async fn evaluate(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> Result<SignalResult>;
}

/// Customer the transaction belongs to, resolved entity first
pub(crate) fn customer_id(snapshot: &TransactionSnapshot, context: &EvaluationContext) -> Option<Uuid> {
    context
        .customer
        .as_ref()
        .map(|c| c.id)
        .or(snapshot.customer_id)
}

/// Caller-supplied IP, else the one recorded on the snapshot
pub(crate) fn ip_address<'a>(
    snapshot: &'a TransactionSnapshot,
    context: &'a EvaluationContext,
) -> Option<&'a str> {
    context
        .ip_address
        .as_deref()
        .or(snapshot.metadata.ip_address.as_deref())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
}

/// Caller-supplied device fingerprint, else the recorded one
pub(crate) fn device_fingerprint<'a>(
    snapshot: &'a TransactionSnapshot,
    context: &'a EvaluationContext,
) -> Option<&'a str> {
    context
        .device_fingerprint
        .as_deref()
        .or(snapshot.metadata.device_fingerprint.as_deref())
        .map(str::trim)
        .filter(|fp| !fp.is_empty())
}

/// History for `key` in the `window` before the transaction, excluding it
pub(crate) async fn recent_history(
    history: &dyn TransactionHistory,
    key: HistoryKey,
    snapshot: &TransactionSnapshot,
    window: ChronoDuration,
    budget: Duration,
    source_name: &str,
) -> Result<Vec<HistoryRecord>> {
    let query = HistoryQuery::new(key)
        .since(snapshot.created_at - window)
        .until(snapshot.created_at)
        .excluding(snapshot.id);
    query_within(history, &query, budget, source_name).await
}
