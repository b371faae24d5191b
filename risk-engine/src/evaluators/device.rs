//! Device fingerprint sharing

use super::{customer_id, device_fingerprint, names, recent_history, SignalEvaluator};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use scoring_core::config::DeviceConfig;
use scoring_core::{
    Contributions, EngineConfig, EvaluationContext, HistoryKey, Result, SignalResult,
    TransactionHistory, TransactionMetadata, TransactionSnapshot,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Browser/user-agent anomaly detection
pub trait BrowserAnomalyDetector: Send + Sync {
    /// Whether the browser signals look tampered or automated
    fn is_anomalous(&self, metadata: &TransactionMetadata) -> bool;
}

/// Detector used when no real one is configured; never flags
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBrowserAnomalies;

impl BrowserAnomalyDetector for NoBrowserAnomalies {
    fn is_anomalous(&self, _metadata: &TransactionMetadata) -> bool {
        false
    }
}

/// Device fingerprint sharing and browser anomaly checks
pub struct DeviceEvaluator {
    config: DeviceConfig,
    history_timeout: Duration,
    history: Arc<dyn TransactionHistory>,
    browser: Arc<dyn BrowserAnomalyDetector>,
}

impl std::fmt::Debug for DeviceEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEvaluator")
            .field("config", &self.config)
            .finish()
    }
}

impl DeviceEvaluator {
    /// Create new device evaluator with no browser detector
    pub fn new(config: &EngineConfig, history: Arc<dyn TransactionHistory>) -> Self {
        Self {
            config: config.fraud.device.clone(),
            history_timeout: config.timeouts.history_query(),
            history,
            browser: Arc::new(NoBrowserAnomalies),
        }
    }

    /// Use `detector` for user-agent anomalies
    pub fn with_browser_detector(mut self, detector: Arc<dyn BrowserAnomalyDetector>) -> Self {
        self.browser = detector;
        self
    }
}

#[async_trait]
impl SignalEvaluator for DeviceEvaluator {
    fn name(&self) -> &'static str {
        names::DEVICE
    }

    async fn evaluate(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> Result<SignalResult> {
        let Some(fingerprint) = device_fingerprint(snapshot, context) else {
            return Ok(SignalResult::none(self.name()));
        };

        let records = recent_history(
            self.history.as_ref(),
            HistoryKey::Device(fingerprint.to_string()),
            snapshot,
            ChronoDuration::hours(self.config.window_hours),
            self.history_timeout,
            self.name(),
        )
        .await?;

        let current = customer_id(snapshot, context);
        let others: HashSet<_> = records
            .iter()
            .filter_map(|r| r.customer_id)
            .filter(|c| Some(*c) != current)
            .collect();

        let mut signal = Contributions::new();

        if others.len() >= self.config.max_shared_customers {
            signal.add(
                1.0,
                format!(
                    "device shared by {} customers in {}h",
                    others.len() + 1,
                    self.config.window_hours
                ),
            );
        }

        if self.browser.is_anomalous(&snapshot.metadata) {
            signal.add(self.config.browser_anomaly, "browser anomaly detected");
        }

        Ok(signal.finish(self.name()))
    }
}
