//! Payment instrument reuse and BIN risk

use super::{customer_id, names, recent_history, SignalEvaluator};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use scoring_core::config::InstrumentConfig;
use scoring_core::{
    Contributions, EngineConfig, EvaluationContext, HistoryKey, Result, SignalResult,
    TransactionHistory, TransactionSnapshot,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Payment instrument reuse and BIN risk
pub struct InstrumentEvaluator {
    config: InstrumentConfig,
    history_timeout: Duration,
    history: Arc<dyn TransactionHistory>,
}

impl std::fmt::Debug for InstrumentEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentEvaluator")
            .field("config", &self.config)
            .finish()
    }
}

impl InstrumentEvaluator {
    /// Create new instrument evaluator
    pub fn new(config: &EngineConfig, history: Arc<dyn TransactionHistory>) -> Self {
        Self {
            config: config.fraud.instrument.clone(),
            history_timeout: config.timeouts.history_query(),
            history,
        }
    }

    fn high_risk_pattern(&self, bin: &str) -> Option<&str> {
        self.config
            .high_risk_bins
            .iter()
            .find(|pattern| bin_matches(pattern, bin))
            .map(String::as_str)
    }
}

/// Wildcard BIN match: `*` matches any digit, compared over the pattern length
pub fn bin_matches(pattern: &str, bin: &str) -> bool {
    let bin = bin.trim();
    if bin.len() < pattern.len() {
        return false;
    }

    pattern
        .chars()
        .zip(bin.chars())
        .all(|(p, b)| p == '*' || p == b)
}

#[async_trait]
impl SignalEvaluator for InstrumentEvaluator {
    fn name(&self) -> &'static str {
        names::INSTRUMENT
    }

    async fn evaluate(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> Result<SignalResult> {
        let Some(instrument) = &snapshot.instrument else {
            return Ok(SignalResult::none(self.name()));
        };

        let mut signal = Contributions::new();

        if let Some(bin) = instrument.bin() {
            if let Some(pattern) = self.high_risk_pattern(bin) {
                signal.add(
                    self.config.high_risk_bin,
                    format!("card BIN {} matches high-risk pattern {}", bin, pattern),
                );
            }
        }

        let Some(customer) = customer_id(snapshot, context) else {
            return Ok(signal.finish(self.name()));
        };

        let records = recent_history(
            self.history.as_ref(),
            HistoryKey::Customer(customer),
            snapshot,
            ChronoDuration::hours(24),
            self.history_timeout,
            self.name(),
        )
        .await?;

        let current = instrument.fingerprint();
        let hour_start = snapshot.created_at - ChronoDuration::hours(1);

        let mut hourly: HashSet<String> = HashSet::from([current.clone()]);
        let mut daily: HashSet<String> = HashSet::from([current]);
        for record in &records {
            if let Some(fp) = record.instrument_fingerprint() {
                if record.created_at >= hour_start {
                    hourly.insert(fp.clone());
                }
                daily.insert(fp);
            }
        }

        if hourly.len() >= self.config.max_per_hour {
            signal.add(
                self.config.churn,
                format!("{} payment instruments used in 1h", hourly.len()),
            );
        }

        if daily.len() >= self.config.max_per_day {
            signal.add(
                self.config.churn,
                format!("{} payment instruments used in 24h", daily.len()),
            );
        }

        Ok(signal.finish(self.name()))
    }
}
