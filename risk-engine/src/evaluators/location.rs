//! IP geolocation risk

use super::{customer_id, ip_address, names, recent_history, SignalEvaluator};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use scoring_core::config::LocationConfig;
use scoring_core::{
    Contributions, EngineConfig, EvaluationContext, GeoResolver, HistoryKey, Result,
    SignalResult, TransactionHistory, TransactionSnapshot,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// IP geolocation, new-IP and impossible-travel checks
pub struct LocationEvaluator {
    config: LocationConfig,
    history_timeout: Duration,
    history: Arc<dyn TransactionHistory>,
    geo: Arc<dyn GeoResolver>,
}

impl std::fmt::Debug for LocationEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationEvaluator")
            .field("config", &self.config)
            .finish()
    }
}

impl LocationEvaluator {
    /// Create new location evaluator
    pub fn new(
        config: &EngineConfig,
        history: Arc<dyn TransactionHistory>,
        geo: Arc<dyn GeoResolver>,
    ) -> Self {
        Self {
            config: config.fraud.location.clone(),
            history_timeout: config.timeouts.history_query(),
            history,
            geo,
        }
    }

    fn resolve(&self, ip: &str) -> Option<String> {
        ip.parse::<IpAddr>()
            .ok()
            .and_then(|addr| self.geo.resolve_country(&addr))
            .map(|c| c.to_uppercase())
    }
}

#[async_trait]
impl SignalEvaluator for LocationEvaluator {
    fn name(&self) -> &'static str {
        names::LOCATION
    }

    async fn evaluate(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> Result<SignalResult> {
        let Some(ip) = ip_address(snapshot, context) else {
            return Ok(SignalResult::none(self.name()));
        };

        let mut signal = Contributions::new();

        // An unparsable IP has no country but still counts against recent IPs
        let valid = ip.parse::<IpAddr>().is_ok();
        if !valid {
            signal.add(self.config.invalid_ip, format!("invalid IP address: {}", ip));
        }

        let country = if valid { self.resolve(ip) } else { None };
        if let Some(code) = &country {
            if self.config.high_risk_countries.contains(code) {
                signal.add(
                    self.config.high_risk_country,
                    format!("IP located in high-risk country: {}", code),
                );
            }
        }

        let Some(customer) = customer_id(snapshot, context) else {
            return Ok(signal.finish(self.name()));
        };

        let travel_window = ChronoDuration::seconds((self.config.impossible_travel_hours * 3600.0) as i64);
        let window = ChronoDuration::hours(self.config.ip_window_hours).max(travel_window);
        let mut recent = recent_history(
            self.history.as_ref(),
            HistoryKey::Customer(customer),
            snapshot,
            window,
            self.history_timeout,
            self.name(),
        )
        .await?;
        recent.truncate(self.config.recent_sample);

        let ip_window_start = snapshot.created_at - ChronoDuration::hours(self.config.ip_window_hours);
        let new_ip = recent
            .iter()
            .filter(|r| r.created_at >= ip_window_start)
            .filter_map(|r| r.ip_address())
            .any(|previous| previous != ip);
        if new_ip {
            signal.add(
                self.config.new_ip,
                format!(
                    "different IP address used within {}h",
                    self.config.ip_window_hours
                ),
            );
        }

        // Newest previous transaction with a resolvable IP
        let previous = recent.iter().find_map(|r| {
            let country = self.resolve(r.ip_address()?)?;
            Some((r.created_at, country))
        });

        if let (Some(current), Some((at, previous_country))) = (&country, previous) {
            if *current != previous_country && snapshot.created_at - at < travel_window {
                signal.add(
                    self.config.impossible_travel,
                    format!(
                        "impossible travel: {} to {} in under {}h",
                        previous_country, current, self.config.impossible_travel_hours
                    ),
                );
            }
        }

        Ok(signal.finish(self.name()))
    }
}
