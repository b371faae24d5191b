//! Anti-money-laundering transaction check

use crate::sanctions::ReferenceListCache;
use crate::types::{CheckOutcome, ComplianceCheck, RiskFactor};
use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use scoring_core::config::{AmlConfig, ComplianceThresholds, Tier};
use scoring_core::{
    clamp_unit, normalize_amount, query_within, Action, CurrencyConverter, EngineConfig,
    EvaluationContext, HistoryKey, HistoryQuery, TransactionHistory, TransactionSnapshot,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// AML scoring: weighted amount/frequency/country blend plus
/// sanctions and PEP screening outside the blend.
pub struct AmlCheck {
    config: AmlConfig,
    thresholds: ComplianceThresholds,
    reference_currency: String,
    frequency_fallback: f64,
    country_fallback: f64,
    history_timeout: Duration,
    history: Arc<dyn TransactionHistory>,
    converter: Arc<dyn CurrencyConverter>,
    lists: Arc<ReferenceListCache>,
}

impl std::fmt::Debug for AmlCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmlCheck")
            .field("reference_currency", &self.reference_currency)
            .field("history_timeout", &self.history_timeout)
            .finish()
    }
}

impl AmlCheck {
    pub fn new(
        config: &EngineConfig,
        history: Arc<dyn TransactionHistory>,
        converter: Arc<dyn CurrencyConverter>,
        lists: Arc<ReferenceListCache>,
    ) -> Self {
        Self {
            config: config.compliance.aml.clone(),
            thresholds: config.compliance.thresholds.clone(),
            reference_currency: config.reference_currency.clone(),
            frequency_fallback: config.fraud.fallbacks.aml_frequency,
            country_fallback: config.fraud.fallbacks.aml_country,
            history_timeout: config.timeouts.history_query(),
            history,
            converter,
            lists,
        }
    }

    pub async fn check(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> CheckOutcome {
        let mut outcome = CheckOutcome::new(ComplianceCheck::Aml);

        // 1. Amount risk
        let normalized = normalize_amount(
            self.converter.as_ref(),
            snapshot.amount,
            &snapshot.currency,
            &self.reference_currency,
        );
        if let Some(caveat) = normalized.caveat {
            outcome.reason(caveat);
        }
        let amount_risk = self.amount_risk(normalized.amount);
        outcome.factors.push(RiskFactor {
            factor_type: "Transaction Amount".to_string(),
            weight: self.config.amount_weight,
            score: amount_risk,
            description: format!("{} {}", normalized.amount, self.reference_currency),
        });
        if amount_risk > self.thresholds.high {
            outcome.reason("Unusually large transaction amount");
            outcome.action(Action::EnhancedDueDiligence);
        }

        // 2. Frequency risk
        let frequency_risk = self.frequency_risk(snapshot, context, &mut outcome).await;
        outcome.factors.push(RiskFactor {
            factor_type: "Transaction Frequency".to_string(),
            weight: self.config.frequency_weight,
            score: frequency_risk,
            description: "Transactions in the last 24 hours".to_string(),
        });
        if frequency_risk > 0.5 {
            outcome.reason("Unusual transaction pattern detected");
        }

        // 3. Country risk
        let country = transaction_country(snapshot, context);
        let country_risk = self.country_risk(country.as_deref());
        outcome.factors.push(RiskFactor {
            factor_type: "Country Risk".to_string(),
            weight: self.config.country_weight,
            score: country_risk,
            description: country.unwrap_or_else(|| "unknown".to_string()),
        });
        if country_risk > self.thresholds.high {
            outcome.reason("High-risk jurisdiction involved in transaction");
            outcome.action(Action::CountryRiskAssessment);
        }

        let mut risk = amount_risk * self.config.amount_weight
            + frequency_risk * self.config.frequency_weight
            + country_risk * self.config.country_weight;

        // 4-5. Sanctions and PEP screening
        let mut sanctioned = false;
        let mut screening_failed = false;
        if let Some(name) = screening_name(snapshot, context) {
            match self.lists.screen_name(&name).await {
                Ok(hits) => {
                    if let Some(entry) = hits.sanctions.first() {
                        sanctioned = true;
                        risk += 1.0;
                        outcome.reason(format!("Match found on sanctions list: {}", entry.list));
                        outcome.action(Action::BlockTransaction);
                        outcome.action(Action::FileReport);
                        warn!(
                            "Sanctions match for transaction {} ({})",
                            snapshot.reference, entry.list
                        );
                    }
                    if let Some(entry) = hits.peps.first() {
                        risk += self.config.pep_risk;
                        outcome.reason(format!(
                            "Customer identified as politically exposed person: {}, {}",
                            entry.position, entry.country
                        ));
                        outcome.action(Action::EnhancedDueDiligence);
                    }
                }
                Err(e) => {
                    error!(
                        "Sanctions screening unavailable for transaction {}: {}",
                        snapshot.reference, e
                    );
                    screening_failed = true;
                    outcome.reason("Sanctions screening unavailable");
                }
            }
        }

        outcome.risk = clamp_unit(risk);

        if outcome.risk > self.thresholds.critical || screening_failed {
            outcome.is_compliant = false;
            if !outcome.requires(Action::BlockTransaction) {
                outcome.action(Action::ManualReview);
            }
        } else if outcome.risk > self.thresholds.high {
            outcome.action(Action::EnhancedMonitoring);
        }

        if sanctioned {
            outcome.is_compliant = false;
        }

        outcome
    }

    /// Tiered amount risk (amount in the reference currency)
    pub fn amount_risk(&self, amount: Decimal) -> f64 {
        tier_risk(&self.config.amount_tiers, self.config.amount_ceiling_risk, |bound| {
            amount < *bound
        })
    }

    /// Tiered frequency risk for a 24h transaction count
    pub fn frequency_risk_for(&self, count: usize) -> f64 {
        tier_risk(
            &self.config.frequency_tiers,
            self.config.frequency_ceiling_risk,
            |bound| count <= *bound,
        )
    }

    /// Jurisdiction risk
    pub fn country_risk(&self, country: Option<&str>) -> f64 {
        let Some(code) = country.map(str::trim).filter(|c| !c.is_empty()) else {
            return self.country_fallback;
        };
        let code = code.to_uppercase();

        if self.config.high_risk_countries.contains(&code) {
            self.config.high_country_risk
        } else if self.config.medium_risk_countries.contains(&code) {
            self.config.medium_country_risk
        } else {
            self.config.low_country_risk
        }
    }

    async fn frequency_risk(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
        outcome: &mut CheckOutcome,
    ) -> f64 {
        let customer_id = context
            .customer
            .as_ref()
            .map(|c| c.id)
            .or(snapshot.customer_id);

        let key = match (customer_id, snapshot.normalized_email()) {
            (Some(id), _) => HistoryKey::Customer(id),
            (None, Some(email)) => HistoryKey::Email(email),
            (None, None) => return self.config.frequency_unknown_risk,
        };

        let query = HistoryQuery::new(key)
            .since(snapshot.created_at - ChronoDuration::hours(24))
            .excluding(snapshot.id);

        match query_within(
            self.history.as_ref(),
            &query,
            self.history_timeout,
            "aml_frequency",
        )
        .await
        {
            Ok(records) => self.frequency_risk_for(records.len()),
            Err(e) => {
                warn!(
                    "AML frequency check degraded for transaction {}: {}",
                    snapshot.reference, e
                );
                outcome.reason(format!("Transaction frequency unavailable: {}", e));
                self.frequency_fallback
            }
        }
    }
}

fn tier_risk<T>(tiers: &[Tier<T>], ceiling: f64, within: impl Fn(&T) -> bool) -> f64 {
    tiers
        .iter()
        .find(|tier| within(&tier.bound))
        .map(|tier| tier.risk)
        .unwrap_or(ceiling)
}

/// Declared country, then billing country, then customer country
fn transaction_country(
    snapshot: &TransactionSnapshot,
    context: &EvaluationContext,
) -> Option<String> {
    let metadata = &snapshot.metadata;
    metadata
        .country
        .clone()
        .or_else(|| metadata.billing_country.clone())
        .or_else(|| context.customer.as_ref().and_then(|c| c.country.clone()))
        .filter(|c| !c.trim().is_empty())
}

/// Customer "first last", else the payer name on the transaction
fn screening_name(snapshot: &TransactionSnapshot, context: &EvaluationContext) -> Option<String> {
    context
        .customer
        .as_ref()
        .and_then(|c| c.full_name())
        .or_else(|| snapshot.metadata.customer_name.clone())
        .filter(|n| !n.trim().is_empty())
}
