//! Amount anomaly against customer and merchant history

use super::{customer_id, names, SignalEvaluator};
use async_trait::async_trait;
use rust_decimal::Decimal;
use scoring_core::config::AmountConfig;
use scoring_core::{
    normalize_amount, query_within, Contributions, CurrencyConverter, EngineConfig,
    EvaluationContext, HistoryKey, HistoryQuery, HistoryRecord, Result, SignalResult,
    TransactionHistory, TransactionSnapshot, TransactionStatus,
};
use std::sync::Arc;
use std::time::Duration;

/// Average and maximum of past successful amounts in one currency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountProfile {
    pub average: Decimal,
    pub max: Decimal,
    pub count: usize,
}

impl AmountProfile {
    /// Profile of successful `currency` records; `None` without history
    pub fn of(records: &[HistoryRecord], currency: &str) -> Option<Self> {
        let amounts: Vec<Decimal> = records
            .iter()
            .filter(|r| r.status == TransactionStatus::Success)
            .filter(|r| r.currency.eq_ignore_ascii_case(currency))
            .map(|r| r.amount)
            .collect();

        let max = amounts.iter().copied().max()?;
        let total: Decimal = amounts.iter().copied().sum();

        Some(Self {
            average: total / Decimal::from(amounts.len()),
            max,
            count: amounts.len(),
        })
    }
}

/// Flags amounts far above the customer's usual spend
pub struct AmountEvaluator {
    config: AmountConfig,
    reference_currency: String,
    history_timeout: Duration,
    history: Arc<dyn TransactionHistory>,
    converter: Arc<dyn CurrencyConverter>,
}

impl std::fmt::Debug for AmountEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmountEvaluator")
            .field("config", &self.config)
            .finish()
    }
}

impl AmountEvaluator {
    /// Create new amount evaluator
    pub fn new(
        config: &EngineConfig,
        history: Arc<dyn TransactionHistory>,
        converter: Arc<dyn CurrencyConverter>,
    ) -> Self {
        Self {
            config: config.fraud.amount.clone(),
            reference_currency: config.reference_currency.clone(),
            history_timeout: config.timeouts.history_query(),
            history,
            converter,
        }
    }

    async fn profile(&self, key: HistoryKey, snapshot: &TransactionSnapshot) -> Result<Option<AmountProfile>> {
        let query = HistoryQuery::new(key)
            .until(snapshot.created_at)
            .excluding(snapshot.id);
        let records = query_within(self.history.as_ref(), &query, self.history_timeout, self.name()).await?;
        Ok(AmountProfile::of(&records, &snapshot.currency))
    }
}

#[async_trait]
impl SignalEvaluator for AmountEvaluator {
    fn name(&self) -> &'static str {
        names::AMOUNT
    }

    async fn evaluate(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> Result<SignalResult> {
        let amount = snapshot.amount;
        let mut signal = Contributions::new();

        let normalized = normalize_amount(
            self.converter.as_ref(),
            amount,
            &snapshot.currency,
            &self.reference_currency,
        );
        if let Some(caveat) = normalized.caveat {
            signal.note(caveat);
        }

        let thousand = Decimal::from(1000);
        if normalized.amount > self.config.round_amount_floor && (amount % thousand).is_zero() {
            signal.add(
                self.config.round_amount,
                format!("round amount: {} {}", amount, snapshot.currency),
            );
        }

        let customer_profile = async {
            match customer_id(snapshot, context) {
                Some(id) => self.profile(HistoryKey::Customer(id), snapshot).await,
                None => Ok(None),
            }
        };
        let merchant_profile = self.profile(HistoryKey::Merchant(snapshot.merchant_id), snapshot);
        let (customer_profile, merchant_profile) = tokio::join!(customer_profile, merchant_profile);

        if let Some(profile) = customer_profile? {
            if amount > profile.average * self.config.customer_average_multiple {
                signal.add(
                    self.config.above_customer_average,
                    format!(
                        "amount {} exceeds {}x customer average {}",
                        amount,
                        self.config.customer_average_multiple,
                        profile.average.round_dp(2)
                    ),
                );
            }
            if amount > profile.max * self.config.customer_max_multiple {
                signal.add(
                    self.config.above_customer_max,
                    format!(
                        "amount {} exceeds {}x customer maximum {}",
                        amount, self.config.customer_max_multiple, profile.max
                    ),
                );
            }
        }

        if let Some(profile) = merchant_profile? {
            if amount > profile.average * self.config.merchant_average_multiple {
                signal.add(
                    self.config.above_merchant_average,
                    format!(
                        "amount {} exceeds {}x merchant average {}",
                        amount,
                        self.config.merchant_average_multiple,
                        profile.average.round_dp(2)
                    ),
                );
            }
        }

        Ok(signal.finish(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal_macros::dec;
    use scoring_core::memory::{InMemoryHistory, StaticRateConverter};
    use scoring_core::Merchant;
    use uuid::Uuid;

    fn evaluator(history: Arc<InMemoryHistory>) -> AmountEvaluator {
        AmountEvaluator::new(
            &EngineConfig::default(),
            history,
            Arc::new(StaticRateConverter::new("USD")),
        )
    }

    fn settled(merchant: Uuid, customer: Option<Uuid>, amount: Decimal, status: TransactionStatus) -> HistoryRecord {
        let mut tx = TransactionSnapshot::new(merchant, amount, "USD")
            .with_created_at(Utc::now() - ChronoDuration::days(3));
        tx.customer_id = customer;
        tx.status = status;
        HistoryRecord::from(&tx)
    }

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(Merchant::new("Shop"))
    }

    #[test]
    fn test_profile_only_counts_successful_same_currency() {
        let merchant = Uuid::new_v4();
        let mut records = vec![
            settled(merchant, None, dec!(100), TransactionStatus::Success),
            settled(merchant, None, dec!(300), TransactionStatus::Success),
            settled(merchant, None, dec!(9000), TransactionStatus::Failed),
        ];
        let mut eur = settled(merchant, None, dec!(5000), TransactionStatus::Success);
        eur.currency = "EUR".to_string();
        records.push(eur);

        let profile = AmountProfile::of(&records, "USD").unwrap();
        assert_eq!(profile.average, dec!(200));
        assert_eq!(profile.max, dec!(300));
        assert_eq!(profile.count, 2);
        assert!(AmountProfile::of(&records, "GBP").is_none());
    }

    #[tokio::test]
    async fn test_no_history_only_round_amount() {
        let history = Arc::new(InMemoryHistory::new());
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(3000), "USD")
            .with_customer(Uuid::new_v4());

        let result = evaluator(history).evaluate(&tx, &ctx()).await.unwrap();
        assert!((result.contribution - 0.2).abs() < 1e-9);
        assert_eq!(result.reasons, vec!["round amount: 3000 USD".to_string()]);
    }

    #[tokio::test]
    async fn test_exactly_one_thousand_is_not_round_risk() {
        let history = Arc::new(InMemoryHistory::new());
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(1000), "USD");

        let result = evaluator(history).evaluate(&tx, &ctx()).await.unwrap();
        assert_eq!(result.contribution, 0.0);
    }

    #[tokio::test]
    async fn test_anomalies_against_history() {
        let history = Arc::new(InMemoryHistory::new());
        let merchant = Uuid::new_v4();
        let customer = Uuid::new_v4();
        history.insert(settled(merchant, Some(customer), dec!(50), TransactionStatus::Success));
        history.insert(settled(merchant, Some(customer), dec!(150), TransactionStatus::Success));
        history.insert(settled(merchant, None, dec!(40), TransactionStatus::Success));

        // customer avg 100 / max 150, merchant avg 80
        let tx = TransactionSnapshot::new(merchant, dec!(999), "USD").with_customer(customer);
        let result = evaluator(history).evaluate(&tx, &ctx()).await.unwrap();

        // 0.5 + 0.3 + 0.3
        assert_eq!(result.contribution, 1.0);
        assert_eq!(result.reasons.len(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_currency_is_a_caveat() {
        let history = Arc::new(InMemoryHistory::new());
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(5000), "XYZ");

        let result = evaluator(history).evaluate(&tx, &ctx()).await.unwrap();
        // raw amount used: 5000 > 1000 and round
        assert!((result.contribution - 0.2).abs() < 1e-9);
        assert!(result.reasons[0].contains("raw amount used"));
    }
}
