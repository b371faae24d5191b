//! Velocity controls for transaction monitoring

use super::{customer_id, names, recent_history, SignalEvaluator};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use scoring_core::config::VelocityConfig;
use scoring_core::{
    normalize_amount, Contributions, CurrencyConverter, EngineConfig, EvaluationContext,
    HistoryKey, HistoryRecord, Result, SignalResult, TransactionHistory, TransactionSnapshot,
};
use std::sync::Arc;
use std::time::Duration;

/// Velocity statistics for a customer, current transaction included
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityStats {
    /// Transactions in the last hour
    pub hourly_count: usize,
    /// Transactions in the last 24 hours
    pub daily_count: usize,
    /// Same-currency volume in the last 24 hours
    pub daily_amount: Decimal,
}

impl VelocityStats {
    fn collect(snapshot: &TransactionSnapshot, records: &[HistoryRecord]) -> Self {
        let hour_start = snapshot.created_at - ChronoDuration::hours(1);

        let hourly_count = 1 + records
            .iter()
            .filter(|r| r.created_at >= hour_start)
            .count();

        let daily_amount = snapshot.amount
            + records
                .iter()
                .filter(|r| r.currency.eq_ignore_ascii_case(&snapshot.currency))
                .map(|r| r.amount)
                .sum::<Decimal>();

        Self {
            hourly_count,
            daily_count: 1 + records.len(),
            daily_amount,
        }
    }
}

/// Velocity evaluator monitors per-customer transaction rate and volume
pub struct VelocityEvaluator {
    config: VelocityConfig,
    reference_currency: String,
    history_timeout: Duration,
    history: Arc<dyn TransactionHistory>,
    converter: Arc<dyn CurrencyConverter>,
}

impl std::fmt::Debug for VelocityEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VelocityEvaluator")
            .field("config", &self.config)
            .finish()
    }
}

impl VelocityEvaluator {
    /// Create new velocity evaluator
    pub fn new(
        config: &EngineConfig,
        history: Arc<dyn TransactionHistory>,
        converter: Arc<dyn CurrencyConverter>,
    ) -> Self {
        Self {
            config: config.fraud.velocity.clone(),
            reference_currency: config.reference_currency.clone(),
            history_timeout: config.timeouts.history_query(),
            history,
            converter,
        }
    }
}

#[async_trait]
impl SignalEvaluator for VelocityEvaluator {
    fn name(&self) -> &'static str {
        names::VELOCITY
    }

    async fn evaluate(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> Result<SignalResult> {
        // Guests cannot be tracked
        let Some(customer) = customer_id(snapshot, context) else {
            return Ok(SignalResult::none(self.name()));
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
        let stats = VelocityStats::collect(snapshot, &records);

        let mut signal = Contributions::new();

        if stats.hourly_count >= self.config.max_per_hour {
            signal.add(
                self.config.step,
                format!("high velocity: {} tx/hour", stats.hourly_count),
            );
        }

        if stats.daily_count >= self.config.max_per_day {
            signal.add(
                self.config.step,
                format!("high velocity: {} tx/day", stats.daily_count),
            );
        }

        let daily = normalize_amount(
            self.converter.as_ref(),
            stats.daily_amount,
            &snapshot.currency,
            &self.reference_currency,
        );
        if let Some(caveat) = daily.caveat {
            signal.note(caveat);
        }
        if daily.amount >= self.config.max_daily_amount {
            signal.add(
                self.config.step,
                format!(
                    "high daily volume: {} {} in 24h",
                    daily.amount.round_dp(2),
                    self.reference_currency
                ),
            );
        }

        Ok(signal.finish(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use scoring_core::memory::{InMemoryHistory, StaticRateConverter};
    use scoring_core::Merchant;
    use uuid::Uuid;

    fn evaluator(history: Arc<InMemoryHistory>) -> VelocityEvaluator {
        VelocityEvaluator::new(
            &EngineConfig::default(),
            history,
            Arc::new(StaticRateConverter::new("USD").with_rate("EUR", dec!(1.10))),
        )
    }

    fn past(customer: Uuid, amount: Decimal, currency: &str, minutes_ago: i64) -> HistoryRecord {
        let tx = TransactionSnapshot::new(Uuid::new_v4(), amount, currency)
            .with_customer(customer)
            .with_created_at(Utc::now() - ChronoDuration::minutes(minutes_ago));
        HistoryRecord::from(&tx)
    }

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(Merchant::new("Shop"))
    }

    #[tokio::test]
    async fn test_guest_is_not_evaluated() {
        let history = Arc::new(InMemoryHistory::new());
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(50), "USD");

        let result = evaluator(history.clone()).evaluate(&tx, &ctx()).await.unwrap();
        assert_eq!(result.contribution, 0.0);
        assert!(result.reasons.is_empty());
        assert_eq!(history.query_count(), 0);
    }

    #[tokio::test]
    async fn test_hourly_velocity() {
        let history = Arc::new(InMemoryHistory::new());
        let customer = Uuid::new_v4();
        history.extend((1..=12).map(|m| past(customer, dec!(50), "USD", m * 4)));

        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(50), "USD").with_customer(customer);
        let result = evaluator(history).evaluate(&tx, &ctx()).await.unwrap();

        assert_eq!(result.contribution, 0.5);
        assert_eq!(result.reasons, vec!["high velocity: 13 tx/hour".to_string()]);
    }

    #[tokio::test]
    async fn test_all_three_checks_clamp_to_one() {
        let history = Arc::new(InMemoryHistory::new());
        let customer = Uuid::new_v4();
        history.extend((1..=35).map(|m| past(customer, dec!(400), "USD", m)));

        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(400), "USD").with_customer(customer);
        let result = evaluator(history).evaluate(&tx, &ctx()).await.unwrap();

        assert_eq!(result.contribution, 1.0);
        assert_eq!(result.reasons.len(), 3);
        assert!(result.reasons[2].starts_with("high daily volume: 14400"));
    }

    #[tokio::test]
    async fn test_daily_amount_only_counts_same_currency() {
        let history = Arc::new(InMemoryHistory::new());
        let customer = Uuid::new_v4();
        history.insert(past(customer, dec!(9000), "GBP", 120));
        history.insert(past(customer, dec!(4000), "EUR", 60));

        // 4,000 + 5,000 EUR = 9,900 USD, below 10,000
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(5000), "EUR").with_customer(customer);
        let result = evaluator(history.clone()).evaluate(&tx, &ctx()).await.unwrap();
        assert_eq!(result.contribution, 0.0);

        history.insert(past(customer, dec!(200), "EUR", 30));
        let result = evaluator(history).evaluate(&tx, &ctx()).await.unwrap();
        assert_eq!(result.contribution, 0.5);
    }

    #[tokio::test]
    async fn test_old_transactions_are_ignored() {
        let history = Arc::new(InMemoryHistory::new());
        let customer = Uuid::new_v4();
        history.extend((0..40).map(|i| past(customer, dec!(10), "USD", 25 * 60 + i)));

        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(10), "USD").with_customer(customer);
        let result = evaluator(history).evaluate(&tx, &ctx()).await.unwrap();
        assert_eq!(result.contribution, 0.0);
    }

    #[tokio::test]
    async fn test_slow_history_times_out() {
        let history = Arc::new(InMemoryHistory::new());
        history.set_latency(Some(Duration::from_millis(500)));
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(10), "USD")
            .with_customer(Uuid::new_v4());

        let err = evaluator(history).evaluate(&tx, &ctx()).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
