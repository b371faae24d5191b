//! Email reputation

use super::{names, SignalEvaluator};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use regex::Regex;
use scoring_core::config::EmailConfig;
use scoring_core::{
    Contributions, EngineConfig, Error, EvaluationContext, Result, SignalResult,
    TransactionSnapshot,
};

/// Email reputation: disposable domains, random local parts, new accounts
pub struct EmailEvaluator {
    config: EmailConfig,
    generated: Vec<Regex>,
}

impl std::fmt::Debug for EmailEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailEvaluator")
            .field("config", &self.config)
            .finish()
    }
}

impl EmailEvaluator {
    /// Create new email evaluator; fails on an invalid pattern
    pub fn new(config: &EngineConfig) -> Result<Self> {
        // Long alphanumeric local part, or a 4+ digit suffix
        let generated = [r"^[a-z0-9]{10,}@", r"^[a-z0-9]+\d{4,}@"]
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::Configuration(format!("email pattern: {}", e))))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config: config.fraud.email.clone(),
            generated,
        })
    }

    fn is_disposable(&self, domain: &str) -> bool {
        self.config
            .disposable_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain))
    }
}

#[async_trait]
impl SignalEvaluator for EmailEvaluator {
    fn name(&self) -> &'static str {
        names::EMAIL
    }

    async fn evaluate(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> Result<SignalResult> {
        let email = snapshot
            .normalized_email()
            .or_else(|| context.customer.as_ref().map(|c| c.email.trim().to_lowercase()))
            .filter(|e| !e.is_empty());
        let Some(email) = email else {
            return Ok(SignalResult::none(self.name()));
        };

        let mut signal = Contributions::new();

        if let Some((_, domain)) = email.rsplit_once('@') {
            if self.is_disposable(domain) {
                signal.add(
                    self.config.disposable,
                    format!("disposable email domain: {}", domain),
                );
            }
        }

        if let Some(customer) = &context.customer {
            let age = snapshot.created_at - customer.created_at;
            if age < ChronoDuration::hours(1) {
                signal.add(
                    self.config.account_under_hour,
                    "account created less than 1 hour before transaction",
                );
            } else if age < ChronoDuration::hours(24) {
                signal.add(
                    self.config.account_under_day,
                    "account created less than 24 hours before transaction",
                );
            }
        }

        if self.generated.iter().any(|re| re.is_match(&email)) {
            signal.add(
                self.config.generated_local_part,
                "email address looks auto-generated",
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
    use scoring_core::{Customer, Merchant};
    use uuid::Uuid;

    fn evaluator() -> EmailEvaluator {
        EmailEvaluator::new(&EngineConfig::default()).unwrap()
    }

    fn tx(email: &str) -> TransactionSnapshot {
        TransactionSnapshot::new(Uuid::new_v4(), dec!(200), "USD").with_email(email)
    }

    fn customer_aged(email: &str, age: ChronoDuration) -> Customer {
        let mut customer = Customer::new(email);
        customer.created_at = Utc::now() - age;
        customer
    }

    #[tokio::test]
    async fn test_disposable_and_brand_new_account() {
        let customer = customer_aged("test@mailinator.com", ChronoDuration::minutes(10));
        let ctx = EvaluationContext::new(Merchant::new("Shop")).with_customer(customer);

        let result = evaluator().evaluate(&tx("test@mailinator.com"), &ctx).await.unwrap();
        assert_eq!(result.contribution, 1.0);
        assert!(result.reasons.iter().any(|r| r.contains("disposable email")));
        assert!(result
            .reasons
            .iter()
            .any(|r| r == "account created less than 1 hour before transaction"));
    }

    #[tokio::test]
    async fn test_account_age_bounds_are_exclusive() {
        let customer = customer_aged("jane@example.com", ChronoDuration::hours(5));
        let ctx = EvaluationContext::new(Merchant::new("Shop")).with_customer(customer);

        let result = evaluator().evaluate(&tx("jane@example.com"), &ctx).await.unwrap();
        assert!((result.contribution - 0.2).abs() < 1e-9);

        let customer = customer_aged("jane@example.com", ChronoDuration::days(30));
        let ctx = EvaluationContext::new(Merchant::new("Shop")).with_customer(customer);
        let result = evaluator().evaluate(&tx("jane@example.com"), &ctx).await.unwrap();
        assert_eq!(result.contribution, 0.0);
    }

    #[tokio::test]
    async fn test_generated_local_parts() {
        let ctx = EvaluationContext::new(Merchant::new("Shop"));
        for email in ["xk29dj3k2lq9@example.com", "buyer20231@example.com"] {
            let result = evaluator().evaluate(&tx(email), &ctx).await.unwrap();
            assert!((result.contribution - 0.3).abs() < 1e-9, "{}", email);
        }

        let result = evaluator().evaluate(&tx("ann.lee@example.com"), &ctx).await.unwrap();
        assert_eq!(result.contribution, 0.0);
    }

    #[tokio::test]
    async fn test_missing_email() {
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(200), "USD");
        let ctx = EvaluationContext::new(Merchant::new("Shop"));
        let result = evaluator().evaluate(&tx, &ctx).await.unwrap();
        assert_eq!(result.contribution, 0.0);
    }
}
