//! AML period report
//!
//! Summarizes a merchant's activity over a period, re-screens every
//! transaction and flags possible structuring (several small payments
//! from one payer adding up to a reportable amount within a day).

use crate::error::{ComplianceError, Result};
use crate::screening::ComplianceScreener;
use crate::types::{FlaggedTransaction, SuspiciousPattern};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use scoring_core::{
    normalize_amount, query_within, CurrencyConverter, EngineConfig, EntityDirectory,
    EvaluationContext, HistoryKey, HistoryQuery, HistoryRecord, Merchant, TransactionHistory,
    TransactionSnapshot,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Minimum payments from one payer to consider structuring
pub const STRUCTURING_MIN_COUNT: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrencyStats {
    pub currency: String,
    pub transaction_count: u64,
    pub total_volume: Decimal,
    pub average_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmlReport {
    pub report_id: Uuid,
    pub merchant_id: Uuid,
    pub merchant_name: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_transactions: u64,
    pub currencies: BTreeMap<String, CurrencyStats>,
    pub high_risk_transactions: Vec<FlaggedTransaction>,
    pub suspicious_patterns: Vec<SuspiciousPattern>,
    pub generated_at: DateTime<Utc>,
}

impl AmlReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ComplianceError::Core(scoring_core::Error::from(e)))
    }
}

/// Structuring detection thresholds (reference currency)
#[derive(Debug, Clone, PartialEq)]
pub struct StructuringRule {
    pub min_count: usize,
    pub window: ChronoDuration,
    pub total_above: Decimal,
    pub each_below: Decimal,
}

impl Default for StructuringRule {
    fn default() -> Self {
        Self {
            min_count: STRUCTURING_MIN_COUNT,
            window: ChronoDuration::hours(24),
            total_above: Decimal::new(10_000, 0),
            each_below: Decimal::new(5_000, 0),
        }
    }
}

/// AML report generator
pub struct AmlReportGenerator {
    screener: Arc<ComplianceScreener>,
    history: Arc<dyn TransactionHistory>,
    directory: Arc<dyn EntityDirectory>,
    converter: Arc<dyn CurrencyConverter>,
    reference_currency: String,
    flag_threshold: f64,
    history_timeout: Duration,
    rule: StructuringRule,
}

impl std::fmt::Debug for AmlReportGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmlReportGenerator")
            .field("flag_threshold", &self.flag_threshold)
            .field("rule", &self.rule)
            .finish()
    }
}

impl AmlReportGenerator {
    pub fn new(
        config: &EngineConfig,
        screener: Arc<ComplianceScreener>,
        history: Arc<dyn TransactionHistory>,
        directory: Arc<dyn EntityDirectory>,
        converter: Arc<dyn CurrencyConverter>,
    ) -> Self {
        Self {
            screener,
            history,
            directory,
            converter,
            reference_currency: config.reference_currency.clone(),
            flag_threshold: config.compliance.thresholds.high,
            // A report scans a whole period, so it gets the request budget
            history_timeout: config.timeouts.total_budget(),
            rule: StructuringRule::default(),
        }
    }

    pub fn with_rule(mut self, rule: StructuringRule) -> Self {
        self.rule = rule;
        self
    }

    /// Generate the report for `merchant`; the period defaults to the last 30 days
    pub async fn generate(
        &self,
        merchant: &Merchant,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<AmlReport> {
        let end = end.unwrap_or_else(Utc::now);
        let start = start.unwrap_or(end - ChronoDuration::days(30));
        if end <= start {
            return Err(ComplianceError::InvalidDateRange(
                "End date must be after start date".to_string(),
            ));
        }

        // `until` is exclusive; nudge it so the end instant is included
        let query = HistoryQuery::new(HistoryKey::Merchant(merchant.id))
            .since(start)
            .until(end + ChronoDuration::nanoseconds(1));
        let records = query_within(
            self.history.as_ref(),
            &query,
            self.history_timeout,
            "aml_report",
        )
        .await?;

        let mut high_risk_transactions = Vec::new();
        for record in &records {
            let snapshot = snapshot_of(record);
            let context = self.context_for(merchant, record).await;
            let assessment = self.screener.evaluate(&snapshot, &context).await;

            if assessment.risk > self.flag_threshold {
                high_risk_transactions.push(FlaggedTransaction {
                    transaction_id: record.transaction_id,
                    amount: record.amount,
                    currency: record.currency.clone(),
                    created_at: record.created_at,
                    risk: assessment.risk,
                    reasons: assessment.reasons,
                });
            }
        }

        let suspicious_patterns = self.identify_suspicious_patterns(&records);

        info!(
            "AML report for merchant {}: {} transactions, {} high risk, {} patterns",
            merchant.id,
            records.len(),
            high_risk_transactions.len(),
            suspicious_patterns.len()
        );

        Ok(AmlReport {
            report_id: Uuid::new_v4(),
            merchant_id: merchant.id,
            merchant_name: merchant.name.clone(),
            period_start: start,
            period_end: end,
            total_transactions: records.len() as u64,
            currencies: currency_stats(&records),
            high_risk_transactions,
            suspicious_patterns,
            generated_at: Utc::now(),
        })
    }

    async fn context_for(&self, merchant: &Merchant, record: &HistoryRecord) -> EvaluationContext {
        let mut context = EvaluationContext::new(merchant.clone());

        let Some(customer_id) = record.customer_id else {
            return context;
        };

        match self.directory.get_customer(customer_id).await {
            Ok(customer) => context.customer = customer,
            Err(e) => warn!("Customer lookup failed for {}: {}", customer_id, e),
        }
        context
    }

    /// Group by payer email and look for structuring
    pub fn identify_suspicious_patterns(&self, records: &[HistoryRecord]) -> Vec<SuspiciousPattern> {
        let mut by_email: BTreeMap<&str, Vec<&HistoryRecord>> = BTreeMap::new();
        for record in records {
            if let Some(email) = record.email.as_deref() {
                by_email.entry(email).or_default().push(record);
            }
        }

        let mut patterns = Vec::new();
        for (email, mut txns) in by_email {
            if txns.len() < self.rule.min_count {
                continue;
            }

            txns.sort_by_key(|t| t.created_at);
            let (Some(first), Some(last)) = (txns.first(), txns.last()) else {
                continue;
            };
            let span = last.created_at - first.created_at;
            if span > self.rule.window {
                continue;
            }

            let amounts: Vec<Decimal> = txns
                .iter()
                .map(|t| {
                    normalize_amount(
                        self.converter.as_ref(),
                        t.amount,
                        &t.currency,
                        &self.reference_currency,
                    )
                    .amount
                })
                .collect();
            let total: Decimal = amounts.iter().copied().sum();

            if total > self.rule.total_above && amounts.iter().all(|a| *a < self.rule.each_below) {
                patterns.push(SuspiciousPattern::PossibleStructuring {
                    email: email.to_string(),
                    transaction_count: txns.len(),
                    total_value: total,
                    time_span_hours: span.num_seconds() as f64 / 3600.0,
                });
            }
        }

        patterns
    }
}

fn snapshot_of(record: &HistoryRecord) -> TransactionSnapshot {
    TransactionSnapshot {
        id: record.transaction_id,
        reference: record.transaction_id.to_string(),
        amount: record.amount,
        currency: record.currency.clone(),
        instrument: record.instrument.clone(),
        payment_provider: None,
        customer_id: record.customer_id,
        merchant_id: record.merchant_id,
        email: record.email.clone(),
        status: record.status,
        created_at: record.created_at,
        metadata: record.metadata.clone(),
    }
}

fn currency_stats(records: &[HistoryRecord]) -> BTreeMap<String, CurrencyStats> {
    let mut stats: BTreeMap<String, CurrencyStats> = BTreeMap::new();

    for record in records {
        let entry = stats
            .entry(record.currency.clone())
            .or_insert_with(|| CurrencyStats {
                currency: record.currency.clone(),
                transaction_count: 0,
                total_volume: Decimal::ZERO,
                average_amount: Decimal::ZERO,
            });
        entry.transaction_count += 1;
        entry.total_volume += record.amount;
    }

    for entry in stats.values_mut() {
        entry.average_amount = entry.total_volume / Decimal::from(entry.transaction_count);
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanctions::{ReferenceListCache, StaticReferenceLists};
    use rust_decimal_macros::dec;
    use scoring_core::memory::{InMemoryDirectory, InMemoryHistory, StaticRateConverter};

    struct Fixture {
        history: Arc<InMemoryHistory>,
        generator: AmlReportGenerator,
        merchant: Merchant,
    }

    fn fixture() -> Fixture {
        let config = EngineConfig::default();
        let history = Arc::new(InMemoryHistory::new());
        let converter: Arc<dyn CurrencyConverter> = Arc::new(StaticRateConverter::new("USD"));
        let lists = Arc::new(ReferenceListCache::new(
            Arc::new(StaticReferenceLists::default()),
            Duration::from_secs(3600),
        ));
        let screener = Arc::new(
            ComplianceScreener::new(&config, history.clone(), converter.clone(), lists).unwrap(),
        );
        let generator = AmlReportGenerator::new(
            &config,
            screener,
            history.clone(),
            Arc::new(InMemoryDirectory::new()),
            converter,
        );

        Fixture {
            history,
            generator,
            merchant: Merchant::new("Report Shop"),
        }
    }

    fn record(merchant: &Merchant, email: &str, amount: Decimal, hours_ago: i64) -> HistoryRecord {
        let snapshot = TransactionSnapshot::new(merchant.id, amount, "USD")
            .with_email(email)
            .with_created_at(Utc::now() - ChronoDuration::hours(hours_ago));
        HistoryRecord::from(&snapshot)
    }

    #[tokio::test]
    async fn test_detects_structuring() {
        let f = fixture();
        for hours in [1, 3, 5] {
            f.history
                .insert(record(&f.merchant, "split@example.com", dec!(4000), hours));
        }

        let report = f.generator.generate(&f.merchant, None, None).await.unwrap();
        assert_eq!(report.total_transactions, 3);
        assert_eq!(report.suspicious_patterns.len(), 1);

        let SuspiciousPattern::PossibleStructuring {
            email,
            transaction_count,
            total_value,
            time_span_hours,
        } = &report.suspicious_patterns[0];
        assert_eq!(email, "split@example.com");
        assert_eq!(*transaction_count, 3);
        assert_eq!(*total_value, dec!(12000));
        assert!((time_span_hours - 4.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_no_structuring_when_spread_out_or_large() {
        let f = fixture();
        for hours in [1, 20, 40] {
            f.history
                .insert(record(&f.merchant, "slow@example.com", dec!(4000), hours));
        }
        for hours in [1, 2, 3] {
            f.history
                .insert(record(&f.merchant, "big@example.com", dec!(6000), hours));
        }

        let report = f.generator.generate(&f.merchant, None, None).await.unwrap();
        assert!(report.suspicious_patterns.is_empty());
        assert_eq!(report.currencies["USD"].transaction_count, 6);
        assert_eq!(report.currencies["USD"].total_volume, dec!(30000));
        assert_eq!(report.currencies["USD"].average_amount, dec!(5000));
    }

    #[tokio::test]
    async fn test_high_risk_transactions_are_flagged() {
        let f = fixture();
        let mut flagged = record(&f.merchant, "x@example.com", dec!(60000), 2);
        flagged.metadata.customer_name = Some("Global Terror Org".to_string());
        flagged.metadata.extra.insert(
            "note".to_string(),
            serde_json::Value::String("card 4111 1111 1111 1111".to_string()),
        );
        f.history.insert(flagged.clone());
        f.history
            .insert(record(&f.merchant, "ok@example.com", dec!(20), 2));

        let report = f.generator.generate(&f.merchant, None, None).await.unwrap();
        assert_eq!(report.high_risk_transactions.len(), 1);
        assert_eq!(
            report.high_risk_transactions[0].transaction_id,
            flagged.transaction_id
        );
        assert!(report.suspicious_patterns.is_empty());
        assert!(report.to_json().unwrap().contains("\"high_risk_transactions\""));
    }

    #[tokio::test]
    async fn test_rejects_inverted_period() {
        let f = fixture();
        let now = Utc::now();
        let err = f
            .generator
            .generate(&f.merchant, Some(now), Some(now - ChronoDuration::days(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ComplianceError::InvalidDateRange(_)));
    }
}
