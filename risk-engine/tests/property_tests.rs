//! Property-based tests for scoring invariants
//!
//! - Evaluator contributions stay within [0, 1]
//! - Fraud scores stay within [0, 100] and never drop when a signal rises
//! - Levels are monotone in the score
//! - A sanctions hit always blocks

use chrono::{Duration as ChronoDuration, Utc};
use compliance_service::StaticReferenceLists;
use proptest::prelude::*;
use risk_engine::evaluators::{
    names, AmountEvaluator, EmailEvaluator, InstrumentEvaluator, VelocityEvaluator,
};
use risk_engine::{
    Collaborators, DecisionPolicy, EvaluateOptions, FraudAggregator, FraudScore, RiskEngine,
    SignalEvaluator,
};
use rust_decimal::Decimal;
use scoring_core::memory::{
    InMemoryDirectory, InMemoryHistory, InMemoryTransactionStore, PrefixGeoResolver,
    StaticRateConverter,
};
use scoring_core::{
    Action, EngineConfig, EvaluationContext, HistoryRecord, Merchant, PaymentInstrument,
    RiskLevel, SignalResult, StoredTransaction, TransactionSnapshot,
};
use std::sync::Arc;
use uuid::Uuid;

const EVALUATORS: [&str; 7] = [
    names::VELOCITY,
    names::LOCATION,
    names::DEVICE,
    names::INSTRUMENT,
    names::AMOUNT,
    names::EMAIL,
    names::MODEL,
];

/// Strategy for generating amounts, cents up to 100k
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for generating currencies, including one without a rate
fn currency_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("USD"), Just("EUR"), Just("XOF")]
}

/// Strategy for generating payer emails
fn email_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{3,12}@example\\.com",
        "[a-z]{2,6}[0-9]{0,6}@mailinator\\.com",
        "[a-z0-9]{10,16}@yopmail\\.com",
    ]
}

/// Strategy for generating the past of one customer
fn history_strategy() -> impl Strategy<Value = Vec<(Decimal, i64, String)>> {
    prop::collection::vec(
        (amount_strategy(), 1i64..(24 * 60), "[0-9]{6}"),
        0..40,
    )
}

fn converter() -> Arc<StaticRateConverter> {
    Arc::new(StaticRateConverter::new("USD").with_rate("EUR", Decimal::new(110, 2)))
}

fn in_unit_range(result: &SignalResult) -> bool {
    (0.0..=1.0).contains(&result.contribution)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: every evaluator contributes within [0, 1]
    #[test]
    fn prop_contributions_bounded(
        amount in amount_strategy(),
        currency in currency_strategy(),
        email in email_strategy(),
        past in history_strategy(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = EngineConfig::default();
            let history = Arc::new(InMemoryHistory::new());
            let merchant = Merchant::new("Shop");
            let customer = Uuid::new_v4();
            let now = Utc::now();

            history.extend(past.iter().map(|(amount, minutes_ago, card)| {
                let tx = TransactionSnapshot::new(merchant.id, *amount, currency)
                    .with_customer(customer)
                    .with_instrument(PaymentInstrument::Card {
                        bin: card.clone(),
                        last4: card[2..].to_string(),
                    })
                    .with_created_at(now - ChronoDuration::minutes(*minutes_ago));
                HistoryRecord::from(&tx)
            }));

            let tx = TransactionSnapshot::new(merchant.id, amount, currency)
                .with_customer(customer)
                .with_email(&email)
                .with_instrument(PaymentInstrument::Card {
                    bin: "411111".to_string(),
                    last4: "1111".to_string(),
                })
                .with_created_at(now);
            let ctx = EvaluationContext::new(merchant);

            let evaluators: Vec<Box<dyn SignalEvaluator>> = vec![
                Box::new(VelocityEvaluator::new(&config, history.clone(), converter())),
                Box::new(InstrumentEvaluator::new(&config, history.clone())),
                Box::new(AmountEvaluator::new(&config, history.clone(), converter())),
                Box::new(EmailEvaluator::new(&config).unwrap()),
            ];

            for evaluator in &evaluators {
                let result = evaluator.evaluate(&tx, &ctx).await.unwrap();
                prop_assert!(
                    in_unit_range(&result),
                    "{} contributed {}",
                    evaluator.name(),
                    result.contribution
                );
            }

            Ok(())
        })?;
    }

    /// Property: aggregated fraud score stays within [0, 100]
    #[test]
    fn prop_score_bounded(contributions in prop::collection::vec(-1.0f64..2.0, 7)) {
        let aggregator = FraudAggregator::new(&EngineConfig::default());
        let signals: Vec<SignalResult> = EVALUATORS
            .iter()
            .zip(&contributions)
            .map(|(name, c)| SignalResult::new(name, *c, vec![]))
            .collect();

        let score = aggregator.score(&signals).value();
        prop_assert!((0.0..=FraudScore::MAX).contains(&score));
    }

    /// Property: raising one contribution never lowers the score
    #[test]
    fn prop_score_monotone(
        contributions in prop::collection::vec(0.0f64..=1.0, 7),
        index in 0usize..7,
        delta in 0.0f64..=1.0,
    ) {
        let aggregator = FraudAggregator::new(&EngineConfig::default());
        let signals = |values: &[f64]| -> Vec<SignalResult> {
            EVALUATORS
                .iter()
                .zip(values)
                .map(|(name, c)| SignalResult::new(name, *c, vec![]))
                .collect()
        };

        let mut raised = contributions.clone();
        raised[index] = (raised[index] + delta).min(1.0);

        let before = aggregator.score(&signals(&contributions));
        let after = aggregator.score(&signals(&raised));
        prop_assert!(after.value() >= before.value());
        prop_assert!(aggregator.level(after) >= aggregator.level(before));
    }

    /// Property: the blended score stays within [0, 1]
    #[test]
    fn prop_blend_bounded(fraud in -50.0f64..200.0, risk in 0.0f64..=1.0) {
        let policy = DecisionPolicy::new(&EngineConfig::default());
        let blended = policy.blended(fraud, risk);
        prop_assert!((0.0..=1.0).contains(&blended));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: a sanctioned payer name always blocks the transaction
    #[test]
    fn prop_sanctions_hit_blocks(
        amount in amount_strategy(),
        name in prop_oneof![
            Just("John Smith"),
            Just("Global Terror Org"),
            Just("Sanctioned Bank Ltd"),
        ],
        upper in any::<bool>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let merchant = Merchant::new("Shop");
            let directory = Arc::new(InMemoryDirectory::new());
            directory.add_merchant(merchant.clone());
            let store = Arc::new(InMemoryTransactionStore::new());

            let engine = RiskEngine::new(
                EngineConfig::default(),
                Collaborators {
                    history: Arc::new(InMemoryHistory::new()),
                    converter: converter(),
                    geo: Arc::new(PrefixGeoResolver::new()),
                    directory,
                    store: store.clone(),
                    reference_lists: Arc::new(StaticReferenceLists::default()),
                },
            )
            .unwrap();

            let mut tx = TransactionSnapshot::new(merchant.id, amount, "USD").with_provider("stripe");
            tx.metadata.customer_name = Some(if upper {
                name.to_uppercase()
            } else {
                name.to_string()
            });
            store.insert(StoredTransaction::new(tx.clone()));

            let decision = engine
                .evaluate_transaction(&tx, &EvaluationContext::new(merchant), &EvaluateOptions::default())
                .await
                .unwrap();

            prop_assert!(decision.requires(Action::BlockTransaction));
            prop_assert!(decision.requires(Action::FileReport));
            prop_assert_eq!(decision.level, RiskLevel::Blocked);
            prop_assert!(decision.compliance.as_ref().is_some_and(|c| !c.aml_cleared));

            Ok(())
        })?;
    }
}
