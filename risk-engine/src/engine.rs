//! Risk & compliance scoring engine
//!
//! `evaluate_transaction` runs the fraud evaluators and the compliance
//! checks concurrently against one read-only snapshot, folds both into a
//! [`RiskDecision`] and applies it to the stored transaction.
//!
//! # Failure handling
//!
//! - An evaluator that times out (or whose history query times out) is
//!   replaced by its configured fallback contribution.
//! - An evaluator that errors or panics contributes zero with a reason
//!   naming it. This favours availability over catching every fraud.
//! - When the whole request budget runs out, a conservative
//!   medium/review decision is applied instead.

use crate::aggregator::FraudAggregator;
use crate::applier::DecisionApplier;
use crate::context::{enrich, ContextBuilder};
use crate::evaluators::{
    self, names, AmountEvaluator, DeviceEvaluator, EmailEvaluator, InstrumentEvaluator,
    LocationEvaluator, ModelEvaluator, SignalEvaluator, VelocityEvaluator,
};
use crate::metrics::Metrics;
use crate::model::{FraudModel, HeuristicModel};
use crate::policy::DecisionPolicy;
use crate::types::{EvaluateOptions, EvaluationRequest, FraudAssessment};
use chrono::{DateTime, Utc};
use compliance_service::{
    AmlReport, AmlReportGenerator, ComplianceScreener, MerchantComplianceReport,
    ReferenceListCache, ReferenceListSource,
};
use futures::future::join_all;
use futures::FutureExt;
use scoring_core::{
    CurrencyConverter, EngineConfig, EntityDirectory, Error, EvaluationContext, EvaluationMode,
    GeoResolver, Result, RiskDecision, RiskLevel, SignalResult, TransactionHistory,
    TransactionSnapshot, TransactionStore,
};
use std::any::Any;
use std::collections::HashSet;
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// External collaborators the engine reads from and writes to
#[derive(Clone)]
pub struct Collaborators {
    /// Read-only transaction history
    pub history: Arc<dyn TransactionHistory>,
    /// Currency conversion
    pub converter: Arc<dyn CurrencyConverter>,
    /// IP geolocation
    pub geo: Arc<dyn GeoResolver>,
    /// Customer and merchant lookup
    pub directory: Arc<dyn EntityDirectory>,
    /// Versioned transaction storage
    pub store: Arc<dyn TransactionStore>,
    /// Sanctions and PEP lists
    pub reference_lists: Arc<dyn ReferenceListSource>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Risk & compliance scoring engine
pub struct RiskEngine {
    config: EngineConfig,
    evaluators: Vec<Arc<dyn SignalEvaluator>>,
    aggregator: FraudAggregator,
    policy: DecisionPolicy,
    screener: Arc<ComplianceScreener>,
    reports: AmlReportGenerator,
    contexts: ContextBuilder,
    applier: DecisionApplier,
    directory: Arc<dyn EntityDirectory>,
    blacklist: HashSet<IpAddr>,
    metrics: Metrics,
}

impl std::fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field(
                "evaluators",
                &self.evaluators.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .field("blacklist", &self.blacklist)
            .finish()
    }
}

impl RiskEngine {
    /// Create new engine. Fails with `Error::Configuration` on invalid config.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let metrics = Metrics::new()
            .map_err(|e| Error::Configuration(format!("metrics registry: {}", e)))?;

        let blacklist = config
            .fraud
            .ip_blacklist
            .iter()
            .map(|ip| {
                ip.trim()
                    .parse::<IpAddr>()
                    .map_err(|e| Error::Configuration(format!("blacklisted IP {}: {}", ip, e)))
            })
            .collect::<Result<HashSet<_>>>()?;

        let Collaborators {
            history,
            converter,
            geo,
            directory,
            store,
            reference_lists,
        } = collaborators;

        let evaluators: Vec<Arc<dyn SignalEvaluator>> = vec![
            Arc::new(VelocityEvaluator::new(&config, history.clone(), converter.clone())),
            Arc::new(LocationEvaluator::new(&config, history.clone(), geo)),
            Arc::new(DeviceEvaluator::new(&config, history.clone())),
            Arc::new(InstrumentEvaluator::new(&config, history.clone())),
            Arc::new(AmountEvaluator::new(&config, history.clone(), converter.clone())),
            Arc::new(EmailEvaluator::new(&config)?),
            Arc::new(ModelEvaluator::new(&config, Arc::new(HeuristicModel))),
        ];

        let lists = Arc::new(ReferenceListCache::new(
            reference_lists,
            Duration::from_secs(config.reference_lists.ttl_seconds),
        ));
        let screener = Arc::new(ComplianceScreener::new(
            &config,
            history.clone(),
            converter.clone(),
            lists,
        )?);
        let reports = AmlReportGenerator::new(
            &config,
            screener.clone(),
            history,
            directory.clone(),
            converter,
        );

        info!(
            "Risk engine ready: {} evaluators, {} blacklisted IPs, {}ms budget",
            evaluators.len(),
            blacklist.len(),
            config.timeouts.total_budget_ms
        );

        Ok(Self {
            aggregator: FraudAggregator::new(&config),
            policy: DecisionPolicy::new(&config),
            applier: DecisionApplier::new(&config, store, metrics.clone()),
            contexts: ContextBuilder::new(directory.clone()),
            evaluators,
            screener,
            reports,
            directory,
            blacklist,
            metrics,
            config,
        })
    }

    /// Swap the predictive model
    pub fn with_model(mut self, model: Arc<dyn FraudModel>) -> Self {
        let evaluator: Arc<dyn SignalEvaluator> = Arc::new(ModelEvaluator::new(&self.config, model));
        match self.evaluators.iter_mut().find(|e| e.name() == names::MODEL) {
            Some(slot) => *slot = evaluator,
            None => self.evaluators.push(evaluator),
        }
        self
    }

    /// Replace the fraud evaluator set
    pub fn with_evaluators(mut self, evaluators: Vec<Arc<dyn SignalEvaluator>>) -> Self {
        self.evaluators = evaluators;
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Resolve the context of `request` and evaluate it
    pub async fn evaluate(&self, request: EvaluationRequest) -> Result<RiskDecision> {
        let context = self
            .contexts
            .build(
                &request.snapshot,
                request.ip_address.clone(),
                request.device_fingerprint.clone(),
            )
            .await?;
        self.evaluate_transaction(&request.snapshot, &context, &request.options)
            .await
    }

    /// Evaluate a transaction and persist the decision.
    ///
    /// A transaction already in a terminal compliance status is returned
    /// unchanged without any write, unless `options.force` is set.
    pub async fn evaluate_transaction(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
        options: &EvaluateOptions,
    ) -> Result<RiskDecision> {
        let started = Instant::now();
        let started_at = Utc::now();
        let id = snapshot.id;

        if !options.force {
            if let Some(stored) = self.applier.terminal_decision(id).await? {
                debug!("Transaction {} already terminal, returning stored decision", id);
                self.metrics.record_idempotent_noop();
                return Ok(stored);
            }
        }

        let enriched = enrich(snapshot, context, options.user_agent.as_deref());
        if enriched.metadata != snapshot.metadata {
            if let Err(e) = self.applier.record_enrichment(id, &enriched.metadata).await {
                warn!("Failed to persist enrichment for transaction {}: {}", id, e);
            }
        }

        let budget = self.config.timeouts.total_budget();
        let decision = match tokio::time::timeout(budget, self.score(&enriched, context, options.mode)).await {
            Ok(decision) => decision,
            Err(_) => {
                warn!(
                    "Evaluation of transaction {} exceeded {}ms budget, applying conservative decision",
                    id,
                    budget.as_millis()
                );
                self.metrics.record_conservative_decision();
                self.policy.conservative(id, options.mode)
            }
        };

        let applied = self
            .applier
            .apply(id, decision, options.force, started_at)
            .await?;

        self.metrics
            .record_evaluation(started.elapsed().as_secs_f64());

        if applied.level >= RiskLevel::Medium {
            warn!(
                "Transaction {} assessed {} (score {:.2}): {}",
                id,
                applied.level,
                applied.overall_score,
                applied.reasons.join("; ")
            );
        } else {
            debug!("Transaction {} assessed {}", id, applied.level);
        }

        Ok(applied)
    }

    /// Merchant-level compliance requirements
    pub async fn evaluate_merchant_compliance(
        &self,
        merchant_id: Uuid,
    ) -> Result<MerchantComplianceReport> {
        let merchant = self
            .directory
            .get_merchant(merchant_id)
            .await?
            .ok_or_else(|| Error::UnresolvedIdentity(format!("merchant {}", merchant_id)))?;
        Ok(self.screener.evaluate_merchant(&merchant).await)
    }

    /// AML report over a period; defaults to the last 30 days
    pub async fn generate_aml_report(
        &self,
        merchant_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<AmlReport> {
        let merchant = self
            .directory
            .get_merchant(merchant_id)
            .await?
            .ok_or_else(|| Error::UnresolvedIdentity(format!("merchant {}", merchant_id)))?;
        Ok(self.reports.generate(&merchant, start, end).await?)
    }

    async fn score(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
        mode: EvaluationMode,
    ) -> RiskDecision {
        // Blacklist wins over the whitelist
        if let Some(ip) = self.blacklisted_ip(snapshot, context) {
            warn!(
                "Blacklisted IP {} on transaction {}, skipping evaluation",
                ip, snapshot.id
            );
            self.metrics.record_blacklist_hit();
            let fraud = FraudAssessment::blacklisted(&ip);
            return self.policy.decide(snapshot.id, mode, Some(&fraud), None);
        }

        let fraud = async {
            match mode {
                EvaluationMode::Compliance => None,
                _ if context.whitelisted => {
                    debug!("Transaction {} whitelisted, fraud scoring skipped", snapshot.id);
                    Some(FraudAssessment::whitelisted())
                }
                _ => Some(self.assess_fraud(snapshot, context).await),
            }
        };

        let compliance = async {
            match mode {
                EvaluationMode::Fraud => None,
                _ => Some(self.screener.evaluate(snapshot, context).await),
            }
        };

        let (fraud, compliance) = tokio::join!(fraud, compliance);

        if let Some(fraud) = fraud.as_ref().filter(|f| f.level >= RiskLevel::Medium) {
            warn!(
                "Fraud risk {} (score {:.1}) for transaction {}: {}",
                fraud.level,
                fraud.score.value(),
                snapshot.id,
                fraud.reasons.join("; ")
            );
        }

        self.policy
            .decide(snapshot.id, mode, fraud.as_ref(), compliance.as_ref())
    }

    /// Fan out to every evaluator and aggregate
    async fn assess_fraud(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> FraudAssessment {
        let signals = join_all(
            self.evaluators
                .iter()
                .map(|evaluator| self.run_evaluator(evaluator.as_ref(), snapshot, context)),
        )
        .await;
        self.aggregator.aggregate(signals)
    }

    async fn run_evaluator(
        &self,
        evaluator: &dyn SignalEvaluator,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> SignalResult {
        let name = evaluator.name();
        let budget = self.config.timeouts.evaluator();

        let outcome = AssertUnwindSafe(tokio::time::timeout(
            budget,
            evaluator.evaluate(snapshot, context),
        ))
        .catch_unwind()
        .await;

        match outcome {
            Ok(Ok(Ok(signal))) => signal,
            Ok(Ok(Err(e))) if e.is_timeout() => self.fallback(name, &e.to_string()),
            Ok(Err(_)) => self.fallback(
                name,
                &format!("{} evaluator timed out after {}ms", name, budget.as_millis()),
            ),
            Ok(Ok(Err(e))) => self.failed(name, &e.to_string()),
            Err(panic) => self.failed(name, &format!("panicked: {}", panic_message(panic.as_ref()))),
        }
    }

    fn fallback(&self, name: &str, cause: &str) -> SignalResult {
        let contribution = self.config.fraud.fallbacks.for_evaluator(name);
        warn!(
            "{}; using fallback contribution {} for {}",
            cause, contribution, name
        );
        self.metrics.record_evaluator_timeout(name);
        SignalResult::fallback(
            name,
            contribution,
            format!("{} evaluator timed out; fallback contribution {} applied", name, contribution),
        )
    }

    fn failed(&self, name: &str, cause: &str) -> SignalResult {
        error!("{} evaluator failed: {}", name, cause);
        self.metrics.record_evaluator_failure(name);
        SignalResult::fallback(name, 0.0, format!("{} evaluator failed: {}", name, cause))
    }

    fn blacklisted_ip(&self, snapshot: &TransactionSnapshot, context: &EvaluationContext) -> Option<String> {
        let ip = evaluators::ip_address(snapshot, context)?;
        let parsed = ip.parse::<IpAddr>().ok()?;
        self.blacklist.contains(&parsed).then(|| ip.to_string())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use compliance_service::StaticReferenceLists;
    use rust_decimal_macros::dec;
    use scoring_core::memory::{
        InMemoryDirectory, InMemoryHistory, InMemoryTransactionStore, PrefixGeoResolver,
        StaticRateConverter,
    };
    use scoring_core::{Merchant, StoredTransaction};

    struct Fixed(&'static str, f64);

    #[async_trait]
    impl SignalEvaluator for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn evaluate(&self, _: &TransactionSnapshot, _: &EvaluationContext) -> Result<SignalResult> {
            Ok(SignalResult::new(self.0, self.1, vec![format!("{} fixed", self.0)]))
        }
    }

    struct Broken;

    #[async_trait]
    impl SignalEvaluator for Broken {
        fn name(&self) -> &'static str {
            names::DEVICE
        }

        async fn evaluate(&self, _: &TransactionSnapshot, _: &EvaluationContext) -> Result<SignalResult> {
            Err(Error::Collaborator("device store unavailable".to_string()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl SignalEvaluator for Panicking {
        fn name(&self) -> &'static str {
            names::INSTRUMENT
        }

        async fn evaluate(&self, _: &TransactionSnapshot, _: &EvaluationContext) -> Result<SignalResult> {
            panic!("instrument index corrupted")
        }
    }

    struct Sleepy;

    #[async_trait]
    impl SignalEvaluator for Sleepy {
        fn name(&self) -> &'static str {
            names::VELOCITY
        }

        async fn evaluate(&self, _: &TransactionSnapshot, _: &EvaluationContext) -> Result<SignalResult> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(SignalResult::none(names::VELOCITY))
        }
    }

    /// Sanctions source that never answers in time
    struct SlowLists;

    #[async_trait]
    impl ReferenceListSource for SlowLists {
        async fn fetch(&self) -> compliance_service::Result<compliance_service::ReferenceLists> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(compliance_service::ReferenceLists::default())
        }
    }

    fn engine(config: EngineConfig) -> (RiskEngine, Arc<InMemoryTransactionStore>, Merchant) {
        let store = Arc::new(InMemoryTransactionStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let merchant = Merchant::new("Shop");
        directory.add_merchant(merchant.clone());

        let collaborators = Collaborators {
            history: Arc::new(InMemoryHistory::new()),
            converter: Arc::new(StaticRateConverter::new("USD")),
            geo: Arc::new(PrefixGeoResolver::new()),
            directory,
            store: store.clone(),
            reference_lists: Arc::new(StaticReferenceLists::default()),
        };
        (RiskEngine::new(config, collaborators).unwrap(), store, merchant)
    }

    fn seeded(store: &InMemoryTransactionStore, merchant: &Merchant) -> TransactionSnapshot {
        let tx = TransactionSnapshot::new(merchant.id, dec!(40), "USD").with_email("ann.lee@example.com");
        store.insert(StoredTransaction::new(tx.clone()));
        tx
    }

    #[tokio::test]
    async fn test_failures_are_contained_at_fan_out() {
        let (engine, store, merchant) = engine(EngineConfig::default());
        let engine = engine.with_evaluators(vec![
            Arc::new(Fixed(names::EMAIL, 1.0)),
            Arc::new(Broken),
            Arc::new(Panicking),
        ]);
        let tx = seeded(&store, &merchant);
        let ctx = EvaluationContext::new(merchant);

        let decision = engine
            .evaluate_transaction(&tx, &ctx, &EvaluateOptions::mode(EvaluationMode::Fraud))
            .await
            .unwrap();

        assert_eq!(decision.fraud.as_ref().map(|f| f.score), Some(10.0));
        assert!(decision.reasons.iter().any(|r| r.starts_with("device evaluator failed")));
        assert!(decision
            .reasons
            .iter()
            .any(|r| r.contains("instrument evaluator failed") && r.contains("panicked")));
        assert_eq!(
            engine.metrics().evaluator_failures.with_label_values(&["device"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_slow_evaluator_gets_fallback() {
        let (engine, store, merchant) = engine(EngineConfig::default());
        let engine = engine.with_evaluators(vec![Arc::new(Sleepy)]);
        let tx = seeded(&store, &merchant);
        let ctx = EvaluationContext::new(merchant);

        let decision = engine
            .evaluate_transaction(&tx, &ctx, &EvaluateOptions::mode(EvaluationMode::Fraud))
            .await
            .unwrap();

        // 0.3 fallback x 25 points
        assert_eq!(decision.fraud.as_ref().map(|f| f.score), Some(7.5));
        assert!(!decision.conservative);
        assert_eq!(
            engine.metrics().evaluator_timeouts.with_label_values(&["velocity"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_conservative() {
        let mut config = EngineConfig::default();
        config.timeouts.total_budget_ms = 500;

        let store = Arc::new(InMemoryTransactionStore::new());
        let merchant = Merchant::new("Shop");
        let collaborators = Collaborators {
            history: Arc::new(InMemoryHistory::new()),
            converter: Arc::new(StaticRateConverter::new("USD")),
            geo: Arc::new(PrefixGeoResolver::new()),
            directory: Arc::new(InMemoryDirectory::new()),
            store: store.clone(),
            reference_lists: Arc::new(SlowLists),
        };
        let engine = RiskEngine::new(config, collaborators).unwrap();

        let mut tx = seeded(&store, &merchant);
        tx.metadata.customer_name = Some("Ann Lee".to_string());
        let ctx = EvaluationContext::new(merchant);

        let decision = engine
            .evaluate_transaction(&tx, &ctx, &EvaluateOptions::default())
            .await
            .unwrap();

        assert!(decision.conservative);
        assert_eq!(decision.level, RiskLevel::Medium);
        assert_eq!(decision.status, Some(scoring_core::ComplianceStatus::Review));
        assert_eq!(decision.actions, vec![scoring_core::Action::ManualReview]);
        assert_eq!(store.get(tx.id).unwrap().risk.decision, Some(decision));
        assert_eq!(engine.metrics().conservative_decisions.get(), 1);
    }

    #[test]
    fn test_invalid_config_fails_startup() {
        let mut config = EngineConfig::default();
        config.fraud.levels.medium = 90.0;

        let collaborators = Collaborators {
            history: Arc::new(InMemoryHistory::new()),
            converter: Arc::new(StaticRateConverter::new("USD")),
            geo: Arc::new(PrefixGeoResolver::new()),
            directory: Arc::new(InMemoryDirectory::new()),
            store: Arc::new(InMemoryTransactionStore::new()),
            reference_lists: Arc::new(StaticReferenceLists::default()),
        };
        assert!(matches!(
            RiskEngine::new(config, collaborators),
            Err(Error::Configuration(_))
        ));
    }
}
