//! Decision applier
//!
//! Writes a decision back onto the stored transaction in one
//! read-modify-write. Concurrent writers are serialized through the
//! store's compare-and-swap; a lost race reloads, merges with whatever
//! the winner committed and retries with backoff.

use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use compliance_service::screening::level_for;
use scoring_core::{
    push_unique, Action, ComplianceStatus, EngineConfig, Error, EvaluationMode, ModelScore,
    Result, RiskDecision, RiskFields, ScoreScale, StoredTransaction, TransactionMetadata,
    TransactionStore, Versioned,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

/// Applies decisions to the transaction store
pub struct DecisionApplier {
    store: Arc<dyn TransactionStore>,
    max_retries: u32,
    backoff: Duration,
    max_score_history: usize,
    metrics: Metrics,
}

impl std::fmt::Debug for DecisionApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionApplier")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("max_score_history", &self.max_score_history)
            .finish()
    }
}

impl DecisionApplier {
    pub fn new(config: &EngineConfig, store: Arc<dyn TransactionStore>, metrics: Metrics) -> Self {
        Self {
            store,
            max_retries: config.persistence.max_retries,
            backoff: Duration::from_millis(config.persistence.backoff_ms),
            max_score_history: config.fraud.model.max_score_history,
            metrics,
        }
    }

    async fn load(&self, id: Uuid) -> Result<Versioned<StoredTransaction>> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| Error::TransactionNotFound(id.to_string()))
    }

    /// Stored decision of a transaction in a terminal compliance status
    pub async fn terminal_decision(&self, id: Uuid) -> Result<Option<RiskDecision>> {
        let row = self.load(id).await?;
        Ok(terminal(&row.value.risk, id))
    }

    /// Persist request enrichment (IP, device, user agent) on its own
    pub async fn record_enrichment(&self, id: Uuid, metadata: &TransactionMetadata) -> Result<()> {
        self.with_retries(id, |mut record| {
            let current = &mut record.snapshot.metadata;
            if metadata.ip_address.is_some() {
                current.ip_address = metadata.ip_address.clone();
            }
            if metadata.device_fingerprint.is_some() {
                current.device_fingerprint = metadata.device_fingerprint.clone();
            }
            if metadata.user_agent.is_some() {
                current.user_agent = metadata.user_agent.clone();
            }
            Step::Write(record, ())
        })
        .await
    }

    /// Apply `decision` to transaction `id`.
    ///
    /// Returns the decision as persisted: the stored one for a terminal
    /// transaction (unless `force`), a merge when another writer committed
    /// after `started_at`, otherwise `decision` itself.
    pub async fn apply(
        &self,
        id: Uuid,
        decision: RiskDecision,
        force: bool,
        started_at: DateTime<Utc>,
    ) -> Result<RiskDecision> {
        let max_score_history = self.max_score_history;

        self.with_retries(id, |mut record| {
            if !force {
                if let Some(stored) = terminal(&record.risk, id) {
                    return Step::Done(stored);
                }
            }

            let merged = match &record.risk.decision {
                Some(stored) if stored.evaluated_at > started_at => merge(stored, decision.clone()),
                _ => decision.clone(),
            };

            record.risk.apply(&merged);

            if let Some(score) = merged.model_score {
                let scores = &mut record.snapshot.metadata.model_scores;
                scores.push(ModelScore {
                    timestamp: merged.evaluated_at,
                    score,
                });
                if scores.len() > max_score_history {
                    let excess = scores.len() - max_score_history;
                    scores.drain(..excess);
                }
            }

            Step::Write(record, merged)
        })
        .await
    }

    /// Optimistic read-modify-write loop
    async fn with_retries<T, F>(&self, id: Uuid, mut modify: F) -> Result<T>
    where
        F: FnMut(StoredTransaction) -> Step<T>,
    {
        let mut attempt = 0u32;

        loop {
            let row = self.load(id).await?;

            let (record, result) = match modify(row.value) {
                Step::Done(result) => return Ok(result),
                Step::Write(record, result) => (record, result),
            };

            match self.store.compare_and_swap(id, row.version, record).await {
                Ok(_) => return Ok(result),
                Err(Error::PersistenceConflict(reason)) => {
                    self.metrics.record_persistence_conflict();

                    if attempt >= self.max_retries {
                        error!(
                            "Persistence conflict on transaction {} after {} retries: {}",
                            id, attempt, reason
                        );
                        return Err(Error::EvaluationFailed(format!(
                            "transaction {}: write conflict persisted after {} retries",
                            id, attempt
                        )));
                    }

                    let delay = self.backoff * 2u32.saturating_pow(attempt);
                    debug!(
                        "Persistence conflict on transaction {} (attempt {}), retrying in {:?}",
                        id,
                        attempt + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

enum Step<T> {
    Done(T),
    Write(StoredTransaction, T),
}

fn terminal(fields: &RiskFields, id: Uuid) -> Option<RiskDecision> {
    if !fields.compliance_status.is_terminal() {
        return None;
    }

    Some(fields.stored_decision(id).unwrap_or_else(|| RiskDecision {
        transaction_id: id,
        mode: EvaluationMode::Full,
        overall_score: fields.risk_score,
        scale: ScoreScale::Compliance,
        level: level_for(fields.compliance_status, &[]),
        status: Some(fields.compliance_status),
        fraud: None,
        compliance: None,
        actions: Vec::new(),
        reasons: Vec::new(),
        model_score: None,
        conservative: false,
        evaluated_at: Utc::now(),
    }))
}

fn severity(status: ComplianceStatus) -> u8 {
    match status {
        ComplianceStatus::Approved => 0,
        ComplianceStatus::Pending => 1,
        ComplianceStatus::Review => 2,
        ComplianceStatus::Rejected => 3,
    }
}

/// Merge a concurrently committed decision with a fresh one; neither side's
/// actions or reasons are dropped.
pub fn merge(stored: &RiskDecision, fresh: RiskDecision) -> RiskDecision {
    let actions = Action::union([stored.actions.clone(), fresh.actions.clone()]);

    let mut reasons = stored.reasons.clone();
    for reason in fresh.reasons.iter() {
        push_unique(&mut reasons, reason.clone());
    }

    let status = match (stored.status, fresh.status) {
        (Some(a), Some(b)) => Some(if severity(a) >= severity(b) { a } else { b }),
        (a, b) => a.or(b),
    }
    .map(|status| {
        if status == ComplianceStatus::Approved && actions.contains(&Action::BlockTransaction) {
            ComplianceStatus::Review
        } else {
            status
        }
    });

    let overall_score = if stored.scale == fresh.scale {
        stored.overall_score.max(fresh.overall_score)
    } else {
        fresh.overall_score
    };

    RiskDecision {
        overall_score,
        level: stored.level.max(fresh.level),
        status,
        fraud: fresh.fraud.or_else(|| stored.fraud.clone()),
        compliance: fresh.compliance.or_else(|| stored.compliance.clone()),
        actions,
        reasons,
        model_score: fresh.model_score.or(stored.model_score),
        conservative: fresh.conservative && stored.conservative,
        ..fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use scoring_core::memory::InMemoryTransactionStore;
    use scoring_core::{RiskLevel, TransactionSnapshot};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn decision(id: Uuid, level: RiskLevel, status: Option<ComplianceStatus>, actions: Vec<Action>) -> RiskDecision {
        RiskDecision {
            transaction_id: id,
            mode: EvaluationMode::Full,
            overall_score: 0.2,
            scale: ScoreScale::Blended,
            level,
            status,
            fraud: None,
            compliance: None,
            actions,
            reasons: vec![format!("{} decision", level)],
            model_score: None,
            conservative: false,
            evaluated_at: Utc::now(),
        }
    }

    fn seeded() -> (Arc<InMemoryTransactionStore>, Uuid) {
        let store = Arc::new(InMemoryTransactionStore::new());
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(100), "USD");
        let id = tx.id;
        store.insert(StoredTransaction::new(tx));
        (store, id)
    }

    fn applier(store: Arc<dyn TransactionStore>) -> DecisionApplier {
        DecisionApplier::new(&EngineConfig::default(), store, Metrics::new().unwrap())
    }

    /// Commits a blocking decision behind the caller's back on first write
    struct RacingStore {
        inner: Arc<InMemoryTransactionStore>,
        raced: AtomicBool,
    }

    #[async_trait]
    impl TransactionStore for RacingStore {
        async fn load(&self, id: Uuid) -> Result<Option<Versioned<StoredTransaction>>> {
            self.inner.load(id).await
        }

        async fn compare_and_swap(&self, id: Uuid, expected_version: u64, record: StoredTransaction) -> Result<u64> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let mut current = self.inner.get(id).ok_or_else(|| Error::TransactionNotFound(id.to_string()))?;
                current.risk.apply(&decision(
                    id,
                    RiskLevel::Blocked,
                    Some(ComplianceStatus::Review),
                    vec![Action::BlockTransaction, Action::FileReport],
                ));
                self.inner.compare_and_swap(id, expected_version, current).await?;
            }
            self.inner.compare_and_swap(id, expected_version, record).await
        }
    }

    /// Every write loses
    struct ContendedStore {
        inner: Arc<InMemoryTransactionStore>,
    }

    #[async_trait]
    impl TransactionStore for ContendedStore {
        async fn load(&self, id: Uuid) -> Result<Option<Versioned<StoredTransaction>>> {
            self.inner.load(id).await
        }

        async fn compare_and_swap(&self, id: Uuid, _expected_version: u64, _record: StoredTransaction) -> Result<u64> {
            Err(Error::PersistenceConflict(format!("transaction {} is contended", id)))
        }
    }

    #[tokio::test]
    async fn test_apply_overwrites_all_fields() {
        let (store, id) = seeded();
        let applier = applier(store.clone());

        let mut fresh = decision(id, RiskLevel::Medium, Some(ComplianceStatus::Review), vec![Action::ManualReview]);
        fresh.model_score = Some(0.42);
        let applied = applier.apply(id, fresh.clone(), false, Utc::now()).await.unwrap();
        assert_eq!(applied, fresh);

        let row = store.get(id).unwrap();
        assert_eq!(row.risk.compliance_status, ComplianceStatus::Review);
        assert_eq!(row.risk.risk_score, 0.2);
        assert_eq!(row.risk.risk_flags.as_ref().map(|f| f.level), Some(RiskLevel::Medium));
        assert_eq!(row.risk.decision, Some(fresh));
        assert_eq!(row.snapshot.metadata.model_scores.len(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_terminal_is_noop_unless_forced() {
        let (store, id) = seeded();
        let applier = applier(store.clone());

        let approved = decision(id, RiskLevel::Low, Some(ComplianceStatus::Approved), Vec::new());
        applier.apply(id, approved.clone(), false, Utc::now()).await.unwrap();

        let later = decision(id, RiskLevel::High, Some(ComplianceStatus::Review), vec![Action::ManualReview]);
        let returned = applier.apply(id, later.clone(), false, Utc::now()).await.unwrap();
        assert_eq!(returned, approved);
        assert_eq!(store.write_count(), 1);
        assert_eq!(applier.terminal_decision(id).await.unwrap(), Some(approved));

        let forced = applier.apply(id, later.clone(), true, Utc::now()).await.unwrap();
        assert_eq!(forced, later);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_block_is_never_erased() {
        let (inner, id) = seeded();
        let store = Arc::new(RacingStore {
            inner: inner.clone(),
            raced: AtomicBool::new(false),
        });
        let applier = applier(store);

        let started_at = Utc::now() - chrono::Duration::seconds(1);
        let fresh = decision(id, RiskLevel::Low, Some(ComplianceStatus::Approved), Vec::new());
        let applied = applier.apply(id, fresh, false, started_at).await.unwrap();

        assert_eq!(applied.level, RiskLevel::Blocked);
        assert_eq!(applied.status, Some(ComplianceStatus::Review));
        assert_eq!(applied.actions, vec![Action::BlockTransaction, Action::FileReport]);
        assert!(applied.reasons.iter().any(|r| r == "blocked decision"));
        assert!(applied.reasons.iter().any(|r| r == "low decision"));

        let row = inner.get(id).unwrap();
        assert_eq!(row.risk.decision, Some(applied));
        assert_eq!(applier.metrics.persistence_conflicts.get(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_evaluation() {
        let (inner, id) = seeded();
        let applier = applier(Arc::new(ContendedStore { inner }));

        let fresh = decision(id, RiskLevel::Low, Some(ComplianceStatus::Approved), Vec::new());
        let result = applier.apply(id, fresh, false, Utc::now()).await;
        assert!(matches!(result, Err(Error::EvaluationFailed(_))));
        assert_eq!(applier.metrics.persistence_conflicts.get(), 4);
    }

    #[tokio::test]
    async fn test_missing_transaction() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let applier = applier(store);
        let id = Uuid::new_v4();
        let result = applier
            .apply(id, decision(id, RiskLevel::Low, None, Vec::new()), false, Utc::now())
            .await;
        assert!(matches!(result, Err(Error::TransactionNotFound(_))));
    }

    #[tokio::test]
    async fn test_model_score_history_is_bounded() {
        let (store, id) = seeded();
        let applier = applier(store.clone());

        for i in 0..25 {
            let mut fresh = decision(id, RiskLevel::Low, Some(ComplianceStatus::Review), Vec::new());
            fresh.model_score = Some(i as f64 / 100.0);
            applier.apply(id, fresh, false, Utc::now()).await.unwrap();
        }

        let scores = store.get(id).unwrap().snapshot.metadata.model_scores;
        assert_eq!(scores.len(), 20);
        assert_eq!(scores.last().map(|s| s.score), Some(0.24));
        assert_eq!(scores.first().map(|s| s.score), Some(0.05));
    }

    #[tokio::test]
    async fn test_enrichment_keeps_existing_fields() {
        let (store, id) = seeded();
        let applier = applier(store.clone());

        let metadata = TransactionMetadata {
            ip_address: Some("41.58.1.1".to_string()),
            ..TransactionMetadata::default()
        };
        applier.record_enrichment(id, &metadata).await.unwrap();

        let metadata = TransactionMetadata {
            device_fingerprint: Some("dev-9".to_string()),
            ..TransactionMetadata::default()
        };
        applier.record_enrichment(id, &metadata).await.unwrap();

        let row = store.get(id).unwrap();
        assert_eq!(row.snapshot.metadata.ip_address.as_deref(), Some("41.58.1.1"));
        assert_eq!(row.snapshot.metadata.device_fingerprint.as_deref(), Some("dev-9"));
    }

    #[test]
    fn test_merge_keeps_strongest() {
        let id = Uuid::new_v4();
        let mut stored = decision(id, RiskLevel::High, Some(ComplianceStatus::Rejected), vec![Action::ManualReview]);
        stored.overall_score = 0.9;
        let fresh = decision(id, RiskLevel::Low, Some(ComplianceStatus::Approved), vec![Action::EnhancedMonitoring]);

        let merged = merge(&stored, fresh);
        assert_eq!(merged.level, RiskLevel::High);
        assert_eq!(merged.status, Some(ComplianceStatus::Rejected));
        assert_eq!(merged.overall_score, 0.9);
        assert_eq!(merged.actions, vec![Action::ManualReview, Action::EnhancedMonitoring]);
    }
}
