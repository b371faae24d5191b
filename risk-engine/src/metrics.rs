//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `risk_evaluations_total` - Evaluation requests completed
//! - `risk_evaluation_duration_seconds` - End-to-end evaluation latency
//! - `risk_evaluator_failures_total{evaluator}` - Evaluator errors and panics
//! - `risk_evaluator_timeouts_total{evaluator}` - Evaluators replaced by their fallback
//! - `risk_blacklist_short_circuits_total` - Requests stopped by the IP blacklist
//! - `risk_idempotent_noops_total` - Terminal transactions returned unchanged
//! - `risk_conservative_decisions_total` - Requests that exhausted the budget
//! - `risk_persistence_conflicts_total` - Optimistic write conflicts

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Evaluations completed
    pub evaluations_total: IntCounter,

    /// Evaluation latency
    pub evaluation_duration: Histogram,

    /// Evaluator failures by evaluator
    pub evaluator_failures: IntCounterVec,

    /// Evaluator timeouts by evaluator
    pub evaluator_timeouts: IntCounterVec,

    /// Blacklist short-circuits
    pub blacklist_short_circuits: IntCounter,

    /// Idempotent no-ops
    pub idempotent_noops: IntCounter,

    /// Conservative decisions
    pub conservative_decisions: IntCounter,

    /// Persistence conflicts
    pub persistence_conflicts: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("evaluations_total", &self.evaluations_total.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let evaluations_total = IntCounter::new(
            "risk_evaluations_total",
            "Evaluation requests completed",
        )?;
        registry.register(Box::new(evaluations_total.clone()))?;

        let evaluation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "risk_evaluation_duration_seconds",
                "End-to-end evaluation latency",
            )
            .buckets(vec![0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.0]),
        )?;
        registry.register(Box::new(evaluation_duration.clone()))?;

        let evaluator_failures = IntCounterVec::new(
            Opts::new(
                "risk_evaluator_failures_total",
                "Evaluator errors and panics",
            ),
            &["evaluator"],
        )?;
        registry.register(Box::new(evaluator_failures.clone()))?;

        let evaluator_timeouts = IntCounterVec::new(
            Opts::new(
                "risk_evaluator_timeouts_total",
                "Evaluators replaced by their fallback contribution",
            ),
            &["evaluator"],
        )?;
        registry.register(Box::new(evaluator_timeouts.clone()))?;

        let blacklist_short_circuits = IntCounter::new(
            "risk_blacklist_short_circuits_total",
            "Requests stopped by the IP blacklist",
        )?;
        registry.register(Box::new(blacklist_short_circuits.clone()))?;

        let idempotent_noops = IntCounter::new(
            "risk_idempotent_noops_total",
            "Terminal transactions returned unchanged",
        )?;
        registry.register(Box::new(idempotent_noops.clone()))?;

        let conservative_decisions = IntCounter::new(
            "risk_conservative_decisions_total",
            "Requests that exhausted the evaluation budget",
        )?;
        registry.register(Box::new(conservative_decisions.clone()))?;

        let persistence_conflicts = IntCounter::new(
            "risk_persistence_conflicts_total",
            "Optimistic write conflicts",
        )?;
        registry.register(Box::new(persistence_conflicts.clone()))?;

        Ok(Self {
            evaluations_total,
            evaluation_duration,
            evaluator_failures,
            evaluator_timeouts,
            blacklist_short_circuits,
            idempotent_noops,
            conservative_decisions,
            persistence_conflicts,
            registry,
        })
    }

    /// Record a completed evaluation
    pub fn record_evaluation(&self, duration_seconds: f64) {
        self.evaluations_total.inc();
        self.evaluation_duration.observe(duration_seconds);
    }

    /// Record an evaluator failure
    pub fn record_evaluator_failure(&self, evaluator: &str) {
        self.evaluator_failures.with_label_values(&[evaluator]).inc();
    }

    /// Record an evaluator timeout
    pub fn record_evaluator_timeout(&self, evaluator: &str) {
        self.evaluator_timeouts.with_label_values(&[evaluator]).inc();
    }

    /// Record a blacklist short-circuit
    pub fn record_blacklist_hit(&self) {
        self.blacklist_short_circuits.inc();
    }

    /// Record an idempotent no-op
    pub fn record_idempotent_noop(&self) {
        self.idempotent_noops.inc();
    }

    /// Record a conservative decision
    pub fn record_conservative_decision(&self) {
        self.conservative_decisions.inc();
    }

    /// Record a persistence conflict
    pub fn record_persistence_conflict(&self) {
        self.persistence_conflicts.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
