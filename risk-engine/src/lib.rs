//! Risk Engine for HamsukyPay
//!
//! Real-time fraud and compliance scoring for payment transactions.
//!
//! # Architecture
//!
//! ```text
//! EvaluationRequest
//!        |
//!   ContextBuilder --> enrich --> DecisionApplier (enrichment write)
//!        |
//!   +----+--------------------+
//!   |                         |
//! SignalEvaluators (fan-out)  ComplianceScreener (PCI/AML/KYC)
//!   |                         |
//! FraudAggregator             |
//!   +----+--------------------+
//!        |
//!   DecisionPolicy --> DecisionApplier (compare-and-swap) --> RiskDecision
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod applier;
pub mod context;
pub mod engine;
pub mod evaluators;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod types;

pub use aggregator::FraudAggregator;
pub use applier::DecisionApplier;
pub use context::{enrich, ContextBuilder};
pub use engine::{Collaborators, RiskEngine};
pub use evaluators::SignalEvaluator;
pub use metrics::Metrics;
pub use model::{extract_features, FeatureMap, FraudModel, HeuristicModel};
pub use policy::DecisionPolicy;
pub use scoring_core::{Error, Result};
pub use types::*;
