//! Scoring Core
//!
//! Shared data contracts, collaborator interfaces, error taxonomy and the
//! versioned engine configuration used by the fraud and compliance engines.
//!
//! # Invariants
//!
//! - Signal contributions are always within [0, 1]
//! - Snapshots are immutable once built; enrichment produces a new snapshot
//! - All weights and thresholds live in [`EngineConfig`]

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod history;
pub mod memory;
pub mod types;

// Re-exports
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use history::{
    normalize_amount, query_within, CurrencyConverter, EntityDirectory, GeoResolver, HistoryKey,
    HistoryQuery, HistoryRecord, NormalizedAmount, TransactionHistory, TransactionStore,
    Versioned,
};
pub use types::*;
