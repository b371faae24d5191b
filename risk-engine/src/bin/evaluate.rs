//! Evaluate one transaction from a JSON file and print the decision
//!
//! Usage: `risk-evaluate <transaction.json> [config.toml]`
//!
//! Without a config file the defaults are used, with `RISK_ENGINE_*`
//! environment overrides.

use anyhow::{bail, Context};
use compliance_service::StaticReferenceLists;
use risk_engine::{Collaborators, EvaluateOptions, EvaluationRequest, RiskEngine};
use scoring_core::memory::{
    InMemoryDirectory, InMemoryHistory, InMemoryTransactionStore, PrefixGeoResolver,
    StaticRateConverter,
};
use scoring_core::{
    Customer, EngineConfig, HistoryRecord, Merchant, StoredTransaction, TransactionSnapshot,
};
use serde::Deserialize;
use std::sync::Arc;

/// Input file layout
#[derive(Debug, Deserialize)]
struct Input {
    snapshot: TransactionSnapshot,
    merchant: Merchant,
    #[serde(default)]
    customer: Option<Customer>,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    device_fingerprint: Option<String>,
    #[serde(default)]
    options: EvaluateOptions,
    #[serde(default)]
    history: Vec<HistoryRecord>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(input_path) = args.next() else {
        bail!("usage: risk-evaluate <transaction.json> [config.toml]");
    };

    let config = match args.next() {
        Some(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => EngineConfig::from_env().context("failed to load config from environment")?,
    };

    let raw = std::fs::read_to_string(&input_path)
        .with_context(|| format!("failed to read {}", input_path))?;
    let input: Input = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", input_path))?;

    if input.merchant.id != input.snapshot.merchant_id {
        bail!(
            "merchant {} does not match transaction merchant {}",
            input.merchant.id,
            input.snapshot.merchant_id
        );
    }

    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_merchant(input.merchant);
    if let Some(customer) = input.customer {
        directory.add_customer(customer);
    }

    let history = Arc::new(InMemoryHistory::new());
    history.extend(input.history);

    let store = Arc::new(InMemoryTransactionStore::new());
    store.insert(StoredTransaction::new(input.snapshot.clone()));

    let collaborators = Collaborators {
        history,
        converter: Arc::new(StaticRateConverter::new(&config.reference_currency)),
        geo: Arc::new(PrefixGeoResolver::new()),
        directory,
        store,
        reference_lists: Arc::new(StaticReferenceLists::default()),
    };

    let engine = RiskEngine::new(config, collaborators).context("invalid engine configuration")?;

    let request = EvaluationRequest {
        snapshot: input.snapshot,
        ip_address: input.ip_address,
        device_fingerprint: input.device_fingerprint,
        options: input.options,
    };
    let decision = engine.evaluate(request).await?;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
