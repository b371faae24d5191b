//! In-memory collaborator implementations
//!
//! Used by tests, the CLI and local development. Each one honors the
//! contract of its trait, including optimistic versioning for the store.

use crate::error::{Error, Result};
use crate::history::{
    CurrencyConverter, EntityDirectory, GeoResolver, HistoryQuery, HistoryRecord,
    TransactionHistory, TransactionStore, Versioned,
};
use crate::types::{Customer, Merchant, StoredTransaction};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// In-memory transaction history
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    records: RwLock<Vec<HistoryRecord>>,
    latency: RwLock<Option<Duration>>,
    queries: AtomicU64,
}

impl InMemoryHistory {
    /// Empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record
    pub fn insert(&self, record: HistoryRecord) {
        self.records.write().push(record);
    }

    /// Add many records
    pub fn extend<I: IntoIterator<Item = HistoryRecord>>(&self, records: I) {
        self.records.write().extend(records);
    }

    /// Delay every query by `latency` (simulates a slow store)
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Number of queries served so far
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl TransactionHistory for InMemoryHistory {
    async fn query(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut matched: Vec<HistoryRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| query.accepts(r))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        Ok(matched)
    }
}

/// Static rate table converter. Rates are units of the reference currency
/// per one unit of the listed currency.
#[derive(Debug, Clone)]
pub struct StaticRateConverter {
    reference: String,
    rates: HashMap<String, Decimal>,
}

impl StaticRateConverter {
    /// Converter with only the reference currency
    pub fn new(reference: &str) -> Self {
        let reference = reference.to_uppercase();
        let mut rates = HashMap::new();
        rates.insert(reference.clone(), Decimal::ONE);
        Self { reference, rates }
    }

    /// Add a rate
    pub fn with_rate(mut self, currency: &str, rate: Decimal) -> Self {
        self.rates.insert(currency.to_uppercase(), rate);
        self
    }

    fn rate(&self, currency: &str) -> Result<Decimal> {
        self.rates
            .get(&currency.to_uppercase())
            .copied()
            .filter(|r| !r.is_zero())
            .ok_or_else(|| Error::UnsupportedCurrency(currency.to_string()))
    }
}

impl CurrencyConverter for StaticRateConverter {
    fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(amount);
        }

        let in_reference = if from.eq_ignore_ascii_case(&self.reference) {
            amount
        } else {
            amount * self.rate(from)?
        };

        if to.eq_ignore_ascii_case(&self.reference) {
            Ok(in_reference)
        } else {
            Ok(in_reference / self.rate(to)?)
        }
    }
}

/// Prefix-table geolocation
#[derive(Debug, Clone, Default)]
pub struct PrefixGeoResolver {
    prefixes: Vec<(String, String)>,
}

impl PrefixGeoResolver {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Map addresses starting with `prefix` to `country`
    pub fn with_prefix(mut self, prefix: &str, country: &str) -> Self {
        self.prefixes
            .push((prefix.to_string(), country.to_uppercase()));
        // Longest prefix wins
        self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }
}

impl GeoResolver for PrefixGeoResolver {
    fn resolve_country(&self, ip: &IpAddr) -> Option<String> {
        let is_private = match ip {
            IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_unspecified(),
            IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
        };
        if is_private {
            return None;
        }

        let text = ip.to_string();
        self.prefixes
            .iter()
            .find(|(prefix, _)| text.starts_with(prefix.as_str()))
            .map(|(_, country)| country.clone())
    }
}

/// In-memory customer and merchant directory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    customers: DashMap<Uuid, Customer>,
    merchants: DashMap<Uuid, Merchant>,
}

impl InMemoryDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a customer
    pub fn add_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    /// Add or replace a merchant
    pub fn add_merchant(&self, merchant: Merchant) {
        self.merchants.insert(merchant.id, merchant);
    }
}

#[async_trait]
impl EntityDirectory for InMemoryDirectory {
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        Ok(self.customers.get(&id).map(|c| c.clone()))
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        Ok(self
            .customers
            .iter()
            .find(|c| c.email.eq_ignore_ascii_case(email.trim()))
            .map(|c| c.clone()))
    }

    async fn get_merchant(&self, id: Uuid) -> Result<Option<Merchant>> {
        Ok(self.merchants.get(&id).map(|m| m.clone()))
    }
}

/// In-memory versioned transaction store
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    rows: DashMap<Uuid, Versioned<StoredTransaction>>,
    writes: AtomicU64,
}

impl InMemoryTransactionStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row at version 0
    pub fn insert(&self, record: StoredTransaction) {
        let id = record.snapshot.id;
        self.rows.insert(
            id,
            Versioned {
                value: record,
                version: 0,
            },
        );
    }

    /// Current row, if any
    pub fn get(&self, id: Uuid) -> Option<StoredTransaction> {
        self.rows.get(&id).map(|r| r.value.clone())
    }

    /// Successful writes so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn load(&self, id: Uuid) -> Result<Option<Versioned<StoredTransaction>>> {
        Ok(self.rows.get(&id).map(|r| r.clone()))
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected_version: u64,
        record: StoredTransaction,
    ) -> Result<u64> {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| Error::TransactionNotFound(id.to_string()))?;

        if row.version != expected_version {
            return Err(Error::PersistenceConflict(format!(
                "transaction {} at version {}, expected {}",
                id, row.version, expected_version
            )));
        }

        row.value = record;
        row.version += 1;
        self.writes.fetch_add(1, Ordering::SeqCst);

        tracing::debug!("Stored transaction {} at version {}", id, row.version);
        Ok(row.version)
    }
}
