//! Collaborator interfaces: transaction history, currency conversion,
//! geolocation, entity lookup and the versioned transaction store.

use crate::error::{Error, Result};
use crate::types::{
    Customer, Merchant, PaymentInstrument, StoredTransaction, TransactionMetadata,
    TransactionSnapshot, TransactionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use uuid::Uuid;

/// Past transaction as seen by history queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Transaction ID
    pub transaction_id: Uuid,
    /// Customer reference
    pub customer_id: Option<Uuid>,
    /// Merchant reference
    pub merchant_id: Uuid,
    /// Payer email, lowercased
    pub email: Option<String>,
    /// Amount in `currency`
    pub amount: Decimal,
    /// ISO 4217 code
    pub currency: String,
    /// Payment status
    pub status: TransactionStatus,
    /// Payment instrument
    pub instrument: Option<PaymentInstrument>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Metadata at the time of the payment
    pub metadata: TransactionMetadata,
}

impl From<&TransactionSnapshot> for HistoryRecord {
    fn from(snapshot: &TransactionSnapshot) -> Self {
        Self {
            transaction_id: snapshot.id,
            customer_id: snapshot.customer_id,
            merchant_id: snapshot.merchant_id,
            email: snapshot.normalized_email(),
            amount: snapshot.amount,
            currency: snapshot.currency.clone(),
            status: snapshot.status,
            instrument: snapshot.instrument.clone(),
            created_at: snapshot.created_at,
            metadata: snapshot.metadata.clone(),
        }
    }
}

impl HistoryRecord {
    /// IP address recorded for the payment
    pub fn ip_address(&self) -> Option<&str> {
        self.metadata.ip_address.as_deref()
    }

    /// Device fingerprint recorded for the payment
    pub fn device_fingerprint(&self) -> Option<&str> {
        self.metadata.device_fingerprint.as_deref()
    }

    /// Instrument fingerprint
    pub fn instrument_fingerprint(&self) -> Option<String> {
        self.instrument.as_ref().map(PaymentInstrument::fingerprint)
    }
}

/// Entity a history query is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HistoryKey {
    /// All payments of a customer
    Customer(Uuid),
    /// All payments by a payer email (lowercased)
    Email(String),
    /// All payments to a merchant
    Merchant(Uuid),
    /// All payments with an instrument fingerprint
    Instrument(String),
    /// All payments from a device fingerprint
    Device(String),
}

impl HistoryKey {
    /// Whether `record` belongs to this key
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        match self {
            HistoryKey::Customer(id) => record.customer_id == Some(*id),
            HistoryKey::Email(email) => record
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email)),
            HistoryKey::Merchant(id) => record.merchant_id == *id,
            HistoryKey::Instrument(fp) => record.instrument_fingerprint().as_deref() == Some(fp),
            HistoryKey::Device(fp) => record.device_fingerprint() == Some(fp.as_str()),
        }
    }
}

/// Time-bounded history query
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    /// Entity scope
    pub key: HistoryKey,
    /// Only records created at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only records created before this instant
    pub until: Option<DateTime<Utc>>,
    /// Record to leave out (the transaction being evaluated)
    pub exclude: Option<Uuid>,
    /// Maximum number of records, newest first
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Query over the whole history of `key`
    pub fn new(key: HistoryKey) -> Self {
        Self {
            key,
            since: None,
            until: None,
            exclude: None,
            limit: None,
        }
    }

    /// Lower time bound
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Upper time bound (exclusive)
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Leave a transaction out
    pub fn excluding(mut self, id: Uuid) -> Self {
        self.exclude = Some(id);
        self
    }

    /// Cap the number of records
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` satisfies the query filters (ignores `limit`)
    pub fn accepts(&self, record: &HistoryRecord) -> bool {
        self.key.matches(record)
            && self.exclude != Some(record.transaction_id)
            && self.since.map_or(true, |s| record.created_at >= s)
            && self.until.map_or(true, |u| record.created_at < u)
    }
}

/// Read-only transaction history
#[async_trait]
pub trait TransactionHistory: Send + Sync {
    /// Records matching `query`, newest first
    async fn query(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>>;

    /// Number of records matching `query`
    async fn count(&self, query: &HistoryQuery) -> Result<usize> {
        Ok(self.query(query).await?.len())
    }
}

/// Run a history query under a time budget.
///
/// Elapsed budgets surface as `Error::HistoryQueryTimeout` tagged with
/// `source_name` so callers can apply their fallback contribution.
pub async fn query_within(
    history: &dyn TransactionHistory,
    query: &HistoryQuery,
    budget: Duration,
    source_name: &str,
) -> Result<Vec<HistoryRecord>> {
    match tokio::time::timeout(budget, history.query(query)).await {
        Ok(result) => result,
        Err(_) => Err(Error::HistoryQueryTimeout {
            source_name: source_name.to_string(),
            timeout_ms: budget.as_millis() as u64,
        }),
    }
}

/// Currency conversion
pub trait CurrencyConverter: Send + Sync {
    /// Convert `amount` from `from` into `to`
    fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal>;
}

/// Amount expressed in the reference currency, if conversion succeeded
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAmount {
    /// Converted amount, or the raw amount when conversion failed
    pub amount: Decimal,
    /// Caveat reason when the raw amount had to be used
    pub caveat: Option<String>,
}

/// Convert into the reference currency, falling back to the raw amount
pub fn normalize_amount(
    converter: &dyn CurrencyConverter,
    amount: Decimal,
    currency: &str,
    reference: &str,
) -> NormalizedAmount {
    match converter.convert(amount, currency, reference) {
        Ok(converted) => NormalizedAmount {
            amount: converted,
            caveat: None,
        },
        Err(e) => NormalizedAmount {
            amount,
            caveat: Some(format!(
                "{} {} not converted to {} ({}); raw amount used",
                amount, currency, reference, e
            )),
        },
    }
}

/// IP geolocation
pub trait GeoResolver: Send + Sync {
    /// ISO alpha-2 country of `ip`, if known
    fn resolve_country(&self, ip: &IpAddr) -> Option<String>;
}

/// Customer and merchant lookup
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Customer by ID
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>>;

    /// Customer by email (case-insensitive)
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>>;

    /// Merchant by ID
    async fn get_merchant(&self, id: Uuid) -> Result<Option<Merchant>>;
}

/// Value with an optimistic-concurrency version
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// Stored value
    pub value: T,
    /// Version, incremented on every write
    pub version: u64,
}

/// Versioned transaction storage
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Load a transaction with its current version
    async fn load(&self, id: Uuid) -> Result<Option<Versioned<StoredTransaction>>>;

    /// Write `record` if the stored version still equals `expected_version`.
    ///
    /// Returns the new version, or `Error::PersistenceConflict` when another
    /// writer got there first.
    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected_version: u64,
        record: StoredTransaction,
    ) -> Result<u64>;
}
