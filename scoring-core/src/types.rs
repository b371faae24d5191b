//! Core types shared by the fraud and compliance engines

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Payment instrument descriptor (never carries raw card numbers)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentInstrument {
    /// Card identified by BIN and last four digits
    Card {
        /// First six digits
        bin: String,
        /// Last four digits
        last4: String,
    },
    /// Bank transfer
    BankTransfer {
        /// Bank or sort code
        bank_code: String,
        /// Last four digits of the account
        account_last4: String,
    },
    /// Mobile money wallet
    MobileMoney {
        /// Wallet provider
        provider: String,
        /// Last four digits of the phone number
        phone_last4: String,
    },
}

impl PaymentInstrument {
    /// Instrument kind label
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentInstrument::Card { .. } => "card",
            PaymentInstrument::BankTransfer { .. } => "bank_transfer",
            PaymentInstrument::MobileMoney { .. } => "mobile_money",
        }
    }

    /// Stable identifier used to correlate reuse of the same instrument
    pub fn fingerprint(&self) -> String {
        match self {
            PaymentInstrument::Card { bin, last4 } => format!("{}...{}", bin, last4),
            PaymentInstrument::BankTransfer {
                bank_code,
                account_last4,
            } => format!("bank:{}:{}", bank_code, account_last4),
            PaymentInstrument::MobileMoney {
                provider,
                phone_last4,
            } => format!("mobile:{}:{}", provider.to_lowercase(), phone_last4),
        }
    }

    /// Card BIN, if this is a card
    pub fn bin(&self) -> Option<&str> {
        match self {
            PaymentInstrument::Card { bin, .. } => Some(bin),
            _ => None,
        }
    }
}

/// One predictive-model score kept in transaction metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    /// When the score was produced
    pub timestamp: DateTime<Utc>,
    /// Model probability in [0, 1]
    pub score: f64,
}

/// Transaction metadata: typed well-known keys plus a free-form remainder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Originating IP address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Device fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<String>,

    /// Browser user agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Browser family
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,

    /// Operating system
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    /// Declared country (ISO alpha-2)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Billing country (ISO alpha-2)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_country: Option<String>,

    /// Payer name for guest checkouts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,

    /// Tokenized card reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_token: Option<String>,

    /// Bounded history of model scores, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_scores: Vec<ModelScore>,

    /// Anything else the caller attached
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Lifecycle status of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting processing
    Pending,
    /// Settled successfully
    Success,
    /// Declined or errored
    Failed,
    /// Cancelled by payer or merchant
    Cancelled,
    /// Fully refunded
    Refunded,
    /// Partially refunded
    PartiallyRefunded,
    /// Held for review
    Flagged,
}

/// Immutable view of a transaction at evaluation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    /// Transaction ID
    pub id: Uuid,

    /// Merchant-facing reference
    pub reference: String,

    /// Amount in `currency`
    pub amount: Decimal,

    /// ISO 4217 code
    pub currency: String,

    /// Payment instrument, if known
    #[serde(default)]
    pub instrument: Option<PaymentInstrument>,

    /// Processing provider (e.g. "stripe")
    #[serde(default)]
    pub payment_provider: Option<String>,

    /// Customer reference (absent for guests)
    #[serde(default)]
    pub customer_id: Option<Uuid>,

    /// Merchant reference
    pub merchant_id: Uuid,

    /// Payer email
    #[serde(default)]
    pub email: Option<String>,

    /// Payment status
    pub status: TransactionStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Metadata
    #[serde(default)]
    pub metadata: TransactionMetadata,
}

impl TransactionSnapshot {
    /// Create a pending snapshot with a fresh ID
    pub fn new(merchant_id: Uuid, amount: Decimal, currency: &str) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            reference: format!("TX-{}", id.simple()),
            amount,
            currency: currency.to_uppercase(),
            instrument: None,
            payment_provider: None,
            customer_id: None,
            merchant_id,
            email: None,
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
            metadata: TransactionMetadata::default(),
        }
    }

    /// Attach a customer
    pub fn with_customer(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    /// Attach a payer email
    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    /// Attach a payment instrument
    pub fn with_instrument(mut self, instrument: PaymentInstrument) -> Self {
        self.instrument = Some(instrument);
        self
    }

    /// Attach a payment provider
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.payment_provider = Some(provider.to_string());
        self
    }

    /// Override the creation time
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Replace metadata
    pub fn with_metadata(mut self, metadata: TransactionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Payer email, lowercased
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
    }
}

/// Resolved customer entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer ID
    pub id: Uuid,
    /// Email address
    pub email: String,
    /// Given name
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name
    #[serde(default)]
    pub last_name: Option<String>,
    /// Country of residence (ISO alpha-2)
    #[serde(default)]
    pub country: Option<String>,
    /// Street address on file
    #[serde(default)]
    pub address: Option<String>,
    /// Account creation time
    pub created_at: DateTime<Utc>,
    /// Identity verified
    #[serde(default)]
    pub kyc_verified: bool,
    /// Verification level reached (0 = none, 1 basic, 2 standard, 3 enhanced)
    #[serde(default)]
    pub kyc_level: u8,
    /// Time of the last successful verification
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    /// Opted out of fraud scoring
    #[serde(default)]
    pub whitelisted: bool,
}

impl Customer {
    /// New unverified customer created now
    pub fn new(email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: None,
            last_name: None,
            country: None,
            address: None,
            created_at: Utc::now(),
            kyc_verified: false,
            kyc_level: 0,
            verified_at: None,
            whitelisted: false,
        }
    }

    /// "first last", or None when no name part is known
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Merchant compliance and scoring settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantSettings {
    /// PCI-DSS self-assessment completed
    pub pci_compliance_complete: bool,
    /// AML program accepted
    pub aml_program_accepted: bool,
    /// KYC procedures accepted
    pub kyc_procedures_accepted: bool,
    /// Data-protection agreement accepted
    pub data_protection_accepted: bool,
    /// Terms of service accepted
    pub terms_accepted: bool,
    /// Enhanced due diligence completed (high-risk industries)
    pub enhanced_due_diligence_complete: bool,
    /// Customer emails exempt from fraud scoring
    pub vip_customers: Vec<String>,
}

/// Merchant entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    /// Merchant ID
    pub id: Uuid,
    /// Business name
    pub name: String,
    /// Industry label
    #[serde(default)]
    pub industry: Option<String>,
    /// Settings
    #[serde(default)]
    pub settings: MerchantSettings,
}

impl Merchant {
    /// New merchant with default settings
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            industry: None,
            settings: MerchantSettings::default(),
        }
    }
}

/// Per-request evaluation context (never persisted)
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationContext {
    /// Resolved customer
    pub customer: Option<Customer>,
    /// Merchant
    pub merchant: Merchant,
    /// Caller-supplied IP address
    pub ip_address: Option<String>,
    /// Caller-supplied device fingerprint
    pub device_fingerprint: Option<String>,
    /// Customer or merchant opted out of fraud scoring
    pub whitelisted: bool,
}

impl EvaluationContext {
    /// Context with only a merchant
    pub fn new(merchant: Merchant) -> Self {
        Self {
            customer: None,
            merchant,
            ip_address: None,
            device_fingerprint: None,
            whitelisted: false,
        }
    }

    /// Attach a customer
    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customer = Some(customer);
        self
    }

    /// Attach an IP address
    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip_address = Some(ip.to_string());
        self
    }

    /// Attach a device fingerprint
    pub fn with_device(mut self, fingerprint: &str) -> Self {
        self.device_fingerprint = Some(fingerprint.to_string());
        self
    }
}

/// Output of one signal evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    /// Evaluator name
    pub evaluator_name: String,
    /// Dimension-local risk estimate in [0, 1]
    pub contribution: f64,
    /// Human-readable reasons, in trigger order
    pub reasons: Vec<String>,
    /// Evaluator-native output (model probability)
    pub raw_score: Option<f64>,
    /// Produced by a fallback path (timeout or failure)
    pub degraded: bool,
}

impl SignalResult {
    /// Build a result, clamping the contribution into [0, 1]
    pub fn new(evaluator_name: &str, contribution: f64, reasons: Vec<String>) -> Self {
        Self {
            evaluator_name: evaluator_name.to_string(),
            contribution: clamp_unit(contribution),
            reasons,
            raw_score: None,
            degraded: false,
        }
    }

    /// Nothing to evaluate
    pub fn none(evaluator_name: &str) -> Self {
        Self::new(evaluator_name, 0.0, Vec::new())
    }

    /// Documented fallback contribution
    pub fn fallback(evaluator_name: &str, contribution: f64, reason: String) -> Self {
        let mut result = Self::new(evaluator_name, contribution, vec![reason]);
        result.degraded = true;
        result
    }

    /// Attach the evaluator-native score
    pub fn with_raw_score(mut self, raw: f64) -> Self {
        self.raw_score = Some(raw);
        self
    }
}

/// Additive accumulator for sub-check contributions
#[derive(Debug, Default)]
pub struct Contributions {
    total: f64,
    reasons: Vec<String>,
}

impl Contributions {
    /// Empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sub-check contribution with its reason
    pub fn add(&mut self, amount: f64, reason: impl Into<String>) {
        if amount.is_finite() && amount > 0.0 {
            self.total += amount;
        }
        self.reasons.push(reason.into());
    }

    /// Add a reason without contribution
    pub fn note(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    /// Running total (unclamped)
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Finish into a clamped signal result
    pub fn finish(self, evaluator_name: &str) -> SignalResult {
        SignalResult::new(evaluator_name, self.total, self.reasons)
    }
}

/// Clamp into [0, 1]; NaN maps to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Categorical risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
    /// Blocked by compliance
    Blocked,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// Persisted compliance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceStatus {
    /// Not evaluated yet
    #[default]
    Pending,
    /// Compliant
    Approved,
    /// Rejected
    Rejected,
    /// Needs manual review
    Review,
}

impl ComplianceStatus {
    /// Approved and rejected are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComplianceStatus::Approved | ComplianceStatus::Rejected)
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComplianceStatus::Pending => "pending",
            ComplianceStatus::Approved => "approved",
            ComplianceStatus::Rejected => "rejected",
            ComplianceStatus::Review => "review",
        };
        f.write_str(s)
    }
}

/// Required action token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Route to a human reviewer
    ManualReview,
    /// Block the payment
    BlockTransaction,
    /// File a regulatory report
    FileReport,
    /// Enhanced due diligence on the payer
    EnhancedDueDiligence,
    /// Keep the payer under enhanced monitoring
    EnhancedMonitoring,
    /// Assess jurisdiction risk
    CountryRiskAssessment,
    /// PCI-DSS handling must be fixed
    PciComplianceRequired,
    /// Collect payer identity before proceeding
    CollectCustomerInformation,
    /// Create a customer record
    CreateCustomerRecord,
    /// Verification required before proceeding
    CompleteCustomerVerification,
    /// Start customer verification
    InitiateCustomerVerification,
    /// Raise the customer's KYC level
    UpgradeKycLevel,
    /// Merchant: complete PCI self-assessment
    CompletePciSelfAssessment,
    /// Merchant: accept the AML program
    AcceptAmlProgram,
    /// Merchant: accept KYC procedures
    AcceptKycProcedures,
    /// Merchant: accept the data-protection agreement
    AcceptDataProtection,
    /// Merchant: accept the terms of service
    AcceptTermsOfService,
    /// Merchant: complete enhanced due diligence
    CompleteEnhancedDueDiligence,
}

impl Action {
    /// Wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ManualReview => "manual_review",
            Action::BlockTransaction => "block_transaction",
            Action::FileReport => "file_report",
            Action::EnhancedDueDiligence => "enhanced_due_diligence",
            Action::EnhancedMonitoring => "enhanced_monitoring",
            Action::CountryRiskAssessment => "country_risk_assessment",
            Action::PciComplianceRequired => "pci_compliance_required",
            Action::CollectCustomerInformation => "collect_customer_information",
            Action::CreateCustomerRecord => "create_customer_record",
            Action::CompleteCustomerVerification => "complete_customer_verification",
            Action::InitiateCustomerVerification => "initiate_customer_verification",
            Action::UpgradeKycLevel => "upgrade_kyc_level",
            Action::CompletePciSelfAssessment => "complete_pci_self_assessment",
            Action::AcceptAmlProgram => "accept_aml_program",
            Action::AcceptKycProcedures => "accept_kyc_procedures",
            Action::AcceptDataProtection => "accept_data_protection",
            Action::AcceptTermsOfService => "accept_terms_of_service",
            Action::CompleteEnhancedDueDiligence => "complete_enhanced_due_diligence",
        }
    }

    /// Order-preserving union without duplicates
    pub fn union<I>(groups: I) -> Vec<Action>
    where
        I: IntoIterator,
        I::Item: IntoIterator<Item = Action>,
    {
        let mut out = Vec::new();
        for group in groups {
            for action in group {
                push_unique(&mut out, action);
            }
        }
        out
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push `item` unless already present
pub fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Which sub-engines an evaluation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// Fraud evaluators only
    Fraud,
    /// Compliance checks only
    Compliance,
    /// Both, blended
    #[default]
    Full,
}

/// Scale of `RiskDecision::overall_score`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreScale {
    /// Fraud points, 0-100
    Fraud,
    /// Compliance risk, 0.0-1.0
    Compliance,
    /// Weighted blend of both, 0.0-1.0
    Blended,
}

/// Fraud sub-engine outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudSummary {
    /// Score, 0-100
    pub score: f64,
    /// Level
    pub level: RiskLevel,
    /// Blacklisted IP short-circuit
    pub short_circuited: bool,
}

/// Compliance sub-engine outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    /// Overall risk, 0.0-1.0
    pub risk: f64,
    /// Status from the compliance aggregator
    pub status: ComplianceStatus,
    /// PCI, AML and KYC all passed
    pub is_compliant: bool,
    /// PCI check passed
    pub pci_compliant: bool,
    /// AML check passed
    pub aml_cleared: bool,
    /// KYC check passed
    pub kyc_verified: bool,
}

/// Aggregated outcome of one evaluation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    /// Transaction evaluated
    pub transaction_id: Uuid,
    /// Sub-engines that ran
    pub mode: EvaluationMode,
    /// Headline score, on `scale`
    pub overall_score: f64,
    /// Scale of `overall_score`
    pub scale: ScoreScale,
    /// Combined level
    pub level: RiskLevel,
    /// Compliance status to persist (None leaves the stored status untouched)
    pub status: Option<ComplianceStatus>,
    /// Fraud outcome
    pub fraud: Option<FraudSummary>,
    /// Compliance outcome
    pub compliance: Option<ComplianceSummary>,
    /// Required actions, de-duplicated, in derivation order
    pub actions: Vec<Action>,
    /// Flattened reasons from all triggered evaluators
    pub reasons: Vec<String>,
    /// Predictive-model probability, when the model ran
    pub model_score: Option<f64>,
    /// Fallback decision after the request budget ran out
    pub conservative: bool,
    /// Evaluation time
    pub evaluated_at: DateTime<Utc>,
}

impl RiskDecision {
    /// Whether `action` is required
    pub fn requires(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

/// Admin-facing risk flags blob: `{level, factors[], score, analyzed_at}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFlags {
    /// Level
    pub level: RiskLevel,
    /// Triggered reasons
    pub factors: Vec<String>,
    /// Score on `scale`
    pub score: f64,
    /// Required actions
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Scale of `score`
    pub scale: ScoreScale,
    /// Evaluation time
    pub analyzed_at: DateTime<Utc>,
}

impl From<&RiskDecision> for RiskFlags {
    fn from(decision: &RiskDecision) -> Self {
        Self {
            level: decision.level,
            factors: decision.reasons.clone(),
            score: decision.overall_score,
            actions: decision.actions.clone(),
            scale: decision.scale,
            analyzed_at: decision.evaluated_at,
        }
    }
}

/// Persisted risk fields on a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFields {
    /// Headline score of the last decision
    pub risk_score: f64,
    /// Compliance status
    pub compliance_status: ComplianceStatus,
    /// PCI check passed
    pub pci_compliant: bool,
    /// AML check passed
    pub aml_cleared: bool,
    /// KYC check passed
    pub kyc_verified: bool,
    /// Admin-facing flags blob
    pub risk_flags: Option<RiskFlags>,
    /// Last applied decision
    pub decision: Option<RiskDecision>,
}

impl Default for RiskFields {
    fn default() -> Self {
        Self {
            risk_score: 0.0,
            compliance_status: ComplianceStatus::Pending,
            pci_compliant: true,
            aml_cleared: false,
            kyc_verified: false,
            risk_flags: None,
            decision: None,
        }
    }
}

impl RiskFields {
    /// Overwrite every field from `decision` in one step
    pub fn apply(&mut self, decision: &RiskDecision) {
        self.risk_score = decision.overall_score;
        self.risk_flags = Some(RiskFlags::from(decision));

        if let Some(status) = decision.status {
            self.compliance_status = status;
        }
        if let Some(compliance) = &decision.compliance {
            self.pci_compliant = compliance.pci_compliant;
            self.aml_cleared = compliance.aml_cleared;
            self.kyc_verified = compliance.kyc_verified;
        }

        self.decision = Some(decision.clone());
    }

    /// Previously stored decision, rebuilt from the flags blob if needed
    pub fn stored_decision(&self, transaction_id: Uuid) -> Option<RiskDecision> {
        if let Some(decision) = &self.decision {
            return Some(decision.clone());
        }

        let flags = self.risk_flags.as_ref()?;
        Some(RiskDecision {
            transaction_id,
            mode: EvaluationMode::Full,
            overall_score: flags.score,
            scale: flags.scale,
            level: flags.level,
            status: Some(self.compliance_status),
            fraud: None,
            compliance: None,
            actions: flags.actions.clone(),
            reasons: flags.factors.clone(),
            model_score: None,
            conservative: false,
            evaluated_at: flags.analyzed_at,
        })
    }
}

/// Transaction row as held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTransaction {
    /// Current snapshot
    pub snapshot: TransactionSnapshot,
    /// Risk fields
    pub risk: RiskFields,
}

impl StoredTransaction {
    /// New row with default risk fields
    pub fn new(snapshot: TransactionSnapshot) -> Self {
        Self {
            snapshot,
            risk: RiskFields::default(),
        }
    }
}
