use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use scoring_core::{Action, ComplianceStatus, ComplianceSummary, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceCheck {
    Pci,
    Aml,
    Kyc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskFactor {
    pub factor_type: String,
    pub weight: f64,
    pub score: f64,
    pub description: String,
}

/// Outcome of a single PCI, AML or KYC check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckOutcome {
    pub check: ComplianceCheck,
    pub is_compliant: bool,
    pub risk: f64, // 0.0-1.0
    pub reasons: Vec<String>,
    pub actions: Vec<Action>,
    pub factors: Vec<RiskFactor>,
}

impl CheckOutcome {
    pub fn new(check: ComplianceCheck) -> Self {
        Self {
            check,
            is_compliant: true,
            risk: 0.0,
            reasons: Vec::new(),
            actions: Vec::new(),
            factors: Vec::new(),
        }
    }

    pub fn reason(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    pub fn action(&mut self, action: Action) {
        scoring_core::push_unique(&mut self.actions, action);
    }

    pub fn requires(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

/// Aggregated compliance result for a transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceAssessment {
    pub transaction_id: Uuid,
    pub is_compliant: bool,
    pub risk: f64,
    pub status: ComplianceStatus,
    pub level: RiskLevel,
    pub pci: CheckOutcome,
    pub aml: CheckOutcome,
    pub kyc: CheckOutcome,
    pub actions: Vec<Action>,
    pub reasons: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl ComplianceAssessment {
    pub fn summary(&self) -> ComplianceSummary {
        ComplianceSummary {
            risk: self.risk,
            status: self.status,
            is_compliant: self.is_compliant,
            pci_compliant: self.pci.is_compliant,
            aml_cleared: self.aml.is_compliant,
            kyc_verified: self.kyc.is_compliant,
        }
    }

    pub fn requires(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Individual,
    Organization,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SanctionsEntry {
    pub name: String,
    pub country: String,
    pub list: String, // e.g. "OFAC SDN List"
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PepEntry {
    pub name: String,
    pub position: String,
    pub country: String,
}

/// Snapshot of the sanctions and PEP lists
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceLists {
    pub sanctions: Vec<SanctionsEntry>,
    pub peps: Vec<PepEntry>,
}

impl ReferenceLists {
    pub fn is_empty(&self) -> bool {
        self.sanctions.is_empty() && self.peps.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreeningHits {
    pub sanctions: Vec<SanctionsEntry>,
    pub peps: Vec<PepEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum KycLevel {
    None = 0,
    Basic = 1,
    Standard = 2,
    Enhanced = 3,
}

impl KycLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Merchant-level compliance result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MerchantComplianceReport {
    pub merchant_id: Uuid,
    pub is_compliant: bool,
    pub requirements: BTreeMap<String, bool>,
    pub actions: Vec<Action>,
    pub high_risk_industry: bool,
    pub pci_level: u8,
    pub pci_requirements: BTreeMap<String, bool>,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlaggedTransaction {
    pub transaction_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub risk: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuspiciousPattern {
    PossibleStructuring {
        email: String,
        transaction_count: usize,
        total_value: Decimal,
        time_span_hours: f64,
    },
}
