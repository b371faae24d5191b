//! Know-your-customer transaction check and customer verification

use crate::types::{CheckOutcome, ComplianceCheck, KycLevel, RiskFactor};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use scoring_core::config::KycConfig;
use scoring_core::{
    clamp_unit, normalize_amount, Action, CurrencyConverter, Customer, EngineConfig,
    TransactionSnapshot,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Value-tiered identity verification requirements
pub struct KycCheck {
    config: KycConfig,
    reference_currency: String,
    converter: Arc<dyn CurrencyConverter>,
}

impl std::fmt::Debug for KycCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KycCheck")
            .field("config", &self.config)
            .field("reference_currency", &self.reference_currency)
            .finish()
    }
}

impl KycCheck {
    /// Create new KYC check
    pub fn new(config: &EngineConfig, converter: Arc<dyn CurrencyConverter>) -> Self {
        Self {
            config: config.compliance.kyc.clone(),
            reference_currency: config.reference_currency.clone(),
            converter,
        }
    }

    /// KYC level a transaction of `amount` (reference currency) requires
    pub fn required_level(&self, amount: Decimal) -> KycLevel {
        if amount >= self.config.high_value {
            KycLevel::Enhanced
        } else if amount >= self.config.medium_value {
            KycLevel::Standard
        } else {
            KycLevel::Basic
        }
    }

    pub fn check(&self, snapshot: &TransactionSnapshot, customer: Option<&Customer>) -> CheckOutcome {
        let mut outcome = CheckOutcome::new(ComplianceCheck::Kyc);

        let normalized = normalize_amount(
            self.converter.as_ref(),
            snapshot.amount,
            &snapshot.currency,
            &self.reference_currency,
        );
        if let Some(caveat) = normalized.caveat {
            outcome.reason(caveat);
        }
        let amount = normalized.amount;
        let high_value = amount >= self.config.high_value;

        let mut risk = 0.0;

        match customer {
            None if high_value => {
                outcome.reason("No customer record found for high-value transaction");
                outcome.action(Action::CollectCustomerInformation);
                outcome.is_compliant = false;
                outcome.risk = 0.9;
                push_factor(&mut outcome, "Missing Customer", 0.9);
                return outcome;
            }
            None => {
                risk += 0.3;
                outcome.reason("No customer record found");
                outcome.action(Action::CreateCustomerRecord);
                push_factor(&mut outcome, "Missing Customer", 0.3);
            }
            Some(customer) => {
                if !customer.kyc_verified {
                    if high_value {
                        outcome.reason("Customer not KYC verified for high-value transaction");
                        outcome.action(Action::CompleteCustomerVerification);
                        outcome.is_compliant = false;
                        outcome.risk = 0.8;
                        push_factor(&mut outcome, "Unverified Customer", 0.8);
                        return outcome;
                    }

                    risk += 0.5;
                    outcome.reason("Customer not KYC verified");
                    outcome.action(Action::InitiateCustomerVerification);
                    push_factor(&mut outcome, "Unverified Customer", 0.5);
                }

                let required = self.required_level(amount).as_u8();
                if customer.kyc_level < required {
                    let gap = f64::from(required - customer.kyc_level);
                    let gap_risk = self.config.level_gap_risk * gap;
                    risk += gap_risk;
                    outcome.reason(format!(
                        "Customer KYC level {} insufficient for transaction (requires level {})",
                        customer.kyc_level, required
                    ));
                    outcome.action(Action::UpgradeKycLevel);
                    push_factor(&mut outcome, "KYC Level Gap", gap_risk);
                }
            }
        }

        outcome.risk = clamp_unit(risk);
        // Compliance follows the action list, not the risk score
        outcome.is_compliant = !outcome.requires(Action::CompleteCustomerVerification);
        outcome
    }
}

impl KycCheck {
    /// Verify a customer's identity up to `level`.
    ///
    /// Levels are cumulative: basic needs an email on file, standard adds
    /// an identity document and enhanced adds a proof of address. The first
    /// failing step stops verification. On success the customer is marked
    /// verified at the requested level.
    pub fn verify_customer(
        &self,
        customer: &mut Customer,
        level: KycLevel,
        data: &VerificationData,
    ) -> KycVerification {
        self.verify_customer_at(customer, level, data, Utc::now())
    }

    fn verify_customer_at(
        &self,
        customer: &mut Customer,
        level: KycLevel,
        data: &VerificationData,
        now: DateTime<Utc>,
    ) -> KycVerification {
        let mut result = KycVerification::new(level);

        if level == KycLevel::None {
            result.error = Some("No verification level requested".to_string());
            return result;
        }

        let email_verified = !customer.email.trim().is_empty();
        result.email_verified = Some(email_verified);
        if !email_verified {
            result.error = Some("Email address required for basic verification".to_string());
            return result;
        }

        if level >= KycLevel::Standard {
            let Some(document) = &data.id_document else {
                result.id_verified = Some(false);
                result.error = Some("ID document required for standard verification".to_string());
                return result;
            };
            result.document_type = document.document_type.clone();
            result.document_country = document.country.clone();

            let verified = document.verify(now);
            result.id_verified = Some(verified.is_ok());
            if let Err(e) = verified {
                result.error = Some(e);
                return result;
            }
        }

        if level >= KycLevel::Enhanced {
            let Some(document) = &data.address_document else {
                result.address_verified = Some(false);
                result.error = Some("Address document required for enhanced verification".to_string());
                return result;
            };

            let verified = document.verify(customer);
            result.address_verified = Some(verified.is_ok());
            if let Err(e) = verified {
                result.error = Some(e);
                return result;
            }
        }

        result.success = true;
        customer.kyc_verified = true;
        customer.kyc_level = level.as_u8();
        customer.verified_at = Some(now);
        result.verified_at = Some(now);

        info!("Customer {} verified at KYC level {}", customer.id, level.as_u8());
        result
    }
}

/// Documents submitted for a verification
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VerificationData {
    /// Passport, ID card or driving licence
    #[serde(default)]
    pub id_document: Option<IdentityDocument>,
    /// Utility bill, bank statement or similar
    #[serde(default)]
    pub address_document: Option<AddressDocument>,
}

/// Identity document fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IdentityDocument {
    #[serde(rename = "type", default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// ISO date or RFC 3339 timestamp
    #[serde(default)]
    pub expiry_date: Option<String>,
    /// Reference to the uploaded scan
    #[serde(default)]
    pub image: Option<String>,
}

impl IdentityDocument {
    fn verify(&self, now: DateTime<Utc>) -> std::result::Result<(), String> {
        let complete = [
            &self.document_type,
            &self.number,
            &self.country,
            &self.expiry_date,
            &self.image,
        ]
        .into_iter()
        .all(present);
        if !complete {
            return Err("ID document is missing required fields".to_string());
        }

        let expiry = self
            .expiry_date
            .as_deref()
            .and_then(parse_expiry)
            .ok_or_else(|| "Invalid expiry date format".to_string())?;
        if expiry <= now {
            return Err("Document expired".to_string());
        }
        Ok(())
    }
}

/// Proof-of-address document fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AddressDocument {
    #[serde(rename = "type", default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub address_line: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl AddressDocument {
    fn verify(&self, customer: &Customer) -> std::result::Result<(), String> {
        let complete = [
            &self.document_type,
            &self.image,
            &self.address_line,
            &self.city,
            &self.country,
        ]
        .into_iter()
        .all(present);
        if !complete {
            return Err("Address document is missing required fields".to_string());
        }

        // Either address may be the abbreviated one
        let on_file = customer.address.as_deref().unwrap_or_default().trim().to_lowercase();
        let on_document = self.address_line.as_deref().unwrap_or_default().trim().to_lowercase();
        if !on_file.contains(&on_document) && !on_document.contains(&on_file) {
            warn!("Address document mismatch for customer {}", customer.id);
            return Err("Address on document doesn't match customer record".to_string());
        }
        Ok(())
    }
}

/// Outcome of a customer verification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KycVerification {
    pub success: bool,
    pub level: KycLevel,
    pub email_verified: Option<bool>,
    pub id_verified: Option<bool>,
    pub address_verified: Option<bool>,
    pub document_type: Option<String>,
    pub document_country: Option<String>,
    /// Why verification stopped
    pub error: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl KycVerification {
    fn new(level: KycLevel) -> Self {
        Self {
            success: false,
            level,
            email_verified: None,
            id_verified: None,
            address_verified: None,
            document_type: None,
            document_country: None,
            error: None,
            verified_at: None,
        }
    }
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

fn push_factor(outcome: &mut CheckOutcome, factor_type: &str, score: f64) {
    outcome.factors.push(RiskFactor {
        factor_type: factor_type.to_string(),
        weight: 1.0,
        score,
        description: factor_type.to_lowercase(),
    });
}
