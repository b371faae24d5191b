//! PCI-DSS transaction check

use crate::error::{ComplianceError, Result};
use crate::types::{CheckOutcome, ComplianceCheck};
use regex::Regex;
use scoring_core::config::PciConfig;
use scoring_core::{Action, TransactionMetadata, TransactionSnapshot};
use serde_json::Value;

const CVV_KEYS: [&str; 4] = ["cvv", "cvc", "cvv2", "security_code"];

/// Provider allow-list plus raw card data detection
#[derive(Debug, Clone)]
pub struct PciCheck {
    config: PciConfig,
    card_number: Regex,
    inline_cvv: Regex,
    cvv_value: Regex,
}

impl PciCheck {
    pub fn new(config: PciConfig) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ComplianceError::InvalidPattern(e.to_string()))
        };

        Ok(Self {
            config,
            card_number: compile(r"\b(?:\d[ -]?){12,18}\d\b")?,
            inline_cvv: compile(r"(?i)\b(?:cvv2?|cvc)\s*[:=]\s*\d{3,4}\b")?,
            cvv_value: compile(r"^\s*\d{3,4}\s*$")?,
        })
    }

    pub fn check(&self, snapshot: &TransactionSnapshot) -> CheckOutcome {
        let mut outcome = CheckOutcome::new(ComplianceCheck::Pci);

        if let Some(provider) = snapshot
            .payment_provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let known = self
                .config
                .compliant_providers
                .iter()
                .any(|p| p.eq_ignore_ascii_case(provider));
            if !known {
                outcome.is_compliant = false;
                outcome.reason(format!(
                    "Payment provider '{}' is not PCI-DSS compliant",
                    provider
                ));
            }
        }

        let metadata = &snapshot.metadata;
        if !self.has_token_marker(metadata) {
            if self.contains_card_number(metadata) {
                outcome.is_compliant = false;
                outcome.reason("Raw card number found in transaction metadata");
            }
            if self.contains_cvv(metadata) {
                outcome.is_compliant = false;
                outcome.reason("Card security code found in transaction metadata");
            }
        }

        if !outcome.is_compliant {
            outcome.risk = 1.0;
            outcome.action(Action::PciComplianceRequired);
        }

        outcome
    }

    fn has_token_marker(&self, metadata: &TransactionMetadata) -> bool {
        let typed = metadata
            .card_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());

        typed
            || self
                .config
                .token_markers
                .iter()
                .any(|marker| metadata.extra.contains_key(marker))
    }

    fn contains_card_number(&self, metadata: &TransactionMetadata) -> bool {
        scanned_text(metadata)
            .iter()
            .any(|text| self.card_number.is_match(text))
    }

    fn contains_cvv(&self, metadata: &TransactionMetadata) -> bool {
        let keyed = metadata.extra.iter().any(|(key, value)| {
            CVV_KEYS.contains(&key.to_lowercase().as_str())
                && scalar_text(value).is_some_and(|v| self.cvv_value.is_match(&v))
        });

        keyed
            || scanned_text(metadata)
                .iter()
                .any(|text| self.inline_cvv.is_match(text))
    }
}

/// Free-text metadata values; model scores and the token itself are skipped
fn scanned_text(metadata: &TransactionMetadata) -> Vec<String> {
    let mut out: Vec<String> = [
        metadata.user_agent.as_deref(),
        metadata.browser.as_deref(),
        metadata.os.as_deref(),
        metadata.customer_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::to_string)
    .collect();

    for value in metadata.extra.values() {
        collect_text(value, &mut out);
    }
    out
}

fn collect_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_text(v, out)),
        other => {
            if let Some(text) = scalar_text(other) {
                out.push(text);
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
