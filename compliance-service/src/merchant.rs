//! Merchant-level compliance (not per transaction)

use crate::types::MerchantComplianceReport;
use chrono::{Duration as ChronoDuration, Utc};
use scoring_core::config::MerchantComplianceConfig;
use scoring_core::{
    Action, EngineConfig, HistoryKey, HistoryQuery, Merchant, TransactionHistory,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const PCI_LEVEL_1: u8 = 1; // >6M transactions annually
pub const PCI_LEVEL_2: u8 = 2; // 1M-6M
pub const PCI_LEVEL_3: u8 = 3; // 20K-1M
pub const PCI_LEVEL_4: u8 = 4; // <20K

pub struct MerchantCompliance {
    config: MerchantComplianceConfig,
    history: Arc<dyn TransactionHistory>,
    history_timeout: Duration,
}

impl std::fmt::Debug for MerchantCompliance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerchantCompliance")
            .field("config", &self.config)
            .finish()
    }
}

impl MerchantCompliance {
    pub fn new(config: &EngineConfig, history: Arc<dyn TransactionHistory>) -> Self {
        Self {
            config: config.compliance.merchant.clone(),
            history,
            history_timeout: config.timeouts.history_query(),
        }
    }

    pub async fn evaluate(&self, merchant: &Merchant) -> MerchantComplianceReport {
        let settings = &merchant.settings;
        let mut requirements = BTreeMap::new();
        let mut actions = Vec::new();

        let flags = [
            ("pci_dss", settings.pci_compliance_complete, Action::CompletePciSelfAssessment),
            ("aml_program", settings.aml_program_accepted, Action::AcceptAmlProgram),
            ("kyc_procedures", settings.kyc_procedures_accepted, Action::AcceptKycProcedures),
            ("data_protection", settings.data_protection_accepted, Action::AcceptDataProtection),
            ("terms_accepted", settings.terms_accepted, Action::AcceptTermsOfService),
        ];

        for (name, satisfied, action) in flags {
            requirements.insert(name.to_string(), satisfied);
            if !satisfied {
                actions.push(action);
            }
        }

        let high_risk_industry = self.is_high_risk_industry(merchant);
        if high_risk_industry {
            let edd = settings.enhanced_due_diligence_complete;
            requirements.insert("enhanced_due_diligence".to_string(), edd);
            if !edd {
                actions.push(Action::CompleteEnhancedDueDiligence);
            }
        }

        let is_compliant = requirements.values().all(|ok| *ok);
        let pci_level = self.pci_level(merchant).await;

        if is_compliant {
            info!("Merchant {} compliance check passed", merchant.id);
        } else {
            warn!(
                "Merchant {} compliance check failed: {} action(s) required",
                merchant.id,
                actions.len()
            );
        }

        MerchantComplianceReport {
            merchant_id: merchant.id,
            is_compliant,
            requirements,
            actions,
            high_risk_industry,
            pci_level,
            pci_requirements: pci_requirements(pci_level),
            evaluated_at: Utc::now(),
        }
    }

    fn is_high_risk_industry(&self, merchant: &Merchant) -> bool {
        merchant.industry.as_deref().is_some_and(|industry| {
            let industry = industry.trim().to_lowercase();
            self.config.high_risk_industries.contains(&industry)
        })
    }

    /// PCI-DSS level from the merchant's transaction count over 365 days
    pub async fn pci_level(&self, merchant: &Merchant) -> u8 {
        let query = HistoryQuery::new(HistoryKey::Merchant(merchant.id))
            .since(Utc::now() - ChronoDuration::days(365));

        match tokio::time::timeout(self.history_timeout, self.history.count(&query)).await {
            Ok(Ok(count)) => pci_level_for(count),
            Ok(Err(e)) => {
                warn!("PCI level lookup failed for merchant {}: {}", merchant.id, e);
                PCI_LEVEL_4
            }
            Err(_) => {
                warn!("PCI level lookup timed out for merchant {}", merchant.id);
                PCI_LEVEL_4
            }
        }
    }
}

pub fn pci_level_for(annual_count: usize) -> u8 {
    if annual_count > 6_000_000 {
        PCI_LEVEL_1
    } else if annual_count > 1_000_000 {
        PCI_LEVEL_2
    } else if annual_count > 20_000 {
        PCI_LEVEL_3
    } else {
        PCI_LEVEL_4
    }
}

pub fn pci_requirements(level: u8) -> BTreeMap<String, bool> {
    let mut requirements = BTreeMap::new();
    requirements.insert("annual_assessment".to_string(), true);
    requirements.insert("quarterly_scan".to_string(), level <= PCI_LEVEL_2);

    let level_one = level == PCI_LEVEL_1;
    requirements.insert("external_audit".to_string(), level_one);
    requirements.insert("network_scan".to_string(), level_one);
    requirements.insert("penetration_testing".to_string(), level_one);
    requirements
}
