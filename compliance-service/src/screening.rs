use crate::aml::AmlCheck;
use crate::error::Result;
use crate::kyc::KycCheck;
use crate::merchant::MerchantCompliance;
use crate::pci::PciCheck;
use crate::sanctions::ReferenceListCache;
use crate::types::{ComplianceAssessment, MerchantComplianceReport};
use chrono::Utc;
use scoring_core::config::{ComplianceThresholds, ComplianceWeights};
use scoring_core::{
    clamp_unit, Action, ComplianceStatus, CurrencyConverter, EngineConfig, EvaluationContext,
    Merchant, RiskLevel, TransactionHistory, TransactionSnapshot,
};
use std::sync::Arc;
use tracing::{info, warn};

/// ComplianceScreener runs the PCI, AML and KYC checks and aggregates them
pub struct ComplianceScreener {
    pci: PciCheck,
    aml: AmlCheck,
    kyc: KycCheck,
    merchant: MerchantCompliance,
    weights: ComplianceWeights,
    thresholds: ComplianceThresholds,
}

impl std::fmt::Debug for ComplianceScreener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceScreener")
            .field("weights", &self.weights)
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

impl ComplianceScreener {
    pub fn new(
        config: &EngineConfig,
        history: Arc<dyn TransactionHistory>,
        converter: Arc<dyn CurrencyConverter>,
        lists: Arc<ReferenceListCache>,
    ) -> Result<Self> {
        Ok(Self {
            pci: PciCheck::new(config.compliance.pci.clone())?,
            aml: AmlCheck::new(config, history.clone(), converter.clone(), lists),
            kyc: KycCheck::new(config, converter),
            merchant: MerchantCompliance::new(config, history),
            weights: config.compliance.weights.clone(),
            thresholds: config.compliance.thresholds.clone(),
        })
    }

    /// Screen a transaction for PCI, AML and KYC compliance
    pub async fn evaluate(
        &self,
        snapshot: &TransactionSnapshot,
        context: &EvaluationContext,
    ) -> ComplianceAssessment {
        let pci = self.pci.check(snapshot);
        let kyc = self.kyc.check(snapshot, context.customer.as_ref());
        let aml = self.aml.check(snapshot, context).await;

        let pci_gap = if pci.is_compliant { 0.0 } else { 1.0 };
        let risk = clamp_unit(
            pci_gap * self.weights.pci + aml.risk * self.weights.aml + kyc.risk * self.weights.kyc,
        );
        let is_compliant = pci.is_compliant && aml.is_compliant && kyc.is_compliant;

        let actions = Action::union([
            pci.actions.clone(),
            aml.actions.clone(),
            kyc.actions.clone(),
        ]);

        let mut reasons = Vec::new();
        if !pci.is_compliant {
            reasons.push("PCI-DSS compliance requirements not met".to_string());
        }
        reasons.extend(pci.reasons.iter().cloned());
        reasons.extend(aml.reasons.iter().cloned());
        reasons.extend(kyc.reasons.iter().cloned());

        let status = self.status_for(is_compliant, risk);
        let level = level_for(status, &actions);

        if is_compliant {
            info!(
                "Compliance check passed for transaction {} with risk score {:.3}",
                snapshot.reference, risk
            );
        } else {
            warn!(
                "Compliance check failed for transaction {} with risk score {:.3}: {:?}",
                snapshot.reference, risk, reasons
            );
        }

        ComplianceAssessment {
            transaction_id: snapshot.id,
            is_compliant,
            risk,
            status,
            level,
            pci,
            aml,
            kyc,
            actions,
            reasons,
            evaluated_at: Utc::now(),
        }
    }

    /// Merchant-level compliance
    pub async fn evaluate_merchant(&self, merchant: &Merchant) -> MerchantComplianceReport {
        self.merchant.evaluate(merchant).await
    }

    fn status_for(&self, is_compliant: bool, risk: f64) -> ComplianceStatus {
        if is_compliant {
            ComplianceStatus::Approved
        } else if risk > self.thresholds.critical {
            ComplianceStatus::Rejected
        } else {
            ComplianceStatus::Review
        }
    }
}

/// Categorical level for a compliance status and its actions
pub fn level_for(status: ComplianceStatus, actions: &[Action]) -> RiskLevel {
    if actions.contains(&Action::BlockTransaction) {
        return RiskLevel::Blocked;
    }

    match status {
        ComplianceStatus::Approved => RiskLevel::Low,
        ComplianceStatus::Review | ComplianceStatus::Pending => RiskLevel::Medium,
        ComplianceStatus::Rejected => RiskLevel::High,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanctions::StaticReferenceLists;
    use rust_decimal_macros::dec;
    use scoring_core::memory::{InMemoryHistory, StaticRateConverter};
    use scoring_core::{Customer, Merchant};
    use std::time::Duration;
    use uuid::Uuid;

    fn screener() -> ComplianceScreener {
        let lists = Arc::new(ReferenceListCache::new(
            Arc::new(StaticReferenceLists::default()),
            Duration::from_secs(3600),
        ));
        ComplianceScreener::new(
            &EngineConfig::default(),
            Arc::new(InMemoryHistory::new()),
            Arc::new(StaticRateConverter::new("USD")),
            lists,
        )
        .unwrap()
    }

    fn verified_customer(first: &str, last: &str) -> Customer {
        let mut customer = Customer::new("c@example.com");
        customer.first_name = Some(first.to_string());
        customer.last_name = Some(last.to_string());
        customer.country = Some("US".to_string());
        customer.kyc_verified = true;
        customer.kyc_level = 3;
        customer
    }

    #[tokio::test]
    async fn test_clean_transaction_is_approved() {
        let customer = verified_customer("Jane", "Doe");
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(80), "USD")
            .with_customer(customer.id)
            .with_provider("stripe");
        let ctx = EvaluationContext::new(Merchant::new("Shop")).with_customer(customer);

        let assessment = screener().evaluate(&tx, &ctx).await;
        assert!(assessment.is_compliant);
        assert_eq!(assessment.status, ComplianceStatus::Approved);
        assert_eq!(assessment.level, RiskLevel::Low);
        // 0.07 AML risk weighted at 0.4
        assert!((assessment.risk - 0.028).abs() < 1e-9);
        assert!(assessment.actions.is_empty());
    }

    #[tokio::test]
    async fn test_guest_high_value_needs_review() {
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(15000), "USD").with_provider("stripe");
        let ctx = EvaluationContext::new(Merchant::new("Shop"));

        let assessment = screener().evaluate(&tx, &ctx).await;
        assert!(!assessment.is_compliant);
        assert!(!assessment.kyc.is_compliant);
        assert_eq!(assessment.kyc.risk, 0.9);
        assert_eq!(assessment.status, ComplianceStatus::Review);
        assert!(assessment.requires(Action::CollectCustomerInformation));
    }

    #[tokio::test]
    async fn test_pci_failure_leads_actions() {
        let customer = verified_customer("Jane", "Doe");
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(15000), "USD")
            .with_customer(customer.id)
            .with_provider("unknownpay");
        let ctx = EvaluationContext::new(Merchant::new("Shop")).with_customer(customer);

        let assessment = screener().evaluate(&tx, &ctx).await;
        assert_eq!(assessment.actions[0], Action::PciComplianceRequired);
        assert_eq!(
            assessment.reasons[0],
            "PCI-DSS compliance requirements not met"
        );
        assert!(!assessment.summary().pci_compliant);
    }

    #[tokio::test]
    async fn test_sanctioned_customer_is_blocked() {
        let customer = verified_customer("John", "Smith");
        let tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(10), "USD")
            .with_customer(customer.id)
            .with_provider("stripe");
        let ctx = EvaluationContext::new(Merchant::new("Shop")).with_customer(customer);

        let assessment = screener().evaluate(&tx, &ctx).await;
        assert!(assessment.requires(Action::BlockTransaction));
        assert!(assessment.requires(Action::FileReport));
        assert_eq!(assessment.level, RiskLevel::Blocked);
        assert!(matches!(
            assessment.status,
            ComplianceStatus::Rejected | ComplianceStatus::Review
        ));
        assert!(!assessment.summary().aml_cleared);
    }

    #[tokio::test]
    async fn test_everything_failing_is_rejected() {
        let mut tx = TransactionSnapshot::new(Uuid::new_v4(), dec!(60000), "USD")
            .with_provider("unknownpay");
        tx.metadata.customer_name = Some("Global Terror Org".to_string());
        let ctx = EvaluationContext::new(Merchant::new("Shop"));

        let assessment = screener().evaluate(&tx, &ctx).await;
        // 1.0*0.3 + 1.0*0.4 + 0.9*0.3
        assert!((assessment.risk - 0.97).abs() < 1e-9);
        assert_eq!(assessment.status, ComplianceStatus::Rejected);
        assert_eq!(assessment.level, RiskLevel::Blocked);
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_for(ComplianceStatus::Approved, &[]), RiskLevel::Low);
        assert_eq!(level_for(ComplianceStatus::Review, &[]), RiskLevel::Medium);
        assert_eq!(level_for(ComplianceStatus::Rejected, &[]), RiskLevel::High);
        assert_eq!(
            level_for(ComplianceStatus::Review, &[Action::BlockTransaction]),
            RiskLevel::Blocked
        );
    }
}
