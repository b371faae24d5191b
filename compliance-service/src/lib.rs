//! Compliance screening: PCI-DSS, AML and KYC checks per transaction,
//! merchant-level compliance and AML period reports.

pub mod aml;
pub mod error;
pub mod kyc;
pub mod merchant;
pub mod pci;
pub mod report;
pub mod sanctions;
pub mod screening;
pub mod types;

pub use error::{ComplianceError, Result};
pub use kyc::{AddressDocument, IdentityDocument, KycCheck, KycVerification, VerificationData};
pub use report::{AmlReport, AmlReportGenerator, CurrencyStats, StructuringRule};
pub use sanctions::{ReferenceListCache, ReferenceListSource, StaticReferenceLists};
pub use screening::ComplianceScreener;
pub use types::{
    CheckOutcome, ComplianceAssessment, ComplianceCheck, FlaggedTransaction, KycLevel,
    MerchantComplianceReport, PepEntry, ReferenceLists, RiskFactor, SanctionsEntry,
    SuspiciousPattern,
};
