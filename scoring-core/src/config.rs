//! Versioned engine configuration
//!
//! Every weight, threshold, list, timeout and retry bound used by the
//! evaluators and aggregators lives here.

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Configuration schema version understood by this build
pub const CONFIG_VERSION: u32 = 1;

/// Upper bound on the per-request budget
pub const MAX_TOTAL_BUDGET_MS: u64 = 2000;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Schema version
    pub version: u32,

    /// Currency all thresholds are expressed in
    pub reference_currency: String,

    /// Fraud sub-engine
    pub fraud: FraudConfig,

    /// Compliance sub-engine
    pub compliance: ComplianceConfig,

    /// Fraud/compliance blend for full evaluations
    pub blend: BlendConfig,

    /// Time budgets
    pub timeouts: TimeoutConfig,

    /// Decision applier retry policy
    pub persistence: PersistenceConfig,

    /// Sanctions/PEP cache
    pub reference_lists: ReferenceListConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            reference_currency: "USD".to_string(),
            fraud: FraudConfig::default(),
            compliance: ComplianceConfig::default(),
            blend: BlendConfig::default(),
            timeouts: TimeoutConfig::default(),
            persistence: PersistenceConfig::default(),
            reference_lists: ReferenceListConfig::default(),
        }
    }
}

/// Fraud sub-engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    /// Point caps per evaluator
    pub weights: FraudWeights,
    /// Level thresholds on the 0-100 scale
    pub levels: LevelThresholds,
    /// IPs that short-circuit to score 100
    pub ip_blacklist: Vec<String>,
    /// Velocity evaluator
    pub velocity: VelocityConfig,
    /// Location evaluator
    pub location: LocationConfig,
    /// Device evaluator
    pub device: DeviceConfig,
    /// Instrument evaluator
    pub instrument: InstrumentConfig,
    /// Amount evaluator
    pub amount: AmountConfig,
    /// Email evaluator
    pub email: EmailConfig,
    /// Predictive model evaluator
    pub model: ModelConfig,
    /// Contributions used when an evaluator times out
    pub fallbacks: FallbackContributions,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            weights: FraudWeights::default(),
            levels: LevelThresholds::default(),
            ip_blacklist: Vec::new(),
            velocity: VelocityConfig::default(),
            location: LocationConfig::default(),
            device: DeviceConfig::default(),
            instrument: InstrumentConfig::default(),
            amount: AmountConfig::default(),
            email: EmailConfig::default(),
            model: ModelConfig::default(),
            fallbacks: FallbackContributions::default(),
        }
    }
}

/// Fraud weights (points, not percentages)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudWeights {
    /// Velocity
    pub velocity: f64,
    /// Location
    pub location: f64,
    /// Device
    pub device: f64,
    /// Instrument
    pub instrument: f64,
    /// Amount
    pub amount: f64,
    /// Email
    pub email: f64,
    /// Model
    pub model: f64,
}

impl Default for FraudWeights {
    fn default() -> Self {
        Self {
            velocity: 25.0,
            location: 20.0,
            device: 15.0,
            instrument: 20.0,
            amount: 20.0,
            email: 10.0,
            model: 30.0,
        }
    }
}

impl FraudWeights {
    /// Weight for an evaluator name; unknown names weigh nothing
    pub fn for_evaluator(&self, name: &str) -> f64 {
        match name {
            "velocity" => self.velocity,
            "location" => self.location,
            "device" => self.device,
            "instrument" => self.instrument,
            "amount" => self.amount,
            "email" => self.email,
            "model" => self.model,
            _ => 0.0,
        }
    }

    fn all(&self) -> [(&'static str, f64); 7] {
        [
            ("velocity", self.velocity),
            ("location", self.location),
            ("device", self.device),
            ("instrument", self.instrument),
            ("amount", self.amount),
            ("email", self.email),
            ("model", self.model),
        ]
    }
}

/// Fraud level thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    /// Score at or above which the level is medium
    pub medium: f64,
    /// Score at or above which the level is high
    pub high: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            medium: 50.0,
            high: 80.0,
        }
    }
}

/// Velocity evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Transactions per hour that trigger
    pub max_per_hour: usize,
    /// Transactions per day that trigger
    pub max_per_day: usize,
    /// 24h volume (reference currency) that triggers
    pub max_daily_amount: Decimal,
    /// Contribution of each sub-check
    pub step: f64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            max_per_hour: 10,
            max_per_day: 30,
            max_daily_amount: Decimal::new(10_000, 0),
            step: 0.5,
        }
    }
}

/// Location evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// High-risk countries (ISO alpha-2)
    pub high_risk_countries: Vec<String>,
    /// Window for the distinct-IP check, hours
    pub ip_window_hours: i64,
    /// Number of recent transactions sampled
    pub recent_sample: usize,
    /// Travel between countries faster than this is impossible, hours
    pub impossible_travel_hours: f64,
    /// Invalid IP contribution
    pub invalid_ip: f64,
    /// High-risk country contribution
    pub high_risk_country: f64,
    /// New IP contribution
    pub new_ip: f64,
    /// Impossible travel contribution
    pub impossible_travel: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            high_risk_countries: ["NG", "GH", "KE", "ZA", "UG", "TZ", "GN", "CM"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            ip_window_hours: 2,
            recent_sample: 5,
            impossible_travel_hours: 2.0,
            invalid_ip: 0.3,
            high_risk_country: 0.4,
            new_ip: 0.5,
            impossible_travel: 0.8,
        }
    }
}

/// Device evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Other customers on the same device that trigger
    pub max_shared_customers: usize,
    /// Window, hours
    pub window_hours: i64,
    /// Browser anomaly contribution
    pub browser_anomaly: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_shared_customers: 3,
            window_hours: 24,
            browser_anomaly: 0.5,
        }
    }
}

/// Instrument evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// High-risk BIN patterns, `*` matches any digit
    pub high_risk_bins: Vec<String>,
    /// Distinct instruments per hour that trigger
    pub max_per_hour: usize,
    /// Distinct instruments per day that trigger
    pub max_per_day: usize,
    /// High-risk BIN contribution
    pub high_risk_bin: f64,
    /// Instrument churn contribution
    pub churn: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            high_risk_bins: vec![
                "4***11".to_string(),
                "5***22".to_string(),
                "3***33".to_string(),
            ],
            max_per_hour: 2,
            max_per_day: 5,
            high_risk_bin: 0.6,
            churn: 0.7,
        }
    }
}

/// Amount evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountConfig {
    /// Round amounts strictly above this are suspicious
    pub round_amount_floor: Decimal,
    /// Multiple of the customer average that triggers
    pub customer_average_multiple: Decimal,
    /// Multiple of the customer maximum that triggers
    pub customer_max_multiple: Decimal,
    /// Multiple of the merchant average that triggers
    pub merchant_average_multiple: Decimal,
    /// Round amount contribution
    pub round_amount: f64,
    /// Customer average contribution
    pub above_customer_average: f64,
    /// Customer maximum contribution
    pub above_customer_max: f64,
    /// Merchant average contribution
    pub above_merchant_average: f64,
}

impl Default for AmountConfig {
    fn default() -> Self {
        Self {
            round_amount_floor: Decimal::new(1000, 0),
            customer_average_multiple: Decimal::new(5, 0),
            customer_max_multiple: Decimal::new(2, 0),
            merchant_average_multiple: Decimal::new(10, 0),
            round_amount: 0.2,
            above_customer_average: 0.5,
            above_customer_max: 0.3,
            above_merchant_average: 0.3,
        }
    }
}

/// Email evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Disposable email domains
    pub disposable_domains: Vec<String>,
    /// Disposable domain contribution
    pub disposable: f64,
    /// Account younger than an hour
    pub account_under_hour: f64,
    /// Account younger than a day
    pub account_under_day: f64,
    /// Auto-generated local part contribution
    pub generated_local_part: f64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            disposable_domains: [
                "tempmail.com",
                "guerrillamail.com",
                "mailinator.com",
                "yopmail.com",
                "trashmail.com",
                "sharklasers.com",
            ]
            .iter()
            .map(|d| d.to_string())
            .collect(),
            disposable: 0.7,
            account_under_hour: 0.4,
            account_under_day: 0.2,
            generated_local_part: 0.3,
        }
    }
}

/// Predictive model evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Probability at or above which contribution is 1.0
    pub threshold: f64,
    /// Fraction of the threshold at which contribution is 0.5
    pub partial_factor: f64,
    /// Model scores kept in metadata
    pub max_score_history: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            partial_factor: 0.7,
            max_score_history: 20,
        }
    }
}

impl ModelConfig {
    /// Probability at or above which contribution is 0.5
    pub fn partial_threshold(&self) -> f64 {
        self.threshold * self.partial_factor
    }
}

/// Contributions used when a history query times out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackContributions {
    /// Velocity
    pub velocity: f64,
    /// Location
    pub location: f64,
    /// Device
    pub device: f64,
    /// Instrument
    pub instrument: f64,
    /// Amount
    pub amount: f64,
    /// Email
    pub email: f64,
    /// Model
    pub model: f64,
    /// AML frequency risk when the history query fails or times out
    pub aml_frequency: f64,
    /// AML country risk when no country can be determined
    pub aml_country: f64,
}

impl Default for FallbackContributions {
    fn default() -> Self {
        Self {
            velocity: 0.3,
            location: 0.3,
            device: 0.3,
            instrument: 0.3,
            amount: 0.2,
            email: 0.0,
            model: 0.0,
            aml_frequency: 0.3,
            aml_country: 0.3,
        }
    }
}

impl FallbackContributions {
    /// Fallback for a fraud evaluator name
    pub fn for_evaluator(&self, name: &str) -> f64 {
        match name {
            "velocity" => self.velocity,
            "location" => self.location,
            "device" => self.device,
            "instrument" => self.instrument,
            "amount" => self.amount,
            "email" => self.email,
            "model" => self.model,
            _ => 0.0,
        }
    }

    fn all(&self) -> [(&'static str, f64); 9] {
        [
            ("velocity", self.velocity),
            ("location", self.location),
            ("device", self.device),
            ("instrument", self.instrument),
            ("amount", self.amount),
            ("email", self.email),
            ("model", self.model),
            ("aml_frequency", self.aml_frequency),
            ("aml_country", self.aml_country),
        ]
    }
}

/// Compliance sub-engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Aggregation weights
    pub weights: ComplianceWeights,
    /// Risk thresholds
    pub thresholds: ComplianceThresholds,
    /// AML check
    pub aml: AmlConfig,
    /// KYC check
    pub kyc: KycConfig,
    /// PCI check
    pub pci: PciConfig,
    /// Merchant compliance
    pub merchant: MerchantComplianceConfig,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            weights: ComplianceWeights::default(),
            thresholds: ComplianceThresholds::default(),
            aml: AmlConfig::default(),
            kyc: KycConfig::default(),
            pci: PciConfig::default(),
            merchant: MerchantComplianceConfig::default(),
        }
    }
}

/// Compliance aggregation weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceWeights {
    /// PCI gap
    pub pci: f64,
    /// AML risk
    pub aml: f64,
    /// KYC risk
    pub kyc: f64,
}

impl Default for ComplianceWeights {
    fn default() -> Self {
        Self {
            pci: 0.3,
            aml: 0.4,
            kyc: 0.3,
        }
    }
}

/// Compliance risk thresholds (0.0-1.0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceThresholds {
    /// Lower bound of medium risk
    pub medium: f64,
    /// Above this, enhanced monitoring
    pub high: f64,
    /// Above this, rejected / manual review
    pub critical: f64,
}

impl Default for ComplianceThresholds {
    fn default() -> Self {
        Self {
            medium: 0.3,
            high: 0.7,
            critical: 0.9,
        }
    }
}

/// One `(upper bound, risk)` tier; the last tier's bound is ignored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier<T> {
    /// Exclusive (amount) or inclusive (count) upper bound
    pub bound: T,
    /// Risk for values in this tier
    pub risk: f64,
}

/// AML check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmlConfig {
    /// Amount risk weight
    pub amount_weight: f64,
    /// Frequency risk weight
    pub frequency_weight: f64,
    /// Country risk weight
    pub country_weight: f64,
    /// Amount tiers (exclusive bounds, reference currency)
    pub amount_tiers: Vec<Tier<Decimal>>,
    /// Risk above the last amount tier
    pub amount_ceiling_risk: f64,
    /// Frequency tiers (inclusive 24h counts)
    pub frequency_tiers: Vec<Tier<usize>>,
    /// Risk above the last frequency tier
    pub frequency_ceiling_risk: f64,
    /// Frequency risk when there is nothing to count by
    pub frequency_unknown_risk: f64,
    /// High-risk jurisdictions
    pub high_risk_countries: Vec<String>,
    /// Medium-risk jurisdictions
    pub medium_risk_countries: Vec<String>,
    /// Country risk for high-risk jurisdictions
    pub high_country_risk: f64,
    /// Country risk for medium-risk jurisdictions
    pub medium_country_risk: f64,
    /// Country risk otherwise
    pub low_country_risk: f64,
    /// Additive risk on a PEP match
    pub pep_risk: f64,
}

impl Default for AmlConfig {
    fn default() -> Self {
        let amount_tier = |bound: i64, risk: f64| Tier {
            bound: Decimal::new(bound, 0),
            risk,
        };
        let to_strings = |codes: &[&str]| codes.iter().map(|c| c.to_string()).collect();

        Self {
            amount_weight: 0.3,
            frequency_weight: 0.2,
            country_weight: 0.2,
            amount_tiers: vec![
                amount_tier(1_000, 0.1),
                amount_tier(5_000, 0.3),
                amount_tier(10_000, 0.5),
                amount_tier(50_000, 0.7),
            ],
            amount_ceiling_risk: 0.9,
            frequency_tiers: vec![
                Tier { bound: 0, risk: 0.1 },
                Tier { bound: 2, risk: 0.2 },
                Tier { bound: 5, risk: 0.4 },
                Tier { bound: 10, risk: 0.7 },
            ],
            frequency_ceiling_risk: 0.9,
            frequency_unknown_risk: 0.5,
            high_risk_countries: to_strings(&[
                "AF", "KP", "IR", "MM", "SY", "YE", "AL", "BB", "BW", "KH", "HT", "JM", "MU", "NI",
                "PK", "PA", "ZW", "UG", "VU",
            ]),
            medium_risk_countries: to_strings(&[
                "RU", "CN", "BY", "VE", "IQ", "LY", "LB", "CU", "SD", "SS", "BD", "NG", "PH", "GH",
            ]),
            high_country_risk: 0.9,
            medium_country_risk: 0.6,
            low_country_risk: 0.1,
            pep_risk: 0.8,
        }
    }
}

/// KYC check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KycConfig {
    /// Amount (reference currency) at or above which a transaction is high-value
    pub high_value: Decimal,
    /// Amount at or above which standard KYC is required
    pub medium_value: Decimal,
    /// Risk per missing KYC level
    pub level_gap_risk: f64,
}

impl Default for KycConfig {
    fn default() -> Self {
        Self {
            high_value: Decimal::new(10_000, 0),
            medium_value: Decimal::new(1_000, 0),
            level_gap_risk: 0.3,
        }
    }
}

/// PCI check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PciConfig {
    /// PCI-compliant payment providers (lowercase)
    pub compliant_providers: Vec<String>,
    /// Metadata keys that mark card data as tokenized
    pub token_markers: Vec<String>,
}

impl Default for PciConfig {
    fn default() -> Self {
        Self {
            compliant_providers: [
                "stripe",
                "paystack",
                "flutterwave",
                "paypal",
                "square",
                "adyen",
                "worldpay",
                "checkout.com",
                "authorize.net",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            token_markers: vec!["token".to_string(), "card_token".to_string()],
        }
    }
}

/// Merchant compliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantComplianceConfig {
    /// Industries that require enhanced due diligence (lowercase)
    pub high_risk_industries: Vec<String>,
}

impl Default for MerchantComplianceConfig {
    fn default() -> Self {
        Self {
            high_risk_industries: [
                "gambling",
                "adult",
                "crypto",
                "cbd",
                "weapons",
                "dating",
                "forex",
                "binary options",
            ]
            .iter()
            .map(|i| i.to_string())
            .collect(),
        }
    }
}

/// Fraud/compliance blend for full evaluations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Weight of the normalized fraud score
    pub fraud_weight: f64,
    /// Weight of the compliance risk
    pub compliance_weight: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            fraud_weight: 0.5,
            compliance_weight: 0.5,
        }
    }
}

/// Time budgets (milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Single history query
    pub history_query_ms: u64,
    /// Single evaluator
    pub evaluator_ms: u64,
    /// Whole request
    pub total_budget_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            history_query_ms: 250,
            evaluator_ms: 400,
            total_budget_ms: MAX_TOTAL_BUDGET_MS,
        }
    }
}

impl TimeoutConfig {
    /// History query budget
    pub fn history_query(&self) -> Duration {
        Duration::from_millis(self.history_query_ms)
    }

    /// Evaluator budget
    pub fn evaluator(&self) -> Duration {
        Duration::from_millis(self.evaluator_ms)
    }

    /// Request budget
    pub fn total_budget(&self) -> Duration {
        Duration::from_millis(self.total_budget_ms)
    }
}

/// Decision applier retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Retries after a conflict
    pub max_retries: u32,
    /// Base backoff, doubled per retry
    pub backoff_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 10,
        }
    }
}

/// Sanctions/PEP cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceListConfig {
    /// Cache TTL, seconds
    pub ttl_seconds: u64,
}

impl Default for ReferenceListConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 24 * 60 * 60,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Defaults plus `RISK_ENGINE_*` environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = EngineConfig::default();

        if let Some(ms) = env_parse::<u64>("RISK_ENGINE_HISTORY_TIMEOUT_MS")? {
            config.timeouts.history_query_ms = ms;
        }

        if let Some(ms) = env_parse::<u64>("RISK_ENGINE_EVALUATOR_TIMEOUT_MS")? {
            config.timeouts.evaluator_ms = ms;
        }

        if let Some(ms) = env_parse::<u64>("RISK_ENGINE_TOTAL_BUDGET_MS")? {
            config.timeouts.total_budget_ms = ms;
        }

        if let Some(weight) = env_parse::<f64>("RISK_ENGINE_FRAUD_BLEND_WEIGHT")? {
            config.blend.fraud_weight = weight;
            config.blend.compliance_weight = 1.0 - weight;
        }

        if let Ok(list) = std::env::var("RISK_ENGINE_IP_BLACKLIST") {
            config.fraud.ip_blacklist = list
                .split(',')
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(ttl) = env_parse::<u64>("RISK_ENGINE_REFERENCE_LIST_TTL_SECONDS")? {
            config.reference_lists.ttl_seconds = ttl;
        }

        if let Ok(currency) = std::env::var("RISK_ENGINE_REFERENCE_CURRENCY") {
            config.reference_currency = currency.to_uppercase();
        }

        Ok(config)
    }

    /// Check the configuration; errors are fatal at startup
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(config_err(format!(
                "unsupported config version {} (expected {})",
                self.version, CONFIG_VERSION
            )));
        }

        if self.reference_currency.len() != 3 {
            return Err(config_err(format!(
                "reference currency must be an ISO 4217 code, got '{}'",
                self.reference_currency
            )));
        }

        self.validate_fraud()?;
        self.validate_compliance()?;
        self.validate_blend()?;
        self.validate_timeouts()?;

        Ok(())
    }

    fn validate_fraud(&self) -> Result<()> {
        let fraud = &self.fraud;

        for (name, weight) in fraud.weights.all() {
            non_negative(&format!("fraud weight '{}'", name), weight)?;
        }

        let levels = &fraud.levels;
        if !(levels.medium > 0.0 && levels.medium < levels.high && levels.high <= 100.0) {
            return Err(config_err(format!(
                "fraud levels must satisfy 0 < medium < high <= 100 (medium={}, high={})",
                levels.medium, levels.high
            )));
        }

        for ip in &fraud.ip_blacklist {
            if ip.parse::<IpAddr>().is_err() {
                return Err(config_err(format!("invalid blacklisted IP '{}'", ip)));
            }
        }

        for pattern in &fraud.instrument.high_risk_bins {
            let valid = pattern.len() == 6
                && pattern.chars().all(|c| c.is_ascii_digit() || c == '*');
            if !valid {
                return Err(config_err(format!("invalid BIN pattern '{}'", pattern)));
            }
        }

        let unit_values = [
            ("velocity.step", fraud.velocity.step),
            ("location.invalid_ip", fraud.location.invalid_ip),
            ("location.high_risk_country", fraud.location.high_risk_country),
            ("location.new_ip", fraud.location.new_ip),
            ("location.impossible_travel", fraud.location.impossible_travel),
            ("device.browser_anomaly", fraud.device.browser_anomaly),
            ("instrument.high_risk_bin", fraud.instrument.high_risk_bin),
            ("instrument.churn", fraud.instrument.churn),
            ("amount.round_amount", fraud.amount.round_amount),
            ("amount.above_customer_average", fraud.amount.above_customer_average),
            ("amount.above_customer_max", fraud.amount.above_customer_max),
            ("amount.above_merchant_average", fraud.amount.above_merchant_average),
            ("email.disposable", fraud.email.disposable),
            ("email.account_under_hour", fraud.email.account_under_hour),
            ("email.account_under_day", fraud.email.account_under_day),
            ("email.generated_local_part", fraud.email.generated_local_part),
            ("model.threshold", fraud.model.threshold),
            ("model.partial_factor", fraud.model.partial_factor),
        ];
        for (name, value) in unit_values {
            unit_interval(name, value)?;
        }

        for (name, value) in fraud.fallbacks.all() {
            unit_interval(&format!("fallback '{}'", name), value)?;
        }

        if fraud.velocity.max_daily_amount <= Decimal::ZERO {
            return Err(config_err("velocity.max_daily_amount must be positive"));
        }

        if fraud.location.ip_window_hours <= 0 || fraud.device.window_hours <= 0 {
            return Err(config_err("evaluator windows must be positive"));
        }

        if fraud.model.max_score_history == 0 {
            return Err(config_err("model.max_score_history must be at least 1"));
        }

        Ok(())
    }

    fn validate_compliance(&self) -> Result<()> {
        let compliance = &self.compliance;

        for (name, weight) in [
            ("pci", compliance.weights.pci),
            ("aml", compliance.weights.aml),
            ("kyc", compliance.weights.kyc),
            ("aml.amount", compliance.aml.amount_weight),
            ("aml.frequency", compliance.aml.frequency_weight),
            ("aml.country", compliance.aml.country_weight),
        ] {
            unit_interval(&format!("compliance weight '{}'", name), weight)?;
        }

        let t = &compliance.thresholds;
        let ascending = 0.0 <= t.medium && t.medium < t.high && t.high < t.critical;
        if !ascending || t.critical > 1.0 {
            return Err(config_err(format!(
                "compliance thresholds must ascend within [0, 1] (medium={}, high={}, critical={})",
                t.medium, t.high, t.critical
            )));
        }

        let aml = &compliance.aml;
        if !aml.amount_tiers.windows(2).all(|w| w[0].bound < w[1].bound) {
            return Err(config_err("aml.amount_tiers must be strictly ascending"));
        }
        if !aml.frequency_tiers.windows(2).all(|w| w[0].bound < w[1].bound) {
            return Err(config_err("aml.frequency_tiers must be strictly ascending"));
        }

        let tier_risks = aml
            .amount_tiers
            .iter()
            .map(|t| t.risk)
            .chain(aml.frequency_tiers.iter().map(|t| t.risk));
        for risk in tier_risks {
            unit_interval("aml tier risk", risk)?;
        }

        for (name, value) in [
            ("aml.amount_ceiling_risk", aml.amount_ceiling_risk),
            ("aml.frequency_ceiling_risk", aml.frequency_ceiling_risk),
            ("aml.frequency_unknown_risk", aml.frequency_unknown_risk),
            ("aml.high_country_risk", aml.high_country_risk),
            ("aml.medium_country_risk", aml.medium_country_risk),
            ("aml.low_country_risk", aml.low_country_risk),
            ("aml.pep_risk", aml.pep_risk),
            ("kyc.level_gap_risk", compliance.kyc.level_gap_risk),
        ] {
            unit_interval(name, value)?;
        }

        if compliance.kyc.medium_value >= compliance.kyc.high_value {
            return Err(config_err("kyc.medium_value must be below kyc.high_value"));
        }

        Ok(())
    }

    fn validate_blend(&self) -> Result<()> {
        let blend = &self.blend;
        unit_interval("blend.fraud_weight", blend.fraud_weight)?;
        unit_interval("blend.compliance_weight", blend.compliance_weight)?;

        if (blend.fraud_weight + blend.compliance_weight - 1.0).abs() > 1e-9 {
            return Err(config_err(format!(
                "blend weights must sum to 1 (fraud={}, compliance={})",
                blend.fraud_weight, blend.compliance_weight
            )));
        }

        Ok(())
    }

    fn validate_timeouts(&self) -> Result<()> {
        let t = &self.timeouts;

        if t.history_query_ms == 0 || t.evaluator_ms == 0 || t.total_budget_ms == 0 {
            return Err(config_err("timeouts must be non-zero"));
        }
        if t.history_query_ms > t.evaluator_ms {
            return Err(config_err(
                "history_query_ms must not exceed evaluator_ms",
            ));
        }
        if t.evaluator_ms > t.total_budget_ms {
            return Err(config_err("evaluator_ms must not exceed total_budget_ms"));
        }
        if t.total_budget_ms > MAX_TOTAL_BUDGET_MS {
            return Err(config_err(format!(
                "total_budget_ms must not exceed {}",
                MAX_TOTAL_BUDGET_MS
            )));
        }
        if self.persistence.max_retries == 0 {
            return Err(config_err("persistence.max_retries must be at least 1"));
        }

        Ok(())
    }
}

fn config_err(message: impl Into<String>) -> Error {
    Error::Configuration(message.into())
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(config_err(format!("{} must be a finite non-negative number, got {}", name, value)))
    }
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_err(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| config_err(format!("{} has an invalid value '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}
