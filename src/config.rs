//! Engine configuration
//!
//! Configuration is loaded from a TOML file (or built from defaults); the
//! core never reads process environment variables directly. Every field has
//! a default, so a partial file only needs to override what differs.
//!
//! # Example Configuration File
//!
//! ```toml
//! unlock_cost = 10
//! lock_duration_hours = 2
//! pool_expiry_hours = 24
//! low_balance_threshold = 20
//! tax_rate = "0.18"
//!
//! [gateway]
//! key_id = "rzp_test_key"
//! key_secret = "rzp_test_secret"
//! webhook_secret = "whsec_test"
//! timeout_secs = 10
//!
//! [packages.starter]
//! credits = 50
//! price = "500"
//! discount_percent = 0
//! ```

use crate::types::payment::CreditPackage;
use crate::types::EngineError;
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Credits deducted per lead unlock
    #[serde(default = "default_unlock_cost")]
    pub unlock_cost: i64,

    /// How long an unlock holds the exclusive lock, in hours
    #[serde(default = "default_lock_duration_hours")]
    pub lock_duration_hours: i64,

    /// How long an unlocked lead stays in the pool, in hours
    #[serde(default = "default_pool_expiry_hours")]
    pub pool_expiry_hours: i64,

    /// Balance below which low-balance alerts fire
    #[serde(default = "default_low_balance_threshold")]
    pub low_balance_threshold: i64,

    /// Currency code for all orders
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Flat tax rate applied to credit purchases
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,

    /// Seconds between expiry sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Seconds between maintenance runs (ranking refresh, balance alerts)
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,

    /// Payment gateway credentials and limits
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Credit package tiers, keyed by package name
    #[serde(default = "default_packages")]
    pub packages: BTreeMap<String, PackageTier>,
}

/// Payment gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway API key id
    #[serde(default)]
    pub key_id: String,

    /// Shared secret for order/payment signature verification
    #[serde(default)]
    pub key_secret: String,

    /// Shared secret for webhook signature verification
    #[serde(default)]
    pub webhook_secret: String,

    /// Bound on gateway calls, in seconds
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

/// One credit package tier as configured
///
/// The package name lives in the map key; `EngineConfig::package` joins
/// them back into a full `CreditPackage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageTier {
    /// Credits granted by this tier
    pub credits: i64,
    /// Base price in rupees, before tax
    pub price: Decimal,
    /// Marketing discount percentage baked into the price
    #[serde(default)]
    pub discount_percent: u8,
}

fn default_unlock_cost() -> i64 {
    10
}

fn default_lock_duration_hours() -> i64 {
    2
}

fn default_pool_expiry_hours() -> i64 {
    24
}

fn default_low_balance_threshold() -> i64 {
    20
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_tax_rate() -> Decimal {
    Decimal::new(18, 2)
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_maintenance_interval_secs() -> u64 {
    86_400
}

fn default_gateway_timeout_secs() -> u64 {
    10
}

fn default_packages() -> BTreeMap<String, PackageTier> {
    let mut packages = BTreeMap::new();
    packages.insert(
        "starter".to_string(),
        PackageTier {
            credits: 50,
            price: Decimal::from(500),
            discount_percent: 0,
        },
    );
    packages.insert(
        "popular".to_string(),
        PackageTier {
            credits: 120,
            price: Decimal::from(1000),
            discount_percent: 17,
        },
    );
    packages.insert(
        "premium".to_string(),
        PackageTier {
            credits: 300,
            price: Decimal::from(2000),
            discount_percent: 33,
        },
    );
    packages.insert(
        "enterprise".to_string(),
        PackageTier {
            credits: 1000,
            price: Decimal::from(5000),
            discount_percent: 50,
        },
    );
    packages
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            key_id: String::new(),
            key_secret: String::new(),
            webhook_secret: String::new(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            unlock_cost: default_unlock_cost(),
            lock_duration_hours: default_lock_duration_hours(),
            pool_expiry_hours: default_pool_expiry_hours(),
            low_balance_threshold: default_low_balance_threshold(),
            currency: default_currency(),
            tax_rate: default_tax_rate(),
            sweep_interval_secs: default_sweep_interval_secs(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            gateway: GatewayConfig::default(),
            packages: default_packages(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        toml::from_str(raw).map_err(|e| EngineError::ParseError {
            line: None,
            message: e.to_string(),
        })
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Lock duration as a chrono duration
    pub fn lock_duration(&self) -> Duration {
        Duration::hours(self.lock_duration_hours)
    }

    /// Pool expiry as a chrono duration
    pub fn pool_expiry(&self) -> Duration {
        Duration::hours(self.pool_expiry_hours)
    }

    /// Gateway call bound as a std duration
    pub fn gateway_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.gateway.timeout_secs)
    }

    /// Look up a package tier by name
    pub fn package(&self, name: &str) -> Option<CreditPackage> {
        self.packages.get(name).map(|tier| CreditPackage {
            name: name.to_string(),
            credits: tier.credits,
            price: tier.price,
            discount_percent: tier.discount_percent,
        })
    }
}
