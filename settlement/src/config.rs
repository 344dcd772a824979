//! Configuration for the settlement engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settlement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Registry data directory (RocksDB)
    pub registry_data_dir: PathBuf,

    /// Fixed denomination of one fractional contract, in currency units
    pub price_per_contract: u64,

    /// Offer price assigned to the initial issuance trades
    ///
    /// Contracts are priced in 1/1000ths of the nominal unit: a trade price
    /// of 100 corresponds to one `price_per_contract` of 100 000.
    pub nominal_offer_price: u64,

    /// Invocation address of the external payment system
    pub payment_target: String,

    /// Require the `paymentagent` role on `confirm`/`payContractCoupon`
    ///
    /// Disabled by default: the hosting ledger does not yet propagate
    /// caller identity on cross-system callbacks.
    pub enforce_agent_role: bool,

    /// Validate callbacks against a pending outbox instruction
    pub verify_callbacks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_data_dir: PathBuf::from("./data/registry"),
            price_per_contract: 100_000,
            nominal_offer_price: 100,
            payment_target: "swift-payments".to_string(),
            enforce_agent_role: false,
            verify_callbacks: true,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("CATBOND_DATA_DIR") {
            config.registry_data_dir = PathBuf::from(data_dir);
        }

        if let Ok(target) = std::env::var("CATBOND_PAYMENT_TARGET") {
            config.payment_target = target;
        }

        if let Ok(enforce) = std::env::var("CATBOND_ENFORCE_AGENT_ROLE") {
            config.enforce_agent_role = enforce == "1" || enforce.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }
}
