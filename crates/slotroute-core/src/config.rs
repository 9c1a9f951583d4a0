//! Configuration module for slotroute

use serde::{Deserialize, Serialize};
use slotroute_types::{AddressError, NodeAddress, DEFAULT_HASH_SLOTS};
use std::time::Duration;
use thiserror::Error;

/// Attempts allowed per logical command
pub const DEFAULT_RETRY_BUDGET: u32 = 16;

/// Fixed delay between late retries
pub const DEFAULT_BACKOFF_MS: u64 = 100;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Request retry budget must be at least 1")]
    ZeroRetryBudget,

    #[error("Hash slot count must be greater than 0")]
    ZeroSlotCount,

    #[error("No seed addresses configured")]
    NoSeeds,

    #[error("A single-node target takes exactly one address, got {0}")]
    NotSingleAddress(usize),

    #[error("Invalid seed address: {0}")]
    InvalidSeed(#[from] AddressError),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where topology comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedTarget {
    /// A standalone node serving every slot; no discovery is performed
    Single(NodeAddress),
    /// Bootstrap addresses of a cluster, queried in order
    Cluster(Vec<NodeAddress>),
}

impl SeedTarget {
    /// Build a target from parsed addresses.
    ///
    /// A lone address is treated as a standalone node unless cluster mode is
    /// forced.
    pub fn from_addresses(
        addresses: Vec<NodeAddress>,
        force_cluster_mode: bool,
    ) -> Result<Self, ConfigError> {
        match addresses.len() {
            0 => Err(ConfigError::NoSeeds),
            1 if !force_cluster_mode => Self::single(addresses),
            _ => Ok(SeedTarget::Cluster(addresses)),
        }
    }

    /// Standalone target; anything but exactly one address is a configuration error
    pub fn single(addresses: Vec<NodeAddress>) -> Result<Self, ConfigError> {
        let count = addresses.len();
        let mut addresses = addresses.into_iter();
        match (addresses.next(), addresses.next()) {
            (Some(addr), None) => Ok(SeedTarget::Single(addr)),
            _ => Err(ConfigError::NotSingleAddress(count)),
        }
    }

    pub fn addresses(&self) -> Vec<NodeAddress> {
        match self {
            SeedTarget::Single(addr) => vec![addr.clone()],
            SeedTarget::Cluster(addrs) => addrs.clone(),
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, SeedTarget::Cluster(_))
    }
}

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Topology seeds
    pub seeds: SeedTarget,

    /// Maximum attempts per logical command
    pub request_retry_budget: u32,

    /// Size of the slot space
    pub hash_slot_count: u16,

    /// Refuse the standalone fallback when a seed has cluster support disabled
    pub force_cluster_mode: bool,

    /// Delay applied before retries once half the budget is spent
    pub backoff_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            seeds: SeedTarget::Cluster(vec![NodeAddress::new("127.0.0.1", 7000)]),
            request_retry_budget: DEFAULT_RETRY_BUDGET,
            hash_slot_count: DEFAULT_HASH_SLOTS,
            force_cluster_mode: true,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl RouterConfig {
    /// Configuration for the given seed target, defaults elsewhere
    pub fn with_seeds(seeds: SeedTarget) -> Self {
        Self {
            seeds,
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = RouterConfig::default();

        if let Ok(budget) = std::env::var("SLOTROUTE_RETRY_BUDGET") {
            config.request_retry_budget = parse_var("SLOTROUTE_RETRY_BUDGET", &budget)?;
        }

        if let Ok(slots) = std::env::var("SLOTROUTE_HASH_SLOTS") {
            config.hash_slot_count = parse_var("SLOTROUTE_HASH_SLOTS", &slots)?;
        }

        if let Ok(force) = std::env::var("SLOTROUTE_FORCE_CLUSTER") {
            config.force_cluster_mode = parse_var("SLOTROUTE_FORCE_CLUSTER", &force)?;
        }

        if let Ok(backoff) = std::env::var("SLOTROUTE_BACKOFF_MS") {
            config.backoff_ms = parse_var("SLOTROUTE_BACKOFF_MS", &backoff)?;
        }

        // Seeds last: the single/cluster decision depends on force_cluster_mode
        if let Ok(seeds) = std::env::var("SLOTROUTE_SEEDS") {
            let addresses = NodeAddress::parse_list(&seeds)?;
            config.seeds = SeedTarget::from_addresses(addresses, config.force_cluster_mode)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_retry_budget == 0 {
            return Err(ConfigError::ZeroRetryBudget);
        }
        if self.hash_slot_count == 0 {
            return Err(ConfigError::ZeroSlotCount);
        }
        if let SeedTarget::Cluster(addrs) = &self.seeds {
            if addrs.is_empty() {
                return Err(ConfigError::NoSeeds);
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

/// Connection settings shared by every node client of a pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Target node; unset in the pool-wide configuration
    pub address: Option<NodeAddress>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub database: u32,
}

impl ConnectionConfig {
    /// Copy of the pool-wide settings aimed at one node
    pub fn for_address(&self, address: &NodeAddress) -> Self {
        Self {
            address: Some(address.clone()),
            ..self.clone()
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> NodeAddress {
        NodeAddress::new("127.0.0.1", port)
    }

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.request_retry_budget, 16);
        assert_eq!(config.hash_slot_count, 16384);
        assert!(config.force_cluster_mode);
        assert_eq!(config.backoff(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_seed_target_from_addresses() {
        assert_eq!(
            SeedTarget::from_addresses(vec![addr(7000)], false).unwrap(),
            SeedTarget::Single(addr(7000))
        );
        assert_eq!(
            SeedTarget::from_addresses(vec![addr(7000)], true).unwrap(),
            SeedTarget::Cluster(vec![addr(7000)])
        );
        assert!(SeedTarget::from_addresses(vec![addr(7000), addr(7001)], false)
            .unwrap()
            .is_cluster());
        assert!(matches!(
            SeedTarget::from_addresses(vec![], true),
            Err(ConfigError::NoSeeds)
        ));
    }

    #[test]
    fn test_single_target_rejects_multiple_addresses() {
        assert_eq!(SeedTarget::single(vec![addr(7000)]).unwrap(), SeedTarget::Single(addr(7000)));
        assert!(matches!(
            SeedTarget::single(vec![addr(7000), addr(7001)]),
            Err(ConfigError::NotSingleAddress(2))
        ));
        assert!(matches!(SeedTarget::single(vec![]), Err(ConfigError::NotSingleAddress(0))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RouterConfig::default();
        config.request_retry_budget = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroRetryBudget)));

        let mut config = RouterConfig::default();
        config.hash_slot_count = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroSlotCount)));

        let config = RouterConfig::with_seeds(SeedTarget::Cluster(vec![]));
        assert!(matches!(config.validate(), Err(ConfigError::NoSeeds)));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "seeds": { "Cluster": [{ "host": "10.0.0.1", "port": 7000 }] },
            "request_retry_budget": 5,
            "hash_slot_count": 16384,
            "force_cluster_mode": false,
            "backoff_ms": 10
        }"#;
        let config = RouterConfig::from_json(json).unwrap();
        assert_eq!(config.request_retry_budget, 5);
        assert_eq!(config.seeds.addresses(), vec![NodeAddress::new("10.0.0.1", 7000)]);

        let bad = json.replace("\"request_retry_budget\": 5", "\"request_retry_budget\": 0");
        assert!(matches!(RouterConfig::from_json(&bad), Err(ConfigError::ZeroRetryBudget)));
    }

    #[test]
    fn test_connection_config_for_address() {
        let global = ConnectionConfig {
            password: Some("secret".to_string()),
            connect_timeout_ms: Some(250),
            ..ConnectionConfig::default()
        };
        let scoped = global.for_address(&addr(7002));
        assert_eq!(scoped.address, Some(addr(7002)));
        assert_eq!(scoped.password.as_deref(), Some("secret"));
        assert_eq!(scoped.connect_timeout(), Some(Duration::from_millis(250)));
        assert!(global.address.is_none());
    }
}
