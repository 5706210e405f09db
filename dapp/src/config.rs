use std::fs;
use std::path::Path;
use std::time::Duration;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::capacity::UnitScale;
use crate::errors::{DappError, DappResult};
use crate::units::{FEED_DECIMALS, TOKEN_DECIMALS, TOKEN_SYMBOL};

/// Sepolia
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

pub const DEFAULT_TOKEN_ADDRESS: Address = address!("97C444c55Acd050645D4F2cc6498BdC10e86E9d8");
pub const DEFAULT_FEED_ADDRESS: Address = address!("1b44F3514812d835EB1BDB0acB33d3fA3351Ee43");

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DappConfig {
    pub token_address: Address,
    pub feed_address: Address,
    /// The single chain on which write actions are enabled
    pub allowed_chain_id: u64,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    #[serde(default = "default_feed_decimals")]
    pub feed_decimals: u8,
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
    /// How long transient messages and finished actions stay visible
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    #[serde(default = "default_event_feed_capacity")]
    pub event_feed_capacity: usize,
    #[serde(default = "default_explorer_tx_url")]
    pub explorer_tx_url: String,
}

fn default_token_decimals() -> u8 {
    TOKEN_DECIMALS
}

fn default_feed_decimals() -> u8 {
    FEED_DECIMALS
}

fn default_token_symbol() -> String {
    TOKEN_SYMBOL.to_string()
}

fn default_message_timeout_ms() -> u64 {
    2_000
}

fn default_event_feed_capacity() -> usize {
    20
}

fn default_explorer_tx_url() -> String {
    "https://sepolia.etherscan.io/tx/".to_string()
}

impl DappConfig {
    pub fn load(path: &Path) -> DappResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|err| DappError::Config(format!("unable to parse config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> DappResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| DappError::Config(format!("unable to encode config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    pub fn validate(&self) -> DappResult<()> {
        if self.event_feed_capacity == 0 {
            return Err(DappError::Config(
                "event_feed_capacity must be at least 1".to_string(),
            ));
        }
        if self.token_decimals > 36 || self.feed_decimals > 36 {
            return Err(DappError::Config("decimals above 36 are not supported".to_string()));
        }
        Ok(())
    }

    pub fn unit_scale(&self) -> UnitScale {
        UnitScale {
            feed_decimals: self.feed_decimals,
            token_decimals: self.token_decimals,
        }
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn explorer_link(&self, tx_hash: &impl std::fmt::Display) -> String {
        format!("{}{tx_hash}", self.explorer_tx_url)
    }
}

impl Default for DappConfig {
    fn default() -> Self {
        Self {
            token_address: DEFAULT_TOKEN_ADDRESS,
            feed_address: DEFAULT_FEED_ADDRESS,
            allowed_chain_id: DEFAULT_CHAIN_ID,
            token_decimals: default_token_decimals(),
            feed_decimals: default_feed_decimals(),
            token_symbol: default_token_symbol(),
            message_timeout_ms: default_message_timeout_ms(),
            event_feed_capacity: default_event_feed_capacity(),
            explorer_tx_url: default_explorer_tx_url(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/dapp.toml");

        let config = DappConfig {
            message_timeout_ms: 500,
            event_feed_capacity: 5,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = DappConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.message_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dapp.toml");
        fs::write(
            &path,
            format!(
                "token_address = \"{DEFAULT_TOKEN_ADDRESS}\"\n\
                 feed_address = \"{DEFAULT_FEED_ADDRESS}\"\n\
                 allowed_chain_id = 31337\n"
            ),
        )
        .unwrap();

        let loaded = DappConfig::load(&path).unwrap();
        assert_eq!(loaded.allowed_chain_id, 31337);
        assert_eq!(loaded.token_symbol, "SATSTD");
        assert_eq!(loaded.event_feed_capacity, 20);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let config = DappConfig {
            event_feed_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DappError::Config(_))));
    }
}
