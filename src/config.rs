use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::bluetooth::constants::{
    BOND_SETTLE_DELAY_MS, CONNECT_TIMEOUT_MS, DEVICE_NAME_PREFIX, DISCOVER_SERVICES_DELAY_MS,
    LOCAL_MAC_PLACEHOLDER, READ_WAIT_DELAY_MS, STALL_GUARD_ROUNDS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Advertised name prefix that identifies a reader during scanning.
    pub device_name_prefix: String,

    /// MAC address written into acknowledgment frames. The reader echoes it
    /// but does not validate it.
    pub local_mac: String,

    /// Delay between scheduled read cycles in milliseconds.
    pub read_cycle_delay_ms: u64,

    /// Settle time between transport connect and service discovery in
    /// milliseconds.
    pub discovery_settle_ms: u64,

    /// Settle time after the bonding probe in milliseconds.
    pub bond_settle_ms: u64,

    /// Timeout for one transport connect attempt in milliseconds.
    pub connect_timeout_ms: u64,

    /// Consecutive non-advancing read rounds tolerated before a transfer is
    /// abandoned as stalled.
    pub stall_guard_rounds: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            device_name_prefix: DEVICE_NAME_PREFIX.to_string(),
            local_mac: LOCAL_MAC_PLACEHOLDER.to_string(),
            read_cycle_delay_ms: READ_WAIT_DELAY_MS,
            discovery_settle_ms: DISCOVER_SERVICES_DELAY_MS,
            bond_settle_ms: BOND_SETTLE_DELAY_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            stall_guard_rounds: STALL_GUARD_ROUNDS,
        }
    }
}

impl BridgeConfig {
    /// Loads the config from a configuration file.
    pub async fn load_config(file_path: &Path) -> Result<Self> {
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!(
                "Config file not found at {:?}, using default.",
                file_path_str
            );
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, file_path: &Path) -> Result<()> {
        let file_path_str = file_path.to_string_lossy().into_owned();

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize bridge config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Bridge config saved to {:?}.", file_path_str);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_tuning() {
        let config = BridgeConfig::default();
        assert_eq!(config.device_name_prefix, "MOBA");
        assert_eq!(config.local_mac, "123456789ABC");
        assert_eq!(config.stall_guard_rounds, 3);
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let config = BridgeConfig::load_config(Path::new("/nonexistent/bridge_config.json"))
            .await
            .unwrap();
        assert_eq!(config.read_cycle_delay_ms, READ_WAIT_DELAY_MS);
    }

    #[tokio::test]
    async fn config_round_trips_through_disk() {
        let dir = std::env::temp_dir().join("btr2-bridge-config-test");
        let path = dir.join("bridge_config.json");

        let mut config = BridgeConfig::default();
        config.read_cycle_delay_ms = 250;
        config.save_config(&path).await.unwrap();

        let loaded = BridgeConfig::load_config(&path).await.unwrap();
        assert_eq!(loaded.read_cycle_delay_ms, 250);

        let _ = fs::remove_dir_all(&dir).await;
    }
}
