//! Persistent user configuration. JSON on disk, defaults when the file is
//! missing, saved back with pretty formatting.

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::machine::MachineTiming;
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "amghud_config.json";

/// Link behavior settings a user may tune.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Advertised name of the peripheral to search for.
    pub target_device_name: String,
    /// Bounded scan duration in milliseconds.
    pub scan_timeout_ms: u64,
    /// Silence window after which the link is declared dead.
    pub heartbeat_timeout_ms: u64,
    /// Auto-search supervisory tick interval.
    pub retry_interval_ms: u64,
    /// Outbound keepalive write interval while connected.
    pub keepalive_interval_ms: u64,
    /// Demo power/pedal tick interval.
    pub demo_fast_interval_ms: u64,
    /// Demo gear-change tick interval.
    pub demo_slow_interval_ms: u64,
    /// Start scanning as soon as the bridge boots.
    pub scan_on_start: bool,
    /// Enter demo mode as soon as the bridge boots.
    pub demo_on_start: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        use crate::core::ble::constants::*;
        Self {
            target_device_name: TARGET_DEVICE_NAME.to_string(),
            scan_timeout_ms: SCAN_TIMEOUT.as_millis() as u64,
            heartbeat_timeout_ms: crate::core::heartbeat::DEFAULT_HEARTBEAT_TIMEOUT.as_millis()
                as u64,
            retry_interval_ms: RETRY_INTERVAL.as_millis() as u64,
            keepalive_interval_ms: KEEPALIVE_INTERVAL.as_millis() as u64,
            demo_fast_interval_ms: DEMO_FAST_INTERVAL.as_millis() as u64,
            demo_slow_interval_ms: DEMO_SLOW_INTERVAL.as_millis() as u64,
            scan_on_start: true,
            demo_on_start: false,
        }
    }
}

impl LinkConfig {
    /// Loads the config from `config_dir`, falling back to defaults when the
    /// file does not exist yet.
    pub async fn load(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(CONFIG_FILE_NAME);
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using defaults", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;
        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the current config under `config_dir`.
    pub async fn save(&self, config_dir: &Path) -> Result<()> {
        ensure_directory_exists(config_dir).await?;
        let file_path = config_dir.join(CONFIG_FILE_NAME);

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(err) => {
                error!("Failed to serialize config: {}", err);
                return Err(err.into());
            }
        };
        fs::write(&file_path, config_json).await?;
        info!("Config saved to {:?}", file_path);
        Ok(())
    }

    /// Timing knobs in the form the state machine takes.
    pub fn timing(&self) -> MachineTiming {
        use tokio::time::Duration;
        MachineTiming {
            scan_timeout: Duration::from_millis(self.scan_timeout_ms),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            keepalive_interval: Duration::from_millis(self.keepalive_interval_ms),
            demo_fast_interval: Duration::from_millis(self.demo_fast_interval_ms),
            demo_slow_interval: Duration::from_millis(self.demo_slow_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = std::env::temp_dir().join("amghud-config-missing");
        let config = LinkConfig::load(&dir).await.unwrap();
        assert_eq!(config.target_device_name, "ESP32_BLE_AMG");
        assert!(config.scan_on_start);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("amghud-config-{}", std::process::id()));
        let mut config = LinkConfig::default();
        config.heartbeat_timeout_ms = 1234;
        config.demo_on_start = true;
        config.save(&dir).await.unwrap();

        let loaded = LinkConfig::load(&dir).await.unwrap();
        assert_eq!(loaded.heartbeat_timeout_ms, 1234);
        assert!(loaded.demo_on_start);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
