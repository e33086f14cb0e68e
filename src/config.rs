//! Bridge configuration, read from a TOML file.
//!
//! ```toml
//! name = "Valetudo RVC"
//!
//! [mqtt]
//! url = "mqtt://192.168.1.10:1883"
//! topicPrefix = "valetudo"
//! identifier = "RoboRock"
//!
//! [rvc]
//! defaultCleanMode = "Vacuum"
//! waterPresetForMop = "high"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::device::CleanMode;
use crate::error::BridgeError;
use crate::mqtt::config::MqttConfig;

const CONFIG_DIR: &str = "valetudo-rvc-bridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Display name of the device
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub rvc: RvcConfig,
}

fn default_name() -> String {
    "Valetudo RVC".to_string()
}

/// Device behavior and per-mode presets.
///
/// Preset fields set to `None` are never published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RvcConfig {
    /// Expose the device as its own endpoint (true) or as a bridged one (false)
    #[serde(default = "default_true")]
    pub server_mode: bool,
    #[serde(default)]
    pub default_clean_mode: CleanMode,
    /// Push the robot's map segments as service areas
    #[serde(default = "default_true")]
    pub map_service_areas_from_segments: bool,
    /// Default `standard`
    #[serde(default = "default_fan_preset_for_vacuum")]
    pub fan_preset_for_vacuum: Option<String>,
    /// Default none
    #[serde(default)]
    pub operation_mode_preset_vacuum: Option<String>,
    /// Default none
    #[serde(default)]
    pub fan_preset_for_mop: Option<String>,
    /// Default `medium`
    #[serde(default = "default_water_preset_for_mop")]
    pub water_preset_for_mop: Option<String>,
    /// Default none
    #[serde(default)]
    pub operation_mode_preset_mop: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_fan_preset_for_vacuum() -> Option<String> {
    Some("standard".to_string())
}

fn default_water_preset_for_mop() -> Option<String> {
    Some("medium".to_string())
}

impl Default for RvcConfig {
    fn default() -> Self {
        Self {
            server_mode: true,
            default_clean_mode: CleanMode::default(),
            map_service_areas_from_segments: true,
            fan_preset_for_vacuum: default_fan_preset_for_vacuum(),
            operation_mode_preset_vacuum: None,
            fan_preset_for_mop: None,
            water_preset_for_mop: default_water_preset_for_mop(),
            operation_mode_preset_mop: None,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            mqtt: MqttConfig::default(),
            rvc: RvcConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// `<config_dir>/valetudo-rvc-bridge/config.toml`, or a relative
    /// `config.toml` when the platform has no config directory.
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(mut path) => {
                path.push(CONFIG_DIR);
                path.push(CONFIG_FILE);
                path
            }
            None => PathBuf::from(CONFIG_FILE),
        }
    }

    /// Reads, parses and validates the file at `path`.
    pub async fn load(path: &Path) -> Result<Self, BridgeError> {
        debug!("Reading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml(&content)?;
        info!(
            "Loaded configuration for '{}' ({})",
            config.name,
            config.mqtt.base_topic()
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, BridgeError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations missing a required transport parameter.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let required = [
            ("mqtt.url", &self.mqtt.url),
            ("mqtt.topicPrefix", &self.mqtt.topic_prefix),
            ("mqtt.identifier", &self.mqtt.identifier),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(BridgeError::Config(format!("{} is required", key)));
            }
        }
        if self.mqtt.identifier.contains(&['/', '+', '#'][..]) {
            return Err(BridgeError::Config(format!(
                "mqtt.identifier '{}' must not contain '/', '+' or '#'",
                self.mqtt.identifier
            )));
        }
        Ok(())
    }
}
