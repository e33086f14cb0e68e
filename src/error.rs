//! Error types shared across the bridge.

use thiserror::Error;

use crate::device::DeviceError;

/// Errors that can stop the bridge from starting.
///
/// Once the bridge runs, failures are absorbed and logged at the adapter
/// boundary; these variants only surface during startup.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration is missing a required value or holds an invalid one
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file could not be read
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for the expected schema
    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// The MQTT broker URL could not be understood
    #[error("Invalid broker URL '{url}': {reason}")]
    BrokerUrl { url: String, reason: String },

    /// The device host refused to create the device
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// A channel between tasks was closed unexpectedly
    #[error("Channel error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_url_error_names_the_url() {
        let err = BridgeError::BrokerUrl {
            url: "ws://broker".to_string(),
            reason: "unsupported scheme".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("ws://broker"));
        assert!(text.contains("unsupported scheme"));
    }

    #[test]
    fn device_error_converts() {
        let err: BridgeError = DeviceError::Rejected("endpoint busy".to_string()).into();
        assert!(matches!(err, BridgeError::Device(_)));
    }
}
