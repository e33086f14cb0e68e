//! # Device Abstraction
//!
//! The smart-home side of the bridge. The robotic vacuum cleaner device object
//! is owned by a host framework; the bridge only sees it through the
//! [`RvcDevice`] trait (attribute updates flowing in) and a channel of
//! [`DeviceCommand`] values (user intents flowing out).
//!
//! ```text
//! device/
//! ├── mod.rs             - Value types, commands and the host traits
//! └── virtual_device.rs  - In-process host used by the binary and the tests
//! ```

pub mod virtual_device;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::mpsc;

pub use virtual_device::{DeviceState, VirtualCommandSender, VirtualHost, VirtualRvc};

/// High-level run mode of the cleaner.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunMode {
    #[default]
    Idle,
    Cleaning,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Idle => write!(f, "Idle"),
            RunMode::Cleaning => write!(f, "Cleaning"),
        }
    }
}

/// User-selectable cleaning behavior, each with its own preset parameters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CleanMode {
    #[default]
    Vacuum,
    Mop,
}

impl fmt::Display for CleanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanMode::Vacuum => write!(f, "Vacuum"),
            CleanMode::Mop => write!(f, "Mop"),
        }
    }
}

impl FromStr for CleanMode {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vacuum" => Ok(CleanMode::Vacuum),
            "mop" => Ok(CleanMode::Mop),
            other => Err(DeviceError::Unsupported(format!("clean mode '{}'", other))),
        }
    }
}

/// Operational state as exposed by the device abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationalState {
    Stopped,
    Running,
    Paused,
    Error,
    SeekingCharger,
    Charging,
    Docked,
}

impl fmt::Display for OperationalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationalState::Stopped => "Stopped",
            OperationalState::Running => "Running",
            OperationalState::Paused => "Paused",
            OperationalState::Error => "Error",
            OperationalState::SeekingCharger => "SeekingCharger",
            OperationalState::Charging => "Charging",
            OperationalState::Docked => "Docked",
        };
        write!(f, "{}", name)
    }
}

/// Whether the device is exposed as its own endpoint or behind a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointMode {
    Server,
    Bridged,
}

/// A named cleanable region of the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceArea {
    pub id: String,
    pub name: String,
}

/// Everything the host needs to instantiate the device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDefinition {
    pub node_label: String,
    pub mode: EndpointMode,
    pub run_modes: Vec<RunMode>,
    pub clean_modes: Vec<CleanMode>,
}

impl DeviceDefinition {
    /// Definition of a vacuum cleaner supporting `{Idle, Cleaning}` and `{Vacuum, Mop}`.
    pub fn rvc(node_label: impl Into<String>, mode: EndpointMode) -> Self {
        Self {
            node_label: node_label.into(),
            mode,
            run_modes: vec![RunMode::Idle, RunMode::Cleaning],
            clean_modes: vec![CleanMode::Vacuum, CleanMode::Mop],
        }
    }
}

/// Command events raised by the device abstraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    ChangeRunMode(RunMode),
    Pause,
    Resume,
    GoHome,
    ChangeCleanMode(CleanMode),
    /// Clean the given service areas, in order
    CleanAreas(Vec<String>),
}

/// Failures reported by the device abstraction.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The host refused an update or the device creation
    #[error("Rejected by device host: {0}")]
    Rejected(String),

    /// The value is not part of the device's declared capabilities
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Update operations the bridge performs on the device.
pub trait RvcDevice: Send {
    fn set_battery_level(&mut self, percent: f64) -> Result<(), DeviceError>;

    fn set_operational_state(&mut self, state: OperationalState) -> Result<(), DeviceError>;

    fn set_clean_mode(&mut self, mode: CleanMode) -> Result<(), DeviceError>;

    fn set_run_mode(&mut self, mode: RunMode) -> Result<(), DeviceError>;

    fn set_service_areas(&mut self, areas: Vec<ServiceArea>) -> Result<(), DeviceError>;
}

/// Factory side of the host framework.
///
/// `commands` is how the created device reports user intents back to the
/// bridge; the host must deliver every command event through it.
pub trait DeviceHost {
    fn create_device(
        &self,
        definition: &DeviceDefinition,
        commands: mpsc::Sender<DeviceCommand>,
    ) -> Result<Box<dyn RvcDevice>, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_mode_parses_case_insensitively() {
        assert_eq!("Mop".parse::<CleanMode>().unwrap(), CleanMode::Mop);
        assert_eq!(" vacuum ".parse::<CleanMode>().unwrap(), CleanMode::Vacuum);
        assert!("sweep".parse::<CleanMode>().is_err());
    }

    #[test]
    fn rvc_definition_declares_both_mode_sets() {
        let def = DeviceDefinition::rvc("Hallway bot", EndpointMode::Bridged);
        assert_eq!(def.node_label, "Hallway bot");
        assert_eq!(def.run_modes, vec![RunMode::Idle, RunMode::Cleaning]);
        assert_eq!(def.clean_modes, vec![CleanMode::Vacuum, CleanMode::Mop]);
    }

    #[test]
    fn clean_mode_deserializes_from_config_value() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: CleanMode,
        }
        let w: Wrapper = toml::from_str("mode = \"Mop\"").unwrap();
        assert_eq!(w.mode, CleanMode::Mop);
    }
}
