//! In-process device host.
//!
//! Stands in for the smart-home framework when the bridge runs standalone.
//! Every attribute update lands in a [`DeviceState`] snapshot that observers
//! read through a `watch` channel.

use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::{
    CleanMode, DeviceCommand, DeviceDefinition, DeviceError, DeviceHost, OperationalState,
    RunMode, RvcDevice, ServiceArea,
};

/// Snapshot of every attribute the bridge can update.
///
/// `None` means the attribute was never written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub battery_level: Option<f64>,
    pub operational_state: Option<OperationalState>,
    pub run_mode: Option<RunMode>,
    pub clean_mode: Option<CleanMode>,
    pub service_areas: Option<Vec<ServiceArea>>,
}

/// Host that creates [`VirtualRvc`] devices sharing one state channel.
pub struct VirtualHost {
    state: Arc<watch::Sender<DeviceState>>,
    definition: OnceLock<DeviceDefinition>,
    commands: OnceLock<VirtualCommandSender>,
}

/// Delivers command events the way a host's mode servers do: a requested run
/// or clean mode becomes the device's current mode first, then the command is
/// handed to the bridge.
#[derive(Clone)]
pub struct VirtualCommandSender {
    commands: mpsc::Sender<DeviceCommand>,
    state: Arc<watch::Sender<DeviceState>>,
    definition: DeviceDefinition,
}

impl VirtualCommandSender {
    pub async fn send(
        &self,
        command: DeviceCommand,
    ) -> Result<(), mpsc::error::SendError<DeviceCommand>> {
        match &command {
            DeviceCommand::ChangeRunMode(mode) if self.definition.run_modes.contains(mode) => {
                self.state.send_modify(|s| s.run_mode = Some(*mode));
            }
            DeviceCommand::ChangeCleanMode(mode) if self.definition.clean_modes.contains(mode) => {
                self.state.send_modify(|s| s.clean_mode = Some(*mode));
            }
            _ => {}
        }
        self.commands.send(command).await
    }
}

impl VirtualHost {
    pub fn new() -> Self {
        let (state, _) = watch::channel(DeviceState::default());
        Self {
            state: Arc::new(state),
            definition: OnceLock::new(),
            commands: OnceLock::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DeviceState {
        self.state.borrow().clone()
    }

    /// Definition the device was created with, if it was created.
    pub fn definition(&self) -> Option<&DeviceDefinition> {
        self.definition.get()
    }

    /// Sender for injecting command events as the host framework would.
    pub fn command_sender(&self) -> Option<VirtualCommandSender> {
        self.commands.get().cloned()
    }
}

impl Default for VirtualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceHost for VirtualHost {
    fn create_device(
        &self,
        definition: &DeviceDefinition,
        commands: mpsc::Sender<DeviceCommand>,
    ) -> Result<Box<dyn RvcDevice>, DeviceError> {
        if self.definition.set(definition.clone()).is_err() {
            return Err(DeviceError::Rejected(
                "virtual host already carries a device".to_string(),
            ));
        }
        // Cannot fail: guarded by the definition slot above.
        let _ = self.commands.set(VirtualCommandSender {
            commands,
            state: self.state.clone(),
            definition: definition.clone(),
        });

        info!(
            "Created virtual device '{}' ({:?} endpoint)",
            definition.node_label, definition.mode
        );

        Ok(Box::new(VirtualRvc {
            definition: definition.clone(),
            state: self.state.clone(),
        }))
    }
}

/// Device created by [`VirtualHost`].
pub struct VirtualRvc {
    definition: DeviceDefinition,
    state: Arc<watch::Sender<DeviceState>>,
}

impl RvcDevice for VirtualRvc {
    fn set_battery_level(&mut self, percent: f64) -> Result<(), DeviceError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(DeviceError::Rejected(format!(
                "battery level {} outside 0..=100",
                percent
            )));
        }
        debug!(battery = percent, "Virtual device battery updated");
        self.state.send_modify(|s| s.battery_level = Some(percent));
        Ok(())
    }

    fn set_operational_state(&mut self, state: OperationalState) -> Result<(), DeviceError> {
        info!(%state, "Virtual device operational state updated");
        self.state.send_modify(|s| s.operational_state = Some(state));
        Ok(())
    }

    fn set_clean_mode(&mut self, mode: CleanMode) -> Result<(), DeviceError> {
        if !self.definition.clean_modes.contains(&mode) {
            return Err(DeviceError::Unsupported(format!("clean mode {}", mode)));
        }
        info!(%mode, "Virtual device clean mode updated");
        self.state.send_modify(|s| s.clean_mode = Some(mode));
        Ok(())
    }

    fn set_run_mode(&mut self, mode: RunMode) -> Result<(), DeviceError> {
        if !self.definition.run_modes.contains(&mode) {
            return Err(DeviceError::Unsupported(format!("run mode {}", mode)));
        }
        info!(%mode, "Virtual device run mode updated");
        self.state.send_modify(|s| s.run_mode = Some(mode));
        Ok(())
    }

    fn set_service_areas(&mut self, areas: Vec<ServiceArea>) -> Result<(), DeviceError> {
        info!(count = areas.len(), "Virtual device service areas updated");
        self.state.send_modify(|s| s.service_areas = Some(areas));
        Ok(())
    }
}
