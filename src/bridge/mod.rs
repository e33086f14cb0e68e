//! # Topic Bridge
//!
//! Translates between Valetudo's MQTT topics and the vacuum device
//! abstraction for one robot.
//!
//! ```text
//!                  ┌──────────────── TopicBridge ────────────────┐
//! MQTTMessage ───► │ classify ─► decode ─► apply (device / local) │
//!                  │                                              │
//! DeviceCommand ─► │ translate ─► publish ────────────────────────┼──► MQTTMessage
//!                  └──────────────────────────────────────────────┘
//! ```
//!
//! The bridge keeps two pieces of local state: whether the water tank is
//! attached (gates mop mode) and the robot's map segment table. Everything
//! else is owned by the device.
//!
//! ```text
//! bridge/
//! ├── topics.rs   - Topic suffixes and the inbound route table
//! ├── inbound.rs  - Payload decoding into typed updates
//! ├── presets.rs  - Clean-mode preset sequences
//! └── handle.rs   - Spawns the bridge and the MQTT handler as tasks
//! ```

pub mod handle;
pub mod inbound;
pub mod presets;
pub mod topics;

pub use handle::BridgeHandle;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::device::{
    CleanMode, DeviceCommand, DeviceDefinition, DeviceHost, EndpointMode, RunMode, RvcDevice,
};
use crate::error::BridgeError;
use crate::mqtt::MQTTMessage;
use inbound::{DecodeError, InboundUpdate, SegmentTable};
use topics::{full_topic, BasicOperation, InboundTopic, OutboundTopic, INBOUND_ROUTES};

const COMMAND_CAPACITY: usize = 16;

pub struct TopicBridge {
    config: BridgeConfig,
    base_topic: String,
    device: Box<dyn RvcDevice>,
    outbound: mpsc::Sender<MQTTMessage>,
    water_tank_attached: bool,
    segments: SegmentTable,
}

impl TopicBridge {
    /// Creates the device through `host` and puts it in its initial state
    /// (configured default clean mode, run mode `Idle`).
    ///
    /// Returns the bridge together with the receiver on which the device
    /// delivers its command events.
    pub fn new(
        host: &dyn DeviceHost,
        config: BridgeConfig,
        outbound: mpsc::Sender<MQTTMessage>,
    ) -> Result<(Self, mpsc::Receiver<DeviceCommand>), BridgeError> {
        let mode = if config.rvc.server_mode {
            EndpointMode::Server
        } else {
            EndpointMode::Bridged
        };
        let definition = DeviceDefinition::rvc(config.name.clone(), mode);

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let device = host.create_device(&definition, command_tx)?;

        let mut bridge = Self {
            base_topic: config.mqtt.base_topic(),
            config,
            device,
            outbound,
            water_tank_attached: false,
            segments: SegmentTable::default(),
        };

        let default_mode = bridge.config.rvc.default_clean_mode;
        if let Err(e) = bridge.device.set_clean_mode(default_mode) {
            warn!(error = %e, "Could not set initial clean mode {}", default_mode);
        }
        if let Err(e) = bridge.device.set_run_mode(RunMode::Idle) {
            warn!(error = %e, "Could not set initial run mode");
        }

        info!("Bridge ready for {}", bridge.base_topic);
        Ok((bridge, command_rx))
    }

    /// Full topics to subscribe to on every connect.
    pub fn subscriptions(&self) -> Vec<String> {
        INBOUND_ROUTES
            .iter()
            .map(|(suffix, _)| full_topic(&self.base_topic, suffix))
            .collect()
    }

    pub fn water_tank_attached(&self) -> bool {
        self.water_tank_attached
    }

    pub fn segments(&self) -> &SegmentTable {
        &self.segments
    }

    /// Applies one inbound message. Unknown topics and unparseable payloads
    /// leave every piece of state as it was.
    pub fn handle_message(&mut self, msg: &MQTTMessage) {
        let Some(route) = InboundTopic::classify(msg.topic()) else {
            return;
        };

        match inbound::decode(route, msg.content()) {
            Ok(Some(update)) => self.apply(update),
            Ok(None) => {}
            Err(DecodeError::NotANumber(payload)) => {
                debug!(topic = msg.topic(), "Ignoring non-numeric payload '{}'", payload);
            }
            Err(e @ DecodeError::Segments(_)) => {
                warn!(topic = msg.topic(), error = %e, "Keeping previous segment table");
            }
        }
    }

    fn apply(&mut self, update: InboundUpdate) {
        let result = match update {
            InboundUpdate::BatteryLevel(level) => self.device.set_battery_level(level),
            InboundUpdate::OperationalState(state) => self.device.set_operational_state(state),
            InboundUpdate::WaterTank(attached) => {
                debug!(attached, "Water tank attachment changed");
                self.water_tank_attached = attached;
                Ok(())
            }
            InboundUpdate::Segments(table) => {
                if table.is_empty() {
                    debug!("Robot reported an empty segment map");
                } else {
                    debug!(segments = table.len(), "Segment table replaced");
                }
                self.segments = table;
                if self.config.rvc.map_service_areas_from_segments {
                    self.device.set_service_areas(self.segments.to_service_areas())
                } else {
                    Ok(())
                }
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Device rejected update");
        }
    }

    /// Translates one device command event into outbound messages.
    pub fn handle_command(&mut self, command: DeviceCommand) {
        debug!(?command, "Device command");
        match command {
            DeviceCommand::ChangeRunMode(RunMode::Cleaning) => self.basic_control(BasicOperation::Start),
            DeviceCommand::ChangeRunMode(_) => self.basic_control(BasicOperation::Stop),
            DeviceCommand::Pause => self.basic_control(BasicOperation::Pause),
            DeviceCommand::Resume => self.basic_control(BasicOperation::Start),
            DeviceCommand::GoHome => self.basic_control(BasicOperation::Home),
            DeviceCommand::ChangeCleanMode(mode) => self.apply_clean_mode(mode),
            DeviceCommand::CleanAreas(area_ids) => self.clean_service_areas(Some(area_ids.as_slice())),
        }
    }

    /// Starts a segment clean of `area_ids`, in order. `None` and an empty
    /// list do nothing.
    pub fn clean_service_areas(&mut self, area_ids: Option<&[String]>) {
        let Some(area_ids) = area_ids.filter(|ids| !ids.is_empty()) else {
            return;
        };

        let payload = json!({ "segment_ids": area_ids }).to_string();
        info!("Cleaning {} service area(s)", area_ids.len());
        self.publish(OutboundTopic::MapSegmentClean, payload);

        if let Err(e) = self.device.set_run_mode(RunMode::Cleaning) {
            warn!(error = %e, "Could not set run mode after area clean");
        }
    }

    fn apply_clean_mode(&mut self, mode: CleanMode) {
        match presets::clean_mode_sequence(mode, &self.config.rvc, self.water_tank_attached) {
            Some(sequence) => {
                info!("Applying clean mode {}", mode);
                for (topic, preset) in sequence {
                    self.publish(topic, preset);
                }
            }
            None => info!("Refusing clean mode {}: no water tank attached", mode),
        }
    }

    fn basic_control(&self, operation: BasicOperation) {
        self.publish(OutboundTopic::BasicControl, operation.as_str());
    }

    /// Fire-and-forget; a full or closed channel drops the message.
    fn publish(&self, topic: OutboundTopic, payload: impl Into<String>) {
        let msg = MQTTMessage::from_topic(full_topic(&self.base_topic, topic.suffix()), payload);
        if let Err(e) = self.outbound.try_send(msg) {
            warn!(error = %e, "Dropping outbound message for {}", topic.suffix());
        }
    }

    /// Processes broker messages and device commands in arrival order until
    /// `shutdown` fires or the broker side hangs up.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<MQTTMessage>,
        mut commands: mpsc::Receiver<DeviceCommand>,
        shutdown: CancellationToken,
    ) {
        let mut commands_open = true;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_message(&msg),
                    None => {
                        warn!("Inbound message channel closed");
                        break;
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("Device command channel closed");
                        commands_open = false;
                    }
                },
            }
        }
        info!("Bridge for {} stopped", self.base_topic);
    }
}
