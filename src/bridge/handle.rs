//! Bridge Handle - wires the bridge to the broker
//!
//! ```text
//! MqttHandler ─[MQTTMessage]→ TopicBridge ─[MQTTMessage]→ MqttHandler
//!             (inbound channel)            (outbound channel)
//!                                  ▲
//!                        DeviceCommand channel
//! ```
//!
//! Both halves run as their own tokio task and stop on the shared
//! cancellation token.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::TopicBridge;
use crate::config::BridgeConfig;
use crate::device::DeviceHost;
use crate::error::BridgeError;
use crate::mqtt::{MQTTStatus, MqttHandler, MsgManager};

const CHANNEL_CAPACITY: usize = 100;

pub struct BridgeHandle {
    bridge_task: JoinHandle<()>,
    mqtt_task: JoinHandle<()>,
    mqtt_status: watch::Receiver<MQTTStatus>,
}

impl BridgeHandle {
    /// Creates the device, configures the broker connection and spawns both
    /// tasks. A broker that cannot be reached is not an error here; the MQTT
    /// task keeps retrying.
    pub fn spawn(
        host: &dyn DeviceHost,
        config: BridgeConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, BridgeError> {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mqtt_config = config.mqtt.clone();
        let (bridge, commands) = TopicBridge::new(host, config, outbound_tx)?;

        let handler = MqttHandler::configure(
            &mqtt_config,
            bridge.subscriptions(),
            MsgManager {
                received_msg: inbound_tx,
                distribution_msg: outbound_rx,
            },
        )?;
        let mqtt_status = handler.status();

        info!(
            "Spawning MQTT handler ({} subscriptions) and bridge tasks",
            handler.subscriptions().len()
        );
        let mqtt_task = tokio::spawn(handler.start().run_until_shutdown(shutdown.clone()));
        let bridge_task = tokio::spawn(bridge.run(inbound_rx, commands, shutdown));

        Ok(Self {
            bridge_task,
            mqtt_task,
            mqtt_status,
        })
    }

    pub fn mqtt_status(&self) -> watch::Receiver<MQTTStatus> {
        self.mqtt_status.clone()
    }

    /// Waits for both tasks to finish.
    pub async fn join(self) -> Result<(), BridgeError> {
        let (bridge, mqtt) = tokio::join!(self.bridge_task, self.mqtt_task);
        for (name, result) in [("bridge", bridge), ("mqtt", mqtt)] {
            if let Err(e) = result {
                error!("{} task failed: {}", name, e);
                return Err(BridgeError::Channel(format!("{} task failed: {}", name, e)));
            }
        }
        Ok(())
    }
}
