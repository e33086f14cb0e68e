//! # MQTT Integration Module
//!
//! Connects the bridge to the broker that Valetudo publishes on.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker settings and the robot topic namespace
//! ├── message_manager.rs  - Message representation and the bridge channels
//! └── mqtt_handler.rs     - Connection state machine and event loop
//! ```
//!
//! The handler never interprets payloads. Everything it receives goes to the
//! bridge over `MsgManager::received_msg`, and everything the bridge wants
//! published arrives over `MsgManager::distribution_msg`.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;

pub use config::MqttConfig;
pub use message_manager::{MQTTMessage, MsgManager};
pub use mqtt_handler::{ConnectionState, MQTTStatus, MqttHandler};
