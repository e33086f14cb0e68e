use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Broker connection and topic namespace settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    /// Broker URL, e.g. `mqtt://192.168.1.10:1883`
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Valetudo topic prefix, usually `valetudo`
    #[serde(default)]
    pub topic_prefix: String,
    /// Valetudo identifier of the robot
    #[serde(default)]
    pub identifier: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            password: None,
            topic_prefix: String::new(),
            identifier: String::new(),
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl MqttConfig {
    /// `<topicPrefix>/<identifier>`, the root of every robot topic.
    pub fn base_topic(&self) -> String {
        format!(
            "{}/{}",
            self.topic_prefix.trim_end_matches('/'),
            self.identifier
        )
    }

    pub fn client_id(&self) -> String {
        format!("valetudo-rvc-{}", self.identifier)
    }

    /// Keep-alive interval, at least 5 seconds.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(5))
    }

    /// Pause after a connection error, at least 1 second.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs.max(1))
    }
}

impl fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field(
                "password",
                if self.password.is_some() { &"<redacted>" } else { &"<not set>" },
            )
            .field("topic_prefix", &self.topic_prefix)
            .field("identifier", &self.identifier)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .finish()
    }
}
