use chrono::NaiveDateTime;
use std::fmt;
use tokio::sync::mpsc;

/// A single message crossing the broker boundary, in either direction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MQTTMessage {
    topic: String,
    content: String,
    timestamp: NaiveDateTime,
}

impl fmt::Display for MQTTMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.content.chars().take(40).collect();
        write!(f, "{} - {}: {}", self.timestamp, self.topic, preview)
    }
}

impl MQTTMessage {
    pub fn from_topic(topic: impl Into<String>, content: impl Into<String>) -> Self {
        MQTTMessage {
            topic: topic.into(),
            content: content.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    /// Builds a message from a raw publish; invalid UTF-8 is replaced lossily.
    pub fn from_payload(topic: impl Into<String>, payload: &[u8]) -> Self {
        Self::from_topic(topic, String::from_utf8_lossy(payload).into_owned())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Channel ends connecting the MQTT handler with the bridge.
pub struct MsgManager {
    /// Messages received from the broker, towards the bridge
    pub received_msg: mpsc::Sender<MQTTMessage>,
    /// Messages from the bridge waiting to be published
    pub distribution_msg: mpsc::Receiver<MQTTMessage>,
}
