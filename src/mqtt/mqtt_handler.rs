//! Broker connection with statum state machine
//!
//! ```text
//! Configured ──start()──► Running ──run_until_shutdown()──► (consumed)
//! ```
//!
//! `Configured` holds a fully built client whose event loop has not been
//! polled yet, so nothing touches the network before `run_until_shutdown`.
//! Reconnection is left to rumqttc: after a poll error the loop sleeps for the
//! configured delay and polls again, which reconnects.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use statum::{machine, state};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::message_manager::{MQTTMessage, MsgManager};
use crate::error::BridgeError;

const DEFAULT_PORT: u16 = 1883;
const REQUEST_CAPACITY: usize = 32;
const MAX_ERROR_MESSAGES: usize = 10;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    Reconnecting,
}

#[derive(Clone, Debug, Default)]
pub struct MQTTStatus {
    pub connection_state: ConnectionState,
    /// Most recent transport errors, oldest first
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<chrono::DateTime<chrono::Local>>,
}

impl MQTTStatus {
    fn record_error(&mut self, message: String) {
        if self.error_messages.len() == MAX_ERROR_MESSAGES {
            self.error_messages.remove(0);
        }
        self.error_messages.push(message);
    }

    fn touch(&mut self) {
        self.last_activity = Some(chrono::Local::now());
    }
}

/// Splits `mqtt://host:port`, `tcp://host:port` or bare `host:port` into its
/// parts. The port defaults to 1883.
pub fn parse_broker_url(url: &str) -> Result<(String, u16), BridgeError> {
    let invalid = |reason: &str| BridgeError::BrokerUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = url.trim();
    let authority = match trimmed.split_once("://") {
        Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
            "mqtt" | "tcp" => rest,
            _ => return Err(invalid("unsupported scheme, expected mqtt:// or tcp://")),
        },
        None => trimmed,
    };
    let authority = authority.split('/').next().unwrap_or_default();

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| invalid("port is not a number between 0 and 65535"))?;
            (host, port)
        }
        None => (authority, DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    Ok((host.to_string(), port))
}

/// States for the broker connection lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum MqttHandlerState {
    Configured, // Client built, event loop not yet polled
    Running,    // Event loop driven until shutdown
}

#[machine]
pub struct MqttHandler<S: MqttHandlerState> {
    client: AsyncClient,
    eventloop: EventLoop,
    subscriptions: Vec<String>,
    msg_manager: MsgManager,
    reconnect_delay: Duration,
    status: Arc<watch::Sender<MQTTStatus>>,
}

impl<S: MqttHandlerState> MqttHandler<S> {
    pub fn status(&self) -> watch::Receiver<MQTTStatus> {
        self.status.subscribe()
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }
}

impl MqttHandler<Configured> {
    /// Builds the client for `config`. `subscriptions` are (re)subscribed on
    /// every successful connect.
    pub fn configure(
        config: &MqttConfig,
        subscriptions: Vec<String>,
        msg_manager: MsgManager,
    ) -> Result<Self, BridgeError> {
        let (host, port) = parse_broker_url(&config.url)?;
        info!("Configuring MQTT client {} for {}:{}", config.client_id(), host, port);

        let mut mqtt_options = MqttOptions::new(config.client_id(), host, port);
        mqtt_options.set_keep_alive(config.keep_alive());
        if let Some(user) = &config.username {
            mqtt_options.set_credentials(user.clone(), config.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let (status, _) = watch::channel(MQTTStatus::default());

        Ok(Self::new(
            client,
            eventloop,
            subscriptions,
            msg_manager,
            config.reconnect_delay(),
            Arc::new(status),
        ))
    }

    pub fn start(self) -> MqttHandler<Running> {
        debug!("MQTT handler entering running state");
        self.transition()
    }
}

impl MqttHandler<Running> {
    /// Drives the connection until `shutdown` fires or the bridge hangs up.
    ///
    /// Outbound messages are published from a separate task so a slow broker
    /// never stalls polling.
    pub async fn run_until_shutdown(self, shutdown: CancellationToken) {
        let client = self.client;
        let mut eventloop = self.eventloop;
        let subscriptions = self.subscriptions;
        let reconnect_delay = self.reconnect_delay;
        let status = self.status;
        let MsgManager {
            received_msg,
            mut distribution_msg,
        } = self.msg_manager;

        let publisher = client.clone();
        let pump_status = status.clone();
        let pump_shutdown = shutdown.clone();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_shutdown.cancelled() => break,
                    msg = distribution_msg.recv() => {
                        let Some(msg) = msg else { break };
                        match publisher
                            .publish(msg.topic(), QoS::AtLeastOnce, false, msg.content().to_owned())
                            .await
                        {
                            Ok(()) => {
                                debug!(topic = msg.topic(), payload = msg.content(), "Published");
                                pump_status.send_modify(|s| {
                                    s.messages_sent += 1;
                                    s.touch();
                                });
                            }
                            Err(e) => warn!(topic = msg.topic(), error = %e, "Publish failed"),
                        }
                    }
                }
            }
            debug!("Outbound publish task finished");
        });

        info!("Starting MQTT event loop");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!("Connected to broker ({:?}), subscribing to {} topics", ack.code, subscriptions.len());
                        status.send_modify(|s| {
                            s.connection_state = ConnectionState::Connected;
                            s.touch();
                        });
                        for topic in &subscriptions {
                            if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                                warn!(topic = %topic, error = %e, "Subscribe request failed");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MQTTMessage::from_payload(publish.topic.clone(), &publish.payload);
                        debug!("Received {}", msg);
                        status.send_modify(|s| {
                            s.messages_received += 1;
                            s.touch();
                        });
                        if received_msg.send(msg).await.is_err() {
                            error!("Bridge no longer receives messages, stopping event loop");
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("Broker sent disconnect");
                        status.send_modify(|s| s.connection_state = ConnectionState::Disconnected);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Broker connection error, retrying in {:?}", reconnect_delay);
                        status.send_modify(|s| {
                            s.connection_state = ConnectionState::Reconnecting;
                            s.record_error(e.to_string());
                        });
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(reconnect_delay) => {}
                        }
                    }
                }
            }
        }

        pump.abort();
        let connected = status.borrow().connection_state == ConnectionState::Connected;
        if connected {
            send_disconnect(&client, &mut eventloop).await;
        }
        status.send_modify(|s| s.connection_state = ConnectionState::Disconnected);
        info!("MQTT event loop stopped");
    }
}

/// Queues DISCONNECT and polls until it is written, so the broker sees a
/// clean close instead of a dropped socket.
async fn send_disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    info!("Disconnecting from broker");
    if let Err(e) = client.try_disconnect() {
        debug!(error = %e, "Disconnect request not queued");
        return;
    }

    let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return true,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Event loop failed while disconnecting");
                    return false;
                }
            }
        }
    })
    .await;

    match flushed {
        Ok(true) => debug!("DISCONNECT sent"),
        Ok(false) => {}
        Err(_) => warn!("DISCONNECT not sent within {:?}", DISCONNECT_TIMEOUT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn parses_scheme_host_and_port() {
        assert_eq!(
            parse_broker_url("mqtt://192.168.1.10:1884").unwrap(),
            ("192.168.1.10".to_string(), 1884)
        );
        assert_eq!(
            parse_broker_url("tcp://broker.local").unwrap(),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_url("broker.local:2000/").unwrap(),
            ("broker.local".to_string(), 2000)
        );
    }

    #[test]
    fn rejects_unsupported_urls() {
        assert!(parse_broker_url("ws://broker.local").is_err());
        assert!(parse_broker_url("mqtt://:1883").is_err());
        assert!(parse_broker_url("mqtt://broker:notaport").is_err());
        assert!(parse_broker_url("").is_err());
    }

    #[test]
    fn status_keeps_only_recent_errors() {
        let mut status = MQTTStatus::default();
        for i in 0..15 {
            status.record_error(format!("error {}", i));
        }
        assert_eq!(status.error_messages.len(), MAX_ERROR_MESSAGES);
        assert_eq!(status.error_messages[0], "error 5");
    }

    #[test]
    fn configure_then_start_keeps_subscriptions() {
        let (received_msg, _inbound) = mpsc::channel(4);
        let (_outbound, distribution_msg) = mpsc::channel(4);
        let config = MqttConfig {
            url: "mqtt://localhost".to_string(),
            username: Some("user".to_string()),
            password: Some("pw".to_string()),
            topic_prefix: "valetudo".to_string(),
            identifier: "robo".to_string(),
            ..MqttConfig::default()
        };

        let handler = MqttHandler::configure(
            &config,
            vec!["valetudo/robo/MapData/segments".to_string()],
            MsgManager {
                received_msg,
                distribution_msg,
            },
        )
        .unwrap();
        assert_eq!(
            handler.status().borrow().connection_state,
            ConnectionState::Disconnected
        );

        let running = handler.start();
        assert_eq!(
            running.subscriptions().to_vec(),
            vec!["valetudo/robo/MapData/segments".to_string()]
        );
    }

    #[tokio::test]
    async fn shutdown_stops_event_loop_without_broker() {
        let (received_msg, _inbound) = mpsc::channel(4);
        let (_outbound, distribution_msg) = mpsc::channel(4);
        let config = MqttConfig {
            url: "mqtt://127.0.0.1:1".to_string(),
            topic_prefix: "valetudo".to_string(),
            identifier: "robo".to_string(),
            reconnect_delay_secs: 60,
            ..MqttConfig::default()
        };
        let handler = MqttHandler::configure(
            &config,
            Vec::new(),
            MsgManager {
                received_msg,
                distribution_msg,
            },
        )
        .unwrap()
        .start();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handler.run_until_shutdown(shutdown))
            .await
            .expect("event loop must stop once shutdown is cancelled");
    }

    #[tokio::test]
    async fn shutdown_sends_disconnect_to_connected_broker() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut connect = [0u8; 256];
            let n = socket.read(&mut connect).await.unwrap();
            assert!(n > 0 && connect[0] == 0x10, "first packet must be CONNECT");
            // CONNACK, session not present, accepted
            socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
            let mut rest = Vec::new();
            socket.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let (received_msg, _inbound) = mpsc::channel(4);
        let (_outbound, distribution_msg) = mpsc::channel(4);
        let config = MqttConfig {
            url: format!("mqtt://127.0.0.1:{}", port),
            topic_prefix: "valetudo".to_string(),
            identifier: "robo".to_string(),
            ..MqttConfig::default()
        };
        let handler = MqttHandler::configure(
            &config,
            Vec::new(),
            MsgManager {
                received_msg,
                distribution_msg,
            },
        )
        .unwrap()
        .start();
        let mut status = handler.status();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(handler.run_until_shutdown(shutdown.clone()));
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.connection_state == ConnectionState::Connected),
        )
        .await
        .expect("broker must acknowledge the connection")
        .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("event loop must stop")
            .unwrap();

        let after_connack = tokio::time::timeout(Duration::from_secs(5), broker)
            .await
            .expect("client must close the socket")
            .unwrap();
        assert!(
            after_connack.windows(2).any(|w| w == &[0xE0u8, 0x00][..]),
            "no DISCONNECT in {:02x?}",
            after_connack
        );
        assert_eq!(status.borrow().connection_state, ConnectionState::Disconnected);
    }
}
