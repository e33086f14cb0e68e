//! Operator console on stdin.
//!
//! Lets a person drive the virtual device the way a smart-home controller
//! would: every line becomes a [`DeviceCommand`] delivered through the host's
//! command channel.
//!
//! ```text
//! start | stop | pause | resume | dock
//! mode <vacuum|mop>
//! clean <area-id> [<area-id> ...]
//! status | help
//! ```

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::device::{
    CleanMode, DeviceCommand, DeviceError, DeviceState, RunMode, VirtualCommandSender,
};
use crate::mqtt::MQTTStatus;

const HELP: &str = "commands: start | stop | pause | resume | dock | mode <vacuum|mop> | clean <area-id>... | status | help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(DeviceCommand),
    Status,
    Help,
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error(transparent)]
    Mode(#[from] DeviceError),
}

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleInput>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(keyword) = words.next() else {
        return Ok(None);
    };

    let input = match keyword.to_ascii_lowercase().as_str() {
        "start" => ConsoleInput::Command(DeviceCommand::ChangeRunMode(RunMode::Cleaning)),
        "stop" => ConsoleInput::Command(DeviceCommand::ChangeRunMode(RunMode::Idle)),
        "pause" => ConsoleInput::Command(DeviceCommand::Pause),
        "resume" => ConsoleInput::Command(DeviceCommand::Resume),
        "dock" | "home" => ConsoleInput::Command(DeviceCommand::GoHome),
        "mode" => {
            let mode: CleanMode = words.next().ok_or(ConsoleError::MissingArgument("mode"))?.parse()?;
            ConsoleInput::Command(DeviceCommand::ChangeCleanMode(mode))
        }
        "clean" => {
            let areas: Vec<String> = words.map(str::to_string).collect();
            if areas.is_empty() {
                return Err(ConsoleError::MissingArgument("clean"));
            }
            ConsoleInput::Command(DeviceCommand::CleanAreas(areas))
        }
        "status" => ConsoleInput::Status,
        "help" | "?" => ConsoleInput::Help,
        other => return Err(ConsoleError::Unknown(other.to_string())),
    };
    Ok(Some(input))
}

fn render_status(device: &DeviceState, mqtt: &MQTTStatus) -> String {
    let areas = device
        .service_areas
        .as_ref()
        .map(|areas| {
            areas
                .iter()
                .map(|a| format!("{}={}", a.id, a.name))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_else(|| "-".to_string());
    format!(
        "broker: {:?} (rx {}, tx {})\nbattery: {}  state: {}  run: {}  clean: {}\nareas: {}",
        mqtt.connection_state,
        mqtt.messages_received,
        mqtt.messages_sent,
        device
            .battery_level
            .map(|b| format!("{:.0}%", b))
            .unwrap_or_else(|| "-".to_string()),
        device
            .operational_state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string()),
        device.run_mode.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string()),
        device.clean_mode.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string()),
        areas
    )
}

/// Reads stdin until EOF or shutdown.
pub async fn run(
    commands: VirtualCommandSender,
    device_state: watch::Receiver<DeviceState>,
    mqtt_status: watch::Receiver<MQTTStatus>,
    shutdown: CancellationToken,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Console input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Console read failed");
                break;
            }
        };

        match parse_line(&line) {
            Ok(Some(ConsoleInput::Command(command))) => {
                if commands.send(command).await.is_err() {
                    warn!("Device command channel closed, leaving console");
                    break;
                }
            }
            Ok(Some(ConsoleInput::Status)) => {
                println!(
                    "{}",
                    render_status(&device_state.borrow(), &mqtt_status.borrow())
                );
            }
            Ok(Some(ConsoleInput::Help)) => println!("{}", HELP),
            Ok(None) => {}
            Err(e) => println!("{}\n{}", e, HELP),
        }
    }
}
