//! Valetudo topic vocabulary.
//!
//! Every topic lives under `<topicPrefix>/<identifier>/`. Inbound topics are
//! recognised by suffix through [`INBOUND_ROUTES`]; outbound topics are built
//! from [`OutboundTopic::suffix`].

/// Topics the bridge subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundTopic {
    BatteryLevel,
    BatteryStatus,
    DockStatus,
    StatusError,
    WaterTank,
    FanSpeedPreset,
    WaterUsagePreset,
    MapSegments,
}

/// Suffix lookup table, in match priority order.
pub const INBOUND_ROUTES: [(&str, InboundTopic); 8] = [
    ("BatteryStateAttribute/level", InboundTopic::BatteryLevel),
    ("BatteryStateAttribute/status", InboundTopic::BatteryStatus),
    ("DockStatusStateAttribute/status", InboundTopic::DockStatus),
    ("StatusStateAttribute/error", InboundTopic::StatusError),
    ("AttachmentStateAttribute/watertank", InboundTopic::WaterTank),
    ("FanSpeedControlCapability/preset", InboundTopic::FanSpeedPreset),
    ("WaterUsageControlCapability/preset", InboundTopic::WaterUsagePreset),
    ("MapData/segments", InboundTopic::MapSegments),
];

impl InboundTopic {
    /// First route whose suffix ends `topic`.
    pub fn classify(topic: &str) -> Option<Self> {
        INBOUND_ROUTES
            .iter()
            .find(|(suffix, _)| topic.ends_with(suffix))
            .map(|(_, route)| *route)
    }
}

/// Topics the bridge publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundTopic {
    BasicControl,
    OperationModePreset,
    FanSpeedPreset,
    WaterUsagePreset,
    MapSegmentClean,
}

impl OutboundTopic {
    pub fn suffix(self) -> &'static str {
        match self {
            OutboundTopic::BasicControl => "BasicControlCapability/operation/set",
            OutboundTopic::OperationModePreset => "OperationModeControlCapability/preset/set",
            OutboundTopic::FanSpeedPreset => "FanSpeedControlCapability/preset/set",
            OutboundTopic::WaterUsagePreset => "WaterUsageControlCapability/preset/set",
            OutboundTopic::MapSegmentClean => "MapSegmentationCapability/clean/set",
        }
    }
}

/// Payloads accepted by `BasicControlCapability/operation/set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicOperation {
    Start,
    Stop,
    Pause,
    Home,
}

impl BasicOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            BasicOperation::Start => "START",
            BasicOperation::Stop => "STOP",
            BasicOperation::Pause => "PAUSE",
            BasicOperation::Home => "HOME",
        }
    }
}

/// Joins `base` (`<prefix>/<identifier>`) and a suffix.
pub fn full_topic(base: &str, suffix: &str) -> String {
    format!("{}/{}", base, suffix)
}
