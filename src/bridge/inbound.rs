//! Typed decoding of inbound payloads.
//!
//! `decode` turns `(route, payload)` into at most one [`InboundUpdate`].
//! `Ok(None)` covers values the bridge deliberately ignores (unknown enum
//! values, empty error markers, reserved topics); `Err` covers payloads that
//! could not be parsed at all.

use std::fmt;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use thiserror::Error;

use super::topics::InboundTopic;
use crate::device::{OperationalState, ServiceArea};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("invalid segment map: {0}")]
    Segments(#[from] serde_json::Error),
}

/// Change requested by one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundUpdate {
    BatteryLevel(f64),
    OperationalState(OperationalState),
    WaterTank(bool),
    Segments(SegmentTable),
}

/// Map segment id → segment name, as last announced by the robot, in
/// document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentTable(Vec<(String, String)>);

impl SegmentTable {
    pub fn from_json(payload: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn name(&self, id: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(segment, _)| segment == id)
            .map(|(_, name)| name.as_str())
    }

    /// Segments as service areas, in the order a JSON object enumerates its
    /// keys: canonical integer ids ascending, then every other id in document
    /// order.
    pub fn to_service_areas(&self) -> Vec<ServiceArea> {
        let mut entries: Vec<&(String, String)> = self.0.iter().collect();
        entries.sort_by_key(|(id, _)| match array_index(id) {
            Some(index) => (0, index),
            None => (1, 0),
        });
        entries
            .into_iter()
            .map(|(id, name)| ServiceArea {
                id: id.clone(),
                name: name.clone(),
            })
            .collect()
    }
}

/// `Some(n)` for canonical array-index keys: no sign, no leading zero,
/// below `u32::MAX`.
fn array_index(id: &str) -> Option<u32> {
    let canonical = !id.is_empty()
        && id.bytes().all(|b| b.is_ascii_digit())
        && (id == "0" || !id.starts_with('0'));
    if !canonical {
        return None;
    }
    id.parse::<u32>().ok().filter(|&index| index != u32::MAX)
}

impl<'de> Deserialize<'de> for SegmentTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SegmentVisitor;

        impl<'de> Visitor<'de> for SegmentVisitor {
            type Value = SegmentTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of segment id to segment name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, String)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                // A repeated id keeps its first position and takes the last name.
                while let Some((id, name)) = access.next_entry::<String, String>()? {
                    match entries.iter_mut().find(|(existing, _)| *existing == id) {
                        Some(entry) => entry.1 = name,
                        None => entries.push((id, name)),
                    }
                }
                Ok(SegmentTable(entries))
            }
        }

        deserializer.deserialize_map(SegmentVisitor)
    }
}

pub fn decode(route: InboundTopic, payload: &str) -> Result<Option<InboundUpdate>, DecodeError> {
    let update = match route {
        InboundTopic::BatteryLevel => {
            let level = payload
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|level| level.is_finite())
                .ok_or_else(|| DecodeError::NotANumber(payload.to_string()))?;
            Some(InboundUpdate::BatteryLevel(level))
        }
        InboundTopic::BatteryStatus => (payload == "charging")
            .then_some(InboundUpdate::OperationalState(OperationalState::Charging)),
        InboundTopic::DockStatus => dock_status(payload).map(InboundUpdate::OperationalState),
        InboundTopic::StatusError => match payload {
            "" | "{}" | "null" => None,
            _ => Some(InboundUpdate::OperationalState(OperationalState::Error)),
        },
        InboundTopic::WaterTank => Some(InboundUpdate::WaterTank(
            payload == "true" || payload == "1",
        )),
        // Preset echo-back is not mirrored onto the device yet.
        InboundTopic::FanSpeedPreset | InboundTopic::WaterUsagePreset => None,
        InboundTopic::MapSegments => Some(InboundUpdate::Segments(SegmentTable::from_json(payload)?)),
    };
    Ok(update)
}

fn dock_status(value: &str) -> Option<OperationalState> {
    match value {
        "cleaning" => Some(OperationalState::Running),
        "idle" => Some(OperationalState::Docked),
        "pause" => Some(OperationalState::Paused),
        "error" => Some(OperationalState::Error),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_level_accepts_numbers_only() {
        assert_eq!(
            decode(InboundTopic::BatteryLevel, "87").unwrap(),
            Some(InboundUpdate::BatteryLevel(87.0))
        );
        assert_eq!(
            decode(InboundTopic::BatteryLevel, " 42.5\n").unwrap(),
            Some(InboundUpdate::BatteryLevel(42.5))
        );
        for bad in ["", "full", "NaN", "inf", "12%"] {
            assert!(
                matches!(decode(InboundTopic::BatteryLevel, bad), Err(DecodeError::NotANumber(_))),
                "payload {:?} must be rejected",
                bad
            );
        }
    }

    #[test]
    fn dock_status_maps_known_values() {
        let cases = [
            ("cleaning", OperationalState::Running),
            ("idle", OperationalState::Docked),
            ("pause", OperationalState::Paused),
            ("error", OperationalState::Error),
        ];
        for (payload, state) in cases {
            assert_eq!(
                decode(InboundTopic::DockStatus, payload).unwrap(),
                Some(InboundUpdate::OperationalState(state))
            );
        }
        assert_eq!(decode(InboundTopic::DockStatus, "emptying").unwrap(), None);
        assert_eq!(decode(InboundTopic::DockStatus, "Cleaning").unwrap(), None);
        assert_eq!(decode(InboundTopic::DockStatus, " pause\n").unwrap(), None);
        assert_eq!(decode(InboundTopic::BatteryStatus, "charging\n").unwrap(), None);
    }

    #[test]
    fn error_markers_are_not_errors() {
        for marker in ["", "{}", "null"] {
            assert_eq!(decode(InboundTopic::StatusError, marker).unwrap(), None);
        }
        for payload in ["  ", " {}", "null\n"] {
            assert_eq!(
                decode(InboundTopic::StatusError, payload).unwrap(),
                Some(InboundUpdate::OperationalState(OperationalState::Error)),
                "payload {:?} is not an empty marker",
                payload
            );
        }
        assert_eq!(
            decode(InboundTopic::StatusError, r#"{"severity":"permanent","message":"stuck"}"#)
                .unwrap(),
            Some(InboundUpdate::OperationalState(OperationalState::Error))
        );
    }

    #[test]
    fn water_tank_is_true_only_for_true_or_one() {
        for (payload, attached) in [("true", true), ("1", true), ("false", false), ("0", false), ("TRUE", false), ("", false)] {
            assert_eq!(
                decode(InboundTopic::WaterTank, payload).unwrap(),
                Some(InboundUpdate::WaterTank(attached))
            );
        }
    }

    #[test]
    fn segment_areas_use_object_key_order() {
        let table = SegmentTable::from_json(
            r#"{"10":"Bath","x":"Balcony","2":"Hall","01":"Attic","1":"Kitchen","b":"Bedroom"}"#,
        )
        .unwrap();
        let ids: Vec<String> = table.to_service_areas().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, ["1", "2", "10", "x", "01", "b"]);
        assert_eq!(table.name("10"), Some("Bath"));
        assert_eq!(table.name("01"), Some("Attic"));
    }

    #[test]
    fn repeated_segment_id_keeps_position_and_last_name() {
        let table = SegmentTable::from_json(r#"{"b":"One","a":"Two","b":"Three"}"#).unwrap();
        assert_eq!(table.len(), 2);
        let areas = table.to_service_areas();
        assert_eq!(areas[0].id, "b");
        assert_eq!(areas[0].name, "Three");
        assert_eq!(areas[1].id, "a");
    }

    #[test]
    fn array_index_ids_are_canonical_integers() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("007"), None);
        assert_eq!(array_index("+1"), None);
        assert_eq!(array_index(""), None);
        assert_eq!(array_index("4294967295"), None);
    }

    #[test]
    fn invalid_segment_json_is_an_error() {
        assert!(matches!(
            decode(InboundTopic::MapSegments, "{not json"),
            Err(DecodeError::Segments(_))
        ));
        assert!(decode(InboundTopic::MapSegments, r#"["1","2"]"#).is_err());
        assert!(decode(InboundTopic::MapSegments, r#"{"1":5}"#).is_err());
    }
}
