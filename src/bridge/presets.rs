//! Clean-mode application.
//!
//! Selecting a clean mode is a short burst of preset messages:
//! operation mode, then fan speed, then water usage.

use super::topics::OutboundTopic;
use crate::config::RvcConfig;
use crate::device::CleanMode;

/// Water usage preset that turns mopping off.
pub const WATER_OFF: &str = "off";

/// Messages that apply `mode`, or `None` when the mode must be refused
/// (mopping without an attached water tank).
pub fn clean_mode_sequence(
    mode: CleanMode,
    rvc: &RvcConfig,
    water_tank_attached: bool,
) -> Option<Vec<(OutboundTopic, String)>> {
    let (operation_mode, fan, water) = match mode {
        CleanMode::Vacuum => (
            &rvc.operation_mode_preset_vacuum,
            &rvc.fan_preset_for_vacuum,
            Some(WATER_OFF.to_string()),
        ),
        CleanMode::Mop => {
            if !water_tank_attached {
                return None;
            }
            (
                &rvc.operation_mode_preset_mop,
                &rvc.fan_preset_for_mop,
                rvc.water_preset_for_mop.clone(),
            )
        }
    };

    let sequence = [
        (OutboundTopic::OperationModePreset, operation_mode.clone()),
        (OutboundTopic::FanSpeedPreset, fan.clone()),
        (OutboundTopic::WaterUsagePreset, water),
    ]
    .into_iter()
    .filter_map(|(topic, preset)| preset.map(|p| (topic, p)))
    .collect();
    Some(sequence)
}
