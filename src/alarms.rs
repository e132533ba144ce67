//! Summaries of the alarm code registers.

use crate::registers::{ALARM_CODE_1, ALARM_CODE_2, ALARM_CODE_3, ALARM_CODE_4, RegisterRef};
use crate::snapshot::DeviceSnapshot;

/// The alarm code registers, in the order they are reported.
pub const ALARM_REGISTERS: [RegisterRef; 4] = [ALARM_CODE_1, ALARM_CODE_2, ALARM_CODE_3, ALARM_CODE_4];

pub const NO_ERRORS: &str = "No errors";

/// Human readable summary of the alarm codes, e.g. `E1: 3, E4: 7`.
///
/// There is no summary for an offline device: the lack of data must not read as "No errors".
pub fn error_summary(snapshot: &DeviceSnapshot) -> Option<String> {
    if !snapshot.online {
        return None;
    }
    let codes = ALARM_REGISTERS.map(|register| snapshot.value(register).and_then(|v| v.as_integer()));
    Some(summarize(codes))
}

pub fn summarize(codes: [Option<u16>; 4]) -> String {
    let entries = codes
        .iter()
        .enumerate()
        .filter_map(|(offset, code)| match code {
            Some(code) if *code != 0 => Some(format!("E{}: {code}", offset + 1)),
            _ => None,
        })
        .collect::<Vec<_>>();
    if entries.is_empty() {
        NO_ERRORS.to_string()
    } else {
        entries.join(", ")
    }
}

/// The alarm bits with a known meaning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AlarmFlags {
    pub no_water_flow: bool,
    pub water_temperature_too_low: bool,
}

impl AlarmFlags {
    const NO_WATER_FLOW: u16 = 0x4;
    const WATER_TEMPERATURE_TOO_LOW: u16 = 0x400;

    pub fn from_snapshot(snapshot: &DeviceSnapshot) -> Self {
        let word = |register| snapshot.raw(register).unwrap_or(0);
        AlarmFlags {
            no_water_flow: word(ALARM_CODE_1) & Self::NO_WATER_FLOW != 0,
            water_temperature_too_low: word(ALARM_CODE_2) & Self::WATER_TEMPERATURE_TOO_LOW != 0,
        }
    }

    pub fn describe(&self) -> String {
        let mut messages = Vec::new();
        if self.no_water_flow {
            messages.push("No water flow");
        }
        if self.water_temperature_too_low {
            messages.push("Water temperature too low");
        }
        messages.join(", ")
    }
}
