//! Read-only sensors backed by a coordinator's published snapshot.

use crate::alarms::error_summary;
use crate::client::HeaterClient;
use crate::coordinator::Handle;
use crate::registers::{RegisterRef, Source, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceClass {
    Temperature,
    Current,
    Frequency,
}

#[derive(Debug)]
pub struct SensorDescription {
    pub name: &'static str,
    pub register: RegisterRef,
    pub device_class: Option<DeviceClass>,
    pub icon: &'static str,
}

impl SensorDescription {
    pub fn slug(&self) -> String {
        self.name.to_lowercase().replace(' ', "_")
    }
}

const fn sensor(
    name: &'static str,
    source: Source,
    index: u16,
    device_class: Option<DeviceClass>,
    icon: &'static str,
) -> SensorDescription {
    SensorDescription { name, register: RegisterRef::known(source, index), device_class, icon }
}

use DeviceClass::{Current, Frequency, Temperature};
use Source::{Config, Status};

const THERMOMETER: &str = "mdi:thermometer";
const ALERT: &str = "mdi:bell-alert";
const STATE: &str = "mdi:state-machine";
const HEAT_PUMP: &str = "mdi:heat-pump";

pub static SENSORS: [SensorDescription; 26] = [
    sensor("Water In", Status, 16, Some(Temperature), THERMOMETER),
    sensor("Water Out", Status, 17, Some(Temperature), THERMOMETER),
    sensor("Ambient", Status, 18, Some(Temperature), THERMOMETER),
    sensor("Cold pipe", Status, 19, Some(Temperature), THERMOMETER),
    sensor("Heating pipe", Status, 20, Some(Temperature), THERMOMETER),
    sensor("IPM module", Status, 21, Some(Temperature), THERMOMETER),
    sensor("Exhaust temperature", Status, 23, Some(Temperature), THERMOMETER),
    sensor("Heating mode target", Config, 1, Some(Temperature), THERMOMETER),
    sensor("Cooling mode target", Config, 2, Some(Temperature), THERMOMETER),
    sensor("Auto mode target", Config, 3, Some(Temperature), THERMOMETER),
    sensor("Fan speed", Status, 22, None, "mdi:fan"),
    sensor("Compressor", Status, 26, Some(Current), "mdi:current-ac"),
    sensor("Compressor running frequency", Status, 27, Some(Frequency), "mdi:air-conditioner"),
    sensor("Frequency limit code", Status, 34, None, ALERT),
    sensor("Alarm code 1", Status, 48, None, ALERT),
    sensor("Alarm code 2", Status, 49, None, ALERT),
    sensor("Alarm code 3", Status, 50, None, ALERT),
    sensor("Alarm code 4", Status, 51, None, ALERT),
    sensor("System status code", Status, 52, None, STATE),
    sensor("System running code", Status, 53, None, STATE),
    sensor("Device type", Status, 64, None, HEAT_PUMP),
    sensor("Main board HW revision", Status, 65, None, HEAT_PUMP),
    sensor("Main board SW revision", Status, 66, None, HEAT_PUMP),
    sensor("Manual HW code", Status, 67, None, HEAT_PUMP),
    sensor("Manual SW code", Status, 68, None, HEAT_PUMP),
    sensor("Power mode", Config, 16, None, HEAT_PUMP),
];

pub struct Sensor<C> {
    handle: Handle<C>,
    description: &'static SensorDescription,
}

impl<C: HeaterClient> Sensor<C> {
    pub fn new(handle: Handle<C>, description: &'static SensorDescription) -> Self {
        Self { handle, description }
    }

    pub fn description(&self) -> &'static SensorDescription {
        self.description
    }

    pub fn name(&self) -> &'static str {
        self.description.name
    }

    pub fn unit(&self) -> &'static str {
        self.description.register.spec().unit
    }

    pub fn unique_id(&self) -> String {
        let register = self.description.register;
        format!("{}_{}_{}", self.handle.client().unique_id(), self.description.slug(), register.index())
    }

    pub fn is_available(&self) -> bool {
        self.handle.is_available()
    }

    /// The current reading, or `None` while the device is unavailable or reports no reading.
    pub fn value(&self) -> Option<Value> {
        let update = self.handle.latest();
        if !update.is_available() {
            return None;
        }
        update.snapshot.value(self.description.register)
    }

    /// The reading from the last successful poll, even if the device has since become unavailable.
    pub fn last_known_value(&self) -> Option<Value> {
        self.handle.snapshot().value(self.description.register)
    }
}

/// Summary of the alarm code registers.
pub struct ErrorSensor<C> {
    handle: Handle<C>,
}

impl<C: HeaterClient> ErrorSensor<C> {
    pub const NAME: &'static str = "Error messages";
    pub const ICON: &'static str = "mdi:alert";

    pub fn new(handle: Handle<C>) -> Self {
        Self { handle }
    }

    pub fn unique_id(&self) -> String {
        format!("{}_error_messages", self.handle.client().unique_id())
    }

    pub fn is_available(&self) -> bool {
        self.handle.is_available()
    }

    pub fn value(&self) -> Option<String> {
        let update = self.handle.latest();
        if !update.is_available() {
            return None;
        }
        error_summary(&update.snapshot)
    }
}

/// Every register sensor of one device.
pub fn sensors<C: HeaterClient>(handle: &Handle<C>) -> Vec<Sensor<C>> {
    SENSORS.iter().map(|description| Sensor::new(handle.clone(), description)).collect()
}
