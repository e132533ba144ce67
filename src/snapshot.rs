use crate::client::HeaterClient;
use crate::registers::{RegisterRef, Source, UnknownRegister, Value};
use std::collections::BTreeMap;

/// Everything read out of the heater by one successful poll.
///
/// Snapshots are published behind an `Arc` and are never modified afterwards.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct DeviceSnapshot {
    pub online: bool,
    pub name: String,
    pub unique_id: String,
    pub status: BTreeMap<u16, u16>,
    pub config: BTreeMap<u16, u16>,
    pub operating_mode_code: u16,
    pub power_mode_code: u16,
    pub is_power_on: bool,
    pub target_temperature: f64,
    pub target_temperature_register: u16,
    pub captured_at: jiff::Timestamp,
}

impl DeviceSnapshot {
    /// Copy the current state of the client's register cache.
    pub fn capture<C: HeaterClient + ?Sized>(client: &C) -> Self {
        let mut status = BTreeMap::new();
        let mut config = BTreeMap::new();
        for register in RegisterRef::all() {
            let index = register.index();
            let (raw, block) = match register.source() {
                Source::Status => (client.status_value(index), &mut status),
                Source::Config => (client.config_value(index), &mut config),
            };
            if let Some(raw) = raw {
                tracing::trace!(register.name = register.name(), raw, "captured register");
                block.insert(index, raw);
            }
        }
        DeviceSnapshot {
            online: client.is_online(),
            name: client.name().to_string(),
            unique_id: client.unique_id(),
            status,
            config,
            operating_mode_code: client.operating_mode(),
            power_mode_code: client.power_mode(),
            is_power_on: client.is_power_on(),
            target_temperature: client.target_temperature(),
            target_temperature_register: client.target_temperature_register(),
            captured_at: jiff::Timestamp::now(),
        }
    }

    pub fn raw(&self, register: RegisterRef) -> Option<u16> {
        let block = match register.source() {
            Source::Status => &self.status,
            Source::Config => &self.config,
        };
        block.get(&register.index()).copied()
    }

    pub fn value(&self, register: RegisterRef) -> Option<Value> {
        self.raw(register).and_then(|raw| register.spec().decode(raw))
    }

    pub fn value_at(&self, source: Source, index: u16) -> Result<Option<Value>, UnknownRegister> {
        Ok(self.value(RegisterRef::lookup(source, index)?))
    }

    pub fn celsius(&self, register: RegisterRef) -> Option<f64> {
        self.value(register).and_then(|v| v.as_celsius())
    }
}
