//! The thermostat view of a heater: modes, temperatures and the commands that change them.

use crate::client::{ClientError, HeaterClient};
use crate::coordinator::Handle;
use crate::modes::{HvacMode, PresetMode, TemperatureBounds};
use crate::registers::{RegisterRef, Source, WATER_IN_T};
use strum::VariantArray as _;
use tracing::debug;

pub const TARGET_TEMPERATURE_STEP: f64 = 0.1;

const HVAC_MODES: [HvacMode; 4] = [HvacMode::Heat, HvacMode::Cool, HvacMode::Auto, HvacMode::Off];

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("the heater did not accept the command")]
    Client(#[from] ClientError),
    #[error("target temperature {value} °C is outside of the accepted range ({min} to {max} °C)")]
    TemperatureOutOfRange { value: f64, min: f64, max: f64 },
}

/// Extra state exposed next to the climate values.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ClimateAttributes {
    pub device_power_on: bool,
    pub operating_mode_code: u16,
    pub power_mode_code: u16,
    pub device_online: bool,
    pub target_temperature_register: u16,
}

pub struct Climate<C> {
    handle: Handle<C>,
}

impl<C: HeaterClient> Climate<C> {
    pub fn new(handle: Handle<C>) -> Self {
        Self { handle }
    }

    pub fn name(&self) -> String {
        self.handle.snapshot().name.clone()
    }

    pub fn unique_id(&self) -> String {
        self.handle.snapshot().unique_id.clone()
    }

    pub fn is_available(&self) -> bool {
        self.handle.is_available()
    }

    pub fn hvac_mode(&self) -> HvacMode {
        HvacMode::from_snapshot(&self.handle.snapshot())
    }

    pub fn hvac_modes(&self) -> &'static [HvacMode] {
        &HVAC_MODES
    }

    /// `None` when the controller reports a power mode code with no known preset.
    pub fn preset_mode(&self) -> Option<PresetMode> {
        PresetMode::from_code(self.handle.snapshot().power_mode_code)
    }

    pub fn preset_modes(&self) -> &'static [PresetMode] {
        PresetMode::VARIANTS
    }

    pub fn icon(&self) -> &'static str {
        match self.hvac_mode() {
            HvacMode::Heat => "mdi:fire",
            HvacMode::Cool => "mdi:snowflake",
            HvacMode::Auto => "mdi:refresh-auto",
            HvacMode::Off => "mdi:hvac-off",
        }
    }

    /// Temperature of the incoming pool water.
    pub fn current_temperature(&self) -> Option<f64> {
        let update = self.handle.latest();
        if !update.is_available() {
            return None;
        }
        update.snapshot.celsius(WATER_IN_T)
    }

    /// The target temperature of the active operating mode.
    ///
    /// Decoded from the snapshot's `target_temperature_register` instead of the client's
    /// `target_temperature`, so a sentinel or a mode without a target register reads as no value.
    pub fn target_temperature(&self) -> Option<f64> {
        let snapshot = self.handle.snapshot();
        let register = RegisterRef::lookup(Source::Config, snapshot.target_temperature_register).ok()?;
        snapshot.celsius(register)
    }

    pub fn target_temperature_step(&self) -> f64 {
        TARGET_TEMPERATURE_STEP
    }

    pub fn bounds(&self) -> TemperatureBounds {
        TemperatureBounds::from_snapshot(&self.handle.snapshot())
    }

    pub fn attributes(&self) -> ClimateAttributes {
        let snapshot = self.handle.snapshot();
        ClimateAttributes {
            device_power_on: snapshot.is_power_on,
            operating_mode_code: snapshot.operating_mode_code,
            power_mode_code: snapshot.power_mode_code,
            device_online: snapshot.online,
            target_temperature_register: snapshot.target_temperature_register,
        }
    }

    pub async fn set_hvac_mode(&self, mode: HvacMode) -> Result<(), CommandError> {
        debug!(%mode, "setting the hvac mode");
        mode.apply(&**self.handle.client()).await?;
        self.handle.request_refresh();
        Ok(())
    }

    pub async fn set_preset_mode(&self, preset: PresetMode) -> Result<(), CommandError> {
        debug!(%preset, "setting the preset mode");
        preset.apply(&**self.handle.client()).await?;
        self.handle.request_refresh();
        Ok(())
    }

    pub async fn set_temperature(&self, value: f64) -> Result<(), CommandError> {
        let bounds = self.bounds();
        if !bounds.contains(value) {
            return Err(CommandError::TemperatureOutOfRange { value, min: bounds.min, max: bounds.max });
        }
        debug!(value, "setting the target temperature");
        self.handle.client().set_target_temperature(value).await?;
        self.handle.request_refresh();
        Ok(())
    }
}
