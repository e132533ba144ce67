//! Translation between the heater's mode codes and the modes presented to users.

use crate::client::{ClientError, HeaterClient};
use crate::registers::{MAX_TARGET_T, MIN_TARGET_T};
use crate::snapshot::DeviceSnapshot;
use num_traits::{FromPrimitive as _, ToPrimitive as _};

/// Operating mode as encoded in the low bits of the mode word.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    num_derive::FromPrimitive,
    num_derive::ToPrimitive,
    strum::Display,
    strum::VariantArray,
)]
#[repr(u16)]
pub enum OperatingMode {
    Cool = 0,
    Heat = 1,
    Auto = 2,
}

impl OperatingMode {
    pub fn from_code(code: u16) -> Option<Self> {
        Self::from_u16(code)
    }

    pub fn code(self) -> u16 {
        self.to_u16().unwrap_or_default()
    }
}

/// The power profile of the heat pump.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    num_derive::FromPrimitive,
    num_derive::ToPrimitive,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
    strum::VariantArray,
    strum::VariantNames,
)]
#[repr(u16)]
pub enum PresetMode {
    Silent = 0,
    Smart = 1,
    Powerful = 2,
}

impl PresetMode {
    pub fn from_code(code: u16) -> Option<Self> {
        Self::from_u16(code)
    }

    pub fn code(self) -> u16 {
        self.to_u16().unwrap_or_default()
    }

    pub async fn apply<C: HeaterClient + ?Sized>(self, client: &C) -> Result<(), ClientError> {
        tracing::debug!(preset = %self, code = self.code(), "setting the power mode");
        client.set_power_mode(self.code()).await
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
    strum::VariantArray,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HvacMode {
    Off,
    Cool,
    Heat,
    Auto,
}

impl HvacMode {
    /// The mode shown for the device state.
    ///
    /// A powered off unit is `Off` no matter which operating mode it has stored.
    pub fn from_device(is_power_on: bool, operating_mode_code: u16) -> Self {
        if !is_power_on {
            return HvacMode::Off;
        }
        match OperatingMode::from_code(operating_mode_code) {
            Some(mode) => mode.into(),
            None => HvacMode::Off,
        }
    }

    pub fn from_snapshot(snapshot: &DeviceSnapshot) -> Self {
        Self::from_device(snapshot.is_power_on, snapshot.operating_mode_code)
    }

    pub fn operating_mode(self) -> Option<OperatingMode> {
        match self {
            HvacMode::Off => None,
            HvacMode::Cool => Some(OperatingMode::Cool),
            HvacMode::Heat => Some(OperatingMode::Heat),
            HvacMode::Auto => Some(OperatingMode::Auto),
        }
    }

    /// Issue the single device command that switches the unit into this mode.
    pub async fn apply<C: HeaterClient + ?Sized>(self, client: &C) -> Result<(), ClientError> {
        tracing::debug!(mode = %self, "setting the hvac mode");
        match self {
            HvacMode::Off => client.set_power_off().await,
            HvacMode::Cool => client.set_cooling_mode().await,
            HvacMode::Heat => client.set_heating_mode().await,
            HvacMode::Auto => client.set_auto_mode().await,
        }
    }
}

impl From<OperatingMode> for HvacMode {
    fn from(mode: OperatingMode) -> Self {
        match mode {
            OperatingMode::Cool => HvacMode::Cool,
            OperatingMode::Heat => HvacMode::Heat,
            OperatingMode::Auto => HvacMode::Auto,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct TemperatureBounds {
    pub min: f64,
    pub max: f64,
}

impl TemperatureBounds {
    pub const FALLBACK: Self = Self { min: 5.0, max: 45.0 };

    /// Target temperature limits configured on the controller.
    ///
    /// Each limit falls back to [`Self::FALLBACK`] separately when the controller has no value.
    pub fn from_snapshot(snapshot: &DeviceSnapshot) -> Self {
        Self {
            min: snapshot.celsius(MIN_TARGET_T).unwrap_or(Self::FALLBACK.min),
            max: snapshot.celsius(MAX_TARGET_T).unwrap_or(Self::FALLBACK.max),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}
