//! The contract between this crate and a heater transport.
//!
//! Talking to the heater (framing, the challenge/response handshake, retransmissions) is left to
//! implementors of [`HeaterClient`]. The coordinator only needs a way to refresh the client's
//! register cache and to read values back out of it.

use std::future::Future;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("could not exchange data with the heater")]
    Transport(#[source] std::io::Error),
    #[error("heater responded with data that could not be understood: {0}")]
    Protocol(String),
}

pub trait HeaterClient: Send + Sync {
    /// Perform one round trip with the device and refresh the cached register values.
    fn update(&self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Whether the last [`Self::update`] produced any data.
    fn is_online(&self) -> bool;
    fn name(&self) -> &str;
    fn unique_id(&self) -> String;

    fn status_value(&self, index: u16) -> Option<u16>;
    fn config_value(&self, index: u16) -> Option<u16>;

    fn is_power_on(&self) -> bool;
    fn operating_mode(&self) -> u16;
    fn power_mode(&self) -> u16;
    fn target_temperature(&self) -> f64;
    /// The config register holding the target temperature for the current operating mode.
    fn target_temperature_register(&self) -> u16;

    fn set_power_off(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
    fn set_cooling_mode(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
    fn set_heating_mode(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
    fn set_auto_mode(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
    fn set_power_mode(&self, code: u16) -> impl Future<Output = Result<(), ClientError>> + Send;
    fn set_target_temperature(
        &self,
        value: f64,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Config register holding the [`ModeWord`].
pub const MODE_WORD_REGISTER: u16 = 4;
/// Config register holding the defrost flags.
pub const DEFROST_WORD_REGISTER: u16 = 5;
/// Config register holding the power (preset) mode code.
pub const POWER_MODE_REGISTER: u16 = 16;

/// The operating flags word stored in config register 4.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ModeWord(pub u16);

impl ModeWord {
    const OPERATING_MODE: u16 = 0b11;
    const TIMER_ON: u16 = 1 << 2;
    const WATER_PUMP_RUNNING_MODE: u16 = 1 << 3;
    const ELECTRONIC_VALVE_STYLE: u16 = 1 << 4;
    const POWER_ON: u16 = 1 << 5;
    const DEBUG_MODE: u16 = 1 << 6;
    const TIMER_OFF: u16 = 1 << 7;

    pub fn operating_mode(self) -> u16 {
        self.0 & Self::OPERATING_MODE
    }
    pub fn is_power_on(self) -> bool {
        self.0 & Self::POWER_ON != 0
    }
    pub fn is_timer_on_enabled(self) -> bool {
        self.0 & Self::TIMER_ON != 0
    }
    pub fn is_timer_off_enabled(self) -> bool {
        self.0 & Self::TIMER_OFF != 0
    }
    pub fn water_pump_running_mode(self) -> bool {
        self.0 & Self::WATER_PUMP_RUNNING_MODE != 0
    }
    pub fn electronic_valve_style(self) -> bool {
        self.0 & Self::ELECTRONIC_VALVE_STYLE != 0
    }
    pub fn is_debug_mode(self) -> bool {
        self.0 & Self::DEBUG_MODE != 0
    }

    pub fn with_power_off(self) -> Self {
        Self(self.0 & !Self::POWER_ON)
    }

    /// Power the unit on in the given operating mode, keeping all the other flags.
    pub fn with_operating_mode(self, code: u16) -> Self {
        let cleared = self.0 & !(Self::OPERATING_MODE | Self::POWER_ON);
        Self(cleared | Self::POWER_ON | (code & Self::OPERATING_MODE))
    }
}

/// Whether a manual defrost has been requested, from config register 5.
pub fn is_manual_defrost(defrost_word: u16) -> bool {
    defrost_word & 1 != 0
}

/// The config register storing the target temperature used in an operating mode.
///
/// Returns 0 for codes that do not correspond to any known mode.
pub fn target_temperature_register(operating_mode: u16) -> u16 {
    match operating_mode {
        0 => 2,
        1 => 1,
        2 => 3,
        _ => 0,
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! A scripted, in-memory [`HeaterClient`] for tests.

    use super::*;
    use crate::registers::encode_celsius;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub(crate) enum Call {
        PowerOff,
        CoolingMode,
        HeatingMode,
        AutoMode,
        PowerMode(u16),
        TargetTemperature(u16),
    }

    #[derive(Default)]
    pub(crate) struct Registers {
        pub(crate) online: bool,
        pub(crate) status: BTreeMap<u16, u16>,
        pub(crate) config: BTreeMap<u16, u16>,
    }

    pub(crate) enum Behaviour {
        Succeed,
        Fail,
        Hang(Duration),
        /// Report success, but without any data.
        Offline,
    }

    pub(crate) struct FakeClient {
        /// What the next `update` will observe.
        pub(crate) device: Mutex<Registers>,
        cache: Mutex<Registers>,
        pub(crate) behaviour: Mutex<Behaviour>,
        pub(crate) calls: Mutex<Vec<Call>>,
        pub(crate) updates: AtomicUsize,
        /// When set, `update` waits for a permit before completing.
        pub(crate) gate: Mutex<Option<std::sync::Arc<Semaphore>>>,
    }

    impl FakeClient {
        pub(crate) fn new() -> Self {
            let mut device = Registers { online: true, ..Default::default() };
            device.status.insert(16, 265);
            device.status.insert(17, 281);
            device.status.insert(18, 0x7FFF);
            device.status.insert(22, 850);
            device.config.insert(1, 280);
            device.config.insert(2, 250);
            device.config.insert(3, 270);
            device.config.insert(MODE_WORD_REGISTER, 0b10_0001);
            device.config.insert(POWER_MODE_REGISTER, 1);
            FakeClient {
                device: Mutex::new(device),
                cache: Mutex::new(Registers::default()),
                behaviour: Mutex::new(Behaviour::Succeed),
                calls: Mutex::new(Vec::new()),
                updates: AtomicUsize::new(0),
                gate: Mutex::new(None),
            }
        }

        pub(crate) fn set_behaviour(&self, behaviour: Behaviour) {
            *self.behaviour.lock().unwrap() = behaviour;
        }

        pub(crate) fn set_status(&self, index: u16, value: u16) {
            self.device.lock().unwrap().status.insert(index, value);
        }

        pub(crate) fn set_config(&self, index: u16, value: u16) {
            self.device.lock().unwrap().config.insert(index, value);
            self.cache.lock().unwrap().config.insert(index, value);
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn update_count(&self) -> usize {
            self.updates.load(Ordering::SeqCst)
        }

        fn mode_word(&self) -> ModeWord {
            ModeWord(self.config_value(MODE_WORD_REGISTER).unwrap_or(0))
        }

        fn record(&self, call: Call) -> Result<(), ClientError> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl HeaterClient for FakeClient {
        async fn update(&self) -> Result<(), ClientError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            let hang = match &*self.behaviour.lock().unwrap() {
                Behaviour::Succeed => None,
                Behaviour::Hang(duration) => Some(*duration),
                Behaviour::Fail => {
                    return Err(ClientError::Transport(std::io::ErrorKind::TimedOut.into()));
                }
                Behaviour::Offline => {
                    self.cache.lock().unwrap().online = false;
                    return Ok(());
                }
            };
            if let Some(duration) = hang {
                tokio::time::sleep(duration).await;
            }
            let device = self.device.lock().unwrap();
            let mut cache = self.cache.lock().unwrap();
            cache.online = device.online;
            cache.status = device.status.clone();
            cache.config = device.config.clone();
            Ok(())
        }

        fn is_online(&self) -> bool {
            self.cache.lock().unwrap().online
        }
        fn name(&self) -> &str {
            "pool"
        }
        fn unique_id(&self) -> String {
            "pool_1234".to_string()
        }
        fn status_value(&self, index: u16) -> Option<u16> {
            self.cache.lock().unwrap().status.get(&index).copied()
        }
        fn config_value(&self, index: u16) -> Option<u16> {
            self.cache.lock().unwrap().config.get(&index).copied()
        }
        fn is_power_on(&self) -> bool {
            self.mode_word().is_power_on()
        }
        fn operating_mode(&self) -> u16 {
            self.mode_word().operating_mode()
        }
        fn power_mode(&self) -> u16 {
            self.config_value(POWER_MODE_REGISTER).unwrap_or(0)
        }
        fn target_temperature(&self) -> f64 {
            let raw = self.config_value(self.target_temperature_register()).unwrap_or(0);
            f64::from(raw as i16) / 10.0
        }
        fn target_temperature_register(&self) -> u16 {
            target_temperature_register(self.operating_mode())
        }

        async fn set_power_off(&self) -> Result<(), ClientError> {
            self.record(Call::PowerOff)
        }
        async fn set_cooling_mode(&self) -> Result<(), ClientError> {
            self.record(Call::CoolingMode)
        }
        async fn set_heating_mode(&self) -> Result<(), ClientError> {
            self.record(Call::HeatingMode)
        }
        async fn set_auto_mode(&self) -> Result<(), ClientError> {
            self.record(Call::AutoMode)
        }
        async fn set_power_mode(&self, code: u16) -> Result<(), ClientError> {
            if matches!(*self.behaviour.lock().unwrap(), Behaviour::Fail) {
                return Err(ClientError::Protocol("rejected".into()));
            }
            self.record(Call::PowerMode(code))
        }
        async fn set_target_temperature(&self, value: f64) -> Result<(), ClientError> {
            self.record(Call::TargetTemperature(encode_celsius(value)))
        }
    }
}
