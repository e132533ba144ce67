//! A [`HeaterClient`] that serves register values from a JSON dump on disk.
//!
//! The dump looks like this:
//!
//! ```json
//! {"online": true, "status": {"16": 265, "17": 281}, "config": {"1": 280, "4": 33}}
//! ```
//!
//! `online` may be left out, in which case the device is online whenever the status block has
//! any registers. Every [`HeaterClient::update`] re-reads the file, and commands write the
//! changed configuration back to it.

use crate::client::{
    ClientError, HeaterClient, MODE_WORD_REGISTER, ModeWord, POWER_MODE_REGISTER,
    target_temperature_register,
};
use crate::registers::encode_celsius;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegisterDump {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default)]
    pub status: BTreeMap<u16, u16>,
    #[serde(default)]
    pub config: BTreeMap<u16, u16>,
}

impl RegisterDump {
    pub fn is_online(&self) -> bool {
        self.online.unwrap_or(!self.status.is_empty())
    }

    fn mode_word(&self) -> ModeWord {
        ModeWord(self.config.get(&MODE_WORD_REGISTER).copied().unwrap_or(0))
    }
}

pub struct DumpFileClient {
    path: PathBuf,
    name: String,
    serial: String,
    cache: Mutex<Option<RegisterDump>>,
}

impl DumpFileClient {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, serial: impl Into<String>) -> Self {
        Self { path: path.into(), name: name.into(), serial: serial.into(), cache: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_cache<T>(&self, f: impl FnOnce(&RegisterDump) -> T) -> Option<T> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).as_ref().map(f)
    }

    fn mode_word(&self) -> ModeWord {
        self.with_cache(RegisterDump::mode_word).unwrap_or_default()
    }

    async fn load(&self) -> Result<RegisterDump, ClientError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(ClientError::Transport)?;
        serde_json::from_str(&text).map_err(|e| {
            ClientError::Protocol(format!("{} is not a register dump: {e}", self.path.display()))
        })
    }

    async fn store(&self, dump: &RegisterDump) -> Result<(), ClientError> {
        let text = serde_json::to_string_pretty(dump)
            .map_err(|e| ClientError::Protocol(format!("could not serialize the register dump: {e}")))?;
        tokio::fs::write(&self.path, text).await.map_err(ClientError::Transport)
    }

    /// Store `dump` with one config register replaced.
    ///
    /// The value must be derived from this same `dump`, so the file is read once per command.
    async fn write_config(
        &self,
        mut dump: RegisterDump,
        index: u16,
        value: u16,
    ) -> Result<(), ClientError> {
        debug!(path = %self.path.display(), index, value, "writing config register");
        dump.config.insert(index, value);
        self.store(&dump).await
    }

    async fn write_mode_word(
        &self,
        change: impl FnOnce(ModeWord) -> ModeWord + Send,
    ) -> Result<(), ClientError> {
        let dump = self.load().await?;
        let word = change(dump.mode_word());
        self.write_config(dump, MODE_WORD_REGISTER, word.0).await
    }
}

impl HeaterClient for DumpFileClient {
    async fn update(&self) -> Result<(), ClientError> {
        let dump = self.load().await?;
        debug!(
            path = %self.path.display(),
            status = dump.status.len(),
            config = dump.config.len(),
            "loaded register dump"
        );
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = Some(dump);
        Ok(())
    }

    fn is_online(&self) -> bool {
        self.with_cache(RegisterDump::is_online).unwrap_or(false)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> String {
        format!("{}_{}", self.name, self.serial)
    }

    fn status_value(&self, index: u16) -> Option<u16> {
        self.with_cache(|dump| dump.status.get(&index).copied()).flatten()
    }

    fn config_value(&self, index: u16) -> Option<u16> {
        self.with_cache(|dump| dump.config.get(&index).copied()).flatten()
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
        self.write_mode_word(ModeWord::with_power_off).await
    }

    async fn set_cooling_mode(&self) -> Result<(), ClientError> {
        self.write_mode_word(|word| word.with_operating_mode(0)).await
    }

    async fn set_heating_mode(&self) -> Result<(), ClientError> {
        self.write_mode_word(|word| word.with_operating_mode(1)).await
    }

    async fn set_auto_mode(&self) -> Result<(), ClientError> {
        self.write_mode_word(|word| word.with_operating_mode(2)).await
    }

    async fn set_power_mode(&self, code: u16) -> Result<(), ClientError> {
        let dump = self.load().await?;
        self.write_config(dump, POWER_MODE_REGISTER, code).await
    }

    async fn set_target_temperature(&self, value: f64) -> Result<(), ClientError> {
        let dump = self.load().await?;
        let mode = dump.mode_word().operating_mode();
        let register = target_temperature_register(mode);
        if register == 0 {
            return Err(ClientError::Protocol(format!(
                "operating mode {mode} has no target temperature register"
            )));
        }
        self.write_config(dump, register, encode_celsius(value)).await
    }
}
