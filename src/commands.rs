pub mod registers {
    use crate::output;
    use crate::registers::{Kind, RegisterRef, Source};

    /// Search and output the known heater registers.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Only list registers whose name, description or index contain this text.
        filter: Option<String>,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not output the register list")]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    pub struct RegisterSchema {
        pub source: Source,
        pub index: u16,
        pub name: &'static str,
        pub kind: Kind,
        pub unit: &'static str,
        pub sentinel: Option<u16>,
        pub description: &'static str,
    }

    impl RegisterSchema {
        pub fn all_registers() -> impl Iterator<Item = Self> {
            RegisterRef::all().map(|register| {
                let spec = register.spec();
                RegisterSchema {
                    source: spec.source,
                    index: spec.index,
                    name: spec.name,
                    kind: spec.kind,
                    unit: spec.unit,
                    sentinel: spec.sentinel,
                    description: register.description(),
                }
            })
        }

        pub fn is_match(&self, pattern: &str) -> bool {
            let pattern = pattern.to_uppercase();
            self.name.contains(&pattern)
                || self.description.to_uppercase().contains(&pattern)
                || self.index.to_string() == pattern
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.to_output()?;
        output.table_headers(&["Source", "Index", "Name", "Kind", "Unit", "Sentinel", "Description"])?;
        for register in RegisterSchema::all_registers() {
            if let Some(pattern) = &args.filter {
                if !register.is_match(pattern) {
                    continue;
                }
            }
            output.result(
                || {
                    vec![
                        register.source.to_string(),
                        register.index.to_string(),
                        register.name.to_string(),
                        register.kind.to_string(),
                        register.unit.to_string(),
                        register.sentinel.map(|s| format!("{s:#06X}")).unwrap_or_default(),
                        register.description.to_string(),
                    ]
                },
                || &register,
            )?;
        }
        Ok(output.commit()?)
    }

}

pub mod read {
    use crate::climate::Climate;
    use crate::client::HeaterClient;
    use crate::coordinator::{
        ConfigError, Coordinator, CoordinatorConfig, Handle, POLL_INTERVAL, POLL_TIMEOUT,
        SetupError,
    };
    use crate::dump::DumpFileClient;
    use crate::output::{self, Output};
    use crate::registers::Value;
    use crate::sensor::{ErrorSensor, sensors};
    use futures::StreamExt as _;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Poll a heater and output its sensors and thermostat state.
    #[derive(clap::Parser)]
    pub struct Args {
        /// A JSON register dump to read the heater state from.
        #[arg(long)]
        dump: PathBuf,

        /// The name of the heater.
        #[arg(long, default_value = "alsavo_pro")]
        name: String,

        /// The serial number of the heater, used to build unique identifiers.
        #[arg(long)]
        serial: String,

        /// Keep polling and output every update until interrupted.
        #[arg(long)]
        follow: bool,

        /// Time between the end of one poll and the start of the next.
        #[arg(long, default_value_t = POLL_INTERVAL.into())]
        poll_interval: humantime::Duration,

        /// A poll that takes longer than this is considered failed.
        ///
        /// Must be shorter than the poll interval.
        #[arg(long, default_value_t = POLL_TIMEOUT.into())]
        poll_timeout: humantime::Duration,

        #[clap(flatten)]
        output: output::Args,
    }

    impl Args {
        fn coordinator_config(&self) -> Result<CoordinatorConfig, ConfigError> {
            let config = CoordinatorConfig {
                interval: *self.poll_interval,
                timeout: *self.poll_timeout,
            };
            config.validate()?;
            Ok(config)
        }
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("invalid polling options")]
        Config(#[source] ConfigError),
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error("could not set up polling of the heater")]
        Setup(#[source] SetupError),
        #[error("could not listen for the interrupt signal")]
        Signal(#[source] std::io::Error),
        #[error("could not output the heater state")]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    #[serde(untagged)]
    enum Reading {
        Register(Value),
        Number(f64),
        Text(String),
    }

    impl std::fmt::Display for Reading {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Reading::Register(value) => std::fmt::Display::fmt(value, f),
                Reading::Number(n) => f.write_fmt(format_args!("{n:.1}")),
                Reading::Text(text) => f.write_str(text),
            }
        }
    }

    #[derive(serde::Serialize)]
    struct Record<'a> {
        device: &'a str,
        unique_id: String,
        name: &'a str,
        value: Option<Reading>,
        unit: &'a str,
        available: bool,
        captured_at: jiff::Timestamp,
    }

    const HEADERS: &[&str] = &["Device", "Name", "Value", "Unit", "Available", "Captured at"];

    fn write_record(output: &mut Output, record: Record) -> Result<(), output::Error> {
        output.result(
            || {
                vec![
                    record.device.to_string(),
                    record.name.to_string(),
                    record.value.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                    record.unit.to_string(),
                    record.available.to_string(),
                    record.captured_at.to_string(),
                ]
            },
            || &record,
        )
    }

    fn write_state<C: HeaterClient>(output: &mut Output, handle: &Handle<C>) -> Result<(), output::Error> {
        let update = handle.latest();
        let device = update.snapshot.name.as_str();
        let available = update.is_available();
        let captured_at = update.snapshot.captured_at;
        let record = |unique_id: String, name: &'static str, value: Option<Reading>, unit: &'static str| Record {
            device,
            unique_id,
            name,
            value,
            unit,
            available,
            captured_at,
        };
        for sensor in sensors(handle) {
            let value = sensor.value().map(Reading::Register);
            write_record(output, record(sensor.unique_id(), sensor.name(), value, sensor.unit()))?;
        }
        let errors = ErrorSensor::new(handle.clone());
        let summary = errors.value().map(Reading::Text);
        write_record(output, record(errors.unique_id(), ErrorSensor::<C>::NAME, summary, ""))?;

        let climate = Climate::new(handle.clone());
        let climate_id = climate.unique_id();
        let text = |value: String| Some(Reading::Text(value));
        let rows = [
            ("HVAC mode", text(climate.hvac_mode().to_string()), ""),
            ("Preset mode", climate.preset_mode().and_then(|p| text(p.to_string())), ""),
            ("Current temperature", climate.current_temperature().map(Reading::Number), "°C"),
            ("Target temperature", climate.target_temperature().map(Reading::Number), "°C"),
            ("Minimum target temperature", Some(Reading::Number(climate.bounds().min)), "°C"),
            ("Maximum target temperature", Some(Reading::Number(climate.bounds().max)), "°C"),
        ];
        for (name, value, unit) in rows {
            write_record(output, record(climate_id.clone(), name, value, unit))?;
        }
        if let Some(error) = update.error {
            tracing::info!(error = %error, "the last poll failed, showing the last known state");
        }
        Ok(())
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let config = args.coordinator_config().map_err(Error::Config)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        runtime.block_on(read(args, config))
    }

    async fn read(args: Args, config: CoordinatorConfig) -> Result<(), Error> {
        let client = Arc::new(DumpFileClient::new(args.dump, args.name, args.serial));
        let coordinator = Coordinator::setup(client, config).await.map_err(Error::Setup)?;
        let handle = coordinator.handle();
        let mut output = args.output.to_output()?;
        output.table_headers(HEADERS)?;
        if !args.follow {
            write_state(&mut output, &handle)?;
            coordinator.shutdown().await;
            return Ok(output.commit()?);
        }

        let mut updates = handle.updates();
        loop {
            tokio::select! {
                update = updates.next() => {
                    if update.is_none() {
                        break;
                    }
                    write_state(&mut output, &handle)?;
                    output.end_batch()?;
                }
                result = tokio::signal::ctrl_c() => {
                    result.map_err(Error::Signal)?;
                    tracing::debug!("interrupted, stopping");
                    break;
                }
            }
        }
        coordinator.shutdown().await;
        Ok(output.commit()?)
    }
}
