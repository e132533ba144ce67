/// Raw value the heater reports for a temperature register without a reading.
pub const TEMPERATURE_SENTINEL: u16 = 0x7FFF;

/// The register block a register is reported in.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    Status,
    Config,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Kind {
    /// Signed tenths of a degree Celsius.
    Temperature,
    /// A plain measurement or counter, reported as is.
    Raw,
    /// A device specific code or bit field.
    Enum,
}

impl Kind {
    // Convenience aliases for the nicely tabulated `for_each_register` definition below.
    const CEL: Self = Self::Temperature;
    const RAW: Self = Self::Raw;
    const ENUM: Self = Self::Enum;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct RegisterSpec {
    pub index: u16,
    pub source: Source,
    pub kind: Kind,
    pub unit: &'static str,
    pub sentinel: Option<u16>,
    pub name: &'static str,
}

impl RegisterSpec {
    const fn new(source: Source, index: u16, kind: Kind, name: &'static str) -> Self {
        let (unit, sentinel) = match kind {
            Kind::Temperature => ("°C", Some(TEMPERATURE_SENTINEL)),
            Kind::Raw | Kind::Enum => ("", None),
        };
        Self { index, source, kind, unit, sentinel, name }
    }

    const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    pub fn decode(&self, raw: u16) -> Option<Value> {
        decode(raw, self)
    }
}

/// A decoded register value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    /// Degrees Celsius, at the device's native resolution of one tenth.
    Celsius(f64),
    Raw(u16),
    Code(u16),
}

impl Value {
    pub fn as_celsius(&self) -> Option<f64> {
        match *self {
            Value::Celsius(v) => Some(v),
            Value::Raw(_) | Value::Code(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<u16> {
        match *self {
            Value::Celsius(_) => None,
            Value::Raw(v) | Value::Code(v) => Some(v),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Value::Celsius(v) => f.write_fmt(format_args!("{v:.1}")),
            Value::Raw(n) | Value::Code(n) => f.write_fmt(format_args!("{n}")),
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Value::Celsius(v) => serializer.serialize_f64(v),
            Value::Raw(n) | Value::Code(n) => serializer.serialize_u16(n),
        }
    }
}

/// Turn a raw register word into its semantic value.
///
/// `None` means the device has no reading for the register, which is distinct from a reading of
/// zero.
pub fn decode(raw: u16, spec: &RegisterSpec) -> Option<Value> {
    if spec.sentinel == Some(raw) {
        return None;
    }
    Some(match spec.kind {
        Kind::Temperature => Value::Celsius(round_tenths(f64::from(raw as i16) / 10.0)),
        Kind::Raw => Value::Raw(raw),
        Kind::Enum => Value::Code(raw),
    })
}

/// Inverse of the temperature decoding: degrees Celsius to the tenths the device stores.
pub fn encode_celsius(value: f64) -> u16 {
    (value * 10.0).round() as i16 as u16
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{block} register {index} is not in the register catalog")]
pub struct UnknownRegister {
    pub block: Source,
    pub index: u16,
}

/// A handle to one of the [`REGISTERS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterRef(usize);

impl RegisterRef {
    pub const fn from_index(source: Source, index: u16) -> Option<RegisterRef> {
        let mut position = 0;
        while position < REGISTERS.len() {
            let spec = &REGISTERS[position];
            if spec.source as u8 == source as u8 && spec.index == index {
                return Some(Self(position));
            }
            position += 1;
        }
        None
    }

    /// Like [`Self::from_index`], but fails the const evaluation for registers that aren't known.
    pub const fn known(source: Source, index: u16) -> RegisterRef {
        match Self::from_index(source, index) {
            Some(register) => register,
            None => panic!("register is missing from the catalog"),
        }
    }

    pub fn lookup(source: Source, index: u16) -> Result<RegisterRef, UnknownRegister> {
        REGISTERS
            .binary_search_by_key(&(source, index), |spec| (spec.source, spec.index))
            .map(Self)
            .map_err(|_| UnknownRegister { block: source, index })
    }

    pub fn from_name(name: &str) -> Option<RegisterRef> {
        REGISTERS.iter().position(|spec| spec.name == name).map(Self)
    }

    pub fn all() -> impl Iterator<Item = RegisterRef> {
        (0..REGISTERS.len()).map(Self)
    }

    pub fn spec(&self) -> &'static RegisterSpec {
        &REGISTERS[self.0]
    }

    pub fn source(&self) -> Source {
        self.spec().source
    }

    pub fn index(&self) -> u16 {
        self.spec().index
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn description(&self) -> &'static str {
        DESCRIPTIONS[self.0]
    }
}

macro_rules! for_each_register {
    ($m:ident) => {
        $m! {
            Status 16: CEL, WATER_IN_T;
            Status 17: CEL, WATER_OUT_T;
            Status 18: CEL, AMBIENT_T;
            Status 19: CEL, COLD_PIPE_T;
            Status 20: CEL, HEATING_PIPE_T;
            Status 21: CEL, IPM_MODULE_T;
            Status 22: RAW, FAN_SPEED, unit = "RPM";
            Status 23: CEL, EXHAUST_T;
            Status 26: RAW, COMPRESSOR_CURRENT, unit = "A";
            Status 27: RAW, COMPRESSOR_FREQUENCY, unit = "Hz";
            Status 34: RAW, FREQUENCY_LIMIT_CODE;
            Status 48: RAW, ALARM_CODE_1;
            Status 49: RAW, ALARM_CODE_2;
            Status 50: RAW, ALARM_CODE_3;
            Status 51: RAW, ALARM_CODE_4;
            Status 52: RAW, SYSTEM_STATUS_CODE;
            Status 53: RAW, SYSTEM_RUNNING_CODE;
            Status 64: RAW, DEVICE_TYPE;
            Status 65: RAW, MAIN_BOARD_HW_REVISION;
            Status 66: RAW, MAIN_BOARD_SW_REVISION;
            Status 67: RAW, MANUAL_HW_CODE;
            Status 68: RAW, MANUAL_SW_CODE;
            Config 1: CEL, HEATING_TARGET_T;
            Config 2: CEL, COOLING_TARGET_T;
            Config 3: CEL, AUTO_TARGET_T;
            Config 4: ENUM, MODE_FLAGS;
            Config 5: ENUM, DEFROST_FLAGS;
            Config 16: ENUM, POWER_MODE;
            Config 55: CEL, MAX_TARGET_T;
            Config 56: CEL, MIN_TARGET_T;
        }
    };
}

macro_rules! make_lists {
    ($($source: ident $index: literal: $kind: ident, $name: ident $(, unit = $unit: literal)?;)+) => {
        pub const REGISTERS: &[RegisterSpec] = &[$(
            RegisterSpec::new(Source::$source, $index, Kind::$kind, stringify!($name))
                $(.with_unit($unit))?
        ),*];
        $(pub const $name: RegisterRef = RegisterRef::known(Source::$source, $index);)+
    };
}

for_each_register!(make_lists);

pub static DESCRIPTIONS: &[&str] = &const {
    let mut result = [""; REGISTERS.len()];
    let mut position = 0;
    let mut previous = None::<(u8, u16)>;
    while position < result.len() {
        let spec = &REGISTERS[position];
        let key = (spec.source as u8, spec.index);
        if let Some(previous) = previous {
            if key.0 < previous.0 || (key.0 == previous.0 && key.1 <= previous.1) {
                panic!("REGISTERS is not sorted (or has duplicate values)!");
            }
        }
        previous = Some(key);
        result[position] = match (spec.source, spec.index) {
            (Source::Status, 16) => "Temperature of the pool water entering the heat pump",
            (Source::Status, 17) => "Temperature of the pool water leaving the heat pump",
            (Source::Status, 18) => "Outdoor air temperature measured at the unit",
            (Source::Status, 19) => "Temperature of the evaporator (cold) pipe",
            (Source::Status, 20) => "Temperature of the condenser (heating) pipe",
            (Source::Status, 21) => "Temperature of the inverter IPM module",
            (Source::Status, 22) => "Rotational speed of the evaporator fan",
            (Source::Status, 23) => "Temperature of the compressor exhaust",
            (Source::Status, 26) => "Current drawn by the compressor",
            (Source::Status, 27) => "Compressor running frequency",
            (Source::Status, 34) => "Reason the compressor frequency is currently limited",
            (Source::Status, 48) => "Alarm code word 1. Bit 0x4 is set when there is no water flow",
            (Source::Status, 49) => {
                "Alarm code word 2. Bit 0x400 is set when the water temperature is too low"
            }
            (Source::Status, 50) => "Alarm code word 3",
            (Source::Status, 51) => "Alarm code word 4",
            (Source::Status, 52) => "System status code",
            (Source::Status, 53) => "System running code",
            (Source::Status, 64) => "Device type code",
            (Source::Status, 65) => "Main board hardware revision",
            (Source::Status, 66) => "Main board software revision",
            (Source::Status, 67) => "Manual (controller) hardware code",
            (Source::Status, 68) => "Manual (controller) software code",
            (Source::Config, 1) => "Target water temperature in the heating mode",
            (Source::Config, 2) => "Target water temperature in the cooling mode",
            (Source::Config, 3) => "Target water temperature in the automatic mode",
            (Source::Config, 4) => {
                "Operating flags. Bits 0-1: mode (0=cool, 1=heat, 2=auto), 2: timer on, 3: water \
                 pump running mode, 4: electronic valve style, 5: power on, 6: debug mode, 7: \
                 timer off"
            }
            (Source::Config, 5) => "Defrost flags. Bit 0: manual defrost",
            (Source::Config, 16) => "Power mode. 0=Silent, 1=Smart, 2=Powerful",
            (Source::Config, 55) => "Highest target temperature the controller accepts",
            (Source::Config, 56) => "Lowest target temperature the controller accepts",
            _ => "",
        };
        position += 1;
    }
    result
};
