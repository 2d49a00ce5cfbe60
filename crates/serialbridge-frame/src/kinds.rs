//! Type codes carried in the second byte after the marker.
//!
//! Sensor frames carry a measurement kind, command frames an actuator
//! command. Codes the firmware may add later decode to `Unknown` instead of
//! failing: the frame itself is still valid.

/// Temperature reading in degrees Celsius.
pub const TEMPERATURE: u8 = 0x01;

/// Pressure reading in kilopascal.
pub const PRESSURE: u8 = 0x02;

/// Relative humidity in percent.
pub const HUMIDITY: u8 = 0x03;

/// Switch an actuator off.
pub const OFF: u8 = 0x00;

/// Switch an actuator on.
pub const ON: u8 = 0x01;

/// Measurement kind of a sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Temperature,
    Pressure,
    Humidity,
    Unknown(u8),
}

impl SensorKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            TEMPERATURE => SensorKind::Temperature,
            PRESSURE => SensorKind::Pressure,
            HUMIDITY => SensorKind::Humidity,
            other => SensorKind::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            SensorKind::Temperature => TEMPERATURE,
            SensorKind::Pressure => PRESSURE,
            SensorKind::Humidity => HUMIDITY,
            SensorKind::Unknown(code) => code,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            SensorKind::Temperature => "Temperature",
            SensorKind::Pressure => "Pressure",
            SensorKind::Humidity => "Humidity",
            SensorKind::Unknown(_) => "Unknown",
        }
    }

    /// Unit symbol of the reading value.
    pub fn unit(self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Pressure => "kPa",
            SensorKind::Humidity => "%",
            SensorKind::Unknown(_) => "",
        }
    }
}

/// Command carried by a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Off,
    On,
    Unknown(u8),
}

impl CommandKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            OFF => CommandKind::Off,
            ON => CommandKind::On,
            other => CommandKind::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            CommandKind::Off => OFF,
            CommandKind::On => ON,
            CommandKind::Unknown(code) => code,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Off => "OFF",
            CommandKind::On => "ON",
            CommandKind::Unknown(_) => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for CommandKind {
    type Err = String;

    /// Parse `on`/`off` (any case) or a numeric code (`0x01`, `1`).
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("on") {
            return Ok(CommandKind::On);
        }
        if trimmed.eq_ignore_ascii_case("off") {
            return Ok(CommandKind::Off);
        }
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => trimmed.parse::<u8>(),
        };
        parsed
            .map(CommandKind::from_code)
            .map_err(|_| format!("unknown command: {input} (expected on, off or a byte code)"))
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Unknown(code) => write!(f, "Unknown(0x{code:02X})"),
            known => f.write_str(known.name()),
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::Unknown(code) => write!(f, "UNKNOWN(0x{code:02X})"),
            known => f.write_str(known.name()),
        }
    }
}
