//! Runtime configuration, loaded from JSON.

use std::path::Path;
use std::{fmt, io};

use derive_more::From;
use ec_mini_icd::{DeviceKind, DeviceTable};
use serde::{Deserialize, Serialize};

use crate::cycle::{CycleConfig, MAX_PERIOD_US, MAX_START_DELAY_MS};

/// Two bus couplers with their I/O terminals, 24 devices in all.
pub const DEFAULT_DEVICES: [DeviceKind; 24] = {
    use DeviceKind::*;
    [
        // Block 2
        EK1100, EL4102, EL1014, EL3162, EL2004, EL3102, EL2004, EL2004,
        EL2004, EL2004, EL2004,
        // Block 3
        EK1100, EL1014, EL1014, EL1014, EL1014, EL1014, EL2004, EL2004,
        EL2004, EL2004, EL1014, EL1014, EL1014,
    ]
};

fn default_devices() -> DeviceTable {
    DeviceTable::from_kinds(&DEFAULT_DEVICES).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Devices expected on the bus, in bus order.
    #[serde(default = "default_devices")]
    pub devices: DeviceTable,
    #[serde(default)]
    pub cycle: CycleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { devices: default_devices(), cycle: CycleConfig::default() }
    }
}

#[derive(Debug, From)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
    #[from(skip)]
    EmptyTable,
    #[from(skip)]
    ZeroPeriod,
    #[from(skip)]
    PeriodTooLong(u64),
    #[from(skip)]
    StartDelayTooLong(u64),
    #[from(skip)]
    ZeroRotation,
    #[from(skip)]
    NoOutputChannels(DeviceKind),
    /// More channels requested than the output kind provides.
    #[from(skip)]
    TooManyChannels { kind: DeviceKind, requested: u8, available: u8 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot read config: {}", e),
            Self::Parse(e) => write!(f, "invalid config: {}", e),
            Self::EmptyTable => f.write_str("device table is empty"),
            Self::ZeroPeriod => f.write_str("cycle period must be non-zero"),
            Self::PeriodTooLong(us) => write!(
                f,
                "cycle period of {} us exceeds {} us",
                us, MAX_PERIOD_US
            ),
            Self::StartDelayTooLong(ms) => write!(
                f,
                "start delay of {} ms exceeds {} ms",
                ms, MAX_START_DELAY_MS
            ),
            Self::ZeroRotation => {
                f.write_str("rotate_after_ticks must be non-zero")
            }
            Self::NoOutputChannels(kind) => {
                write!(f, "no output channels to drive on {}", kind)
            }
            Self::TooManyChannels { kind, requested, available } => write!(
                f,
                "{} channels requested but {} has {}",
                requested, kind, available
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl AppConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse and validate a JSON document.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cycle = &self.cycle;
        if self.devices.is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        if cycle.period_us == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        if cycle.period_us > MAX_PERIOD_US {
            return Err(ConfigError::PeriodTooLong(cycle.period_us));
        }
        if cycle.start_delay_ms > MAX_START_DELAY_MS {
            return Err(ConfigError::StartDelayTooLong(cycle.start_delay_ms));
        }
        if cycle.rotate_after_ticks == 0 {
            return Err(ConfigError::ZeroRotation);
        }

        let available = cycle.output_kind.output_channels();
        let requested = cycle.channels();
        if requested == 0 {
            return Err(ConfigError::NoOutputChannels(cycle.output_kind));
        }
        // Channels past the kind's count have no process-data slot.
        if requested > available {
            return Err(ConfigError::TooManyChannels {
                kind: cycle.output_kind,
                requested,
                available,
            });
        }
        Ok(())
    }
}
