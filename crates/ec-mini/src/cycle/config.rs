use ec_mini_icd::DeviceKind;
use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Longest accepted tick period, one second.
pub const MAX_PERIOD_US: u64 = 1_000_000;

/// Longest accepted settling time before the first tick, one minute.
///
/// Deadlines are computed as `now + delay`; an unbounded delay overflows the
/// timer's instant arithmetic.
pub const MAX_START_DELAY_MS: u64 = 60_000;

/// Settings for the cyclic task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CycleConfig {
    /// Run the cyclic task at all. When off, the master is still acquired.
    pub enabled: bool,
    /// Tick period in microseconds.
    pub period_us: u64,
    /// Settling time between activation and the first tick.
    pub start_delay_ms: u64,
    /// Ticks spent on one output channel before moving to the next.
    pub rotate_after_ticks: u32,
    /// Kind of device whose outputs are driven.
    pub output_kind: DeviceKind,
    /// Channels driven per device; defaults to the kind's output count.
    pub channels: Option<u8>,
    /// Consecutive failing ticks before the task gives up. 0 never gives up.
    pub max_consecutive_failures: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_us: 1_000,
            start_delay_ms: 1_000,
            rotate_after_ticks: 21,
            output_kind: DeviceKind::EL2004,
            channels: None,
            max_consecutive_failures: 1_000,
        }
    }
}

impl CycleConfig {
    pub fn period(&self) -> Duration {
        Duration::from_micros(self.period_us)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn channels(&self) -> u8 {
        self.channels.unwrap_or(self.output_kind.output_channels())
    }
}
