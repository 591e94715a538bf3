/// The phase counter wraps back to zero here.
pub const PHASE_WRAP_MS: u32 = 1000;

/// Where the cyclic task is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// No tick has run yet.
    WarmingUp,
    Steady,
    /// Halted by an external stop.
    Stopped,
    /// Halted after too many consecutive failing ticks.
    Faulted,
}

/// Mutable state carried from one tick to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleState {
    /// Milliseconds into the current second, `0..PHASE_WRAP_MS`.
    pub phase_ms: u32,
    /// Ticks since the channel last advanced.
    pub ticks_on_channel: u32,
    pub target: Option<usize>,
    pub channel: u8,
    /// Output level written to the current target.
    pub level_high: bool,
    pub first_tick: bool,
    pub phase: CyclePhase,
    /// Ticks in a row where a read or write failed.
    pub failure_streak: u32,
}

impl Default for CycleState {
    fn default() -> Self {
        Self {
            phase_ms: 0,
            ticks_on_channel: 0,
            target: None,
            channel: 0,
            level_high: false,
            first_tick: true,
            phase: CyclePhase::WarmingUp,
            failure_streak: 0,
        }
    }
}

impl CycleState {
    /// The value written to the current output.
    pub fn level(&self) -> i32 {
        i32::from(self.level_high)
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.phase, CyclePhase::Stopped | CyclePhase::Faulted)
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub read_failed: bool,
    pub write_failed: bool,
    /// The channel moved on this tick.
    pub rotated: bool,
    /// A new target was picked on this tick.
    pub retargeted: bool,
}

impl TickReport {
    pub fn failed(&self) -> bool {
        self.read_failed || self.write_failed
    }
}
