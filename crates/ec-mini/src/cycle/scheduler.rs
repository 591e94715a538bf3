use std::sync::Arc;

use ec_master::{MasterApi, MasterError, MasterHandle};
use ec_mini_icd::DeviceTable;
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};
use tracing::{debug, error, info, warn};

use super::{
    CycleConfig, CyclePhase, CycleState, CycleStats, StopSignal, TickReport,
    PHASE_WRAP_MS,
};
use crate::sequencer::Sequencer;

/// Absolute deadline of the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTick {
    pub deadline: Instant,
    pub period: Duration,
}

impl ScheduledTick {
    pub fn new(first: Instant, period: Duration) -> Self {
        Self { deadline: first, period }
    }

    /// Move one period past the previous deadline, however late we are.
    pub fn rearm(&mut self) {
        self.deadline += self.period;
    }

    pub fn is_overdue(&self, now: Instant) -> bool {
        self.deadline < now
    }
}

/// Drives one output channel of one device at a time, round robin.
pub struct CycleScheduler {
    config: CycleConfig,
    channels: u8,
    sequencer: Sequencer,
    state: CycleState,
    stats: Arc<CycleStats>,
}

impl CycleScheduler {
    pub fn new(
        config: CycleConfig,
        table: Arc<DeviceTable>,
        stats: Arc<CycleStats>,
    ) -> Self {
        let channels = config.channels();
        Self {
            config,
            channels,
            sequencer: Sequencer::new(table),
            state: CycleState::default(),
            stats,
        }
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    /// Run a single tick against `master`.
    ///
    /// Failed reads and writes are reported and counted but never cut the
    /// tick short, so the output pattern keeps its timing.
    pub fn tick<A: MasterApi>(
        &mut self,
        master: &mut MasterHandle<A>,
    ) -> TickReport {
        let mut report = TickReport::default();
        let kind = self.config.output_kind;

        if self.state.first_tick {
            self.state.first_tick = false;
            self.state.phase = CyclePhase::Steady;
            self.state.target = self.sequencer.next_match(kind).position;
            match self.state.target {
                Some(position) => {
                    info!("First {} output at position {}.", kind, position);
                    report.retargeted = true;
                }
                None => {
                    warn!("No {} in the device table; outputs idle.", kind)
                }
            }
        } else if let Err(e) = master.read_process_data() {
            self.report_failure("read process data", &e);
            report.read_failed = true;
        }

        self.state.phase_ms = (self.state.phase_ms + 1) % PHASE_WRAP_MS;

        self.state.ticks_on_channel += 1;
        if self.state.ticks_on_channel >= self.config.rotate_after_ticks {
            self.state.ticks_on_channel = 0;
            self.state.channel += 1;
            report.rotated = true;

            if self.state.channel >= self.channels {
                self.state.channel = 0;
                let next = self.sequencer.next_match(kind);
                self.state.target = next.position;
                report.retargeted = next.position.is_some();
                if next.wrapped {
                    self.state.level_high = !self.state.level_high;
                }
                debug!(
                    "Output target {:?}, level {}.",
                    self.state.target,
                    self.state.level()
                );
            }
        }

        if let Some(target) = self.state.target {
            let (channel, level) = (self.state.channel, self.state.level());
            if let Err(e) = master.write_value(target, channel, level) {
                self.report_failure("write output", &e);
                report.write_failed = true;
            }
        }

        if let Err(e) = master.write_process_data() {
            self.report_failure("write process data", &e);
            report.write_failed = true;
        }

        self.track_failures(&report);
        self.stats.record_tick(&report);
        report
    }

    /// Only the first failure of a streak is logged.
    fn report_failure<E: core::fmt::Debug + core::fmt::Display>(
        &self,
        what: &str,
        err: &MasterError<E>,
    ) {
        if self.state.failure_streak == 0 {
            warn!("Failed to {}: {}", what, err);
        }
    }

    fn track_failures(&mut self, report: &TickReport) {
        if !report.failed() {
            if self.state.failure_streak > 0 {
                info!(
                    "Process data recovered after {} failing ticks.",
                    self.state.failure_streak
                );
            }
            self.state.failure_streak = 0;
            return;
        }

        self.state.failure_streak += 1;
        let limit = self.config.max_consecutive_failures;
        if limit > 0 && self.state.failure_streak >= limit {
            error!("{} consecutive failing ticks, halting cycle.", limit);
            self.state.phase = CyclePhase::Faulted;
        }
    }

    /// Tick every period until `stop` is signalled or the cycle faults.
    ///
    /// The first tick fires one start delay from now. Each later deadline is
    /// one period after the previous one; a deadline already in the past
    /// fires at once and counts as an overrun. A tick in progress always
    /// completes before the stop is seen.
    pub async fn run<A: MasterApi>(
        mut self,
        master: &mut MasterHandle<A>,
        stop: &StopSignal,
    ) -> CycleState {
        let mut next = ScheduledTick::new(
            Instant::now() + self.config.start_delay(),
            self.config.period(),
        );
        info!(
            "Cycle starting: period {} us, first tick in {} ms.",
            self.config.period_us, self.config.start_delay_ms
        );
        self.stats.set_running(true);

        while !self.state.is_halted() {
            match select(stop.wait(), Timer::at(next.deadline)).await {
                Either::First(()) => {
                    self.state.phase = CyclePhase::Stopped;
                    break;
                }
                Either::Second(()) => {}
            }

            self.tick(master);
            next.rearm();
            if next.is_overdue(Instant::now()) {
                self.stats.record_overrun();
            }
        }

        self.stats.set_running(false);
        info!("Cycle halted ({:?}).", self.state.phase);
        self.state
    }
}
