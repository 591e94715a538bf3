use portable_atomic::{AtomicBool, AtomicU64, Ordering};

/// Counters shared between the cycle worker and whoever watches it.
#[derive(Debug, Default)]
pub struct CycleStats {
    ticks: AtomicU64,
    read_failures: AtomicU64,
    write_failures: AtomicU64,
    overruns: AtomicU64,
    rotations: AtomicU64,
    running: AtomicBool,
}

/// Point-in-time copy of [`CycleStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub read_failures: u64,
    pub write_failures: u64,
    pub overruns: u64,
    /// Number of times a new target was selected.
    pub rotations: u64,
    pub running: bool,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_tick(&self, report: &super::TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if report.read_failed {
            self.read_failures.fetch_add(1, Ordering::Relaxed);
        }
        if report.write_failed {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
        if report.retargeted {
            self.rotations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Acquire),
        }
    }
}
