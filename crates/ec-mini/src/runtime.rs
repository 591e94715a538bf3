//! Bring the master up, run the cycle on its own thread, tear it all down.

use core::fmt::{self, Debug};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use derive_more::From;
use ec_master::{acquire, AcquireError, MasterApi, MasterHandle};
use futures::executor::block_on;
use tracing::{error, info};

use crate::config::{AppConfig, ConfigError};
use crate::cycle::{
    CycleScheduler, CycleState, CycleStats, StatsSnapshot, StopSignal,
};

/// Name of the thread running the cycle.
pub const CYCLE_THREAD: &str = "ec-cycle";

#[derive(Debug, From)]
pub enum StartError<E: Debug> {
    Config(ConfigError),
    Acquire(AcquireError<E>),
    Spawn(io::Error),
}

impl<E: Debug + fmt::Display> fmt::Display for StartError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{}", e),
            Self::Acquire(e) => {
                write!(f, "master start failed at '{}': {}", e.stage(), e)
            }
            Self::Spawn(e) => write!(f, "cannot spawn cycle thread: {}", e),
        }
    }
}

impl<E: Debug + fmt::Display> std::error::Error for StartError<E> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopError {
    /// The cycle thread panicked. The master was released while unwinding.
    WorkerPanicked,
}

impl fmt::Display for StopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkerPanicked => f.write_str("cycle thread panicked"),
        }
    }
}

impl std::error::Error for StopError {}

enum Inner<A: MasterApi> {
    /// Master is up but no cycle runs.
    Idle(MasterHandle<A>),
    /// The worker owns the master until it is joined.
    Cycling(JoinHandle<(MasterHandle<A>, CycleState)>),
}

/// A running master and, if enabled, its cyclic task.
///
/// Dropping a runtime stops it the same way [`Runtime::stop`] does.
pub struct Runtime<A: MasterApi> {
    stop: Arc<StopSignal>,
    stats: Arc<CycleStats>,
    inner: Option<Inner<A>>,
}

impl<A> Runtime<A>
where
    A: MasterApi + Send + 'static,
    A::Device: Send,
    A::Master: Send,
{
    /// Validate `config`, acquire the master and start the cycle.
    ///
    /// Nothing is left held when this fails.
    pub fn start(
        api: A,
        config: AppConfig,
    ) -> Result<Self, StartError<A::Error>> {
        config.validate()?;

        info!("Starting master with {} devices.", config.devices.len());
        let mut master =
            acquire(api, &config.devices).map_err(|(err, _api)| err)?;

        let stop = Arc::new(StopSignal::new());
        let stats = Arc::new(CycleStats::new());

        if !config.cycle.enabled {
            info!("Cyclic task disabled; master idle.");
            return Ok(Self { stop, stats, inner: Some(Inner::Idle(master)) });
        }

        let scheduler = CycleScheduler::new(
            config.cycle,
            Arc::new(config.devices),
            stats.clone(),
        );
        let worker_stop = stop.clone();
        let worker = thread::Builder::new()
            .name(CYCLE_THREAD.into())
            .spawn(move || {
                let state = block_on(scheduler.run(&mut master, &worker_stop));
                (master, state)
            })?;

        info!("Cyclic task started.");
        Ok(Self { stop, stats, inner: Some(Inner::Cycling(worker)) })
    }
}

impl<A: MasterApi> Runtime<A> {
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the cycle thread is still ticking.
    pub fn is_cycling(&self) -> bool {
        matches!(&self.inner, Some(Inner::Cycling(w)) if !w.is_finished())
    }

    /// Halt the cycle, wait for its last tick, then release the master.
    ///
    /// Returns the final cycle state, or `None` if no cycle was running.
    pub fn stop(mut self) -> Result<Option<CycleState>, StopError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<Option<CycleState>, StopError> {
        let state = match self.inner.take() {
            None => return Ok(None),
            Some(Inner::Idle(mut master)) => {
                master.release();
                None
            }
            Some(Inner::Cycling(worker)) => {
                info!("Stopping cyclic task.");
                self.stop.signal(());
                let Ok((mut master, state)) = worker.join() else {
                    error!("Cycle thread panicked.");
                    return Err(StopError::WorkerPanicked);
                };
                master.release();
                Some(state)
            }
        };
        info!("Master stopped.");
        Ok(state)
    }
}

impl<A: MasterApi> Drop for Runtime<A> {
    fn drop(&mut self) {
        // Errors were already logged.
        let _ = self.shutdown();
    }
}
