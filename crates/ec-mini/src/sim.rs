//! In-memory master for running without a fieldbus.
//!
//! [`SimMaster`] implements [`MasterApi`] over a simulated bus with a fixed
//! set of attached devices. Faults can be injected at any acquisition stage
//! and into the process-data exchange, and a [`SimProbe`] looks at the bus
//! from the outside while the master is in use.

use core::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ec_master::{MasterApi, Stage};
use ec_mini_icd::{DeviceKind, DeviceTable};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use tracing::debug;

/// Output writes kept for inspection; older ones are dropped.
pub const WRITE_LOG_DEPTH: usize = 4096;

/// Faults to inject into the simulated bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimFaults {
    /// Acquisition stage that fails.
    pub fail_stage: Option<Stage>,
    pub fail_reads: bool,
    pub fail_writes: bool,
    /// Time every process-data write spends on the wire.
    pub exchange_latency: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    Injected(Stage),
    /// Process-data frame lost.
    FrameLost,
    Mismatch {
        position: usize,
        expected: Option<DeviceKind>,
        found: Option<DeviceKind>,
    },
    NoSuchChannel {
        position: usize,
        channel: u8,
    },
}

impl core::fmt::Display for SimError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Injected(stage) => write!(f, "injected fault at {}", stage),
            Self::FrameLost => f.write_str("process data frame lost"),
            Self::Mismatch { position, expected, found } => {
                let name = |kind: &Option<DeviceKind>| {
                    kind.map_or("nothing", |k| k.name())
                };
                write!(
                    f,
                    "device {} is {}, expected {}",
                    position,
                    name(found),
                    name(expected)
                )
            }
            Self::NoSuchChannel { position, channel } => {
                write!(f, "device {} has no channel {}", position, channel)
            }
        }
    }
}

impl core::error::Error for SimError {}

/// One attached device and its slice of the process image.
#[derive(Debug)]
struct Terminal {
    kind: DeviceKind,
    /// What the field presents on the inputs.
    inputs: Vec<i32>,
    /// Inputs as of the last process-data read.
    latched: Vec<i32>,
    /// Outputs written since the last exchange.
    staged: Vec<i32>,
    /// Outputs as last sent on the bus.
    outputs: Vec<i32>,
}

impl Terminal {
    fn new(kind: DeviceKind) -> Self {
        let inputs = usize::from(kind.input_channels());
        let outputs = usize::from(kind.output_channels());
        Self {
            kind,
            inputs: vec![0; inputs],
            latched: vec![0; inputs],
            staged: vec![0; outputs],
            outputs: vec![0; outputs],
        }
    }
}

#[derive(Debug)]
struct SimBus {
    terminals: Vec<Terminal>,
    faults: SimFaults,
    /// Resources handed out and not yet given back.
    live: i32,
    active: bool,
    frames_read: u64,
    frames_written: u64,
    clears: u32,
    writes: VecDeque<(usize, u8, i32)>,
}

impl SimBus {
    fn fails(&self, stage: Stage) -> bool {
        self.faults.fail_stage == Some(stage)
    }

    fn take(&mut self, stage: Stage) -> Result<(), SimError> {
        if self.fails(stage) {
            return Err(SimError::Injected(stage));
        }
        self.live += 1;
        Ok(())
    }

    fn terminal(&self, position: usize) -> Option<&Terminal> {
        self.terminals.get(position)
    }
}

type SharedBus = Arc<Mutex<CriticalSectionRawMutex, RefCell<SimBus>>>;

fn with_bus<R>(bus: &SharedBus, f: impl FnOnce(&mut SimBus) -> R) -> R {
    bus.lock(|bus| f(&mut bus.borrow_mut()))
}

/// Handle to the simulated network interface.
#[derive(Debug)]
pub struct SimNic {
    _private: (),
}

/// Simulated master context.
#[derive(Debug)]
pub struct SimContext {
    initialised: bool,
}

#[derive(Debug, Clone)]
pub struct SimMaster {
    bus: SharedBus,
}

impl SimMaster {
    /// A bus with exactly the devices `table` describes attached.
    pub fn mirroring(table: &DeviceTable) -> Self {
        Self::with_devices(table.kinds())
    }

    pub fn with_devices(kinds: &[DeviceKind]) -> Self {
        let bus = SimBus {
            terminals: kinds.iter().copied().map(Terminal::new).collect(),
            faults: SimFaults::default(),
            live: 0,
            active: false,
            frames_read: 0,
            frames_written: 0,
            clears: 0,
            writes: VecDeque::new(),
        };
        debug!("Simulated bus with {} devices.", kinds.len());
        Self { bus: Arc::new(Mutex::new(RefCell::new(bus))) }
    }

    pub fn with_faults(self, faults: SimFaults) -> Self {
        with_bus(&self.bus, |bus| bus.faults = faults);
        self
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe { bus: self.bus.clone() }
    }
}

impl MasterApi for SimMaster {
    type Device = SimNic;
    type Master = SimContext;
    type Error = SimError;

    fn open_device(&mut self) -> Result<SimNic, SimError> {
        with_bus(&self.bus, |bus| bus.take(Stage::OpenDevice))?;
        Ok(SimNic { _private: () })
    }

    fn device_present(&self, _device: &SimNic) -> bool {
        with_bus(&self.bus, |bus| !bus.fails(Stage::VerifyDevice))
    }

    fn close_device(&mut self, _device: SimNic) {
        with_bus(&self.bus, |bus| bus.live -= 1);
    }

    fn allocate_master(&mut self) -> Result<SimContext, SimError> {
        with_bus(&self.bus, |bus| bus.take(Stage::AllocateMaster))?;
        Ok(SimContext { initialised: false })
    }

    fn free_master(&mut self, _master: SimContext) {
        with_bus(&self.bus, |bus| bus.live -= 1);
    }

    fn init_master(
        &mut self,
        master: &mut SimContext,
        _device: &SimNic,
    ) -> Result<(), SimError> {
        with_bus(&self.bus, |bus| bus.take(Stage::InitMaster))?;
        master.initialised = true;
        Ok(())
    }

    fn clear_master(&mut self, master: &mut SimContext) {
        if master.initialised {
            master.initialised = false;
            with_bus(&self.bus, |bus| bus.live -= 1);
        }
    }

    fn check_devices(
        &mut self,
        _master: &mut SimContext,
        table: &DeviceTable,
    ) -> Result<(), SimError> {
        with_bus(&self.bus, |bus| {
            if bus.fails(Stage::CheckDevices) {
                return Err(SimError::Injected(Stage::CheckDevices));
            }
            let slots = table.len().max(bus.terminals.len());
            for position in 0..slots {
                let expected = table.get(position).map(|d| d.kind);
                let found = bus.terminal(position).map(|t| t.kind);
                if expected != found {
                    let err = SimError::Mismatch { position, expected, found };
                    return Err(err);
                }
            }
            Ok(())
        })
    }

    fn activate_all_devices(
        &mut self,
        _master: &mut SimContext,
    ) -> Result<(), SimError> {
        with_bus(&self.bus, |bus| {
            bus.take(Stage::ActivateDevices)?;
            bus.active = true;
            Ok(())
        })
    }

    fn deactivate_all_devices(&mut self, _master: &mut SimContext) {
        with_bus(&self.bus, |bus| {
            bus.active = false;
            bus.live -= 1;
        });
    }

    fn read_process_data(
        &mut self,
        _master: &mut SimContext,
    ) -> Result<(), SimError> {
        with_bus(&self.bus, |bus| {
            if bus.faults.fail_reads {
                return Err(SimError::FrameLost);
            }
            for t in bus.terminals.iter_mut() {
                t.latched.clone_from(&t.inputs);
            }
            bus.frames_read += 1;
            Ok(())
        })
    }

    fn write_process_data(
        &mut self,
        _master: &mut SimContext,
    ) -> Result<(), SimError> {
        let latency = with_bus(&self.bus, |bus| bus.faults.exchange_latency);
        if let Some(latency) = latency {
            // Outside the lock so the probe stays usable meanwhile.
            std::thread::sleep(latency);
        }

        with_bus(&self.bus, |bus| {
            if bus.faults.fail_writes {
                return Err(SimError::FrameLost);
            }
            for t in bus.terminals.iter_mut() {
                t.outputs.clone_from(&t.staged);
            }
            bus.frames_written += 1;
            Ok(())
        })
    }

    fn clear_process_data(&mut self, _master: &mut SimContext) {
        with_bus(&self.bus, |bus| {
            for t in bus.terminals.iter_mut() {
                t.staged.fill(0);
                t.outputs.fill(0);
            }
            bus.clears += 1;
        });
    }

    /// Reads latched inputs, or reads back the sent outputs of devices that
    /// have no inputs.
    fn read_value(
        &self,
        _master: &SimContext,
        position: usize,
        channel: u8,
    ) -> Result<i32, SimError> {
        with_bus(&self.bus, |bus| {
            let t = bus.terminal(position);
            let image = t.map(|t| {
                if t.latched.is_empty() {
                    &t.outputs
                } else {
                    &t.latched
                }
            });
            image
                .and_then(|image| image.get(usize::from(channel)).copied())
                .ok_or(SimError::NoSuchChannel { position, channel })
        })
    }

    fn write_value(
        &mut self,
        _master: &mut SimContext,
        position: usize,
        channel: u8,
        value: i32,
    ) -> Result<(), SimError> {
        with_bus(&self.bus, |bus| {
            let slot = bus
                .terminals
                .get_mut(position)
                .and_then(|t| t.staged.get_mut(usize::from(channel)))
                .ok_or(SimError::NoSuchChannel { position, channel })?;
            *slot = value;

            if bus.writes.len() == WRITE_LOG_DEPTH {
                bus.writes.pop_front();
            }
            bus.writes.push_back((position, channel, value));
            Ok(())
        })
    }
}

/// Outside view of a simulated bus.
#[derive(Debug, Clone)]
pub struct SimProbe {
    bus: SharedBus,
}

impl SimProbe {
    /// Resources currently held by the master. Zero once fully released.
    pub fn live(&self) -> i32 {
        with_bus(&self.bus, |bus| bus.live)
    }

    pub fn is_active(&self) -> bool {
        with_bus(&self.bus, |bus| bus.active)
    }

    pub fn frames_read(&self) -> u64 {
        with_bus(&self.bus, |bus| bus.frames_read)
    }

    pub fn frames_written(&self) -> u64 {
        with_bus(&self.bus, |bus| bus.frames_written)
    }

    /// Times the process image was cleared.
    pub fn clears(&self) -> u32 {
        with_bus(&self.bus, |bus| bus.clears)
    }

    /// Output value last sent to the bus.
    pub fn output(&self, position: usize, channel: u8) -> Option<i32> {
        with_bus(&self.bus, |bus| {
            bus.terminal(position)?.outputs.get(usize::from(channel)).copied()
        })
    }

    /// Recent `(position, channel, value)` output writes, oldest first.
    pub fn writes(&self) -> Vec<(usize, u8, i32)> {
        with_bus(&self.bus, |bus| bus.writes.iter().copied().collect())
    }

    pub fn set_faults(&self, faults: SimFaults) {
        with_bus(&self.bus, |bus| bus.faults = faults);
    }

    /// Drive an input channel. Returns `false` if there is no such input.
    pub fn set_input(&self, position: usize, channel: u8, value: i32) -> bool {
        with_bus(&self.bus, |bus| {
            let slot = bus
                .terminals
                .get_mut(position)
                .and_then(|t| t.inputs.get_mut(usize::from(channel)));
            match slot {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec_master::{acquire, AcquireError};
    use DeviceKind::*;

    fn table(kinds: &[DeviceKind]) -> DeviceTable {
        DeviceTable::from_kinds(kinds).unwrap()
    }

    #[test]
    fn outputs_reach_the_bus_only_on_exchange() {
        let table = table(&[EK1100, EL2004]);
        let sim = SimMaster::mirroring(&table);
        let probe = sim.probe();
        let mut master = acquire(sim, &table).map_err(|(e, _)| e).unwrap();

        master.write_value(1, 2, 1).unwrap();
        assert_eq!(probe.output(1, 2), Some(0));

        master.write_process_data().unwrap();
        assert_eq!(probe.output(1, 2), Some(1));
        assert_eq!(master.read_value(1, 2), Ok(1));
    }

    #[test]
    fn inputs_are_latched_on_read() {
        let table = table(&[EK1100, EL1014]);
        let sim = SimMaster::mirroring(&table);
        let probe = sim.probe();
        let mut master = acquire(sim, &table).map_err(|(e, _)| e).unwrap();

        assert!(probe.set_input(1, 3, 1));
        assert_eq!(master.read_value(1, 3), Ok(0));
        master.read_process_data().unwrap();
        assert_eq!(master.read_value(1, 3), Ok(1));
        assert!(!probe.set_input(0, 0, 1));
    }

    #[test]
    fn unknown_channels_are_rejected() {
        let table = table(&[EK1100, EL2004]);
        let mut master = acquire(SimMaster::mirroring(&table), &table)
            .map_err(|(e, _)| e)
            .unwrap();

        let err = master.write_value(1, 4, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "driver error: device 1 has no channel 4"
        );
        assert!(master.write_value(7, 0, 1).is_err());
    }

    #[test]
    fn wrong_devices_fail_the_check() {
        let expected = table(&[EK1100, EL2004, EL2004]);
        let sim = SimMaster::with_devices(&[EK1100, EL2004, EL1014]);
        let probe = sim.probe();

        let (err, _) = acquire(sim, &expected).err().unwrap();

        assert_eq!(
            err,
            AcquireError::ConfigMismatch(SimError::Mismatch {
                position: 2,
                expected: Some(EL2004),
                found: Some(EL1014),
            })
        );
        assert_eq!(err.stage(), Stage::CheckDevices);
        assert_eq!(probe.live(), 0);
    }

    #[test]
    fn release_clears_outputs_and_gives_everything_back() {
        let table = table(&[EK1100, EL2004]);
        let sim = SimMaster::mirroring(&table);
        let probe = sim.probe();
        let mut master = acquire(sim, &table).map_err(|(e, _)| e).unwrap();
        assert_eq!(probe.live(), 4);
        assert!(probe.is_active());

        master.write_value(1, 0, 1).unwrap();
        master.write_process_data().unwrap();
        drop(master);

        assert_eq!(probe.output(1, 0), Some(0));
        assert_eq!(probe.clears(), 1);
        assert_eq!(probe.live(), 0);
        assert!(!probe.is_active());
    }

    #[test]
    fn injected_stage_faults_roll_back() {
        let table = table(&[EK1100, EL2004]);
        let stages = [
            Stage::OpenDevice,
            Stage::VerifyDevice,
            Stage::AllocateMaster,
            Stage::InitMaster,
            Stage::CheckDevices,
            Stage::ActivateDevices,
        ];

        for stage in stages {
            let faults =
                SimFaults { fail_stage: Some(stage), ..Default::default() };
            let sim = SimMaster::mirroring(&table).with_faults(faults);
            let probe = sim.probe();

            let (err, _) = acquire(sim, &table).err().unwrap();

            assert_eq!(err.stage(), stage);
            assert_eq!(probe.live(), 0, "leak after failing at {stage}");
        }
    }
}
