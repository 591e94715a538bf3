use ec_mini_icd::DeviceTable;
use tracing::{error, info};

use crate::api::MasterApi;
use crate::error::AcquireError;
use crate::handle::{MasterHandle, MasterState};

/// Acquisition stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    OpenDevice,
    VerifyDevice,
    AllocateMaster,
    InitMaster,
    CheckDevices,
    ActivateDevices,
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Stage::OpenDevice => "open device",
            Stage::VerifyDevice => "verify device",
            Stage::AllocateMaster => "allocate master",
            Stage::InitMaster => "init master",
            Stage::CheckDevices => "check devices",
            Stage::ActivateDevices => "activate devices",
        };
        f.write_str(name)
    }
}

/// Teardown step registered by a completed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Undo {
    CloseDevice,
    FreeMaster,
    ClearMaster,
    DeactivateDevices,
}

/// One entry per `Undo` variant; each is pushed at most once.
const UNDO_DEPTH: usize = 4;

/// Everything acquired so far, plus how to give it back.
pub(crate) struct Resources<A: MasterApi> {
    pub(crate) api: A,
    pub(crate) device: Option<A::Device>,
    pub(crate) master: Option<A::Master>,
    pub(crate) state: MasterState,
    undo: heapless::Vec<Undo, UNDO_DEPTH>,
}

fn push_undo(stack: &mut heapless::Vec<Undo, UNDO_DEPTH>, undo: Undo) {
    let pushed = stack.push(undo).is_ok();
    debug_assert!(pushed, "undo stack overflow");
}

impl<A: MasterApi> Resources<A> {
    fn new(api: A) -> Self {
        Self {
            api,
            device: None,
            master: None,
            state: MasterState::Inactive,
            undo: heapless::Vec::new(),
        }
    }

    /// Run every acquisition stage, stopping at the first failure.
    ///
    /// The undo stack is left describing exactly what was acquired, whether
    /// this returns `Ok` or `Err`.
    fn run_stages(
        &mut self,
        table: &DeviceTable,
    ) -> Result<(), AcquireError<A::Error>> {
        info!("Opening network device.");
        let device =
            self.api.open_device().map_err(AcquireError::DeviceOpen)?;
        let present = self.api.device_present(&device);
        let device = self.device.insert(device);
        push_undo(&mut self.undo, Undo::CloseDevice);

        if !present {
            return Err(AcquireError::DeviceAbsent);
        }

        info!("Initialising master.");
        let master =
            self.api.allocate_master().map_err(AcquireError::Allocation)?;
        let master = self.master.insert(master);
        push_undo(&mut self.undo, Undo::FreeMaster);

        self.api
            .init_master(master, device)
            .map_err(AcquireError::MasterInit)?;
        push_undo(&mut self.undo, Undo::ClearMaster);

        info!("Checking {} devices.", table.len());
        self.api
            .check_devices(master, table)
            .map_err(AcquireError::ConfigMismatch)?;
        self.state = MasterState::Validated;

        info!("Activating all devices.");
        self.api
            .activate_all_devices(master)
            .map_err(AcquireError::Activation)?;
        push_undo(&mut self.undo, Undo::DeactivateDevices);
        self.state = MasterState::Activated;

        Ok(())
    }

    /// Pop and run undo actions until the stack is empty.
    pub(crate) fn unwind(&mut self) {
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::DeactivateDevices => {
                    if let Some(master) = self.master.as_mut() {
                        info!("Deactivating devices.");
                        self.api.deactivate_all_devices(master);
                    }
                }
                Undo::ClearMaster => {
                    if let Some(master) = self.master.as_mut() {
                        info!("Clearing master.");
                        self.api.clear_master(master);
                    }
                }
                Undo::FreeMaster => {
                    if let Some(master) = self.master.take() {
                        info!("Freeing master.");
                        self.api.free_master(master);
                    }
                }
                Undo::CloseDevice => {
                    if let Some(device) = self.device.take() {
                        info!("Closing network device.");
                        self.api.close_device(device);
                    }
                }
            }
        }
        self.state = MasterState::Inactive;
    }

    pub(crate) fn holds_anything(&self) -> bool {
        !self.undo.is_empty()
    }
}

/// Acquire a fully activated master over `api`.
///
/// On failure, everything acquired by the completed stages has been released
/// in reverse order, and the error is returned **together with** `api` so the
/// caller keeps ownership of the driver and may try again.
pub fn acquire<A: MasterApi>(
    api: A,
    table: &DeviceTable,
) -> Result<MasterHandle<A>, (AcquireError<A::Error>, A)> {
    let mut resources = Resources::new(api);

    match resources.run_stages(table) {
        Ok(()) => {
            info!("Master active with {} devices.", table.len());
            Ok(MasterHandle::new(resources))
        }
        Err(err) => {
            error!("Master acquisition failed at '{}': {}", err.stage(), err);
            resources.unwind();
            Err((err, resources.api))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec_mini_icd::DeviceKind;

    /// Driver that only fails where told to; holds nothing real.
    struct StubApi {
        fail_at: Option<Stage>,
    }

    impl StubApi {
        fn result(&self, stage: Stage) -> Result<(), &'static str> {
            if self.fail_at == Some(stage) {
                Err("stub failure")
            } else {
                Ok(())
            }
        }
    }

    impl MasterApi for StubApi {
        type Device = ();
        type Master = ();
        type Error = &'static str;

        fn open_device(&mut self) -> Result<(), &'static str> {
            self.result(Stage::OpenDevice)
        }
        fn device_present(&self, _: &()) -> bool {
            true
        }
        fn close_device(&mut self, _: ()) {}
        fn allocate_master(&mut self) -> Result<(), &'static str> {
            self.result(Stage::AllocateMaster)
        }
        fn free_master(&mut self, _: ()) {}
        fn init_master(&mut self, _: &mut (), _: &()) -> Result<(), &'static str> {
            self.result(Stage::InitMaster)
        }
        fn clear_master(&mut self, _: &mut ()) {}
        fn check_devices(
            &mut self,
            _: &mut (),
            _: &DeviceTable,
        ) -> Result<(), &'static str> {
            self.result(Stage::CheckDevices)
        }
        fn activate_all_devices(&mut self, _: &mut ()) -> Result<(), &'static str> {
            self.result(Stage::ActivateDevices)
        }
        fn deactivate_all_devices(&mut self, _: &mut ()) {}
        fn read_process_data(&mut self, _: &mut ()) -> Result<(), &'static str> {
            Ok(())
        }
        fn write_process_data(&mut self, _: &mut ()) -> Result<(), &'static str> {
            Ok(())
        }
        fn clear_process_data(&mut self, _: &mut ()) {}
        fn read_value(&self, _: &(), _: usize, _: u8) -> Result<i32, &'static str> {
            Ok(0)
        }
        fn write_value(
            &mut self,
            _: &mut (),
            _: usize,
            _: u8,
            _: i32,
        ) -> Result<(), &'static str> {
            Ok(())
        }
    }

    fn run(
        fail_at: Option<Stage>,
    ) -> (Result<(), AcquireError<&'static str>>, Resources<StubApi>) {
        let table = DeviceTable::from_kinds(&[DeviceKind::EK1100]).unwrap();
        let mut resources = Resources::new(StubApi { fail_at });
        let result = resources.run_stages(&table);
        (result, resources)
    }

    #[test]
    fn table_check_marks_master_validated() {
        let (result, mut resources) = run(Some(Stage::ActivateDevices));

        assert_eq!(result, Err(AcquireError::Activation("stub failure")));
        assert_eq!(resources.state, MasterState::Validated);

        resources.unwind();
        assert_eq!(resources.state, MasterState::Inactive);
        assert!(!resources.holds_anything());
    }

    #[test]
    fn failed_check_never_validates() {
        let (result, resources) = run(Some(Stage::CheckDevices));

        assert!(result.is_err());
        assert_eq!(resources.state, MasterState::Inactive);
    }

    #[test]
    fn all_stages_end_activated() {
        let (result, mut resources) = run(None);

        assert_eq!(result, Ok(()));
        assert_eq!(resources.state, MasterState::Activated);

        resources.unwind();
        assert_eq!(resources.state, MasterState::Inactive);
    }
}
