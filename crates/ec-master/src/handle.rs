use tracing::info;

use crate::api::MasterApi;
use crate::error::MasterError;
use crate::lifecycle::Resources;

/// Activation state of a master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MasterState {
    Inactive,
    /// Device table checked against the bus, devices not yet active.
    Validated,
    Activated,
}

/// Owning handle to an acquired master.
///
/// Only [`acquire`](crate::acquire) creates one, and only once every stage
/// has succeeded. Releasing runs the teardown of every completed stage in
/// reverse order. Release is idempotent and also happens on drop.
pub struct MasterHandle<A: MasterApi> {
    resources: Resources<A>,
}

impl<A: MasterApi> MasterHandle<A> {
    pub(crate) fn new(resources: Resources<A>) -> Self {
        Self { resources }
    }

    pub fn state(&self) -> MasterState {
        self.resources.state
    }

    pub fn is_active(&self) -> bool {
        self.state() == MasterState::Activated
    }

    /// The driver behind this master.
    pub fn api(&self) -> &A {
        &self.resources.api
    }

    fn parts(
        &mut self,
    ) -> Result<(&mut A, &mut A::Master), MasterError<A::Error>> {
        if !self.is_active() {
            return Err(MasterError::NotActive);
        }
        let Resources { api, master, .. } = &mut self.resources;
        master.as_mut().map(|m| (api, m)).ok_or(MasterError::NotActive)
    }

    pub fn read_process_data(&mut self) -> Result<(), MasterError<A::Error>> {
        let (api, master) = self.parts()?;
        api.read_process_data(master).map_err(MasterError::Driver)
    }

    pub fn write_process_data(&mut self) -> Result<(), MasterError<A::Error>> {
        let (api, master) = self.parts()?;
        api.write_process_data(master).map_err(MasterError::Driver)
    }

    pub fn read_value(
        &self,
        position: usize,
        channel: u8,
    ) -> Result<i32, MasterError<A::Error>> {
        if !self.is_active() {
            return Err(MasterError::NotActive);
        }
        let master =
            self.resources.master.as_ref().ok_or(MasterError::NotActive)?;
        self.resources
            .api
            .read_value(master, position, channel)
            .map_err(MasterError::Driver)
    }

    pub fn write_value(
        &mut self,
        position: usize,
        channel: u8,
        value: i32,
    ) -> Result<(), MasterError<A::Error>> {
        let (api, master) = self.parts()?;
        api.write_value(master, position, channel, value)
            .map_err(MasterError::Driver)
    }

    /// Tear the master down.
    ///
    /// The process image is cleared first, then devices are deactivated, the
    /// master cleared and freed, and the device closed. Calling this again is
    /// a no-op.
    pub fn release(&mut self) {
        if !self.resources.holds_anything() {
            return;
        }
        info!("Releasing master.");

        if self.is_active() {
            let Resources { api, master, .. } = &mut self.resources;
            if let Some(master) = master.as_mut() {
                api.clear_process_data(master);
            }
        }

        self.resources.unwind();
        info!("Master released.");
    }
}

impl<A: MasterApi> Drop for MasterHandle<A> {
    fn drop(&mut self) {
        self.release();
    }
}
