use ec_mini_icd::DeviceTable;

/// Access to the driver layer beneath the master.
///
/// Implementors own the network device and the master context and expose the
/// primitive operations the lifecycle manager sequences. Operations that can
/// fail return the driver's error; teardown operations cannot fail.
pub trait MasterApi {
    /// Handle to the opened network device.
    type Device;
    /// Master context bound to an opened device.
    type Master;
    /// Error type for driver failures.
    type Error: core::fmt::Debug + core::fmt::Display;

    fn open_device(&mut self) -> Result<Self::Device, Self::Error>;

    /// Whether the opened device is actually backed by hardware.
    fn device_present(&self, device: &Self::Device) -> bool;

    fn close_device(&mut self, device: Self::Device);

    fn allocate_master(&mut self) -> Result<Self::Master, Self::Error>;

    fn free_master(&mut self, master: Self::Master);

    /// Initialise the master context against the opened device.
    fn init_master(
        &mut self,
        master: &mut Self::Master,
        device: &Self::Device,
    ) -> Result<(), Self::Error>;

    fn clear_master(&mut self, master: &mut Self::Master);

    /// Compare the expected table with what the master discovered on the bus,
    /// position by position.
    fn check_devices(
        &mut self,
        master: &mut Self::Master,
        table: &DeviceTable,
    ) -> Result<(), Self::Error>;

    fn activate_all_devices(
        &mut self,
        master: &mut Self::Master,
    ) -> Result<(), Self::Error>;

    fn deactivate_all_devices(&mut self, master: &mut Self::Master);

    /// Exchange a frame and latch the inputs into the process image.
    fn read_process_data(
        &mut self,
        master: &mut Self::Master,
    ) -> Result<(), Self::Error>;

    /// Send the outputs held in the process image.
    fn write_process_data(
        &mut self,
        master: &mut Self::Master,
    ) -> Result<(), Self::Error>;

    /// Reset the process image to its idle state.
    fn clear_process_data(&mut self, master: &mut Self::Master);

    fn read_value(
        &self,
        master: &Self::Master,
        position: usize,
        channel: u8,
    ) -> Result<i32, Self::Error>;

    fn write_value(
        &mut self,
        master: &mut Self::Master,
        position: usize,
        channel: u8,
        value: i32,
    ) -> Result<(), Self::Error>;
}
