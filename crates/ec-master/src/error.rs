use crate::lifecycle::Stage;

/// Errors that abort master acquisition.
///
/// Each variant names the stage that failed. By the time the error reaches
/// the caller every earlier stage has already been rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquireError<E: core::fmt::Debug> {
    /// The network device could not be opened.
    DeviceOpen(E),
    /// The device opened but no hardware is bound to it.
    DeviceAbsent,
    /// No master context could be allocated.
    Allocation(E),
    /// The master context could not be initialised against the device.
    MasterInit(E),
    /// The devices on the bus do not match the expected table.
    ConfigMismatch(E),
    /// At least one device could not be activated.
    Activation(E),
}

impl<E: core::fmt::Debug> AcquireError<E> {
    pub fn stage(&self) -> Stage {
        match self {
            AcquireError::DeviceOpen(_) => Stage::OpenDevice,
            AcquireError::DeviceAbsent => Stage::VerifyDevice,
            AcquireError::Allocation(_) => Stage::AllocateMaster,
            AcquireError::MasterInit(_) => Stage::InitMaster,
            AcquireError::ConfigMismatch(_) => Stage::CheckDevices,
            AcquireError::Activation(_) => Stage::ActivateDevices,
        }
    }

    /// The driver error behind the failure, if there is one.
    pub fn source_error(&self) -> Option<&E> {
        match self {
            AcquireError::DeviceAbsent => None,
            AcquireError::DeviceOpen(e)
            | AcquireError::Allocation(e)
            | AcquireError::MasterInit(e)
            | AcquireError::ConfigMismatch(e)
            | AcquireError::Activation(e) => Some(e),
        }
    }
}

impl<E: core::fmt::Debug + core::fmt::Display> core::fmt::Display
    for AcquireError<E>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AcquireError::DeviceOpen(e) => {
                write!(f, "could not open network device: {}", e)
            }
            AcquireError::DeviceAbsent => write!(f, "no device bound"),
            AcquireError::Allocation(e) => {
                write!(f, "could not allocate master: {}", e)
            }
            AcquireError::MasterInit(e) => {
                write!(f, "could not init master: {}", e)
            }
            AcquireError::ConfigMismatch(e) => {
                write!(f, "device check failed: {}", e)
            }
            AcquireError::Activation(e) => {
                write!(f, "could not activate devices: {}", e)
            }
        }
    }
}

impl<E: core::fmt::Debug + core::fmt::Display> core::error::Error
    for AcquireError<E>
{
}

/// Errors from process data access on an acquired master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MasterError<E: core::fmt::Debug> {
    /// The handle has already been released.
    NotActive,
    /// The driver reported a failure.
    Driver(E),
}

impl<E: core::fmt::Debug + core::fmt::Display> core::fmt::Display
    for MasterError<E>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MasterError::NotActive => write!(f, "master is not active"),
            MasterError::Driver(e) => write!(f, "driver error: {}", e),
        }
    }
}

impl<E: core::fmt::Debug + core::fmt::Display> core::error::Error
    for MasterError<E>
{
}
