#![cfg_attr(not(feature = "use-std"), no_std)]
//! Device catalogue and device table shared by the master lifecycle and the
//! cyclic task.

use serde::{Deserialize, Serialize};

/// Upper bound on the number of slots a device table can hold.
pub const MAX_DEVICES: usize = 64;

macro_rules! define_device_kinds {
    ($($variant:ident { in: $inputs:expr, out: $outputs:expr, $desc:literal }),* $(,)?) => {
        /// Device models that can appear in a device table.
        #[allow(clippy::upper_case_acronyms)]
        #[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Clone, Copy)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub enum DeviceKind {
            $($variant),*
        }

        impl DeviceKind {
            pub const ALL: &'static [DeviceKind] = &[$(DeviceKind::$variant),*];

            /// Catalogue name, as used in configuration files.
            pub const fn name(self) -> &'static str {
                match self {
                    $(DeviceKind::$variant => stringify!($variant)),*
                }
            }

            pub const fn description(self) -> &'static str {
                match self {
                    $(DeviceKind::$variant => $desc),*
                }
            }

            pub const fn input_channels(self) -> u8 {
                match self {
                    $(DeviceKind::$variant => $inputs),*
                }
            }

            pub const fn output_channels(self) -> u8 {
                match self {
                    $(DeviceKind::$variant => $outputs),*
                }
            }
        }
    };
}

define_device_kinds!(
    EK1100 { in: 0, out: 0, "Bus coupler" },
    EL1014 { in: 4, out: 0, "4x digital input 24 V" },
    EL2004 { in: 0, out: 4, "4x digital output 24 V" },
    EL3102 { in: 2, out: 0, "2x analog input -10..+10 V" },
    EL3162 { in: 2, out: 0, "2x analog input 0..10 V" },
    EL4102 { in: 0, out: 2, "2x analog output 0..10 V" },
);

impl TryFrom<u8> for DeviceKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        DeviceKind::ALL.get(value as usize).copied().ok_or(value)
    }
}

impl core::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// One slot of the device table.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceDescriptor {
    pub position: usize,
    pub kind: DeviceKind,
}

/// The table had no room left for another device.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapacityExceeded;

impl core::fmt::Display for CapacityExceeded {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "device table holds at most {} devices", MAX_DEVICES)
    }
}

impl core::error::Error for CapacityExceeded {}

/// Ordered, fixed-capacity list of expected devices.
///
/// A device's position is its index in the table. The table is built once
/// and only read afterwards; it serializes as a plain list of kind names.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceTable {
    kinds: heapless::Vec<DeviceKind, MAX_DEVICES>,
}

impl DeviceTable {
    pub fn from_kinds(kinds: &[DeviceKind]) -> Result<Self, CapacityExceeded> {
        let mut table = heapless::Vec::new();
        for kind in kinds {
            table.push(*kind).map_err(|_| CapacityExceeded)?;
        }
        Ok(Self { kinds: table })
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn kinds(&self) -> &[DeviceKind] {
        &self.kinds
    }

    pub fn get(&self, position: usize) -> Option<DeviceDescriptor> {
        self.kinds
            .get(position)
            .map(|&kind| DeviceDescriptor { position, kind })
    }

    pub fn iter(&self) -> impl Iterator<Item = DeviceDescriptor> + '_ {
        self.kinds
            .iter()
            .enumerate()
            .map(|(position, &kind)| DeviceDescriptor { position, kind })
    }

    /// Number of slots holding a device of `kind`.
    pub fn count(&self, kind: DeviceKind) -> usize {
        self.kinds.iter().filter(|&&k| k == kind).count()
    }
}
