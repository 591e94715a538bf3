//! Round-robin lookup of devices of one kind in the device table.

use std::sync::Arc;

use ec_mini_icd::{DeviceKind, DeviceTable};

/// Result of one [`Sequencer::next_match`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextMatch {
    /// Position of the matching device, `None` if the table has none.
    pub position: Option<usize>,
    /// The scan passed from the last table slot back to slot 0.
    pub wrapped: bool,
}

/// Walks the device table from just past the previous match.
///
/// The cursor lives as long as the sequencer and is never reset, so repeated
/// calls cycle through every device of a kind in table order.
#[derive(Debug, Clone)]
pub struct Sequencer {
    table: Arc<DeviceTable>,
    last: Option<usize>,
}

impl Sequencer {
    pub fn new(table: Arc<DeviceTable>) -> Self {
        Self { table, last: None }
    }

    /// Position returned by the last successful match.
    pub fn last_index(&self) -> Option<usize> {
        self.last
    }

    /// Find the next device of `kind`.
    ///
    /// Scans at most one full table length. `wrapped` is set when the scan
    /// index crosses from `N - 1` to `0`, whether or not a match has been
    /// seen yet. A miss leaves the cursor untouched.
    pub fn next_match(&mut self, kind: DeviceKind) -> NextMatch {
        let kinds = self.table.kinds();
        let len = kinds.len();
        let mut index = self.last.map_or(0, |last| last + 1);
        let mut wrapped = false;

        for _ in 0..len {
            if index >= len {
                index = 0;
                wrapped = true;
            }
            if kinds[index] == kind {
                self.last = Some(index);
                return NextMatch { position: Some(index), wrapped };
            }
            index += 1;
        }

        NextMatch { position: None, wrapped }
    }
}
