//! Shared output frames.
//!
//! Motor protocols pack the commands of up to four devices into one 8-byte frame: device `k`
//! (1-based) owns bytes `[(k - 1) % 4 * 2 ..][..2]`, and devices 1-4 and 5-8 go out on two
//! different identifiers. A [`TxGroup`] is that frame: one per distinct `(bus, tx_id)`, created
//! when the first endpoint with the id registers.

use embedded_can::StandardId;

use crate::frame::FRAME_LEN;

/// Bytes owned by one device in a shared frame.
pub const SLOT_WIDTH: usize = 2;

/// Devices packed into one shared frame.
pub const SLOTS_PER_FRAME: usize = FRAME_LEN / SLOT_WIDTH;

/// Slot of a 1-based device id inside its frame.
///
/// Ids 1-4 map to slots 0-3, ids 5-8 wrap to slots 0-3 again. Id 0 is treated as id 4 would be
/// after wrapping, which never occurs for a validly configured device.
#[inline]
pub const fn slot_for_device(device_id: u8) -> usize {
    (device_id.wrapping_sub(1) as usize) % SLOTS_PER_FRAME
}

/// Output buffer shared by every endpoint of one bus transmitting on the same id.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TxGroup {
    pub(crate) tx_id: StandardId,
    pub(crate) buffer: [u8; FRAME_LEN],
    pub(crate) members: u16,
}

impl TxGroup {
    pub(crate) fn new(tx_id: StandardId) -> Self {
        Self {
            tx_id,
            buffer: [0; FRAME_LEN],
            members: 1,
        }
    }

    #[inline]
    pub fn tx_id(&self) -> StandardId {
        self.tx_id
    }

    /// Current frame contents.
    #[inline]
    pub fn buffer(&self) -> &[u8; FRAME_LEN] {
        &self.buffer
    }

    /// Endpoints sharing this frame.
    #[inline]
    pub fn members(&self) -> usize {
        usize::from(self.members)
    }

    /// Write one slot. Returns `false` and leaves the buffer untouched if `slot` is out of range.
    pub(crate) fn write_slot(&mut self, slot: usize, value: [u8; SLOT_WIDTH]) -> bool {
        if slot >= SLOTS_PER_FRAME {
            return false;
        }
        let offset = slot * SLOT_WIDTH;
        self.buffer[offset..offset + SLOT_WIDTH].copy_from_slice(&value);
        true
    }

    pub(crate) fn clear(&mut self) {
        self.buffer = [0; FRAME_LEN];
    }
}
