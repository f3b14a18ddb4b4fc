//! Identifiers, receive queues and the per-interrupt frame record.

use core::convert::TryFrom;

use embedded_can::StandardId;

/// Every frame handled by this crate carries at most 8 data bytes, even on FDCAN controllers.
pub const FRAME_LEN: usize = 8;

/// Number of physical controllers a hub can drive.
pub const MAX_BUSES: usize = 3;

/// Selects one physical CAN controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusId {
    Can1,
    Can2,
    Can3,
}

impl BusId {
    /// All controllers, in index order.
    pub const ALL: [BusId; MAX_BUSES] = [BusId::Can1, BusId::Can2, BusId::Can3];

    /// Zero-based index, used to address per-bus tables.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            BusId::Can1 => 0,
            BusId::Can2 => 1,
            BusId::Can3 => 2,
        }
    }

    /// One-based controller number as printed on the board ("CAN1" -> 1).
    #[inline]
    pub const fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

/// Converts the one-based bus selector used by driver configuration tables.
impl TryFrom<u8> for BusId {
    type Error = u8;

    fn try_from(selector: u8) -> Result<Self, Self::Error> {
        match selector {
            1 => Ok(BusId::Can1),
            2 => Ok(BusId::Can2),
            3 => Ok(BusId::Can3),
            other => Err(other),
        }
    }
}

/// One of the two hardware receive queues of a controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fifo {
    Fifo0,
    Fifo1,
}

impl Fifo {
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Fifo::Fifo0 => 0,
            Fifo::Fifo1 => 1,
        }
    }

    /// The other queue.
    #[inline]
    pub const fn other(self) -> Fifo {
        match self {
            Fifo::Fifo0 => Fifo::Fifo1,
            Fifo::Fifo1 => Fifo::Fifo0,
        }
    }
}

/// A data frame just read out of a receive FIFO.
///
/// Lives only for the duration of one dispatch; the engine copies what it needs into the matching
/// endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RxFrame {
    pub id: StandardId,
    /// Declared data length, 0..=8.
    pub len: u8,
    pub data: [u8; FRAME_LEN],
}

impl RxFrame {
    /// Build a frame from a payload slice. Returns `None` if `payload` is longer than 8 bytes.
    pub fn new(id: StandardId, payload: &[u8]) -> Option<Self> {
        if payload.len() > FRAME_LEN {
            return None;
        }
        let mut data = [0u8; FRAME_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            id,
            len: payload.len() as u8,
            data,
        })
    }

    /// Payload bytes up to the declared length.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len.min(FRAME_LEN as u8))]
    }
}

/// Last payload received by an endpoint.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxPayload {
    data: [u8; FRAME_LEN],
    len: u8,
}

impl RxPayload {
    /// Replace the stored bytes with `frame`'s payload. Bytes past the declared length are zeroed
    /// so a short frame never exposes a stale tail from an earlier one.
    pub(crate) fn store(&mut self, frame: &RxFrame) {
        let bytes = frame.payload();
        self.data = [0u8; FRAME_LEN];
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len() as u8;
    }

    /// Received bytes, exactly `len()` long.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }

    /// The full 8-byte buffer, zero padded past `len()`.
    #[inline]
    pub fn raw(&self) -> &[u8; FRAME_LEN] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Checks that a raw identifier is a usable, non-zero 11-bit id.
pub(crate) fn standard_id(raw: u16) -> Option<StandardId> {
    if raw == 0 {
        return None;
    }
    StandardId::new(raw)
}
