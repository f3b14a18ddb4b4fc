//! Transmit aggregation and the bounded transmit path.

use embedded_can::StandardId;

use crate::bus::CanBus;
use crate::endpoint::EndpointHandle;
use crate::frame::{BusId, FRAME_LEN};
use crate::group::{TxGroup, SLOT_WIDTH};
use crate::hardware::BusHardware;

/// Why a frame was not handed to the hardware.
///
/// All variants are recoverable: the control loop simply tries again next cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitError<E> {
    /// No mailbox became free within the retry budget.
    Timeout,
    /// The controller refused the frame.
    Hardware(E),
    /// The handle does not name a registered endpoint.
    UnknownEndpoint,
    /// The bus is not part of the configuration.
    BusNotEnabled(BusId),
}

/// Why a contribution was not written.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ContributionError {
    UnknownEndpoint,
    /// Shared frames have four slots.
    SlotOutOfRange(usize),
}

impl<'a, H: BusHardware, const N: usize> CanBus<'a, H, N> {
    fn group_mut(&mut self, handle: EndpointHandle) -> Option<&mut TxGroup> {
        let slot = self.slot(handle)?;
        let group = self.endpoints[slot].group();
        self.groups.get_mut(group)
    }

    /// Transmit group of an endpoint.
    pub fn group(&self, handle: EndpointHandle) -> Option<&TxGroup> {
        let slot = self.slot(handle)?;
        self.groups.get(self.endpoints[slot].group())
    }

    /// Current contents of the endpoint's shared output frame.
    pub fn group_buffer(&self, handle: EndpointHandle) -> Option<&[u8; FRAME_LEN]> {
        self.group(handle).map(TxGroup::buffer)
    }

    /// Write `value` into slot `slot` of the endpoint's shared frame. Other slots are left as
    /// they are.
    pub fn write_contribution(
        &mut self,
        handle: EndpointHandle,
        slot: usize,
        value: [u8; SLOT_WIDTH],
    ) -> Result<(), ContributionError> {
        let group = self
            .group_mut(handle)
            .ok_or(ContributionError::UnknownEndpoint)?;
        if group.write_slot(slot, value) {
            Ok(())
        } else {
            Err(ContributionError::SlotOutOfRange(slot))
        }
    }

    /// Overwrite the whole shared frame, for protocols with one device per frame.
    pub fn write_frame(
        &mut self,
        handle: EndpointHandle,
        data: &[u8; FRAME_LEN],
    ) -> Result<(), ContributionError> {
        let group = self
            .group_mut(handle)
            .ok_or(ContributionError::UnknownEndpoint)?;
        group.buffer = *data;
        Ok(())
    }

    /// Zero the shared frame.
    pub fn clear_group(&mut self, handle: EndpointHandle) -> Result<(), ContributionError> {
        let group = self
            .group_mut(handle)
            .ok_or(ContributionError::UnknownEndpoint)?;
        group.clear();
        Ok(())
    }

    /// Send the endpoint's shared frame on its `tx_id`.
    pub fn transmit(&mut self, handle: EndpointHandle) -> Result<(), TransmitError<H::Error>> {
        let (id, data) = {
            let group = self.group(handle).ok_or(TransmitError::UnknownEndpoint)?;
            (group.tx_id, group.buffer)
        };
        self.transmit_raw(id, &data)
    }

    /// Send caller-supplied bytes on the endpoint's `tx_id`, bypassing its shared frame.
    pub fn transmit_external(
        &mut self,
        handle: EndpointHandle,
        data: &[u8; FRAME_LEN],
    ) -> Result<(), TransmitError<H::Error>> {
        let id = self
            .endpoint(handle)
            .ok_or(TransmitError::UnknownEndpoint)?
            .tx_id;
        self.transmit_raw(id, data)
    }

    /// Send one data frame.
    ///
    /// Polls the free mailbox count at most `tx_retry_budget` times without delay. If no mailbox
    /// frees up, gives up with [`TransmitError::Timeout`]; the frame is not queued.
    pub fn transmit_raw(
        &mut self,
        id: StandardId,
        data: &[u8; FRAME_LEN],
    ) -> Result<(), TransmitError<H::Error>> {
        let mut polls = 0;
        while self.hw.tx_free_level() == 0 {
            polls += 1;
            if polls >= self.tx_retry_budget {
                self.stats.tx_timeouts = self.stats.tx_timeouts.wrapping_add(1);
                error!(
                    "CAN{}: tx {=u16:#x} timed out",
                    self.id().number(),
                    id.as_raw()
                );
                return Err(TransmitError::Timeout);
            }
        }

        self.hw
            .add_tx_frame(id, data)
            .map_err(TransmitError::Hardware)?;
        self.stats.tx_frames = self.stats.tx_frames.wrapping_add(1);
        Ok(())
    }
}
