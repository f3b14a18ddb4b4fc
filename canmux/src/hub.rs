//! All buses of a board behind one value.

use core::convert::TryFrom;

use embedded_can::StandardId;

use crate::bus::{BusStats, CanBus};
use crate::config::{CanConfig, ConfigError};
use crate::dispatch::Dispatch;
use crate::endpoint::{Endpoint, EndpointConfig, EndpointHandle};
use crate::error::RegistrationError;
use crate::frame::{BusId, Fifo, FRAME_LEN, MAX_BUSES};
use crate::group::SLOT_WIDTH;
use crate::hardware::BusHardware;
use crate::transmit::{ContributionError, TransmitError};

/// Up to three [`CanBus`]es built from one validated [`CanConfig`].
///
/// Every controller must share the hardware type `H`; boards with different controller types wrap
/// them in an enum that implements [`BusHardware`] by delegation.
pub struct CanHub<'a, H: BusHardware, const N: usize> {
    buses: [Option<CanBus<'a, H, N>>; MAX_BUSES],
}

impl<'a, H: BusHardware, const N: usize> CanHub<'a, H, N> {
    /// Validate `config` and take the hardware of every enabled bus, indexed by
    /// [`BusId::index`]. Hardware supplied for a disabled bus is dropped.
    pub fn new(config: CanConfig, hardware: [Option<H>; MAX_BUSES]) -> Result<Self, ConfigError> {
        config.validate()?;
        let [can1, can2, can3] = hardware;

        Ok(Self {
            buses: [
                Self::make_bus(&config, BusId::Can1, can1)?,
                Self::make_bus(&config, BusId::Can2, can2)?,
                Self::make_bus(&config, BusId::Can3, can3)?,
            ],
        })
    }

    fn make_bus(
        config: &CanConfig,
        id: BusId,
        hw: Option<H>,
    ) -> Result<Option<CanBus<'a, H, N>>, ConfigError> {
        match (config.bus(id), hw) {
            (None, _) => Ok(None),
            (Some(_), None) => Err(ConfigError::MissingHardware(id)),
            (Some(_), Some(hw)) => CanBus::new(id, config, hw).map(Some),
        }
    }

    pub fn bus(&self, id: BusId) -> Option<&CanBus<'a, H, N>> {
        self.buses[id.index()].as_ref()
    }

    pub fn bus_mut(&mut self, id: BusId) -> Option<&mut CanBus<'a, H, N>> {
        self.buses[id.index()].as_mut()
    }

    /// Register an endpoint on the bus named by the 1-based `bus_selector`.
    ///
    /// The label and ids are checked before the selector, then the bus checks capacity and
    /// uniqueness.
    pub fn register(
        &mut self,
        bus_selector: u8,
        config: EndpointConfig<'a>,
    ) -> Result<EndpointHandle, RegistrationError<H::Error>> {
        if let Err(e) = config.ids::<H::Error>() {
            error!("cannot register {}: {}", config.label, e.reason());
            return Err(e);
        }
        let id = BusId::try_from(bus_selector).map_err(|selector| {
            error!("cannot register {}: no bus {}", config.label, selector);
            RegistrationError::InvalidBus(selector)
        })?;
        let bus = self.bus_mut(id).ok_or_else(|| {
            error!("cannot register {}: CAN{} not enabled", config.label, id.number());
            RegistrationError::BusNotEnabled(id)
        })?;
        bus.register(config)
    }

    /// Dispatch one frame from `fifo` of `bus`. A disabled bus reports [`Dispatch::Empty`].
    pub fn on_frame_pending(&mut self, bus: BusId, fifo: Fifo) -> Dispatch {
        match self.bus_mut(bus) {
            Some(bus) => bus.on_frame_pending(fifo),
            None => Dispatch::Empty,
        }
    }

    /// Dispatch until `fifo` of `bus` is empty.
    pub fn drain(&mut self, bus: BusId, fifo: Fifo) -> usize {
        self.bus_mut(bus).map_or(0, |bus| bus.drain(fifo))
    }

    pub fn on_bus_off(&mut self, bus: BusId) {
        if let Some(bus) = self.bus_mut(bus) {
            bus.on_bus_off();
        }
    }

    pub fn endpoint(&self, handle: EndpointHandle) -> Option<&Endpoint> {
        self.bus(handle.bus)?.endpoint(handle)
    }

    pub fn write_contribution(
        &mut self,
        handle: EndpointHandle,
        slot: usize,
        value: [u8; SLOT_WIDTH],
    ) -> Result<(), ContributionError> {
        self.bus_mut(handle.bus)
            .ok_or(ContributionError::UnknownEndpoint)?
            .write_contribution(handle, slot, value)
    }

    pub fn write_frame(
        &mut self,
        handle: EndpointHandle,
        data: &[u8; FRAME_LEN],
    ) -> Result<(), ContributionError> {
        self.bus_mut(handle.bus)
            .ok_or(ContributionError::UnknownEndpoint)?
            .write_frame(handle, data)
    }

    pub fn clear_group(&mut self, handle: EndpointHandle) -> Result<(), ContributionError> {
        self.bus_mut(handle.bus)
            .ok_or(ContributionError::UnknownEndpoint)?
            .clear_group(handle)
    }

    pub fn group_buffer(&self, handle: EndpointHandle) -> Option<&[u8; FRAME_LEN]> {
        self.bus(handle.bus)?.group_buffer(handle)
    }

    pub fn transmit(&mut self, handle: EndpointHandle) -> Result<(), TransmitError<H::Error>> {
        self.bus_mut(handle.bus)
            .ok_or(TransmitError::UnknownEndpoint)?
            .transmit(handle)
    }

    pub fn transmit_external(
        &mut self,
        handle: EndpointHandle,
        data: &[u8; FRAME_LEN],
    ) -> Result<(), TransmitError<H::Error>> {
        self.bus_mut(handle.bus)
            .ok_or(TransmitError::UnknownEndpoint)?
            .transmit_external(handle, data)
    }

    pub fn transmit_raw(
        &mut self,
        bus: BusId,
        id: StandardId,
        data: &[u8; FRAME_LEN],
    ) -> Result<(), TransmitError<H::Error>> {
        self.bus_mut(bus)
            .ok_or(TransmitError::BusNotEnabled(bus))?
            .transmit_raw(id, data)
    }

    pub fn stats(&self, bus: BusId) -> Option<BusStats> {
        self.bus(bus).map(CanBus::stats)
    }
}
