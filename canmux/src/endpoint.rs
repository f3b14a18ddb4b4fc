//! Logical endpoints.
//!
//! An endpoint is one registered consumer/producer of CAN traffic: a motor, a sensor, a remote
//! link. It receives on exactly one `rx_id` and transmits on a `tx_id` that it may share with other
//! endpoints of the same bus (see [`TxGroup`](crate::TxGroup)).

use embedded_can::StandardId;

use crate::error::RegistrationError;
use crate::frame::{standard_id, BusId, Fifo, RxPayload};

/// Reacts to frames delivered to an endpoint.
///
/// Called from interrupt context, right after the endpoint's payload has been updated. The handler
/// is the driver instance itself, so it reaches its own decode state through `self`.
pub trait FrameHandler: Sync {
    fn on_frame(&self, endpoint: &Endpoint);
}

impl<F> FrameHandler for F
where
    F: Fn(&Endpoint) + Sync,
{
    fn on_frame(&self, endpoint: &Endpoint) {
        self(endpoint)
    }
}

/// Registration request.
#[derive(Copy, Clone)]
pub struct EndpointConfig<'a> {
    /// Debug name, must not be empty.
    pub label: &'static str,
    /// Identifier received by this endpoint; dispatch key, unique per bus.
    pub rx_id: u16,
    /// Identifier used when transmitting.
    pub tx_id: u16,
    /// `None` registers a transmit-only endpoint.
    pub handler: Option<&'a dyn FrameHandler>,
}

impl<'a> EndpointConfig<'a> {
    pub const fn new(label: &'static str, rx_id: u16, tx_id: u16) -> Self {
        Self {
            label,
            rx_id,
            tx_id,
            handler: None,
        }
    }

    pub const fn with_handler(mut self, handler: &'a dyn FrameHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Check the label and both ids, in that order, and convert the ids.
    pub(crate) fn ids<E>(&self) -> Result<(StandardId, StandardId), RegistrationError<E>> {
        if self.label.is_empty() {
            return Err(RegistrationError::EmptyLabel);
        }
        if self.rx_id == 0 {
            return Err(RegistrationError::ZeroRxId);
        }
        if self.tx_id == 0 {
            return Err(RegistrationError::ZeroTxId);
        }
        let rx_id = standard_id(self.rx_id).ok_or(RegistrationError::InvalidId(self.rx_id))?;
        let tx_id = standard_id(self.tx_id).ok_or(RegistrationError::InvalidId(self.tx_id))?;
        Ok((rx_id, tx_id))
    }
}

/// Reference to a registered endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointHandle {
    pub bus: BusId,
    pub(crate) index: u8,
}

impl EndpointHandle {
    /// Position in the bus registry, in registration order.
    #[inline]
    pub fn index(&self) -> usize {
        usize::from(self.index)
    }
}

/// A registered endpoint. Lives in its bus registry until reset.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub(crate) label: &'static str,
    pub(crate) bus: BusId,
    pub(crate) rx_id: StandardId,
    pub(crate) tx_id: StandardId,
    pub(crate) fifo: Fifo,
    pub(crate) filter_bank: Option<u8>,
    pub(crate) group: u8,
    pub(crate) rx: RxPayload,
    pub(crate) rx_count: u32,
}

impl Endpoint {
    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[inline]
    pub fn bus(&self) -> BusId {
        self.bus
    }

    #[inline]
    pub fn rx_id(&self) -> StandardId {
        self.rx_id
    }

    #[inline]
    pub fn tx_id(&self) -> StandardId {
        self.tx_id
    }

    /// Receive FIFO assigned at registration.
    #[inline]
    pub fn fifo(&self) -> Fifo {
        self.fifo
    }

    /// Filter bank holding this endpoint's id, in ID-list mode.
    #[inline]
    pub fn filter_bank(&self) -> Option<u8> {
        self.filter_bank
    }

    /// Index of the transmit group shared by every endpoint with the same `tx_id`.
    #[inline]
    pub fn group(&self) -> usize {
        usize::from(self.group)
    }

    /// Most recent payload.
    #[inline]
    pub fn payload(&self) -> &RxPayload {
        &self.rx
    }

    /// Frames delivered so far (wrapping).
    #[inline]
    pub fn rx_count(&self) -> u32 {
        self.rx_count
    }
}
