//! Boundary to one physical CAN controller.
//!
//! The engine never touches registers. A board support crate implements [`BusHardware`] for each
//! controller it owns (bxCAN, FDCAN, or a scripted mock in tests) and hands the values to
//! [`CanHub::new`](crate::CanHub::new).

use embedded_can::StandardId;

use crate::frame::{Fifo, RxFrame, FRAME_LEN};

/// What one filter bank should accept.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterSpec {
    /// Every standard data frame (mask mode).
    AcceptAll,
    /// Exactly one standard identifier (ID-list mode).
    Exact(StandardId),
}

/// Operations the engine needs from a controller.
///
/// Configuration calls may fail transiently; the engine retries them within its init budget. The
/// runtime calls (`rx_fill_level`, `read_frame`, `tx_free_level`) never fail.
pub trait BusHardware {
    /// Error reported by configuration and transmit calls.
    type Error: core::fmt::Debug;

    /// Program filter bank `bank` (absolute bank or filter-element number) to route `filter`
    /// into `fifo` and activate it.
    fn configure_filter(
        &mut self,
        bank: u8,
        fifo: Fifo,
        filter: FilterSpec,
    ) -> Result<(), Self::Error>;

    /// Reject frames matched by no filter, and all remote frames.
    fn configure_global_filter(&mut self) -> Result<(), Self::Error>;

    /// Leave initialization mode and join the bus.
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Enable the message-pending interrupt of `fifo`.
    fn enable_fifo_interrupt(&mut self, fifo: Fifo) -> Result<(), Self::Error>;

    /// Frames currently waiting in `fifo`.
    fn rx_fill_level(&mut self, fifo: Fifo) -> u8;

    /// Pop one standard data frame from `fifo`.
    ///
    /// Returns `None` when the FIFO is empty. Remote and extended frames are consumed and dropped
    /// by the implementation, which also returns `None` for them.
    fn read_frame(&mut self, fifo: Fifo) -> Option<RxFrame>;

    /// Free transmit mailboxes or queue slots.
    fn tx_free_level(&mut self) -> u8;

    /// Queue a data frame for transmission. Only called after `tx_free_level` reported space.
    fn add_tx_frame(&mut self, id: StandardId, data: &[u8; FRAME_LEN]) -> Result<(), Self::Error>;

    /// Clear the bus-off condition so the controller rejoins the bus.
    fn clear_bus_off(&mut self);
}
