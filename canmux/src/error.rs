//! Error types for registration and bus start-up.
//!
//! Runtime errors of the transmit path live next to it in [`transmit`](crate::transmit).

use crate::frame::BusId;

/// One-time hardware configuration step run by [`CanBus::ensure_started`](crate::CanBus::ensure_started).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitStep {
    /// Accept-all filter banks (mask mode).
    Filter,
    /// Global reject policy for unmatched and remote frames.
    GlobalFilter,
    /// Leaving initialization mode.
    Start,
    /// FIFO message-pending interrupt.
    Notification,
}

/// A start-up step exhausted its retry budget.
///
/// Always fatal: the bus is left stopped and the firmware cannot run without it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartError<E> {
    pub step: InitStep,
    /// Error returned by the last attempt.
    pub error: E,
}

/// Why [`CanBus::register`](crate::CanBus::register) refused an endpoint.
///
/// `E` is the hardware error of the bus's [`BusHardware`](crate::BusHardware).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationError<E> {
    /// The endpoint label is empty.
    EmptyLabel,
    /// `rx_id` is zero.
    ZeroRxId,
    /// `tx_id` is zero.
    ZeroTxId,
    /// Identifier does not fit in 11 bits.
    InvalidId(u16),
    /// Bus selector outside `1..=3`.
    InvalidBus(u8),
    /// The selected bus is not part of the configuration.
    BusNotEnabled(BusId),
    /// The bus already holds its maximum number of endpoints.
    RegistryFull,
    /// Another endpoint on the bus already receives this id.
    DuplicateRxId(u16),
    /// No filter bank left in the bus's range (ID-list mode).
    FilterBanksExhausted,
    /// Bus start-up failed.
    Start(StartError<E>),
    /// Programming the endpoint's filter bank failed within the retry budget.
    FilterProgramming(E),
}

impl<E> RegistrationError<E> {
    /// Short reason for logs.
    pub fn reason(&self) -> &'static str {
        match self {
            RegistrationError::EmptyLabel => "empty label",
            RegistrationError::ZeroRxId => "rx id is zero",
            RegistrationError::ZeroTxId => "tx id is zero",
            RegistrationError::InvalidId(_) => "id wider than 11 bits",
            RegistrationError::InvalidBus(_) => "no such bus",
            RegistrationError::BusNotEnabled(_) => "bus not enabled",
            RegistrationError::RegistryFull => "registry full",
            RegistrationError::DuplicateRxId(_) => "rx id already registered",
            RegistrationError::FilterBanksExhausted => "out of filter banks",
            RegistrationError::Start(_) => "bus start failed",
            RegistrationError::FilterProgramming(_) => "filter programming failed",
        }
    }

    /// Hardware failures cannot be fixed by the caller and must halt the firmware. Everything else
    /// is a configuration mistake the calling driver may handle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RegistrationError::Start(_) | RegistrationError::FilterProgramming(_)
        )
    }
}

impl<E> From<StartError<E>> for RegistrationError<E> {
    fn from(e: StartError<E>) -> Self {
        RegistrationError::Start(e)
    }
}
