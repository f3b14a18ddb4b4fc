// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # canmux
//!
//! Endpoint multiplexing and dispatch for the CAN controllers of a robot controller board. Many
//! logical endpoints (one per motor, sensor or remote link) share two or three physical controllers,
//! each with a limited number of acceptance filters and two receive FIFOs.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`config`] | Startup configuration: buses, FIFOs, filter mode, retry budgets |
//! | [`hardware`] | [`BusHardware`], the boundary to one controller |
//! | [`endpoint`] | Endpoint registration records and the [`FrameHandler`] capability |
//! | [`bus`] | One physical bus: lazy start, registry, filter allocation |
//! | [`dispatch`] | Interrupt-side receive dispatch |
//! | [`group`] | Shared 8-byte output frames ([`TxGroup`]) |
//! | [`transmit`] | Aggregation writes and the bounded transmit path |
//! | [`hub`] | [`CanHub`], all buses of a board |
//!
//! ## Usage
//!
//! ```ignore
//! let config = CanConfig::new(ControllerKind::BxCan, FilterMode::IdList)
//!     .with_bus(BusId::Can1, BusConfig::bxcan_master());
//! let mut hub: CanHub<'_, _, 8> = CanHub::new(config, [Some(can1), None, None])?;
//!
//! let front_left = hub.register(1, EndpointConfig::new("fl", 0x201, 0x200).with_handler(&FL))?;
//! hub.write_contribution(front_left, slot_for_device(1), 1200i16.to_be_bytes())?;
//! hub.transmit(front_left)?;
//! ```
//!
//! Logging goes through `defmt` when the `defmt` feature is enabled and compiles away otherwise.
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod group;
pub mod hardware;
pub mod hub;
pub mod transmit;

mod filter;
mod retry;

pub use bus::{BusStats, CanBus};
pub use config::{BusConfig, CanConfig, ConfigError, ControllerKind, FilterMode};
pub use dispatch::Dispatch;
pub use endpoint::{Endpoint, EndpointConfig, EndpointHandle, FrameHandler};
pub use error::{InitStep, RegistrationError, StartError};
pub use frame::{BusId, Fifo, RxFrame, RxPayload, FRAME_LEN, MAX_BUSES};
pub use group::{slot_for_device, TxGroup, SLOTS_PER_FRAME, SLOT_WIDTH};
pub use hardware::{BusHardware, FilterSpec};
pub use hub::CanHub;
pub use transmit::{ContributionError, TransmitError};

pub use embedded_can::StandardId;
