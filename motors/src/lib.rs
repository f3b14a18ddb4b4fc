// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # wheelbot-motors
//!
//! Motor drivers that talk through the [`canmux`] endpoint engine.
//!
//! Each driver is a `static` instance that registers one endpoint, decodes its feedback frames in
//! interrupt context (it is the endpoint's [`FrameHandler`](canmux::FrameHandler)) and packs its
//! command into its slot of the shared output frame.
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`dji`] | DJI M3508, M2006 and GM6020 (four motors per command frame) |
//! | [`lk`] | LK-TECH motors in broadcast torque mode |

#![cfg_attr(not(test), no_std)]

pub mod dji;
pub mod lk;

use canmux::RegistrationError;
#[cfg(not(test))]
use micromath::F32Ext;

pub use dji::{DjiFeedback, DjiModel, DjiMotor};
pub use lk::{LkFeedback, LkMotor};

/// Error type for motor registration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorError<E> {
    /// Device id outside the range the protocol can address.
    InvalidDeviceId(u8),
    /// The engine refused the endpoint.
    Registration(RegistrationError<E>),
}

impl<E> From<RegistrationError<E>> for MotorError<E> {
    fn from(e: RegistrationError<E>) -> Self {
        MotorError::Registration(e)
    }
}

/// Clamp `output` to `±limit` and round it to the nearest raw command value.
pub(crate) fn clamp_output(output: f32, limit: i16) -> i16 {
    if output.is_nan() {
        return 0;
    }
    let limit = f32::from(limit);
    output.max(-limit).min(limit).round() as i16
}
