// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

pub mod can;
pub mod led;

pub use can::{BxCanBus, Controller, HwError};
pub use led::Led;
