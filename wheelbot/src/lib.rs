// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Wheelbot Firmware
//!
//! Board support for a four-wheel mecanum chassis with a yaw gimbal on an STM32F777. The motor
//! buses run through the [`canmux`] engine; motor protocols live in [`wheelbot_motors`].
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`hw`] | bxCAN binding for `canmux`, status LEDs |
//!
//! ## Getting Started
//!
//! Flash the board:
//!
//! ```bash
//! cd wheelbot
//! cargo run --release
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![no_std]

pub mod hw;
