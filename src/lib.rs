// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # motorcore
//!
//! Motor actuation core for STM32F7 boards: quadrature encoder decoding, timer-driven PWM and
//! encoder-regulated DC motors, written in Rust.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`hw`] | Register views, GPIO, timers, PWM driver, encoders, board support |
//! | [`motors`] | Motor controller with closed-loop speed regulation |
//! | [`config`] | Tunables and defaults |
//!
//! ## Getting Started
//!
//! Run the host tests:
//!
//! ```bash
//! cargo test
//! ```
//!
//! Flash the board:
//!
//! ```bash
//! cargo run --release --features board,defmt --target thumbv7em-none-eabihf
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module below.
mod fmt;

pub mod config;
pub mod hw;
pub mod motors;

#[cfg(test)]
mod testing;

pub use hw::{Encoder, PwmDriver};
pub use motors::Motor;
