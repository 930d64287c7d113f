// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Actuator Abstractions
//!
//! Motor-level control that sits above the PWM and encoder layers in `hw`.
//!
//! ## Modules
//!
//! - [`motor`] - Encoder-regulated DC motor on an H-bridge.

pub mod motor;

pub use motor::{
    Direction, Motor, MotorMode, MotorPins, MoveOutcome, Regulation, StallPhase, StallWatch,
};
