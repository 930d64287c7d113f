// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! MCU-level building blocks: register views, GPIO, timers, PWM and encoders.
//!
//! Everything here except [`board`] and [`clock`] is target-independent and runs on the host.

pub mod encoder;
pub mod gpio;
pub mod pwm;
pub mod regs;
pub mod tim;

#[cfg(feature = "board")]
pub mod board;
#[cfg(feature = "board")]
pub mod clock;

pub use encoder::{Encoder, EncoderBank, Line};
pub use gpio::{DigitalIo, GpioPort, Level, PinId, PinMode, Port, PortReg, PortRegs};
pub use pwm::{PinRoute, PwmDriver, PwmError, PwmTimer};
pub use tim::{Channel, OutputMode, TimReg, Timer, TimerRegs};
