// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Test doubles shared by the unit tests.

use crate::hw::gpio::{DigitalIo, Level, PinId, PinMode};

const PINS: usize = 0x50;

/// Mock digital I/O that remembers the last mode and level of every pin.
pub struct MockIo {
    modes: [Option<PinMode>; PINS],
    levels: [Level; PINS],
}

impl MockIo {
    pub fn new() -> Self {
        Self {
            modes: [None; PINS],
            levels: [Level::Low; PINS],
        }
    }

    pub fn mode(&self, pin: PinId) -> Option<PinMode> {
        self.modes[pin.raw() as usize]
    }

    pub fn level(&self, pin: PinId) -> Level {
        self.levels[pin.raw() as usize]
    }
}

impl DigitalIo for MockIo {
    fn set_mode(&mut self, pin: PinId, mode: PinMode) {
        self.modes[pin.raw() as usize] = Some(mode);
    }

    fn write(&mut self, pin: PinId, level: Level) {
        self.levels[pin.raw() as usize] = level;
    }

    fn read(&self, pin: PinId) -> Level {
        self.levels[pin.raw() as usize]
    }
}
