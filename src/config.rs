// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Compile-time configuration shared by the library and the firmware.

/// Timer kernel clock feeding the PWM counters (HSI, APB1 timers at reset prescaling).
pub const BASE_CLOCK_HZ: u32 = 16_000_000;

/// Default PWM carrier for motor outputs. Above the audible range for the DRV8873 bridges.
pub const PWM_FREQUENCY_HZ: u32 = 20_000;

/// Time between two regulation corrections.
pub const REGULATION_INTERVAL_MS: u32 = 333;

/// Power applied when a regulated move starts, and the floor used to recover from a stall.
pub const SEED_POWER: u8 = 16;

/// Multiplicative step applied to power when the measured rate is off target.
pub const POWER_RATIO: f32 = 1.1;

/// Full-scale power command.
pub const MAX_POWER: u8 = 255;

/// A goal move halves its target rate once less than this much travel time remains.
pub const SLOWDOWN_MS: u64 = 500;

/// Below this much remaining travel time the target rate is halved a second time.
pub const FINAL_SLOWDOWN_MS: u64 = 100;

/// Consecutive checks that confirm a till-stop move has spun up, or has stalled.
pub const STALL_CONFIRM_CHECKS: u32 = 2;

/// Spin-up checks after which a till-stop move starts watching for a stall regardless.
pub const SPIN_UP_MAX_CHECKS: u32 = 6;

/// A till-stop move that never stalls is abandoned after running this long.
pub const STALL_TIMEOUT_MS: u32 = 10_000;

/// Rates at or below `target / STALL_RATE_DIVISOR` count as stalled.
pub const STALL_RATE_DIVISOR: u32 = 10;

/// Per-motor tuning.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorConfig {
    /// Milliseconds between regulation corrections.
    pub regulation_interval_ms: u32,
    /// Starting power for regulated moves.
    pub seed_power: u8,
    /// Upper bound applied to every power command.
    pub max_power: u8,
    /// Encoder ticks per output shaft revolution, after gearing.
    pub ticks_per_rotation: u32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            regulation_interval_ms: REGULATION_INTERVAL_MS,
            seed_power: SEED_POWER,
            max_power: MAX_POWER,
            ticks_per_rotation: 1,
        }
    }
}

impl MotorConfig {
    pub fn with_ticks_per_rotation(mut self, ticks: u32) -> Self {
        self.ticks_per_rotation = ticks;
        self
    }

    pub fn with_max_power(mut self, max_power: u8) -> Self {
        self.max_power = max_power;
        self
    }

    pub fn with_regulation_interval_ms(mut self, interval_ms: u32) -> Self {
        self.regulation_interval_ms = interval_ms;
        self
    }
}
