// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! PWM generation on hardware timers.
//!
//! Every PWM-capable pin is routed to a compare channel of one timer through a fixed
//! [`PinRoute`] table. The timers come in two flavors, 8-bit and 16-bit counters, which differ
//! in the prescalers they support and in the largest period they can hold. For a requested
//! carrier frequency the prescaler/period pair is solved analytically, taking the smallest
//! prescaler that fits so duty-cycle resolution stays as high as possible.
//!
//! Duty cycles are 8-bit (`0..=255`) and are scaled into the current period, so a channel keeps
//! its duty when the carrier frequency changes.

use super::gpio::{DigitalIo, Level, PinId, PinMode};
use super::tim::{Channel, OutputMode, Timer, TimerRegs};

/// Divide ratios available to 16-bit counters.
pub const PRESCALERS_16: [u16; 5] = [1, 8, 64, 256, 1024];

/// Divide ratios available to 8-bit counters.
pub const PRESCALERS_8: [u16; 7] = [1, 8, 32, 64, 128, 256, 1024];

/// Periods at or below this leave too few duty steps to be useful.
const MIN_TOP: u32 = 3;

/// Why a carrier frequency could not be applied.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmError {
    /// A carrier of 0 Hz was requested.
    ZeroFrequency,
    /// No supported prescaler yields a period within the counter's range.
    NoPrescaler,
    /// The pin is not routed to a timer channel.
    NoTimer,
}

/// State shared by both counter widths.
pub struct PwmChannelConfig<R> {
    timer: Timer<R>,
    channels: usize,
    frequency: u32,
    top: u16,
    prescaler: u16,
    duty: [u8; 4],
    center_aligned: bool,
}

impl<R> PwmChannelConfig<R> {
    fn new(timer: Timer<R>, channels: usize) -> Self {
        Self {
            timer,
            channels: channels.min(Channel::ALL.len()),
            frequency: 0,
            top: 0,
            prescaler: 0,
            duty: [0; 4],
            center_aligned: false,
        }
    }

    fn channel(&self, index: usize) -> Option<Channel> {
        Channel::from_index(index).filter(|c| c.index() < self.channels)
    }
}

#[inline]
fn scale(top: u16, duty: u8) -> u16 {
    ((top as u32 * duty as u32) / 256) as u16
}

/// A PWM timer, tagged by counter width.
pub enum PwmTimer<R> {
    Counter8(PwmChannelConfig<R>),
    Counter16(PwmChannelConfig<R>),
}

impl<R: TimerRegs> PwmTimer<R> {
    /// 8-bit counter with `channels` compare outputs.
    pub fn counter8(timer: Timer<R>, channels: usize) -> Self {
        PwmTimer::Counter8(PwmChannelConfig::new(timer, channels))
    }

    /// 16-bit counter with `channels` compare outputs.
    pub fn counter16(timer: Timer<R>, channels: usize) -> Self {
        PwmTimer::Counter16(PwmChannelConfig::new(timer, channels))
    }

    #[inline]
    fn config(&self) -> &PwmChannelConfig<R> {
        match self {
            PwmTimer::Counter8(cfg) | PwmTimer::Counter16(cfg) => cfg,
        }
    }

    #[inline]
    fn config_mut(&mut self) -> &mut PwmChannelConfig<R> {
        match self {
            PwmTimer::Counter8(cfg) | PwmTimer::Counter16(cfg) => cfg,
        }
    }

    pub fn prescalers(&self) -> &'static [u16] {
        match self {
            PwmTimer::Counter8(_) => &PRESCALERS_8,
            PwmTimer::Counter16(_) => &PRESCALERS_16,
        }
    }

    /// Largest period the counter can hold.
    pub fn max_top(&self) -> u32 {
        match self {
            PwmTimer::Counter8(_) => u8::MAX as u32,
            PwmTimer::Counter16(_) => u16::MAX as u32,
        }
    }

    /// Solve `(prescaler, top)` for `frequency` without touching the hardware.
    pub fn solve(&self, base_clock_hz: u32, frequency: u32) -> Result<(u16, u16), PwmError> {
        if frequency == 0 {
            return Err(PwmError::ZeroFrequency);
        }

        for &prescaler in self.prescalers() {
            let top = base_clock_hz as u64 / (2 * prescaler as u64 * frequency as u64);
            if top > self.max_top() as u64 {
                continue;
            }
            if top > MIN_TOP as u64 {
                return Ok((prescaler, top as u16));
            }
            // Larger prescalers only shrink the period further.
            break;
        }

        Err(PwmError::NoPrescaler)
    }

    /// Retune the carrier. On error the timer keeps its previous configuration.
    pub fn set_frequency(&mut self, base_clock_hz: u32, frequency: u32) -> Result<(), PwmError> {
        let (prescaler, top) = match self.solve(base_clock_hz, frequency) {
            Ok(pair) => pair,
            Err(err) => {
                warn!("pwm: rejected carrier {} Hz: {}", frequency, err);
                return Err(err);
            }
        };

        let cfg = self.config_mut();
        let tim = &cfg.timer;

        tim.stop_clock();
        if !cfg.center_aligned {
            tim.set_center_aligned();
            cfg.center_aligned = true;
        }
        tim.set_top(top);
        for channel in Channel::ALL.iter().copied().take(cfg.channels) {
            tim.set_compare(channel, scale(top, cfg.duty[channel.index()]));
        }
        tim.start_clock(prescaler);

        cfg.frequency = frequency;
        cfg.top = top;
        cfg.prescaler = prescaler;

        debug!(
            "pwm: carrier {} Hz, prescaler {}, top {}",
            frequency, prescaler, top
        );
        Ok(())
    }

    /// Set the duty of compare channel `index`. Indices past the wired channels are ignored.
    pub fn set_channel_duty_cycle(&mut self, index: usize, duty: u8) {
        let cfg = self.config_mut();
        let Some(channel) = cfg.channel(index) else {
            return;
        };

        cfg.duty[index] = duty;
        cfg.timer.set_compare(channel, scale(cfg.top, duty));
        cfg.timer.set_output_mode(channel, OutputMode::Pwm);
        cfg.timer.enable_output(channel);
    }

    /// Hold compare channel `index` at a fixed level, bypassing the compare match.
    pub fn force_channel(&mut self, index: usize, level: Level) {
        let cfg = self.config_mut();
        let Some(channel) = cfg.channel(index) else {
            return;
        };

        let (mode, duty) = match level {
            Level::Low => (OutputMode::ForceLow, 0),
            Level::High => (OutputMode::ForceHigh, u8::MAX),
        };
        cfg.duty[index] = duty;
        cfg.timer.set_output_mode(channel, mode);
        cfg.timer.enable_output(channel);
    }

    /// Configured carrier, or 0 if never configured.
    #[inline]
    pub fn frequency(&self) -> u32 {
        self.config().frequency
    }

    #[inline]
    pub fn top(&self) -> u16 {
        self.config().top
    }

    #[inline]
    pub fn prescaler(&self) -> u16 {
        self.config().prescaler
    }

    /// Last duty written to channel `index`.
    pub fn duty(&self, index: usize) -> Option<u8> {
        let cfg = self.config();
        cfg.channel(index).map(|c| cfg.duty[c.index()])
    }

    #[inline]
    pub fn timer(&self) -> &Timer<R> {
        &self.config().timer
    }
}

/// Which timer channel drives a pin, and the alternate function that connects them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinRoute {
    pub pin: PinId,
    /// Index into the driver's timer array.
    pub timer: usize,
    pub channel: Channel,
    pub af: u8,
}

/// Pin-addressed PWM output over `N` timers.
///
/// Pins missing from the route table are driven as plain digital outputs.
pub struct PwmDriver<IO: DigitalIo, T: TimerRegs, const N: usize> {
    io: IO,
    timers: [PwmTimer<T>; N],
    routes: &'static [PinRoute],
    base_clock_hz: u32,
}

impl<IO: DigitalIo, T: TimerRegs, const N: usize> PwmDriver<IO, T, N> {
    pub fn new(
        io: IO,
        timers: [PwmTimer<T>; N],
        routes: &'static [PinRoute],
        base_clock_hz: u32,
    ) -> Self {
        Self {
            io,
            timers,
            routes,
            base_clock_hz,
        }
    }

    /// Route for `pin`, if it names a timer this driver owns.
    pub fn route(&self, pin: PinId) -> Option<PinRoute> {
        self.routes
            .iter()
            .find(|r| r.pin == pin && r.timer < N)
            .copied()
    }

    /// Retune the timer behind `pin`. All pins on that timer share the new carrier.
    pub fn set_pin_frequency(&mut self, pin: PinId, frequency: u32) -> Result<(), PwmError> {
        let route = self.route(pin).ok_or(PwmError::NoTimer)?;
        self.timers[route.timer].set_frequency(self.base_clock_hz, frequency)
    }

    /// Duty-cycle write: `0` and `255` pin the output low/high, anything else is PWM.
    pub fn analog_write(&mut self, pin: PinId, value: u8) {
        match (self.route(pin), value) {
            (Some(route), 0) => {
                self.timers[route.timer].force_channel(route.channel.index(), Level::Low)
            }
            (Some(route), u8::MAX) => {
                self.timers[route.timer].force_channel(route.channel.index(), Level::High)
            }
            (Some(route), duty) => {
                self.timers[route.timer].set_channel_duty_cycle(route.channel.index(), duty)
            }
            (None, duty) => self.io.write(pin, Level::from(duty >= 128)),
        }
    }

    /// Static level write. Timer-routed pins stay in their alternate function and are held with
    /// the channel's forced output modes.
    pub fn digital_write(&mut self, pin: PinId, level: Level) {
        match self.route(pin) {
            Some(route) => self.timers[route.timer].force_channel(route.channel.index(), level),
            None => self.io.write(pin, level),
        }
    }

    /// Put `pin` in the mode needed to drive it: its timer's alternate function if routed,
    /// push-pull output otherwise.
    pub fn configure_output(&mut self, pin: PinId) {
        let mode = match self.route(pin) {
            Some(route) => PinMode::Alternate(route.af),
            None => PinMode::Output,
        };
        self.io.set_mode(pin, mode);
    }

    /// Carrier of the timer behind `pin`.
    pub fn frequency(&self, pin: PinId) -> Option<u32> {
        self.route(pin).map(|r| self.timers[r.timer].frequency())
    }

    pub fn timer(&self, index: usize) -> Option<&PwmTimer<T>> {
        self.timers.get(index)
    }

    #[inline]
    pub fn io(&self) -> &IO {
        &self.io
    }
}
