// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Encoder-regulated DC motor.
//!
//! A [`Motor`] drives one H-bridge through the [`PwmDriver`] and reads one [`Encoder`]. It runs in
//! one of three modes:
//!
//! - `Stopped`: outputs de-energized, power 0.
//! - `Driving`: open-loop, fixed power in one direction.
//! - `Regulated`: closed-loop at a target tick rate. [`Motor::check_encoder`] must be called from
//!   the control loop; every regulation interval it compares the achieved tick rate against the
//!   target and scales power up or down.
//!
//! A regulated move either runs toward a tick goal ([`Motor::go_to`], [`Motor::go_for`]), holds
//! its rate with no goal ([`Motor::go_at`]), or runs until the shaft is blocked
//! ([`Motor::go_till_stop`]). Goal moves slow down over their last half second and stop once the
//! goal is reached; [`Motor::outcome`] tells how the last move ended.
//!
//! The PWM driver is not owned here. It is passed as `&mut` to each call so that several motors
//! can share the same timers.
//!
//! No call reports an error: out-of-range power is clamped, and stall and goal handling are part
//! of the regulation state machine.

use micromath::F32Ext;

use crate::config::{
    MotorConfig, FINAL_SLOWDOWN_MS, POWER_RATIO, SLOWDOWN_MS, SPIN_UP_MAX_CHECKS,
    STALL_CONFIRM_CHECKS, STALL_RATE_DIVISOR, STALL_TIMEOUT_MS,
};
use crate::hw::encoder::Encoder;
use crate::hw::gpio::{DigitalIo, Level, PinId};
use crate::hw::pwm::PwmDriver;
use crate::hw::tim::TimerRegs;

/// Rotation direction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    #[inline]
    pub fn from_forward(forward: bool) -> Self {
        if forward {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    #[inline]
    pub fn is_forward(self) -> bool {
        self == Direction::Forward
    }
}

/// How a regulated move ended on its own.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MoveOutcome {
    GoalReached,
    /// A till-stop move ran into something.
    Stalled,
    /// A till-stop move kept running past [`STALL_TIMEOUT_MS`].
    TimedOut,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StallPhase {
    /// Waiting for the shaft to get going.
    SpinUp,
    /// Moving; a sustained slow rate now means the shaft is blocked.
    Running,
}

/// Stall detection state of a till-stop move.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StallWatch {
    pub phase: StallPhase,
    /// Consecutive checks meeting the current phase's condition.
    pub streak: u32,
    /// Checks spent spinning up.
    pub checks: u32,
    /// Start of the current phase.
    pub since_ms: u32,
}

impl StallWatch {
    fn new(now_ms: u32) -> Self {
        Self {
            phase: StallPhase::SpinUp,
            streak: 0,
            checks: 0,
            since_ms: now_ms,
        }
    }

    /// Feed one measured rate. Returns the outcome once the move should end.
    fn observe(&mut self, achieved: u32, target: u32, now_ms: u32) -> Option<MoveOutcome> {
        let slow = target / STALL_RATE_DIVISOR;
        match self.phase {
            StallPhase::SpinUp => {
                self.checks += 1;
                self.streak = if achieved >= slow { self.streak + 1 } else { 0 };
                if self.streak >= STALL_CONFIRM_CHECKS || self.checks >= SPIN_UP_MAX_CHECKS {
                    self.phase = StallPhase::Running;
                    self.streak = 0;
                    self.since_ms = now_ms;
                }
                None
            }
            StallPhase::Running => {
                self.streak = if achieved <= slow { self.streak + 1 } else { 0 };
                if self.streak >= STALL_CONFIRM_CHECKS {
                    Some(MoveOutcome::Stalled)
                } else if now_ms.wrapping_sub(self.since_ms) >= STALL_TIMEOUT_MS {
                    Some(MoveOutcome::TimedOut)
                } else {
                    None
                }
            }
        }
    }
}

/// Bookkeeping for one regulated move.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Regulation {
    /// Absolute tick position that ends the move. `None` holds the rate indefinitely.
    pub goal: Option<i32>,
    /// Target rate.
    pub ticks_per_second: u32,
    /// Time of the last correction.
    pub last_check_ms: u32,
    /// Encoder position at the last correction.
    pub last_position: i32,
    /// Set for till-stop moves.
    pub watch: Option<StallWatch>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorMode {
    Stopped,
    Driving(Direction),
    Regulated {
        direction: Direction,
        regulation: Regulation,
    },
}

impl MotorMode {
    #[inline]
    pub fn direction(&self) -> Option<Direction> {
        match *self {
            MotorMode::Stopped => None,
            MotorMode::Driving(direction) => Some(direction),
            MotorMode::Regulated { direction, .. } => Some(direction),
        }
    }
}

/// Bridge wiring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorPins {
    /// Two direction inputs and no speed pin (IN1/IN2 bridges). The input opposite the asserted
    /// direction is driven with inverted PWM, alternating drive and brake.
    DualDirection { in1: PinId, in2: PinId },
    /// Phase pin plus a PWM speed pin, with an optional active-high disable input.
    DirectionPwm {
        dir: PinId,
        enable: Option<PinId>,
        pwm: PinId,
    },
}

/// Target rate for a goal move with `ticks_left` to go.
fn approach_rate(ticks_per_second: u32, ticks_left: u64) -> u32 {
    let time_left_ms = ticks_left * 1000 / ticks_per_second.max(1) as u64;
    let mut rate = ticks_per_second;
    if time_left_ms < SLOWDOWN_MS {
        rate /= 2;
    }
    if time_left_ms < FINAL_SLOWDOWN_MS {
        rate /= 2;
    }
    rate
}

/// One DC motor: its bridge wiring, its encoder, and the drive state.
///
/// The motor borrows its encoder, which the edge interrupts keep updating.
pub struct Motor<'a> {
    name: &'static str,
    pins: MotorPins,
    encoder: &'a Encoder,
    config: MotorConfig,
    mode: MotorMode,
    power: u8,
    checks: u32,
    achieved: u32,
    outcome: Option<MoveOutcome>,
}

impl<'a> Motor<'a> {
    /// Create a stopped motor and configure its pins as outputs.
    pub fn new<IO: DigitalIo, T: TimerRegs, const N: usize>(
        name: &'static str,
        pins: MotorPins,
        encoder: &'a Encoder,
        mut config: MotorConfig,
        pwm: &mut PwmDriver<IO, T, N>,
    ) -> Self {
        config.regulation_interval_ms = config.regulation_interval_ms.max(1);

        match pins {
            MotorPins::DualDirection { in1, in2 } => {
                pwm.configure_output(in1);
                pwm.configure_output(in2);
            }
            MotorPins::DirectionPwm { dir, enable, pwm: speed } => {
                pwm.configure_output(dir);
                pwm.configure_output(speed);
                if let Some(enable) = enable {
                    pwm.configure_output(enable);
                }
            }
        }

        let mut motor = Self {
            name,
            pins,
            encoder,
            config,
            mode: MotorMode::Stopped,
            power: 0,
            checks: 0,
            achieved: 0,
            outcome: None,
        };
        motor.stop(pwm);
        motor
    }

    /// Stop and de-energize the bridge. Ends any regulated move.
    pub fn stop<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
    ) {
        self.mode = MotorMode::Stopped;
        self.power = 0;
        self.achieved = 0;
        self.outcome = None;
        self.de_energize(pwm);
    }

    fn finish<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
        outcome: MoveOutcome,
    ) {
        self.stop(pwm);
        self.outcome = Some(outcome);
    }

    /// Open-loop drive at `power`. Cancels any regulated move.
    pub fn go<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
        forward: bool,
        power: i32,
    ) {
        self.mode = MotorMode::Driving(Direction::from_forward(forward));
        self.set_power(pwm, power);
    }

    /// Set drive power, clamped to `0..=max_power`. Zero de-energizes the outputs whatever the
    /// direction; the mode is left unchanged.
    pub fn set_power<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
        power: i32,
    ) {
        let power = power.clamp(0, self.config.max_power as i32) as u8;
        self.power = power;

        if power == 0 {
            self.de_energize(pwm);
            return;
        }

        let Some(direction) = self.mode.direction() else {
            // Nothing to assert; a later go() applies the stored power.
            if let MotorPins::DirectionPwm { pwm: speed, .. } = self.pins {
                pwm.analog_write(speed, power);
            }
            return;
        };

        match self.pins {
            MotorPins::DirectionPwm { dir, enable, pwm: speed } => {
                // Phase and enable settle before the speed pin starts switching.
                pwm.digital_write(dir, Level::from(direction.is_forward()));
                if let Some(enable) = enable {
                    pwm.digital_write(enable, Level::Low);
                }
                pwm.analog_write(speed, power);
            }
            MotorPins::DualDirection { in1, in2 } => {
                let (held, throttled) = match direction {
                    Direction::Forward => (in1, in2),
                    Direction::Backward => (in2, in1),
                };
                pwm.digital_write(held, Level::High);
                pwm.analog_write(throttled, u8::MAX - power);
            }
        }
    }

    /// Regulated move of `ticks` relative to the current position.
    ///
    /// A distance of zero holds `ticks_per_second` with no goal, in the current direction or
    /// forward when stopped.
    pub fn go_for<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
        ticks_per_second: u32,
        ticks: i32,
        now_ms: u32,
    ) {
        if ticks == 0 {
            let forward = self.mode.direction().map_or(true, Direction::is_forward);
            self.go_at(pwm, forward, ticks_per_second, now_ms);
            return;
        }
        let goal = self.encoder.position().saturating_add(ticks);
        self.go_to(pwm, ticks_per_second, goal, now_ms);
    }

    /// Regulated move to the absolute position `goal`. A zero rate or a goal equal to the current
    /// position stops the motor.
    pub fn go_to<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
        ticks_per_second: u32,
        goal: i32,
        now_ms: u32,
    ) {
        let position = self.encoder.position();
        if ticks_per_second == 0 || goal == position {
            self.stop(pwm);
            return;
        }

        info!(
            "{=str}: regulate {} -> {} at {} ticks/s",
            self.name, position, goal, ticks_per_second
        );
        let direction = Direction::from_forward(goal > position);
        self.arm(pwm, direction, Some(goal), ticks_per_second, None, now_ms);
    }

    /// Hold `ticks_per_second` with no goal until told otherwise. A zero rate stops the motor.
    pub fn go_at<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
        forward: bool,
        ticks_per_second: u32,
        now_ms: u32,
    ) {
        if ticks_per_second == 0 {
            self.stop(pwm);
            return;
        }

        debug!("{=str}: hold {} ticks/s", self.name, ticks_per_second);
        let direction = Direction::from_forward(forward);
        self.arm(pwm, direction, None, ticks_per_second, None, now_ms);
    }

    /// Run at `ticks_per_second` until the shaft stalls, for homing against an end stop.
    ///
    /// The move first waits for the shaft to spin up, then stops once the rate stays at or
    /// below a tenth of the target for [`STALL_CONFIRM_CHECKS`] corrections. It gives up after
    /// [`STALL_TIMEOUT_MS`] of running. [`Motor::outcome`] reports which happened.
    pub fn go_till_stop<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
        forward: bool,
        ticks_per_second: u32,
        now_ms: u32,
    ) {
        if ticks_per_second == 0 {
            self.stop(pwm);
            return;
        }

        info!("{=str}: run till stop at {} ticks/s", self.name, ticks_per_second);
        let direction = Direction::from_forward(forward);
        let watch = Some(StallWatch::new(now_ms));
        self.arm(pwm, direction, None, ticks_per_second, watch, now_ms);
    }

    /// Enter `Regulated`. A motor already moving in `direction` keeps its power and, if it was
    /// regulated, its measurement window; anything else starts from the seed power.
    fn arm<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
        direction: Direction,
        goal: Option<i32>,
        ticks_per_second: u32,
        watch: Option<StallWatch>,
        now_ms: u32,
    ) {
        let keep_power = self.moving() && self.mode.direction() == Some(direction);
        let (last_check_ms, last_position) = match self.mode {
            MotorMode::Regulated { regulation, .. } if keep_power => {
                (regulation.last_check_ms, regulation.last_position)
            }
            _ => (now_ms, self.encoder.position()),
        };

        self.outcome = None;
        self.mode = MotorMode::Regulated {
            direction,
            regulation: Regulation {
                goal,
                ticks_per_second,
                last_check_ms,
                last_position,
                watch,
            },
        };

        if !keep_power {
            self.set_power(pwm, self.config.seed_power as i32);
        }
    }

    /// Regulation step. Call on every control-loop iteration.
    pub fn check_encoder<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
        now_ms: u32,
    ) {
        let MotorMode::Regulated {
            direction,
            regulation,
        } = self.mode
        else {
            return;
        };

        let position = self.encoder.position();
        let ticks_left = regulation.goal.map(|goal| match direction {
            Direction::Forward => goal as i64 - position as i64,
            Direction::Backward => position as i64 - goal as i64,
        });
        if let (Some(goal), Some(left)) = (regulation.goal, ticks_left) {
            if left <= 0 {
                info!("{=str}: goal {} reached at {}", self.name, goal, position);
                self.finish(pwm, MoveOutcome::GoalReached);
                return;
            }
        }

        let interval = self.config.regulation_interval_ms;
        if now_ms.wrapping_sub(regulation.last_check_ms) < interval {
            return;
        }

        let moved = position.abs_diff(regulation.last_position) as u64;
        let achieved = (moved * 1000 / interval as u64).min(u32::MAX as u64) as u32;
        self.achieved = achieved;
        self.checks = self.checks.wrapping_add(1);

        let mut regulation = Regulation {
            last_check_ms: now_ms,
            last_position: position,
            ..regulation
        };
        if let Some(watch) = regulation.watch.as_mut() {
            match watch.observe(achieved, regulation.ticks_per_second, now_ms) {
                Some(MoveOutcome::TimedOut) => {
                    warn!("{=str}: no stall after {} ms", self.name, STALL_TIMEOUT_MS);
                    self.finish(pwm, MoveOutcome::TimedOut);
                    return;
                }
                Some(outcome) => {
                    info!("{=str}: stalled at {}", self.name, position);
                    self.finish(pwm, outcome);
                    return;
                }
                None => {}
            }
        }
        self.mode = MotorMode::Regulated {
            direction,
            regulation,
        };

        let target = match ticks_left {
            Some(left) => approach_rate(regulation.ticks_per_second, left as u64),
            None => regulation.ticks_per_second,
        };
        let power = self.next_power(achieved, target);

        if power != self.power as i32 {
            trace!(
                "{=str}: {} ticks/s (target {}), power {} -> {}",
                self.name,
                achieved,
                target,
                self.power,
                power
            );
            self.set_power(pwm, power);
        }
    }

    /// Power for the next interval given the achieved and target rates.
    fn next_power(&self, achieved: u32, target: u32) -> i32 {
        let power = self.power as i32;
        let seed = self.config.seed_power as i32;

        if achieved == 0 {
            let escalated = if power < seed { seed } else { power * 2 };
            debug!("{=str}: no motion, power {} -> {}", self.name, power, escalated);
            escalated
        } else if achieved > target {
            let lowered = F32Ext::round(power as f32 / POWER_RATIO) as i32;
            lowered.min(power - 1).max(1)
        } else if achieved < target {
            let raised = F32Ext::round(power as f32 * POWER_RATIO) as i32;
            raised.max(power + 1)
        } else {
            power
        }
    }

    fn de_energize<IO: DigitalIo, T: TimerRegs, const N: usize>(
        &mut self,
        pwm: &mut PwmDriver<IO, T, N>,
    ) {
        match self.pins {
            MotorPins::DualDirection { in1, in2 } => {
                pwm.digital_write(in1, Level::Low);
                pwm.digital_write(in2, Level::Low);
            }
            MotorPins::DirectionPwm { enable, pwm: speed, .. } => {
                if let Some(enable) = enable {
                    pwm.digital_write(enable, Level::High);
                }
                pwm.analog_write(speed, 0);
            }
        }
    }

    /// Re-reference the encoder. A regulated move keeps its goal relative to the motor shaft.
    pub fn zero(&mut self, offset: i32) {
        let shift = offset.wrapping_sub(self.encoder.position());
        self.encoder.zero(offset);

        if let MotorMode::Regulated {
            ref mut regulation,
            ..
        } = self.mode
        {
            regulation.goal = regulation.goal.map(|goal| goal.wrapping_add(shift));
            regulation.last_position = regulation.last_position.wrapping_add(shift);
        }
    }

    /// A direction is asserted and power is applied.
    #[inline]
    pub fn moving(&self) -> bool {
        self.mode.direction().is_some() && self.power > 0
    }

    #[inline]
    pub fn encoder_position(&self) -> i32 {
        self.encoder.position()
    }

    /// Encoder position converted to output shaft revolutions.
    #[inline]
    pub fn position_revs(&self) -> f32 {
        self.encoder.position() as f32 / self.config.ticks_per_rotation.max(1) as f32
    }

    #[inline]
    pub fn power(&self) -> u8 {
        self.power
    }

    #[inline]
    pub fn direction(&self) -> Option<Direction> {
        self.mode.direction()
    }

    #[inline]
    pub fn is_regulated(&self) -> bool {
        matches!(self.mode, MotorMode::Regulated { .. })
    }

    /// Goal of the regulated move in progress.
    pub fn goal(&self) -> Option<i32> {
        match self.mode {
            MotorMode::Regulated { regulation, .. } => regulation.goal,
            _ => None,
        }
    }

    /// Number of regulation corrections applied since construction.
    #[inline]
    pub fn regulation_checks(&self) -> u32 {
        self.checks
    }

    /// Rate measured at the last correction, in ticks per second. 0 while stopped.
    #[inline]
    pub fn achieved_rate(&self) -> u32 {
        self.achieved
    }

    /// How the last regulated move ended, if it ended on its own.
    #[inline]
    pub fn outcome(&self) -> Option<MoveOutcome> {
        self.outcome
    }

    #[inline]
    pub fn mode(&self) -> MotorMode {
        self.mode
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::gpio::{PinMode, Port};
    use crate::hw::pwm::{PinRoute, PwmTimer};
    use crate::hw::tim::tests::leaked_timer;
    use crate::hw::tim::{Channel, OutputMode, TimBlock};
    use crate::testing::MockIo;

    const IN1: PinId = PinId::new(Port::D, 12);
    const IN2: PinId = PinId::new(Port::D, 13);
    const SPEED: PinId = PinId::new(Port::D, 14);
    const DIR: PinId = PinId::new(Port::A, 5);
    const DISABLE: PinId = PinId::new(Port::A, 4);

    static ROUTES: [PinRoute; 3] = [
        PinRoute {
            pin: IN1,
            timer: 0,
            channel: Channel::A,
            af: 2,
        },
        PinRoute {
            pin: IN2,
            timer: 0,
            channel: Channel::B,
            af: 2,
        },
        PinRoute {
            pin: SPEED,
            timer: 0,
            channel: Channel::C,
            af: 2,
        },
    ];

    const DUAL: MotorPins = MotorPins::DualDirection { in1: IN1, in2: IN2 };
    const PHASE: MotorPins = MotorPins::DirectionPwm {
        dir: DIR,
        enable: Some(DISABLE),
        pwm: SPEED,
    };

    type Driver = PwmDriver<MockIo, &'static TimBlock, 1>;

    fn driver() -> Driver {
        let (tim, _) = leaked_timer();
        let mut pwm = PwmDriver::new(
            MockIo::new(),
            [PwmTimer::counter16(tim, 4)],
            &ROUTES,
            16_000_000,
        );
        pwm.set_pin_frequency(IN1, 20_000).unwrap();
        pwm
    }

    /// (output mode, stored duty) of a timer-routed pin.
    fn output(pwm: &Driver, channel: Channel) -> (Option<OutputMode>, Option<u8>) {
        let timer = pwm.timer(0).unwrap();
        (
            timer.timer().output_mode(channel),
            timer.duty(channel.index()),
        )
    }

    #[test]
    fn new_motor_is_stopped_with_outputs_configured() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let motor = Motor::new("m", PHASE, &enc, MotorConfig::default(), &mut pwm);

        assert_eq!(motor.mode(), MotorMode::Stopped);
        assert!(!motor.moving());
        assert_eq!(pwm.io().mode(DIR), Some(PinMode::Output));
        assert_eq!(pwm.io().mode(DISABLE), Some(PinMode::Output));
        assert_eq!(pwm.io().mode(SPEED), Some(PinMode::Alternate(2)));
        assert_eq!(pwm.io().level(DISABLE), Level::High);
        assert_eq!(output(&pwm, Channel::C).0, Some(OutputMode::ForceLow));
    }

    #[test]
    fn dual_forward_holds_in1_and_throttles_in2() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go(&mut pwm, true, 100);
        assert_eq!(motor.direction(), Some(Direction::Forward));
        assert!(motor.moving());
        assert_eq!(output(&pwm, Channel::A), (Some(OutputMode::ForceHigh), Some(255)));
        assert_eq!(output(&pwm, Channel::B), (Some(OutputMode::Pwm), Some(155)));
    }

    #[test]
    fn dual_backward_holds_in2_and_throttles_in1() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go(&mut pwm, false, 200);
        assert_eq!(output(&pwm, Channel::B), (Some(OutputMode::ForceHigh), Some(255)));
        assert_eq!(output(&pwm, Channel::A), (Some(OutputMode::Pwm), Some(55)));
    }

    #[test]
    fn dual_full_power_pulls_throttled_pin_low() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go(&mut pwm, true, 255);
        assert_eq!(output(&pwm, Channel::B).0, Some(OutputMode::ForceLow));
    }

    #[test]
    fn stop_is_idempotent_and_de_energizes() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go(&mut pwm, true, 80);
        motor.stop(&mut pwm);
        motor.stop(&mut pwm);
        assert_eq!(motor.mode(), MotorMode::Stopped);
        assert_eq!(motor.power(), 0);
        assert_eq!(output(&pwm, Channel::A).0, Some(OutputMode::ForceLow));
        assert_eq!(output(&pwm, Channel::B).0, Some(OutputMode::ForceLow));
    }

    #[test]
    fn phase_wiring_asserts_direction_then_speed() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", PHASE, &enc, MotorConfig::default(), &mut pwm);

        motor.go(&mut pwm, true, 40);
        assert_eq!(pwm.io().level(DIR), Level::High);
        assert_eq!(pwm.io().level(DISABLE), Level::Low);
        assert_eq!(output(&pwm, Channel::C), (Some(OutputMode::Pwm), Some(40)));

        motor.go(&mut pwm, false, 40);
        assert_eq!(pwm.io().level(DIR), Level::Low);

        motor.stop(&mut pwm);
        assert_eq!(pwm.io().level(DISABLE), Level::High);
        assert_eq!(output(&pwm, Channel::C).0, Some(OutputMode::ForceLow));
    }

    #[test]
    fn power_is_clamped() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", PHASE, &enc, MotorConfig::default(), &mut pwm);

        motor.go(&mut pwm, true, 400);
        assert_eq!(motor.power(), 255);

        motor.set_power(&mut pwm, -20);
        assert_eq!(motor.power(), 0);
        assert!(!motor.moving());
        assert_eq!(pwm.io().level(DISABLE), Level::High);

        let capped = MotorConfig::default().with_max_power(120);
        let mut motor = Motor::new("m", PHASE, &enc, capped, &mut pwm);
        motor.go(&mut pwm, true, 200);
        assert_eq!(motor.power(), 120);
    }

    #[test]
    fn go_to_below_target_rate_ramps_power_until_goal() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_to(&mut pwm, 100, 500, 0);
        assert!(motor.is_regulated());
        assert_eq!(motor.goal(), Some(500));
        assert_eq!(motor.direction(), Some(Direction::Forward));
        assert_eq!(motor.power(), 16);

        // 10 ticks per 333 ms is 30 ticks/s.
        let mut now = 0;
        let mut last = motor.power();
        for _ in 0..40 {
            now += 333;
            enc.zero(enc.position() + 10);
            motor.check_encoder(&mut pwm, now);

            assert!(motor.power() >= last);
            last = motor.power();
        }
        assert_eq!(motor.power(), 255);
        assert_eq!(motor.regulation_checks(), 40);

        enc.zero(500);
        motor.check_encoder(&mut pwm, now + 1);
        assert!(!motor.moving());
        assert!(!motor.is_regulated());
        assert_eq!(motor.power(), 0);
        assert_eq!(motor.outcome(), Some(MoveOutcome::GoalReached));
    }

    #[test]
    fn corrections_wait_for_the_interval() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_for(&mut pwm, 100, 1000, 5_000);
        enc.zero(3);
        motor.check_encoder(&mut pwm, 5_332);
        assert_eq!(motor.regulation_checks(), 0);
        assert_eq!(motor.power(), 16);

        motor.check_encoder(&mut pwm, 5_333);
        assert_eq!(motor.regulation_checks(), 1);
    }

    #[test]
    fn stall_escalates_power() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_for(&mut pwm, 100, 1000, 0);
        motor.check_encoder(&mut pwm, 333);
        assert_eq!(motor.power(), 32);
        motor.check_encoder(&mut pwm, 666);
        assert_eq!(motor.power(), 64);
        for i in 3..8 {
            motor.check_encoder(&mut pwm, 333 * i);
        }
        assert_eq!(motor.power(), 255);
    }

    #[test]
    fn stall_below_seed_jumps_to_seed() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_for(&mut pwm, 10, 1000, 0);
        // Way too fast: power drops below the seed.
        enc.zero(300);
        motor.check_encoder(&mut pwm, 333);
        assert_eq!(motor.power(), 15);

        motor.check_encoder(&mut pwm, 666);
        assert_eq!(motor.power(), 16);
    }

    #[test]
    fn too_fast_lowers_power_but_keeps_it_energized() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_for(&mut pwm, 10, 100_000, 0);
        let mut now = 0;
        for _ in 0..60 {
            now += 333;
            enc.zero(enc.position() + 100);
            motor.check_encoder(&mut pwm, now);
        }
        assert_eq!(motor.power(), 1);
        assert!(motor.moving());
    }

    #[test]
    fn on_target_rate_holds_power() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let config = MotorConfig::default().with_regulation_interval_ms(500);
        let mut motor = Motor::new("m", DUAL, &enc, config, &mut pwm);

        motor.go_for(&mut pwm, 40, 1000, 0);
        enc.zero(20);
        motor.check_encoder(&mut pwm, 500);
        assert_eq!(motor.power(), 16);
        assert_eq!(motor.regulation_checks(), 1);
    }

    #[test]
    fn backward_move_stops_at_or_below_goal() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", PHASE, &enc, MotorConfig::default(), &mut pwm);

        enc.zero(100);
        motor.go_for(&mut pwm, 50, -30, 0);
        assert_eq!(motor.goal(), Some(70));
        assert_eq!(motor.direction(), Some(Direction::Backward));
        assert_eq!(pwm.io().level(DIR), Level::Low);

        enc.zero(71);
        motor.check_encoder(&mut pwm, 10);
        assert!(motor.moving());

        enc.zero(69);
        motor.check_encoder(&mut pwm, 20);
        assert_eq!(motor.mode(), MotorMode::Stopped);
    }

    #[test]
    fn degenerate_moves_stop() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go(&mut pwm, true, 50);
        motor.go_to(&mut pwm, 0, 500, 0);
        assert_eq!(motor.mode(), MotorMode::Stopped);

        motor.go(&mut pwm, true, 50);
        motor.go_to(&mut pwm, 100, 0, 0);
        assert_eq!(motor.mode(), MotorMode::Stopped);

        motor.go(&mut pwm, true, 50);
        motor.go_at(&mut pwm, false, 0, 0);
        assert_eq!(motor.mode(), MotorMode::Stopped);
        assert_eq!(motor.outcome(), None);
    }

    #[test]
    fn zero_distance_holds_the_rate_without_a_goal() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_for(&mut pwm, 100, 0, 0);
        assert!(motor.is_regulated());
        assert_eq!(motor.goal(), None);
        assert_eq!(motor.direction(), Some(Direction::Forward));
        assert_eq!(motor.power(), 16);

        // Far past any goal it might have had; only the rate matters.
        enc.zero(100_000);
        motor.check_encoder(&mut pwm, 333);
        assert!(motor.is_regulated());
        assert_eq!(motor.power(), 15);

        enc.zero(-100_000);
        motor.check_encoder(&mut pwm, 666);
        assert!(motor.is_regulated());
        assert_eq!(motor.regulation_checks(), 2);
    }

    #[test]
    fn zero_distance_keeps_the_current_direction() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", PHASE, &enc, MotorConfig::default(), &mut pwm);

        motor.go(&mut pwm, false, 50);
        motor.go_for(&mut pwm, 100, 0, 0);
        assert_eq!(motor.direction(), Some(Direction::Backward));
        assert_eq!(motor.power(), 50);
        assert_eq!(pwm.io().level(DIR), Level::Low);
    }

    #[test]
    fn rearming_in_the_same_direction_keeps_power() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_to(&mut pwm, 100, 1000, 0);
        motor.check_encoder(&mut pwm, 333);
        motor.check_encoder(&mut pwm, 666);
        assert_eq!(motor.power(), 64);

        motor.go_to(&mut pwm, 150, 2000, 700);
        assert_eq!(motor.goal(), Some(2000));
        assert_eq!(motor.power(), 64);
        // The measurement window carries over from the previous move.
        motor.check_encoder(&mut pwm, 999);
        assert_eq!(motor.regulation_checks(), 3);

        motor.go_at(&mut pwm, true, 80, 1000);
        assert_eq!(motor.goal(), None);
        assert_eq!(motor.power(), 128);
    }

    #[test]
    fn reversing_reseeds_power() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go(&mut pwm, true, 200);
        motor.go_to(&mut pwm, 100, -50, 0);
        assert_eq!(motor.direction(), Some(Direction::Backward));
        assert_eq!(motor.power(), 16);
    }

    #[test]
    fn last_half_second_halves_the_target_rate() {
        // 25 ticks per 333 ms is 75 ticks/s.
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);
        motor.go_for(&mut pwm, 100, 1000, 0);
        enc.zero(25);
        motor.check_encoder(&mut pwm, 333);
        assert_eq!(motor.power(), 18);

        // 35 ticks left is 350 ms at 100 ticks/s: the target drops to 50.
        let enc = Encoder::new();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);
        motor.go_for(&mut pwm, 100, 60, 0);
        enc.zero(25);
        motor.check_encoder(&mut pwm, 333);
        assert_eq!(motor.power(), 15);
    }

    #[test]
    fn last_tenth_of_a_second_quarters_the_target_rate() {
        // 12 ticks per 333 ms is 36 ticks/s, with 8 ticks (80 ms) left: the target is 25.
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_for(&mut pwm, 100, 20, 0);
        enc.zero(12);
        motor.check_encoder(&mut pwm, 333);
        assert_eq!(motor.power(), 15);
        assert!(motor.is_regulated());
    }

    #[test]
    fn achieved_rate_scales_ticks_before_dividing() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);
        assert_eq!(motor.achieved_rate(), 0);

        motor.go_for(&mut pwm, 1000, 100_000, 0);
        enc.zero(333);
        motor.check_encoder(&mut pwm, 333);
        assert_eq!(motor.achieved_rate(), 1000);
        assert_eq!(motor.power(), 16);

        motor.stop(&mut pwm);
        assert_eq!(motor.achieved_rate(), 0);
    }

    #[test]
    fn till_stop_ends_when_the_shaft_blocks() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_till_stop(&mut pwm, true, 100, 0);
        assert_eq!(motor.goal(), None);

        // Spins up at 150 ticks/s for two checks, then hits the end stop.
        enc.zero(50);
        motor.check_encoder(&mut pwm, 333);
        enc.zero(100);
        motor.check_encoder(&mut pwm, 666);
        motor.check_encoder(&mut pwm, 999);
        assert!(motor.is_regulated());

        motor.check_encoder(&mut pwm, 1332);
        assert_eq!(motor.mode(), MotorMode::Stopped);
        assert_eq!(motor.outcome(), Some(MoveOutcome::Stalled));
        assert_eq!(motor.power(), 0);
    }

    #[test]
    fn till_stop_stops_waiting_for_spin_up() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_till_stop(&mut pwm, false, 100, 0);
        for i in 1..=7 {
            motor.check_encoder(&mut pwm, 333 * i);
        }
        assert!(motor.is_regulated());
        assert_eq!(motor.outcome(), None);

        motor.check_encoder(&mut pwm, 333 * 8);
        assert_eq!(motor.outcome(), Some(MoveOutcome::Stalled));
    }

    #[test]
    fn till_stop_times_out_on_a_free_shaft() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_till_stop(&mut pwm, true, 100, 0);
        for i in 1..=32 {
            enc.zero(50 * i as i32);
            motor.check_encoder(&mut pwm, 333 * i);
        }
        assert!(motor.is_regulated());

        enc.zero(50 * 33);
        motor.check_encoder(&mut pwm, 333 * 33);
        assert_eq!(motor.outcome(), Some(MoveOutcome::TimedOut));
        assert!(!motor.moving());

        motor.go(&mut pwm, true, 10);
        motor.go_to(&mut pwm, 100, 0, 11_000);
        assert_eq!(motor.outcome(), None);
    }

    #[test]
    fn open_loop_go_cancels_regulation() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_to(&mut pwm, 100, 500, 0);
        motor.go(&mut pwm, false, 90);
        assert_eq!(motor.mode(), MotorMode::Driving(Direction::Backward));

        motor.check_encoder(&mut pwm, 10_000);
        assert_eq!(motor.power(), 90);
        assert_eq!(motor.regulation_checks(), 0);
    }

    #[test]
    fn zero_during_move_shifts_goal() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        enc.zero(40);
        motor.go_for(&mut pwm, 100, 60, 0);
        motor.zero(0);
        assert_eq!(motor.goal(), Some(60));
        assert_eq!(motor.encoder_position(), 0);
    }

    #[test]
    fn interval_is_measured_across_clock_wrap() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let mut motor = Motor::new("m", DUAL, &enc, MotorConfig::default(), &mut pwm);

        motor.go_for(&mut pwm, 100, 1000, u32::MAX - 100);
        motor.check_encoder(&mut pwm, 232);
        assert_eq!(motor.regulation_checks(), 1);
    }

    #[test]
    fn position_in_revolutions() {
        let enc = Encoder::new();
        let mut pwm = driver();
        let config = MotorConfig::default().with_ticks_per_rotation(200);
        let motor = Motor::new("m", DUAL, &enc, config, &mut pwm);

        enc.zero(-300);
        assert_eq!(motor.position_revs(), -1.5);
    }
}
