// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! STM32F7 general-purpose timer registers, used as PWM carriers.
//!
//! [`Timer`] programs any [`TimerRegs`] implementation: the PAC timer on the board, or the
//! in-memory [`TimBlock`] on the host. The counter runs center-aligned, so one PWM period is an
//! up-count plus a down-count and the carrier frequency is `f_timer / (2 × prescaler × ARR)`.

use super::regs::{Field, Reg};

/// Timer compare channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::A, Channel::B, Channel::C, Channel::D];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Timer registers used for PWM generation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimReg {
    Cr1,
    /// Write-only; reads return 0.
    Egr,
    Ccmr1,
    Ccmr2,
    Ccer,
    Psc,
    Arr,
    Ccr(Channel),
}

/// Raw access to one timer's registers.
pub trait TimerRegs {
    fn read(&self, reg: TimReg) -> u32;
    fn write(&self, reg: TimReg, value: u32);
}

impl<R: TimerRegs + ?Sized> TimerRegs for &R {
    #[inline]
    fn read(&self, reg: TimReg) -> u32 {
        (**self).read(reg)
    }

    #[inline]
    fn write(&self, reg: TimReg, value: u32) {
        (**self).write(reg, value)
    }
}

/// In-memory timer register block, laid out at the reference-manual offsets (CR1 at 0x00 through
/// CCR4 at 0x40). Stands in for the peripheral in host builds.
#[repr(C)]
pub struct TimBlock {
    pub cr1: Reg,
    pub cr2: Reg,
    pub smcr: Reg,
    pub dier: Reg,
    pub sr: Reg,
    pub egr: Reg,
    pub ccmr1: Reg,
    pub ccmr2: Reg,
    pub ccer: Reg,
    pub cnt: Reg,
    pub psc: Reg,
    pub arr: Reg,
    pub rcr: Reg,
    pub ccr: [Reg; 4],
}

impl TimBlock {
    /// Block in its reset state (ARR resets to all ones).
    pub const fn reset() -> Self {
        Self {
            cr1: Reg::new(0),
            cr2: Reg::new(0),
            smcr: Reg::new(0),
            dier: Reg::new(0),
            sr: Reg::new(0),
            egr: Reg::new(0),
            ccmr1: Reg::new(0),
            ccmr2: Reg::new(0),
            ccer: Reg::new(0),
            cnt: Reg::new(0),
            psc: Reg::new(0),
            arr: Reg::new(0xFFFF),
            rcr: Reg::new(0),
            ccr: [Reg::new(0), Reg::new(0), Reg::new(0), Reg::new(0)],
        }
    }

    fn reg(&self, reg: TimReg) -> &Reg {
        match reg {
            TimReg::Cr1 => &self.cr1,
            TimReg::Egr => &self.egr,
            TimReg::Ccmr1 => &self.ccmr1,
            TimReg::Ccmr2 => &self.ccmr2,
            TimReg::Ccer => &self.ccer,
            TimReg::Psc => &self.psc,
            TimReg::Arr => &self.arr,
            TimReg::Ccr(channel) => &self.ccr[channel.index()],
        }
    }
}

impl TimerRegs for TimBlock {
    #[inline]
    fn read(&self, reg: TimReg) -> u32 {
        self.reg(reg).read()
    }

    #[inline]
    fn write(&self, reg: TimReg, value: u32) {
        self.reg(reg).write(value)
    }
}

pub mod fields {
    use super::Field;

    pub const CR1_CEN: Field = Field::bit(0);
    pub const CR1_CMS: Field = Field::new(5, 2);
    pub const CR1_ARPE: Field = Field::bit(7);
    pub const EGR_UG: Field = Field::bit(0);

    /// Center-aligned mode 1.
    pub const CMS_CENTER_1: u32 = 0b01;

    pub const OCM_FORCE_INACTIVE: u32 = 0b100;
    pub const OCM_FORCE_ACTIVE: u32 = 0b101;
    pub const OCM_PWM1: u32 = 0b110;

    /// OCxM within CCMR1/CCMR2 for the even/odd channel of the pair.
    pub const fn ocm(slot: u8) -> Field {
        Field::new(4 + 8 * slot, 3)
    }

    /// OCxPE (preload enable) within CCMR1/CCMR2.
    pub const fn ocpe(slot: u8) -> Field {
        Field::bit(3 + 8 * slot)
    }

    /// CCxE within CCER.
    pub const fn cce(channel: u8) -> Field {
        Field::bit(4 * channel)
    }
}

use fields::*;

/// Output compare behavior of a channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputMode {
    /// PWM mode 1: active while the counter is below the compare value.
    Pwm,
    /// Output held low regardless of the compare value.
    ForceLow,
    /// Output held high regardless of the compare value.
    ForceHigh,
}

/// Typed view over one timer peripheral.
#[derive(Copy, Clone)]
pub struct Timer<R> {
    regs: R,
}

impl<R: TimerRegs> Timer<R> {
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Tear down the view and return the registers.
    pub fn free(self) -> R {
        self.regs
    }

    #[inline]
    fn field(&self, reg: TimReg, field: Field) -> u32 {
        field.extract(self.regs.read(reg))
    }

    #[inline]
    fn set_field(&self, reg: TimReg, field: Field, value: u32) {
        let current = self.regs.read(reg);
        self.regs.write(reg, field.insert(current, value));
    }

    /// Gate the counter clock off. Outputs hold their last state.
    #[inline]
    pub fn stop_clock(&self) {
        self.set_field(TimReg::Cr1, CR1_CEN, 0);
    }

    /// Load `prescaler` (divide ratio, >= 1) and the preloaded registers, then gate the clock on.
    pub fn start_clock(&self, prescaler: u16) {
        self.regs
            .write(TimReg::Psc, prescaler.saturating_sub(1) as u32);
        self.regs.write(TimReg::Egr, EGR_UG.mask());
        self.set_field(TimReg::Cr1, CR1_CEN, 1);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.field(TimReg::Cr1, CR1_CEN) != 0
    }

    /// Divide ratio currently programmed.
    #[inline]
    pub fn prescaler(&self) -> u32 {
        self.regs.read(TimReg::Psc) + 1
    }

    /// Count up and down between 0 and ARR, with ARR preload.
    pub fn set_center_aligned(&self) {
        let cr1 = self.regs.read(TimReg::Cr1);
        let cr1 = CR1_ARPE.insert(CR1_CMS.insert(cr1, CMS_CENTER_1), 1);
        self.regs.write(TimReg::Cr1, cr1);
    }

    #[inline]
    pub fn is_center_aligned(&self) -> bool {
        self.field(TimReg::Cr1, CR1_CMS) == CMS_CENTER_1
    }

    #[inline]
    pub fn set_top(&self, top: u16) {
        self.regs.write(TimReg::Arr, top as u32);
    }

    #[inline]
    pub fn top(&self) -> u16 {
        self.regs.read(TimReg::Arr) as u16
    }

    #[inline]
    pub fn set_compare(&self, channel: Channel, value: u16) {
        self.regs.write(TimReg::Ccr(channel), value as u32);
    }

    #[inline]
    pub fn compare(&self, channel: Channel) -> u16 {
        self.regs.read(TimReg::Ccr(channel)) as u16
    }

    fn ccmr(channel: Channel) -> (TimReg, u8) {
        let slot = (channel.index() % 2) as u8;
        if channel.index() < 2 {
            (TimReg::Ccmr1, slot)
        } else {
            (TimReg::Ccmr2, slot)
        }
    }

    pub fn set_output_mode(&self, channel: Channel, mode: OutputMode) {
        let (ccmr, slot) = Self::ccmr(channel);
        let ocm = match mode {
            OutputMode::Pwm => OCM_PWM1,
            OutputMode::ForceLow => OCM_FORCE_INACTIVE,
            OutputMode::ForceHigh => OCM_FORCE_ACTIVE,
        };
        let value = fields::ocm(slot).insert(self.regs.read(ccmr), ocm);
        let value = ocpe(slot).insert(value, (mode == OutputMode::Pwm) as u32);
        self.regs.write(ccmr, value);
    }

    pub fn output_mode(&self, channel: Channel) -> Option<OutputMode> {
        let (ccmr, slot) = Self::ccmr(channel);
        match self.field(ccmr, fields::ocm(slot)) {
            OCM_PWM1 => Some(OutputMode::Pwm),
            OCM_FORCE_INACTIVE => Some(OutputMode::ForceLow),
            OCM_FORCE_ACTIVE => Some(OutputMode::ForceHigh),
            _ => None,
        }
    }

    /// Connect the channel's compare output to its pin.
    #[inline]
    pub fn enable_output(&self, channel: Channel) {
        self.set_field(TimReg::Ccer, cce(channel.index() as u8), 1);
    }

    #[inline]
    pub fn is_output_enabled(&self, channel: Channel) -> bool {
        self.field(TimReg::Ccer, cce(channel.index() as u8)) != 0
    }
}
