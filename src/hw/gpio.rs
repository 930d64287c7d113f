// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Digital I/O capability and the STM32 GPIO port register view.
//!
//! Higher layers address pins by [`PinId`] through the [`DigitalIo`] trait, so the same motor and
//! PWM code runs against the real ports on the board and against a mock in tests.

use super::regs::{Field, Reg};

/// Logic level of a digital line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    #[inline]
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    #[inline]
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Pin configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    Input,
    Output,
    /// Alternate function `af` (0..=15), e.g. a timer output.
    Alternate(u8),
}

/// GPIO port letter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    A = 0,
    B,
    C,
    D,
    E,
}

impl Port {
    pub const COUNT: usize = 5;

    fn from_index(index: u8) -> Self {
        match index {
            0 => Port::A,
            1 => Port::B,
            2 => Port::C,
            3 => Port::D,
            _ => Port::E,
        }
    }
}

/// Logical pin identifier: `port * 16 + index`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinId(u8);

impl PinId {
    pub const fn new(port: Port, index: u8) -> Self {
        Self(((port as u8) << 4) | (index & 0x0F))
    }

    #[inline]
    pub fn port(self) -> Port {
        Port::from_index(self.0 >> 4)
    }

    #[inline]
    pub fn index(self) -> u8 {
        self.0 & 0x0F
    }

    #[inline]
    pub fn raw(self) -> u8 {
        self.0
    }
}

/// Pin-addressed digital I/O.
pub trait DigitalIo {
    fn set_mode(&mut self, pin: PinId, mode: PinMode);
    fn write(&mut self, pin: PinId, level: Level);
    fn read(&self, pin: PinId) -> Level;
}

/// GPIO port registers used for pin configuration and I/O.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortReg {
    Moder,
    Otyper,
    Ospeedr,
    /// Read-only; writes are dropped.
    Idr,
    /// Write-only; reads return 0.
    Bsrr,
    Afrl,
    Afrh,
}

/// Raw access to one GPIO port's registers.
pub trait PortRegs {
    fn read(&self, reg: PortReg) -> u32;
    fn write(&self, reg: PortReg, value: u32);
}

impl<R: PortRegs + ?Sized> PortRegs for &R {
    #[inline]
    fn read(&self, reg: PortReg) -> u32 {
        (**self).read(reg)
    }

    #[inline]
    fn write(&self, reg: PortReg, value: u32) {
        (**self).write(reg, value)
    }
}

/// In-memory GPIO port register block, laid out at the reference-manual offsets. Stands in for
/// the peripheral in host builds.
#[repr(C)]
pub struct GpioBlock {
    pub moder: Reg,
    pub otyper: Reg,
    pub ospeedr: Reg,
    pub pupdr: Reg,
    pub idr: Reg,
    pub odr: Reg,
    pub bsrr: Reg,
    pub lckr: Reg,
    pub afrl: Reg,
    pub afrh: Reg,
}

impl GpioBlock {
    /// Block in its reset state.
    pub const fn reset() -> Self {
        Self {
            moder: Reg::new(0),
            otyper: Reg::new(0),
            ospeedr: Reg::new(0),
            pupdr: Reg::new(0),
            idr: Reg::new(0),
            odr: Reg::new(0),
            bsrr: Reg::new(0),
            lckr: Reg::new(0),
            afrl: Reg::new(0),
            afrh: Reg::new(0),
        }
    }
}

impl PortRegs for GpioBlock {
    fn read(&self, reg: PortReg) -> u32 {
        match reg {
            PortReg::Moder => self.moder.read(),
            PortReg::Otyper => self.otyper.read(),
            PortReg::Ospeedr => self.ospeedr.read(),
            PortReg::Idr => self.idr.read(),
            PortReg::Bsrr => 0,
            PortReg::Afrl => self.afrl.read(),
            PortReg::Afrh => self.afrh.read(),
        }
    }

    fn write(&self, reg: PortReg, value: u32) {
        match reg {
            PortReg::Moder => self.moder.write(value),
            PortReg::Otyper => self.otyper.write(value),
            PortReg::Ospeedr => self.ospeedr.write(value),
            PortReg::Idr => {}
            // Latched so tests can see the last set/reset request.
            PortReg::Bsrr => self.bsrr.write(value),
            PortReg::Afrl => self.afrl.write(value),
            PortReg::Afrh => self.afrh.write(value),
        }
    }
}

const MODER_INPUT: u32 = 0b00;
const MODER_OUTPUT: u32 = 0b01;
const MODER_ALTERNATE: u32 = 0b10;
const OSPEEDR_VERY_HIGH: u32 = 0b11;

/// Typed view over one GPIO port.
#[derive(Copy, Clone)]
pub struct GpioPort<R> {
    regs: R,
}

impl<R: PortRegs> GpioPort<R> {
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    #[inline]
    fn set_field(&self, reg: PortReg, field: Field, value: u32) {
        let current = self.regs.read(reg);
        self.regs.write(reg, field.insert(current, value));
    }

    pub fn set_mode(&self, index: u8, mode: PinMode) {
        let two_bit = Field::new(index * 2, 2);
        match mode {
            PinMode::Input => self.set_field(PortReg::Moder, two_bit, MODER_INPUT),
            PinMode::Output => {
                self.set_field(PortReg::Otyper, Field::bit(index), 0);
                self.set_field(PortReg::Moder, two_bit, MODER_OUTPUT);
            }
            PinMode::Alternate(af) => {
                let afr = if index < 8 {
                    PortReg::Afrl
                } else {
                    PortReg::Afrh
                };
                self.set_field(afr, Field::new((index % 8) * 4, 4), af as u32);
                self.set_field(PortReg::Ospeedr, two_bit, OSPEEDR_VERY_HIGH);
                self.set_field(PortReg::Moder, two_bit, MODER_ALTERNATE);
            }
        }
    }

    /// Drive an output through the atomic set/reset register.
    #[inline]
    pub fn write(&self, index: u8, level: Level) {
        let bit = match level {
            Level::High => 1 << index,
            Level::Low => 1 << (index + 16),
        };
        self.regs.write(PortReg::Bsrr, bit);
    }

    #[inline]
    pub fn read(&self, index: u8) -> Level {
        Level::from(Field::bit(index).extract(self.regs.read(PortReg::Idr)) != 0)
    }
}
