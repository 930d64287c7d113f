// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Board support for the STM32F777 motor board.
//!
//! Pin assignments, the TIM4 PWM routes, the GPIO-backed [`DigitalIo`] and the encoder interrupt
//! plumbing. The EXTI and SysTick vectors themselves are defined by the firmware binary, which
//! forwards them to [`service_exti`] and [`super::clock::tick`].

use stm32f7xx_hal::pac;

use super::encoder::{EncoderBank, Line};
use super::gpio::{DigitalIo, GpioPort, Level, PinId, PinMode, Port, PortReg, PortRegs};
use super::pwm::PinRoute;
use super::tim::{Channel, TimReg, TimerRegs};

/// Encoder ticks per output shaft revolution (12 CPR motor encoder, 4 edges per count).
pub const TICKS_PER_ROTATION: u32 = 48;

/// Named pins.
pub mod pins {
    use super::{PinId, Port};

    // Motor 1: IN1/IN2 bridge, both inputs on TIM4 (CH1, CH2).
    pub const M1_IN1: PinId = PinId::new(Port::D, 12);
    pub const M1_IN2: PinId = PinId::new(Port::D, 13);
    pub const M1_NSLEEP: PinId = PinId::new(Port::A, 4);
    pub const M1_DISABLE: PinId = PinId::new(Port::A, 3);

    // Motor 2: PH/EN bridge, speed on TIM4_CH3.
    pub const M2_PWM: PinId = PinId::new(Port::D, 14);
    pub const M2_DIR: PinId = PinId::new(Port::D, 15);
    pub const M2_NSLEEP: PinId = PinId::new(Port::D, 2);
    pub const M2_DISABLE: PinId = PinId::new(Port::D, 1);

    pub const ENC0_A: PinId = PinId::new(Port::A, 0);
    pub const ENC0_B: PinId = PinId::new(Port::A, 1);
    pub const ENC1_A: PinId = PinId::new(Port::A, 6);
    pub const ENC1_B: PinId = PinId::new(Port::A, 7);
}

/// TIM4 CH1..CH4 on PD12..PD15, AF2. The driver's only timer is TIM4 at index 0.
pub static PWM_ROUTES: [PinRoute; 4] = [
    PinRoute {
        pin: pins::M1_IN1,
        timer: 0,
        channel: Channel::A,
        af: 2,
    },
    PinRoute {
        pin: pins::M1_IN2,
        timer: 0,
        channel: Channel::B,
        af: 2,
    },
    PinRoute {
        pin: pins::M2_PWM,
        timer: 0,
        channel: Channel::C,
        af: 2,
    },
    PinRoute {
        pin: pins::M2_DIR,
        timer: 0,
        channel: Channel::D,
        af: 2,
    },
];

/// Encoder state, written from the EXTI handlers and read by the motors.
pub static ENCODERS: EncoderBank<2> = EncoderBank::new();

/// EXTI line of one encoder input. All encoder inputs are on GPIOA.
struct EncoderLine {
    encoder: usize,
    line: Line,
    pin: PinId,
}

const ENCODER_LINES: [EncoderLine; 4] = [
    EncoderLine {
        encoder: 0,
        line: Line::A,
        pin: pins::ENC0_A,
    },
    EncoderLine {
        encoder: 0,
        line: Line::B,
        pin: pins::ENC0_B,
    },
    EncoderLine {
        encoder: 1,
        line: Line::A,
        pin: pins::ENC1_A,
    },
    EncoderLine {
        encoder: 1,
        line: Line::B,
        pin: pins::ENC1_B,
    },
];

/// EXTI lines owned by the encoders.
fn encoder_exti_mask() -> u32 {
    ENCODER_LINES
        .iter()
        .fold(0, |mask, l| mask | 1 << l.pin.index())
}

impl TimerRegs for pac::TIM4 {
    fn read(&self, reg: TimReg) -> u32 {
        match reg {
            TimReg::Cr1 => self.cr1.read().bits(),
            TimReg::Egr => 0,
            TimReg::Ccmr1 => self.ccmr1_output().read().bits(),
            TimReg::Ccmr2 => self.ccmr2_output().read().bits(),
            TimReg::Ccer => self.ccer.read().bits(),
            TimReg::Psc => self.psc.read().bits(),
            TimReg::Arr => self.arr.read().bits(),
            TimReg::Ccr(Channel::A) => self.ccr1.read().bits(),
            TimReg::Ccr(Channel::B) => self.ccr2.read().bits(),
            TimReg::Ccr(Channel::C) => self.ccr3.read().bits(),
            TimReg::Ccr(Channel::D) => self.ccr4.read().bits(),
        }
    }

    #[allow(unused_unsafe)]
    fn write(&self, reg: TimReg, value: u32) {
        match reg {
            TimReg::Cr1 => self.cr1.write(|w| unsafe { w.bits(value) }),
            TimReg::Egr => self.egr.write(|w| unsafe { w.bits(value) }),
            TimReg::Ccmr1 => self.ccmr1_output().write(|w| unsafe { w.bits(value) }),
            TimReg::Ccmr2 => self.ccmr2_output().write(|w| unsafe { w.bits(value) }),
            TimReg::Ccer => self.ccer.write(|w| unsafe { w.bits(value) }),
            TimReg::Psc => self.psc.write(|w| unsafe { w.bits(value) }),
            TimReg::Arr => self.arr.write(|w| unsafe { w.bits(value) }),
            TimReg::Ccr(Channel::A) => self.ccr1.write(|w| unsafe { w.bits(value) }),
            TimReg::Ccr(Channel::B) => self.ccr2.write(|w| unsafe { w.bits(value) }),
            TimReg::Ccr(Channel::C) => self.ccr3.write(|w| unsafe { w.bits(value) }),
            TimReg::Ccr(Channel::D) => self.ccr4.write(|w| unsafe { w.bits(value) }),
        }
    }
}

macro_rules! port_regs {
    ($($gpio:ident),+) => {
        $(
            impl PortRegs for pac::$gpio {
                fn read(&self, reg: PortReg) -> u32 {
                    match reg {
                        PortReg::Moder => self.moder.read().bits(),
                        PortReg::Otyper => self.otyper.read().bits(),
                        PortReg::Ospeedr => self.ospeedr.read().bits(),
                        PortReg::Idr => self.idr.read().bits(),
                        PortReg::Bsrr => 0,
                        PortReg::Afrl => self.afrl.read().bits(),
                        PortReg::Afrh => self.afrh.read().bits(),
                    }
                }

                #[allow(unused_unsafe)]
                fn write(&self, reg: PortReg, value: u32) {
                    match reg {
                        PortReg::Moder => self.moder.write(|w| unsafe { w.bits(value) }),
                        PortReg::Otyper => self.otyper.write(|w| unsafe { w.bits(value) }),
                        PortReg::Ospeedr => self.ospeedr.write(|w| unsafe { w.bits(value) }),
                        PortReg::Idr => {}
                        PortReg::Bsrr => self.bsrr.write(|w| unsafe { w.bits(value) }),
                        PortReg::Afrl => self.afrl.write(|w| unsafe { w.bits(value) }),
                        PortReg::Afrh => self.afrh.write(|w| unsafe { w.bits(value) }),
                    }
                }
            }
        )+
    };
}

port_regs!(GPIOA, GPIOB, GPIOC, GPIOD, GPIOE);

/// [`DigitalIo`] over GPIO ports A..E.
pub struct BoardIo {
    a: GpioPort<pac::GPIOA>,
    b: GpioPort<pac::GPIOB>,
    c: GpioPort<pac::GPIOC>,
    d: GpioPort<pac::GPIOD>,
    e: GpioPort<pac::GPIOE>,
}

/// Run `$op` on the port that owns `$pin`.
macro_rules! on_port {
    ($io:expr, $pin:expr, |$port:ident| $op:expr) => {
        match $pin.port() {
            Port::A => {
                let $port = &$io.a;
                $op
            }
            Port::B => {
                let $port = &$io.b;
                $op
            }
            Port::C => {
                let $port = &$io.c;
                $op
            }
            Port::D => {
                let $port = &$io.d;
                $op
            }
            Port::E => {
                let $port = &$io.e;
                $op
            }
        }
    };
}

impl BoardIo {
    /// Take ownership of the ports. Their AHB1 clocks must already be enabled.
    pub fn new(
        gpioa: pac::GPIOA,
        gpiob: pac::GPIOB,
        gpioc: pac::GPIOC,
        gpiod: pac::GPIOD,
        gpioe: pac::GPIOE,
    ) -> Self {
        Self {
            a: GpioPort::new(gpioa),
            b: GpioPort::new(gpiob),
            c: GpioPort::new(gpioc),
            d: GpioPort::new(gpiod),
            e: GpioPort::new(gpioe),
        }
    }
}

impl DigitalIo for BoardIo {
    fn set_mode(&mut self, pin: PinId, mode: PinMode) {
        on_port!(self, pin, |port| port.set_mode(pin.index(), mode))
    }

    fn write(&mut self, pin: PinId, level: Level) {
        on_port!(self, pin, |port| port.write(pin.index(), level))
    }

    fn read(&self, pin: PinId) -> Level {
        on_port!(self, pin, |port| port.read(pin.index()))
    }
}

/// Route the encoder inputs to EXTI on both edges and unmask their interrupts.
///
/// SYSCFG's clock must be enabled. Each encoder is primed with the current line levels so the
/// first edge decodes against the real phase.
pub fn init_encoder_interrupts(syscfg: &pac::SYSCFG, exti: &pac::EXTI, io: &mut BoardIo) {
    for l in &ENCODER_LINES {
        io.set_mode(l.pin, PinMode::Input);
    }

    // Port A is selector 0: clear the nibbles of EXTI0/1 (EXTICR1) and EXTI6/7 (EXTICR2).
    syscfg
        .exticr1
        .modify(|r, w| unsafe { w.bits(r.bits() & !0x0000_00FF) });
    syscfg
        .exticr2
        .modify(|r, w| unsafe { w.bits(r.bits() & !0x0000_FF00) });

    let mask = encoder_exti_mask();
    exti.rtsr.modify(|r, w| unsafe { w.bits(r.bits() | mask) });
    exti.ftsr.modify(|r, w| unsafe { w.bits(r.bits() | mask) });
    exti.pr.write(|w| unsafe { w.bits(mask) });
    exti.imr.modify(|r, w| unsafe { w.bits(r.bits() | mask) });

    for (index, pair) in ENCODER_LINES.chunks(2).enumerate() {
        if let (Some(encoder), [a, b]) = (ENCODERS.get(index), pair) {
            encoder.sync(io.read(a.pin), io.read(b.pin));
        }
    }

    unsafe {
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::EXTI0);
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::EXTI1);
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::EXTI9_5);
    }
    info!("encoders armed, EXTI mask {=u32:#x}", mask);
}

/// Acknowledge pending encoder lines in `lines` and feed their levels to [`ENCODERS`].
///
/// Call from the EXTI vector that owns `lines`.
pub fn service_exti(lines: u32) {
    // SAFETY: PR is write-1-to-clear and IDR is read-only, so sharing with the main loop is sound.
    let exti = unsafe { &*pac::EXTI::ptr() };
    let pending = exti.pr.read().bits() & lines & encoder_exti_mask();
    exti.pr.write(|w| unsafe { w.bits(pending) });

    let idr = unsafe { (*pac::GPIOA::ptr()).idr.read().bits() };
    for l in &ENCODER_LINES {
        let bit = 1 << l.pin.index();
        if pending & bit != 0 {
            ENCODERS.on_edge(l.encoder, l.line, Level::from(idr & bit != 0));
        }
    }
}
