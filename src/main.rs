#![no_main]
#![no_std]

use cortex_m_rt::{entry, exception};
#[cfg(feature = "defmt")]
use defmt_rtt as _;
use panic_halt as _;

use hal::{
    pac::{self, interrupt},
    prelude::*,
};
use stm32f7xx_hal as hal;

use motorcore::config::{self, MotorConfig};
use motorcore::hw::board::{self, pins, BoardIo, ENCODERS, PWM_ROUTES};
use motorcore::hw::{clock, DigitalIo, Level, PinMode, PwmDriver, PwmTimer, Timer};
use motorcore::motors::{Motor, MotorPins, MoveOutcome};

/// Demo move: full travel in ticks, and the regulated rate.
const TRAVEL_TICKS: i32 = 20 * board::TICKS_PER_ROTATION as i32;
const TRAVEL_RATE: u32 = 4 * board::TICKS_PER_ROTATION;

#[entry]
fn main() -> ! {
    // Peripherals
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    // Peripheral clocks
    dp.RCC.ahb1enr.modify(|_, w| {
        w.gpioaen()
            .set_bit()
            .gpioben()
            .set_bit()
            .gpiocen()
            .set_bit()
            .gpioden()
            .set_bit()
            .gpioeen()
            .set_bit()
    });
    dp.RCC.apb1enr.modify(|_, w| w.tim4en().set_bit());
    dp.RCC.apb2enr.modify(|_, w| w.syscfgen().set_bit());

    // Clocks
    let rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.freeze();
    clock::init(cp.SYST, clocks.hclk().raw());

    // GPIO + encoders
    let mut io = BoardIo::new(dp.GPIOA, dp.GPIOB, dp.GPIOC, dp.GPIOD, dp.GPIOE);
    board::init_encoder_interrupts(&dp.SYSCFG, &dp.EXTI, &mut io);

    // Bridge control lines: awake and enabled.
    for pin in [pins::M1_NSLEEP, pins::M2_NSLEEP, pins::M1_DISABLE] {
        io.set_mode(pin, PinMode::Output);
    }
    io.write(pins::M1_NSLEEP, Level::High);
    io.write(pins::M2_NSLEEP, Level::High);
    io.write(pins::M1_DISABLE, Level::Low);

    // PWM (TIM4)
    let tim4 = Timer::new(dp.TIM4);
    let mut pwm = PwmDriver::new(
        io,
        [PwmTimer::counter16(tim4, 4)],
        &PWM_ROUTES,
        config::BASE_CLOCK_HZ,
    );
    pwm.set_pin_frequency(pins::M1_IN1, config::PWM_FREQUENCY_HZ).unwrap();

    // Motors
    let motor_cfg = MotorConfig::default().with_ticks_per_rotation(board::TICKS_PER_ROTATION);
    let mut m1 = Motor::new(
        "m1",
        MotorPins::DualDirection {
            in1: pins::M1_IN1,
            in2: pins::M1_IN2,
        },
        ENCODERS.get(0).unwrap(),
        motor_cfg,
        &mut pwm,
    );
    let mut m2 = Motor::new(
        "m2",
        MotorPins::DirectionPwm {
            dir: pins::M2_DIR,
            enable: Some(pins::M2_DISABLE),
            pwm: pins::M2_PWM,
        },
        ENCODERS.get(1).unwrap(),
        motor_cfg,
        &mut pwm,
    );

    #[cfg(feature = "defmt")]
    defmt::info!("motorcore up, PWM {} Hz", config::PWM_FREQUENCY_HZ);

    // Home m1 against its end stop.
    m1.go_till_stop(&mut pwm, false, TRAVEL_RATE / 2, clock::now_ms());
    while m1.moving() {
        m1.check_encoder(&mut pwm, clock::now_ms());
        cortex_m::asm::wfi();
    }
    if m1.outcome() == Some(MoveOutcome::Stalled) {
        m1.zero(0);
    }

    // EXAMPLE USAGES: sweep m1 back and forth, m2 follows at half speed.
    let now = clock::now_ms();
    m1.go_to(&mut pwm, TRAVEL_RATE, TRAVEL_TICKS, now);
    m2.go_to(&mut pwm, TRAVEL_RATE / 2, TRAVEL_TICKS / 2, now);

    loop {
        let now = clock::now_ms();
        m1.check_encoder(&mut pwm, now);
        m2.check_encoder(&mut pwm, now);

        if !m1.is_regulated() {
            let goal = if m1.encoder_position() > 0 { 0 } else { TRAVEL_TICKS };
            m1.go_to(&mut pwm, TRAVEL_RATE, goal, now);
        }
        if !m2.is_regulated() {
            let goal = if m2.encoder_position() > 0 { 0 } else { TRAVEL_TICKS / 2 };
            m2.go_to(&mut pwm, TRAVEL_RATE / 2, goal, now);
        }

        // SysTick wakes the core every millisecond.
        cortex_m::asm::wfi();
    }
}

#[exception]
fn SysTick() {
    clock::tick();
}

#[interrupt]
fn EXTI0() {
    board::service_exti(1 << 0);
}

#[interrupt]
fn EXTI1() {
    board::service_exti(1 << 1);
}

#[interrupt]
fn EXTI9_5() {
    board::service_exti(0b11 << 6);
}
