// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Interrupt-driven quadrature encoder.
//!
//! The two encoder lines are sampled on every edge by an EXTI handler which stores the new level
//! and re-evaluates the 2-bit phase code `(A << 1) | B`. Rotation in the forward direction walks
//! the phase codes `00 → 01 → 11 → 10 → 00`; the reverse walk decrements the count. A transition
//! between diagonal codes (both lines changed since the previous sample) cannot be attributed to a
//! direction and is dropped.
//!
//! All state is atomic so encoders can live in a `static` [`EncoderBank`] and be updated from
//! interrupt context through `&self`. Readers in the control loop may observe a count that is
//! one edge stale.

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};

use super::gpio::Level;

/// One of the two quadrature lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Line {
    A,
    B,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Step {
    Forward,
    Backward,
    Hold,
    Missed,
}

#[inline]
fn phase_code(a: bool, b: bool) -> u8 {
    ((a as u8) << 1) | (b as u8)
}

#[inline]
fn decode(prev: u8, next: u8) -> Step {
    match (prev, next) {
        (0b00, 0b01) | (0b01, 0b11) | (0b11, 0b10) | (0b10, 0b00) => Step::Forward,
        (0b00, 0b10) | (0b10, 0b11) | (0b11, 0b01) | (0b01, 0b00) => Step::Backward,
        (p, n) if p == n => Step::Hold,
        _ => Step::Missed,
    }
}

/// Quadrature decoder for one A/B channel pair.
///
/// Safe to share between the edge interrupts and the control loop.
pub struct Encoder {
    a: AtomicBool,
    b: AtomicBool,
    phase: AtomicU8,
    position: AtomicI32,
    missed: AtomicU32,
}

impl Encoder {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Encoder = Encoder::new();

    /// New encoder at position 0 with both lines assumed low.
    pub const fn new() -> Self {
        Self {
            a: AtomicBool::new(false),
            b: AtomicBool::new(false),
            phase: AtomicU8::new(0),
            position: AtomicI32::new(0),
            missed: AtomicU32::new(0),
        }
    }

    /// Record the latest level of line A.
    #[inline]
    pub fn set_a(&self, level: Level) {
        self.a.store(level.is_high(), Ordering::Relaxed);
    }

    /// Record the latest level of line B.
    #[inline]
    pub fn set_b(&self, level: Level) {
        self.b.store(level.is_high(), Ordering::Relaxed);
    }

    /// Re-evaluate the phase code from the stored levels and apply the transition.
    ///
    /// A dropped diagonal transition still becomes the new reference phase, so the next real edge
    /// is decoded against the lines as they are now.
    pub fn tick(&self) {
        let next = phase_code(
            self.a.load(Ordering::Relaxed),
            self.b.load(Ordering::Relaxed),
        );
        let prev = self.phase.swap(next, Ordering::Relaxed);

        match decode(prev, next) {
            Step::Forward => {
                self.position.fetch_add(1, Ordering::Relaxed);
            }
            Step::Backward => {
                self.position.fetch_sub(1, Ordering::Relaxed);
            }
            Step::Hold => {}
            Step::Missed => {
                self.missed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Edge interrupt entry point: store the new level of `line` and decode.
    #[inline]
    pub fn on_edge(&self, line: Line, level: Level) {
        match line {
            Line::A => self.set_a(level),
            Line::B => self.set_b(level),
        }
        self.tick();
    }

    /// Take both line levels as the reference phase without counting. Call once at startup after
    /// reading the pins, before edge interrupts are unmasked.
    pub fn sync(&self, a: Level, b: Level) {
        self.set_a(a);
        self.set_b(b);
        self.phase
            .store(phase_code(a.is_high(), b.is_high()), Ordering::Relaxed);
    }

    /// Re-reference the count, e.g. at a home switch.
    #[inline]
    pub fn zero(&self, offset: i32) {
        self.position.store(offset, Ordering::Relaxed);
    }

    /// Signed position in ticks.
    #[inline]
    pub fn position(&self) -> i32 {
        self.position.load(Ordering::Relaxed)
    }

    /// Number of transitions dropped because both lines changed between samples.
    #[inline]
    pub fn missed_edges(&self) -> u32 {
        self.missed.load(Ordering::Relaxed)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed set of encoders wired at startup. Interrupt handlers address an encoder by index.
pub struct EncoderBank<const N: usize> {
    encoders: [Encoder; N],
}

impl<const N: usize> EncoderBank<N> {
    pub const fn new() -> Self {
        Self {
            encoders: [Encoder::INIT; N],
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Encoder> {
        self.encoders.get(index)
    }

    /// Forward an edge to encoder `index`. Unknown indices are ignored.
    #[inline]
    pub fn on_edge(&self, index: usize, line: Line, level: Level) {
        if let Some(encoder) = self.encoders.get(index) {
            encoder.on_edge(line, level);
        }
    }
}

impl<const N: usize> Default for EncoderBank<N> {
    fn default() -> Self {
        Self::new()
    }
}
