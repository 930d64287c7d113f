// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Register bit fields and the in-memory register cell.
//!
//! [`Field`] describes a sub-field of a 32-bit register value and is shared by every register
//! surface. [`Reg`] backs the in-memory register blocks the host builds use in place of the
//! peripherals, so the exact register contents can be asserted.

use vcell::VolatileCell;

/// A bit field within a 32-bit register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Field {
    pub shift: u8,
    pub width: u8,
}

impl Field {
    pub const fn new(shift: u8, width: u8) -> Self {
        Self { shift, width }
    }

    /// Single-bit field.
    pub const fn bit(shift: u8) -> Self {
        Self { shift, width: 1 }
    }

    /// Mask of the field, already shifted into position.
    #[inline]
    pub const fn mask(&self) -> u32 {
        let bits = if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        };
        bits << self.shift
    }

    /// Value of the field within `reg`.
    #[inline]
    pub const fn extract(&self, reg: u32) -> u32 {
        (reg & self.mask()) >> self.shift
    }

    /// `reg` with the field replaced by `value`. Excess high bits of `value` are discarded.
    #[inline]
    pub const fn insert(&self, reg: u32, value: u32) -> u32 {
        (reg & !self.mask()) | ((value << self.shift) & self.mask())
    }
}

/// A single volatile 32-bit register.
#[repr(transparent)]
pub struct Reg {
    cell: VolatileCell<u32>,
}

impl Reg {
    pub const fn new(value: u32) -> Self {
        Self {
            cell: VolatileCell::new(value),
        }
    }

    #[inline]
    pub fn read(&self) -> u32 {
        self.cell.get()
    }

    #[inline]
    pub fn write(&self, value: u32) {
        self.cell.set(value)
    }

    #[inline]
    pub fn read_field(&self, field: Field) -> u32 {
        field.extract(self.read())
    }

    #[inline]
    pub fn is_set(&self, field: Field) -> bool {
        self.read_field(field) != 0
    }
}

// In-memory blocks are leaked to `'static` and shared like the peripherals they stand in for.
unsafe impl Sync for Reg {}
