//! The cell: the unit of both data and addresses.
//!
//! Cells are 32 bits wide regardless of the host's pointer width. Addresses
//! are byte offsets into the VM's memory arena, never host pointers.

/// One stack slot, dictionary field, or arena address.
pub type Cell = u32;

/// Size of a cell in bytes, as seen by arena address arithmetic.
pub const CELL: Cell = 4;

/// Canonical true flag: all bits set.
pub const TRUE: Cell = !0;

/// Canonical false flag.
pub const FALSE: Cell = 0;

/// Returned by `KEY` once the input buffer is exhausted.
pub const EOF: Cell = !0;

#[inline]
pub fn flag(b: bool) -> Cell {
    if b {
        TRUE
    } else {
        FALSE
    }
}

#[inline]
pub fn signed(c: Cell) -> i32 {
    c as i32
}

#[inline]
pub fn unsigned(i: i32) -> Cell {
    i as Cell
}

/// Round `addr` up to the next cell boundary.
#[inline]
pub const fn align(addr: Cell) -> Cell {
    (addr + (CELL - 1)) & !(CELL - 1)
}

/// [`align`], or `None` when rounding up would leave the address space.
#[inline]
pub const fn checked_align(addr: Cell) -> Option<Cell> {
    match addr.checked_add(CELL - 1) {
        Some(a) => Some(a & !(CELL - 1)),
        None => None,
    }
}
