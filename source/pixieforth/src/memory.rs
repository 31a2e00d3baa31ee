//! The memory arena.
//!
//! Everything the forth program can address lives in one contiguous byte
//! region: the VM registers, the word buffer, the top level trampoline, the
//! input buffer, and finally the dictionary heap that `HERE` grows through.
//! Addresses are byte offsets into this region. Every access is bounds
//! checked against the region, nothing else is.

use core::ptr::NonNull;

use crate::cell::{align, Cell, CELL};

#[derive(Debug, PartialEq)]
pub enum MemoryError {
    OutOfBounds { addr: Cell, len: usize },
}

/// Fixed addresses in the arena.
pub mod map {
    use crate::cell::Cell;

    /// Always zero, so that address 0 can act as a "no entry" sentinel.
    pub const NULL: Cell = 0x00;
    pub const HERE: Cell = 0x04;
    pub const LATEST: Cell = 0x08;
    pub const STATE: Cell = 0x0C;
    pub const BASE: Cell = 0x10;
    pub const INPUT_CURSOR: Cell = 0x14;
    pub const INPUT_REMAINING: Cell = 0x18;

    pub const WORD_BUF: Cell = 0x20;
    pub const WORD_BUF_LEN: usize = 32;

    /// Three cells: `[COLON, xt, EXIT]`.
    pub const TRAMPOLINE: Cell = 0x40;

    pub const INPUT_BUF: Cell = 0x50;
}

/// Where the variable-sized regions of an arena start and end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryMap {
    pub input_buf: Cell,
    pub input_len: usize,
    pub dict_start: Cell,
    pub end: Cell,
}

impl MemoryMap {
    /// Lay out an arena holding an input buffer of `input_len` bytes followed
    /// by `dict_len` bytes of dictionary.
    pub fn new(input_len: usize, dict_len: usize) -> Option<Self> {
        let input_len_c = Cell::try_from(input_len).ok()?;
        let dict_start = align(map::INPUT_BUF.checked_add(input_len_c)?);
        let end = dict_start.checked_add(Cell::try_from(dict_len).ok()?)?;
        Some(Self {
            input_buf: map::INPUT_BUF,
            input_len,
            dict_start,
            end,
        })
    }

    /// Total arena size in bytes.
    pub fn total(&self) -> usize {
        self.end as usize
    }
}

pub struct Memory {
    start: NonNull<u8>,
    len: usize,
}

impl Memory {
    /// # Safety
    ///
    /// `bottom` must be valid for reads and writes of `size` initialized bytes
    /// for as long as the `Memory` exists, and must not be aliased.
    pub unsafe fn new(bottom: *mut u8, size: usize) -> Self {
        match NonNull::new(bottom) {
            Some(start) => Self { start, len: size },
            None => Self {
                start: NonNull::dangling(),
                len: 0,
            },
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.start.as_ptr(), self.len) }
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.start.as_ptr(), self.len) }
    }

    fn range(&self, addr: Cell, len: usize) -> Result<core::ops::Range<usize>, MemoryError> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.len => Ok(start..end),
            _ => Err(MemoryError::OutOfBounds { addr, len }),
        }
    }

    pub fn slice(&self, addr: Cell, len: usize) -> Result<&[u8], MemoryError> {
        let range = self.range(addr, len)?;
        Ok(&self.bytes()[range])
    }

    pub fn slice_mut(&mut self, addr: Cell, len: usize) -> Result<&mut [u8], MemoryError> {
        let range = self.range(addr, len)?;
        Ok(&mut self.bytes_mut()[range])
    }

    pub fn read_byte(&self, addr: Cell) -> Result<u8, MemoryError> {
        Ok(self.slice(addr, 1)?[0])
    }

    pub fn write_byte(&mut self, addr: Cell, val: u8) -> Result<(), MemoryError> {
        self.slice_mut(addr, 1)?[0] = val;
        Ok(())
    }

    pub fn read_cell(&self, addr: Cell) -> Result<Cell, MemoryError> {
        let mut raw = [0u8; CELL as usize];
        raw.copy_from_slice(self.slice(addr, CELL as usize)?);
        Ok(Cell::from_le_bytes(raw))
    }

    pub fn write_cell(&mut self, addr: Cell, val: Cell) -> Result<(), MemoryError> {
        self.slice_mut(addr, CELL as usize)?
            .copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    /// Forward byte-by-byte copy. Only meaningful for disjoint regions.
    pub fn copy(&mut self, src: Cell, dst: Cell, n: usize) -> Result<(), MemoryError> {
        let src = self.range(src, n)?;
        let dst = self.range(dst, n)?;
        let bytes = self.bytes_mut();
        for (s, d) in src.zip(dst) {
            bytes[d] = bytes[s];
        }
        Ok(())
    }

    /// Overlap-safe copy: walks backwards when the destination sits above
    /// the source.
    pub fn move_bytes(&mut self, src: Cell, dst: Cell, n: usize) -> Result<(), MemoryError> {
        let src = self.range(src, n)?;
        let dst = self.range(dst, n)?;
        let bytes = self.bytes_mut();
        if dst.start <= src.start {
            for (s, d) in src.zip(dst) {
                bytes[d] = bytes[s];
            }
        } else {
            for (s, d) in src.rev().zip(dst.rev()) {
                bytes[d] = bytes[s];
            }
        }
        Ok(())
    }

    pub fn fill(&mut self, addr: Cell, n: usize, val: u8) -> Result<(), MemoryError> {
        self.slice_mut(addr, n)?.fill(val);
        Ok(())
    }
}
