//! Dictionary headers living in the memory arena.
//!
//! ```text
//! +0      link        previous entry, 0 for the oldest
//! +4      len/flags   bits 0..=4 name length, 0x20 hidden, 0x80 immediate
//! +5      name        `len` raw bytes
//!         padding     zeroes up to the next cell boundary
//! >CFA    code field  one cell, see `CodeField`
//! >DFA    data field  compiled tokens, or a variable/constant's cell
//! ```

use crate::{
    cell::{align, checked_align, Cell, CELL},
    memory::{Memory, MemoryError},
    Error, Forth,
};

pub const F_IMMEDIATE: u8 = 0x80;
pub const F_HIDDEN: u8 = 0x20;
pub const LEN_MASK: u8 = 0x1F;
pub const MAX_NAME_LEN: usize = LEN_MASK as usize;

const NAME_OFFSET: Cell = CELL + 1;

/// What the inner interpreter does with an execution token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeField {
    /// Call native routine `n` of the native word table.
    Native(Cell),
    /// Run the data field as a token sequence.
    Colon,
    /// Push the data field address.
    Variable,
    /// Push the cell stored in the data field.
    Constant,
}

impl CodeField {
    pub const COLON_MARKER: Cell = 0xFFFF_FFFF;
    pub const VARIABLE_MARKER: Cell = 0xFFFF_FFFE;
    pub const CONSTANT_MARKER: Cell = 0xFFFF_FFFD;

    pub fn encode(self) -> Cell {
        match self {
            CodeField::Native(id) => id,
            CodeField::Colon => Self::COLON_MARKER,
            CodeField::Variable => Self::VARIABLE_MARKER,
            CodeField::Constant => Self::CONSTANT_MARKER,
        }
    }

    pub fn decode(raw: Cell) -> Self {
        match raw {
            Self::COLON_MARKER => CodeField::Colon,
            Self::VARIABLE_MARKER => CodeField::Variable,
            Self::CONSTANT_MARKER => CodeField::Constant,
            id => CodeField::Native(id),
        }
    }
}

/// Code field address of an entry whose name is `name_len` bytes long.
#[inline]
pub const fn cfa_of(entry: Cell, name_len: usize) -> Cell {
    align(entry + NAME_OFFSET + name_len as Cell)
}

/// A parsed view of the fixed part of a header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryHeader {
    pub addr: Cell,
    pub link: Cell,
    pub len_flags: u8,
}

impl EntryHeader {
    pub fn read(mem: &Memory, addr: Cell) -> Result<Self, MemoryError> {
        Ok(Self {
            addr,
            link: mem.read_cell(addr)?,
            len_flags: mem.read_byte(addr + CELL)?,
        })
    }

    #[inline]
    pub fn name_len(&self) -> usize {
        (self.len_flags & LEN_MASK) as usize
    }

    #[inline]
    pub fn is_hidden(&self) -> bool {
        self.len_flags & F_HIDDEN != 0
    }

    #[inline]
    pub fn is_immediate(&self) -> bool {
        self.len_flags & F_IMMEDIATE != 0
    }

    pub fn name<'m>(&self, mem: &'m Memory) -> Result<&'m [u8], MemoryError> {
        mem.slice(self.addr + NAME_OFFSET, self.name_len())
    }

    #[inline]
    pub fn cfa(&self) -> Cell {
        cfa_of(self.addr, self.name_len())
    }

    #[inline]
    pub fn dfa(&self) -> Cell {
        self.cfa() + CELL
    }
}

/// Walks the dictionary newest first, hidden entries included.
pub struct Entries<'a> {
    mem: &'a Memory,
    next: Cell,
}

impl<'a> Iterator for Entries<'a> {
    type Item = EntryHeader;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == 0 {
            return None;
        }
        let hdr = EntryHeader::read(self.mem, self.next).ok()?;
        // Links always point at older, lower entries. Anything else means
        // the dictionary was scribbled on; stop rather than loop.
        self.next = if hdr.link < hdr.addr { hdr.link } else { 0 };
        Some(hdr)
    }
}

impl<T: 'static> Forth<T> {
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            mem: &self.memory,
            next: self.latest().unwrap_or(0),
        }
    }

    /// Search for a visible entry called `name`. Returns 0 when there is none.
    pub fn find_name(&self, name: &[u8]) -> Result<Cell, Error> {
        if name.len() > MAX_NAME_LEN {
            return Ok(0);
        }
        let mut cur = self.latest()?;
        while cur != 0 {
            let hdr = EntryHeader::read(&self.memory, cur)?;
            if !hdr.is_hidden()
                && hdr.name_len() == name.len()
                && hdr.name(&self.memory)? == name
            {
                return Ok(cur);
            }
            if hdr.link >= cur {
                return Err(Error::CorruptDictionary(cur));
            }
            cur = hdr.link;
        }
        Ok(0)
    }

    /// `FIND` over a name stored in the arena.
    pub fn find(&self, addr: Cell, len: Cell) -> Result<Cell, Error> {
        let name = self.memory.slice(addr, len as usize)?;
        self.find_name(name)
    }

    pub fn to_cfa(&self, entry: Cell) -> Result<Cell, Error> {
        Ok(EntryHeader::read(&self.memory, entry)?.cfa())
    }

    pub fn to_dfa(&self, entry: Cell) -> Result<Cell, Error> {
        Ok(EntryHeader::read(&self.memory, entry)?.dfa())
    }

    /// Append a new visible header at `HERE` and make it `LATEST`.
    ///
    /// Names longer than 31 bytes are truncated. The code field is left for
    /// the caller to fill in with `,`.
    pub fn create_name(&mut self, name: &[u8]) -> Result<Cell, Error> {
        let name = &name[..name.len().min(MAX_NAME_LEN)];
        let here = self.here()?;
        if here < self.mm.dict_start {
            return Err(Error::DictionaryFull);
        }
        let entry = checked_align(here).ok_or(Error::DictionaryFull)?;
        let cfa = entry
            .checked_add(NAME_OFFSET + name.len() as Cell)
            .and_then(checked_align)
            .ok_or(Error::DictionaryFull)?;
        if cfa > self.mm.end {
            return Err(Error::DictionaryFull);
        }

        let link = self.latest()?;
        let name_at = entry + NAME_OFFSET;
        // Zero the alignment gap before the entry as well as the name padding.
        self.memory.fill(here, (cfa - here) as usize, 0)?;
        self.memory.write_cell(entry, link)?;
        self.memory.write_byte(entry + CELL, name.len() as u8)?;
        self.memory
            .slice_mut(name_at, name.len())?
            .copy_from_slice(name);

        self.set_here(cfa)?;
        self.set_latest(entry)?;
        tracing::trace!(entry, cfa, "created header");
        Ok(entry)
    }

    /// `CREATE` over a name stored in the arena.
    pub fn create(&mut self, addr: Cell, len: Cell) -> Result<Cell, Error> {
        let len = (len as usize).min(MAX_NAME_LEN);
        let mut name = [0u8; MAX_NAME_LEN];
        name[..len].copy_from_slice(self.memory.slice(addr, len)?);
        self.create_name(&name[..len])
    }

    fn flags_addr(entry: Cell) -> Result<Cell, Error> {
        entry
            .checked_add(CELL)
            .ok_or(Error::Memory(MemoryError::OutOfBounds { addr: entry, len: 1 }))
    }

    fn toggle_flags(&mut self, entry: Cell, flags: u8) -> Result<(), Error> {
        let at = Self::flags_addr(entry)?;
        let len_flags = self.memory.read_byte(at)?;
        self.memory.write_byte(at, len_flags ^ flags)?;
        Ok(())
    }

    fn clear_flags(&mut self, entry: Cell, flags: u8) -> Result<(), Error> {
        let at = Self::flags_addr(entry)?;
        let len_flags = self.memory.read_byte(at)?;
        self.memory.write_byte(at, len_flags & !flags)?;
        Ok(())
    }

    pub fn toggle_hidden(&mut self, entry: Cell) -> Result<(), Error> {
        self.toggle_flags(entry, F_HIDDEN)
    }

    /// Make `entry` visible whatever its current state.
    pub fn reveal(&mut self, entry: Cell) -> Result<(), Error> {
        self.clear_flags(entry, F_HIDDEN)
    }

    pub fn toggle_immediate(&mut self, entry: Cell) -> Result<(), Error> {
        self.toggle_flags(entry, F_IMMEDIATE)
    }

    /// `,`: append one cell at `HERE`.
    pub fn comma(&mut self, val: Cell) -> Result<(), Error> {
        let here = self.here()?;
        let next = here.checked_add(CELL).ok_or(Error::DictionaryFull)?;
        if next > self.mm.end {
            return Err(Error::DictionaryFull);
        }
        self.memory.write_cell(here, val)?;
        self.set_here(next)
    }

    /// Move `HERE` by `n` bytes, which may be negative.
    pub fn allot(&mut self, n: i32) -> Result<(), Error> {
        let here = self.here()?;
        let next = here.wrapping_add(n as Cell);
        if next > self.mm.end || next < self.mm.dict_start {
            return Err(Error::DictionaryFull);
        }
        self.set_here(next)
    }
}

#[cfg(test)]
pub mod test {
    use super::{cfa_of, CodeField, EntryHeader, F_HIDDEN};
    use crate::{
        cell::CELL,
        leakbox::{LBForth, LBForthParams},
        Error,
    };

    fn vm() -> LBForth<()> {
        LBForth::from_params(LBForthParams::default(), (), &[])
    }

    #[test]
    fn padding_rule() {
        // link + len byte + name, rounded up to a cell.
        assert_eq!(cfa_of(0x100, 0), 0x108);
        assert_eq!(cfa_of(0x100, 3), 0x108);
        assert_eq!(cfa_of(0x100, 4), 0x10C);
        assert_eq!(cfa_of(0x100, 31), 0x124);
    }

    #[test]
    fn code_fields() {
        for cf in [
            CodeField::Native(0),
            CodeField::Native(42),
            CodeField::Colon,
            CodeField::Variable,
            CodeField::Constant,
        ] {
            assert_eq!(CodeField::decode(cf.encode()), cf);
        }
    }

    #[test]
    fn create_then_find() {
        let mut lbf = vm();
        let forth = &mut lbf.forth;

        let old_latest = forth.latest().unwrap();
        let here = forth.here().unwrap();
        let entry = forth.create_name(b"frob").unwrap();
        assert_eq!(entry, here);
        assert_eq!(forth.latest().unwrap(), entry);
        assert_eq!(forth.here().unwrap(), cfa_of(entry, 4));

        let hdr = EntryHeader::read(&forth.memory, entry).unwrap();
        assert_eq!(hdr.link, old_latest);
        assert_eq!(hdr.name(&forth.memory).unwrap(), b"frob");
        assert!(!hdr.is_hidden());

        assert_eq!(forth.find_name(b"frob").unwrap(), entry);
        assert_eq!(forth.find_name(b"fro").unwrap(), 0);
        assert_eq!(forth.find_name(b"frobs").unwrap(), 0);

        let cfa = forth.to_cfa(entry).unwrap();
        assert_eq!(forth.to_dfa(entry).unwrap(), cfa + CELL);
        assert_eq!(cfa, forth.here().unwrap());
    }

    #[test]
    fn newer_shadows_older() {
        let mut lbf = vm();
        let forth = &mut lbf.forth;

        let first = forth.create_name(b"x").unwrap();
        forth.comma(1).unwrap();
        let second = forth.create_name(b"x").unwrap();
        assert!(second > first);
        assert_eq!(forth.find_name(b"x").unwrap(), second);

        forth.toggle_hidden(second).unwrap();
        assert_eq!(forth.find_name(b"x").unwrap(), first);
    }

    #[test]
    fn hide_and_unhide() {
        let mut lbf = vm();
        let forth = &mut lbf.forth;

        let entry = forth.create_name(b"ghost").unwrap();
        forth.toggle_hidden(entry).unwrap();
        let hdr = EntryHeader::read(&forth.memory, entry).unwrap();
        assert_eq!(hdr.len_flags, 5 | F_HIDDEN);
        assert_eq!(forth.find_name(b"ghost").unwrap(), 0);

        forth.toggle_hidden(entry).unwrap();
        assert_eq!(forth.find_name(b"ghost").unwrap(), entry);
        assert_eq!(forth.to_cfa(entry).unwrap(), hdr.cfa());
    }

    #[test]
    fn reveal_only_clears_hidden() {
        let mut lbf = vm();
        let forth = &mut lbf.forth;

        let entry = forth.create_name(b"shown").unwrap();
        forth.toggle_immediate(entry).unwrap();
        forth.reveal(entry).unwrap();
        forth.reveal(entry).unwrap();
        let hdr = EntryHeader::read(&forth.memory, entry).unwrap();
        assert!(!hdr.is_hidden());
        assert!(hdr.is_immediate());
        assert_eq!(forth.find_name(b"shown").unwrap(), entry);
    }

    #[test]
    fn flags_of_wild_entries() {
        let mut lbf = vm();
        let forth = &mut lbf.forth;

        for entry in [0xFFFF_FFFF, 0xFFFF_FFFC, 0x8000_0000] {
            assert!(matches!(forth.toggle_hidden(entry), Err(Error::Memory(_))));
            assert!(matches!(forth.reveal(entry), Err(Error::Memory(_))));
        }
    }

    #[test]
    fn create_with_wild_here() {
        let mut lbf = vm();
        let forth = &mut lbf.forth;
        let latest = forth.latest().unwrap();

        for here in [0xFFFF_FFFF, 0xFFFF_FFF0, 0x10] {
            forth.set_here(here).unwrap();
            assert_eq!(forth.create_name(b"x"), Err(Error::DictionaryFull));
        }
        assert_eq!(forth.latest().unwrap(), latest);
    }

    #[test]
    fn comma_appends_cells() {
        let mut lbf = vm();
        let forth = &mut lbf.forth;

        let here = forth.here().unwrap();
        forth.comma(0xdead_beef).unwrap();
        forth.comma(7).unwrap();
        assert_eq!(forth.here().unwrap(), here + 2 * CELL);
        assert_eq!(forth.memory.read_cell(here), Ok(0xdead_beef));
        assert_eq!(forth.memory.read_cell(here + CELL), Ok(7));
    }

    #[test]
    fn long_names_are_truncated() {
        let mut lbf = vm();
        let forth = &mut lbf.forth;

        let long = [b'a'; 40];
        let entry = forth.create_name(&long).unwrap();
        let hdr = EntryHeader::read(&forth.memory, entry).unwrap();
        assert_eq!(hdr.name_len(), 31);
        assert_eq!(forth.find_name(&long[..31]).unwrap(), entry);
        assert_eq!(forth.find_name(&long).unwrap(), 0);
    }

    #[test]
    fn full_dictionary() {
        let params = LBForthParams {
            dict_buf_elems: 2048,
            ..LBForthParams::default()
        };
        let mut lbf = LBForth::from_params(params, (), &[]);
        let forth = &mut lbf.forth;

        let res = loop {
            if let Err(e) = forth.comma(0) {
                break e;
            }
        };
        assert_eq!(res, Error::DictionaryFull);
        assert_eq!(forth.create_name(b"nope"), Err(Error::DictionaryFull));
    }

    #[test]
    fn every_native_is_registered() {
        let lbf = vm();
        let forth = &lbf.forth;
        for name in ["LIT", "EXIT", "BRANCH", "0BRANCH", "QUIT", "INTERPRET", "2SWAP", "/MOD"] {
            assert_ne!(forth.find_name(name.as_bytes()).unwrap(), 0, "{name}");
        }
        assert!(forth.entries().count() >= 60);
    }
}
