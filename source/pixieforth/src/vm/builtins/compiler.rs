//! Natives that drive the inner interpreter, read input, and grow the
//! dictionary.

use crate::{
    cell::{signed, Cell},
    dictionary::{CodeField, EntryHeader},
    Error, Forth, Mode,
};

impl<T: 'static> Forth<T> {
    // Inner interpreter

    pub fn lit(&mut self) -> Result<(), Error> {
        let val = self.next_inline()?;
        self.data_stack.push(val)?;
        Ok(())
    }

    pub fn exit(&mut self) -> Result<(), Error> {
        let _ip = self.call_stack.try_pop()?;
        Ok(())
    }

    pub fn jump(&mut self) -> Result<(), Error> {
        self.branch()
    }

    pub fn zero_jump(&mut self) -> Result<(), Error> {
        let flag = self.data_stack.try_pop()?;
        if flag == 0 {
            self.branch()
        } else {
            let _offset = self.next_inline()?;
            Ok(())
        }
    }

    pub fn quit(&mut self) -> Result<(), Error> {
        tracing::trace!(frames = self.call_stack.depth(), "quit");
        self.unwind();
        Ok(())
    }

    pub fn execute_xt(&mut self) -> Result<(), Error> {
        let xt = self.data_stack.try_pop()?;
        self.dispatch(xt)
    }

    // Reader

    pub fn key_word(&mut self) -> Result<(), Error> {
        let ch = self.key()?;
        self.data_stack.push(ch)?;
        Ok(())
    }

    pub fn word_word(&mut self) -> Result<(), Error> {
        let (addr, len) = self.word()?;
        self.data_stack.push(addr)?;
        self.data_stack.push(len)?;
        Ok(())
    }

    /// Pushes the first byte of the next token, or compiles it as a literal.
    pub fn char_word(&mut self) -> Result<(), Error> {
        let ch = self.char()?.ok_or(Error::MissingName)?;
        self.literal(ch)
    }

    pub fn number_word(&mut self) -> Result<(), Error> {
        let len = self.data_stack.try_pop()?;
        let addr = self.data_stack.try_pop()?;
        let (val, unparsed) = self.number(addr, len)?;
        self.data_stack.push(val)?;
        self.data_stack.push(unparsed as Cell)?;
        Ok(())
    }

    // Dictionary

    pub fn find_word(&mut self) -> Result<(), Error> {
        let len = self.data_stack.try_pop()?;
        let addr = self.data_stack.try_pop()?;
        let entry = self.find(addr, len)?;
        self.data_stack.push(entry)?;
        Ok(())
    }

    pub fn cfa_word(&mut self) -> Result<(), Error> {
        let entry = self.data_stack.try_pop()?;
        let cfa = self.to_cfa(entry)?;
        self.data_stack.push(cfa)?;
        Ok(())
    }

    pub fn dfa_word(&mut self) -> Result<(), Error> {
        let entry = self.data_stack.try_pop()?;
        let dfa = self.to_dfa(entry)?;
        self.data_stack.push(dfa)?;
        Ok(())
    }

    pub fn create_word(&mut self) -> Result<(), Error> {
        let len = self.data_stack.try_pop()?;
        let addr = self.data_stack.try_pop()?;
        self.create(addr, len)?;
        Ok(())
    }

    pub fn comma_word(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_pop()?;
        self.comma(val)
    }

    pub fn hidden(&mut self) -> Result<(), Error> {
        let entry = self.data_stack.try_pop()?;
        self.toggle_hidden(entry)
    }

    pub fn immediate(&mut self) -> Result<(), Error> {
        let latest = self.latest()?;
        self.toggle_immediate(latest)
    }

    pub fn allot_word(&mut self) -> Result<(), Error> {
        let n = self.data_stack.try_pop()?;
        self.allot(signed(n))
    }

    /// Read the next token and create a header for it.
    fn create_next(&mut self) -> Result<Cell, Error> {
        let (addr, len) = self.word()?;
        if len == 0 {
            return Err(Error::MissingName);
        }
        self.create(addr, len)
    }

    /// The CFA of the word named by the next token.
    fn tick_next(&mut self) -> Result<Cell, Error> {
        let (addr, len) = self.word()?;
        if len == 0 {
            return Err(Error::MissingName);
        }
        match self.find(addr, len)? {
            0 => Err(Error::WordNotFound),
            entry => self.to_cfa(entry),
        }
    }

    /// Push `val` while interpreting, compile `LIT val` while compiling.
    fn literal(&mut self, val: Cell) -> Result<(), Error> {
        match self.mode()? {
            Mode::Run => {
                self.data_stack.push(val)?;
                Ok(())
            }
            Mode::Compile => {
                self.comma(self.core_xts().lit)?;
                self.comma(val)
            }
        }
    }

    pub fn tick(&mut self) -> Result<(), Error> {
        let xt = self.tick_next()?;
        self.literal(xt)
    }

    // Compiler

    pub fn colon(&mut self) -> Result<(), Error> {
        let entry = self.create_next()?;
        self.comma(CodeField::Colon.encode())?;
        self.toggle_hidden(entry)?;
        self.set_mode(Mode::Compile)
    }

    pub fn semicolon(&mut self) -> Result<(), Error> {
        self.comma(self.core_xts().exit)?;
        let latest = self.latest()?;
        self.reveal(latest)?;
        self.set_mode(Mode::Run)?;
        tracing::debug!(entry = latest, here = self.here()?, "defined word");
        Ok(())
    }

    pub fn interpret_mode(&mut self) -> Result<(), Error> {
        self.set_mode(Mode::Run)
    }

    pub fn compile_mode(&mut self) -> Result<(), Error> {
        self.set_mode(Mode::Compile)
    }

    pub fn variable(&mut self) -> Result<(), Error> {
        self.create_next()?;
        self.comma(CodeField::Variable.encode())?;
        self.comma(0)
    }

    pub fn constant(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_pop()?;
        self.create_next()?;
        self.comma(CodeField::Constant.encode())?;
        self.comma(val)
    }

    /// `INTERPRET`: handle one token of input.
    pub fn interpret(&mut self) -> Result<(), Error> {
        let (addr, len) = self.word()?;
        if len == 0 {
            return Ok(());
        }

        let entry = self.find(addr, len)?;
        if entry != 0 {
            let hdr = EntryHeader::read(&self.memory, entry)?;
            if self.mode()? == Mode::Compile && !hdr.is_immediate() {
                return self.comma(hdr.cfa());
            }
            return self.dispatch(hdr.cfa());
        }

        match self.number(addr, len)? {
            (val, 0) => self.literal(val),
            _ => {
                tracing::trace!(len, "not a word or a number");
                Err(Error::WordNotFound)
            }
        }
    }
}
