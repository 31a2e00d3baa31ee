//! The reader: `KEY`, `WORD` and `CHAR` over the arena's input buffer.
//!
//! The host copies one line at a time into the input buffer with
//! [`Forth::fill`]. The cursor and remaining-length registers are then only
//! ever moved forward by `KEY`.

use crate::{
    cell::{Cell, EOF},
    memory::map,
    Error, Forth,
};

#[derive(Debug, PartialEq)]
pub enum InputError {
    LineTooLong { len: usize, capacity: usize },
}

#[inline]
fn is_space(ch: Cell) -> bool {
    ch <= 0xFF && matches!(ch as u8, b' ' | b'\t' | b'\r' | b'\n')
}

impl<T: 'static> Forth<T> {
    /// Replace the input buffer contents with `line` and rewind the cursor.
    pub fn fill(&mut self, line: &str) -> Result<(), Error> {
        let bytes = line.as_bytes();
        let capacity = self.mm.input_len;
        if bytes.len() > capacity {
            return Err(InputError::LineTooLong {
                len: bytes.len(),
                capacity,
            }
            .into());
        }
        self.memory
            .slice_mut(self.mm.input_buf, bytes.len())?
            .copy_from_slice(bytes);
        self.memory
            .write_cell(map::INPUT_CURSOR, self.mm.input_buf)?;
        self.memory
            .write_cell(map::INPUT_REMAINING, bytes.len() as Cell)?;
        Ok(())
    }

    /// Bytes of the current line not yet consumed.
    pub fn input_remaining(&self) -> Result<Cell, Error> {
        Ok(self.memory.read_cell(map::INPUT_REMAINING)?)
    }

    /// Drop whatever is left of the current line.
    pub fn discard_input(&mut self) -> Result<(), Error> {
        self.memory.write_cell(map::INPUT_REMAINING, 0)?;
        Ok(())
    }

    /// `KEY`: the next input byte, or [`EOF`] without moving the cursor.
    pub fn key(&mut self) -> Result<Cell, Error> {
        let remaining = self.memory.read_cell(map::INPUT_REMAINING)?;
        if remaining == 0 {
            return Ok(EOF);
        }
        let cursor = self.memory.read_cell(map::INPUT_CURSOR)?;
        let ch = self.memory.read_byte(cursor)?;
        self.memory.write_cell(map::INPUT_CURSOR, cursor + 1)?;
        self.memory.write_cell(map::INPUT_REMAINING, remaining - 1)?;
        Ok(ch.into())
    }

    /// `WORD`: the next whitespace delimited token, copied into the word
    /// buffer. Returns the buffer address and the token length, 0 once the
    /// input runs out.
    ///
    /// A token starting with `\` comments out the rest of the line. The single
    /// delimiter following a token is consumed. Tokens longer than the word
    /// buffer are consumed whole but only their first 32 bytes are kept.
    pub fn word(&mut self) -> Result<(Cell, Cell), Error> {
        let mut ch = loop {
            let ch = self.key()?;
            if ch == EOF {
                return Ok((map::WORD_BUF, 0));
            }
            if is_space(ch) {
                continue;
            }
            if ch == Cell::from(b'\\') {
                loop {
                    match self.key()? {
                        EOF => return Ok((map::WORD_BUF, 0)),
                        nl if nl == Cell::from(b'\n') => break,
                        _ => {}
                    }
                }
                continue;
            }
            break ch;
        };

        let mut len = 0;
        while ch != EOF && !is_space(ch) {
            if len < map::WORD_BUF_LEN {
                self.memory
                    .write_byte(map::WORD_BUF + len as Cell, ch as u8)?;
                len += 1;
            }
            ch = self.key()?;
        }
        self.memory
            .fill(map::WORD_BUF + len as Cell, map::WORD_BUF_LEN - len, 0)?;
        tracing::trace!(len, "word");
        Ok((map::WORD_BUF, len as Cell))
    }

    /// The token most recently read by `WORD`, for error reports.
    pub fn last_word(&self) -> Result<&[u8], Error> {
        let buf = self.memory.slice(map::WORD_BUF, map::WORD_BUF_LEN)?;
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(&buf[..len])
    }

    /// `CHAR`: the first byte of the next token. `None` at end of input.
    pub fn char(&mut self) -> Result<Option<Cell>, Error> {
        let (addr, len) = self.word()?;
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(self.memory.read_byte(addr)?.into()))
    }
}
