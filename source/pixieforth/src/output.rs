/// Byte sink for `EMIT`, `NL` and `.`.
///
/// The buffer belongs to the host, which drains it (usually to a serial port)
/// between lines with [`OutputBuf::as_str`] and [`OutputBuf::clear`].
pub struct OutputBuf {
    start: *mut u8,
    cur: *mut u8,
    end: *mut u8,
}

#[derive(Debug, PartialEq)]
pub enum OutputError {
    OutputFull,
    FormattingErr,
}

impl OutputBuf {
    pub fn new(bottom: *mut u8, size: usize) -> Self {
        let end = bottom.wrapping_add(size);
        debug_assert!(end >= bottom);
        Self {
            end,
            start: bottom,
            cur: bottom,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        (self.end as usize) - (self.start as usize)
    }

    #[inline]
    pub fn len(&self) -> usize {
        (self.cur as usize) - (self.start as usize)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cur == self.start
    }

    pub fn push_byte(&mut self, b: u8) -> Result<(), OutputError> {
        self.push_bstr(&[b])
    }

    pub fn push_bstr(&mut self, bstr: &[u8]) -> Result<(), OutputError> {
        if bstr.len() > self.capacity() - self.len() {
            return Err(OutputError::OutputFull);
        }
        unsafe {
            core::ptr::copy_nonoverlapping(bstr.as_ptr(), self.cur, bstr.len());
            self.cur = self.cur.add(bstr.len());
        }
        Ok(())
    }

    pub fn push_str(&mut self, stir: &str) -> Result<(), OutputError> {
        self.push_bstr(stir.as_bytes())
    }

    pub fn clear(&mut self) {
        self.cur = self.start;
    }

    pub fn as_bytes(&self) -> &[u8] {
        if self.is_empty() {
            return &[];
        }
        unsafe { core::slice::from_raw_parts(self.start, self.len()) }
    }

    /// The output so far. `EMIT` can write arbitrary bytes, so anything that
    /// is not valid UTF-8 is cut off at the first bad byte.
    pub fn as_str(&self) -> &str {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(s) => s,
            Err(e) => {
                let valid = &self.as_bytes()[..e.valid_up_to()];
                unsafe { core::str::from_utf8_unchecked(valid) }
            }
        }
    }
}

impl core::fmt::Write for OutputBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.push_str(s).map_err(|_| core::fmt::Error)
    }
}
