use crate::{
    cell::{signed, unsigned, Cell},
    memory::map,
    Error, Forth,
};

/// Value of an ASCII digit in any radix up to 36.
fn digit(ch: u8) -> Option<u32> {
    match ch {
        b'0'..=b'9' => Some((ch - b'0') as u32),
        b'a'..=b'z' => Some((ch - b'a') as u32 + 10),
        b'A'..=b'Z' => Some((ch - b'A') as u32 + 10),
        _ => None,
    }
}

/// Parse `bytes` as a number in `base`.
///
/// A leading `-` negates and a leading `$` forces base 16; either may come
/// first. Returns the value and the count of trailing characters that were not
/// consumed. If not a single digit was consumed the count is the full length.
pub fn parse(bytes: &[u8], base: Cell) -> (Cell, usize) {
    let mut base = base;
    let mut negative = false;
    let mut hex = false;
    let mut idx = 0;

    for _ in 0..2 {
        match bytes.get(idx) {
            Some(b'-') if !negative => negative = true,
            Some(b'$') if !hex => {
                hex = true;
                base = 16;
            }
            _ => break,
        }
        idx += 1;
    }

    let digits_start = idx;
    let mut value: Cell = 0;
    while let Some(d) = bytes.get(idx).and_then(|&ch| digit(ch)) {
        if d >= base {
            break;
        }
        value = value.wrapping_mul(base).wrapping_add(d);
        idx += 1;
    }

    if idx == digits_start && !bytes.is_empty() {
        return (0, bytes.len());
    }
    if negative {
        value = unsigned(signed(value).wrapping_neg());
    }
    (value, bytes.len() - idx)
}

/// Render `val` as a signed number in `base` into `buf`, returning the used
/// tail of `buf`. Bases outside `2..=36` render in decimal.
pub fn render(val: Cell, base: Cell, buf: &mut [u8; 33]) -> &[u8] {
    let base = if (2..=36).contains(&base) { base } else { 10 };
    let negative = signed(val) < 0;
    let mut mag = if negative { signed(val).unsigned_abs() } else { val };
    let mut idx = buf.len();
    loop {
        idx -= 1;
        let d = (mag % base) as u8;
        buf[idx] = if d < 10 { b'0' + d } else { b'a' + d - 10 };
        mag /= base;
        if mag == 0 {
            break;
        }
    }
    if negative {
        idx -= 1;
        buf[idx] = b'-';
    }
    &buf[idx..]
}

impl<T: 'static> Forth<T> {
    /// `NUMBER` over bytes stored in the arena, using the current `BASE`.
    pub fn number(&self, addr: Cell, len: Cell) -> Result<(Cell, usize), Error> {
        let base = self.memory.read_cell(map::BASE)?;
        let bytes = self.memory.slice(addr, len as usize)?;
        Ok(parse(bytes, base))
    }
}
