use core::ptr::NonNull;

/// A fixed-capacity stack over a host-provided buffer.
///
/// The bottom of the stack is the start of the buffer and the stack grows
/// upwards. Positions passed to [`Stack::peek`] and [`Stack::put`] are counted
/// down from the top, so `peek(0)` is the top of stack.
pub struct Stack<T: Copy> {
    bot: NonNull<T>,
    cap: usize,
    len: usize,
}

#[derive(Debug, PartialEq)]
pub enum StackError {
    StackEmpty,
    StackFull,
    OverwriteInvalid,
}

impl<T: Copy> Stack<T> {
    /// # Safety
    ///
    /// `bottom` must be valid for reads and writes of `items` elements of `T`
    /// for as long as the stack exists, and must not be aliased.
    pub unsafe fn new(bottom: *mut T, items: usize) -> Self {
        Self {
            bot: NonNull::new(bottom).unwrap_or(NonNull::dangling()),
            cap: if bottom.is_null() { 0 } else { items },
            len: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), StackError> {
        if self.len == self.cap {
            return Err(StackError::StackFull);
        }
        unsafe {
            self.bot.as_ptr().add(self.len).write(item);
        }
        self.len += 1;
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(unsafe { self.bot.as_ptr().add(self.len).read() })
    }

    #[inline]
    pub fn try_pop(&mut self) -> Result<T, StackError> {
        self.pop().ok_or(StackError::StackEmpty)
    }

    /// Read the item `n` places below the top without changing the depth.
    #[inline]
    pub fn peek(&self, n: usize) -> Result<T, StackError> {
        if n >= self.len {
            return Err(StackError::StackEmpty);
        }
        Ok(self.as_slice()[self.len - 1 - n])
    }

    #[inline]
    pub fn try_peek(&self) -> Result<T, StackError> {
        self.peek(0)
    }

    /// Replace the item `n` places below the top without changing the depth.
    #[inline]
    pub fn put(&mut self, n: usize, item: T) -> Result<(), StackError> {
        if n >= self.len {
            return Err(StackError::OverwriteInvalid);
        }
        let idx = self.len - 1 - n;
        self.as_mut_slice()[idx] = item;
        Ok(())
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// The live items, bottom first.
    pub fn as_slice(&self) -> &[T] {
        unsafe { core::slice::from_raw_parts(self.bot.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { core::slice::from_raw_parts_mut(self.bot.as_ptr(), self.len) }
    }
}
