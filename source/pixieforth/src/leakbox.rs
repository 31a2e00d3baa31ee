use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::UnsafeCell,
    mem::MaybeUninit,
    ptr::NonNull,
};

use crate::{memory::MemoryMap, output::OutputBuf, BuiltinEntry, Cell, Forth};

// Helper type that will un-leak the buffer once it is dropped.
//
// The buffer is zeroed: the memory arena is read before it is ever written.
pub struct LeakBox<T> {
    ptr: *mut UnsafeCell<MaybeUninit<T>>,
    len: usize,
}

impl<T> LeakBox<T> {
    pub fn new(len: usize) -> Self {
        if len == 0 {
            return Self {
                ptr: NonNull::dangling().as_ptr(),
                len,
            };
        }
        Self {
            ptr: unsafe {
                System
                    .alloc_zeroed(Layout::array::<UnsafeCell<MaybeUninit<T>>>(len).unwrap())
                    .cast()
            },
            len,
        }
    }

    pub fn ptr(&self) -> *mut T {
        self.ptr.cast()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Drop for LeakBox<T> {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        unsafe {
            System.dealloc(
                self.ptr.cast(),
                Layout::array::<UnsafeCell<MaybeUninit<T>>>(self.len).unwrap(),
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct LBForthParams {
    pub data_stack_elems: usize,
    pub call_stack_elems: usize,
    pub input_buf_elems: usize,
    pub output_buf_elems: usize,
    pub dict_buf_elems: usize,
}

impl Default for LBForthParams {
    fn default() -> Self {
        Self {
            data_stack_elems: 1024,
            call_stack_elems: 64,
            input_buf_elems: 256,
            output_buf_elems: 256,
            dict_buf_elems: 16 * 1024,
        }
    }
}

/// A [`Forth`] VM together with the heap buffers backing it.
pub struct LBForth<T: 'static> {
    pub forth: Forth<T>,
    _payload_dstack: LeakBox<Cell>,
    _payload_cstack: LeakBox<Cell>,
    _memory: LeakBox<u8>,
    _output_buf: LeakBox<u8>,
}

impl<T: 'static> LBForth<T> {
    pub fn from_params(
        params: LBForthParams,
        host_ctxt: T,
        builtins: &'static [BuiltinEntry<T>],
    ) -> Self {
        let mm = MemoryMap::new(params.input_buf_elems, params.dict_buf_elems)
            .expect("arena too large for 32-bit cells");

        let _payload_dstack: LeakBox<Cell> = LeakBox::new(params.data_stack_elems);
        let _payload_cstack: LeakBox<Cell> = LeakBox::new(params.call_stack_elems);
        let _memory: LeakBox<u8> = LeakBox::new(mm.total());
        let _output_buf: LeakBox<u8> = LeakBox::new(params.output_buf_elems);

        let output = OutputBuf::new(_output_buf.ptr(), _output_buf.len());
        let forth = unsafe {
            Forth::<T>::new(
                (_payload_dstack.ptr(), _payload_dstack.len()),
                (_payload_cstack.ptr(), _payload_cstack.len()),
                (_memory.ptr(), _memory.len()),
                params.input_buf_elems,
                output,
                host_ctxt,
                builtins,
            )
            .unwrap()
        };

        Self {
            forth,
            _payload_dstack,
            _payload_cstack,
            _memory,
            _output_buf,
        }
    }
}
