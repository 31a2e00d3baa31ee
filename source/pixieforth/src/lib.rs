#![cfg_attr(not(any(test, feature = "use-std")), no_std)]

pub mod cell;
pub mod dictionary;
pub mod input;
pub mod memory;
pub mod number;
pub mod output;
pub mod stack;
pub mod vm;

cfg_if::cfg_if! {
    if #[cfg(any(test, feature = "use-std"))] {
        pub mod leakbox;
        pub mod testutil;
    }
}

use crate::{input::InputError, memory::MemoryError, output::OutputError, stack::StackError};

pub use crate::cell::Cell;
pub use crate::vm::Forth;

#[derive(Debug, PartialEq)]
pub enum Error {
    Stack(StackError),
    Memory(MemoryError),
    Output(OutputError),
    Input(InputError),
    DictionaryFull,
    /// A code field that is neither a marker nor a registered native.
    BadCodeField(Cell),
    /// The entry at this address links forward instead of back.
    CorruptDictionary(Cell),
    WordNotFound,
    MissingName,
    WordNotInDict,
    DivideByZero,
    MemoryTooSmall,
}

impl From<StackError> for Error {
    fn from(se: StackError) -> Self {
        Error::Stack(se)
    }
}

impl From<MemoryError> for Error {
    fn from(me: MemoryError) -> Self {
        Error::Memory(me)
    }
}

impl From<OutputError> for Error {
    fn from(oe: OutputError) -> Self {
        Error::Output(oe)
    }
}

impl From<InputError> for Error {
    fn from(ie: InputError) -> Self {
        Error::Input(ie)
    }
}

impl From<core::fmt::Error> for Error {
    fn from(_oe: core::fmt::Error) -> Self {
        Error::Output(OutputError::FormattingErr)
    }
}

/// The `STATE` register, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Run,
    Compile,
}

impl From<Mode> for Cell {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Run => 0,
            Mode::Compile => 1,
        }
    }
}

pub type WordFunc<T> = fn(&mut Forth<T>) -> Result<(), Error>;

/// A native word, registered into the dictionary when the VM boots.
pub struct BuiltinEntry<T: 'static> {
    pub name: &'static str,
    pub func: WordFunc<T>,
    pub immediate: bool,
}

/// Build a [`BuiltinEntry`]. Add `immediate` to have the word run even while
/// compiling.
#[macro_export]
macro_rules! builtin {
    ($name:literal, $func:expr) => {
        $crate::BuiltinEntry {
            name: $name,
            func: $func,
            immediate: false,
        }
    };
    ($name:literal, $func:expr, immediate) => {
        $crate::BuiltinEntry {
            name: $name,
            func: $func,
            immediate: true,
        }
    };
}

pub trait ReplaceErr {
    type OK;
    type Err;
    fn replace_err<NewErr>(self, t: NewErr) -> Result<Self::OK, NewErr>;
}

impl<T, E> ReplaceErr for Result<T, E> {
    type OK = T;
    type Err = E;

    #[inline]
    fn replace_err<NewErr>(self, t: NewErr) -> Result<Self::OK, NewErr> {
        self.map_err(|_| t)
    }
}

impl<T> ReplaceErr for Option<T> {
    type OK = T;
    type Err = ();

    #[inline]
    fn replace_err<NewErr>(self, t: NewErr) -> Result<Self::OK, NewErr> {
        self.ok_or(t)
    }
}
