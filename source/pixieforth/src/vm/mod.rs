use crate::{
    cell::{Cell, CELL},
    dictionary::{CodeField, MAX_NAME_LEN},
    memory::{map, Memory, MemoryMap},
    output::OutputBuf,
    stack::Stack,
    BuiltinEntry, Error, Mode, ReplaceErr,
};

pub mod builtins;

/// Execution tokens the engine itself needs to compile or run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoreXts {
    pub lit: Cell,
    pub exit: Cell,
    pub interpret: Cell,
}

/// Forth is the "context" of the VM/interpreter.
///
/// Everything the forth program can address (registers, input, dictionary)
/// is in `memory`. The data stack and the call-frame stack are kept outside
/// of it, as is the output sink.
pub struct Forth<T: 'static> {
    pub data_stack: Stack<Cell>,
    /// One resume address per composite word being executed.
    pub(crate) call_stack: Stack<Cell>,
    pub memory: Memory,
    pub(crate) mm: MemoryMap,
    pub output: OutputBuf,
    pub host_ctxt: T,
    host_builtins: &'static [BuiltinEntry<T>],
    xts: CoreXts,
}

impl<T: 'static> Forth<T> {
    /// Boot a VM over the given buffers.
    ///
    /// `mem_buf` must hold at least `MemoryMap::new(input_len, _).total()`
    /// bytes; whatever follows the input buffer becomes dictionary space.
    /// The core native words are registered first, then `host_builtins`.
    ///
    /// # Safety
    ///
    /// Every buffer must be valid for reads and writes of its length for the
    /// lifetime of the VM, must not be aliased, and `mem_buf` must be
    /// initialized.
    pub unsafe fn new(
        dstack_buf: (*mut Cell, usize),
        cstack_buf: (*mut Cell, usize),
        mem_buf: (*mut u8, usize),
        input_len: usize,
        output: OutputBuf,
        host_ctxt: T,
        host_builtins: &'static [BuiltinEntry<T>],
    ) -> Result<Self, Error> {
        let dict_len = mem_buf
            .1
            .checked_sub(MemoryMap::new(input_len, 0).ok_or(Error::MemoryTooSmall)?.total())
            .ok_or(Error::MemoryTooSmall)?;
        let mm = MemoryMap::new(input_len, dict_len).ok_or(Error::MemoryTooSmall)?;

        let mut forth = Self {
            data_stack: Stack::new(dstack_buf.0, dstack_buf.1),
            call_stack: Stack::new(cstack_buf.0, cstack_buf.1),
            memory: Memory::new(mem_buf.0, mem_buf.1),
            mm,
            output,
            host_ctxt,
            host_builtins,
            xts: CoreXts {
                lit: 0,
                exit: 0,
                interpret: 0,
            },
        };
        forth.boot()?;
        Ok(forth)
    }

    fn boot(&mut self) -> Result<(), Error> {
        self.memory.fill(0, map::INPUT_BUF as usize, 0)?;
        self.set_here(self.mm.dict_start)?;
        self.set_latest(0)?;
        self.set_mode(Mode::Run)?;
        self.set_base(10)?;
        self.memory.write_cell(map::INPUT_CURSOR, self.mm.input_buf)?;
        self.memory.write_cell(map::INPUT_REMAINING, 0)?;

        let host = self.host_builtins;
        for (id, bi) in Self::CORE_BUILTINS.iter().chain(host.iter()).enumerate() {
            let entry = self.create_name(bi.name.as_bytes())?;
            self.comma(CodeField::Native(id as Cell).encode())?;
            if bi.immediate {
                self.toggle_immediate(entry)?;
            }
        }

        self.xts = CoreXts {
            lit: self.required_xt("LIT")?,
            exit: self.required_xt("EXIT")?,
            interpret: self.required_xt("INTERPRET")?,
        };
        self.memory
            .write_cell(map::TRAMPOLINE, CodeField::Colon.encode())?;
        self.memory
            .write_cell(map::TRAMPOLINE + 2 * CELL, self.xts.exit)?;

        tracing::debug!(
            natives = Self::CORE_BUILTINS.len() + self.host_builtins.len(),
            here = self.here()?,
            dict_end = self.mm.end,
            "forth VM booted"
        );
        Ok(())
    }

    fn required_xt(&self, name: &str) -> Result<Cell, Error> {
        self.xt(name)?.replace_err(Error::WordNotInDict)
    }

    /// The code field address of the visible word `name`, if there is one.
    pub fn xt(&self, name: &str) -> Result<Option<Cell>, Error> {
        if name.len() > MAX_NAME_LEN {
            return Ok(None);
        }
        match self.find_name(name.as_bytes())? {
            0 => Ok(None),
            entry => self.to_cfa(entry).map(Some),
        }
    }

    pub fn core_xts(&self) -> CoreXts {
        self.xts
    }

    pub fn memory_map(&self) -> MemoryMap {
        self.mm
    }

    pub fn release(self) -> T {
        self.host_ctxt
    }

    // Registers

    pub fn here(&self) -> Result<Cell, Error> {
        Ok(self.memory.read_cell(map::HERE)?)
    }

    pub fn set_here(&mut self, here: Cell) -> Result<(), Error> {
        Ok(self.memory.write_cell(map::HERE, here)?)
    }

    pub fn latest(&self) -> Result<Cell, Error> {
        Ok(self.memory.read_cell(map::LATEST)?)
    }

    pub fn set_latest(&mut self, latest: Cell) -> Result<(), Error> {
        Ok(self.memory.write_cell(map::LATEST, latest)?)
    }

    pub fn base(&self) -> Result<Cell, Error> {
        Ok(self.memory.read_cell(map::BASE)?)
    }

    pub fn set_base(&mut self, base: Cell) -> Result<(), Error> {
        Ok(self.memory.write_cell(map::BASE, base)?)
    }

    /// `STATE`: any non-zero value counts as compiling.
    pub fn mode(&self) -> Result<Mode, Error> {
        Ok(match self.memory.read_cell(map::STATE)? {
            0 => Mode::Run,
            _ => Mode::Compile,
        })
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Error> {
        Ok(self.memory.write_cell(map::STATE, mode.into())?)
    }

    // Inner interpreter

    fn native(&self, id: Cell) -> Option<&'static BuiltinEntry<T>> {
        let id = id as usize;
        let core = Self::CORE_BUILTINS;
        let host = self.host_builtins;
        match id.checked_sub(core.len()) {
            None => core.get(id),
            Some(idx) => host.get(idx),
        }
    }

    /// Perform one execution token.
    ///
    /// Natives run to completion right away. A colon word only gets a new
    /// call frame here; its body is walked by whichever `run` loop is active.
    pub(crate) fn dispatch(&mut self, xt: Cell) -> Result<(), Error> {
        let raw = self.memory.read_cell(xt)?;
        match CodeField::decode(raw) {
            CodeField::Native(id) => {
                let bi = self.native(id).ok_or(Error::BadCodeField(raw))?;
                tracing::trace!(xt, name = bi.name, "native");
                (bi.func)(self)
            }
            CodeField::Colon => {
                self.call_stack.push(xt + CELL)?;
                Ok(())
            }
            CodeField::Variable => {
                self.data_stack.push(xt + CELL)?;
                Ok(())
            }
            CodeField::Constant => {
                let val = self.memory.read_cell(xt + CELL)?;
                self.data_stack.push(val)?;
                Ok(())
            }
        }
    }

    /// Dispatch `xt`, then keep stepping through call frames until the frame
    /// stack is back to where it was.
    fn run(&mut self, xt: Cell) -> Result<(), Error> {
        let base = self.call_stack.depth();
        self.dispatch(xt)?;
        while self.call_stack.depth() > base {
            let ip = self.call_stack.try_peek()?;
            let token = self.memory.read_cell(ip)?;
            self.call_stack.put(0, ip + CELL)?;
            self.dispatch(token)?;
        }
        Ok(())
    }

    /// Run a single execution token to completion via the synthetic
    /// `[COLON, xt, EXIT]` program.
    pub fn execute(&mut self, xt: Cell) -> Result<(), Error> {
        self.memory.write_cell(map::TRAMPOLINE + CELL, xt)?;
        self.run(map::TRAMPOLINE)
    }

    /// The cell at the innermost frame's instruction pointer, which is then
    /// stepped past it. Used by words with an inline operand.
    pub(crate) fn next_inline(&mut self) -> Result<Cell, Error> {
        let ip = self.call_stack.try_peek()?;
        let val = self.memory.read_cell(ip)?;
        self.call_stack.put(0, ip + CELL)?;
        Ok(val)
    }

    /// Move the innermost frame's instruction pointer by `offset` cells,
    /// counted from the operand cell it currently points at.
    pub(crate) fn branch(&mut self) -> Result<(), Error> {
        let ip = self.call_stack.try_peek()?;
        let offset = self.memory.read_cell(ip)? as i32;
        let target = ip.wrapping_add((offset.wrapping_mul(CELL as i32)) as Cell);
        self.call_stack.put(0, target)?;
        Ok(())
    }

    /// Abandon every active composite word.
    pub(crate) fn unwind(&mut self) {
        self.call_stack.clear();
    }

    // Outer interpreter

    /// Interpret the whole input buffer, one `INTERPRET` at a time.
    ///
    /// On error the stacks are cleared, `STATE` drops back to interpreting and
    /// the rest of the line is thrown away before the error is returned.
    pub fn process_line(&mut self) -> Result<(), Error> {
        let res: Result<(), Error> = (|| {
            let interpret = self.xts.interpret;
            while self.input_remaining()? != 0 {
                self.execute(interpret)?;
            }
            Ok(())
        })();
        match res {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = ?e, "line abandoned");
                self.data_stack.clear();
                self.call_stack.clear();
                if let Err(error) = self.set_mode(Mode::Run).and(self.discard_input()) {
                    tracing::warn!(?error, "failed to reset after an abandoned line");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub mod test {
    use crate::{
        cell::unsigned,
        leakbox::{LBForth, LBForthParams},
        memory::map,
        testutil::{run_program, Token},
        Error, Forth, Mode,
    };

    fn vm() -> LBForth<()> {
        LBForth::from_params(LBForthParams::default(), (), &[])
    }

    #[test]
    fn boot_registers() {
        let lbf = vm();
        let forth = &lbf.forth;
        assert_eq!(forth.base(), Ok(10));
        assert_eq!(forth.mode(), Ok(Mode::Run));
        assert_eq!(forth.memory.read_cell(map::NULL), Ok(0));
        assert!(forth.here().unwrap() > forth.memory_map().dict_start);
        assert_eq!(forth.xt("LIT").unwrap(), Some(forth.core_xts().lit));
        assert_eq!(forth.xt("nonsense").unwrap(), None);
        assert!(forth.data_stack.is_empty());
    }

    #[test]
    fn literal() {
        let mut lbf = vm();
        let stack = run_program(
            &mut lbf.forth,
            &[],
            &[Token::Lit(0x1234abcd), Token::Word("EXIT")],
        );
        assert_eq!(stack, vec![0x1234abcd]);
    }

    #[test]
    fn two_swap() {
        let mut lbf = vm();
        let stack = run_program(
            &mut lbf.forth,
            &[1, 2, 3, 4],
            &[Token::Word("2SWAP"), Token::Word("EXIT")],
        );
        assert_eq!(stack, vec![3, 4, 1, 2]);
    }

    #[test]
    fn divmod() {
        let mut lbf = vm();
        let stack = run_program(
            &mut lbf.forth,
            &[7, 2],
            &[Token::Word("/MOD"), Token::Word("EXIT")],
        );
        assert_eq!(stack, vec![1, 3]);
    }

    #[test]
    fn quit_abandons_the_rest() {
        let mut lbf = vm();
        let stack = run_program(
            &mut lbf.forth,
            &[],
            &[Token::Lit(1), Token::Word("QUIT"), Token::Lit(2), Token::Word("EXIT")],
        );
        assert_eq!(stack, vec![1]);
        assert_eq!(lbf.forth.call_stack.depth(), 0);
    }

    #[test]
    fn branches() {
        let mut lbf = vm();
        // Skip over `LIT 99`.
        let stack = run_program(
            &mut lbf.forth,
            &[],
            &[
                Token::Word("BRANCH"),
                Token::Raw(3),
                Token::Lit(99),
                Token::Lit(1),
                Token::Word("EXIT"),
            ],
        );
        assert_eq!(stack, vec![1]);

        // 0BRANCH only jumps on zero.
        for (flag, expect) in [(0, vec![1]), (5, vec![99, 1])] {
            let stack = run_program(
                &mut lbf.forth,
                &[flag],
                &[
                    Token::Word("0BRANCH"),
                    Token::Raw(3),
                    Token::Lit(99),
                    Token::Lit(1),
                    Token::Word("EXIT"),
                ],
            );
            assert_eq!(stack, expect);
        }
    }

    #[test]
    fn backwards_branch_loops() {
        let mut lbf = vm();
        // 5 BEGIN 1- DUP 0= UNTIL
        let stack = run_program(
            &mut lbf.forth,
            &[5],
            &[
                Token::Word("1-"),
                Token::Word("DUP"),
                Token::Word("0="),
                Token::Word("0BRANCH"),
                Token::Raw(unsigned(-4)),
                Token::Word("EXIT"),
            ],
        );
        assert_eq!(stack, vec![0]);
    }

    #[test]
    fn nested_colon_words() {
        let mut lbf = vm();
        let forth = &mut lbf.forth;
        forth.fill(": inc 1+ ; : inc2 inc inc ; : inc4 inc2 inc2 ;").unwrap();
        forth.process_line().unwrap();
        forth.fill("10 inc4 inc").unwrap();
        forth.process_line().unwrap();
        assert_eq!(forth.data_stack.as_slice(), &[15]);
        assert_eq!(forth.call_stack.depth(), 0);
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let params = LBForthParams {
            call_stack_elems: 8,
            ..LBForthParams::default()
        };
        let mut lbf = LBForth::from_params(params, (), &[]);
        let forth = &mut lbf.forth;

        // `:` hides the word, so link the recursion by hand.
        forth.fill(": down ; : again down ;").unwrap();
        forth.process_line().unwrap();
        let again = forth.xt("again").unwrap().unwrap();
        forth.memory.write_cell(again + 4, again).unwrap();

        forth.fill("again").unwrap();
        assert!(matches!(forth.process_line(), Err(Error::Stack(_))));
        assert_eq!(forth.call_stack.depth(), 0);
    }

    #[test]
    fn bad_code_field() {
        let mut lbf = vm();
        let forth = &mut lbf.forth;
        let entry = forth.create_name(b"broken").unwrap();
        forth.comma(0x7777).unwrap();
        let cfa = forth.to_cfa(entry).unwrap();
        assert_eq!(forth.execute(cfa), Err(Error::BadCodeField(0x7777)));
    }

    #[test]
    fn host_builtins() {
        #[derive(Default)]
        struct TestContext {
            contents: Vec<u32>,
        }

        // Takes one value off the stack, and stores it in the vec
        fn squirrel(forth: &mut Forth<TestContext>) -> Result<(), Error> {
            let val = forth.data_stack.try_pop()?;
            forth.host_ctxt.contents.push(val);
            Ok(())
        }

        static HOST: &[crate::BuiltinEntry<TestContext>] = &[crate::builtin!("squirrel", squirrel)];

        let mut lbf = LBForth::from_params(LBForthParams::default(), TestContext::default(), HOST);
        let forth = &mut lbf.forth;
        forth.fill("5 6 squirrel squirrel : sq3 3 squirrel ; sq3").unwrap();
        forth.process_line().unwrap();

        let context = lbf.forth.release();
        assert_eq!(&context.contents, &[6, 5, 3]);
    }
}
