use crate::{
    builtin,
    cell::{flag, signed, unsigned, Cell},
    memory::map,
    number, BuiltinEntry, Error, Forth,
};

pub mod compiler;

impl<T: 'static> Forth<T> {
    /// Every native word the core provides, in native id order.
    ///
    /// Host words passed to [`Forth::new`] are numbered after these.
    pub const CORE_BUILTINS: &'static [BuiltinEntry<T>] = &[
        //
        // stack
        //
        builtin!("DROP", Self::drop),
        builtin!("2DROP", Self::drop2),
        builtin!("DUP", Self::dup),
        builtin!("2DUP", Self::dup2),
        builtin!("?DUP", Self::qdup),
        builtin!("SWAP", Self::swap),
        builtin!("2SWAP", Self::swap2),
        builtin!("OVER", Self::over),
        builtin!("ROT", Self::rot),
        builtin!("-ROT", Self::nrot),
        builtin!("NIP", Self::nip),
        //
        // arithmetic
        //
        builtin!("1+", Self::incr),
        builtin!("1-", Self::decr),
        builtin!("4+", Self::incr4),
        builtin!("4-", Self::decr4),
        builtin!("+", Self::add),
        builtin!("-", Self::minus),
        builtin!("*", Self::mul),
        builtin!("NEGATE", Self::negate),
        builtin!("/", Self::div),
        builtin!("MOD", Self::modu),
        builtin!("/MOD", Self::div_mod),
        //
        // comparison
        //
        builtin!("=", Self::equal),
        builtin!("<>", Self::not_equal),
        builtin!("<", Self::less),
        builtin!(">", Self::greater),
        builtin!("<=", Self::less_equal),
        builtin!(">=", Self::greater_equal),
        builtin!("0=", Self::zero_equal),
        builtin!("0<>", Self::zero_not_equal),
        builtin!("0<", Self::zero_less),
        builtin!("0>", Self::zero_greater),
        builtin!("0<=", Self::zero_less_equal),
        builtin!("0>=", Self::zero_greater_equal),
        //
        // bitwise
        //
        builtin!("AND", Self::and),
        builtin!("OR", Self::or),
        builtin!("XOR", Self::xor),
        builtin!("INVERT", Self::invert),
        //
        // memory
        //
        builtin!("@", Self::var_load),
        builtin!("!", Self::var_store),
        builtin!("C@", Self::byte_var_load),
        builtin!("C!", Self::byte_var_store),
        builtin!("+!", Self::add_store),
        builtin!("-!", Self::sub_store),
        builtin!("MEMCPY", Self::memcpy),
        builtin!("MEMMOVE", Self::memmove),
        //
        // inner interpreter
        //
        builtin!("LIT", Self::lit),
        builtin!("EXIT", Self::exit),
        builtin!("BRANCH", Self::jump),
        builtin!("0BRANCH", Self::zero_jump),
        builtin!("QUIT", Self::quit),
        builtin!("EXECUTE", Self::execute_xt),
        //
        // reader and compiler
        //
        builtin!("KEY", Self::key_word),
        builtin!("WORD", Self::word_word),
        builtin!("CHAR", Self::char_word, immediate),
        builtin!("NUMBER", Self::number_word),
        builtin!("FIND", Self::find_word),
        builtin!(">CFA", Self::cfa_word),
        builtin!(">DFA", Self::dfa_word),
        builtin!("CREATE", Self::create_word),
        builtin!(",", Self::comma_word),
        builtin!("HIDDEN", Self::hidden),
        builtin!("IMMEDIATE", Self::immediate, immediate),
        builtin!("'", Self::tick, immediate),
        builtin!(":", Self::colon),
        builtin!(";", Self::semicolon, immediate),
        builtin!("[", Self::interpret_mode, immediate),
        builtin!("]", Self::compile_mode),
        builtin!("INTERPRET", Self::interpret),
        builtin!("VARIABLE", Self::variable),
        builtin!("CONSTANT", Self::constant),
        builtin!("ALLOT", Self::allot_word),
        //
        // registers
        //
        builtin!("HERE", Self::here_addr),
        builtin!("LATEST", Self::latest_addr),
        builtin!("STATE", Self::state_addr),
        builtin!("BASE", Self::base_addr),
        //
        // output
        //
        builtin!("EMIT", Self::emit),
        builtin!("NL", Self::newline),
        builtin!(".", Self::pop_print),
    ];

    fn binary(&mut self, f: impl FnOnce(Cell, Cell) -> Cell) -> Result<(), Error> {
        let a = self.data_stack.try_pop()?;
        let b = self.data_stack.try_pop()?;
        self.data_stack.push(f(b, a))?;
        Ok(())
    }

    fn unary(&mut self, f: impl FnOnce(Cell) -> Cell) -> Result<(), Error> {
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(f(a))?;
        Ok(())
    }

    fn compare(&mut self, f: impl FnOnce(i32, i32) -> bool) -> Result<(), Error> {
        self.binary(|b, a| flag(f(signed(b), signed(a))))
    }

    fn compare_zero(&mut self, f: impl FnOnce(i32) -> bool) -> Result<(), Error> {
        self.unary(|a| flag(f(signed(a))))
    }

    // Stack

    pub fn drop(&mut self) -> Result<(), Error> {
        let _a = self.data_stack.try_pop()?;
        Ok(())
    }

    pub fn drop2(&mut self) -> Result<(), Error> {
        let _a = self.data_stack.try_pop()?;
        let _b = self.data_stack.try_pop()?;
        Ok(())
    }

    pub fn dup(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_peek()?;
        self.data_stack.push(val)?;
        Ok(())
    }

    pub fn dup2(&mut self) -> Result<(), Error> {
        let a = self.data_stack.peek(0)?;
        let b = self.data_stack.peek(1)?;
        self.data_stack.push(b)?;
        self.data_stack.push(a)?;
        Ok(())
    }

    pub fn qdup(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_peek()?;
        if val != 0 {
            self.data_stack.push(val)?;
        }
        Ok(())
    }

    pub fn swap(&mut self) -> Result<(), Error> {
        let a = self.data_stack.try_pop()?;
        let b = self.data_stack.try_pop()?;
        self.data_stack.push(a)?;
        self.data_stack.push(b)?;
        Ok(())
    }

    pub fn swap2(&mut self) -> Result<(), Error> {
        let d = self.data_stack.try_pop()?;
        let c = self.data_stack.try_pop()?;
        let b = self.data_stack.try_pop()?;
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(c)?;
        self.data_stack.push(d)?;
        self.data_stack.push(a)?;
        self.data_stack.push(b)?;
        Ok(())
    }

    pub fn over(&mut self) -> Result<(), Error> {
        let a = self.data_stack.peek(1)?;
        self.data_stack.push(a)?;
        Ok(())
    }

    /// `a b c -- b c a`
    pub fn rot(&mut self) -> Result<(), Error> {
        let c = self.data_stack.try_pop()?;
        let b = self.data_stack.try_pop()?;
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(b)?;
        self.data_stack.push(c)?;
        self.data_stack.push(a)?;
        Ok(())
    }

    /// `a b c -- c a b`
    pub fn nrot(&mut self) -> Result<(), Error> {
        let c = self.data_stack.try_pop()?;
        let b = self.data_stack.try_pop()?;
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(c)?;
        self.data_stack.push(a)?;
        self.data_stack.push(b)?;
        Ok(())
    }

    pub fn nip(&mut self) -> Result<(), Error> {
        let a = self.data_stack.try_pop()?;
        let _b = self.data_stack.try_pop()?;
        self.data_stack.push(a)?;
        Ok(())
    }

    // Arithmetic

    pub fn incr(&mut self) -> Result<(), Error> {
        self.unary(|a| a.wrapping_add(1))
    }

    pub fn decr(&mut self) -> Result<(), Error> {
        self.unary(|a| a.wrapping_sub(1))
    }

    pub fn incr4(&mut self) -> Result<(), Error> {
        self.unary(|a| a.wrapping_add(4))
    }

    pub fn decr4(&mut self) -> Result<(), Error> {
        self.unary(|a| a.wrapping_sub(4))
    }

    pub fn add(&mut self) -> Result<(), Error> {
        self.binary(|b, a| b.wrapping_add(a))
    }

    pub fn minus(&mut self) -> Result<(), Error> {
        self.binary(|b, a| b.wrapping_sub(a))
    }

    pub fn mul(&mut self) -> Result<(), Error> {
        self.binary(|b, a| b.wrapping_mul(a))
    }

    pub fn negate(&mut self) -> Result<(), Error> {
        self.unary(|a| unsigned(signed(a).wrapping_neg()))
    }

    /// Pops the divisor then the dividend, both signed.
    fn divisor_dividend(&mut self) -> Result<(i32, i32), Error> {
        let a = signed(self.data_stack.try_pop()?);
        let b = signed(self.data_stack.try_pop()?);
        if a == 0 {
            return Err(Error::DivideByZero);
        }
        Ok((a, b))
    }

    pub fn div(&mut self) -> Result<(), Error> {
        let (a, b) = self.divisor_dividend()?;
        self.data_stack.push(unsigned(b.wrapping_div(a)))?;
        Ok(())
    }

    pub fn modu(&mut self) -> Result<(), Error> {
        let (a, b) = self.divisor_dividend()?;
        self.data_stack.push(unsigned(b.wrapping_rem(a)))?;
        Ok(())
    }

    /// `n1 n2 -- rem quot`
    pub fn div_mod(&mut self) -> Result<(), Error> {
        let (a, b) = self.divisor_dividend()?;
        self.data_stack.push(unsigned(b.wrapping_rem(a)))?;
        self.data_stack.push(unsigned(b.wrapping_div(a)))?;
        Ok(())
    }

    // Comparison

    pub fn equal(&mut self) -> Result<(), Error> {
        self.compare(|b, a| b == a)
    }

    pub fn not_equal(&mut self) -> Result<(), Error> {
        self.compare(|b, a| b != a)
    }

    pub fn less(&mut self) -> Result<(), Error> {
        self.compare(|b, a| b < a)
    }

    pub fn greater(&mut self) -> Result<(), Error> {
        self.compare(|b, a| b > a)
    }

    pub fn less_equal(&mut self) -> Result<(), Error> {
        self.compare(|b, a| b <= a)
    }

    pub fn greater_equal(&mut self) -> Result<(), Error> {
        self.compare(|b, a| b >= a)
    }

    pub fn zero_equal(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a == 0)
    }

    pub fn zero_not_equal(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a != 0)
    }

    pub fn zero_less(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a < 0)
    }

    pub fn zero_greater(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a > 0)
    }

    pub fn zero_less_equal(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a <= 0)
    }

    pub fn zero_greater_equal(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a >= 0)
    }

    // Bitwise

    pub fn and(&mut self) -> Result<(), Error> {
        self.binary(|b, a| b & a)
    }

    pub fn or(&mut self) -> Result<(), Error> {
        self.binary(|b, a| b | a)
    }

    pub fn xor(&mut self) -> Result<(), Error> {
        self.binary(|b, a| b ^ a)
    }

    pub fn invert(&mut self) -> Result<(), Error> {
        self.unary(|a| !a)
    }

    // Memory

    pub fn var_load(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let val = self.memory.read_cell(addr)?;
        self.data_stack.push(val)?;
        Ok(())
    }

    pub fn var_store(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let val = self.data_stack.try_pop()?;
        self.memory.write_cell(addr, val)?;
        Ok(())
    }

    pub fn byte_var_load(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let val = self.memory.read_byte(addr)?;
        self.data_stack.push(val.into())?;
        Ok(())
    }

    /// Only the low byte of the value is stored.
    pub fn byte_var_store(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let val = self.data_stack.try_pop()?;
        self.memory.write_byte(addr, val as u8)?;
        Ok(())
    }

    pub fn add_store(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let n = self.data_stack.try_pop()?;
        let old = self.memory.read_cell(addr)?;
        self.memory.write_cell(addr, old.wrapping_add(n))?;
        Ok(())
    }

    pub fn sub_store(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let n = self.data_stack.try_pop()?;
        let old = self.memory.read_cell(addr)?;
        self.memory.write_cell(addr, old.wrapping_sub(n))?;
        Ok(())
    }

    /// `src dst n --`
    pub fn memcpy(&mut self) -> Result<(), Error> {
        let n = self.data_stack.try_pop()?;
        let dst = self.data_stack.try_pop()?;
        let src = self.data_stack.try_pop()?;
        self.memory.copy(src, dst, n as usize)?;
        Ok(())
    }

    /// `src dst n --`, safe for overlapping regions.
    pub fn memmove(&mut self) -> Result<(), Error> {
        let n = self.data_stack.try_pop()?;
        let dst = self.data_stack.try_pop()?;
        let src = self.data_stack.try_pop()?;
        self.memory.move_bytes(src, dst, n as usize)?;
        Ok(())
    }

    // Registers

    fn push_addr(&mut self, addr: Cell) -> Result<(), Error> {
        self.data_stack.push(addr)?;
        Ok(())
    }

    pub fn here_addr(&mut self) -> Result<(), Error> {
        self.push_addr(map::HERE)
    }

    pub fn latest_addr(&mut self) -> Result<(), Error> {
        self.push_addr(map::LATEST)
    }

    pub fn state_addr(&mut self) -> Result<(), Error> {
        self.push_addr(map::STATE)
    }

    pub fn base_addr(&mut self) -> Result<(), Error> {
        self.push_addr(map::BASE)
    }

    // Output

    pub fn emit(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_pop()?;
        self.output.push_byte(val as u8)?;
        Ok(())
    }

    pub fn newline(&mut self) -> Result<(), Error> {
        self.output.push_byte(b'\n')?;
        Ok(())
    }

    pub fn pop_print(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_pop()?;
        let base = self.base()?;
        let mut buf = [0u8; 33];
        self.output.push_bstr(number::render(val, base, &mut buf))?;
        self.output.push_byte(b' ')?;
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use crate::{
        cell::{unsigned, Cell, TRUE},
        leakbox::{LBForth, LBForthParams},
        memory::{map, MemoryError},
        stack::StackError,
        testutil::{blocking_runtest, run_program, Token},
        Error, Forth,
    };

    fn vm() -> LBForth<()> {
        LBForth::from_params(LBForthParams::default(), (), &[])
    }

    /// Run `word` alone against `stack`.
    fn one(forth: &mut Forth<()>, word: &'static str, stack: &[Cell]) -> Vec<Cell> {
        run_program(forth, stack, &[Token::Word(word), Token::Word("EXIT")])
    }

    #[test]
    fn native_ids_are_unique_names() {
        let table = Forth::<()>::CORE_BUILTINS;
        for (i, a) in table.iter().enumerate() {
            assert!(
                table[i + 1..].iter().all(|b| b.name != a.name),
                "{} registered twice",
                a.name
            );
        }
    }

    #[test]
    fn stack_words() {
        let mut lbf = vm();
        let f = &mut lbf.forth;
        let cases: &[(&'static str, &[Cell], &[Cell])] = &[
            ("DROP", &[1, 2], &[1]),
            ("2DROP", &[1, 2, 3], &[1]),
            ("DUP", &[1, 2], &[1, 2, 2]),
            ("2DUP", &[1, 2], &[1, 2, 1, 2]),
            ("?DUP", &[1, 2], &[1, 2, 2]),
            ("?DUP", &[1, 0], &[1, 0]),
            ("SWAP", &[1, 2], &[2, 1]),
            ("2SWAP", &[1, 2, 3, 4], &[3, 4, 1, 2]),
            ("OVER", &[1, 2], &[1, 2, 1]),
            ("ROT", &[1, 2, 3], &[2, 3, 1]),
            ("-ROT", &[1, 2, 3], &[3, 1, 2]),
            ("NIP", &[1, 2], &[2]),
        ];
        for &(word, input, expect) in cases {
            assert_eq!(one(f, word, input), expect, "{word}");
        }
    }

    #[test]
    fn arithmetic_words() {
        let mut lbf = vm();
        let f = &mut lbf.forth;
        let cases: &[(&'static str, &[Cell], &[Cell])] = &[
            ("1+", &[7], &[8]),
            ("1-", &[7], &[6]),
            ("4+", &[7], &[11]),
            ("4-", &[7], &[3]),
            ("+", &[7, 2], &[9]),
            ("-", &[7, 2], &[5]),
            ("-", &[2, 7], &[unsigned(-5)]),
            ("*", &[7, 2], &[14]),
            ("*", &[unsigned(-3), 4], &[unsigned(-12)]),
            ("NEGATE", &[7], &[unsigned(-7)]),
            ("/", &[7, 2], &[3]),
            ("/", &[unsigned(-7), 2], &[unsigned(-3)]),
            ("MOD", &[7, 2], &[1]),
            ("MOD", &[unsigned(-7), 2], &[unsigned(-1)]),
            ("/MOD", &[7, 2], &[1, 3]),
            ("+", &[0xFFFF_FFFF, 1], &[0]),
            ("/", &[unsigned(i32::MIN), unsigned(-1)], &[unsigned(i32::MIN)]),
        ];
        for &(word, input, expect) in cases {
            assert_eq!(one(f, word, input), expect, "{word} {input:?}");
        }
    }

    #[test]
    fn comparison_words() {
        let mut lbf = vm();
        let f = &mut lbf.forth;
        let m1 = unsigned(-1);
        let cases: &[(&'static str, &[Cell], Cell)] = &[
            ("=", &[3, 3], TRUE),
            ("=", &[3, 4], 0),
            ("<>", &[3, 4], TRUE),
            ("<", &[m1, 0], TRUE),
            ("<", &[0, m1], 0),
            (">", &[4, 3], TRUE),
            ("<=", &[3, 3], TRUE),
            (">=", &[m1, 3], 0),
            ("0=", &[0], TRUE),
            ("0=", &[5], 0),
            ("0<>", &[5], TRUE),
            ("0<", &[m1], TRUE),
            ("0>", &[m1], 0),
            ("0<=", &[0], TRUE),
            ("0>=", &[m1], 0),
        ];
        for &(word, input, expect) in cases {
            assert_eq!(one(f, word, input), vec![expect], "{word} {input:?}");
        }
    }

    #[test]
    fn bitwise_words() {
        let mut lbf = vm();
        let f = &mut lbf.forth;
        assert_eq!(one(f, "AND", &[0b1100, 0b1010]), vec![0b1000]);
        assert_eq!(one(f, "OR", &[0b1100, 0b1010]), vec![0b1110]);
        assert_eq!(one(f, "XOR", &[0b1100, 0b1010]), vec![0b0110]);
        assert_eq!(one(f, "INVERT", &[0]), vec![TRUE]);
    }

    #[test]
    fn memory_words() {
        let mut lbf = vm();
        let f = &mut lbf.forth;
        let scratch = f.here().unwrap() + 64;

        assert_eq!(one(f, "!", &[0x1234_5678, scratch]), vec![]);
        assert_eq!(one(f, "@", &[scratch]), vec![0x1234_5678]);
        assert_eq!(one(f, "C@", &[scratch]), vec![0x78]);
        assert_eq!(one(f, "C!", &[0x1FF, scratch]), vec![]);
        assert_eq!(one(f, "@", &[scratch]), vec![0x1234_56FF]);
        assert_eq!(one(f, "+!", &[1, scratch]), vec![]);
        assert_eq!(one(f, "@", &[scratch]), vec![0x1234_5700]);
        assert_eq!(one(f, "-!", &[0x100, scratch]), vec![]);
        assert_eq!(one(f, "@", &[scratch]), vec![0x1234_5600]);

        f.memory.slice_mut(scratch, 6).unwrap().copy_from_slice(b"abcdef");
        assert_eq!(one(f, "MEMCPY", &[scratch, scratch + 8, 6]), vec![]);
        assert_eq!(f.memory.slice(scratch + 8, 6).unwrap(), b"abcdef");
        assert_eq!(one(f, "MEMMOVE", &[scratch, scratch + 2, 6]), vec![]);
        assert_eq!(f.memory.slice(scratch, 8).unwrap(), b"ababcdef");
    }

    #[test]
    fn register_words() {
        let mut lbf = vm();
        let f = &mut lbf.forth;
        assert_eq!(one(f, "HERE", &[]), vec![map::HERE]);
        assert_eq!(one(f, "LATEST", &[]), vec![map::LATEST]);
        assert_eq!(one(f, "STATE", &[]), vec![map::STATE]);
        assert_eq!(one(f, "BASE", &[]), vec![map::BASE]);
    }

    #[test]
    fn errors() {
        let mut lbf = vm();
        let f = &mut lbf.forth;

        f.fill("1 0 /").unwrap();
        assert_eq!(f.process_line(), Err(Error::DivideByZero));
        f.fill("1 +").unwrap();
        assert_eq!(
            f.process_line(),
            Err(Error::Stack(StackError::StackEmpty))
        );
        f.fill("$7FFFFFF0 @").unwrap();
        assert!(matches!(
            f.process_line(),
            Err(Error::Memory(MemoryError::OutOfBounds { .. }))
        ));
        assert!(f.data_stack.is_empty());
    }

    #[test]
    fn data_stack_overflow() {
        let params = LBForthParams {
            data_stack_elems: 2,
            ..LBForthParams::default()
        };
        let mut lbf = LBForth::from_params(params, (), &[]);
        let f = &mut lbf.forth;
        f.fill("1 2 3").unwrap();
        assert_eq!(f.process_line(), Err(Error::Stack(StackError::StackFull)));
        assert!(f.data_stack.is_empty());
    }

    #[test]
    fn output() {
        blocking_runtest(
            r#"
            > 42 EMIT NL
            < *
            > 1 2 + .
            < 3
            > -5 .
            < -5
            > 255 16 BASE ! . $a BASE !
            < ff
            > 1 . 2 . 3 .
            < 1 2 3
            "#,
        );
    }
}
