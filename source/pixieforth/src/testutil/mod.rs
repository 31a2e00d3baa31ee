//! # Test Utilities
//!
//! Helpers for running "ui tests", or executing forth code at test time.
//!
//! ## UI Tests
//!
//! Generally, forth code provided as a str will have one of the following things
//! for each line:
//!
//! * Configuration values for the VM, specified as "frontmatter comments".
//!   These must appear before any other non-comment lines. Currently accepted:
//!     * `( data_stack_elems USIZE )`
//!     * `( call_stack_elems USIZE )`
//!     * `( input_buf_elems USIZE )`
//!     * `( output_buf_elems USIZE )`
//!     * `( dict_buf_elems USIZE )`
//! * Comment lines. These are any lines just containing a `( ... )` style comment.
//! * Successful input lines, starting with `> ...`.
//! * Successful output lines, starting with `< ...`.
//!     * Any successful input line can have zero or more output lines
//!     * If *no* output lines are specified, ANY successful output is accepted/ignored.
//! * Unsuccessful input lines, starting with `x ...`.
//!     * This line is expected to make `process_line` return an `Err()`.
//!     * There is no way to specify which error yet
//!     * Unsuccessful input lines may not have any successful output
//!
//! ### Example
//!
//! This is a ui-test doctest. It needs the `use-std` feature, which building the
//! whole workspace enables.
//!
//! ```rust
//! # #[cfg(feature = "use-std")]
//! # pixieforth::testutil::blocking_runtest(r#"
//! ( specify VM settings with frontmatter )
//! ( data_stack_elems 1 )
//!
//! ( specify input with no output )
//! > : star 42 EMIT ;
//!
//! ( specify input and output )
//! > star NL
//! < *
//!
//! ( specify lines that cause errors )
//! x starb
//! x 1 2
//! # "#);
//! ```
//!
//! ## Token programs
//!
//! [`run_program`] runs a hand-assembled token sequence directly on the inner
//! interpreter, bypassing the outer interpreter entirely.

use crate::{
    cell::{Cell, CELL},
    dictionary::CodeField,
    leakbox::{LBForth, LBForthParams},
    Error, Forth,
};

/// Run the given forth ui test against a fresh VM with only the core words.
///
/// Does accept any/all/none of the frontmatter settings listed above.
pub fn blocking_runtest(contents: &str) {
    let tokd = tokenize(contents, true).unwrap();
    let mut forth = LBForth::from_params(tokd.settings, (), &[]);
    blocking_steps_with(tokd.steps.as_slice(), &mut forth.forth);
}

/// Run the given forth ui-test against the given forth vm.
///
/// Does not accept ui-tests with frontmatter configuration (will panic)
pub fn blocking_runtest_with<T: 'static>(forth: &mut Forth<T>, contents: &str) {
    let tokd = tokenize(contents, false).unwrap();
    blocking_steps_with(tokd.steps.as_slice(), forth);
}

/// One cell of a hand-assembled program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    /// The execution token of a dictionary word, looked up by name.
    Word(&'static str),
    /// `LIT` followed by the value.
    Lit(Cell),
    /// A bare cell, such as a branch offset.
    Raw(Cell),
}

/// Assemble `program` as an anonymous colon body just past `HERE`, run it on
/// top of `stack`, and return the resulting data stack, bottom first.
///
/// The data stack is emptied before and after; `HERE` is left untouched so
/// the program is overwritten by the next definition.
///
/// Panics if a word is unknown or the program fails.
pub fn run_program<T: 'static>(
    forth: &mut Forth<T>,
    stack: &[Cell],
    program: &[Token],
) -> Vec<Cell> {
    let lit = forth.core_xts().lit;
    let mut cells = vec![CodeField::Colon.encode()];
    for tok in program {
        match *tok {
            Token::Word(name) => {
                let xt = forth
                    .xt(name)
                    .unwrap()
                    .unwrap_or_else(|| panic!("no word named {name:?}"));
                cells.push(xt);
            }
            Token::Lit(val) => {
                cells.push(lit);
                cells.push(val);
            }
            Token::Raw(val) => cells.push(val),
        }
    }

    let start = forth.here().unwrap();
    for (i, cell) in cells.iter().enumerate() {
        forth
            .memory
            .write_cell(start + (i as Cell) * CELL, *cell)
            .unwrap();
    }

    forth.data_stack.clear();
    for val in stack {
        forth.data_stack.push(*val).unwrap();
    }
    forth.execute(start).unwrap();

    let res = forth.data_stack.as_slice().to_vec();
    forth.data_stack.clear();
    res
}

fn check_output(res: Result<(), Error>, outcome: &Outcome, output: &str) {
    #[cfg(not(miri))]
    println!("< {output}");
    match (res, outcome) {
        (Ok(()), Outcome::OkAnyOutput) => {}
        (Ok(()), Outcome::OkWithOutput(exp)) => {
            let act_lines = output.lines().collect::<Vec<&str>>();
            assert_eq!(act_lines.len(), exp.len());
            act_lines.iter().zip(exp.iter()).for_each(|(a, e)| {
                assert_eq!(a.trim_end(), e.trim_end());
            })
        }
        (Err(_e), Outcome::FatalError) => {}
        (res, exp) => {
            eprintln!("Error!");
            eprintln!("Expected: {exp:?}");
            eprintln!("Got: {res:?}");
            if res.is_ok() {
                eprintln!("Output:\n{}", output);
            }
            panic!();
        }
    }
}

// Runs the given steps against the given forth VM.
//
// Panics on any mismatch
fn blocking_steps_with<T: 'static>(steps: &[Step], forth: &mut Forth<T>) {
    for Step { input, output: outcome } in steps {
        #[cfg(not(miri))]
        println!("> {input}");
        forth.fill(input).unwrap();
        let res = forth.process_line();
        check_output(res, outcome, forth.output.as_str());
        forth.output.clear();
    }
}

#[derive(Debug)]
enum Outcome {
    OkAnyOutput,
    OkWithOutput(Vec<String>),
    FatalError,
}

#[derive(Debug)]
struct Step {
    input: String,
    output: Outcome,
}

#[derive(Default, Debug)]
struct Tokenized {
    settings: LBForthParams,
    steps: Vec<Step>,
}

fn tokenize(contents: &str, allow_frontmatter: bool) -> Result<Tokenized, ()> {
    let mut output = Tokenized::default();
    let mut frontmatter_done = !allow_frontmatter;

    for line in contents.lines() {
        let (tok, remain) = if let Some(t) = line.trim_start().split_once(' ') {
            t
        } else {
            continue;
        };

        match tok {
            ">" => {
                frontmatter_done = true;
                output.steps.push(Step {
                    input: remain.to_string(),
                    output: Outcome::OkAnyOutput,
                });
            }
            "<" => {
                frontmatter_done = true;
                let cur_step = output.steps.last_mut().ok_or(())?;
                let expected_out = remain.to_string();
                match &mut cur_step.output {
                    Outcome::OkAnyOutput => {
                        cur_step.output = Outcome::OkWithOutput(vec![expected_out]);
                    }
                    Outcome::OkWithOutput(o) => {
                        o.push(expected_out);
                    }
                    Outcome::FatalError => panic!("Fatal error can't set output"),
                }
            }
            "x" => {
                frontmatter_done = true;
                output.steps.push(Step {
                    input: remain.to_string(),
                    output: Outcome::FatalError,
                });
            }
            "(" => {
                let mut split = remain.split_whitespace();
                let setting = match split.next() {
                    Some("data_stack_elems") => &mut output.settings.data_stack_elems,
                    Some("call_stack_elems") => &mut output.settings.call_stack_elems,
                    Some("input_buf_elems") => &mut output.settings.input_buf_elems,
                    Some("output_buf_elems") => &mut output.settings.output_buf_elems,
                    Some("dict_buf_elems") => &mut output.settings.dict_buf_elems,
                    Some(_) => continue,
                    None => return Err(()),
                };
                assert!(!frontmatter_done, "Unexpected frontmatter settings!");
                *setting = split.next().ok_or(())?.parse::<usize>().map_err(drop)?;
                assert_eq!(Some(")"), split.next());
            }
            _ => {}
        }
    }

    Ok(output)
}
