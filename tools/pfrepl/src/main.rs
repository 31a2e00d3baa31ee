use std::{
    io::{stdin, stdout, Write},
    path::PathBuf,
};

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use pixieforth::{
    leakbox::{LBForth, LBForthParams},
    Error, Forth,
};
use tracing::level_filters::LevelFilter;

/// Defines and runs a word printing `OK`, proving that the reader, compiler
/// and inner interpreter all work.
const BOOTSTRAP: &str = ": OK CHAR O EMIT CHAR K EMIT NL ; OK";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(flatten)]
    vm: VmSettings,

    /// a file of forth source to run, line by line, before the prompt.
    ///
    /// if this is not set, a small built-in program that prints `OK` is run.
    #[arg(short, long, env = "PIXIEFORTH_BOOTSTRAP")]
    bootstrap: Option<PathBuf>,

    /// a comma-separated list of `tracing` targets and levels to enable.
    ///
    /// for example, `warn,pixieforth=debug,pixieforth::vm=trace` will enable:
    ///
    /// - the `WARN` level globally (regardless of module path),
    /// - the `DEBUG` level for all modules in the `pixieforth` crate,
    /// - and the `TRACE` level for the inner interpreter.
    ///
    /// see <https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/targets/struct.Targets.html#filtering-with-targets>
    /// for more details on this syntax.
    #[arg(
        short,
        long = "trace",
        env = "PIXIEFORTH_TRACE",
        default_value_t = tracing_subscriber::filter::Targets::new().with_default(LevelFilter::WARN),
    )]
    trace_filter: tracing_subscriber::filter::Targets,
}

#[derive(Debug, Clone, clap::Args)]
#[command(next_help_heading = "VM Options")]
struct VmSettings {
    /// capacity of the data stack, in cells.
    #[arg(long, default_value_t = 1024)]
    data_stack: usize,

    /// how deeply colon words may nest.
    #[arg(long, default_value_t = 64)]
    call_stack: usize,

    /// size of the input buffer, and so the longest accepted line, in bytes.
    #[arg(long, default_value_t = 1024)]
    input_buf: usize,

    /// size of the output buffer, in bytes. Output is flushed after each line.
    #[arg(long, default_value_t = 4096)]
    output_buf: usize,

    /// size of the dictionary, in bytes.
    #[arg(long, default_value_t = 16 * 1024)]
    dict: usize,
}

impl From<VmSettings> for LBForthParams {
    fn from(settings: VmSettings) -> Self {
        Self {
            data_stack_elems: settings.data_stack,
            call_stack_elems: settings.call_stack,
            input_buf_elems: settings.input_buf,
            output_buf_elems: settings.output_buf,
            dict_buf_elems: settings.dict,
        }
    }
}

fn main() -> miette::Result<()> {
    use tracing_subscriber::prelude::*;

    let Args {
        vm,
        bootstrap,
        trace_filter,
    } = Args::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(trace_filter)
        .init();

    let bootstrap = match bootstrap {
        Some(path) => std::fs::read_to_string(&path)
            .into_diagnostic()
            .with_context(|| format!("failed to read bootstrap file {}", path.display()))?,
        None => BOOTSTRAP.to_string(),
    };

    let mut lbf = LBForth::from_params(vm.into(), (), &[]);
    let forth = &mut lbf.forth;
    tracing::debug!(memory = ?forth.memory_map(), "pixieforth ready");

    for line in bootstrap.lines() {
        run_line(forth, line)?;
    }

    let mut inp = String::new();
    loop {
        print!("> ");
        stdout().flush().into_diagnostic()?;
        let read = stdin()
            .read_line(&mut inp)
            .into_diagnostic()
            .context("failed to read from stdin")?;
        if read == 0 {
            println!();
            return Ok(());
        }
        run_line(forth, inp.trim_end_matches(&['\r', '\n'][..]))?;
        inp.clear();
    }
}

fn run_line(forth: &mut Forth<()>, line: &str) -> miette::Result<()> {
    let res = forth.fill(line).and_then(|()| forth.process_line());
    print!("{}", forth.output.as_str());
    match res {
        Ok(()) => println!("ok."),
        Err(e) => {
            println!();
            println!("Input failed. Error: {:?}", e);
            if e == Error::WordNotFound {
                if let Ok(word) = forth.last_word() {
                    println!("Unknown word: '{}'", String::from_utf8_lossy(word));
                }
            }
        }
    }
    forth.output.clear();
    stdout().flush().into_diagnostic()
}
