//!
//! This is the driver of the Little Smalltalk virtual machine.
//!
#![warn(missing_docs)]

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use structopt::StructOpt;

use lst_memory::{MemoryParams, Oop};

use lst_interpreter::disassembler::disassemble_class;
use lst_interpreter::interpreter::{ExecutionOutcome, Interpreter};
use lst_interpreter::method::MethodBuilder;
use lst_interpreter::universe::Universe;

#[derive(Debug, Clone, PartialEq, StructOpt)]
#[structopt(about, author)]
struct Options {
    /// Image to load.
    #[structopt(default_value = "systemImage")]
    image: PathBuf,

    /// Build the kernel heap and write it to this image, instead of running.
    #[structopt(long)]
    bootstrap: Option<PathBuf>,

    /// Global name of the process to run.
    #[structopt(long, default_value = "systemProcess")]
    process: String,

    /// Number of instructions per time slice.
    #[structopt(long, default_value = "15000")]
    steps: i64,

    /// Snapshot the heap to this image after running.
    #[structopt(long)]
    save: Option<PathBuf>,

    /// Print memory and method cache statistics.
    #[structopt(long)]
    stats: bool,

    /// Disassemble the methods of the given class, instead of running.
    #[structopt(long, short)]
    disassemble: Option<String>,

    /// Enable verbose output.
    #[structopt(short = "v")]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let opts: Options = Options::from_args();

    let level = if opts.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut interpreter = Interpreter::new();
    interpreter.params.time_slice = opts.steps;

    if let Some(output) = opts.bootstrap.as_deref() {
        return bootstrap(&interpreter, output);
    }

    let file = File::open(&opts.image)
        .with_context(|| format!("could not open the image `{}`", opts.image.display()))?;
    let (mut universe, info) =
        Universe::from_image(&mut BufReader::new(file), MemoryParams::default())
            .with_context(|| format!("could not load the image `{}`", opts.image.display()))?;
    interpreter.check_image(&info);
    log::debug!(
        "loaded {} objects from `{}`",
        info.object_count,
        opts.image.display()
    );

    if let Some(class_name) = opts.disassemble.as_deref() {
        return disassemble(&universe, class_name);
    }

    let process = universe.global_symbol(&opts.process);
    if process.is_nil() || process.is_small_integer() {
        bail!("no process named `{}` in the image", opts.process);
    }
    let _process = universe.memory.guard(process);

    let outcome = interpreter.run_to_completion(&mut universe, process);
    match outcome {
        ExecutionOutcome::Finished => {
            let result = Interpreter::process_result(&universe, process);
            println!("{}", universe.describe(result));
        }
        outcome => log::warn!("process `{}` stopped: {:?}", opts.process, outcome),
    }

    if opts.stats {
        print!("{}", universe.memory.stats_string());
        println!(
            "Method cache: {} hits, {} misses",
            interpreter.cache.hits(),
            interpreter.cache.misses()
        );
    }

    if let Some(output) = opts.save.as_deref() {
        save_image(&mut universe, &interpreter, output)?;
    }

    if outcome == ExecutionOutcome::Finished {
        Ok(())
    } else {
        bail!("process `{}` did not finish", opts.process)
    }
}

/// Writes a kernel heap whose `systemProcess` answers `3 + 4`.
fn bootstrap(interpreter: &Interpreter, output: &Path) -> anyhow::Result<()> {
    let mut universe = Universe::bootstrap(MemoryParams::default());

    let mut builder = MethodBuilder::new(&mut universe, "doIt");
    builder
        .text("3 + 4")
        .push_integer(3)
        .push_integer(4)
        .send("+", 1)
        .stack_return();
    let method = builder.finish();

    let min_stack = interpreter.params.initial_stack_size;
    let process = universe.new_process(Oop::NIL, method, &[], min_stack);
    universe.set_global("systemProcess", process);

    save_image(&mut universe, interpreter, output)
}

fn save_image(universe: &mut Universe, interpreter: &Interpreter, output: &Path) -> anyhow::Result<()> {
    let file = File::create(output)
        .with_context(|| format!("could not create the image `{}`", output.display()))?;
    let mut writer = BufWriter::new(file);
    universe
        .write_image(&mut writer, &interpreter.primitive_table_ids())
        .with_context(|| format!("could not write the image `{}`", output.display()))?;
    writer
        .flush()
        .with_context(|| format!("could not write the image `{}`", output.display()))?;
    log::debug!(
        "wrote {} objects to `{}`",
        universe.memory.object_count(),
        output.display()
    );
    Ok(())
}

fn disassemble(universe: &Universe, class_name: &str) -> anyhow::Result<()> {
    let class = universe.global_symbol(class_name);
    if class.is_nil() || class.is_small_integer() {
        bail!("no class named `{}` in the image", class_name);
    }
    let metaclass = universe.memory.class_of(class);

    print!("{}", disassemble_class(universe, metaclass));
    print!("{}", disassemble_class(universe, class));
    Ok(())
}
