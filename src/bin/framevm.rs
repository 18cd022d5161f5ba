use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use framevm::{
    bytecode::disassemble,
    logging,
    vm::{Runtime, Status},
    Compiler, CompilerOptions, RuntimeOptions,
};

#[derive(Debug, Parser)]
#[command(name = "framevm", version, about = "Compile and run frame bytecode", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compile a source file into a bytecode artifact
    Compile {
        input: PathBuf,
        output: PathBuf,
        /// Skip the adaptive optimization gate
        #[arg(long, alias = "no-help")]
        no_learning: bool,
        /// Skip folding, keeping the artifact executable
        #[arg(long)]
        no_fold: bool,
        /// Print size statistics
        #[arg(long)]
        stats: bool,
    },
    /// Execute a bytecode artifact
    Run {
        artifact: PathBuf,
        /// Fail on the first instruction error instead of restoring a checkpoint
        #[arg(long)]
        no_healing: bool,
        /// Print runtime statistics
        #[arg(long)]
        stats: bool,
        /// Stop once the program counter leaves START..=END
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        range: Option<Vec<u32>>,
        /// Print the disassembly before running
        #[arg(long)]
        disassemble: bool,
    },
    /// Describe the compiler and runtime
    Info,
}

fn main() -> ExitCode {
    logging::init();
    let args = CliArgs::parse();

    match dispatch(args.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Compile {
            input,
            output,
            no_learning,
            no_fold,
            stats,
        } => {
            let options = CompilerOptions {
                learning: !no_learning,
                folding: !no_fold,
                ..CompilerOptions::default()
            };
            compile(&input, &output, options, stats)
        }
        Commands::Run {
            artifact,
            no_healing,
            stats,
            range,
            disassemble,
        } => {
            let options = RuntimeOptions {
                self_healing: !no_healing,
                ..RuntimeOptions::default()
            };
            run(&artifact, options, stats, range.as_deref(), disassemble)
        }
        Commands::Info => {
            print_info();
            Ok(true)
        }
    }
}

fn compile(input: &Path, output: &Path, options: CompilerOptions, show_stats: bool) -> anyhow::Result<bool> {
    println!("Compiling: {} -> {}", input.display(), output.display());

    let mut compiler = Compiler::new(options);
    compiler.compile_file(input, output)?;
    println!("Compilation successful!");

    let stats = compiler.stats();
    println!("Original size: {} bytes", stats.original_size);
    println!("Compressed size: {} bytes", stats.compressed_size);
    println!("Compression ratio: {}x", stats.compression_ratio());

    if show_stats {
        let help = compiler.help();
        println!("Code reduction: {}%", (1.0 - 1.0 / stats.compression_ratio()) * 100.0);
        println!("Compilations: {}", help.compilation_count);
        println!("Learning rate: {}", help.learning_rate);
        println!("Adaptations: {}", help.history().len());
    }

    Ok(true)
}

fn run(
    artifact: &Path,
    options: RuntimeOptions,
    show_stats: bool,
    range: Option<&[u32]>,
    show_disassembly: bool,
) -> anyhow::Result<bool> {
    let bytecode = fs::read(artifact)
        .with_context(|| format!("could not open bytecode file {}", artifact.display()))?;

    if show_disassembly {
        for record in disassemble(&bytecode) {
            println!("{}", record);
        }
    }

    let mut runtime = Runtime::new(options);
    runtime.load(bytecode);
    if let Some(&[start, end]) = range {
        runtime.set_execution_range(start, end);
    }

    let status = runtime.execute();
    match &status {
        Status::Failed { pc, fault } => {
            eprintln!("Execution failed at PC: {} ({})", pc, fault);
        }
        _ => println!("Execution completed successfully"),
    }

    if show_stats {
        println!("Instructions executed: {}", runtime.instruction_count());
        println!("Execution time: {} us", runtime.execution_time_us());
        println!("Uptime: {}%", runtime.uptime_percentage());
    }

    Ok(status.is_success())
}

fn print_info() {
    println!("framevm {}", env!("CARGO_PKG_VERSION"));
    println!("Symbols: 0-9, a-b, c-z");
    println!("Compression: 4-byte window folding (lossy)");
    println!("Runtime: frame stack machine with checkpoint recovery");
}
