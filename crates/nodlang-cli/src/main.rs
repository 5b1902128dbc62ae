//! nodlang command line tools.
//!
//! Provides the `nodlang` binary with subcommands to run, compile, step
//! through and reformat programs. Every subcommand goes through the same
//! [`Pipeline`] the library exposes.
//!
//! Exit codes: 0 = success, 1 = parse error, 2 = compile error,
//! 3 = runtime error, 4 = I/O error.

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::json;
use tracing::Level;

use nodlang::{Pipeline, PipelineConfig, PipelineError};
use nodlang_parser::ParserConfig;
use nodlang_vm::VmConfig;

const EXIT_IO: i32 = 4;

/// nodlang interpreter and tools.
#[derive(Parser)]
#[command(name = "nodlang", about = "nodlang interpreter and tools")]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run a program and print the value of its last statement.
    Run {
        #[command(flatten)]
        input: Input,

        /// Print every executed instruction.
        #[arg(long)]
        trace: bool,

        /// Instructions to execute before giving up.
        #[arg(long, default_value_t = VmConfig::default().max_steps)]
        max_steps: usize,
    },
    /// Print the bytecode listing of a program.
    Compile {
        #[command(flatten)]
        input: Input,
    },
    /// Step through a program one instruction at a time.
    Debug {
        #[command(flatten)]
        input: Input,

        /// Instructions to execute before giving up.
        #[arg(long, default_value_t = VmConfig::default().max_steps)]
        max_steps: usize,
    },
    /// Parse a program and write it back out.
    Fmt {
        #[command(flatten)]
        input: Input,
    },
}

/// Where the program comes from and how to report on it.
#[derive(Args)]
struct Input {
    /// Source file to read.
    #[arg(conflicts_with = "eval", required_unless_present = "eval")]
    file: Option<PathBuf>,

    /// Program text given inline.
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,

    /// Reject undeclared variables and unknown functions while parsing.
    #[arg(long)]
    strict: bool,

    /// Print results and diagnostics as JSON.
    #[arg(long)]
    json: bool,
}

impl Input {
    fn read(&self) -> Result<String, String> {
        match (&self.eval, &self.file) {
            (Some(source), _) => Ok(source.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read '{}': {}", path.display(), e)),
            (None, None) => Err("no input: pass a file or -e <source>".into()),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Run {
            input,
            trace,
            max_steps,
        } => run_program(&input, trace, max_steps),
        Commands::Compile { input } => run_compile(&input),
        Commands::Debug { input, max_steps } => run_debug(&input, max_steps),
        Commands::Fmt { input } => run_fmt(&input),
    };
    process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Reads the input and parses it into a fresh pipeline.
fn load(input: &Input, vm: VmConfig) -> Result<Pipeline, i32> {
    let source = input.read().map_err(|msg| {
        eprintln!("Error: {}", msg);
        EXIT_IO
    })?;
    let config = PipelineConfig {
        parser: ParserConfig {
            strict: input.strict,
        },
        vm,
    };
    let mut pipeline = Pipeline::new(config).map_err(|e| {
        eprintln!("Error: failed to build the standard language: {}", e);
        EXIT_IO
    })?;
    pipeline.parse(&source).map_err(|e| report(input, &e))?;
    Ok(pipeline)
}

/// Prints a stage failure and returns its exit code.
fn report(input: &Input, err: &PipelineError) -> i32 {
    if input.json {
        let text = serde_json::to_string_pretty(&json!({ "error": err }))
            .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize error: {}\"}}", e));
        println!("{}", text);
    } else {
        eprintln!("Error: {}", err);
    }
    err.exit_code()
}

/// Execute the run subcommand.
fn run_program(input: &Input, trace: bool, max_steps: usize) -> i32 {
    let vm = VmConfig {
        trace_enabled: trace,
        max_steps,
    };
    let mut pipeline = match load(input, vm) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let outcome = pipeline.run();
    let steps = pipeline.trace().unwrap_or_default();
    if input.json {
        if let Err(err) = &outcome {
            return report(input, err);
        }
        let text = serde_json::to_string_pretty(&json!({
            "result": pipeline.last_value(),
            "trace": steps,
        }))
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
        println!("{}", text);
        return 0;
    }

    for entry in steps {
        println!("{:04}: {:<48} rax = {}", entry.eip, entry.instruction, entry.rax);
    }
    match outcome {
        Ok(_) => {
            match pipeline.last_value() {
                Some(value) => println!("{}", value),
                None => println!("{}", pipeline.vm().get_last_result()),
            }
            0
        }
        Err(err) => report(input, &err),
    }
}

/// Execute the compile subcommand.
fn run_compile(input: &Input) -> i32 {
    let pipeline = match load(input, VmConfig::default()) {
        Ok(p) => p,
        Err(code) => return code,
    };
    match pipeline.compile() {
        Ok(code) => {
            if input.json {
                let listing: Vec<String> = code.instructions().iter().map(ToString::to_string).collect();
                let text = serde_json::to_string_pretty(&json!({ "instructions": listing }))
                    .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize listing: {}\"}}", e));
                println!("{}", text);
            } else {
                print!("{}", code);
            }
            0
        }
        Err(err) => report(input, &err),
    }
}

/// Execute the debug subcommand: one line per step, with the node the
/// machine will evaluate next.
fn run_debug(input: &Input, max_steps: usize) -> i32 {
    let vm = VmConfig {
        trace_enabled: false,
        max_steps,
    };
    let mut pipeline = match load(input, vm) {
        Ok(p) => p,
        Err(code) => return code,
    };
    if let Err(err) = pipeline.debug() {
        return report(input, &err);
    }

    loop {
        let eip = pipeline.vm().eip();
        let text = pipeline
            .vm()
            .code()
            .and_then(|c| c.get(eip))
            .map(ToString::to_string)
            .unwrap_or_default();
        match pipeline.step() {
            Ok(running) => {
                let next = pipeline
                    .next_node()
                    .map_or_else(|| "-".to_string(), |n| n.to_string());
                println!("{:04}: {:<48} next = {}", eip, text, next);
                if !running {
                    break;
                }
            }
            Err(err) => return report(input, &err),
        }
    }
    if let Some(value) = pipeline.last_value() {
        println!("{}", value);
    }
    0
}

/// Execute the fmt subcommand.
fn run_fmt(input: &Input) -> i32 {
    match load(input, VmConfig::default()) {
        Ok(pipeline) => {
            print!("{}", pipeline.serialize());
            0
        }
        Err(code) => code,
    }
}
