//! LS-8 Emulator - CLI Entry Point
//!
//! Commands:
//! - `ls8-emu run <program>` - Run an `.ls8` or `.asm` file
//! - `ls8-emu debug <program>` - Interactive debugger
//! - `ls8-emu asm <source>` - Assemble to `.ls8`
//! - `ls8-emu disasm <program>` - Disassemble an `.ls8` file

use clap::{Parser, Subcommand};
use ls8::cpu::{trace_line, ManualClock};
use ls8::{assemble, load_program_file, Cpu};
use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ls8-emu")]
#[command(version)]
#[command(about = "An emulator for the LS-8, an 8-bit teaching computer")]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Log filter, e.g. `debug` or `ls8=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the .ls8 or .asm file to execute
        program: String,
        /// Stop after this many instructions
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Print a trace line before every instruction
        #[arg(short, long)]
        trace: bool,
        /// Never fire the timer interrupt
        #[arg(long)]
        no_timer: bool,
        /// Print the final machine state as JSON on stderr
        #[arg(long)]
        dump_state: bool,
    },
    /// Interactive debugger
    Debug {
        /// Path to the .ls8 or .asm file to debug
        program: String,
        /// Never fire the timer interrupt
        #[arg(long)]
        no_timer: bool,
    },
    /// Assemble source to .ls8
    Asm {
        /// Path to the source file
        source: String,
        /// Output .ls8 file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble an .ls8 file to readable text
    Disasm {
        /// Path to the .ls8 file
        program: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Commands::Run { program, max_cycles, trace, no_timer, dump_state } => {
            run_program(&program, max_cycles, trace, no_timer, dump_state);
        }
        Commands::Debug { program, no_timer } => {
            debug_program(&program, no_timer);
        }
        Commands::Asm { source, output } => {
            assemble_file(&source, output);
        }
        Commands::Disasm { program } => {
            disassemble_file(&program);
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print an error and exit with status 1.
fn fail(context: &str, e: impl Display) -> ! {
    eprintln!("❌ {}: {}", context, e);
    std::process::exit(1);
}

/// Load program bytes, assembling `.asm` sources on the fly.
fn load_bytes(path: &str) -> Vec<u8> {
    if path.ends_with(".asm") {
        let source = std::fs::read_to_string(path)
            .unwrap_or_else(|e| fail("Failed to read file", e));
        assemble(&source).unwrap_or_else(|e| fail("Assembly error", e))
    } else {
        load_program_file(path)
            .unwrap_or_else(|e| fail("Failed to load program", e))
            .bytes
    }
}

fn run_program(path: &str, max_cycles: Option<u64>, trace: bool, no_timer: bool, dump_state: bool) {
    let program = load_bytes(path);
    tracing::info!(path, bytes = program.len(), "loaded program");

    let mut cpu = if no_timer {
        Cpu::with_clock(ManualClock::new())
    } else {
        Cpu::new()
    };
    if let Err(e) = cpu.load_program(&program) {
        fail("Failed to load program", e);
    }

    let mut stdout = std::io::stdout().lock();
    let mut result = Ok(());

    while cpu.is_running() {
        if max_cycles.is_some_and(|max| cpu.cycles >= max) {
            break;
        }
        if trace {
            if let Err(e) = writeln!(stdout, "{}", trace_line(&cpu)) {
                fail("Failed to write output", e);
            }
        }

        let pc = cpu.regs.pc;
        let step = cpu.step();

        if let Err(e) = write_output(&mut stdout, &cpu.take_output()) {
            fail("Failed to write output", e);
        }

        if let Err(e) = step {
            result = Err((pc, e));
            break;
        }
    }
    drop(stdout);

    if dump_state {
        match serde_json::to_string_pretty(&cpu.snapshot()) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => eprintln!("❌ Failed to serialize state: {}", e),
        }
    }

    if let Err((pc, e)) = result {
        fail(&format!("CPU error at PC={:02X}", pc), e);
    }

    if cpu.is_running() {
        eprintln!("⚠️  Reached max cycles limit ({}).", cpu.cycles);
    }
    std::process::exit(0);
}

/// Write program output and flush it.
fn write_output(out: &mut impl Write, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}

#[cfg(feature = "tui")]
fn debug_program(path: &str, no_timer: bool) {
    let program = load_bytes(path);
    if program.len() > ls8::cpu::memory::MEMORY_SIZE {
        fail("Failed to load program", format!("{} bytes exceeds 256", program.len()));
    }

    if let Err(e) = ls8::run_debugger(program, !no_timer) {
        fail("Debugger error", e);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str, _no_timer: bool) {
    fail("Debugger unavailable", "built without the `tui` feature");
}

fn assemble_file(source_path: &str, output: Option<String>) {
    let out_path = output.unwrap_or_else(|| {
        Path::new(source_path).with_extension("ls8").display().to_string()
    });

    println!("📝 Assembling: {} → {}", source_path, out_path);

    let source = std::fs::read_to_string(source_path)
        .unwrap_or_else(|e| fail("Failed to read file", e));
    let bytes = assemble(&source).unwrap_or_else(|e| fail("Assembly error", e));

    println!("✓ Assembled {} bytes", bytes.len());

    if let Err(e) = ls8::save_program(&out_path, &bytes) {
        fail("Failed to save program", e);
    }

    println!("✓ Saved to {}", out_path);
}

fn disassemble_file(path: &str) {
    let program = load_program_file(path)
        .unwrap_or_else(|e| fail("Failed to load program", e));

    println!("{}", ls8::disassemble(&program.bytes));
}
