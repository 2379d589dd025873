//! LC-3 VM - CLI Entry Point
//!
//! Commands:
//! - `lc3-vm run <image>...` - Run object images until HALT
//! - `lc3-vm debug <image>...` - Interactive debugger
//! - `lc3-vm disasm <image>` - Disassemble an object image

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use lc3::{Cpu, CpuError, Image, TerminalConsole};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing::{error, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

/// Exit status after the user interrupts a running program.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "lc3-vm")]
#[command(version)]
#[command(about = "A virtual machine for the LC-3 educational computer")]
struct Cli {
    /// Increase the level of verbosity. Can be used multiple times.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Use JSON output for log messages
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Object images to load, in order
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Start address (default: origin of the first image)
        #[arg(long, value_parser = parse_address)]
        origin: Option<u16>,
        /// Stop after this many instructions
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Log every executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Write the final machine state as JSON
        #[arg(long, value_name = "PATH")]
        dump_state: Option<PathBuf>,
    },
    /// Step through a program in the interactive debugger
    Debug {
        /// Object images to load, in order
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Start address (default: origin of the first image)
        #[arg(long, value_parser = parse_address)]
        origin: Option<u16>,
    },
    /// Disassemble an object image
    Disasm {
        /// Path to the object image
        image: PathBuf,
    },
}

impl Cli {
    fn log_filter(&self) -> &'static str {
        let trace = matches!(self.command, Commands::Run { trace: true, .. });
        match (self.verbose, trace) {
            (0, false) => "warn",
            (0, true) => "warn,lc3::cpu::execute=trace",
            (1, false) => "lc3=debug,lc3_vm=debug,warn",
            (1, true) => "lc3=debug,lc3_vm=debug,lc3::cpu::execute=trace,warn",
            (2, _) => "lc3=trace,lc3_vm=trace,info",
            (3..=u8::MAX, _) => "trace",
        }
    }

    fn filter_layer(&self) -> EnvFilter {
        // Parse log level from env, or infer from args
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.log_filter()))
    }
}

/// Stderr writer that keeps log lines aligned while the terminal is in raw
/// mode, where a bare line feed does not return the carriage.
struct LogWriter {
    crlf: bool,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut stderr = io::stderr().lock();
        if !self.crlf {
            return stderr.write(buf);
        }
        for chunk in buf.split_inclusive(|&b| b == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(line) => {
                    stderr.write_all(line)?;
                    stderr.write_all(b"\r\n")?;
                }
                None => stderr.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn main() {
    let cli = Cli::parse();

    // Setup the tracing formatter for logging and instrumentation
    let registry = tracing_subscriber::registry().with(cli.filter_layer());
    let crlf = io::stderr().is_terminal();
    let make_writer = move || LogWriter { crlf };

    if cli.json {
        let json_layer = tracing_subscriber::fmt::layer().json().with_writer(make_writer);
        registry.with(json_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .without_time()
            .with_ansi(crlf)
            .with_target(false)
            .with_writer(make_writer);
        registry.with(fmt_layer).init();
    }

    let result = match cli.command {
        Commands::Run { images, origin, max_cycles, trace: _, dump_state } => {
            run_program(&images, origin, max_cycles, dump_state.as_deref())
        }
        Commands::Debug { images, origin } => debug_program(&images, origin),
        Commands::Disasm { image } => disassemble_file(&image),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        exit(1);
    }
}

/// Parse an address written as decimal, `0x3000` or `x3000`.
fn parse_address(s: &str) -> Result<u16, String> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .or_else(|| s.strip_prefix('x'))
        .or_else(|| s.strip_prefix('X'));
    let parsed = match hex {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid address {:?}: {}", s, e))
}

/// Load every image into a fresh CPU and set the start address.
fn prepare_cpu(paths: &[PathBuf], origin: Option<u16>) -> anyhow::Result<Cpu> {
    let mut cpu = Cpu::new();
    let mut first_origin = None;

    for path in paths {
        let image = lc3::load_image(path)?;
        image
            .load_into(&mut cpu.mem)
            .with_context(|| format!("failed to load {}", path.display()))?;
        info!(path = %path.display(), origin = %lc3::program::disasm::hex(image.origin), words = image.len(), "loaded");
        first_origin.get_or_insert(image.origin);
    }

    let Some(start) = origin.or(first_origin) else {
        bail!("no images to load");
    };
    cpu.regs.jump(start);
    Ok(cpu)
}

/// How a console run ended.
enum RunOutcome {
    Halted,
    Interrupted,
    CycleLimit(u64),
    Failed(CpuError),
}

fn drive(cpu: &mut Cpu, console: &mut TerminalConsole, max_cycles: Option<u64>) -> RunOutcome {
    use lc3::Console;

    loop {
        if console.interrupted() {
            return RunOutcome::Interrupted;
        }
        if let Some(max) = max_cycles {
            if cpu.cycles >= max {
                return RunOutcome::CycleLimit(max);
            }
        }

        match cpu.step(console) {
            Ok(_) if cpu.is_halted() => return RunOutcome::Halted,
            Ok(_) => {}
            Err(e) if e.is_interrupt() => return RunOutcome::Interrupted,
            Err(e) => return RunOutcome::Failed(e),
        }
    }
}

fn run_program(
    paths: &[PathBuf],
    origin: Option<u16>,
    max_cycles: Option<u64>,
    dump_state: Option<&Path>,
) -> anyhow::Result<()> {
    let mut cpu = prepare_cpu(paths, origin)?;
    info!(pc = %lc3::program::disasm::hex(cpu.regs.pc), "starting execution");

    let outcome = {
        let mut console = TerminalConsole::new().context("failed to put the terminal in raw mode")?;
        drive(&mut cpu, &mut console, max_cycles)
        // Terminal restored here
    };

    info!(cycles = cpu.cycles, state = ?cpu.state, "execution finished");

    if let Some(path) = dump_state {
        write_snapshot(&cpu, path)?;
    }

    match outcome {
        RunOutcome::Halted => Ok(()),
        RunOutcome::CycleLimit(max) => {
            warn!("reached max cycles limit ({}), stopping", max);
            Ok(())
        }
        RunOutcome::Interrupted => {
            warn!("interrupted");
            exit(EXIT_INTERRUPTED);
        }
        RunOutcome::Failed(CpuError::Decode(e)) => {
            // Malformed programs are unrecoverable.
            error!(pc = %lc3::program::disasm::hex(cpu.regs.pc.wrapping_sub(1)), "fatal: {}", e);
            std::process::abort();
        }
        RunOutcome::Failed(e) => Err(e.into()),
    }
}

fn write_snapshot(cpu: &Cpu, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(io::BufWriter::new(file), &cpu.snapshot())
        .with_context(|| format!("failed to write state to {}", path.display()))?;
    info!(path = %path.display(), "wrote machine state");
    Ok(())
}

fn debug_program(paths: &[PathBuf], origin: Option<u16>) -> anyhow::Result<()> {
    let cpu = prepare_cpu(paths, origin)?;
    lc3::run_debugger(cpu).context("debugger error")
}

fn disassemble_file(path: &Path) -> anyhow::Result<()> {
    let image: Image = lc3::load_image(path)?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(lc3::disassemble(&image).as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_forms() {
        assert_eq!(parse_address("0x3000"), Ok(0x3000));
        assert_eq!(parse_address("x3000"), Ok(0x3000));
        assert_eq!(parse_address("XFE00"), Ok(0xFE00));
        assert_eq!(parse_address("12288"), Ok(0x3000));
        assert!(parse_address("x10000").is_err());
        assert!(parse_address("start").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from(["lc3-vm", "-v", "run", "a.obj", "b.obj", "--origin", "x4000", "--trace"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(cli.log_filter().contains("lc3::cpu::execute=trace"));
        match cli.command {
            Commands::Run { images, origin, trace, .. } => {
                assert_eq!(images.len(), 2);
                assert_eq!(origin, Some(0x4000));
                assert!(trace);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_requires_image() {
        assert!(Cli::try_parse_from(["lc3-vm", "run"]).is_err());
    }
}
