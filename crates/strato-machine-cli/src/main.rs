//! `strato-machine <executable>`: load a 32-bit x86 Linux ELF executable
//! and interpret it until it halts, traps, or faults.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use strato_machine::{Machine, RunOutcome};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strato-machine", about = "userspace emulator for i386 Linux executables")]
struct Args {
    /// The ELF32 executable to emulate.
    executable: PathBuf,

    /// Print the guest backtrace after the run ends.
    #[arg(long)]
    backtrace: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match emulate(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn emulate(args: &Args) -> anyhow::Result<ExitCode> {
    let mut machine = Machine::load(&args.executable)
        .with_context(|| format!("loading {}", args.executable.display()))?;

    let outcome = machine.run();

    if args.backtrace {
        for (i, rec) in machine.backtrace().enumerate() {
            let name = rec.symbol.as_deref().unwrap_or("??");
            eprintln!(
                "#{i} {name}+0x{rel:x} (entered 0x{start:08x}, returns to 0x{ret:08x})",
                rel = rec.rel,
                start = rec.start,
                ret = rec.ret,
            );
        }
    }

    match outcome {
        RunOutcome::Halted | RunOutcome::Trap(_) => Ok(ExitCode::SUCCESS),
        RunOutcome::Fault(_) => {
            if let Some(line) = outcome.diagnostic() {
                eprintln!("emulator: {line}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
