//! Wires the pieces into a runnable machine: ELF view → MMU image →
//! stack → CPU loop, with the symbol resolver and call-trace recorder
//! alongside.

use std::path::Path;

use strato_cpu::{CpuState, Exception, StepExit};
use strato_elf::{ElfImage, LoadError};
use strato_mmu::{MapError, Mmu};
use strato_symbols::{SymbolResolver, SymbolsError};
use strato_trace::{CallTrace, TraceRecord};
use strato_x86::Reg32;
use thiserror::Error;
use tracing::{debug, error, info};

/// Host-fatal problems while bringing the guest up.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("mapping executable: {0}")]
    Map(#[from] MapError),
    #[error(transparent)]
    Symbols(#[from] SymbolsError),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The guest executed HLT.
    Halted,
    /// The guest raised a software interrupt; no handler exists here.
    Trap(u8),
    /// The guest faulted; see [`RunOutcome::diagnostic`].
    Fault(Exception),
}

impl RunOutcome {
    pub fn is_fault(&self) -> bool {
        matches!(self, RunOutcome::Fault(_))
    }

    /// The user-facing line describing a fault, if this outcome is one.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            RunOutcome::Fault(Exception::Decode(e)) => {
                Some(format!("Invalid Instruction at 0x{:08x}", e.eip()))
            }
            RunOutcome::Fault(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

pub struct Machine {
    pub state: CpuState,
    pub mmu: Mmu,
    pub trace: CallTrace,
}

impl Machine {
    /// Load `path`, map its segments, build the stack, and point EIP at
    /// the entry point.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Machine, MachineError> {
        let path = path.as_ref();
        let image = ElfImage::open(path)?;

        let mut mmu = Mmu::new();
        mmu.map_loadable(&image)?;
        for seg in image.loadable() {
            debug!(
                vaddr = format_args!("0x{:08x}", seg.vaddr),
                memsz = seg.memsz,
                flags = ?seg.flags,
                "mapped segment"
            );
        }

        let sp = mmu.create_stack(image.exec_stack())?;

        let mut state = CpuState::new();
        state.write32(Reg32::Esp, sp);
        state.write32(Reg32::Ebp, sp);
        state.eip = image.entry_point();

        let resolver = SymbolResolver::load(path)?;
        info!(
            entry = format_args!("0x{:08x}", state.eip),
            symbols = resolver.len(),
            exec_stack = image.exec_stack(),
            "loaded {}",
            path.display()
        );

        Ok(Machine {
            state,
            mmu,
            trace: CallTrace::new(resolver),
        })
    }

    /// Execute one instruction.
    pub fn step(&mut self) -> Result<StepExit, Exception> {
        strato_cpu::step(&mut self.state, &mut self.mmu, &mut self.trace)
    }

    /// Run until the guest halts, traps, or faults.
    pub fn run(&mut self) -> RunOutcome {
        loop {
            match self.step() {
                Ok(StepExit::Continue) | Ok(StepExit::Branch) => {}
                Ok(StepExit::Halt) => {
                    info!(eip = format_args!("0x{:08x}", self.state.eip), "guest halted");
                    return RunOutcome::Halted;
                }
                Ok(StepExit::Trap(v)) => {
                    info!(vector = v, "guest trapped; no interrupt handling here");
                    return RunOutcome::Trap(v);
                }
                Err(e) => {
                    let outcome = RunOutcome::Fault(e);
                    error!("{}", outcome.diagnostic().unwrap_or_default());
                    return outcome;
                }
            }
        }
    }

    /// Live call-trace records, outermost first.
    pub fn backtrace(&self) -> impl Iterator<Item = &TraceRecord> {
        self.trace.iter()
    }
}
