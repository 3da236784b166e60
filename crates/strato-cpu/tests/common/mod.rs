//! Harness: a code page, a stack, and an empty-resolver call trace.

use strato_cpu::{CpuState, StepExit};
use strato_mmu::{MapFlags, Mmu, Prot};
use strato_symbols::SymbolResolver;
use strato_trace::CallTrace;
use strato_x86::Reg32;

pub const CODE_BASE: u32 = 0x0804_8000;
pub const DATA_BASE: u32 = 0x0804_a000;

pub struct Harness {
    pub st: CpuState,
    pub mmu: Mmu,
    pub trace: CallTrace,
}

/// Minimal ELF file so the resolver loads with an empty index.
fn empty_resolver() -> SymbolResolver {
    use std::io::Write;
    let mut out = vec![0x7f, b'E', b'L', b'F', 1, 1, 1, 0];
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&[2, 0, 3, 0]);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&[0u8; 28]);

    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    f.write_all(&out).expect("write");
    SymbolResolver::load(f.path()).expect("resolver")
}

pub fn setup(code: &[u8]) -> Harness {
    let mut mmu = Mmu::new();
    mmu.map(
        CODE_BASE,
        0x1000,
        Prot::READ | Prot::WRITE | Prot::EXEC,
        MapFlags::empty(),
        None,
    )
    .expect("map code");
    mmu.map(DATA_BASE, 0x1000, Prot::READ | Prot::WRITE, MapFlags::empty(), None)
        .expect("map data");
    for (i, b) in code.iter().enumerate() {
        mmu.write8(CODE_BASE + i as u32, *b).expect("load code");
    }
    let sp = mmu.create_stack(false).expect("stack");

    let mut st = CpuState::new();
    st.eip = CODE_BASE;
    st.write32(Reg32::Esp, sp);
    st.write32(Reg32::Ebp, sp);

    Harness {
        st,
        mmu,
        trace: CallTrace::new(empty_resolver()),
    }
}

impl Harness {
    /// Step `n` instructions, requiring each to complete without faulting.
    pub fn exec_steps(&mut self, n: usize) {
        for i in 0..n {
            let exit = strato_cpu::step(&mut self.st, &mut self.mmu, &mut self.trace)
                .unwrap_or_else(|e| panic!("step {i}: {e}"));
            assert!(
                matches!(exit, StepExit::Continue | StepExit::Branch),
                "step {i}: unexpected exit {exit:?}"
            );
        }
    }

    pub fn step(&mut self) -> Result<StepExit, strato_cpu::Exception> {
        strato_cpu::step(&mut self.st, &mut self.mmu, &mut self.trace)
    }
}
