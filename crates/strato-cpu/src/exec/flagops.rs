//! Direct EFLAGS manipulation: SAHF/LAHF and the set/clear instructions.

use strato_x86::{Reg8, FLAGS_FIXED, FLAG_AF, FLAG_CF, FLAG_PF, FLAG_SF, FLAG_ZF};

use crate::state::CpuState;

use super::{Exception, StepExit};

const LOW_FLAGS: u32 = FLAG_SF | FLAG_ZF | FLAG_AF | FLAG_PF | FLAG_CF;

pub fn sahf(st: &mut CpuState) -> Result<StepExit, Exception> {
    let ah = st.read8(Reg8::Ah) as u32;
    st.eflags = (st.eflags & !LOW_FLAGS) | (ah & LOW_FLAGS) | FLAGS_FIXED;
    Ok(StepExit::Continue)
}

pub fn lahf(st: &mut CpuState) -> Result<StepExit, Exception> {
    let low = (st.eflags & LOW_FLAGS) | FLAGS_FIXED;
    st.write8(Reg8::Ah, low as u8);
    Ok(StepExit::Continue)
}

pub fn set(st: &mut CpuState, mask: u32, on: bool) -> Result<StepExit, Exception> {
    st.set_flag(mask, on);
    Ok(StepExit::Continue)
}

pub fn cmc(st: &mut CpuState) -> Result<StepExit, Exception> {
    let cf = st.flag(FLAG_CF);
    st.set_flag(FLAG_CF, !cf);
    Ok(StepExit::Continue)
}
