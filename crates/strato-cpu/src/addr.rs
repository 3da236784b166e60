//! Effective-address computation for ModR/M memory operands.
//!
//! The decoder already consumed and sign-extended the displacement; here we
//! evaluate the base/index expression against live register state. The
//! same computation serves execution and call-target resolution.

use strato_decoder::ExecData;
use strato_x86::{modrm_mod, modrm_rm, sib_base, sib_index, sib_scale, Reg32};

use crate::state::CpuState;

/// A resolved ModR/M operand: a register encoding or a memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(u8),
    Mem(u32),
}

/// Resolve the r/m side of a ModR/M byte against the current registers.
pub fn rm_operand(st: &CpuState, data: &ExecData) -> Operand {
    if modrm_mod(data.modrm) == 3 {
        Operand::Reg(modrm_rm(data.modrm))
    } else {
        Operand::Mem(effective_address(st, data))
    }
}

/// Compute the effective address of a memory operand (`mod != 3`).
pub fn effective_address(st: &CpuState, data: &ExecData) -> u32 {
    if data.adrsz {
        ea16(st, data)
    } else {
        ea32(st, data)
    }
}

fn ea16(st: &CpuState, data: &ExecData) -> u32 {
    let m = modrm_mod(data.modrm);
    let rm = modrm_rm(data.modrm);
    let disp = data.disp;

    let base = match rm {
        0b000 => st.read16(Reg32::Ebx).wrapping_add(st.read16(Reg32::Esi)),
        0b001 => st.read16(Reg32::Ebx).wrapping_add(st.read16(Reg32::Edi)),
        0b010 => st.read16(Reg32::Ebp).wrapping_add(st.read16(Reg32::Esi)),
        0b011 => st.read16(Reg32::Ebp).wrapping_add(st.read16(Reg32::Edi)),
        0b100 => st.read16(Reg32::Esi),
        0b101 => st.read16(Reg32::Edi),
        0b110 if m == 0 => return disp & 0xffff,
        0b110 => st.read16(Reg32::Ebp),
        _ => st.read16(Reg32::Ebx),
    };

    (base.wrapping_add(disp as u16)) as u32
}

fn ea32(st: &CpuState, data: &ExecData) -> u32 {
    let m = modrm_mod(data.modrm);
    let rm = modrm_rm(data.modrm);
    let disp = data.disp;

    match rm {
        // Direct 32-bit address.
        0b101 if m == 0 => disp,
        // SIB follows.
        0b100 => sib_address(st, data),
        _ => {
            let base = st.read32(Reg32::from_encoding(rm));
            base.wrapping_add(disp)
        }
    }
}

fn sib_address(st: &CpuState, data: &ExecData) -> u32 {
    let m = modrm_mod(data.modrm);
    let scale = 1u32 << sib_scale(data.sib);
    let index_enc = sib_index(data.sib);
    let base_enc = sib_base(data.sib);

    // index = 100 means "no index".
    let index = if index_enc == 0b100 {
        0
    } else {
        st.read32(Reg32::from_encoding(index_enc)).wrapping_mul(scale)
    };

    // base = 101 with mod 0 means "no base, disp32 only".
    let base = if base_enc == 0b101 && m == 0 {
        0
    } else {
        st.read32(Reg32::from_encoding(base_enc))
    };

    base.wrapping_add(index).wrapping_add(data.disp)
}
