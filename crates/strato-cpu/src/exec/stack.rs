//! Stack family: PUSH/POP of registers, memory, immediates and segment
//! registers, the all-register forms, flag pushes, and ENTER/LEAVE.
//!
//! ESP moves by the operand size, with one architectural exception the
//! original hardware defines: a segment-register push writes two bytes but
//! still moves ESP by four.

use strato_decoder::{Encoding, Instr};
use strato_mmu::{MemFault, Mmu};
use strato_x86::{Reg32, SegReg, Width, FLAGS_FIXED};

use crate::addr::rm_operand;
use crate::state::CpuState;

use super::{read_op, write_op, Exception, StepExit};

/// Flags POPF is allowed to assign.
const POPF_MASK: u32 = 0x0fd5;

pub(crate) fn push32(st: &mut CpuState, mmu: &mut Mmu, v: u32) -> Result<(), MemFault> {
    let esp = st.read32(Reg32::Esp).wrapping_sub(4);
    mmu.write32(esp, v)?;
    st.write32(Reg32::Esp, esp);
    Ok(())
}

pub(crate) fn pop32(st: &mut CpuState, mmu: &Mmu) -> Result<u32, MemFault> {
    let esp = st.read32(Reg32::Esp);
    let v = mmu.read32(esp)?;
    st.write32(Reg32::Esp, esp.wrapping_add(4));
    Ok(v)
}

fn push16(st: &mut CpuState, mmu: &mut Mmu, v: u16) -> Result<(), MemFault> {
    let esp = st.read32(Reg32::Esp).wrapping_sub(2);
    mmu.write16(esp, v)?;
    st.write32(Reg32::Esp, esp);
    Ok(())
}

fn pop16(st: &mut CpuState, mmu: &Mmu) -> Result<u16, MemFault> {
    let esp = st.read32(Reg32::Esp);
    let v = mmu.read16(esp)?;
    st.write32(Reg32::Esp, esp.wrapping_add(2));
    Ok(v)
}

pub fn push(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    use Encoding as E;
    let d = &ins.data;

    let (v, w) = match ins.encoding {
        E::R32 => (st.read32(Reg32::from_encoding(d.opcode & 7)), Width::W32),
        E::R16 => (st.read16(Reg32::from_encoding(d.opcode & 7)) as u32, Width::W16),
        E::rm32 => (read_op(st, mmu, rm_operand(st, d), Width::W32)?, Width::W32),
        E::rm16 => (read_op(st, mmu, rm_operand(st, d), Width::W16)?, Width::W16),
        E::imm32 => (d.imm1, Width::W32),
        E::imm16 => (d.imm1, Width::W16),
        // PUSH imm8 sign-extends to the operand size.
        E::imm8 if d.oprsz => (Width::W8.sign_extend(d.imm1), Width::W16),
        E::imm8 => (Width::W8.sign_extend(d.imm1), Width::W32),
        other => unreachable!("no push form for {other:?}"),
    };

    match w {
        Width::W16 => push16(st, mmu, v as u16)?,
        _ => push32(st, mmu, v)?,
    }
    Ok(StepExit::Continue)
}

pub fn pop(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    use Encoding as E;
    let d = &ins.data;

    match ins.encoding {
        E::R32 => {
            let v = pop32(st, mmu)?;
            st.write32(Reg32::from_encoding(d.opcode & 7), v);
        }
        E::R16 => {
            let v = pop16(st, mmu)?;
            st.write16(Reg32::from_encoding(d.opcode & 7), v);
        }
        E::rm32 => {
            let op = rm_operand(st, d);
            let v = pop32(st, mmu)?;
            write_op(st, mmu, op, Width::W32, v)?;
        }
        E::rm16 => {
            let op = rm_operand(st, d);
            let v = pop16(st, mmu)?;
            write_op(st, mmu, op, Width::W16, v as u32)?;
        }
        other => unreachable!("no pop form for {other:?}"),
    }
    Ok(StepExit::Continue)
}

/// Segment-register push: a 2-byte store with a 4-byte ESP adjustment.
pub fn push_sreg(st: &mut CpuState, mmu: &mut Mmu, s: SegReg) -> Result<StepExit, Exception> {
    let esp = st.read32(Reg32::Esp).wrapping_sub(4);
    mmu.write16(esp, st.sreg(s))?;
    st.write32(Reg32::Esp, esp);
    Ok(StepExit::Continue)
}

pub fn pop_sreg(st: &mut CpuState, mmu: &mut Mmu, s: SegReg) -> Result<StepExit, Exception> {
    let esp = st.read32(Reg32::Esp);
    let v = mmu.read16(esp)?;
    st.set_sreg(s, v);
    st.write32(Reg32::Esp, esp.wrapping_add(4));
    Ok(StepExit::Continue)
}

pub fn pusha(st: &mut CpuState, mmu: &mut Mmu) -> Result<StepExit, Exception> {
    let orig_esp = st.read32(Reg32::Esp);
    for r in [
        Reg32::Eax,
        Reg32::Ecx,
        Reg32::Edx,
        Reg32::Ebx,
        Reg32::Esp,
        Reg32::Ebp,
        Reg32::Esi,
        Reg32::Edi,
    ] {
        let v = if r == Reg32::Esp { orig_esp } else { st.read32(r) };
        push32(st, mmu, v)?;
    }
    Ok(StepExit::Continue)
}

pub fn popa(st: &mut CpuState, mmu: &mut Mmu) -> Result<StepExit, Exception> {
    for r in [
        Reg32::Edi,
        Reg32::Esi,
        Reg32::Ebp,
        Reg32::Esp, // skipped: the popped value is discarded
        Reg32::Ebx,
        Reg32::Edx,
        Reg32::Ecx,
        Reg32::Eax,
    ] {
        let v = pop32(st, mmu)?;
        if r != Reg32::Esp {
            st.write32(r, v);
        }
    }
    Ok(StepExit::Continue)
}

pub fn pushf(st: &mut CpuState, mmu: &mut Mmu) -> Result<StepExit, Exception> {
    let flags = st.eflags | FLAGS_FIXED;
    push32(st, mmu, flags)?;
    Ok(StepExit::Continue)
}

pub fn popf(st: &mut CpuState, mmu: &mut Mmu) -> Result<StepExit, Exception> {
    let v = pop32(st, mmu)?;
    st.eflags = (v & POPF_MASK) | FLAGS_FIXED;
    Ok(StepExit::Continue)
}

pub fn leave(st: &mut CpuState, mmu: &mut Mmu) -> Result<StepExit, Exception> {
    st.write32(Reg32::Esp, st.read32(Reg32::Ebp));
    let v = pop32(st, mmu)?;
    st.write32(Reg32::Ebp, v);
    Ok(StepExit::Continue)
}

pub fn enter(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    let frame_size = ins.data.imm1 & 0xffff;
    let level = ins.data.imm2 & 0x1f;
    // Nested frames never show up in the code this emulator targets.
    if level != 0 {
        return Err(Exception::Unimplemented {
            mnemonic: ins.mnemonic,
            opcode: ins.data.opcode,
            eip: ins.eip,
        });
    }

    let bp = st.read32(Reg32::Ebp);
    push32(st, mmu, bp)?;
    let frame = st.read32(Reg32::Esp);
    st.write32(Reg32::Ebp, frame);
    st.write32(Reg32::Esp, frame.wrapping_sub(frame_size));
    Ok(StepExit::Continue)
}
