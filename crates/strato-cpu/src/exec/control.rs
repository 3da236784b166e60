//! Control flow: CALL/RET in near and far forms, JMP, conditional
//! branches, SETcc/CMOVcc, and the LOOP/JCXZ family. CALL and RET also
//! drive the call-trace recorder.

use strato_decoder::{Encoding, Handler, Instr};
use strato_mmu::{MemFault, Mmu};
use strato_trace::CallTrace;
use strato_x86::{cond_holds, modrm_reg, Reg32, SegReg, Width};

use crate::addr::{effective_address, rm_operand, Operand};
use crate::state::CpuState;

use super::stack::{pop32, push32};
use super::{extent_scan, read_op, write_op, Exception, StepExit};

/// Relative branch target for the rela8/16/32 encodings. EIP has already
/// been advanced past the instruction.
fn relative_target(st: &CpuState, ins: &Instr) -> u32 {
    let off = match ins.encoding {
        Encoding::rela8 => Width::W8.sign_extend(ins.data.imm1),
        Encoding::rela16 => Width::W16.sign_extend(ins.data.imm1),
        _ => ins.data.imm1,
    };
    let target = st.eip.wrapping_add(off);
    if ins.encoding == Encoding::rela16 {
        target & 0xffff
    } else {
        target
    }
}

pub fn call(
    st: &mut CpuState,
    mmu: &mut Mmu,
    trace: &mut CallTrace,
    ins: &Instr,
) -> Result<StepExit, Exception> {
    use Encoding as E;
    let d = &ins.data;
    let ret = st.eip;

    let target = match ins.encoding {
        E::rela32 | E::rela16 => relative_target(st, ins),
        E::rm32 => read_op(st, mmu, rm_operand(st, d), Width::W32)?,
        E::rm16 => read_op(st, mmu, rm_operand(st, d), Width::W16)?,
        // Far forms carry (or point at) a selector:offset pair.
        E::ptr16_32 | E::ptr16_16 | E::m16_32 | E::m16_16 => {
            let (sel, off) = far_pointer(st, mmu, ins)?;
            let cs = st.sreg(SegReg::Cs) as u32;
            push32(st, mmu, cs)?;
            push32(st, mmu, ret)?;
            st.set_sreg(SegReg::Cs, sel);
            st.eip = off;
            trace.push(off, ret, st.read32(Reg32::Esp), extent_scan(mmu));
            return Ok(StepExit::Branch);
        }
        other => unreachable!("no call form for {other:?}"),
    };

    push32(st, mmu, ret)?;
    st.eip = target;
    trace.push(target, ret, st.read32(Reg32::Esp), extent_scan(mmu));
    Ok(StepExit::Branch)
}

pub fn ret(
    st: &mut CpuState,
    mmu: &mut Mmu,
    trace: &mut CallTrace,
    ins: &Instr,
) -> Result<StepExit, Exception> {
    let adjust = if ins.encoding == Encoding::imm16 {
        ins.data.imm1 & 0xffff
    } else {
        0
    };

    st.eip = pop32(st, mmu)?;
    if ins.handler == Handler::RetFar {
        let cs = pop32(st, mmu)?;
        st.set_sreg(SegReg::Cs, cs as u16);
    }
    let esp = st.read32(Reg32::Esp);
    st.write32(Reg32::Esp, esp.wrapping_add(adjust));

    trace.pop();
    Ok(StepExit::Branch)
}

pub fn jmp(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    use Encoding as E;
    let d = &ins.data;

    match ins.encoding {
        E::rela8 | E::rela16 | E::rela32 => st.eip = relative_target(st, ins),
        E::rm32 => st.eip = read_op(st, mmu, rm_operand(st, d), Width::W32)?,
        E::rm16 => st.eip = read_op(st, mmu, rm_operand(st, d), Width::W16)?,
        E::ptr16_32 | E::ptr16_16 | E::m16_32 | E::m16_16 => {
            let (sel, off) = far_pointer(st, mmu, ins)?;
            st.set_sreg(SegReg::Cs, sel);
            st.eip = off;
        }
        other => unreachable!("no jmp form for {other:?}"),
    }
    Ok(StepExit::Branch)
}

/// Selector and offset of a far target, either immediate (`9A`/`EA`) or
/// loaded through memory (`FF /3`, `FF /5`).
fn far_pointer(st: &CpuState, mmu: &Mmu, ins: &Instr) -> Result<(u16, u32), MemFault> {
    use Encoding as E;
    let d = &ins.data;
    Ok(match ins.encoding {
        E::ptr16_32 => (d.imm2 as u16, d.imm1),
        E::ptr16_16 => (d.imm2 as u16, d.imm1 & 0xffff),
        E::m16_32 => {
            let ea = effective_address(st, d);
            (mmu.read16(ea.wrapping_add(4))?, mmu.read32(ea)?)
        }
        E::m16_16 => {
            let ea = effective_address(st, d);
            (mmu.read16(ea.wrapping_add(2))?, mmu.read16(ea)? as u32)
        }
        _ => unreachable!(),
    })
}

pub fn jcc(st: &mut CpuState, ins: &Instr) -> Result<StepExit, Exception> {
    if cond_holds(ins.data.opcode & 0xf, st.eflags) {
        st.eip = relative_target(st, ins);
        Ok(StepExit::Branch)
    } else {
        Ok(StepExit::Continue)
    }
}

pub fn jcxz(st: &mut CpuState, ins: &Instr) -> Result<StepExit, Exception> {
    let count = if ins.data.adrsz {
        st.read16(Reg32::Ecx) as u32
    } else {
        st.read32(Reg32::Ecx)
    };
    if count == 0 {
        st.eip = relative_target(st, ins);
        Ok(StepExit::Branch)
    } else {
        Ok(StepExit::Continue)
    }
}

pub fn loopcc(st: &mut CpuState, ins: &Instr) -> Result<StepExit, Exception> {
    let count = if ins.data.adrsz {
        let c = st.read16(Reg32::Ecx).wrapping_sub(1);
        st.write16(Reg32::Ecx, c);
        c as u32
    } else {
        let c = st.read32(Reg32::Ecx).wrapping_sub(1);
        st.write32(Reg32::Ecx, c);
        c
    };

    let zf = st.flag(strato_x86::FLAG_ZF);
    let taken = count != 0
        && match ins.handler {
            Handler::Loope => zf,
            Handler::Loopne => !zf,
            _ => true,
        };

    if taken {
        st.eip = relative_target(st, ins);
        Ok(StepExit::Branch)
    } else {
        Ok(StepExit::Continue)
    }
}

pub fn setcc(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    let v = cond_holds(ins.data.opcode & 0xf, st.eflags) as u32;
    let op = rm_operand(st, &ins.data);
    write_op(st, mmu, op, Width::W8, v)?;
    Ok(StepExit::Continue)
}

pub fn cmovcc(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    let w = if ins.encoding == Encoding::r16_rm16 {
        Width::W16
    } else {
        Width::W32
    };
    // The source is read unconditionally, faults included.
    let src = read_op(st, mmu, rm_operand(st, &ins.data), w)?;
    if cond_holds(ins.data.opcode & 0xf, st.eflags) {
        st.write_gpr(modrm_reg(ins.data.modrm), w, src);
    }
    Ok(StepExit::Continue)
}

/// Resolve the effective target of a decoded CALL without executing it.
/// Mirrors the operand interpretation the CALL handler applies, for use by
/// disassembly and backtrace rendering.
pub fn find_call_target(st: &CpuState, mmu: &Mmu, ins: &Instr) -> Result<u32, MemFault> {
    use Encoding as E;
    let d = &ins.data;
    let next_eip = ins.eip.wrapping_add(ins.size);

    Ok(match ins.encoding {
        E::rela32 => next_eip.wrapping_add(d.imm1),
        E::rela16 => next_eip.wrapping_add(Width::W16.sign_extend(d.imm1)) & 0xffff,
        E::rm32 => match rm_operand(st, d) {
            Operand::Reg(enc) => st.read_gpr(enc, Width::W32),
            Operand::Mem(ea) => mmu.read32(ea)?,
        },
        E::rm16 => match rm_operand(st, d) {
            Operand::Reg(enc) => st.read_gpr(enc, Width::W16),
            Operand::Mem(ea) => mmu.read16(ea)? as u32,
        },
        E::ptr16_32 => d.imm1,
        E::ptr16_16 => d.imm1 & 0xffff,
        E::m16_32 => mmu.read32(effective_address(st, d))?,
        E::m16_16 => mmu.read16(effective_address(st, d))? as u32,
        _ => 0,
    })
}
