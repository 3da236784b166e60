//! Data movement: MOV in all its forms, MOVZX/MOVSX, LEA, XCHG, XLAT.

use strato_decoder::{Encoding, Instr};
use strato_mmu::Mmu;
use strato_x86::{modrm_mod, modrm_reg, Reg32, Reg8, SegReg, Width};

use crate::addr::{effective_address, rm_operand};
use crate::state::CpuState;

use super::{binary_operands, read_op, write_op, Exception, StepExit};

pub fn mov(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    use Encoding as E;
    let d = &ins.data;

    match ins.encoding {
        // Register-in-opcode immediates (B0+r / B8+r).
        E::R8_imm8 => st.write8(Reg8::from_encoding(d.opcode & 7), d.imm1 as u8),
        E::R16_imm16 => st.write16(Reg32::from_encoding(d.opcode & 7), d.imm1 as u16),
        E::R32_imm32 => st.write32(Reg32::from_encoding(d.opcode & 7), d.imm1),

        // Accumulator <-> absolute moffs (A0..A3); the decoder left the
        // address in `disp`.
        E::AL_moffs8 => {
            let v = mmu.read8(d.disp)?;
            st.write8(Reg8::Al, v);
        }
        E::AX_moffs16 => {
            let v = mmu.read16(d.disp)?;
            st.write16(Reg32::Eax, v);
        }
        E::eAX_moffs32 => {
            let v = mmu.read32(d.disp)?;
            st.write32(Reg32::Eax, v);
        }
        E::moffs8_AL => mmu.write8(d.disp, st.read8(Reg8::Al))?,
        E::moffs16_AX => mmu.write16(d.disp, st.read16(Reg32::Eax))?,
        E::moffs32_eAX => mmu.write32(d.disp, st.read32(Reg32::Eax))?,

        // Segment-register moves (8C/8E).
        E::rm16_sreg => {
            let s = SegReg::from_encoding(modrm_reg(d.modrm)).ok_or(Exception::Unimplemented {
                mnemonic: ins.mnemonic,
                opcode: d.opcode,
                eip: ins.eip,
            })?;
            let op = rm_operand(st, d);
            let v = st.sreg(s) as u32;
            write_op(st, mmu, op, Width::W16, v)?;
        }
        E::sreg_rm16 => {
            let s = SegReg::from_encoding(modrm_reg(d.modrm)).ok_or(Exception::Unimplemented {
                mnemonic: ins.mnemonic,
                opcode: d.opcode,
                eip: ins.eip,
            })?;
            let v = read_op(st, mmu, rm_operand(st, d), Width::W16)?;
            st.set_sreg(s, v as u16);
        }

        // Everything else is a plain two-operand transfer.
        _ => {
            let b = binary_operands(st, mmu, ins)?;
            write_op(st, mmu, b.dst, b.w, b.src)?;
        }
    }
    Ok(StepExit::Continue)
}

fn extend(st: &mut CpuState, mmu: &Mmu, ins: &Instr, sign: bool) -> Result<StepExit, Exception> {
    use Encoding as E;
    let d = &ins.data;
    let (src_w, dst_w) = match ins.encoding {
        E::r16_rm8 => (Width::W8, Width::W16),
        E::r32_rm8 => (Width::W8, Width::W32),
        E::r32_rm16 => (Width::W16, Width::W32),
        other => unreachable!("no extend form for {other:?}"),
    };

    let raw = read_op(st, mmu, rm_operand(st, d), src_w)?;
    let v = if sign { src_w.sign_extend(raw) } else { raw };
    st.write_gpr(modrm_reg(d.modrm), dst_w, v);
    Ok(StepExit::Continue)
}

pub fn movzx(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    extend(st, mmu, ins, false)
}

pub fn movsx(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    extend(st, mmu, ins, true)
}

pub fn lea(st: &mut CpuState, ins: &Instr) -> Result<StepExit, Exception> {
    let d = &ins.data;
    // LEA with a register operand has no defined meaning.
    if modrm_mod(d.modrm) == 3 {
        return Err(Exception::Unimplemented {
            mnemonic: ins.mnemonic,
            opcode: d.opcode,
            eip: ins.eip,
        });
    }
    let addr = effective_address(st, d);
    let w = if ins.encoding == Encoding::r16_m {
        Width::W16
    } else {
        Width::W32
    };
    st.write_gpr(modrm_reg(d.modrm), w, addr);
    Ok(StepExit::Continue)
}

pub fn xchg(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    use Encoding as E;
    let d = &ins.data;

    match ins.encoding {
        // 90+r forms swap with the accumulator.
        E::eAX_r32 => {
            let r = Reg32::from_encoding(d.opcode & 7);
            let a = st.read32(Reg32::Eax);
            st.write32(Reg32::Eax, st.read32(r));
            st.write32(r, a);
        }
        E::AX_r16 => {
            let r = Reg32::from_encoding(d.opcode & 7);
            let a = st.read16(Reg32::Eax);
            st.write16(Reg32::Eax, st.read16(r));
            st.write16(r, a);
        }
        _ => {
            let w = match ins.encoding {
                E::rm8_r8 => Width::W8,
                E::rm16_r16 => Width::W16,
                _ => Width::W32,
            };
            let reg = modrm_reg(d.modrm);
            let rm = rm_operand(st, d);
            let rm_val = read_op(st, mmu, rm, w)?;
            let reg_val = st.read_gpr(reg, w);
            write_op(st, mmu, rm, w, reg_val)?;
            st.write_gpr(reg, w, rm_val);
        }
    }
    Ok(StepExit::Continue)
}

pub fn xlat(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    let base = if ins.data.adrsz {
        st.read16(Reg32::Ebx) as u32
    } else {
        st.read32(Reg32::Ebx)
    };
    let v = mmu.read8(base.wrapping_add(st.read8(Reg8::Al) as u32))?;
    st.write8(Reg8::Al, v);
    Ok(StepExit::Continue)
}
