//! Arithmetic families: ADD/ADC/SUB/SBB/CMP, INC/DEC, NEG/NOT,
//! MUL/IMUL/DIV/IDIV and the sign-extension pair CBW/CWD.

use strato_decoder::{Encoding, Handler, Instr};
use strato_mmu::Mmu;
use strato_x86::{modrm_reg, Reg32, Reg8, Width, FLAG_CF, FLAG_OF};

use crate::addr::{rm_operand, Operand};
use crate::alu;
use crate::state::CpuState;

use super::{binary_operands, read_op, unary_width, write_op, Exception, StepExit};

pub fn binary(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    let b = binary_operands(st, mmu, ins)?;
    let a = read_op(st, mmu, b.dst, b.w)?;

    let r = match ins.handler {
        Handler::Add => alu::add(st, a, b.src, b.w),
        Handler::Adc => alu::adc(st, a, b.src, b.w),
        Handler::Sub => alu::sub(st, a, b.src, b.w),
        Handler::Sbb => alu::sbb(st, a, b.src, b.w),
        Handler::Cmp => {
            alu::sub(st, a, b.src, b.w);
            return Ok(StepExit::Continue);
        }
        _ => unreachable!(),
    };
    write_op(st, mmu, b.dst, b.w, r)?;
    Ok(StepExit::Continue)
}

pub fn incdec(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    let w = unary_width(ins.encoding);
    let op = match ins.encoding {
        // 40+r / 48+r carry the register in the opcode.
        Encoding::R32 | Encoding::R16 => Operand::Reg(ins.data.opcode & 7),
        _ => rm_operand(st, &ins.data),
    };

    let a = read_op(st, mmu, op, w)?;
    let r = if ins.handler == Handler::Inc {
        alu::inc(st, a, w)
    } else {
        alu::dec(st, a, w)
    };
    write_op(st, mmu, op, w, r)?;
    Ok(StepExit::Continue)
}

pub fn unary(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    let w = unary_width(ins.encoding);
    let op = rm_operand(st, &ins.data);
    let a = read_op(st, mmu, op, w)?;

    let r = match ins.handler {
        Handler::Neg => alu::neg(st, a, w),
        // NOT touches no flags.
        Handler::Not => !a & w.mask(),
        _ => unreachable!(),
    };
    write_op(st, mmu, op, w, r)?;
    Ok(StepExit::Continue)
}

pub fn multiply(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    use Encoding as E;
    let d = &ins.data;

    // Two- and three-operand IMUL forms: truncated signed product into a
    // register, CF/OF on signed overflow.
    match ins.encoding {
        E::r32_rm32 | E::r16_rm16 | E::r32_rm32_imm32 | E::r16_rm16_imm16 | E::r32_rm32_imm8
        | E::r16_rm16_imm8 => {
            let w = match ins.encoding {
                E::r16_rm16 | E::r16_rm16_imm16 | E::r16_rm16_imm8 => Width::W16,
                _ => Width::W32,
            };
            let rm = read_op(st, mmu, rm_operand(st, d), w)?;
            let other = match ins.encoding {
                E::r32_rm32 | E::r16_rm16 => st.read_gpr(modrm_reg(d.modrm), w),
                E::r32_rm32_imm32 => d.imm1,
                E::r16_rm16_imm16 => d.imm1 & 0xffff,
                _ => Width::W8.sign_extend(d.imm1),
            };

            let wide = (w.sign_extend(rm) as i32 as i64) * (w.sign_extend(other) as i32 as i64);
            let r = (wide as u32) & w.mask();
            let overflow = wide != w.sign_extend(r) as i32 as i64;
            st.set_flag(FLAG_CF, overflow);
            st.set_flag(FLAG_OF, overflow);
            st.write_gpr(modrm_reg(d.modrm), w, r);
            return Ok(StepExit::Continue);
        }
        _ => {}
    }

    // One-operand widening forms (F6/F7 /4 and /5).
    let w = unary_width(ins.encoding);
    let src = read_op(st, mmu, rm_operand(st, d), w)?;
    let signed = ins.handler == Handler::Imul;

    match w {
        Width::W8 => {
            let a = st.read8(Reg8::Al) as u32;
            let wide = if signed {
                (Width::W8.sign_extend(a) as i32 as i64 * Width::W8.sign_extend(src) as i32 as i64)
                    as u64
            } else {
                (a as u64) * (src as u64)
            };
            let r = wide as u16;
            st.write16(Reg32::Eax, r);
            let over = if signed {
                (r as i16 as i32) != (r as u8 as i8 as i32)
            } else {
                r >> 8 != 0
            };
            st.set_flag(FLAG_CF, over);
            st.set_flag(FLAG_OF, over);
        }
        Width::W16 => {
            let a = st.read16(Reg32::Eax) as u32;
            let wide = if signed {
                (a as u16 as i16 as i64 * src as u16 as i16 as i64) as u64
            } else {
                (a as u64) * (src as u64)
            };
            let r = wide as u32;
            st.write16(Reg32::Eax, r as u16);
            st.write16(Reg32::Edx, (r >> 16) as u16);
            let over = if signed {
                (r as i32) != (r as i16 as i32)
            } else {
                r >> 16 != 0
            };
            st.set_flag(FLAG_CF, over);
            st.set_flag(FLAG_OF, over);
        }
        Width::W32 => {
            let a = st.read32(Reg32::Eax);
            let wide = if signed {
                (a as i32 as i64 * src as i32 as i64) as u64
            } else {
                (a as u64) * (src as u64)
            };
            st.write32(Reg32::Eax, wide as u32);
            st.write32(Reg32::Edx, (wide >> 32) as u32);
            let over = if signed {
                (wide as i64) != (wide as u32 as i32 as i64)
            } else {
                wide >> 32 != 0
            };
            st.set_flag(FLAG_CF, over);
            st.set_flag(FLAG_OF, over);
        }
    }
    Ok(StepExit::Continue)
}

pub fn divide(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    let w = unary_width(ins.encoding);
    let src = read_op(st, mmu, rm_operand(st, &ins.data), w)?;
    let signed = ins.handler == Handler::Idiv;
    let fault = Exception::DivideError { eip: ins.eip };

    if src & w.mask() == 0 {
        return Err(fault);
    }

    match w {
        Width::W8 => {
            let dividend = st.read16(Reg32::Eax);
            if signed {
                let divisor = Width::W8.sign_extend(src) as i32;
                let q = dividend as i16 as i32 / divisor;
                let r = dividend as i16 as i32 % divisor;
                if q < i8::MIN as i32 || q > i8::MAX as i32 {
                    return Err(fault);
                }
                st.write8(Reg8::Al, q as u8);
                st.write8(Reg8::Ah, r as u8);
            } else {
                let q = dividend as u32 / (src & 0xff);
                let r = dividend as u32 % (src & 0xff);
                if q > 0xff {
                    return Err(fault);
                }
                st.write8(Reg8::Al, q as u8);
                st.write8(Reg8::Ah, r as u8);
            }
        }
        Width::W16 => {
            let dividend = ((st.read16(Reg32::Edx) as u32) << 16) | st.read16(Reg32::Eax) as u32;
            if signed {
                let q = dividend as i32 as i64 / (src as u16 as i16 as i64);
                let r = dividend as i32 as i64 % (src as u16 as i16 as i64);
                if q < i16::MIN as i64 || q > i16::MAX as i64 {
                    return Err(fault);
                }
                st.write16(Reg32::Eax, q as u16);
                st.write16(Reg32::Edx, r as u16);
            } else {
                let q = dividend / (src & 0xffff);
                let r = dividend % (src & 0xffff);
                if q > 0xffff {
                    return Err(fault);
                }
                st.write16(Reg32::Eax, q as u16);
                st.write16(Reg32::Edx, r as u16);
            }
        }
        Width::W32 => {
            let dividend = ((st.read32(Reg32::Edx) as u64) << 32) | st.read32(Reg32::Eax) as u64;
            if signed {
                let divisor = src as i32 as i64;
                // i64::MIN / -1 overflows the host too; that case is a
                // quotient-overflow fault either way.
                let q = (dividend as i64).checked_div(divisor).ok_or(fault)?;
                let r = (dividend as i64).checked_rem(divisor).ok_or(fault)?;
                if q < i32::MIN as i64 || q > i32::MAX as i64 {
                    return Err(fault);
                }
                st.write32(Reg32::Eax, q as u32);
                st.write32(Reg32::Edx, r as u32);
            } else {
                let q = dividend / src as u64;
                let r = dividend % src as u64;
                if q > u32::MAX as u64 {
                    return Err(fault);
                }
                st.write32(Reg32::Eax, q as u32);
                st.write32(Reg32::Edx, r as u32);
            }
        }
    }
    Ok(StepExit::Continue)
}

/// 98: CWDE (or CBW with the operand-size prefix).
pub fn cbw(st: &mut CpuState, ins: &Instr) -> Result<StepExit, Exception> {
    if ins.data.oprsz {
        let v = Width::W8.sign_extend(st.read8(Reg8::Al) as u32);
        st.write16(Reg32::Eax, v as u16);
    } else {
        let v = Width::W16.sign_extend(st.read16(Reg32::Eax) as u32);
        st.write32(Reg32::Eax, v);
    }
    Ok(StepExit::Continue)
}

/// 99: CDQ (or CWD with the operand-size prefix).
pub fn cwd(st: &mut CpuState, ins: &Instr) -> Result<StepExit, Exception> {
    if ins.data.oprsz {
        let fill = if st.read16(Reg32::Eax) & 0x8000 != 0 { 0xffff } else { 0 };
        st.write16(Reg32::Edx, fill);
    } else {
        let fill = if st.read32(Reg32::Eax) & 0x8000_0000 != 0 {
            0xffff_ffff
        } else {
            0
        };
        st.write32(Reg32::Edx, fill);
    }
    Ok(StepExit::Continue)
}
