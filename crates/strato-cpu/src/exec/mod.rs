//! The execution engine: per-opcode semantic routines and the step loop.
//!
//! `step` decodes at EIP, advances EIP past the instruction, then runs the
//! handler; branch handlers overwrite the advanced EIP. Memory goes through
//! the MMU's checked paths only, and every failure surfaces as an
//! [`Exception`] that stops the run loop with a diagnostic.

mod arith;
mod control;
mod data;
mod flagops;
mod logic;
mod shift;
mod stack;
mod string;

use strato_decoder::{decode, decode_until, DecodeError, Encoding, Handler, Instr};
use strato_mmu::{MemFault, Mmu};
use strato_trace::CallTrace;
use strato_x86::{modrm_reg, Width};
use thiserror::Error;

use crate::addr::{rm_operand, Operand};
use crate::state::CpuState;

pub use control::find_call_target;

/// Why `step` returned control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepExit {
    /// Ordinary instruction; EIP advanced sequentially.
    Continue,
    /// A control-transfer instruction set EIP itself.
    Branch,
    /// The guest executed HLT.
    Halt,
    /// The guest raised a software interrupt (INT/INT3/INTO).
    Trap(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Exception {
    #[error("{0}")]
    Mem(#[from] MemFault),
    #[error("{0}")]
    Decode(#[from] DecodeError),
    #[error("divide error at 0x{eip:08x}")]
    DivideError { eip: u32 },
    #[error("unreachable: instruction {mnemonic} (opcode 0x{opcode:02x}) at 0x{eip:08x} is not implemented")]
    Unimplemented {
        mnemonic: &'static str,
        opcode: u8,
        eip: u32,
    },
}

/// Execute one instruction.
pub fn step(st: &mut CpuState, mmu: &mut Mmu, trace: &mut CallTrace) -> Result<StepExit, Exception> {
    let ins = decode(mmu, st.eip)?;

    // Handlers observe the address of the next instruction; branch handlers
    // overwrite it.
    st.eip = st.eip.wrapping_add(ins.size);

    let exit = dispatch(st, mmu, trace, &ins)?;

    // Keep the top backtrace record's symbol+offset current.
    trace.current_eip_set(st.eip);
    Ok(exit)
}

fn dispatch(
    st: &mut CpuState,
    mmu: &mut Mmu,
    trace: &mut CallTrace,
    ins: &Instr,
) -> Result<StepExit, Exception> {
    match ins.handler {
        Handler::Mov => data::mov(st, mmu, ins),
        Handler::Movzx => data::movzx(st, mmu, ins),
        Handler::Movsx => data::movsx(st, mmu, ins),
        Handler::Lea => data::lea(st, ins),
        Handler::Xchg => data::xchg(st, mmu, ins),
        Handler::Xlat => data::xlat(st, mmu, ins),

        Handler::Add | Handler::Adc | Handler::Sub | Handler::Sbb | Handler::Cmp => {
            arith::binary(st, mmu, ins)
        }
        Handler::Inc | Handler::Dec => arith::incdec(st, mmu, ins),
        Handler::Neg | Handler::Not => arith::unary(st, mmu, ins),
        Handler::Mul | Handler::Imul => arith::multiply(st, mmu, ins),
        Handler::Div | Handler::Idiv => arith::divide(st, mmu, ins),
        Handler::Cbw => arith::cbw(st, ins),
        Handler::Cwd => arith::cwd(st, ins),

        Handler::And | Handler::Or | Handler::Xor | Handler::Test => logic::binary(st, mmu, ins),

        Handler::Shl | Handler::Shr | Handler::Sar | Handler::Rol | Handler::Ror => {
            shift::shift(st, mmu, ins)
        }

        Handler::Push => stack::push(st, mmu, ins),
        Handler::Pop => stack::pop(st, mmu, ins),
        Handler::PushSreg(s) => stack::push_sreg(st, mmu, s),
        Handler::PopSreg(s) => stack::pop_sreg(st, mmu, s),
        Handler::Pusha => stack::pusha(st, mmu),
        Handler::Popa => stack::popa(st, mmu),
        Handler::Pushf => stack::pushf(st, mmu),
        Handler::Popf => stack::popf(st, mmu),
        Handler::Leave => stack::leave(st, mmu),
        Handler::Enter => stack::enter(st, mmu, ins),

        Handler::Call | Handler::CallFar => control::call(st, mmu, trace, ins),
        Handler::Ret | Handler::RetFar => control::ret(st, mmu, trace, ins),
        Handler::Jmp | Handler::JmpFar => control::jmp(st, mmu, ins),
        Handler::Jcc => control::jcc(st, ins),
        Handler::Jcxz => control::jcxz(st, ins),
        Handler::Loop | Handler::Loope | Handler::Loopne => control::loopcc(st, ins),
        Handler::Setcc => control::setcc(st, mmu, ins),
        Handler::Cmovcc => control::cmovcc(st, mmu, ins),

        Handler::Movs | Handler::Stos | Handler::Lods | Handler::Scas | Handler::Cmps => {
            string::string_op(st, mmu, ins)
        }

        Handler::Sahf => flagops::sahf(st),
        Handler::Lahf => flagops::lahf(st),
        Handler::Clc => flagops::set(st, strato_x86::FLAG_CF, false),
        Handler::Stc => flagops::set(st, strato_x86::FLAG_CF, true),
        Handler::Cmc => flagops::cmc(st),
        Handler::Cld => flagops::set(st, strato_x86::FLAG_DF, false),
        Handler::Std => flagops::set(st, strato_x86::FLAG_DF, true),
        Handler::Cli => flagops::set(st, strato_x86::FLAG_IF, false),
        Handler::Sti => flagops::set(st, strato_x86::FLAG_IF, true),

        Handler::Hlt => Ok(StepExit::Halt),
        Handler::Int3 => Ok(StepExit::Trap(3)),
        Handler::Int => Ok(StepExit::Trap(ins.data.imm1 as u8)),
        Handler::Into => {
            if st.flag(strato_x86::FLAG_OF) {
                Ok(StepExit::Trap(4))
            } else {
                Ok(StepExit::Continue)
            }
        }

        Handler::Nop | Handler::Endbr => Ok(StepExit::Continue),

        Handler::Rcl | Handler::Rcr | Handler::Unimplemented => Err(Exception::Unimplemented {
            mnemonic: ins.mnemonic,
            opcode: ins.data.opcode,
            eip: ins.eip,
        }),
    }
}

/// Run the scan closure the tracer uses to refine symbol extents.
pub(crate) fn extent_scan(mmu: &Mmu) -> impl FnOnce(u32, u32) -> Option<u32> + '_ {
    move |start, stop| decode_until(mmu, start, stop)
}

// ── Operand plumbing shared by the handler modules ──

pub(crate) fn read_op(
    st: &CpuState,
    mmu: &Mmu,
    op: Operand,
    w: Width,
) -> Result<u32, MemFault> {
    match op {
        Operand::Reg(enc) => Ok(st.read_gpr(enc, w)),
        Operand::Mem(addr) => match w {
            Width::W8 => mmu.read8(addr).map(u32::from),
            Width::W16 => mmu.read16(addr).map(u32::from),
            Width::W32 => mmu.read32(addr),
        },
    }
}

pub(crate) fn write_op(
    st: &mut CpuState,
    mmu: &mut Mmu,
    op: Operand,
    w: Width,
    v: u32,
) -> Result<(), MemFault> {
    match op {
        Operand::Reg(enc) => {
            st.write_gpr(enc, w, v);
            Ok(())
        }
        Operand::Mem(addr) => match w {
            Width::W8 => mmu.write8(addr, v as u8),
            Width::W16 => mmu.write16(addr, v as u16),
            Width::W32 => mmu.write32(addr, v),
        },
    }
}

/// Destination, source value and width of a two-operand form.
pub(crate) struct Binary {
    pub dst: Operand,
    pub src: u32,
    pub w: Width,
}

/// Resolve the operands of the classic two-operand encodings. The source
/// is read eagerly; the destination is left unresolved so the caller can
/// read-modify-write it.
pub(crate) fn binary_operands(
    st: &CpuState,
    mmu: &Mmu,
    ins: &Instr,
) -> Result<Binary, MemFault> {
    use Encoding as E;
    let d = &ins.data;
    let reg = modrm_reg(d.modrm);

    let (dst, src, w) = match ins.encoding {
        E::rm8_r8 => (rm_operand(st, d), st.read_gpr(reg, Width::W8), Width::W8),
        E::rm16_r16 => (rm_operand(st, d), st.read_gpr(reg, Width::W16), Width::W16),
        E::rm32_r32 => (rm_operand(st, d), st.read_gpr(reg, Width::W32), Width::W32),
        E::r8_rm8 => {
            let src = read_op(st, mmu, rm_operand(st, d), Width::W8)?;
            (Operand::Reg(reg), src, Width::W8)
        }
        E::r16_rm16 => {
            let src = read_op(st, mmu, rm_operand(st, d), Width::W16)?;
            (Operand::Reg(reg), src, Width::W16)
        }
        E::r32_rm32 => {
            let src = read_op(st, mmu, rm_operand(st, d), Width::W32)?;
            (Operand::Reg(reg), src, Width::W32)
        }
        E::rm8_imm8 => (rm_operand(st, d), d.imm1 & 0xff, Width::W8),
        E::rm16_imm16 => (rm_operand(st, d), d.imm1 & 0xffff, Width::W16),
        E::rm32_imm32 => (rm_operand(st, d), d.imm1, Width::W32),
        // Group-1 short forms sign-extend their byte immediate.
        E::rm16_imm8 => (
            rm_operand(st, d),
            Width::W8.sign_extend(d.imm1) & 0xffff,
            Width::W16,
        ),
        E::rm32_imm8 => (rm_operand(st, d), Width::W8.sign_extend(d.imm1), Width::W32),
        E::AL_imm8 => (Operand::Reg(0), d.imm1 & 0xff, Width::W8),
        E::AX_imm16 => (Operand::Reg(0), d.imm1 & 0xffff, Width::W16),
        E::eAX_imm32 => (Operand::Reg(0), d.imm1, Width::W32),
        other => unreachable!("no two-operand form for {other:?}"),
    };

    Ok(Binary { dst, src, w })
}

/// Operand width of the single-r/m and register-in-opcode encodings.
pub(crate) fn unary_width(e: Encoding) -> Width {
    use Encoding as E;
    match e {
        E::rm8 | E::m8 | E::rm8_1 | E::rm8_CL | E::rm8_imm8 | E::R8_imm8 => Width::W8,
        E::rm16 | E::m16 | E::rm16_1 | E::rm16_CL | E::rm16_imm8 | E::rm16_imm16 | E::R16
        | E::R16_imm16 | E::AX_r16 | E::imm16 => Width::W16,
        _ => Width::W32,
    }
}
