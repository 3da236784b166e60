//! Boolean families: AND, OR, XOR and TEST (AND that discards its result).

use strato_decoder::{Handler, Instr};
use strato_mmu::Mmu;

use crate::alu;
use crate::state::CpuState;

use super::{binary_operands, read_op, write_op, Exception, StepExit};

pub fn binary(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    let b = binary_operands(st, mmu, ins)?;
    let a = read_op(st, mmu, b.dst, b.w)?;

    let r = match ins.handler {
        Handler::And => alu::and(st, a, b.src, b.w),
        Handler::Or => alu::or(st, a, b.src, b.w),
        Handler::Xor => alu::xor(st, a, b.src, b.w),
        Handler::Test => {
            alu::and(st, a, b.src, b.w);
            return Ok(StepExit::Continue);
        }
        _ => unreachable!(),
    };
    write_op(st, mmu, b.dst, b.w, r)?;
    Ok(StepExit::Continue)
}
