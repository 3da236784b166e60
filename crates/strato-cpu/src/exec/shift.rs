//! Shift and rotate group: SHL/SAL, SHR, SAR, ROL, ROR, in the by-1,
//! by-CL and by-imm8 forms.

use strato_decoder::{Encoding, Handler, Instr};
use strato_mmu::Mmu;
use strato_x86::Reg8;

use crate::addr::rm_operand;
use crate::alu;
use crate::state::CpuState;

use super::{read_op, unary_width, write_op, Exception, StepExit};

pub fn shift(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    use Encoding as E;
    let w = unary_width(ins.encoding);
    let count = match ins.encoding {
        E::rm8_1 | E::rm16_1 | E::rm32_1 => 1,
        E::rm8_CL | E::rm16_CL | E::rm32_CL => st.read8(Reg8::Cl) as u32,
        _ => ins.data.imm1 & 0xff,
    };

    let op = rm_operand(st, &ins.data);
    let a = read_op(st, mmu, op, w)?;

    let r = match ins.handler {
        Handler::Shl => alu::shl(st, a, count, w),
        Handler::Shr => alu::shr(st, a, count, w),
        Handler::Sar => alu::sar(st, a, count, w),
        Handler::Rol => alu::rol(st, a, count, w),
        Handler::Ror => alu::ror(st, a, count, w),
        _ => unreachable!(),
    };
    write_op(st, mmu, op, w, r)?;
    Ok(StepExit::Continue)
}
