//! String operations MOVS/STOS/LODS/SCAS/CMPS with their REP/REPE/REPNE
//! prefixes. A repeated instruction runs to completion here; with a single
//! emulated thread there is nothing to interleave with.

use strato_decoder::{Handler, Instr};
use strato_mmu::Mmu;
use strato_x86::{Reg32, Width, FLAG_DF, FLAG_ZF};

use crate::alu;
use crate::state::CpuState;

use super::{Exception, StepExit};

/// Operand width of a string opcode: even opcodes are byte-sized, odd ones
/// follow the operand size.
fn width(ins: &Instr) -> Width {
    if ins.data.opcode & 1 == 0 {
        Width::W8
    } else if ins.data.oprsz {
        Width::W16
    } else {
        Width::W32
    }
}

struct Cursors {
    adrsz: bool,
}

impl Cursors {
    fn read_reg(&self, st: &CpuState, r: Reg32) -> u32 {
        if self.adrsz {
            st.read16(r) as u32
        } else {
            st.read32(r)
        }
    }

    fn write_reg(&self, st: &mut CpuState, r: Reg32, v: u32) {
        if self.adrsz {
            st.write16(r, v as u16);
        } else {
            st.write32(r, v);
        }
    }

    fn advance(&self, st: &mut CpuState, r: Reg32, step: u32) {
        let v = self.read_reg(st, r);
        let v = if st.flag(FLAG_DF) {
            v.wrapping_sub(step)
        } else {
            v.wrapping_add(step)
        };
        self.write_reg(st, r, v);
    }
}

fn read_mem(mmu: &Mmu, addr: u32, w: Width) -> Result<u32, Exception> {
    Ok(match w {
        Width::W8 => mmu.read8(addr)? as u32,
        Width::W16 => mmu.read16(addr)? as u32,
        Width::W32 => mmu.read32(addr)?,
    })
}

fn write_mem(mmu: &mut Mmu, addr: u32, w: Width, v: u32) -> Result<(), Exception> {
    match w {
        Width::W8 => mmu.write8(addr, v as u8)?,
        Width::W16 => mmu.write16(addr, v as u16)?,
        Width::W32 => mmu.write32(addr, v)?,
    }
    Ok(())
}

pub fn string_op(st: &mut CpuState, mmu: &mut Mmu, ins: &Instr) -> Result<StepExit, Exception> {
    let w = width(ins);
    let step = w.bytes();
    let cur = Cursors {
        adrsz: ins.data.adrsz,
    };
    let repeated = ins.data.rep || ins.data.repnz;

    loop {
        if repeated && cur.read_reg(st, Reg32::Ecx) == 0 {
            break;
        }

        // One element.
        let mut compared = false;
        match ins.handler {
            Handler::Movs => {
                let v = read_mem(mmu, cur.read_reg(st, Reg32::Esi), w)?;
                write_mem(mmu, cur.read_reg(st, Reg32::Edi), w, v)?;
                cur.advance(st, Reg32::Esi, step);
                cur.advance(st, Reg32::Edi, step);
            }
            Handler::Stos => {
                let v = st.read_gpr(0, w); // AL/AX/EAX
                write_mem(mmu, cur.read_reg(st, Reg32::Edi), w, v)?;
                cur.advance(st, Reg32::Edi, step);
            }
            Handler::Lods => {
                let v = read_mem(mmu, cur.read_reg(st, Reg32::Esi), w)?;
                st.write_gpr(0, w, v);
                cur.advance(st, Reg32::Esi, step);
            }
            Handler::Scas => {
                let v = read_mem(mmu, cur.read_reg(st, Reg32::Edi), w)?;
                let acc = st.read_gpr(0, w);
                alu::sub(st, acc, v, w);
                cur.advance(st, Reg32::Edi, step);
                compared = true;
            }
            Handler::Cmps => {
                let a = read_mem(mmu, cur.read_reg(st, Reg32::Esi), w)?;
                let b = read_mem(mmu, cur.read_reg(st, Reg32::Edi), w)?;
                alu::sub(st, a, b, w);
                cur.advance(st, Reg32::Esi, step);
                cur.advance(st, Reg32::Edi, step);
                compared = true;
            }
            _ => unreachable!(),
        }

        if !repeated {
            break;
        }
        let c = cur.read_reg(st, Reg32::Ecx).wrapping_sub(1);
        cur.write_reg(st, Reg32::Ecx, c);

        // REPE/REPNE terminate on the comparison result.
        if compared {
            let zf = st.flag(FLAG_ZF);
            if ins.data.rep && !zf {
                break;
            }
            if ins.data.repnz && zf {
                break;
            }
        }
        if c == 0 {
            break;
        }
    }

    Ok(StepExit::Continue)
}
