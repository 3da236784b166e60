//! Table-driven instruction decoder.
//!
//! `decode` walks the byte stream at the given EIP through the MMU's fetch
//! path in the order the architecture prescribes: legacy prefixes, the `0F`
//! escape, the primary opcode, an optional secondary opcode, ModR/M and SIB,
//! prefix-qualified redispatch, then displacement and immediates sized by
//! the final encoding kind. It never touches CPU state; the caller advances
//! EIP by [`Instr::size`].

use strato_mmu::{MemFault, Mmu};
use strato_x86::{
    disp_bits_16, disp_bits_32, modrm_mod, modrm_reg, modrm_rm, sib_base, SegReg, Width,
};
use thiserror::Error;

use crate::encoding::{Encoding, ImmSpec};
use crate::handler::Handler;
use crate::table::{is_prefix_byte, tables, OpcodeDesc};

/// Architectural limit on instruction length.
pub const MAX_INSTRUCTION_LEN: u32 = 15;

/// Everything a semantic routine needs about the decoded byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecData {
    /// Primary opcode byte (after any `0F` escape).
    pub opcode: u8,
    /// Whether the opcode came from the two-byte table.
    pub two_byte: bool,
    /// Secondary opcode byte, when one was consumed.
    pub secondary: u8,
    /// ModR/M.reg when the opcode is extension-disambiguated.
    pub ext: u8,
    pub modrm: u8,
    pub has_modrm: bool,
    pub sib: u8,
    pub has_sib: bool,
    /// Sign-extended displacement, or the absolute moffs address.
    pub disp: u32,
    pub imm1: u32,
    pub imm2: u32,
    pub oprsz: bool,
    pub adrsz: bool,
    pub lock: bool,
    pub repnz: bool,
    pub rep: bool,
    pub segment: Option<SegReg>,
    /// Last legacy prefix byte seen, for prefix-qualified redispatch.
    pub last_prefix: u8,
}

/// A fully decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub mnemonic: &'static str,
    pub encoding: Encoding,
    pub handler: Handler,
    /// EIP this instruction was decoded at.
    pub eip: u32,
    /// Total byte length; the caller advances EIP by this much.
    pub size: u32,
    pub data: ExecData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// An instruction byte could not be fetched.
    #[error("instruction fetch failed at 0x{eip:08x}: {fault}")]
    Fetch { eip: u32, fault: MemFault },
    /// The byte stream does not name a registered instruction.
    #[error("invalid opcode 0x{byte:02x} at 0x{eip:08x}")]
    InvalidOpcode { eip: u32, byte: u8 },
    /// More than 15 bytes of prefixes and operands.
    #[error("instruction exceeds {MAX_INSTRUCTION_LEN} bytes at 0x{eip:08x}")]
    TooLong { eip: u32 },
}

impl DecodeError {
    /// EIP of the instruction that failed to decode.
    pub fn eip(self) -> u32 {
        match self {
            DecodeError::Fetch { eip, .. }
            | DecodeError::InvalidOpcode { eip, .. }
            | DecodeError::TooLong { eip } => eip,
        }
    }

    /// The offending byte, when the failure names one.
    pub fn fail_byte(self) -> Option<u8> {
        match self {
            DecodeError::InvalidOpcode { byte, .. } => Some(byte),
            _ => None,
        }
    }
}

struct Cursor<'m> {
    mmu: &'m Mmu,
    start: u32,
    pos: u32,
}

impl<'m> Cursor<'m> {
    fn fetch(&mut self) -> Result<u8, DecodeError> {
        if self.pos.wrapping_sub(self.start) >= MAX_INSTRUCTION_LEN {
            return Err(DecodeError::TooLong { eip: self.start });
        }
        let b = self.peek()?;
        self.pos = self.pos.wrapping_add(1);
        Ok(b)
    }

    fn peek(&self) -> Result<u8, DecodeError> {
        self.mmu.fetch(self.pos).map_err(|fault| DecodeError::Fetch {
            eip: self.start,
            fault,
        })
    }

    fn advance(&mut self) {
        self.pos = self.pos.wrapping_add(1);
    }

    fn fetch16(&mut self) -> Result<u32, DecodeError> {
        let lo = self.fetch()? as u32;
        let hi = self.fetch()? as u32;
        Ok(lo | hi << 8)
    }

    fn fetch32(&mut self) -> Result<u32, DecodeError> {
        let lo = self.fetch16()?;
        let hi = self.fetch16()?;
        Ok(lo | hi << 16)
    }
}

/// Search a secondary table against the next byte, consuming it on a match.
fn select_secondary(
    cur: &mut Cursor<'_>,
    data: &mut ExecData,
    desc: &'static OpcodeDesc,
) -> Result<&'static OpcodeDesc, DecodeError> {
    if desc.secondary.is_empty() {
        return Ok(desc);
    }
    let b = cur.peek()?;
    match desc.secondary.iter().find(|d| d.opcode == b) {
        Some(sec) => {
            data.secondary = b;
            cur.advance();
            Ok(sec)
        }
        None => Ok(desc),
    }
}

/// Decode the instruction at `eip`, reading bytes through `mmu.fetch`.
pub fn decode(mmu: &Mmu, eip: u32) -> Result<Instr, DecodeError> {
    let t = tables();
    let mut cur = Cursor {
        mmu,
        start: eip,
        pos: eip,
    };
    let mut data = ExecData::default();

    // 1. Legacy prefixes.
    let mut byte = cur.fetch()?;
    while is_prefix_byte(byte) {
        match byte {
            0x66 => data.oprsz = true,
            0x67 => data.adrsz = true,
            0xf0 => data.lock = true,
            0xf2 => data.repnz = true,
            0xf3 => data.rep = true,
            seg => data.segment = SegReg::from_prefix(seg),
        }
        data.last_prefix = byte;
        byte = cur.fetch()?;
    }

    // 2. Two-byte escape.
    let table: &'static [OpcodeDesc; 256] = if byte == 0x0f {
        data.two_byte = true;
        byte = cur.fetch()?;
        &t.two
    } else {
        &t.one
    };

    // 3. Primary opcode.
    data.opcode = byte;
    let mut desc: &'static OpcodeDesc = &table[byte as usize];
    if desc.is_prefix {
        // Unreachable through the prefix loop, but a prefix slot is not an
        // instruction.
        return Err(DecodeError::InvalidOpcode { eip, byte });
    }

    // 4. Secondary opcode.
    desc = select_secondary(&mut cur, &mut data, desc)?;

    // 5. ModR/M, opcode extension, SIB.
    if desc.uses_rm {
        data.modrm = cur.fetch()?;
        data.has_modrm = true;

        if let Some(exts) = desc.extensions.as_ref() {
            let ext = modrm_reg(data.modrm);
            if exts[ext as usize].encoding != Encoding::None {
                desc = &exts[ext as usize];
                data.ext = ext;
            }
        }

        if modrm_mod(data.modrm) != 3 && modrm_rm(data.modrm) == 4 && !data.adrsz {
            data.sib = cur.fetch()?;
            data.has_sib = true;
        }
    }

    // 6. Prefix-qualified redispatch, then re-check for a secondary table.
    if data.last_prefix != 0 {
        if let Some((_, variant)) = desc.prefixed.iter().find(|(p, _)| *p == data.last_prefix) {
            desc = variant;
            desc = select_secondary(&mut cur, &mut data, desc)?;
        }
    }

    // 7. Operand-size selection.
    let encoding = if data.oprsz {
        desc.encoding16
    } else {
        desc.encoding
    };
    if encoding == Encoding::None {
        return Err(DecodeError::InvalidOpcode {
            eip,
            byte: data.opcode,
        });
    }

    // 8. Displacement.
    if data.has_modrm && modrm_mod(data.modrm) != 3 && encoding.has_rm_operand() {
        let mut bits = if data.adrsz {
            disp_bits_16(data.modrm)
        } else {
            disp_bits_32(data.modrm)
        };
        // SIB with base=101 and mod=0 means "disp32, no base".
        if data.has_sib && modrm_mod(data.modrm) == 0 && sib_base(data.sib) == 5 {
            bits = 32;
        }
        data.disp = match bits {
            8 => Width::W8.sign_extend(cur.fetch()? as u32),
            16 => Width::W16.sign_extend(cur.fetch16()?),
            32 => cur.fetch32()?,
            _ => 0,
        };
    }

    // 9. Immediates.
    match encoding.imm_spec() {
        ImmSpec::None => {}
        ImmSpec::Imm8 => data.imm1 = cur.fetch()? as u32,
        ImmSpec::Imm16 => data.imm1 = cur.fetch16()?,
        ImmSpec::Imm32 => data.imm1 = cur.fetch32()?,
        ImmSpec::Imm16Imm8 => {
            data.imm1 = cur.fetch16()?;
            data.imm2 = cur.fetch()? as u32;
        }
        ImmSpec::Far16 => {
            data.imm1 = cur.fetch16()?;
            data.imm2 = cur.fetch16()?;
        }
        ImmSpec::Far32 => {
            data.imm1 = cur.fetch32()?;
            data.imm2 = cur.fetch16()?;
        }
        ImmSpec::Moffs => {
            data.disp = if data.adrsz {
                cur.fetch16()?
            } else {
                cur.fetch32()?
            };
        }
    }

    Ok(Instr {
        mnemonic: desc.mnemonic,
        encoding,
        handler: desc.handler,
        eip,
        size: cur.pos.wrapping_sub(eip),
        data,
    })
}

/// Decode forward from `start` and return the address of the last
/// instruction that begins before `stop`. `None` when `stop` precedes
/// `start` or an instruction on the way fails to decode.
pub fn decode_until(mmu: &Mmu, start: u32, stop: u32) -> Option<u32> {
    if stop < start {
        return None;
    }
    let mut eip = start;
    let mut last = None;
    loop {
        let ins = decode(mmu, eip).ok()?;
        let next = eip.wrapping_add(ins.size);
        last = Some(eip);
        if next >= stop {
            return last;
        }
        eip = next;
    }
}
