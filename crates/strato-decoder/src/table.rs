//! The opcode descriptor tables.
//!
//! Two 256-entry tables (one-byte and `0F`-prefixed), built once on first
//! use. A descriptor may carry sub-tables: an 8-slot extension array keyed
//! on ModR/M.reg, a secondary-opcode table keyed on the byte after the
//! primary, and prefix-qualified variants keyed on the last legacy prefix.
//! All sub-tables are owned by the static tables, so there is nothing to
//! tear down.

use std::sync::OnceLock;

use strato_x86::SegReg;

use crate::encoding::Encoding;
use crate::handler::Handler;

use Encoding as E;
use Handler as H;

#[derive(Debug, Clone)]
pub struct OpcodeDesc {
    /// The byte this descriptor was registered under (primary or secondary).
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub encoding: Encoding,
    /// Encoding selected when the operand-size prefix is present.
    pub encoding16: Encoding,
    pub uses_rm: bool,
    pub is_prefix: bool,
    pub handler: Handler,
    /// Distinct instructions sharing this primary, keyed on ModR/M.reg.
    pub extensions: Option<Box<[OpcodeDesc; 8]>>,
    /// Prefix-qualified variants: `(last_prefix_byte, descriptor)`.
    pub prefixed: Vec<(u8, OpcodeDesc)>,
    /// Secondary-opcode table searched against the byte after the primary.
    pub secondary: Vec<OpcodeDesc>,
}

impl OpcodeDesc {
    fn unregistered(opcode: u8) -> OpcodeDesc {
        OpcodeDesc {
            opcode,
            mnemonic: "(bad)",
            encoding: Encoding::None,
            encoding16: Encoding::None,
            uses_rm: false,
            is_prefix: false,
            handler: Handler::Unimplemented,
            extensions: None,
            prefixed: Vec::new(),
            secondary: Vec::new(),
        }
    }

    fn entry(
        opcode: u8,
        mnemonic: &'static str,
        encoding: Encoding,
        encoding16: Encoding,
        uses_rm: bool,
        handler: Handler,
    ) -> OpcodeDesc {
        OpcodeDesc {
            opcode,
            mnemonic,
            encoding,
            encoding16,
            uses_rm,
            is_prefix: false,
            handler,
            extensions: None,
            prefixed: Vec::new(),
            secondary: Vec::new(),
        }
    }
}

pub struct OpcodeTables {
    pub one: Box<[OpcodeDesc; 256]>,
    pub two: Box<[OpcodeDesc; 256]>,
}

static TABLES: OnceLock<OpcodeTables> = OnceLock::new();

/// The shared descriptor tables, built on first use.
pub fn tables() -> &'static OpcodeTables {
    TABLES.get_or_init(build)
}

/// Bytes the decoder treats as legacy prefixes.
pub fn is_prefix_byte(b: u8) -> bool {
    matches!(
        b,
        0xf0 | 0xf2 | 0xf3 | 0x26 | 0x2e | 0x36 | 0x3e | 0x64 | 0x65 | 0x66 | 0x67
    )
}

fn fresh_table() -> Vec<OpcodeDesc> {
    (0..=255u8).map(OpcodeDesc::unregistered).collect()
}

struct Builder {
    one: Vec<OpcodeDesc>,
    two: Vec<OpcodeDesc>,
}

impl Builder {
    fn new() -> Builder {
        Builder {
            one: fresh_table(),
            two: fresh_table(),
        }
    }

    fn finish(self) -> OpcodeTables {
        OpcodeTables {
            one: self.one.try_into().map_err(|_| ()).unwrap(),
            two: self.two.try_into().map_err(|_| ()).unwrap(),
        }
    }

    // One-byte table.

    fn op(&mut self, opc: u8, name: &'static str, e: Encoding, e16: Encoding, rm: bool, h: Handler) {
        self.one[opc as usize] = OpcodeDesc::entry(opc, name, e, e16, rm, h);
    }

    fn prefix(&mut self, opc: u8, name: &'static str) {
        let d = &mut self.one[opc as usize];
        d.mnemonic = name;
        d.is_prefix = true;
    }

    fn op_ext(&mut self, opc: u8, ext: u8, name: &'static str, e: Encoding, e16: Encoding, h: Handler) {
        ext_slot(&mut self.one, opc, ext, name, e, e16, h);
    }

    fn op_sec(&mut self, opc: u8, sec: u8, name: &'static str, e: Encoding, e16: Encoding, rm: bool, h: Handler) {
        self.one[opc as usize]
            .secondary
            .push(OpcodeDesc::entry(sec, name, e, e16, rm, h));
    }

    // Two-byte (0F) table.

    fn op2(&mut self, opc: u8, name: &'static str, e: Encoding, e16: Encoding, rm: bool, h: Handler) {
        self.two[opc as usize] = OpcodeDesc::entry(opc, name, e, e16, rm, h);
    }

    fn op2_ext(&mut self, opc: u8, ext: u8, name: &'static str, e: Encoding, e16: Encoding, h: Handler) {
        ext_slot(&mut self.two, opc, ext, name, e, e16, h);
    }

    fn op2_prefix(&mut self, pfx: u8, opc: u8, name: &'static str, e: Encoding, e16: Encoding, rm: bool, h: Handler) {
        let v = prefix_slot(&mut self.two, opc, pfx);
        let sec = std::mem::take(&mut v.secondary);
        *v = OpcodeDesc::entry(opc, name, e, e16, rm, h);
        v.secondary = sec;
    }

    fn op2_sec(&mut self, opc: u8, sec: u8, name: &'static str, e: Encoding, e16: Encoding, rm: bool, h: Handler) {
        self.two[opc as usize]
            .secondary
            .push(OpcodeDesc::entry(sec, name, e, e16, rm, h));
    }

    fn op2_prefix_sec(&mut self, pfx: u8, opc: u8, sec: u8, name: &'static str, e: Encoding, e16: Encoding, rm: bool, h: Handler) {
        prefix_slot(&mut self.two, opc, pfx)
            .secondary
            .push(OpcodeDesc::entry(sec, name, e, e16, rm, h));
    }
}

fn ext_slot(
    table: &mut [OpcodeDesc],
    opc: u8,
    ext: u8,
    name: &'static str,
    e: Encoding,
    e16: Encoding,
    h: Handler,
) {
    let d = &mut table[opc as usize];
    d.uses_rm = true;
    let exts = d.extensions.get_or_insert_with(|| {
        Box::new(std::array::from_fn(|_| OpcodeDesc::unregistered(opc)))
    });
    let mut slot = OpcodeDesc::entry(opc, name, e, e16, true, h);
    slot.opcode = opc;
    exts[ext as usize] = slot;
}

/// Get or create the prefix-qualified variant of `opc` for prefix `pfx`.
fn prefix_slot<'t>(table: &'t mut [OpcodeDesc], opc: u8, pfx: u8) -> &'t mut OpcodeDesc {
    let d = &mut table[opc as usize];
    if let Some(i) = d.prefixed.iter().position(|(p, _)| *p == pfx) {
        return &mut d.prefixed[i].1;
    }
    d.prefixed.push((pfx, OpcodeDesc::unregistered(opc)));
    &mut d.prefixed.last_mut().unwrap().1
}

const ALU_NAMES: [&str; 8] = ["ADD", "OR", "ADC", "SBB", "AND", "SUB", "XOR", "CMP"];
const ALU_HANDLERS: [Handler; 8] = [H::Add, H::Or, H::Adc, H::Sbb, H::And, H::Sub, H::Xor, H::Cmp];

const GRP2_NAMES: [&str; 8] = ["ROL", "ROR", "RCL", "RCR", "SHL", "SHR", "SHL", "SAR"];
const GRP2_HANDLERS: [Handler; 8] = [H::Rol, H::Ror, H::Rcl, H::Rcr, H::Shl, H::Shr, H::Shl, H::Sar];

fn build() -> OpcodeTables {
    let mut b = Builder::new();
    build_one_byte(&mut b);
    build_two_byte(&mut b);
    b.finish()
}

fn build_one_byte(b: &mut Builder) {
    // 00..3F: the eight classic ALU families, six forms each, with the
    // segment push/pop and BCD opcodes interleaved.
    for (i, (&name, &h)) in ALU_NAMES.iter().zip(ALU_HANDLERS.iter()).enumerate() {
        let base = (i as u8) * 8;
        b.op(base, name, E::rm8_r8, E::rm8_r8, true, h);
        b.op(base + 1, name, E::rm32_r32, E::rm16_r16, true, h);
        b.op(base + 2, name, E::r8_rm8, E::r8_rm8, true, h);
        b.op(base + 3, name, E::r32_rm32, E::r16_rm16, true, h);
        b.op(base + 4, name, E::AL_imm8, E::AL_imm8, false, h);
        b.op(base + 5, name, E::eAX_imm32, E::AX_imm16, false, h);
    }
    b.op(0x06, "PUSH", E::Op, E::Op, false, H::PushSreg(SegReg::Es));
    b.op(0x07, "POP", E::Op, E::Op, false, H::PopSreg(SegReg::Es));
    b.op(0x0e, "PUSH", E::Op, E::Op, false, H::PushSreg(SegReg::Cs));
    // 0x0f is the two-byte escape.
    b.op(0x16, "PUSH", E::Op, E::Op, false, H::PushSreg(SegReg::Ss));
    b.op(0x17, "POP", E::Op, E::Op, false, H::PopSreg(SegReg::Ss));
    b.op(0x1e, "PUSH", E::Op, E::Op, false, H::PushSreg(SegReg::Ds));
    b.op(0x1f, "POP", E::Op, E::Op, false, H::PopSreg(SegReg::Ds));
    b.op(0x27, "DAA", E::Op, E::Op, false, H::Unimplemented);
    b.op(0x2f, "DAS", E::Op, E::Op, false, H::Unimplemented);
    b.op(0x37, "AAA", E::Op, E::Op, false, H::Unimplemented);
    b.op(0x3f, "AAS", E::Op, E::Op, false, H::Unimplemented);

    // Segment-override, operand-size and address-size prefixes live inside
    // the 00..3F and 60..6F rows.
    b.prefix(0x26, "ES:");
    b.prefix(0x2e, "CS:");
    b.prefix(0x36, "SS:");
    b.prefix(0x3e, "DS:");
    b.prefix(0x64, "FS:");
    b.prefix(0x65, "GS:");
    b.prefix(0x66, "OPRSZ");
    b.prefix(0x67, "ADDRSZ");

    // 40..5F: INC/DEC/PUSH/POP with the register in the opcode.
    for r in 0..8u8 {
        b.op(0x40 + r, "INC", E::R32, E::R16, false, H::Inc);
        b.op(0x48 + r, "DEC", E::R32, E::R16, false, H::Dec);
        b.op(0x50 + r, "PUSH", E::R32, E::R16, false, H::Push);
        b.op(0x58 + r, "POP", E::R32, E::R16, false, H::Pop);
    }

    b.op(0x60, "PUSHA", E::Op, E::Op, false, H::Pusha);
    b.op(0x61, "POPA", E::Op, E::Op, false, H::Popa);
    b.op(0x62, "BOUND", E::r32_rm32, E::r16_rm16, true, H::Unimplemented);
    b.op(0x63, "ARPL", E::rm16_r16, E::rm16_r16, true, H::Unimplemented);
    b.op(0x68, "PUSH", E::imm32, E::imm16, false, H::Push);
    b.op(0x69, "IMUL", E::r32_rm32_imm32, E::r16_rm16_imm16, true, H::Imul);
    b.op(0x6a, "PUSH", E::imm8, E::imm8, false, H::Push);
    b.op(0x6b, "IMUL", E::r32_rm32_imm8, E::r16_rm16_imm8, true, H::Imul);
    b.op(0x6c, "INS", E::Op, E::Op, false, H::Unimplemented);
    b.op(0x6d, "INS", E::Op, E::Op, false, H::Unimplemented);
    b.op(0x6e, "OUTS", E::Op, E::Op, false, H::Unimplemented);
    b.op(0x6f, "OUTS", E::Op, E::Op, false, H::Unimplemented);

    // 70..7F: Jcc rel8; the condition is the low nibble of the opcode.
    const JCC_NAMES: [&str; 16] = [
        "JO", "JNO", "JB", "JAE", "JE", "JNE", "JBE", "JA", "JS", "JNS", "JP", "JNP", "JL", "JGE",
        "JLE", "JG",
    ];
    for cc in 0..16u8 {
        b.op(0x70 + cc, JCC_NAMES[cc as usize], E::rela8, E::rela8, false, H::Jcc);
    }

    // 80..83: immediate group 1, disambiguated by ModR/M.reg.
    for ext in 0..8u8 {
        let name = ALU_NAMES[ext as usize];
        let h = ALU_HANDLERS[ext as usize];
        b.op_ext(0x80, ext, name, E::rm8_imm8, E::rm8_imm8, h);
        b.op_ext(0x81, ext, name, E::rm32_imm32, E::rm16_imm16, h);
        b.op_ext(0x82, ext, name, E::rm8_imm8, E::rm8_imm8, h);
        b.op_ext(0x83, ext, name, E::rm32_imm8, E::rm16_imm8, h);
    }

    b.op(0x84, "TEST", E::rm8_r8, E::rm8_r8, true, H::Test);
    b.op(0x85, "TEST", E::rm32_r32, E::rm16_r16, true, H::Test);
    b.op(0x86, "XCHG", E::rm8_r8, E::rm8_r8, true, H::Xchg);
    b.op(0x87, "XCHG", E::rm32_r32, E::rm16_r16, true, H::Xchg);
    b.op(0x88, "MOV", E::rm8_r8, E::rm8_r8, true, H::Mov);
    b.op(0x89, "MOV", E::rm32_r32, E::rm16_r16, true, H::Mov);
    b.op(0x8a, "MOV", E::r8_rm8, E::r8_rm8, true, H::Mov);
    b.op(0x8b, "MOV", E::r32_rm32, E::r16_rm16, true, H::Mov);
    b.op(0x8c, "MOV", E::rm16_sreg, E::rm16_sreg, true, H::Mov);
    b.op(0x8d, "LEA", E::r32_m, E::r16_m, true, H::Lea);
    b.op(0x8e, "MOV", E::sreg_rm16, E::sreg_rm16, true, H::Mov);
    b.op_ext(0x8f, 0, "POP", E::rm32, E::rm16, H::Pop);

    // 90..97: NOP and XCHG with the accumulator.
    b.op(0x90, "NOP", E::Op, E::Op, false, H::Nop);
    for r in 1..8u8 {
        b.op(0x90 + r, "XCHG", E::eAX_r32, E::AX_r16, false, H::Xchg);
    }
    b.op(0x98, "CWDE", E::Op, E::Op, false, H::Cbw);
    b.op(0x99, "CDQ", E::Op, E::Op, false, H::Cwd);
    b.op(0x9a, "CALL", E::ptr16_32, E::ptr16_16, false, H::CallFar);
    b.op(0x9b, "WAIT", E::Op, E::Op, false, H::Unimplemented);
    b.op(0x9c, "PUSHF", E::Op, E::Op, false, H::Pushf);
    b.op(0x9d, "POPF", E::Op, E::Op, false, H::Popf);
    b.op(0x9e, "SAHF", E::Op, E::Op, false, H::Sahf);
    b.op(0x9f, "LAHF", E::Op, E::Op, false, H::Lahf);

    // A0..A3: accumulator <-> absolute moffs.
    b.op(0xa0, "MOV", E::AL_moffs8, E::AL_moffs8, false, H::Mov);
    b.op(0xa1, "MOV", E::eAX_moffs32, E::AX_moffs16, false, H::Mov);
    b.op(0xa2, "MOV", E::moffs8_AL, E::moffs8_AL, false, H::Mov);
    b.op(0xa3, "MOV", E::moffs32_eAX, E::moffs16_AX, false, H::Mov);
    b.op(0xa4, "MOVS", E::Op, E::Op, false, H::Movs);
    b.op(0xa5, "MOVS", E::Op, E::Op, false, H::Movs);
    b.op(0xa6, "CMPS", E::Op, E::Op, false, H::Cmps);
    b.op(0xa7, "CMPS", E::Op, E::Op, false, H::Cmps);
    b.op(0xa8, "TEST", E::AL_imm8, E::AL_imm8, false, H::Test);
    b.op(0xa9, "TEST", E::eAX_imm32, E::AX_imm16, false, H::Test);
    b.op(0xaa, "STOS", E::Op, E::Op, false, H::Stos);
    b.op(0xab, "STOS", E::Op, E::Op, false, H::Stos);
    b.op(0xac, "LODS", E::Op, E::Op, false, H::Lods);
    b.op(0xad, "LODS", E::Op, E::Op, false, H::Lods);
    b.op(0xae, "SCAS", E::Op, E::Op, false, H::Scas);
    b.op(0xaf, "SCAS", E::Op, E::Op, false, H::Scas);

    // B0..BF: MOV reg, imm with the register in the opcode.
    for r in 0..8u8 {
        b.op(0xb0 + r, "MOV", E::R8_imm8, E::R8_imm8, false, H::Mov);
        b.op(0xb8 + r, "MOV", E::R32_imm32, E::R16_imm16, false, H::Mov);
    }

    // C0/C1 and D0..D3: shift group 2.
    for ext in 0..8u8 {
        let name = GRP2_NAMES[ext as usize];
        let h = GRP2_HANDLERS[ext as usize];
        b.op_ext(0xc0, ext, name, E::rm8_imm8, E::rm8_imm8, h);
        b.op_ext(0xc1, ext, name, E::rm32_imm8, E::rm16_imm8, h);
        b.op_ext(0xd0, ext, name, E::rm8_1, E::rm8_1, h);
        b.op_ext(0xd1, ext, name, E::rm32_1, E::rm16_1, h);
        b.op_ext(0xd2, ext, name, E::rm8_CL, E::rm8_CL, h);
        b.op_ext(0xd3, ext, name, E::rm32_CL, E::rm16_CL, h);
    }

    b.op(0xc2, "RET", E::imm16, E::imm16, false, H::Ret);
    b.op(0xc3, "RET", E::Op, E::Op, false, H::Ret);
    b.op(0xc4, "LES", E::r32_m16_32, E::r16_m16_16, true, H::Unimplemented);
    b.op(0xc5, "LDS", E::r32_m16_32, E::r16_m16_16, true, H::Unimplemented);
    b.op_ext(0xc6, 0, "MOV", E::rm8_imm8, E::rm8_imm8, H::Mov);
    b.op_ext(0xc7, 0, "MOV", E::rm32_imm32, E::rm16_imm16, H::Mov);
    b.op(0xc8, "ENTER", E::imm16_imm8, E::imm16_imm8, false, H::Enter);
    b.op(0xc9, "LEAVE", E::Op, E::Op, false, H::Leave);
    b.op(0xca, "RETF", E::imm16, E::imm16, false, H::RetFar);
    b.op(0xcb, "RETF", E::Op, E::Op, false, H::RetFar);
    b.op(0xcc, "INT3", E::Op, E::Op, false, H::Int3);
    b.op(0xcd, "INT", E::imm8, E::imm8, false, H::Int);
    b.op(0xce, "INTO", E::Op, E::Op, false, H::Into);
    b.op(0xcf, "IRET", E::Op, E::Op, false, H::Unimplemented);

    b.op(0xd4, "AAM", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xd4, 0x0a, "AAM", E::Op, E::Op, false, H::Unimplemented);
    b.op(0xd5, "AAD", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xd5, 0x0a, "AAD", E::Op, E::Op, false, H::Unimplemented);
    b.op(0xd7, "XLAT", E::Op, E::Op, false, H::Xlat);

    build_x87(b);

    b.op(0xe0, "LOOPNE", E::rela8, E::rela8, false, H::Loopne);
    b.op(0xe1, "LOOPE", E::rela8, E::rela8, false, H::Loope);
    b.op(0xe2, "LOOP", E::rela8, E::rela8, false, H::Loop);
    b.op(0xe3, "JCXZ", E::rela8, E::rela8, false, H::Jcxz);
    b.op(0xe4, "IN", E::AL_imm8, E::AL_imm8, false, H::Unimplemented);
    b.op(0xe5, "IN", E::imm8, E::imm8, false, H::Unimplemented);
    b.op(0xe6, "OUT", E::imm8, E::imm8, false, H::Unimplemented);
    b.op(0xe7, "OUT", E::imm8, E::imm8, false, H::Unimplemented);
    b.op(0xe8, "CALL", E::rela32, E::rela16, false, H::Call);
    b.op(0xe9, "JMP", E::rela32, E::rela16, false, H::Jmp);
    b.op(0xea, "JMP", E::ptr16_32, E::ptr16_16, false, H::JmpFar);
    b.op(0xeb, "JMP", E::rela8, E::rela8, false, H::Jmp);
    b.op(0xec, "IN", E::Op, E::Op, false, H::Unimplemented);
    b.op(0xed, "IN", E::Op, E::Op, false, H::Unimplemented);
    b.op(0xee, "OUT", E::Op, E::Op, false, H::Unimplemented);
    b.op(0xef, "OUT", E::Op, E::Op, false, H::Unimplemented);

    b.prefix(0xf0, "LOCK");
    b.op(0xf1, "INT1", E::Op, E::Op, false, H::Unimplemented);
    b.prefix(0xf2, "REPNZ");
    b.prefix(0xf3, "REP");
    b.op(0xf4, "HLT", E::Op, E::Op, false, H::Hlt);
    b.op(0xf5, "CMC", E::Op, E::Op, false, H::Cmc);

    // F6/F7: unary group 3. The TEST slots carry an immediate.
    b.op_ext(0xf6, 0, "TEST", E::rm8_imm8, E::rm8_imm8, H::Test);
    b.op_ext(0xf6, 1, "TEST", E::rm8_imm8, E::rm8_imm8, H::Test);
    b.op_ext(0xf6, 2, "NOT", E::rm8, E::rm8, H::Not);
    b.op_ext(0xf6, 3, "NEG", E::rm8, E::rm8, H::Neg);
    b.op_ext(0xf6, 4, "MUL", E::rm8, E::rm8, H::Mul);
    b.op_ext(0xf6, 5, "IMUL", E::rm8, E::rm8, H::Imul);
    b.op_ext(0xf6, 6, "DIV", E::rm8, E::rm8, H::Div);
    b.op_ext(0xf6, 7, "IDIV", E::rm8, E::rm8, H::Idiv);
    b.op_ext(0xf7, 0, "TEST", E::rm32_imm32, E::rm16_imm16, H::Test);
    b.op_ext(0xf7, 1, "TEST", E::rm32_imm32, E::rm16_imm16, H::Test);
    b.op_ext(0xf7, 2, "NOT", E::rm32, E::rm16, H::Not);
    b.op_ext(0xf7, 3, "NEG", E::rm32, E::rm16, H::Neg);
    b.op_ext(0xf7, 4, "MUL", E::rm32, E::rm16, H::Mul);
    b.op_ext(0xf7, 5, "IMUL", E::rm32, E::rm16, H::Imul);
    b.op_ext(0xf7, 6, "DIV", E::rm32, E::rm16, H::Div);
    b.op_ext(0xf7, 7, "IDIV", E::rm32, E::rm16, H::Idiv);

    b.op(0xf8, "CLC", E::Op, E::Op, false, H::Clc);
    b.op(0xf9, "STC", E::Op, E::Op, false, H::Stc);
    b.op(0xfa, "CLI", E::Op, E::Op, false, H::Cli);
    b.op(0xfb, "STI", E::Op, E::Op, false, H::Sti);
    b.op(0xfc, "CLD", E::Op, E::Op, false, H::Cld);
    b.op(0xfd, "STD", E::Op, E::Op, false, H::Std);

    // FE/FF: INC/DEC group 4 and group 5.
    b.op_ext(0xfe, 0, "INC", E::rm8, E::rm8, H::Inc);
    b.op_ext(0xfe, 1, "DEC", E::rm8, E::rm8, H::Dec);
    b.op_ext(0xff, 0, "INC", E::rm32, E::rm16, H::Inc);
    b.op_ext(0xff, 1, "DEC", E::rm32, E::rm16, H::Dec);
    b.op_ext(0xff, 2, "CALL", E::rm32, E::rm16, H::Call);
    b.op_ext(0xff, 3, "CALL", E::m16_32, E::m16_16, H::CallFar);
    b.op_ext(0xff, 4, "JMP", E::rm32, E::rm16, H::Jmp);
    b.op_ext(0xff, 5, "JMP", E::m16_32, E::m16_16, H::JmpFar);
    b.op_ext(0xff, 6, "PUSH", E::rm32, E::rm16, H::Push);
}

/// The x87 escape rows D8..DF. Memory forms come from the extension array;
/// the best-known register forms get secondary entries so they keep their
/// names. Execution of every one is stubbed.
fn build_x87(b: &mut Builder) {
    const D8: [&str; 8] = ["FADD", "FMUL", "FCOM", "FCOMP", "FSUB", "FSUBR", "FDIV", "FDIVR"];
    const D9: [&str; 8] = ["FLD", "(bad)", "FST", "FSTP", "FLDENV", "FLDCW", "FNSTENV", "FNSTCW"];
    const DA: [&str; 8] = ["FIADD", "FIMUL", "FICOM", "FICOMP", "FISUB", "FISUBR", "FIDIV", "FIDIVR"];
    const DB: [&str; 8] = ["FILD", "FISTTP", "FIST", "FISTP", "(bad)", "FLD", "(bad)", "FSTP"];
    const DC: [&str; 8] = ["FADD", "FMUL", "FCOM", "FCOMP", "FSUB", "FSUBR", "FDIV", "FDIVR"];
    const DD: [&str; 8] = ["FLD", "FISTTP", "FST", "FSTP", "FRSTOR", "(bad)", "FNSAVE", "FNSTSW"];
    const DE: [&str; 8] = ["FIADD", "FIMUL", "FICOM", "FICOMP", "FISUB", "FISUBR", "FIDIV", "FIDIVR"];
    const DF: [&str; 8] = ["FILD", "FISTTP", "FIST", "FISTP", "FBLD", "FILD", "FBSTP", "FISTP"];
    const ROWS: [(u8, [&str; 8]); 8] = [
        (0xd8, D8),
        (0xd9, D9),
        (0xda, DA),
        (0xdb, DB),
        (0xdc, DC),
        (0xdd, DD),
        (0xde, DE),
        (0xdf, DF),
    ];

    for (opc, names) in ROWS {
        for (ext, name) in names.into_iter().enumerate() {
            if name != "(bad)" {
                b.op_ext(opc, ext as u8, name, E::m32, E::m32, H::Unimplemented);
            }
        }
    }

    // st(i) register forms, one secondary entry per stack slot.
    let st_block = |b: &mut Builder, opc: u8, start: u8, name: &'static str| {
        for i in 0..8u8 {
            b.op_sec(opc, start + i, name, E::Op, E::Op, false, H::Unimplemented);
        }
    };
    for (start, name) in [
        (0xc0, "FADD"),
        (0xc8, "FMUL"),
        (0xd0, "FCOM"),
        (0xd8, "FCOMP"),
        (0xe0, "FSUB"),
        (0xe8, "FSUBR"),
        (0xf0, "FDIV"),
        (0xf8, "FDIVR"),
    ] {
        st_block(b, 0xd8, start, name);
        st_block(b, 0xdc, start, name);
    }
    st_block(b, 0xd9, 0xc0, "FLD");
    st_block(b, 0xd9, 0xc8, "FXCH");
    st_block(b, 0xdd, 0xc0, "FFREE");
    st_block(b, 0xdd, 0xd0, "FST");
    st_block(b, 0xdd, 0xd8, "FSTP");
    st_block(b, 0xdd, 0xe0, "FUCOM");
    st_block(b, 0xdd, 0xe8, "FUCOMP");
    for (start, name) in [
        (0xc0, "FADDP"),
        (0xc8, "FMULP"),
        (0xe0, "FSUBRP"),
        (0xe8, "FSUBP"),
        (0xf0, "FDIVRP"),
        (0xf8, "FDIVP"),
    ] {
        st_block(b, 0xde, start, name);
    }
    st_block(b, 0xdb, 0xe8, "FUCOMI");
    st_block(b, 0xdb, 0xf0, "FCOMI");
    st_block(b, 0xdf, 0xe8, "FUCOMIP");
    st_block(b, 0xdf, 0xf0, "FCOMIP");

    // Irregular register-operand forms with fixed second bytes.
    b.op_sec(0xd9, 0xd0, "FNOP", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xd9, 0xe0, "FCHS", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xd9, 0xe1, "FABS", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xd9, 0xe4, "FTST", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xd9, 0xe8, "FLD1", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xd9, 0xee, "FLDZ", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xda, 0xe9, "FUCOMPP", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xdb, 0xe2, "FNCLEX", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xdb, 0xe3, "FNINIT", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xde, 0xd9, "FCOMPP", E::Op, E::Op, false, H::Unimplemented);
    b.op_sec(0xdf, 0xe0, "FNSTSW", E::Op, E::Op, false, H::Unimplemented);
}

fn build_two_byte(b: &mut Builder) {
    // System groups 6 and 7 (decode-only).
    b.op2_ext(0x00, 0, "SLDT", E::rm16, E::rm16, H::Unimplemented);
    b.op2_ext(0x00, 1, "STR", E::rm16, E::rm16, H::Unimplemented);
    b.op2_ext(0x00, 2, "LLDT", E::rm16, E::rm16, H::Unimplemented);
    b.op2_ext(0x00, 3, "LTR", E::rm16, E::rm16, H::Unimplemented);
    b.op2_ext(0x00, 4, "VERR", E::rm16, E::rm16, H::Unimplemented);
    b.op2_ext(0x00, 5, "VERW", E::rm16, E::rm16, H::Unimplemented);
    b.op2_ext(0x01, 0, "SGDT", E::m16_32, E::m16_32, H::Unimplemented);
    b.op2_ext(0x01, 1, "SIDT", E::m16_32, E::m16_32, H::Unimplemented);
    b.op2_ext(0x01, 2, "LGDT", E::m16_32, E::m16_32, H::Unimplemented);
    b.op2_ext(0x01, 3, "LIDT", E::m16_32, E::m16_32, H::Unimplemented);
    b.op2_ext(0x01, 4, "SMSW", E::rm16, E::rm16, H::Unimplemented);
    b.op2_ext(0x01, 6, "LMSW", E::rm16, E::rm16, H::Unimplemented);
    b.op2_ext(0x01, 7, "INVLPG", E::m8, E::m8, H::Unimplemented);
    b.op2(0x02, "LAR", E::r32_rm16, E::r32_rm16, true, H::Unimplemented);
    b.op2(0x03, "LSL", E::r32_rm16, E::r32_rm16, true, H::Unimplemented);
    b.op2(0x06, "CLTS", E::Op, E::Op, false, H::Unimplemented);
    b.op2(0x08, "INVD", E::Op, E::Op, false, H::Unimplemented);
    b.op2(0x09, "WBINVD", E::Op, E::Op, false, H::Unimplemented);
    b.op2(0x0b, "UD2", E::Op, E::Op, false, H::Unimplemented);

    // Representative SSE rows with their mandatory-prefix variants, decoded
    // so operand lengths stay exact.
    b.op2(0x10, "MOVUPS", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0x66, 0x10, "MOVUPD", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0xf2, 0x10, "MOVSD", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0xf3, 0x10, "MOVSS", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2(0x11, "MOVUPS", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0x66, 0x11, "MOVUPD", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0xf2, 0x11, "MOVSD", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0xf3, 0x11, "MOVSS", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);

    // Prefetch hints.
    b.op2_ext(0x18, 0, "PREFETCHNTA", E::m8, E::m8, H::Unimplemented);
    b.op2_ext(0x18, 1, "PREFETCHT0", E::m8, E::m8, H::Unimplemented);
    b.op2_ext(0x18, 2, "PREFETCHT1", E::m8, E::m8, H::Unimplemented);
    b.op2_ext(0x18, 3, "PREFETCHT2", E::m8, E::m8, H::Unimplemented);

    // ENDBR32 is the F3-prefixed 0F 1E with a fixed fourth byte.
    b.op2_prefix_sec(0xf3, 0x1e, 0xfb, "ENDBR32", E::Op, E::Op, false, H::Endbr);
    b.op2_prefix_sec(0xf3, 0x1e, 0xfa, "ENDBR64", E::Op, E::Op, false, H::Unimplemented);
    // Multi-byte NOP.
    b.op2_ext(0x1f, 0, "NOP", E::rm32, E::rm16, H::Nop);

    // Control-register moves (decode-only).
    b.op2(0x20, "MOV", E::rm32_r32, E::rm32_r32, true, H::Unimplemented);
    b.op2(0x21, "MOV", E::rm32_r32, E::rm32_r32, true, H::Unimplemented);
    b.op2(0x22, "MOV", E::r32_rm32, E::r32_rm32, true, H::Unimplemented);
    b.op2(0x23, "MOV", E::r32_rm32, E::r32_rm32, true, H::Unimplemented);

    b.op2(0x30, "WRMSR", E::Op, E::Op, false, H::Unimplemented);
    b.op2(0x31, "RDTSC", E::Op, E::Op, false, H::Unimplemented);
    b.op2(0x32, "RDMSR", E::Op, E::Op, false, H::Unimplemented);
    b.op2(0x33, "RDPMC", E::Op, E::Op, false, H::Unimplemented);
    b.op2(0x34, "SYSENTER", E::Op, E::Op, false, H::Unimplemented);
    b.op2(0x35, "SYSEXIT", E::Op, E::Op, false, H::Unimplemented);

    // 38/3A escape rows, exercised through the secondary tables.
    b.op2_sec(0x38, 0x00, "PSHUFB", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix_sec(0x66, 0x38, 0x00, "PSHUFB", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_sec(0x3a, 0x0f, "PALIGNR", E::xmm_rm_imm8, E::xmm_rm_imm8, true, H::Unimplemented);
    b.op2_prefix_sec(0x66, 0x3a, 0x0f, "PALIGNR", E::xmm_rm_imm8, E::xmm_rm_imm8, true, H::Unimplemented);

    // 40..4F: CMOVcc.
    const CMOV_NAMES: [&str; 16] = [
        "CMOVO", "CMOVNO", "CMOVB", "CMOVAE", "CMOVE", "CMOVNE", "CMOVBE", "CMOVA", "CMOVS",
        "CMOVNS", "CMOVP", "CMOVNP", "CMOVL", "CMOVGE", "CMOVLE", "CMOVG",
    ];
    for cc in 0..16u8 {
        b.op2(0x40 + cc, CMOV_NAMES[cc as usize], E::r32_rm32, E::r16_rm16, true, H::Cmovcc);
    }

    // MMX/SSE move and xor rows used by compiler-generated memcpy/memset.
    b.op2(0x6f, "MOVQ", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0x66, 0x6f, "MOVDQA", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0xf3, 0x6f, "MOVDQU", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2(0x70, "PSHUFW", E::xmm_rm_imm8, E::xmm_rm_imm8, true, H::Unimplemented);
    b.op2_prefix(0x66, 0x70, "PSHUFD", E::xmm_rm_imm8, E::xmm_rm_imm8, true, H::Unimplemented);
    b.op2(0x77, "EMMS", E::Op, E::Op, false, H::Unimplemented);
    b.op2(0x7f, "MOVQ", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0x66, 0x7f, "MOVDQA", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0xf3, 0x7f, "MOVDQU", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2(0xef, "PXOR", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);
    b.op2_prefix(0x66, 0xef, "PXOR", E::xmm_rm, E::xmm_rm, true, H::Unimplemented);

    // 80..8F: Jcc rel32.
    const JCC_NAMES: [&str; 16] = [
        "JO", "JNO", "JB", "JAE", "JE", "JNE", "JBE", "JA", "JS", "JNS", "JP", "JNP", "JL", "JGE",
        "JLE", "JG",
    ];
    for cc in 0..16u8 {
        b.op2(0x80 + cc, JCC_NAMES[cc as usize], E::rela32, E::rela16, false, H::Jcc);
    }

    // 90..9F: SETcc.
    const SET_NAMES: [&str; 16] = [
        "SETO", "SETNO", "SETB", "SETAE", "SETE", "SETNE", "SETBE", "SETA", "SETS", "SETNS",
        "SETP", "SETNP", "SETL", "SETGE", "SETLE", "SETG",
    ];
    for cc in 0..16u8 {
        b.op2(0x90 + cc, SET_NAMES[cc as usize], E::rm8, E::rm8, true, H::Setcc);
    }

    b.op2(0xa0, "PUSH", E::Op, E::Op, false, H::PushSreg(SegReg::Fs));
    b.op2(0xa1, "POP", E::Op, E::Op, false, H::PopSreg(SegReg::Fs));
    b.op2(0xa2, "CPUID", E::Op, E::Op, false, H::Unimplemented);
    b.op2(0xa3, "BT", E::rm32_r32, E::rm16_r16, true, H::Unimplemented);
    b.op2(0xa4, "SHLD", E::rm32_r32_imm8, E::rm16_r16_imm8, true, H::Unimplemented);
    b.op2(0xa5, "SHLD", E::rm32_r32_CL, E::rm16_r16_CL, true, H::Unimplemented);
    b.op2(0xa8, "PUSH", E::Op, E::Op, false, H::PushSreg(SegReg::Gs));
    b.op2(0xa9, "POP", E::Op, E::Op, false, H::PopSreg(SegReg::Gs));
    b.op2(0xab, "BTS", E::rm32_r32, E::rm16_r16, true, H::Unimplemented);
    b.op2(0xac, "SHRD", E::rm32_r32_imm8, E::rm16_r16_imm8, true, H::Unimplemented);
    b.op2(0xad, "SHRD", E::rm32_r32_CL, E::rm16_r16_CL, true, H::Unimplemented);
    b.op2(0xaf, "IMUL", E::r32_rm32, E::r16_rm16, true, H::Imul);
    b.op2(0xb0, "CMPXCHG", E::rm8_r8, E::rm8_r8, true, H::Unimplemented);
    b.op2(0xb1, "CMPXCHG", E::rm32_r32, E::rm16_r16, true, H::Unimplemented);
    b.op2(0xb3, "BTR", E::rm32_r32, E::rm16_r16, true, H::Unimplemented);
    b.op2(0xb6, "MOVZX", E::r32_rm8, E::r16_rm8, true, H::Movzx);
    b.op2(0xb7, "MOVZX", E::r32_rm16, E::r32_rm16, true, H::Movzx);
    b.op2(0xb9, "UD1", E::r32_rm32, E::r32_rm32, true, H::Unimplemented);
    b.op2_ext(0xba, 4, "BT", E::rm32_imm8, E::rm16_imm8, H::Unimplemented);
    b.op2_ext(0xba, 5, "BTS", E::rm32_imm8, E::rm16_imm8, H::Unimplemented);
    b.op2_ext(0xba, 6, "BTR", E::rm32_imm8, E::rm16_imm8, H::Unimplemented);
    b.op2_ext(0xba, 7, "BTC", E::rm32_imm8, E::rm16_imm8, H::Unimplemented);
    b.op2(0xbb, "BTC", E::rm32_r32, E::rm16_r16, true, H::Unimplemented);
    b.op2(0xbc, "BSF", E::r32_rm32, E::r16_rm16, true, H::Unimplemented);
    b.op2(0xbd, "BSR", E::r32_rm32, E::r16_rm16, true, H::Unimplemented);
    b.op2(0xbe, "MOVSX", E::r32_rm8, E::r16_rm8, true, H::Movsx);
    b.op2(0xbf, "MOVSX", E::r32_rm16, E::r32_rm16, true, H::Movsx);
    b.op2(0xc0, "XADD", E::rm8_r8, E::rm8_r8, true, H::Unimplemented);
    b.op2(0xc1, "XADD", E::rm32_r32, E::rm16_r16, true, H::Unimplemented);
    b.op2(0xc6, "SHUFPS", E::xmm_rm_imm8, E::xmm_rm_imm8, true, H::Unimplemented);
    b.op2_ext(0xc7, 1, "CMPXCHG8B", E::m64, E::m64, H::Unimplemented);
    for r in 0..8u8 {
        b.op2(0xc8 + r, "BSWAP", E::R32, E::R32, false, H::Unimplemented);
    }
}
