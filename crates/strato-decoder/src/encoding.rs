//! The closed set of operand encodings used by the opcode tables.
//!
//! The encoding kind fully determines how the decoder advances past the
//! opcode bytes: whether a ModR/M-driven displacement can follow, and how
//! many immediate bytes to fetch. The execution engine keys operand reads
//! and writes off the same tag.

/// Operand encoding of one instruction form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum Encoding {
    /// Unregistered table slot; decoding fails.
    None,
    /// No operands in the byte stream.
    Op,

    // Register encoded in the low three opcode bits.
    R8_imm8,
    R16_imm16,
    R32_imm32,
    R16,
    R32,
    AX_r16,
    eAX_r32,

    // Accumulator with immediate.
    AL_imm8,
    AX_imm16,
    eAX_imm32,

    // Accumulator with absolute memory offset (A0..A3).
    AL_moffs8,
    AX_moffs16,
    eAX_moffs32,
    moffs8_AL,
    moffs16_AX,
    moffs32_eAX,

    // Bare immediates and relative branch targets.
    imm8,
    imm16,
    imm32,
    imm16_imm8,
    rela8,
    rela16,
    rela32,

    // Far pointers (offset first in the byte stream, then selector).
    ptr16_16,
    ptr16_32,

    // ModR/M forms.
    rm8,
    rm16,
    rm32,
    m8,
    m16,
    m32,
    m64,
    m16_16,
    m16_32,
    rm8_imm8,
    rm16_imm16,
    rm32_imm32,
    rm16_imm8,
    rm32_imm8,
    rm8_1,
    rm16_1,
    rm32_1,
    rm8_CL,
    rm16_CL,
    rm32_CL,
    rm8_r8,
    rm16_r16,
    rm32_r32,
    r8_rm8,
    r16_rm16,
    r32_rm32,
    r16_rm8,
    r32_rm8,
    r32_rm16,
    r16_m,
    r32_m,
    r16_m16_16,
    r32_m16_32,
    sreg_rm16,
    rm16_sreg,
    r16_rm16_imm16,
    r32_rm32_imm32,
    r16_rm16_imm8,
    r32_rm32_imm8,
    rm16_r16_imm8,
    rm32_r32_imm8,
    rm16_r16_CL,
    rm32_r32_CL,

    // SIMD forms are decoded (so lengths stay correct) but never executed.
    xmm_rm,
    xmm_rm_imm8,
}

/// How many immediate bytes an encoding carries, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmSpec {
    None,
    /// One byte into `imm1`.
    Imm8,
    /// Two bytes into `imm1`.
    Imm16,
    /// Four bytes into `imm1`.
    Imm32,
    /// `imm16` then `imm8` (ENTER).
    Imm16Imm8,
    /// 16-bit offset into `imm1`, then 16-bit selector into `imm2`.
    Far16,
    /// 32-bit offset into `imm1`, then 16-bit selector into `imm2`.
    Far32,
    /// Absolute moffs address into `disp`, sized by the address-size prefix.
    Moffs,
}

impl Encoding {
    /// Encodings whose operand bytes include a ModR/M memory reference, and
    /// therefore a displacement when `mod != 3`.
    pub fn has_rm_operand(self) -> bool {
        use Encoding::*;
        matches!(
            self,
            rm8 | rm16
                | rm32
                | m8
                | m16
                | m32
                | m64
                | m16_16
                | m16_32
                | rm8_imm8
                | rm16_imm16
                | rm32_imm32
                | rm16_imm8
                | rm32_imm8
                | rm8_1
                | rm16_1
                | rm32_1
                | rm8_CL
                | rm16_CL
                | rm32_CL
                | rm8_r8
                | rm16_r16
                | rm32_r32
                | r8_rm8
                | r16_rm16
                | r32_rm32
                | r16_rm8
                | r32_rm8
                | r32_rm16
                | r16_m
                | r32_m
                | r16_m16_16
                | r32_m16_32
                | sreg_rm16
                | rm16_sreg
                | r16_rm16_imm16
                | r32_rm32_imm32
                | r16_rm16_imm8
                | r32_rm32_imm8
                | rm16_r16_imm8
                | rm32_r32_imm8
                | rm16_r16_CL
                | rm32_r32_CL
                | xmm_rm
                | xmm_rm_imm8
        )
    }

    /// Immediate bytes this encoding carries after any displacement.
    pub fn imm_spec(self) -> ImmSpec {
        use Encoding::*;
        match self {
            imm8 | rela8 | R8_imm8 | AL_imm8 | rm8_imm8 | rm16_imm8 | rm32_imm8
            | r16_rm16_imm8 | r32_rm32_imm8 | rm16_r16_imm8 | rm32_r32_imm8 | xmm_rm_imm8 => {
                ImmSpec::Imm8
            }
            imm16 | rela16 | R16_imm16 | AX_imm16 | rm16_imm16 | r16_rm16_imm16 => ImmSpec::Imm16,
            imm32 | rela32 | R32_imm32 | eAX_imm32 | rm32_imm32 | r32_rm32_imm32 => ImmSpec::Imm32,
            imm16_imm8 => ImmSpec::Imm16Imm8,
            ptr16_16 => ImmSpec::Far16,
            ptr16_32 => ImmSpec::Far32,
            AL_moffs8 | AX_moffs16 | eAX_moffs32 | moffs8_AL | moffs16_AX | moffs32_eAX => {
                ImmSpec::Moffs
            }
            _ => ImmSpec::None,
        }
    }
}
