//! Semantic routine names carried by the opcode descriptors.
//!
//! The decoder is a separate crate from the execution engine, so the
//! descriptor does not hold a function pointer; it names the routine and
//! the engine dispatches on the name. Families that are decoded but not
//! executed (x87, MMX/SSE, system instructions, port I/O) share
//! [`Handler::Unimplemented`], which the engine turns into a fatal
//! diagnostic naming the opcode.

use strato_x86::SegReg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    // Data movement.
    Mov,
    Movzx,
    Movsx,
    Lea,
    Xchg,
    Xlat,

    // Arithmetic.
    Add,
    Adc,
    Sub,
    Sbb,
    Cmp,
    Inc,
    Dec,
    Neg,
    Not,
    Mul,
    Imul,
    Div,
    Idiv,
    Cbw,
    Cwd,

    // Logic.
    And,
    Or,
    Xor,
    Test,

    // Shifts and rotates.
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
    Rcl,
    Rcr,

    // Stack.
    Push,
    Pop,
    PushSreg(SegReg),
    PopSreg(SegReg),
    Pusha,
    Popa,
    Pushf,
    Popf,
    Leave,
    Enter,

    // Control flow.
    Call,
    CallFar,
    Ret,
    RetFar,
    Jmp,
    JmpFar,
    Jcc,
    Jcxz,
    Loop,
    Loope,
    Loopne,
    Setcc,
    Cmovcc,

    // String operations (REP-aware).
    Movs,
    Stos,
    Lods,
    Scas,
    Cmps,

    // Flag manipulation.
    Sahf,
    Lahf,
    Clc,
    Stc,
    Cmc,
    Cld,
    Std,
    Cli,
    Sti,

    // Control transfers to the host.
    Hlt,
    Int,
    Int3,
    Into,

    // No-ops.
    Nop,
    Endbr,

    /// Decoded so instruction lengths stay exact, but executing it halts
    /// the guest with a diagnostic naming the opcode.
    Unimplemented,
}
