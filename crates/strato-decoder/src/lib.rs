//! Table-driven IA-32 instruction decoder.
//!
//! The opcode tables ([`tables`]) describe every instruction form with a
//! closed [`Encoding`] tag and a [`Handler`] name; [`decode`] walks the byte
//! stream through the MMU and produces an [`Instr`] the execution engine
//! dispatches on. Decoding is pure: decoding the same address twice yields
//! the same instruction, and never claims a byte it could not fetch.

mod decode;
mod encoding;
mod handler;
mod table;

pub use decode::{decode, decode_until, DecodeError, ExecData, Instr, MAX_INSTRUCTION_LEN};
pub use encoding::{Encoding, ImmSpec};
pub use handler::Handler;
pub use table::{is_prefix_byte, tables, OpcodeDesc, OpcodeTables};
