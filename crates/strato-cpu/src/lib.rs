//! CPU state and execution engine for the 32-bit x86 guest.
//!
//! [`CpuState`] holds the architectural registers; [`step`] decodes the
//! instruction at EIP through the shared decoder, advances EIP, and runs
//! the instruction's semantic routine against the MMU and the call-trace
//! recorder. Control returns with a [`StepExit`] describing how the
//! instruction ended, or an [`Exception`] that halts the guest.

mod addr;
mod alu;
mod exec;
mod state;

pub use addr::{effective_address, rm_operand, Operand};
pub use exec::{find_call_target, step, Exception, StepExit};
pub use state::CpuState;
