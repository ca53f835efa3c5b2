//! AMD64 register/operand model and ModRM/SIB encode/decode tables shared
//! by `memtrace-asm` (the encoder) and `memtrace-disasm` (the decoder),
//! per spec.md §2's "AMD64 Encoder → AMD64 Decoder (shared tables)".

mod alu;
mod condition;
mod error;
mod modrm;
mod operand;
mod register;

pub use alu::{AluOp, ShiftOp};
pub use condition::Condition;
pub use error::X86Error;
pub use modrm::{decode_modrm_sib, encode_modrm_sib, DecodedModRm, ModRmEncoding};
pub use operand::{MemOperand, Operand, OperandSize};
pub use register::Register;
