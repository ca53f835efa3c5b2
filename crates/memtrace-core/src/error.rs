use std::fmt;

/// The cross-cutting error taxonomy shared by every crate that consumes
/// `ProcessMemoryAdapter`.
///
/// `Encode` (opcode cannot be expressed) is deliberately not here — it only
/// ever arises in the assembler, which defines its own `EncodeError`.
#[derive(Debug)]
pub enum CoreError {
    /// Caller-side misuse: wrong-size operand, unknown predicate for a
    /// type, an index register that can't be encoded, conflicting sizes.
    InvalidArgument(String),
    /// An address isn't inside any region, or a result index is past the
    /// end of a result list.
    OutOfRange(String),
    /// A read/write/protect/pause/resume/thread-register call failed on
    /// the adapter side.
    AdapterIo(String),
    /// An invariant was violated. Always indicates a bug, never user input.
    LogicError(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::OutOfRange(msg) => write!(f, "out of range: {msg}"),
            Self::AdapterIo(msg) => write!(f, "adapter i/o error: {msg}"),
            Self::LogicError(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}
