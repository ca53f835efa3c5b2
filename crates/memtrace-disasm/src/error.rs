use std::fmt;

use memtrace_x86::X86Error;

/// Errors raised while decoding a byte stream (spec.md §4.4 is a pure
/// function of its inputs, so the only failures are "ran out of bytes" or
/// "this opcode isn't in the supported catalogue").
#[derive(Debug)]
pub enum DecodeError {
    Truncated,
    Unsupported(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated instruction"),
            Self::Unsupported(msg) => write!(f, "unsupported opcode: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<X86Error> for DecodeError {
    fn from(err: X86Error) -> Self {
        match err {
            X86Error::Truncated => Self::Truncated,
            other => Self::Unsupported(other.to_string()),
        }
    }
}
