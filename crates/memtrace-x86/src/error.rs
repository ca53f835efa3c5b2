use std::fmt;

/// Errors raised while building or reading a ModRM/SIB byte sequence.
/// Both the encoder and decoder wrap this into their own error types.
#[derive(Debug)]
pub enum X86Error {
    /// Caller-side misuse of the operand model (e.g. RSP as a SIB index,
    /// RIP-relative addressing with a scaled index).
    InvalidArgument(String),
    /// A displacement doesn't fit in the widest encodable form (signed 32-bit).
    DisplacementOutOfRange(i64),
    /// Not enough bytes remained to decode a ModRM/SIB/displacement sequence.
    Truncated,
}

impl fmt::Display for X86Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid operand: {msg}"),
            Self::DisplacementOutOfRange(disp) => {
                write!(f, "displacement {disp:#x} does not fit in 32 bits")
            }
            Self::Truncated => write!(f, "truncated modrm/sib/displacement sequence"),
        }
    }
}

impl std::error::Error for X86Error {}
