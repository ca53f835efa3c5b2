use std::fmt;

use memtrace_x86::X86Error;

/// Errors raised while building an instruction stream or resolving it into
/// bytes. Distinct from `memtrace_core::CoreError` because only the
/// assembler can raise the `Encode` category (spec.md §7).
#[derive(Debug)]
pub enum EncodeError {
    /// An operand combination the ModRM/SIB layer rejects (bad SIB index,
    /// RIP-relative with a scaled index, displacement too wide).
    InvalidOperand(String),
    /// A duplicate `write_label` call for a name already in use.
    DuplicateLabel(String),
    /// An opcode that cannot be expressed at all (e.g. an operand-size
    /// combination `imul`'s encoding doesn't support).
    Unencodable(String),
    /// An absolute call target with no usable encoding (no base-address
    /// hint and calls cannot use the PIC thunk form; spec.md §9).
    UnsupportedAbsoluteCall,
    /// A reference to a label that was never defined, with
    /// `autodefine_labels` not set.
    UndefinedLabel(String),
    /// An internal invariant was violated (e.g. a backpatched displacement
    /// no longer fits after resolution). Always a bug.
    LogicError(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOperand(msg) => write!(f, "invalid operand: {msg}"),
            Self::DuplicateLabel(name) => write!(f, "label {name:?} already defined"),
            Self::Unencodable(msg) => write!(f, "cannot encode: {msg}"),
            Self::UnsupportedAbsoluteCall => write!(
                f,
                "absolute call targets cannot be materialized as a pic thunk"
            ),
            Self::UndefinedLabel(name) => write!(f, "undefined label {name:?}"),
            Self::LogicError(msg) => write!(f, "internal assembler error: {msg}"),
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<X86Error> for EncodeError {
    fn from(err: X86Error) -> Self {
        match err {
            X86Error::InvalidArgument(msg) => Self::InvalidOperand(msg),
            X86Error::DisplacementOutOfRange(disp) => {
                Self::InvalidOperand(format!("displacement {disp:#x} out of range"))
            }
            X86Error::Truncated => Self::LogicError("truncated modrm/sib sequence".into()),
        }
    }
}
