/// The kind of deferred jump/call placeholder a [`crate::Assembler`] holds
/// until `assemble()` resolves it (spec.md §3, "Stream Item").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Has both a short (`0xEB`) and near (`0xE9`) relative form.
    Jmp,
    /// Has only a near (`0xE8`) relative form — no `call rel8` exists.
    Call,
    /// Has both a short (`0x7?`) and near (`0x0F 8?`) relative form.
    Jcc(memtrace_x86::Condition),
}

impl JumpKind {
    #[must_use]
    pub(crate) fn short_opcode(self) -> Option<Vec<u8>> {
        match self {
            Self::Jmp => Some(vec![0xEB]),
            Self::Call => None,
            Self::Jcc(cc) => Some(vec![cc.short_jcc_opcode()]),
        }
    }

    #[must_use]
    pub(crate) fn near_opcode(self) -> Vec<u8> {
        match self {
            Self::Jmp => vec![0xE9],
            Self::Call => vec![0xE8],
            Self::Jcc(cc) => vec![0x0F, cc.near_jcc_opcode()],
        }
    }
}

/// What a deferred jump/call targets: a label to be resolved during
/// finalization, or a fixed absolute address (spec.md §4.3, "Jumps and
/// calls").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpTarget {
    Label(String),
    Absolute(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JumpItem {
    pub kind: JumpKind,
    pub target: JumpTarget,
}

/// One entry in the assembler's ordered emission stream (spec.md §3,
/// "Stream Item"): either bytes already fully encoded, a label marker, a
/// deferred jump/call, or a reserved 8-byte absolute-address slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamItem {
    Bytes(Vec<u8>),
    Label(String),
    Jump(JumpItem),
    AbsoluteLabelSlot(String),
}

impl StreamItem {
    /// Worst-case byte length used by the forward-reference distance
    /// estimate (spec.md §4.3): a not-yet-resolved jump is assumed to take
    /// its near-form length, since that's the largest it could turn out
    /// to be.
    pub(crate) fn worst_case_len(&self) -> u64 {
        match self {
            Self::Bytes(bytes) => bytes.len() as u64,
            Self::Label(_) => 0,
            Self::Jump(item) => item.kind.near_opcode().len() as u64 + 4,
            Self::AbsoluteLabelSlot(_) => 8,
        }
    }
}
