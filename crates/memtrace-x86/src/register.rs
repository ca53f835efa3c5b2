/// A general-purpose AMD64 register, or the `RIP` pseudo-register used in
/// `[rip + disp32]` addressing.
///
/// Encodes as the raw register number the hardware uses: 0..=15 for the
/// sixteen GPRs (`rax`..`r15`), 16 for the `rip` marker (never itself
/// encoded into a ModRM byte — it only ever appears as `Operand::Mem`'s
/// base), and 17..=20 for the byte-register aliases `spl`/`bpl`/`sil`/`dil`
/// that share ModRM slots 4..=7 with `ah`/`ch`/`dh`/`bh` but require an
/// empty REX prefix to select (spec.md §4.3, "Register encoding").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(pub u8);

macro_rules! gpr_consts {
    ($($name:ident = $val:expr),* $(,)?) => {
        $(pub const $name: Register = Register($val);)*
    };
}

impl Register {
    gpr_consts! {
        RAX = 0, RCX = 1, RDX = 2, RBX = 3,
        RSP = 4, RBP = 5, RSI = 6, RDI = 7,
        R8 = 8, R9 = 9, R10 = 10, R11 = 11,
        R12 = 12, R13 = 13, R14 = 14, R15 = 15,
    }

    /// The `rip` pseudo-register: valid only as a memory operand's base.
    pub const RIP: Register = Register(16);

    gpr_consts! {
        SPL = 17, BPL = 18, SIL = 19, DIL = 20,
    }

    /// `true` for the four byte-register aliases that require an empty
    /// REX prefix (0x40) to distinguish them from `ah`/`ch`/`dh`/`bh`.
    #[must_use]
    pub const fn forces_rex(self) -> bool {
        matches!(self.0, 17..=20)
    }

    /// `true` for `r8`..`r15`, which need a REX extension bit wherever
    /// they appear in a ModRM/SIB field.
    #[must_use]
    pub const fn needs_rex_extension(self) -> bool {
        matches!(self.0, 8..=15)
    }

    #[must_use]
    pub const fn is_rip(self) -> bool {
        self.0 == Self::RIP.0
    }

    /// The 3-bit field this register occupies in a ModRM reg/rm slot or a
    /// SIB base/index slot.
    #[must_use]
    pub const fn low3(self) -> u8 {
        match self.0 {
            17 => 4, // spl shares rm=4 with ah
            18 => 5, // bpl shares rm=5 with ch
            19 => 6, // sil shares rm=6 with dh
            20 => 7, // dil shares rm=7 with bh
            n => n & 7,
        }
    }

    /// Register name at the given operand width, the way the decoder
    /// prints operands. `is_high_byte` selects `ah/ch/dh/bh` over
    /// `spl/bpl/sil/dil` for register numbers 4..=7 at `Byte` width when no
    /// REX prefix was present on the instruction.
    #[must_use]
    pub fn name(self, size: super::OperandSize, has_rex: bool) -> &'static str {
        use super::OperandSize::{Byte, DoubleWord, DoublePrecision, QuadWord, QuadWordXmm, SinglePrecision, Word};
        if matches!(size, SinglePrecision | DoublePrecision | QuadWordXmm) {
            return XMM_NAMES[(self.0 & 0xF) as usize];
        }
        match self.0 {
            17..=20 => BYTE_REX_NAMES[(self.0 - 17) as usize],
            0..=15 if size == Byte && !has_rex && (4..=7).contains(&self.0) => {
                BYTE_HIGH_NAMES[(self.0 - 4) as usize]
            }
            0..=15 => match size {
                Byte => BYTE_NAMES[self.0 as usize],
                Word => WORD_NAMES[self.0 as usize],
                DoubleWord => DWORD_NAMES[self.0 as usize],
                QuadWord => QWORD_NAMES[self.0 as usize],
                _ => unreachable!(),
            },
            _ => "rip",
        }
    }
}

const BYTE_NAMES: [&str; 16] = [
    "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b",
    "r13b", "r14b", "r15b",
];
const BYTE_HIGH_NAMES: [&str; 4] = ["ah", "ch", "dh", "bh"];
const BYTE_REX_NAMES: [&str; 4] = ["spl", "bpl", "sil", "dil"];
const WORD_NAMES: [&str; 16] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w", "r13w",
    "r14w", "r15w",
];
const DWORD_NAMES: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d", "r12d",
    "r13d", "r14d", "r15d",
];
const QWORD_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13",
    "r14", "r15",
];
const XMM_NAMES: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OperandSize;

    #[test]
    fn spl_family_shares_slot_with_high_bytes() {
        assert_eq!(Register::SPL.low3(), Register::RSP.low3());
        assert!(Register::SPL.forces_rex());
        assert!(!Register::RSP.forces_rex());
    }

    #[test]
    fn high_byte_names_need_no_rex() {
        assert_eq!(Register::RSP.name(OperandSize::Byte, false), "ah");
        assert_eq!(Register::SPL.name(OperandSize::Byte, true), "spl");
    }

    #[test]
    fn extended_registers_need_rex() {
        assert!(Register::R12.needs_rex_extension());
        assert!(!Register::RBX.needs_rex_extension());
    }
}
