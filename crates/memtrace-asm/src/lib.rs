//! Streaming AMD64 instruction emitter (spec.md §4.3): a high-level
//! per-instruction-family emission API, label/jump backpatching with
//! short-vs-near selection, and a PIC absolute-jump thunk fallback.
//!
//! Built on `memtrace-x86`'s register/operand model and ModRM/SIB tables,
//! which `memtrace-disasm` also depends on so encoder and decoder agree on
//! the bit-level encodings without depending on each other.

mod assembler;
mod encode;
mod error;
mod stream;

pub use assembler::{AssembledOutput, Assembler};
pub use encode::{Group3Op, IncDecOp, ShiftCount, SseArithOp};
pub use error::EncodeError;
pub use stream::JumpTarget;

#[cfg(test)]
mod tests {
    use super::*;
    use memtrace_x86::{AluOp, Condition, OperandSize, Register};

    #[test]
    fn basic_add_reg_reg_roundtrips_through_modrm() {
        let mut asm = Assembler::new();
        asm.mov_reg_imm(OperandSize::QuadWord, Register::RAX, 5).unwrap();
        asm.alu_reg_reg(AluOp::Add, OperandSize::QuadWord, Register::RAX, Register::RCX)
            .unwrap();
        asm.ret();
        let out = asm.assemble(0, false, false).unwrap();
        assert!(out.bytes.len() > 4);
        assert!(out.bytes.ends_with(&[0xC3]));
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let mut asm = Assembler::new();
        asm.write_label("l").unwrap();
        assert!(matches!(asm.write_label("l"), Err(EncodeError::DuplicateLabel(_))));
    }

    #[test]
    fn forward_jmp_within_short_range_selects_short() {
        let mut asm = Assembler::new();
        asm.jmp(JumpTarget::Label("l".into()));
        for _ in 0..10 {
            asm.nop();
        }
        asm.write_label("l").unwrap();
        asm.ret();
        let out = asm.assemble(0, false, false).unwrap();
        assert_eq!(out.bytes[0], 0xEB, "short jmp opcode expected");
        assert_eq!(out.bytes.len(), 2 + 10 + 1);
    }

    #[test]
    fn forward_jmp_past_short_range_selects_near() {
        let mut asm = Assembler::new();
        asm.jmp(JumpTarget::Label("l".into()));
        for _ in 0..200 {
            asm.nop();
        }
        asm.write_label("l").unwrap();
        asm.ret();
        let out = asm.assemble(0, false, false).unwrap();
        assert_eq!(out.bytes[0], 0xE9, "near jmp opcode expected");
        assert_eq!(out.bytes.len(), 5 + 200 + 1);
    }

    #[test]
    fn write_label_address_records_one_absolute_patch() {
        let mut asm = Assembler::new();
        asm.write_label_address("l");
        asm.write_label("l").unwrap();
        asm.ret();
        let out = asm.assemble(0x4000, false, true).unwrap();
        assert_eq!(out.absolute_patch_offsets.len(), 1);
        let offset = *out.absolute_patch_offsets.iter().next().unwrap();
        let patched =
            u64::from_le_bytes(out.bytes[offset as usize..offset as usize + 8].try_into().unwrap());
        assert_eq!(patched, 0x4000 + 8);
        assert_eq!(out.label_offsets.unwrap().get("l"), Some(&8));
    }

    #[test]
    fn absolute_jmp_with_no_base_hint_emits_thunk() {
        let mut asm = Assembler::new();
        asm.jmp(JumpTarget::Absolute(0x1234_5678_9abc));
        let out = asm.assemble(0, false, false).unwrap();
        assert_eq!(out.bytes[0], 0x68, "thunk starts with push imm32");
        assert_eq!(out.bytes.last(), Some(&0xC3));
    }

    #[test]
    fn absolute_call_with_no_base_hint_is_an_encode_error() {
        let mut asm = Assembler::new();
        asm.call(JumpTarget::Absolute(0x1000));
        assert!(matches!(
            asm.assemble(0, false, false),
            Err(EncodeError::UnsupportedAbsoluteCall)
        ));
    }

    #[test]
    fn undefined_label_without_autodefine_errors() {
        let mut asm = Assembler::new();
        asm.jmp(JumpTarget::Label("nowhere".into()));
        assert!(matches!(asm.assemble(0, false, false), Err(EncodeError::UndefinedLabel(_))));
    }

    #[test]
    fn undefined_label_with_autodefine_leaves_patch_unapplied() {
        let mut asm = Assembler::new();
        asm.jmp(JumpTarget::Label("nowhere".into()));
        let out = asm.assemble(0, true, false).unwrap();
        // no prior jump in the stream to resolve against, so the engine
        // can't estimate a bound and defaults to the near form.
        assert_eq!(out.bytes[0], 0xE9);
        assert_eq!(&out.bytes[1..5], &[0, 0, 0, 0]);
    }

    #[test]
    fn condition_jcc_short_and_near_both_decode_correctly_sized() {
        let cc = Condition::E;
        let mut asm = Assembler::new();
        asm.jcc(cc, JumpTarget::Label("l".into()));
        asm.nop();
        asm.write_label("l").unwrap();
        let out = asm.assemble(0, false, false).unwrap();
        assert_eq!(out.bytes[0], cc.short_jcc_opcode());
    }
}
