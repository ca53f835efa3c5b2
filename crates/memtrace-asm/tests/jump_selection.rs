//! spec.md §8, scenario 5: "Encoder forward jump selection."

use memtrace_asm::{Assembler, JumpTarget};

#[test]
fn jmp_past_128_nops_selects_near() {
    let mut asm = Assembler::new();
    asm.jmp(JumpTarget::Label("l".into()));
    for _ in 0..128 {
        asm.nop();
    }
    asm.write_label("l").unwrap();
    asm.ret();
    let out = asm.assemble(0, false, false).unwrap();
    assert_eq!(out.bytes[0], 0xE9, "near jmp (32-bit displacement) expected");
}

#[test]
fn jmp_past_126_nops_selects_short() {
    let mut asm = Assembler::new();
    asm.jmp(JumpTarget::Label("l".into()));
    for _ in 0..126 {
        asm.nop();
    }
    asm.write_label("l").unwrap();
    asm.ret();
    let out = asm.assemble(0, false, false).unwrap();
    assert_eq!(out.bytes[0], 0xEB, "short jmp (8-bit displacement) expected");
}
