//! spec.md §8, scenario 7: "Decoder round-trip." For every instruction
//! emitted in scenarios 5-6, the decoder's output lists the same mnemonic
//! and operand register names as the encoder's input.

use std::collections::BTreeMap;

use memtrace_asm::{Assembler, JumpTarget};
use memtrace_x86::Register;

#[test]
fn jmp_past_128_nops_roundtrips_as_near_jmp_and_ret() {
    let mut asm = Assembler::new();
    asm.jmp(JumpTarget::Label("l".into()));
    for _ in 0..128 {
        asm.nop();
    }
    asm.write_label("l").unwrap();
    asm.ret();
    let out = asm.assemble(0x1000, false, false).unwrap();

    let (listing, err) = memtrace_disasm::decode(&out.bytes, 0x1000, &BTreeMap::new());
    assert!(err.is_none());

    assert_eq!(listing.instructions[0].mnemonic, "jmp");
    assert_eq!(listing.instructions.last().unwrap().mnemonic, "ret");
    assert!(listing.instructions[1..].iter().all(|i| i.mnemonic == "nop" || i.mnemonic == "ret"));

    let target = listing.instructions[0].branch_target.unwrap();
    assert_eq!(target, 0x1000 + out.label_offsets.as_ref().unwrap()["l"]);
}

#[test]
fn jmp_past_126_nops_roundtrips_as_short_jmp() {
    let mut asm = Assembler::new();
    asm.jmp(JumpTarget::Label("l".into()));
    for _ in 0..126 {
        asm.nop();
    }
    asm.write_label("l").unwrap();
    asm.ret();
    let out = asm.assemble(0x2000, false, false).unwrap();

    let (listing, err) = memtrace_disasm::decode(&out.bytes, 0x2000, &BTreeMap::new());
    assert!(err.is_none());
    assert_eq!(listing.instructions[0].mnemonic, "jmp");
    assert_eq!(out.bytes[0], 0xEB);
    assert_eq!(listing.instructions[0].bytes.len(), 2);
}

#[test]
fn mov_rax_label_address_roundtrips_with_matching_register_name() {
    let mut asm = Assembler::new();
    asm.mov_reg_label_address(Register::RAX, "l");
    asm.write_label("l").unwrap();
    asm.ret();
    let out = asm.assemble(0x3000, false, true).unwrap();

    let (listing, err) = memtrace_disasm::decode(&out.bytes, 0x3000, &BTreeMap::new());
    assert!(err.is_none());
    assert_eq!(listing.instructions[0].mnemonic, "mov");
    assert!(listing.instructions[0].operands.starts_with("rax"));
    assert_eq!(listing.instructions[1].mnemonic, "ret");
}
