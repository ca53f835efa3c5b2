//! spec.md §8, scenario 6: "Encoder absolute patch."

use memtrace_asm::Assembler;

#[test]
fn label_address_patch_points_at_its_target() {
    let mut asm = Assembler::new();
    asm.write_label_address("l");
    asm.write_label("l").unwrap();
    asm.ret();

    let base = 0x1000_0000u64;
    let out = asm.assemble(base, false, true).unwrap();

    assert_eq!(out.absolute_patch_offsets.len(), 1);
    let offset = *out.absolute_patch_offsets.iter().next().unwrap();

    let patched_value =
        u64::from_le_bytes(out.bytes[offset as usize..offset as usize + 8].try_into().unwrap());
    let label_offset = out.label_offsets.as_ref().unwrap()["l"];
    assert_eq!(patched_value, base + label_offset);
    assert_eq!(out.bytes[label_offset as usize], 0xC3, "label lands on the ret");
}
