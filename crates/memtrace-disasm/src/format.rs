use memtrace_x86::{MemOperand, Operand, OperandSize, Register};

/// Renders a memory operand as `[base+index*scale+disp]` / `[rip+disp]`,
/// optionally prefixed with its size keyword (spec.md §4.4, "Line
/// format": the `byte ptr`/`word ptr`/… prefix appears "whenever the
/// memory size differs from the register operand size or when the
/// opcode is size-ambiguous").
pub fn format_mem(mem: MemOperand, size: OperandSize, show_ptr: bool) -> String {
    let mut inner = String::new();
    if let Some(base) = mem.base {
        if base.is_rip() {
            inner.push_str("rip");
        } else {
            inner.push_str(base.name(OperandSize::QuadWord, true));
        }
    }
    if let Some(index) = mem.index {
        if !inner.is_empty() {
            inner.push('+');
        }
        inner.push_str(index.name(OperandSize::QuadWord, true));
        if mem.scale != 1 {
            inner.push('*');
            inner.push_str(&mem.scale.to_string());
        }
    }
    if mem.disp != 0 || inner.is_empty() {
        if !inner.is_empty() {
            inner.push(if mem.disp < 0 { '-' } else { '+' });
            inner.push_str(&format!("{:#x}", mem.disp.unsigned_abs()));
        } else {
            inner.push_str(&format!("{:#x}", mem.disp));
        }
    }
    if show_ptr {
        format!("{} [{inner}]", size.ptr_keyword())
    } else {
        format!("[{inner}]")
    }
}

pub fn format_operand(op: Operand, size: OperandSize, has_rex: bool, show_ptr: bool) -> String {
    match op {
        Operand::Direct(reg) => reg.name(size, has_rex).to_string(),
        Operand::Mem(mem) => format_mem(mem, size, show_ptr),
    }
}

pub fn format_reg(reg: Register, size: OperandSize, has_rex: bool) -> String {
    reg.name(size, has_rex).to_string()
}

pub fn format_imm(imm: i64) -> String {
    format!("{imm:#x}")
}

/// `<16-hex address>  <hex bytes, space-separated, padded to 10 bytes>   <mnemonic, left-padded to 8> <operands>`
/// (spec.md §4.4, "Line format").
pub fn format_line(address: u64, bytes: &[u8], mnemonic: &str, operands: &str) -> String {
    // 10 hex-byte pairs separated by single spaces = 29 columns when full.
    let hex = bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ");
    if operands.is_empty() {
        format!("{address:016x}  {hex:<29} {mnemonic:<8}")
    } else {
        format!("{address:016x}  {hex:<29} {mnemonic:<8} {operands}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rip_relative_formats_without_index() {
        let mem = MemOperand::rip_relative(0x10);
        assert_eq!(format_mem(mem, OperandSize::QuadWord, false), "[rip+0x10]");
    }

    #[test]
    fn negative_displacement_prints_minus() {
        let mem = MemOperand::base_disp(Register::RBP, -8);
        assert_eq!(format_mem(mem, OperandSize::QuadWord, false), "[rbp-0x8]");
    }

    #[test]
    fn ptr_keyword_is_opt_in() {
        let mem = MemOperand::base(Register::RAX);
        assert_eq!(format_mem(mem, OperandSize::Byte, true), "byte ptr [rax]");
    }
}
