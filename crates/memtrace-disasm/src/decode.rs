use memtrace_x86::{decode_modrm_sib, AluOp, Condition, OperandSize, Register, ShiftOp};

use crate::error::DecodeError;
use crate::format::{format_imm, format_operand, format_reg};

/// One decoded instruction (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub bytes: Vec<u8>,
    pub mnemonic: String,
    pub operands: String,
    /// The absolute address a jump/call instruction refers to, if any —
    /// candidates for label synthesis.
    pub branch_target: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Prefixes {
    rex_w: bool,
    rex_r: bool,
    rex_x: bool,
    rex_b: bool,
    has_rex: bool,
    operand_size_word: bool,
    xmm_prefix: bool,
}

impl Prefixes {
    fn width(self, wide_bit: bool) -> OperandSize {
        if !wide_bit {
            OperandSize::Byte
        } else if self.rex_w {
            OperandSize::QuadWord
        } else if self.operand_size_word {
            OperandSize::Word
        } else {
            OperandSize::DoubleWord
        }
    }
}

fn read_prefixes(bytes: &[u8], pos: usize) -> (Prefixes, usize) {
    let mut p = Prefixes::default();
    let mut i = pos;
    loop {
        match bytes.get(i) {
            Some(0x66) => {
                p.operand_size_word = true;
                i += 1;
            }
            Some(0xF2) => {
                p.xmm_prefix = true;
                i += 1;
            }
            Some(&b) if (0x40..=0x4F).contains(&b) => {
                p.has_rex = true;
                p.rex_w = b & 0b1000 != 0;
                p.rex_r = b & 0b0100 != 0;
                p.rex_x = b & 0b0010 != 0;
                p.rex_b = b & 0b0001 != 0;
                i += 1;
                break;
            }
            _ => break,
        }
    }
    (p, i - pos)
}

fn read_i8(bytes: &[u8], pos: usize) -> Result<i8, DecodeError> {
    bytes.get(pos).copied().map(|b| b as i8).ok_or(DecodeError::Truncated)
}

fn read_i32(bytes: &[u8], pos: usize) -> Result<i32, DecodeError> {
    let slice = bytes.get(pos..pos + 4).ok_or(DecodeError::Truncated)?;
    Ok(i32::from_le_bytes(slice.try_into().expect("length checked")))
}

fn read_i64(bytes: &[u8], pos: usize) -> Result<i64, DecodeError> {
    let slice = bytes.get(pos..pos + 8).ok_or(DecodeError::Truncated)?;
    Ok(i64::from_le_bytes(slice.try_into().expect("length checked")))
}

/// Decodes a single instruction starting at `bytes[0]`; `addr` is that
/// byte's absolute address, used to resolve rel8/rel32 branch targets.
pub(crate) fn decode_one(bytes: &[u8], addr: u64) -> Result<Instruction, DecodeError> {
    let (prefixes, prefix_len) = read_prefixes(bytes, 0);
    let opcode = *bytes.get(prefix_len).ok_or(DecodeError::Truncated)?;
    let rest = prefix_len + 1;

    if opcode == 0x0F {
        return decode_two_byte(bytes, addr, prefixes, rest);
    }

    if let Some(op) = AluOp::from_base_opcode(opcode) {
        return decode_alu_modrm(bytes, addr, prefixes, rest, opcode, op);
    }

    match opcode {
        0x50..=0x57 => {
            let reg = Register((opcode & 7) | (u8::from(prefixes.rex_b) << 3));
            finish(bytes, addr, rest, "push", format_reg(reg, OperandSize::QuadWord, true), None)
        }
        0x58..=0x5F => {
            let reg = Register((opcode & 7) | (u8::from(prefixes.rex_b) << 3));
            finish(bytes, addr, rest, "pop", format_reg(reg, OperandSize::QuadWord, true), None)
        }
        0x70..=0x7F => {
            let cc = Condition::from_low_nibble(opcode & 0x0F);
            let disp = read_i8(bytes, rest)?;
            let len = rest + 1;
            let target = (addr + len as u64).wrapping_add(disp as i64 as u64);
            finish(bytes, addr, len, &format!("j{}", cc.mnemonic()), format!("{target:#x}"), Some(target))
        }
        0xE8 => {
            let disp = read_i32(bytes, rest)?;
            let len = rest + 4;
            let target = (addr + len as u64).wrapping_add(disp as i64 as u64);
            finish(bytes, addr, len, "call", format!("{target:#x}"), Some(target))
        }
        0xE9 => {
            let disp = read_i32(bytes, rest)?;
            let len = rest + 4;
            let target = (addr + len as u64).wrapping_add(disp as i64 as u64);
            finish(bytes, addr, len, "jmp", format!("{target:#x}"), Some(target))
        }
        0xEB => {
            let disp = read_i8(bytes, rest)?;
            let len = rest + 1;
            let target = (addr + len as u64).wrapping_add(disp as i64 as u64);
            finish(bytes, addr, len, "jmp", format!("{target:#x}"), Some(target))
        }
        0x80 | 0x81 | 0x83 => decode_group1_imm(bytes, addr, prefixes, rest, opcode),
        0x88..=0x8B => decode_mov_modrm(bytes, addr, prefixes, rest, opcode),
        0x8D => {
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let size = prefixes.width(true);
            let operands = format!(
                "{}, {}",
                format_reg(decoded.reg, size, prefixes.has_rex),
                format_operand(decoded.rm, size, prefixes.has_rex, false)
            );
            finish(bytes, addr, rest + decoded.len, "lea", operands, None)
        }
        0x8F => {
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let size = prefixes.width(true);
            let operands = format_operand(decoded.rm, size, prefixes.has_rex, true);
            finish(bytes, addr, rest + decoded.len, "pop", operands, None)
        }
        0xB0..=0xB7 => {
            let reg = Register((opcode & 7) | (u8::from(prefixes.rex_b) << 3));
            let imm = read_i8(bytes, rest)? as u8;
            finish(bytes, addr, rest + 1, "mov", format!("{}, {:#x}", format_reg(reg, OperandSize::Byte, prefixes.has_rex), imm), None)
        }
        0xB8..=0xBF => {
            let reg = Register((opcode & 7) | (u8::from(prefixes.rex_b) << 3));
            let size = prefixes.width(true);
            let (imm, len) = if prefixes.rex_w {
                (read_i64(bytes, rest)?, rest + 8)
            } else {
                (i64::from(read_i32(bytes, rest)?), rest + 4)
            };
            finish(bytes, addr, len, "mov", format!("{}, {}", format_reg(reg, size, prefixes.has_rex), format_imm(imm)), None)
        }
        0xC0 | 0xC1 => decode_shift(bytes, addr, prefixes, rest, opcode, true),
        0xD0..=0xD3 => decode_shift(bytes, addr, prefixes, rest, opcode, false),
        0xC6 | 0xC7 => decode_mov_rm_imm(bytes, addr, prefixes, rest, opcode),
        0xCC => finish(bytes, addr, rest, "int3", String::new(), None),
        0xCD => {
            let imm = read_i8(bytes, rest)? as u8;
            finish(bytes, addr, rest + 1, "int", format!("{imm:#x}"), None)
        }
        0xC3 => finish(bytes, addr, rest, "ret", String::new(), None),
        0x90 => finish(bytes, addr, rest, "nop", String::new(), None),
        0xF6 | 0xF7 => decode_group3(bytes, addr, prefixes, rest, opcode),
        0xFE | 0xFF => decode_group45(bytes, addr, prefixes, rest, opcode),
        other => Err(DecodeError::Unsupported(format!("opcode {other:#x}"))),
    }
}

fn finish(
    bytes: &[u8],
    addr: u64,
    len: usize,
    mnemonic: &str,
    operands: String,
    branch_target: Option<u64>,
) -> Result<Instruction, DecodeError> {
    if bytes.len() < len {
        return Err(DecodeError::Truncated);
    }
    Ok(Instruction {
        address: addr,
        bytes: bytes[..len].to_vec(),
        mnemonic: mnemonic.to_string(),
        operands,
        branch_target,
    })
}

fn decode_alu_modrm(
    bytes: &[u8],
    addr: u64,
    prefixes: Prefixes,
    rest: usize,
    opcode: u8,
    op: AluOp,
) -> Result<Instruction, DecodeError> {
    let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
    let size = prefixes.width(opcode & 1 != 0);
    let store = opcode & 0b10 == 0;
    let operands = if store {
        format!(
            "{}, {}",
            format_operand(decoded.rm, size, prefixes.has_rex, false),
            format_reg(decoded.reg, size, prefixes.has_rex)
        )
    } else {
        format!(
            "{}, {}",
            format_reg(decoded.reg, size, prefixes.has_rex),
            format_operand(decoded.rm, size, prefixes.has_rex, false)
        )
    };
    finish(bytes, addr, rest + decoded.len, op.mnemonic(), operands, None)
}

fn decode_mov_modrm(
    bytes: &[u8],
    addr: u64,
    prefixes: Prefixes,
    rest: usize,
    opcode: u8,
) -> Result<Instruction, DecodeError> {
    let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
    let size = prefixes.width(opcode & 1 != 0);
    let store = opcode & 0b10 == 0;
    let operands = if store {
        format!(
            "{}, {}",
            format_operand(decoded.rm, size, prefixes.has_rex, false),
            format_reg(decoded.reg, size, prefixes.has_rex)
        )
    } else {
        format!(
            "{}, {}",
            format_reg(decoded.reg, size, prefixes.has_rex),
            format_operand(decoded.rm, size, prefixes.has_rex, false)
        )
    };
    finish(bytes, addr, rest + decoded.len, "mov", operands, None)
}

fn decode_group1_imm(
    bytes: &[u8],
    addr: u64,
    prefixes: Prefixes,
    rest: usize,
    opcode: u8,
) -> Result<Instruction, DecodeError> {
    let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
    let op = AluOp::from_subcode(decoded.reg.0 & 7).ok_or(DecodeError::Unsupported("bad group1 subcode".into()))?;
    let size = prefixes.width(opcode != 0x80);
    let after_modrm = rest + decoded.len;
    let (imm, len) = match opcode {
        0x80 | 0x83 => (i64::from(read_i8(bytes, after_modrm)?), after_modrm + 1),
        _ => (i64::from(read_i32(bytes, after_modrm)?), after_modrm + 4),
    };
    let operands = format!("{}, {}", format_operand(decoded.rm, size, prefixes.has_rex, true), format_imm(imm));
    finish(bytes, addr, len, op.mnemonic(), operands, None)
}

fn decode_mov_rm_imm(
    bytes: &[u8],
    addr: u64,
    prefixes: Prefixes,
    rest: usize,
    opcode: u8,
) -> Result<Instruction, DecodeError> {
    let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
    let size = prefixes.width(opcode != 0xC6);
    let after_modrm = rest + decoded.len;
    let (imm, len) = match size {
        OperandSize::Byte => (i64::from(read_i8(bytes, after_modrm)?), after_modrm + 1),
        OperandSize::Word => {
            let slice = bytes.get(after_modrm..after_modrm + 2).ok_or(DecodeError::Truncated)?;
            (i64::from(i16::from_le_bytes(slice.try_into().expect("checked"))), after_modrm + 2)
        }
        _ => (i64::from(read_i32(bytes, after_modrm)?), after_modrm + 4),
    };
    let operands = format!("{}, {}", format_operand(decoded.rm, size, prefixes.has_rex, true), format_imm(imm));
    finish(bytes, addr, len, "mov", operands, None)
}

fn decode_shift(
    bytes: &[u8],
    addr: u64,
    prefixes: Prefixes,
    rest: usize,
    opcode: u8,
    has_imm: bool,
) -> Result<Instruction, DecodeError> {
    let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
    let shift_op = ShiftOp::from_subcode(decoded.reg.0 & 7).ok_or(DecodeError::Unsupported("bad shift subcode".into()))?;
    let size = prefixes.width(opcode & 1 != 0);
    let after_modrm = rest + decoded.len;
    let rm_str = format_operand(decoded.rm, size, prefixes.has_rex, true);
    if has_imm {
        let amount = read_i8(bytes, after_modrm)? as u8;
        let operands = format!("{rm_str}, {amount:#x}");
        finish(bytes, addr, after_modrm + 1, shift_op.mnemonic(), operands, None)
    } else {
        let by_cl = opcode & 0b10 != 0;
        let operands = if by_cl { format!("{rm_str}, cl") } else { rm_str };
        finish(bytes, addr, after_modrm, shift_op.mnemonic(), operands, None)
    }
}

fn decode_group3(
    bytes: &[u8],
    addr: u64,
    prefixes: Prefixes,
    rest: usize,
    opcode: u8,
) -> Result<Instruction, DecodeError> {
    let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
    let size = prefixes.width(opcode & 1 != 0);
    let after_modrm = rest + decoded.len;
    let rm_str = format_operand(decoded.rm, size, prefixes.has_rex, true);
    match decoded.reg.0 & 7 {
        0 | 1 => {
            let (imm, len) = if matches!(size, OperandSize::Byte) {
                (i64::from(read_i8(bytes, after_modrm)?), after_modrm + 1)
            } else {
                (i64::from(read_i32(bytes, after_modrm)?), after_modrm + 4)
            };
            finish(bytes, addr, len, "test", format!("{rm_str}, {}", format_imm(imm)), None)
        }
        2 => finish(bytes, addr, after_modrm, "not", rm_str, None),
        3 => finish(bytes, addr, after_modrm, "neg", rm_str, None),
        4 => finish(bytes, addr, after_modrm, "mul", rm_str, None),
        5 => finish(bytes, addr, after_modrm, "imul", rm_str, None),
        6 => finish(bytes, addr, after_modrm, "div", rm_str, None),
        7 => finish(bytes, addr, after_modrm, "idiv", rm_str, None),
        _ => unreachable!("3-bit field"),
    }
}

fn decode_group45(
    bytes: &[u8],
    addr: u64,
    prefixes: Prefixes,
    rest: usize,
    opcode: u8,
) -> Result<Instruction, DecodeError> {
    let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
    let size = prefixes.width(opcode != 0xFE);
    let len = rest + decoded.len;
    let rm_str = format_operand(decoded.rm, size, prefixes.has_rex, true);
    match decoded.reg.0 & 7 {
        0 => finish(bytes, addr, len, "inc", rm_str, None),
        1 => finish(bytes, addr, len, "dec", rm_str, None),
        2 if opcode == 0xFF => finish(bytes, addr, len, "call", rm_str, None),
        4 if opcode == 0xFF => finish(bytes, addr, len, "jmp", rm_str, None),
        6 if opcode == 0xFF => finish(bytes, addr, len, "push", rm_str, None),
        other => Err(DecodeError::Unsupported(format!("group4/5 subcode {other}"))),
    }
}

fn decode_two_byte(
    bytes: &[u8],
    addr: u64,
    prefixes: Prefixes,
    rest: usize,
) -> Result<Instruction, DecodeError> {
    let opcode2 = *bytes.get(rest).ok_or(DecodeError::Truncated)?;
    let rest = rest + 1;

    match opcode2 {
        0x3A => {
            let opcode3 = *bytes.get(rest).ok_or(DecodeError::Truncated)?;
            if opcode3 == 0x0B {
                let modrm_pos = rest + 1;
                let decoded = decode_modrm_sib(&bytes[modrm_pos..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
                let after_modrm = modrm_pos + decoded.len;
                let mode = read_i8(bytes, after_modrm)? as u8;
                let operands = format!(
                    "{}, {}, {:#x}",
                    format_reg(decoded.reg, OperandSize::DoublePrecision, true),
                    format_operand(decoded.rm, OperandSize::DoublePrecision, true, false),
                    mode
                );
                finish(bytes, addr, after_modrm + 1, "roundsd", operands, None)
            } else {
                Err(DecodeError::Unsupported(format!("0f3a {opcode3:#x}")))
            }
        }
        0x40..=0x4F => {
            let cc = Condition::from_low_nibble(opcode2 & 0x0F);
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let size = prefixes.width(true);
            let operands = format!(
                "{}, {}",
                format_reg(decoded.reg, size, prefixes.has_rex),
                format_operand(decoded.rm, size, prefixes.has_rex, false)
            );
            finish(bytes, addr, rest + decoded.len, &format!("cmov{}", cc.mnemonic()), operands, None)
        }
        0x80..=0x8F => {
            let cc = Condition::from_low_nibble(opcode2 & 0x0F);
            let disp = read_i32(bytes, rest)?;
            let len = rest + 4;
            let target = (addr + len as u64).wrapping_add(disp as i64 as u64);
            finish(bytes, addr, len, &format!("j{}", cc.mnemonic()), format!("{target:#x}"), Some(target))
        }
        0x90..=0x9F => {
            let cc = Condition::from_low_nibble(opcode2 & 0x0F);
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let operands = format_operand(decoded.rm, OperandSize::Byte, prefixes.has_rex, true);
            finish(bytes, addr, rest + decoded.len, &format!("set{}", cc.mnemonic()), operands, None)
        }
        0xAF => {
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let size = prefixes.width(true);
            let operands = format!(
                "{}, {}",
                format_reg(decoded.reg, size, prefixes.has_rex),
                format_operand(decoded.rm, size, prefixes.has_rex, false)
            );
            finish(bytes, addr, rest + decoded.len, "imul", operands, None)
        }
        0xB6 | 0xB7 => {
            let src_size = if opcode2 == 0xB6 { OperandSize::Byte } else { OperandSize::Word };
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let dst_size = prefixes.width(true);
            let operands = format!(
                "{}, {}",
                format_reg(decoded.reg, dst_size, prefixes.has_rex),
                format_operand(decoded.rm, src_size, prefixes.has_rex, true)
            );
            finish(bytes, addr, rest + decoded.len, "movzx", operands, None)
        }
        0x10 | 0x11 if prefixes.xmm_prefix => {
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let (mnemonic, operands) = if opcode2 == 0x10 {
                (
                    "movsd",
                    format!(
                        "{}, {}",
                        format_reg(decoded.reg, OperandSize::DoublePrecision, true),
                        format_operand(decoded.rm, OperandSize::DoublePrecision, true, false)
                    ),
                )
            } else {
                (
                    "movsd",
                    format!(
                        "{}, {}",
                        format_operand(decoded.rm, OperandSize::DoublePrecision, true, false),
                        format_reg(decoded.reg, OperandSize::DoublePrecision, true)
                    ),
                )
            };
            finish(bytes, addr, rest + decoded.len, mnemonic, operands, None)
        }
        0x58 | 0x59 | 0x5C | 0x5E if prefixes.xmm_prefix => {
            let mnemonic = match opcode2 {
                0x58 => "addsd",
                0x59 => "mulsd",
                0x5C => "subsd",
                _ => "divsd",
            };
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let operands = format!(
                "{}, {}",
                format_reg(decoded.reg, OperandSize::DoublePrecision, true),
                format_operand(decoded.rm, OperandSize::DoublePrecision, true, false)
            );
            finish(bytes, addr, rest + decoded.len, mnemonic, operands, None)
        }
        0x2A if prefixes.xmm_prefix => {
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let src_size = if prefixes.rex_w { OperandSize::QuadWord } else { OperandSize::DoubleWord };
            let operands = format!(
                "{}, {}",
                format_reg(decoded.reg, OperandSize::DoublePrecision, true),
                format_operand(decoded.rm, src_size, true, false)
            );
            finish(bytes, addr, rest + decoded.len, "cvtsi2sd", operands, None)
        }
        0x2D if prefixes.xmm_prefix => {
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let dst_size = if prefixes.rex_w { OperandSize::QuadWord } else { OperandSize::DoubleWord };
            let operands = format!(
                "{}, {}",
                format_reg(decoded.reg, dst_size, true),
                format_operand(decoded.rm, OperandSize::DoublePrecision, true, false)
            );
            finish(bytes, addr, rest + decoded.len, "cvtsd2si", operands, None)
        }
        0xC2 if prefixes.xmm_prefix => {
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let after_modrm = rest + decoded.len;
            let predicate = read_i8(bytes, after_modrm)? as u8;
            let operands = format!(
                "{}, {}, {:#x}",
                format_reg(decoded.reg, OperandSize::DoublePrecision, true),
                format_operand(decoded.rm, OperandSize::DoublePrecision, true, false),
                predicate
            );
            finish(bytes, addr, after_modrm + 1, "cmpsd", operands, None)
        }
        0x6E if prefixes.operand_size_word => {
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let src_size = if prefixes.rex_w { OperandSize::QuadWord } else { OperandSize::DoubleWord };
            let operands = format!(
                "{}, {}",
                format_reg(decoded.reg, OperandSize::QuadWordXmm, true),
                format_operand(decoded.rm, src_size, true, false)
            );
            finish(bytes, addr, rest + decoded.len, "movq", operands, None)
        }
        0x7E if prefixes.operand_size_word => {
            let decoded = decode_modrm_sib(&bytes[rest..], prefixes.rex_r, prefixes.rex_x, prefixes.rex_b)?;
            let dst_size = if prefixes.rex_w { OperandSize::QuadWord } else { OperandSize::DoubleWord };
            let operands = format!(
                "{}, {}",
                format_operand(decoded.rm, dst_size, true, false),
                format_reg(decoded.reg, OperandSize::QuadWordXmm, true)
            );
            finish(bytes, addr, rest + decoded.len, "movq", operands, None)
        }
        other => Err(DecodeError::Unsupported(format!("0f {other:#x}"))),
    }
}
