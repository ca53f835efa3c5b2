//! Fixed-size instruction encodings: everything in the emission API that
//! isn't a deferred jump/call or a label. These return plain `Vec<u8>`
//! immediately — no backpatching is ever needed for them.

use memtrace_x86::{
    encode_modrm_sib, AluOp, Condition, MemOperand, Operand, OperandSize, Register, ShiftOp,
};

use crate::error::EncodeError;

fn forces_rex(reg_field: Register, rm: Operand) -> bool {
    reg_field.forces_rex() || matches!(rm, Operand::Direct(r) if r.forces_rex())
}

/// REX byte for a ModRM-bearing instruction, or `None` when the plain
/// `0x40` byte would be redundant (spec.md §4.3, "Prefix order").
fn rex_modrm(w: bool, r: bool, x: bool, b: bool, reg_field: Register, rm: Operand) -> Option<u8> {
    let byte = 0x40 | (u8::from(w) << 3) | (u8::from(r) << 2) | (u8::from(x) << 1) | u8::from(b);
    if byte != 0x40 || forces_rex(reg_field, rm) {
        Some(byte)
    } else {
        None
    }
}

/// REX byte for an opcode with the register packed into its low 3 bits
/// (`push`/`pop`/`mov r, imm`) — there's no `reg` field or SIB, so only the
/// `B` extension bit and the SPL/BPL/SIL/DIL forcing rule apply.
fn rex_opcode_reg(w: bool, b: bool, reg: Register) -> Option<u8> {
    let byte = 0x40 | (u8::from(w) << 3) | u8::from(b);
    if byte != 0x40 || reg.forces_rex() {
        Some(byte)
    } else {
        None
    }
}

fn emit_modrm(
    opcode: &[u8],
    reg_field: Register,
    rm: Operand,
    size: OperandSize,
    extra_prefix: Option<u8>,
) -> Result<Vec<u8>, EncodeError> {
    let enc = encode_modrm_sib(reg_field, rm)?;
    let mut out = Vec::new();
    if let Some(p) = extra_prefix {
        out.push(p);
    }
    if size.needs_operand_size_prefix() {
        out.push(0x66);
    }
    if let Some(rex) = rex_modrm(size.needs_rex_w(), enc.rex_r, enc.rex_x, enc.rex_b, reg_field, rm)
    {
        out.push(rex);
    }
    out.extend_from_slice(opcode);
    out.extend(enc.bytes);
    Ok(out)
}

const fn width_bit(size: OperandSize) -> u8 {
    if matches!(size, OperandSize::Byte) {
        0
    } else {
        1
    }
}

fn check_gpr_size(size: OperandSize) -> Result<(), EncodeError> {
    if matches!(
        size,
        OperandSize::Byte | OperandSize::Word | OperandSize::DoubleWord | OperandSize::QuadWord
    ) {
        Ok(())
    } else {
        Err(EncodeError::Unencodable(format!(
            "{size:?} is not a general-purpose operand size"
        )))
    }
}

/// `op dst, src` where both operands are direct registers. Encoded via the
/// "load" direction (`reg, r/m`) so `dst` occupies the ModRM `reg` field.
pub fn alu_reg_reg(op: AluOp, size: OperandSize, dst: Register, src: Register) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let opcode = op.base_opcode() | 0b10 | width_bit(size);
    emit_modrm(&[opcode], dst, Operand::Direct(src), size, None)
}

/// `op dst, [mem]`.
pub fn alu_reg_mem(op: AluOp, size: OperandSize, dst: Register, src: MemOperand) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let opcode = op.base_opcode() | 0b10 | width_bit(size);
    emit_modrm(&[opcode], dst, Operand::Mem(src), size, None)
}

/// `op [mem], src`.
pub fn alu_mem_reg(op: AluOp, size: OperandSize, dst: MemOperand, src: Register) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let opcode = op.base_opcode() | width_bit(size);
    emit_modrm(&[opcode], src, Operand::Mem(dst), size, None)
}

/// `op rm, imm` — picks the 1-byte sign-extended immediate form (`0x83`)
/// whenever `imm` fits and the operand isn't byte-sized (that form only
/// exists for `Word`/`DoubleWord`/`QuadWord`), else the full-width
/// immediate forms `0x80`/`0x81`.
pub fn alu_rm_imm(op: AluOp, size: OperandSize, rm: Operand, imm: i64) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let reg_field = Register(op.subcode());
    if matches!(size, OperandSize::Byte) {
        let imm8 = i8::try_from(imm)
            .map_err(|_| EncodeError::InvalidOperand(format!("{imm} does not fit in 8 bits")))?;
        let mut out = emit_modrm(&[0x80], reg_field, rm, size, None)?;
        out.push(imm8 as u8);
        return Ok(out);
    }
    if let Ok(imm8) = i8::try_from(imm) {
        let mut out = emit_modrm(&[0x83], reg_field, rm, size, None)?;
        out.push(imm8 as u8);
        return Ok(out);
    }
    let imm32 = i32::try_from(imm)
        .map_err(|_| EncodeError::InvalidOperand(format!("{imm} does not fit in 32 bits")))?;
    let mut out = emit_modrm(&[0x81], reg_field, rm, size, None)?;
    out.extend_from_slice(&imm32.to_le_bytes());
    Ok(out)
}

pub fn mov_reg_reg(size: OperandSize, dst: Register, src: Register) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let opcode = 0x88 | 0b10 | width_bit(size);
    emit_modrm(&[opcode], dst, Operand::Direct(src), size, None)
}

pub fn mov_reg_mem(size: OperandSize, dst: Register, src: MemOperand) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let opcode = 0x88 | 0b10 | width_bit(size);
    emit_modrm(&[opcode], dst, Operand::Mem(src), size, None)
}

pub fn mov_mem_reg(size: OperandSize, dst: MemOperand, src: Register) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let opcode = 0x88 | width_bit(size);
    emit_modrm(&[opcode], src, Operand::Mem(dst), size, None)
}

/// `mov r/m, imm` via the group-11 opcodes `0xC6`/`0xC7` (reg field fixed
/// at 0). Distinct from [`mov_reg_imm`], which uses the register-only
/// `0xB0..=0xBF` form with the immediate embedded after the opcode.
pub fn mov_rm_imm(size: OperandSize, rm: Operand, imm: i64) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let opcode = if matches!(size, OperandSize::Byte) { 0xC6 } else { 0xC7 };
    let mut out = emit_modrm(&[opcode], Register(0), rm, size, None)?;
    match size {
        OperandSize::Byte => {
            let imm8 = i8::try_from(imm)
                .map_err(|_| EncodeError::InvalidOperand(format!("{imm} does not fit in 8 bits")))?;
            out.push(imm8 as u8);
        }
        OperandSize::Word => {
            let imm16 = i16::try_from(imm)
                .map_err(|_| EncodeError::InvalidOperand(format!("{imm} does not fit in 16 bits")))?;
            out.extend_from_slice(&imm16.to_le_bytes());
        }
        _ => {
            let imm32 = i32::try_from(imm)
                .map_err(|_| EncodeError::InvalidOperand(format!("{imm} does not fit in 32 bits")))?;
            out.extend_from_slice(&imm32.to_le_bytes());
        }
    }
    Ok(out)
}

/// `mov r, imm` (`0xB0..=0xBF`): immediate width tracks operand size, and
/// a `QuadWord` destination takes a full 8-byte immediate.
pub fn mov_reg_imm(size: OperandSize, dst: Register, imm: i64) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let opcode_base = if matches!(size, OperandSize::Byte) { 0xB0 } else { 0xB8 };
    let mut out = Vec::new();
    if size.needs_operand_size_prefix() {
        out.push(0x66);
    }
    if let Some(rex) = rex_opcode_reg(size.needs_rex_w(), dst.needs_rex_extension(), dst) {
        out.push(rex);
    }
    out.push(opcode_base | dst.low3());
    match size {
        OperandSize::Byte => out.push(imm as i8 as u8),
        OperandSize::Word => out.extend_from_slice(&(imm as i16).to_le_bytes()),
        OperandSize::DoubleWord => out.extend_from_slice(&(imm as i32).to_le_bytes()),
        OperandSize::QuadWord => out.extend_from_slice(&imm.to_le_bytes()),
        _ => unreachable!("checked by check_gpr_size"),
    }
    Ok(out)
}

pub fn push_reg(reg: Register) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    if let Some(rex) = rex_opcode_reg(false, reg.needs_rex_extension(), reg) {
        out.push(rex);
    }
    out.push(0x50 | reg.low3());
    Ok(out)
}

pub fn pop_reg(reg: Register) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    if let Some(rex) = rex_opcode_reg(false, reg.needs_rex_extension(), reg) {
        out.push(rex);
    }
    out.push(0x58 | reg.low3());
    Ok(out)
}

pub fn lea(size: OperandSize, dst: Register, src: MemOperand) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    if matches!(size, OperandSize::Byte) {
        return Err(EncodeError::Unencodable("lea has no byte form".into()));
    }
    emit_modrm(&[0x8D], dst, Operand::Mem(src), size, None)
}

pub fn ret() -> Vec<u8> {
    vec![0xC3]
}

pub fn int3() -> Vec<u8> {
    vec![0xCC]
}

pub fn nop() -> Vec<u8> {
    vec![0x90]
}

pub fn test_rm_reg(size: OperandSize, rm: Operand, reg: Register) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let opcode = 0x84 | width_bit(size);
    emit_modrm(&[opcode], reg, rm, size, None)
}

/// Group-3 opcodes `0xF6`/`0xF7`: the ModRM `reg` field selects the
/// operation (spec.md §4.4 lists `test/not/neg/mul/imul/div/idiv`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group3Op {
    TestImm(i64),
    Not,
    Neg,
    Mul,
    Imul,
    Div,
    Idiv,
}

pub fn group3(size: OperandSize, rm: Operand, op: Group3Op) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let opcode = 0xF6 | width_bit(size);
    let (subcode, imm) = match op {
        Group3Op::TestImm(v) => (0, Some(v)),
        Group3Op::Not => (2, None),
        Group3Op::Neg => (3, None),
        Group3Op::Mul => (4, None),
        Group3Op::Imul => (5, None),
        Group3Op::Div => (6, None),
        Group3Op::Idiv => (7, None),
    };
    let mut out = emit_modrm(&[opcode], Register(subcode), rm, size, None)?;
    if let Some(v) = imm {
        match size {
            OperandSize::Byte => out.push(i8::try_from(v)
                .map_err(|_| EncodeError::InvalidOperand(format!("{v} does not fit in 8 bits")))?
                as u8),
            _ => out.extend_from_slice(
                &i32::try_from(v)
                    .map_err(|_| EncodeError::InvalidOperand(format!("{v} does not fit in 32 bits")))?
                    .to_le_bytes(),
            ),
        }
    }
    Ok(out)
}

/// `imul dst, r/m` (two-operand form, `0x0F 0xAF`). Byte operand size is
/// rejected — `imul` has no byte-destination encoding (spec.md §7,
/// `Encode` examples).
pub fn imul_reg_rm(size: OperandSize, dst: Register, rm: Operand) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    if matches!(size, OperandSize::Byte) {
        return Err(EncodeError::Unencodable(
            "imul has no byte-operand two-operand form".into(),
        ));
    }
    emit_modrm(&[0x0F, 0xAF], dst, rm, size, None)
}

/// Group-4/5 opcodes `0xFE`/`0xFF`: `inc`/`dec` (both widths), plus the
/// wide-only `push r/m` (subcode 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
    PushRm,
}

pub fn inc_dec(size: OperandSize, rm: Operand, op: IncDecOp) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let subcode = match op {
        IncDecOp::Inc => 0,
        IncDecOp::Dec => 1,
        IncDecOp::PushRm => 6,
    };
    if matches!(op, IncDecOp::PushRm) && matches!(size, OperandSize::Byte) {
        return Err(EncodeError::Unencodable("push r/m has no byte form".into()));
    }
    let opcode = if matches!(size, OperandSize::Byte) { 0xFE } else { 0xFF };
    emit_modrm(&[opcode], Register(subcode), rm, size, None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftCount {
    One,
    Cl,
    Imm(u8),
}

pub fn shift(size: OperandSize, rm: Operand, op: ShiftOp, count: ShiftCount) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    let reg_field = Register(op.subcode());
    match count {
        ShiftCount::One => {
            let opcode = 0xD0 | width_bit(size);
            emit_modrm(&[opcode], reg_field, rm, size, None)
        }
        ShiftCount::Cl => {
            let opcode = 0xD2 | width_bit(size);
            emit_modrm(&[opcode], reg_field, rm, size, None)
        }
        ShiftCount::Imm(amount) => {
            let opcode = 0xC0 | width_bit(size);
            let mut out = emit_modrm(&[opcode], reg_field, rm, size, None)?;
            out.push(amount);
            Ok(out)
        }
    }
}

pub fn movzx(dst_size: OperandSize, dst: Register, src_size: OperandSize, src: Operand) -> Result<Vec<u8>, EncodeError> {
    let opcode = match src_size {
        OperandSize::Byte => 0xB6,
        OperandSize::Word => 0xB7,
        other => return Err(EncodeError::Unencodable(format!("movzx source must be byte or word, got {other:?}"))),
    };
    emit_modrm(&[0x0F, opcode], dst, src, dst_size, None)
}

pub fn setcc(cc: Condition, rm: Operand) -> Result<Vec<u8>, EncodeError> {
    emit_modrm(&[0x0F, cc.setcc_opcode()], Register(0), rm, OperandSize::Byte, None)
}

pub fn cmovcc(cc: Condition, size: OperandSize, dst: Register, rm: Operand) -> Result<Vec<u8>, EncodeError> {
    check_gpr_size(size)?;
    emit_modrm(&[0x0F, cc.cmovcc_opcode()], dst, rm, size, None)
}

// --- SSE scalar-double instructions (spec.md §4.4's xmm-prefixed space) ---

pub fn movsd_load(dst_xmm: Register, src: Operand) -> Result<Vec<u8>, EncodeError> {
    emit_modrm(&[0x0F, 0x10], dst_xmm, src, OperandSize::DoublePrecision, Some(0xF2))
}

pub fn movsd_store(dst: Operand, src_xmm: Register) -> Result<Vec<u8>, EncodeError> {
    emit_modrm(&[0x0F, 0x11], src_xmm, dst, OperandSize::DoublePrecision, Some(0xF2))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseArithOp {
    Add,
    Mul,
    Sub,
    Div,
}

pub fn arith_sd(op: SseArithOp, dst_xmm: Register, src: Operand) -> Result<Vec<u8>, EncodeError> {
    let opcode = match op {
        SseArithOp::Add => 0x58,
        SseArithOp::Mul => 0x59,
        SseArithOp::Sub => 0x5C,
        SseArithOp::Div => 0x5E,
    };
    emit_modrm(&[0x0F, opcode], dst_xmm, src, OperandSize::DoublePrecision, Some(0xF2))
}

pub fn cvtsi2sd(dst_xmm: Register, src: Operand, src_size: OperandSize) -> Result<Vec<u8>, EncodeError> {
    if !matches!(src_size, OperandSize::DoubleWord | OperandSize::QuadWord) {
        return Err(EncodeError::Unencodable(format!(
            "cvtsi2sd source must be a 32 or 64-bit gpr, got {src_size:?}"
        )));
    }
    emit_modrm(&[0x0F, 0x2A], dst_xmm, src, src_size, Some(0xF2))
}

pub fn cvtsd2si(dst: Register, dst_size: OperandSize, src: Operand) -> Result<Vec<u8>, EncodeError> {
    if !matches!(dst_size, OperandSize::DoubleWord | OperandSize::QuadWord) {
        return Err(EncodeError::Unencodable(format!(
            "cvtsd2si destination must be a 32 or 64-bit gpr, got {dst_size:?}"
        )));
    }
    emit_modrm(&[0x0F, 0x2D], dst, src, dst_size, Some(0xF2))
}

pub fn cmpsd(dst_xmm: Register, src: Operand, predicate: u8) -> Result<Vec<u8>, EncodeError> {
    let mut out = emit_modrm(&[0x0F, 0xC2], dst_xmm, src, OperandSize::DoublePrecision, Some(0xF2))?;
    out.push(predicate);
    Ok(out)
}

/// `movq xmm, r/m64` (load) — `66 [REX.W] 0F 6E`.
pub fn movq_to_xmm(dst_xmm: Register, src: Operand) -> Result<Vec<u8>, EncodeError> {
    emit_modrm(&[0x0F, 0x6E], dst_xmm, src, OperandSize::QuadWordXmm, Some(0x66))
}

/// `movq r/m64, xmm` (store) — `66 [REX.W] 0F 7E`.
pub fn movq_from_xmm(dst: Operand, src_xmm: Register) -> Result<Vec<u8>, EncodeError> {
    emit_modrm(&[0x0F, 0x7E], src_xmm, dst, OperandSize::QuadWordXmm, Some(0x66))
}

/// `roundsd xmm, xmm/m64, imm8` — `66 0F 3A 0B /r ib`.
pub fn roundsd(dst_xmm: Register, src: Operand, mode: u8) -> Result<Vec<u8>, EncodeError> {
    let mut out = emit_modrm(&[0x0F, 0x3A, 0x0B], dst_xmm, src, OperandSize::DoublePrecision, Some(0x66))?;
    out.push(mode);
    Ok(out)
}

/// The position-independent absolute-jump thunk (spec.md §4.3): pushes the
/// low 32 bits of `target`, overwrites the high 32 bits of that same
/// stack slot, then `ret`s into it. Never emitted for `call` — a `ret`
/// can't be un-pushed, so control never returns to the caller.
pub fn absolute_jump_thunk(target: u64) -> Vec<u8> {
    let low = target as u32;
    let high = (target >> 32) as u32;
    let mut out = Vec::new();
    out.extend_from_slice(&[0x68]); // push imm32 (sign-extended to 64 on push)
    out.extend_from_slice(&low.to_le_bytes());
    // mov dword [rsp+4], high
    out.push(0xC7);
    out.push(0x44);
    out.push(0x24);
    out.push(0x04);
    out.extend_from_slice(&high.to_le_bytes());
    out.push(0xC3); // ret
    out
}
