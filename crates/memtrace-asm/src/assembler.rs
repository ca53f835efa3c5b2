use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use memtrace_x86::{
    AluOp, Condition, MemOperand, Operand, OperandSize, Register, ShiftOp,
};

use crate::encode::{self, Group3Op, IncDecOp, ShiftCount, SseArithOp};
use crate::error::EncodeError;
use crate::stream::{JumpItem, JumpKind, JumpTarget, StreamItem};

/// The finalized output of [`Assembler::assemble`] (spec.md §6, "Assembled
/// output interface"). Returned as an owned struct rather than through
/// output parameters — more idiomatic in Rust than the source's
/// out-parameter shape, and noted as a deliberate deviation in `DESIGN.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledOutput {
    pub bytes: Vec<u8>,
    /// Byte offsets within `bytes` that hold an 8-byte absolute address
    /// needing relocation once the buffer's real load address is known.
    pub absolute_patch_offsets: BTreeSet<u64>,
    /// Every label's final byte offset, present only when the caller asked
    /// for it via [`Assembler::assemble`]'s `want_label_offsets`.
    pub label_offsets: Option<BTreeMap<String, u64>>,
}

struct PendingRelPatch {
    output_offset: usize,
    size: u8,
    end_of_instruction: u64,
    label: String,
}

struct PendingAbsPatch {
    output_offset: usize,
    label: String,
}

/// A streaming AMD64 instruction emitter (spec.md §4.3). Each `emit_*`
/// method appends to an ordered stream; [`Assembler::assemble`] performs
/// the single finalization pass that resolves labels, backpatches forward
/// jumps, and selects short vs near encodings.
#[derive(Default)]
pub struct Assembler {
    items: Vec<StreamItem>,
    defined_labels: HashSet<String>,
}

impl Assembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a label at the current stream position. Rejects a name
    /// already in use (spec.md §4.3: "duplicate names are rejected").
    pub fn write_label(&mut self, name: impl Into<String>) -> Result<(), EncodeError> {
        let name = name.into();
        if !self.defined_labels.insert(name.clone()) {
            return Err(EncodeError::DuplicateLabel(name));
        }
        self.items.push(StreamItem::Label(name));
        Ok(())
    }

    /// Emits 8 zero bytes and records an absolute patch: once the label
    /// resolves, those bytes become `base_address + label_offset`.
    pub fn write_label_address(&mut self, name: impl Into<String>) {
        self.items.push(StreamItem::AbsoluteLabelSlot(name.into()));
    }

    /// `mov dst, imm64` where the immediate is `base_address + label_offset`
    /// (spec.md §8 scenario 6's `mov rax, L`): the opcode and register byte
    /// are emitted immediately, the 8-byte immediate is deferred as an
    /// absolute patch via [`Self::write_label_address`].
    pub fn mov_reg_label_address(&mut self, dst: Register, name: impl Into<String>) {
        let rex = 0x48 | u8::from(dst.needs_rex_extension());
        self.items.push(StreamItem::Bytes(vec![rex, 0xB8 | dst.low3()]));
        self.write_label_address(name);
    }

    pub fn jmp(&mut self, target: JumpTarget) {
        self.items.push(StreamItem::Jump(JumpItem { kind: JumpKind::Jmp, target }));
    }

    pub fn call(&mut self, target: JumpTarget) {
        self.items.push(StreamItem::Jump(JumpItem { kind: JumpKind::Call, target }));
    }

    pub fn jcc(&mut self, cc: Condition, target: JumpTarget) {
        self.items.push(StreamItem::Jump(JumpItem { kind: JumpKind::Jcc(cc), target }));
    }

    fn push(&mut self, result: Result<Vec<u8>, EncodeError>) -> Result<(), EncodeError> {
        self.items.push(StreamItem::Bytes(result?));
        Ok(())
    }

    pub fn ret(&mut self) {
        self.items.push(StreamItem::Bytes(encode::ret()));
    }

    pub fn int3(&mut self) {
        self.items.push(StreamItem::Bytes(encode::int3()));
    }

    pub fn nop(&mut self) {
        self.items.push(StreamItem::Bytes(encode::nop()));
    }

    pub fn push_reg(&mut self, reg: Register) -> Result<(), EncodeError> {
        self.push(encode::push_reg(reg))
    }

    pub fn pop_reg(&mut self, reg: Register) -> Result<(), EncodeError> {
        self.push(encode::pop_reg(reg))
    }

    pub fn lea(&mut self, size: OperandSize, dst: Register, src: MemOperand) -> Result<(), EncodeError> {
        self.push(encode::lea(size, dst, src))
    }

    pub fn alu_reg_reg(&mut self, op: AluOp, size: OperandSize, dst: Register, src: Register) -> Result<(), EncodeError> {
        self.push(encode::alu_reg_reg(op, size, dst, src))
    }

    pub fn alu_reg_mem(&mut self, op: AluOp, size: OperandSize, dst: Register, src: MemOperand) -> Result<(), EncodeError> {
        self.push(encode::alu_reg_mem(op, size, dst, src))
    }

    pub fn alu_mem_reg(&mut self, op: AluOp, size: OperandSize, dst: MemOperand, src: Register) -> Result<(), EncodeError> {
        self.push(encode::alu_mem_reg(op, size, dst, src))
    }

    pub fn alu_rm_imm(&mut self, op: AluOp, size: OperandSize, rm: Operand, imm: i64) -> Result<(), EncodeError> {
        self.push(encode::alu_rm_imm(op, size, rm, imm))
    }

    pub fn mov_reg_reg(&mut self, size: OperandSize, dst: Register, src: Register) -> Result<(), EncodeError> {
        self.push(encode::mov_reg_reg(size, dst, src))
    }

    pub fn mov_reg_mem(&mut self, size: OperandSize, dst: Register, src: MemOperand) -> Result<(), EncodeError> {
        self.push(encode::mov_reg_mem(size, dst, src))
    }

    pub fn mov_mem_reg(&mut self, size: OperandSize, dst: MemOperand, src: Register) -> Result<(), EncodeError> {
        self.push(encode::mov_mem_reg(size, dst, src))
    }

    pub fn mov_rm_imm(&mut self, size: OperandSize, rm: Operand, imm: i64) -> Result<(), EncodeError> {
        self.push(encode::mov_rm_imm(size, rm, imm))
    }

    pub fn mov_reg_imm(&mut self, size: OperandSize, dst: Register, imm: i64) -> Result<(), EncodeError> {
        self.push(encode::mov_reg_imm(size, dst, imm))
    }

    pub fn test_rm_reg(&mut self, size: OperandSize, rm: Operand, reg: Register) -> Result<(), EncodeError> {
        self.push(encode::test_rm_reg(size, rm, reg))
    }

    pub fn group3(&mut self, size: OperandSize, rm: Operand, op: Group3Op) -> Result<(), EncodeError> {
        self.push(encode::group3(size, rm, op))
    }

    pub fn imul_reg_rm(&mut self, size: OperandSize, dst: Register, rm: Operand) -> Result<(), EncodeError> {
        self.push(encode::imul_reg_rm(size, dst, rm))
    }

    pub fn inc_dec(&mut self, size: OperandSize, rm: Operand, op: IncDecOp) -> Result<(), EncodeError> {
        self.push(encode::inc_dec(size, rm, op))
    }

    pub fn shift(&mut self, size: OperandSize, rm: Operand, op: ShiftOp, count: ShiftCount) -> Result<(), EncodeError> {
        self.push(encode::shift(size, rm, op, count))
    }

    pub fn movzx(&mut self, dst_size: OperandSize, dst: Register, src_size: OperandSize, src: Operand) -> Result<(), EncodeError> {
        self.push(encode::movzx(dst_size, dst, src_size, src))
    }

    pub fn setcc(&mut self, cc: Condition, rm: Operand) -> Result<(), EncodeError> {
        self.push(encode::setcc(cc, rm))
    }

    pub fn cmovcc(&mut self, cc: Condition, size: OperandSize, dst: Register, rm: Operand) -> Result<(), EncodeError> {
        self.push(encode::cmovcc(cc, size, dst, rm))
    }

    pub fn movsd_load(&mut self, dst_xmm: Register, src: Operand) -> Result<(), EncodeError> {
        self.push(encode::movsd_load(dst_xmm, src))
    }

    pub fn movsd_store(&mut self, dst: Operand, src_xmm: Register) -> Result<(), EncodeError> {
        self.push(encode::movsd_store(dst, src_xmm))
    }

    pub fn arith_sd(&mut self, op: SseArithOp, dst_xmm: Register, src: Operand) -> Result<(), EncodeError> {
        self.push(encode::arith_sd(op, dst_xmm, src))
    }

    pub fn cvtsi2sd(&mut self, dst_xmm: Register, src: Operand, src_size: OperandSize) -> Result<(), EncodeError> {
        self.push(encode::cvtsi2sd(dst_xmm, src, src_size))
    }

    pub fn cvtsd2si(&mut self, dst: Register, dst_size: OperandSize, src: Operand) -> Result<(), EncodeError> {
        self.push(encode::cvtsd2si(dst, dst_size, src))
    }

    pub fn cmpsd(&mut self, dst_xmm: Register, src: Operand, predicate: u8) -> Result<(), EncodeError> {
        self.push(encode::cmpsd(dst_xmm, src, predicate))
    }

    pub fn movq_to_xmm(&mut self, dst_xmm: Register, src: Operand) -> Result<(), EncodeError> {
        self.push(encode::movq_to_xmm(dst_xmm, src))
    }

    pub fn movq_from_xmm(&mut self, dst: Operand, src_xmm: Register) -> Result<(), EncodeError> {
        self.push(encode::movq_from_xmm(dst, src_xmm))
    }

    pub fn roundsd(&mut self, dst_xmm: Register, src: Operand, mode: u8) -> Result<(), EncodeError> {
        self.push(encode::roundsd(dst_xmm, src, mode))
    }

    /// Resolves every label and deferred jump/call and produces the final
    /// byte string (spec.md §4.3, "Finalization output").
    ///
    /// `base_address` is the "base-address hint" spec.md §4.3 describes
    /// for absolute jump/call targets: `0` means none is available, so an
    /// absolute `jmp` falls back to the PIC thunk and an absolute `call`
    /// is an `Encode` error. `autodefine_labels` tolerates references to
    /// labels that never get defined — their patches are simply skipped.
    pub fn assemble(
        &self,
        base_address: u64,
        autodefine_labels: bool,
        want_label_offsets: bool,
    ) -> Result<AssembledOutput, EncodeError> {
        let mut out = Vec::new();
        let mut resolved: HashMap<String, u64> = HashMap::new();
        let mut pending_rel: Vec<PendingRelPatch> = Vec::new();
        let mut pending_abs: Vec<PendingAbsPatch> = Vec::new();
        let mut absolute_patch_offsets = BTreeSet::new();

        for (idx, item) in self.items.iter().enumerate() {
            match item {
                StreamItem::Bytes(bytes) => out.extend_from_slice(bytes),
                StreamItem::Label(name) => {
                    let offset = out.len() as u64;
                    resolved.insert(name.clone(), offset);
                    self.apply_ready_rel_patches(&mut out, &mut pending_rel, name, offset)?;
                }
                StreamItem::AbsoluteLabelSlot(name) => {
                    pending_abs.push(PendingAbsPatch { output_offset: out.len(), label: name.clone() });
                    out.extend_from_slice(&[0u8; 8]);
                }
                StreamItem::Jump(jump) => {
                    self.emit_jump(
                        jump,
                        idx,
                        base_address,
                        &resolved,
                        &mut out,
                        &mut pending_rel,
                    )?;
                }
            }
        }

        for patch in &pending_rel {
            if !autodefine_labels {
                return Err(EncodeError::UndefinedLabel(patch.label.clone()));
            }
        }

        for patch in pending_abs {
            match resolved.get(&patch.label) {
                Some(&offset) => {
                    let addr = base_address.wrapping_add(offset);
                    out[patch.output_offset..patch.output_offset + 8].copy_from_slice(&addr.to_le_bytes());
                    absolute_patch_offsets.insert(patch.output_offset as u64);
                }
                None if autodefine_labels => {}
                None => return Err(EncodeError::UndefinedLabel(patch.label)),
            }
        }

        let label_offsets = want_label_offsets.then(|| resolved.into_iter().collect());

        Ok(AssembledOutput { bytes: out, absolute_patch_offsets, label_offsets })
    }

    fn apply_ready_rel_patches(
        &self,
        out: &mut [u8],
        pending: &mut Vec<PendingRelPatch>,
        label: &str,
        label_offset: u64,
    ) -> Result<(), EncodeError> {
        let mut i = 0;
        while i < pending.len() {
            if pending[i].label == label {
                let patch = pending.remove(i);
                let disp = label_offset as i64 - patch.end_of_instruction as i64;
                write_displacement(out, patch.output_offset, patch.size, disp)?;
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn emit_jump(
        &self,
        jump: &JumpItem,
        idx: usize,
        base_address: u64,
        resolved: &HashMap<String, u64>,
        out: &mut Vec<u8>,
        pending_rel: &mut Vec<PendingRelPatch>,
    ) -> Result<(), EncodeError> {
        match &jump.target {
            JumpTarget::Absolute(target) => self.emit_absolute_jump(jump.kind, *target, base_address, out),
            JumpTarget::Label(name) => {
                if let Some(&label_offset) = resolved.get(name) {
                    self.emit_backward_label_jump(jump.kind, label_offset, base_address, out)
                } else {
                    self.emit_forward_label_jump(jump.kind, name, idx, out, pending_rel)
                }
            }
        }
    }

    fn emit_absolute_jump(
        &self,
        kind: JumpKind,
        target: u64,
        base_address: u64,
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        if base_address == 0 {
            return match kind {
                JumpKind::Call => Err(EncodeError::UnsupportedAbsoluteCall),
                JumpKind::Jmp | JumpKind::Jcc(_) => {
                    out.extend(encode::absolute_jump_thunk(target));
                    Ok(())
                }
            };
        }

        let current = base_address + out.len() as u64;
        if let Some(short_opcode) = kind.short_opcode() {
            let total = short_opcode.len() as u64 + 1;
            let disp = target as i64 - (current + total) as i64;
            if let Ok(disp8) = i8::try_from(disp) {
                out.extend(short_opcode);
                out.push(disp8 as u8);
                return Ok(());
            }
        }
        let near_opcode = kind.near_opcode();
        let total = near_opcode.len() as u64 + 4;
        let disp = target as i64 - (current + total) as i64;
        if let Ok(disp32) = i32::try_from(disp) {
            out.extend(near_opcode);
            out.extend_from_slice(&disp32.to_le_bytes());
            return Ok(());
        }
        match kind {
            JumpKind::Jmp | JumpKind::Jcc(_) => {
                out.extend(encode::absolute_jump_thunk(target));
                Ok(())
            }
            JumpKind::Call => Err(EncodeError::UnsupportedAbsoluteCall),
        }
    }

    fn emit_backward_label_jump(
        &self,
        kind: JumpKind,
        label_offset: u64,
        base_address: u64,
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        let current = out.len() as u64;
        if let Some(short_opcode) = kind.short_opcode() {
            let total = short_opcode.len() as u64 + 1;
            let disp = label_offset as i64 - (current + total) as i64;
            if let Ok(disp8) = i8::try_from(disp) {
                out.extend(short_opcode);
                out.push(disp8 as u8);
                return Ok(());
            }
        }
        let near_opcode = kind.near_opcode();
        let total = near_opcode.len() as u64 + 4;
        let disp = label_offset as i64 - (current + total) as i64;
        if let Ok(disp32) = i32::try_from(disp) {
            out.extend(near_opcode);
            out.extend_from_slice(&disp32.to_le_bytes());
            return Ok(());
        }
        match kind {
            JumpKind::Jmp => {
                out.extend(encode::absolute_jump_thunk(base_address + label_offset));
                Ok(())
            }
            JumpKind::Call | JumpKind::Jcc(_) => Err(EncodeError::Unencodable(
                "backward branch target exceeds a 32-bit displacement".into(),
            )),
        }
    }

    fn emit_forward_label_jump(
        &self,
        kind: JumpKind,
        label: &str,
        idx: usize,
        out: &mut Vec<u8>,
        pending_rel: &mut Vec<PendingRelPatch>,
    ) -> Result<(), EncodeError> {
        let Some(short_opcode) = kind.short_opcode() else {
            // Call has no short form: always near, always deferred.
            let near_opcode = kind.near_opcode();
            let offset_of_disp = out.len() + near_opcode.len();
            out.extend(near_opcode);
            let end_of_instruction = out.len() as u64 + 4;
            out.extend_from_slice(&[0u8; 4]);
            pending_rel.push(PendingRelPatch {
                output_offset: offset_of_disp,
                size: 4,
                end_of_instruction,
                label: label.to_string(),
            });
            return Ok(());
        };

        let upper_bound = self.worst_case_distance(idx, label);
        if fits_i8_upper_bound(upper_bound) {
            let offset_of_disp = out.len() + short_opcode.len();
            out.extend(short_opcode);
            let end_of_instruction = out.len() as u64 + 1;
            out.push(0);
            pending_rel.push(PendingRelPatch {
                output_offset: offset_of_disp,
                size: 1,
                end_of_instruction,
                label: label.to_string(),
            });
        } else {
            let near_opcode = kind.near_opcode();
            let offset_of_disp = out.len() + near_opcode.len();
            out.extend(near_opcode);
            let end_of_instruction = out.len() as u64 + 4;
            out.extend_from_slice(&[0u8; 4]);
            pending_rel.push(PendingRelPatch {
                output_offset: offset_of_disp,
                size: 4,
                end_of_instruction,
                label: label.to_string(),
            });
        }
        Ok(())
    }

    /// Upper bound on the byte distance from just after item `from_idx` to
    /// the marker for `label`, assuming every other not-yet-resolved jump
    /// takes its near-form length (spec.md §4.3, "Forward references").
    fn worst_case_distance(&self, from_idx: usize, label: &str) -> Option<u64> {
        let mut total = 0u64;
        for item in &self.items[from_idx + 1..] {
            if let StreamItem::Label(name) = item {
                if name == label {
                    return Some(total);
                }
            }
            total += item.worst_case_len();
        }
        None
    }
}

/// `None` (label never found — only possible with `autodefine_labels`,
/// where we must assume worst case) or a bound that doesn't fit in a
/// signed 8-bit displacement forces the near form.
fn fits_i8_upper_bound(upper_bound: Option<u64>) -> bool {
    matches!(upper_bound, Some(b) if b <= i8::MAX as u64)
}

fn write_displacement(out: &mut [u8], offset: usize, size: u8, disp: i64) -> Result<(), EncodeError> {
    match size {
        1 => {
            let d = i8::try_from(disp).map_err(|_| {
                EncodeError::LogicError(format!(
                    "resolved displacement {disp} no longer fits the reserved 1-byte patch"
                ))
            })?;
            out[offset] = d as u8;
        }
        4 => {
            let d = i32::try_from(disp).map_err(|_| {
                EncodeError::LogicError(format!(
                    "resolved displacement {disp} no longer fits the reserved 4-byte patch"
                ))
            })?;
            out[offset..offset + 4].copy_from_slice(&d.to_le_bytes());
        }
        other => return Err(EncodeError::LogicError(format!("unexpected patch size {other}"))),
    }
    Ok(())
}
