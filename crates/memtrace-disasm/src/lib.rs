//! AMD64 decoder: a pure function from bytes to an annotated text listing
//! (spec.md §2, "AMD64 Decoder"). The decoder is the mirror image of
//! `memtrace-asm`'s encoder and shares its opcode tables via `memtrace-x86`,
//! but carries none of the encoder's streaming/backpatch state — decoding a
//! buffer never needs to revisit an earlier instruction.

mod decode;
mod error;
mod format;

use std::collections::BTreeMap;

pub use decode::Instruction;
pub use error::DecodeError;

/// A decoded instruction stream plus the label names synthesized for its
/// jump/call targets, in address order.
#[derive(Debug, Clone)]
pub struct Listing {
    pub instructions: Vec<Instruction>,
    /// Synthesized or caller-supplied label names, keyed by the address
    /// they point at.
    pub labels: BTreeMap<u64, String>,
}

impl Listing {
    /// Renders the listing as text: one line per instruction (spec.md
    /// §4.4's address/hex/mnemonic/operand format), with a `<label>:` line
    /// inserted immediately before the first instruction at or after each
    /// label's address. A label whose address falls strictly between two
    /// instructions (never itself an instruction start — e.g. it points
    /// into the middle of an encoded instruction) is rendered on its own
    /// line annotated `; misaligned`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let starts: BTreeMap<u64, usize> = self
            .instructions
            .iter()
            .enumerate()
            .map(|(i, insn)| (insn.address, i))
            .collect();

        let mut pending_labels: Vec<(&u64, &String)> = self.labels.iter().collect();
        pending_labels.sort_by_key(|(addr, _)| **addr);
        let mut label_iter = pending_labels.into_iter().peekable();

        for insn in &self.instructions {
            while let Some((addr, _)) = label_iter.peek() {
                if **addr > insn.address {
                    break;
                }
                let (addr, name) = label_iter.next().expect("peeked");
                if *addr == insn.address {
                    out.push_str(&format!("{name}:\n"));
                } else if !starts.contains_key(addr) {
                    out.push_str(&format!("{name}: ; misaligned, target {addr:#x}\n"));
                }
            }
            out.push_str(&format_line_for(insn));
            out.push('\n');
        }

        for (addr, name) in label_iter {
            if !starts.contains_key(addr) {
                out.push_str(&format!("{name}: ; misaligned, target {addr:#x}\n"));
            }
        }

        out
    }
}

fn format_line_for(insn: &Instruction) -> String {
    format::format_line(insn.address, &insn.bytes, &insn.mnemonic, &insn.operands)
}

/// Decodes `bytes` starting at `base_address`, synthesizing `labelN` names
/// for every branch target that lands inside the decoded range and isn't
/// already named in `external_labels` (spec.md §4.4, "Label synthesis").
///
/// Decoding stops at the first unsupported or truncated opcode; everything
/// decoded up to that point is still returned, paired with the error.
pub fn decode(
    bytes: &[u8],
    base_address: u64,
    external_labels: &BTreeMap<u64, String>,
) -> (Listing, Option<DecodeError>) {
    let mut instructions = Vec::new();
    let mut offset = 0usize;
    let mut error = None;

    while offset < bytes.len() {
        let addr = base_address + offset as u64;
        match decode::decode_one(&bytes[offset..], addr) {
            Ok(insn) => {
                offset += insn.bytes.len();
                instructions.push(insn);
            }
            Err(err) => {
                error = Some(err);
                break;
            }
        }
    }

    let mut labels = external_labels.clone();
    let mut next_label = labels.len();
    for insn in &instructions {
        if let Some(target) = insn.branch_target {
            labels.entry(target).or_insert_with(|| {
                let name = format!("label{next_label}");
                next_label += 1;
                name
            });
        }
    }

    (Listing { instructions, labels }, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ret_and_nop() {
        let (listing, err) = decode(&[0xC3, 0x90], 0x1000, &BTreeMap::new());
        assert!(err.is_none());
        assert_eq!(listing.instructions.len(), 2);
        assert_eq!(listing.instructions[0].mnemonic, "ret");
        assert_eq!(listing.instructions[1].mnemonic, "nop");
    }

    #[test]
    fn short_jump_gets_a_synthesized_label() {
        // jmp +0 (two-byte encoding, lands on itself + 2 = next instruction)
        let bytes = [0xEB, 0x00, 0xC3];
        let (listing, err) = decode(&bytes, 0x2000, &BTreeMap::new());
        assert!(err.is_none());
        assert_eq!(listing.labels.get(&0x2002), Some(&"label0".to_string()));
        let rendered = listing.render();
        assert!(rendered.contains("label0:"));
        assert!(rendered.contains("jmp"));
    }

    #[test]
    fn truncated_stream_stops_cleanly() {
        let (listing, err) = decode(&[0x0F], 0x3000, &BTreeMap::new());
        assert!(listing.instructions.is_empty());
        assert!(matches!(err, Some(DecodeError::Truncated)));
    }

    #[test]
    fn unsupported_opcode_preserves_prior_instructions() {
        let bytes = [0xC3, 0x0F, 0x05]; // ret, then syscall (not in our catalogue)
        let (listing, err) = decode(&bytes, 0x4000, &BTreeMap::new());
        assert_eq!(listing.instructions.len(), 1);
        assert!(matches!(err, Some(DecodeError::Unsupported(_))));
    }
}
