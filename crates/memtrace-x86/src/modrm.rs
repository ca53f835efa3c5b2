use crate::{MemOperand, Operand, Register, X86Error};

/// The ModRM (+ optional SIB, + optional displacement) bytes for one
/// operand pair, plus the three REX extension bits they require. The
/// caller (encoder) still decides REX *byte* emission — whether 0x40
/// itself needs to appear — since that also depends on operand size and
/// the SPL/BPL/SIL/DIL forcing rule (spec.md §4.3, "Prefix order").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModRmEncoding {
    pub bytes: Vec<u8>,
    pub rex_r: bool,
    pub rex_x: bool,
    pub rex_b: bool,
}

fn scale_to_bits(scale: u8) -> Result<u8, X86Error> {
    match scale {
        1 => Ok(0b00),
        2 => Ok(0b01),
        4 => Ok(0b10),
        8 => Ok(0b11),
        other => Err(X86Error::InvalidArgument(format!(
            "scale must be 1, 2, 4 or 8, got {other}"
        ))),
    }
}

fn bits_to_scale(bits: u8) -> u8 {
    1u8 << bits
}

/// `true` when `base`'s ModRM slot collides with the RIP-relative /
/// no-base encodings (`rm == 101`), forcing a displacement byte to appear
/// even when `disp == 0` (spec.md §4.3, "Displacement size selection").
fn steals_no_disp_slot(base: Option<Register>) -> bool {
    matches!(base, Some(b) if b.low3() == 5)
}

fn encode_disp(disp: i64, force_offset: bool) -> Result<(u8, Vec<u8>), X86Error> {
    if disp == 0 && !force_offset {
        Ok((0b00, Vec::new()))
    } else if let Ok(d8) = i8::try_from(disp) {
        Ok((0b01, vec![d8 as u8]))
    } else if let Ok(d32) = i32::try_from(disp) {
        Ok((0b10, d32.to_le_bytes().to_vec()))
    } else {
        Err(X86Error::DisplacementOutOfRange(disp))
    }
}

/// Builds the ModRM (+SIB+disp) bytes for `reg_field` (the opcode's
/// non-r/m operand, or an opcode-extension subcode) paired with `rm`.
pub fn encode_modrm_sib(reg_field: Register, rm: Operand) -> Result<ModRmEncoding, X86Error> {
    let reg_low3 = reg_field.low3();
    let rex_r = reg_field.needs_rex_extension();

    match rm {
        Operand::Direct(rm_reg) => Ok(ModRmEncoding {
            bytes: vec![0b1100_0000 | (reg_low3 << 3) | rm_reg.low3()],
            rex_r,
            rex_x: false,
            rex_b: rm_reg.needs_rex_extension(),
        }),
        Operand::Mem(mem) => encode_mem(reg_low3, rex_r, mem),
    }
}

fn encode_mem(reg_low3: u8, rex_r: bool, mem: MemOperand) -> Result<ModRmEncoding, X86Error> {
    if matches!(mem.base, Some(b) if b.is_rip()) {
        if mem.index.is_some() {
            return Err(X86Error::InvalidArgument(
                "rip-relative addressing cannot carry a scaled index".into(),
            ));
        }
        let modrm = (reg_low3 << 3) | 0b101;
        let mut bytes = vec![modrm];
        let disp = i32::try_from(mem.disp)
            .map_err(|_| X86Error::DisplacementOutOfRange(mem.disp))?;
        bytes.extend_from_slice(&disp.to_le_bytes());
        return Ok(ModRmEncoding {
            bytes,
            rex_r,
            rex_x: false,
            rex_b: false,
        });
    }

    let base_is_rsp_or_r12 = matches!(mem.base, Some(b) if b.low3() == 4);
    let needs_sib = mem.index.is_some() || base_is_rsp_or_r12 || mem.base.is_none();

    if !needs_sib {
        let base = mem.base.expect("needs_sib is false only when base is present");
        let force_offset = steals_no_disp_slot(Some(base));
        let (mode, disp_bytes) = encode_disp(mem.disp, force_offset)?;
        let modrm = (mode << 6) | (reg_low3 << 3) | base.low3();
        let mut bytes = vec![modrm];
        bytes.extend(disp_bytes);
        return Ok(ModRmEncoding {
            bytes,
            rex_r,
            rex_x: false,
            rex_b: base.needs_rex_extension(),
        });
    }

    if let Some(index) = mem.index {
        if index.low3() == 4 && !index.needs_rex_extension() {
            return Err(X86Error::InvalidArgument(
                "rsp cannot be used as a sib index register".into(),
            ));
        }
    }

    let (scale_bits, index_low3, rex_x) = match mem.index {
        Some(idx) => (scale_to_bits(mem.scale)?, idx.low3(), idx.needs_rex_extension()),
        None => (0b00, 0b100, false),
    };
    let force_offset = steals_no_disp_slot(mem.base);
    let (mode, disp_bytes, base_low3, rex_b) = match mem.base {
        Some(base) => {
            let (mode, disp) = encode_disp(mem.disp, force_offset)?;
            (mode, disp, base.low3(), base.needs_rex_extension())
        }
        None => {
            let disp = i32::try_from(mem.disp)
                .map_err(|_| X86Error::DisplacementOutOfRange(mem.disp))?;
            (0b00, disp.to_le_bytes().to_vec(), 0b101, false)
        }
    };

    let modrm = (mode << 6) | (reg_low3 << 3) | 0b100;
    let sib = (scale_bits << 6) | (index_low3 << 3) | base_low3;
    let mut bytes = vec![modrm, sib];
    bytes.extend(disp_bytes);
    Ok(ModRmEncoding {
        bytes,
        rex_r,
        rex_x,
        rex_b,
    })
}

/// The result of decoding one ModRM(+SIB+disp) sequence: the raw 3-bit
/// `reg` field (already extended by `rex_r`) and the fully resolved r/m
/// operand, plus how many bytes were consumed from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedModRm {
    pub reg: Register,
    pub rm: Operand,
    pub len: usize,
}

/// Reverse of [`encode_modrm_sib`]: `bytes` must start at the ModRM byte.
/// The three REX extension bits must already be known from the prefix
/// scan that precedes this call.
pub fn decode_modrm_sib(
    bytes: &[u8],
    rex_r: bool,
    rex_x: bool,
    rex_b: bool,
) -> Result<DecodedModRm, X86Error> {
    let modrm = *bytes.first().ok_or(X86Error::Truncated)?;
    let mode = modrm >> 6;
    let reg_field = (modrm >> 3) & 0b111;
    let rm_field = modrm & 0b111;
    let reg = Register(reg_field | (u8::from(rex_r) << 3));

    if mode == 0b11 {
        let rm_reg = Register(rm_field | (u8::from(rex_b) << 3));
        return Ok(DecodedModRm {
            reg,
            rm: Operand::Direct(rm_reg),
            len: 1,
        });
    }

    if rm_field == 0b100 {
        let sib = *bytes.get(1).ok_or(X86Error::Truncated)?;
        let scale = bits_to_scale(sib >> 6);
        let index_field = (sib >> 3) & 0b111;
        let base_field = sib & 0b111;
        let index = if index_field == 0b100 && !rex_x {
            None
        } else {
            Some(Register(index_field | (u8::from(rex_x) << 3)))
        };

        if mode == 0b00 && base_field == 0b101 {
            let disp = read_i32(bytes, 2)?;
            return Ok(DecodedModRm {
                reg,
                rm: Operand::Mem(MemOperand {
                    base: None,
                    index,
                    scale,
                    disp: i64::from(disp),
                }),
                len: 6,
            });
        }

        let base = Some(Register(base_field | (u8::from(rex_b) << 3)));
        let (disp, disp_len) = match mode {
            0b00 => (0, 0),
            0b01 => (i64::from(*bytes.get(2).ok_or(X86Error::Truncated)? as i8), 1),
            0b10 => (i64::from(read_i32(bytes, 2)?), 4),
            _ => unreachable!("mode 0b11 handled above"),
        };
        return Ok(DecodedModRm {
            reg,
            rm: Operand::Mem(MemOperand {
                base,
                index,
                scale,
                disp,
            }),
            len: 2 + disp_len,
        });
    }

    if mode == 0b00 && rm_field == 0b101 {
        let disp = read_i32(bytes, 1)?;
        return Ok(DecodedModRm {
            reg,
            rm: Operand::Mem(MemOperand::rip_relative(i64::from(disp))),
            len: 5,
        });
    }

    let base = Some(Register(rm_field | (u8::from(rex_b) << 3)));
    let (disp, disp_len) = match mode {
        0b00 => (0, 0),
        0b01 => (i64::from(*bytes.get(1).ok_or(X86Error::Truncated)? as i8), 1),
        0b10 => (i64::from(read_i32(bytes, 1)?), 4),
        _ => unreachable!("mode 0b11 handled above"),
    };
    Ok(DecodedModRm {
        reg,
        rm: Operand::Mem(MemOperand {
            base,
            index: None,
            scale: 1,
            disp,
        }),
        len: 1 + disp_len,
    })
}

fn read_i32(bytes: &[u8], offset: usize) -> Result<i32, X86Error> {
    let slice = bytes.get(offset..offset + 4).ok_or(X86Error::Truncated)?;
    Ok(i32::from_le_bytes(slice.try_into().expect("length checked above")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(reg: Register, rm: Operand) -> (ModRmEncoding, DecodedModRm) {
        let enc = encode_modrm_sib(reg, rm).expect("encode");
        let dec = decode_modrm_sib(&enc.bytes, enc.rex_r, enc.rex_x, enc.rex_b).expect("decode");
        (enc, dec)
    }

    #[test]
    fn direct_register_roundtrips() {
        let (enc, dec) = roundtrip(Register::RAX, Operand::Direct(Register::R12));
        assert_eq!(enc.bytes.len(), 1);
        assert_eq!(dec.rm, Operand::Direct(Register::R12));
        assert_eq!(dec.reg, Register::RAX);
    }

    #[test]
    fn rsp_base_forces_sib() {
        let (enc, dec) = roundtrip(Register::RAX, Operand::Mem(MemOperand::base(Register::RSP)));
        assert_eq!(enc.bytes.len(), 2, "rsp base needs a sib byte even with no disp");
        assert_eq!(
            dec.rm,
            Operand::Mem(MemOperand::base(Register::RSP))
        );
    }

    #[test]
    fn rbp_base_forces_disp8_zero() {
        let mem = MemOperand::base_disp(Register::RBP, 0);
        let (enc, dec) = roundtrip(Register::RAX, Operand::Mem(mem));
        assert_eq!(enc.bytes.len(), 2, "rbp+0 needs a forced disp8");
        assert_eq!(dec.rm, Operand::Mem(mem));
    }

    #[test]
    fn rip_relative_roundtrips() {
        let mem = MemOperand::rip_relative(0x1234);
        let (enc, dec) = roundtrip(Register::RCX, Operand::Mem(mem));
        assert_eq!(enc.bytes.len(), 5);
        assert_eq!(dec.rm, Operand::Mem(mem));
    }

    #[test]
    fn scaled_index_roundtrips() {
        let mem = MemOperand::sib(Some(Register::RBX), Register::RSI, 4, 0x10);
        let (_, dec) = roundtrip(Register::RDX, Operand::Mem(mem));
        assert_eq!(dec.rm, Operand::Mem(mem));
    }

    #[test]
    fn rsp_as_index_is_rejected() {
        let mem = MemOperand::sib(Some(Register::RBX), Register::RSP, 2, 0);
        assert!(encode_modrm_sib(Register::RAX, Operand::Mem(mem)).is_err());
    }

    #[test]
    fn r12_as_index_is_allowed() {
        let mem = MemOperand::sib(Some(Register::RBX), Register::R12, 2, 0);
        assert!(encode_modrm_sib(Register::RAX, Operand::Mem(mem)).is_ok());
    }

    #[test]
    fn rip_with_index_is_rejected() {
        let mem = MemOperand::sib(Some(Register::RIP), Register::RAX, 1, 0);
        assert!(encode_modrm_sib(Register::RCX, Operand::Mem(mem)).is_err());
    }

    #[test]
    fn large_displacement_selects_disp32() {
        let mem = MemOperand::base_disp(Register::RAX, 0x1000);
        let (enc, dec) = roundtrip(Register::RCX, Operand::Mem(mem));
        assert_eq!(enc.bytes.len(), 5);
        assert_eq!(dec.rm, Operand::Mem(mem));
    }
}
