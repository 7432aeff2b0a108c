//! The FV-1 instruction set: mnemonics, register map, operand fields and
//! the native 32-bit word encoding.

use crate::dsp::fixed::{Coeff, Format};
use crate::error::AsmError;
use serde::Serialize;
use std::str::FromStr;

/// Instruction memory size.
pub const PROGRAM_SIZE: usize = 128;
/// Delay memory size in words.
pub const DELAY_SIZE: usize = 32768;
/// Mask applied to every delay-memory address.
pub const DELAY_MASK: u16 = (DELAY_SIZE - 1) as u16;
/// Number of addressable registers.
pub const REGISTER_COUNT: usize = 64;

// ── Mnemonics ───────────────────────────────────────────────

/// Source-level mnemonics, pseudo-ops included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Mnemonic {
    Rda,
    Rmpa,
    Wra,
    Wrap,
    Rdax,
    Rdfx,
    Ldax,
    Wrax,
    Wrhx,
    Wrlx,
    Maxx,
    Absa,
    Mulx,
    Log,
    Exp,
    Sof,
    And,
    Or,
    Xor,
    Not,
    Clr,
    Skp,
    Nop,
    Wlds,
    Wldr,
    Jam,
    Cho,
}

impl Mnemonic {
    pub const ALL: [Mnemonic; 27] = [
        Mnemonic::Rda,
        Mnemonic::Rmpa,
        Mnemonic::Wra,
        Mnemonic::Wrap,
        Mnemonic::Rdax,
        Mnemonic::Rdfx,
        Mnemonic::Ldax,
        Mnemonic::Wrax,
        Mnemonic::Wrhx,
        Mnemonic::Wrlx,
        Mnemonic::Maxx,
        Mnemonic::Absa,
        Mnemonic::Mulx,
        Mnemonic::Log,
        Mnemonic::Exp,
        Mnemonic::Sof,
        Mnemonic::And,
        Mnemonic::Or,
        Mnemonic::Xor,
        Mnemonic::Not,
        Mnemonic::Clr,
        Mnemonic::Skp,
        Mnemonic::Nop,
        Mnemonic::Wlds,
        Mnemonic::Wldr,
        Mnemonic::Jam,
        Mnemonic::Cho,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mnemonic::Rda => "RDA",
            Mnemonic::Rmpa => "RMPA",
            Mnemonic::Wra => "WRA",
            Mnemonic::Wrap => "WRAP",
            Mnemonic::Rdax => "RDAX",
            Mnemonic::Rdfx => "RDFX",
            Mnemonic::Ldax => "LDAX",
            Mnemonic::Wrax => "WRAX",
            Mnemonic::Wrhx => "WRHX",
            Mnemonic::Wrlx => "WRLX",
            Mnemonic::Maxx => "MAXX",
            Mnemonic::Absa => "ABSA",
            Mnemonic::Mulx => "MULX",
            Mnemonic::Log => "LOG",
            Mnemonic::Exp => "EXP",
            Mnemonic::Sof => "SOF",
            Mnemonic::And => "AND",
            Mnemonic::Or => "OR",
            Mnemonic::Xor => "XOR",
            Mnemonic::Not => "NOT",
            Mnemonic::Clr => "CLR",
            Mnemonic::Skp => "SKP",
            Mnemonic::Nop => "NOP",
            Mnemonic::Wlds => "WLDS",
            Mnemonic::Wldr => "WLDR",
            Mnemonic::Jam => "JAM",
            Mnemonic::Cho => "CHO",
        }
    }
}

impl FromStr for Mnemonic {
    type Err = ();

    /// Case-insensitive lookup.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mnemonic::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

// ── Operand fields ──────────────────────────────────────────

/// A register address (0..63).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Reg(pub u8);

impl Reg {
    pub const SIN0_RATE: Reg = Reg(0x00);
    pub const SIN0_RANGE: Reg = Reg(0x01);
    pub const SIN1_RATE: Reg = Reg(0x02);
    pub const SIN1_RANGE: Reg = Reg(0x03);
    pub const RMP0_RATE: Reg = Reg(0x04);
    pub const RMP0_RANGE: Reg = Reg(0x05);
    pub const RMP1_RATE: Reg = Reg(0x06);
    pub const RMP1_RANGE: Reg = Reg(0x07);
    pub const POT0: Reg = Reg(0x10);
    pub const POT1: Reg = Reg(0x11);
    pub const POT2: Reg = Reg(0x12);
    pub const ADCL: Reg = Reg(0x14);
    pub const ADCR: Reg = Reg(0x15);
    pub const DACL: Reg = Reg(0x16);
    pub const DACR: Reg = Reg(0x17);
    pub const ADDR_PTR: Reg = Reg(0x18);
    pub const REG0: Reg = Reg(0x20);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Symbolic name, if the address has one.
    pub fn name(self) -> Option<String> {
        if self.0 >= Reg::REG0.0 && (self.0 as usize) < REGISTER_COUNT {
            return Some(format!("REG{}", self.0 - Reg::REG0.0));
        }
        NAMED_REGISTERS
            .iter()
            .find(|(_, r)| *r == self)
            .map(|(n, _)| (*n).to_string())
    }
}

/// Registers with fixed names; `REG0`..`REG31` are handled separately.
pub const NAMED_REGISTERS: [(&str, Reg); 16] = [
    ("SIN0_RATE", Reg::SIN0_RATE),
    ("SIN0_RANGE", Reg::SIN0_RANGE),
    ("SIN1_RATE", Reg::SIN1_RATE),
    ("SIN1_RANGE", Reg::SIN1_RANGE),
    ("RMP0_RATE", Reg::RMP0_RATE),
    ("RMP0_RANGE", Reg::RMP0_RANGE),
    ("RMP1_RATE", Reg::RMP1_RATE),
    ("RMP1_RANGE", Reg::RMP1_RANGE),
    ("POT0", Reg::POT0),
    ("POT1", Reg::POT1),
    ("POT2", Reg::POT2),
    ("ADCL", Reg::ADCL),
    ("ADCR", Reg::ADCR),
    ("DACL", Reg::DACL),
    ("DACR", Reg::DACR),
    ("ADDR_PTR", Reg::ADDR_PTR),
];

/// LFO selector as used by CHO (2 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Lfo {
    Sin0 = 0,
    Sin1 = 1,
    Rmp0 = 2,
    Rmp1 = 3,
}

impl Lfo {
    pub const ALL: [Lfo; 4] = [Lfo::Sin0, Lfo::Sin1, Lfo::Rmp0, Lfo::Rmp1];

    pub fn from_index(i: u32) -> Lfo {
        Lfo::ALL[(i & 3) as usize]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Sine 0/1 or ramp 0/1, as encoded in single-bit LFO fields.
    pub fn unit(self) -> u32 {
        self as u32 & 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Lfo::Sin0 => "SIN0",
            Lfo::Sin1 => "SIN1",
            Lfo::Rmp0 => "RMP0",
            Lfo::Rmp1 => "RMP1",
        }
    }
}

/// SKP condition mask (5 bits). All set conditions must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SkipCondition(pub u8);

impl SkipCondition {
    pub const NONE: SkipCondition = SkipCondition(0);
    pub const NEG: u8 = 0x01;
    pub const GEZ: u8 = 0x02;
    pub const ZRO: u8 = 0x04;
    pub const ZRC: u8 = 0x08;
    pub const RUN: u8 = 0x10;

    pub const NAMES: [(&'static str, u8); 5] = [
        ("RUN", Self::RUN),
        ("ZRC", Self::ZRC),
        ("ZRO", Self::ZRO),
        ("GEZ", Self::GEZ),
        ("NEG", Self::NEG),
    ];

    pub fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// CHO flag bits (6 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChoFlags(pub u8);

impl ChoFlags {
    pub const SIN: u8 = 0x00;
    pub const COS: u8 = 0x01;
    pub const REG: u8 = 0x02;
    pub const COMPC: u8 = 0x04;
    pub const COMPA: u8 = 0x08;
    pub const RPTR2: u8 = 0x10;
    pub const NA: u8 = 0x20;

    pub const NAMES: [(&'static str, u8); 6] = [
        ("COS", Self::COS),
        ("REG", Self::REG),
        ("COMPC", Self::COMPC),
        ("COMPA", Self::COMPA),
        ("RPTR2", Self::RPTR2),
        ("NA", Self::NA),
    ];

    pub fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// Ramp LFO excursion in delay samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RampAmp {
    A4096 = 0,
    A2048 = 1,
    A1024 = 2,
    A512 = 3,
}

impl RampAmp {
    pub fn samples(self) -> u32 {
        4096 >> (self as u32)
    }

    pub fn from_samples(samples: i64) -> Option<RampAmp> {
        match samples {
            4096 => Some(RampAmp::A4096),
            2048 => Some(RampAmp::A2048),
            1024 => Some(RampAmp::A1024),
            512 => Some(RampAmp::A512),
            _ => None,
        }
    }

    pub fn from_bits(bits: u32) -> RampAmp {
        match bits & 3 {
            0 => RampAmp::A4096,
            1 => RampAmp::A2048,
            2 => RampAmp::A1024,
            _ => RampAmp::A512,
        }
    }
}

// ── Instructions ────────────────────────────────────────────

/// One decoded instruction. Operands are fully resolved; pseudo-ops are
/// stored in their canonical form (`CLR` is `And { mask: 0 }`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Instruction {
    Rda { addr: u16, coeff: Coeff },
    Rmpa { coeff: Coeff },
    Wra { addr: u16, coeff: Coeff },
    Wrap { addr: u16, coeff: Coeff },
    Rdax { reg: Reg, coeff: Coeff },
    Rdfx { reg: Reg, coeff: Coeff },
    Wrax { reg: Reg, coeff: Coeff },
    Wrhx { reg: Reg, coeff: Coeff },
    Wrlx { reg: Reg, coeff: Coeff },
    Maxx { reg: Reg, coeff: Coeff },
    Mulx { reg: Reg },
    Log { coeff: Coeff, offset: Coeff },
    Exp { coeff: Coeff, offset: Coeff },
    Sof { coeff: Coeff, offset: Coeff },
    And { mask: u32 },
    Or { mask: u32 },
    Xor { mask: u32 },
    Skp { cond: SkipCondition, count: u8 },
    Wlds { lfo: Lfo, freq: u16, amp: u16 },
    Wldr { lfo: Lfo, freq: i16, amp: RampAmp },
    Jam { lfo: Lfo },
    ChoRda { lfo: Lfo, flags: ChoFlags, addr: u16 },
    ChoSof { lfo: Lfo, flags: ChoFlags, offset: Coeff },
    ChoRdal { lfo: Lfo, flags: ChoFlags },
}

impl Instruction {
    pub const NOP: Instruction = Instruction::Skp { cond: SkipCondition::NONE, count: 0 };

    pub fn encode(&self) -> u32 {
        match *self {
            Instruction::Rda { addr, coeff } => mem_word(0x00, addr, coeff),
            Instruction::Rmpa { coeff } => coeff.bits() << 21 | (Reg::ADDR_PTR.0 as u32) << 5 | 0x01,
            Instruction::Wra { addr, coeff } => mem_word(0x02, addr, coeff),
            Instruction::Wrap { addr, coeff } => mem_word(0x03, addr, coeff),
            Instruction::Rdax { reg, coeff } => reg_word(0x04, reg, coeff),
            Instruction::Rdfx { reg, coeff } => reg_word(0x05, reg, coeff),
            Instruction::Wrax { reg, coeff } => reg_word(0x06, reg, coeff),
            Instruction::Wrhx { reg, coeff } => reg_word(0x07, reg, coeff),
            Instruction::Wrlx { reg, coeff } => reg_word(0x08, reg, coeff),
            Instruction::Maxx { reg, coeff } => reg_word(0x09, reg, coeff),
            Instruction::Mulx { reg } => (reg.0 as u32 & 0x3F) << 5 | 0x0A,
            Instruction::Log { coeff, offset } => scale_word(0x0B, coeff, offset),
            Instruction::Exp { coeff, offset } => scale_word(0x0C, coeff, offset),
            Instruction::Sof { coeff, offset } => scale_word(0x0D, coeff, offset),
            Instruction::And { mask } => (mask & 0xFF_FFFF) << 8 | 0x0E,
            Instruction::Or { mask } => (mask & 0xFF_FFFF) << 8 | 0x0F,
            Instruction::Xor { mask } => (mask & 0xFF_FFFF) << 8 | 0x10,
            Instruction::Skp { cond, count } => {
                (cond.0 as u32 & 0x1F) << 27 | (count as u32 & 0x3F) << 21 | 0x11
            }
            Instruction::Wlds { lfo, freq, amp } => {
                lfo.unit() << 29 | (freq as u32 & 0x1FF) << 20 | (amp as u32 & 0x7FFF) << 5 | 0x12
            }
            Instruction::Wldr { lfo, freq, amp } => {
                1 << 30 | lfo.unit() << 29 | (freq as u16 as u32) << 13 | (amp as u32) << 5 | 0x12
            }
            Instruction::Jam { lfo } => lfo.unit() << 6 | 0x80 | 0x13,
            Instruction::ChoRda { lfo, flags, addr } => {
                cho_word(0b00, lfo, flags, (addr & DELAY_MASK) as u32)
            }
            Instruction::ChoSof { lfo, flags, offset } => cho_word(0b10, lfo, flags, offset.bits()),
            Instruction::ChoRdal { lfo, flags } => cho_word(0b11, lfo, flags, 0),
        }
    }

    /// Decode a native instruction word. `index` is only used for the error.
    pub fn decode(word: u32, index: usize) -> Result<Instruction, AsmError> {
        let addr = ((word >> 5) & DELAY_MASK as u32) as u16;
        let reg = Reg(((word >> 5) & 0x3F) as u8);
        let c9 = Coeff::from_bits(Format::S1_9, word >> 21);
        let c14 = Coeff::from_bits(Format::S1_14, word >> 16);
        let mask = (word >> 8) & 0xFF_FFFF;
        let inst = match word & 0x1F {
            0x00 => Instruction::Rda { addr, coeff: c9 },
            0x01 => Instruction::Rmpa { coeff: c9 },
            0x02 => Instruction::Wra { addr, coeff: c9 },
            0x03 => Instruction::Wrap { addr, coeff: c9 },
            0x04 => Instruction::Rdax { reg, coeff: c14 },
            0x05 => Instruction::Rdfx { reg, coeff: c14 },
            0x06 => Instruction::Wrax { reg, coeff: c14 },
            0x07 => Instruction::Wrhx { reg, coeff: c14 },
            0x08 => Instruction::Wrlx { reg, coeff: c14 },
            0x09 => Instruction::Maxx { reg, coeff: c14 },
            0x0A => Instruction::Mulx { reg },
            0x0B => Instruction::Log {
                coeff: c14,
                offset: Coeff::from_bits(Format::S4_6, word >> 5),
            },
            0x0C => Instruction::Exp {
                coeff: c14,
                offset: Coeff::from_bits(Format::S_10, word >> 5),
            },
            0x0D => Instruction::Sof {
                coeff: c14,
                offset: Coeff::from_bits(Format::S_10, word >> 5),
            },
            0x0E => Instruction::And { mask },
            0x0F => Instruction::Or { mask },
            0x10 => Instruction::Xor { mask },
            0x11 => Instruction::Skp {
                cond: SkipCondition((word >> 27) as u8),
                count: ((word >> 21) & 0x3F) as u8,
            },
            0x12 if word & (1 << 30) == 0 => Instruction::Wlds {
                lfo: if word & (1 << 29) == 0 { Lfo::Sin0 } else { Lfo::Sin1 },
                freq: ((word >> 20) & 0x1FF) as u16,
                amp: ((word >> 5) & 0x7FFF) as u16,
            },
            0x12 => Instruction::Wldr {
                lfo: if word & (1 << 29) == 0 { Lfo::Rmp0 } else { Lfo::Rmp1 },
                freq: ((word >> 13) & 0xFFFF) as u16 as i16,
                amp: RampAmp::from_bits(word >> 5),
            },
            0x13 => Instruction::Jam {
                lfo: if word & (1 << 6) == 0 { Lfo::Rmp0 } else { Lfo::Rmp1 },
            },
            0x14 => {
                let lfo = Lfo::from_index(word >> 21);
                let flags = ChoFlags(((word >> 24) & 0x3F) as u8);
                match word >> 30 {
                    0b00 => Instruction::ChoRda { lfo, flags, addr },
                    0b10 => Instruction::ChoSof {
                        lfo,
                        flags,
                        offset: Coeff::from_bits(Format::S_15, word >> 5),
                    },
                    0b11 => Instruction::ChoRdal { lfo, flags },
                    _ => return Err(AsmError::InvalidOpcode { index, word }),
                }
            }
            _ => return Err(AsmError::InvalidOpcode { index, word }),
        };
        Ok(inst)
    }
}

fn mem_word(op: u32, addr: u16, coeff: Coeff) -> u32 {
    coeff.bits() << 21 | ((addr & DELAY_MASK) as u32) << 5 | op
}

fn reg_word(op: u32, reg: Reg, coeff: Coeff) -> u32 {
    coeff.bits() << 16 | (reg.0 as u32 & 0x3F) << 5 | op
}

fn scale_word(op: u32, coeff: Coeff, offset: Coeff) -> u32 {
    coeff.bits() << 16 | offset.bits() << 5 | op
}

fn cho_word(kind: u32, lfo: Lfo, flags: ChoFlags, field: u32) -> u32 {
    kind << 30 | (flags.0 as u32 & 0x3F) << 24 | (lfo as u32) << 21 | (field & 0xFFFF) << 5 | 0x14
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14(raw: i32) -> Coeff {
        Coeff::new(Format::S1_14, raw)
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(Instruction::NOP.encode(), 0x0000_0011);
        // CLR
        assert_eq!(Instruction::And { mask: 0 }.encode(), 0x0000_000E);
        // RDAX ADCL, 1.0
        assert_eq!(
            Instruction::Rdax { reg: Reg::ADCL, coeff: c14(16384) }.encode(),
            0x4000_0284
        );
        // WRAX DACL, 0
        assert_eq!(Instruction::Wrax { reg: Reg::DACL, coeff: c14(0) }.encode(), 0x0000_02C6);
        // RMPA 1.0 carries ADDR_PTR in its register field
        let rmpa = Instruction::Rmpa { coeff: Coeff::new(Format::S1_9, 512) };
        assert_eq!(rmpa.encode(), 0x4000_0301);
        assert_eq!(Instruction::decode(0x4000_0301, 0), Ok(rmpa));
    }

    #[test]
    fn test_decode_every_form() {
        let program = [
            Instruction::Rda { addr: 32767, coeff: Coeff::new(Format::S1_9, -1024) },
            Instruction::Rmpa { coeff: Coeff::new(Format::S1_9, 511) },
            Instruction::Wra { addr: 100, coeff: Coeff::new(Format::S1_9, 0) },
            Instruction::Wrap { addr: 1, coeff: Coeff::new(Format::S1_9, -1) },
            Instruction::Rdax { reg: Reg(0x3F), coeff: c14(-32768) },
            Instruction::Rdfx { reg: Reg::POT0, coeff: c14(1) },
            Instruction::Wrax { reg: Reg::ADDR_PTR, coeff: c14(32767) },
            Instruction::Wrhx { reg: Reg(0x21), coeff: c14(-5) },
            Instruction::Wrlx { reg: Reg(0x22), coeff: c14(77) },
            Instruction::Maxx { reg: Reg(0), coeff: c14(0) },
            Instruction::Mulx { reg: Reg::POT2 },
            Instruction::Log { coeff: c14(-16384), offset: Coeff::new(Format::S4_6, -1024) },
            Instruction::Exp { coeff: c14(16384), offset: Coeff::new(Format::S_10, 1023) },
            Instruction::Sof { coeff: c14(-8192), offset: Coeff::new(Format::S_10, -1024) },
            Instruction::And { mask: 0xFF_FF00 },
            Instruction::Or { mask: 1 },
            Instruction::Xor { mask: 0xFF_FFFF },
            Instruction::Skp { cond: SkipCondition(SkipCondition::RUN | SkipCondition::NEG), count: 63 },
            Instruction::Wlds { lfo: Lfo::Sin1, freq: 511, amp: 32767 },
            Instruction::Wldr { lfo: Lfo::Rmp1, freq: -16384, amp: RampAmp::A512 },
            Instruction::Jam { lfo: Lfo::Rmp1 },
            Instruction::ChoRda { lfo: Lfo::Rmp0, flags: ChoFlags(0x3F), addr: 4000 },
            Instruction::ChoSof { lfo: Lfo::Sin1, flags: ChoFlags(ChoFlags::NA), offset: Coeff::new(Format::S_15, -32768) },
            Instruction::ChoRdal { lfo: Lfo::Sin0, flags: ChoFlags(ChoFlags::COS) },
        ];
        for (i, inst) in program.iter().enumerate() {
            let decoded = Instruction::decode(inst.encode(), i).unwrap();
            assert_eq!(&decoded, inst, "word {:08X}", inst.encode());
        }
    }

    #[test]
    fn test_decode_rejects_unknown_opcode() {
        assert!(matches!(
            Instruction::decode(0x0000_0015, 3),
            Err(AsmError::InvalidOpcode { index: 3, .. })
        ));
        // CHO type 01 is unused
        assert!(Instruction::decode(0x4000_0014, 0).is_err());
    }

    #[test]
    fn test_mnemonic_lookup_is_case_insensitive() {
        assert_eq!("rdax".parse::<Mnemonic>(), Ok(Mnemonic::Rdax));
        assert_eq!("Cho".parse::<Mnemonic>(), Ok(Mnemonic::Cho));
        assert!("RDAL".parse::<Mnemonic>().is_err());
    }

    #[test]
    fn test_register_names() {
        assert_eq!(Reg::DACR.name().as_deref(), Some("DACR"));
        assert_eq!(Reg(0x3F).name().as_deref(), Some("REG31"));
        assert_eq!(Reg(0x08).name(), None);
    }
}
