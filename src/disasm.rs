//! Instruction listing. Every line printed here assembles back to the
//! same instruction word.

use std::fmt::{self, Write as _};

use crate::isa::{ChoFlags, Instruction, Reg, SkipCondition};
use crate::program::Program;

struct RegName(Reg);

impl fmt::Display for RegName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.name() {
            Some(name) => f.write_str(&name),
            None => write!(f, "{}", self.0.0),
        }
    }
}

struct Conditions(SkipCondition);

impl fmt::Display for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = SkipCondition::NAMES
            .iter()
            .filter(|(_, flag)| self.0.has(*flag))
            .map(|(name, _)| *name)
            .collect();
        if names.is_empty() { f.write_str("0") } else { f.write_str(&names.join("|")) }
    }
}

struct Flags(ChoFlags);

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = ChoFlags::NAMES
            .iter()
            .filter(|(_, flag)| self.0.has(*flag))
            .map(|(name, _)| *name)
            .collect();
        if names.is_empty() { f.write_str("SIN") } else { f.write_str(&names.join("|")) }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Rda { addr, coeff } => write!(f, "RDA {addr}, {coeff}"),
            Instruction::Rmpa { coeff } => write!(f, "RMPA {coeff}"),
            Instruction::Wra { addr, coeff } => write!(f, "WRA {addr}, {coeff}"),
            Instruction::Wrap { addr, coeff } => write!(f, "WRAP {addr}, {coeff}"),
            Instruction::Rdax { reg, coeff } => write!(f, "RDAX {}, {coeff}", RegName(reg)),
            Instruction::Rdfx { reg, coeff } if coeff.raw == 0 => write!(f, "LDAX {}", RegName(reg)),
            Instruction::Rdfx { reg, coeff } => write!(f, "RDFX {}, {coeff}", RegName(reg)),
            Instruction::Wrax { reg, coeff } => write!(f, "WRAX {}, {coeff}", RegName(reg)),
            Instruction::Wrhx { reg, coeff } => write!(f, "WRHX {}, {coeff}", RegName(reg)),
            Instruction::Wrlx { reg, coeff } => write!(f, "WRLX {}, {coeff}", RegName(reg)),
            Instruction::Maxx { reg: Reg(0), coeff } if coeff.raw == 0 => f.write_str("ABSA"),
            Instruction::Maxx { reg, coeff } => write!(f, "MAXX {}, {coeff}", RegName(reg)),
            Instruction::Mulx { reg } => write!(f, "MULX {}", RegName(reg)),
            Instruction::Log { coeff, offset } => write!(f, "LOG {coeff}, {offset}"),
            Instruction::Exp { coeff, offset } => write!(f, "EXP {coeff}, {offset}"),
            Instruction::Sof { coeff, offset } => write!(f, "SOF {coeff}, {offset}"),
            Instruction::And { mask: 0 } => f.write_str("CLR"),
            Instruction::And { mask } => write!(f, "AND ${mask:06X}"),
            Instruction::Or { mask } => write!(f, "OR ${mask:06X}"),
            Instruction::Xor { mask: 0xFF_FFFF } => f.write_str("NOT"),
            Instruction::Xor { mask } => write!(f, "XOR ${mask:06X}"),
            Instruction::Skp { cond: SkipCondition(0), count: 0 } => f.write_str("NOP"),
            Instruction::Skp { cond, count } => write!(f, "SKP {}, {count}", Conditions(cond)),
            Instruction::Wlds { lfo, freq, amp } => write!(f, "WLDS {}, {freq}, {amp}", lfo.name()),
            Instruction::Wldr { lfo, freq, amp } => {
                write!(f, "WLDR {}, {freq}, {}", lfo.name(), amp.samples())
            }
            Instruction::Jam { lfo } => write!(f, "JAM {}", lfo.name()),
            Instruction::ChoRda { lfo, flags, addr } => {
                write!(f, "CHO RDA, {}, {}, {addr}", lfo.name(), Flags(flags))
            }
            Instruction::ChoSof { lfo, flags, offset } => {
                write!(f, "CHO SOF, {}, {}, {offset}", lfo.name(), Flags(flags))
            }
            Instruction::ChoRdal { lfo, flags: ChoFlags(0) } => write!(f, "CHO RDAL, {}", lfo.name()),
            Instruction::ChoRdal { lfo, flags } => {
                write!(f, "CHO RDAL, {}, {}", lfo.name(), Flags(flags))
            }
        }
    }
}

/// SPN listing of a whole program, pot labels included as comments.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; {}", program.name);
    for (i, label) in program.pot_labels.iter().enumerate() {
        if let Some(label) = label {
            let _ = writeln!(out, "; POT{i}: {label}");
        }
    }
    for inst in &program.instructions {
        let _ = writeln!(out, "{inst}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::dsp::fixed::{Coeff, Format};
    use crate::isa::{Lfo, RampAmp};

    const PATCH: &str = "\
; POT0: Time
; POT2: Mix
mem dly 4000
equ fb reg2
    rdax adcl, 0.5
    rdax adcr, 0.5
    rda dly#, 0.6
    wrap dly, -0.6
    rdax fb, 0.9990234375
    wrhx fb, -0.25
    wrlx reg3, 1.999
    mulx pot0
    log -0.5, -16
    exp 1, 0
    sof 0.5, -0.5
    and $7FFF00
    or %101
    xor $0F0F0F
    not
    clr
    absa
    maxx reg4, 0.25
    ldax pot1
    rmpa 1.5
    skp run|neg, end
    wlds sin1, 23, 4000
    wldr rmp0, -300, 1024
    jam rmp0
    cho rda, rmp0, reg|compc|rptr2, dly^
    cho sof, sin0, cos|na, -0.25
    cho rdal, rmp1
    cho rdal, sin0, cos
    nop
end: wrax dacl, 0
";

    #[test]
    fn test_listing_reassembles() {
        let first = assemble("patch", PATCH).unwrap();
        assert!(first.diagnostics.is_empty(), "{:?}", first.diagnostics.lines());
        let text = disassemble(&first.program);
        let second = assemble("patch", &text).unwrap();
        assert!(second.diagnostics.is_empty(), "{text}\n{:?}", second.diagnostics.lines());
        assert_eq!(second.program.instructions, first.program.instructions);
        assert_eq!(second.program.pot_labels, first.program.pot_labels);
    }

    #[test]
    fn test_decoded_words_reassemble() {
        let original = vec![
            Instruction::Rda { addr: 32767, coeff: Coeff::new(Format::S1_9, -1024) },
            Instruction::Rdax { reg: Reg(0x08), coeff: Coeff::new(Format::S1_14, 32767) },
            Instruction::Log { coeff: Coeff::new(Format::S1_14, 1), offset: Coeff::new(Format::S4_6, 1023) },
            Instruction::Skp { cond: SkipCondition(SkipCondition::ZRC), count: 0 },
            Instruction::Wldr { lfo: Lfo::Rmp1, freq: i16::MIN / 2, amp: RampAmp::A512 },
            Instruction::ChoSof { lfo: Lfo::Rmp1, flags: ChoFlags(0x3F), offset: Coeff::new(Format::S_15, 32767) },
        ];
        let program = Program::new("raw", original.clone());
        let back = assemble("raw", &disassemble(&program)).unwrap();
        assert_eq!(back.diagnostics.error_count(), 0);
        assert_eq!(back.program.instructions, original);
    }

    #[test]
    fn test_pseudo_op_names() {
        assert_eq!(Instruction::NOP.to_string(), "NOP");
        assert_eq!(Instruction::And { mask: 0 }.to_string(), "CLR");
        assert_eq!(
            Instruction::Rdax { reg: Reg::ADCL, coeff: Coeff::new(Format::S1_14, 16384) }.to_string(),
            "RDAX ADCL, 1.0"
        );
    }
}
