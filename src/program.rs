//! Assembled programs and their binary / persisted encodings.

use crate::error::AsmError;
use crate::isa::{Instruction, PROGRAM_SIZE};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

/// Size of a full instruction-memory image in bytes.
pub const IMAGE_SIZE: usize = PROGRAM_SIZE * 4;

/// An executable program: at most [`PROGRAM_SIZE`] instructions plus
/// display metadata. Never mutated once built; a reload replaces it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub name: String,
    pub instructions: Vec<Instruction>,
    /// Labels for POT0..POT2 found in source comments.
    pub pot_labels: [Option<String>; 3],
}

impl Program {
    pub fn new(name: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Program { name: name.into(), instructions, pot_labels: [None, None, None] }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Big-endian instruction words, one per instruction, no padding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.instructions.len() * 4);
        for inst in &self.instructions {
            bytes.extend_from_slice(&inst.encode().to_be_bytes());
        }
        bytes
    }

    /// Full 512-byte instruction-memory image, padded with `NOP`.
    pub fn to_image(&self) -> Vec<u8> {
        let mut bytes = self.to_bytes();
        let nop = Instruction::NOP.encode().to_be_bytes();
        while bytes.len() < IMAGE_SIZE {
            bytes.extend_from_slice(&nop);
        }
        bytes
    }

    /// Decode packed big-endian words.
    ///
    /// The length must be a whole number of words and at most one full
    /// image; any word without a valid instruction form rejects the image.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Program, AsmError> {
        if bytes.len() % 4 != 0 {
            return Err(AsmError::TruncatedImage { len: bytes.len() });
        }
        if bytes.len() > IMAGE_SIZE {
            return Err(AsmError::ImageTooLarge { len: bytes.len(), max: IMAGE_SIZE });
        }
        let instructions = bytes
            .chunks_exact(4)
            .enumerate()
            .map(|(i, chunk)| {
                let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                Instruction::decode(word, i)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Program::new(name, instructions))
    }

    /// Text-safe persisted form (base64 of [`Program::to_bytes`]).
    pub fn to_encoded(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_encoded(name: impl Into<String>, encoded: &str) -> Result<Program, AsmError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AsmError::InvalidEncoding { reason: e.to_string() })?;
        Program::from_bytes(name, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::fixed::{Coeff, Format};
    use crate::isa::Reg;

    fn sample() -> Program {
        Program::new(
            "sample",
            vec![
                Instruction::Rdax { reg: Reg::ADCL, coeff: Coeff::new(Format::S1_14, 16384) },
                Instruction::Wrax { reg: Reg::DACL, coeff: Coeff::zero(Format::S1_14) },
            ],
        )
    }

    #[test]
    fn test_bytes_are_big_endian() {
        let bytes = sample().to_bytes();
        assert_eq!(bytes, vec![0x40, 0x00, 0x02, 0x84, 0x00, 0x00, 0x02, 0xC6]);
    }

    #[test]
    fn test_image_is_padded_with_nops() {
        let image = sample().to_image();
        assert_eq!(image.len(), IMAGE_SIZE);
        assert_eq!(&image[8..12], &[0, 0, 0, 0x11]);
        let decoded = Program::from_bytes("img", &image).unwrap();
        assert_eq!(decoded.len(), PROGRAM_SIZE);
        assert_eq!(&decoded.instructions[..2], &sample().instructions[..]);
    }

    #[test]
    fn test_encoded_round_trip() {
        let program = sample();
        let text = program.to_encoded();
        assert_eq!(text, "QAAChAAAAsY=");
        let back = Program::from_encoded("sample", &text).unwrap();
        assert_eq!(back, program);
    }

    #[test]
    fn test_structural_rejections() {
        assert_eq!(
            Program::from_bytes("x", &[0, 0, 0]),
            Err(AsmError::TruncatedImage { len: 3 })
        );
        assert!(matches!(
            Program::from_bytes("x", &vec![0; IMAGE_SIZE + 4]),
            Err(AsmError::ImageTooLarge { .. })
        ));
        assert!(matches!(
            Program::from_bytes("x", &[0, 0, 0, 0x11, 0, 0, 0, 0x1F]),
            Err(AsmError::InvalidOpcode { index: 1, .. })
        ));
        assert!(matches!(
            Program::from_encoded("x", "not base64!"),
            Err(AsmError::InvalidEncoding { .. })
        ));
    }
}
