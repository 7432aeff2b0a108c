use crate::diagnostics::Diagnostics;
use crate::token::Span;
use serde::Serialize;
use std::fmt;

/// Broad class of a diagnosable problem.
///
/// Lexical and semantic problems still yield a best-effort program;
/// structural problems abort the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Lexical,
    Semantic,
    Structural,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LexError {
    UnexpectedChar { ch: char, span: Span },
    InvalidNumber { text: String, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. } | LexError::InvalidNumber { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AsmError {
    Lex(LexError),
    UnexpectedToken { expected: String, found: String },
    UnknownMnemonic { name: String },
    OperandCount { mnemonic: String, expected: String, found: usize },
    UndefinedSymbol { name: String },
    DuplicateSymbol { name: String },
    RecursiveSymbol { name: String },
    OperandOutOfRange { operand: String, value: String, range: String },
    ValueClamped { operand: String, value: String, clamped: String },
    InvalidOperand { operand: String, reason: String },
    SkipOutOfBounds { target: i64, program_len: usize },
    MemoryOverflow { name: String, requested: u32, available: u32 },
    ProgramTooLong { count: usize, max: usize },
    TruncatedImage { len: usize },
    ImageTooLarge { len: usize, max: usize },
    InvalidOpcode { index: usize, word: u32 },
    InvalidEncoding { reason: String },
}

impl AsmError {
    pub fn category(&self) -> Category {
        match self {
            AsmError::Lex(_) => Category::Lexical,
            AsmError::ProgramTooLong { .. }
            | AsmError::TruncatedImage { .. }
            | AsmError::ImageTooLarge { .. }
            | AsmError::InvalidOpcode { .. }
            | AsmError::InvalidEncoding { .. } => Category::Structural,
            _ => Category::Semantic,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnexpectedChar { ch, .. } => write!(f, "unexpected character '{ch}'"),
            LexError::InvalidNumber { text, .. } => write!(f, "invalid number '{text}'"),
        }
    }
}

impl std::error::Error for LexError {}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::Lex(e) => write!(f, "{e}"),
            AsmError::UnexpectedToken { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            AsmError::UnknownMnemonic { name } => write!(f, "unknown mnemonic '{name}'"),
            AsmError::OperandCount { mnemonic, expected, found } => {
                write!(f, "{mnemonic} takes {expected} operand(s), found {found}")
            }
            AsmError::UndefinedSymbol { name } => write!(f, "undefined symbol '{name}'"),
            AsmError::DuplicateSymbol { name } => write!(f, "symbol '{name}' is already defined"),
            AsmError::RecursiveSymbol { name } => {
                write!(f, "symbol '{name}' is defined in terms of itself")
            }
            AsmError::OperandOutOfRange { operand, value, range } => {
                write!(f, "{operand} {value} is out of range {range}")
            }
            AsmError::ValueClamped { operand, value, clamped } => {
                write!(f, "{operand} {value} clamped to {clamped}")
            }
            AsmError::InvalidOperand { operand, reason } => write!(f, "invalid {operand}: {reason}"),
            AsmError::SkipOutOfBounds { target, program_len } => write!(
                f,
                "skip target {target} is outside the program (0..={program_len})"
            ),
            AsmError::MemoryOverflow { name, requested, available } => write!(
                f,
                "delay memory '{name}' needs {requested} words, only {available} left"
            ),
            AsmError::ProgramTooLong { count, max } => {
                write!(f, "program too long: {count} instructions, limit is {max}")
            }
            AsmError::TruncatedImage { len } => {
                write!(f, "binary image of {len} bytes is not a whole number of words")
            }
            AsmError::ImageTooLarge { len, max } => {
                write!(f, "binary image of {len} bytes exceeds {max} bytes")
            }
            AsmError::InvalidOpcode { index, word } => {
                write!(f, "word {index} (${word:08X}) has no valid instruction form")
            }
            AsmError::InvalidEncoding { reason } => write!(f, "invalid program encoding: {reason}"),
        }
    }
}

impl std::error::Error for AsmError {}

impl From<LexError> for AsmError {
    fn from(e: LexError) -> Self {
        AsmError::Lex(e)
    }
}

/// Why a load left the previous program in place.
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    /// Structural problem; nothing was installed.
    Structural(Diagnostics),
    /// Assembled with errors and the configuration rejects such programs.
    Rejected(Diagnostics),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {e}"),
            LoadError::Structural(d) => {
                write!(f, "program rejected: {}", d.first_error_message().unwrap_or_default())
            }
            LoadError::Rejected(d) => write!(f, "program has {} error(s)", d.error_count()),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}
