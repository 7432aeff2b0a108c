use serde::Serialize;

use crate::isa::Mnemonic;

/// A numeric literal as written in the source.
///
/// The three forms stay distinct until an operand's format is known:
/// `1` may be register 1 or the coefficient 1.0, while `$7FFF` is always
/// a raw bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Literal {
    /// Decimal integer (`12`, `32767`).
    Int(i64),
    /// Decimal with a fraction or exponent (`0.5`, `1e-3`).
    Real(f64),
    /// Hexadecimal (`$7FFF`, `0x7FFF`) or binary (`%0111`) bit pattern.
    Raw(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(Literal),
    Ident(String),

    // Keywords
    Mnemonic(Mnemonic),
    Equ,
    Mem,

    // Punctuation
    Comma,  // ,
    Colon,  // :
    Plus,   // +
    Minus,  // -
    Star,   // *
    Slash,  // /
    Pipe,   // |
    Amp,    // &
    LParen, // (
    RParen, // )
    Hash,   // #
    Caret,  // ^

    // Structural
    /// Stands in for the rest of a mnemonic line that failed to lex.
    Invalid,
    Newline,
    Comment(String),
    EOF,
}

/// Source location. `start`/`end` are byte offsets; `line`/`column` are
/// 1-based and point at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// Convert a token back to its approximate source representation.
pub fn token_to_string(token: &Token) -> String {
    match token {
        Token::Number(Literal::Int(n)) => n.to_string(),
        Token::Number(Literal::Real(n)) => format!("{n}"),
        Token::Number(Literal::Raw(n)) => format!("${n:X}"),
        Token::Ident(s) => s.clone(),
        Token::Mnemonic(m) => m.as_str().into(),
        Token::Equ => "EQU".into(),
        Token::Mem => "MEM".into(),
        Token::Comma => ",".into(),
        Token::Colon => ":".into(),
        Token::Plus => "+".into(),
        Token::Minus => "-".into(),
        Token::Star => "*".into(),
        Token::Slash => "/".into(),
        Token::Pipe => "|".into(),
        Token::Amp => "&".into(),
        Token::LParen => "(".into(),
        Token::RParen => ")".into(),
        Token::Hash => "#".into(),
        Token::Caret => "^".into(),
        Token::Invalid => "invalid token".into(),
        Token::Newline => "end of line".into(),
        Token::Comment(s) => format!("; {s}"),
        Token::EOF => "end of file".into(),
    }
}
