use crate::isa::Mnemonic;
use crate::token::{Literal, Span};

/// Which point of a MEM region a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolPart {
    /// `name`: first word.
    Start,
    /// `name#`: last word.
    End,
    /// `name^`: midpoint.
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Or,
    And,
}

/// An operand expression, resolved against the symbol table during pass 2.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Symbol { name: String, part: SymbolPart },
    Neg(Box<Expr>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

impl Expr {
    /// The bare symbol name, if this expression is nothing else.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Symbol { name, part: SymbolPart::Start } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub expr: Expr,
    pub span: Span,
}

/// One statement of an SPN program. A line may hold a label followed by
/// another statement, which the parser splits in two.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `name:`
    Label { name: String, span: Span },
    /// `EQU name value` or `name EQU value`
    Equ { name: String, value: Operand, span: Span },
    /// `MEM name size` or `name MEM size`
    Mem { name: String, size: Operand, span: Span },
    /// `MNEMONIC op, op, ...`
    Instruction { mnemonic: Mnemonic, operands: Vec<Operand>, span: Span },
    /// A mnemonic line that failed to lex or parse. Occupies one slot.
    Invalid { span: Span },
}

/// A source comment with its line number.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub line: u32,
    pub text: String,
}

/// Parser output.
#[derive(Debug, Clone, Default)]
pub struct SourceFile {
    pub statements: Vec<Statement>,
    pub comments: Vec<Comment>,
}
