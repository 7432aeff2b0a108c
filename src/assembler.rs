//! Two-pass SPN assembler.
//!
//! Pass 1 records labels, `EQU` constants and lays out `MEM` regions.
//! Pass 2 resolves every operand and emits one [`Instruction`] per
//! mnemonic line. Operand problems are reported and replaced by zero, and
//! a mnemonic line that failed to lex or parse becomes `NOP`, so the rest
//! of the program keeps its shape; only structural problems (too many
//! instructions) abort.

use std::collections::HashMap;

use crate::ast::*;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::dsp::fixed::{Clamp, Coeff, Format};
use crate::error::AsmError;
use crate::isa::*;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::program::Program;
use crate::token::{Literal, Span};

/// Result of a completed (possibly imperfect) assembly.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub program: Program,
    pub diagnostics: Diagnostics,
}

impl Assembly {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

/// Assemble SPN source.
///
/// `Err` carries the diagnostics of a structural failure; no program is
/// produced. `Ok` may still carry lexical or semantic errors.
pub fn assemble(name: &str, source: &str) -> Result<Assembly, Diagnostics> {
    let mut diagnostics = Diagnostics::new();

    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    diagnostics.extend(lex_errors.into_iter().map(|e| Diagnostic::error(e.into(), None)));

    let (file, parse_errors) = Parser::new(tokens).parse_program();
    diagnostics.extend(parse_errors);

    let mut asm = Assembler::new();
    asm.pass1(&file);

    if asm.instruction_count > PROGRAM_SIZE {
        let mut structural = Diagnostics::new();
        structural.push(Diagnostic::error(
            AsmError::ProgramTooLong { count: asm.instruction_count, max: PROGRAM_SIZE },
            asm.overflow_span,
        ));
        tracing::warn!(name, count = asm.instruction_count, "program too long");
        return Err(structural);
    }

    let instructions = asm.pass2(&file);
    diagnostics.extend(asm.diagnostics);

    let mut program = Program::new(name, instructions);
    program.pot_labels = pot_labels(&file.comments);

    tracing::debug!(
        name,
        instructions = program.len(),
        errors = diagnostics.error_count(),
        warnings = diagnostics.warning_count(),
        "assembled program"
    );
    Ok(Assembly { program, diagnostics })
}

// ── Values & symbols ────────────────────────────────────────

/// An evaluated operand expression.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Int(i64),
    Real(f64),
    Raw(u32),
}

impl Value {
    fn as_f64(self) -> f64 {
        match self {
            Value::Int(n) => n as f64,
            Value::Real(r) => r,
            Value::Raw(n) => n as f64,
        }
    }

    /// Integral value, if it has one.
    fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(n),
            Value::Raw(n) => Some(n as i64),
            Value::Real(r) if r.fract() == 0.0 && r.abs() < 1e15 => Some(r as i64),
            Value::Real(_) => None,
        }
    }

    fn describe(self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Real(r) => format!("{r}"),
            Value::Raw(n) => format!("${n:X}"),
        }
    }
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::Int(n) => Value::Int(n),
            Literal::Real(r) => Value::Real(r),
            Literal::Raw(n) => Value::Raw(n),
        }
    }
}

#[derive(Debug, Clone)]
enum Symbol {
    Const(Expr),
    Mem { start: u32, size: u32 },
    Label(usize),
}

/// Names every program can use without declaring them.
fn builtin(name: &str) -> Option<i64> {
    if let Some((_, reg)) = NAMED_REGISTERS.iter().find(|(n, _)| *n == name) {
        return Some(reg.0 as i64);
    }
    if let Some(n) = name.strip_prefix("REG").and_then(|n| n.parse::<u8>().ok()) {
        if n < 32 {
            return Some((Reg::REG0.0 + n) as i64);
        }
    }
    if let Some((_, flag)) = SkipCondition::NAMES.iter().find(|(n, _)| *n == name) {
        return Some(*flag as i64);
    }
    if let Some((_, flag)) = ChoFlags::NAMES.iter().find(|(n, _)| *n == name) {
        return Some(*flag as i64);
    }
    let value = match name {
        "SIN0" => 0,
        "SIN1" => 1,
        "RMP0" => 2,
        "RMP1" => 3,
        "COS0" => 0,
        "COS1" => 1,
        "SIN" => ChoFlags::SIN as i64,
        _ => return None,
    };
    Some(value)
}

const MAX_SYMBOL_DEPTH: usize = 32;

// ── Operand kinds ───────────────────────────────────────────

/// Unsigned integer operand with an inclusive range.
#[derive(Debug, Clone, Copy)]
struct IntKind {
    what: &'static str,
    min: i64,
    max: i64,
}

const REGISTER: IntKind = IntKind { what: "register", min: 0, max: REGISTER_COUNT as i64 - 1 };
const ADDRESS: IntKind = IntKind { what: "delay address", min: 0, max: DELAY_SIZE as i64 - 1 };
const CONDITION: IntKind = IntKind { what: "skip condition", min: 0, max: 31 };
const SKIP_COUNT: IntKind = IntKind { what: "skip count", min: 0, max: 63 };
const CHO_FLAGS: IntKind = IntKind { what: "CHO flags", min: 0, max: 63 };
const SIN_FREQ: IntKind = IntKind { what: "sine frequency", min: 0, max: 511 };
const SIN_AMP: IntKind = IntKind { what: "sine amplitude", min: 0, max: 32767 };
const RAMP_FREQ: IntKind = IntKind { what: "ramp frequency", min: -16384, max: 32767 };
const MASK: IntKind = IntKind { what: "mask", min: -(1 << 23), max: 0xFF_FFFF };

struct Assembler {
    symbols: HashMap<String, (Symbol, Span)>,
    diagnostics: Vec<Diagnostic>,
    instruction_count: usize,
    overflow_span: Option<Span>,
}

impl Assembler {
    fn new() -> Self {
        Assembler {
            symbols: HashMap::new(),
            diagnostics: Vec::new(),
            instruction_count: 0,
            overflow_span: None,
        }
    }

    fn error(&mut self, error: AsmError, span: Span) {
        self.diagnostics.push(Diagnostic::error(error, Some(span)));
    }

    fn define(&mut self, name: &str, symbol: Symbol, span: Span) {
        if self.symbols.contains_key(name) {
            self.error(AsmError::DuplicateSymbol { name: name.to_string() }, span);
            return;
        }
        self.symbols.insert(name.to_string(), (symbol, span));
    }

    // ── Pass 1 ───────────────────────────────────────────────

    fn pass1(&mut self, file: &SourceFile) {
        for stmt in &file.statements {
            match stmt {
                Statement::Label { name, span } => {
                    self.define(name, Symbol::Label(self.instruction_count), *span);
                }
                Statement::Equ { name, value, span } => {
                    self.define(name, Symbol::Const(value.expr.clone()), *span);
                }
                Statement::Mem { .. } => {}
                Statement::Instruction { span, .. } | Statement::Invalid { span } => {
                    self.instruction_count += 1;
                    if self.instruction_count == PROGRAM_SIZE + 1 {
                        self.overflow_span = Some(*span);
                    }
                }
            }
        }

        // Regions are laid out after all constants are known, so a size
        // may refer to an EQU declared further down.
        let mut next_free: u32 = 0;
        for stmt in &file.statements {
            let Statement::Mem { name, size, span } = stmt else {
                continue;
            };
            let size_value = match self.eval(&size.expr, 0) {
                Ok(v) => v,
                Err(e) => {
                    self.error(e, size.span);
                    continue;
                }
            };
            let words = match size_value.as_int() {
                Some(n) if (0..DELAY_SIZE as i64).contains(&n) => n as u32,
                _ => {
                    self.error(
                        AsmError::OperandOutOfRange {
                            operand: "memory size".into(),
                            value: size_value.describe(),
                            range: format!("0..={}", DELAY_SIZE - 1),
                        },
                        size.span,
                    );
                    continue;
                }
            };
            let available = DELAY_SIZE as u32 - next_free;
            if words + 1 > available {
                self.error(
                    AsmError::MemoryOverflow { name: name.clone(), requested: words + 1, available },
                    *span,
                );
                continue;
            }
            self.define(name, Symbol::Mem { start: next_free, size: words }, *span);
            next_free += words + 1;
        }
    }

    // ── Expression evaluation ───────────────────────────────

    fn lookup(&self, name: &str, part: SymbolPart, depth: usize) -> Result<Value, AsmError> {
        match self.symbols.get(name) {
            Some((Symbol::Mem { start, size }, _)) => {
                let addr = match part {
                    SymbolPart::Start => *start,
                    SymbolPart::End => start + size,
                    SymbolPart::Middle => start + size / 2,
                };
                Ok(Value::Int(addr as i64))
            }
            Some((Symbol::Const(expr), _)) if part == SymbolPart::Start => {
                if depth >= MAX_SYMBOL_DEPTH {
                    return Err(AsmError::RecursiveSymbol { name: name.to_string() });
                }
                let expr = expr.clone();
                self.eval(&expr, depth + 1)
            }
            Some((Symbol::Label(index), _)) if part == SymbolPart::Start => {
                Ok(Value::Int(*index as i64))
            }
            Some(_) => Err(AsmError::InvalidOperand {
                operand: name.to_string(),
                reason: "'#' and '^' only apply to MEM regions".into(),
            }),
            None => match builtin(name) {
                Some(v) if part == SymbolPart::Start => Ok(Value::Int(v)),
                _ => Err(AsmError::UndefinedSymbol { name: name.to_string() }),
            },
        }
    }

    fn eval(&self, expr: &Expr, depth: usize) -> Result<Value, AsmError> {
        match expr {
            Expr::Literal(lit) => Ok((*lit).into()),
            Expr::Symbol { name, part } => self.lookup(name, *part, depth),
            Expr::Neg(inner) => Ok(match self.eval(inner, depth)? {
                Value::Int(n) => Value::Int(n.saturating_neg()),
                Value::Raw(n) => Value::Int(-(n as i64)),
                Value::Real(r) => Value::Real(-r),
            }),
            Expr::Binary { op, lhs, rhs } => {
                let a = self.eval(lhs, depth)?;
                let b = self.eval(rhs, depth)?;
                apply(*op, a, b)
            }
        }
    }

    // ── Pass 2 ───────────────────────────────────────────────

    fn pass2(&mut self, file: &SourceFile) -> Vec<Instruction> {
        let mut out = Vec::with_capacity(self.instruction_count);
        for stmt in &file.statements {
            match stmt {
                Statement::Instruction { mnemonic, operands, span } => {
                    let index = out.len();
                    let inst = self.emit(*mnemonic, operands, *span, index);
                    out.push(inst);
                }
                Statement::Invalid { .. } => out.push(Instruction::NOP),
                _ => {}
            }
        }
        out
    }

    fn check_count(&mut self, mnemonic: Mnemonic, ops: &[Operand], counts: &[usize], span: Span) -> bool {
        if counts.contains(&ops.len()) {
            return true;
        }
        let expected = counts.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" or ");
        self.error(
            AsmError::OperandCount {
                mnemonic: mnemonic.as_str().into(),
                expected,
                found: ops.len(),
            },
            span,
        );
        false
    }

    fn emit(&mut self, mnemonic: Mnemonic, ops: &[Operand], span: Span, index: usize) -> Instruction {
        use Mnemonic as M;

        let counts: &[usize] = match mnemonic {
            M::Absa | M::Not | M::Clr | M::Nop => &[0],
            M::Rmpa | M::Ldax | M::Mulx | M::And | M::Or | M::Xor | M::Jam => &[1],
            M::Wlds | M::Wldr => &[3],
            M::Cho => &[2, 3, 4],
            _ => &[2],
        };
        if !self.check_count(mnemonic, ops, counts, span) {
            return Instruction::NOP;
        }

        match mnemonic {
            M::Rda => Instruction::Rda { addr: self.address(&ops[0]), coeff: self.coeff(&ops[1], Format::S1_9) },
            M::Rmpa => Instruction::Rmpa { coeff: self.coeff(&ops[0], Format::S1_9) },
            M::Wra => Instruction::Wra { addr: self.address(&ops[0]), coeff: self.coeff(&ops[1], Format::S1_9) },
            M::Wrap => Instruction::Wrap { addr: self.address(&ops[0]), coeff: self.coeff(&ops[1], Format::S1_9) },
            M::Rdax => Instruction::Rdax { reg: self.register(&ops[0]), coeff: self.coeff(&ops[1], Format::S1_14) },
            M::Rdfx => Instruction::Rdfx { reg: self.register(&ops[0]), coeff: self.coeff(&ops[1], Format::S1_14) },
            M::Ldax => Instruction::Rdfx { reg: self.register(&ops[0]), coeff: Coeff::zero(Format::S1_14) },
            M::Wrax => Instruction::Wrax { reg: self.register(&ops[0]), coeff: self.coeff(&ops[1], Format::S1_14) },
            M::Wrhx => Instruction::Wrhx { reg: self.register(&ops[0]), coeff: self.coeff(&ops[1], Format::S1_14) },
            M::Wrlx => Instruction::Wrlx { reg: self.register(&ops[0]), coeff: self.coeff(&ops[1], Format::S1_14) },
            M::Maxx => Instruction::Maxx { reg: self.register(&ops[0]), coeff: self.coeff(&ops[1], Format::S1_14) },
            M::Absa => Instruction::Maxx { reg: Reg(0), coeff: Coeff::zero(Format::S1_14) },
            M::Mulx => Instruction::Mulx { reg: self.register(&ops[0]) },
            M::Log => Instruction::Log {
                coeff: self.coeff(&ops[0], Format::S1_14),
                offset: self.coeff(&ops[1], Format::S4_6),
            },
            M::Exp => Instruction::Exp {
                coeff: self.coeff(&ops[0], Format::S1_14),
                offset: self.coeff(&ops[1], Format::S_10),
            },
            M::Sof => Instruction::Sof {
                coeff: self.coeff(&ops[0], Format::S1_14),
                offset: self.coeff(&ops[1], Format::S_10),
            },
            M::And => Instruction::And { mask: self.mask(&ops[0]) },
            M::Or => Instruction::Or { mask: self.mask(&ops[0]) },
            M::Xor => Instruction::Xor { mask: self.mask(&ops[0]) },
            M::Not => Instruction::Xor { mask: 0xFF_FFFF },
            M::Clr => Instruction::And { mask: 0 },
            M::Nop => Instruction::NOP,
            M::Skp => Instruction::Skp {
                cond: SkipCondition(self.int(&ops[0], CONDITION) as u8),
                count: self.skip_count(&ops[1], index),
            },
            M::Wlds => Instruction::Wlds {
                lfo: self.lfo(&ops[0], false),
                freq: self.int(&ops[1], SIN_FREQ) as u16,
                amp: self.int(&ops[2], SIN_AMP) as u16,
            },
            M::Wldr => Instruction::Wldr {
                lfo: self.lfo(&ops[0], true),
                freq: self.int(&ops[1], RAMP_FREQ) as i16,
                amp: self.ramp_amp(&ops[2]),
            },
            M::Jam => Instruction::Jam { lfo: self.lfo(&ops[0], true) },
            M::Cho => self.cho(ops, span),
        }
    }

    fn cho(&mut self, ops: &[Operand], span: Span) -> Instruction {
        let mode = ops[0].expr.as_symbol();
        let lfo = Lfo::from_index(self.int(&ops[1], IntKind { what: "LFO", min: 0, max: 3 }) as u32);
        let flags = |this: &mut Self| match ops.get(2) {
            Some(op) => ChoFlags(this.int(op, CHO_FLAGS) as u8),
            None => ChoFlags(0),
        };
        match mode {
            Some("RDA") if ops.len() == 4 => Instruction::ChoRda {
                lfo,
                flags: flags(self),
                addr: self.address(&ops[3]),
            },
            Some("SOF") if ops.len() == 4 => Instruction::ChoSof {
                lfo,
                flags: flags(self),
                offset: self.coeff(&ops[3], Format::S_15),
            },
            Some("RDAL") if ops.len() <= 3 => Instruction::ChoRdal { lfo, flags: flags(self) },
            Some("RDA" | "SOF" | "RDAL") => {
                self.error(
                    AsmError::OperandCount {
                        mnemonic: format!("CHO {}", mode.unwrap_or_default()),
                        expected: if ops.len() == 4 { "2 or 3".into() } else { "4".into() },
                        found: ops.len(),
                    },
                    span,
                );
                Instruction::NOP
            }
            _ => {
                self.error(
                    AsmError::InvalidOperand {
                        operand: "CHO mode".into(),
                        reason: "expected RDA, SOF or RDAL".into(),
                    },
                    ops[0].span,
                );
                Instruction::NOP
            }
        }
    }

    // ── Operand resolution ───────────────────────────────────

    fn value(&mut self, op: &Operand) -> Option<Value> {
        match self.eval(&op.expr, 0) {
            Ok(v) => Some(v),
            Err(e) => {
                self.error(e, op.span);
                None
            }
        }
    }

    fn out_of_range(&mut self, op: &Operand, what: &str, value: Value, range: String) {
        self.error(
            AsmError::OperandOutOfRange { operand: what.into(), value: value.describe(), range },
            op.span,
        );
    }

    fn int(&mut self, op: &Operand, kind: IntKind) -> i64 {
        let Some(value) = self.value(op) else {
            return 0;
        };
        match value.as_int() {
            Some(n) if (kind.min..=kind.max).contains(&n) => n,
            _ => {
                self.out_of_range(op, kind.what, value, format!("{}..={}", kind.min, kind.max));
                0
            }
        }
    }

    fn register(&mut self, op: &Operand) -> Reg {
        Reg(self.int(op, REGISTER) as u8)
    }

    fn address(&mut self, op: &Operand) -> u16 {
        self.int(op, ADDRESS) as u16
    }

    /// Masks are 24-bit patterns; negative integers and reals use their
    /// S.23 representation.
    fn mask(&mut self, op: &Operand) -> u32 {
        let Some(value) = self.value(op) else {
            return 0;
        };
        if let Value::Real(r) = value {
            return match Format::S_23.from_real(r) {
                Ok((raw, _)) => Format::S_23.to_bits(raw),
                Err(_) => {
                    self.out_of_range(op, MASK.what, value, "[-1, 1)".into());
                    0
                }
            };
        }
        match value.as_int() {
            Some(n) if (MASK.min..=MASK.max).contains(&n) => (n as u32) & 0xFF_FFFF,
            _ => {
                self.out_of_range(op, MASK.what, value, format!("{}..=$FFFFFF", MASK.min));
                0
            }
        }
    }

    /// Decimal operands are real values; hex/binary operands are raw bit
    /// patterns of the field.
    fn coeff(&mut self, op: &Operand, format: Format) -> Coeff {
        let Some(value) = self.value(op) else {
            return Coeff::zero(format);
        };
        if let Value::Raw(bits) = value {
            if bits > format.mask() {
                self.out_of_range(op, "coefficient", value, format!("$0..=${:X}", format.mask()));
                return Coeff::zero(format);
            }
            return Coeff::from_bits(format, bits);
        }
        match format.from_real(value.as_f64()) {
            Ok((raw, Clamp::Exact)) => Coeff::new(format, raw),
            Ok((raw, Clamp::Clamped)) => {
                let coeff = Coeff::new(format, raw);
                self.diagnostics.push(Diagnostic::warning(
                    AsmError::ValueClamped {
                        operand: format!("{format} coefficient"),
                        value: value.describe(),
                        clamped: coeff.to_string(),
                    },
                    Some(op.span),
                ));
                coeff
            }
            Err(e) => {
                self.out_of_range(op, &format!("{format} coefficient"), value, e.range());
                Coeff::zero(format)
            }
        }
    }

    /// A skip count, given directly or as a forward label.
    fn skip_count(&mut self, op: &Operand, index: usize) -> u8 {
        let label = op.expr.as_symbol().and_then(|name| match self.symbols.get(name) {
            Some((Symbol::Label(target), _)) => Some(*target),
            _ => None,
        });
        let count = match label {
            Some(target) => target as i64 - index as i64 - 1,
            None => self.int(op, IntKind { what: SKIP_COUNT.what, min: 0, max: i64::MAX }),
        };
        let target = (index as i64 + 1).saturating_add(count);
        if count < 0 || target > self.instruction_count as i64 {
            self.error(
                AsmError::SkipOutOfBounds { target, program_len: self.instruction_count },
                op.span,
            );
            return 0;
        }
        if count > SKIP_COUNT.max {
            self.out_of_range(op, SKIP_COUNT.what, Value::Int(count), "0..=63".into());
            return 0;
        }
        count as u8
    }

    /// LFO selector: `SIN0`/`SIN1` for sine forms, `RMP0`/`RMP1` (or 0/1)
    /// for ramp forms.
    fn lfo(&mut self, op: &Operand, ramp: bool) -> Lfo {
        let n = self.int(op, IntKind { what: "LFO", min: 0, max: 3 });
        match (ramp, n) {
            (false, 0 | 1) => Lfo::from_index(n as u32),
            (true, 0 | 2) => Lfo::Rmp0,
            (true, 1 | 3) => Lfo::Rmp1,
            _ => {
                self.error(
                    AsmError::InvalidOperand {
                        operand: "LFO".into(),
                        reason: "a ramp LFO cannot be loaded as a sine".into(),
                    },
                    op.span,
                );
                Lfo::Sin0
            }
        }
    }

    fn ramp_amp(&mut self, op: &Operand) -> RampAmp {
        let Some(value) = self.value(op) else {
            return RampAmp::A4096;
        };
        let amp = value.as_int().and_then(|n| match n {
            0..=3 => Some(RampAmp::from_bits(n as u32)),
            n => RampAmp::from_samples(n),
        });
        match amp {
            Some(amp) => amp,
            None => {
                self.out_of_range(op, "ramp amplitude", value, "{512, 1024, 2048, 4096}".into());
                RampAmp::A4096
            }
        }
    }
}

fn apply(op: BinaryOp, a: Value, b: Value) -> Result<Value, AsmError> {
    use Value::*;
    let bitwise = |f: fn(i64, i64) -> i64| match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) => Ok(match (a, b) {
            (Raw(_), Raw(_)) => Raw(f(x, y) as u32),
            _ => Int(f(x, y)),
        }),
        _ => Err(AsmError::InvalidOperand {
            operand: "expression".into(),
            reason: "bitwise operators need integer operands".into(),
        }),
    };
    match op {
        BinaryOp::Or => bitwise(|x, y| x | y),
        BinaryOp::And => bitwise(|x, y| x & y),
        BinaryOp::Add => arith(a, b, |x, y| Ok(Int(x.saturating_add(y))), |x, y| x + y),
        BinaryOp::Sub => arith(a, b, |x, y| Ok(Int(x.saturating_sub(y))), |x, y| x - y),
        BinaryOp::Mul => arith(a, b, |x, y| Ok(Int(x.saturating_mul(y))), |x, y| x * y),
        BinaryOp::Div => arith(
            a,
            b,
            |x, y| match y {
                0 => Err(AsmError::InvalidOperand {
                    operand: "expression".into(),
                    reason: "division by zero".into(),
                }),
                _ if x.wrapping_rem(y) == 0 => Ok(Int(x.checked_div(y).unwrap_or(i64::MAX))),
                _ => Ok(Real(x as f64 / y as f64)),
            },
            |x, y| x / y,
        ),
    }
}

/// Integer arithmetic unless either side is real.
fn arith(
    a: Value,
    b: Value,
    int: impl Fn(i64, i64) -> Result<Value, AsmError>,
    real: fn(f64, f64) -> f64,
) -> Result<Value, AsmError> {
    match (a, b) {
        (Value::Real(_), _) | (_, Value::Real(_)) => Ok(Value::Real(real(a.as_f64(), b.as_f64()))),
        _ => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => int(x, y),
            _ => Ok(Value::Real(real(a.as_f64(), b.as_f64()))),
        },
    }
}

/// Pick `POT0: label` style annotations out of comments.
fn pot_labels(comments: &[Comment]) -> [Option<String>; 3] {
    let mut labels: [Option<String>; 3] = [None, None, None];
    for comment in comments {
        let lower = comment.text.to_ascii_lowercase();
        let Some(at) = lower.find("pot") else {
            continue;
        };
        let rest = &comment.text[at + 3..];
        let rest = rest.trim_start_matches([' ', '_']);
        let Some(digit) = rest.chars().next().and_then(|c| c.to_digit(10)) else {
            continue;
        };
        if digit > 2 || labels[digit as usize].is_some() {
            continue;
        }
        let label = rest[1..]
            .trim_start_matches(|c: char| c == ':' || c == '=' || c == '-' || c.is_whitespace())
            .trim();
        if !label.is_empty() {
            labels[digit as usize] = Some(label.chars().take(24).collect());
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Category;

    fn ok(source: &str) -> Program {
        let asm = assemble("test", source).expect("structural failure");
        assert!(asm.diagnostics.is_empty(), "{:?}", asm.diagnostics.lines());
        asm.program
    }

    fn errors(source: &str) -> Vec<Diagnostic> {
        let asm = assemble("test", source).expect("structural failure");
        asm.diagnostics.errors().cloned().collect()
    }

    #[test]
    fn test_assemble_passthrough() {
        let program = ok("rdax adcl, 1.0\nwrax dacl, 0\nrdax adcr, 1.0\nwrax dacr, 0\n");
        assert_eq!(program.len(), 4);
        assert_eq!(
            program.instructions[0],
            Instruction::Rdax { reg: Reg::ADCL, coeff: Coeff::new(Format::S1_14, 16384) }
        );
        assert_eq!(
            program.instructions[3],
            Instruction::Wrax { reg: Reg::DACR, coeff: Coeff::zero(Format::S1_14) }
        );
    }

    #[test]
    fn test_pseudo_ops() {
        let program = ok("clr\nnot\nabsa\nldax pot0\nnop\n");
        assert_eq!(
            program.instructions,
            vec![
                Instruction::And { mask: 0 },
                Instruction::Xor { mask: 0xFF_FFFF },
                Instruction::Maxx { reg: Reg(0), coeff: Coeff::zero(Format::S1_14) },
                Instruction::Rdfx { reg: Reg::POT0, coeff: Coeff::zero(Format::S1_14) },
                Instruction::NOP,
            ]
        );
    }

    #[test]
    fn test_mem_layout_and_suffixes() {
        let program = ok("mem a 100\nb mem 10\nwra a, 0\nrda a#, 0.5\nrda a^, 0.5\nwra b, 0\n");
        let addrs: Vec<u16> = program
            .instructions
            .iter()
            .map(|i| match i {
                Instruction::Wra { addr, .. } | Instruction::Rda { addr, .. } => *addr,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(addrs, vec![0, 100, 50, 101]);
    }

    #[test]
    fn test_equ_forward_and_expressions() {
        let program = ok("equ half k/2\nequ k 1.0\nsof half, -0.25\nrdax reg0+1, $4000\n");
        assert_eq!(
            program.instructions[0],
            Instruction::Sof {
                coeff: Coeff::new(Format::S1_14, 8192),
                offset: Coeff::new(Format::S_10, -256),
            }
        );
        assert_eq!(
            program.instructions[1],
            Instruction::Rdax { reg: Reg(0x21), coeff: Coeff::new(Format::S1_14, 16384) }
        );
    }

    #[test]
    fn test_skip_to_label() {
        let program = ok("skp run, start\nwlds sin0, 12, 100\nstart: clr\n");
        assert_eq!(
            program.instructions[0],
            Instruction::Skp { cond: SkipCondition(SkipCondition::RUN), count: 1 }
        );
        let program = ok("skp zro|neg, 2\nclr\nclr\n");
        assert_eq!(
            program.instructions[0],
            Instruction::Skp { cond: SkipCondition(0x05), count: 2 }
        );
    }

    #[test]
    fn test_undefined_label_is_one_semantic_error() {
        let errs = errors("clr\nskp run, nowhere\nclr\n");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].category, Category::Semantic);
        assert_eq!(errs[0].span.map(|s| s.line), Some(2));
        assert_eq!(errs[0].error, AsmError::UndefinedSymbol { name: "NOWHERE".into() });
    }

    #[test]
    fn test_best_effort_program_keeps_shape() {
        let asm = assemble("t", "clr\nrdax reg0, 5.0\nwrax dacl, 0\n").unwrap();
        assert_eq!(asm.diagnostics.error_count(), 1);
        assert_eq!(asm.program.len(), 3);
        assert_eq!(
            asm.program.instructions[1],
            Instruction::Rdax { reg: Reg::REG0, coeff: Coeff::zero(Format::S1_14) }
        );
    }

    #[test]
    fn test_program_too_long_is_structural() {
        let source = "sof 0, 0\n".repeat(129);
        let diags = assemble("long", &source).unwrap_err();
        assert_eq!(diags.len(), 1);
        assert!(diags.has_structural());
        assert_eq!(diags.iter().next().and_then(|d| d.span).map(|s| s.line), Some(129));

        let source = "sof 0, 0\n".repeat(128);
        assert_eq!(ok(&source).len(), 128);
    }

    #[test]
    fn test_range_errors() {
        let errs = errors("rdax 64, 1.0\nrda 32768, 0.5\nwlds sin0, 512, 0\nskp run, 64\nand $1000000\n");
        assert_eq!(errs.len(), 5);
        assert!(errs.iter().all(|e| e.category == Category::Semantic));
        let errs = errors("clr\nskp 0, 5\nclr\n");
        assert!(matches!(errs[0].error, AsmError::SkipOutOfBounds { .. }));
    }

    #[test]
    fn test_duplicate_symbol_and_memory_overflow() {
        let errs = errors("equ x 1\nequ X 2\n");
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0].error, AsmError::DuplicateSymbol { .. }));
        let errs = errors("mem a 20000\nmem b 20000\n");
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0].error, AsmError::MemoryOverflow { .. }));
    }

    #[test]
    fn test_recursive_equ() {
        let errs = errors("equ a b\nequ b a\nsof a, 0\n");
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0].error, AsmError::RecursiveSymbol { .. }));
    }

    #[test]
    fn test_clamped_value_is_a_warning() {
        let asm = assemble("t", "sof 1.0, 1.0\n").unwrap();
        assert!(!asm.has_errors());
        assert_eq!(asm.diagnostics.warning_count(), 1);
        assert_eq!(
            asm.program.instructions[0],
            Instruction::Sof {
                coeff: Coeff::new(Format::S1_14, 16384),
                offset: Coeff::new(Format::S_10, 1023),
            }
        );
    }

    #[test]
    fn test_cho_forms() {
        let program = ok(
            "mem d 1000\ncho rda, sin0, sin|reg|compc, d+100\ncho sof, rmp0, na, 0.5\ncho rdal, sin1\nwldr rmp1, -8192, 2048\njam rmp1\n",
        );
        assert_eq!(
            program.instructions[0],
            Instruction::ChoRda { lfo: Lfo::Sin0, flags: ChoFlags(0x06), addr: 100 }
        );
        assert_eq!(
            program.instructions[1],
            Instruction::ChoSof {
                lfo: Lfo::Rmp0,
                flags: ChoFlags(ChoFlags::NA),
                offset: Coeff::new(Format::S_15, 16384),
            }
        );
        assert_eq!(program.instructions[2], Instruction::ChoRdal { lfo: Lfo::Sin1, flags: ChoFlags(0) });
        assert_eq!(
            program.instructions[3],
            Instruction::Wldr { lfo: Lfo::Rmp1, freq: -8192, amp: RampAmp::A2048 }
        );
        assert_eq!(program.instructions[4], Instruction::Jam { lfo: Lfo::Rmp1 });
    }

    #[test]
    fn test_lexical_errors_still_assemble() {
        let asm = assemble("t", "clr\nsof 0 @ 0\nwrax dacl, 0\n").unwrap();
        assert_eq!(asm.diagnostics.error_count(), 1);
        assert_eq!(asm.diagnostics.iter().next().map(|d| d.category), Some(Category::Lexical));
        assert_eq!(asm.program.len(), 3);
        assert_eq!(asm.program.instructions[1], Instruction::NOP);
    }

    #[test]
    fn test_malformed_lines_keep_their_slot() {
        let asm = assemble("t", "skp neg, 2\nsof 0 @ 0\nclr\nwrax dacl, 0\n").unwrap();
        assert_eq!(asm.program.len(), 4);
        assert_eq!(asm.program.instructions[1], Instruction::NOP);
        assert_eq!(
            asm.program.instructions[3],
            Instruction::Wrax { reg: Reg::DACL, coeff: Coeff::zero(Format::S1_14) }
        );

        let asm = assemble("t", "clr\nskp 0, next\nnext: sof 0, 0 0\nclr\n").unwrap();
        assert_eq!(asm.diagnostics.error_count(), 1);
        assert_eq!(asm.program.len(), 4);
        assert_eq!(asm.program.instructions[1], Instruction::Skp { cond: SkipCondition::NONE, count: 0 });
        assert_eq!(asm.program.instructions[2], Instruction::NOP);

        let mut source = "sof 0, 0\n".repeat(128);
        source.push_str("sof 0 @ 0\n");
        let diags = assemble("long", &source).unwrap_err();
        assert_eq!(diags.len(), 1);
        assert!(diags.has_structural());
    }

    #[test]
    fn test_extreme_integers_do_not_overflow() {
        let errs = errors("clr\nskp 0, 9223372036854775807\nclr\n");
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0].error, AsmError::SkipOutOfBounds { .. }));

        assert!(assemble("t", "sof -(0-9223372036854775807-1), 0\n").is_ok());

        let asm = assemble("t", "sof (0-9223372036854775807-1)/-1, 0\n").unwrap();
        assert!(!asm.diagnostics.iter().any(|d| matches!(d.error, AsmError::InvalidOperand { .. })));
        assert_eq!(asm.program.len(), 1);
    }

    #[test]
    fn test_pot_labels_from_comments() {
        let asm = assemble("t", "; POT0: Reverb time\n; Pot 1 = Damping\n; pot2 - Mix\nclr\n").unwrap();
        assert_eq!(asm.program.pot_labels[0].as_deref(), Some("Reverb time"));
        assert_eq!(asm.program.pot_labels[1].as_deref(), Some("Damping"));
        assert_eq!(asm.program.pot_labels[2].as_deref(), Some("Mix"));
    }
}
