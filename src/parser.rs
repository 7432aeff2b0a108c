use crate::ast::*;
use crate::diagnostics::Diagnostic;
use crate::error::AsmError;
use crate::token::{token_to_string, Span, Spanned, Token};

type ParseResult<T> = Result<T, Diagnostic>;

/// Line-oriented SPN parser.
///
/// A malformed line produces one diagnostic and is skipped; parsing then
/// resumes on the next line.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    last_span: Span,
}

impl Parser {
    pub fn new(mut tokens: Vec<Spanned>) -> Self {
        if !matches!(tokens.last().map(|s| &s.token), Some(Token::EOF)) {
            let span = tokens.last().map(|s| s.span).unwrap_or_default();
            tokens.push(Spanned { token: Token::EOF, span });
        }
        Parser { tokens, pos: 0, last_span: Span::default() }
    }

    // ── Helpers ──────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn advance(&mut self) -> Spanned {
        let s = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        self.last_span = s.span;
        s
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::EOF)
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek(), Token::Newline | Token::EOF | Token::Comment(_))
    }

    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        Diagnostic::error(
            AsmError::UnexpectedToken {
                expected: expected.into(),
                found: token_to_string(self.peek()),
            },
            Some(self.span()),
        )
    }

    fn expect(&mut self, expected: &Token, what: &str) -> ParseResult<Spanned> {
        if self.check(expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn skip_line(&mut self) {
        while !matches!(self.peek(), Token::Newline | Token::EOF) {
            self.advance();
        }
    }

    // ── Program ──────────────────────────────────────────────

    pub fn parse_program(&mut self) -> (SourceFile, Vec<Diagnostic>) {
        let mut file = SourceFile::default();
        let mut diagnostics = Vec::new();

        while !self.is_at_end() {
            if let Err(diag) = self.parse_line(&mut file) {
                diagnostics.push(diag);
                self.skip_line();
            }
            if let Token::Comment(text) = self.peek().clone() {
                file.comments.push(Comment { line: self.span().line, text });
                self.advance();
            }
            if !self.eat(&Token::Newline) && !self.is_at_end() {
                diagnostics.push(self.unexpected("end of line"));
                self.skip_line();
                self.eat(&Token::Newline);
            }
        }

        (file, diagnostics)
    }

    fn parse_line(&mut self, file: &mut SourceFile) -> ParseResult<()> {
        if matches!(self.peek_at(1), Token::Colon) {
            if let Token::Ident(name) = self.peek().clone() {
                let span = self.advance().span;
                self.advance();
                file.statements.push(Statement::Label { name, span });
            }
        }

        if self.at_line_end() {
            return Ok(());
        }

        let start = self.span();
        let statement = match self.peek().clone() {
            Token::Mnemonic(mnemonic) => {
                self.advance();
                // Already reported by the lexer.
                if self.eat(&Token::Invalid) {
                    file.statements.push(Statement::Invalid { span: start.to(self.last_span) });
                    return Ok(());
                }
                let operands = self.parse_operands().and_then(|operands| {
                    if self.at_line_end() {
                        Ok(operands)
                    } else {
                        Err(self.unexpected("',' or end of line"))
                    }
                });
                match operands {
                    Ok(operands) => {
                        Statement::Instruction { mnemonic, operands, span: start.to(self.last_span) }
                    }
                    Err(diag) => {
                        file.statements.push(Statement::Invalid { span: start.to(self.last_span) });
                        return Err(diag);
                    }
                }
            }
            Token::Equ | Token::Mem => {
                let directive = self.advance().token;
                let name = self.expect_ident()?;
                self.eat(&Token::Comma);
                let value = self.parse_operand()?;
                directive_statement(directive, name, value, start.to(self.last_span))
            }
            Token::Ident(name) => match self.peek_at(1).clone() {
                directive @ (Token::Equ | Token::Mem) => {
                    self.advance();
                    self.advance();
                    self.eat(&Token::Comma);
                    let value = self.parse_operand()?;
                    directive_statement(directive, name, value, start.to(self.last_span))
                }
                _ => {
                    return Err(Diagnostic::error(
                        AsmError::UnknownMnemonic { name },
                        Some(start),
                    ));
                }
            },
            _ => return Err(self.unexpected("mnemonic, label or directive")),
        };
        if !self.at_line_end() {
            return Err(self.unexpected("',' or end of line"));
        }
        file.statements.push(statement);
        Ok(())
    }

    fn parse_operands(&mut self) -> ParseResult<Vec<Operand>> {
        let mut operands = Vec::new();
        if self.at_line_end() {
            return Ok(operands);
        }
        loop {
            operands.push(self.parse_operand()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(operands)
    }

    fn parse_operand(&mut self) -> ParseResult<Operand> {
        let start = self.span();
        let expr = self.parse_or()?;
        Ok(Operand { expr, span: start.to(self.last_span) })
    }

    // ── Expressions ──────────────────────────────────────────

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_additive()?;
        while self.eat(&Token::Amp) {
            let rhs = self.parse_additive()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Token::Plus) {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.peek().clone() {
            Token::Number(literal) => {
                self.advance();
                Ok(Expr::Literal(literal))
            }
            Token::Ident(name) => {
                self.advance();
                let part = if self.eat(&Token::Hash) {
                    SymbolPart::End
                } else if self.eat(&Token::Caret) {
                    SymbolPart::Middle
                } else {
                    SymbolPart::Start
                };
                Ok(Expr::Symbol { name, part })
            }
            // `CHO RDA, ...` / `CHO SOF, ...` name their mode with a mnemonic.
            Token::Mnemonic(m) => {
                self.advance();
                Ok(Expr::Symbol { name: m.as_str().to_string(), part: SymbolPart::Start })
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.unexpected("operand")),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

fn directive_statement(directive: Token, name: String, value: Operand, span: Span) -> Statement {
    match directive {
        Token::Mem => Statement::Mem { name, size: value, span },
        _ => Statement::Equ { name, value, span },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Mnemonic;
    use crate::lexer::Lexer;
    use crate::token::Literal;

    fn parse(input: &str) -> (SourceFile, Vec<Diagnostic>) {
        let (tokens, errors) = Lexer::new(input).tokenize();
        assert!(errors.is_empty());
        Parser::new(tokens).parse_program()
    }

    #[test]
    fn test_parse_instruction() {
        let (file, diags) = parse("rdax adcl, 0.5\n");
        assert!(diags.is_empty());
        match &file.statements[0] {
            Statement::Instruction { mnemonic, operands, .. } => {
                assert_eq!(*mnemonic, Mnemonic::Rdax);
                assert_eq!(operands.len(), 2);
                assert_eq!(operands[0].expr.as_symbol(), Some("ADCL"));
                assert_eq!(operands[1].expr, Expr::Literal(Literal::Real(0.5)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_label_and_instruction_on_one_line() {
        let (file, diags) = parse("loop: skp run, loop\n");
        assert!(diags.is_empty());
        assert_eq!(file.statements.len(), 2);
        assert!(matches!(&file.statements[0], Statement::Label { name, .. } if name == "LOOP"));
    }

    #[test]
    fn test_parse_directive_orders() {
        let (file, diags) = parse("equ gain 0.5\ndelay mem 1000\nmem ap1, 200\nk equ gain*2\n");
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(file.statements.len(), 4);
        assert!(matches!(&file.statements[0], Statement::Equ { name, .. } if name == "GAIN"));
        assert!(matches!(&file.statements[1], Statement::Mem { name, .. } if name == "DELAY"));
        assert!(matches!(&file.statements[2], Statement::Mem { name, .. } if name == "AP1"));
        assert!(matches!(&file.statements[3], Statement::Equ { name, .. } if name == "K"));
    }

    #[test]
    fn test_expression_precedence() {
        let (file, _) = parse("sof 1+2*3, -(4)\n");
        let Statement::Instruction { operands, .. } = &file.statements[0] else {
            panic!("expected instruction");
        };
        let int = |n| Box::new(Expr::Literal(Literal::Int(n)));
        assert_eq!(
            operands[0].expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: int(1),
                rhs: Box::new(Expr::Binary { op: BinaryOp::Mul, lhs: int(2), rhs: int(3) }),
            }
        );
        assert_eq!(operands[1].expr, Expr::Neg(int(4)));
    }

    #[test]
    fn test_symbol_parts_and_cho_mode() {
        let (file, diags) = parse("cho rda, sin0, sin|reg|compc, delay^\nwra delay#, 0\n");
        assert!(diags.is_empty());
        let Statement::Instruction { operands, .. } = &file.statements[0] else {
            panic!("expected instruction");
        };
        assert_eq!(operands[0].expr.as_symbol(), Some("RDA"));
        assert_eq!(
            operands[3].expr,
            Expr::Symbol { name: "DELAY".into(), part: SymbolPart::Middle }
        );
    }

    #[test]
    fn test_errors_are_per_line() {
        let (file, diags) = parse("foo 1, 2\nsof 0,\nclr\nsof 0 0\n");
        assert_eq!(diags.len(), 3);
        assert_eq!(diags[0].span.map(|s| s.line), Some(1));
        assert_eq!(diags[1].span.map(|s| s.line), Some(2));
        assert_eq!(diags[2].span.map(|s| s.line), Some(4));
        // Broken instruction lines keep a placeholder; the unknown word does not.
        assert_eq!(file.statements.len(), 3);
        assert!(matches!(file.statements[0], Statement::Invalid { .. }));
        assert!(matches!(file.statements[1], Statement::Instruction { mnemonic: Mnemonic::Clr, .. }));
        assert!(matches!(file.statements[2], Statement::Invalid { .. }));
    }

    #[test]
    fn test_comments_collected() {
        let (file, _) = parse("; Pot0: Time\nclr ; tail\n");
        assert_eq!(file.comments.len(), 2);
        assert_eq!(file.comments[0].text, "Pot0: Time");
        assert_eq!(file.comments[1].line, 2);
    }
}
