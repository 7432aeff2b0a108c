use crate::error::LexError;
use crate::isa::Mnemonic;
use crate::token::{Literal, Span, Spanned, Token};

/// Tokenizer for SPN source.
///
/// The lexer is an iterator; after an unrecognized character it reports
/// the error and resumes at the next line, so one pass collects every
/// lexical problem in the file.
pub struct Lexer {
    chars: Vec<char>,
    /// Precomputed byte offset for each char index.
    /// `byte_offsets[i]` = byte offset of `chars[i]` in the original `&str`.
    /// `byte_offsets[chars.len()]` = total byte length (sentinel for EOF).
    byte_offsets: Vec<usize>,
    pos: usize,
    line: u32,
    line_start: usize,
    done: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let mut byte_offsets = Vec::with_capacity(chars.len() + 1);
        let mut offset = 0;
        for ch in &chars {
            byte_offsets.push(offset);
            offset += ch.len_utf8();
        }
        byte_offsets.push(offset);
        Lexer {
            chars,
            byte_offsets,
            pos: 0,
            line: 1,
            line_start: 0,
            done: false,
        }
    }

    /// Collect all tokens and all lexical errors.
    ///
    /// Tokens of a line that contained an error are dropped (the line's
    /// `Newline` is kept) so the parser never sees half a statement. A line
    /// that starts with a mnemonic keeps it, followed by `Token::Invalid`,
    /// so the instruction still takes its slot.
    pub fn tokenize(self) -> (Vec<Spanned>, Vec<LexError>) {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        let mut line_first_token = 0;
        for item in self {
            match item {
                Ok(spanned) => {
                    let ends_line = matches!(spanned.token, Token::Newline);
                    tokens.push(spanned);
                    if ends_line {
                        line_first_token = tokens.len();
                    }
                }
                Err(e) => {
                    let mnemonic_at = match &tokens[line_first_token..] {
                        [Spanned { token: Token::Mnemonic(_), .. }, ..] => Some(0),
                        [
                            Spanned { token: Token::Ident(_), .. },
                            Spanned { token: Token::Colon, .. },
                            Spanned { token: Token::Mnemonic(_), .. },
                            ..,
                        ] => Some(2),
                        _ => None,
                    };
                    match mnemonic_at {
                        Some(at) => {
                            tokens.truncate(line_first_token + at + 1);
                            tokens.push(Spanned { token: Token::Invalid, span: e.span() });
                        }
                        None => tokens.truncate(line_first_token),
                    }
                    errors.push(e);
                }
            }
        }
        (tokens, errors)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn skip_to_end_of_line(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
            self.pos += 1;
        }
    }

    /// Convert a char index to a byte offset.
    fn byte_pos_of(&self, char_idx: usize) -> usize {
        self.byte_offsets[char_idx.min(self.chars.len())]
    }

    fn span_from(&self, start: usize) -> Span {
        Span {
            start: self.byte_pos_of(start),
            end: self.byte_pos_of(self.pos),
            line: self.line,
            column: (start - self.line_start) as u32 + 1,
        }
    }

    fn spanned(&self, token: Token, start: usize) -> Spanned {
        Spanned { token, span: self.span_from(start) }
    }

    fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_whitespace();

        if self.pos >= self.chars.len() {
            self.done = true;
            return Ok(self.spanned(Token::EOF, self.pos));
        }

        let start = self.pos;
        let ch = self.chars[self.pos];
        let single = match ch {
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '|' => Some(Token::Pipe),
            '&' => Some(Token::Amp),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '#' => Some(Token::Hash),
            '^' => Some(Token::Caret),
            _ => None,
        };
        if let Some(token) = single {
            self.pos += 1;
            return Ok(self.spanned(token, start));
        }

        match ch {
            '\n' => {
                self.pos += 1;
                let spanned = self.spanned(Token::Newline, start);
                self.line += 1;
                self.line_start = self.pos;
                Ok(spanned)
            }
            ';' => self.lex_comment(start),
            '$' => self.lex_radix(start, 1, 16),
            '%' => self.lex_radix(start, 1, 2),
            '0' if matches!(self.peek_at(1), Some('x' | 'X')) => self.lex_radix(start, 2, 16),
            c if c.is_ascii_digit() => self.lex_decimal(start),
            '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_decimal(start),
            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.lex_ident(start)),
            _ => {
                self.pos += 1;
                Err(LexError::UnexpectedChar { ch, span: self.span_from(start) })
            }
        }
    }

    fn lex_comment(&mut self, start: usize) -> Result<Spanned, LexError> {
        self.pos += 1; // skip ;
        let text_start = self.pos;
        self.skip_to_end_of_line();
        let text: String = self.chars[text_start..self.pos].iter().collect();
        Ok(self.spanned(Token::Comment(text.trim().to_string()), start))
    }

    /// `$1F`, `0x1F`, `%0001_1111`.
    fn lex_radix(&mut self, start: usize, prefix: usize, radix: u32) -> Result<Spanned, LexError> {
        self.pos += prefix;
        let digits_start = self.pos;
        while self.pos < self.chars.len()
            && (self.chars[self.pos].is_ascii_alphanumeric() || self.chars[self.pos] == '_')
        {
            self.pos += 1;
        }
        let digits: String = self.chars[digits_start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        match u32::from_str_radix(&digits, radix) {
            Ok(value) if !digits.is_empty() => {
                Ok(self.spanned(Token::Number(Literal::Raw(value)), start))
            }
            _ => Err(self.invalid_number(start)),
        }
    }

    fn lex_decimal(&mut self, start: usize) -> Result<Spanned, LexError> {
        let mut real = false;
        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];
            if ch.is_ascii_digit() {
                self.pos += 1;
            } else if ch == '.' && !real {
                real = true;
                self.pos += 1;
            } else if (ch == 'e' || ch == 'E')
                && (self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some('+' | '-'))
                        && self.peek_at(2).is_some_and(|c| c.is_ascii_digit())))
            {
                real = true;
                self.pos += 2;
            } else {
                break;
            }
        }
        if self.pos < self.chars.len() && (self.chars[self.pos].is_ascii_alphabetic() || self.chars[self.pos] == '_') {
            // e.g. `12abc`
            while self.pos < self.chars.len() && self.chars[self.pos].is_ascii_alphanumeric() {
                self.pos += 1;
            }
            return Err(self.invalid_number(start));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let literal = if real {
            text.parse::<f64>().ok().map(Literal::Real)
        } else {
            text.parse::<i64>().ok().map(Literal::Int)
        };
        match literal {
            Some(literal) => Ok(self.spanned(Token::Number(literal), start)),
            None => Err(self.invalid_number(start)),
        }
    }

    fn invalid_number(&self, start: usize) -> LexError {
        LexError::InvalidNumber {
            text: self.chars[start..self.pos].iter().collect(),
            span: self.span_from(start),
        }
    }

    fn lex_ident(&mut self, start: usize) -> Spanned {
        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let token = if text.eq_ignore_ascii_case("equ") {
            Token::Equ
        } else if text.eq_ignore_ascii_case("mem") {
            Token::Mem
        } else if let Ok(m) = text.parse::<Mnemonic>() {
            Token::Mnemonic(m)
        } else {
            Token::Ident(text.to_ascii_uppercase())
        };
        self.spanned(token, start)
    }
}

impl Iterator for Lexer {
    type Item = Result<Spanned, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_token();
        if result.is_err() {
            self.skip_to_end_of_line();
        }
        Some(result)
    }
}
