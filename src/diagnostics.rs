//! Assembly/load log: one record per warning or error, rendered either as
//! plain `line:col: message` lines or as an `ariadne` report with source
//! excerpts.

use crate::error::{AsmError, Category};
use crate::token::Span;
use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub error: AsmError,
    /// `None` for problems that have no source position (binary images).
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn error(error: AsmError, span: Option<Span>) -> Self {
        let span = span.or_else(|| match &error {
            AsmError::Lex(e) => Some(e.span()),
            _ => None,
        });
        Diagnostic { severity: Severity::Error, category: error.category(), error, span }
    }

    pub fn warning(error: AsmError, span: Option<Span>) -> Self {
        Diagnostic { severity: Severity::Warning, category: error.category(), error, span }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_structural(&self) -> bool {
        self.is_error() && self.category == Category::Structural
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.span {
            Some(span) => write!(f, "{}:{}: {level}: {}", span.line, span.column, self.error),
            None => write!(f, "{level}: {}", self.error),
        }
    }
}

/// The diagnostics of one load attempt, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.entries.extend(diagnostics);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.entries.len() - self.error_count()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn has_structural(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_structural)
    }

    pub fn first_error_message(&self) -> Option<String> {
        self.errors().next().map(|d| d.to_string())
    }

    /// One display line per record.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(|d| d.to_string()).collect()
    }

    /// Render every record as an ariadne report against `source`.
    pub fn render(&self, name: &str, source: &str) -> String {
        let mut out = Vec::new();
        for diag in &self.entries {
            let kind = match diag.severity {
                Severity::Warning => ReportKind::Warning,
                Severity::Error => ReportKind::Error,
            };
            let range = match diag.span {
                Some(span) => span.start..span.end.max(span.start + 1).min(source.len().max(1)),
                None => 0..0,
            };
            let report = Report::build(kind, (name, range.clone()))
                .with_config(Config::default().with_color(false).with_index_type(IndexType::Byte))
                .with_message(diag.error.to_string());
            let report = if diag.span.is_some() {
                report.with_label(Label::new((name, range)).with_message(category_label(diag.category)))
            } else {
                report
            };
            if report.finish().write((name, Source::from(source)), &mut out).is_err() {
                out.extend_from_slice(diag.to_string().as_bytes());
                out.push(b'\n');
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

fn category_label(category: Category) -> &'static str {
    match category {
        Category::Lexical => "not a valid token",
        Category::Semantic => "here",
        Category::Structural => "program rejected",
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(line: u32, column: u32, start: usize, end: usize) -> Span {
        Span { start, end, line, column }
    }

    #[test]
    fn test_counts_and_lines() {
        let mut d = Diagnostics::new();
        d.push(Diagnostic::error(
            AsmError::UndefinedSymbol { name: "FOO".into() },
            Some(span(3, 5, 20, 23)),
        ));
        d.push(Diagnostic::warning(
            AsmError::ValueClamped {
                operand: "offset".into(),
                value: "1".into(),
                clamped: "0.9990234375".into(),
            },
            Some(span(4, 1, 30, 31)),
        ));
        assert_eq!(d.error_count(), 1);
        assert_eq!(d.warning_count(), 1);
        assert!(!d.has_structural());
        assert_eq!(d.lines()[0], "3:5: error: undefined symbol 'FOO'");
        assert!(d.lines()[1].starts_with("4:1: warning:"));
    }

    #[test]
    fn test_structural_classification() {
        let diag = Diagnostic::error(AsmError::ProgramTooLong { count: 129, max: 128 }, None);
        assert!(diag.is_structural());
        assert_eq!(diag.to_string(), "error: program too long: 129 instructions, limit is 128");
    }

    #[test]
    fn test_render_includes_source_excerpt() {
        let source = "clr\nrdax nowhere, 1.0\n";
        let mut d = Diagnostics::new();
        d.push(Diagnostic::error(
            AsmError::UndefinedSymbol { name: "NOWHERE".into() },
            Some(span(2, 6, 9, 16)),
        ));
        let text = d.render("test.spn", source);
        assert!(text.contains("undefined symbol 'NOWHERE'"));
        assert!(text.contains("rdax nowhere"));
    }
}
