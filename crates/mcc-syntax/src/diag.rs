//! Diagnostics: positions, kinds, and the append-only sink.

use std::fmt;

use thiserror::Error;

use crate::pos::Pos;

/// Category of a reported problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagKind {
    Lex,
    Parse,
    Type,
}

impl fmt::Display for DiagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagKind::Lex => "lex error",
            DiagKind::Parse => "error",
            DiagKind::Type => "type error",
        };
        f.write_str(s)
    }
}

/// A single recorded diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub file: String,
    pub pos: Pos,
    pub kind: DiagKind,
    pub message: String,
}

impl Diagnostic {
    /// The short form used inside the parser: `line L, col C: message`.
    pub fn short(&self) -> String {
        format!(
            "line {}, col {}: {}",
            self.pos.line, self.pos.col, self.message
        )
    }
}

impl fmt::Display for Diagnostic {
    /// The stderr form: `<file>:<line>:<col>: <kind>: <message>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.pos.line, self.pos.col, self.kind, self.message
        )
    }
}

/// A failed parse: the recorded diagnostics, in order. Any diagnostic at all
/// makes the translation unit a failure, even though a partial AST existed.
#[derive(Debug, Error)]
#[error("{count} parse error(s) in '{file}'")]
pub struct SyntaxError {
    pub file: String,
    pub count: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Append-only diagnostic sink. Single-threaded by construction; entries are
/// reported in the order they were recorded.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn record(&mut self, file: &str, pos: Pos, kind: DiagKind, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            file: file.to_string(),
            pos,
            kind,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_format() {
        let d = Diagnostic {
            file: "a.c".into(),
            pos: Pos::new(4, 7),
            kind: DiagKind::Parse,
            message: "unexpected token".into(),
        };
        assert_eq!(format!("{}", d), "a.c:4:7: error: unexpected token");
        assert_eq!(d.short(), "line 4, col 7: unexpected token");
    }

    #[test]
    fn sink_preserves_order() {
        let mut sink = Diagnostics::new();
        sink.record("a.c", Pos::new(1, 1), DiagKind::Parse, "first");
        sink.record("a.c", Pos::new(2, 1), DiagKind::Parse, "second");
        let msgs: Vec<_> = sink.entries().iter().map(|d| d.message.as_str()).collect();
        assert_eq!(msgs, vec!["first", "second"]);
    }
}
