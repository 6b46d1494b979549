//! Diagnostics
//!
//! Every phase (lex, macro, parse, typecheck, codegen) accumulates
//! [`Diagnostic`]s into a [`DiagnosticList`] rather than printing directly.
//! A phase checks [`DiagnosticList::has_fatal`] at entry and is skipped if
//! true; fatal parser/typechecker errors additionally bubble via `Result`
//! to abort their phase locally.

use crate::source_map::{SourceMap, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warn,
    Hint,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub span: Option<Span>,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(span: Option<Span>, message: impl Into<String>) -> Self {
        Diagnostic {
            span,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warn(span: Option<Span>, message: impl Into<String>) -> Self {
        Diagnostic {
            span,
            severity: Severity::Warn,
            message: message.into(),
        }
    }

    pub fn hint(span: Option<Span>, message: impl Into<String>) -> Self {
        Diagnostic {
            span,
            severity: Severity::Hint,
            message: message.into(),
        }
    }
}

/// Accumulates diagnostics across a phase (or a whole compilation).
#[derive(Debug, Clone, Default)]
pub struct DiagnosticList(Vec<Diagnostic>);

impl DiagnosticList {
    pub fn new() -> Self {
        DiagnosticList(Vec::new())
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    pub fn extend(&mut self, other: DiagnosticList) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// True once any `Error`-severity diagnostic has been recorded. Callers
    /// use this to skip later phases (typecheck after a parse error,
    /// codegen after a typecheck error).
    pub fn has_fatal(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    /// Render every diagnostic as `file:row:col`, a source excerpt, a caret,
    /// and the message — the terminal output format §7 specifies.
    pub fn render(&self, source_map: &SourceMap) -> String {
        let mut out = String::new();
        for diag in &self.0 {
            let tag = match diag.severity {
                Severity::Error => "error",
                Severity::Warn => "warning",
                Severity::Hint => "hint",
            };
            match diag.span {
                Some(span) => {
                    let (line, col, line_text) = source_map.resolve(span);
                    let path = source_map.path(span.file).display();
                    out.push_str(&format!("{path}:{line}:{col}: {tag}: {}\n", diag.message));
                    out.push_str(&format!("    {line_text}\n"));
                    out.push_str(&format!("    {}^\n", " ".repeat(col.saturating_sub(1))));
                }
                None => {
                    out.push_str(&format!("{tag}: {}\n", diag.message));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_has_no_fatal_errors() {
        let list = DiagnosticList::new();
        assert!(!list.has_fatal());
    }

    #[test]
    fn warn_does_not_count_as_fatal() {
        let mut list = DiagnosticList::new();
        list.push(Diagnostic::warn(None, "unused variable"));
        assert!(!list.has_fatal());
    }

    #[test]
    fn error_counts_as_fatal() {
        let mut list = DiagnosticList::new();
        list.push(Diagnostic::error(None, "undefined variable"));
        assert!(list.has_fatal());
    }

    #[test]
    fn render_includes_file_position_and_caret() {
        let mut sm = SourceMap::new();
        let file = sm.add_file("main.pas", "program p;\nbegin\n  x := 1;\nend.\n");
        let mut list = DiagnosticList::new();
        let offset = "program p;\nbegin\n  ".len() as u32;
        list.push(Diagnostic::error(
            Some(Span::new(file, offset, 1)),
            "unknown variable 'x'",
        ));
        let rendered = list.render(&sm);
        assert!(rendered.contains("main.pas:3:3: error: unknown variable 'x'"));
        assert!(rendered.contains('^'));
    }
}
