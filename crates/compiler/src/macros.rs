//! Macro pre-processor (C3)
//!
//! Consumes the `Directive` tokens the lexer left behind and expands
//! `{$define}` / `{$undef}` / `{$ifdef}` / `{$ifndef}` / `{$else}` /
//! `{$endif}` conditional compilation, producing a token stream with every
//! directive and every token inside a false branch removed. Unknown
//! directives (anything that isn't one of the six above) pass through
//! silently — this dialect only defines conditional compilation, not a
//! general preprocessor.

use crate::diagnostics::{Diagnostic, DiagnosticList};
use crate::lexer::{Token, TokenKind};
use std::collections::HashSet;

/// The set of symbols currently `{$define}`d.
#[derive(Debug, Default, Clone)]
pub struct MacroTable(HashSet<String>);

impl MacroTable {
    pub fn new() -> Self {
        MacroTable(HashSet::new())
    }

    /// A table seeded with the platform symbols the host build is running
    /// under, so `{$ifdef WINDOWS}` / `{$ifdef UNIX}` resolve the way the
    /// generated code's target platform actually needs.
    pub fn with_platform_defaults() -> Self {
        let mut table = MacroTable::new();
        if cfg!(windows) {
            table.define("WINDOWS");
        } else {
            table.define("UNIX");
        }
        table.define(std::env::consts::ARCH.to_uppercase());
        table
    }

    pub fn define(&mut self, symbol: impl Into<String>) {
        self.0.insert(symbol.into().to_uppercase());
    }

    pub fn undef(&mut self, symbol: &str) {
        self.0.remove(&symbol.to_uppercase());
    }

    pub fn is_defined(&self, symbol: &str) -> bool {
        self.0.contains(&symbol.to_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchState {
    /// This branch's tokens are kept.
    Active,
    /// This branch's condition was false; tokens are dropped, but a sibling
    /// `{$else}` could still activate.
    Inactive,
    /// A sibling branch already activated; no later `{$else}` can.
    Done,
}

struct Frame {
    state: BranchState,
    directive_span: crate::source_map::Span,
}

/// Expand conditional-compilation directives, returning the filtered token
/// stream and any diagnostics (unterminated `{$ifdef}`, stray `{$else}` /
/// `{$endif}`, malformed directive body).
pub fn expand(tokens: Vec<Token>, table: &mut MacroTable) -> (Vec<Token>, DiagnosticList) {
    let mut out = Vec::with_capacity(tokens.len());
    let mut diags = DiagnosticList::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokens {
        if token.kind != TokenKind::Directive {
            if stack.iter().all(|f| f.state == BranchState::Active) {
                out.push(token);
            }
            continue;
        }

        let body = token.text.trim();
        let mut parts = body.splitn(2, char::is_whitespace);
        let directive = parts.next().unwrap_or("").to_lowercase();
        let arg = parts.next().unwrap_or("").trim();
        let currently_active = stack.iter().all(|f| f.state == BranchState::Active);

        match directive.as_str() {
            "define" if currently_active => {
                if arg.is_empty() {
                    diags.push(Diagnostic::error(Some(token.span), "{$define} requires a symbol"));
                } else {
                    table.define(arg);
                }
            }
            "undef" if currently_active => {
                if arg.is_empty() {
                    diags.push(Diagnostic::error(Some(token.span), "{$undef} requires a symbol"));
                } else {
                    table.undef(arg);
                }
            }
            "define" | "undef" => {
                // inside an inactive branch: no-op, matches a true compiler's
                // behavior of never evaluating dead branches
            }
            "ifdef" | "ifndef" => {
                let condition = table.is_defined(arg);
                let satisfied = if directive == "ifdef" { condition } else { !condition };
                let state = if !currently_active {
                    BranchState::Inactive
                } else if satisfied {
                    BranchState::Active
                } else {
                    BranchState::Inactive
                };
                stack.push(Frame {
                    state,
                    directive_span: token.span,
                });
            }
            "else" => {
                if stack.is_empty() {
                    diags.push(Diagnostic::error(Some(token.span), "{$else} without matching {$ifdef}"));
                } else {
                    let parent_active = stack[..stack.len() - 1]
                        .iter()
                        .all(|f| f.state == BranchState::Active);
                    let frame = stack.last_mut().unwrap();
                    frame.state = match frame.state {
                        BranchState::Active => BranchState::Done,
                        BranchState::Inactive if parent_active => BranchState::Active,
                        BranchState::Inactive => BranchState::Inactive,
                        BranchState::Done => BranchState::Done,
                    };
                }
            }
            "endif"
                if stack.pop().is_none() => {
                    diags.push(Diagnostic::error(Some(token.span), "{$endif} without matching {$ifdef}"));
                }
            _ => {
                // unrecognized directive: ignore
            }
        }
    }

    for frame in stack {
        diags.push(Diagnostic::error(
            Some(frame.directive_span),
            "unterminated {$ifdef}/{$ifndef}: missing {$endif}",
        ));
    }

    (out, diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::source_map::SourceMap;

    fn expand_src(src: &str, table: &mut MacroTable) -> (Vec<Token>, DiagnosticList) {
        let mut sm = SourceMap::new();
        let file = sm.add_file("test.pas", src);
        let (tokens, lex_diags) = lex(file, src);
        assert!(lex_diags.is_empty());
        expand(tokens, table)
    }

    #[test]
    fn ifdef_keeps_branch_when_defined() {
        let mut table = MacroTable::new();
        table.define("FOO");
        let (tokens, diags) = expand_src("{$ifdef FOO} begin {$endif}", &mut table);
        assert!(diags.is_empty());
        assert_eq!(tokens.len(), 2); // "begin" + Eof
    }

    #[test]
    fn ifdef_drops_branch_when_undefined() {
        let mut table = MacroTable::new();
        let (tokens, diags) = expand_src("{$ifdef FOO} begin {$endif}", &mut table);
        assert!(diags.is_empty());
        assert_eq!(tokens.len(), 1); // just Eof
    }

    #[test]
    fn else_branch_activates_when_condition_false() {
        let mut table = MacroTable::new();
        let (tokens, diags) =
            expand_src("{$ifdef FOO} a {$else} b {$endif}", &mut table);
        assert!(diags.is_empty());
        assert_eq!(tokens[0].text, "b");
    }

    #[test]
    fn define_inside_active_branch_takes_effect_later() {
        let mut table = MacroTable::new();
        let (tokens, diags) = expand_src(
            "{$define FOO} {$ifdef FOO} yes {$endif}",
            &mut table,
        );
        assert!(diags.is_empty());
        assert_eq!(tokens[0].text, "yes");
    }

    #[test]
    fn unterminated_ifdef_is_diagnosed() {
        let mut table = MacroTable::new();
        let (_tokens, diags) = expand_src("{$ifdef FOO} a", &mut table);
        assert!(diags.has_fatal());
    }

    #[test]
    fn stray_endif_is_diagnosed() {
        let mut table = MacroTable::new();
        let (_tokens, diags) = expand_src("a {$endif}", &mut table);
        assert!(diags.has_fatal());
    }

    #[test]
    fn nested_ifdef_resolves_independently() {
        let mut table = MacroTable::new();
        table.define("OUTER");
        let (tokens, diags) = expand_src(
            "{$ifdef OUTER} {$ifdef INNER} a {$else} b {$endif} {$endif}",
            &mut table,
        );
        assert!(diags.is_empty());
        assert_eq!(tokens[0].text, "b");
    }
}
