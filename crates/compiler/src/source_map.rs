//! Source map (C1)
//!
//! Owns the original source text for every file pulled into a compilation
//! (the program file itself, plus every transitively-`uses`d unit). Every
//! token, and every AST node built from tokens, carries a [`Span`] back into
//! this map rather than a copy of the text, so diagnostics can always show
//! the exact offending slice.

use std::path::{Path, PathBuf};

/// Identifies one source file within a [`SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(u32);

/// A region of source text: which file, and a byte range within it.
///
/// `Span`s are `Copy` and cheap to carry on every token and AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub file: FileId,
    pub offset: u32,
    pub len: u32,
}

impl Span {
    pub fn new(file: FileId, offset: u32, len: u32) -> Self {
        Span { file, offset, len }
    }

    /// A zero-length span at the end of a file, used for EOF tokens and
    /// synthesized diagnostics that have no real source location.
    pub fn eof(file: FileId, offset: u32) -> Self {
        Span { file, offset, len: 0 }
    }
}

struct SourceFile {
    path: PathBuf,
    text: String,
    /// Byte offset of the start of each line, for O(log n) line lookup.
    line_starts: Vec<u32>,
}

fn compute_line_starts(text: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push((i + 1) as u32);
        }
    }
    starts
}

/// Owns every source file involved in one compilation.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap { files: Vec::new() }
    }

    /// Register a file's text, assigning it the next `FileId` in load order.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> FileId {
        let text = text.into();
        let line_starts = compute_line_starts(&text);
        self.files.push(SourceFile {
            path: path.into(),
            text,
            line_starts,
        });
        FileId((self.files.len() - 1) as u32)
    }

    pub fn path(&self, file: FileId) -> &Path {
        &self.files[file.0 as usize].path
    }

    pub fn text(&self, file: FileId) -> &str {
        &self.files[file.0 as usize].text
    }

    /// Recover the exact lexical slice a span covers.
    ///
    /// `source.substr(span.offset, span.length) == token.lexical` is the
    /// round-trip property every token must satisfy.
    pub fn slice(&self, span: Span) -> &str {
        let text = self.text(span.file);
        let start = span.offset as usize;
        let end = start + span.len as usize;
        &text[start..end]
    }

    /// Derive the 1-indexed (line, column) and the full text of that line,
    /// for the caret-style diagnostic renderer.
    pub fn resolve(&self, span: Span) -> (usize, usize, &str) {
        let file = &self.files[span.file.0 as usize];
        let offset = span.offset;
        let line_idx = match file.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = file.line_starts[line_idx];
        let column = offset - line_start;
        let line_end = file
            .line_starts
            .get(line_idx + 1)
            .copied()
            .unwrap_or(file.text.len() as u32);
        let line_text = &file.text[line_start as usize..line_end as usize]
            .trim_end_matches(['\n', '\r']);
        (line_idx + 1, (column + 1) as usize, line_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_round_trips_token_text() {
        let mut sm = SourceMap::new();
        let file = sm.add_file("main.pas", "program hello;\nbegin\nend.\n");
        let span = Span::new(file, 8, 5); // "hello"
        assert_eq!(sm.slice(span), "hello");
    }

    #[test]
    fn resolve_computes_line_and_column() {
        let mut sm = SourceMap::new();
        let file = sm.add_file("main.pas", "program hello;\nbegin\n  writeln(1);\nend.\n");
        // "writeln" starts at offset 23 (line 3, column 3)
        let offset = "program hello;\nbegin\n  ".len() as u32;
        let span = Span::new(file, offset, 7);
        let (line, col, line_text) = sm.resolve(span);
        assert_eq!(line, 3);
        assert_eq!(col, 3);
        assert_eq!(line_text, "  writeln(1);");
    }

    #[test]
    fn resolve_handles_first_line() {
        let mut sm = SourceMap::new();
        let file = sm.add_file("main.pas", "program hello;\n");
        let span = Span::new(file, 0, 7);
        let (line, col, _) = sm.resolve(span);
        assert_eq!(line, 1);
        assert_eq!(col, 1);
    }
}
