//! Lexer (C2)
//!
//! Turns one file's source text into an ordered sequence of [`Token`]s
//! ending with `Eof`. Comments (`{ ... }` and `(* ... *)`, both nestable)
//! are stripped except for `{$...}` compiler directives, which are emitted
//! as [`TokenKind::Directive`] tokens for the macro pre-processor (C3) to
//! consume. An unterminated string or comment is a recoverable [`Diagnostic`]
//! anchored at the opening token's span; the lexer resumes at the next line.

use crate::diagnostics::{Diagnostic, DiagnosticList};
use crate::source_map::{FileId, Span};

pub const KEYWORDS: &[&str] = &[
    "program",
    "unit",
    "uses",
    "interface",
    "implementation",
    "begin",
    "end",
    "procedure",
    "function",
    "var",
    "const",
    "type",
    "if",
    "then",
    "else",
    "while",
    "do",
    "for",
    "to",
    "downto",
    "in",
    "repeat",
    "until",
    "break",
    "case",
    "of",
    "array",
    "record",
    "file",
    "external",
    "inline",
    "nil",
    "and",
    "or",
    "not",
    "mod",
    "div",
    "true",
    "false",
    "initialization",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Ident,
    IntNumber,
    RealNumber,
    StringLiteral,
    CharLiteral,
    /// An escaped string/char literal of the form `#65#66`, already decoded
    /// (and concatenated with any adjacent `'...'` literal) into `text`.
    EscapedString,
    /// The unparsed interior of a `{$...}` compiler directive comment.
    Directive,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    DotDot,
    Comma,
    Colon,
    ColonEq,
    Semicolon,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    At,
    Caret,
    Plus,
    Minus,
    Star,
    Slash,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// For Ident/Keyword: the original-case spelling. For numbers: the
    /// literal digits. For string/char/escaped-string: the decoded value.
    /// For Directive: the unparsed text between `{$` and `}`.
    pub text: String,
}

impl Token {
    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text.eq_ignore_ascii_case(word)
    }
}

struct Lexer<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    file: FileId,
    tokens: Vec<Token>,
    diags: DiagnosticList,
}

/// Tokenize `text` (already registered in the source map as `file`).
pub fn lex(file: FileId, text: &str) -> (Vec<Token>, DiagnosticList) {
    let mut lexer = Lexer {
        text,
        bytes: text.as_bytes(),
        pos: 0,
        file,
        tokens: Vec::new(),
        diags: DiagnosticList::new(),
    };
    lexer.run();
    (lexer.tokens, lexer.diags)
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(self.file, start as u32, (self.pos - start) as u32)
    }

    /// Skip to just past the next newline (comment/string error recovery).
    fn resync_to_next_line(&mut self) {
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'\n' {
                break;
            }
        }
    }

    fn run(&mut self) {
        loop {
            self.skip_whitespace_and_comments();
            let start = self.pos;
            let Some(c) = self.peek() else {
                self.tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: Span::eof(self.file, self.pos as u32),
                    text: String::new(),
                });
                return;
            };

            if c.is_ascii_alphabetic() || c == b'_' {
                self.lex_ident(start);
            } else if c.is_ascii_digit() {
                self.lex_number(start);
            } else if c == b'\'' {
                self.lex_string(start);
            } else if c == b'#' {
                self.lex_escaped_string(start);
            } else {
                self.lex_punctuation(start);
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                Some(b'{') => {
                    if self.peek_at(1) == Some(b'$') {
                        self.lex_directive();
                    } else {
                        self.skip_brace_comment();
                    }
                }
                Some(b'(') if self.peek_at(1) == Some(b'*') => {
                    self.skip_paren_star_comment();
                }
                _ => break,
            }
        }
    }

    fn lex_directive(&mut self) {
        let start = self.pos;
        self.pos += 2; // consume "{$"
        let inner_start = self.pos;
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => {
                    self.diags.push(Diagnostic::error(
                        Some(self.span_from(start)),
                        "unterminated compiler directive",
                    ));
                    break;
                }
                Some(b'{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
        let inner = &self.text[inner_start..self.pos];
        if self.peek() == Some(b'}') {
            self.pos += 1;
        }
        self.tokens.push(Token {
            kind: TokenKind::Directive,
            span: self.span_from(start),
            text: inner.to_string(),
        });
    }

    fn skip_brace_comment(&mut self) {
        let start = self.pos;
        self.pos += 1; // consume '{'
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => {
                    self.diags.push(Diagnostic::error(
                        Some(self.span_from(start)),
                        "unterminated comment",
                    ));
                    self.resync_to_next_line();
                    return;
                }
                Some(b'{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b'}') => {
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        return;
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn skip_paren_star_comment(&mut self) {
        let start = self.pos;
        self.pos += 2; // consume "(*"
        let mut depth = 1usize;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (None, _) => {
                    self.diags.push(Diagnostic::error(
                        Some(self.span_from(start)),
                        "unterminated comment",
                    ));
                    self.resync_to_next_line();
                    return;
                }
                (Some(b'('), Some(b'*')) => {
                    depth += 1;
                    self.pos += 2;
                }
                (Some(b'*'), Some(b')')) => {
                    depth -= 1;
                    self.pos += 2;
                    if depth == 0 {
                        return;
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    fn lex_ident(&mut self, start: usize) {
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = self.text[start..self.pos].to_string();
        let kind = if is_keyword(&text) {
            TokenKind::Keyword
        } else {
            TokenKind::Ident
        };
        self.tokens.push(Token {
            kind,
            span: self.span_from(start),
            text,
        });
    }

    fn lex_number(&mut self, start: usize) {
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let mut is_real = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_real = true;
            self.pos += 1;
            while let Some(b) = self.peek() {
                if b.is_ascii_digit() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        let text = self.text[start..self.pos].to_string();
        let kind = if is_real {
            TokenKind::RealNumber
        } else {
            TokenKind::IntNumber
        };
        self.tokens.push(Token {
            kind,
            span: self.span_from(start),
            text,
        });
    }

    fn lex_string(&mut self, start: usize) {
        self.pos += 1; // consume opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    self.diags.push(Diagnostic::error(
                        Some(self.span_from(start)),
                        "unterminated string literal",
                    ));
                    self.resync_to_next_line();
                    break;
                }
                Some(b'\'') => {
                    if self.peek_at(1) == Some(b'\'') {
                        value.push('\'');
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        break;
                    }
                }
                Some(b'\n') => {
                    self.diags.push(Diagnostic::error(
                        Some(self.span_from(start)),
                        "unterminated string literal",
                    ));
                    self.resync_to_next_line();
                    break;
                }
                Some(_) => {
                    let ch_start = self.pos;
                    // advance by one UTF-8 scalar
                    let rest = &self.text[ch_start..];
                    let ch = rest.chars().next().unwrap();
                    value.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        let kind = if value.chars().count() == 1 {
            TokenKind::CharLiteral
        } else {
            TokenKind::StringLiteral
        };
        self.tokens.push(Token {
            kind,
            span: self.span_from(start),
            text: value,
        });
    }

    /// `#65#66'CD'` style escaped-string literals, concatenated with an
    /// adjacent `'...'` literal.
    fn lex_escaped_string(&mut self, start: usize) {
        let mut value = String::new();
        loop {
            if self.peek() == Some(b'#') {
                self.pos += 1;
                let digits_start = self.pos;
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits = &self.text[digits_start..self.pos];
                match digits.parse::<u8>() {
                    Ok(code) => value.push(code as char),
                    Err(_) => {
                        self.diags.push(Diagnostic::error(
                            Some(self.span_from(start)),
                            format!("invalid character code '#{digits}'"),
                        ));
                    }
                }
            } else if self.peek() == Some(b'\'') {
                // concatenate an adjacent quoted literal
                let quote_start = self.pos;
                self.pos += 1;
                loop {
                    match self.peek() {
                        None => {
                            self.diags.push(Diagnostic::error(
                                Some(self.span_from(quote_start)),
                                "unterminated string literal",
                            ));
                            break;
                        }
                        Some(b'\'') => {
                            if self.peek_at(1) == Some(b'\'') {
                                value.push('\'');
                                self.pos += 2;
                            } else {
                                self.pos += 1;
                                break;
                            }
                        }
                        Some(_) => {
                            let rest = &self.text[self.pos..];
                            let ch = rest.chars().next().unwrap();
                            value.push(ch);
                            self.pos += ch.len_utf8();
                        }
                    }
                }
            } else {
                break;
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::EscapedString,
            span: self.span_from(start),
            text: value,
        });
    }

    fn push_punct(&mut self, start: usize, kind: TokenKind) {
        let text = self.text[start..self.pos].to_string();
        self.tokens.push(Token {
            kind,
            span: self.span_from(start),
            text,
        });
    }

    fn lex_punctuation(&mut self, start: usize) {
        let c = self.advance().unwrap();
        match c {
            b'(' => self.push_punct(start, TokenKind::LParen),
            b')' => self.push_punct(start, TokenKind::RParen),
            b'[' => self.push_punct(start, TokenKind::LBracket),
            b']' => self.push_punct(start, TokenKind::RBracket),
            b',' => self.push_punct(start, TokenKind::Comma),
            b';' => self.push_punct(start, TokenKind::Semicolon),
            b'@' => self.push_punct(start, TokenKind::At),
            b'^' => self.push_punct(start, TokenKind::Caret),
            b'+' => self.push_punct(start, TokenKind::Plus),
            b'-' => self.push_punct(start, TokenKind::Minus),
            b'*' => self.push_punct(start, TokenKind::Star),
            b'/' => self.push_punct(start, TokenKind::Slash),
            b'.' => {
                if self.peek() == Some(b'.') {
                    self.pos += 1;
                    self.push_punct(start, TokenKind::DotDot);
                } else {
                    self.push_punct(start, TokenKind::Dot);
                }
            }
            b':' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    self.push_punct(start, TokenKind::ColonEq);
                } else {
                    self.push_punct(start, TokenKind::Colon);
                }
            }
            b'=' => self.push_punct(start, TokenKind::Eq),
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    self.push_punct(start, TokenKind::LtEq);
                } else if self.peek() == Some(b'>') {
                    self.pos += 1;
                    self.push_punct(start, TokenKind::NotEq);
                } else {
                    self.push_punct(start, TokenKind::Lt);
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    self.push_punct(start, TokenKind::GtEq);
                } else {
                    self.push_punct(start, TokenKind::Gt);
                }
            }
            other => {
                self.diags.push(Diagnostic::error(
                    Some(self.span_from(start)),
                    format!("unexpected character '{}'", other as char),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_map::SourceMap;

    fn file_id(text: &str) -> (SourceMap, FileId) {
        let mut sm = SourceMap::new();
        let file = sm.add_file("test.pas", text);
        (sm, file)
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (_sm, file) = file_id(src);
        let (tokens, diags) = lex(file, src);
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_keywords_case_insensitively() {
        let (_sm, file) = file_id("Program BEGIN end");
        let (tokens, _) = lex(file, "Program BEGIN end");
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[0].text, "Program");
        assert_eq!(tokens[1].kind, TokenKind::Keyword);
        assert_eq!(tokens[2].kind, TokenKind::Keyword);
    }

    #[test]
    fn lexes_integer_and_real_numbers() {
        assert_eq!(
            kinds("42 3.14 7"),
            vec![
                TokenKind::IntNumber,
                TokenKind::RealNumber,
                TokenKind::IntNumber,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_string_with_escaped_quote() {
        let (_sm, file) = file_id("'it''s'");
        let (tokens, _) = lex(file, "'it''s'");
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].text, "it's");
    }

    #[test]
    fn lexes_char_literal() {
        let (_sm, file) = file_id("'a'");
        let (tokens, _) = lex(file, "'a'");
        assert_eq!(tokens[0].kind, TokenKind::CharLiteral);
        assert_eq!(tokens[0].text, "a");
    }

    #[test]
    fn lexes_escaped_string_concatenated_with_quoted_literal() {
        let (_sm, file) = file_id("#72#101'llo'#33");
        let (tokens, _) = lex(file, "#72#101'llo'#33");
        assert_eq!(tokens[0].kind, TokenKind::EscapedString);
        assert_eq!(tokens[0].text, "Hello!");
    }

    #[test]
    fn strips_brace_comments_but_keeps_directives() {
        let src = "{ a comment } begin {$define FOO} end";
        let (_sm, file) = file_id(src);
        let (tokens, _) = lex(file, src);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword,
                TokenKind::Directive,
                TokenKind::Keyword,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[1].text, "define FOO");
    }

    #[test]
    fn strips_nested_paren_star_comments() {
        let src = "(* outer (* inner *) still *) begin";
        let (_sm, file) = file_id(src);
        let (tokens, _) = lex(file, src);
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
    }

    #[test]
    fn unterminated_string_is_recoverable() {
        let src = "'unterminated\nbegin end";
        let (_sm, file) = file_id(src);
        let (tokens, diags) = lex(file, src);
        assert!(diags.has_fatal());
        // lexer resumes on the next line
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Keyword));
    }

    #[test]
    fn lexes_multi_char_operators() {
        assert_eq!(
            kinds(":= .. <= >= <>"),
            vec![
                TokenKind::ColonEq,
                TokenKind::DotDot,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::NotEq,
                TokenKind::Eof
            ]
        );
    }
}
