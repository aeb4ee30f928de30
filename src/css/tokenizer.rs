//! CSS lexical splitter.
//!
//! Splits CSS-like text into a flat sequence of fragments: whitespace runs,
//! identifiers (optionally at-rule names), comments, quoted strings, and
//! single punctuation characters. No tree is built; concatenating the token
//! texts reproduces the input byte-for-byte.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Ident,
    Word,
    Comment,
    Str,
    Punct,
}

/// A contiguous span of the input. `start` is the byte offset of `text`
/// within the tokenized string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
}

impl<'a> Token<'a> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct && self.text.chars().next() == Some(c)
    }
}

static TOKEN_GROUPS: Lazy<Vec<(TokenKind, Regex)>> = Lazy::new(|| {
    vec![
        (TokenKind::Whitespace, Regex::new(r"^\s+").unwrap()),
        (TokenKind::Ident, Regex::new(r"^@?[a-zA-Z-][\w-]*").unwrap()),
        (TokenKind::Word, Regex::new(r"^\w+").unwrap()),
        (TokenKind::Comment, Regex::new(r"^/\*.*?\*/").unwrap()),
        (TokenKind::Str, Regex::new(r#"^".*?[^\\]"+"#).unwrap()),
        (TokenKind::Str, Regex::new(r"^'.*?[^\\]'+").unwrap()),
    ]
});

/// Tokenize `input`. The group patterns are tried in order against the
/// remaining text; after any match the scan restarts from the first group.
/// Only a position no group matches is consumed as one raw punctuation
/// character.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    'scan: while pos < input.len() {
        for (kind, group) in TOKEN_GROUPS.iter() {
            if let Some(m) = group.find(&input[pos..]) {
                tokens.push(Token {
                    kind: *kind,
                    text: &input[pos..pos + m.end()],
                    start: pos,
                });
                pos += m.end();
                continue 'scan;
            }
        }
        let char_len = input[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
        tokens.push(Token {
            kind: TokenKind::Punct,
            text: &input[pos..pos + char_len],
            start: pos,
        });
        pos += char_len;
    }
    tokens
}
