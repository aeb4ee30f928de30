//! Token stream for the evaluation-context script subset.

use super::{ScriptError, ScriptResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Ident(String),
    Num(f64),
    Str(String),
    /// Template literal: n+1 cooked quasis around n raw interpolation
    /// sources, parsed lazily by the parser.
    Template {
        quasis: Vec<String>,
        exprs: Vec<String>,
    },
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tok {
    pub kind: TokKind,
    pub pos: usize,
}

const PUNCTS: &[&str] = &[
    "=>", "(", ")", "{", "}", "[", "]", ",", ";", ":", ".", "=", "+", "-", "*", "/",
];

pub fn lex(src: &str) -> ScriptResult<Vec<Tok>> {
    let bytes = src.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        // Comments
        if c == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if c == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            let close = src[i + 2..]
                .find("*/")
                .ok_or_else(|| ScriptError::parse("unterminated comment", i))?;
            i += 2 + close + 2;
            continue;
        }
        if c == b'_' || c == b'$' || c.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len()
                && (bytes[i] == b'_' || bytes[i] == b'$' || bytes[i].is_ascii_alphanumeric())
            {
                i += 1;
            }
            toks.push(Tok {
                kind: TokKind::Ident(src[start..i].to_string()),
                pos: start,
            });
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let text = &src[start..i];
            let num: f64 = text
                .parse()
                .map_err(|_| ScriptError::parse(format!("invalid number `{}`", text), start))?;
            toks.push(Tok {
                kind: TokKind::Num(num),
                pos: start,
            });
            continue;
        }
        if c == b'\'' || c == b'"' {
            let (cooked, next) = lex_string(src, i, c)?;
            toks.push(Tok {
                kind: TokKind::Str(cooked),
                pos: i,
            });
            i = next;
            continue;
        }
        if c == b'`' {
            let pos = i;
            let (quasis, exprs, next) = lex_template(src, i)?;
            toks.push(Tok {
                kind: TokKind::Template { quasis, exprs },
                pos,
            });
            i = next;
            continue;
        }
        if let Some(p) = PUNCTS
            .iter()
            .find(|p| src[i..].starts_with(**p))
        {
            toks.push(Tok {
                kind: TokKind::Punct(p),
                pos: i,
            });
            i += p.len();
            continue;
        }
        return Err(ScriptError::parse(
            format!("unexpected character `{}`", &src[i..].chars().next().unwrap()),
            i,
        ));
    }
    Ok(toks)
}

fn unescape(c: u8) -> char {
    match c {
        b'n' => '\n',
        b't' => '\t',
        b'r' => '\r',
        b'0' => '\0',
        other => other as char,
    }
}

/// Lex a quoted string starting at `start`. Returns the cooked contents and
/// the index just past the closing quote.
fn lex_string(src: &str, start: usize, quote: u8) -> ScriptResult<(String, usize)> {
    let bytes = src.as_bytes();
    let mut out = String::new();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                out.push(unescape(bytes[i + 1]));
                i += 2;
            }
            b if b == quote => return Ok((out, i + 1)),
            _ => {
                let c = src[i..].chars().next().unwrap();
                out.push(c);
                i += c.len_utf8();
            }
        }
    }
    Err(ScriptError::parse("unterminated string literal", start))
}

/// Lex a template literal starting at the opening backtick. Interpolation
/// sources are captured raw and parsed later.
fn lex_template(src: &str, start: usize) -> ScriptResult<(Vec<String>, Vec<String>, usize)> {
    let bytes = src.as_bytes();
    let mut quasis = Vec::new();
    let mut exprs = Vec::new();
    let mut quasi = String::new();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                quasi.push(unescape(bytes[i + 1]));
                i += 2;
            }
            b'`' => {
                quasis.push(quasi);
                return Ok((quasis, exprs, i + 1));
            }
            b'$' if i + 1 < bytes.len() && bytes[i + 1] == b'{' => {
                let (expr_src, next) = scan_interpolation(src, i + 2)?;
                quasis.push(std::mem::take(&mut quasi));
                exprs.push(expr_src);
                i = next;
            }
            _ => {
                let c = src[i..].chars().next().unwrap();
                quasi.push(c);
                i += c.len_utf8();
            }
        }
    }
    Err(ScriptError::parse("unterminated template literal", start))
}

/// Scan the raw source of one `${...}` interpolation, honoring nested
/// braces, strings and templates. Returns the source and the index past the
/// closing `}`.
fn scan_interpolation(src: &str, start: usize) -> ScriptResult<(String, usize)> {
    let bytes = src.as_bytes();
    let mut depth = 1usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                let (_, next) = lex_string(src, i, bytes[i])?;
                i = next;
            }
            b'`' => {
                let (_, _, next) = lex_template(src, i)?;
                i = next;
            }
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((src[start..i].to_string(), i + 1));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    Err(ScriptError::parse("unterminated template interpolation", start))
}
