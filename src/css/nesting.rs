//! CSS nesting flattener.
//!
//! Rewrites nested rule blocks (selectors carrying the `&` self-reference
//! marker) into top-level sibling rules. The transform is a sequence of cut
//! and insert operations against the original character stream: every nested
//! block is cut out of its parent, its selector resolved by substituting `&`
//! with the parent selector, and the resolved rule inserted immediately
//! after the closing brace of the containing top-level rule, depth-first in
//! discovery order. Declarations that are not part of a nested block keep
//! their original relative order and surrounding formatting.
//!
//! At-rule blocks pass through verbatim with no selector substitution;
//! media-query nesting is out of scope here.

use crate::css::tokenizer::{tokenize, Token};
use crate::splice::Splice;

/// Token index of the `}` matching the `{` at `open`, or `None` when the
/// input is unbalanced.
fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        if tok.is_punct('{') {
            depth += 1;
        } else if tok.is_punct('}') {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Substitute every self-reference marker in a (possibly comma-separated)
/// selector with the resolved parent selector. Each comma branch carries its
/// own markers, so a plain textual replacement substitutes independently per
/// branch.
fn resolve_selector(selector: &str, parent: &str) -> String {
    selector.replace('&', parent)
}

/// Flatten one rule body. Returns the body with every nested block removed,
/// and the concatenated resolved rules (each prefixed with a newline) in
/// depth-first discovery order.
fn flatten_block(body: &str, parent: &str) -> (String, String) {
    let tokens = tokenize(body);
    let mut out = String::with_capacity(body.len());
    let mut hoisted = String::new();
    let mut cursor = 0usize;
    let mut seg_start = 0usize;
    let mut i = 0usize;
    while i < tokens.len() {
        let tok = &tokens[i];
        if tok.is_punct(';') {
            seg_start = tok.end();
            i += 1;
            continue;
        }
        if !tok.is_punct('{') {
            i += 1;
            continue;
        }
        let selector_raw = &body[seg_start..tok.start];
        let selector = selector_raw.trim();
        let Some(close) = matching_close(&tokens, i) else {
            break;
        };
        if selector.starts_with('@') || selector.is_empty() {
            // At-rule (or stray) block: copied through untouched.
            seg_start = tokens[close].end();
            i = close + 1;
            continue;
        }
        let leading_ws = selector_raw.len() - selector_raw.trim_start().len();
        let selector_start = seg_start + leading_ws;
        let tail_ws = &body[selector_start + selector.len()..tok.start];
        let resolved = resolve_selector(selector, parent);
        let interior = &body[tok.end()..tokens[close].start];
        let (inner_body, inner_hoisted) = flatten_block(interior, &resolved);

        out.push_str(&body[cursor..selector_start]);
        cursor = tokens[close].end();
        hoisted.push('\n');
        hoisted.push_str(&resolved);
        hoisted.push_str(tail_ws);
        hoisted.push('{');
        hoisted.push_str(&inner_body);
        hoisted.push('}');
        hoisted.push_str(&inner_hoisted);

        seg_start = tokens[close].end();
        i = close + 1;
    }
    out.push_str(&body[cursor..]);
    (out, hoisted)
}

/// Flatten every top-level rule of `input`. Formatting outside moved
/// regions is left untouched.
pub fn flatten_nesting(input: &str) -> String {
    let tokens = tokenize(input);
    let mut out = Splice::new(input);
    let mut seg_start = 0usize;
    let mut i = 0usize;
    while i < tokens.len() {
        let tok = &tokens[i];
        if tok.is_punct(';') {
            seg_start = tok.end();
            i += 1;
            continue;
        }
        if !tok.is_punct('{') {
            i += 1;
            continue;
        }
        let selector = input[seg_start..tok.start].trim();
        let Some(close) = matching_close(&tokens, i) else {
            break;
        };
        if selector.starts_with('@') || selector.is_empty() {
            seg_start = tokens[close].end();
            i = close + 1;
            continue;
        }
        let body = &input[tok.end()..tokens[close].start];
        let (new_body, hoisted) = flatten_block(body, selector);
        if new_body != body {
            out.overwrite(tok.end(), tokens[close].start, new_body);
        }
        if !hoisted.is_empty() {
            out.insert_after(tokens[close].end(), hoisted);
        }
        seg_start = tokens[close].end();
        i = close + 1;
    }
    out.render()
}
