//! Import/export rewriting.
//!
//! Turns ES-module syntax into a plain script that can run inside the
//! isolated evaluation context: every `import` becomes a binding initialized
//! by one of three injected functions, every `export` becomes an assignment
//! into an `_exports` object, and the whole body is wrapped in an async
//! `main` entry point that returns `_exports`.
//!
//! Statements are matched only at statement boundaries (start of input, `;`,
//! whitespace or `(`). This is a best-effort textual scan, not a parse;
//! pathological inputs (module syntax inside string literals) are an
//! accepted limitation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::splice::Splice;

/// Byte spans of one static `import` statement.
///
/// ```text
/// import { a as b } from 'some-module'
/// ^ss                     ^s         ^e
///                                     ^se (after the closing quote)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpecifier {
    /// Start of the whole statement (the `i` of `import`).
    pub ss: usize,
    /// End of the whole statement, just past the closing quote.
    pub se: usize,
    /// Start of the module specifier text, inside the quotes.
    pub s: usize,
    /// End of the module specifier text.
    pub e: usize,
}

impl ImportSpecifier {
    pub fn specifier<'a>(&self, source: &'a str) -> &'a str {
        &source[self.s..self.e]
    }

    pub fn statement<'a>(&self, source: &'a str) -> &'a str {
        &source[self.ss..self.se]
    }
}

static IMPORT_KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[;\s(])import\b").unwrap());

/// Locate every static import statement. Dynamic `import(...)` and
/// `import.meta` are left alone.
pub fn parse_imports(source: &str) -> Vec<ImportSpecifier> {
    let bytes = source.as_bytes();
    let mut imports = Vec::new();
    for caps in IMPORT_KEYWORD_RE.captures_iter(source) {
        let boundary = caps.get(1).map(|m| m.len()).unwrap_or(0);
        let ss = caps.get(0).unwrap().start() + boundary;
        let mut cursor = ss + "import".len();
        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if cursor >= bytes.len() || bytes[cursor] == b'(' || bytes[cursor] == b'.' {
            continue;
        }
        // Scan forward for the quoted module specifier, giving up at the
        // first `;` so a malformed statement cannot swallow a later string.
        let quote = loop {
            if cursor >= bytes.len() || bytes[cursor] == b';' {
                break None;
            }
            if bytes[cursor] == b'\'' || bytes[cursor] == b'"' {
                break Some(bytes[cursor]);
            }
            cursor += 1;
        };
        let Some(quote) = quote else { continue };
        let s = cursor + 1;
        let Some(rel) = source[s..].find(quote as char) else {
            continue;
        };
        let e = s + rel;
        imports.push(ImportSpecifier {
            ss,
            se: e + 1,
            s,
            e,
        });
    }
    imports
}

static FROM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*from\s*").unwrap());
static NAMESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\s*as").unwrap());
static AS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\sas\s").unwrap());
static DEFAULT_AND_NAMED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.*),\s*\{(.*)\}").unwrap());

static EXPORT_DECL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[;\s(])export\s+(function|const|let|var|class)\s+([A-Za-z_$][0-9A-Za-z_$]*)")
        .unwrap()
});
static EXPORT_DEFAULT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[;\s(])export\s+default\s+").unwrap());
static EXPORT_GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[;\s(])export\s+\{([^}]*)\}").unwrap());

/// Quote a module specifier as a script string literal.
pub(crate) fn quote_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Rewrite module syntax out of `source` and wrap it as the `main` entry
/// point. `imports` must be the spans reported by [`parse_imports`] for the
/// same text. `extra_before_end` is appended verbatim just before the
/// `return _exports` epilogue.
///
/// Source with no module syntax comes back as a pure wrap of the original
/// body.
pub fn rewrite_esm(source: &str, imports: &[ImportSpecifier], extra_before_end: &str) -> String {
    let mut out = Splice::new(source);

    for imp in imports {
        let quoted = quote_js_string(imp.specifier(source));
        let raw = &source[imp.ss + "import".len()..imp.s - 1];
        let specifiers = FROM_RE.replace_all(raw, "").to_string();
        let import_function = if NAMESPACE_RE.is_match(&specifiers) {
            "await _importNamespace"
        } else if specifiers.contains('{') {
            "await _importNamed"
        } else {
            "await _importDefault"
        };
        let bindings = NAMESPACE_RE.replace(&specifiers, "").to_string();
        let bindings = AS_RE.replace_all(&bindings, ":").to_string();
        let bindings = DEFAULT_AND_NAMED_RE
            .replace(&bindings, "{$2, default:$1}")
            .to_string();
        let bindings = bindings.trim();
        let replacement = if bindings.is_empty() {
            // Side-effect import: no binding, just evaluate the module.
            format!("{}({})", import_function, quoted)
        } else {
            format!("const {} = {}({})", bindings, import_function, quoted)
        };
        out.overwrite(imp.ss, imp.se, replacement);
    }

    for caps in EXPORT_DECL_RE.captures_iter(source) {
        let declarator = caps.get(2).unwrap().as_str();
        let name = caps.get(3).unwrap();
        out.overwrite(
            caps.get(1).unwrap().end(),
            name.start(),
            format!("{} ", declarator),
        );
        out.append(&format!("_exports.{} = {};\n", name.as_str(), name.as_str()));
    }

    for caps in EXPORT_DEFAULT_RE.captures_iter(source) {
        out.overwrite(
            caps.get(1).unwrap().end(),
            caps.get(0).unwrap().end(),
            "_exports.default=",
        );
    }

    for caps in EXPORT_GROUP_RE.captures_iter(source) {
        out.remove(caps.get(1).unwrap().end(), caps.get(0).unwrap().end());
        for specifier in caps.get(2).unwrap().as_str().split(',') {
            let trimmed = specifier.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut parts = AS_RE.splitn(trimmed, 2);
            let local = parts.next().unwrap_or(trimmed).trim();
            let exported = parts.next().map(str::trim).unwrap_or(local);
            out.append(&format!("_exports.{} = {};\n", exported, local));
        }
    }

    out.prepend("main = async () => {\nconst _exports = {};\n");
    out.append(extra_before_end);
    out.append("\nreturn _exports\n}");
    out.render()
}
