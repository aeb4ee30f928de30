//! Locating `css` tagged-template blocks inside a module.
//!
//! Also enforces the import contract for the tagging capability: it must be
//! imported exactly as `import {css} from "static-css-extract"`. Namespace
//! imports, default imports, renames and wrong names each fail with an error
//! anchored at the offending token.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::esm::ImportSpecifier;
use crate::utils::{ErrorContext, ExtractError, Result};

/// Used for error messages.
const CORRECT_IMPORT: &str = "It must be imported as `import {css} from \"static-css-extract\"`";

/// One discovered tagged-template call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssBlock {
    /// Binding name, or a synthesized `style{N}` name for anonymous blocks.
    pub name: String,
    /// Byte offset of the `css` tag.
    pub start: usize,
    /// Byte offset just past the closing backtick.
    pub end: usize,
    /// Whether the block has no named binding and must be re-expressed as an
    /// inline expression rather than tapped by name.
    pub hoist: bool,
}

/// Cheap substring gate run before any parsing: modules that never mention
/// the tagging module cannot need extraction.
pub fn has_tagging_reference(code: &str, tag_module: &str) -> bool {
    code.contains(tag_module)
}

static BLOCK_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*)?css\s*`").unwrap()
});

/// Finds tagged-template call sites and assigns synthetic names to anonymous
/// ones. The counter is monotonic for the lifetime of the locator, i.e. one
/// build pass.
pub struct BlockLocator {
    next_synthetic: AtomicU32,
}

impl Default for BlockLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockLocator {
    pub fn new() -> Self {
        Self {
            next_synthetic: AtomicU32::new(0),
        }
    }

    /// Reset the synthetic-name counter between build passes.
    pub fn reset(&self) {
        self.next_synthetic.store(0, Ordering::Relaxed);
    }

    fn generate_name(&self) -> String {
        let n = self.next_synthetic.fetch_add(1, Ordering::Relaxed) + 1;
        format!("style{}", n)
    }

    /// Finds all instances of `const foo = css`...`` and bare `css`...``
    /// expressions, in source order.
    pub fn find_blocks(&self, code: &str) -> Vec<CssBlock> {
        let mut blocks = Vec::new();
        for caps in BLOCK_START_RE.captures_iter(code) {
            let whole = caps.get(0).unwrap();
            let (name, hoist) = match caps.get(1) {
                Some(name) => (name.as_str().to_string(), false),
                None => (self.generate_name(), true),
            };
            // The block range starts at the `css` tag itself, not the
            // declaration keyword.
            let tag_offset = code[whole.start()..whole.end()]
                .rfind("css")
                .unwrap_or(0);
            let start = whole.start() + tag_offset;
            let end = walk_to_end_of_template(code, whole.end()) + 1;
            blocks.push(CssBlock {
                name,
                start,
                end,
                hoist,
            });
        }
        blocks
    }
}

/// Walks from just past the opening backtick to the first unescaped closing
/// backtick. Templates whose interpolations contain their own backticks
/// terminate early; a known, accepted limitation.
fn walk_to_end_of_template(code: &str, start_index: usize) -> usize {
    let bytes = code.as_bytes();
    let mut i = start_index;
    while i < bytes.len() {
        if bytes[i] == b'`' && (i == 0 || bytes[i - 1] != b'\\') {
            return i;
        }
        i += 1;
    }
    code.len() - 1
}

/// Checks that `import_ref` is the allowed shape for the tagging capability.
/// The caller has already matched the specifier against the tagging module.
pub fn check_tagging_import(
    code: &str,
    import_ref: &ImportSpecifier,
    file: &Path,
) -> Result<()> {
    let entire = import_ref.statement(code);
    let at = |offset_in_statement: usize| {
        ErrorContext::at_offset(code, import_ref.ss + offset_in_statement)
            .with_file(file.to_path_buf())
    };

    if let Some(star) = entire.find('*') {
        return Err(ExtractError::import_contract(
            format!("Cannot use namespace import. {}", CORRECT_IMPORT),
            at(star),
        ));
    }
    let from_index = entire.rfind("from").unwrap_or(entire.len());
    let full_specifiers = entire["import".len()..from_index].trim();
    if !full_specifiers.contains('{') {
        let offset = if full_specifiers.is_empty() {
            "import".len()
        } else {
            entire.find(full_specifiers).unwrap_or(0)
        };
        return Err(ExtractError::import_contract(
            format!("Cannot use default import. {}", CORRECT_IMPORT),
            at(offset),
        ));
    }
    let named = full_specifiers
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim();
    // `["foo", "as", "bar"]` in the error cases, `["css"]` when correct.
    let words: Vec<&str> = named.split_whitespace().collect();
    let named_offset = entire.find(named).unwrap_or(0);
    if words.first().copied() != Some("css") {
        return Err(ExtractError::import_contract(
            format!(
                "Cannot import {} here. {}",
                words.first().copied().unwrap_or(""),
                CORRECT_IMPORT
            ),
            at(named_offset),
        ));
    }
    if words.len() != 1 {
        let as_offset = named.rfind(words[1]).unwrap_or(0);
        return Err(ExtractError::import_contract(
            format!("Cannot rename the import. {}", CORRECT_IMPORT),
            at(named_offset + as_offset),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esm::parse_imports;
    use std::path::PathBuf;

    fn check(code: &str) -> Result<()> {
        let imports = parse_imports(code);
        check_tagging_import(code, &imports[0], &PathBuf::from("mod.js"))
    }

    #[test]
    fn finds_named_blocks() {
        let loc = BlockLocator::new();
        let code = "const foo = css`color: red;`\n";
        let blocks = loc.find_blocks(code);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "foo");
        assert!(!blocks[0].hoist);
        assert_eq!(&code[blocks[0].start..blocks[0].end], "css`color: red;`");
    }

    #[test]
    fn anonymous_blocks_get_synthetic_names() {
        let loc = BlockLocator::new();
        let code = "el.className = css`color: red;`;\nuse(css`color: blue;`);\n";
        let blocks = loc.find_blocks(code);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "style1");
        assert_eq!(blocks[1].name, "style2");
        assert!(blocks[0].hoist && blocks[1].hoist);
    }

    #[test]
    fn counter_is_monotonic_across_modules_until_reset() {
        let loc = BlockLocator::new();
        loc.find_blocks("a(css`x`);\n");
        let blocks = loc.find_blocks("b(css`y`);\n");
        assert_eq!(blocks[0].name, "style2");
        loc.reset();
        let blocks = loc.find_blocks("c(css`z`);\n");
        assert_eq!(blocks[0].name, "style1");
    }

    #[test]
    fn escaped_backticks_do_not_terminate_the_template() {
        let loc = BlockLocator::new();
        let code = "const a = css`content: \"\\``\n";
        let blocks = loc.find_blocks(code);
        assert_eq!(&code[blocks[0].start..blocks[0].end], "css`content: \"\\``");
    }

    #[test]
    fn let_and_var_bindings_are_recognized() {
        let loc = BlockLocator::new();
        let blocks = loc.find_blocks("let a = css`x`\nvar b = css`y`\n");
        assert_eq!(blocks[0].name, "a");
        assert_eq!(blocks[1].name, "b");
    }

    #[test]
    fn rejects_namespace_import() {
        let err = check("import * as s from 'static-css-extract'\n").unwrap_err();
        match err {
            ExtractError::ImportContract { message, context } => {
                assert!(message.contains("namespace"));
                assert_eq!(context.offset, Some(7));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rejects_default_import() {
        let err = check("import s from 'static-css-extract'\n").unwrap_err();
        match err {
            ExtractError::ImportContract { message, context } => {
                assert!(message.contains("default"));
                assert_eq!(context.offset, Some(7));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rejects_wrong_imported_name() {
        let err = check("import {wrong} from 'static-css-extract'\n").unwrap_err();
        match err {
            ExtractError::ImportContract { message, context } => {
                assert!(message.contains("wrong"));
                assert_eq!(context.offset, Some(8));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rejects_renamed_import() {
        let code = "import {css as s} from 'static-css-extract'\n";
        let err = check(code).unwrap_err();
        match err {
            ExtractError::ImportContract { message, context } => {
                assert!(message.contains("rename"));
                // Anchored at the `as` token.
                assert_eq!(context.offset, Some(code.find(" as ").unwrap() + 1));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn accepts_the_correct_shape() {
        assert!(check("import {css} from 'static-css-extract'\n").is_ok());
        assert!(check("import { css } from 'static-css-extract'\n").is_ok());
    }
}
