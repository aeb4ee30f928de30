//! CSS preprocessing: content-hash class derivation plus nesting flattening.

pub mod nesting;
pub mod tokenizer;

pub use nesting::flatten_nesting;
pub use tokenizer::{tokenize, Token, TokenKind};

/// Result of preprocessing one css block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed {
    /// Hash-derived class name, without the leading dot.
    pub class_name: String,
    /// Fully flattened stylesheet text for this block.
    pub css: String,
}

/// Derive the class name for a raw css block: `_` followed by the first 7
/// hex characters of the content hash. Identical input always yields the
/// identical name.
pub fn class_name_for(raw_css: &str) -> String {
    let hash = blake3::hash(raw_css.as_bytes()).to_hex();
    format!("_{}", &hash.as_str()[..7])
}

/// Wrap `raw_css` in a synthetic rule under its hash-derived class and
/// flatten any nested blocks inside it.
pub fn preprocess(raw_css: &str) -> Preprocessed {
    let class_name = class_name_for(raw_css);
    let wrapped = format!(".{} {{\n  {}\n}}", class_name, raw_css);
    let css = flatten_nesting(&wrapped);
    Preprocessed { class_name, css }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_are_deterministic() {
        let a = class_name_for("color: red;");
        let b = class_name_for("color: red;");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_css_yields_distinct_class_names() {
        assert_ne!(class_name_for("color: red;"), class_name_for("color: blue;"));
    }

    #[test]
    fn class_name_shape() {
        let name = class_name_for("color: red;");
        assert_eq!(name.len(), 8);
        assert!(name.starts_with('_'));
        assert!(name[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn preprocess_wraps_in_hashed_selector() {
        let result = preprocess("color: red;");
        assert_eq!(
            result.css,
            format!(".{} {{\n  color: red;\n}}", result.class_name)
        );
    }

    #[test]
    fn preprocess_flattens_nested_blocks() {
        let result = preprocess("color: red;\n& span {\n  color: green;\n}");
        let cls = &result.class_name;
        assert!(
            result.css.contains(&format!(".{} span {{", cls)),
            "got: {}",
            result.css
        );
        // Nested rule hoisted after the synthetic top-level rule.
        let top = result.css.find(&format!(".{} {{", cls)).unwrap();
        let nested = result.css.find(&format!(".{} span {{", cls)).unwrap();
        assert!(top < nested);
    }
}
