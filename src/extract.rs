//! Extraction orchestrator.
//!
//! For each module that imports the tagging capability: verify the import
//! contract, locate the tagged blocks, evaluate an instrumented copy of the
//! module to fold every block to constant CSS text, then emit the rewritten
//! module (blocks replaced by class-name string literals) plus the generated
//! stylesheet text.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::css::preprocess;
use crate::esm::parse_imports;
use crate::evaluator::Evaluator;
use crate::locator::{check_tagging_import, has_tagging_reference, BlockLocator, CssBlock};
use crate::script::{new_object, Value};
use crate::splice::Splice;
use crate::utils::{ErrorContext, ExtractError, Logger, Result};

/// The rewritten module and the CSS folded out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOutput {
    pub code: String,
    pub css: String,
    /// How many blocks were folded.
    pub blocks: usize,
}

/// Name of the side-channel object bound in the instrumented copy's root
/// scope. Prefixed oddly enough that user code will not shadow it.
const SIDE_CHANNEL: &str = "extracted_css";

pub struct Extractor {
    evaluator: Arc<Evaluator>,
    locator: BlockLocator,
    stylesheet: Mutex<String>,
}

impl Extractor {
    pub fn new(evaluator: Arc<Evaluator>) -> Self {
        Self {
            evaluator,
            locator: BlockLocator::new(),
            stylesheet: Mutex::new(String::new()),
        }
    }

    pub fn evaluator(&self) -> &Arc<Evaluator> {
        &self.evaluator
    }

    /// All CSS folded so far in this build pass, in extraction order.
    pub fn stylesheet(&self) -> String {
        self.stylesheet.lock().clone()
    }

    /// Reset between build passes: drops the module cache, the synthetic
    /// name counter and the accumulated stylesheet.
    pub fn clear(&self) {
        self.evaluator.clear_cache();
        self.locator.reset();
        self.stylesheet.lock().clear();
    }

    /// The id under which this module's CSS is imported by the rewritten
    /// code, for the build tool to serve.
    pub fn virtual_css_id(id: &Path) -> String {
        format!("{}.virtual.css", id.display())
    }

    /// Transform one module. `Ok(None)` means the module does not use the
    /// tagging capability and is passed through untouched.
    pub async fn extract(&self, code: &str, id: &Path) -> Result<Option<ExtractOutput>> {
        if !has_tagging_reference(code, self.evaluator.tag_module()) {
            return Ok(None);
        }
        let id_str = id.display().to_string();
        let imports = parse_imports(code);
        let Some(tag_import) = imports
            .iter()
            .find(|imp| imp.specifier(code) == self.evaluator.tag_module())
        else {
            Logger::module_skipped(&id_str);
            return Ok(None);
        };
        Logger::extracting_module(&id_str);
        check_tagging_import(code, tag_import, id)?;

        let blocks = self.locator.find_blocks(code);
        Logger::blocks_found(&id_str, blocks.len());
        if blocks.is_empty() {
            // Imports the tag but never uses it: just drop the import.
            let mut out = Splice::new(code);
            out.remove(tag_import.ss, tag_import.se);
            return Ok(Some(ExtractOutput {
                code: out.render(),
                css: String::new(),
                blocks: 0,
            }));
        }

        let folded = self.fold_blocks(code, id, &blocks).await?;

        let mut css = String::new();
        let mut out = Splice::new(code);
        out.remove(tag_import.ss, tag_import.se);
        for (block, raw) in blocks.iter().zip(&folded) {
            let processed = preprocess(raw);
            out.overwrite(
                block.start,
                block.end,
                format!("\"{}\"", processed.class_name),
            );
            css.push_str(&processed.css);
            css.push('\n');
        }
        out.prepend(&format!("import '{}';\n", Self::virtual_css_id(id)));

        self.stylesheet.lock().push_str(&css);
        Ok(Some(ExtractOutput {
            code: out.render(),
            css,
            blocks: blocks.len(),
        }))
    }

    /// Evaluate an instrumented copy of the module and read each block's
    /// constant text out of the side channel, in block order.
    async fn fold_blocks(
        &self,
        code: &str,
        id: &Path,
        blocks: &[CssBlock],
    ) -> Result<Vec<String>> {
        let (eval_code, taps) = instrument(code, blocks);
        let side_channel = new_object();
        let globals = vec![(
            SIDE_CHANNEL.to_string(),
            Value::Object(side_channel.clone()),
        )];
        self.evaluator
            .run_rewritten(&eval_code, id, &taps, globals)
            .await?;

        let mut folded = Vec::with_capacity(blocks.len());
        for block in blocks {
            let value = side_channel.lock().get(&block.name);
            match value {
                Some(Value::Str(text)) => folded.push(text),
                _ => {
                    return Err(ExtractError::NonConstantCss {
                        name: block.name.clone(),
                        context: ErrorContext::at_offset(code, block.start)
                            .with_file(id.to_path_buf()),
                    })
                }
            }
        }
        Ok(folded)
    }
}

/// Build the evaluation copy. Anonymous blocks are re-expressed inline as
/// `(extracted_css.styleN = css`...`)` so each is evaluated exactly once, in
/// place; named blocks are tapped by appended assignments so their bindings
/// keep working for the rest of the module body.
fn instrument(code: &str, blocks: &[CssBlock]) -> (String, String) {
    let mut eval_copy = Splice::new(code);
    let mut taps = String::new();
    for block in blocks {
        if block.hoist {
            eval_copy.overwrite(
                block.start,
                block.end,
                format!(
                    "({}.{} = {})",
                    SIDE_CHANNEL,
                    block.name,
                    &code[block.start..block.end]
                ),
            );
        } else {
            taps.push_str(&format!("{}.{} = {};\n", SIDE_CHANNEL, block.name, block.name));
        }
    }
    (eval_copy.render(), taps)
}
