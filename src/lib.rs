//! Build-time constant folding for `css` tagged template literals.
//!
//! Modules that import the tagging capability are rewritten so every tagged
//! block becomes a hash-derived class-name string, while the CSS itself is
//! folded out into a stylesheet. Folding works by evaluating an
//! instrumented copy of the module (and its import graph) in an isolated
//! context, so blocks may interpolate any value that is constant at build
//! time.

pub mod cli;
pub mod config;
pub mod css;
pub mod esm;
pub mod evaluator;
pub mod extract;
pub mod locator;
pub mod script;
pub mod splice;
pub mod utils;

pub use config::Config;
pub use evaluator::Evaluator;
pub use extract::{ExtractOutput, Extractor};
pub use utils::{ExtractError, Result};
