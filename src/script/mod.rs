//! Isolated evaluation context.
//!
//! A small lexer / recursive-descent parser / treewalk interpreter for the
//! script subset the ESM rewriter emits: binding declarations (with object
//! destructuring), assignments, function declarations, arrows, template
//! literals, tagged templates, member access, calls and `await`. The context
//! is seeded with inert stand-ins for ambient browser globals so evaluated
//! modules do not throw merely from referencing them, and with the three
//! injected import functions that recurse into the module evaluator.
//!
//! Source outside the subset fails that module's evaluation with a
//! diagnostic; it is never silently skipped.

mod interp;
mod lexer;
mod parser;
mod value;

pub use interp::{run_module, ImportHost};
pub use value::{new_object, ImportKind, NativeFn, ObjectData, ObjectRef, Value};

use thiserror::Error;

use crate::utils::ExtractError;

#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("{message}")]
    Parse { message: String, offset: usize },

    #[error("{message}")]
    Runtime { message: String },

    /// An error raised by the embedding host (resolution failure, nested
    /// module failure). Passed through without rewrapping so the original
    /// taxonomy survives.
    #[error(transparent)]
    Host(Box<ExtractError>),
}

impl ScriptError {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>, offset: usize) -> Self {
        Self::Parse {
            message: message.into(),
            offset,
        }
    }
}

pub type ScriptResult<T> = std::result::Result<T, ScriptError>;
