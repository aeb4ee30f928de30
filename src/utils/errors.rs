use std::path::PathBuf;
use thiserror::Error;

/// Location context attached to errors that point at a byte offset in a
/// source file. Carries a pre-rendered code frame so the error can be
/// displayed long after the source text is gone.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub offset: Option<usize>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code_frame: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    /// Build a context anchored at `offset` within `source`, computing the
    /// line/column pair and rendering a code frame with a caret under the
    /// offending character.
    pub fn at_offset(source: &str, offset: usize) -> Self {
        let (line, column) = line_column(source, offset);
        Self {
            file_path: None,
            offset: Some(offset),
            line: Some(line),
            column: Some(column),
            code_frame: Some(render_code_frame(source, offset)),
        }
    }
}

/// Computes the 1-based line and 0-based column of a byte offset.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let clamped = offset.min(source.len());
    let before = &source[..clamped];
    let line = before.matches('\n').count() + 1;
    let column = clamped - before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    (line, column)
}

/// Renders every line of `source` with a line-number gutter and places a `^`
/// caret under the character at `offset`. When the offset lands on the `\n`
/// between two lines, a hint is appended since a bare caret past the end of
/// a line is easy to misread.
fn render_code_frame(source: &str, offset: usize) -> String {
    let lines: Vec<&str> = source.split('\n').collect();
    let gutter_width = lines.len().to_string().len();
    let separator = " | ";
    let mut frame = String::new();
    let mut consumed = 0usize;
    for (i, line) in lines.iter().enumerate() {
        let line_num = i + 1;
        frame.push('\n');
        frame.push_str(&format!(
            "{:>width$}{}{}",
            line_num,
            separator,
            line,
            width = gutter_width
        ));
        if consumed <= offset && offset < consumed + line.len() + 1 {
            let error_offset = offset - consumed;
            frame.push('\n');
            frame.push_str(&" ".repeat(gutter_width + separator.len() + error_offset));
            frame.push('^');
            if consumed + line.len() == offset {
                frame.push_str(" (\\n character)");
            }
        }
        consumed += line.len() + 1;
    }
    frame
}

#[derive(Error, Debug, Clone)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid import of the css tag: {message}")]
    ImportContract {
        message: String,
        context: ErrorContext,
    },

    #[error("Error occured while evaluating {id}: {message}")]
    Evaluation {
        id: PathBuf,
        message: String,
        /// The rewritten source that was being executed, kept for diagnosis.
        rewritten: String,
    },

    #[error("Could not statically evaluate css block `{name}`")]
    NonConstantCss { name: String, context: ErrorContext },

    #[error("Could not resolve {specifier} from {importer}")]
    Resolution {
        specifier: String,
        importer: PathBuf,
    },

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExtractError {
    pub fn import_contract(message: String, context: ErrorContext) -> Self {
        Self::ImportContract { message, context }
    }

    pub fn parse(message: String) -> Self {
        Self::Parse {
            message,
            context: None,
        }
    }

    pub fn config(message: String) -> Self {
        Self::Config(message)
    }

    /// Format the error with its code frame / attached source, if any.
    pub fn format_detailed(&self) -> String {
        match self {
            ExtractError::ImportContract { message, context } => {
                format_with_context("Import Error", message, context)
            }
            ExtractError::NonConstantCss { name, context } => format_with_context(
                "Extraction Error",
                &format!(
                    "css block `{}` did not evaluate to a compile-time constant string",
                    name
                ),
                context,
            ),
            ExtractError::Evaluation {
                id,
                message,
                rewritten,
            } => {
                format!(
                    "❌ Evaluation Error: {}\n📁 Module: {}\n📝 Rewritten source:\n{}",
                    message,
                    id.display(),
                    rewritten
                )
            }
            ExtractError::Parse {
                message,
                context: Some(context),
            } => format_with_context("Parse Error", message, context),
            _ => self.to_string(),
        }
    }
}

fn format_with_context(error_type: &str, message: &str, context: &ErrorContext) -> String {
    let mut output = format!("❌ {}: {}", error_type, message);
    if let Some(ref file_path) = context.file_path {
        output.push_str(&format!("\n📁 File: {}", file_path.display()));
    }
    if let (Some(line), Some(column)) = (context.line, context.column) {
        output.push_str(&format!("\n📍 Location: line {}, column {}", line, column));
    }
    if let Some(ref frame) = context.code_frame {
        output.push_str(frame);
    }
    output
}

pub type Result<T> = std::result::Result<T, ExtractError>;

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        ExtractError::Io(err.to_string())
    }
}

impl From<regex::Error> for ExtractError {
    fn from(err: regex::Error) -> Self {
        ExtractError::parse(format!("Regex error: {}", err))
    }
}

impl From<anyhow::Error> for ExtractError {
    fn from(err: anyhow::Error) -> Self {
        ExtractError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_column_of_offsets() {
        let src = "ab\ncd\nef";
        assert_eq!(line_column(src, 0), (1, 0));
        assert_eq!(line_column(src, 4), (2, 1));
        assert_eq!(line_column(src, 6), (3, 0));
    }

    #[test]
    fn code_frame_places_caret() {
        let src = "const a = 1\nconst b = 2";
        let frame = render_code_frame(src, 18);
        assert!(frame.contains("1 | const a = 1"));
        assert!(frame.contains("2 | const b = 2"));
        // Caret sits under `b` (column 6 of line 2), after the "2 | " gutter.
        let caret_line = frame.lines().last().unwrap();
        assert_eq!(caret_line.find('^'), Some(4 + 6));
    }

    #[test]
    fn code_frame_flags_newline_offsets() {
        let src = "ab\ncd";
        let frame = render_code_frame(src, 2);
        assert!(frame.contains("(\\n character)"));
    }

    #[test]
    fn evaluation_errors_format_with_the_rewritten_source() {
        let err = ExtractError::Evaluation {
            id: PathBuf::from("/app/mod.js"),
            message: "`x` is not defined".to_string(),
            rewritten: "main = async () => {\nreturn _exports\n}".to_string(),
        };
        assert!(err.to_string().contains("/app/mod.js"));
        let detailed = err.format_detailed();
        assert!(detailed.contains("`x` is not defined"));
        assert!(detailed.contains("main = async () => {"));
    }
}
