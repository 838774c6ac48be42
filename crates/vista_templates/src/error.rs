//! Error types for template compilation and rendering.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while resolving, compiling or rendering templates.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("No template flavor or handler for extension: {0}")]
    UnknownFlavor(String),

    #[error("Compile error in {key}: {message}")]
    Compile {
        key: String,
        message: String,
        line: Option<usize>,
        generated_source: String,
    },

    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("{message}")]
    Runtime { message: String, line: Option<usize> },

    #[error(transparent)]
    Failure(Box<TemplateFailure>),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TemplateError {
    /// A failure raised while a template executes.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            line: None,
        }
    }

    /// Template line the error points at, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Compile { line, .. } | Self::Runtime { line, .. } => *line,
            Self::Syntax { line, .. } => Some(*line),
            Self::Failure(failure) => failure.line_number(),
            _ => None,
        }
    }

    /// Attach a template line to a runtime error that has none yet.
    pub(crate) fn at_line(self, at: usize) -> Self {
        match self {
            Self::Runtime { message, line: None } => Self::Runtime {
                message,
                line: Some(at),
            },
            other => other,
        }
    }

    /// The failure context, when this error crossed a template file boundary.
    pub fn as_failure(&self) -> Option<&TemplateFailure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A failure contextualized with the template it happened in.
///
/// Created the first time an error crosses a file render boundary, then
/// re-chained (never re-wrapped) at every enclosing boundary. `chain` holds
/// file names innermost first, so `chain[0]` is the file that failed.
#[derive(Debug)]
pub struct TemplateFailure {
    cause: Box<TemplateError>,
    base_path: PathBuf,
    file_name: Option<String>,
    assigns: HashMap<String, Value>,
    source: String,
    chain: Vec<String>,
}

impl TemplateFailure {
    pub fn new(
        base_path: PathBuf,
        file_name: Option<String>,
        assigns: HashMap<String, Value>,
        source: impl Into<String>,
        cause: TemplateError,
    ) -> Self {
        let chain = file_name.iter().cloned().collect();
        Self {
            cause: Box::new(cause),
            base_path,
            file_name,
            assigns,
            source: source.into(),
            chain,
        }
    }

    /// Record that this failure propagated out of `file_name`.
    pub fn sub_template_of(&mut self, file_name: impl Into<String>) {
        self.chain.push(file_name.into());
    }

    /// The original error, untouched by any boundary crossing.
    pub fn cause(&self) -> &TemplateError {
        &self.cause
    }

    /// The innermost non-failure cause, looking through nested failures.
    pub fn original_cause(&self) -> &TemplateError {
        let mut cause = self.cause.as_ref();
        while let TemplateError::Failure(inner) = cause {
            cause = inner.cause.as_ref();
        }
        cause
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Snapshot of the assigns visible when the failure was first wrapped.
    pub fn assigns(&self) -> &HashMap<String, Value> {
        &self.assigns
    }

    /// Raw text of the template that failed.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Template files crossed while propagating, innermost first.
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Template files from the outermost render down to the failing one.
    pub fn trace(&self) -> impl Iterator<Item = &str> {
        self.chain.iter().rev().map(String::as_str)
    }

    pub fn line_number(&self) -> Option<usize> {
        self.cause.line()
    }

    /// Numbered source lines around the failing line, the failing line
    /// marked with `=>`. Empty when the line is unknown.
    pub fn source_extract(&self, radius: usize) -> String {
        let Some(line) = self.line_number() else {
            return String::new();
        };
        let lines: Vec<&str> = self.source.lines().collect();
        if line == 0 || line > lines.len() {
            return String::new();
        }

        let first = line.saturating_sub(radius).max(1);
        let last = (line + radius).min(lines.len());
        let width = last.to_string().len();

        let mut extract = String::new();
        for number in first..=last {
            let marker = if number == line { "=> " } else { "   " };
            extract.push_str(&format!(
                "{}{:>width$}: {}\n",
                marker,
                number,
                lines[number - 1],
                width = width
            ));
        }
        extract
    }
}

impl fmt::Display for TemplateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file_name {
            Some(file) => write!(f, "{} in {}", self.cause, file)?,
            None => write!(f, "{}", self.cause)?,
        }
        if let Some(line) = self.line_number() {
            write!(f, " on line #{}", line)?;
        }
        if self.chain.len() > 1 {
            let trace: Vec<&str> = self.trace().collect();
            write!(f, " (included via {})", trace.join(" -> "))?;
        }
        Ok(())
    }
}

impl std::error::Error for TemplateFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(source: &str, line: Option<usize>) -> TemplateFailure {
        TemplateFailure::new(
            PathBuf::from("/views"),
            Some("/views/inner.erb".to_string()),
            HashMap::new(),
            source,
            TemplateError::Runtime {
                message: "boom".to_string(),
                line,
            },
        )
    }

    #[test]
    fn test_chain_starts_with_failing_file() {
        let mut failure = failure("a", Some(1));
        failure.sub_template_of("/views/outer.erb");

        assert_eq!(failure.chain(), ["/views/inner.erb", "/views/outer.erb"]);
        let trace: Vec<&str> = failure.trace().collect();
        assert_eq!(trace, vec!["/views/outer.erb", "/views/inner.erb"]);
    }

    #[test]
    fn test_display_includes_trace() {
        let mut failure = failure("a", Some(1));
        failure.sub_template_of("/views/outer.erb");

        let message = failure.to_string();
        assert!(message.starts_with("boom in /views/inner.erb on line #1"));
        assert!(message.contains("/views/outer.erb -> /views/inner.erb"));
    }

    #[test]
    fn test_source_extract_marks_line() {
        let failure = failure("one\ntwo\nthree\nfour\nfive", Some(3));
        let extract = failure.source_extract(1);

        assert_eq!(extract, "   2: two\n=> 3: three\n   4: four\n");
    }

    #[test]
    fn test_source_extract_without_line() {
        let failure = failure("one\ntwo", None);
        assert!(failure.source_extract(2).is_empty());
    }

    #[test]
    fn test_original_cause_looks_through_failures() {
        let inner = failure("a", Some(1));
        let outer = TemplateFailure::new(
            PathBuf::from("/views"),
            None,
            HashMap::new(),
            "",
            TemplateError::Failure(Box::new(inner)),
        );

        assert!(matches!(outer.original_cause(), TemplateError::Runtime { message, .. } if message == "boom"));
        assert_eq!(outer.line_number(), Some(1));
    }

    #[test]
    fn test_at_line_keeps_existing_line() {
        let err = TemplateError::Runtime {
            message: "x".to_string(),
            line: Some(4),
        }
        .at_line(9);
        assert_eq!(err.line(), Some(4));

        let err = TemplateError::runtime("y").at_line(9);
        assert_eq!(err.line(), Some(9));
    }
}
