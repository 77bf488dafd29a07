//! Diagnostics: the single tagged exception type every user-visible fault is
//! wrapped into, plus a terminal-aware renderer.
//!
//! Starts from a single error struct carrying a message and a `Position`,
//! generalized to the richer taxonomy `spec.md` §6 demands, with a
//! `colored`/hint-suggestion idiom for the terminal-aware formatter.

mod render;

pub use render::Renderer;

use std::fmt;

use crate::value::Value;

/// A source position: 1-based line, optional 1-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: Option<usize>,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position {
            line,
            column: Some(column),
        }
    }
}

/// The eleven error kinds named in spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TypeError,
    ValueError,
    NameError,
    ArityError,
    IndexError,
    AttributeError,
    RuntimeError,
    NotImplementedError,
    InitializationError,
    ConversionError,
    AccessError,
}

impl ErrorKind {
    /// The name of the built-in exception class registered for this kind
    /// (§4.6: one exception subclass per `ErrorKind` variant).
    pub fn class_name(self) -> &'static str {
        match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::NameError => "NameError",
            ErrorKind::ArityError => "ArityError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::NotImplementedError => "NotImplementedError",
            ErrorKind::InitializationError => "InitializationError",
            ErrorKind::ConversionError => "ConversionError",
            ErrorKind::AccessError => "AccessError",
        }
    }

    /// The reverse of [`class_name`](Self::class_name); used when a `throw`
    /// expression raises a built-in exception class by name and the
    /// evaluator needs the matching `ErrorKind` to build an [`Exception`].
    pub fn from_class_name(name: &str) -> Option<ErrorKind> {
        Some(match name {
            "TypeError" => ErrorKind::TypeError,
            "ValueError" => ErrorKind::ValueError,
            "NameError" => ErrorKind::NameError,
            "ArityError" => ErrorKind::ArityError,
            "IndexError" => ErrorKind::IndexError,
            "AttributeError" => ErrorKind::AttributeError,
            "RuntimeError" => ErrorKind::RuntimeError,
            "NotImplementedError" => ErrorKind::NotImplementedError,
            "InitializationError" => ErrorKind::InitializationError,
            "ConversionError" => ErrorKind::ConversionError,
            "AccessError" => ErrorKind::AccessError,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// The kind of a diagnostic hint, used to pick a rendering template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintKind {
    /// "did you mean X?" — a near-miss name/method suggestion.
    DidYouMean,
    /// A generic free-form note.
    Note,
}

/// An optional hint attached to an exception: a list of suggestions plus a
/// tag describing how to present them.
#[derive(Debug, Clone, Default)]
pub struct Hint {
    pub kind: Option<HintKind>,
    pub suggestions: Vec<String>,
}

impl Hint {
    pub fn did_you_mean(suggestions: Vec<String>) -> Self {
        Hint {
            kind: Some(HintKind::DidYouMean),
            suggestions,
        }
    }

    pub fn note(message: impl Into<String>) -> Self {
        Hint {
            kind: Some(HintKind::Note),
            suggestions: vec![message.into()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }
}

/// One frame of the stack trace captured at throw time.
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub function: String,
    pub file: String,
    pub position: Position,
}

/// The single tagged exception value every runtime fault is represented as.
///
/// Per Design Note "Exception as value vs host error": host-level errors
/// (lex/parse/I-O failures) are wrapped into this at the boundary rather than
/// propagated as distinct Rust error types past the evaluator's edge.
#[derive(Debug, Clone)]
pub struct Exception {
    pub kind: ErrorKind,
    pub message: String,
    pub hint: Option<Hint>,
    pub file: String,
    pub line: usize,
    pub column: Option<usize>,
    /// The user-visible class instance this exception wraps, when thrown via
    /// a `throw` expression evaluating a user exception instance.
    pub wrapped: Option<Box<Value>>,
    pub stack: Vec<StackFrame>,
}

impl Exception {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Exception {
            kind,
            message: message.into(),
            hint: None,
            file: String::new(),
            line: 0,
            column: None,
            wrapped: None,
            stack: Vec::new(),
        }
    }

    pub fn at(mut self, file: impl Into<String>, pos: Position) -> Self {
        self.file = file.into();
        self.line = pos.line;
        self.column = pos.column;
        self
    }

    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_wrapped(mut self, value: Value) -> Self {
        self.wrapped = Some(Box::new(value));
        self
    }

    pub fn push_frame(&mut self, frame: StackFrame) {
        self.stack.push(frame);
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}:{})",
            self.kind, self.message, self.file, self.line
        )
    }
}

impl std::error::Error for Exception {}

/// Convenience constructors, one per `ErrorKind`, so call sites read
/// `diagnostics::name_error("x")` rather than constructing `Exception`
/// variants by hand everywhere.
pub fn type_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::TypeError, message)
}

pub fn value_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::ValueError, message)
}

pub fn name_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::NameError, message)
}

pub fn arity_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::ArityError, message)
}

pub fn index_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::IndexError, message)
}

pub fn attribute_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::AttributeError, message)
}

pub fn runtime_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::RuntimeError, message)
}

pub fn not_implemented_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::NotImplementedError, message)
}

pub fn initialization_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::InitializationError, message)
}

pub fn conversion_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::ConversionError, message)
}

pub fn access_error(message: impl Into<String>) -> Exception {
    Exception::new(ErrorKind::AccessError, message)
}

/// Build a "did you mean X?" hint by finding the closest candidate names to
/// `given` (Levenshtein distance via `strsim`).
pub fn suggest(given: &str, candidates: impl IntoIterator<Item = impl AsRef<str>>) -> Option<Hint> {
    let mut best: Option<(String, f64)> = None;
    for candidate in candidates {
        let candidate = candidate.as_ref();
        let score = strsim::jaro_winkler(given, candidate);
        if score > 0.75 && best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
            best = Some((candidate.to_owned(), score));
        }
    }
    best.map(|(name, _)| Hint::did_you_mean(vec![format!("did you mean '{name}'?")]))
}

/// Result alias used throughout the evaluator.
pub type EvalResult<T> = Result<T, Exception>;

/// Host-level faults that originate outside the evaluator proper — reading a
/// module file, parsing source text — typed distinctly per Design Note
/// "Exception as value vs host error" rather than threading raw `io::Error`/
/// parser-error strings through call sites. Converted into an [`Exception`]
/// at the boundary (`From<HostError>`) the moment they reach evaluator code.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<HostError> for Exception {
    fn from(err: HostError) -> Self {
        runtime_error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_display_includes_position() {
        let exc = type_error("bad type").at("main.pf", Position::new(3, 5));
        assert_eq!(format!("{exc}"), "TypeError: bad type (main.pf:3)");
    }

    #[test]
    fn suggest_finds_close_match() {
        let hint = suggest("lenght", ["length", "width", "height"]);
        assert!(hint.is_some());
        assert!(hint.unwrap().suggestions[0].contains("length"));
    }

    #[test]
    fn suggest_returns_none_when_nothing_close() {
        assert!(suggest("zzz", ["length", "width"]).is_none());
    }
}
