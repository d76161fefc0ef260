//! Grammar and recognition errors.

use thiserror::Error;

/// A defect in a grammar, found while building or running it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("The rule '{rule}' hasn't been defined.")]
    Undefined { rule: String },

    #[error("The rule '{rule}' has already been defined somewhere in the grammar.")]
    Duplicate { rule: String },

    #[error("Malformed regular expression {pattern:?}: {message}")]
    MalformedPattern { pattern: String, message: String },

    #[error("The inner part of ZeroOrMore and OneOrMore must not allow empty matches")]
    EmptyLoop,

    #[error("Left recursion has been detected, involved rule: {rule}")]
    LeftRecursion { rule: String },

    #[error("The root rule is not set")]
    MissingRoot,

    #[error("Operand {operand} is not allowed in this kind of grammar")]
    WrongFlavor { operand: String },

    #[error("{message}")]
    Recording { message: String },

    #[error("The {what} {value} does not fit in a 24-bit operand")]
    OperandOverflow { what: &'static str, value: i64 },
}

type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Input could not be turned into a tree.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RecognitionError {
    /// Line number (1-based) the failure is reported at.
    pub line: usize,
    pub message: String,
    #[source]
    pub cause: Option<BoxedCause>,
}

impl RecognitionError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        line: usize,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            line,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }
}

impl From<GrammarError> for RecognitionError {
    fn from(err: GrammarError) -> Self {
        let message = err.to_string();
        Self::with_cause(1, message, err)
    }
}
