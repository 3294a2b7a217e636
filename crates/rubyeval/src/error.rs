use std::fmt;

use serde::Serialize;

use crate::{parse::ParseError, version::RubyVersion};

/// A statement raised an exception.
///
/// Failures are reported per statement: the session stays usable and the next
/// statement evaluates normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationError {
    /// Ruby class of the raised exception, e.g. `NameError`.
    pub class: String,
    /// Exception message.
    pub message: String,
}

impl EvaluationError {
    #[must_use]
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.class)
    }
}

impl std::error::Error for EvaluationError {}

/// Errors from session construction and the evaluation protocol.
///
/// Statement failures are not in here: they come back inside
/// [`EvaluationResult`](crate::EvaluationResult) so callers can keep going.
#[derive(Debug, Clone)]
pub enum SessionError {
    /// The interpreter for a version could not be obtained or initialized.
    Construction { version: RubyVersion, message: String },
    /// The document could not be split into statements.
    Parse(ParseError),
    /// The call is not valid in the session's current state (e.g. evaluating while
    /// suspended for input, resuming while idle).
    InvalidState(String),
}

impl SessionError {
    #[must_use]
    pub fn construction(version: RubyVersion, message: impl Into<String>) -> Self {
        Self::Construction {
            version,
            message: message.into(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Construction { version, message } => {
                write!(f, "failed to create Ruby {version} session: {message}")
            }
            Self::Parse(error) => write!(f, "parse error: {error}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(error) => Some(error),
            _ => None,
        }
    }
}

impl From<ParseError> for SessionError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}
