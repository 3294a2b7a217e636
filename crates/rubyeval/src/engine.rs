//! The narrow interface an interpreter runtime is driven through.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    error::{EvaluationError, SessionError},
    input::{InputChannel, InputError},
    io::{OutputCapture, OutputSink},
    version::RubyVersion,
};

/// Handles to a session's two channels, shared with the engine.
///
/// The session keeps one clone and hands another to [`Engine::install`]; both sides
/// see the same buffers. Sessions are single-threaded, so the handles are `Rc`.
#[derive(Debug, Clone)]
pub struct Channels {
    pub output: Rc<RefCell<OutputCapture>>,
    pub input: Rc<RefCell<InputChannel>>,
}

impl Channels {
    /// Fresh channels whose capture decorates `sink`.
    #[must_use]
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            output: Rc::new(RefCell::new(OutputCapture::new(sink))),
            input: Rc::new(RefCell::new(InputChannel::new())),
        }
    }
}

/// Failure of one `eval_inspect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The code read from `$stdin` past the supplied input. The session supplies more
    /// input and evaluates the same code again.
    InputRequired,
    /// The code raised an exception.
    Raised(EvaluationError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputRequired => f.write_str("input required"),
            Self::Raised(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<EvaluationError> for EngineError {
    fn from(error: EvaluationError) -> Self {
        Self::Raised(error)
    }
}

impl From<InputError> for EngineError {
    /// `InputRequired` suspends; end of input surfaces as Ruby's `EOFError`.
    fn from(error: InputError) -> Self {
        match error {
            InputError::InputRequired => Self::InputRequired,
            InputError::EndOfInput => Self::Raised(EvaluationError::new("EOFError", error.to_string())),
        }
    }
}

/// An interpreter instance with persistent state.
pub trait Engine {
    /// Binds the interpreter's `$stdout` and `$stdin` to the session channels.
    ///
    /// Called exactly once, before the first evaluation.
    fn install(&mut self, channels: Channels) -> Result<(), EngineError>;

    /// Evaluates `code` and returns the `inspect` representation of its value.
    ///
    /// State changes (variables, definitions) persist into later calls. Raw values never
    /// leave the engine; the returned string is the only view the caller gets.
    fn eval_inspect(&mut self, code: &str) -> Result<String, EngineError>;
}

/// Builds interpreter instances for a version tag.
///
/// Stands in for obtaining the runtime image: downloading, compiling and
/// instantiating it. Each call must return an engine with no state shared with
/// earlier ones.
pub trait EngineProvider {
    fn create(&self, version: RubyVersion) -> Result<Box<dyn Engine>, SessionError>;
}

impl<F> EngineProvider for F
where
    F: Fn(RubyVersion) -> Result<Box<dyn Engine>, SessionError>,
{
    fn create(&self, version: RubyVersion) -> Result<Box<dyn Engine>, SessionError> {
        self(version)
    }
}
