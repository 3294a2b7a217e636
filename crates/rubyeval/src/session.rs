//! Persistent evaluation sessions.
//!
//! A [`Session`] owns one interpreter and the two channels installed into it. Each
//! statement is evaluated on its own: the capture channel is reset first, so output
//! is attributed to exactly one statement, and a statement that raises does not
//! poison the session.
//!
//! # Input suspension
//!
//! When a statement reads `$stdin` past the supplied input, the engine reports
//! [`EngineError::InputRequired`]. The session then waits in a suspended state until
//! input arrives and replays the *whole statement* from its start. Side effects that
//! happened before the blocking read (output, assignments) happen again on replay;
//! only the output of the final, completed attempt is reported. The input cursor is
//! rewound to where the attempt began, so input consumed by an abandoned attempt is
//! read again by the replay.
//!
//! Two driving styles are offered:
//!
//! - [`Session::evaluate`] runs to completion and asks an [`InputPrompt`] whenever
//!   input is needed.
//! - [`Session::evaluate_interactive`] returns [`EvalProgress::InputRequired`] to the
//!   caller, who continues with [`Session::resume`].

use serde::Serialize;

use crate::{
    engine::{Channels, Engine, EngineError},
    error::{EvaluationError, SessionError},
    io::OutputSink,
    version::RubyVersion,
};

/// Outcome of evaluating one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationResult {
    /// `inspect` of the statement's value, or the exception it raised.
    pub value: Result<String, EvaluationError>,
    /// Everything written to `$stdout` during the evaluation, `None` if nothing was.
    pub captured_output: Option<String>,
}

impl EvaluationResult {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.value.is_err()
    }

    /// Inline annotation shown after the statement, e.g. ` => 42`.
    #[must_use]
    pub fn annotation(&self) -> String {
        match &self.value {
            Ok(value) => format!(" => {value}"),
            Err(error) => format!(" => {error}"),
        }
    }
}

/// Context handed to the caller when a statement needs input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    /// Source of the statement that is waiting.
    pub source: String,
    /// Output the statement produced before blocking, usually its prompt text.
    pub output: Option<String>,
}

/// Result of interactive evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalProgress {
    /// The statement finished, successfully or with an exception.
    Complete(EvaluationResult),
    /// The statement is suspended until input is supplied with [`Session::resume`].
    InputRequired(InputRequest),
}

/// Supplies `$stdin` data when a statement runs out of input.
///
/// Returning `None` signals end of input: reads see EOF instead of blocking again.
pub trait InputPrompt {
    fn request_input(&mut self, request: &InputRequest) -> Option<String>;
}

impl<F> InputPrompt for F
where
    F: FnMut(&InputRequest) -> Option<String>,
{
    fn request_input(&mut self, request: &InputRequest) -> Option<String> {
        self(request)
    }
}

/// `InputPrompt` that never has input: every request is answered with end of input.
#[derive(Debug, Default)]
pub struct NoInput;

impl InputPrompt for NoInput {
    fn request_input(&mut self, _request: &InputRequest) -> Option<String> {
        None
    }
}

#[derive(Debug)]
enum SessionState {
    Idle,
    /// Waiting for input before replaying `source`.
    Suspended { source: String, input_mark: usize },
}

/// One interpreter instance plus the channels installed into it.
pub struct Session {
    version: RubyVersion,
    engine: Box<dyn Engine>,
    channels: Channels,
    state: SessionState,
}

impl Session {
    /// Wraps a freshly created engine, installing new channels whose output capture
    /// decorates `sink`.
    ///
    /// # Errors
    /// Returns `SessionError::Construction` if the engine rejects the channels.
    pub fn new(version: RubyVersion, mut engine: Box<dyn Engine>, sink: Box<dyn OutputSink>) -> Result<Self, SessionError> {
        tracing::info!(%version, "preparing channels for Ruby session");
        let channels = Channels::new(sink);
        engine
            .install(channels.clone())
            .map_err(|err| SessionError::construction(version, err.to_string()))?;
        tracing::info!(%version, "Ruby session initialized");
        Ok(Self {
            version,
            engine,
            channels,
            state: SessionState::Idle,
        })
    }

    /// Version tag the session was created for.
    #[must_use]
    pub fn version(&self) -> RubyVersion {
        self.version
    }

    /// True while a statement waits for input.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        matches!(self.state, SessionState::Suspended { .. })
    }

    /// Adds text (or an end-of-input marker for `None`) to `$stdin` ahead of time.
    ///
    /// Later reads consume it before any input is requested.
    pub fn supply_input(&mut self, text: Option<&str>) {
        self.channels.input.borrow_mut().supply(text);
    }

    /// Evaluates one statement, asking `prompt` for input as often as the statement
    /// needs it.
    ///
    /// There is no retry limit: a prompt that keeps answering with partial input keeps
    /// the statement replaying.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` if the session is suspended from an earlier
    /// [`evaluate_interactive`](Self::evaluate_interactive) call. Statement failures are
    /// reported in the returned [`EvaluationResult`].
    pub fn evaluate(&mut self, source: &str, prompt: &mut impl InputPrompt) -> Result<EvaluationResult, SessionError> {
        let mut progress = self.evaluate_interactive(source)?;
        loop {
            match progress {
                EvalProgress::Complete(result) => return Ok(result),
                EvalProgress::InputRequired(request) => {
                    tracing::info!("statement suspended, requesting input");
                    let input = prompt.request_input(&request);
                    progress = self.resume(input.as_deref())?;
                }
            }
        }
    }

    /// Evaluates one statement, returning control to the caller if it needs input.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` if a statement is already suspended.
    pub fn evaluate_interactive(&mut self, source: &str) -> Result<EvalProgress, SessionError> {
        if let SessionState::Suspended { source: pending, .. } = &self.state {
            return Err(SessionError::InvalidState(format!(
                "a statement is waiting for input, resume or abandon it first: {pending:?}"
            )));
        }
        let input_mark = self.channels.input.borrow().position();
        Ok(self.attempt(source.to_owned(), input_mark))
    }

    /// Supplies input to the suspended statement and replays it.
    ///
    /// `None` supplies end of input.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` if no statement is suspended.
    pub fn resume(&mut self, input: Option<&str>) -> Result<EvalProgress, SessionError> {
        let SessionState::Suspended { source, input_mark } = std::mem::replace(&mut self.state, SessionState::Idle)
        else {
            return Err(SessionError::InvalidState("no statement is waiting for input".to_owned()));
        };
        self.channels.input.borrow_mut().supply(input);
        Ok(self.attempt(source, input_mark))
    }

    /// Drops the suspended statement, if any, and returns whether there was one.
    ///
    /// Input supplied so far stays buffered for later statements.
    pub fn abandon(&mut self) -> bool {
        let was_suspended = self.is_suspended();
        self.state = SessionState::Idle;
        was_suspended
    }

    fn attempt(&mut self, source: String, input_mark: usize) -> EvalProgress {
        tracing::info!(chars = source.len(), "evaluating code");
        tracing::debug!(%source, "statement source");

        self.channels.output.borrow_mut().reset();
        let outcome = self.engine.eval_inspect(&source);
        let captured_output = self.channels.output.borrow().captured();

        match outcome {
            Ok(value) => {
                tracing::info!("code evaluated successfully");
                tracing::debug!(%value, output = ?captured_output, "evaluation result");
                EvalProgress::Complete(EvaluationResult {
                    value: Ok(value),
                    captured_output,
                })
            }
            Err(EngineError::Raised(error)) => {
                tracing::warn!(%error, output = ?captured_output, "error evaluating code");
                EvalProgress::Complete(EvaluationResult {
                    value: Err(error),
                    captured_output,
                })
            }
            Err(EngineError::InputRequired) => {
                self.channels.input.borrow_mut().rewind_to(input_mark);
                self.state = SessionState::Suspended {
                    source: source.clone(),
                    input_mark,
                };
                EvalProgress::InputRequired(InputRequest {
                    source,
                    output: captured_output,
                })
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("version", &self.version)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
