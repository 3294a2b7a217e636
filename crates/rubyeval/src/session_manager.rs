//! Session lifecycle.
//!
//! `SessionManager` owns the current [`Session`] and rebuilds it from configuration:
//! on an explicit reset, or when the configured Ruby version changes. Replacing a
//! session drops the old interpreter outright; variables, buffered input and captured
//! output do not carry over.
//!
//! ```
//! use rubyeval::{Config, NoInput, mini::MiniRubyProvider, session_manager::SessionManager};
//!
//! let config = Config { echo_output: false, ..Config::default() };
//! let mut mgr = SessionManager::new(Box::new(MiniRubyProvider), config).unwrap();
//! let result = mgr.evaluate("x = 40 + 2", &mut NoInput).unwrap();
//! assert_eq!(result.value, Ok("42".to_owned()));
//! ```

use serde::Serialize;

use crate::{
    config::Config,
    engine::EngineProvider,
    error::SessionError,
    io::{NoSink, OutputSink, StdSink},
    parse::{SourceParser, StatementSpan, segment_all},
    session::{EvaluationResult, InputPrompt, Session},
    version::RubyVersion,
};

// =============================================================================
// Output types
// =============================================================================

/// A statement of a document together with its evaluation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementOutcome {
    pub span: StatementSpan,
    pub result: EvaluationResult,
}

impl StatementOutcome {
    /// Inline annotation for the statement's line, e.g. ` => 42`.
    #[must_use]
    pub fn annotation(&self) -> String {
        self.result.annotation()
    }
}

// =============================================================================
// SessionManager
// =============================================================================

/// Creates sessions from configuration and replaces them on reset.
pub struct SessionManager {
    provider: Box<dyn EngineProvider>,
    config: Config,
    session: Session,
}

impl SessionManager {
    /// Creates the manager and its first session for `config.ruby_version`.
    ///
    /// # Errors
    /// Returns `SessionError::Construction` if the interpreter cannot be created. No
    /// other version is tried.
    pub fn new(provider: Box<dyn EngineProvider>, config: Config) -> Result<Self, SessionError> {
        let session = build_session(provider.as_ref(), &config, config.ruby_version)?;
        Ok(Self {
            provider,
            config,
            session,
        })
    }

    /// Builds a new, independent session for `version`.
    ///
    /// The manager's current session is left alone; use
    /// [`reset_session`](Self::reset_session) or [`set_version`](Self::set_version) to
    /// replace it.
    pub fn create_session(&self, version: RubyVersion) -> Result<Session, SessionError> {
        build_session(self.provider.as_ref(), &self.config, version)
    }

    /// Discards the current session and starts a new one with the configured version.
    ///
    /// On failure the error is returned and the old session stays in place.
    pub fn reset_session(&mut self) -> Result<(), SessionError> {
        tracing::info!(version = %self.config.ruby_version, "resetting session");
        self.session = self.create_session(self.config.ruby_version)?;
        Ok(())
    }

    /// Switches the configured version, rebuilding the session if it changed.
    ///
    /// Returns whether a new session was created.
    pub fn set_version(&mut self, version: RubyVersion) -> Result<bool, SessionError> {
        if version == self.config.ruby_version {
            return Ok(false);
        }
        let session = self.create_session(version)?;
        self.config.ruby_version = version;
        self.session = session;
        Ok(true)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Evaluates one statement in the current session.
    pub fn evaluate(&mut self, source: &str, prompt: &mut impl InputPrompt) -> Result<EvaluationResult, SessionError> {
        self.session.evaluate(source, prompt)
    }

    /// Splits `text` into statements and evaluates each one in order.
    ///
    /// Statements that raise are reported in their outcome and do not stop the
    /// statements after them.
    ///
    /// # Errors
    /// Returns `SessionError::Parse` before evaluating anything if `text` does not parse.
    pub fn evaluate_document(
        &mut self,
        parser: &impl SourceParser,
        text: &str,
        prompt: &mut impl InputPrompt,
    ) -> Result<Vec<StatementOutcome>, SessionError> {
        let spans = segment_all(parser, text)?;
        let mut outcomes = Vec::with_capacity(spans.len());
        for span in spans {
            let result = self.session.evaluate(&span.source, prompt)?;
            outcomes.push(StatementOutcome { span, result });
        }
        Ok(outcomes)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Helper functions
// =============================================================================

fn build_session(
    provider: &dyn EngineProvider,
    config: &Config,
    version: RubyVersion,
) -> Result<Session, SessionError> {
    tracing::info!(%version, "creating Ruby session");
    let engine = provider.create(version)?;
    let sink: Box<dyn OutputSink> = if config.echo_output {
        Box::new(StdSink)
    } else {
        Box::new(NoSink)
    };
    Session::new(version, engine, sink)
}
