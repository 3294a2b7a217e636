#![doc = include_str!("../../../README.md")]
#![expect(clippy::needless_pass_by_value, reason = "builtin method signatures take their arguments by value")]

mod config;
mod engine;
mod error;
mod input;
mod io;
pub mod mini;
mod parse;
mod session;
pub mod session_manager;
mod version;

pub use crate::{
    config::{Config, ConfigError, RUBY_VERSION_ENV},
    engine::{Channels, Engine, EngineError, EngineProvider},
    error::{EvaluationError, SessionError},
    input::{InputChannel, InputError},
    io::{CollectStringSink, NoSink, OutputCapture, OutputSink, StdSink},
    parse::{NodeLocation, ParseError, SourceParser, StatementSpan, Statements, SyntaxTree, segment, segment_all},
    session::{EvalProgress, EvaluationResult, InputPrompt, InputRequest, NoInput, Session},
    session_manager::{SessionManager, StatementOutcome},
    version::RubyVersion,
};
