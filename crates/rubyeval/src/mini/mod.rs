//! MiniRuby: a bundled interpreter for a subset of Ruby.
//!
//! It implements both seams of the crate, [`SourceParser`] for statement segmentation
//! and [`Engine`] for evaluation, so documents can be evaluated without an external
//! Ruby runtime. The subset is what interactive snippets typically use: arithmetic,
//! strings with interpolation, arrays, conditionals and loops, method definitions,
//! blocks on the common iteration methods, `begin`/`rescue`, and `$stdout`/`$stdin`.
//!
//! ```
//! use rubyeval::{mini::MiniRubyParser, segment_all};
//!
//! let spans = segment_all(&MiniRubyParser, "a = 1\nputs a").unwrap();
//! assert_eq!(spans.len(), 2);
//! assert_eq!(spans[1].source, "puts a");
//! ```

mod ast;
mod interp;
mod lexer;
mod methods;
mod parser;
mod value;

pub use interp::MiniRuby;

use crate::{
    engine::{Engine, EngineProvider},
    error::SessionError,
    parse::{NodeLocation, ParseError, SourceParser, SyntaxTree},
    version::RubyVersion,
};

/// Statement segmentation with the MiniRuby grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiniRubyParser;

impl SourceParser for MiniRubyParser {
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        let program = parser::parse_program(source, Vec::new())?;
        let statements = program
            .statements
            .into_iter()
            .map(|statement| statement.map(|node| NodeLocation::new(node.start, node.end - node.start)))
            .collect();
        Ok(SyntaxTree::new(statements))
    }
}

/// Creates a fresh [`MiniRuby`] interpreter for every session.
///
/// All version tags are accepted; the tag only sets `RUBY_VERSION`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiniRubyProvider;

impl EngineProvider for MiniRubyProvider {
    fn create(&self, version: RubyVersion) -> Result<Box<dyn Engine>, SessionError> {
        tracing::debug!(%version, "creating MiniRuby interpreter");
        Ok(Box::new(MiniRuby::new(version)))
    }
}
