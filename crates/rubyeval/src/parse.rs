//! Splitting a document into top-level statements.
//!
//! The segmenter never looks at Ruby syntax itself. It asks a [`SourceParser`]
//! for the top-level statement list of a syntax tree and turns each node's
//! location into a [`StatementSpan`] over the original text.

use std::{fmt, iter::FusedIterator};

use serde::Serialize;

/// Location of one top-level statement node, as reported by a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLocation {
    /// Byte offset of the first byte of the statement.
    pub start_offset: usize,
    /// Length of the statement in bytes.
    pub length: usize,
}

impl NodeLocation {
    #[must_use]
    pub fn new(start_offset: usize, length: usize) -> Self {
        Self { start_offset, length }
    }

    /// Offset one past the last byte of the statement.
    #[must_use]
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.length
    }
}

/// The part of a parse result the segmenter consumes.
///
/// `statements` mirrors the parser's top-level statement list. Entries may be
/// `None` where the grammar produces an empty statement (for example `a = 1;;b = 2`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxTree {
    pub statements: Vec<Option<NodeLocation>>,
}

impl SyntaxTree {
    #[must_use]
    pub fn new(statements: Vec<Option<NodeLocation>>) -> Self {
        Self { statements }
    }
}

/// A parser engine able to produce the top-level statement list of a document.
///
/// Implementations must be stateless with respect to the input: parsing the same
/// text twice yields the same tree.
pub trait SourceParser {
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError>;
}

impl<F> SourceParser for F
where
    F: Fn(&str) -> Result<SyntaxTree, ParseError>,
{
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        self(source)
    }
}

/// Whole-document parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Name of the parsed source, used in messages (`"<document>"` by default).
    pub source_name: String,
    /// Human readable description of the failure.
    pub message: String,
    /// Byte offset where the failure was detected, when known.
    pub offset: Option<usize>,
    /// The document ended inside an unfinished construct, so appending more text
    /// could make it parse.
    pub incomplete: bool,
}

impl ParseError {
    #[must_use]
    pub fn new(message: impl Into<String>, offset: Option<usize>) -> Self {
        Self {
            source_name: "<document>".to_owned(),
            message: message.into(),
            offset,
            incomplete: false,
        }
    }

    /// Marks the error as caused by input ending too early.
    #[must_use]
    pub fn at_end_of_input(mut self) -> Self {
        self.incomplete = true;
        self
    }

    #[must_use]
    pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = source_name.into();
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{}:{offset}: {}", self.source_name, self.message),
            None => write!(f, "{}: {}", self.source_name, self.message),
        }
    }
}

impl std::error::Error for ParseError {}

/// One top-level executable unit of a document.
///
/// Offsets are byte offsets into the document passed to [`segment`], and
/// `source == &document[start..end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementSpan {
    pub start: usize,
    pub end: usize,
    pub length: usize,
    pub source: String,
}

/// Parses `source` and returns its top-level statements in document order.
///
/// Each call parses from scratch. The returned iterator borrows `source` and yields
/// spans lazily; empty statement slots in the tree are skipped.
///
/// # Errors
/// Returns the parser's [`ParseError`] when the document does not parse. No partial
/// segmentation is produced.
pub fn segment<'s>(parser: &impl SourceParser, source: &'s str) -> Result<Statements<'s>, ParseError> {
    tracing::info!(chars = source.len(), "finding statements");
    tracing::debug!(%source, "segmenting source");
    let tree = parser.parse(source)?;
    Ok(Statements {
        source,
        nodes: tree.statements.into_iter(),
        last_end: 0,
    })
}

/// Like [`segment`], but collects the spans eagerly.
///
/// # Errors
/// Returns the parser's error, or a [`ParseError`] if the parser reported a node
/// location that does not lie on the document's character boundaries.
pub fn segment_all(parser: &impl SourceParser, source: &str) -> Result<Vec<StatementSpan>, ParseError> {
    segment(parser, source)?.collect()
}

/// Lazy sequence of statement spans produced by [`segment`].
///
/// Yields `Err` at most once, for a node whose location falls outside the document,
/// overlaps the previous statement, or splits a UTF-8 character; iteration stops after that.
#[derive(Debug)]
pub struct Statements<'s> {
    source: &'s str,
    nodes: std::vec::IntoIter<Option<NodeLocation>>,
    last_end: usize,
}

impl Iterator for Statements<'_> {
    type Item = Result<StatementSpan, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let location = loop {
            match self.nodes.next() {
                Some(Some(location)) => break location,
                Some(None) => {}
                None => {
                    tracing::info!("all statements retrieved");
                    return None;
                }
            }
        };

        let start = location.start_offset;
        let end = location.end_offset();
        let Some(text) = self.source.get(start..end).filter(|_| start >= self.last_end) else {
            // poison the iterator, the tree cannot be trusted past this point
            self.nodes = Vec::new().into_iter();
            return Some(Err(ParseError::new(
                format!("statement location {start}..{end} is not a valid range of the document"),
                Some(start),
            )));
        };
        self.last_end = end;

        Some(Ok(StatementSpan {
            start,
            end,
            length: location.length,
            source: text.to_owned(),
        }))
    }
}

impl FusedIterator for Statements<'_> {}
