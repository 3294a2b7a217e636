//! `$stdin` for a session that cannot block.
//!
//! The interpreter runs synchronously and the only source of fresh input is the
//! caller, which answers asynchronously. [`InputChannel`] therefore never waits: a
//! read that runs past the supplied data fails with [`InputError::InputRequired`],
//! the session asks the caller for more, [`supply`](InputChannel::supply)s it and
//! replays the statement.

use std::fmt;

/// Why a read on the [`InputChannel`] could not return data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputError {
    /// Not enough input has been supplied yet. This is a suspension signal, not a failure.
    InputRequired,
    /// A strict read hit the end-of-input marker.
    EndOfInput,
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputRequired => f.write_str("input required, supply more input and retry"),
            Self::EndOfInput => f.write_str("end of file reached"),
        }
    }
}

impl std::error::Error for InputError {}

/// Append-only character buffer with a read cursor.
///
/// `None` entries mark end of input, as supplied by `supply(None)`. Several markers
/// may be queued: each one ends exactly one read-to-EOF.
#[derive(Debug, Clone, Default)]
pub struct InputChannel {
    chars: Vec<Option<char>>,
    position: usize,
}

impl InputChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends caller-provided text, or an end-of-input marker for `None`.
    pub fn supply(&mut self, text: Option<&str>) {
        match text {
            Some(text) => self.chars.extend(text.chars().map(Some)),
            None => self.chars.push(None),
        }
    }

    /// Reads up to and including the next `\n`.
    ///
    /// Returns `Ok(None)` and consumes the marker when the end-of-input marker is at the
    /// cursor. A line cut short by the marker is returned with a `\n` appended and the
    /// marker is left in place, so the following read reports end of input.
    pub fn read_line(&mut self) -> Result<Option<String>, InputError> {
        if self.chars.get(self.position) == Some(&None) {
            self.position += 1;
            return Ok(None);
        }

        let Some(end) = (self.position..self.chars.len()).find(|&i| matches!(self.chars[i], None | Some('\n'))) else {
            return Err(InputError::InputRequired);
        };

        let mut line = self.collect(self.position, end);
        if self.chars[end].is_some() {
            self.position = end + 1;
        } else {
            self.position = end;
            line.push('\n');
        }
        Ok(Some(line))
    }

    /// Like [`read_line`](Self::read_line), but end of input is an error.
    pub fn read_line_strict(&mut self) -> Result<String, InputError> {
        self.read_line()?.ok_or(InputError::EndOfInput)
    }

    /// Reads `max` characters, or everything up to the end-of-input marker when `max`
    /// is `None` or the marker comes first.
    ///
    /// The marker itself is consumed when the read stops at it. At end of input the
    /// result is an empty string rather than `None`.
    pub fn read(&mut self, max: Option<usize>) -> Result<String, InputError> {
        let mut end = self.position;
        while end < self.chars.len() {
            if max.is_some_and(|max| end - self.position >= max) {
                break;
            }
            if self.chars[end].is_none() {
                break;
            }
            end += 1;
        }

        if max.is_some_and(|max| end - self.position >= max) {
            let chunk = self.collect(self.position, end);
            self.position = end;
            Ok(chunk)
        } else if end < self.chars.len() {
            // stopped at the end-of-input marker
            let chunk = self.collect(self.position, end);
            self.position = end + 1;
            Ok(chunk)
        } else {
            Err(InputError::InputRequired)
        }
    }

    /// Reads to the end-of-input marker and splits the text into lines, keeping
    /// each line's terminator.
    pub fn read_lines(&mut self) -> Result<Vec<String>, InputError> {
        let text = self.read(None)?;
        Ok(text.split_inclusive('\n').map(str::to_owned).collect())
    }

    /// Whether the next read would hit the end-of-input marker.
    ///
    /// Fails with [`InputError::InputRequired`] when nothing is buffered past the cursor,
    /// since the answer depends on input that has not been supplied yet.
    pub fn at_eof(&self) -> Result<bool, InputError> {
        match self.chars.get(self.position) {
            Some(next) => Ok(next.is_none()),
            None => Err(InputError::InputRequired),
        }
    }

    /// Number of buffered entries (characters and markers) not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.chars.len() - self.position
    }

    /// Current read position, for [`rewind_to`](Self::rewind_to).
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the cursor back to a position previously returned by
    /// [`position`](Self::position), so a replayed statement re-reads the same input.
    ///
    /// Positions past the current cursor are ignored; the cursor only moves backwards.
    pub fn rewind_to(&mut self, position: usize) {
        self.position = self.position.min(position);
    }

    fn collect(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_line_appends_missing_newline_then_reports_eof() {
        let mut input = InputChannel::new();
        input.supply(Some("foo"));
        input.supply(None);
        assert_eq!(input.read_line(), Ok(Some("foo\n".to_owned())));
        assert_eq!(input.read_line(), Ok(None));
        assert_eq!(input.read_line(), Err(InputError::InputRequired));
    }

    #[test]
    fn read_line_reports_eof_when_marker_is_at_cursor() {
        let mut input = InputChannel::new();
        input.supply(Some("foo\n"));
        input.supply(None);
        assert_eq!(input.read_line(), Ok(Some("foo\n".to_owned())));
        assert_eq!(input.read_line(), Ok(None));
        assert_eq!(input.pending(), 0);
    }

    #[test]
    fn read_line_without_terminator_requires_input() {
        let mut input = InputChannel::new();
        input.supply(Some("partial"));
        assert_eq!(input.read_line(), Err(InputError::InputRequired));
        // nothing was consumed by the failed read
        assert_eq!(input.pending(), 7);
        input.supply(Some(" line\n"));
        assert_eq!(input.read_line(), Ok(Some("partial line\n".to_owned())));
    }

    #[test]
    fn strict_read_fails_at_end_of_input() {
        let mut input = InputChannel::new();
        input.supply(None);
        assert_eq!(input.read_line_strict(), Err(InputError::EndOfInput));
    }

    #[test]
    fn bounded_read_returns_once_enough_is_buffered() {
        let mut input = InputChannel::new();
        input.supply(Some("ab"));
        assert_eq!(input.read(Some(3)), Err(InputError::InputRequired));
        input.supply(Some("cdef"));
        assert_eq!(input.read(Some(3)), Ok("abc".to_owned()));
        assert_eq!(input.read(Some(0)), Ok(String::new()));
        assert_eq!(input.pending(), 3);
    }

    #[test]
    fn bounded_read_stops_short_at_eof() {
        let mut input = InputChannel::new();
        input.supply(Some("ab"));
        input.supply(None);
        assert_eq!(input.read(Some(10)), Ok("ab".to_owned()));
        assert_eq!(input.pending(), 0);
    }

    #[test]
    fn unbounded_read_needs_the_eof_marker() {
        let mut input = InputChannel::new();
        input.supply(Some("one\ntwo\n"));
        assert_eq!(input.read(None), Err(InputError::InputRequired));
        input.supply(None);
        assert_eq!(input.read(None), Ok("one\ntwo\n".to_owned()));
    }

    #[test]
    fn read_lines_keeps_terminators() {
        let mut input = InputChannel::new();
        input.supply(Some("one\ntwo"));
        input.supply(None);
        assert_eq!(input.read_lines(), Ok(vec!["one\n".to_owned(), "two".to_owned()]));
    }

    #[test]
    fn at_eof_depends_on_buffered_input() {
        let mut input = InputChannel::new();
        assert_eq!(input.at_eof(), Err(InputError::InputRequired));
        input.supply(Some("x"));
        assert_eq!(input.at_eof(), Ok(false));
        assert_eq!(input.read(Some(1)), Ok("x".to_owned()));
        input.supply(None);
        assert_eq!(input.at_eof(), Ok(true));
    }

    #[test]
    fn rewind_replays_consumed_input() {
        let mut input = InputChannel::new();
        input.supply(Some("first\n"));
        let mark = input.position();
        assert_eq!(input.read_line(), Ok(Some("first\n".to_owned())));
        assert_eq!(input.read_line(), Err(InputError::InputRequired));
        input.rewind_to(mark);
        assert_eq!(input.read_line(), Ok(Some("first\n".to_owned())));
    }
}
