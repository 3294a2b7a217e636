use std::io::{self, Write as _};

/// Destination for everything a session writes to `$stdout`.
///
/// Implement this trait to redirect interpreter output. The default implementation
/// [`StdSink`] writes to the process stdout.
pub trait OutputSink {
    /// Writes one chunk of output exactly as the interpreter produced it.
    fn write(&mut self, chunk: &str) -> io::Result<()>;

    /// Flushes buffered output, if the sink buffers at all.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// `OutputSink` that writes to the process stdout.
#[derive(Debug, Default)]
pub struct StdSink;

impl OutputSink for StdSink {
    fn write(&mut self, chunk: &str) -> io::Result<()> {
        io::stdout().write_all(chunk.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// `OutputSink` that collects all output into a string.
///
/// Useful for testing or for hosts that render output themselves.
#[derive(Debug, Default)]
pub struct CollectStringSink(String);

impl CollectStringSink {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Returns the collected output as a string slice.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the sink and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl OutputSink for CollectStringSink {
    fn write(&mut self, chunk: &str) -> io::Result<()> {
        self.0.push_str(chunk);
        Ok(())
    }
}

/// `OutputSink` that ignores all output.
#[derive(Debug, Default)]
pub struct NoSink;

impl OutputSink for NoSink {
    fn write(&mut self, _chunk: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Capture channel installed as the interpreter's `$stdout`.
///
/// Decorates the real sink: every chunk is forwarded to it and also kept in an
/// ordered buffer, so output stays visible through the normal channel while the
/// session can attribute it to the statement being evaluated. Anything beyond
/// `write` and `flush` is reached through [`inner`](Self::inner) /
/// [`inner_mut`](Self::inner_mut).
pub struct OutputCapture {
    inner: Box<dyn OutputSink>,
    chunks: Vec<String>,
}

impl OutputCapture {
    #[must_use]
    pub fn new(inner: Box<dyn OutputSink>) -> Self {
        Self {
            inner,
            chunks: Vec::new(),
        }
    }

    /// Drops everything captured so far. The decorated sink is not touched.
    pub fn reset(&mut self) {
        self.chunks.clear();
    }

    /// Forwards `chunk` to the decorated sink and records it.
    ///
    /// A `None` chunk is accepted and ignored: it carries no content and does not
    /// count as a write for [`any`](Self::any).
    pub fn write(&mut self, chunk: Option<&str>) -> io::Result<()> {
        let Some(chunk) = chunk else {
            return Ok(());
        };
        self.chunks.push(chunk.to_owned());
        self.inner.write(chunk)
    }

    /// True if at least one chunk was written since the last [`reset`](Self::reset).
    #[must_use]
    pub fn any(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Returns the captured chunks joined in write order, without resetting.
    #[must_use]
    pub fn drain(&self) -> String {
        self.chunks.concat()
    }

    /// Captured output if anything was written, `None` otherwise.
    #[must_use]
    pub fn captured(&self) -> Option<String> {
        self.any().then(|| self.drain())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    #[must_use]
    pub fn inner(&self) -> &dyn OutputSink {
        self.inner.as_ref()
    }

    pub fn inner_mut(&mut self) -> &mut dyn OutputSink {
        self.inner.as_mut()
    }
}

impl Default for OutputCapture {
    fn default() -> Self {
        Self::new(Box::new(StdSink))
    }
}

impl std::fmt::Debug for OutputCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCapture").field("chunks", &self.chunks).finish_non_exhaustive()
    }
}
