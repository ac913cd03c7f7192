//! Output accumulation for a command session.
//!
//! Raw channel bytes go through a [`LineAssembler`] (one per stream) which
//! strips terminal escape sequences and carriage returns, then complete
//! lines are appended to the [`OutputBuffer`]. The buffer is shared with the
//! drain task behind a mutex; the session only reads it after the drain task
//! has been joined.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use vte::{Parser, Perform};

/// Append-only text accumulator.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
    lines: usize,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line; a `\n` terminator is added.
    pub fn append_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
        self.lines += 1;
    }

    /// Copy of the accumulated text.
    pub fn snapshot(&self) -> String {
        self.text.clone()
    }

    /// Borrow the accumulated text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of lines appended.
    pub fn line_count(&self) -> usize {
        self.lines
    }

    /// Length of the accumulated text in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Output buffer shared between the drain task and the session.
#[derive(Debug, Clone, Default)]
pub struct SharedOutput(Arc<Mutex<OutputBuffer>>);

impl SharedOutput {
    /// Create an empty shared buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the buffer. A panic in another holder does not leave the text
    /// in a torn state, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, OutputBuffer> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append every line under a single lock acquisition.
    pub fn append_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut buffer = self.lock();
        for line in lines {
            buffer.append_line(line.as_ref());
        }
    }

    /// Copy of the accumulated text.
    pub fn snapshot(&self) -> String {
        self.lock().snapshot()
    }
}

/// Turns a byte stream into clean text lines.
///
/// Escape sequences are consumed by a `vte` parser, which also keeps
/// partial UTF-8 sequences across chunk boundaries.
pub struct LineAssembler {
    parser: Parser,
    sink: LineSink,
}

impl LineAssembler {
    /// Create an assembler with no pending input.
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            sink: LineSink::default(),
        }
    }

    /// Feed raw bytes; returns the lines completed by this chunk.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.parser.advance(&mut self.sink, data);
        std::mem::take(&mut self.sink.complete)
    }

    /// Take the trailing partial line at end of stream, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.sink.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.sink.current))
        }
    }

    /// Whether a partial line is pending.
    pub fn has_partial(&self) -> bool {
        !self.sink.current.is_empty()
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct LineSink {
    current: String,
    complete: Vec<String>,
}

impl Perform for LineSink {
    fn print(&mut self, c: char) {
        self.current.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.complete.push(std::mem::take(&mut self.current)),
            b'\t' => self.current.push('\t'),
            // \r, BEL, backspace and other C0 controls carry no text
            _ => {}
        }
    }
}
