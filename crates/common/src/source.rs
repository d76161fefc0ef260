//! Input buffers and positions.
//!
//! An [`InputBuffer`] owns the text being parsed together with a table of
//! line-start offsets, so that any byte offset produced by the parser can be
//! turned into a [`Position`] with a binary search.
//!
//! `\n`, `\r\n` and a lone `\r` all terminate a line.

use std::fmt;
use std::sync::Arc;

/// A position in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Line number (1-based).
    pub line: usize,
    /// Column number (0-based, counted in characters).
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Immutable input text with a line-start table.
///
/// Cloning is cheap; clones share the text and the table.
#[derive(Clone)]
pub struct InputBuffer {
    id: Arc<str>,
    text: Arc<str>,
    line_starts: Arc<[usize]>,
}

impl InputBuffer {
    /// Create a buffer with a source identifier (file path or a test name).
    pub fn new(id: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let line_starts = compute_line_starts(&text).into();
        Self {
            id: id.into(),
            text,
            line_starts,
        }
    }

    /// Create a buffer for text that did not come from a file.
    pub fn anonymous(text: impl Into<Arc<str>>) -> Self {
        Self::new("<input>", text)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Get a slice of the text. Out-of-range or misaligned spans give "".
    pub fn slice(&self, start: usize, end: usize) -> &str {
        self.text.get(start..end).unwrap_or("")
    }

    /// Number of lines. A trailing terminator opens one more (empty) line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset into a line/column position.
    ///
    /// Offsets past the end are clamped to the end of the text.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let index = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let start = self.line_starts[index];
        let column = match self.text.get(start..offset) {
            Some(prefix) => prefix.chars().count(),
            None => offset - start,
        };
        Position::new(index + 1, column)
    }

    /// The text of a 1-based line, including its terminator.
    pub fn extract_line(&self, line: usize) -> &str {
        if line == 0 || line > self.line_starts.len() {
            return "";
        }
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.text.len());
        self.slice(start, end)
    }

    /// The text of a 1-based line without its terminator.
    pub fn line_text(&self, line: usize) -> &str {
        self.extract_line(line).trim_end_matches(['\r', '\n'])
    }
}

impl fmt::Debug for InputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBuffer")
            .field("id", &self.id)
            .field("len", &self.text.len())
            .field("lines", &self.line_starts.len())
            .finish()
    }
}

fn compute_line_starts(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut starts = vec![0];
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => starts.push(i + 1),
            b'\r' => {
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                starts.push(i + 1);
            }
            _ => {}
        }
        i += 1;
    }
    starts
}
