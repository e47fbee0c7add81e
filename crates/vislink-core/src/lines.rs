//! Line splitting for the camera's text output.
//!
//! The device terminates lines inconsistently: `\r\n` from the console,
//! bare `\n` from file headers, and the occasional `\r` or NUL from
//! firmware printing raw buffers. All four are treated as terminators.
//!
//! [`split_lines`] is the whole-buffer form: it returns every line plus the
//! trailing fragment as the last element. [`find_terminator`] is the
//! incremental form used by the demultiplexer, which must stop at the first
//! line boundary so it can switch to raw byte counting mid-buffer.

use crate::constants::{CR, LF, NUL};

/// Position of the first line terminator in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminator {
    /// Offset of the first terminator byte, i.e. the length of the line.
    pub line_end: usize,

    /// Number of terminator bytes (2 for `\r\n`, otherwise 1).
    pub len: usize,
}

impl Terminator {
    /// Offset just past the terminator.
    pub fn next_line_start(&self) -> usize {
        self.line_end + self.len
    }
}

fn is_terminator(byte: u8) -> bool {
    byte == LF || byte == CR || byte == NUL
}

/// Locate the first line terminator in `buf`.
///
/// A `\r` immediately followed by `\n` counts as one two-byte terminator.
/// A `\r` that is the last byte of `buf` counts as a one-byte terminator;
/// callers that stream data must be prepared to skip a `\n` that arrives at
/// the start of the next chunk.
///
/// # Examples
///
/// ```
/// use vislink_core::lines::find_terminator;
///
/// let t = find_terminator(b"OK\r\nrest").unwrap();
/// assert_eq!((t.line_end, t.len), (2, 2));
/// assert!(find_terminator(b"partial").is_none());
/// ```
pub fn find_terminator(buf: &[u8]) -> Option<Terminator> {
    let line_end = buf.iter().position(|&b| is_terminator(b))?;
    let len = if buf[line_end] == CR && buf.get(line_end + 1) == Some(&LF) {
        2
    } else {
        1
    };
    Some(Terminator { line_end, len })
}

/// Decode one line of device output.
///
/// Device output is ASCII in practice; anything else is replaced rather than
/// rejected because log lines must never stall the stream.
pub fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Split a buffer into lines.
///
/// The returned vector always has at least one element. The last element is
/// the trailing fragment: the text after the final terminator, empty when
/// the buffer ended exactly on a line boundary.
///
/// # Examples
///
/// ```
/// use vislink_core::lines::split_lines;
///
/// assert_eq!(split_lines(b"a\r\nb\nc"), vec!["a", "b", "c"]);
/// assert_eq!(split_lines(b"a\n"), vec!["a", ""]);
/// assert_eq!(split_lines(b""), vec![""]);
/// ```
pub fn split_lines(buf: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = buf;

    while let Some(t) = find_terminator(rest) {
        lines.push(decode_line(&rest[..t.line_end]));
        rest = &rest[t.next_line_start()..];
    }

    lines.push(decode_line(rest));
    lines
}
