//! Classification of unsolicited device output.
//!
//! The prefixes only drive presentation (a console colours errors, hides
//! debug output and so on). They never affect framing.

use vislink_core::constants::{
    LOG_PREFIX_DEBUG, LOG_PREFIX_ERROR, LOG_PREFIX_FATAL, LOG_PREFIX_INFO, LOG_PREFIX_OK,
};

/// Severity of an unsolicited line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// Bare `OK` acknowledgement of a console command.
    Ok,
    Debug,
    Info,
    Error,
    Fatal,
    /// Module output or anything without a known prefix.
    Plain,
}

impl LineKind {
    /// Classify a line by its prefix.
    ///
    /// ```
    /// use vislink_protocol::LineKind;
    ///
    /// assert_eq!(LineKind::classify("INF Camera ready"), LineKind::Info);
    /// assert_eq!(LineKind::classify("T2 120 80 16 16"), LineKind::Plain);
    /// ```
    pub fn classify(line: &str) -> Self {
        if line == LOG_PREFIX_OK {
            LineKind::Ok
        } else if line.starts_with(LOG_PREFIX_DEBUG) {
            LineKind::Debug
        } else if line.starts_with(LOG_PREFIX_INFO) {
            LineKind::Info
        } else if line.starts_with(LOG_PREFIX_ERROR) {
            LineKind::Error
        } else if line.starts_with(LOG_PREFIX_FATAL) {
            LineKind::Fatal
        } else {
            LineKind::Plain
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            LineKind::Debug => LOG_PREFIX_DEBUG,
            LineKind::Info => LOG_PREFIX_INFO,
            LineKind::Error => LOG_PREFIX_ERROR,
            LineKind::Fatal => LOG_PREFIX_FATAL,
            LineKind::Ok | LineKind::Plain => "",
        }
    }

    /// Text of `line` with this kind's prefix removed.
    pub fn body(self, line: &str) -> &str {
        line.strip_prefix(self.prefix()).unwrap_or(line)
    }

    pub fn is_error(self) -> bool {
        matches!(self, LineKind::Error | LineKind::Fatal)
    }
}

/// Shorthand for [`LineKind::classify`].
pub fn classify(line: &str) -> LineKind {
    LineKind::classify(line)
}
