//! Transaction records.
//!
//! A [`Transaction`] is one request/response exchange waiting in, or at the
//! head of, the [`JobQueue`](crate::JobQueue). It carries the request to
//! send, the reply lines and payload bytes gathered so far, and the
//! completion that receives the final [`Outcome`].
//!
//! Completions are plain `FnOnce` values. [`Transaction::with_reply`] wraps
//! a oneshot channel for callers that prefer to await the result; dropping
//! the receiver simply discards the outcome, so a caller that goes away
//! mid-transaction leaves nothing dangling.
//!
//! # Example
//!
//! ```
//! use vislink_protocol::{Transaction, TransactionKind};
//!
//! let (txn, _reply) = Transaction::command("info").with_reply();
//! assert_eq!(txn.kind(), TransactionKind::Command);
//! assert_eq!(txn.request(), "info");
//! ```

use std::fmt;

use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;
use vislink_core::constants::{
    CR, FILEGET_COMMAND, FILEPUT_COMMAND, LF, NUL, REPLY_ERR_PREFIX, REPLY_OK, SETCAM_COMMAND,
    SETPAR_COMMAND,
};
use vislink_core::lines::split_lines;
use vislink_core::{Error, Result};

/// Largest buffer reserved up front for a download body. Bigger bodies
/// grow the buffer as bytes arrive.
const MAX_UPFRONT_RESERVE: usize = 64 * 1024;

/// Identifier assigned by the queue at submission, in submission order.
pub type TransactionId = u64;

/// Completion invoked exactly once with the transaction's outcome.
pub type Completion = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Receiver side of [`Transaction::with_reply`].
///
/// Resolves to `Err(RecvError)` when the transaction is discarded by a
/// teardown instead of completing.
pub type PendingReply = oneshot::Receiver<Outcome>;

/// How a downloaded file is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadFormat {
    /// Split into lines.
    Text,
    /// Raw bytes.
    Binary,
}

/// Kind of exchange a transaction performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// Tagged command with a line-oriented reply.
    Command,
    /// `fileget` with a counted binary payload in the reply.
    FileDownload(DownloadFormat),
    /// `fileput` with a counted binary payload in the request.
    FileUpload,
}

/// Successful result of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Reply lines, or the lines of a downloaded text file.
    Lines(Vec<String>),
    /// Contents of a downloaded binary file.
    Bytes(Bytes),
}

impl Payload {
    /// Lines of the payload; binary content is split on line boundaries.
    pub fn into_lines(self) -> Vec<String> {
        match self {
            Payload::Lines(lines) => lines,
            Payload::Bytes(bytes) => split_lines(&bytes),
        }
    }

    /// Raw bytes of the payload; lines are joined with `\n`.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Lines(lines) => Bytes::from(lines.join("\n")),
            Payload::Bytes(bytes) => bytes,
        }
    }
}

/// Final result delivered to a transaction's completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The device answered `OK`.
    Success(Payload),
    /// The device answered `ERR ...`, or the reply could not be parsed.
    /// Holds every tagged line received for the transaction.
    Error(Vec<String>),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Convert into a `Result`, keeping the error lines as the error value.
    pub fn into_result(self) -> std::result::Result<Payload, Vec<String>> {
        match self {
            Outcome::Success(payload) => Ok(payload),
            Outcome::Error(lines) => Err(lines),
        }
    }
}

/// Whether a tagged reply (tag already removed) ends its transaction.
pub fn is_terminal_reply(reply: &str) -> bool {
    reply == REPLY_OK || reply.starts_with(REPLY_ERR_PREFIX)
}

/// One outstanding request.
pub struct Transaction {
    id: TransactionId,
    kind: TransactionKind,
    request: String,
    payload: Bytes,
    completion: Option<Completion>,
    result_lines: Vec<String>,
    accumulated: BytesMut,
    expected: Option<usize>,
    sent: bool,
    throttled: bool,
}

impl Transaction {
    fn new(kind: TransactionKind, request: String, payload: Bytes) -> Self {
        Self {
            id: 0,
            kind,
            request,
            payload,
            completion: None,
            result_lines: Vec::new(),
            accumulated: BytesMut::new(),
            expected: None,
            sent: false,
            throttled: false,
        }
    }

    /// Plain command, e.g. `info` or `listmappings`.
    pub fn command(text: impl Into<String>) -> Self {
        Self::new(TransactionKind::Command, text.into(), Bytes::new())
    }

    /// Download `path` from the device.
    pub fn download(path: &str, format: DownloadFormat) -> Self {
        Self::new(
            TransactionKind::FileDownload(format),
            format!("{FILEGET_COMMAND} {path}"),
            Bytes::new(),
        )
    }

    /// Upload `data` to `path` on the device.
    pub fn upload(path: &str, data: impl Into<Bytes>) -> Self {
        Self::new(
            TransactionKind::FileUpload,
            format!("{FILEPUT_COMMAND} {path}"),
            data.into(),
        )
    }

    /// Throttled `setpar <name> <value>`.
    pub fn set_parameter(name: &str, value: &str) -> Self {
        Self::command(format!("{SETPAR_COMMAND} {name} {value}")).throttled()
    }

    /// Throttled `setcam <name> <value>`.
    pub fn set_camera_control(name: &str, value: &str) -> Self {
        Self::command(format!("{SETCAM_COMMAND} {name} {value}")).throttled()
    }

    /// Hold off the next send for the configured minimum interval after
    /// this one goes out.
    pub fn throttled(mut self) -> Self {
        self.throttled = true;
        self
    }

    /// Set the completion receiving the outcome.
    pub fn on_complete(mut self, completion: impl FnOnce(Outcome) + Send + 'static) -> Self {
        self.completion = Some(Box::new(completion));
        self
    }

    /// Set separate success and error completions. Exactly one runs.
    pub fn on_outcome<S, E>(self, on_success: S, on_error: E) -> Self
    where
        S: FnOnce(Payload) + Send + 'static,
        E: FnOnce(Vec<String>) + Send + 'static,
    {
        self.on_complete(move |outcome| match outcome {
            Outcome::Success(payload) => on_success(payload),
            Outcome::Error(lines) => on_error(lines),
        })
    }

    /// Route the outcome into a oneshot channel.
    pub fn with_reply(self) -> (Self, PendingReply) {
        let (tx, rx) = oneshot::channel();
        let txn = self.on_complete(move |outcome| {
            // Receiver may be gone; the outcome is then unwanted
            let _ = tx.send(outcome);
        });
        (txn, rx)
    }

    /// Reject requests that would break line framing on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for empty requests or requests
    /// containing a line terminator.
    pub fn validate(&self) -> Result<()> {
        if self.request.trim().is_empty() {
            return Err(Error::InvalidRequest("empty request".into()));
        }
        if self.request.bytes().any(|b| b == LF || b == CR || b == NUL) {
            return Err(Error::InvalidRequest(format!(
                "request contains a line terminator: {:?}",
                self.request
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Request text without the reply tag.
    pub fn request(&self) -> &str {
        &self.request
    }

    /// Upload payload; empty for other kinds.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Tagged reply lines received so far, tag removed.
    pub fn result_lines(&self) -> &[String] {
        &self.result_lines
    }

    /// Download bytes received so far.
    pub fn accumulated_bytes(&self) -> &[u8] {
        &self.accumulated
    }

    /// Announced download size; `None` until the header has been parsed.
    pub fn expected_byte_count(&self) -> Option<usize> {
        self.expected
    }

    /// Download bytes still outstanding.
    pub fn remaining(&self) -> usize {
        self.expected
            .map_or(0, |n| n.saturating_sub(self.accumulated.len()))
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled
    }

    pub(crate) fn assign_id(&mut self, id: TransactionId) {
        self.id = id;
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent = true;
    }

    pub(crate) fn push_result_line(&mut self, line: String) {
        self.result_lines.push(line);
    }

    pub(crate) fn set_expected(&mut self, count: usize) {
        self.expected = Some(count);
        self.accumulated.reserve(count.min(MAX_UPFRONT_RESERVE));
    }

    pub(crate) fn accumulate(&mut self, chunk: &[u8]) {
        self.accumulated.extend_from_slice(chunk);
    }

    /// Build the outcome from what has been received.
    ///
    /// The terminating line decides: `ERR ...` yields [`Outcome::Error`]
    /// with every tagged line, anything else yields the kind's success
    /// payload. A download that completed without a header yields an empty
    /// payload.
    pub(crate) fn take_outcome(&mut self) -> Outcome {
        let failed = self
            .result_lines
            .last()
            .is_some_and(|line| line.starts_with(REPLY_ERR_PREFIX));
        if failed {
            return Outcome::Error(std::mem::take(&mut self.result_lines));
        }

        let payload = match self.kind {
            TransactionKind::Command | TransactionKind::FileUpload => {
                Payload::Lines(std::mem::take(&mut self.result_lines))
            }
            TransactionKind::FileDownload(DownloadFormat::Text) => {
                Payload::Lines(split_lines(&self.accumulated))
            }
            TransactionKind::FileDownload(DownloadFormat::Binary) => {
                Payload::Bytes(self.accumulated.split().freeze())
            }
        };
        Outcome::Success(payload)
    }

    /// Deliver `outcome` to the completion, consuming the record.
    pub(crate) fn finish(mut self, outcome: Outcome) {
        if let Some(completion) = self.completion.take() {
            completion(outcome);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("request", &self.request)
            .field("payload_len", &self.payload.len())
            .field("result_lines", &self.result_lines)
            .field("accumulated_len", &self.accumulated.len())
            .field("expected", &self.expected)
            .field("sent", &self.sent)
            .field("throttled", &self.throttled)
            .finish_non_exhaustive()
    }
}
