//! Frame demultiplexer for the camera serial stream.
//!
//! The port carries three kinds of traffic with no framing of its own:
//! tagged reply lines for the in-flight transaction, counted file payloads,
//! and untagged log output. The [`Demultiplexer`] keeps the bytes that have
//! not been resolved yet (the carry-over) and consumes them against the head
//! of the [`JobQueue`], completing transactions as their terminating reply
//! arrives and parking everything else in the unsolicited line buffer.
//!
//! # States
//!
//! The state is derived from the head transaction every time the scan loop
//! runs, so a chunk that completes one transaction goes on to be scanned
//! against the next one.
//!
//! ```text
//!                   head popped / queue empty
//!     ┌───────────────────────────────────────────────────┐
//!     v                                                   │
//! ┌──────┐  Command/FileUpload head  ┌───────────────┐  OK / ERR
//! │ Idle │──────────────────────────>│ AwaitingReply │───────────┘
//! └──────┘                           └───────────────┘
//!     │                                      ^
//!     │ FileDownload head                    │ n bytes received
//!     v                                      │
//! ┌────────────────┐ JEVOIS_FILEGET n ┌──────────────┐
//! │ AwaitingHeader │─────────────────>│ AwaitingBody │
//! └────────────────┘                  └──────────────┘
//! ```
//!
//! While awaiting a header, tagged `OK`/`ERR` lines still complete the
//! transaction, which is how the device reports a failed `fileget`.
//!
//! # Example
//!
//! ```
//! use vislink_core::LinkConfig;
//! use vislink_protocol::{Demultiplexer, JobQueue, Transaction};
//!
//! let mut queue = JobQueue::default();
//! let (txn, mut reply) = Transaction::command("info").with_reply();
//! queue.push(txn).unwrap();
//!
//! let mut demux = Demultiplexer::new(&LinkConfig::default());
//! let report = demux.feed(b"INF boot\nJVINVjevois 1.9.0\nJVINVOK\n", &mut queue);
//!
//! assert_eq!(report.completed, 1);
//! assert_eq!(demux.drain_unsolicited(), vec!["INF boot"]);
//! assert!(reply.try_recv().unwrap().is_success());
//! ```

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};
use vislink_core::LinkConfig;
use vislink_core::constants::{CR, FILEGET_HEADER, LF, REPLY_ERR_PREFIX, REPLY_TAG};
use vislink_core::lines::{decode_line, find_terminator};

use crate::job_queue::JobQueue;
use crate::transaction::{Outcome, Transaction, TransactionKind, is_terminal_reply};

const INITIAL_CARRY_CAPACITY: usize = 4 * 1024;

/// Scan state, derived from the head of the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxState {
    /// No transaction queued; every line is unsolicited.
    Idle,
    /// Collecting tagged lines until `OK` or `ERR ...`.
    AwaitingReply,
    /// Download head without a parsed `JEVOIS_FILEGET` header.
    AwaitingHeader,
    /// Counting raw payload bytes.
    AwaitingBody { remaining: usize },
}

impl DemuxState {
    pub fn for_head(head: Option<&Transaction>) -> Self {
        let Some(head) = head else {
            return DemuxState::Idle;
        };
        match head.kind() {
            TransactionKind::Command | TransactionKind::FileUpload => DemuxState::AwaitingReply,
            TransactionKind::FileDownload(_) => match head.expected_byte_count() {
                None => DemuxState::AwaitingHeader,
                Some(_) if head.remaining() > 0 => DemuxState::AwaitingBody {
                    remaining: head.remaining(),
                },
                Some(_) => DemuxState::AwaitingReply,
            },
        }
    }
}

/// What a single [`Demultiplexer::feed`] call produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedReport {
    /// Lines appended to the unsolicited buffer.
    pub unsolicited: usize,
    /// Transactions completed and popped.
    pub completed: usize,
}

impl FeedReport {
    /// Whether the unsolicited sink has something new to drain.
    pub fn lines_available(&self) -> bool {
        self.unsolicited > 0
    }
}

/// Incremental demultiplexer over the inbound byte stream.
#[derive(Debug)]
pub struct Demultiplexer {
    carry: BytesMut,
    unsolicited: VecDeque<String>,

    /// Previous line ended on a `\r` that was the last byte available; a
    /// `\n` opening the next chunk belongs to it.
    skip_lf: bool,

    /// Discarding up to the next terminator after a malformed header.
    resync: bool,

    max_line_length: usize,
    max_header_length: usize,
}

impl Demultiplexer {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            carry: BytesMut::with_capacity(INITIAL_CARRY_CAPACITY),
            unsolicited: VecDeque::new(),
            skip_lf: false,
            resync: false,
            max_line_length: config.max_line_length,
            max_header_length: config.max_header_length,
        }
    }

    /// Consume newly arrived bytes.
    ///
    /// Bytes are processed left to right. Completions run as soon as their
    /// terminating reply is seen; scanning then continues against the new
    /// head until no further progress is possible, and the remainder is
    /// kept as carry-over for the next call.
    pub fn feed(&mut self, bytes: &[u8], queue: &mut JobQueue) -> FeedReport {
        self.carry.extend_from_slice(bytes);

        let mut report = FeedReport::default();
        while self.step(queue, &mut report) {}
        self.enforce_line_limit(queue, &mut report);

        trace!(
            received = bytes.len(),
            carry = self.carry.len(),
            unsolicited = report.unsolicited,
            completed = report.completed,
            "Bytes processed"
        );
        report
    }

    /// Current scan state for `queue`.
    pub fn state(&self, queue: &JobQueue) -> DemuxState {
        DemuxState::for_head(queue.head())
    }

    /// Bytes received but not resolved yet.
    pub fn carry_over(&self) -> &[u8] {
        &self.carry
    }

    /// Number of unsolicited lines waiting to be drained.
    pub fn unsolicited_len(&self) -> usize {
        self.unsolicited.len()
    }

    /// Take every buffered unsolicited line, oldest first.
    pub fn drain_unsolicited(&mut self) -> Vec<String> {
        self.unsolicited.drain(..).collect()
    }

    /// Forget all buffered input.
    pub fn clear(&mut self) {
        self.carry.clear();
        self.unsolicited.clear();
        self.skip_lf = false;
        self.resync = false;
    }

    /// Run one unit of work. Returns false when stalled on missing input.
    fn step(&mut self, queue: &mut JobQueue, report: &mut FeedReport) -> bool {
        if self.carry.is_empty() {
            return false;
        }

        if self.skip_lf {
            self.skip_lf = false;
            if self.carry[0] == LF {
                self.carry.advance(1);
                return true;
            }
        }

        if self.resync {
            return self.step_resync();
        }

        match self.state(queue) {
            DemuxState::Idle | DemuxState::AwaitingReply => match self.take_line() {
                Some(line) => {
                    self.route_line(line, queue, report);
                    true
                }
                None => false,
            },
            DemuxState::AwaitingHeader => self.step_header(queue, report),
            DemuxState::AwaitingBody { remaining } => self.step_body(queue, remaining),
        }
    }

    fn step_resync(&mut self) -> bool {
        match find_terminator(&self.carry) {
            Some(t) => {
                let ends_on_cr = self.ends_on_bare_cr(t.line_end, t.len);
                self.carry.advance(t.next_line_start());
                self.skip_lf = ends_on_cr;
                self.resync = false;
                debug!("Resynchronised after malformed header");
                true
            }
            None => {
                self.carry.clear();
                false
            }
        }
    }

    fn ends_on_bare_cr(&self, line_end: usize, len: usize) -> bool {
        len == 1 && self.carry[line_end] == CR && line_end + 1 == self.carry.len()
    }

    /// Remove and decode the first complete line of the carry-over.
    fn take_line(&mut self) -> Option<String> {
        let t = find_terminator(&self.carry)?;
        let line = decode_line(&self.carry[..t.line_end]);
        self.skip_lf = self.ends_on_bare_cr(t.line_end, t.len);
        self.carry.advance(t.next_line_start());
        Some(line)
    }

    /// Attach a tagged line to the head transaction, or park the line as
    /// unsolicited output.
    fn route_line(&mut self, line: String, queue: &mut JobQueue, report: &mut FeedReport) {
        if let Some(reply) = line.strip_prefix(REPLY_TAG)
            && let Some(head) = queue.head_mut()
        {
            let terminal = is_terminal_reply(reply);
            head.push_result_line(reply.to_owned());
            if terminal {
                self.complete_head(queue, report);
            }
            return;
        }
        self.push_unsolicited(line, report);
    }

    fn push_unsolicited(&mut self, line: String, report: &mut FeedReport) {
        self.unsolicited.push_back(line);
        report.unsolicited += 1;
    }

    fn step_header(&mut self, queue: &mut JobQueue, report: &mut FeedReport) -> bool {
        let Some(marker) = find_subslice(&self.carry, FILEGET_HEADER.as_bytes()) else {
            // No header yet: plain line scanning, so OK/ERR still complete
            return match self.take_line() {
                Some(line) => {
                    self.route_line(line, queue, report);
                    true
                }
                None => false,
            };
        };

        if marker > 0 {
            // Output preceding the header is processed line by line. A
            // fragment directly in front of the marker counts as a line.
            let line = match find_terminator(&self.carry[..marker]) {
                Some(_) => self.take_line(),
                None => {
                    let fragment = decode_line(&self.carry[..marker]);
                    self.carry.advance(marker);
                    Some(fragment)
                }
            };
            if let Some(line) = line {
                self.route_line(line, queue, report);
            }
            return true;
        }

        let Some(lf) = self.carry.iter().position(|&b| b == LF) else {
            if self.carry.len() > self.max_header_length {
                let header = decode_line(&self.carry[..self.max_header_length]);
                self.carry.clear();
                self.resync = true;
                self.abort_head(queue, report, &header);
                return true;
            }
            return false;
        };

        let field = &self.carry[FILEGET_HEADER.len()..lf];
        match parse_byte_count(field) {
            Some(count) if lf < self.max_header_length => {
                self.carry.advance(lf + 1);
                if let Some(head) = queue.head_mut() {
                    debug!(id = head.id(), bytes = count, "File transfer header parsed");
                    head.set_expected(count);
                }
            }
            _ => {
                let header = decode_line(&self.carry[..lf]);
                self.carry.advance(lf + 1);
                self.abort_head(queue, report, header.trim_end_matches('\r'));
            }
        }
        true
    }

    fn step_body(&mut self, queue: &mut JobQueue, remaining: usize) -> bool {
        let take = remaining.min(self.carry.len());
        let chunk = self.carry.split_to(take);
        if let Some(head) = queue.head_mut() {
            head.accumulate(&chunk);
            trace!(id = head.id(), got = take, remaining = head.remaining(), "Payload bytes");
        }
        take > 0
    }

    fn complete_head(&mut self, queue: &mut JobQueue, report: &mut FeedReport) {
        let Some(mut txn) = queue.pop_head() else {
            return;
        };
        let outcome = txn.take_outcome();
        debug!(
            id = txn.id(),
            kind = ?txn.kind(),
            success = outcome.is_success(),
            "Transaction complete"
        );
        report.completed += 1;
        txn.finish(outcome);
    }

    /// Fail the head with a synthetic error reply.
    fn abort_head(&mut self, queue: &mut JobQueue, report: &mut FeedReport, header: &str) {
        let Some(txn) = queue.pop_head() else {
            return;
        };
        warn!(id = txn.id(), header, "Malformed file transfer header");
        report.completed += 1;
        txn.finish(Outcome::Error(vec![format!(
            "{REPLY_ERR_PREFIX}malformed file transfer header [{header}]"
        )]));
    }

    /// Flush an unterminated fragment that has grown past the line limit.
    fn enforce_line_limit(&mut self, queue: &JobQueue, report: &mut FeedReport) {
        if self.carry.len() <= self.max_line_length {
            return;
        }
        // A partial header at the tail survives the flush
        let keep = match self.state(queue) {
            DemuxState::AwaitingBody { .. } => return,
            DemuxState::AwaitingHeader
                if find_subslice(&self.carry, FILEGET_HEADER.as_bytes()).is_some() =>
            {
                return;
            }
            DemuxState::AwaitingHeader => partial_marker_len(&self.carry),
            _ => 0,
        };

        warn!(
            len = self.carry.len(),
            limit = self.max_line_length,
            "Unterminated line exceeds limit, flushing"
        );
        let flushed = self.carry.split_to(self.carry.len() - keep);
        self.push_unsolicited(decode_line(&flushed), report);
    }
}

impl Default for Demultiplexer {
    fn default() -> Self {
        Self::new(&LinkConfig::default())
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Length of the longest tail of `buf` that could be the start of the
/// download header.
fn partial_marker_len(buf: &[u8]) -> usize {
    let marker = FILEGET_HEADER.as_bytes();
    (1..marker.len().min(buf.len() + 1))
        .rev()
        .find(|&n| buf.ends_with(&marker[..n]))
        .unwrap_or(0)
}

/// Parse the field following the header token: one space, then a plain
/// decimal count. A trailing `\r` is tolerated.
fn parse_byte_count(field: &[u8]) -> Option<usize> {
    let field = field.strip_suffix(&[CR]).unwrap_or(field);
    let digits = field.strip_prefix(b" ")?;
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{DownloadFormat, Payload, PendingReply};
    use bytes::Bytes;
    use rstest::rstest;

    fn setup() -> (Demultiplexer, JobQueue) {
        (Demultiplexer::default(), JobQueue::default())
    }

    fn submit(queue: &mut JobQueue, txn: Transaction) -> PendingReply {
        let (txn, reply) = txn.with_reply();
        queue.push(txn).unwrap();
        reply
    }

    #[test]
    fn test_idle_lines_are_unsolicited() {
        let (mut demux, mut queue) = setup();
        let report = demux.feed(b"INF a\r\nDBG b\npart", &mut queue);

        assert_eq!(report.unsolicited, 2);
        assert!(report.lines_available());
        assert_eq!(demux.drain_unsolicited(), vec!["INF a", "DBG b"]);
        assert_eq!(demux.carry_over(), b"part");
        assert!(demux.drain_unsolicited().is_empty());
    }

    #[test]
    fn test_tagged_line_while_idle_is_unsolicited() {
        let (mut demux, mut queue) = setup();
        demux.feed(b"JVINVOK\n", &mut queue);
        assert_eq!(demux.drain_unsolicited(), vec!["JVINVOK"]);
    }

    #[test]
    fn test_command_reply() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::command("info"));

        let report = demux.feed(b"JVINVjevois 1.9.0\nJVINVOK\n", &mut queue);

        assert_eq!(report.completed, 1);
        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Success(Payload::Lines(vec!["jevois 1.9.0".into(), "OK".into()]))
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_command_error() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::command("badcmd"));

        demux.feed(b"JVINVERR unknown command\n", &mut queue);

        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Error(vec!["ERR unknown command".into()])
        );
    }

    #[test]
    fn test_logging_interleaved_with_reply() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::command("info"));

        demux.feed(b"INF starting\nJVINVjevois\nDBG tick\nJVINVOK\n", &mut queue);

        assert_eq!(demux.drain_unsolicited(), vec!["INF starting", "DBG tick"]);
        assert_eq!(
            reply.try_recv().unwrap().into_result().unwrap().into_lines(),
            vec!["jevois", "OK"]
        );
    }

    #[test]
    fn test_one_chunk_completes_two_transactions() {
        let (mut demux, mut queue) = setup();
        let mut first = submit(&mut queue, Transaction::command("ping"));
        let mut second = submit(&mut queue, Transaction::command("getpar serout"));

        let report = demux.feed(b"JVINVALIVE\nJVINVOK\nJVINVUSB\nJVINVOK\nINF", &mut queue);

        assert_eq!(report.completed, 2);
        assert_eq!(
            first.try_recv().unwrap().into_result().unwrap().into_lines(),
            vec!["ALIVE", "OK"]
        );
        assert_eq!(
            second.try_recv().unwrap().into_result().unwrap().into_lines(),
            vec!["USB", "OK"]
        );
        assert_eq!(demux.carry_over(), b"INF");
    }

    #[test]
    fn test_binary_download() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(
            &mut queue,
            Transaction::download("icon.png", DownloadFormat::Binary),
        );

        demux.feed(b"JEVOIS_FILEGET 4\n\x89PN\nJVINVOK\n", &mut queue);

        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Success(Payload::Bytes(Bytes::from_static(b"\x89PN\n")))
        );
    }

    #[test]
    fn test_binary_download_split_body() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(
            &mut queue,
            Transaction::download("icon.png", DownloadFormat::Binary),
        );

        demux.feed(b"JEVOIS_FILEGET 4\n\x00\x01", &mut queue);
        assert_eq!(demux.state(&queue), DemuxState::AwaitingBody { remaining: 2 });
        demux.feed(b"\x02\x03", &mut queue);
        assert_eq!(demux.state(&queue), DemuxState::AwaitingReply);
        demux.feed(b"JVINVOK\n", &mut queue);

        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Success(Payload::Bytes(Bytes::from_static(&[0, 1, 2, 3])))
        );
    }

    #[test]
    fn test_text_download_splits_lines() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(
            &mut queue,
            Transaction::download("script.cfg", DownloadFormat::Text),
        );

        demux.feed(b"JEVOIS_FILEGET 10\r\nab\r\ncd\nef\nJVINVOK\r\n", &mut queue);

        assert_eq!(
            reply.try_recv().unwrap().into_result().unwrap().into_lines(),
            vec!["ab", "cd", "ef", ""]
        );
    }

    #[rstest]
    #[case::trailing_newline(b"JEVOIS_FILEGET 2\na\nJVINVOK\n".as_slice(), &["a", ""])]
    #[case::no_trailing_newline(b"JEVOIS_FILEGET 1\naJVINVOK\n".as_slice(), &["a"])]
    #[case::empty(b"JEVOIS_FILEGET 0\nJVINVOK\n".as_slice(), &[""])]
    fn test_text_download_keeps_final_fragment(#[case] input: &[u8], #[case] expected: &[&str]) {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::download("t", DownloadFormat::Text));

        demux.feed(input, &mut queue);

        assert_eq!(
            reply.try_recv().unwrap().into_result().unwrap().into_lines(),
            expected
        );
    }

    #[test]
    fn test_header_split_across_chunks() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::download("f", DownloadFormat::Binary));

        demux.feed(b"JEVOIS_FIL", &mut queue);
        assert_eq!(demux.state(&queue), DemuxState::AwaitingHeader);
        demux.feed(b"EGET 3", &mut queue);
        assert_eq!(demux.state(&queue), DemuxState::AwaitingHeader);
        demux.feed(b"\nabcJVINVOK\n", &mut queue);

        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Success(Payload::Bytes(Bytes::from_static(b"abc")))
        );
    }

    #[test]
    fn test_logging_before_header() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::download("f", DownloadFormat::Binary));

        demux.feed(b"INF one\nINF twoJEVOIS_FILEGET 1\nzJVINVOK\n", &mut queue);

        assert_eq!(demux.drain_unsolicited(), vec!["INF one", "INF two"]);
        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Success(Payload::Bytes(Bytes::from_static(b"z")))
        );
    }

    #[test]
    fn test_download_error_without_header() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::download("nope", DownloadFormat::Text));

        demux.feed(b"JVINVERR Could not open file nope\n", &mut queue);

        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Error(vec!["ERR Could not open file nope".into()])
        );
    }

    #[test]
    fn test_zero_length_download() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::download("empty", DownloadFormat::Binary));

        demux.feed(b"JEVOIS_FILEGET 0\n", &mut queue);
        assert_eq!(demux.state(&queue), DemuxState::AwaitingReply);
        demux.feed(b"JVINVOK\n", &mut queue);

        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Success(Payload::Bytes(Bytes::new()))
        );
    }

    #[rstest]
    #[case::letters(b"JEVOIS_FILEGET abc\nINF after\n".as_slice())]
    #[case::signed(b"JEVOIS_FILEGET +5\nINF after\n".as_slice())]
    #[case::empty(b"JEVOIS_FILEGET \nINF after\n".as_slice())]
    #[case::no_space(b"JEVOIS_FILEGET5\nINF after\n".as_slice())]
    fn test_malformed_header_aborts_transaction(#[case] input: &[u8]) {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::download("f", DownloadFormat::Binary));
        let mut next = submit(&mut queue, Transaction::command("ping"));

        let report = demux.feed(input, &mut queue);

        assert_eq!(report.completed, 1);
        match reply.try_recv().unwrap() {
            Outcome::Error(lines) => {
                assert_eq!(lines.len(), 1);
                assert!(lines[0].starts_with("ERR malformed file transfer header"));
            }
            other => panic!("expected error, got {other:?}"),
        }
        // Demultiplexer keeps going with the next transaction
        assert_eq!(demux.drain_unsolicited(), vec!["INF after"]);
        demux.feed(b"JVINVOK\n", &mut queue);
        assert!(next.try_recv().unwrap().is_success());
    }

    #[test]
    fn test_unterminated_header_over_limit_resyncs() {
        let mut demux = Demultiplexer::new(&LinkConfig {
            max_header_length: 20,
            ..LinkConfig::default()
        });
        let mut queue = JobQueue::default();
        let mut reply = submit(&mut queue, Transaction::download("f", DownloadFormat::Binary));

        demux.feed(b"JEVOIS_FILEGET 1234567890", &mut queue);
        assert!(!reply.try_recv().unwrap().is_success());

        demux.feed(b"999\nINF ok\n", &mut queue);
        assert_eq!(demux.drain_unsolicited(), vec!["INF ok"]);
        assert!(demux.carry_over().is_empty());
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let (mut demux, mut queue) = setup();
        demux.feed(b"INF a\r", &mut queue);
        demux.feed(b"\nINF b\n", &mut queue);
        assert_eq!(demux.drain_unsolicited(), vec!["INF a", "INF b"]);
    }

    #[test]
    fn test_bare_cr_then_text() {
        let (mut demux, mut queue) = setup();
        demux.feed(b"INF a\r", &mut queue);
        demux.feed(b"INF b\n", &mut queue);
        assert_eq!(demux.drain_unsolicited(), vec!["INF a", "INF b"]);
    }

    #[test]
    fn test_nul_terminates_line() {
        let (mut demux, mut queue) = setup();
        demux.feed(b"INF a\0INF b\0", &mut queue);
        assert_eq!(demux.drain_unsolicited(), vec!["INF a", "INF b"]);
    }

    #[test]
    fn test_long_fragment_is_flushed() {
        let mut demux = Demultiplexer::new(&LinkConfig {
            max_line_length: 8,
            ..LinkConfig::default()
        });
        let mut queue = JobQueue::default();

        let report = demux.feed(b"0123456789", &mut queue);

        assert_eq!(report.unsolicited, 1);
        assert_eq!(demux.drain_unsolicited(), vec!["0123456789"]);
        assert!(demux.carry_over().is_empty());
    }

    #[test]
    fn test_body_is_not_flushed_by_line_limit() {
        let mut demux = Demultiplexer::new(&LinkConfig {
            max_line_length: 4,
            ..LinkConfig::default()
        });
        let mut queue = JobQueue::default();
        let mut reply = submit(&mut queue, Transaction::download("f", DownloadFormat::Binary));

        demux.feed(b"JEVOIS_FILEGET 10\n0123456789", &mut queue);
        assert_eq!(demux.unsolicited_len(), 0);
        demux.feed(b"JVINVOK\n", &mut queue);

        assert_eq!(
            reply.try_recv().unwrap().into_result().unwrap().into_bytes(),
            Bytes::from_static(b"0123456789")
        );
    }

    #[test]
    fn test_partial_marker_survives_line_limit() {
        let mut demux = Demultiplexer::new(&LinkConfig {
            max_line_length: 8,
            ..LinkConfig::default()
        });
        let mut queue = JobQueue::default();
        let mut reply = submit(&mut queue, Transaction::download("f", DownloadFormat::Binary));

        let report = demux.feed(b"INF noise 0123JEVOIS_FIL", &mut queue);
        assert_eq!(report.unsolicited, 1);
        assert_eq!(demux.drain_unsolicited(), vec!["INF noise 0123"]);
        assert_eq!(demux.carry_over(), b"JEVOIS_FIL");

        demux.feed(b"EGET 2\nxyJVINVOK\n", &mut queue);
        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Success(Payload::Bytes(Bytes::from_static(b"xy")))
        );
    }

    #[rstest]
    #[case(b"abcJEVOIS".as_slice(), 6)]
    #[case(b"abcJ".as_slice(), 1)]
    #[case(b"abc".as_slice(), 0)]
    #[case(b"".as_slice(), 0)]
    fn test_partial_marker_len(#[case] buf: &[u8], #[case] expected: usize) {
        assert_eq!(partial_marker_len(buf), expected);
    }

    #[test]
    fn test_huge_announced_count_does_not_preallocate() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::download("f", DownloadFormat::Binary));

        let header = format!("JEVOIS_FILEGET {}\nabc", usize::MAX);
        demux.feed(header.as_bytes(), &mut queue);

        assert_eq!(
            demux.state(&queue),
            DemuxState::AwaitingBody {
                remaining: usize::MAX - 3
            }
        );
        assert_eq!(queue.clear(), 1);
        assert!(reply.try_recv().is_err());
    }

    #[test]
    fn test_download_error_after_body() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::download("f", DownloadFormat::Binary));

        let report = demux.feed(
            b"JEVOIS_FILEGET 3\nabcINF late\nJVINVERR read failed\n",
            &mut queue,
        );

        assert_eq!(report.completed, 1);
        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Error(vec!["ERR read failed".into()])
        );
        assert_eq!(demux.drain_unsolicited(), vec!["INF late"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_upload_error_reply() {
        let (mut demux, mut queue) = setup();
        let mut reply = submit(&mut queue, Transaction::upload("a.bin", vec![1u8, 2]));

        demux.feed(b"INF writing\nJVINVERR Could not write a.bin\n", &mut queue);

        assert_eq!(
            reply.try_recv().unwrap(),
            Outcome::Error(vec!["ERR Could not write a.bin".into()])
        );
        assert_eq!(demux.drain_unsolicited(), vec!["INF writing"]);
        assert_eq!(demux.state(&queue), DemuxState::Idle);
    }

    #[test]
    fn test_clear_resets_everything() {
        let (mut demux, mut queue) = setup();
        demux.feed(b"INF a\npartial\r", &mut queue);
        demux.clear();
        assert!(demux.carry_over().is_empty());
        assert_eq!(demux.unsolicited_len(), 0);

        demux.feed(b"\nINF b\n", &mut queue);
        assert_eq!(demux.drain_unsolicited(), vec!["", "INF b"]);
    }

    #[rstest]
    #[case(b" 42".as_slice(), Some(42))]
    #[case(b" 42\r".as_slice(), Some(42))]
    #[case(b" 0".as_slice(), Some(0))]
    #[case(b"42".as_slice(), None)]
    #[case(b" -1".as_slice(), None)]
    #[case(b" 4 2".as_slice(), None)]
    #[case(b" 99999999999999999999999999".as_slice(), None)]
    fn test_parse_byte_count(#[case] field: &[u8], #[case] expected: Option<usize>) {
        assert_eq!(parse_byte_count(field), expected);
    }
}
