//! Common test utilities for integration tests.
//!
//! Helpers here build device-side byte streams (tagged replies, file
//! transfer frames) and record completions in the order they fire, so the
//! flow and property tests can assert on ordering without repeating the
//! plumbing.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use vislink_protocol::{FeedReport, Link, Outcome, Transaction, Transport};

/// Completion log shared between a test and the closures it registers.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(String, Outcome)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a completion to `txn` that records its outcome under `label`.
    pub fn track(&self, label: impl Into<String>, txn: Transaction) -> Transaction {
        let events = self.events.clone();
        let label = label.into();
        txn.on_complete(move |outcome| {
            events
                .lock()
                .expect("Test helper: recorder lock poisoned")
                .push((label, outcome));
        })
    }

    pub fn labels(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("Test helper: recorder lock poisoned")
            .iter()
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn outcomes(&self) -> Vec<(String, Outcome)> {
        self.events
            .lock()
            .expect("Test helper: recorder lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .expect("Test helper: recorder lock poisoned")
            .len()
    }
}

/// Tagged reply lines, `\n` terminated.
pub fn tagged(lines: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        out.extend_from_slice(b"JVINV");
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
    }
    out
}

/// Complete device answer to a successful `fileget`.
pub fn fileget_response(data: &[u8]) -> Vec<u8> {
    let mut out = format!("JEVOIS_FILEGET {}\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(&tagged(&["OK"]));
    out
}

/// Deliver `bytes` to the link in chunks of at most `chunk` bytes,
/// summing the reports.
pub fn feed_in_chunks<T: Transport>(link: &mut Link<T>, bytes: &[u8], chunk: usize) -> FeedReport {
    let mut total = FeedReport::default();
    for piece in bytes.chunks(chunk.max(1)) {
        let (report, status) = link.bytes_arrived(piece);
        status.expect("Test helper: pump after feed failed");
        total.unsolicited += report.unsolicited;
        total.completed += report.completed;
    }
    total
}
