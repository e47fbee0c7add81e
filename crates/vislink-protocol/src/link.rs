//! Synchronous link facade.
//!
//! [`Link`] pairs a [`JobQueue`] with a [`Demultiplexer`] over one
//! [`Transport`]. It never blocks and never reads from the port: the owner
//! forwards arrived bytes to [`Link::bytes_arrived`] and calls
//! [`Link::pump_send`] once a deferred send is due. Everything runs on the
//! owner's thread, so no locking is involved.
//!
//! ```
//! use vislink_protocol::Link;
//!
//! let mut link = Link::new(Vec::new());
//! link.send_command("info", |lines| assert_eq!(lines[0], "jevois 1.9.0"), |_| {})
//!     .unwrap();
//! assert_eq!(link.transport(), b"JVINVinfo\n");
//!
//! let (report, _) = link.bytes_arrived(b"JVINVjevois 1.9.0\nJVINVOK\n");
//! assert_eq!(report.completed, 1);
//! ```

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;
use tokio_util::codec::Encoder;
use tracing::{info, warn};
use vislink_core::{Error, LinkConfig, Result};

use crate::demux::{DemuxState, Demultiplexer, FeedReport};
use crate::job_queue::{JobQueue, SendStatus};
use crate::request::{RawLine, RequestEncoder};
use crate::transaction::{DownloadFormat, Transaction};
use crate::transport::Transport;

/// Command/file multiplexer over a single transport.
#[derive(Debug)]
pub struct Link<T: Transport> {
    transport: T,
    queue: JobQueue,
    demux: Demultiplexer,
}

impl<T: Transport> Link<T> {
    /// Link with the default configuration.
    pub fn new(transport: T) -> Self {
        let config = LinkConfig::default();
        Self::build(transport, &config)
    }

    /// Link with a validated configuration.
    pub fn with_config(transport: T, config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, config))
    }

    fn build(transport: T, config: &LinkConfig) -> Self {
        Self {
            transport,
            queue: JobQueue::new(config.min_send_interval()),
            demux: Demultiplexer::new(config),
        }
    }

    /// Queue a transaction and send it if the link is idle.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] if the request cannot be framed, in which
    /// case nothing is queued. Transport errors from sending the head are
    /// returned too; the transaction stays queued in that case.
    pub fn submit(&mut self, txn: Transaction) -> Result<SendStatus> {
        self.queue.push(txn)?;
        self.pump_send()
    }

    pub fn send_command<S, E>(&mut self, text: &str, on_success: S, on_error: E) -> Result<SendStatus>
    where
        S: FnOnce(Vec<String>) + Send + 'static,
        E: FnOnce(Vec<String>) + Send + 'static,
    {
        self.submit(Transaction::command(text).on_outcome(|p| on_success(p.into_lines()), on_error))
    }

    pub fn download_text_file<S, E>(&mut self, path: &str, on_success: S, on_error: E) -> Result<SendStatus>
    where
        S: FnOnce(Vec<String>) + Send + 'static,
        E: FnOnce(Vec<String>) + Send + 'static,
    {
        let txn = Transaction::download(path, DownloadFormat::Text)
            .on_outcome(|p| on_success(p.into_lines()), on_error);
        self.submit(txn)
    }

    pub fn download_binary_file<S, E>(&mut self, path: &str, on_success: S, on_error: E) -> Result<SendStatus>
    where
        S: FnOnce(Bytes) + Send + 'static,
        E: FnOnce(Vec<String>) + Send + 'static,
    {
        let txn = Transaction::download(path, DownloadFormat::Binary)
            .on_outcome(|p| on_success(p.into_bytes()), on_error);
        self.submit(txn)
    }

    /// Upload `data` to `path`; the payload is written together with the
    /// request in one write.
    pub fn upload_file<S, E>(
        &mut self,
        path: &str,
        data: impl Into<Bytes>,
        on_success: S,
        on_error: E,
    ) -> Result<SendStatus>
    where
        S: FnOnce(Vec<String>) + Send + 'static,
        E: FnOnce(Vec<String>) + Send + 'static,
    {
        let txn = Transaction::upload(path, data).on_outcome(|p| on_success(p.into_lines()), on_error);
        self.submit(txn)
    }

    /// Throttled `setpar`.
    pub fn set_parameter<S, E>(
        &mut self,
        name: &str,
        value: &str,
        on_success: S,
        on_error: E,
    ) -> Result<SendStatus>
    where
        S: FnOnce(Vec<String>) + Send + 'static,
        E: FnOnce(Vec<String>) + Send + 'static,
    {
        let txn = Transaction::set_parameter(name, value)
            .on_outcome(|p| on_success(p.into_lines()), on_error);
        self.submit(txn)
    }

    /// Throttled `setcam`.
    pub fn set_camera_control<S, E>(
        &mut self,
        name: &str,
        value: &str,
        on_success: S,
        on_error: E,
    ) -> Result<SendStatus>
    where
        S: FnOnce(Vec<String>) + Send + 'static,
        E: FnOnce(Vec<String>) + Send + 'static,
    {
        let txn = Transaction::set_camera_control(name, value)
            .on_outcome(|p| on_success(p.into_lines()), on_error);
        self.submit(txn)
    }

    /// Write an untagged console line, bypassing the queue.
    ///
    /// Whatever the device prints in response arrives as unsolicited
    /// output.
    pub fn write_line(&mut self, text: &str) -> Result<()> {
        let mut buf = BytesMut::with_capacity(text.len() + 1);
        RequestEncoder::new().encode(RawLine(text), &mut buf)?;

        let expected = buf.len();
        let written = self.transport.write_bytes(&buf)?;
        if written < expected {
            warn!(written, expected, "Short write on console line");
            return Err(Error::ShortWrite { written, expected });
        }
        Ok(())
    }

    /// Feed bytes read from the port.
    ///
    /// Completions fire during the call. Afterwards the next queued
    /// request, if any, is sent; its status is returned beside the report
    /// so a short write never hides what was received.
    pub fn bytes_arrived(&mut self, bytes: &[u8]) -> (FeedReport, Result<SendStatus>) {
        let report = self.demux.feed(bytes, &mut self.queue);
        (report, self.pump_send())
    }

    /// Send the head request if it is due. See [`JobQueue::pump_send`].
    pub fn pump_send(&mut self) -> Result<SendStatus> {
        self.pump_send_at(Instant::now())
    }

    pub fn pump_send_at(&mut self, now: Instant) -> Result<SendStatus> {
        self.queue.pump_send(&mut self.transport, now)
    }

    /// Take every buffered unsolicited line.
    pub fn drain_unsolicited_lines(&mut self) -> Vec<String> {
        self.demux.drain_unsolicited()
    }

    /// Discard all queued transactions and buffered input.
    ///
    /// No completion runs. Returns the number of transactions dropped.
    pub fn teardown(&mut self) -> usize {
        let discarded = self.queue.clear();
        self.demux.clear();
        info!(discarded, "Link torn down");
        discarded
    }

    pub fn state(&self) -> DemuxState {
        self.demux.state(&self.queue)
    }

    /// Number of queued transactions, in-flight one included.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// When a held-back head request becomes due.
    pub fn next_send_at(&self) -> Option<Instant> {
        match self.queue.head() {
            Some(head) if !head.is_sent() => self.queue.hold_until(),
            _ => None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}
