//! Outbound job queue.
//!
//! Transactions are sent one at a time, in submission order. The head of the
//! queue is the only record that may be in flight; the next one is written
//! only once the head has completed and been popped by the demultiplexer.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;
use tokio_util::codec::Encoder;
use tracing::{debug, trace, warn};
use vislink_core::{Error, Result};

use crate::request::RequestEncoder;
use crate::transaction::{Transaction, TransactionId};
use crate::transport::Transport;

/// Result of a [`JobQueue::pump_send`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Nothing queued.
    Idle,
    /// Head already sent and awaiting its reply.
    InFlight,
    /// Head request written just now.
    Sent(TransactionId),
    /// Head is held back by the send interval until the given instant.
    Deferred(Instant),
}

/// FIFO of pending transactions.
#[derive(Debug)]
pub struct JobQueue {
    jobs: VecDeque<Transaction>,
    encoder: RequestEncoder,
    scratch: BytesMut,
    min_send_interval: Duration,
    hold_until: Option<Instant>,
    next_id: TransactionId,
}

impl JobQueue {
    pub fn new(min_send_interval: Duration) -> Self {
        Self {
            jobs: VecDeque::new(),
            encoder: RequestEncoder::new(),
            scratch: BytesMut::with_capacity(256),
            min_send_interval,
            hold_until: None,
            next_id: 1,
        }
    }

    /// Append a transaction, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the request cannot be framed.
    pub fn push(&mut self, mut txn: Transaction) -> Result<TransactionId> {
        txn.validate()?;
        let id = self.next_id;
        self.next_id += 1;
        txn.assign_id(id);
        trace!(id, request = %txn.request(), queued = self.jobs.len(), "Transaction queued");
        self.jobs.push_back(txn);
        Ok(id)
    }

    pub fn head(&self) -> Option<&Transaction> {
        self.jobs.front()
    }

    pub(crate) fn head_mut(&mut self) -> Option<&mut Transaction> {
        self.jobs.front_mut()
    }

    pub(crate) fn pop_head(&mut self) -> Option<Transaction> {
        self.jobs.pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// End of the current send hold, if one was armed by a throttled request.
    pub fn hold_until(&self) -> Option<Instant> {
        self.hold_until
    }

    pub fn min_send_interval(&self) -> Duration {
        self.min_send_interval
    }

    /// Write the head request if it has not been sent yet.
    ///
    /// Calling this repeatedly without intervening completions writes at
    /// most once. A head that would go out before the hold armed by an
    /// earlier throttled request is left unsent and reported as
    /// [`SendStatus::Deferred`]; the owner calls again once that instant
    /// has passed.
    ///
    /// # Errors
    ///
    /// A failed or short write is returned as an error. The head is still
    /// marked sent and stays in the queue: it completes if a reply arrives
    /// and is otherwise discarded by the next [`clear`](Self::clear).
    pub fn pump_send<T>(&mut self, transport: &mut T, now: Instant) -> Result<SendStatus>
    where
        T: Transport + ?Sized,
    {
        let Some(head) = self.jobs.front_mut() else {
            return Ok(SendStatus::Idle);
        };
        if head.is_sent() {
            return Ok(SendStatus::InFlight);
        }
        if let Some(until) = self.hold_until {
            if now < until {
                trace!(id = head.id(), ?until, "Send deferred");
                return Ok(SendStatus::Deferred(until));
            }
            self.hold_until = None;
        }

        self.scratch.clear();
        self.encoder.encode(&*head, &mut self.scratch)?;

        head.mark_sent();
        if head.is_throttled() {
            self.hold_until = Some(now + self.min_send_interval);
        }

        let id = head.id();
        let expected = self.scratch.len();
        let written = transport.write_bytes(&self.scratch).inspect_err(|e| {
            warn!(id, error = %e, "Request write failed");
        })?;
        if written < expected {
            warn!(id, written, expected, "Short write on request");
            return Err(Error::ShortWrite { written, expected });
        }

        debug!(id, request = %head.request(), bytes = written, "Request sent");
        Ok(SendStatus::Sent(id))
    }

    /// Drop every queued transaction without completing any of them.
    ///
    /// Returns the number discarded. Completions are dropped unrun, so
    /// oneshot-backed replies observe a closed channel.
    pub fn clear(&mut self) -> usize {
        let discarded = self.jobs.len();
        self.jobs.clear();
        self.hold_until = None;
        self.scratch.clear();
        discarded
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(Duration::from_millis(
            vislink_core::constants::DEFAULT_MIN_SEND_INTERVAL_MS,
        ))
    }
}
