//! Async link driver.
//!
//! [`LinkDriver`] moves a [`Link`] onto a single tokio task, which becomes
//! the only place the link is touched. Inbound chunks from the transport,
//! requests from any number of [`LinkHandle`]s and the deadline of a
//! throttled send are multiplexed with `select!`:
//!
//! ```text
//! ┌─────────────┐  Bytes     ┌─────────────────┐  write_bytes  ┌───────────┐
//! │ port reader │──────────► │                 │──────────────►│ Transport │
//! └─────────────┘            │   driver task   │               └───────────┘
//! ┌─────────────┐  Request   │   (owns Link)   │  LinkEvent
//! │ LinkHandle  │──────────► │                 │──────────────► subscribers
//! └─────────────┘  oneshot ◄─│                 │
//!                            └─────────────────┘
//! ```
//!
//! When the inbound channel closes the link is torn down, pending requests
//! resolve to [`HardwareError::Disconnected`] and [`LinkEvent::Disconnected`]
//! is broadcast. Once the task has stopped, new requests fail with
//! [`vislink_core::Error::LinkClosed`].
//!
//! # Examples
//!
//! ```
//! use vislink_hardware::driver::LinkDriver;
//! use vislink_hardware::mock::MockCamera;
//! use vislink_protocol::Link;
//!
//! #[tokio::main]
//! async fn main() -> vislink_hardware::Result<()> {
//!     let (camera, output) = MockCamera::new();
//!     let handle = LinkDriver::spawn(Link::new(camera), output);
//!
//!     let lines = handle.command("ping").await?.into_result().unwrap().into_lines();
//!     assert_eq!(lines, ["ALIVE", "OK"]);
//!
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::path::Path;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use vislink_protocol::{DownloadFormat, Link, Outcome, SendStatus, Transaction, Transport};

use crate::error::{HardwareError, Result};

const REQUEST_CHANNEL_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 64;
const DEVICE_NAME: &str = "camera link";

/// Notification broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LinkEvent {
    /// This many unsolicited lines were buffered; drain them with
    /// [`LinkHandle::drain_unsolicited`].
    LinesAvailable(usize),

    /// A write to the transport failed or was short. The link stays up;
    /// the owner decides whether to shut it down.
    WriteFailed(String),

    /// The transport closed; every pending transaction was discarded.
    Disconnected,
}

enum Request {
    Submit(Transaction),
    WriteLine {
        text: String,
        reply: oneshot::Sender<vislink_core::Result<()>>,
    },
    Drain(oneshot::Sender<Vec<String>>),
    Teardown(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<usize>),
}

/// Task owning the link.
pub struct LinkDriver<T: Transport> {
    link: Link<T>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    requests: mpsc::Receiver<Request>,
    events: broadcast::Sender<LinkEvent>,
}

impl<T> LinkDriver<T>
where
    T: Transport + Send + 'static,
{
    /// Spawn the driver task and return a handle to it.
    ///
    /// `inbound` carries the chunks read from the same transport the link
    /// writes to. Must be called from within a tokio runtime.
    pub fn spawn(link: Link<T>, inbound: mpsc::UnboundedReceiver<Bytes>) -> LinkHandle {
        let (request_tx, requests) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let driver = Self {
            link,
            inbound,
            requests,
            events: events.clone(),
        };
        tokio::spawn(driver.run());

        LinkHandle {
            requests: request_tx,
            events,
        }
    }

    async fn run(mut self) {
        debug!("Link driver started");
        loop {
            let deadline = self.link.next_send_at();

            tokio::select! {
                chunk = self.inbound.recv() => match chunk {
                    Some(bytes) => self.on_bytes(&bytes),
                    None => {
                        let discarded = self.link.teardown();
                        warn!(discarded, "Transport closed");
                        let _ = self.events.send(LinkEvent::Disconnected);
                        break;
                    }
                },
                request = self.requests.recv() => match request {
                    Some(request) => {
                        if !self.on_request(request) {
                            break;
                        }
                    }
                    None => {
                        // Every handle dropped
                        self.link.teardown();
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let status = self.link.pump_send();
                    self.check_send(status);
                }
            }
        }
        info!("Link driver stopped");
    }

    fn on_bytes(&mut self, bytes: &[u8]) {
        let (report, status) = self.link.bytes_arrived(bytes);
        if report.lines_available() {
            let _ = self.events.send(LinkEvent::LinesAvailable(report.unsolicited));
        }
        self.check_send(status);
    }

    /// Handle one request. Returns false once the driver should stop.
    fn on_request(&mut self, request: Request) -> bool {
        match request {
            Request::Submit(txn) => {
                let status = self.link.submit(txn);
                self.check_send(status);
            }
            Request::WriteLine { text, reply } => {
                let result = self.link.write_line(&text);
                if let Err(e) = &result
                    && e.is_transport()
                {
                    let _ = self.events.send(LinkEvent::WriteFailed(e.to_string()));
                }
                let _ = reply.send(result);
            }
            Request::Drain(reply) => {
                let _ = reply.send(self.link.drain_unsolicited_lines());
            }
            Request::Teardown(reply) => {
                let _ = reply.send(self.link.teardown());
            }
            Request::Shutdown(reply) => {
                let _ = reply.send(self.link.teardown());
                return false;
            }
        }
        true
    }

    fn check_send(&self, status: vislink_core::Result<SendStatus>) {
        match status {
            Ok(_) => {}
            Err(e) if e.is_transport() => {
                warn!(error = %e, "Transport write failed");
                let _ = self.events.send(LinkEvent::WriteFailed(e.to_string()));
            }
            Err(e) => warn!(error = %e, "Request rejected"),
        }
    }
}

/// Cloneable handle to a running [`LinkDriver`].
#[derive(Debug, Clone)]
pub struct LinkHandle {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<LinkEvent>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Submit(txn) => f.debug_tuple("Submit").field(txn).finish(),
            Request::WriteLine { text, .. } => f.debug_struct("WriteLine").field("text", text).finish(),
            Request::Drain(_) => f.write_str("Drain"),
            Request::Teardown(_) => f.write_str("Teardown"),
            Request::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

impl LinkHandle {
    async fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| HardwareError::link_closed())
    }

    async fn call<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Request) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| HardwareError::disconnected(DEVICE_NAME))
    }

    /// Queue `txn` and wait for its outcome.
    ///
    /// # Errors
    ///
    /// [`HardwareError::Link`] if the request cannot be framed;
    /// [`HardwareError::Disconnected`] if the link is torn down before the
    /// transaction completes, or a closed-link error if the driver has
    /// already stopped.
    pub async fn execute(&self, txn: Transaction) -> Result<Outcome> {
        txn.validate()?;
        let (txn, reply) = txn.with_reply();
        self.send(Request::Submit(txn)).await?;
        reply
            .await
            .map_err(|_| HardwareError::disconnected(DEVICE_NAME))
    }

    pub async fn command(&self, text: &str) -> Result<Outcome> {
        self.execute(Transaction::command(text)).await
    }

    pub async fn download_text_file(&self, path: &str) -> Result<Outcome> {
        self.execute(Transaction::download(path, DownloadFormat::Text))
            .await
    }

    pub async fn download_binary_file(&self, path: &str) -> Result<Outcome> {
        self.execute(Transaction::download(path, DownloadFormat::Binary))
            .await
    }

    pub async fn upload_file(&self, path: &str, data: impl Into<Bytes>) -> Result<Outcome> {
        self.execute(Transaction::upload(path, data)).await
    }

    /// Upload the contents of a local file.
    ///
    /// A local file that cannot be read yields an error outcome without
    /// touching the link.
    pub async fn upload_local_file(&self, remote: &str, local: impl AsRef<Path>) -> Result<Outcome> {
        let local = local.as_ref();
        match tokio::fs::read(local).await {
            Ok(data) => self.upload_file(remote, data).await,
            Err(e) => {
                warn!(path = %local.display(), error = %e, "Could not read local file");
                Ok(Outcome::Error(vec![format!(
                    "ERR could not open local file {}",
                    local.display()
                )]))
            }
        }
    }

    pub async fn set_parameter(&self, name: &str, value: &str) -> Result<Outcome> {
        self.execute(Transaction::set_parameter(name, value)).await
    }

    pub async fn set_camera_control(&self, name: &str, value: &str) -> Result<Outcome> {
        self.execute(Transaction::set_camera_control(name, value))
            .await
    }

    /// Write an untagged console line.
    pub async fn write_line(&self, text: &str) -> Result<()> {
        let text = text.to_string();
        self.call(|reply| Request::WriteLine { text, reply })
            .await?
            .map_err(HardwareError::from)
    }

    /// Take every buffered unsolicited line.
    pub async fn drain_unsolicited(&self) -> Result<Vec<String>> {
        self.call(Request::Drain).await
    }

    /// Receive [`LinkEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Discard pending transactions and buffered input, keeping the link
    /// running. Returns the number of transactions discarded.
    pub async fn teardown(&self) -> Result<usize> {
        self.call(Request::Teardown).await
    }

    /// Tear the link down and stop the driver task.
    pub async fn shutdown(&self) -> Result<usize> {
        self.call(Request::Shutdown).await
    }

    /// Whether the driver task has stopped.
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}
