//! Transport adapters and the async driver for the camera link.
//!
//! The protocol core in `vislink-protocol` only knows how to write bytes
//! through the [`Transport`](vislink_protocol::Transport) trait and how to
//! consume bytes it is handed. This crate supplies both ends of that seam:
//!
//! - [`mock::MockCamera`], an in-process emulation of the camera, for tests
//!   and for developing without a device attached.
//! - [`serial::SerialTransport`] (feature `hardware-serial`), a real serial
//!   port with a blocking reader task.
//! - [`driver::LinkDriver`], which runs a link on its own tokio task and
//!   hands out cloneable [`driver::LinkHandle`]s with an async API.
//!
//! # Example
//!
//! ```
//! use vislink_hardware::{LinkDriver, mock::MockCamera};
//! use vislink_protocol::{Link, Payload};
//!
//! # #[tokio::main]
//! # async fn main() -> vislink_hardware::Result<()> {
//! let (camera, output) = MockCamera::new();
//! let handle = LinkDriver::spawn(Link::new(camera), output);
//!
//! handle.upload_file("notes.txt", "hello\n").await?;
//! let text = handle.download_text_file("notes.txt").await?;
//! assert_eq!(
//!     text.into_result().unwrap(),
//!     Payload::Lines(vec!["hello".into(), String::new()])
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Operations return [`Result<T>`][error::Result] with [`HardwareError`].
//! Device-reported failures are not errors at this level: they arrive as
//! [`Outcome::Error`](vislink_protocol::Outcome::Error) values.

pub mod driver;
pub mod error;
pub mod mock;
pub mod serial;

pub use driver::{LinkDriver, LinkEvent, LinkHandle};
pub use error::{HardwareError, Result};
pub use serial::SerialConfig;

#[cfg(feature = "hardware-serial")]
pub use serial::SerialTransport;
