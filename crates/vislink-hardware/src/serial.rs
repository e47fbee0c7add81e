//! Serial port transport.
//!
//! The port is opened by path; enumerating devices is left to the caller.
//! Writes happen synchronously on the link's thread. Reads run on a
//! blocking task that forwards every chunk it gets over a channel, and
//! the channel closes when the port goes away.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vislink_core::constants::DEFAULT_BAUD_RATE;

/// Serial port settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub port: String,

    pub baud_rate: u32,

    /// Read timeout of the blocking reader, in milliseconds. Bounds how
    /// long the reader takes to notice that nobody is listening any more.
    pub read_timeout_ms: u64,

    /// Size of the reader's buffer.
    pub read_chunk_size: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
            read_chunk_size: 4096,
        }
    }
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(feature = "hardware-serial")]
pub use port::SerialTransport;

#[cfg(feature = "hardware-serial")]
mod port {
    use std::io::{self, Read, Write};

    use bytes::Bytes;
    use tokio::sync::mpsc;
    use tracing::{debug, info, warn};
    use vislink_protocol::Transport;

    use super::SerialConfig;
    use crate::error::{HardwareError, Result};

    /// Transport over a real serial port.
    pub struct SerialTransport {
        port: Box<dyn serialport::SerialPort>,
        name: String,
    }

    impl std::fmt::Debug for SerialTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SerialTransport")
                .field("name", &self.name)
                .finish_non_exhaustive()
        }
    }

    impl SerialTransport {
        /// Open the port and start its reader.
        ///
        /// Must be called from within a tokio runtime. The returned
        /// receiver yields inbound chunks and closes when the port is
        /// lost.
        pub fn open(config: &SerialConfig) -> Result<(Self, mpsc::UnboundedReceiver<Bytes>)> {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| HardwareError::other(format!("No tokio runtime: {e}")))?;

            let port = serialport::new(&config.port, config.baud_rate)
                .timeout(config.read_timeout())
                .open()
                .map_err(|e| HardwareError::open_failed(&config.port, e.to_string()))?;
            let reader = port
                .try_clone()
                .map_err(|e| HardwareError::open_failed(&config.port, e.to_string()))?;

            let (tx, rx) = mpsc::unbounded_channel();
            let name = config.port.clone();
            let chunk_size = config.read_chunk_size.max(1);
            runtime.spawn_blocking({
                let name = name.clone();
                move || read_loop(reader, tx, chunk_size, &name)
            });

            info!(port = %name, baud = config.baud_rate, "Serial port opened");
            Ok((Self { port, name }, rx))
        }

        pub fn name(&self) -> &str {
            &self.name
        }
    }

    impl Transport for SerialTransport {
        fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
            let written = self.port.write(buf)?;
            self.port.flush()?;
            Ok(written)
        }
    }

    fn read_loop(
        mut reader: Box<dyn serialport::SerialPort>,
        tx: mpsc::UnboundedSender<Bytes>,
        chunk_size: usize,
        name: &str,
    ) {
        let mut buf = vec![0u8; chunk_size];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!(port = %name, "Serial port reached end of stream");
                    break;
                }
                Ok(n) => {
                    if tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        break;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(port = %name, error = %e, "Serial read failed");
                    break;
                }
            }
        }
        debug!(port = %name, "Serial reader stopped");
    }
}
