//! Error types for transport adapters and the link driver.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors raised by transport adapters and the link driver.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Link task or port is gone.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Serial port could not be opened.
    #[error("Failed to open {port}: {message}")]
    OpenFailed { port: String, message: String },

    /// Error from the link itself: framing, short write, or a driver that
    /// has already stopped.
    #[error(transparent)]
    Link(#[from] vislink_core::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new port open error.
    pub fn open_failed(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// The driver task has stopped and accepts no more requests.
    pub fn link_closed() -> Self {
        Self::Link(vislink_core::Error::LinkClosed)
    }

    /// True when the link can no longer be used.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
            || matches!(self, Self::Link(vislink_core::Error::LinkClosed))
    }
}
