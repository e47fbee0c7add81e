use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("Short write: wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Link closed")]
    LinkClosed,

    // Protocol errors
    #[error("Malformed file transfer header: {0}")]
    MalformedHeader(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for failures of the physical link rather than of a
    /// single transaction.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::ShortWrite { .. } | Error::Io(_) | Error::LinkClosed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
