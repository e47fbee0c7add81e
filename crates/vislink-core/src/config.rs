//! Link configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration and partial files only override what they name.
//!
//! ```
//! use vislink_core::config::LinkConfig;
//!
//! let config = LinkConfig::from_json_str(r#"{ "min_send_interval_ms": 20 }"#).unwrap();
//! assert_eq!(config.min_send_interval_ms, 20);
//! assert_eq!(config.max_header_length, LinkConfig::default().max_header_length);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MAX_HEADER_LENGTH, DEFAULT_MAX_LINE_LENGTH, DEFAULT_MIN_SEND_INTERVAL_MS,
    FILEGET_HEADER,
};
use crate::error::{Error, Result};

/// Tunables for the transaction queue and the demultiplexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Minimum spacing, in milliseconds, between a throttled request and
    /// the next request written to the port.
    pub min_send_interval_ms: u64,

    /// Longest unterminated line kept as carry-over. Longer fragments are
    /// flushed as unsolicited lines.
    pub max_line_length: usize,

    /// Longest file transfer header, marker included, accepted before the
    /// header is declared malformed.
    pub max_header_length: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            min_send_interval_ms: DEFAULT_MIN_SEND_INTERVAL_MS,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_header_length: DEFAULT_MAX_HEADER_LENGTH,
        }
    }
}

impl LinkConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check limits that would make the link unusable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a length limit is zero or too small to
    /// hold a file transfer header.
    pub fn validate(&self) -> Result<()> {
        if self.max_line_length == 0 {
            return Err(Error::Config("max_line_length must be non-zero".into()));
        }
        // Marker, space and at least one digit must fit
        let min_header = FILEGET_HEADER.len() + 2;
        if self.max_header_length < min_header {
            return Err(Error::Config(format!(
                "max_header_length must be at least {min_header}, got {}",
                self.max_header_length
            )));
        }
        Ok(())
    }

    /// Minimum inter-send interval as a [`Duration`].
    pub fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }
}
