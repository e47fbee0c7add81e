//! Wire-level constants for the camera serial link.
//!
//! The camera exposes a single virtual serial port that carries three kinds of
//! traffic at once: tagged command replies, counted binary file payloads, and
//! free-form log output. Every constant that decides how bytes on that port
//! are framed lives here so the encoder, the demultiplexer and the device
//! emulator agree on one definition.
//!
//! # Request framing
//!
//! ```text
//! JVINV<command text>\n
//! ^^^^^
//! Reply tag, also used as the request prefix
//! ```
//!
//! # Reply framing
//!
//! ```text
//! JVINV<reply line>\r\n        zero or more data lines
//! JVINVOK\r\n                  success terminator
//! JVINVERR <reason>\r\n        error terminator
//! ```
//!
//! # File transfers
//!
//! ```text
//! download:  JEVOIS_FILEGET <n>\n <n raw bytes> JVINVOK\r\n
//! upload:    JVINVfileput <path>\n JEVOIS_FILEPUT <n>\n <n raw bytes>
//! ```
//!
//! # Usage
//!
//! ```
//! use vislink_core::constants::*;
//!
//! let line = "JVINVOK";
//! let reply = line.strip_prefix(REPLY_TAG).unwrap();
//! assert_eq!(reply, REPLY_OK);
//! ```

// ============================================================================
// Reply Tagging
// ============================================================================

/// Marker that prefixes every request line and every reply line belonging
/// to the in-flight transaction.
///
/// Lines without this prefix are unsolicited device output.
///
/// # Examples
///
/// ```
/// use vislink_core::constants::REPLY_TAG;
///
/// assert!("JVINVjevois 1.9.0".starts_with(REPLY_TAG));
/// assert!(!"INF starting".starts_with(REPLY_TAG));
/// ```
pub const REPLY_TAG: &str = "JVINV";

/// Reply text (after tag removal) that completes a transaction successfully.
pub const REPLY_OK: &str = "OK";

/// Prefix of reply text (after tag removal) that completes a transaction
/// with an error. The remainder of the line is a human-readable reason.
pub const REPLY_ERR_PREFIX: &str = "ERR ";

// ============================================================================
// File Transfer Headers
// ============================================================================

/// Header token announcing a counted download payload.
///
/// Followed by a single space, the decimal byte count and `\n`. The raw
/// payload starts immediately after the newline.
pub const FILEGET_HEADER: &str = "JEVOIS_FILEGET";

/// Header token announcing a counted upload payload sent by the host.
pub const FILEPUT_HEADER: &str = "JEVOIS_FILEPUT";

/// Command verb requesting a file from the device.
pub const FILEGET_COMMAND: &str = "fileget";

/// Command verb storing a file on the device.
pub const FILEPUT_COMMAND: &str = "fileput";

/// Command verb setting a module parameter.
pub const SETPAR_COMMAND: &str = "setpar";

/// Command verb setting a camera control.
pub const SETCAM_COMMAND: &str = "setcam";

// ============================================================================
// Unsolicited Line Prefixes
// ============================================================================

/// Prefix of debug-level device log lines.
pub const LOG_PREFIX_DEBUG: &str = "DBG ";

/// Prefix of info-level device log lines.
pub const LOG_PREFIX_INFO: &str = "INF ";

/// Prefix of error-level device log lines.
pub const LOG_PREFIX_ERROR: &str = "ERR ";

/// Prefix of fatal-level device log lines.
pub const LOG_PREFIX_FATAL: &str = "FTL ";

/// Prefix of acknowledgement lines echoed on the console.
pub const LOG_PREFIX_OK: &str = "OK";

// ============================================================================
// Line Terminators
// ============================================================================

/// Line feed. The only terminator the host emits.
pub const LF: u8 = b'\n';

/// Carriage return, accepted alone or as part of `\r\n`.
pub const CR: u8 = b'\r';

/// NUL byte, accepted as a line terminator on input.
pub const NUL: u8 = 0x00;

// ============================================================================
// Defaults
// ============================================================================

/// Default minimum spacing between a throttled request and the next send.
///
/// Control-setting commands (`setpar`, `setcam`) are spaced by this amount
/// so a slider dragged in a UI cannot overrun the device's command parser.
///
/// # Value: 50 ms
pub const DEFAULT_MIN_SEND_INTERVAL_MS: u64 = 50;

/// Default maximum length of an unterminated line held as carry-over.
///
/// # Value: 64 KB
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default maximum length of a file transfer header, marker included,
/// before it is declared malformed.
pub const DEFAULT_MAX_HEADER_LENGTH: usize = 64;

/// Default serial baud rate. The USB CDC link ignores it but the OS API
/// requires a value.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
