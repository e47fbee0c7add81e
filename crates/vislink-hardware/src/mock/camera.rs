//! Emulated camera for testing and development.
//!
//! [`MockCamera`] plays the device side of the serial protocol in process.
//! Requests written to it are parsed as they arrive and answered on an
//! unbounded channel of byte chunks, which stands in for the port's
//! "bytes arrived" events. A cloneable [`MockCameraHandle`] lets tests
//! inject log output, inspect state, or pull the plug while the camera
//! itself is owned by a link.
//!
//! # Examples
//!
//! ```
//! use vislink_hardware::mock::MockCamera;
//! use vislink_protocol::Link;
//!
//! let (camera, mut output) = MockCamera::new();
//! let mut link = Link::new(camera);
//! link.send_command("ping", |lines| assert_eq!(lines, ["ALIVE", "OK"]), |_| {})
//!     .unwrap();
//!
//! while let Ok(chunk) = output.try_recv() {
//!     link.bytes_arrived(&chunk);
//! }
//! assert_eq!(link.pending(), 0);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use vislink_core::constants::{
    FILEGET_COMMAND, FILEGET_HEADER, FILEPUT_COMMAND, FILEPUT_HEADER, LF, REPLY_ERR_PREFIX,
    REPLY_OK, REPLY_TAG, SETCAM_COMMAND, SETPAR_COMMAND,
};
use vislink_protocol::Transport;

/// Receiver of the camera's output chunks.
pub type CameraOutput = mpsc::UnboundedReceiver<Bytes>;

/// Firmware banner returned by `info`.
pub const MOCK_FIRMWARE_INFO: &str = "INFO: JeVois 1.9.0 mock";

/// Upload reception progress.
#[derive(Debug)]
enum Upload {
    None,
    AwaitingHeader { path: String },
    Receiving { path: String, remaining: usize, data: BytesMut },
}

#[derive(Debug)]
struct CameraState {
    output: Option<mpsc::UnboundedSender<Bytes>>,
    inbound: BytesMut,
    upload: Upload,
    files: HashMap<String, Bytes>,
    parameters: BTreeMap<String, String>,
    controls: BTreeMap<String, String>,
    requests: Vec<String>,
    log_noise: Vec<String>,
    chunk_size: Option<usize>,
    write_limit: Option<usize>,
    silent: bool,
}

/// Device-side emulation of the camera's serial protocol.
#[derive(Debug)]
pub struct MockCamera {
    state: Arc<Mutex<CameraState>>,
}

/// Cloneable control handle for a [`MockCamera`].
#[derive(Debug, Clone)]
pub struct MockCameraHandle {
    state: Arc<Mutex<CameraState>>,
}

fn lock(state: &Mutex<CameraState>) -> MutexGuard<'_, CameraState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockCamera {
    /// Create a camera and the receiver of its output.
    pub fn new() -> (Self, CameraOutput) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = CameraState {
            output: Some(tx),
            inbound: BytesMut::new(),
            upload: Upload::None,
            files: HashMap::new(),
            parameters: BTreeMap::new(),
            controls: BTreeMap::new(),
            requests: Vec::new(),
            log_noise: Vec::new(),
            chunk_size: None,
            write_limit: None,
            silent: false,
        };
        (
            Self {
                state: Arc::new(Mutex::new(state)),
            },
            rx,
        )
    }

    pub fn handle(&self) -> MockCameraHandle {
        MockCameraHandle {
            state: self.state.clone(),
        }
    }

    /// Deliver output in chunks of at most `size` bytes.
    pub fn with_chunk_size(self, size: usize) -> Self {
        lock(&self.state).chunk_size = Some(size.max(1));
        self
    }

    /// Accept at most `limit` bytes per write, producing short writes.
    pub fn with_write_limit(self, limit: usize) -> Self {
        lock(&self.state).write_limit = Some(limit);
        self
    }

    /// Emit `line` as unsolicited output before every reply.
    pub fn with_log_noise(self, line: impl Into<String>) -> Self {
        lock(&self.state).log_noise.push(line.into());
        self
    }

    /// Preload a file.
    pub fn with_file(self, path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        lock(&self.state).files.insert(path.into(), data.into());
        self
    }

    pub fn with_parameter(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        lock(&self.state).parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_control(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        lock(&self.state).controls.insert(name.into(), value.into());
        self
    }
}

impl Transport for MockCamera {
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if state.output.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "camera disconnected",
            ));
        }

        let accepted = state.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        state.inbound.extend_from_slice(&buf[..accepted]);
        state.process();
        Ok(accepted)
    }
}

impl MockCameraHandle {
    /// Emit an unsolicited log line right away.
    pub fn inject_log(&self, line: &str) {
        let mut state = lock(&self.state);
        let mut out = BytesMut::new();
        push_line(&mut out, line);
        state.emit(out.freeze());
    }

    /// Emit raw bytes right away.
    pub fn inject_bytes(&self, bytes: impl Into<Bytes>) {
        lock(&self.state).emit(bytes.into());
    }

    /// Close the output channel, as if the cable had been pulled.
    pub fn disconnect(&self) {
        debug!("Mock camera disconnected");
        lock(&self.state).output = None;
    }

    /// Swallow requests without answering them.
    pub fn set_silent(&self, silent: bool) {
        lock(&self.state).silent = silent;
    }

    pub fn set_write_limit(&self, limit: Option<usize>) {
        lock(&self.state).write_limit = limit;
    }

    /// Every request received so far, tag included for tagged ones.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.state).requests.clone()
    }

    pub fn file(&self, path: &str) -> Option<Bytes> {
        lock(&self.state).files.get(path).cloned()
    }

    pub fn parameter(&self, name: &str) -> Option<String> {
        lock(&self.state).parameters.get(name).cloned()
    }

    pub fn control(&self, name: &str) -> Option<String> {
        lock(&self.state).controls.get(name).cloned()
    }
}

fn push_line(out: &mut BytesMut, line: &str) {
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn push_tagged(out: &mut BytesMut, line: &str) {
    out.extend_from_slice(REPLY_TAG.as_bytes());
    push_line(out, line);
}

impl CameraState {
    /// Consume as much of the inbound buffer as possible.
    fn process(&mut self) {
        loop {
            let progressed = match std::mem::replace(&mut self.upload, Upload::None) {
                Upload::Receiving {
                    path,
                    remaining,
                    mut data,
                } => {
                    let take = remaining.min(self.inbound.len());
                    data.extend_from_slice(&self.inbound[..take]);
                    self.inbound.advance(take);
                    if take == remaining {
                        trace!(path = %path, bytes = data.len(), "Upload stored");
                        self.files.insert(path, data.freeze());
                        self.reply_tagged(&[REPLY_OK.to_string()]);
                    } else {
                        self.upload = Upload::Receiving {
                            path,
                            remaining: remaining - take,
                            data,
                        };
                    }
                    take > 0
                }
                Upload::AwaitingHeader { path } => match self.take_line() {
                    Some(line) => {
                        self.start_upload(path, &line);
                        true
                    }
                    None => {
                        self.upload = Upload::AwaitingHeader { path };
                        false
                    }
                },
                Upload::None => match self.take_line() {
                    Some(line) => {
                        self.handle_line(&line);
                        true
                    }
                    None => false,
                },
            };
            if !progressed {
                break;
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.inbound.iter().position(|&b| b == LF)?;
        let line = String::from_utf8_lossy(&self.inbound[..end])
            .trim_end_matches('\r')
            .to_string();
        self.inbound.advance(end + 1);
        Some(line)
    }

    fn start_upload(&mut self, path: String, header: &str) {
        let size = header
            .strip_prefix(FILEPUT_HEADER)
            .and_then(|rest| rest.strip_prefix(' '))
            .and_then(|n| n.parse::<usize>().ok());
        match size {
            Some(0) => {
                self.files.insert(path, Bytes::new());
                self.reply_tagged(&[REPLY_OK.to_string()]);
            }
            Some(remaining) => {
                self.upload = Upload::Receiving {
                    path,
                    remaining,
                    data: BytesMut::with_capacity(remaining),
                };
            }
            None => {
                self.reply_tagged(&[format!("{REPLY_ERR_PREFIX}Malformed upload header")]);
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        self.requests.push(line.to_string());
        if self.silent {
            return;
        }

        match line.strip_prefix(REPLY_TAG) {
            Some(command) => self.handle_command(command),
            None => {
                // Console command: same handling, untagged reply
                let reply = self.execute(line);
                let mut out = self.noise();
                for reply_line in reply {
                    push_line(&mut out, &reply_line);
                }
                self.emit(out.freeze());
            }
        }
    }

    fn handle_command(&mut self, command: &str) {
        let mut words = command.splitn(2, ' ');
        let verb = words.next().unwrap_or_default();
        let arg = words.next().unwrap_or_default().trim();

        if verb == FILEGET_COMMAND {
            self.send_file(arg);
        } else if verb == FILEPUT_COMMAND {
            if arg.is_empty() {
                self.reply_tagged(&[format!("{REPLY_ERR_PREFIX}Missing file name")]);
            } else {
                self.upload = Upload::AwaitingHeader {
                    path: arg.to_string(),
                };
            }
        } else {
            let reply = self.execute(command);
            self.reply_tagged(&reply);
        }
    }

    /// Run a line-oriented command, returning its reply lines.
    fn execute(&mut self, command: &str) -> Vec<String> {
        let parts: Vec<&str> = command.split_whitespace().collect();
        let ok = REPLY_OK.to_string();
        let err = |reason: &str| vec![format!("{REPLY_ERR_PREFIX}{reason}")];

        match parts.as_slice() {
            ["info"] => vec![MOCK_FIRMWARE_INFO.to_string(), ok],
            ["ping"] => vec!["ALIVE".to_string(), ok],
            [verb, name, value] if *verb == SETPAR_COMMAND => {
                self.parameters.insert(name.to_string(), value.to_string());
                vec![ok]
            }
            [verb, name, value] if *verb == SETCAM_COMMAND => {
                self.controls.insert(name.to_string(), value.to_string());
                vec![ok]
            }
            ["getpar", name] => match self.parameters.get(*name) {
                Some(value) => vec![format!("{name} {value}"), ok],
                None => err(&format!("Unknown parameter [{name}]")),
            },
            ["getcam", name] => match self.controls.get(*name) {
                Some(value) => vec![format!("{name} {value}"), ok],
                None => err(&format!("Unknown control [{name}]")),
            },
            _ => err("Unsupported command"),
        }
    }

    fn send_file(&mut self, path: &str) {
        let Some(data) = self.files.get(path).cloned() else {
            self.reply_tagged(&[format!("{REPLY_ERR_PREFIX}Could not open file {path}")]);
            return;
        };

        let mut out = self.noise();
        out.extend_from_slice(format!("{FILEGET_HEADER} {}\n", data.len()).as_bytes());
        out.extend_from_slice(&data);
        push_tagged(&mut out, REPLY_OK);
        self.emit(out.freeze());
    }

    fn noise(&self) -> BytesMut {
        let mut out = BytesMut::new();
        for line in &self.log_noise {
            push_line(&mut out, line);
        }
        out
    }

    fn reply_tagged(&mut self, lines: &[String]) {
        let mut out = self.noise();
        for line in lines {
            push_tagged(&mut out, line);
        }
        self.emit(out.freeze());
    }

    fn emit(&mut self, mut bytes: Bytes) {
        let Some(tx) = &self.output else {
            return;
        };
        let chunk = self.chunk_size.unwrap_or(bytes.len()).max(1);
        while !bytes.is_empty() {
            let piece = bytes.split_to(chunk.min(bytes.len()));
            if tx.send(piece).is_err() {
                // Receiver gone; nothing is listening any more
                return;
            }
        }
    }
}
