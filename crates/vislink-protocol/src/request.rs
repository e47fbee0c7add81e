//! Request encoding.
//!
//! [`RequestEncoder`] implements tokio-util's [`Encoder`] so the same wire
//! format is produced whether requests are written by the synchronous
//! [`JobQueue`](crate::JobQueue) or pushed through a `FramedWrite`.
//!
//! # Wire format
//!
//! ```text
//! command / download:  JVINV<request>\n
//! upload:              JVINV<request>\n JEVOIS_FILEPUT <n>\n <n raw bytes>
//! ```
//!
//! An upload is encoded as one contiguous buffer so that it is written to
//! the port in a single call, with nothing able to slip between the request
//! line and its payload.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;
use vislink_core::constants::{FILEPUT_HEADER, LF, REPLY_TAG};
use vislink_core::{Error, Result};

use crate::transaction::{Transaction, TransactionKind};

/// Encoder for tagged requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestEncoder;

impl RequestEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Size of the encoded form of `txn`.
    pub fn encoded_len(txn: &Transaction) -> usize {
        let line = REPLY_TAG.len() + txn.request().len() + 1;
        match txn.kind() {
            TransactionKind::FileUpload => {
                let header = upload_header(txn.payload().len());
                line + header.len() + txn.payload().len()
            }
            _ => line,
        }
    }
}

fn upload_header(len: usize) -> String {
    format!("{FILEPUT_HEADER} {len}\n")
}

impl<'a> Encoder<&'a Transaction> for RequestEncoder {
    type Error = Error;

    fn encode(&mut self, txn: &'a Transaction, dst: &mut BytesMut) -> Result<()> {
        txn.validate()?;
        dst.reserve(Self::encoded_len(txn));

        dst.put_slice(REPLY_TAG.as_bytes());
        dst.put_slice(txn.request().as_bytes());
        dst.put_u8(LF);

        if txn.kind() == TransactionKind::FileUpload {
            dst.put_slice(upload_header(txn.payload().len()).as_bytes());
            dst.put_slice(txn.payload());
        }

        Ok(())
    }
}

/// Untagged console line, written outside the transaction queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a>(pub &'a str);

impl<'a> Encoder<RawLine<'a>> for RequestEncoder {
    type Error = Error;

    fn encode(&mut self, line: RawLine<'a>, dst: &mut BytesMut) -> Result<()> {
        if line.0.contains(['\n', '\r', '\0']) {
            return Err(Error::InvalidRequest(format!(
                "console line contains a line terminator: {:?}",
                line.0
            )));
        }
        dst.reserve(line.0.len() + 1);
        dst.put_slice(line.0.as_bytes());
        dst.put_u8(LF);
        Ok(())
    }
}
