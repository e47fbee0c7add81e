//! Outbound half of the transport seam.
//!
//! The link never reads from the port itself: the owner delivers arrived
//! bytes through [`Link::bytes_arrived`](crate::Link::bytes_arrived). It
//! only needs somewhere to write, which is all this trait describes.

use std::io;

/// Byte sink the link writes requests into.
///
/// Implementations report how many bytes they accepted. Accepting fewer
/// than offered is a short write; the link surfaces it to its owner and
/// does not retry.
pub trait Transport {
    /// Write `buf`, returning the number of bytes accepted.
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Capturing transport, handy for inspecting what the link sends.
impl Transport for Vec<u8> {
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(buf);
        Ok(buf.len())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write_bytes(buf)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write_bytes(buf)
    }
}
