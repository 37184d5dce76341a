//! XDR style wire codec over a blocking socket.
//!
//! Every integer is big endian. Variable length fields are preceded by a
//! 4 byte length and zero padded to a 4 byte boundary. Opaque fields of a
//! declared length are space filled up to that length before padding.

use bytes::{BufMut, Bytes, BytesMut};
use std::io::{Read, Write};

use crate::{Result, common::BoxError, net::Socket};

pub mod buffer;

pub use buffer::ParamBuffer;

const DEFAULT_BUF_CAPACITY: usize = 1024;

const PAD: [u8; 4] = [0, 0, 0, 0];
const FILL: [u8; 4] = [32, 32, 32, 32];

/// Zero padding needed after a field of `len` bytes.
pub(crate) const fn pad_of(len: usize) -> usize {
    (4usize.wrapping_sub(len)) & 3
}

/// An error when translating buffer.
#[derive(Debug, thiserror::Error)]
#[error("ProtocolError: {source}")]
pub struct ProtocolError {
    source: BoxError,
}

impl ProtocolError {
    /// Create new [`ProtocolError`].
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self { source: source.into() }
    }
}

/// Build a [`ProtocolError`] from format arguments.
macro_rules! protocol {
    ($($tt:tt)*) => {
        crate::wire::ProtocolError::new(format!($($tt)*))
    };
}

pub(crate) use protocol;

/// Buffered writer and blocking reader over one socket.
///
/// Writes accumulate in a buffer until [`flush`][WireStream::flush], so a
/// whole request packet reaches the wire in one piece. Reads pull from
/// the socket directly.
#[derive(Debug)]
pub struct WireStream {
    socket: Socket,
    write_buf: BytesMut,
}

impl WireStream {
    pub fn new(socket: Socket) -> Self {
        Self {
            socket,
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
        }
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Send everything buffered so far.
    pub fn flush(&mut self) -> Result<()> {
        let buf = self.write_buf.split();
        self.socket.write_all(&buf)?;
        self.socket.flush()?;
        Ok(())
    }

    // write side

    pub fn write_i32(&mut self, val: i32) {
        self.write_buf.put_i32(val);
    }

    pub fn write_i64(&mut self, val: i64) {
        self.write_buf.put_i64(val);
    }

    /// Single precision float, big endian bit pattern.
    pub fn write_f32(&mut self, val: f32) {
        self.write_buf.put_u32(val.to_bits());
    }

    /// Double precision float. The wire carries the high word first with
    /// each word big endian, so on little endian hosts both words are
    /// byte swapped and then exchanged.
    pub fn write_f64(&mut self, val: f64) {
        let bits = val.to_bits();
        self.write_buf.put_u32((bits >> 32) as u32);
        self.write_buf.put_u32(bits as u32);
    }

    /// Length prefixed buffer, zero padded.
    pub fn write_buffer(&mut self, buffer: &[u8]) {
        self.write_i32(buffer.len() as i32);
        if !buffer.is_empty() {
            self.write_buf.put_slice(buffer);
            self.write_buf.put_slice(&PAD[..pad_of(buffer.len())]);
        }
    }

    /// Raw bytes with alignment padding, no length prefix.
    pub fn write_raw(&mut self, buffer: &[u8]) {
        self.write_buf.put_slice(buffer);
        self.write_buf.put_slice(&PAD[..pad_of(buffer.len())]);
    }

    /// Fixed length field: the buffer, space filled to `len`, zero padded.
    pub fn write_opaque(&mut self, buffer: &[u8], len: usize) {
        if len == 0 {
            return;
        }
        let used = buffer.len().min(len);
        self.write_buf.put_slice(&buffer[..used]);
        for _ in used..len {
            self.write_buf.put_u8(FILL[0]);
        }
        self.write_buf.put_slice(&PAD[..pad_of(len)]);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_buffer(s.as_bytes());
    }

    /// Length prefixed buffer led by a type tag byte.
    pub fn write_typed(&mut self, tag: u8, buffer: &[u8]) {
        let size = buffer.len() + 1;
        self.write_i32(size as i32);
        self.write_buf.put_u8(tag);
        self.write_buf.put_slice(buffer);
        self.write_buf.put_slice(&PAD[..pad_of(size)]);
    }

    /// Blob segment batch buffer. The segment length travels twice as an
    /// int and once more as a 2 byte little endian prefix on the data.
    pub fn write_blob_buffer(&mut self, buffer: &[u8]) -> Result<(), ProtocolError> {
        let len = buffer.len();
        if len > i16::MAX as usize {
            return Err(protocol!("blob segment of {len} bytes exceeds 32767"));
        }
        self.write_i32(len as i32 + 2);
        self.write_i32(len as i32 + 2);
        self.write_buf.put_u8((len & 0xff) as u8);
        self.write_buf.put_u8((len >> 8) as u8);
        self.write_buf.put_slice(buffer);
        self.write_buf.put_slice(&PAD[..pad_of(len + 2)]);
        Ok(())
    }

    // read side

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.socket.read_exact(buf)?;
        Ok(())
    }

    fn skip_pad(&mut self, len: usize) -> Result<()> {
        let mut pad = [0u8; 4];
        self.read_exact(&mut pad[..pad_of(len)])
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(f32::from_bits(u32::from_be_bytes(buf)))
    }

    /// Inverse of [`write_f64`][WireStream::write_f64]: high word first,
    /// words exchanged back and byte swapped into host order.
    pub fn read_f64(&mut self) -> Result<f64> {
        let hi = self.read_i32()? as u32 as u64;
        let lo = self.read_i32()? as u32 as u64;
        Ok(f64::from_bits((hi << 32) | lo))
    }

    /// Fixed length field without its padding.
    pub fn read_opaque(&mut self, len: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        self.skip_pad(len)?;
        Ok(buf.into())
    }

    /// Length prefixed buffer without its padding.
    pub fn read_buffer(&mut self) -> Result<Bytes> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(protocol!("negative buffer length {len}").into());
        }
        self.read_opaque(len as usize)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let buf = self.read_buffer()?;
        Ok(std::str::from_utf8(&buf)?.to_owned())
    }
}

/// Little endian integer of `len` bytes starting at `pos`, the layout
/// used inside info reply buffers. Items wider than 32 bits keep only
/// their low word.
pub fn vax_integer(buffer: &[u8], pos: usize, len: usize) -> i32 {
    let mut value = 0i32;
    for (i, byte) in buffer[pos..pos + len].iter().take(4).enumerate() {
        value |= (*byte as i32) << (8 * i);
    }
    value
}
