//! Tag-value parameter buffers.
//!
//! The DPB, TPB, SPB, BPB and EPB all share the same shape: a version
//! byte followed by clumps. A clump is a tag byte, optionally a one byte
//! length and that many value bytes. Integer values inside clumps are
//! little endian, unlike everything else on the wire.

use bytes::{BufMut, Bytes, BytesMut};

/// Incremental parameter buffer builder.
#[derive(Debug, Clone)]
pub struct ParamBuffer {
    buf: BytesMut,
}

impl ParamBuffer {
    /// Start a buffer with its version byte.
    pub fn new(version: u8) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(version);
        Self { buf }
    }

    /// Start a buffer without a version byte, for payloads whose version
    /// tag travels in the typed field framing instead.
    pub fn bare() -> Self {
        Self { buf: BytesMut::with_capacity(64) }
    }

    /// Bare tag with no value, the TPB clump form.
    pub fn append_tag(&mut self, tag: u8) -> &mut Self {
        self.buf.put_u8(tag);
        self
    }

    /// Tag with a single value byte.
    pub fn append_u8(&mut self, tag: u8, value: u8) -> &mut Self {
        self.buf.put_u8(tag);
        self.buf.put_u8(1);
        self.buf.put_u8(value);
        self
    }

    /// Tag with a 4 byte little endian integer value.
    pub fn append_i32(&mut self, tag: u8, value: i32) -> &mut Self {
        self.buf.put_u8(tag);
        self.buf.put_u8(4);
        self.buf.put_i32_le(value);
        self
    }

    /// Tag with a length prefixed byte value.
    ///
    /// Clump lengths are one byte, longer values are truncated to 255.
    pub fn append_bytes(&mut self, tag: u8, value: &[u8]) -> &mut Self {
        let len = value.len().min(255);
        self.buf.put_u8(tag);
        self.buf.put_u8(len as u8);
        self.buf.put_slice(&value[..len]);
        self
    }

    pub fn append_str(&mut self, tag: u8, value: &str) -> &mut Self {
        self.append_bytes(tag, value.as_bytes())
    }

    /// Raw bytes without clump framing, for the event block layout.
    pub fn append_raw(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gds::*;

    #[test]
    fn clump_forms() {
        let mut pb = ParamBuffer::new(ISC_DPB_VERSION1);
        pb.append_bytes(ISC_DPB_DUMMY_PACKET_INTERVAL, &[120, 10, 0, 0])
            .append_i32(ISC_DPB_SQL_DIALECT, 3)
            .append_str(ISC_DPB_USER_NAME, "SYSDBA");
        assert_eq!(
            pb.as_bytes(),
            [
                1,
                ISC_DPB_DUMMY_PACKET_INTERVAL, 4, 120, 10, 0, 0,
                ISC_DPB_SQL_DIALECT, 4, 3, 0, 0, 0,
                ISC_DPB_USER_NAME, 6, b'S', b'Y', b'S', b'D', b'B', b'A',
            ],
        );
    }

    #[test]
    fn bare_tags() {
        let mut pb = ParamBuffer::new(ISC_TPB_VERSION3);
        pb.append_tag(ISC_TPB_WRITE).append_tag(ISC_TPB_WAIT);
        assert_eq!(pb.as_bytes(), [3, ISC_TPB_WRITE, ISC_TPB_WAIT]);
    }
}
