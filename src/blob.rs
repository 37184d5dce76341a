//! Segmented blob I/O.
use crate::{
    Result,
    attachment::DbAttachment,
    common::{span, verbose},
    error::StateError,
    gds::*,
    transaction::Transaction,
    wire::ParamBuffer,
};

/// Largest payload `op_batch_segments` accepts, the two length bytes
/// count against the 16 bit segment limit.
const MAX_SEGMENT: usize = 32765;

/// Blob parameter buffer for open and create.
#[derive(Debug, Default, Clone)]
pub struct BlobParams {
    pub source_type: Option<i32>,
    pub target_type: Option<i32>,
    pub streamed: bool,
}

impl BlobParams {
    fn is_empty(&self) -> bool {
        self.source_type.is_none() && self.target_type.is_none() && !self.streamed
    }

    fn build(&self) -> ParamBuffer {
        let mut bpb = ParamBuffer::bare();
        if let Some(source) = self.source_type {
            bpb.append_i32(ISC_BPB_SOURCE_TYPE, source);
        }
        if let Some(target) = self.target_type {
            bpb.append_i32(ISC_BPB_TARGET_TYPE, target);
        }
        if self.streamed {
            bpb.append_u8(ISC_BPB_TYPE, ISC_BPB_TYPE_STREAM);
        }
        bpb
    }
}

/// An open blob handle under one transaction.
///
/// Reading and writing go through the segment protocol. The handle
/// must be closed or cancelled explicitly, dropping the value does not
/// touch the wire.
pub struct Blob {
    db: DbAttachment,
    id: i64,
    handle: i32,
    open: bool,
    eof: bool,
}

impl Blob {
    /// Open an existing blob by the id a fetched row carried.
    pub fn open(transaction: &Transaction, id: i64) -> Result<Self> {
        Self::open_with(transaction, id, &BlobParams::default())
    }

    pub fn open_with(transaction: &Transaction, id: i64, params: &BlobParams) -> Result<Self> {
        span!("open_blob");
        Self::request(transaction, OP_OPEN_BLOB, OP_OPEN_BLOB2, id, params)
    }

    /// Create a fresh blob, the server assigns its id.
    pub fn create(transaction: &Transaction) -> Result<Self> {
        Self::create_with(transaction, &BlobParams::default())
    }

    pub fn create_with(transaction: &Transaction, params: &BlobParams) -> Result<Self> {
        span!("create_blob");
        Self::request(transaction, OP_CREATE_BLOB, OP_CREATE_BLOB2, 0, params)
    }

    fn request(
        transaction: &Transaction,
        op: i32,
        op_with_bpb: i32,
        id: i64,
        params: &BlobParams,
    ) -> Result<Self> {
        let db = transaction.db().clone();
        let mut att = db.inner.lock();
        if params.is_empty() {
            att.stream().write_i32(op);
        } else {
            let bpb = params.build();
            att.stream().write_i32(op_with_bpb);
            att.stream().write_typed(ISC_BPB_VERSION1, bpb.as_bytes());
        }
        att.stream().write_i32(transaction.handle());
        att.stream().write_i64(id);
        att.stream().flush()?;
        let response = att.receive_response()?;
        drop(att);

        verbose!("blob {} open as handle {}", response.blob_handle, response.object_handle);
        Ok(Self {
            db,
            id: if id == 0 { response.blob_handle } else { id },
            handle: response.object_handle,
            open: true,
            eof: false,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(StateError::BlobNotOpen.into())
        }
    }

    /// Next segment of blob data, `None` once the blob is exhausted.
    ///
    /// The reply buffer packs sub segments, each prefixed with a 16 bit
    /// length, which are reassembled here.
    pub fn get_segment(&mut self) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        if self.eof {
            return Ok(None);
        }

        let mut att = self.db.inner.lock();
        let requested = (att.params().packet_size + 2).min(32767);
        att.stream().write_i32(OP_GET_SEGMENT);
        att.stream().write_i32(self.handle);
        att.stream().write_i32(requested);
        att.stream().write_i32(0); // data segment
        att.stream().flush()?;
        let response = att.receive_response()?;
        drop(att);

        // object handle 1 means more segments pending, 2 means blob eof
        if response.object_handle == 2 {
            self.eof = true;
        }

        let data = &response.data;
        if data.is_empty() {
            return if self.eof { Ok(None) } else { Ok(Some(Vec::new())) };
        }
        let mut segment = Vec::with_capacity(data.len());
        let mut pos = 0;
        while pos + 2 <= data.len() {
            let len = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
            pos += 2;
            let end = (pos + len).min(data.len());
            segment.extend_from_slice(&data[pos..end]);
            pos = end;
        }
        Ok(Some(segment))
    }

    /// Read the whole blob into one buffer.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(segment) = self.get_segment()? {
            out.extend_from_slice(&segment);
        }
        Ok(out)
    }

    /// Append data, chunked under the 16 bit segment limit.
    pub fn put_segment(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if data.is_empty() {
            return Ok(());
        }
        let mut att = self.db.inner.lock();
        for chunk in data.chunks(MAX_SEGMENT) {
            att.stream().write_i32(OP_BATCH_SEGMENTS);
            att.stream().write_i32(self.handle);
            att.stream().write_blob_buffer(chunk)?;
            att.stream().flush()?;
            att.receive_response()?;
        }
        Ok(())
    }

    /// Position the blob from its start. Returns the new offset.
    pub fn seek(&mut self, position: i32) -> Result<i32> {
        self.ensure_open()?;
        let mut att = self.db.inner.lock();
        att.stream().write_i32(OP_SEEK_BLOB);
        att.stream().write_i32(self.handle);
        att.stream().write_i32(0); // from start
        att.stream().write_i32(position);
        att.stream().flush()?;
        let response = att.receive_response()?;
        self.eof = false;
        Ok(response.object_handle)
    }

    /// Close the handle, making written data part of the blob.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.db.inner.lock().release_object(OP_CLOSE_BLOB, self.handle)?;
        self.open = false;
        Ok(())
    }

    /// Discard a created blob instead of closing it.
    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.db.inner.lock().release_object(OP_CANCEL_BLOB, self.handle)?;
        self.open = false;
        Ok(())
    }
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("open", &self.open)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::mock::MockSocket;
    use crate::testutil::*;
    use crate::transaction::IsolationLevel;

    fn started_tx(mock: &MockSocket, db: &crate::DbAttachment) -> Transaction {
        mock.push_input(&ok_response(3));
        db.start_transaction(IsolationLevel::default()).unwrap()
    }

    fn segment_response(handle: i32, segments: &[&[u8]]) -> Vec<u8> {
        let mut data = Vec::new();
        for s in segments {
            data.extend_from_slice(&(s.len() as u16).to_le_bytes());
            data.extend_from_slice(s);
        }
        let mut out = Vec::new();
        push_response(&mut out, handle, 0, &data);
        out
    }

    #[test]
    fn open_and_reassemble_segments() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let tx = started_tx(&mock, &db);

        mock.push_input(&ok_response(9));
        let mut blob = Blob::open(&tx, 0x0102030405060708).unwrap();
        assert_eq!(blob.id(), 0x0102030405060708);

        // sub segments of one reply are glued back together
        mock.push_input(&segment_response(0, &[b"hel", b"lo "]));
        mock.push_input(&segment_response(2, &[b"world"]));
        assert_eq!(blob.get_segment().unwrap().unwrap(), b"hello ");
        assert_eq!(blob.get_segment().unwrap().unwrap(), b"world");
        assert_eq!(blob.get_segment().unwrap(), None);
    }

    #[test]
    fn create_takes_server_assigned_id() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let tx = started_tx(&mock, &db);

        let mut out = Vec::new();
        push_response(&mut out, 5, 42, &[]);
        mock.push_input(&out);
        let blob = Blob::create(&tx).unwrap();
        assert_eq!(blob.id(), 42);
        assert_eq!(blob.handle, 5);
    }

    #[test]
    fn put_then_close() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let tx = started_tx(&mock, &db);

        let mut out = Vec::new();
        push_response(&mut out, 5, 42, &[]);
        mock.push_input(&out);
        let mut blob = Blob::create(&tx).unwrap();

        mock.push_input(&ok_response(0));
        blob.put_segment(b"data").unwrap();
        mock.push_input(&ok_response(0));
        blob.close().unwrap();

        let err = blob.put_segment(b"late").unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::State(_)));
    }

    #[test]
    fn streamed_bpb_uses_extended_op() {
        let mock = MockSocket::new();
        let db = test_db(&mock);
        let tx = started_tx(&mock, &db);
        let before = mock.written().len();

        mock.push_input(&ok_response(9));
        let params = BlobParams { streamed: true, ..Default::default() };
        Blob::open_with(&tx, 7, &params).unwrap();

        let written = mock.written();
        assert_eq!(&written[before..before + 4], OP_OPEN_BLOB2.to_be_bytes());
    }
}
