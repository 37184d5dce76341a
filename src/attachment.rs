//! Database attachment and the shared wire session.
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::{
    Result,
    common::{debug, span, verbose},
    config::AttachParams,
    error::GdsError,
    gds::*,
    net::Socket,
    wire::{ParamBuffer, WireStream, protocol},
};

/// Callback receiving server warnings as they arrive.
pub type WarningSink = Box<dyn FnMut(GdsError) + Send + 'static>;

/// Generic response block: object handle, blob id and a data buffer,
/// followed on the wire by a status vector.
#[derive(Debug)]
pub(crate) struct Response {
    pub object_handle: i32,
    pub blob_handle: i64,
    pub data: Bytes,
}

/// One wire session. Every exchange happens with the session lock held,
/// so a request and its response never interleave with another thread.
pub(crate) struct Attachment {
    stream: WireStream,
    params: AttachParams,
    handle: i32,
    op: Option<i32>,
    transaction_count: i32,
    warning_sink: Option<WarningSink>,
}

impl Attachment {
    fn connect(params: AttachParams) -> Result<Self> {
        let socket = Socket::connect(&params.host, params.port, params.timeout)
            .map_err(|_| GdsError::raise(ISC_NETWORK_ERROR, &[&params.host]))?;
        Ok(Self {
            stream: WireStream::new(socket),
            params,
            handle: 0,
            op: None,
            transaction_count: 0,
            warning_sink: None,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_test(socket: Socket, params: AttachParams) -> Self {
        Self {
            stream: WireStream::new(socket),
            params,
            handle: 0,
            op: None,
            transaction_count: 0,
            warning_sink: None,
        }
    }

    /// Fresh identified session, not yet attached to anything.
    pub(crate) fn open(params: AttachParams) -> Result<Self> {
        let mut att = Self::connect(params)?;
        att.identify()?;
        Ok(att)
    }

    pub(crate) fn params(&self) -> &AttachParams {
        &self.params
    }

    pub(crate) fn set_handle(&mut self, handle: i32) {
        self.handle = handle;
    }

    pub(crate) fn shutdown(&self) {
        self.stream.socket().shutdown().ok();
    }

    pub(crate) fn handle(&self) -> i32 {
        self.handle
    }

    pub(crate) fn stream(&mut self) -> &mut WireStream {
        &mut self.stream
    }

    pub(crate) fn transaction_count(&self) -> i32 {
        self.transaction_count
    }

    pub(crate) fn transaction_started(&mut self) {
        self.transaction_count += 1;
    }

    pub(crate) fn transaction_ended(&mut self) {
        self.transaction_count -= 1;
    }

    pub(crate) fn set_warning_sink(&mut self, sink: WarningSink) {
        self.warning_sink = Some(sink);
    }

    /// Protocol negotiation, the first exchange on a fresh socket.
    fn identify(&mut self) -> Result<()> {
        span!("identify");

        let mut user_id = Vec::with_capacity(64);
        let user = whoami();
        let host = hostname();
        user_id.push(CNCT_USER);
        user_id.push(user.len().min(255) as u8);
        user_id.extend_from_slice(&user.as_bytes()[..user.len().min(255)]);
        user_id.push(CNCT_HOST);
        user_id.push(host.len().min(255) as u8);
        user_id.extend_from_slice(&host.as_bytes()[..host.len().min(255)]);
        user_id.push(CNCT_USER_VERIFICATION);
        user_id.push(0);

        self.stream.write_i32(OP_CONNECT);
        self.stream.write_i32(OP_ATTACH);
        self.stream.write_i32(CONNECT_VERSION2);
        self.stream.write_i32(ARCH_GENERIC);
        self.stream.write_string(&self.params.database);
        self.stream.write_i32(1); // protocol version count
        self.stream.write_buffer(&user_id);

        self.stream.write_i32(PROTOCOL_VERSION10);
        self.stream.write_i32(ARCH_GENERIC);
        self.stream.write_i32(2); // ptype_rpc
        self.stream.write_i32(3); // ptype_batch_send
        self.stream.write_i32(2); // preference weight
        self.stream.flush()?;

        if self.read_operation()? == OP_ACCEPT {
            let version = self.stream.read_i32()?;
            let architecture = self.stream.read_i32()?;
            let ptype = self.stream.read_i32()?;
            verbose!("accepted protocol {version} arch {architecture} ptype {ptype}");
            Ok(())
        } else {
            Err(GdsError::raise(ISC_CONNECT_REJECT, &[]).into())
        }
    }

    fn build_dpb(&self) -> ParamBuffer {
        let mut dpb = ParamBuffer::new(ISC_DPB_VERSION1);
        dpb.append_bytes(ISC_DPB_DUMMY_PACKET_INTERVAL, &[120, 10, 0, 0])
            .append_bytes(ISC_DPB_SQL_DIALECT, &[self.params.dialect as u8, 0, 0, 0])
            .append_str(ISC_DPB_LC_CTYPE, self.params.charset.name);
        if !self.params.role.is_empty() {
            dpb.append_str(ISC_DPB_SQL_ROLE_NAME, &self.params.role);
        }
        dpb.append_i32(ISC_DPB_CONNECT_TIMEOUT, self.params.timeout as i32)
            .append_str(ISC_DPB_USER_NAME, &self.params.user)
            .append_str(ISC_DPB_PASSWORD, &self.params.pass);
        dpb
    }

    fn attach(&mut self) -> Result<()> {
        span!("attach");
        let dpb = self.build_dpb();

        self.stream.write_i32(OP_ATTACH);
        self.stream.write_i32(0);
        self.stream.write_string(&self.params.database);
        self.stream.write_buffer(dpb.as_bytes());
        self.stream.flush()?;

        let response = self.receive_response()?;
        self.handle = response.object_handle;
        debug!("attached to {} as handle {}", self.params.database, self.handle);
        Ok(())
    }

    fn create(&mut self, options: &CreateDatabaseOptions) -> Result<()> {
        span!("create");
        let mut dpb = ParamBuffer::bare();
        dpb.append_bytes(ISC_DPB_SQL_DIALECT, &[self.params.dialect as u8, 0, 0, 0])
            .append_str(ISC_DPB_LC_CTYPE, self.params.charset.name)
            .append_str(ISC_DPB_USER_NAME, &self.params.user)
            .append_str(ISC_DPB_PASSWORD, &self.params.pass);
        if let Some(page_size) = options.page_size {
            dpb.append_i32(ISC_DPB_PAGE_SIZE, page_size);
        }
        if options.overwrite {
            dpb.append_u8(ISC_DPB_OVERWRITE, 1);
        }
        if let Some(force_write) = options.force_write {
            dpb.append_u8(ISC_DPB_FORCE_WRITE, force_write as u8);
        }

        self.stream.write_i32(OP_CREATE);
        self.stream.write_i32(0);
        self.stream.write_string(&self.params.database);
        self.stream.write_typed(ISC_DPB_VERSION1, dpb.as_bytes());
        self.stream.flush()?;

        let response = self.receive_response()?;
        self.handle = response.object_handle;
        Ok(())
    }

    pub(crate) fn detach(&mut self) -> Result<()> {
        if self.transaction_count > 0 {
            let count = self.transaction_count.to_string();
            return Err(GdsError::raise(ISC_OPEN_TRANS, &[&count]).into());
        }
        self.stream.write_i32(OP_DETACH);
        self.stream.write_i32(self.handle);
        self.stream.flush()?;
        self.receive_response()?;
        self.transaction_count = 0;
        self.stream.socket().shutdown().ok();
        Ok(())
    }

    pub(crate) fn drop_database(&mut self) -> Result<()> {
        self.stream.write_i32(OP_DROP_DATABASE);
        self.stream.write_i32(self.handle);
        self.stream.flush()?;
        self.receive_response()?;
        self.stream.socket().shutdown().ok();
        Ok(())
    }

    pub(crate) fn database_info(&mut self, items: &[u8], buffer_length: i32) -> Result<Bytes> {
        self.stream.write_i32(OP_INFO_DATABASE);
        self.stream.write_i32(self.handle);
        self.stream.write_i32(0); // incarnation
        self.stream.write_buffer(items);
        self.stream.write_i32(buffer_length);
        self.stream.flush()?;
        Ok(self.receive_response()?.data)
    }

    /// Request an auxiliary port for event delivery. Returns the remote
    /// id and the port to connect back to.
    pub(crate) fn connection_request(&mut self) -> Result<(i32, u16)> {
        self.stream.write_i32(OP_CONNECT_REQUEST);
        self.stream.write_i32(self.handle);
        self.stream.write_i32(P_REQ_ASYNC);
        self.stream.write_i32(0);
        self.stream.flush()?;

        self.read_operation()?;
        let aux_id = self.stream.read_i32()?;
        // the reply carries a raw sockaddr_in: family, port in network
        // order, address, then 12 bytes of padding
        let family_and_port = self.stream.read_opaque(4)?;
        let port = u16::from_be_bytes([family_and_port[2], family_and_port[3]]);
        let _addr = self.stream.read_opaque(4)?;
        let _zero = self.stream.read_opaque(12)?;
        self.read_status_vector()?;
        Ok((aux_id, port))
    }

    // response plumbing

    /// Read the next operation code, discarding keep alive packets.
    pub(crate) fn next_operation(&mut self) -> Result<i32> {
        loop {
            let op = self.stream.read_i32()?;
            if op != OP_DUMMY {
                self.op = Some(op);
                return Ok(op);
            }
        }
    }

    /// Consume the operation peeked by
    /// [`next_operation`][Attachment::next_operation], or read a new one.
    pub(crate) fn read_operation(&mut self) -> Result<i32> {
        match self.op.take() {
            Some(op) => Ok(op),
            None => {
                let op = self.next_operation()?;
                self.op = None;
                Ok(op)
            }
        }
    }

    pub(crate) fn receive_response(&mut self) -> Result<Response> {
        let op = self.read_operation()?;
        if op != OP_RESPONSE {
            return Err(protocol!("expected op_response, got operation {op}").into());
        }
        let response = Response {
            object_handle: self.stream.read_i32()?,
            blob_handle: self.stream.read_i64()?,
            data: self.stream.read_buffer()?,
        };
        self.read_status_vector()?;
        Ok(response)
    }

    /// Decode the status vector trailing a response.
    ///
    /// A vector of errors becomes an `Err`. A vector of warnings goes to
    /// the warning sink and the call succeeds.
    pub(crate) fn read_status_vector(&mut self) -> Result<()> {
        let mut error = GdsError::new();

        loop {
            let arg = self.stream.read_i32()?;
            match arg {
                ISC_ARG_GDS => {
                    let code = self.stream.read_i32()?;
                    if code != 0 {
                        error.push_code(code);
                    }
                }
                ISC_ARG_END => break,
                ISC_ARG_INTERPRETED => {
                    let text = self.stream.read_string()?;
                    error.push_interpreted(text);
                }
                ISC_ARG_STRING | ISC_ARG_CSTRING | ISC_ARG_SQL_STATE => {
                    let text = self.stream.read_string()?;
                    error.push_arg(text);
                }
                ISC_ARG_NUMBER => {
                    let number = self.stream.read_i32()?;
                    error.push_arg(number.to_string());
                }
                other => {
                    let code = self.stream.read_i32()?;
                    if code != 0 {
                        if other == ISC_ARG_WARNING && error.is_empty() {
                            error.set_warning();
                        }
                        error.push_code(code);
                    }
                }
            }
        }

        if error.is_empty() {
            return Ok(());
        }
        if error.is_warning() {
            debug!("server warning: {}", error.message());
            if let Some(sink) = &mut self.warning_sink {
                sink(error);
            }
            return Ok(());
        }
        Err(error.into())
    }

    /// Release a server object: close or cancel a blob, free a handle.
    pub(crate) fn release_object(&mut self, op: i32, id: i32) -> Result<()> {
        self.stream.write_i32(op);
        self.stream.write_i32(id);
        self.stream.flush()?;
        self.receive_response()?;
        Ok(())
    }
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".into())
}

/// Options for [`DbAttachment::create_database`].
#[derive(Debug, Default, Clone)]
pub struct CreateDatabaseOptions {
    pub page_size: Option<i32>,
    pub overwrite: bool,
    pub force_write: Option<bool>,
}

/// A live database attachment, cloneable across threads.
///
/// All clones share one socket. Each protocol exchange runs under the
/// session lock, so concurrent statements serialize at packet boundary.
#[derive(Clone)]
pub struct DbAttachment {
    pub(crate) inner: Arc<Mutex<Attachment>>,
}

impl DbAttachment {
    /// Connect, negotiate the protocol and attach to the database.
    pub fn connect(params: AttachParams) -> Result<Self> {
        let mut att = Attachment::open(params)?;
        if let Err(err) = att.attach() {
            att.stream.socket().shutdown().ok();
            return Err(err);
        }
        Ok(Self { inner: Arc::new(Mutex::new(att)) })
    }

    /// Connect and create a fresh database file, attaching to it.
    pub fn create_database(
        params: AttachParams,
        options: &CreateDatabaseOptions,
    ) -> Result<Self> {
        let mut att = Attachment::open(params)?;
        if let Err(err) = att.create(options) {
            att.stream.socket().shutdown().ok();
            return Err(err);
        }
        Ok(Self { inner: Arc::new(Mutex::new(att)) })
    }

    #[cfg(test)]
    pub(crate) fn for_test(att: Attachment) -> Self {
        Self { inner: Arc::new(Mutex::new(att)) }
    }

    /// Install a callback receiving server warnings.
    pub fn on_warning(&self, sink: impl FnMut(GdsError) + Send + 'static) {
        self.inner.lock().set_warning_sink(Box::new(sink));
    }

    /// Detach from the database and close the socket.
    ///
    /// Refused while transactions are open.
    pub fn detach(&self) -> Result<()> {
        self.inner.lock().detach()
    }

    /// Drop the attached database file. The attachment is gone with it.
    pub fn drop_database(&self) -> Result<()> {
        self.inner.lock().drop_database()
    }

    /// Raw database info exchange, returning the item reply buffer.
    pub fn database_info(&self, items: &[u8], buffer_length: i32) -> Result<Bytes> {
        self.inner.lock().database_info(items, buffer_length)
    }

    /// Number of transactions currently open on this attachment.
    pub fn transaction_count(&self) -> i32 {
        self.inner.lock().transaction_count()
    }

    /// The negotiated attachment handle.
    pub fn handle(&self) -> i32 {
        self.inner.lock().handle()
    }
}

impl std::fmt::Debug for DbAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbAttachment").finish_non_exhaustive()
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.stream.socket().shutdown().ok();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::mock::MockSocket;
    use crate::testutil::{push_i32, response_with_data, test_attachment};

    #[test]
    fn dummy_packets_are_discarded() {
        let mock = MockSocket::new();
        let mut att = test_attachment(&mock);
        let mut input = Vec::new();
        push_i32(&mut input, OP_DUMMY);
        push_i32(&mut input, OP_DUMMY);
        push_i32(&mut input, OP_RESPONSE);
        mock.push_input(&input);
        assert_eq!(att.next_operation().unwrap(), OP_RESPONSE);
        // peeked operation is consumed, not read twice
        assert_eq!(att.read_operation().unwrap(), OP_RESPONSE);
    }

    #[test]
    fn response_with_error_vector() {
        let mock = MockSocket::new();
        let mut att = test_attachment(&mock);
        let mut input = Vec::new();
        push_i32(&mut input, OP_RESPONSE);
        push_i32(&mut input, 0);
        input.extend_from_slice(&0i64.to_be_bytes());
        push_i32(&mut input, 0);
        push_i32(&mut input, ISC_ARG_GDS);
        push_i32(&mut input, ISC_DSQL_SQLDA_ERR);
        push_i32(&mut input, ISC_ARG_END);
        mock.push_input(&input);

        let err = att.receive_response().unwrap_err();
        assert_eq!(err.gds_code(), Some(ISC_DSQL_SQLDA_ERR));
    }

    #[test]
    fn warning_vector_reaches_sink_and_succeeds() {
        let mock = MockSocket::new();
        let mut att = test_attachment(&mock);
        let warned = Arc::new(Mutex::new(Vec::new()));
        let sink = warned.clone();
        att.set_warning_sink(Box::new(move |w| sink.lock().push(w.code())));

        let mut input = Vec::new();
        push_i32(&mut input, ISC_ARG_WARNING);
        push_i32(&mut input, ISC_SEGSTR_EOF);
        push_i32(&mut input, ISC_ARG_END);
        mock.push_input(&input);

        att.read_status_vector().unwrap();
        assert_eq!(*warned.lock(), vec![ISC_SEGSTR_EOF]);
    }

    #[test]
    fn detach_refused_with_open_transactions() {
        let mock = MockSocket::new();
        let mut att = test_attachment(&mock);
        att.transaction_started();
        let err = att.detach().unwrap_err();
        assert_eq!(err.gds_code(), Some(ISC_OPEN_TRANS));
        // nothing reached the wire
        assert!(mock.written().is_empty());
    }

    #[test]
    fn database_info_returns_reply_buffer() {
        let mock = MockSocket::new();
        let mut att = test_attachment(&mock);

        let mut input = Vec::new();
        push_i32(&mut input, OP_RESPONSE);
        push_i32(&mut input, 0);
        input.extend_from_slice(&0i64.to_be_bytes());
        // data buffer of 3 bytes + pad
        push_i32(&mut input, 3);
        input.extend_from_slice(&[ISC_INFO_PAGE_SIZE, 0x42, ISC_INFO_END, 0]);
        push_i32(&mut input, ISC_ARG_GDS);
        push_i32(&mut input, 0);
        push_i32(&mut input, ISC_ARG_END);
        mock.push_input(&input);

        let data = att.database_info(&[ISC_INFO_PAGE_SIZE, ISC_INFO_END], 32).unwrap();
        assert_eq!(&data[..], [ISC_INFO_PAGE_SIZE, 0x42, ISC_INFO_END]);
    }

    #[test]
    fn exchanges_do_not_interleave_across_threads() {
        let mock = MockSocket::new();
        let db = DbAttachment::for_test(test_attachment(&mock));
        mock.set_read_delay(std::time::Duration::from_millis(20));
        mock.push_input(&response_with_data(0, &[ISC_INFO_END]));
        mock.push_input(&response_with_data(0, &[ISC_INFO_END]));

        let a = db.clone();
        let b = db.clone();
        let ta = std::thread::spawn(move || a.database_info(&[ISC_INFO_PAGE_SIZE], 32).unwrap());
        let tb = std::thread::spawn(move || b.database_info(&[ISC_INFO_ODS_VERSION], 32).unwrap());
        ta.join().unwrap();
        tb.join().unwrap();

        let frame = |item: u8| {
            let mut buf = Vec::new();
            push_i32(&mut buf, OP_INFO_DATABASE);
            push_i32(&mut buf, db.handle());
            push_i32(&mut buf, 0);
            push_i32(&mut buf, 1);
            buf.extend_from_slice(&[item, 0, 0, 0]);
            push_i32(&mut buf, 32);
            buf
        };
        let page = frame(ISC_INFO_PAGE_SIZE);
        let ods = frame(ISC_INFO_ODS_VERSION);
        let mut page_first = page.clone();
        page_first.extend_from_slice(&ods);
        let mut ods_first = ods;
        ods_first.extend_from_slice(&page);

        // whole frames in either order, never a byte of one inside the other
        let written = mock.written();
        assert!(written == page_first || written == ods_first);
    }
}
