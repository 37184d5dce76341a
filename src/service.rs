//! Service manager attachment.
//!
//! Services live at a `host:service_mgr` endpoint rather than a
//! database path. Tasks are started with a service parameter buffer
//! and their output is pulled through `op_service_info`.
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::{
    Result,
    attachment::Attachment,
    common::{debug, span},
    config::AttachParams,
    gds::*,
    wire::ParamBuffer,
};

/// Actions sent to a service, a bare tag stream in SPB clump form.
pub struct ServiceRequest {
    spb: ParamBuffer,
}

impl ServiceRequest {
    pub fn new(action: u8) -> Self {
        let mut spb = ParamBuffer::bare();
        spb.append_tag(action);
        Self { spb }
    }

    pub fn database(mut self, name: &str) -> Self {
        self.spb.append_str(ISC_SPB_DBNAME, name);
        self
    }

    pub fn options(mut self, options: i32) -> Self {
        self.spb.append_i32(ISC_SPB_OPTIONS, options);
        self
    }

    pub fn verbose(mut self) -> Self {
        self.spb.append_tag(ISC_SPB_VERBOSE);
        self
    }

    pub fn argument(mut self, tag: u8, value: &str) -> Self {
        self.spb.append_str(tag, value);
        self
    }

    fn as_bytes(&self) -> &[u8] {
        self.spb.as_bytes()
    }
}

/// An attachment to the service manager.
pub struct ServiceAttachment {
    inner: Arc<Mutex<Attachment>>,
}

impl ServiceAttachment {
    /// Connect and attach to `service_mgr` on the configured host.
    pub fn connect(params: AttachParams) -> Result<Self> {
        span!("service_attach");
        let mut att = Attachment::open(params)?;

        let spb = {
            let params = att.params();
            let mut spb = ParamBuffer::bare();
            spb.append_tag(ISC_SPB_CURRENT_VERSION);
            spb.append_str(ISC_SPB_USER_NAME, &params.user);
            spb.append_str(ISC_SPB_PASSWORD, &params.pass);
            spb
        };
        let service = att.params().database.clone();

        att.stream().write_i32(OP_SERVICE_ATTACH);
        att.stream().write_i32(0);
        att.stream().write_string(&service);
        att.stream().write_typed(ISC_SPB_VERSION1, spb.as_bytes());
        att.stream().flush()?;
        let response = att.receive_response()?;
        att.set_handle(response.object_handle);
        debug!("service attached as handle {}", response.object_handle);
        Ok(Self { inner: Arc::new(Mutex::new(att)) })
    }

    #[cfg(test)]
    pub(crate) fn for_test(att: Attachment) -> Self {
        Self { inner: Arc::new(Mutex::new(att)) }
    }

    /// Start a service task, a backup or restore for instance.
    pub fn start(&self, request: &ServiceRequest) -> Result<()> {
        let mut att = self.inner.lock();
        let handle = att.handle();
        att.stream().write_i32(OP_SERVICE_START);
        att.stream().write_i32(handle);
        att.stream().write_i32(0); // incarnation
        att.stream().write_buffer(request.as_bytes());
        att.stream().flush()?;
        att.receive_response()?;
        Ok(())
    }

    /// Query the running task or the server, returning the raw item
    /// reply buffer.
    pub fn query(&self, items: &[u8], buffer_length: i32) -> Result<Bytes> {
        let mut att = self.inner.lock();
        let handle = att.handle();
        att.stream().write_i32(OP_SERVICE_INFO);
        att.stream().write_i32(handle);
        att.stream().write_i32(0); // incarnation
        att.stream().write_buffer(&[]); // send items
        att.stream().write_buffer(items);
        att.stream().write_i32(buffer_length);
        att.stream().flush()?;
        Ok(att.receive_response()?.data)
    }

    /// One line of task output, `None` when the task is done.
    ///
    /// Empty lines inside the output come back as `Some("")`, the end
    /// of output is a reply without a line item.
    pub fn next_line(&self) -> Result<Option<String>> {
        let data = self.query(&[ISC_INFO_SVC_LINE], MAX_BUFFER_SIZE)?;
        if data.first() != Some(&ISC_INFO_SVC_LINE) || data.len() < 3 {
            return Ok(None);
        }
        let len = crate::wire::vax_integer(&data, 1, 2) as usize;
        if len == 0 {
            return Ok(None);
        }
        let end = (3 + len).min(data.len());
        Ok(Some(String::from_utf8_lossy(&data[3..end]).into_owned()))
    }

    /// Detach from the service manager and close the socket.
    pub fn detach(&self) -> Result<()> {
        let mut att = self.inner.lock();
        let handle = att.handle();
        att.stream().write_i32(OP_SERVICE_DETACH);
        att.stream().write_i32(handle);
        att.stream().flush()?;
        att.receive_response()?;
        att.shutdown();
        Ok(())
    }
}

impl std::fmt::Debug for ServiceAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAttachment").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::mock::MockSocket;
    use crate::testutil::*;

    fn test_service(mock: &MockSocket) -> ServiceAttachment {
        ServiceAttachment::for_test(test_attachment(mock))
    }

    #[test]
    fn start_writes_the_request_buffer() {
        let mock = MockSocket::new();
        let service = test_service(&mock);
        mock.push_input(&ok_response(0));

        let request = ServiceRequest::new(ISC_SPB_VERBOSE).database("employee.fdb");
        service.start(&request).unwrap();

        let written = mock.written();
        assert_eq!(&written[..4], OP_SERVICE_START.to_be_bytes());
        // the database name travels inside the spb clump
        assert!(written.windows(12).any(|w| w == &b"employee.fdb"[..]));
    }

    #[test]
    fn query_returns_reply_buffer() {
        let mock = MockSocket::new();
        let service = test_service(&mock);

        let mut reply = vec![ISC_INFO_SVC_SERVER_VERSION];
        reply.extend_from_slice(&4u16.to_le_bytes());
        reply.extend_from_slice(b"WI-V");
        reply.push(ISC_INFO_END);
        mock.push_input(&response_with_data(0, &reply));

        let data = service.query(&[ISC_INFO_SVC_SERVER_VERSION], 64).unwrap();
        assert_eq!(data[0], ISC_INFO_SVC_SERVER_VERSION);
    }

    #[test]
    fn line_output_until_exhausted() {
        let mock = MockSocket::new();
        let service = test_service(&mock);

        let mut reply = vec![ISC_INFO_SVC_LINE];
        reply.extend_from_slice(&5u16.to_le_bytes());
        reply.extend_from_slice(b"gbak:");
        reply.push(ISC_INFO_END);
        mock.push_input(&response_with_data(0, &reply));
        assert_eq!(service.next_line().unwrap().as_deref(), Some("gbak:"));

        let empty = vec![ISC_INFO_SVC_LINE, 0, 0, ISC_INFO_END];
        mock.push_input(&response_with_data(0, &empty));
        assert_eq!(service.next_line().unwrap(), None);
    }
}
