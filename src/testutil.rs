//! Shared helpers for protocol tests against the scripted socket.
use crate::{
    attachment::{Attachment, DbAttachment},
    config::AttachParams,
    gds::*,
    net::{Socket, mock::MockSocket},
};

pub(crate) fn push_i32(out: &mut Vec<u8>, val: i32) {
    out.extend_from_slice(&val.to_be_bytes());
}

pub(crate) fn push_i64(out: &mut Vec<u8>, val: i64) {
    out.extend_from_slice(&val.to_be_bytes());
}

/// Length prefixed, padded buffer as the wire carries it.
pub(crate) fn push_buffer(out: &mut Vec<u8>, data: &[u8]) {
    push_i32(out, data.len() as i32);
    out.extend_from_slice(data);
    out.extend_from_slice(&[0, 0, 0][..(4usize.wrapping_sub(data.len())) & 3]);
}

pub(crate) fn push_clean_status(out: &mut Vec<u8>) {
    push_i32(out, ISC_ARG_GDS);
    push_i32(out, 0);
    push_i32(out, ISC_ARG_END);
}

/// op_response with a handle, an optional blob id and data buffer, and a
/// clean status vector.
pub(crate) fn push_response(out: &mut Vec<u8>, handle: i32, blob: i64, data: &[u8]) {
    push_i32(out, OP_RESPONSE);
    push_i32(out, handle);
    push_i64(out, blob);
    push_buffer(out, data);
    push_clean_status(out);
}

pub(crate) fn ok_response(handle: i32) -> Vec<u8> {
    let mut out = Vec::new();
    push_response(&mut out, handle, 0, &[]);
    out
}

pub(crate) fn response_with_data(handle: i32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    push_response(&mut out, handle, 0, data);
    out
}

pub(crate) fn test_params() -> AttachParams {
    AttachParams::parse("user=u;password=p;database=test.fdb").unwrap()
}

pub(crate) fn test_attachment(mock: &MockSocket) -> Attachment {
    Attachment::for_test(Socket::Mock(mock.clone()), test_params())
}

pub(crate) fn test_db(mock: &MockSocket) -> DbAttachment {
    DbAttachment::for_test(test_attachment(mock))
}
