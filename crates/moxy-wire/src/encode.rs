//! Response and request frame encoders.
//!
//! Frames are assembled with a zeroed `message_length` and back-patched
//! once the full buffer is known. Response headers mirror the triggering
//! request's `request_id` into `response_to` and mint a fresh
//! `request_id` from a process-wide counter.

use std::sync::atomic::{AtomicI32, Ordering};

use bson::Document;
use bytes::{BufMut, Bytes, BytesMut};

use crate::document;
use crate::error::Result;
use crate::header::{MsgHeader, OpCode};
use crate::request::Message;
use crate::response::{CommandResponse, Response};

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// `OP_REPLY` response flags: only the AwaitCapable bit.
const REPLY_FLAGS: i32 = 8;

fn next_request_id() -> i32 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Encode a response against the header of the request that triggered it.
pub fn encode(request_header: &MsgHeader, response: &Response) -> Result<Bytes> {
    match response {
        Response::Command(command) => encode_reply(request_header, command),
        Response::Message(message) => encode_message(request_header, message),
    }
}

fn response_header(request_header: &MsgHeader, op_code: OpCode) -> MsgHeader {
    MsgHeader {
        message_length: 0, // back-patched once the frame is assembled
        request_id: next_request_id(),
        response_to: request_header.request_id,
        op_code: op_code.as_i32(),
    }
}

fn encode_reply(request_header: &MsgHeader, response: &CommandResponse) -> Result<Bytes> {
    let header = response_header(request_header, OpCode::Reply);

    let mut frame = BytesMut::new();
    frame.put_slice(&header.to_bytes());
    frame.put_i32_le(REPLY_FLAGS);
    frame.put_i64_le(0); // cursor id
    frame.put_i32_le(0); // starting from
    frame.put_i32_le(1 + response.documents.len() as i32);

    // The reply always reports success; a client-supplied "ok" loses.
    let mut reply = response.reply.clone();
    reply.insert("ok", 1i32);
    frame.put_slice(&document::document_bytes(&reply)?);

    for doc in &response.documents {
        frame.put_slice(&document::document_bytes(doc)?);
    }

    Ok(patch_length(frame))
}

fn encode_message(request_header: &MsgHeader, message: &Message) -> Result<Bytes> {
    let header = response_header(request_header, OpCode::Msg);

    let mut frame = BytesMut::new();
    frame.put_slice(&header.to_bytes());
    frame.put_u32_le(0); // no flags, no checksum
    put_sections(&mut frame, message)?;

    Ok(patch_length(frame))
}

/// Encode a standalone `OP_MSG` request frame carrying `body`, for
/// talking to a compatible store directly. Returns the frame and its
/// `request_id` so the caller can match the reply.
pub fn encode_command_message(body: &Document) -> Result<(Bytes, i32)> {
    let request_id = next_request_id();
    let header = MsgHeader {
        message_length: 0,
        request_id,
        response_to: 0,
        op_code: OpCode::Msg.as_i32(),
    };

    let mut frame = BytesMut::new();
    frame.put_slice(&header.to_bytes());
    frame.put_u32_le(0);
    frame.put_u8(0);
    frame.put_slice(&document::document_bytes(body)?);

    Ok((patch_length(frame), request_id))
}

/// One type-0 section with the body, then one type-1 section per
/// auxiliary identifier.
fn put_sections(frame: &mut BytesMut, message: &Message) -> Result<()> {
    frame.put_u8(0);
    frame.put_slice(&document::document_bytes(&message.body)?);

    for (identifier, documents) in &message.auxiliary {
        frame.put_u8(1);
        let length_at = frame.len();
        frame.put_u32_le(0); // section length, patched below
        frame.put_slice(identifier.as_bytes());
        frame.put_u8(0);
        for doc in documents {
            frame.put_slice(&document::document_bytes(doc)?);
        }
        // Inclusive of the length field itself.
        let section_len = (frame.len() - length_at) as u32;
        frame[length_at..length_at + 4].copy_from_slice(&section_len.to_le_bytes());
    }
    Ok(())
}

fn patch_length(mut frame: BytesMut) -> Bytes {
    let total = frame.len() as i32;
    frame[0..4].copy_from_slice(&total.to_le_bytes());
    frame.freeze()
}
