//! Streaming frame decoder.
//!
//! Reads one length-prefixed message off a stream, classifies it by
//! opcode, and parses the opcode-specific body into a [`Request`]. Any
//! failure past the header leaves the stream without a usable frame
//! boundary, so callers must close the connection on error.

use bson::Document;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::document;
use crate::error::{Result, WireError};
use crate::header::{flag, MsgHeader, OpCode, HEADER_LEN, MAX_MESSAGE_SIZE};
use crate::request::{Auxiliary, Command, Message, Request};

/// Commands `OP_QUERY` may still carry; everything else arrives as
/// `OP_MSG` on modern drivers.
const ALLOWED_QUERY_COMMANDS: [&str; 2] = ["ismaster", "isMaster"];

const CMD_COLLECTION: &str = "$cmd";

/// Decode one wire message from `reader`.
///
/// Returns the request together with the header it arrived under, so the
/// response encoder can mirror `request_id` into `response_to`. A clean
/// end-of-stream between frames surfaces as [`WireError::ConnectionClosed`].
pub async fn decode<R>(reader: &mut R) -> Result<(Request, MsgHeader)>
where
    R: AsyncRead + Unpin,
{
    let header = read_header(reader).await?;

    let op_code = OpCode::from_i32(header.op_code)
        .ok_or(WireError::UnsupportedOpCode(header.op_code))?;

    let mut body = vec![0u8; header.body_len()];
    reader.read_exact(&mut body).await?;

    let request = match op_code {
        OpCode::Query => decode_op_query(&body, &header)?,
        OpCode::Msg => decode_op_msg(&body, &header)?,
        OpCode::Reply => return Err(WireError::UnsupportedOpCode(header.op_code)),
    };

    Ok((request, header))
}

/// Read the 16-byte header, looping over short reads.
///
/// A zero-length first read is a clean end-of-stream; running dry
/// mid-header is a truncation error.
async fn read_header<R>(reader: &mut R) -> Result<MsgHeader>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut bytes[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(WireError::ConnectionClosed);
            }
            return Err(WireError::TruncatedHeader(filled));
        }
        filled += n;
    }

    let header = MsgHeader::parse(&bytes);
    if header.message_length <= 15 {
        return Err(WireError::InvalidMessageLength(header.message_length));
    }
    if header.message_length > MAX_MESSAGE_SIZE {
        return Err(WireError::OversizedMessage(header.message_length));
    }
    Ok(header)
}

/// Split a `database.collection` namespace, rejecting empty parts.
pub fn split_namespace(namespace: &str) -> Result<(&str, &str)> {
    let (database, collection) = namespace
        .split_once('.')
        .ok_or_else(|| WireError::Namespace(namespace.to_string()))?;
    if database.is_empty() || collection.is_empty() {
        return Err(WireError::Namespace(namespace.to_string()));
    }
    Ok((database, collection))
}

/// Read a NUL-terminated string from the front of `buf`, returning it
/// with the number of bytes consumed (terminator included).
fn read_cstring(buf: &[u8]) -> Result<(&str, usize)> {
    let nul_at = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(WireError::UnterminatedString)?;
    let s = std::str::from_utf8(&buf[..nul_at])?;
    Ok((s, nul_at + 1))
}

fn decode_op_query(body: &[u8], header: &MsgHeader) -> Result<Request> {
    // 4 flag bytes we have no use for.
    if body.len() < 4 {
        return Err(WireError::Truncated { needed: 4, remaining: body.len() });
    }
    let (namespace, namespace_len) = read_cstring(&body[4..])?;

    let (database, collection) = split_namespace(namespace)?;
    if collection != CMD_COLLECTION {
        return Err(WireError::QueryCollection(collection.to_string()));
    }

    // Flags, namespace with its NUL, numberToSkip, numberToReturn.
    let document_at = 4 + namespace_len + 8;
    if body.len() < document_at {
        return Err(WireError::Truncated { needed: document_at, remaining: body.len() });
    }
    let (query, _) = document::read_document(&body[document_at..])?;

    let name = query
        .keys()
        .next()
        .cloned()
        .ok_or_else(|| WireError::QueryCommand(String::new()))?;
    if !ALLOWED_QUERY_COMMANDS.contains(&name.as_str()) {
        return Err(WireError::QueryCommand(name));
    }

    Ok(Request::Command(Command {
        request_id: header.request_id,
        name,
        database: database.to_string(),
        args: query,
        metadata: Document::new(),
        documents: Vec::new(),
    }))
}

fn decode_op_msg(body: &[u8], header: &MsgHeader) -> Result<Request> {
    if body.len() < 4 {
        return Err(WireError::Truncated { needed: 4, remaining: body.len() });
    }
    let flags = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);

    if flags & flag::EXHAUST_ALLOWED != 0 {
        return Err(WireError::ForbiddenFlag("exhaustAllowed"));
    }
    if flags & flag::MORE_TO_COME != 0 {
        return Err(WireError::ForbiddenFlag("moreToCome"));
    }

    let mut cursor = 4usize;
    let mut main: Option<Document> = None;
    let mut auxiliary = Auxiliary::new();

    while cursor < body.len() {
        if body.len() - cursor == 4 && flags & flag::CHECKSUM_PRESENT != 0 {
            // Trailing CRC-32C. Skipped unverified.
            tracing::debug!("checksum present; skipping verification");
            break;
        }

        let kind = body[cursor];
        cursor += 1;

        match kind {
            0 => {
                if main.is_some() {
                    return Err(WireError::DuplicateBodySection);
                }
                let (doc, len) = document::read_document(&body[cursor..])?;
                main = Some(doc);
                cursor += len;
            }
            1 => {
                let remaining = body.len() - cursor;
                if remaining < 4 {
                    return Err(WireError::Truncated { needed: 4, remaining });
                }
                let claimed = u32::from_le_bytes([
                    body[cursor],
                    body[cursor + 1],
                    body[cursor + 2],
                    body[cursor + 3],
                ]) as usize;
                // The length is inclusive of its own four bytes.
                if claimed < 4 || claimed > remaining {
                    return Err(WireError::SectionOverrun { claimed, remaining });
                }
                let section_end = cursor + claimed;

                let mut section_cursor = cursor + 4;
                let (identifier, identifier_len) =
                    read_cstring(&body[section_cursor..section_end])?;
                section_cursor += identifier_len;

                if auxiliary.contains_key(identifier) {
                    return Err(WireError::DuplicateAuxiliary(identifier.to_string()));
                }

                let mut documents = Vec::new();
                while section_cursor < section_end {
                    let (doc, len) =
                        document::read_document(&body[section_cursor..section_end])?;
                    documents.push(doc);
                    section_cursor += len;
                }

                auxiliary.insert(identifier.to_string(), documents);
                cursor = section_end;
            }
            other => return Err(WireError::UnknownSection(other)),
        }
    }

    let body_document = main.ok_or(WireError::MissingBodySection)?;

    Ok(Request::Message(Message {
        request_id: header.request_id,
        flag_bits: flags,
        body: body_document,
        auxiliary,
    }))
}
