//! Narrow interface over the BSON document codec.
//!
//! The framing layer only ever needs three operations: parse one
//! length-prefixed document from the front of a byte slice, marshal a
//! document back to bytes, and read the self-declared length prefix
//! without a full parse. Keeping them here keeps the decoder agnostic to
//! the document library's internals.

use bson::Document;

use crate::error::{Result, WireError};

/// Smallest possible encoded document: length prefix plus terminator.
const MIN_DOCUMENT_LEN: i32 = 5;

/// Read the self-declared length prefix of the document at the front of
/// `buf`, validating it against the bytes actually present.
pub fn peek_len(buf: &[u8]) -> Result<usize> {
    if buf.len() < 4 {
        return Err(WireError::Truncated { needed: 4, remaining: buf.len() });
    }
    let claimed = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if claimed < MIN_DOCUMENT_LEN || claimed as usize > buf.len() {
        return Err(WireError::DocumentOverrun { claimed, remaining: buf.len() });
    }
    Ok(claimed as usize)
}

/// Parse one document from the front of `buf`, returning it along with
/// the number of bytes it occupied.
pub fn read_document(buf: &[u8]) -> Result<(Document, usize)> {
    let len = peek_len(buf)?;
    let document = Document::from_reader(&buf[..len])?;
    Ok((document, len))
}

/// Marshal a document to its wire bytes.
pub fn document_bytes(document: &Document) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    document.to_writer(&mut out)?;
    Ok(out)
}
