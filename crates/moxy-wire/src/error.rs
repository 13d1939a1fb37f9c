//! Error definitions for the wire codec.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WireError>;

/// Errors produced while decoding or encoding wire-protocol frames.
///
/// `ConnectionClosed` is the one benign variant: the peer hung up between
/// frames. Everything else loses the frame boundary and forces the
/// connection down.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated header: read {0} of 16 bytes")]
    TruncatedHeader(usize),

    #[error("message length {0} not long enough for a header")]
    InvalidMessageLength(i32),

    #[error("message of {0} bytes exceeds the size limit")]
    OversizedMessage(i32),

    #[error("unsupported opcode: {0}")]
    UnsupportedOpCode(i32),

    #[error("too few bytes left in frame: needed {needed}, found {remaining}")]
    Truncated { needed: usize, remaining: usize },

    #[error("document claims {claimed} bytes; only {remaining} available")]
    DocumentOverrun { claimed: i32, remaining: usize },

    #[error("malformed document: {0}")]
    DocumentParse(#[from] bson::de::Error),

    #[error("failed to marshal document: {0}")]
    DocumentEncode(#[from] bson::ser::Error),

    #[error("malformed string: no terminating NUL")]
    UnterminatedString,

    #[error("invalid UTF-8 in string: {0}")]
    InvalidString(#[from] std::str::Utf8Error),

    #[error("{0} flag given but is forbidden")]
    ForbiddenFlag(&'static str),

    #[error("unknown section type: {0}")]
    UnknownSection(u8),

    #[error("more than one main section in message body")]
    DuplicateBodySection,

    #[error("no main section in message body")]
    MissingBodySection,

    #[error("duplicate auxiliary section identifier: {0:?}")]
    DuplicateAuxiliary(String),

    #[error("section claims {claimed} bytes; only {remaining} left")]
    SectionOverrun { claimed: usize, remaining: usize },

    #[error("query is only for the \"$cmd\" collection, not {0:?}")]
    QueryCollection(String),

    #[error("query forbids the {0:?} command")]
    QueryCommand(String),

    #[error("not a namespace: {0:?}")]
    Namespace(String),
}
