//! Wire-protocol framing for the moxy proxy.
//!
//! This crate speaks the subset of the MongoDB wire protocol the proxy
//! accepts from clients: `OP_QUERY` as a handshake carrier and `OP_MSG`
//! for everything else, replied to with `OP_REPLY` and `OP_MSG`
//! respectively. It is consumed by the server crate and by anything that
//! needs to talk to a compatible store directly.
//!
//! Modules:
//! * `error`: decode/encode error types.
//! * `header`: the fixed 16-byte message header and opcode constants.
//! * `document`: the narrow interface over the BSON document codec.
//! * `request`: decoded requests handed to the module pipeline.
//! * `response`: responses modules produce, and the write-once sink.
//! * `decode`: streaming frame decoder.
//! * `encode`: response and request frame encoders.

pub mod decode;
pub mod document;
pub mod encode;
pub mod error;
pub mod header;
pub mod request;
pub mod response;

pub use decode::{decode, split_namespace};
pub use encode::{encode, encode_command_message};
pub use error::{Result, WireError};
pub use header::{MsgHeader, OpCode};
pub use request::{Auxiliary, Command, Message, Request};
pub use response::{CommandResponse, Response, ResponseSink};
