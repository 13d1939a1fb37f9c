//! Responses modules produce, and the write-once sink they go into.

use bson::Document;

use crate::request::Message;

/// What a module writes back for one request.
///
/// `Command` responses go out as `OP_REPLY` with `ok: 1` merged into the
/// reply document; `Message` responses go out as `OP_MSG`.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Command(CommandResponse),
    Message(Message),
}

/// Reply to a generic command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandResponse {
    pub reply: Document,
    /// Extra documents appended after the reply document.
    pub documents: Vec<Document>,
}

/// One-shot slot a pipeline invocation writes its response into.
///
/// The first write wins; later writes are ignored. An untouched sink
/// means the request expects no reply.
#[derive(Debug, Default)]
pub struct ResponseSink {
    slot: Option<Response>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit a response. A no-op if one is already present.
    pub fn write(&mut self, response: Response) {
        if self.slot.is_none() {
            self.slot = Some(response);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    pub fn into_response(self) -> Option<Response> {
        self.slot
    }
}
