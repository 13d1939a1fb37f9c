//! Decoded requests handed to the module pipeline.

use std::collections::BTreeMap;

use bson::{Bson, Document};

/// Auxiliary payload sections of a message, keyed by their identifier.
pub type Auxiliary = BTreeMap<String, Vec<Document>>;

/// A decoded client request.
///
/// A closed sum so modules can pattern-match instead of downcasting:
/// `Command` comes from the `OP_QUERY` handshake path, `Message` from
/// `OP_MSG`.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Command(Command),
    Message(Message),
}

impl Request {
    /// `request_id` of the frame this request arrived in.
    pub fn request_id(&self) -> i32 {
        match self {
            Request::Command(command) => command.request_id,
            Request::Message(message) => message.request_id,
        }
    }
}

/// A generic command, carried by `OP_QUERY` against the `$cmd`
/// pseudo-collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub request_id: i32,
    /// Name of the command: the first field of the query document.
    pub name: String,
    pub database: String,
    /// Every field of the query document, command field included; some
    /// commands attach a meaningful argument to the command field itself.
    pub args: Document,
    pub metadata: Document,
    pub documents: Vec<Document>,
}

impl Command {
    /// Look up a command argument by name.
    pub fn arg(&self, name: &str) -> Option<&Bson> {
        self.args.get(name)
    }
}

/// An `OP_MSG` request: one body document plus zero or more identified
/// auxiliary document sequences.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub request_id: i32,
    pub flag_bits: u32,
    pub body: Document,
    pub auxiliary: Auxiliary,
}

impl Message {
    /// Name of the command the body carries (its first field), if any.
    pub fn command_name(&self) -> Option<&str> {
        self.body.keys().next().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn command_argument_lookup() {
        let command = Command {
            request_id: 4,
            name: "ismaster".into(),
            database: "admin".into(),
            args: doc! { "ismaster": 1, "client": { "driver": "x" } },
            metadata: Document::new(),
            documents: Vec::new(),
        };
        assert_eq!(command.arg("ismaster"), Some(&Bson::Int32(1)));
        assert_eq!(command.arg("missing"), None);
    }

    #[test]
    fn message_command_name_is_first_body_field() {
        let message = Message {
            body: doc! { "insert": "users", "$db": "test" },
            ..Message::default()
        };
        assert_eq!(message.command_name(), Some("insert"));
        assert_eq!(Message::default().command_name(), None);
    }
}
