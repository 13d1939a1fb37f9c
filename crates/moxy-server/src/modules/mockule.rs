//! Mock backend module.
//!
//! Answers handshakes with canned-but-valid replies, stores inserts in
//! memory, and serves finds back out of the same store, all without
//! touching a real database. Anything it does not recognize falls
//! through to the next module in the chain.

use std::collections::HashMap;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use parking_lot::Mutex;

use moxy_wire::{Command, CommandResponse, Message, Request, Response, ResponseSink};

use crate::error::{ProxyError, Result};

use super::{Module, Next};

const MIN_WIRE_VERSION: i32 = 6;
const MAX_WIRE_VERSION: i32 = 17;

/// In-memory mock backend: the string keys are collections, each holding
/// the documents inserted into it.
#[derive(Default)]
pub struct Mockule {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    /// Extra fields merged into the handshake reply.
    greeting: Document,
}

impl Mockule {
    fn handshake_reply(&self) -> Document {
        let mut reply = doc! {
            "ismaster": true,
            "secondary": false,
            "localTime": bson::DateTime::now(),
            "maxWireVersion": MAX_WIRE_VERSION,
            "minWireVersion": MIN_WIRE_VERSION,
            "maxWriteBatchSize": 1000,
            "maxBsonObjectSize": 16_777_216,
            "maxMessageSizeBytes": 48_000_000,
        };
        for (key, value) in &self.greeting {
            reply.insert(key.clone(), value.clone());
        }
        reply
    }

    fn handle_command(&self, command: &Command, sink: &mut ResponseSink) -> bool {
        match command.name.as_str() {
            "ismaster" | "isMaster" => {
                sink.write(Response::Command(CommandResponse {
                    reply: self.handshake_reply(),
                    documents: Vec::new(),
                }));
                true
            }
            other => {
                tracing::debug!(command = other, "unrecognized query command");
                false
            }
        }
    }

    fn handle_message(&self, message: &Message, sink: &mut ResponseSink) -> bool {
        let Some(command) = message.command_name() else {
            return false;
        };

        let reply = match command {
            "ping" => doc! { "ok": 1 },
            "ismaster" | "isMaster" | "hello" => {
                let mut reply = self.handshake_reply();
                reply.insert("ok", 1i32);
                reply
            }
            "insert" => match self.insert(message) {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!("insert failed: {e}");
                    return false;
                }
            },
            "find" => match self.find(message) {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!("find failed: {e}");
                    return false;
                }
            },
            other => {
                tracing::debug!(command = other, "unrecognized message command");
                return false;
            }
        };

        sink.write(Response::Message(Message {
            body: reply,
            ..Message::default()
        }));
        true
    }

    /// Store the request's documents, taken from the body's `documents`
    /// array or the auxiliary section of the same name.
    fn insert(&self, message: &Message) -> Result<Document> {
        let collection = message
            .body
            .get_str("insert")
            .map_err(|_| ProxyError::Module("insert: missing collection name".into()))?;

        let mut documents: Vec<Document> = Vec::new();
        if let Ok(inline) = message.body.get_array("documents") {
            for value in inline {
                match value {
                    Bson::Document(doc) => documents.push(doc.clone()),
                    other => {
                        return Err(ProxyError::Module(format!(
                            "insert: document must be an object, not {other:?}"
                        )))
                    }
                }
            }
        }
        if let Some(section) = message.auxiliary.get("documents") {
            documents.extend(section.iter().cloned());
        }

        let inserted = documents.len() as i32;
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .extend(documents);

        Ok(doc! { "n": inserted, "ok": 1 })
    }

    /// Serve everything inserted into the collection as a single batch.
    fn find(&self, message: &Message) -> Result<Document> {
        let collection = message
            .body
            .get_str("find")
            .map_err(|_| ProxyError::Module("find: missing collection name".into()))?;
        let database = message.body.get_str("$db").unwrap_or("test");

        let batch: Vec<Document> = self
            .collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default();

        Ok(doc! {
            "cursor": {
                "id": 0i64,
                "ns": format!("{database}.{collection}"),
                "firstBatch": batch,
            },
            "ok": 1,
        })
    }
}

#[async_trait]
impl Module for Mockule {
    fn name(&self) -> &'static str {
        "mockule"
    }

    fn create(&self) -> Box<dyn Module> {
        Box::new(Mockule::default())
    }

    fn configure(&mut self, options: Document) -> Result<()> {
        if let Some(value) = options.get("greeting") {
            match value {
                Bson::Document(fields) => self.greeting = fields.clone(),
                other => {
                    return Err(ProxyError::Config(format!(
                        "mockule: \"greeting\" must be a document, not {other:?}"
                    )))
                }
            }
        }
        Ok(())
    }

    async fn process(&self, request: &Request, sink: &mut ResponseSink, next: Next<'_>) {
        let handled = match request {
            Request::Command(command) => self.handle_command(command, sink),
            Request::Message(message) => self.handle_message(message, sink),
        };
        if !handled {
            next.run(request, sink).await;
        }
    }
}
