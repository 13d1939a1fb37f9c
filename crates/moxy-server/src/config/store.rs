//! Configuration fetched from a foreign document store.
//!
//! Speaks the same wire protocol the proxy serves: one `find` with
//! `limit: 1` against the configured namespace, newest document first.
//! If the collection holds several configuration documents, the latest
//! one wins.

use bson::{doc, Bson, Document};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use moxy_wire::{decode, encode_command_message, split_namespace, Request};

use crate::error::{ProxyError, Result};

/// Fetch the configuration document stored in `namespace`
/// (`database.collection`) at the store behind `uri`.
pub async fn fetch(uri: &str, namespace: &str) -> Result<Document> {
    let (database, collection) = split_namespace(namespace)
        .map_err(|e| ProxyError::Config(format!("invalid namespace {namespace:?}: {e}")))?;

    let address = host_port_from_uri(uri)?;
    let mut stream = TcpStream::connect(&address)
        .await
        .map_err(|e| ProxyError::Config(format!("error connecting to {address}: {e}")))?;

    let command = doc! {
        "find": collection,
        "$db": database,
        "sort": { "$natural": -1 },
        "limit": 1,
    };
    let (frame, request_id) = encode_command_message(&command)?;
    stream.write_all(&frame).await?;

    let (reply, header) = decode(&mut stream)
        .await
        .map_err(|e| ProxyError::Config(format!("error reading store reply: {e}")))?;
    if header.response_to != request_id {
        return Err(ProxyError::Config(format!(
            "store reply answers request {} instead of {request_id}",
            header.response_to
        )));
    }

    let Request::Message(message) = reply else {
        return Err(ProxyError::Config("store reply was not a message".into()));
    };
    if let Ok(errmsg) = message.body.get_str("errmsg") {
        return Err(ProxyError::Config(format!(
            "store rejected the query: {errmsg}"
        )));
    }

    first_batch_document(&message.body).ok_or_else(|| {
        ProxyError::Config(format!("no configuration document found in {namespace}"))
    })
}

/// First document of the reply's `cursor.firstBatch`, if any.
fn first_batch_document(body: &Document) -> Option<Document> {
    let cursor = body.get_document("cursor").ok()?;
    let batch = cursor.get_array("firstBatch").ok()?;
    match batch.first()? {
        Bson::Document(document) => Some(document.clone()),
        _ => None,
    }
}

/// Extract `host:port` from a `mongodb://` URI, defaulting the port.
fn host_port_from_uri(uri: &str) -> Result<String> {
    let rest = uri.strip_prefix("mongodb://").unwrap_or(uri);
    let host = rest.split('/').next().unwrap_or(rest);
    if host.is_empty() {
        return Err(ProxyError::Config(format!("invalid store URI: {uri:?}")));
    }
    Ok(if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:27017")
    })
}
