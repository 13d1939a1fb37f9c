//! End-to-end tests: raw client frames in, raw reply frames out.
//!
//! Most scenarios drive [`network::handle_connection`] over an in-memory
//! duplex stream; the last one exercises the real TCP listener.

use bson::{doc, Document};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use moxy_wire::document::document_bytes;
use moxy_wire::header::{flag, HEADER_LEN};
use moxy_wire::{MsgHeader, OpCode};

use crate::config;
use crate::modules::{default_registry, ModuleChain, Pipeline};
use crate::network::handle_connection;
use crate::server::Server;

fn mockule_pipeline() -> Pipeline {
    let registry = default_registry();
    let config = doc! { "modules": [{ "name": "mockule", "config": {} }] };
    config::build_chain(&registry, &config)
        .unwrap()
        .into_pipeline()
}

fn frame(request_id: i32, op_code: OpCode, body: &[u8]) -> Vec<u8> {
    let header = MsgHeader {
        message_length: (HEADER_LEN + body.len()) as i32,
        request_id,
        response_to: 0,
        op_code: op_code.as_i32(),
    };
    let mut out = header.to_bytes().to_vec();
    out.extend_from_slice(body);
    out
}

fn op_query_frame(request_id: i32, namespace: &str, query: &Document) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0i32.to_le_bytes());
    body.extend_from_slice(namespace.as_bytes());
    body.push(0);
    body.extend_from_slice(&0i32.to_le_bytes()); // numberToSkip
    body.extend_from_slice(&1i32.to_le_bytes()); // numberToReturn
    body.extend_from_slice(&document_bytes(query).unwrap());
    frame(request_id, OpCode::Query, &body)
}

fn op_msg_frame(
    request_id: i32,
    flags: u32,
    main: &Document,
    sections: &[(&str, &[Document])],
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&flags.to_le_bytes());
    body.push(0);
    body.extend_from_slice(&document_bytes(main).unwrap());
    for (identifier, documents) in sections {
        body.push(1);
        let length_at = body.len();
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(identifier.as_bytes());
        body.push(0);
        for document in *documents {
            body.extend_from_slice(&document_bytes(document).unwrap());
        }
        let claimed = (body.len() - length_at) as u32;
        body[length_at..length_at + 4].copy_from_slice(&claimed.to_le_bytes());
    }
    frame(request_id, OpCode::Msg, &body)
}

/// Split a byte stream back into (header, body) frames.
fn parse_frames(mut bytes: &[u8]) -> Vec<(MsgHeader, Vec<u8>)> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        assert!(bytes.len() >= HEADER_LEN, "trailing garbage: {bytes:?}");
        let header = MsgHeader::parse(bytes[..HEADER_LEN].try_into().unwrap());
        let total = header.message_length as usize;
        assert!(bytes.len() >= total, "frame shorter than its length prefix");
        frames.push((header, bytes[HEADER_LEN..total].to_vec()));
        bytes = &bytes[total..];
    }
    frames
}

/// Reply document of an OP_REPLY body.
fn reply_document(body: &[u8]) -> Document {
    // flags, cursor id, starting from, number returned
    let documents_at = 4 + 8 + 4 + 4;
    Document::from_reader(&body[documents_at..]).unwrap()
}

/// Body document of a single-section OP_MSG body.
fn message_document(body: &[u8]) -> Document {
    let flags = u32::from_le_bytes(body[0..4].try_into().unwrap());
    assert_eq!(flags, 0, "replies carry no flags");
    assert_eq!(body[4], 0, "expected a single type-0 section");
    Document::from_reader(&body[5..]).unwrap()
}

/// Feed `input` to a fresh connection and collect everything it writes
/// back. Returns the raw reply bytes and the handler's verdict.
async fn run_connection(input: Vec<u8>, pipeline: Pipeline) -> (Vec<u8>, crate::Result<()>) {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let handler = tokio::spawn(handle_connection(server, pipeline));

    client.write_all(&input).await.unwrap();
    client.shutdown().await.unwrap();

    let mut replies = Vec::new();
    client.read_to_end(&mut replies).await.unwrap();
    (replies, handler.await.unwrap())
}

#[tokio::test]
async fn handshake_query_gets_one_op_reply() {
    let request = op_query_frame(41, "admin.$cmd", &doc! { "ismaster": 1 });
    let (replies, verdict) = run_connection(request, mockule_pipeline()).await;
    verdict.unwrap();

    let frames = parse_frames(&replies);
    assert_eq!(frames.len(), 1);
    let (header, body) = &frames[0];
    assert_eq!(header.op_code, OpCode::Reply.as_i32());
    assert_eq!(header.response_to, 41);
    assert_eq!(header.message_length as usize, HEADER_LEN + body.len());

    let reply = reply_document(body);
    assert_eq!(reply.get_i32("ok").unwrap(), 1);
    assert!(reply.get_bool("ismaster").unwrap());
    assert_eq!(reply.get_i32("maxWireVersion").unwrap(), 17);
    assert_eq!(reply.get_i32("minWireVersion").unwrap(), 6);
}

#[tokio::test]
async fn ping_with_auxiliary_section_gets_plain_op_msg_reply() {
    let documents = [doc! { "_id": 1 }];
    let request = op_msg_frame(7, 0, &doc! { "ping": 1 }, &[("documents", &documents)]);
    let (replies, verdict) = run_connection(request, mockule_pipeline()).await;
    verdict.unwrap();

    let frames = parse_frames(&replies);
    assert_eq!(frames.len(), 1);
    let (header, body) = &frames[0];
    assert_eq!(header.op_code, OpCode::Msg.as_i32());
    assert_eq!(header.response_to, 7);
    assert_eq!(header.message_length as usize, HEADER_LEN + body.len());

    // One type-0 section and nothing after it: no auxiliary came back.
    let reply = message_document(body);
    assert_eq!(reply, doc! { "ok": 1 });
    let section_len = body.len() - 5;
    let declared = i32::from_le_bytes(body[5..9].try_into().unwrap()) as usize;
    assert_eq!(declared, section_len);
}

#[tokio::test]
async fn forbidden_flag_closes_the_connection_without_a_reply() {
    let request = op_msg_frame(9, flag::MORE_TO_COME, &doc! { "ping": 1 }, &[]);
    let (replies, verdict) = run_connection(request, mockule_pipeline()).await;

    assert!(replies.is_empty(), "no bytes may be written: {replies:?}");
    assert!(verdict.is_err());
}

#[tokio::test]
async fn responses_come_back_in_request_order() {
    let mut input = op_msg_frame(100, 0, &doc! { "ping": 1 }, &[]);
    input.extend_from_slice(&op_msg_frame(101, 0, &doc! { "ping": 1 }, &[]));
    let (replies, verdict) = run_connection(input, mockule_pipeline()).await;
    verdict.unwrap();

    let frames = parse_frames(&replies);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].0.response_to, 100);
    assert_eq!(frames[1].0.response_to, 101);
}

#[tokio::test]
async fn empty_chain_answers_nothing_and_keeps_the_connection() {
    let pipeline = ModuleChain::new().into_pipeline();
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let handler = tokio::spawn(handle_connection(server, pipeline));

    let request = op_msg_frame(5, 0, &doc! { "ping": 1 }, &[]);
    client.write_all(&request).await.unwrap();

    // The handler keeps waiting for the next frame rather than closing.
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    assert!(!handler.is_finished());

    client.shutdown().await.unwrap();
    let mut replies = Vec::new();
    client.read_to_end(&mut replies).await.unwrap();

    assert!(replies.is_empty());
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn unknown_module_in_config_is_skipped_at_startup() {
    let registry = default_registry();
    let config = doc! {
        "modules": [
            { "name": "not-registered", "config": {} },
            { "name": "mockule", "config": {} },
        ],
    };
    let chain = config::build_chain(&registry, &config).unwrap();
    assert_eq!(chain.len(), 1);

    // The surviving chain still answers.
    let request = op_msg_frame(1, 0, &doc! { "ping": 1 }, &[]);
    let (replies, verdict) = run_connection(request, chain.into_pipeline()).await;
    verdict.unwrap();
    assert_eq!(parse_frames(&replies).len(), 1);
}

#[tokio::test]
async fn insert_flows_through_auxiliary_section_to_find() {
    let documents = [doc! { "_id": 1, "name": "a" }, doc! { "_id": 2, "name": "b" }];
    let mut input = op_msg_frame(
        1,
        0,
        &doc! { "insert": "users", "$db": "app" },
        &[("documents", &documents)],
    );
    input.extend_from_slice(&op_msg_frame(2, 0, &doc! { "find": "users", "$db": "app" }, &[]));

    let (replies, verdict) = run_connection(input, mockule_pipeline()).await;
    verdict.unwrap();

    let frames = parse_frames(&replies);
    assert_eq!(frames.len(), 2);

    let insert_reply = message_document(&frames[0].1);
    assert_eq!(insert_reply.get_i32("n").unwrap(), 2);

    let find_reply = message_document(&frames[1].1);
    let cursor = find_reply.get_document("cursor").unwrap();
    assert_eq!(cursor.get_str("ns").unwrap(), "app.users");
    assert_eq!(cursor.get_array("firstBatch").unwrap().len(), 2);
}

#[tokio::test]
async fn listener_serves_tcp_clients_until_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let server = Server::new("127.0.0.1", 0, mockule_pipeline());
    let shutdown = server.shutdown_signal();
    let serving = tokio::spawn(async move { server.serve(listener).await });

    let mut client = TcpStream::connect(address).await.unwrap();
    let request = op_query_frame(3, "admin.$cmd", &doc! { "isMaster": 1 });
    client.write_all(&request).await.unwrap();

    let mut header_bytes = [0u8; HEADER_LEN];
    client.read_exact(&mut header_bytes).await.unwrap();
    let header = MsgHeader::parse(&header_bytes);
    assert_eq!(header.response_to, 3);
    assert_eq!(header.op_code, OpCode::Reply.as_i32());

    let mut body = vec![0u8; header.body_len()];
    client.read_exact(&mut body).await.unwrap();
    assert_eq!(reply_document(&body).get_i32("ok").unwrap(), 1);

    shutdown.send(()).unwrap();
    serving.await.unwrap().unwrap();
}
