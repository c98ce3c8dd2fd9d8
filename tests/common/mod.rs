//! Common test utilities for stream server tests
//!
//! Provides shared helper functions for:
//! - Building servers with registered in-memory databases
//! - Sending requests and collecting responses by sequence id

#![allow(dead_code)]

use docstream::{
    DocStream, MemoryDatabase, RequestFrame, ResponseFrame, ServerOptions, StreamServer,
    WrapperFunctions,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

/// How long a test waits for a response before failing
pub const RESPONSE_WAIT: Duration = Duration::from_secs(5);

/// Server with `db1` and `db2` registered
pub fn create_test_server(wrappers: WrapperFunctions) -> StreamServer {
    create_server_with_options(ServerOptions {
        wrapper_functions: wrappers,
        ..Default::default()
    })
}

pub fn create_server_with_options(options: ServerOptions) -> StreamServer {
    let server = StreamServer::new(options).expect("Failed to create server");
    server.dbs().add("db1", MemoryDatabase::handle("db1"));
    server.dbs().add("db2", MemoryDatabase::handle("db2"));
    server
}

pub fn two_docs() -> Value {
    json!({"docs": [{"_id": "doc1"}, {"_id": "doc2"}]})
}

pub async fn send(stream: &DocStream, seq: i64, database: &str, method: &str, args: Value) {
    let args = match args {
        Value::Array(args) => args,
        other => panic!("args must be an array, got {}", other),
    };
    stream
        .send(RequestFrame::new(seq, database, method, args))
        .await
        .expect("stream closed");
}

pub async fn next_response(stream: &mut DocStream) -> ResponseFrame {
    tokio::time::timeout(RESPONSE_WAIT, stream.recv())
        .await
        .expect("timed out waiting for a response")
        .expect("stream ended")
}

/// Send one request and wait for its response
pub async fn call(
    stream: &mut DocStream,
    seq: i64,
    database: &str,
    method: &str,
    args: Value,
) -> ResponseFrame {
    send(stream, seq, database, method, args).await;
    let response = next_response(stream).await;
    assert_eq!(response.seq, seq);
    response
}

/// Wait for `count` responses, keyed by sequence id
pub async fn collect_responses(stream: &mut DocStream, count: usize) -> HashMap<i64, ResponseFrame> {
    let mut responses = HashMap::new();
    for _ in 0..count {
        let response = next_response(stream).await;
        assert!(
            responses.insert(response.seq, response).is_none(),
            "duplicate response"
        );
    }
    responses
}
