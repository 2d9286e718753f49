//! Tests for Engine
//!
//! These tests verify:
//! - Key-value commands and their CAS rules
//! - Item locks, touch and random sampling
//! - Quiet opcode suppression
//! - Single-path sub-document commands and doc/path flags
//! - Multi-path lookups and mutations
//!
//! Requests go through a real [`Connection`] so replies are checked as the
//! bytes a client would read.

use std::thread;
use std::time::Duration;

use kvmock::network::Connection;
use kvmock::protocol::codec::{arithmetic_extras, store_extras, subdoc_request};
use kvmock::protocol::{decode_response, Opcode, Request, Response, Status, DATATYPE_JSON};
use kvmock::subdoc::{SubdocOp, DOC_FLAG_ADD, DOC_FLAG_MKDOC, PATH_FLAG_MKDIR_P, PATH_FLAG_XATTR};
use kvmock::Engine;
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn call_all(engine: &Engine, requests: Vec<Request>) -> (Vec<Response>, Connection) {
    let mut conn = Connection::new("test", 1024 * 1024);
    let mut stream = Vec::new();
    for request in requests {
        stream.extend(request.encode());
    }
    conn.feed(&stream, engine).unwrap();

    let mut out = Vec::new();
    while let Some(head) = conn.current_output_target() {
        let chunk = head.to_vec();
        conn.consume_output(chunk.len()).unwrap();
        out.extend(chunk);
    }

    let mut responses = Vec::new();
    let mut bytes = &out[..];
    while !bytes.is_empty() {
        let (response, used) = decode_response(bytes).unwrap();
        responses.push(response);
        bytes = &bytes[used..];
    }
    (responses, conn)
}

fn call(engine: &Engine, request: Request) -> Response {
    let (mut responses, _) = call_all(engine, vec![request]);
    assert_eq!(responses.len(), 1);
    responses.remove(0)
}

fn set_request(key: &str, value: &str) -> Request {
    Request::new(Opcode::Set)
        .with_extras(store_extras(0, 0))
        .with_key(key)
        .with_value(value)
}

fn set(engine: &Engine, key: &str, value: &str) -> u64 {
    let response = call(engine, set_request(key, value));
    assert!(response.is_success());
    response.cas
}

fn lock(engine: &Engine, key: &str) -> Response {
    call(engine, Request::new(Opcode::GetLocked).with_key(key))
}

fn document(engine: &Engine, key: &str) -> Value {
    let item = engine.items().get(key.as_bytes()).unwrap();
    serde_json::from_slice(&item.value).unwrap()
}

fn lookup_spec(op: SubdocOp, flags: u8, path: &str) -> Vec<u8> {
    let mut spec = vec![op.opcode(), flags];
    spec.extend_from_slice(&(path.len() as u16).to_be_bytes());
    spec.extend_from_slice(path.as_bytes());
    spec
}

fn mutation_spec(op: SubdocOp, flags: u8, path: &str, value: &str) -> Vec<u8> {
    let mut spec = vec![op.opcode(), flags];
    spec.extend_from_slice(&(path.len() as u16).to_be_bytes());
    spec.extend_from_slice(&(value.len() as u32).to_be_bytes());
    spec.extend_from_slice(path.as_bytes());
    spec.extend_from_slice(value.as_bytes());
    spec
}

/// Split a multi-lookup body into (status, value) per spec
fn lookup_results(mut body: &[u8]) -> Vec<(u16, Vec<u8>)> {
    let mut results = Vec::new();
    while !body.is_empty() {
        let status = u16::from_be_bytes([body[0], body[1]]);
        let len = u32::from_be_bytes([body[2], body[3], body[4], body[5]]) as usize;
        results.push((status, body[6..6 + len].to_vec()));
        body = &body[6 + len..];
    }
    results
}

// =============================================================================
// Key-Value Tests
// =============================================================================

#[test]
fn test_set_then_get() {
    let engine = Engine::new();
    let response = call(
        &engine,
        Request::new(Opcode::Set)
            .with_extras(store_extras(0xabcd, 0))
            .with_key("k")
            .with_value("hello"),
    );
    assert!(response.is_success());
    let cas = response.cas;

    let response = call(&engine, Request::new(Opcode::Get).with_key("k").with_opaque(9));
    assert!(response.is_success());
    assert_eq!(response.opaque, 9);
    assert_eq!(response.extras, 0xabcdu32.to_be_bytes());
    assert_eq!(response.value, b"hello");
    assert_eq!(response.cas, cas);
    assert!(response.key.is_empty());
}

#[test]
fn test_getk_echoes_key() {
    let engine = Engine::new();
    set(&engine, "k", "v");
    let response = call(&engine, Request::new(Opcode::GetK).with_key("k"));
    assert_eq!(response.key, b"k");
}

#[test]
fn test_get_missing() {
    let engine = Engine::new();
    let response = call(&engine, Request::new(Opcode::Get).with_key("nope"));
    assert_eq!(response.status(), Some(Status::KeyNotFound));
}

#[test]
fn test_bad_shape_is_invalid_arguments() {
    let engine = Engine::new();

    // Set without extras
    let response = call(&engine, Request::new(Opcode::Set).with_key("k").with_value("v"));
    assert_eq!(response.status(), Some(Status::InvalidArguments));

    // Get without key
    let response = call(&engine, Request::new(Opcode::Get));
    assert_eq!(response.status(), Some(Status::InvalidArguments));
}

#[test]
fn test_add_and_replace() {
    let engine = Engine::new();
    let add = |value: &str| {
        Request::new(Opcode::Add)
            .with_extras(store_extras(0, 0))
            .with_key("k")
            .with_value(value)
    };

    assert!(call(&engine, add("1")).is_success());
    assert_eq!(call(&engine, add("2")).status(), Some(Status::KeyExists));
    assert_eq!(
        call(&engine, add("3").with_cas(1)).status(),
        Some(Status::InvalidArguments)
    );

    let replace = Request::new(Opcode::Replace)
        .with_extras(store_extras(0, 0))
        .with_key("missing")
        .with_value("x");
    assert_eq!(call(&engine, replace).status(), Some(Status::KeyNotFound));
}

#[test]
fn test_set_with_stale_cas() {
    let engine = Engine::new();
    let cas = set(&engine, "k", "1");

    let response = call(&engine, set_request("k", "2").with_cas(cas + 1));
    assert_eq!(response.status(), Some(Status::KeyExists));

    let response = call(&engine, set_request("k", "2").with_cas(cas));
    assert!(response.is_success());
    assert_ne!(response.cas, cas);
}

#[test]
fn test_append_prepend() {
    let engine = Engine::new();
    set(&engine, "k", "mid");

    let append = Request::new(Opcode::Append).with_key("k").with_value("-end");
    assert!(call(&engine, append).is_success());
    let prepend = Request::new(Opcode::Prepend).with_key("k").with_value("start-");
    assert!(call(&engine, prepend).is_success());

    assert_eq!(engine.items().get(b"k").unwrap().value, b"start-mid-end");

    let missing = Request::new(Opcode::Append).with_key("nope").with_value("x");
    assert_eq!(call(&engine, missing).status(), Some(Status::NotStored));
}

#[test]
fn test_delete() {
    let engine = Engine::new();
    set(&engine, "k", "v");

    assert!(call(&engine, Request::new(Opcode::Delete).with_key("k")).is_success());
    assert_eq!(
        call(&engine, Request::new(Opcode::Delete).with_key("k")).status(),
        Some(Status::KeyNotFound)
    );
}

#[test]
fn test_increment_decrement() {
    let engine = Engine::new();
    let incr = |delta: u64| {
        Request::new(Opcode::Increment)
            .with_extras(arithmetic_extras(delta, 10, 0))
            .with_key("n")
    };

    // Created at the initial value
    let response = call(&engine, incr(5));
    assert_eq!(response.value, 10u64.to_be_bytes());

    let response = call(&engine, incr(5));
    assert_eq!(response.value, 15u64.to_be_bytes());
    assert_eq!(engine.items().get(b"n").unwrap().value, b"15");

    let decr = Request::new(Opcode::Decrement)
        .with_extras(arithmetic_extras(100, 0, 0))
        .with_key("n");
    let response = call(&engine, decr);
    assert_eq!(response.value, 0u64.to_be_bytes());
}

#[test]
fn test_arithmetic_without_auto_create() {
    let engine = Engine::new();
    let request = Request::new(Opcode::Increment)
        .with_extras(arithmetic_extras(1, 0, 0xffff_ffff))
        .with_key("n");
    assert_eq!(call(&engine, request).status(), Some(Status::KeyNotFound));
}

#[test]
fn test_arithmetic_non_numeric() {
    let engine = Engine::new();
    set(&engine, "n", "abc");
    let request = Request::new(Opcode::Increment)
        .with_extras(arithmetic_extras(1, 0, 0))
        .with_key("n");
    assert_eq!(call(&engine, request).status(), Some(Status::DeltaBadval));
}

// =============================================================================
// Control Command Tests
// =============================================================================

#[test]
fn test_noop_version_hello() {
    let engine = Engine::new();
    assert!(call(&engine, Request::new(Opcode::Noop)).is_success());

    let version = call(&engine, Request::new(Opcode::Version));
    assert!(String::from_utf8(version.value).unwrap().starts_with("kvmock-"));

    let hello = Request::new(Opcode::Hello)
        .with_key("my-client")
        .with_value(vec![0x00, 0x01]);
    let response = call(&engine, hello);
    assert!(response.is_success());
    assert!(response.value.is_empty());
}

#[test]
fn test_flush() {
    let engine = Engine::new();
    set(&engine, "a", "1");
    set(&engine, "b", "2");

    assert!(call(&engine, Request::new(Opcode::Flush)).is_success());
    assert!(engine.items().is_empty());
}

#[test]
fn test_unknown_opcode_keeps_connection() {
    let engine = Engine::new();
    let (responses, conn) = call_all(
        &engine,
        vec![
            Request::raw(0x42).with_opaque(1),
            Request::new(Opcode::Noop).with_opaque(2),
        ],
    );

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].status(), Some(Status::UnknownCommand));
    assert_eq!(responses[0].opcode, 0x42);
    assert!(responses[1].is_success());
    assert!(!conn.is_close_requested());
}

#[test]
fn test_quit_replies_then_closes() {
    let engine = Engine::new();
    let (responses, conn) = call_all(
        &engine,
        vec![
            Request::new(Opcode::Quit).with_opaque(1),
            Request::new(Opcode::Noop).with_opaque(2),
        ],
    );

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].opaque, 1);
    assert!(conn.is_close_requested());
}

#[test]
fn test_quitq_closes_silently() {
    let engine = Engine::new();
    let (responses, conn) = call_all(&engine, vec![Request::new(Opcode::QuitQ)]);
    assert!(responses.is_empty());
    assert!(conn.is_close_requested());
}

#[test]
fn test_verbosity() {
    let engine = Engine::new();
    let request = Request::new(Opcode::Verbosity).with_extras(2u32.to_be_bytes());
    assert!(call(&engine, request).is_success());
    assert_eq!(engine.verbosity(), 2);

    let response = call(&engine, Request::new(Opcode::Verbosity));
    assert_eq!(response.status(), Some(Status::InvalidArguments));
}

#[test]
fn test_stat_stream_ends_with_empty_reply() {
    let engine = Engine::new();
    set(&engine, "a", "1");

    let (responses, _) = call_all(&engine, vec![Request::new(Opcode::Stat).with_opaque(5)]);
    assert!(responses.len() > 1);
    assert!(responses.iter().all(|r| r.is_success() && r.opaque == 5));

    let last = responses.last().unwrap();
    assert!(last.key.is_empty());
    assert!(last.value.is_empty());

    let items = responses.iter().find(|r| r.key == b"curr_items").unwrap();
    assert_eq!(items.value, b"1");
}

#[test]
fn test_stat_single_key() {
    let engine = Engine::new();
    let request = Request::new(Opcode::Stat).with_key("version");
    let (responses, _) = call_all(&engine, vec![request]);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].key, b"version");
    assert!(responses[1].key.is_empty());
}

// =============================================================================
// Quiet Opcode Tests
// =============================================================================

#[test]
fn test_quiet_get_miss_is_silent() {
    let engine = Engine::new();
    set(&engine, "hit", "v");

    let (responses, _) = call_all(
        &engine,
        vec![
            Request::new(Opcode::GetQ).with_key("miss").with_opaque(1),
            Request::new(Opcode::GetKQ).with_key("hit").with_opaque(2),
            Request::new(Opcode::Noop).with_opaque(3),
        ],
    );

    let opaques: Vec<u32> = responses.iter().map(|r| r.opaque).collect();
    assert_eq!(opaques, vec![2, 3]);
    assert_eq!(responses[0].key, b"hit");
}

#[test]
fn test_quiet_set_reports_only_failures() {
    let engine = Engine::new();
    let (responses, _) = call_all(
        &engine,
        vec![
            Request::new(Opcode::SetQ)
                .with_extras(store_extras(0, 0))
                .with_key("k")
                .with_value("v")
                .with_opaque(1),
            Request::new(Opcode::AddQ)
                .with_extras(store_extras(0, 0))
                .with_key("k")
                .with_value("v")
                .with_opaque(2),
            Request::new(Opcode::Noop).with_opaque(3),
        ],
    );

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].opaque, 2);
    assert_eq!(responses[0].status(), Some(Status::KeyExists));
    assert_eq!(responses[1].opaque, 3);
}

#[test]
fn test_gatq_silent_on_miss_only() {
    let engine = Engine::new();
    set(&engine, "hit", "v");

    let (responses, _) = call_all(
        &engine,
        vec![
            Request::new(Opcode::GatQ)
                .with_extras(10u32.to_be_bytes())
                .with_key("miss")
                .with_opaque(1),
            Request::new(Opcode::GatQ)
                .with_extras(10u32.to_be_bytes())
                .with_key("hit")
                .with_opaque(2),
            Request::new(Opcode::Noop).with_opaque(3),
        ],
    );

    let opaques: Vec<u32> = responses.iter().map(|r| r.opaque).collect();
    assert_eq!(opaques, vec![2, 3]);
    assert_eq!(responses[0].value, b"v");
}

// =============================================================================
// Lock, Touch and Sampling Tests
// =============================================================================

#[test]
fn test_touch_sets_expiry() {
    let engine = Engine::new();
    let cas = set(&engine, "k", "v");

    let touch = Request::new(Opcode::Touch)
        .with_extras(500u32.to_be_bytes())
        .with_key("k");
    let response = call(&engine, touch);
    assert!(response.is_success());
    assert!(response.value.is_empty());
    assert_eq!(engine.items().get(b"k").unwrap().expiry, 500);
    assert_eq!(engine.items().get(b"k").unwrap().cas, cas);

    let missing = Request::new(Opcode::Touch)
        .with_extras(500u32.to_be_bytes())
        .with_key("nope");
    assert_eq!(call(&engine, missing).status(), Some(Status::KeyNotFound));
}

#[test]
fn test_gat_returns_item() {
    let engine = Engine::new();
    let cas = set(&engine, "k", "v");

    let gat = Request::new(Opcode::Gat)
        .with_extras(100u32.to_be_bytes())
        .with_key("k");
    let response = call(&engine, gat);
    assert_eq!(response.value, b"v");
    assert_eq!(response.cas, cas);
    assert_eq!(engine.items().get(b"k").unwrap().expiry, 100);
}

#[test]
fn test_get_locked_returns_item_with_new_cas() {
    let engine = Engine::new();
    let cas = set(&engine, "k", "v");

    let response = lock(&engine, "k");
    assert!(response.is_success());
    assert_eq!(response.value, b"v");
    assert_ne!(response.cas, cas);

    assert_eq!(lock(&engine, "k").status(), Some(Status::TemporaryFailure));
    assert_eq!(lock(&engine, "nope").status(), Some(Status::KeyNotFound));
}

#[test]
fn test_locked_item_refuses_other_writers() {
    let engine = Engine::new();
    let old_cas = set(&engine, "k", "v");
    let locked = lock(&engine, "k");

    let response = call(&engine, set_request("k", "x"));
    assert_eq!(response.status(), Some(Status::KeyExists));

    let response = call(&engine, set_request("k", "x").with_cas(old_cas));
    assert_eq!(response.status(), Some(Status::KeyExists));

    let append = Request::new(Opcode::Append).with_key("k").with_value("x");
    assert_eq!(call(&engine, append).status(), Some(Status::KeyExists));

    let response = call(&engine, Request::new(Opcode::Delete).with_key("k"));
    assert_eq!(response.status(), Some(Status::TemporaryFailure));

    // Reads still work
    assert_eq!(call(&engine, Request::new(Opcode::Get).with_key("k")).value, b"v");

    // The lock holder writes, and the write releases the lock
    let response = call(&engine, set_request("k", "mine").with_cas(locked.cas));
    assert!(response.is_success());
    assert!(call(&engine, set_request("k", "anyone")).is_success());
}

#[test]
fn test_unlock() {
    let engine = Engine::new();
    set(&engine, "k", "v");
    let locked = lock(&engine, "k");

    let wrong = Request::new(Opcode::UnlockKey).with_key("k").with_cas(locked.cas + 1);
    assert_eq!(call(&engine, wrong).status(), Some(Status::TemporaryFailure));

    let unlock = Request::new(Opcode::UnlockKey).with_key("k").with_cas(locked.cas);
    assert!(call(&engine, unlock.clone()).is_success());
    assert_eq!(call(&engine, unlock).status(), Some(Status::TemporaryFailure));

    assert!(call(&engine, set_request("k", "x")).is_success());

    let missing = Request::new(Opcode::UnlockKey).with_key("nope");
    assert_eq!(call(&engine, missing).status(), Some(Status::KeyNotFound));
}

#[test]
fn test_lock_times_out() {
    let engine = Engine::new();
    set(&engine, "k", "v");

    let request = Request::new(Opcode::GetLocked)
        .with_extras(1u32.to_be_bytes())
        .with_key("k");
    assert!(call(&engine, request).is_success());
    assert_eq!(call(&engine, set_request("k", "x")).status(), Some(Status::KeyExists));

    thread::sleep(Duration::from_millis(1100));
    assert!(call(&engine, set_request("k", "x")).is_success());
}

#[test]
fn test_locked_counter_and_document() {
    let engine = Engine::new();
    set(&engine, "n", "5");
    let locked = lock(&engine, "n");

    let incr = Request::new(Opcode::Increment)
        .with_extras(arithmetic_extras(1, 0, 0))
        .with_key("n");
    let response = call(&engine, incr.clone());
    assert_eq!(response.status(), Some(Status::TemporaryFailure));

    let response = call(&engine, incr.with_cas(locked.cas));
    assert_eq!(response.value, 6u64.to_be_bytes());

    set(&engine, "doc", r#"{"a":1}"#);
    let locked = lock(&engine, "doc");
    let upsert = subdoc_request(Opcode::SubdocDictUpsert, b"doc", "b", b"2", 0, 0);
    let response = call(&engine, upsert.clone());
    assert_eq!(response.status(), Some(Status::KeyExists));

    let response = call(&engine, upsert.with_cas(locked.cas));
    assert!(response.is_success());
    assert_eq!(document(&engine, "doc"), json!({"a": 1, "b": 2}));
}

#[test]
fn test_get_random() {
    let engine = Engine::new();
    let response = call(&engine, Request::new(Opcode::GetRandom));
    assert_eq!(response.status(), Some(Status::KeyNotFound));

    set(&engine, "a", "1");
    set(&engine, "b", "2");
    let response = call(&engine, Request::new(Opcode::GetRandom));
    assert!(response.is_success());
    let expected: &[u8] = if response.key == b"a" { b"1" } else { b"2" };
    assert!(response.key == b"a" || response.key == b"b");
    assert_eq!(response.value, expected);
}

// =============================================================================
// Single-Path Sub-document Tests
// =============================================================================

#[test]
fn test_subdoc_get() {
    let engine = Engine::new();
    let cas = set(&engine, "doc", r#"{"a":{"b":[1,2]}}"#);

    let response = call(&engine, subdoc_request(Opcode::SubdocGet, b"doc", "a.b", b"", 0, 0));
    assert!(response.is_success());
    assert_eq!(response.value, b"[1,2]");
    assert_eq!(response.data_type, DATATYPE_JSON);
    assert_eq!(response.cas, cas);
}

#[test]
fn test_subdoc_exists_and_missing_path() {
    let engine = Engine::new();
    set(&engine, "doc", r#"{"a":1}"#);

    let response = call(&engine, subdoc_request(Opcode::SubdocExists, b"doc", "a", b"", 0, 0));
    assert!(response.is_success());
    assert!(response.value.is_empty());

    let response = call(&engine, subdoc_request(Opcode::SubdocGet, b"doc", "b", b"", 0, 0));
    assert_eq!(response.status(), Some(Status::SubdocPathNotFound));
}

#[test]
fn test_subdoc_value_rules_before_document() {
    let engine = Engine::new();
    set(&engine, "doc", "not json at all");

    // Value checked first, so the broken document is never reached
    let response = call(&engine, subdoc_request(Opcode::SubdocDictAdd, b"doc", "a", b"", 0, 0));
    assert_eq!(response.status(), Some(Status::SubdocValueCantInsert));

    let response = call(&engine, subdoc_request(Opcode::SubdocExists, b"doc", "a", b"1", 0, 0));
    assert_eq!(response.status(), Some(Status::InvalidArguments));

    let response = call(&engine, subdoc_request(Opcode::SubdocGet, b"doc", "a", b"", 0, 0));
    assert_eq!(response.status(), Some(Status::SubdocDocNotJson));
}

#[test]
fn test_subdoc_missing_document() {
    let engine = Engine::new();
    let response = call(&engine, subdoc_request(Opcode::SubdocGet, b"nope", "a", b"", 0, 0));
    assert_eq!(response.status(), Some(Status::KeyNotFound));
}

#[test]
fn test_subdoc_bad_extras() {
    let engine = Engine::new();
    let mut request = subdoc_request(Opcode::SubdocGet, b"doc", "a", b"", 0, 0);
    request.extras = vec![0, 1];
    assert_eq!(call(&engine, request).status(), Some(Status::InvalidArguments));
}

#[test]
fn test_subdoc_mutation_updates_cas() {
    let engine = Engine::new();
    let cas = set(&engine, "doc", r#"{"a":1}"#);

    let response = call(
        &engine,
        subdoc_request(Opcode::SubdocDictUpsert, b"doc", "b", b"\"x\"", 0, 0),
    );
    assert!(response.is_success());
    assert_ne!(response.cas, cas);
    assert_eq!(document(&engine, "doc"), json!({"a": 1, "b": "x"}));
}

#[test]
fn test_subdoc_counter_returns_value() {
    let engine = Engine::new();
    set(&engine, "doc", r#"{"n":5}"#);

    let response = call(&engine, subdoc_request(Opcode::SubdocCounter, b"doc", "n", b"1", 0, 0));
    assert!(response.is_success());
    assert_eq!(response.value, b"6");
    assert_eq!(document(&engine, "doc"), json!({"n": 6}));
}

#[test]
fn test_subdoc_stale_cas() {
    let engine = Engine::new();
    let cas = set(&engine, "doc", r#"{"a":1}"#);

    let request = subdoc_request(Opcode::SubdocReplace, b"doc", "a", b"2", 0, 0).with_cas(cas + 1);
    assert_eq!(call(&engine, request).status(), Some(Status::KeyExists));
    assert_eq!(document(&engine, "doc"), json!({"a": 1}));
}

#[test]
fn test_subdoc_mkdir_p() {
    let engine = Engine::new();
    set(&engine, "doc", "{}");

    let response = call(
        &engine,
        subdoc_request(Opcode::SubdocDictUpsert, b"doc", "a.b.c", b"1", 0, 0),
    );
    assert_eq!(response.status(), Some(Status::SubdocPathNotFound));

    let response = call(
        &engine,
        subdoc_request(Opcode::SubdocDictUpsert, b"doc", "a.b.c", b"1", PATH_FLAG_MKDIR_P, 0),
    );
    assert!(response.is_success());
    assert_eq!(document(&engine, "doc"), json!({"a": {"b": {"c": 1}}}));
}

#[test]
fn test_subdoc_mkdoc_creates_document() {
    let engine = Engine::new();
    let response = call(
        &engine,
        subdoc_request(Opcode::SubdocDictUpsert, b"new", "a.b", b"1", 0, DOC_FLAG_MKDOC),
    );
    assert!(response.is_success());
    assert_eq!(document(&engine, "new"), json!({"a": {"b": 1}}));
}

#[test]
fn test_subdoc_mkdoc_array_root() {
    let engine = Engine::new();
    let response = call(
        &engine,
        subdoc_request(Opcode::SubdocArrayPushLast, b"list", "", b"1,2", 0, DOC_FLAG_MKDOC),
    );
    assert!(response.is_success());
    assert_eq!(document(&engine, "list"), json!([1, 2]));
}

#[test]
fn test_subdoc_mkdoc_rejected_for_non_creative() {
    let engine = Engine::new();
    let response = call(
        &engine,
        subdoc_request(Opcode::SubdocReplace, b"new", "a", b"1", 0, DOC_FLAG_MKDOC),
    );
    assert_eq!(response.status(), Some(Status::InvalidArguments));
}

#[test]
fn test_subdoc_add_flag_on_existing() {
    let engine = Engine::new();
    set(&engine, "doc", "{}");
    let response = call(
        &engine,
        subdoc_request(Opcode::SubdocDictUpsert, b"doc", "a", b"1", 0, DOC_FLAG_ADD),
    );
    assert_eq!(response.status(), Some(Status::KeyExists));
}

#[test]
fn test_subdoc_xattr_paths() {
    let engine = Engine::new();
    set(&engine, "doc", r#"{"a":1}"#);

    let xattr_write = PATH_FLAG_XATTR | PATH_FLAG_MKDIR_P;
    let response = call(
        &engine,
        subdoc_request(Opcode::SubdocDictUpsert, b"doc", "meta.x", b"7", xattr_write, 0),
    );
    assert!(response.is_success());

    // The document body is untouched
    assert_eq!(document(&engine, "doc"), json!({"a": 1}));

    let response = call(
        &engine,
        subdoc_request(Opcode::SubdocGet, b"doc", "meta.x", b"", PATH_FLAG_XATTR, 0),
    );
    assert_eq!(response.value, b"7");

    let response = call(&engine, subdoc_request(Opcode::SubdocGet, b"doc", "meta", b"", 0, 0));
    assert_eq!(response.status(), Some(Status::SubdocPathNotFound));
}

#[test]
fn test_subdoc_mutation_writes_request_expiry() {
    let engine = Engine::new();
    let store = Request::new(Opcode::Set)
        .with_extras(store_extras(0, 300))
        .with_key("doc")
        .with_value(r#"{"a":1}"#);
    assert!(call(&engine, store).is_success());

    // No expiry in the request clears the stored one
    let upsert = subdoc_request(Opcode::SubdocDictUpsert, b"doc", "a", b"2", 0, 0);
    assert!(call(&engine, upsert).is_success());
    assert_eq!(engine.items().get(b"doc").unwrap().expiry, 0);

    let mut extras = 1u16.to_be_bytes().to_vec();
    extras.push(0);
    extras.extend_from_slice(&60u32.to_be_bytes());
    let upsert = Request::new(Opcode::SubdocDictUpsert)
        .with_extras(extras)
        .with_key("doc")
        .with_value("a3");
    assert!(call(&engine, upsert).is_success());
    assert_eq!(engine.items().get(b"doc").unwrap().expiry, 60);
    assert_eq!(document(&engine, "doc"), json!({"a": 3}));
}

// =============================================================================
// Multi-Path Tests
// =============================================================================

#[test]
fn test_multi_lookup() {
    let engine = Engine::new();
    set(&engine, "doc", r#"{"a":1,"l":[1,2]}"#);

    let mut specs = lookup_spec(SubdocOp::Get, 0, "a");
    specs.extend(lookup_spec(SubdocOp::Exists, 0, "missing"));
    specs.extend(lookup_spec(SubdocOp::GetCount, 0, "l"));

    let response = call(
        &engine,
        Request::new(Opcode::SubdocMultiLookup).with_key("doc").with_value(specs),
    );
    assert_eq!(response.status(), Some(Status::SubdocMultiPathFailure));

    let results = lookup_results(&response.value);
    assert_eq!(
        results,
        vec![
            (Status::Success.code(), b"1".to_vec()),
            (Status::SubdocPathNotFound.code(), Vec::new()),
            (Status::Success.code(), b"2".to_vec()),
        ]
    );
}

#[test]
fn test_multi_lookup_all_succeed() {
    let engine = Engine::new();
    set(&engine, "doc", r#"{"a":1}"#);

    let response = call(
        &engine,
        Request::new(Opcode::SubdocMultiLookup)
            .with_key("doc")
            .with_value(lookup_spec(SubdocOp::Get, 0, "a")),
    );
    assert!(response.is_success());
}

#[test]
fn test_multi_lookup_rejects_mutator() {
    let engine = Engine::new();
    set(&engine, "doc", r#"{"a":1}"#);

    let mut specs = lookup_spec(SubdocOp::Get, 0, "a");
    specs.extend(lookup_spec(SubdocOp::Remove, 0, "a"));
    let response = call(
        &engine,
        Request::new(Opcode::SubdocMultiLookup).with_key("doc").with_value(specs),
    );
    assert_eq!(response.status(), Some(Status::SubdocInvalidCombo));
}

#[test]
fn test_multi_mutation_success() {
    let engine = Engine::new();
    set(&engine, "doc", r#"{"a":1,"n":1}"#);

    let mut specs = mutation_spec(SubdocOp::DictUpsert, 0, "a", "2");
    specs.extend(mutation_spec(SubdocOp::Counter, 0, "n", "3"));
    let response = call(
        &engine,
        Request::new(Opcode::SubdocMultiMutation).with_key("doc").with_value(specs),
    );

    assert!(response.is_success());
    assert_eq!(response.value, vec![1, 0, 0, 0, 0, 0, 1, b'4']);
    assert_eq!(document(&engine, "doc"), json!({"a": 2, "n": 4}));
}

#[test]
fn test_multi_mutation_first_failure() {
    let engine = Engine::new();
    let cas = set(&engine, "doc", r#"{"a":1}"#);

    let mut specs = mutation_spec(SubdocOp::DictUpsert, 0, "a", "2");
    specs.extend(mutation_spec(SubdocOp::Replace, 0, "missing", "1"));
    let response = call(
        &engine,
        Request::new(Opcode::SubdocMultiMutation).with_key("doc").with_value(specs),
    );

    assert_eq!(response.status(), Some(Status::SubdocMultiPathFailure));
    assert_eq!(response.value, vec![1, 0x00, 0xc0]);

    // Nothing applied
    assert_eq!(document(&engine, "doc"), json!({"a": 1}));
    assert_eq!(engine.items().get(b"doc").unwrap().cas, cas);
}

#[test]
fn test_multi_mutation_rejects_lookup() {
    let engine = Engine::new();
    set(&engine, "doc", r#"{"a":1}"#);

    let response = call(
        &engine,
        Request::new(Opcode::SubdocMultiMutation)
            .with_key("doc")
            .with_value(mutation_spec(SubdocOp::Get, 0, "a", "")),
    );
    assert_eq!(response.status(), Some(Status::SubdocInvalidCombo));
    assert_eq!(response.value, vec![0, 0x00, 0xcb]);
}

#[test]
fn test_multi_mutation_mkdoc() {
    let engine = Engine::new();
    let response = call(
        &engine,
        Request::new(Opcode::SubdocMultiMutation)
            .with_extras(vec![DOC_FLAG_MKDOC])
            .with_key("fresh")
            .with_value(mutation_spec(SubdocOp::DictUpsert, 0, "x", "1")),
    );
    assert!(response.is_success());
    assert_eq!(document(&engine, "fresh"), json!({"x": 1}));
}

#[test]
fn test_multi_truncated_spec() {
    let engine = Engine::new();
    set(&engine, "doc", "{}");

    let mut specs = lookup_spec(SubdocOp::Get, 0, "abc");
    specs.truncate(specs.len() - 1);
    let response = call(
        &engine,
        Request::new(Opcode::SubdocMultiLookup).with_key("doc").with_value(specs),
    );
    assert_eq!(response.status(), Some(Status::InvalidArguments));
}
