//! Request Encoding Tests
//!
//! Tests for the positional argument layout single commands and batches
//! cross the boundary with, and for the validation that rejects
//! unrepresentable requests before any native call.

use keybridge::batch::{Batch, BatchOptions, BatchRetryStrategy};
use keybridge::command::{Command, RequestType};
use keybridge::error::BridgeError;
use keybridge::protocol::{EncodedBatch, EncodedRequest};
use keybridge::routing::{Route, SlotKind};

// =============================================================================
// Single Commands
// =============================================================================

#[test]
fn test_encode_command_layout() {
    let encoded = EncodedRequest::encode(Command::set("key", "value")).unwrap();
    assert_eq!(encoded.request_type(), RequestType::Set as u32);
    assert_eq!(encoded.arg_count(), 2);

    // The pointer/length arrays must describe the argument bytes exactly.
    let ptrs = unsafe { std::slice::from_raw_parts(encoded.arg_ptrs(), 2) };
    let lens = unsafe { std::slice::from_raw_parts(encoded.arg_lens(), 2) };
    let first = unsafe { std::slice::from_raw_parts(ptrs[0] as *const u8, lens[0] as usize) };
    let second = unsafe { std::slice::from_raw_parts(ptrs[1] as *const u8, lens[1] as usize) };
    assert_eq!(first, b"key");
    assert_eq!(second, b"value");
}

#[test]
fn test_encode_command_without_args() {
    let encoded = EncodedRequest::encode(Command::ping()).unwrap();
    assert_eq!(encoded.arg_count(), 0);
    assert!(encoded.arg_ptrs().is_null());
    assert!(encoded.arg_lens().is_null());
    assert!(encoded.route_ptr().is_null());
    assert_eq!(encoded.route_len(), 0);
}

#[test]
fn test_encode_command_with_route() {
    let route = Route::SlotKey {
        key: b"key".to_vec(),
        slot_kind: SlotKind::Primary,
    };
    let encoded = EncodedRequest::encode(Command::get("key").route(route.clone())).unwrap();
    assert!(!encoded.route_ptr().is_null());

    // The route crosses as its own serialized message.
    let bytes =
        unsafe { std::slice::from_raw_parts(encoded.route_ptr(), encoded.route_len()) };
    assert_eq!(Route::from_wire_bytes(bytes).unwrap(), route);
}

#[test]
fn test_encode_rejects_invalid_request_type() {
    let err = EncodedRequest::encode(Command::new(RequestType::Invalid)).unwrap_err();
    assert!(matches!(err, BridgeError::Encoding(_)));
}

// =============================================================================
// Batches
// =============================================================================

#[test]
fn test_encode_batch_layout() {
    let batch = Batch::new(true)
        .push(Command::set("k", "v"))
        .push(Command::get("k"));
    let encoded = EncodedBatch::encode(batch, 5000).unwrap();
    assert_eq!(encoded.len(), 2);

    let info = unsafe { &*encoded.info() };
    assert!(info.is_atomic);
    assert_eq!(info.cmd_count, 2);

    let first = unsafe { &**info.cmds };
    assert_eq!(first.request_type, RequestType::Set as u32);
    assert_eq!(first.arg_count, 2);
    let lens = unsafe { std::slice::from_raw_parts(first.args_len, 2) };
    let key = unsafe {
        std::slice::from_raw_parts(*first.args, lens[0] as usize)
    };
    assert_eq!(key, b"k");
}

#[test]
fn test_encode_batch_default_options() {
    let batch = Batch::new(false).push(Command::ping());
    let encoded = EncodedBatch::encode(batch, 7500).unwrap();
    let options = unsafe { &*encoded.options() };
    assert!(!options.retry_server_error);
    assert!(!options.retry_connection_error);
    assert!(!options.has_timeout);
    // Falls back to the client timeout when the batch does not set one.
    assert_eq!(options.timeout_ms, 7500);
    assert!(options.route_bytes.is_null());
}

#[test]
fn test_encode_batch_explicit_options() {
    let route = Route::SlotId {
        slot_id: 99,
        slot_kind: SlotKind::Primary,
    };
    let batch_options = BatchOptions::builder()
        .timeout_ms(250)
        .route(route.clone())
        .unwrap()
        .retry_strategy(BatchRetryStrategy {
            retry_server_error: true,
            retry_connection_error: false,
        })
        .build();
    let batch = Batch::new(false)
        .push(Command::ping())
        .with_options(batch_options)
        .unwrap();
    let encoded = EncodedBatch::encode(batch, 5000).unwrap();

    let options = unsafe { &*encoded.options() };
    assert!(options.retry_server_error);
    assert!(!options.retry_connection_error);
    assert!(options.has_timeout);
    assert_eq!(options.timeout_ms, 250);
    assert_eq!(encoded.timeout_ms(), 250);

    let bytes =
        unsafe { std::slice::from_raw_parts(options.route_bytes, options.route_bytes_len) };
    assert_eq!(Route::from_wire_bytes(bytes).unwrap(), route);
}

#[test]
fn test_encode_rejects_empty_batch() {
    let err = EncodedBatch::encode(Batch::new(false), 5000).unwrap_err();
    assert!(matches!(err, BridgeError::Encoding(_)));
}

#[test]
fn test_encode_rejects_per_command_routes_in_batch() {
    let batch = Batch::new(false).push(Command::get("k").route(Route::Random));
    let err = EncodedBatch::encode(batch, 5000).unwrap_err();
    assert!(matches!(err, BridgeError::Encoding(_)));
}

#[test]
fn test_encode_rejects_invalid_command_in_batch() {
    let batch = Batch::new(false)
        .push(Command::ping())
        .push(Command::new(RequestType::Invalid));
    let err = EncodedBatch::encode(batch, 5000).unwrap_err();
    assert!(matches!(err, BridgeError::Encoding(_)));
}
