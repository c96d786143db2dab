//! Routing Tests
//!
//! Tests for slot hashing, hash tags, route resolution defaults, and the
//! serialized messages that cross the boundary (routes and connection
//! requests).

use keybridge::config::{ClientConfig, NodeAddress, ProtocolVersion, ServerCredentials};
use keybridge::routing::{hash_slot, Route, Router, SlotKind, SLOT_COUNT};
use keybridge::value::WireValue;

// =============================================================================
// Slot Hashing
// =============================================================================

#[test]
fn test_hash_slot_reference_value() {
    // CRC16/XMODEM of "123456789" is 0x31C3, the standard check value.
    assert_eq!(hash_slot(b"123456789"), 0x31C3 % SLOT_COUNT);
}

#[test]
fn test_hash_slot_in_range() {
    for key in [&b"a"[..], b"foo", b"some:longer:key", b"\x00\xff"] {
        assert!(hash_slot(key) < SLOT_COUNT);
    }
}

#[test]
fn test_hash_tag_pins_related_keys() {
    // Only the tag between the first braces is hashed.
    assert_eq!(
        hash_slot(b"{user1000}.following"),
        hash_slot(b"{user1000}.followers")
    );
    assert_eq!(hash_slot(b"{user1000}"), hash_slot(b"user1000"));
}

#[test]
fn test_empty_hash_tag_hashes_whole_key() {
    // "{}" is not a tag; the whole key is hashed.
    assert_ne!(hash_slot(b"foo{}{bar}"), hash_slot(b"bar"));
    assert_eq!(hash_slot(b"foo{}{bar}"), hash_slot(b"foo{}{bar}"));
}

#[test]
fn test_nested_braces_use_first_closing() {
    // The tag is everything between the first '{' and the first '}' after
    // it, so "foo{{bar}}" hashes "{bar".
    assert_eq!(hash_slot(b"foo{{bar}}zap"), hash_slot(b"x{{bar}y"));
}

// =============================================================================
// Route Defaults
// =============================================================================

#[test]
fn test_explicit_route_wins() {
    let route = Router::effective_route(Some(Route::AllPrimaries), Some(b"key"));
    assert_eq!(route, Route::AllPrimaries);
}

#[test]
fn test_keyed_command_routes_by_slot() {
    let route = Router::effective_route(None, Some(b"key"));
    assert_eq!(
        route,
        Route::SlotKey {
            key: b"key".to_vec(),
            slot_kind: SlotKind::Primary,
        }
    );
}

#[test]
fn test_keyless_command_routes_randomly() {
    assert_eq!(Router::effective_route(None, None), Route::Random);
}

#[test]
fn test_single_node_classification() {
    assert!(Route::Random.is_single_node());
    assert!(Route::ByAddress {
        host: "127.0.0.1".to_string(),
        port: 7000,
    }
    .is_single_node());
    assert!(!Route::AllNodes.is_single_node());
    assert!(!Route::AllPrimaries.is_single_node());
}

// =============================================================================
// Multi-Node Reply Merging
// =============================================================================

#[test]
fn test_merge_node_replies_keeps_order() {
    let merged = Router::merge_node_replies(vec![
        ("127.0.0.1:7000".to_string(), WireValue::Ok),
        ("127.0.0.1:7001".to_string(), WireValue::Int(3)),
    ]);
    assert_eq!(
        merged,
        WireValue::Map(vec![
            (WireValue::bytes(&b"127.0.0.1:7000"[..]), WireValue::Ok),
            (WireValue::bytes(&b"127.0.0.1:7001"[..]), WireValue::Int(3)),
        ])
    );
}

// =============================================================================
// Wire Messages
// =============================================================================

#[test]
fn test_route_wire_round_trip() {
    let routes = [
        Route::Random,
        Route::AllNodes,
        Route::SlotId {
            slot_id: 12182,
            slot_kind: SlotKind::Replica,
        },
        Route::SlotKey {
            key: b"key".to_vec(),
            slot_kind: SlotKind::Primary,
        },
        Route::ByAddress {
            host: "10.0.0.1".to_string(),
            port: 6380,
        },
    ];
    for route in routes {
        let bytes = route.to_wire_bytes().unwrap();
        assert_eq!(Route::from_wire_bytes(&bytes).unwrap(), route);
    }
}

#[test]
fn test_route_rejects_garbage_bytes() {
    assert!(Route::from_wire_bytes(&[0xde, 0xad]).is_err());
}

#[test]
fn test_connection_request_round_trip() {
    let config = ClientConfig::builder()
        .addresses(vec![NodeAddress::new("10.1.1.1", 7000)])
        .cluster_mode(true)
        .request_timeout_ms(1234)
        .lazy_connect(true)
        .client_name("bridge-test")
        .protocol(ProtocolVersion::Resp2)
        .credentials(ServerCredentials {
            username: Some("default".to_string()),
            password: Some(b"secret".to_vec()),
        })
        .build();

    let bytes = config.to_wire_bytes().unwrap();
    let parsed = ClientConfig::from_wire_bytes(&bytes).unwrap();
    assert_eq!(parsed.addresses, config.addresses);
    assert!(parsed.cluster_mode);
    assert_eq!(parsed.request_timeout_ms, 1234);
    assert!(parsed.lazy_connect);
    assert_eq!(parsed.client_name.as_deref(), Some("bridge-test"));
    assert_eq!(parsed.protocol, ProtocolVersion::Resp2);
    assert_eq!(parsed.credentials, config.credentials);
}
