//! Client Tests
//!
//! End-to-end tests through the full stack: client handle, wire encoding,
//! the native boundary, and the engine behind it. Both delivery modes are
//! covered, along with lifecycle, batches, and credential rotation.

use std::sync::Arc;
use std::time::Duration;

use keybridge::batch::{Batch, BatchOptions, BatchRetryStrategy};
use keybridge::client::{AuthMode, Client, DeliveryMode};
use keybridge::command::{Command, RequestType};
use keybridge::config::{ClientConfig, ServerCredentials};
use keybridge::engine::{ClusterEngine, EngineApi, LinkFault};
use keybridge::error::{BridgeError, RequestErrorKind};
use keybridge::protocol::NativeApi;
use keybridge::routing::Route;
use keybridge::value::WireValue;

// =============================================================================
// Helper Functions
// =============================================================================

fn engine_api(engine: &Arc<ClusterEngine>) -> Arc<dyn NativeApi> {
    // Surface engine logs when RUST_LOG is set; repeated init is a no-op.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Arc::new(EngineApi::new(Arc::clone(engine)))
}

fn setup(nodes: usize) -> (Arc<ClusterEngine>, Arc<dyn NativeApi>, Client) {
    let engine = Arc::new(ClusterEngine::new(nodes));
    let api = engine_api(&engine);
    let client = Client::create(ClientConfig::default(), Arc::clone(&api)).unwrap();
    (engine, api, client)
}

fn setup_callback(nodes: usize, timeout_ms: u64) -> (Arc<ClusterEngine>, Client) {
    let engine = Arc::new(ClusterEngine::new(nodes));
    let api = engine_api(&engine);
    let config = ClientConfig::builder().request_timeout_ms(timeout_ms).build();
    let client = Client::create_with_mode(config, DeliveryMode::Callback, api).unwrap();
    (engine, client)
}

// =============================================================================
// Blocking Delivery
// =============================================================================

#[test]
fn test_blocking_basic_commands() {
    let (_engine, _api, client) = setup(3);

    assert_eq!(client.exec(Command::ping()).unwrap(), WireValue::bytes(&b"PONG"[..]));
    assert_eq!(
        client.exec(Command::new(RequestType::Echo).arg("hello")).unwrap(),
        WireValue::bytes(&b"hello"[..])
    );
    assert_eq!(client.exec(Command::set("k", "v")).unwrap(), WireValue::Ok);
    assert_eq!(
        client.exec(Command::get("k")).unwrap(),
        WireValue::bytes(&b"v"[..])
    );
    assert_eq!(client.exec(Command::get("missing")).unwrap(), WireValue::Null);
    assert_eq!(client.exec(Command::del("k")).unwrap(), WireValue::Int(1));
}

#[test]
fn test_blocking_custom_command() {
    let (_engine, _api, client) = setup(1);
    let value = client
        .exec(
            Command::new(RequestType::Custom)
                .arg("SET")
                .arg("k")
                .arg("custom"),
        )
        .unwrap();
    assert_eq!(value, WireValue::Ok);
    assert_eq!(
        client.exec(Command::get("k")).unwrap(),
        WireValue::bytes(&b"custom"[..])
    );
}

#[test]
fn test_blocking_server_error_surfaces_by_kind() {
    let (_engine, _api, client) = setup(1);
    let err = client
        .exec(Command::new(RequestType::Get))
        .unwrap_err();
    match err {
        BridgeError::Request { kind, .. } => assert_eq!(kind, RequestErrorKind::Unspecified),
        other => panic!("expected request error, got {:?}", other),
    }
}

#[test]
fn test_multi_node_route_merges_replies() {
    let (_engine, _api, client) = setup(3);
    let merged = client
        .exec(Command::ping().route(Route::AllPrimaries))
        .unwrap();
    match merged {
        WireValue::Map(pairs) => assert_eq!(pairs.len(), 3),
        other => panic!("expected per-address map, got {:?}", other),
    }
}

// =============================================================================
// Batches
// =============================================================================

#[test]
fn test_atomic_batch_end_to_end() {
    let (_engine, _api, client) = setup(3);
    let batch = Batch::new(true)
        .push(Command::set("{t}k", "v"))
        .push(Command::get("{t}k"));
    let result = client.exec_batch(batch, true).unwrap();
    assert_eq!(
        result,
        WireValue::Array(vec![WireValue::Ok, WireValue::bytes(&b"v"[..])])
    );
}

#[test]
fn test_atomic_batch_abort_has_no_effects() {
    let (_engine, _api, client) = setup(1);
    let batch = Batch::new(true)
        .push(Command::set("k", "v"))
        .push(Command::new(RequestType::Get)); // wrong arity
    let err = client.exec_batch(batch, false).unwrap_err();
    match err {
        BridgeError::Request { kind, .. } => assert_eq!(kind, RequestErrorKind::ExecAbort),
        other => panic!("expected abort, got {:?}", other),
    }
    assert_eq!(client.exec(Command::get("k")).unwrap(), WireValue::Null);
}

#[test]
fn test_pipeline_embeds_errors_when_not_raising() {
    let (_engine, _api, client) = setup(1);
    let batch = Batch::new(false)
        .push(Command::new(RequestType::Get)) // wrong arity
        .push(Command::set("k", "v"));
    let result = client.exec_batch(batch, false).unwrap();
    match result {
        WireValue::Array(values) => {
            assert!(values[0].is_error());
            assert_eq!(values[1], WireValue::Ok);
        }
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn test_pipeline_retry_end_to_end() {
    let (engine, _api, client) = setup(1);
    engine
        .faults()
        .migrate_slot(keybridge::routing::hash_slot(b"moving"));

    let options = BatchOptions::builder()
        .retry_strategy(BatchRetryStrategy {
            retry_server_error: true,
            retry_connection_error: false,
        })
        .build();
    let batch = Batch::new(false)
        .push(Command::set("moving", "v"))
        .with_options(options)
        .unwrap();
    let result = client.exec_batch(batch, true).unwrap();
    assert_eq!(result, WireValue::Array(vec![WireValue::Ok]));
}

#[test]
fn test_batch_results_line_up_across_nodes() {
    let (_engine, _api, client) = setup(3);
    let batch = Batch::new(false)
        .push(Command::set("a", "1"))
        .push(Command::set("b", "2"))
        .push(Command::set("c", "3"))
        .push(Command::get("b"));
    let result = client.exec_batch(batch, true).unwrap();
    assert_eq!(
        result,
        WireValue::Array(vec![
            WireValue::Ok,
            WireValue::Ok,
            WireValue::Ok,
            WireValue::bytes(&b"2"[..]),
        ])
    );
}

// =============================================================================
// Callback Delivery
// =============================================================================

#[test]
fn test_callback_exec_round_trip() {
    let (_engine, client) = setup_callback(1, 5000);
    assert_eq!(client.exec(Command::set("k", "v")).unwrap(), WireValue::Ok);
    assert_eq!(
        client.exec(Command::get("k")).unwrap(),
        WireValue::bytes(&b"v"[..])
    );
}

#[test]
fn test_callback_dispatch_overlaps_requests() {
    let (_engine, client) = setup_callback(1, 5000);
    client.exec(Command::set("k", "v")).unwrap();

    // Two in-flight requests resolve independently.
    let first = client.dispatch(Command::get("k")).unwrap();
    let second = client.dispatch(Command::ping()).unwrap();
    assert_eq!(second.wait().unwrap(), WireValue::bytes(&b"PONG"[..]));
    assert_eq!(first.wait().unwrap(), WireValue::bytes(&b"v"[..]));
}

#[test]
fn test_callback_try_poll() {
    let (_engine, client) = setup_callback(1, 5000);
    let handle = client.dispatch(Command::ping()).unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(outcome) = handle.try_poll() {
            assert_eq!(outcome.unwrap(), WireValue::bytes(&b"PONG"[..]));
            break;
        }
        assert!(std::time::Instant::now() < deadline, "reply never arrived");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_callback_batch_round_trip() {
    let (_engine, client) = setup_callback(3, 5000);
    let batch = Batch::new(false)
        .push(Command::set("a", "1"))
        .push(Command::get("a"));
    let handle = client.dispatch_batch(batch, true).unwrap();
    assert_eq!(
        handle.wait().unwrap(),
        WireValue::Array(vec![WireValue::Ok, WireValue::bytes(&b"1"[..])])
    );
}

#[test]
fn test_callback_timeout_when_reply_is_lost() {
    let (engine, client) = setup_callback(1, 100);
    engine.faults().swallow_next_request();

    let err = client.exec(Command::ping()).unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));

    // The fault was one-shot; the connection still works.
    assert_eq!(client.exec(Command::ping()).unwrap(), WireValue::bytes(&b"PONG"[..]));
}

#[test]
fn test_dispatch_requires_callback_mode() {
    let (_engine, _api, client) = setup(1);
    let err = client.dispatch(Command::ping()).unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_close_is_idempotent() {
    let (_engine, _api, client) = setup(1);
    assert!(!client.is_closed());
    client.close();
    assert!(client.is_closed());
    client.close(); // second close is a no-op

    let err = client.exec(Command::ping()).unwrap_err();
    assert!(matches!(err, BridgeError::Closing(_)));
}

#[test]
fn test_closing_one_handle_leaves_siblings_working() {
    let engine = Arc::new(ClusterEngine::new(1));
    let api = engine_api(&engine);
    let first = Client::create(ClientConfig::default(), Arc::clone(&api)).unwrap();
    let second = Client::create(ClientConfig::default(), Arc::clone(&api)).unwrap();

    first.exec(Command::set("k", "v")).unwrap();
    first.close();

    assert_eq!(
        second.exec(Command::get("k")).unwrap(),
        WireValue::bytes(&b"v"[..])
    );
}

#[test]
fn test_eager_connect_fails_when_unreachable() {
    let engine = Arc::new(ClusterEngine::new(1));
    engine.faults().set_unreachable(true);
    let api = engine_api(&engine);

    let err = Client::create(ClientConfig::default(), api).unwrap_err();
    assert!(matches!(err, BridgeError::Connection(_)));
}

#[test]
fn test_lazy_connect_defers_failure_to_first_command() {
    let engine = Arc::new(ClusterEngine::new(1));
    engine.faults().set_unreachable(true);
    let api = engine_api(&engine);

    let config = ClientConfig::builder().lazy_connect(true).build();
    let client = Client::create(config, api).unwrap();

    let err = client.exec(Command::ping()).unwrap_err();
    assert!(matches!(err, BridgeError::Connection(_)));

    engine.faults().set_unreachable(false);
    assert_eq!(client.exec(Command::ping()).unwrap(), WireValue::bytes(&b"PONG"[..]));
}

// =============================================================================
// Credential Rotation
// =============================================================================

fn setup_with_password(password: &str) -> (Arc<ClusterEngine>, Client) {
    let engine = Arc::new(ClusterEngine::with_password(1, password));
    let api = engine_api(&engine);
    let config = ClientConfig::builder()
        .credentials(ServerCredentials {
            username: None,
            password: Some(password.as_bytes().to_vec()),
        })
        .build();
    let client = Client::create(config, api).unwrap();
    (engine, client)
}

#[test]
fn test_immediate_auth_requires_non_empty_password() {
    let (_engine, _api, client) = setup(1);
    let err = client.update_password(None, AuthMode::Immediate).unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
    let err = client
        .update_password(Some(""), AuthMode::Immediate)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

#[test]
fn test_immediate_auth_rejection_commits_nothing() {
    let (_engine, client) = setup_with_password("pw");
    let err = client
        .update_password(Some("wrong"), AuthMode::Immediate)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Request { .. }));
    assert_eq!(client.committed_password(), None);

    // The connection remains usable.
    assert_eq!(client.exec(Command::ping()).unwrap(), WireValue::bytes(&b"PONG"[..]));
}

#[test]
fn test_immediate_auth_success_commits() {
    let (_engine, client) = setup_with_password("pw");
    assert_eq!(
        client.update_password(Some("pw"), AuthMode::Immediate).unwrap(),
        WireValue::Ok
    );
    assert_eq!(client.committed_password(), Some(b"pw".to_vec()));
}

#[test]
fn test_deferred_rotation_succeeds_before_first_connect() {
    let engine = Arc::new(ClusterEngine::new(1));
    engine.faults().set_unreachable(true);
    let api = engine_api(&engine);

    let config = ClientConfig::builder().lazy_connect(true).build();
    let client = Client::create(config, api).unwrap();

    // Staging is a local state change and must not force a connect.
    assert_eq!(
        client.update_password(Some("next"), AuthMode::Deferred).unwrap(),
        WireValue::Ok
    );

    // Immediate mode does need the link, which is still down.
    let err = client
        .update_password(Some("next"), AuthMode::Immediate)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Connection(_)));
}

#[test]
fn test_rotation_while_cluster_unreachable() {
    let (engine, client) = setup_with_password("pw");
    engine.faults().set_unreachable(true);

    // Deferred rotation only stages locally and needs no live link.
    assert_eq!(
        client.update_password(Some("next"), AuthMode::Deferred).unwrap(),
        WireValue::Ok
    );

    // Immediate rotation authenticates on the wire and cannot.
    let err = client
        .update_password(Some("next"), AuthMode::Immediate)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Connection(_)));
    assert_eq!(client.committed_password(), None);
}

#[test]
fn test_deferred_password_applies_on_reconnect() {
    let (engine, client) = setup_with_password("pw");

    // Stage a credential the cluster will reject, then force a reconnect
    // through a link drop with connection retries enabled. The reconnect
    // promotes the staged password and fails authentication.
    client
        .update_password(Some("wrong"), AuthMode::Deferred)
        .unwrap();
    engine
        .faults()
        .inject_link_fault(LinkFault::DropBeforeExecute);

    let options = BatchOptions::builder()
        .retry_strategy(BatchRetryStrategy {
            retry_server_error: false,
            retry_connection_error: true,
        })
        .build();
    let batch = Batch::new(false)
        .push(Command::ping())
        .with_options(options)
        .unwrap();
    let err = client.exec_batch(batch, true).unwrap_err();
    assert!(matches!(err, BridgeError::Connection(_)));
}
