//! Batch Construction Tests
//!
//! Tests for batch building and for the option validation that runs
//! strictly before anything crosses the boundary.

use bytes::Bytes;

use keybridge::batch::{Batch, BatchOptions, BatchRetryStrategy};
use keybridge::command::{Command, RequestType};
use keybridge::error::BridgeError;
use keybridge::routing::Route;

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_batch_keeps_submission_order() {
    let batch = Batch::new(false)
        .push(Command::set("a", "1"))
        .add(RequestType::Get, vec![Bytes::from_static(b"a")])
        .push(Command::ping());
    assert_eq!(batch.len(), 3);
    assert!(!batch.is_atomic());

    let types: Vec<_> = batch
        .commands()
        .iter()
        .map(|command| command.request_type)
        .collect();
    assert_eq!(
        types,
        vec![RequestType::Set, RequestType::Get, RequestType::Ping]
    );
}

#[test]
fn test_empty_batch() {
    let batch = Batch::new(true);
    assert!(batch.is_empty());
    assert!(batch.is_atomic());
}

#[test]
fn test_default_retry_strategy_is_off() {
    let strategy = BatchRetryStrategy::default();
    assert!(!strategy.retry_server_error);
    assert!(!strategy.retry_connection_error);
}

// =============================================================================
// Option Validation
// =============================================================================

#[test]
fn test_retry_strategy_rejected_on_atomic_batch() {
    let options = BatchOptions::builder()
        .retry_strategy(BatchRetryStrategy {
            retry_server_error: true,
            retry_connection_error: false,
        })
        .build();
    let err = Batch::new(true)
        .push(Command::ping())
        .with_options(options)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

#[test]
fn test_retry_strategy_allowed_on_pipeline() {
    let options = BatchOptions::builder()
        .retry_strategy(BatchRetryStrategy {
            retry_server_error: true,
            retry_connection_error: true,
        })
        .build();
    let batch = Batch::new(false)
        .push(Command::ping())
        .with_options(options)
        .unwrap();
    assert_eq!(
        batch.options().retry_strategy,
        Some(BatchRetryStrategy {
            retry_server_error: true,
            retry_connection_error: true,
        })
    );
}

#[test]
fn test_multi_node_route_rejected_by_builder() {
    let err = BatchOptions::builder().route(Route::AllNodes).unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

#[test]
fn test_multi_node_route_rejected_by_with_options() {
    // Covers options built by hand rather than through the builder.
    let options = BatchOptions {
        timeout_ms: None,
        route: Some(Route::AllPrimaries),
        retry_strategy: None,
    };
    let err = Batch::new(false)
        .push(Command::ping())
        .with_options(options)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

#[test]
fn test_single_node_route_accepted() {
    let options = BatchOptions::builder().route(Route::Random).unwrap().build();
    let batch = Batch::new(true)
        .push(Command::ping())
        .with_options(options)
        .unwrap();
    assert_eq!(batch.options().route, Some(Route::Random));
}
