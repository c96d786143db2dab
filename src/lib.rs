//! # KeyBridge
//!
//! A client bridge to a shared key-value cluster engine with:
//! - A C-shaped call boundary with exact ownership and release rules
//! - Tagged-union wire values decoded into owned Rust data
//! - Atomic and pipelined batches with per-command retry semantics
//! - Connection handles with credential rotation and idempotent close
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Client Handle                             │
//! │          (blocking or callback delivery)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Wire Protocol                               │
//! │   (encoder / decoder / repr(C) shapes / release rules)       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  NativeApi boundary
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Execution Engine                             │
//! │     (sessions, slot routing, pipelines, fault plan)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Node     │   ...    │    Node     │
//!   │  (RwLock)   │          │  (RwLock)   │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod value;
pub mod command;
pub mod routing;
pub mod batch;
pub mod protocol;
pub mod engine;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BridgeError, RequestErrorKind, Result};
pub use config::{ClientConfig, NodeAddress};
pub use value::WireValue;
pub use command::{Command, RequestType};
pub use routing::Route;
pub use batch::{Batch, BatchOptions, BatchRetryStrategy};
pub use client::{AuthMode, Client, DeliveryMode, ReplyHandle};
pub use engine::{ClusterEngine, EngineApi};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of KeyBridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
