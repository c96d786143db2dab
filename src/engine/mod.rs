//! In-process execution engine
//!
//! A shared-core stand-in living behind the [`NativeApi`](crate::protocol::NativeApi)
//! boundary: a small keyspace cluster with slot-based routing, transactions,
//! pipelines with per-command retries, and connection sessions with
//! credential rotation. Fault injection hooks make the failure paths the
//! wrapper must survive reproducible from tests.

pub mod api;
pub mod cluster;
pub mod faults;
pub mod node;
pub mod pipeline;
pub mod retry;

pub use api::EngineApi;
pub use cluster::{ClientSession, ClusterEngine};
pub use faults::{FaultPlan, LinkFault};
pub use retry::ServerFailure;
