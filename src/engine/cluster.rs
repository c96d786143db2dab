//! Cluster topology and connection sessions
//!
//! [`ClusterEngine`] owns the nodes, the slot map, and the fault plan.
//! [`ClientSession`] is the engine-side state behind one connection pointer:
//! delivery mode, connection status, and the active/pending credential pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::ClientConfig;
use crate::protocol::ClientType;
use crate::routing::{hash_slot, Route, SLOT_COUNT};

use super::faults::FaultPlan;
use super::node::Node;
use super::retry::ServerFailure;

/// The node(s) a route resolves to.
pub enum Target {
    Single(Arc<Node>),
    Multi(Vec<Arc<Node>>),
}

/// A fixed-topology cluster: every node is a primary owning a contiguous
/// slot range.
pub struct ClusterEngine {
    nodes: Vec<Arc<Node>>,
    faults: FaultPlan,
    required_password: Option<Vec<u8>>,
}

impl ClusterEngine {
    /// Builds an open cluster of `node_count` nodes.
    pub fn new(node_count: usize) -> Self {
        Self::build(node_count, None)
    }

    /// Builds a cluster requiring `password` at connect and auth time.
    pub fn with_password(node_count: usize, password: impl Into<Vec<u8>>) -> Self {
        Self::build(node_count, Some(password.into()))
    }

    fn build(node_count: usize, required_password: Option<Vec<u8>>) -> Self {
        let count = node_count.max(1);
        let nodes = (0..count)
            .map(|index| {
                Arc::new(Node::new(
                    format!("127.0.0.1:{}", 7000 + index),
                    required_password.clone(),
                ))
            })
            .collect();
        Self {
            nodes,
            faults: FaultPlan::default(),
            required_password,
        }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The primary owning a slot. Slots are split into contiguous ranges of
    /// equal width across the nodes.
    pub fn node_for_slot(&self, slot: u16) -> Arc<Node> {
        let index = (slot as usize * self.nodes.len()) / SLOT_COUNT as usize;
        Arc::clone(&self.nodes[index.min(self.nodes.len() - 1)])
    }

    pub fn node_for_key(&self, key: &[u8]) -> Arc<Node> {
        self.node_for_slot(hash_slot(key))
    }

    /// Resolves a route to its target node(s).
    pub fn resolve_route(&self, route: &Route) -> Result<Target, ServerFailure> {
        match route {
            // Deterministic pick keeps fault scenarios reproducible.
            Route::Random => Ok(Target::Single(Arc::clone(&self.nodes[0]))),
            // No replicas in this topology, so both fan-outs cover the same
            // set and replica reads land on the owner.
            Route::AllNodes | Route::AllPrimaries => {
                Ok(Target::Multi(self.nodes.iter().map(Arc::clone).collect()))
            }
            Route::SlotId { slot_id, .. } => {
                if *slot_id >= SLOT_COUNT {
                    return Err(ServerFailure::Request(format!(
                        "slot {} out of range",
                        slot_id
                    )));
                }
                Ok(Target::Single(self.node_for_slot(*slot_id)))
            }
            Route::SlotKey { key, .. } => Ok(Target::Single(self.node_for_key(key))),
            Route::ByAddress { host, port } => {
                let address = format!("{}:{}", host, port);
                self.nodes
                    .iter()
                    .find(|node| node.address() == address)
                    .map(|node| Target::Single(Arc::clone(node)))
                    .ok_or_else(|| {
                        ServerFailure::Request(format!("no node at address {}", address))
                    })
            }
        }
    }

    /// Whether an offered password satisfies the cluster requirement.
    pub fn verify_password(&self, offered: Option<&[u8]>) -> bool {
        match (&self.required_password, offered) {
            (None, _) => true,
            (Some(required), Some(offered)) => required.as_slice() == offered,
            (Some(_), None) => false,
        }
    }
}

/// Credential pair for a session: the password in use on the live link, and
/// the one staged for the next reconnect.
#[derive(Default)]
struct SessionAuth {
    active: Option<Vec<u8>>,
    pending: Option<Vec<u8>>,
}

/// Engine-side state behind one connection pointer.
///
/// Shared as an `Arc`: the raw connection pointer holds one strong count,
/// and every in-flight request holds another, so closing the connection
/// while requests are in flight is safe.
pub struct ClientSession {
    engine: Arc<ClusterEngine>,
    config: ClientConfig,
    client_type: ClientType,
    connected: AtomicBool,
    auth: Mutex<SessionAuth>,
}

impl ClientSession {
    /// Opens a session, connecting immediately unless the configuration
    /// defers the connection to the first command.
    pub fn open(
        engine: Arc<ClusterEngine>,
        config: ClientConfig,
        client_type: ClientType,
    ) -> Result<Arc<Self>, ServerFailure> {
        let session = Arc::new(Self {
            auth: Mutex::new(SessionAuth {
                active: config.credentials.password.clone(),
                pending: None,
            }),
            engine,
            config,
            client_type,
            connected: AtomicBool::new(false),
        });
        if !session.config.lazy_connect {
            session.connect()?;
        }
        Ok(session)
    }

    pub fn engine(&self) -> &ClusterEngine {
        &self.engine
    }

    pub fn client_type(&self) -> ClientType {
        self.client_type
    }

    pub fn request_timeout_ms(&self) -> u64 {
        self.config.request_timeout_ms
    }

    /// The password currently applied to the live link, for inspection from
    /// tests.
    pub fn active_password(&self) -> Option<Vec<u8>> {
        self.auth.lock().active.clone()
    }

    /// Connects (or verifies the connection) using the active credential.
    fn connect(&self) -> Result<(), ServerFailure> {
        if self.engine.faults.is_unreachable() {
            return Err(ServerFailure::ConnectionLost(
                "connection refused".to_string(),
            ));
        }
        let auth = self.auth.lock();
        if !self.engine.verify_password(auth.active.as_deref()) {
            return Err(ServerFailure::ConnectionLost(
                "authentication failed".to_string(),
            ));
        }
        drop(auth);
        self.connected.store(true, Ordering::SeqCst);
        debug!(client = ?self.config.client_name, "session connected");
        Ok(())
    }

    /// Connects lazily on first use.
    pub fn ensure_connected(&self) -> Result<(), ServerFailure> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.connect()
    }

    /// Re-establishes the link after a drop, promoting the staged credential
    /// before authenticating.
    pub fn reconnect(&self) -> Result<(), ServerFailure> {
        self.connected.store(false, Ordering::SeqCst);
        {
            let mut auth = self.auth.lock();
            if let Some(pending) = auth.pending.take() {
                auth.active = if pending.is_empty() { None } else { Some(pending) };
            }
        }
        debug!(client = ?self.config.client_name, "session reconnecting");
        self.connect()
    }

    /// Replaces the session password.
    ///
    /// Immediate mode authenticates on the live link now and fails without
    /// changing anything if the cluster rejects the credential. Deferred
    /// mode stages it for the next reconnect without touching the link.
    /// `None` clears the credential.
    pub fn update_password(
        &self,
        password: Option<Vec<u8>>,
        immediate_auth: bool,
    ) -> Result<(), ServerFailure> {
        if immediate_auth {
            // Immediate auth runs on the live link; staging does not.
            self.ensure_connected()?;
            if self.engine.faults.is_unreachable() {
                return Err(ServerFailure::ConnectionLost(
                    "connection refused".to_string(),
                ));
            }
            if !self.engine.verify_password(password.as_deref()) {
                return Err(ServerFailure::Request(
                    "WRONGPASS invalid password".to_string(),
                ));
            }
            let mut auth = self.auth.lock();
            auth.active = password;
            auth.pending = None;
        } else {
            self.auth.lock().pending = Some(password.unwrap_or_default());
        }
        Ok(())
    }
}
