//! Client configuration
//!
//! Centralized configuration with sensible defaults. The whole configuration
//! crosses the native boundary as one serialized structured message
//! (bincode); nothing here is persisted, it lives for the process only.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// A single cluster seed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// "host:port" form, used as the key in multi-node reply maps.
    pub fn to_address_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TLS behavior for engine connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsMode {
    NoTls,
    SecureTls,
    InsecureTls,
}

/// Which nodes serve read commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadFrom {
    /// Always the slot owner
    Primary,
    /// Spread reads over replicas, falling back to the primary
    PreferReplica,
}

/// Wire protocol revision requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVersion {
    Resp2,
    Resp3,
}

/// Server credentials carried in the connection message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCredentials {
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

/// Reconnect backoff applied by the engine between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffStrategy {
    pub number_of_retries: u32,
    pub factor: u32,
    pub exponent_base: u32,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self {
            number_of_retries: 3,
            factor: 10,
            exponent_base: 2,
        }
    }
}

/// Periodic cluster-topology check policy (cluster mode only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodicChecks {
    Enabled,
    Disabled,
    ManualInterval { seconds: u32 },
}

/// Pub/sub channel subscription kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionKind {
    Exact,
    Pattern,
    Sharded,
}

/// A subscription descriptor registered at connection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub kind: SubscriptionKind,
    pub channel_or_pattern: Vec<u8>,
}

/// Main client configuration
///
/// Serialized wholesale into the connection request message handed to the
/// engine at `create_client` time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    // -------------------------------------------------------------------------
    // Cluster Topology
    // -------------------------------------------------------------------------
    /// Seed addresses. The engine discovers the rest in cluster mode.
    pub addresses: Vec<NodeAddress>,

    /// Whether the client targets a cluster or a standalone deployment
    pub cluster_mode: bool,

    /// Periodic topology-check policy (cluster mode only)
    pub periodic_checks: PeriodicChecks,

    // -------------------------------------------------------------------------
    // Connection Behavior
    // -------------------------------------------------------------------------
    pub tls_mode: TlsMode,

    pub read_from: ReadFrom,

    /// Per-request bound, in milliseconds. Covers sending, waiting for the
    /// reply, and reconnects/retries in between.
    pub request_timeout_ms: u64,

    /// Defer the engine connection until the first command
    pub lazy_connect: bool,

    /// Backoff between reconnection attempts
    pub reconnect_strategy: BackoffStrategy,

    // -------------------------------------------------------------------------
    // Session Identity
    // -------------------------------------------------------------------------
    /// Logical database index (standalone mode)
    pub database_id: u32,

    /// Client name reported to the engine
    pub client_name: Option<String>,

    pub protocol: ProtocolVersion,

    pub credentials: ServerCredentials,

    // -------------------------------------------------------------------------
    // Pub/Sub
    // -------------------------------------------------------------------------
    /// Subscriptions established at connect time
    pub subscriptions: Vec<Subscription>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addresses: vec![NodeAddress::new("127.0.0.1", 6379)],
            cluster_mode: false,
            periodic_checks: PeriodicChecks::Enabled,
            tls_mode: TlsMode::NoTls,
            read_from: ReadFrom::Primary,
            request_timeout_ms: 5000,
            lazy_connect: false,
            reconnect_strategy: BackoffStrategy::default(),
            database_id: 0,
            client_name: None,
            protocol: ProtocolVersion::Resp3,
            credentials: ServerCredentials::default(),
            subscriptions: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Serializes the configuration into the single structured message the
    /// boundary expects.
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|err| BridgeError::Encoding(format!("connection request: {}", err)))
    }

    /// Engine-side counterpart of [`to_wire_bytes`](Self::to_wire_bytes).
    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|err| BridgeError::Protocol(format!("connection request: {}", err)))
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Replace the seed address list
    pub fn addresses(mut self, addresses: Vec<NodeAddress>) -> Self {
        self.config.addresses = addresses;
        self
    }

    /// Add a single seed address
    pub fn address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.addresses.push(NodeAddress::new(host, port));
        self
    }

    /// Enable or disable cluster mode
    pub fn cluster_mode(mut self, enabled: bool) -> Self {
        self.config.cluster_mode = enabled;
        self
    }

    pub fn periodic_checks(mut self, policy: PeriodicChecks) -> Self {
        self.config.periodic_checks = policy;
        self
    }

    pub fn tls_mode(mut self, mode: TlsMode) -> Self {
        self.config.tls_mode = mode;
        self
    }

    pub fn read_from(mut self, policy: ReadFrom) -> Self {
        self.config.read_from = policy;
        self
    }

    /// Set the per-request timeout (in milliseconds)
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    /// Defer the engine connection until the first command
    pub fn lazy_connect(mut self, lazy: bool) -> Self {
        self.config.lazy_connect = lazy;
        self
    }

    pub fn reconnect_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.config.reconnect_strategy = strategy;
        self
    }

    /// Set the logical database index (standalone mode)
    pub fn database_id(mut self, id: u32) -> Self {
        self.config.database_id = id;
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = Some(name.into());
        self
    }

    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.config.protocol = protocol;
        self
    }

    pub fn credentials(mut self, credentials: ServerCredentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn subscription(mut self, kind: SubscriptionKind, channel: impl Into<Vec<u8>>) -> Self {
        self.config.subscriptions.push(Subscription {
            kind,
            channel_or_pattern: channel.into(),
        });
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
