//! Batches and batch options
//!
//! A batch is an ordered queue of commands submitted as one unit: atomic
//! (a transaction, all-or-nothing queuing and one execution unit) or
//! non-atomic (a pipeline of independently retriable commands). Batches are
//! per-call value objects, discarded after encoding.

use bytes::Bytes;

use crate::command::{Command, RequestType};
use crate::error::{BridgeError, Result};
use crate::routing::Route;

/// Retry policy for cluster batch requests.
///
/// Applies only to non-atomic batches.
///
/// Cautions, both deliberate trade-offs rather than defects:
/// - `retry_server_error`: a retried command can land after later same-slot
///   commands when the slot owner moved, reordering effects relative to
///   submission order.
/// - `retry_connection_error`: the engine cannot distinguish "never reached
///   the server" from "reply lost", so non-idempotent commands may execute
///   twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchRetryStrategy {
    /// Resend the specific sub-commands that failed with a retriable
    /// server-reported error (slot-migration class)
    pub retry_server_error: bool,

    /// Resend the whole affected sub-request after a reconnect
    pub retry_connection_error: bool,
}

/// Options attached to a batch submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOptions {
    /// Overrides the client's request timeout for this batch, in milliseconds
    pub timeout_ms: Option<u64>,

    /// Single-node route for the whole batch (cluster mode only)
    pub route: Option<Route>,

    /// Retry policy; meaningful only for non-atomic batches
    pub retry_strategy: Option<BatchRetryStrategy>,
}

impl BatchOptions {
    pub fn builder() -> BatchOptionsBuilder {
        BatchOptionsBuilder::default()
    }
}

/// Builder for BatchOptions
#[derive(Debug, Default)]
pub struct BatchOptionsBuilder {
    options: BatchOptions,
}

impl BatchOptionsBuilder {
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.options.timeout_ms = Some(ms);
        self
    }

    /// Route the whole batch to one node. Multi-node routes are rejected.
    pub fn route(mut self, route: Route) -> Result<Self> {
        if !route.is_single_node() {
            return Err(BridgeError::Configuration(
                "batch route must target a single node".to_string(),
            ));
        }
        self.options.route = Some(route);
        Ok(self)
    }

    pub fn retry_strategy(mut self, strategy: BatchRetryStrategy) -> Self {
        self.options.retry_strategy = Some(strategy);
        self
    }

    pub fn build(self) -> BatchOptions {
        self.options
    }
}

/// An ordered queue of commands submitted as one unit.
#[derive(Debug, Clone)]
pub struct Batch {
    commands: Vec<Command>,
    atomic: bool,
    options: BatchOptions,
}

impl Batch {
    /// Creates an empty batch. `atomic` selects transaction semantics.
    pub fn new(atomic: bool) -> Self {
        Self {
            commands: Vec::new(),
            atomic,
            options: BatchOptions::default(),
        }
    }

    /// Queue a pre-built command
    pub fn push(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Queue a command from an opcode and arguments
    pub fn add(mut self, request_type: RequestType, args: Vec<Bytes>) -> Self {
        self.commands.push(Command {
            request_type,
            args,
            route: None,
        });
        self
    }

    /// Attaches options, validating the combination before anything crosses
    /// the boundary. A retry strategy on an atomic batch is a configuration
    /// error: transactions are one execution unit and cannot re-run
    /// piecemeal.
    pub fn with_options(mut self, options: BatchOptions) -> Result<Self> {
        if self.atomic && options.retry_strategy.is_some() {
            return Err(BridgeError::Configuration(
                "retry strategies are not supported for atomic batches".to_string(),
            ));
        }
        if let Some(route) = &options.route {
            if !route.is_single_node() {
                return Err(BridgeError::Configuration(
                    "batch route must target a single node".to_string(),
                ));
            }
        }
        self.options = options;
        Ok(self)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
