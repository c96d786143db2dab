//! Command definitions
//!
//! A command is a per-call value object: an opcode, an ordered sequence of
//! byte-string arguments, and an optional route. It is immutable once built
//! and discarded after encoding.

use bytes::Bytes;

use crate::routing::Route;

/// Request opcodes understood by the engine.
///
/// Discriminants travel over the boundary as `u32`; they must match the
/// engine-side table. `Invalid` never crosses the boundary, the encoder
/// rejects it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RequestType {
    Invalid = 0,
    Ping = 1,
    Echo = 2,
    Get = 3,
    Set = 4,
    Del = 5,
    Exists = 6,
    Append = 7,
    Incr = 8,
    Auth = 9,
    /// Raw pass-through; the first argument names the command
    Custom = 10,
}

impl RequestType {
    /// Engine-side mapping from the raw boundary value.
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            1 => Some(RequestType::Ping),
            2 => Some(RequestType::Echo),
            3 => Some(RequestType::Get),
            4 => Some(RequestType::Set),
            5 => Some(RequestType::Del),
            6 => Some(RequestType::Exists),
            7 => Some(RequestType::Append),
            8 => Some(RequestType::Incr),
            9 => Some(RequestType::Auth),
            10 => Some(RequestType::Custom),
            _ => None,
        }
    }
}

/// A command ready for encoding
#[derive(Debug, Clone)]
pub struct Command {
    /// Opcode
    pub request_type: RequestType,

    /// Ordered byte-string arguments. `Bytes` keeps clones cheap when a
    /// command is resent by the retry machinery.
    pub args: Vec<Bytes>,

    /// Optional explicit route; `None` applies the command's default policy
    pub route: Option<Route>,
}

impl Command {
    /// Create a command with no arguments
    pub fn new(request_type: RequestType) -> Self {
        Self {
            request_type,
            args: Vec::new(),
            route: None,
        }
    }

    /// Append a byte-string argument
    pub fn arg(mut self, arg: impl Into<Bytes>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Attach an explicit route
    pub fn route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }

    /// First argument, which is the key for keyed commands
    pub fn key(&self) -> Option<&[u8]> {
        match self.request_type {
            RequestType::Get
            | RequestType::Set
            | RequestType::Del
            | RequestType::Exists
            | RequestType::Append
            | RequestType::Incr => self.args.first().map(|arg| arg.as_ref()),
            _ => None,
        }
    }
}

// Convenience constructors for the commands the tests and examples lean on.
impl Command {
    pub fn ping() -> Self {
        Command::new(RequestType::Ping)
    }

    pub fn get(key: impl Into<Bytes>) -> Self {
        Command::new(RequestType::Get).arg(key)
    }

    pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Command::new(RequestType::Set).arg(key).arg(value)
    }

    pub fn del(key: impl Into<Bytes>) -> Self {
        Command::new(RequestType::Del).arg(key)
    }

    pub fn append(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Command::new(RequestType::Append).arg(key).arg(value)
    }
}
