//! Boundary type layouts
//!
//! The `#[repr(C)]` structs crossing the native call boundary. These layouts
//! are the wire contract between the client half of the crate and the
//! execution engine; both sides treat them as a foreign ABI and never reach
//! around them.

use std::os::raw::{c_char, c_ulong, c_void};

/// Response tags. The raw `u32` travels in `CommandResponse::response_type`;
/// anything outside this table is a fatal wrapper/engine mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResponseType {
    Null = 0,
    Int = 1,
    Float = 2,
    Bool = 3,
    String = 4,
    Array = 5,
    Map = 6,
    Sets = 7,
    Ok = 8,
    Error = 9,
}

impl ResponseType {
    /// Maps a raw tag to its type, or `None` for an unknown tag. The decoder
    /// turns `None` into a ProtocolError; it must never be swallowed.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(ResponseType::Null),
            1 => Some(ResponseType::Int),
            2 => Some(ResponseType::Float),
            3 => Some(ResponseType::Bool),
            4 => Some(ResponseType::String),
            5 => Some(ResponseType::Array),
            6 => Some(ResponseType::Map),
            7 => Some(ResponseType::Sets),
            8 => Some(ResponseType::Ok),
            9 => Some(ResponseType::Error),
            _ => None,
        }
    }
}

/// A single response node.
///
/// Exactly one family of fields is populated, selected by `response_type`:
/// - `Int`/`Float`/`Bool`: the scalar fields
/// - `String`/`Error`: `string_value` + `string_value_len`
/// - `Array`: `array_value` + `array_value_len`, a contiguous child array
/// - `Map`: `array_value` + `array_value_len`, each child carrying
///   independently allocated `map_key`/`map_value` pointers
/// - `Sets`: `sets_value` + `sets_value_len`
///
/// Every buffer reachable from a response is owned by the engine allocation
/// and released transitively by [`free_command_result`](super::convert::free_command_result);
/// consumers must fully materialize before releasing.
#[repr(C)]
#[derive(Debug)]
pub struct CommandResponse {
    pub response_type: u32,
    pub int_value: i64,
    pub float_value: f64,
    pub bool_value: bool,

    pub string_value: *mut u8,
    pub string_value_len: i64,

    pub array_value: *mut CommandResponse,
    pub array_value_len: i64,

    pub map_key: *mut CommandResponse,
    pub map_value: *mut CommandResponse,

    pub sets_value: *mut CommandResponse,
    pub sets_value_len: i64,
}

impl Default for CommandResponse {
    fn default() -> Self {
        CommandResponse {
            response_type: ResponseType::Null as u32,
            int_value: 0,
            float_value: 0.0,
            bool_value: false,
            string_value: std::ptr::null_mut(),
            string_value_len: 0,
            array_value: std::ptr::null_mut(),
            array_value_len: 0,
            map_key: std::ptr::null_mut(),
            map_value: std::ptr::null_mut(),
            sets_value: std::ptr::null_mut(),
            sets_value_len: 0,
        }
    }
}

/// An error returned for a failed command: a nul-terminated message plus the
/// error-type code (see `RequestErrorKind`). Translated by code, never by
/// message text.
#[repr(C)]
#[derive(Debug)]
pub struct CommandError {
    pub command_error_message: *const c_char,
    pub command_error_type: u32,
}

/// Result of executing a command: exactly one of `response` or
/// `command_error` is non-null. Released exactly once via
/// [`free_command_result`](super::convert::free_command_result), which frees
/// nested payloads transitively.
#[repr(C)]
#[derive(Debug)]
pub struct CommandResult {
    pub response: *mut CommandResponse,
    pub command_error: *mut CommandError,
}

/// Result of `create_client`: either a valid opaque connection pointer or an
/// error message. Released exactly once via
/// [`free_connection_response`](super::convert::free_connection_response);
/// the `conn_ptr` itself lives until `close_client`.
#[repr(C)]
#[derive(Debug)]
pub struct ConnectionResponse {
    pub conn_ptr: *const c_void,
    pub connection_error_message: *const c_char,
}

/// Invoked by the engine from its own worker thread when an async command
/// succeeds. The response is owned by the engine and freed when the callback
/// returns; the callback must copy synchronously. `channel` is the
/// baton-pass identifying the caller's pending reply.
pub type SuccessCallback =
    unsafe extern "C" fn(channel: usize, response: *const CommandResponse);

/// Invoked by the engine from its own worker thread when an async command
/// fails. The message is freed when the callback returns.
pub type FailureCallback =
    unsafe extern "C" fn(channel: usize, error_message: *const c_char, error_type: u32);

/// How the engine should deliver results for a connection.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub enum ClientType {
    /// Calls block and return a `CommandResult` directly
    Sync,

    /// Calls return null immediately; results arrive through the callbacks
    /// from an engine worker thread
    Async {
        success_callback: SuccessCallback,
        failure_callback: FailureCallback,
    },
}

/// One encoded command inside a batch crossing the boundary.
///
/// `args` / `args_len` are parallel arrays of `arg_count` entries; the
/// pointed-to buffers are caller-owned and must stay alive for the duration
/// of the call.
#[repr(C)]
#[derive(Debug)]
pub struct CmdInfo {
    pub request_type: u32,
    pub args: *const *const u8,
    pub arg_count: usize,
    pub args_len: *const c_ulong,
}

/// An ordered batch of commands plus the atomicity flag.
#[repr(C)]
#[derive(Debug)]
pub struct BatchInfo {
    pub cmd_count: usize,
    pub cmds: *const *const CmdInfo,
    pub is_atomic: bool,
}

/// Batch submission options. The route, when present, crosses as the same
/// serialized route message used by single commands.
#[repr(C)]
#[derive(Debug)]
pub struct BatchOptionsInfo {
    pub retry_server_error: bool,
    pub retry_connection_error: bool,
    pub has_timeout: bool,
    pub timeout_ms: u64,
    pub route_bytes: *const u8,
    pub route_bytes_len: usize,
}
