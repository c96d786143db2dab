//! Native call boundary
//!
//! The entry points the execution engine exposes, mirrored as a trait so the
//! client half of the crate is generic over the engine behind it. Signatures
//! and ownership rules match the C boundary exactly; implementations receive
//! raw pointers and give back heap allocations the caller must release
//! through the matching free, exactly once.

use std::os::raw::{c_char, c_ulong, c_void};

use super::types::{
    BatchInfo, BatchOptionsInfo, ClientType, CommandResult, ConnectionResponse,
};

/// The native boundary surface.
///
/// # Safety
///
/// Every method is a foreign-call shape: callers must uphold the pointer
/// contracts documented per method, and implementations must never retain
/// caller-owned buffers past the call.
pub trait NativeApi: Send + Sync {
    /// Creates a connection from a serialized connection request.
    ///
    /// Returns a `ConnectionResponse` holding either an opaque connection
    /// pointer (valid until [`close_client`](Self::close_client)) or an
    /// error message. The response itself must be released exactly once via
    /// [`free_connection_response`](Self::free_connection_response).
    ///
    /// # Safety
    ///
    /// `request_bytes` must point to `request_len` initialized bytes, alive
    /// for the duration of the call; `client_type` must point to a valid
    /// `ClientType`.
    unsafe fn create_client(
        &self,
        request_bytes: *const u8,
        request_len: usize,
        client_type: *const ClientType,
    ) -> *mut ConnectionResponse;

    /// Releases a `ConnectionResponse` (not the connection inside it).
    ///
    /// # Safety
    ///
    /// `response` must come from [`create_client`](Self::create_client) on
    /// this api and must not be freed twice.
    unsafe fn free_connection_response(&self, response: *mut ConnectionResponse);

    /// Releases the connection. Must be called at most once per connection;
    /// the wrapper guards against double-close. Other connections sharing
    /// the engine listener are unaffected.
    ///
    /// # Safety
    ///
    /// `conn_ptr` must be a connection pointer from
    /// [`create_client`](Self::create_client) that has not been closed.
    unsafe fn close_client(&self, conn_ptr: *const c_void);

    /// Executes a single command.
    ///
    /// For sync connections the result is returned directly and must be
    /// released via [`free_command_result`](Self::free_command_result)
    /// exactly once. For async connections this returns null immediately and
    /// the registered callbacks fire from an engine worker thread; `channel`
    /// is passed back to correlate the reply.
    ///
    /// # Safety
    ///
    /// `args`/`args_len` must be parallel arrays of `arg_count` entries (or
    /// both null with `arg_count` 0); all pointed-to buffers, and
    /// `route_bytes`, are caller-owned and must stay alive for the duration
    /// of the call only — the engine copies what it needs before returning.
    #[allow(clippy::too_many_arguments)] // the boundary signature is fixed
    unsafe fn command(
        &self,
        conn_ptr: *const c_void,
        channel: usize,
        request_type: u32,
        arg_count: c_ulong,
        args: *const usize,
        args_len: *const c_ulong,
        route_bytes: *const u8,
        route_bytes_len: usize,
    ) -> *mut CommandResult;

    /// Executes a batch (atomic transaction or non-atomic pipeline).
    ///
    /// Result delivery follows the same sync/async split as
    /// [`command`](Self::command). A successful result decodes to an array
    /// of per-command replies in submission order.
    ///
    /// # Safety
    ///
    /// `batch` and `options` must point to valid structs whose nested arrays
    /// and buffers stay alive for the duration of the call.
    unsafe fn batch(
        &self,
        conn_ptr: *const c_void,
        channel: usize,
        batch: *const BatchInfo,
        raise_on_error: bool,
        options: *const BatchOptionsInfo,
    ) -> *mut CommandResult;

    /// Replaces the connection's password.
    ///
    /// With `immediate_auth` the engine authenticates on the live connection
    /// now; otherwise the credential only applies to the next reconnect. An
    /// empty password clears the stored credential.
    ///
    /// # Safety
    ///
    /// `password` must be a valid nul-terminated string alive for the
    /// duration of the call.
    unsafe fn update_connection_password(
        &self,
        conn_ptr: *const c_void,
        channel: usize,
        password: *const c_char,
        immediate_auth: bool,
    ) -> *mut CommandResult;

    /// Releases a `CommandResult` and, transitively, its nested payloads.
    ///
    /// # Safety
    ///
    /// `result` must come from this api and must not be freed twice.
    unsafe fn free_command_result(&self, result: *mut CommandResult);
}
