//! Connection handle
//!
//! [`Client`] is the caller-facing handle over one engine connection: it
//! encodes requests, crosses the boundary, decodes replies, and owns the
//! connection lifecycle (create, password rotation, idempotent close).
//!
//! Two delivery modes exist, fixed at creation:
//!
//! - **Blocking**: every call crosses the boundary synchronously and the
//!   decoded value comes back on the caller's thread.
//! - **Callback**: calls return a [`ReplyHandle`] immediately; an engine
//!   worker thread executes the request and delivers the reply through a
//!   per-request channel identified by a baton-passed id.
//!
//! Replies are fully decoded into owned [`WireValue`]s before the native
//! allocation is released, and each allocation is released exactly once.

pub mod auth;

use std::collections::BTreeMap;
use std::os::raw::{c_char, c_void};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::batch::Batch;
use crate::command::Command;
use crate::config::ClientConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::{
    decode_command_result, decode_response, ClientType, CommandResponse, CommandResult,
    EncodedBatch, EncodedRequest, NativeApi,
};
use crate::value::WireValue;

pub use auth::AuthMode;
use auth::AuthRotationManager;

/// How replies come back from the engine, fixed per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Calls block on the engine and return the decoded value
    Blocking,

    /// Calls return a [`ReplyHandle`]; the engine delivers asynchronously
    Callback,
}

// =============================================================================
// Callback registry
// =============================================================================

// Callback-mode replies arrive on engine worker threads carrying only a
// request id. The registry maps ids to one-shot reply channels; delivery
// removes the entry, and a timed-out waiter removes it instead so a late
// reply is dropped rather than delivered to nobody.

type ReplySender = Sender<Result<WireValue>>;

static NEXT_CHANNEL: AtomicUsize = AtomicUsize::new(1);
static PENDING: Mutex<BTreeMap<usize, ReplySender>> = Mutex::new(BTreeMap::new());

fn register_reply_channel() -> (usize, Receiver<Result<WireValue>>) {
    let channel = NEXT_CHANNEL.fetch_add(1, Ordering::Relaxed);
    let (sender, receiver) = bounded(1);
    PENDING.lock().insert(channel, sender);
    (channel, receiver)
}

fn deliver_reply(channel: usize, outcome: Result<WireValue>) {
    if let Some(sender) = PENDING.lock().remove(&channel) {
        let _ = sender.send(outcome);
    }
}

/// Success callback registered with async connections. Decodes the response
/// into owned memory before returning; the engine frees its allocation right
/// after.
unsafe extern "C" fn on_success(channel: usize, response: *const CommandResponse) {
    let outcome = unsafe { decode_response(response) };
    deliver_reply(channel, outcome);
}

/// Failure callback registered with async connections. The error travels as
/// a message plus error-type code; translation goes by the code.
unsafe extern "C" fn on_failure(channel: usize, error_message: *const c_char, error_type: u32) {
    let message = if error_message.is_null() {
        "unknown error".to_string()
    } else {
        unsafe { std::ffi::CStr::from_ptr(error_message) }
            .to_string_lossy()
            .into_owned()
    };
    deliver_reply(channel, Err(BridgeError::from_boundary(message, error_type)));
}

// =============================================================================
// Reply handle
// =============================================================================

/// A pending callback-mode reply.
///
/// Dropping the handle without waiting abandons the reply; a late delivery
/// is then discarded.
#[derive(Debug)]
pub struct ReplyHandle {
    receiver: Receiver<Result<WireValue>>,
    channel: usize,
    timeout: Duration,
}

impl ReplyHandle {
    /// Waits for the reply, up to the request timeout.
    pub fn wait(self) -> Result<WireValue> {
        let timeout = self.timeout;
        self.wait_timeout(timeout)
    }

    /// Waits for the reply with an explicit bound. Timing out abandons the
    /// reply; the operation may still take effect on the server.
    pub fn wait_timeout(self, timeout: Duration) -> Result<WireValue> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                PENDING.lock().remove(&self.channel);
                Err(BridgeError::Timeout(format!(
                    "no reply within {} ms",
                    timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::Closing(
                "reply channel closed".to_string(),
            )),
        }
    }

    /// Non-blocking poll. Returns `None` while the reply is outstanding.
    pub fn try_poll(&self) -> Option<Result<WireValue>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for ReplyHandle {
    fn drop(&mut self) {
        PENDING.lock().remove(&self.channel);
    }
}

// =============================================================================
// Client
// =============================================================================

/// A handle over one engine connection.
///
/// Cheap to share behind an `Arc`; all methods take `&self`. Closing is
/// idempotent and independent per handle: sibling handles on the same
/// engine keep working.
pub struct Client {
    api: Arc<dyn NativeApi>,
    /// Raw connection pointer, 0 once closed
    conn: AtomicUsize,
    mode: DeliveryMode,
    auth: AuthRotationManager,
    request_timeout: Duration,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("conn", &self.conn)
            .field("mode", &self.mode)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Connects in blocking delivery mode.
    pub fn create(config: ClientConfig, api: Arc<dyn NativeApi>) -> Result<Self> {
        Self::create_with_mode(config, DeliveryMode::Blocking, api)
    }

    /// Connects with an explicit delivery mode.
    pub fn create_with_mode(
        config: ClientConfig,
        mode: DeliveryMode,
        api: Arc<dyn NativeApi>,
    ) -> Result<Self> {
        let request = config.to_wire_bytes()?;
        let client_type = match mode {
            DeliveryMode::Blocking => ClientType::Sync,
            DeliveryMode::Callback => ClientType::Async {
                success_callback: on_success,
                failure_callback: on_failure,
            },
        };

        let response = unsafe {
            create_connection(api.as_ref(), &request, &client_type)
        }?;

        info!(mode = ?mode, "client connected");
        Ok(Self {
            api,
            conn: AtomicUsize::new(response as usize),
            mode,
            auth: AuthRotationManager::default(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.conn.load(Ordering::SeqCst) == 0
    }

    /// The credential committed by the last successful rotation.
    pub fn committed_password(&self) -> Option<Vec<u8>> {
        self.auth.committed()
    }

    // -------------------------------------------------------------------------
    // Single commands
    // -------------------------------------------------------------------------

    /// Executes a command and waits for its decoded reply.
    pub fn exec(&self, command: Command) -> Result<WireValue> {
        match self.mode {
            DeliveryMode::Blocking => {
                let encoded = EncodedRequest::encode(command)?;
                let conn = self.live_conn()?;
                let result = unsafe { self.call_command(conn, 0, &encoded) };
                self.consume_result(result)
            }
            DeliveryMode::Callback => self.dispatch(command)?.wait(),
        }
    }

    /// Submits a command without blocking. Callback mode only.
    pub fn dispatch(&self, command: Command) -> Result<ReplyHandle> {
        self.require_callback_mode()?;
        let encoded = EncodedRequest::encode(command)?;
        let conn = self.live_conn()?;
        self.dispatch_inner(self.request_timeout, |channel| unsafe {
            self.call_command(conn, channel, &encoded)
        })
    }

    // -------------------------------------------------------------------------
    // Batches
    // -------------------------------------------------------------------------

    /// Executes a batch and waits for its reply array.
    ///
    /// With `raise_on_error`, the first failed command (in submission order)
    /// surfaces as this call's error after the whole batch ran. Without it,
    /// failures come back embedded in the array as
    /// [`WireValue::ServerError`] at the failed index.
    pub fn exec_batch(&self, batch: Batch, raise_on_error: bool) -> Result<WireValue> {
        match self.mode {
            DeliveryMode::Blocking => {
                let encoded = EncodedBatch::encode(batch, self.request_timeout.as_millis() as u64)?;
                let conn = self.live_conn()?;
                let result = unsafe { self.call_batch(conn, 0, &encoded, raise_on_error) };
                self.consume_result(result)
            }
            DeliveryMode::Callback => self.dispatch_batch(batch, raise_on_error)?.wait(),
        }
    }

    /// Submits a batch without blocking. Callback mode only.
    pub fn dispatch_batch(&self, batch: Batch, raise_on_error: bool) -> Result<ReplyHandle> {
        self.require_callback_mode()?;
        let encoded = EncodedBatch::encode(batch, self.request_timeout.as_millis() as u64)?;
        let conn = self.live_conn()?;
        let timeout = Duration::from_millis(encoded.timeout_ms());
        self.dispatch_inner(timeout, |channel| unsafe {
            self.call_batch(conn, channel, &encoded, raise_on_error)
        })
    }

    // -------------------------------------------------------------------------
    // Credential rotation
    // -------------------------------------------------------------------------

    /// Replaces the connection password.
    ///
    /// `Deferred` stages the credential for the engine's next reconnect;
    /// `Immediate` re-authenticates the live connection now and requires a
    /// non-empty password, validated before anything crosses the boundary.
    /// `None` clears the stored credential.
    pub fn update_password(
        &self,
        password: Option<&str>,
        mode: AuthMode,
    ) -> Result<WireValue> {
        let conn = self.live_conn()?;
        let bytes = password.map(|password| password.as_bytes().to_vec());
        let c_password = std::ffi::CString::new(password.unwrap_or(""))
            .map_err(|_| {
                BridgeError::Encoding("password contains a nul byte".to_string())
            })?;
        let immediate = mode == AuthMode::Immediate;

        self.auth.rotate(bytes, mode, || {
            self.invoke(self.request_timeout, |channel| unsafe {
                self.api.update_connection_password(
                    conn as *const c_void,
                    channel,
                    c_password.as_ptr(),
                    immediate,
                )
            })
        })
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Closes the handle. Safe to call more than once; later calls are
    /// no-ops. In-flight callback replies for this handle are abandoned.
    pub fn close(&self) {
        let conn = self.conn.swap(0, Ordering::SeqCst);
        if conn != 0 {
            debug!("closing client");
            unsafe { self.api.close_client(conn as *const c_void) };
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn live_conn(&self) -> Result<usize> {
        match self.conn.load(Ordering::SeqCst) {
            0 => Err(BridgeError::Closing("client is closed".to_string())),
            conn => Ok(conn),
        }
    }

    fn require_callback_mode(&self) -> Result<()> {
        if self.mode == DeliveryMode::Callback {
            Ok(())
        } else {
            Err(BridgeError::Configuration(
                "non-blocking dispatch requires callback delivery mode".to_string(),
            ))
        }
    }

    unsafe fn call_command(
        &self,
        conn: usize,
        channel: usize,
        encoded: &EncodedRequest,
    ) -> *mut CommandResult {
        unsafe {
            self.api.command(
                conn as *const c_void,
                channel,
                encoded.request_type(),
                encoded.arg_count(),
                encoded.arg_ptrs(),
                encoded.arg_lens(),
                encoded.route_ptr(),
                encoded.route_len(),
            )
        }
    }

    unsafe fn call_batch(
        &self,
        conn: usize,
        channel: usize,
        encoded: &EncodedBatch,
        raise_on_error: bool,
    ) -> *mut CommandResult {
        unsafe {
            self.api.batch(
                conn as *const c_void,
                channel,
                encoded.info(),
                raise_on_error,
                encoded.options(),
            )
        }
    }

    /// Blocking-or-callback bridge for calls that always wait (password
    /// rotation, and any blocking-mode call).
    fn invoke(
        &self,
        timeout: Duration,
        call: impl FnOnce(usize) -> *mut CommandResult,
    ) -> Result<WireValue> {
        match self.mode {
            DeliveryMode::Blocking => self.consume_result(call(0)),
            DeliveryMode::Callback => self.dispatch_inner(timeout, call)?.wait(),
        }
    }

    /// Registers a reply channel, performs the native call, and hands back
    /// the handle. An inline (non-null) result resolves the handle
    /// immediately.
    fn dispatch_inner(
        &self,
        timeout: Duration,
        call: impl FnOnce(usize) -> *mut CommandResult,
    ) -> Result<ReplyHandle> {
        let (channel, receiver) = register_reply_channel();
        let result = call(channel);
        if !result.is_null() {
            let outcome = self.consume_result(result);
            deliver_reply(channel, outcome);
        }
        Ok(ReplyHandle {
            receiver,
            channel,
            timeout,
        })
    }

    /// Decodes a returned result and releases it exactly once.
    fn consume_result(&self, result: *mut CommandResult) -> Result<WireValue> {
        if result.is_null() {
            return Err(BridgeError::Protocol(
                "engine returned no result".to_string(),
            ));
        }
        let outcome = unsafe { decode_command_result(result) };
        unsafe { self.api.free_command_result(result) };
        outcome
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

/// Performs the `create_client` boundary call, decoding and releasing the
/// connection response.
unsafe fn create_connection(
    api: &dyn NativeApi,
    request: &[u8],
    client_type: &ClientType,
) -> Result<*const c_void> {
    let response_ptr = unsafe {
        api.create_client(request.as_ptr(), request.len(), client_type as *const ClientType)
    };
    if response_ptr.is_null() {
        return Err(BridgeError::Closing(
            "engine returned no connection response".to_string(),
        ));
    }
    let response = unsafe { &*response_ptr };
    let outcome = if !response.conn_ptr.is_null() {
        Ok(response.conn_ptr)
    } else if !response.connection_error_message.is_null() {
        let message = unsafe {
            std::ffi::CStr::from_ptr(response.connection_error_message)
        }
        .to_string_lossy()
        .into_owned();
        Err(BridgeError::Connection(message))
    } else {
        Err(BridgeError::Connection(
            "connection failed with no error message".to_string(),
        ))
    };
    unsafe { api.free_connection_response(response_ptr) };
    outcome
}
