//! Engine boundary implementation
//!
//! [`EngineApi`] implements the [`NativeApi`](crate::protocol::NativeApi)
//! surface over an in-process [`ClusterEngine`]. Ownership at the boundary
//! follows the foreign-call rules exactly: every caller buffer is copied
//! before the call returns, connection pointers carry an `Arc` strong count,
//! and every returned allocation has one matching free.
//!
//! Sync sessions run inline and return a `CommandResult`. Async sessions
//! return null immediately; a worker thread executes the request and invokes
//! the registered callbacks, freeing the callback payload after the callback
//! returns.

use std::os::raw::{c_char, c_ulong, c_void};
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use crossbeam::channel::{unbounded, Sender};
use tracing::{debug, warn};

use crate::command::RequestType;
use crate::protocol::convert::{
    bridge_failure_result, connection_failure, connection_success, failure_result,
    free_command_response, free_error_message, message_into_raw, success_result,
    value_to_response,
};
use crate::protocol::types::{
    BatchInfo, BatchOptionsInfo, ClientType, CommandResult, ConnectionResponse,
};
use crate::protocol::NativeApi;
use crate::routing::Route;
use crate::value::WireValue;
use crate::config::ClientConfig;
use crate::batch::BatchRetryStrategy;

use super::cluster::{ClientSession, ClusterEngine};
use super::pipeline::{self, BatchCommand, PipelineOptions};
use super::retry::ServerFailure;

/// Worker threads serving async requests.
const WORKER_COUNT: usize = 4;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// The engine side of the native boundary.
pub struct EngineApi {
    engine: Arc<ClusterEngine>,
    work_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl EngineApi {
    pub fn new(engine: Arc<ClusterEngine>) -> Self {
        let (work_tx, work_rx) = unbounded::<Job>();
        let workers = (0..WORKER_COUNT)
            .map(|index| {
                let work_rx = work_rx.clone();
                std::thread::Builder::new()
                    .name(format!("engine-worker-{}", index))
                    .spawn(move || {
                        while let Ok(job) = work_rx.recv() {
                            job();
                        }
                    })
                    .expect("failed to spawn engine worker")
            })
            .collect();
        Self {
            engine,
            work_tx: Some(work_tx),
            workers,
        }
    }

    pub fn engine(&self) -> &Arc<ClusterEngine> {
        &self.engine
    }

    fn enqueue(&self, job: Job) {
        if let Some(work_tx) = &self.work_tx {
            // Receivers only disappear at drop, so this cannot fail while
            // the api is alive.
            let _ = work_tx.send(job);
        }
    }
}

impl Drop for EngineApi {
    fn drop(&mut self) {
        // Closing the channel stops the workers once queued jobs drain.
        self.work_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl NativeApi for EngineApi {
    unsafe fn create_client(
        &self,
        request_bytes: *const u8,
        request_len: usize,
        client_type: *const ClientType,
    ) -> *mut ConnectionResponse {
        if request_bytes.is_null() || client_type.is_null() {
            return connection_failure("null connection request");
        }
        let request = unsafe { std::slice::from_raw_parts(request_bytes, request_len) };
        let config = match ClientConfig::from_wire_bytes(request) {
            Ok(config) => config,
            Err(err) => return connection_failure(&err.to_string()),
        };
        let client_type = unsafe { *client_type };
        match ClientSession::open(Arc::clone(&self.engine), config, client_type) {
            Ok(session) => {
                debug!("connection established");
                connection_success(Arc::into_raw(session) as *const c_void)
            }
            Err(failure) => {
                warn!(error = failure.message(), "connection failed");
                connection_failure(failure.message())
            }
        }
    }

    unsafe fn free_connection_response(&self, response: *mut ConnectionResponse) {
        unsafe { crate::protocol::convert::free_connection_response(response) };
    }

    unsafe fn close_client(&self, conn_ptr: *const c_void) {
        if conn_ptr.is_null() {
            return;
        }
        debug!("connection closed");
        // Releases the strong count `create_client` leaked; in-flight
        // requests hold their own counts.
        drop(unsafe { Arc::from_raw(conn_ptr as *const ClientSession) });
    }

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
    ) -> *mut CommandResult {
        let session = match unsafe { clone_session(conn_ptr) } {
            Some(session) => session,
            None => return failure_result("null connection", 3),
        };
        let request_type = match RequestType::from_wire(request_type) {
            Some(request_type) => request_type,
            None => {
                return failure_result(&format!("unknown request type {}", request_type), 0)
            }
        };
        // Everything is copied before this call returns; the caller's
        // buffers are free to die afterwards.
        let owned_args = unsafe { copy_args(arg_count, args, args_len) };
        let route = match unsafe { copy_route(route_bytes, route_bytes_len) } {
            Ok(route) => route,
            Err(err) => return bridge_failure_result(&err),
        };

        let command = BatchCommand {
            request_type,
            args: owned_args,
        };
        match session.client_type() {
            ClientType::Sync => {
                outcome_to_result(run_command(&session, command, route))
            }
            ClientType::Async {
                success_callback,
                failure_callback,
            } => {
                if self.engine.faults().take_swallow() {
                    return std::ptr::null_mut();
                }
                self.enqueue(Box::new(move || {
                    let outcome = run_command(&session, command, route);
                    unsafe {
                        deliver_async(outcome, channel, success_callback, failure_callback)
                    };
                }));
                std::ptr::null_mut()
            }
        }
    }

    unsafe fn batch(
        &self,
        conn_ptr: *const c_void,
        channel: usize,
        batch: *const BatchInfo,
        raise_on_error: bool,
        options: *const BatchOptionsInfo,
    ) -> *mut CommandResult {
        let session = match unsafe { clone_session(conn_ptr) } {
            Some(session) => session,
            None => return failure_result("null connection", 3),
        };
        if batch.is_null() {
            return failure_result("null batch", 0);
        }
        let (commands, atomic) = match unsafe { copy_batch(batch) } {
            Ok(copied) => copied,
            Err(message) => return failure_result(&message, 0),
        };
        let (route, retry) = match unsafe { copy_options(options) } {
            Ok(copied) => copied,
            Err(err) => return bridge_failure_result(&err),
        };

        match session.client_type() {
            ClientType::Sync => outcome_to_result(run_batch(
                &session,
                commands,
                atomic,
                route,
                retry,
                raise_on_error,
            )),
            ClientType::Async {
                success_callback,
                failure_callback,
            } => {
                if self.engine.faults().take_swallow() {
                    return std::ptr::null_mut();
                }
                self.enqueue(Box::new(move || {
                    let outcome =
                        run_batch(&session, commands, atomic, route, retry, raise_on_error);
                    unsafe {
                        deliver_async(outcome, channel, success_callback, failure_callback)
                    };
                }));
                std::ptr::null_mut()
            }
        }
    }

    unsafe fn update_connection_password(
        &self,
        conn_ptr: *const c_void,
        channel: usize,
        password: *const c_char,
        immediate_auth: bool,
    ) -> *mut CommandResult {
        let session = match unsafe { clone_session(conn_ptr) } {
            Some(session) => session,
            None => return failure_result("null connection", 3),
        };
        let password = if password.is_null() {
            None
        } else {
            let bytes = unsafe { std::ffi::CStr::from_ptr(password) }.to_bytes();
            // An empty password clears the stored credential.
            if bytes.is_empty() {
                None
            } else {
                Some(bytes.to_vec())
            }
        };

        match session.client_type() {
            ClientType::Sync => {
                outcome_to_result(run_password_update(&session, password, immediate_auth))
            }
            ClientType::Async {
                success_callback,
                failure_callback,
            } => {
                self.enqueue(Box::new(move || {
                    let outcome = run_password_update(&session, password, immediate_auth);
                    unsafe {
                        deliver_async(outcome, channel, success_callback, failure_callback)
                    };
                }));
                std::ptr::null_mut()
            }
        }
    }

    unsafe fn free_command_result(&self, result: *mut CommandResult) {
        unsafe { crate::protocol::convert::free_command_result(result) };
    }
}

// =============================================================================
// Request execution
// =============================================================================

fn run_command(
    session: &ClientSession,
    command: BatchCommand,
    route: Option<Route>,
) -> Result<WireValue, ServerFailure> {
    session.ensure_connected()?;
    pipeline::execute_command(session, command, route)
}

fn run_batch(
    session: &ClientSession,
    commands: Vec<BatchCommand>,
    atomic: bool,
    route: Option<Route>,
    retry: BatchRetryStrategy,
    raise_on_error: bool,
) -> Result<WireValue, ServerFailure> {
    session.ensure_connected()?;
    if atomic {
        pipeline::execute_transaction(session, commands, route, raise_on_error)
    } else {
        let options = PipelineOptions { route, retry };
        pipeline::execute_pipeline(session, commands, options, raise_on_error)
    }
}

fn run_password_update(
    session: &ClientSession,
    password: Option<Vec<u8>>,
    immediate_auth: bool,
) -> Result<WireValue, ServerFailure> {
    session.update_password(password, immediate_auth)?;
    Ok(WireValue::Ok)
}

// =============================================================================
// Boundary plumbing
// =============================================================================

/// Clones the session behind a connection pointer without consuming the
/// pointer's own strong count.
unsafe fn clone_session(conn_ptr: *const c_void) -> Option<Arc<ClientSession>> {
    if conn_ptr.is_null() {
        return None;
    }
    let ptr = conn_ptr as *const ClientSession;
    unsafe { Arc::increment_strong_count(ptr) };
    Some(unsafe { Arc::from_raw(ptr) })
}

/// Copies the positional argument arrays into owned buffers.
unsafe fn copy_args(
    arg_count: c_ulong,
    args: *const usize,
    args_len: *const c_ulong,
) -> Vec<Bytes> {
    if args.is_null() || args_len.is_null() {
        return Vec::new();
    }
    let count = arg_count as usize;
    let mut owned = Vec::with_capacity(count);
    for index in 0..count {
        let ptr = unsafe { *args.add(index) } as *const u8;
        let len = unsafe { *args_len.add(index) } as usize;
        if ptr.is_null() {
            owned.push(Bytes::new());
        } else {
            let slice = unsafe { std::slice::from_raw_parts(ptr, len) };
            owned.push(Bytes::copy_from_slice(slice));
        }
    }
    owned
}

/// Deserializes the optional route message.
unsafe fn copy_route(
    route_bytes: *const u8,
    route_bytes_len: usize,
) -> crate::error::Result<Option<Route>> {
    if route_bytes.is_null() || route_bytes_len == 0 {
        return Ok(None);
    }
    let slice = unsafe { std::slice::from_raw_parts(route_bytes, route_bytes_len) };
    Route::from_wire_bytes(slice).map(Some)
}

/// Copies a whole batch into owned commands.
unsafe fn copy_batch(batch: *const BatchInfo) -> Result<(Vec<BatchCommand>, bool), String> {
    let info = unsafe { &*batch };
    if info.cmds.is_null() && info.cmd_count > 0 {
        return Err("null batch command array".to_string());
    }
    let mut commands = Vec::with_capacity(info.cmd_count);
    for index in 0..info.cmd_count {
        let cmd_ptr = unsafe { *info.cmds.add(index) };
        if cmd_ptr.is_null() {
            return Err("null batch command".to_string());
        }
        let cmd = unsafe { &*cmd_ptr };
        let request_type = RequestType::from_wire(cmd.request_type)
            .ok_or_else(|| format!("unknown request type {}", cmd.request_type))?;
        let mut args = Vec::with_capacity(cmd.arg_count);
        if !cmd.args.is_null() && !cmd.args_len.is_null() {
            for arg_index in 0..cmd.arg_count {
                let ptr = unsafe { *cmd.args.add(arg_index) };
                let len = unsafe { *cmd.args_len.add(arg_index) } as usize;
                if ptr.is_null() {
                    args.push(Bytes::new());
                } else {
                    let slice = unsafe { std::slice::from_raw_parts(ptr, len) };
                    args.push(Bytes::copy_from_slice(slice));
                }
            }
        }
        commands.push(BatchCommand { request_type, args });
    }
    Ok((commands, info.is_atomic))
}

/// Copies batch options into owned form.
unsafe fn copy_options(
    options: *const BatchOptionsInfo,
) -> crate::error::Result<(Option<Route>, BatchRetryStrategy)> {
    if options.is_null() {
        return Ok((None, BatchRetryStrategy::default()));
    }
    let info = unsafe { &*options };
    let route = unsafe { copy_route(info.route_bytes, info.route_bytes_len)? };
    let retry = BatchRetryStrategy {
        retry_server_error: info.retry_server_error,
        retry_connection_error: info.retry_connection_error,
    };
    Ok((route, retry))
}

/// Converts an execution outcome into the sync-path result allocation.
fn outcome_to_result(outcome: Result<WireValue, ServerFailure>) -> *mut CommandResult {
    match outcome {
        Ok(value) => success_result(value),
        Err(failure) => failure_result(failure.message(), failure.code()),
    }
}

/// Delivers an async outcome through the registered callbacks, freeing the
/// callback payload once the callback returns.
unsafe fn deliver_async(
    outcome: Result<WireValue, ServerFailure>,
    channel: usize,
    success_callback: crate::protocol::SuccessCallback,
    failure_callback: crate::protocol::FailureCallback,
) {
    match outcome {
        Ok(value) => {
            let response = Box::into_raw(Box::new(value_to_response(value)));
            unsafe { success_callback(channel, response) };
            unsafe { free_command_response(response) };
        }
        Err(failure) => {
            let message = message_into_raw(failure.message());
            unsafe { failure_callback(channel, message, failure.code()) };
            unsafe { free_error_message(message as *mut c_char) };
        }
    }
}
