//! Request encoding
//!
//! Turns commands and batches into the positional, length-prefixed layout
//! the native call expects: an argument count, a pointer array, a matching
//! length array, and an optional serialized route message.
//!
//! Anything that cannot cross the boundary fails here with an
//! [`EncodingError`](crate::BridgeError::Encoding), strictly before any
//! native call.
//!
//! Lifetime contract: an encoded request owns every backing buffer. The
//! pointer arrays reference heap storage (`Bytes` payloads and pinned vecs),
//! so the addresses stay valid for as long as the encoded value is alive —
//! callers keep it alive across the whole native call.

use std::os::raw::c_ulong;

use bytes::Bytes;

use crate::batch::Batch;
use crate::command::{Command, RequestType};
use crate::error::{BridgeError, Result};
use crate::routing::Route;

use super::types::{BatchInfo, BatchOptionsInfo, CmdInfo};

/// Arguments per command the boundary can represent.
const MAX_ARGS: usize = u32::MAX as usize;

/// A single command, encoded and pinned for one native call.
#[derive(Debug)]
pub struct EncodedRequest {
    request_type: u32,
    // Owned backing buffers; the pointer array below references their heap
    // payloads, which do not move when this struct moves.
    args: Vec<Bytes>,
    arg_ptrs: Vec<usize>,
    arg_lens: Vec<c_ulong>,
    route_bytes: Option<Vec<u8>>,
}

impl EncodedRequest {
    /// Encodes a command. Consumes it: commands are per-call value objects.
    pub fn encode(command: Command) -> Result<Self> {
        let route_bytes = encode_route(command.route.as_ref())?;
        let (arg_ptrs, arg_lens) = encode_args(command.request_type, &command.args)?;
        Ok(Self {
            request_type: command.request_type as u32,
            args: command.args,
            arg_ptrs,
            arg_lens,
            route_bytes,
        })
    }

    pub fn request_type(&self) -> u32 {
        self.request_type
    }

    pub fn arg_count(&self) -> c_ulong {
        self.args.len() as c_ulong
    }

    /// Pointer array handed to the native call. Null when there are no
    /// arguments.
    pub fn arg_ptrs(&self) -> *const usize {
        if self.arg_ptrs.is_empty() {
            std::ptr::null()
        } else {
            self.arg_ptrs.as_ptr()
        }
    }

    /// Length array matching [`arg_ptrs`](Self::arg_ptrs).
    pub fn arg_lens(&self) -> *const c_ulong {
        if self.arg_lens.is_empty() {
            std::ptr::null()
        } else {
            self.arg_lens.as_ptr()
        }
    }

    pub fn route_ptr(&self) -> *const u8 {
        match &self.route_bytes {
            Some(bytes) => bytes.as_ptr(),
            None => std::ptr::null(),
        }
    }

    pub fn route_len(&self) -> usize {
        self.route_bytes.as_ref().map_or(0, |bytes| bytes.len())
    }
}

/// One command's storage inside an encoded batch.
#[derive(Debug)]
struct EncodedBatchCommand {
    #[allow(dead_code)] // holds the buffers the pointer arrays reference
    args: Vec<Bytes>,
    arg_ptrs: Vec<*const u8>,
    arg_lens: Vec<c_ulong>,
    info: CmdInfo,
}

/// A batch, encoded and pinned for one native call.
///
/// All nested arrays (per-command pointer/length arrays, the `CmdInfo`
/// pointer array) live in this struct; `info()` is valid exactly as long as
/// the struct is.
#[derive(Debug)]
pub struct EncodedBatch {
    commands: Vec<Box<EncodedBatchCommand>>,
    #[allow(dead_code)] // owns the array `info.cmds` points into
    cmd_ptrs: Vec<*const CmdInfo>,
    info: BatchInfo,
    #[allow(dead_code)] // owns the buffer `options.route_bytes` points into
    options_route: Option<Vec<u8>>,
    options: BatchOptionsInfo,
}

impl EncodedBatch {
    /// Encodes a batch and its options. Validation mirrors single-command
    /// encoding: every command must be representable before anything crosses
    /// the boundary.
    pub fn encode(batch: Batch, default_timeout_ms: u64) -> Result<Self> {
        if batch.is_empty() {
            return Err(BridgeError::Encoding("empty batch".to_string()));
        }

        let atomic = batch.is_atomic();
        let options = batch.options().clone();
        let mut commands = Vec::with_capacity(batch.len());
        for command in batch.commands() {
            if command.route.is_some() {
                // Per-command routes are a single-command feature; batches
                // route as one unit through their options.
                return Err(BridgeError::Encoding(
                    "batch commands cannot carry per-command routes".to_string(),
                ));
            }
            let (raw_ptrs, arg_lens) = encode_args(command.request_type, &command.args)?;
            let arg_ptrs: Vec<*const u8> =
                raw_ptrs.into_iter().map(|addr| addr as *const u8).collect();
            let mut encoded = Box::new(EncodedBatchCommand {
                args: command.args.clone(),
                arg_ptrs,
                arg_lens,
                info: CmdInfo {
                    request_type: command.request_type as u32,
                    args: std::ptr::null(),
                    arg_count: command.args.len(),
                    args_len: std::ptr::null(),
                },
            });
            if !encoded.arg_ptrs.is_empty() {
                encoded.info.args = encoded.arg_ptrs.as_ptr();
                encoded.info.args_len = encoded.arg_lens.as_ptr();
            }
            commands.push(encoded);
        }

        let cmd_ptrs: Vec<*const CmdInfo> = commands
            .iter()
            .map(|command| &command.info as *const CmdInfo)
            .collect();
        let info = BatchInfo {
            cmd_count: commands.len(),
            cmds: cmd_ptrs.as_ptr(),
            is_atomic: atomic,
        };

        let options_route = encode_route(options.route.as_ref())?;
        let retry = options.retry_strategy.unwrap_or_default();
        let encoded_options = BatchOptionsInfo {
            retry_server_error: retry.retry_server_error,
            retry_connection_error: retry.retry_connection_error,
            has_timeout: options.timeout_ms.is_some(),
            timeout_ms: options.timeout_ms.unwrap_or(default_timeout_ms),
            route_bytes: options_route
                .as_ref()
                .map_or(std::ptr::null(), |bytes| bytes.as_ptr()),
            route_bytes_len: options_route.as_ref().map_or(0, |bytes| bytes.len()),
        };

        Ok(Self {
            commands,
            cmd_ptrs,
            info,
            options_route,
            options: encoded_options,
        })
    }

    pub fn info(&self) -> *const BatchInfo {
        &self.info
    }

    pub fn options(&self) -> *const BatchOptionsInfo {
        &self.options
    }

    /// Effective waiting bound for this batch, in milliseconds.
    pub fn timeout_ms(&self) -> u64 {
        self.options.timeout_ms
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// The raw pointers reference heap buffers owned by the same struct; moving
// the struct between threads moves ownership of those buffers with it.
unsafe impl Send for EncodedBatch {}

/// Validates and lays out one command's arguments.
fn encode_args(
    request_type: RequestType,
    args: &[Bytes],
) -> Result<(Vec<usize>, Vec<c_ulong>)> {
    if request_type == RequestType::Invalid {
        return Err(BridgeError::Encoding(
            "invalid request type never crosses the boundary".to_string(),
        ));
    }
    if args.len() > MAX_ARGS {
        return Err(BridgeError::Encoding(format!(
            "argument count {} exceeds boundary limit",
            args.len()
        )));
    }
    let mut ptrs = Vec::with_capacity(args.len());
    let mut lens = Vec::with_capacity(args.len());
    for arg in args {
        ptrs.push(arg.as_ptr() as usize);
        lens.push(arg.len() as c_ulong);
    }
    Ok((ptrs, lens))
}

/// Serializes an optional route as its distinct wire message.
fn encode_route(route: Option<&Route>) -> Result<Option<Vec<u8>>> {
    match route {
        Some(route) => Ok(Some(route.to_wire_bytes()?)),
        None => Ok(None),
    }
}
