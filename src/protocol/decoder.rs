//! Response decoding
//!
//! Converts a native `CommandResponse` tree into an owned [`WireValue`],
//! recursively. Every byte is copied out: once decoding returns, the caller
//! may release the native allocation without invalidating the result.
//!
//! Dispatch is an exhaustive match on the response tag. An unknown tag means
//! the wrapper and engine disagree on the binary contract; that is a fatal
//! [`ProtocolError`](crate::BridgeError::Protocol), never retried and never
//! partially recovered.

use crate::error::{BridgeError, Result};
use crate::value::WireValue;

use super::types::{CommandError, CommandResponse, CommandResult, ResponseType};

/// Decodes a response node reached by pointer.
///
/// # Safety
///
/// `response_ptr` must point to a valid `CommandResponse` tree that stays
/// alive for the duration of the call (the engine guarantees this until its
/// matching free runs).
pub unsafe fn decode_response(response_ptr: *const CommandResponse) -> Result<WireValue> {
    if response_ptr.is_null() {
        return Err(BridgeError::Protocol(
            "null response from engine".to_string(),
        ));
    }
    unsafe { decode_node(&*response_ptr) }
}

/// Decodes a whole `CommandResult`: either the response tree or the typed
/// error, translated by its error code.
///
/// Does not free anything; the caller owns the release.
///
/// # Safety
///
/// `result_ptr` must point to a valid, live `CommandResult`.
pub unsafe fn decode_command_result(result_ptr: *const CommandResult) -> Result<WireValue> {
    if result_ptr.is_null() {
        return Err(BridgeError::Protocol("null command result".to_string()));
    }
    let result = unsafe { &*result_ptr };
    if !result.command_error.is_null() {
        let error = unsafe { &*result.command_error };
        return Err(unsafe { decode_command_error(error) });
    }
    unsafe { decode_response(result.response) }
}

/// Translates a boundary error struct into the matching `BridgeError`.
///
/// # Safety
///
/// `error` must reference a live `CommandError` with a valid nul-terminated
/// message (or a null message pointer).
pub unsafe fn decode_command_error(error: &CommandError) -> BridgeError {
    let message = if error.command_error_message.is_null() {
        "unknown error".to_string()
    } else {
        unsafe { std::ffi::CStr::from_ptr(error.command_error_message) }
            .to_string_lossy()
            .into_owned()
    };
    BridgeError::from_boundary(message, error.command_error_type)
}

/// Recursive node decode. Children are materialized depth-first before the
/// caller can observe the value, so partially-decoded state never escapes.
unsafe fn decode_node(response: &CommandResponse) -> Result<WireValue> {
    let tag = match ResponseType::from_tag(response.response_type) {
        Some(tag) => tag,
        None => {
            return Err(BridgeError::Protocol(format!(
                "unknown response tag {}",
                response.response_type
            )))
        }
    };

    match tag {
        ResponseType::Null => Ok(WireValue::Null),
        ResponseType::Int => Ok(WireValue::Int(response.int_value)),
        ResponseType::Float => Ok(WireValue::Float(response.float_value)),
        ResponseType::Bool => Ok(WireValue::Bool(response.bool_value)),
        ResponseType::String => {
            Ok(WireValue::Bytes(unsafe { copy_bytes(response)? }))
        }
        ResponseType::Array => {
            let children = unsafe {
                child_slice(response.array_value, response.array_value_len)?
            };
            let mut items = Vec::with_capacity(children.len());
            for child in children {
                items.push(unsafe { decode_node(child)? });
            }
            Ok(WireValue::Array(items))
        }
        ResponseType::Map => {
            // Map entries arrive in the child array; each entry carries
            // independent key/value pointers. Duplicate keys are preserved
            // as-is.
            let entries = unsafe {
                child_slice(response.array_value, response.array_value_len)?
            };
            let mut pairs = Vec::with_capacity(entries.len());
            for entry in entries {
                if entry.map_key.is_null() || entry.map_value.is_null() {
                    return Err(BridgeError::Protocol(
                        "map entry missing key or value".to_string(),
                    ));
                }
                let key = unsafe { decode_node(&*entry.map_key)? };
                let value = unsafe { decode_node(&*entry.map_value)? };
                pairs.push((key, value));
            }
            Ok(WireValue::Map(pairs))
        }
        ResponseType::Sets => {
            // Engine insertion order is not meaningful for sets; decoding
            // preserves whatever order the buffer holds.
            let children = unsafe {
                child_slice(response.sets_value, response.sets_value_len)?
            };
            let mut items = Vec::with_capacity(children.len());
            for child in children {
                items.push(unsafe { decode_node(child)? });
            }
            Ok(WireValue::Set(items))
        }
        ResponseType::Ok => Ok(WireValue::Ok),
        ResponseType::Error => {
            let message = unsafe { copy_bytes(response)? };
            Ok(WireValue::ServerError(
                String::from_utf8_lossy(&message).into_owned(),
            ))
        }
    }
}

/// Copies the string payload out of a node into an owned buffer.
unsafe fn copy_bytes(response: &CommandResponse) -> Result<Vec<u8>> {
    if response.string_value.is_null() {
        if response.string_value_len != 0 {
            return Err(BridgeError::Protocol(
                "string payload is null but has a length".to_string(),
            ));
        }
        return Ok(Vec::new());
    }
    let slice = unsafe {
        std::slice::from_raw_parts(response.string_value, response.string_value_len as usize)
    };
    Ok(slice.to_vec())
}

/// Views a contiguous child array. A null pointer is only valid when empty.
unsafe fn child_slice<'a>(
    ptr: *const CommandResponse,
    len: i64,
) -> Result<&'a [CommandResponse]> {
    if ptr.is_null() {
        if len != 0 {
            return Err(BridgeError::Protocol(
                "child array is null but has a length".to_string(),
            ));
        }
        return Ok(&[]);
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, len as usize) })
}
