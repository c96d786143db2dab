//! Boundary allocation and release
//!
//! Builds heap `CommandResponse` trees from [`WireValue`]s (the engine side
//! of the decode contract) and provides the single release path for every
//! allocation that crosses the boundary. Allocation and free are paired
//! here so the ownership rules stay in one place:
//!
//! - child arrays are boxed slices (length always equals capacity)
//! - map keys/values are individually boxed nodes
//! - error messages are nul-terminated C strings
//!
//! Each free function must be called exactly once per allocation; all of
//! them tolerate null.

use std::ffi::CString;
use std::os::raw::{c_char, c_void};

use crate::error::BridgeError;
use crate::value::WireValue;

use super::types::{
    CommandError, CommandResponse, CommandResult, ConnectionResponse, ResponseType,
};

// =============================================================================
// Allocation (WireValue -> CommandResponse tree)
// =============================================================================

/// Leaks a vec as a boxed slice, returning the raw parts the C structs carry.
fn slice_into_raw<T>(values: Vec<T>) -> (*mut T, i64) {
    let len = values.len() as i64;
    if values.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let boxed: Box<[T]> = values.into_boxed_slice();
    (Box::into_raw(boxed) as *mut T, len)
}

/// Reclaims a boxed slice leaked by [`slice_into_raw`].
///
/// # Safety
///
/// `ptr`/`len` must come from a single `slice_into_raw` call and must not be
/// reclaimed twice.
unsafe fn slice_from_raw<T>(ptr: *mut T, len: i64) -> Box<[T]> {
    let slice = std::ptr::slice_from_raw_parts_mut(ptr, len as usize);
    unsafe { Box::from_raw(slice) }
}

/// Converts an owned value into a heap response tree.
pub fn value_to_response(value: WireValue) -> CommandResponse {
    let mut response = CommandResponse::default();
    match value {
        WireValue::Null => {}
        WireValue::Int(number) => {
            response.response_type = ResponseType::Int as u32;
            response.int_value = number;
        }
        WireValue::Float(number) => {
            response.response_type = ResponseType::Float as u32;
            response.float_value = number;
        }
        WireValue::Bool(flag) => {
            response.response_type = ResponseType::Bool as u32;
            response.bool_value = flag;
        }
        WireValue::Bytes(data) => {
            response.response_type = ResponseType::String as u32;
            let (ptr, len) = slice_into_raw(data);
            response.string_value = ptr;
            response.string_value_len = len;
        }
        WireValue::Array(items) => {
            response.response_type = ResponseType::Array as u32;
            let children: Vec<CommandResponse> =
                items.into_iter().map(value_to_response).collect();
            let (ptr, len) = slice_into_raw(children);
            response.array_value = ptr;
            response.array_value_len = len;
        }
        WireValue::Map(pairs) => {
            // A map entry is a carrier node: tag left Null, key/value hung
            // off the dedicated pointers.
            response.response_type = ResponseType::Map as u32;
            let entries: Vec<CommandResponse> = pairs
                .into_iter()
                .map(|(key, value)| {
                    let mut entry = CommandResponse::default();
                    entry.map_key = Box::into_raw(Box::new(value_to_response(key)));
                    entry.map_value = Box::into_raw(Box::new(value_to_response(value)));
                    entry
                })
                .collect();
            let (ptr, len) = slice_into_raw(entries);
            response.array_value = ptr;
            response.array_value_len = len;
        }
        WireValue::Set(items) => {
            response.response_type = ResponseType::Sets as u32;
            let children: Vec<CommandResponse> =
                items.into_iter().map(value_to_response).collect();
            let (ptr, len) = slice_into_raw(children);
            response.sets_value = ptr;
            response.sets_value_len = len;
        }
        WireValue::Ok => {
            response.response_type = ResponseType::Ok as u32;
        }
        WireValue::ServerError(message) => {
            response.response_type = ResponseType::Error as u32;
            let (ptr, len) = slice_into_raw(message.into_bytes());
            response.string_value = ptr;
            response.string_value_len = len;
        }
    }
    response
}

/// Allocates a successful `CommandResult` for a value.
pub fn success_result(value: WireValue) -> *mut CommandResult {
    Box::into_raw(Box::new(CommandResult {
        response: Box::into_raw(Box::new(value_to_response(value))),
        command_error: std::ptr::null_mut(),
    }))
}

/// Allocates a failed `CommandResult` carrying a message and error code.
pub fn failure_result(message: &str, code: u32) -> *mut CommandResult {
    Box::into_raw(Box::new(CommandResult {
        response: std::ptr::null_mut(),
        command_error: Box::into_raw(Box::new(CommandError {
            command_error_message: message_into_raw(message),
            command_error_type: code,
        })),
    }))
}

/// Allocates a failed `CommandResult` from a wrapper-side error.
pub fn bridge_failure_result(error: &BridgeError) -> *mut CommandResult {
    let code = match error {
        BridgeError::Timeout(_) => 2,
        BridgeError::Connection(_) | BridgeError::Closing(_) => 3,
        _ => 0,
    };
    failure_result(&error.to_string(), code)
}

/// Allocates the `create_client` success response.
pub fn connection_success(conn_ptr: *const c_void) -> *mut ConnectionResponse {
    Box::into_raw(Box::new(ConnectionResponse {
        conn_ptr,
        connection_error_message: std::ptr::null(),
    }))
}

/// Allocates the `create_client` failure response.
pub fn connection_failure(message: &str) -> *mut ConnectionResponse {
    Box::into_raw(Box::new(ConnectionResponse {
        conn_ptr: std::ptr::null(),
        connection_error_message: message_into_raw(message),
    }))
}

/// Leaks a message as a nul-terminated C string. Interior nul bytes are
/// replaced so the conversion cannot fail.
pub fn message_into_raw(message: &str) -> *const c_char {
    let sanitized = message.replace('\0', " ");
    CString::new(sanitized)
        .unwrap_or_else(|_| CString::new("invalid error message").unwrap())
        .into_raw()
}

// =============================================================================
// Release (exactly-once, transitive)
// =============================================================================

/// Releases a `CommandResult` and everything reachable from it.
///
/// # Safety
///
/// `result_ptr` must come from [`success_result`]/[`failure_result`] (or an
/// engine call returning one) and must not be freed twice.
pub unsafe fn free_command_result(result_ptr: *mut CommandResult) {
    if result_ptr.is_null() {
        return;
    }
    let result = unsafe { Box::from_raw(result_ptr) };
    if !result.response.is_null() {
        unsafe { free_command_response(result.response) };
    }
    if !result.command_error.is_null() {
        let error = unsafe { Box::from_raw(result.command_error) };
        if !error.command_error_message.is_null() {
            unsafe { free_error_message(error.command_error_message as *mut c_char) };
        }
    }
}

/// Releases a boxed `CommandResponse` node and its subtree.
///
/// # Safety
///
/// `response_ptr` must be a node allocated by this module (boxed, not an
/// element inside a child array) and must not be freed twice.
pub unsafe fn free_command_response(response_ptr: *mut CommandResponse) {
    if response_ptr.is_null() {
        return;
    }
    let response = unsafe { Box::from_raw(response_ptr) };
    unsafe { free_response_elements(*response) };
}

/// Releases the buffers hanging off a response node, recursively.
///
/// # Safety
///
/// Each nested allocation is released exactly once; the node itself must not
/// be reused afterwards.
unsafe fn free_response_elements(response: CommandResponse) {
    if !response.string_value.is_null() {
        drop(unsafe { slice_from_raw(response.string_value, response.string_value_len) });
    }
    if !response.array_value.is_null() {
        let children =
            unsafe { slice_from_raw(response.array_value, response.array_value_len) };
        for child in children.into_vec() {
            unsafe { free_response_elements(child) };
        }
    }
    if !response.map_key.is_null() {
        unsafe { free_command_response(response.map_key) };
    }
    if !response.map_value.is_null() {
        unsafe { free_command_response(response.map_value) };
    }
    if !response.sets_value.is_null() {
        let children =
            unsafe { slice_from_raw(response.sets_value, response.sets_value_len) };
        for child in children.into_vec() {
            unsafe { free_response_elements(child) };
        }
    }
}

/// Releases an error message leaked by [`message_into_raw`].
///
/// # Safety
///
/// Must be called exactly once per message.
pub unsafe fn free_error_message(message: *mut c_char) {
    if !message.is_null() {
        drop(unsafe { CString::from_raw(message) });
    }
}

/// Releases a `ConnectionResponse` and its contained error message. The
/// `conn_ptr` inside is not touched; it lives until `close_client`.
///
/// # Safety
///
/// Must be called exactly once per response.
pub unsafe fn free_connection_response(response_ptr: *mut ConnectionResponse) {
    if response_ptr.is_null() {
        return;
    }
    let response = unsafe { Box::from_raw(response_ptr) };
    if !response.connection_error_message.is_null() {
        unsafe { free_error_message(response.connection_error_message as *mut c_char) };
    }
}
