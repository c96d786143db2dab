//! Wire value type
//!
//! The tagged-union value decoded from (and encoded into) the native
//! response format. Every composite variant owns its children: once decoding
//! returns, the backing native buffers can be released without invalidating
//! anything.

use std::fmt;

/// A value crossing the wire boundary.
///
/// Tags mirror the native `ResponseType` (0=Null .. 9=Error). `Map` is an
/// ordered pair list rather than a hash map so duplicate keys reported by the
/// engine are preserved instead of silently collapsed.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Absent value (missing key, nil reply)
    Null,

    /// Signed 64-bit integer
    Int(i64),

    /// Double-precision float
    Float(f64),

    /// Boolean
    Bool(bool),

    /// Owned byte buffer (bulk strings, simple strings)
    Bytes(Vec<u8>),

    /// Ordered sequence of values
    Array(Vec<WireValue>),

    /// Ordered key/value pairs; duplicates are preserved
    Map(Vec<(WireValue, WireValue)>),

    /// Unordered collection; engine insertion order carries no meaning
    Set(Vec<WireValue>),

    /// Simple "OK" acknowledgement
    Ok,

    /// Server-reported failure embedded in-line in a non-raising batch result
    ServerError(String),
}

impl WireValue {
    /// Convenience constructor for byte values.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        WireValue::Bytes(data.into())
    }

    /// Returns the contained bytes, if this is a `Bytes` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            WireValue::Bytes(data) => Some(data),
            _ => None,
        }
    }

    /// True when the value is an in-line server error.
    pub fn is_error(&self) -> bool {
        matches!(self, WireValue::ServerError(_))
    }

    /// Order-insensitive equality for `Set` contents.
    ///
    /// Sets decode in whatever order the engine materialized them, so direct
    /// `==` on two sets is only meaningful when both came from the same
    /// buffer. This compares as multisets.
    pub fn set_eq(lhs: &[WireValue], rhs: &[WireValue]) -> bool {
        if lhs.len() != rhs.len() {
            return false;
        }
        let mut unmatched: Vec<&WireValue> = rhs.iter().collect();
        for value in lhs {
            match unmatched.iter().position(|candidate| *candidate == value) {
                Some(index) => {
                    unmatched.swap_remove(index);
                }
                None => return false,
            }
        }
        true
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Null => write!(f, "(nil)"),
            WireValue::Int(value) => write!(f, "{}", value),
            WireValue::Float(value) => write!(f, "{}", value),
            WireValue::Bool(value) => write!(f, "{}", value),
            WireValue::Bytes(data) => write!(f, "{:?}", String::from_utf8_lossy(data)),
            WireValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            WireValue::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            WireValue::Set(items) => {
                write!(f, "#{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            WireValue::Ok => write!(f, "OK"),
            WireValue::ServerError(message) => write!(f, "(error) {}", message),
        }
    }
}
