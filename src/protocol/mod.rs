//! Wire protocol for the native call boundary
//!
//! Everything the client and engine share crosses through this module: the
//! repr(C) reply shapes, the encoder that pins argument buffers for a call,
//! the decoder that lifts a reply tree into [`WireValue`](crate::WireValue),
//! and the conversion/release helpers that keep every allocation paired with
//! exactly one free.

pub mod api;
pub mod convert;
pub mod decoder;
pub mod encoder;
pub mod types;

pub use api::NativeApi;
pub use decoder::{decode_command_error, decode_command_result, decode_response};
pub use encoder::{EncodedBatch, EncodedRequest};
pub use types::{
    BatchInfo, BatchOptionsInfo, ClientType, CmdInfo, CommandError, CommandResponse,
    CommandResult, ConnectionResponse, FailureCallback, ResponseType, SuccessCallback,
};
