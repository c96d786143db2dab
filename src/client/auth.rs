//! Credential rotation
//!
//! Serializes password updates for a connection handle. A rotation holds the
//! manager lock across the boundary call and only commits the new credential
//! locally once the engine accepted it, so concurrent rotations cannot
//! interleave into a half-applied state.

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::value::WireValue;

/// When a replacement password takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Stage the credential for the engine's next reconnect
    Deferred,

    /// Re-authenticate the live connection now. Requires a non-empty
    /// password.
    Immediate,
}

/// Serializes rotations and tracks the last committed credential.
#[derive(Default)]
pub struct AuthRotationManager {
    committed: Mutex<Option<Vec<u8>>>,
}

impl AuthRotationManager {
    /// Runs one rotation: validate, call the boundary under the lock, and
    /// commit only on success.
    pub fn rotate(
        &self,
        password: Option<Vec<u8>>,
        mode: AuthMode,
        call: impl FnOnce() -> Result<WireValue>,
    ) -> Result<WireValue> {
        if mode == AuthMode::Immediate
            && password.as_ref().map_or(true, |password| password.is_empty())
        {
            return Err(BridgeError::Configuration(
                "immediate authentication requires a non-empty password".to_string(),
            ));
        }

        let mut committed = self.committed.lock();
        let value = call()?;
        *committed = password;
        debug!(mode = ?mode, "credential rotation committed");
        Ok(value)
    }

    /// The last credential a successful rotation committed. Connection-time
    /// credentials are not reflected here.
    pub fn committed(&self) -> Option<Vec<u8>> {
        self.committed.lock().clone()
    }
}
