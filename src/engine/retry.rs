//! Engine-side failures and retry classification
//!
//! [`ServerFailure`] is the engine's internal failure taxonomy; its codes
//! map onto the boundary's `command_error_type` values. [`RetryCoordinator`]
//! decides, per failure and per strategy, whether a pipeline resends the
//! specific failed command, resends the whole sub-request, or gives up.

use crate::batch::BatchRetryStrategy;

/// Retry budget for a pipeline: the first attempt plus this many resends.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// A failure raised inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFailure {
    /// Slot is migrating; the command is safe to resend once the slot
    /// settles. The retriable server-error class.
    TryAgain(String),

    /// Plain server-reported error, never retried
    Request(String),

    /// Transaction aborted during queue validation, nothing ran
    ExecAbort(String),

    /// Link dropped; resending may duplicate effects
    ConnectionLost(String),

    /// The engine gave up waiting on an internal operation
    Timeout(String),
}

impl ServerFailure {
    /// Boundary error-type code, matching `RequestErrorKind` on the other
    /// side.
    pub fn code(&self) -> u32 {
        match self {
            ServerFailure::TryAgain(_) | ServerFailure::Request(_) => 0,
            ServerFailure::ExecAbort(_) => 1,
            ServerFailure::Timeout(_) => 2,
            ServerFailure::ConnectionLost(_) => 3,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ServerFailure::TryAgain(message)
            | ServerFailure::Request(message)
            | ServerFailure::ExecAbort(message)
            | ServerFailure::ConnectionLost(message)
            | ServerFailure::Timeout(message) => message,
        }
    }

    pub fn into_message(self) -> String {
        match self {
            ServerFailure::TryAgain(message)
            | ServerFailure::Request(message)
            | ServerFailure::ExecAbort(message)
            | ServerFailure::ConnectionLost(message)
            | ServerFailure::Timeout(message) => message,
        }
    }
}

/// What the pipeline does with a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Record the failure at the command's index and move on
    Fail,

    /// Resend only this command in the next attempt
    RetryCommand,

    /// Resend every command of the affected sub-request
    RetrySubRequest,
}

/// Per-pipeline retry state: the caller's strategy plus a bounded attempt
/// budget shared by all commands in the pipeline.
pub struct RetryCoordinator {
    strategy: BatchRetryStrategy,
    attempts: u32,
}

impl RetryCoordinator {
    pub fn new(strategy: BatchRetryStrategy) -> Self {
        Self {
            strategy,
            attempts: 0,
        }
    }

    /// Consumes one attempt from the budget. Returns false once exhausted;
    /// the pipeline then records remaining failures instead of resending.
    pub fn budget_remaining(&mut self) -> bool {
        if self.attempts >= MAX_RETRY_ATTEMPTS {
            return false;
        }
        self.attempts += 1;
        true
    }

    /// Classifies a failure under the caller's strategy.
    ///
    /// Only the retriable server-error class resends a single command;
    /// link loss resends the whole sub-request it interrupted. Plain
    /// request errors, aborts, and timeouts always fail in place.
    pub fn classify(&self, failure: &ServerFailure) -> RetryDecision {
        match failure {
            ServerFailure::TryAgain(_) if self.strategy.retry_server_error => {
                RetryDecision::RetryCommand
            }
            ServerFailure::ConnectionLost(_) if self.strategy.retry_connection_error => {
                RetryDecision::RetrySubRequest
            }
            _ => RetryDecision::Fail,
        }
    }
}
