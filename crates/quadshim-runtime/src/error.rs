//! Error types for the callback adapter
//!
//! `CallbackError` is what a collaborator sees at an activation or protection
//! boundary. `EvalError` describes a failure raised while a user function was
//! being evaluated inside a callback.

use crate::stack::ContextId;
use thiserror::Error;

/// Errors reported at activation, deactivation and protection boundaries
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallbackError {
    /// The user function could not be obtained (null pointer, failed lookup)
    #[error("Unresolved {what} function")]
    Unresolved { what: &'static str },

    /// Parameter slice length does not match the declared arity
    #[error("Arity mismatch: declared {declared}, got {supplied} parameters")]
    ArityMismatch { declared: usize, supplied: usize },

    /// Arity does not fit the native calling convention
    #[error("Arity {0} exceeds the native limit")]
    ArityOverflow(usize),

    /// The per-thread nesting limit was reached
    #[error("Context nesting limit of {limit} reached")]
    DepthExceeded { limit: usize },

    /// A record was restored while another context was active
    #[error("Out-of-order deactivation: record {record} restored while {active} is active")]
    NestingViolation {
        record: ContextId,
        active: ContextDescription,
    },

    /// An evaluation failed; reported once at the outermost boundary
    #[error("Fatal error during evaluation: {0}")]
    Fatal(EvalError),

    /// An evaluation failed below this boundary; the outermost boundary reports it
    #[error("Unwinding after a fatal evaluation error")]
    Unwinding,
}

/// What was active when a nesting violation was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextDescription {
    /// No context was active
    Nothing,
    /// A different context was active
    Context(ContextId),
}

impl std::fmt::Display for ContextDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextDescription::Nothing => write!(f, "nothing"),
            ContextDescription::Context(id) => write!(f, "{}", id),
        }
    }
}

/// Errors raised while evaluating a user function inside a callback
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The user function reported a failure
    #[error("{0}")]
    User(String),

    /// The user function panicked
    #[error("User function panicked: {0}")]
    Panicked(String),

    /// The callback was invoked with a null argument pointer
    #[error("Null argument pointer passed to callback")]
    NullArgument,

    /// The callback was invoked with an empty argument array
    #[error("Callback requires at least one argument")]
    MissingArgument,

    /// The callback was invoked with no active context
    #[error("No active {0} context")]
    NoActiveContext(&'static str),

    /// A session started inside the user function failed
    #[error("Nested evaluation failed: {0}")]
    Nested(String),
}

impl EvalError {
    /// Create a user-function error from any message
    pub fn new(msg: impl Into<String>) -> Self {
        EvalError::User(msg.into())
    }

    /// Describe a caught panic payload
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        EvalError::Panicked(msg)
    }
}

impl From<CallbackError> for EvalError {
    fn from(err: CallbackError) -> Self {
        EvalError::Nested(err.to_string())
    }
}

/// Result type for adapter operations
pub type CallbackResult<T> = Result<T, CallbackError>;
