//! Session and protocol errors.

use smol_str::SmolStr;
use thiserror::Error;

/// Errors returned to callers of the session API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No transport is attached to the session.
    #[error("not connected to the diagnostic agent")]
    NotConnected,

    /// Every request id has been handed out; the epoch cannot issue more requests.
    #[error("request id space exhausted")]
    IdSpaceExhausted,

    /// Transport could not be established or failed hard.
    #[error("transport error '{0}'")]
    Transport(SmolStr),

    /// Configuration error.
    #[error("invalid config '{0}'")]
    InvalidConfig(SmolStr),

    /// Operation is not valid in the current session stage.
    #[error("operation '{operation}' not allowed in stage {stage}")]
    InvalidStage {
        operation: &'static str,
        stage: SmolStr,
    },

    /// Elements from the previous run are still waiting for their break to land.
    #[error("previous run still has cancelling diagnostics")]
    StillCancelling,
}

/// Reasons an inbound message is dropped by the correlator.
///
/// These never leave the delivery path; they only end up in the log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    InvalidJson(SmolStr),

    #[error("message is not an object")]
    NotAnObject,

    #[error("jsonrpc 2.0 missing")]
    VersionMissing,

    #[error("id missing")]
    IdMissing,

    #[error("invalid json id (null)")]
    NullId,

    #[error("unknown reference {0}")]
    UnknownReference(SmolStr),

    #[error("{context} missing '{field}'")]
    MissingField {
        context: &'static str,
        field: &'static str,
    },

    #[error("{0} with invalid params")]
    InvalidParams(&'static str),

    #[error("{context} with id {id} ignored")]
    UnexpectedId { context: &'static str, id: SmolStr },

    #[error("no instance named '{0}'")]
    UnknownInstance(SmolStr),

    #[error("unknown method '{0}'")]
    UnknownMethod(SmolStr),

    #[error("unrecognized message shape")]
    Unrecognized,
}
