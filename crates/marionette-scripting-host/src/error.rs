use thiserror::Error;

use crate::host::HostError;

/// Errors a handler can observe from the scripting API
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Malformed input to a constructor or a typed boundary
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Bad message name, target or numeric argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A physics query hit the shared result cap; narrow the query
    #[error("query returned {count} results, the maximum; narrow the query")]
    TooManyResults { count: usize },

    /// A memory value cannot be represented as plain data
    #[error("unsupported memory value: {0}")]
    UnsupportedValue(String),

    /// A referenced actor does not exist
    #[error("no actor named '{0}'")]
    LookupFailure(String),

    /// The host rejected a service call
    #[error(transparent)]
    Host(#[from] HostError),
}

pub type ScriptResult<T> = Result<T, ScriptError>;
