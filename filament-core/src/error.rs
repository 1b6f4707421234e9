//! Error types for evaluation, observation and binding.
//!
//! Every failure in the core propagates synchronously to the caller of
//! `eval`, `assign`, `connect`, `set_value` or `subscribe`. Nothing here is
//! retried; the binding layer decides whether to log and continue.

use thiserror::Error;

/// Errors raised by the binding core.
#[derive(Debug, Error)]
pub enum BindingError {
    /// A value converter pipe names a converter that is not registered.
    #[error("No ValueConverter named \"{0}\" was found!")]
    MissingConverter(String),

    /// A call expression resolved to `null` or `undefined`.
    #[error("Undefined function {0}")]
    UndefinedFunction(String),

    /// A call expression resolved to something that cannot be called.
    #[error("{0} is not a function")]
    NotAFunction(String),

    /// Keyed access on a null or undefined object.
    #[error("Accessing null object")]
    NullObjectAccess,

    /// Subscribing to a native element property without an event handler.
    #[error("Observation of an Element's \"{0}\" property is not supported.")]
    UnsupportedObservation(String),

    /// A non-array value was bound to a multi-select element.
    #[error("Only null or Array instances can be bound to a multi-select.")]
    InvalidBindingValue,

    /// A keyed write that would grow an array past its maximum length.
    #[error("Invalid array length")]
    InvalidArrayLength,

    /// Assignment through an expression that has no assignable target.
    #[error("Cannot assign to {0}")]
    NotAssignable(String),

    /// A binary node carries an operator the evaluator does not know.
    #[error("Internal error [{0}] not handled")]
    UnknownOperator(String),

    /// An error raised by a host function called from an expression.
    #[error("{0}")]
    Host(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid MessagePack: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("cannot encode MessagePack: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),
}

impl BindingError {
    /// Build a host error from any displayable message.
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = BindingError> = std::result::Result<T, E>;
