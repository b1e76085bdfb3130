//! Error types for dataflow pipelines

use std::io;
use thiserror::Error;

/// Result type for dataflow pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for dataflow pipeline operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed construction parameters or incompatible runtime values
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Input dtype or ordering not supported by an operator
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// An accumulated value exceeds a declared bound
    #[error("Data loss: {0}")]
    DataLoss(String),

    /// A referenced resource has not been initialized yet
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Invariant violation inside a copy or accumulation routine
    #[error("Internal error: {0}")]
    Internal(String),

    /// Resource or function lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource registration collided with an existing entry
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Operation was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while loading configuration
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of an [`Error`], independent of its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// See [`Error::InvalidArgument`]
    InvalidArgument,
    /// See [`Error::Unimplemented`]
    Unimplemented,
    /// See [`Error::DataLoss`]
    DataLoss,
    /// See [`Error::FailedPrecondition`]
    FailedPrecondition,
    /// See [`Error::Internal`]
    Internal,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::AlreadyExists`]
    AlreadyExists,
    /// See [`Error::Cancelled`]
    Cancelled,
    /// Configuration, IO and serialization failures
    Config,
}

impl Error {
    /// Get the classification of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::Unimplemented(_) => ErrorCode::Unimplemented,
            Error::DataLoss(_) => ErrorCode::DataLoss,
            Error::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            Error::Internal(_) => ErrorCode::Internal,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Error::Cancelled(_) => ErrorCode::Cancelled,
            Error::Config(_) | Error::Io(_) | Error::Serialization(_) => ErrorCode::Config,
        }
    }

    /// Human-readable message without the classification prefix
    pub fn message(&self) -> &str {
        match self {
            Error::InvalidArgument(m)
            | Error::Unimplemented(m)
            | Error::DataLoss(m)
            | Error::FailedPrecondition(m)
            | Error::Internal(m)
            | Error::NotFound(m)
            | Error::AlreadyExists(m)
            | Error::Cancelled(m)
            | Error::Config(m)
            | Error::Io(m)
            | Error::Serialization(m) => m,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
