// src/error.rs

//! Error kinds surfaced by sessions, the facility and the consumer.

use std::io;
use thiserror::Error;

/// All the ways opening, consuming or controlling a trace session can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("already open: {0}")]
    AlreadyOpen(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("corrupt trace data: {0}")]
    Corrupt(String),

    #[error("dispatch sink failed: {0}")]
    SinkFailure(String),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl TraceError {
    /// Privilege failures are expected on unelevated hosts; callers skip rather than abort.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, TraceError::AccessDenied(_))
    }
}

impl From<io::Error> for TraceError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => TraceError::NotFound(e.to_string()),
            io::ErrorKind::PermissionDenied => TraceError::AccessDenied(e.to_string()),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                TraceError::Corrupt(e.to_string())
            }
            _ => TraceError::Unexpected(e.to_string()),
        }
    }
}

impl From<prost::DecodeError> for TraceError {
    fn from(e: prost::DecodeError) -> Self {
        TraceError::Corrupt(e.to_string())
    }
}

/// Raised by a dispatch sink that cannot accept any more records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(msg: impl Into<String>) -> Self {
        SinkError(msg.into())
    }
}

impl From<SinkError> for TraceError {
    fn from(e: SinkError) -> Self {
        TraceError::SinkFailure(e.0)
    }
}
