use std::fmt;

use thiserror::Error;

/// Error returned by an external sink when a trail cannot be written.
///
/// Sink errors never reach the unit of work that produced the trail. The
/// delivery pipeline reports them through its optional error handler only.
///
/// # Examples
///
/// ```
/// use trail_core::{SinkError, SinkErrorKind};
///
/// let error = SinkError::with_message(SinkErrorKind::Io, "disk full");
/// assert_eq!(error.kind(), SinkErrorKind::Io);
/// assert_eq!(error.message(), Some("disk full"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    kind: SinkErrorKind,
    message: Option<String>,
}

impl SinkError {
    /// Creates a new sink error with the specified kind.
    pub fn new(kind: SinkErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a new sink error with a custom message.
    pub fn with_message(kind: SinkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> SinkErrorKind {
        self.kind
    }

    /// Returns the error message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(msg) = &self.message {
            write!(f, "sink error ({}): {}", self.kind, msg)
        } else {
            write!(f, "sink error ({})", self.kind)
        }
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        Self::with_message(SinkErrorKind::Io, err.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_message(SinkErrorKind::Serialization, err.to_string())
    }
}

/// Kind of sink error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    /// I/O error while writing to the destination.
    Io,
    /// The trail could not be encoded for the destination.
    Serialization,
    /// The sink was already closed.
    Closed,
    /// The destination refused the trail.
    Rejected,
    /// More than one composed sink failed.
    Multiple,
}

impl fmt::Display for SinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "I/O error"),
            Self::Serialization => write!(f, "serialization error"),
            Self::Closed => write!(f, "sink closed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Multiple => write!(f, "multiple sinks failed"),
        }
    }
}

/// Outcome of handing a trail to the delivery pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The caller's cancellation signal fired while waiting for queue space.
    #[error("delivery cancelled while waiting for queue space")]
    Cancelled,

    /// The pipeline was spawned outside of a Tokio runtime.
    #[error("delivery pipeline requires a running tokio runtime")]
    NoRuntime,
}

/// Invalid configuration value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Sampling rate outside `0.0..=1.0`.
    #[error("sampling rate must be within 0.0..=1.0, got {0}")]
    InvalidSamplingRate(f64),

    /// Mask literal is empty, which would make masked values indistinguishable from blanks.
    #[error("mask value must not be empty")]
    EmptyMaskValue,
}

/// Failure to set up an [`Auditor`](crate::web::Auditor).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// The configuration did not validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The delivery pipeline could not be started.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
