//! Sink errors.
//!
//! Sinks report three kinds of failure and the worker driving a sink reacts
//! to each differently:
//!
//! - [`SinkErrorKind::Configuration`]: the sink cannot work as configured and
//!   is disabled; other sinks keep running.
//! - [`SinkErrorKind::Transient`]: the store or network failed; the error is
//!   logged and the next snapshot is the retry.
//! - [`SinkErrorKind::Duplicate`]: the store already holds the record; not a
//!   failure.

use std::path::PathBuf;

/// Errors raised by a sink while persisting or forwarding a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The resolved output path is not usable for the retention policy.
    #[error("invalid file path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// The retention policy name is not recognised.
    #[error("invalid retention type '{0}', expected 'none' or 'daily'")]
    InvalidRetention(String),

    /// Any other configuration problem detected at construction or first use.
    #[error("invalid sink configuration: {0}")]
    Configuration(String),

    /// The relational store or network peer failed; safe to retry later.
    #[error("store unavailable: {0}")]
    TransientStore(String),

    /// The store rejected the record because an identical one already exists.
    #[error("record already exists")]
    DuplicateRecord,

    /// File or socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`SinkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkErrorKind {
    /// Fatal for the sink, the sink is disabled
    Configuration,
    /// Logged, retried by the next snapshot
    Transient,
    /// Confirmation that the record is already stored
    Duplicate,
}

impl SinkError {
    /// Classify the error.
    pub fn kind(&self) -> SinkErrorKind {
        match self {
            SinkError::InvalidPath(_)
            | SinkError::InvalidRetention(_)
            | SinkError::Configuration(_) => SinkErrorKind::Configuration,
            SinkError::TransientStore(_) | SinkError::Io(_) => SinkErrorKind::Transient,
            SinkError::DuplicateRecord => SinkErrorKind::Duplicate,
        }
    }

    /// Create a configuration error with a message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        SinkError::Configuration(msg.into())
    }

    /// Create a transient store error with a message.
    pub fn transient(msg: impl Into<String>) -> Self {
        SinkError::TransientStore(msg.into())
    }

    /// Whether the sink must stop accepting snapshots.
    pub fn disables_sink(&self) -> bool {
        self.kind() == SinkErrorKind::Configuration
    }
}
