//! Top-level error type and classification shared by every crate.

use core::fmt;

use crate::{DecodeError, EndpointError, SchemaError, SinkError, SinkErrorKind};

/// Top-level error type wrapping every telemetry sub-error.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Field schema could not be built
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A datagram could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A sink failed to persist or forward a snapshot
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// An ingestion endpoint could not be started
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// I/O errors outside of a sink
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// Service configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TelemetryError {
    /// Get the error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TelemetryError::Schema(_) => ErrorCategory::Schema,
            TelemetryError::Decode(_) => ErrorCategory::Decode,
            TelemetryError::Sink(_) => ErrorCategory::Sink,
            TelemetryError::Endpoint(_) => ErrorCategory::Endpoint,
            TelemetryError::Io(_) => ErrorCategory::IO,
            TelemetryError::Config(_) => ErrorCategory::Config,
        }
    }

    /// Get the error severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TelemetryError::Schema(_) => ErrorSeverity::Critical,
            TelemetryError::Decode(_) => ErrorSeverity::Warning,
            TelemetryError::Sink(e) => match e.kind() {
                SinkErrorKind::Configuration => ErrorSeverity::Error,
                SinkErrorKind::Transient => ErrorSeverity::Warning,
                SinkErrorKind::Duplicate => ErrorSeverity::Info,
            },
            TelemetryError::Endpoint(_) => ErrorSeverity::Critical,
            TelemetryError::Io(_) => ErrorSeverity::Error,
            TelemetryError::Config(_) => ErrorSeverity::Critical,
        }
    }

    /// Whether the owning unit of work (endpoint or process) must stop.
    ///
    /// Sink failures are never fatal here: a misconfigured sink disables
    /// only itself, see [`SinkError::kind`].
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Create a configuration error with a message.
    pub fn config(msg: impl Into<String>) -> Self {
        TelemetryError::Config(msg.into())
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(e: std::io::Error) -> Self {
        TelemetryError::Io(e)
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Schema definition errors
    Schema = 0,
    /// Packet decoding errors
    Decode = 1,
    /// Sink errors
    Sink = 2,
    /// Endpoint errors
    Endpoint = 3,
    /// I/O errors
    IO = 4,
    /// Configuration errors
    Config = 5,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Schema => write!(f, "Schema"),
            ErrorCategory::Decode => write!(f, "Decode"),
            ErrorCategory::Sink => write!(f, "Sink"),
            ErrorCategory::Endpoint => write!(f, "Endpoint"),
            ErrorCategory::IO => write!(f, "IO"),
            ErrorCategory::Config => write!(f, "Config"),
        }
    }
}

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ErrorSeverity {
    /// Informational, no action required
    Info = 0,
    /// Warning, the next snapshot is a natural retry
    Warning = 1,
    /// Error, the affected sink is disabled
    Error = 2,
    /// Critical, the endpoint or process cannot continue
    Critical = 3,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
