//! Error types for the simracing telemetry workspace.
//!
//! The taxonomy follows the life of a datagram:
//!
//! - [`schema`]: building a field schema from its static definition
//! - [`decode`]: turning a datagram into a snapshot
//! - [`sink`]: persisting or forwarding a snapshot
//! - [`endpoint`]: owning the ingestion socket
//!
//! [`common`] gathers them under [`TelemetryError`] with a category and a
//! severity so callers can decide whether a failure stops an endpoint, a
//! single sink, or nothing at all.
//!
//! # Example
//!
//! ```
//! use simracing_telemetry_errors::{DecodeError, ErrorSeverity, TelemetryError};
//!
//! let err: TelemetryError = DecodeError::MalformedPacket { expected: 331, actual: 12 }.into();
//! assert_eq!(err.severity(), ErrorSeverity::Warning);
//! assert!(!err.is_fatal());
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod common;
pub mod decode;
pub mod endpoint;
pub mod schema;
pub mod sink;

pub use common::{ErrorCategory, ErrorSeverity, TelemetryError};
pub use decode::DecodeError;
pub use endpoint::EndpointError;
pub use schema::SchemaError;
pub use sink::{SinkError, SinkErrorKind};

/// A specialized `Result` type for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// A specialized `Result` type for sink operations.
pub type SinkResult<T = ()> = std::result::Result<T, SinkError>;
