//! Output sinks for decoded telemetry snapshots.
//!
//! Every sink implements [`TelemetrySink`]. Sinks take `&self` and keep their
//! mutable state (file handles, connections, dedup cache) behind internal
//! synchronization, so one instance can be driven by the workers of several
//! ingestion endpoints at once.
//!
//! - [`FileSink`] - CSV files with `none` / `daily` retention
//! - [`RelationalSink`] - one row per snapshot
//! - [`BestLapSink`] - one row per new best lap, deduplicated per stream
//! - [`RelaySink`] - raw datagram forwarding over UDP

#![deny(static_mut_refs)]

use async_trait::async_trait;
use simracing_telemetry_core::{StreamId, TelemetrySnapshot};

pub mod best_lap;
pub mod connection;
pub mod file;
pub mod relational;
pub mod relay;
pub mod retention;
pub mod sqlite;

pub use best_lap::{BestLapFingerprint, BestLapSink, BestLapStats, DedupCache};
pub use connection::ConnectionState;
pub use file::FileSink;
pub use relational::{
    ColumnSpec, ColumnType, InsertRow, RelationalSink, RelationalStore, StoreValue, TableSpec,
};
pub use relay::{RelayDestination, RelaySink};
pub use retention::{Retention, resolve_target_path};
pub use sqlite::{PoolPolicy, SqliteStore};

pub use simracing_telemetry_errors::{SinkError, SinkErrorKind, SinkResult};

/// Output destination for decoded snapshots.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Called once by each worker before it consumes snapshots for `stream`.
    async fn init_stream(&self, _stream: StreamId) -> SinkResult {
        Ok(())
    }

    /// Persist or forward one snapshot.
    async fn convert(&self, snapshot: &TelemetrySnapshot, stream: StreamId) -> SinkResult;
}
