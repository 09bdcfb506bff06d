//! Core telemetry types for simracing UDP telemetry.
//!
//! ## Modules
//! - `schema` - Field schema (`FieldSchema`, `FieldSpec`, `DataType`)
//! - `game` - Supported titles and their embedded packet definitions
//! - `decoder` - Bounds-checked, table-driven packet decoding
//! - `snapshot` - Immutable decoded snapshots shared with sinks
//! - `packet` - Packet encoding for replay and tests

#![deny(static_mut_refs)]

use std::fmt;

pub mod decoder;
pub mod game;
pub mod packet;
pub mod schema;
pub mod snapshot;

pub use decoder::{PacketDecoder, decode, decode_at};
pub use game::Game;
pub use packet::PacketWriter;
pub use schema::{DataType, FieldSchema, FieldSpec};
pub use snapshot::{Dashboard, IS_RACE_ON, TelemetrySnapshot};

pub use simracing_telemetry_errors::{DecodeError, SchemaError};

/// Identifies the ingestion endpoint a snapshot came from: the UDP port it
/// listens on. Per-stream sink state is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u16);

impl StreamId {
    pub const fn new(port: u16) -> Self {
        Self(port)
    }

    pub const fn port(self) -> u16 {
        self.0
    }
}

impl From<u16> for StreamId {
    fn from(port: u16) -> Self {
        Self(port)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
