//! Decoded telemetry snapshots.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::schema::FieldSchema;

/// Name of the field that flags an active race.
pub const IS_RACE_ON: &str = "IsRaceOn";

const WATTS_PER_HORSEPOWER: f32 = 745.699_87;
const MPS_TO_KPH: f32 = 3.6;

/// One datagram's worth of named field values.
///
/// Immutable once decoded. Fan-out hands the same `Arc<TelemetrySnapshot>` to
/// every sink worker.
#[derive(Debug, Clone)]
pub struct TelemetrySnapshot {
    schema: Arc<FieldSchema>,
    values: Vec<f32>,
    raw: Vec<u8>,
    received_at: DateTime<Local>,
}

impl TelemetrySnapshot {
    pub(crate) fn new(
        schema: Arc<FieldSchema>,
        values: Vec<f32>,
        raw: Vec<u8>,
        received_at: DateTime<Local>,
    ) -> Self {
        debug_assert_eq!(schema.len(), values.len());
        Self {
            schema,
            values,
            raw,
            received_at,
        }
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Field names in schema declaration order.
    pub fn field_names(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.schema.field_names()
    }

    /// Values in schema declaration order.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// `(name, value)` pairs in schema declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.schema.field_names().zip(self.values.iter().copied())
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.schema
            .ordinal(name)
            .and_then(|i| self.values.get(i).copied())
    }

    /// Like [`get`](Self::get) but missing fields read as zero.
    pub fn value_or_zero(&self, name: &str) -> f32 {
        self.get(name).unwrap_or(0.0)
    }

    /// Owned name to value mapping.
    pub fn to_map(&self) -> HashMap<String, f32> {
        self.iter()
            .map(|(name, value)| (name.to_owned(), value))
            .collect()
    }

    /// The exact datagram this snapshot was decoded from.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the game reports an active race.
    ///
    /// Reads the `IsRaceOn` field, or the first field when the schema has no
    /// field of that name.
    pub fn is_race_on(&self) -> bool {
        let flag = self
            .get(IS_RACE_ON)
            .or_else(|| self.values.first().copied())
            .unwrap_or(0.0);
        flag != 0.0
    }

    /// Compact summary for verbose logging.
    pub fn dashboard(&self) -> Dashboard {
        Dashboard {
            race_on: self.is_race_on(),
            rpm: self.value_or_zero("CurrentEngineRpm"),
            gear: self.value_or_zero("Gear"),
            horsepower: (self.value_or_zero("Power") / WATTS_PER_HORSEPOWER).max(0.0),
            speed_kph: self.value_or_zero("Speed") * MPS_TO_KPH,
        }
    }
}

/// Human readable view of the most watched fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dashboard {
    pub race_on: bool,
    pub rpm: f32,
    pub gear: f32,
    pub horsepower: f32,
    pub speed_kph: f32,
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "race_on={} rpm={:.0} gear={:.0} bhp={:.0} speed_kph={:.0}",
            u8::from(self.race_on),
            self.rpm,
            self.gear,
            self.horsepower,
            self.speed_kph
        )
    }
}
