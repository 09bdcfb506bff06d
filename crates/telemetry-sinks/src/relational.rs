//! Relational store contract and the plain one-row-per-snapshot sink.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use simracing_telemetry_core::{DataType, FieldSchema, StreamId, TelemetrySnapshot};
use simracing_telemetry_errors::SinkResult;
use tracing::{debug, info};

use crate::TelemetrySink;

/// A value bound to an insert parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreValue {
    Real(f64),
    Integer(i64),
}

impl From<f32> for StoreValue {
    fn from(value: f32) -> Self {
        StoreValue::Real(f64::from(value))
    }
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        StoreValue::Integer(value)
    }
}

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Real,
    Integer,
}

impl ColumnType {
    /// Column type for a wire field: integers stay integers.
    pub const fn for_field(data_type: DataType) -> Self {
        match data_type {
            DataType::F32 => ColumnType::Real,
            DataType::S32 | DataType::U32 | DataType::U16 | DataType::U8 | DataType::S8 => {
                ColumnType::Integer
            }
        }
    }

    pub const fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Real => "REAL",
            ColumnType::Integer => "INTEGER",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

/// Table definition used to create the table when it is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    /// Columns forming a uniqueness constraint, empty for none.
    pub unique: Vec<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            unique: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnSpec {
            name: name.into(),
            column_type,
        });
        self
    }

    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique = columns.into_iter().map(Into::into).collect();
        self
    }

    /// One column per schema field, in declaration order.
    pub fn for_schema(name: impl Into<String>, schema: &FieldSchema) -> Self {
        schema.fields().iter().fold(Self::new(name), |table, field| {
            table.column(field.name.clone(), ColumnType::for_field(field.data_type))
        })
    }
}

/// Column names and values of one insert, in matching order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertRow {
    pub columns: Vec<String>,
    pub values: Vec<StoreValue>,
}

impl InsertRow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<StoreValue>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    /// Every field of `snapshot` in declaration order.
    pub fn from_snapshot(snapshot: &TelemetrySnapshot) -> Self {
        let mut row = Self::with_capacity(snapshot.len());
        for (name, value) in snapshot.iter() {
            row.push(name, value);
        }
        row
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A relational database reachable by the relational sinks.
///
/// Implementations connect lazily and report failures through
/// [`SinkError`](simracing_telemetry_errors::SinkError): uniqueness
/// violations as `DuplicateRecord`, unusable configuration as
/// `Configuration`, anything else as `TransientStore`.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Create `table` if it does not exist.
    async fn ensure_table(&self, table: &TableSpec) -> SinkResult;

    /// Insert one row into `table`.
    async fn insert(&self, table: &str, row: InsertRow) -> SinkResult;
}

/// Writes every race-active snapshot as one row of a fixed table.
pub struct RelationalSink {
    store: Arc<dyn RelationalStore>,
    table: TableSpec,
    table_ready: AtomicBool,
}

impl fmt::Debug for RelationalSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalSink")
            .field("table", &self.table.name)
            .field("table_ready", &self.table_ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RelationalSink {
    pub fn new(store: Arc<dyn RelationalStore>, table: TableSpec) -> Self {
        Self {
            store,
            table,
            table_ready: AtomicBool::new(false),
        }
    }

    pub fn table(&self) -> &TableSpec {
        &self.table
    }

    async fn ensure_table(&self) -> SinkResult {
        if self.table_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        self.store.ensure_table(&self.table).await?;
        self.table_ready.store(true, Ordering::Release);
        info!(table = %self.table.name, "relational table ready");
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for RelationalSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn init_stream(&self, stream: StreamId) -> SinkResult {
        debug!(%stream, table = %self.table.name, "initialising relational sink");
        self.ensure_table().await
    }

    async fn convert(&self, snapshot: &TelemetrySnapshot, _stream: StreamId) -> SinkResult {
        if !snapshot.is_race_on() {
            return Ok(());
        }
        self.ensure_table().await?;
        self.store
            .insert(&self.table.name, InsertRow::from_snapshot(snapshot))
            .await
    }
}
