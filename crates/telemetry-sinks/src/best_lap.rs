//! Deduplicating best-lap writer.
//!
//! Each snapshot carries the best lap of the current session, so the same
//! value arrives about sixty times a second until it improves. The sink keeps
//! the last stored [`BestLapFingerprint`] per stream and only talks to the
//! store when it changes.
//!
//! Writes are additionally gated by a single permit taken with `try_acquire`:
//! when a write is already in flight the snapshot is skipped rather than
//! queued. The cache only advances once the store confirms the row, so the
//! next packet with the same fingerprint retries.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use simracing_telemetry_core::{FieldSchema, StreamId, TelemetrySnapshot};
use simracing_telemetry_errors::{SinkError, SinkResult};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info};

use crate::TelemetrySink;
use crate::relational::{ColumnType, InsertRow, RelationalStore, StoreValue, TableSpec};

pub const TRACK_ORDINAL: &str = "TrackOrdinal";
pub const CAR_ORDINAL: &str = "CarOrdinal";
pub const BEST_LAP: &str = "BestLap";
pub const USER_ID: &str = "user_id";

/// Snapshot fields copied into each best-lap row, in column order.
pub const BEST_LAP_FIELDS: [&str; 10] = [
    CAR_ORDINAL,
    "CarClass",
    "CarPerformanceIndex",
    "DrivetrainType",
    "NumCylinders",
    "Fuel",
    BEST_LAP,
    "LapNumber",
    "RacePosition",
    TRACK_ORDINAL,
];

/// Identity of one best-lap observation: track, car and lap time, compared
/// by exact bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BestLapFingerprint {
    track: u32,
    car: u32,
    best_lap: u32,
}

impl BestLapFingerprint {
    pub fn new(track: f32, car: f32, best_lap: f32) -> Self {
        Self {
            track: track.to_bits(),
            car: car.to_bits(),
            best_lap: best_lap.to_bits(),
        }
    }

    pub fn from_snapshot(snapshot: &TelemetrySnapshot) -> Self {
        Self::new(
            snapshot.value_or_zero(TRACK_ORDINAL),
            snapshot.value_or_zero(CAR_ORDINAL),
            snapshot.value_or_zero(BEST_LAP),
        )
    }

    pub fn best_lap(&self) -> f32 {
        f32::from_bits(self.best_lap)
    }

    /// Whether a lap has been completed at all.
    pub fn has_lap(&self) -> bool {
        self.best_lap() != 0.0
    }
}

impl fmt::Display for BestLapFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "track={} car={} best_lap={}",
            f32::from_bits(self.track),
            f32::from_bits(self.car),
            self.best_lap()
        )
    }
}

/// Last stored fingerprint per stream plus the single write permit.
///
/// Owned by one [`BestLapSink`]; entries are never evicted.
#[derive(Debug)]
pub struct DedupCache {
    last: Mutex<HashMap<StreamId, BestLapFingerprint>>,
    permit: Semaphore,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupCache {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(HashMap::new()),
            permit: Semaphore::new(1),
        }
    }

    pub fn last(&self, stream: StreamId) -> Option<BestLapFingerprint> {
        self.last.lock().get(&stream).copied()
    }

    pub fn is_known(&self, stream: StreamId, fingerprint: BestLapFingerprint) -> bool {
        self.last(stream) == Some(fingerprint)
    }

    pub fn record(&self, stream: StreamId, fingerprint: BestLapFingerprint) {
        self.last.lock().insert(stream, fingerprint);
    }

    /// Take the write permit without waiting. `None` while another write is
    /// in flight.
    pub fn try_permit(&self) -> Option<SemaphorePermit<'_>> {
        self.permit.try_acquire().ok()
    }

    pub fn len(&self) -> usize {
        self.last.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.lock().is_empty()
    }
}

/// Counters of a [`BestLapSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BestLapStats {
    pub inserted: u64,
    pub duplicates: u64,
    pub contended: u64,
}

/// Persists a row each time a stream reports a new best lap.
pub struct BestLapSink {
    store: Arc<dyn RelationalStore>,
    table: TableSpec,
    user_id: i64,
    cache: DedupCache,
    table_ready: AtomicBool,
    inserted: AtomicU64,
    duplicates: AtomicU64,
    contended: AtomicU64,
}

impl fmt::Debug for BestLapSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BestLapSink")
            .field("table", &self.table.name)
            .field("user_id", &self.user_id)
            .field("cache", &self.cache)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl BestLapSink {
    /// Create a sink writing to `table` with the given session user.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `schema` lacks a field the row or
    /// the fingerprint needs.
    pub fn new(
        store: Arc<dyn RelationalStore>,
        table: impl Into<String>,
        schema: &FieldSchema,
        user_id: i64,
    ) -> SinkResult<Self> {
        let mut spec = TableSpec::new(table);
        for name in BEST_LAP_FIELDS {
            let field = schema.field(name).ok_or_else(|| {
                SinkError::configuration(format!("best-lap sink needs field '{name}'"))
            })?;
            spec = spec.column(name, ColumnType::for_field(field.data_type));
        }
        let spec = spec
            .column(USER_ID, ColumnType::Integer)
            .unique([USER_ID, TRACK_ORDINAL, CAR_ORDINAL, BEST_LAP]);

        Ok(Self {
            store,
            table: spec,
            user_id,
            cache: DedupCache::new(),
            table_ready: AtomicBool::new(false),
            inserted: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        })
    }

    pub fn table(&self) -> &TableSpec {
        &self.table
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    pub fn stats(&self) -> BestLapStats {
        BestLapStats {
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
        }
    }

    fn row(&self, snapshot: &TelemetrySnapshot) -> InsertRow {
        let mut row = InsertRow::with_capacity(BEST_LAP_FIELDS.len() + 1);
        for name in BEST_LAP_FIELDS {
            row.push(name, snapshot.value_or_zero(name));
        }
        row.push(USER_ID, StoreValue::Integer(self.user_id));
        row
    }

    async fn ensure_table(&self) -> SinkResult {
        if self.table_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        self.store.ensure_table(&self.table).await?;
        self.table_ready.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for BestLapSink {
    fn name(&self) -> &str {
        "sqlite_best_lap"
    }

    async fn init_stream(&self, stream: StreamId) -> SinkResult {
        debug!(%stream, table = %self.table.name, "initialising best-lap sink");
        self.ensure_table().await
    }

    async fn convert(&self, snapshot: &TelemetrySnapshot, stream: StreamId) -> SinkResult {
        let fingerprint = BestLapFingerprint::from_snapshot(snapshot);
        if !fingerprint.has_lap() || self.cache.is_known(stream, fingerprint) {
            return Ok(());
        }

        let Some(_permit) = self.cache.try_permit() else {
            self.contended.fetch_add(1, Ordering::Relaxed);
            debug!(%stream, %fingerprint, "best-lap write in flight, skipping");
            return Ok(());
        };

        self.ensure_table().await?;
        match self.store.insert(&self.table.name, self.row(snapshot)).await {
            Ok(()) => {
                self.cache.record(stream, fingerprint);
                self.inserted.fetch_add(1, Ordering::Relaxed);
                info!(%stream, %fingerprint, "stored new best lap");
                Ok(())
            }
            Err(SinkError::DuplicateRecord) => {
                self.cache.record(stream, fingerprint);
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(%stream, %fingerprint, "best lap already stored");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use simracing_telemetry_core::{Game, PacketWriter, decode};

    use super::*;
    use crate::relational::tests::RecordingStore;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const STREAM: StreamId = StreamId::new(5300);

    struct Fixture {
        schema: Arc<FieldSchema>,
        store: Arc<RecordingStore>,
        sink: BestLapSink,
    }

    fn fixture() -> Result<Fixture, Box<dyn std::error::Error>> {
        let game = Game::ForzaMotorsport2023;
        let schema = Arc::new(game.load_schema()?);
        let store = Arc::new(RecordingStore::default());
        let sink = BestLapSink::new(store.clone(), game.best_lap_table(), &schema, 1)?;
        Ok(Fixture {
            schema,
            store,
            sink,
        })
    }

    fn lap(
        schema: &Arc<FieldSchema>,
        track: f64,
        car: f64,
        best_lap: f64,
    ) -> Result<TelemetrySnapshot, Box<dyn std::error::Error>> {
        let mut writer = PacketWriter::new(schema);
        writer.set("IsRaceOn", 1.0);
        writer.set(TRACK_ORDINAL, track);
        writer.set(CAR_ORDINAL, car);
        writer.set(BEST_LAP, best_lap);
        writer.set("Fuel", 0.5);
        Ok(decode(writer.as_bytes(), schema)?)
    }

    #[test]
    fn test_table_layout() -> TestResult {
        let f = fixture()?;
        let table = f.sink.table();
        assert_eq!(table.name, "tmd_forzamotorsport2023_bestlaps");
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), 11);
        assert_eq!(names.last(), Some(&"user_id"));
        assert_eq!(table.unique, ["user_id", "TrackOrdinal", "CarOrdinal", "BestLap"]);
        Ok(())
    }

    #[test]
    fn test_missing_field_is_configuration_error() -> TestResult {
        let schema =
            FieldSchema::from_types([("IsRaceOn", simracing_telemetry_core::DataType::S32)])?;
        let result = BestLapSink::new(Arc::new(RecordingStore::default()), "t", &schema, 1);
        assert!(matches!(result, Err(ref e) if e.disables_sink()));
        Ok(())
    }

    #[tokio::test]
    async fn test_same_fingerprint_twice_inserts_once() -> TestResult {
        let f = fixture()?;
        let snapshot = lap(&f.schema, 110.0, 2301.0, 92.125)?;

        f.sink.convert(&snapshot, STREAM).await?;
        f.sink.convert(&snapshot, STREAM).await?;

        assert_eq!(f.store.inserts.lock().len(), 1);
        assert_eq!(f.sink.stats().inserted, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_different_fingerprints_insert_twice() -> TestResult {
        let f = fixture()?;
        f.sink.convert(&lap(&f.schema, 110.0, 2301.0, 92.125)?, STREAM).await?;
        f.sink.convert(&lap(&f.schema, 110.0, 2301.0, 91.5)?, STREAM).await?;

        let inserts = f.store.inserts.lock();
        assert_eq!(inserts.len(), 2);
        let (_, row) = inserts.last().ok_or("no insert")?;
        let best_lap = row
            .columns
            .iter()
            .position(|c| c == BEST_LAP)
            .and_then(|i| row.values.get(i).copied());
        assert_eq!(best_lap, Some(StoreValue::Real(91.5)));
        assert_eq!(row.values.last(), Some(&StoreValue::Integer(1)));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_lap_time_is_skipped() -> TestResult {
        let f = fixture()?;
        f.sink.convert(&lap(&f.schema, 110.0, 2301.0, 0.0)?, STREAM).await?;
        assert!(f.store.inserts.lock().is_empty());
        assert!(f.sink.cache().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_streams_are_tracked_separately() -> TestResult {
        let f = fixture()?;
        let snapshot = lap(&f.schema, 110.0, 2301.0, 92.125)?;
        f.sink.convert(&snapshot, StreamId::new(5300)).await?;
        f.sink.convert(&snapshot, StreamId::new(5301)).await?;
        assert_eq!(f.store.inserts.lock().len(), 2);
        assert_eq!(f.sink.cache().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_record_advances_cache() -> TestResult {
        let f = fixture()?;
        f.store.failures.lock().push(SinkError::DuplicateRecord);
        let snapshot = lap(&f.schema, 110.0, 2301.0, 92.125)?;

        f.sink.convert(&snapshot, STREAM).await?;
        f.sink.convert(&snapshot, STREAM).await?;

        assert_eq!(f.store.inserts.lock().len(), 1);
        assert_eq!(
            f.sink.cache().last(STREAM),
            Some(BestLapFingerprint::from_snapshot(&snapshot))
        );
        assert_eq!(f.sink.stats().duplicates, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_error_leaves_cache_for_retry() -> TestResult {
        let f = fixture()?;
        f.store.failures.lock().push(SinkError::transient("connection refused"));
        let snapshot = lap(&f.schema, 110.0, 2301.0, 92.125)?;

        let first = f.sink.convert(&snapshot, STREAM).await;
        assert!(matches!(first, Err(SinkError::TransientStore(_))));
        assert_eq!(f.sink.cache().last(STREAM), None);

        f.sink.convert(&snapshot, STREAM).await?;
        assert_eq!(f.store.inserts.lock().len(), 2);
        assert!(f.sink.cache().is_known(STREAM, BestLapFingerprint::from_snapshot(&snapshot)));
        Ok(())
    }

    #[tokio::test]
    async fn test_held_permit_skips_without_caching() -> TestResult {
        let f = fixture()?;
        let snapshot = lap(&f.schema, 110.0, 2301.0, 92.125)?;

        let permit = f.sink.cache().try_permit().ok_or("permit unavailable")?;
        f.sink.convert(&snapshot, STREAM).await?;
        assert!(f.store.inserts.lock().is_empty());
        assert_eq!(f.sink.stats().contended, 1);
        drop(permit);

        f.sink.convert(&snapshot, STREAM).await?;
        assert_eq!(f.store.inserts.lock().len(), 1);
        Ok(())
    }

    struct SlowStore {
        inner: RecordingStore,
    }

    #[async_trait]
    impl RelationalStore for SlowStore {
        async fn ensure_table(&self, table: &TableSpec) -> SinkResult {
            self.inner.ensure_table(table).await
        }

        async fn insert(&self, table: &str, row: InsertRow) -> SinkResult {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.inner.insert(table, row).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_issue_one_write() -> TestResult {
        let game = Game::ForzaMotorsport2023;
        let schema = Arc::new(game.load_schema()?);
        let store = Arc::new(SlowStore {
            inner: RecordingStore::default(),
        });
        let sink = BestLapSink::new(store.clone(), game.best_lap_table(), &schema, 1)?;
        sink.init_stream(STREAM).await?;
        let snapshot = lap(&schema, 110.0, 2301.0, 92.125)?;

        let (a, b) = tokio::join!(
            sink.convert(&snapshot, STREAM),
            sink.convert(&snapshot, STREAM)
        );
        a?;
        b?;

        assert_eq!(store.inner.inserts.lock().len(), 1);
        assert_eq!(sink.stats().contended, 1);
        Ok(())
    }
}
