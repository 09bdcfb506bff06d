//! CSV file sink with retention-aware path resolution.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use simracing_telemetry_core::{Game, StreamId, TelemetrySnapshot};
use simracing_telemetry_errors::SinkResult;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::TelemetrySink;
use crate::retention::{Retention, resolve_target_path};

/// Appends one comma separated line per snapshot to a CSV file.
///
/// The target path is resolved from the configured base path, the retention
/// policy and the snapshot's local receive date. Resolution touches the
/// filesystem, so it only runs before the first write and when a daily file
/// may roll over; the open file is replaced only when the resolved path
/// changes.
#[derive(Debug)]
pub struct FileSink {
    game: Game,
    base: PathBuf,
    retention: Retention,
    current: Mutex<Option<OpenCsv>>,
}

#[derive(Debug)]
struct OpenCsv {
    path: PathBuf,
    date: NaiveDate,
    file: File,
}

impl OpenCsv {
    /// Open `path` for appending, writing the header if the file is new or
    /// empty.
    async fn open(
        path: PathBuf,
        date: NaiveDate,
        snapshot: &TelemetrySnapshot,
    ) -> SinkResult<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if file.metadata().await?.len() == 0 {
            let header = snapshot.field_names().collect::<Vec<_>>().join(",");
            write_line(&mut file, &header).await?;
            debug!(path = %path.display(), "wrote CSV header");
        }

        Ok(Self { path, date, file })
    }
}

async fn write_line(file: &mut File, line: &str) -> SinkResult {
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

/// Format values in declaration order using the shortest representation
/// that reads back to the same `f32`.
fn csv_line(snapshot: &TelemetrySnapshot) -> String {
    snapshot
        .values()
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl FileSink {
    /// Create a sink. Path validity is checked on the first write.
    pub fn new(game: Game, base: impl Into<PathBuf>, retention: Retention) -> Self {
        Self {
            game,
            base: base.into(),
            retention,
            current: Mutex::new(None),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Whether a file opened for `date` can take a snapshot from `other`.
    fn covers(&self, date: NaiveDate, other: NaiveDate) -> bool {
        match self.retention {
            Retention::None => true,
            Retention::Daily => date == other,
        }
    }

    /// Path of the currently open file, if any.
    pub async fn current_path(&self) -> Option<PathBuf> {
        self.current.lock().await.as_ref().map(|open| open.path.clone())
    }
}

#[async_trait]
impl TelemetrySink for FileSink {
    fn name(&self) -> &str {
        "csv"
    }

    async fn convert(&self, snapshot: &TelemetrySnapshot, _stream: StreamId) -> SinkResult {
        let date = snapshot.received_at().date_naive();
        let mut current = self.current.lock().await;
        if let Some(open) = current.as_mut()
            && self.covers(open.date, date)
        {
            return write_line(&mut open.file, &csv_line(snapshot)).await;
        }

        let target = resolve_target_path(&self.base, self.retention, self.game, date)?;
        let open = match current.take() {
            Some(mut open) if open.path == target => {
                open.date = date;
                open
            }
            previous => {
                if let Some(previous) = previous {
                    info!(
                        from = %previous.path.display(),
                        to = %target.display(),
                        "rolling over CSV file"
                    );
                }
                OpenCsv::open(target, date, snapshot).await?
            }
        };
        let open = current.insert(open);
        write_line(&mut open.file, &csv_line(snapshot)).await
    }
}
