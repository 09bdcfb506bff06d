//! Broadcast of decoded snapshots to one bounded queue per sink.

use std::sync::Arc;

use simracing_telemetry_core::{StreamId, TelemetrySnapshot};
use simracing_telemetry_sinks::TelemetrySink;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::stats::{SinkStats, SinkStatsSnapshot};
use crate::throttle::LogThrottle;

type SnapshotSender = mpsc::Sender<Arc<TelemetrySnapshot>>;
type SnapshotReceiver = mpsc::Receiver<Arc<TelemetrySnapshot>>;

/// Result of dispatching one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Sinks whose queue accepted the snapshot
    pub delivered: usize,
    /// Sinks whose queue was full; the snapshot was dropped for them
    pub overflowed: usize,
    /// Sinks skipped because they are disabled
    pub skipped: usize,
}

struct Route {
    sender: SnapshotSender,
    stats: Arc<SinkStats>,
}

/// Sending half of the per-sink queues of one endpoint.
///
/// Every sink gets every snapshot. A full queue drops the newest snapshot
/// for that sink only and counts it; ingestion never waits on a sink.
pub struct FanOut {
    stream: StreamId,
    routes: Vec<Route>,
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("stream", &self.stream)
            .field("sinks", &self.routes.len())
            .finish()
    }
}

impl FanOut {
    /// Spawn one worker per sink, each draining its own queue of
    /// `capacity` snapshots.
    pub fn spawn(
        stream: StreamId,
        sinks: &[Arc<dyn TelemetrySink>],
        capacity: usize,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let capacity = capacity.max(1);
        let mut routes = Vec::with_capacity(sinks.len());
        let mut workers = Vec::with_capacity(sinks.len());

        for sink in sinks {
            let (sender, receiver) = mpsc::channel(capacity);
            let stats = Arc::new(SinkStats::new(sink.name()));
            workers.push(tokio::spawn(run_worker(
                Arc::clone(sink),
                stream,
                receiver,
                Arc::clone(&stats),
            )));
            routes.push(Route { sender, stats });
        }

        (Self { stream, routes }, workers)
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Offer `snapshot` to every enabled sink without waiting.
    pub fn dispatch(&self, snapshot: &Arc<TelemetrySnapshot>) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for route in &self.routes {
            if route.stats.is_disabled() {
                outcome.skipped += 1;
                continue;
            }
            match route.sender.try_send(Arc::clone(snapshot)) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    route.stats.inc_overflow();
                    outcome.overflowed += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    route.stats.disable();
                    outcome.skipped += 1;
                }
            }
        }

        outcome
    }

    /// Shared counters of every sink, in configuration order.
    pub fn sink_stats(&self) -> Vec<Arc<SinkStats>> {
        self.routes.iter().map(|r| Arc::clone(&r.stats)).collect()
    }

    pub fn sink_snapshots(&self) -> Vec<SinkStatsSnapshot> {
        self.routes.iter().map(|r| r.stats.snapshot()).collect()
    }
}

/// Consume one sink's queue until every sender is gone and the queue is
/// empty, or until the sink reports a configuration error.
async fn run_worker(
    sink: Arc<dyn TelemetrySink>,
    stream: StreamId,
    mut queue: SnapshotReceiver,
    stats: Arc<SinkStats>,
) {
    let name = sink.name().to_owned();

    if let Err(err) = sink.init_stream(stream).await {
        if err.disables_sink() {
            error!(
                %stream,
                sink = %name,
                error = %err,
                "sink initialisation failed, sink disabled"
            );
            stats.disable();
            return;
        }
        warn!(
            %stream,
            sink = %name,
            error = %err,
            "sink initialisation failed, will retry on first snapshot"
        );
    }
    debug!(%stream, sink = %name, "sink worker started");

    let mut throttle = LogThrottle::per_second();
    while let Some(snapshot) = queue.recv().await {
        match sink.convert(&snapshot, stream).await {
            Ok(()) => stats.inc_processed(),
            Err(err) if err.disables_sink() => {
                stats.inc_failed();
                stats.disable();
                error!(%stream, sink = %name, error = %err, "sink misconfigured, sink disabled");
                break;
            }
            Err(err) => {
                stats.inc_failed();
                if let Some(suppressed) = throttle.check() {
                    warn!(
                        %stream,
                        sink = %name,
                        error = %err,
                        suppressed,
                        "sink failed to handle snapshot"
                    );
                }
            }
        }
    }

    let final_stats = stats.snapshot();
    info!(
        %stream,
        sink = %name,
        processed = final_stats.processed,
        failed = final_stats.failed,
        overflow = final_stats.overflow,
        "sink worker stopped"
    );
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use simracing_telemetry_core::{DataType, FieldSchema, PacketWriter, decode};
    use simracing_telemetry_errors::{SinkError, SinkResult};

    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<f32>>,
    }

    #[async_trait]
    impl TelemetrySink for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        async fn convert(&self, snapshot: &TelemetrySnapshot, _stream: StreamId) -> SinkResult {
            self.seen.lock().push(snapshot.value_or_zero("Seq"));
            Ok(())
        }
    }

    struct Misconfigured;

    #[async_trait]
    impl TelemetrySink for Misconfigured {
        fn name(&self) -> &str {
            "misconfigured"
        }

        async fn init_stream(&self, _stream: StreamId) -> SinkResult {
            Err(SinkError::configuration("no such directory"))
        }

        async fn convert(&self, _snapshot: &TelemetrySnapshot, _stream: StreamId) -> SinkResult {
            Ok(())
        }
    }

    fn snapshots(count: u16) -> Result<Vec<Arc<TelemetrySnapshot>>, Box<dyn std::error::Error>> {
        let schema = Arc::new(FieldSchema::from_types([
            ("IsRaceOn", DataType::S32),
            ("Seq", DataType::U16),
        ])?);
        (0..count)
            .map(|seq| {
                let mut writer = PacketWriter::new(&schema);
                writer.set("IsRaceOn", 1.0);
                writer.set("Seq", f64::from(seq));
                Ok(Arc::new(decode(writer.as_bytes(), &schema)?))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_every_sink_gets_every_snapshot_in_order() -> TestResult {
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        let sinks = vec![a.clone() as Arc<dyn TelemetrySink>, b.clone()];
        let (fanout, workers) = FanOut::spawn(StreamId::new(1), &sinks, 16);

        for snapshot in snapshots(10)? {
            let outcome = fanout.dispatch(&snapshot);
            assert_eq!(outcome.delivered, 2);
        }
        drop(fanout);
        for worker in workers {
            worker.await?;
        }

        let expected: Vec<f32> = (0..10u16).map(f32::from).collect();
        assert_eq!(*a.seen.lock(), expected);
        assert_eq!(*b.seen.lock(), expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() -> TestResult {
        let sink = Arc::new(Collect::default());
        let sinks = vec![sink.clone() as Arc<dyn TelemetrySink>];
        let (fanout, workers) = FanOut::spawn(StreamId::new(1), &sinks, 2);

        // Nothing yields between dispatches, so the worker cannot drain.
        let outcomes: Vec<_> = snapshots(5)?.iter().map(|s| fanout.dispatch(s)).collect();
        assert_eq!(outcomes.iter().map(|o| o.delivered).sum::<usize>(), 2);
        assert_eq!(outcomes.iter().map(|o| o.overflowed).sum::<usize>(), 3);

        let stats = fanout.sink_snapshots();
        drop(fanout);
        for worker in workers {
            worker.await?;
        }

        assert_eq!(stats.first().map(|s| s.overflow), Some(3));
        assert_eq!(*sink.seen.lock(), [0.0, 1.0]);
        Ok(())
    }

    #[tokio::test]
    async fn test_misconfigured_sink_is_disabled_and_skipped() -> TestResult {
        let good = Arc::new(Collect::default());
        let sinks = vec![
            Arc::new(Misconfigured) as Arc<dyn TelemetrySink>,
            good.clone(),
        ];
        let (fanout, mut workers) = FanOut::spawn(StreamId::new(1), &sinks, 4);

        let bad_worker = workers.remove(0);
        bad_worker.await?;

        let outcome = fanout.dispatch(snapshots(1)?.first().ok_or("no snapshot")?);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.skipped, 1);

        let disabled: Vec<_> = fanout.sink_snapshots().iter().map(|s| s.disabled).collect();
        assert_eq!(disabled, [true, false]);
        drop(fanout);
        for worker in workers {
            worker.await?;
        }
        assert_eq!(good.seen.lock().len(), 1);
        Ok(())
    }
}
