//! Endpoint and per-sink counters.
//!
//! Incremented with `Ordering::Relaxed` from the receive loop and the sink
//! workers; read through plain-value snapshots.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Counter snapshot returned by [`EndpointStats::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointStatsSnapshot {
    /// Datagrams read from the socket
    pub received: u64,
    /// Datagrams shorter than the schema requires
    pub malformed: u64,
    /// Snapshots dropped because no race is active
    pub race_off: u64,
    /// Snapshots handed to the fan-out
    pub dispatched: u64,
    /// Sink deliveries dropped because a queue was full
    pub queue_overflow: u64,
    /// Failed socket reads
    pub receive_errors: u64,
}

/// Counters of one ingestion endpoint.
#[derive(Debug, Default)]
pub struct EndpointStats {
    received: AtomicU64,
    malformed: AtomicU64,
    race_off: AtomicU64,
    dispatched: AtomicU64,
    queue_overflow: AtomicU64,
    receive_errors: AtomicU64,
}

impl EndpointStats {
    pub const fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            race_off: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            queue_overflow: AtomicU64::new(0),
            receive_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_race_off(&self) {
        self.race_off.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_queue_overflow(&self, dropped: u64) {
        if dropped > 0 {
            self.queue_overflow.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn inc_receive_errors(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EndpointStatsSnapshot {
        EndpointStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            race_off: self.race_off.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            queue_overflow: self.queue_overflow.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }
}

/// Counter snapshot of one sink worker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SinkStatsSnapshot {
    pub sink: String,
    /// Snapshots the sink converted successfully
    pub processed: u64,
    /// Snapshots the sink failed to convert
    pub failed: u64,
    /// Snapshots dropped because the sink's queue was full
    pub overflow: u64,
    /// Whether the sink was disabled by a configuration error
    pub disabled: bool,
}

/// Counters of one sink worker.
#[derive(Debug)]
pub struct SinkStats {
    sink: String,
    processed: AtomicU64,
    failed: AtomicU64,
    overflow: AtomicU64,
    disabled: AtomicBool,
}

impl SinkStats {
    pub fn new(sink: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            overflow: AtomicU64::new(0),
            disabled: AtomicBool::new(false),
        }
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    #[inline]
    pub fn inc_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_overflow(&self) {
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.disabled.store(true, Ordering::Release);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            sink: self.sink.clone(),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            overflow: self.overflow.load(Ordering::Relaxed),
            disabled: self.is_disabled(),
        }
    }
}
