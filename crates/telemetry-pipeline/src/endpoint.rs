//! UDP ingestion endpoint.
//!
//! One endpoint owns one socket. Its receive loop decodes each datagram,
//! drops malformed and race-off packets, and hands the rest to the fan-out.
//!
//! ```text
//! Idle -> Listening -> Decoding -> Dispatching -> Listening
//!                  \-> Closed (shutdown or unrecoverable socket error)
//! ```

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use simracing_telemetry_core::{PacketDecoder, StreamId};
use simracing_telemetry_errors::EndpointError;
use simracing_telemetry_sinks::TelemetrySink;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::fanout::FanOut;
use crate::stats::{EndpointStats, EndpointStatsSnapshot, SinkStats, SinkStatsSnapshot};
use crate::throttle::LogThrottle;

/// Per-sink queue length unless configured otherwise.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Receive buffer size unless configured otherwise.
pub const DEFAULT_MAX_DATAGRAM: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub stream: StreamId,
    pub bind_addr: SocketAddr,
    pub queue_capacity: usize,
    pub max_datagram: usize,
}

impl EndpointConfig {
    /// Listen on `0.0.0.0:port`; the stream is identified by the port.
    pub fn new(port: u16) -> Self {
        Self {
            stream: StreamId::new(port),
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_datagram: DEFAULT_MAX_DATAGRAM,
        }
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_max_datagram(mut self, max_datagram: usize) -> Self {
        self.max_datagram = max_datagram;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EndpointState {
    Idle = 0,
    Listening = 1,
    Decoding = 2,
    Dispatching = 3,
    Closed = 4,
}

impl EndpointState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EndpointState::Idle,
            1 => EndpointState::Listening,
            2 => EndpointState::Decoding,
            3 => EndpointState::Dispatching,
            _ => EndpointState::Closed,
        }
    }
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: EndpointState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn set(&self, state: EndpointState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> EndpointState {
        EndpointState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Receive errors after which the socket is still usable.
fn is_recoverable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// An endpoint that has not been started yet.
pub struct Endpoint {
    config: EndpointConfig,
    decoder: PacketDecoder,
    sinks: Vec<Arc<dyn TelemetrySink>>,
    state: Arc<StateCell>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("config", &self.config)
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("state", &self.state.get())
            .finish()
    }
}

impl Endpoint {
    pub fn new(
        config: EndpointConfig,
        decoder: PacketDecoder,
        sinks: Vec<Arc<dyn TelemetrySink>>,
    ) -> Self {
        Self {
            config,
            decoder,
            sinks,
            state: Arc::new(StateCell::new(EndpointState::Idle)),
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn state(&self) -> EndpointState {
        self.state.get()
    }

    /// Bind the socket, spawn the sink workers and the receive loop.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Bind`] if the socket cannot be bound. Nothing
    /// is spawned in that case.
    pub async fn start(self) -> Result<EndpointHandle, EndpointError> {
        let Endpoint {
            config,
            decoder,
            sinks,
            state,
        } = self;

        let bind_err = |source| EndpointError::Bind {
            addr: config.bind_addr,
            source,
        };
        let socket = UdpSocket::bind(config.bind_addr).await.map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;

        let stream = config.stream;
        let (fanout, workers) = FanOut::spawn(stream, &sinks, config.queue_capacity);
        let sink_stats = fanout.sink_stats();
        let stats = Arc::new(EndpointStats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        state.set(EndpointState::Listening);
        info!(
            %stream,
            addr = %local_addr,
            sinks = sinks.len(),
            queue_capacity = config.queue_capacity,
            "endpoint listening"
        );

        let receiver = tokio::spawn(
            ReceiveLoop {
                stream,
                socket,
                decoder,
                fanout,
                stats: Arc::clone(&stats),
                state: Arc::clone(&state),
                max_datagram: config.max_datagram.max(1),
            }
            .run(shutdown_rx),
        );

        Ok(EndpointHandle {
            stream,
            local_addr,
            stats,
            sink_stats,
            state,
            shutdown_tx,
            receiver,
            workers,
        })
    }
}

struct ReceiveLoop {
    stream: StreamId,
    socket: UdpSocket,
    decoder: PacketDecoder,
    fanout: FanOut,
    stats: Arc<EndpointStats>,
    state: Arc<StateCell>,
    max_datagram: usize,
}

impl ReceiveLoop {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let stream = self.stream;
        let mut buffer = vec![0u8; self.max_datagram];
        let mut malformed_log = LogThrottle::per_second();

        loop {
            self.state.set(EndpointState::Listening);
            let received = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(%stream, "shutdown requested");
                    break;
                }
                received = self.socket.recv_from(&mut buffer) => received,
            };

            let (len, peer) = match received {
                Ok(received) => received,
                Err(err) if is_recoverable(&err) => {
                    self.stats.inc_receive_errors();
                    debug!(%stream, error = %err, "recoverable receive error");
                    continue;
                }
                Err(err) => {
                    self.stats.inc_receive_errors();
                    error!(%stream, error = %err, "receive failed, closing endpoint");
                    break;
                }
            };

            self.stats.inc_received();
            self.state.set(EndpointState::Decoding);
            let datagram = buffer.get(..len).unwrap_or_default();

            let snapshot = match self.decoder.decode(datagram) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    self.stats.inc_malformed();
                    if let Some(suppressed) = malformed_log.check() {
                        warn!(
                            %stream,
                            %peer,
                            error = %err,
                            suppressed,
                            "dropping malformed datagram"
                        );
                    }
                    continue;
                }
            };

            if !snapshot.is_race_on() {
                self.stats.inc_race_off();
                continue;
            }

            trace!(%stream, dashboard = %snapshot.dashboard(), "snapshot");

            self.state.set(EndpointState::Dispatching);
            let outcome = self.fanout.dispatch(&Arc::new(snapshot));
            self.stats.inc_dispatched();
            self.stats.add_queue_overflow(outcome.overflowed as u64);
        }

        // Dropping the socket and the fan-out senders lets every worker
        // drain its queue and stop.
        let ReceiveLoop {
            socket,
            fanout,
            state,
            ..
        } = self;
        drop(socket);
        drop(fanout);
        state.set(EndpointState::Closed);
        info!(%stream, "endpoint closed");
    }
}

/// Handle to a running endpoint.
#[derive(Debug)]
pub struct EndpointHandle {
    stream: StreamId,
    local_addr: SocketAddr,
    stats: Arc<EndpointStats>,
    sink_stats: Vec<Arc<SinkStats>>,
    state: Arc<StateCell>,
    shutdown_tx: watch::Sender<bool>,
    receiver: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

/// Final counters of an endpoint after shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReport {
    pub stream: StreamId,
    pub endpoint: EndpointStatsSnapshot,
    pub sinks: Vec<SinkStatsSnapshot>,
}

impl EndpointHandle {
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Address the socket is bound to, with the actual port when port 0
    /// was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> EndpointState {
        self.state.get()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == EndpointState::Closed
    }

    pub fn stats(&self) -> EndpointStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn sink_stats(&self) -> Vec<SinkStatsSnapshot> {
        self.sink_stats.iter().map(|s| s.snapshot()).collect()
    }

    /// Stop receiving, let every sink drain its queue, and wait for all
    /// tasks to finish.
    pub async fn shutdown(self) -> EndpointReport {
        let stream = self.stream;
        if self.shutdown_tx.send(true).is_err() {
            debug!(%stream, "receive loop already stopped");
        }

        if let Err(err) = self.receiver.await {
            warn!(%stream, error = %err, "receive task ended abnormally");
        }
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(%stream, error = %err, "sink worker ended abnormally");
            }
        }

        EndpointReport {
            stream,
            endpoint: self.stats.snapshot(),
            sinks: self.sink_stats.iter().map(|s| s.snapshot()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(is_recoverable(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(is_recoverable(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_recoverable(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_state_round_trip() {
        let cell = StateCell::new(EndpointState::Idle);
        for state in [
            EndpointState::Listening,
            EndpointState::Decoding,
            EndpointState::Dispatching,
            EndpointState::Closed,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn test_default_config() {
        let config = EndpointConfig::new(5300);
        assert_eq!(config.stream, StreamId::new(5300));
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:5300");
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.max_datagram, DEFAULT_MAX_DATAGRAM);
    }
}
