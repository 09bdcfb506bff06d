//! UDP relay: forwards the raw datagram of every snapshot to a fixed list of
//! destinations.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use simracing_telemetry_core::{StreamId, TelemetrySnapshot};
use simracing_telemetry_errors::{SinkError, SinkResult};
use tokio::net::{UdpSocket, lookup_host};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::TelemetrySink;
use crate::connection::ConnectionState;

/// One `host:port` target with its own lazily connected socket.
#[derive(Debug)]
pub struct RelayDestination {
    address: String,
    connection: Mutex<ConnectionState<UdpSocket>>,
    sent: AtomicU64,
    failures: AtomicU64,
}

impl RelayDestination {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connection: Mutex::new(ConnectionState::Disconnected),
            sent: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_connected()
    }

    /// Send `payload`, connecting first if needed. Any failure drops the
    /// socket so the next call reconnects.
    async fn forward(&self, payload: &[u8]) -> io::Result<()> {
        let mut connection = self.connection.lock().await;
        connection
            .connect_if_needed(|| connect(&self.address))
            .await?;

        let result = match connection.handle() {
            Some(socket) => socket.send(payload).await.map(|_| ()),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        };
        if result.is_err() && connection.disconnect().is_some() {
            debug!(destination = %self.address, "relay socket dropped, reconnecting on next send");
        }
        result
    }
}

async fn connect(address: &str) -> io::Result<UdpSocket> {
    let target = lookup_host(address).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address for {address}"),
        )
    })?;
    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(target).await?;
    info!(destination = %address, resolved = %target, "relay destination connected");
    Ok(socket)
}

/// Forwards raw datagrams, byte for byte, to every destination.
#[derive(Debug)]
pub struct RelaySink {
    destinations: Vec<RelayDestination>,
}

impl RelaySink {
    /// # Errors
    ///
    /// Returns a configuration error when no destination is given.
    pub fn new<I, S>(destinations: I) -> SinkResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let destinations: Vec<_> = destinations.into_iter().map(RelayDestination::new).collect();
        if destinations.is_empty() {
            return Err(SinkError::configuration("UDP relay needs at least one destination"));
        }
        Ok(Self { destinations })
    }

    pub fn destinations(&self) -> &[RelayDestination] {
        &self.destinations
    }
}

#[async_trait]
impl TelemetrySink for RelaySink {
    fn name(&self) -> &str {
        "udp"
    }

    /// Every destination is attempted; the error, if any, lists each
    /// destination that failed.
    async fn convert(&self, snapshot: &TelemetrySnapshot, _stream: StreamId) -> SinkResult {
        let payload = snapshot.raw_bytes();
        let mut failed = Vec::new();

        for destination in &self.destinations {
            match destination.forward(payload).await {
                Ok(()) => {
                    destination.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    destination.failures.fetch_add(1, Ordering::Relaxed);
                    failed.push(format!("{}: {err}", destination.address));
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(SinkError::transient(format!(
                "relay failed for {}",
                failed.join("; ")
            )))
        }
    }
}
