//! Ingestion and fan-out for simracing telemetry.
//!
//! An [`Endpoint`] binds one UDP port, decodes every datagram with a
//! [`PacketDecoder`](simracing_telemetry_core::PacketDecoder) and broadcasts
//! race-active snapshots to every configured sink. Each sink is driven by
//! its own worker behind a bounded queue, so a slow sink only loses its own
//! snapshots and never delays the socket or the other sinks.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use simracing_telemetry_core::{Game, PacketDecoder};
//! # use simracing_telemetry_pipeline::{Endpoint, EndpointConfig};
//! # use simracing_telemetry_sinks::{RelaySink, TelemetrySink};
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let game = Game::ForzaMotorsport2023;
//! let decoder = PacketDecoder::new(Arc::new(game.load_schema()?));
//! let relay: Arc<dyn TelemetrySink> = Arc::new(RelaySink::new(["127.0.0.1:5301"])?);
//!
//! let handle = Endpoint::new(EndpointConfig::new(game.default_port()), decoder, vec![relay])
//!     .start()
//!     .await?;
//! tokio::signal::ctrl_c().await?;
//! let report = handle.shutdown().await;
//! println!("{:?}", report.endpoint);
//! # Ok(())
//! # }
//! ```

#![deny(static_mut_refs)]

pub mod endpoint;
pub mod fanout;
pub mod stats;
pub mod throttle;

pub use endpoint::{
    DEFAULT_MAX_DATAGRAM, DEFAULT_QUEUE_CAPACITY, Endpoint, EndpointConfig, EndpointHandle,
    EndpointReport, EndpointState,
};
pub use fanout::{DispatchOutcome, FanOut};
pub use stats::{EndpointStats, EndpointStatsSnapshot, SinkStats, SinkStatsSnapshot};
pub use throttle::LogThrottle;
