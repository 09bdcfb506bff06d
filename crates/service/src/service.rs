//! Endpoint supervision for the daemon.

use std::net::SocketAddr;

use anyhow::{Result, bail};
use simracing_telemetry_core::{PacketDecoder, StreamId};
use simracing_telemetry_errors::TelemetryError;
use simracing_telemetry_pipeline::{Endpoint, EndpointHandle, EndpointReport};
use tracing::{error, info};

use crate::config::{ServiceConfig, SinkFactory};
use crate::network;

/// All running endpoints of one configuration.
pub struct TelemetryService {
    endpoints: Vec<EndpointHandle>,
    failures: Vec<TelemetryError>,
}

impl TelemetryService {
    /// Build every sink and bind every endpoint.
    ///
    /// A bind failure stops only that endpoint. Fails when a sink cannot be
    /// built or when no endpoint could be bound.
    pub async fn start(config: &ServiceConfig) -> Result<Self> {
        let mut factory = SinkFactory::new();
        let mut pending = Vec::with_capacity(config.endpoints.len());
        for settings in &config.endpoints {
            let schema = factory.schema(settings.game)?;
            let sinks = factory.build_all(settings)?;
            pending.push((
                settings.game,
                settings.endpoint_config(),
                PacketDecoder::new(schema),
                sinks,
            ));
        }

        let outbound = network::outbound_ip().await;
        let mut endpoints = Vec::with_capacity(pending.len());
        let mut failures = Vec::new();
        for (game, endpoint_config, decoder, sinks) in pending {
            let sink_names: Vec<String> = sinks.iter().map(|s| s.name().to_owned()).collect();
            match Endpoint::new(endpoint_config, decoder, sinks).start().await {
                Ok(handle) => {
                    info!(
                        stream = %handle.stream(),
                        game = %game,
                        sinks = ?sink_names,
                        "{} data out server listening on {}, waiting for data",
                        game.display_name(),
                        network::display_addr(handle.local_addr(), outbound),
                    );
                    endpoints.push(handle);
                }
                Err(e) => {
                    let err = TelemetryError::from(e);
                    error!(
                        game = %game,
                        category = %err.category(),
                        severity = %err.severity(),
                        error = %err,
                        "endpoint failed to start"
                    );
                    failures.push(err);
                }
            }
        }

        if endpoints.is_empty() {
            match failures.into_iter().next() {
                Some(err) => bail!("No endpoint could be started: {err}"),
                None => bail!("No endpoint could be started"),
            }
        }
        Ok(Self {
            endpoints,
            failures,
        })
    }

    pub fn streams(&self) -> Vec<StreamId> {
        self.endpoints.iter().map(EndpointHandle::stream).collect()
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.endpoints.iter().map(EndpointHandle::local_addr).collect()
    }

    /// Endpoints that were configured but could not be started.
    pub fn failures(&self) -> &[TelemetryError] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Stop every endpoint, drain its sinks and log the final counters.
    pub async fn shutdown(self) -> Vec<EndpointReport> {
        let mut reports = Vec::with_capacity(self.endpoints.len());
        for handle in self.endpoints {
            let report = handle.shutdown().await;
            info!(
                stream = %report.stream,
                received = report.endpoint.received,
                dispatched = report.endpoint.dispatched,
                race_off = report.endpoint.race_off,
                malformed = report.endpoint.malformed,
                queue_overflow = report.endpoint.queue_overflow,
                "endpoint stopped"
            );
            for sink in &report.sinks {
                info!(
                    stream = %report.stream,
                    sink = %sink.sink,
                    processed = sink.processed,
                    failed = sink.failed,
                    overflow = sink.overflow,
                    disabled = sink.disabled,
                    "sink totals"
                );
            }
            reports.push(report);
        }
        reports
    }
}
