//! Ingestion endpoint errors.

use std::net::SocketAddr;

/// Errors raised while starting an ingestion endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The UDP socket could not be bound. Fatal for this endpoint.
    #[error("could not bind UDP socket on {addr}: {source}")]
    Bind {
        /// Address the endpoint tried to bind
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },
}
