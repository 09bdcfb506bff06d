//! Host address discovery for startup logging.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::debug;

/// Public resolver used only as a routing target. No datagram is sent.
const ROUTE_PROBE: &str = "8.8.8.8:80";

/// Preferred outbound IPv4 address of this host.
///
/// Connecting a UDP socket only selects a route and a source address, so
/// this works offline as long as a default route exists. Returns `None`
/// when there is no route.
pub async fn outbound_ip() -> Option<IpAddr> {
    let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!(error = %e, "cannot bind route probe socket");
            return None;
        }
    };
    if let Err(e) = socket.connect(ROUTE_PROBE).await {
        debug!(error = %e, "no outbound route");
        return None;
    }
    socket
        .local_addr()
        .ok()
        .map(|addr| addr.ip())
        .filter(|ip| !ip.is_unspecified())
}

/// Address to advertise for a listener bound to `bind`.
///
/// A wildcard bind is reported with the outbound address when known; a
/// specific bind address is reported as is.
pub fn display_addr(bind: SocketAddr, outbound: Option<IpAddr>) -> SocketAddr {
    match outbound {
        Some(ip) if bind.ip().is_unspecified() => SocketAddr::new(ip, bind.port()),
        _ => bind,
    }
}
