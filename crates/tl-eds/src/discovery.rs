//! Gateway discovery over UDP broadcast.
//!
//! The OWServer answers a one byte `"D"` datagram on port 30303 with a
//! longer identification string. Only the sender address of that reply is
//! used.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use if_addrs::{get_if_addrs, IfAddr};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::EdsError;

/// Port the gateway listens on for discovery requests.
pub const DISCOVERY_PORT: u16 = 30303;
/// Default per-receive deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

const REQUEST: &[u8] = b"D";
const BUFFER: usize = 1024;

/// Where to listen, where to send the request and how long to wait for a reply.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub bind: SocketAddr,
    pub destinations: Vec<SocketAddr>,
    pub timeout: Duration,
}

impl Discovery {
    /// Broadcast on every non-loopback IPv4 interface, listening on the discovery port.
    pub fn broadcast(timeout: Duration) -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DISCOVERY_PORT),
            destinations: broadcast_destinations(),
            timeout,
        }
    }
}

fn broadcast_destinations() -> Vec<SocketAddr> {
    let mut out = Vec::new();
    match get_if_addrs() {
        Ok(interfaces) => {
            for iface in interfaces {
                let IfAddr::V4(v4) = iface.addr else {
                    continue;
                };
                if v4.ip.is_loopback() {
                    continue;
                }
                let broadcast = v4.broadcast.unwrap_or(Ipv4Addr::BROADCAST);
                let dest = SocketAddr::new(IpAddr::V4(broadcast), DISCOVERY_PORT);
                if !out.contains(&dest) {
                    trace!(interface = %iface.name, %dest, "discovery destination");
                    out.push(dest);
                }
            }
        }
        Err(err) => warn!(?err, "failed to enumerate interfaces"),
    }
    if out.is_empty() {
        out.push(SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DISCOVERY_PORT));
    }
    out
}

/// Locate the gateway on the local subnets.
pub async fn discover(timeout: Duration) -> Result<IpAddr, EdsError> {
    discover_with(Discovery::broadcast(timeout)).await
}

/// Send the discovery request to each destination and wait for the first real reply.
///
/// One byte datagrams are ignored; they are our own request echoed back by
/// the broadcast.
pub async fn discover_with(discovery: Discovery) -> Result<IpAddr, EdsError> {
    let socket = bind_socket(discovery.bind)?;

    let mut sent = 0usize;
    let mut last_err = None;
    for dest in &discovery.destinations {
        match socket.send_to(REQUEST, *dest).await {
            Ok(_) => {
                debug!(%dest, "sent discovery request");
                sent += 1;
            }
            Err(err) => {
                warn!(%dest, ?err, "discovery send failed");
                last_err = Some(err);
            }
        }
    }
    if sent == 0 {
        return Err(match last_err {
            Some(err) => err.into(),
            None => EdsError::NotInitialized("no discovery destination".into()),
        });
    }

    let mut buf = vec![0u8; BUFFER];
    loop {
        let (len, src) = match time::timeout(discovery.timeout, socket.recv_from(&mut buf)).await {
            Err(_) => return Err(EdsError::DiscoveryTimeout(discovery.timeout)),
            Ok(recv) => recv?,
        };
        if len <= 1 {
            trace!(%src, "ignoring discovery echo");
            continue;
        }
        info!(gateway = %src.ip(), bytes = len, "gateway answered discovery");
        return Ok(src.ip());
    }
}

fn bind_socket(addr: SocketAddr) -> Result<UdpSocket, EdsError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    let udp = UdpSocket::from_std(socket.into())?;
    debug!(local = %addr, "bound discovery socket");
    Ok(udp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn loopback() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn first_long_reply_wins() {
        let responder = UdpSocket::bind(loopback()).await.expect("bind responder");
        let target = responder.local_addr().expect("addr");
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let (len, from) = responder.recv_from(&mut buf).await.expect("request");
            assert_eq!(&buf[..len], REQUEST);
            // an echo must not end discovery
            responder.send_to(b"D", from).await.expect("echo");
            responder
                .send_to(b"EDS OWServer-Enet2 00:04:A3:2D:68:E9", from)
                .await
                .expect("reply");
        });

        let found = discover_with(Discovery {
            bind: loopback(),
            destinations: vec![target],
            timeout: Duration::from_secs(2),
        })
        .await
        .expect("discover");
        assert_eq!(found, IpAddr::V4(Ipv4Addr::LOCALHOST));
        task.await.expect("responder");
    }

    #[tokio::test]
    async fn silence_is_a_timeout() {
        let silent = UdpSocket::bind(loopback()).await.expect("bind silent");
        let started = Instant::now();
        let err = discover_with(Discovery {
            bind: loopback(),
            destinations: vec![silent.local_addr().expect("addr")],
            timeout: Duration::from_millis(200),
        })
        .await
        .expect_err("no reply");
        assert!(matches!(err, EdsError::DiscoveryTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn broadcast_targets_discovery_port() {
        let discovery = Discovery::broadcast(DEFAULT_TIMEOUT);
        assert!(!discovery.destinations.is_empty());
        assert!(discovery
            .destinations
            .iter()
            .all(|dest| dest.port() == DISCOVERY_PORT));
        assert_eq!(discovery.bind.port(), DISCOVERY_PORT);
    }
}
