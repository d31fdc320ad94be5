//! Storage-emulator liveness probe.
//!
//! The emulator is reachable only when all of its configured ports are
//! simultaneously bound by local listeners. The probe never sends traffic:
//! it attempts a non-reusable bind on each port and treats `AddrInUse` as
//! "a listener holds this port".

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_ports() -> Vec<u16> {
    // Blob, queue, table endpoints of the local storage emulator.
    vec![10000, 10001, 10002]
}

/// Ports the storage emulator is expected to listen on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            ports: default_ports(),
        }
    }
}

/// True only if every configured port is bound by a local listener.
pub fn is_reachable(config: &ProbeConfig) -> bool {
    config.ports.iter().all(|&port| {
        let bound = port_is_bound(config.host, port);
        debug!(port, bound, "storage emulator port probe");
        bound
    })
}

fn port_is_bound(host: IpAddr, port: u16) -> bool {
    let domain = match host {
        IpAddr::V4(_) => Domain::IPV4,
        IpAddr::V6(_) => Domain::IPV6,
    };
    let Ok(socket) = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)) else {
        return false;
    };
    // No SO_REUSEADDR: the bind must fail while a listener holds the port.
    let addr = SocketAddr::new(host, port);
    match socket.bind(&addr.into()) {
        // We could bind, so nothing is listening there.
        Ok(()) => false,
        Err(err) => err.kind() == std::io::ErrorKind::AddrInUse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn detects_a_bound_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = ProbeConfig {
            host: default_host(),
            ports: vec![port],
        };
        assert!(is_reachable(&config));
    }

    #[test]
    fn free_port_means_unreachable() {
        // Bind then drop to get a port that is almost certainly free.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = ProbeConfig {
            host: default_host(),
            ports: vec![port],
        };
        assert!(!is_reachable(&config));
    }

    #[test]
    fn all_ports_must_be_bound_simultaneously() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let bound_port = listener.local_addr().unwrap().port();
        let free_port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let config = ProbeConfig {
            host: default_host(),
            ports: vec![bound_port, free_port],
        };
        assert!(!is_reachable(&config));
    }
}
