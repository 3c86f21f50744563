//! Published container port addresses.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

/// Host address and port a container port is published on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PublishedAddr {
    addr: SocketAddr,
    proto: Arc<str>,
}

impl PublishedAddr {
    /// Parse a port binding as reported by the engine; bindings with an
    /// unparsable IP or port are skipped by returning `None`.
    ///
    /// IPv4-mapped IPv6 host IPs come out as plain IPv4.
    pub(crate) fn parse(host_ip: &str, host_port: &str, proto: &str) -> Option<Self> {
        let ip = match host_ip.parse::<IpAddr>().ok()? {
            IpAddr::V6(ip) => ip.to_ipv4_mapped().map_or(IpAddr::V6(ip), IpAddr::V4),
            ip => ip,
        };
        let port: u16 = host_port.parse().ok()?;
        Some(Self {
            addr: SocketAddr::new(ip, port),
            proto: proto.into(),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Transport protocol, such as "tcp".
    pub fn proto(&self) -> &str {
        &self.proto
    }

    /// Replace an unspecified host IP ("0.0.0.0" or "::") with the loopback
    /// address of the same family, so the address can be dialed.
    pub fn unspecified_as_loopback(&self) -> Self {
        let ip = match self.addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        Self {
            addr: SocketAddr::new(ip, self.addr.port()),
            proto: self.proto.clone(),
        }
    }
}

impl fmt::Display for PublishedAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_dialable_addresses() {
        let v4 = PublishedAddr::parse("0.0.0.0", "32768", "tcp").unwrap();
        assert_eq!(v4.to_string(), "0.0.0.0:32768");
        assert_eq!(v4.unspecified_as_loopback().to_string(), "127.0.0.1:32768");

        let v6 = PublishedAddr::parse("::", "32768", "udp").unwrap();
        assert_eq!(v6.to_string(), "[::]:32768");
        assert_eq!(v6.unspecified_as_loopback().to_string(), "[::1]:32768");
        assert_eq!(v6.proto(), "udp");
    }

    #[test]
    fn skips_garbage() {
        assert!(PublishedAddr::parse("", "80", "tcp").is_none());
        assert!(PublishedAddr::parse("127.0.0.1", "99999", "tcp").is_none());
    }

    #[test]
    fn keeps_any_transport_protocol() {
        let addr = PublishedAddr::parse("127.0.0.1", "4433", "quic").unwrap();
        assert_eq!(addr.proto(), "quic");
        assert_eq!(addr.to_string(), "127.0.0.1:4433");
    }

    #[test]
    fn compacts_ipv4_mapped_addresses() {
        let addr = PublishedAddr::parse("::ffff:192.0.2.1", "8080", "tcp").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(addr.to_string(), "192.0.2.1:8080");

        let mapped_any = PublishedAddr::parse("::ffff:0.0.0.0", "80", "tcp").unwrap();
        assert_eq!(
            mapped_any.unspecified_as_loopback().to_string(),
            "127.0.0.1:80"
        );
    }

    #[test]
    fn keeps_specified_addresses() {
        let addr = PublishedAddr::parse("192.0.2.1", "8080", "tcp").unwrap();
        assert_eq!(addr.unspecified_as_loopback(), addr);
    }
}
