//! Module `passive`
//!
//! Data connections for transfers. Passive listeners take ports from the
//! configured range with a rotating cursor shared by every session of a
//! listener address. Only the control connection's peer IP may connect.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, timeout_at};

use crate::net::PortRange;

/// Hands out passive ports in turn, skipping ports already in use.
#[derive(Debug, Clone)]
pub struct PassivePorts {
    range: PortRange,
    cursor: Arc<AtomicUsize>,
}

impl PassivePorts {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Bind a listener on `ip` at the next free port of the range.
    pub async fn bind(&self, ip: IpAddr) -> io::Result<TcpListener> {
        let len = self.range.len();
        for _ in 0..len {
            let offset = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
            let port = self.range.start() + offset as u16;
            match TcpListener::bind(SocketAddr::new(ip, port)).await {
                Ok(listener) => return Ok(listener),
                Err(e) => debug!("Passive port {port} unavailable: {e}"),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            format!("no free port in {}", self.range),
        ))
    }
}

/// Where the next transfer's data connection comes from
#[derive(Debug, Default)]
pub enum DataChannel {
    #[default]
    None,
    Passive(TcpListener),
    Active(SocketAddr),
}

impl DataChannel {
    pub fn is_none(&self) -> bool {
        matches!(self, DataChannel::None)
    }

    /// Establish the data connection, consuming the channel setup.
    ///
    /// A passive listener waits up to `wait` for the owner's connection and
    /// drops connections from any other address.
    pub async fn connect(self, owner_ip: IpAddr, wait: Duration) -> io::Result<TcpStream> {
        match self {
            DataChannel::None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "use PORT or PASV first",
            )),
            DataChannel::Active(addr) => {
                tokio::time::timeout(wait, TcpStream::connect(addr))
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "data connection timed out"))?
            }
            DataChannel::Passive(listener) => accept_owner(listener, owner_ip, wait).await,
        }
    }
}

async fn accept_owner(listener: TcpListener, owner_ip: IpAddr, wait: Duration) -> io::Result<TcpStream> {
    let deadline = Instant::now() + wait;
    loop {
        let (stream, peer) = timeout_at(deadline, listener.accept())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "data connection timed out"))??;
        if peer.ip() == owner_ip {
            return Ok(stream);
        }
        warn!("Rejected data connection from {peer}, expected {owner_ip}");
    }
}

/// `h1,h2,h3,h4,p1,p2` for a PASV reply
pub fn format_pasv(addr: SocketAddr) -> Option<String> {
    match addr.ip() {
        IpAddr::V4(ip) => {
            let [a, b, c, d] = ip.octets();
            let port = addr.port();
            Some(format!("{a},{b},{c},{d},{},{}", port >> 8, port & 0xff))
        }
        IpAddr::V6(_) => None,
    }
}

/// Parse the `h1,h2,h3,h4,p1,p2` argument of PORT.
pub fn parse_port_arg(arg: &str) -> Option<SocketAddr> {
    let numbers: Vec<u8> = arg
        .split(',')
        .map(|n| n.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .ok()?;
    let [a, b, c, d, p1, p2] = numbers[..] else {
        return None;
    };
    let ip = IpAddr::from([a, b, c, d]);
    Some(SocketAddr::new(ip, u16::from(p1) << 8 | u16::from(p2)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn free_range(width: u16) -> PortRange {
        // Reserve a block by probing an ephemeral port; good enough for tests
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let start = probe.local_addr().unwrap().port();
        drop(probe);
        let start = start.min(u16::MAX - width);
        PortRange::parse(&format!("{}-{}", start, start + width)).unwrap()
    }

    #[test]
    fn test_pasv_and_port_arguments() {
        let addr: SocketAddr = "192.168.1.5:50001".parse().unwrap();
        assert_eq!(format_pasv(addr).unwrap(), "192,168,1,5,195,81");
        assert_eq!(parse_port_arg("192,168,1,5,195,81"), Some(addr));
        assert_eq!(parse_port_arg("192,168,1,5,195"), None);
        assert_eq!(parse_port_arg("300,168,1,5,195,81"), None);
        assert_eq!(format_pasv("[::1]:21".parse().unwrap()), None);
    }

    #[tokio::test]
    async fn test_ports_rotate_through_range() {
        let ports = PassivePorts::new(free_range(3));
        let first = ports.bind(LOCALHOST).await.unwrap();
        let second = ports.bind(LOCALHOST).await.unwrap();
        let (a, b) = (
            first.local_addr().unwrap().port(),
            second.local_addr().unwrap().port(),
        );
        assert_ne!(a, b);
        assert!(ports.range().ports().contains(&a));
        assert!(ports.range().ports().contains(&b));
    }

    #[tokio::test]
    async fn test_passive_accepts_owner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let stream = DataChannel::Passive(listener)
            .connect(LOCALHOST, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(stream.peer_addr().unwrap().ip(), LOCALHOST);
        client.await.unwrap();
    }

    #[tokio::test]
    async fn test_passive_times_out_for_foreign_owner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();

        let owner: IpAddr = "10.9.8.7".parse().unwrap();
        let err = DataChannel::Passive(listener)
            .connect(owner, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_no_channel_is_an_error() {
        let err = DataChannel::None
            .connect(LOCALHOST, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
