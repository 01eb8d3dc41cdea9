use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub use crate::file_transfer::MIN_PACKET_SIZE;

/// Default port for both listening and sending
pub const DEFAULT_PORT: u16 = 30000;

/// Default upper bound for one encoded frame of a file transfer
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// How long the stream listener sleeps when no connection is pending
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Largest payload a single UDP datagram can carry over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// The invoking user's downloads directory
pub fn default_download_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join("Downloads")
}

/// Listener configuration struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Port to bind to
    pub port: u16,

    /// Where completed files are written
    pub download_dir: PathBuf,

    /// Sleep between accept polls of the stream listener
    pub poll_interval: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            download_dir: default_download_dir(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ListenerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Get the socket address to bind to
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)
    }
}
