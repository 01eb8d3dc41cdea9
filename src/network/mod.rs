pub mod config;
pub mod connection;
pub mod datagram;
pub mod sender;
pub mod stream;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use tracing::info;

pub use config::ListenerConfig;
pub use connection::{ConnectionReader, TransferOutcome};
pub use datagram::DatagramListener;
pub use sender::{Sender, parse_address, send_message_to};
pub use stream::StreamListener;

use crate::error::{Error, Result};
use crate::infrastructure::events::EventPublisher;

/// Underlying socket type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transport {
    /// Connection-oriented (TCP)
    #[default]
    Stream,
    /// Connectionless (UDP)
    Datagram,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stream => write!(f, "stream"),
            Transport::Datagram => write!(f, "datagram"),
        }
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stream" | "tcp" => Ok(Transport::Stream),
            "datagram" | "udp" => Ok(Transport::Datagram),
            other => Err(Error::Config(format!("unknown transport {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerState {
    #[default]
    Stopped,
    Starting,
    Running,
}

/// A listener on either transport
pub enum Listener {
    Stream(StreamListener),
    Datagram(DatagramListener),
}

impl Listener {
    pub fn new(transport: Transport, config: ListenerConfig, events: EventPublisher) -> Self {
        match transport {
            Transport::Stream => Listener::Stream(StreamListener::new(config, events)),
            Transport::Datagram => Listener::Datagram(DatagramListener::new(config, events)),
        }
    }

    pub fn transport(&self) -> Transport {
        match self {
            Listener::Stream(_) => Transport::Stream,
            Listener::Datagram(_) => Transport::Datagram,
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        match self {
            Listener::Stream(l) => l.config(),
            Listener::Datagram(l) => l.config(),
        }
    }

    fn events(&self) -> &EventPublisher {
        match self {
            Listener::Stream(l) => l.events(),
            Listener::Datagram(l) => l.events(),
        }
    }

    /// Bind and start receiving; returns the bound address
    pub async fn start(&mut self) -> Result<SocketAddr> {
        match self {
            Listener::Stream(l) => l.start().await,
            Listener::Datagram(l) => l.start().await,
        }
    }

    pub async fn stop(&mut self) {
        match self {
            Listener::Stream(l) => l.stop().await,
            Listener::Datagram(l) => l.stop().await,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }

    pub fn state(&self) -> ListenerState {
        match self {
            Listener::Stream(l) => l.state(),
            Listener::Datagram(l) => l.state(),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Stream(l) => l.local_addr(),
            Listener::Datagram(l) => l.local_addr(),
        }
    }

    /// Replace this listener with one bound to `port`.
    ///
    /// The old listener is stopped first. The new one shares the same event channel
    /// and download directory, and is started if the old one was running.
    pub async fn reconfigure(mut self, port: u16) -> Result<Listener> {
        let was_running = self.is_running();
        self.stop().await;

        let config = ListenerConfig {
            port,
            ..self.config().clone()
        };
        let mut listener = Listener::new(self.transport(), config, self.events().clone());
        if was_running {
            listener.start().await?;
        }
        info!("{} listener reconfigured to port {}", listener.transport(), port);
        Ok(listener)
    }
}
