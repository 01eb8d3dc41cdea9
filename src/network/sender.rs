use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info, warn};

use super::Transport;
use super::config::{DEFAULT_PACKET_SIZE, MAX_DATAGRAM_SIZE};
use crate::error::{Error, Result};
use crate::file_transfer::FileChunker;
use crate::protocol::{Packet, write_packet};

/// Parse a destination address string into an IP address
pub fn parse_address(address: &str) -> Result<IpAddr> {
    address
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| Error::InvalidAddress(address.to_string()))
}

/// One-shot helper: send `bytes` as a single message to `address:port`
pub async fn send_message_to(
    transport: Transport,
    address: &str,
    port: u16,
    bytes: &[u8],
) -> Result<()> {
    let mut sender = Sender::new(transport);
    sender.set_destination(address, port)?;
    sender.send_message(bytes).await
}

/// Outbound side: wraps messages and files into packets and writes them to a destination
#[derive(Debug, Clone)]
pub struct Sender {
    transport: Transport,
    destination: Option<SocketAddr>,
    packet_size: usize,
}

impl Sender {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            destination: None,
            packet_size: DEFAULT_PACKET_SIZE,
        }
    }

    /// Frame budget used when chunking files
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn set_destination(&mut self, address: &str, port: u16) -> Result<()> {
        let ip = parse_address(address)?;
        self.destination = Some(SocketAddr::new(ip, port));
        Ok(())
    }

    pub fn destination(&self) -> Result<SocketAddr> {
        self.destination.ok_or(Error::NoDestination)
    }

    /// Send raw bytes as a single Message packet (`part == max_part == 1`)
    pub async fn send_message(&self, bytes: &[u8]) -> Result<()> {
        self.send_packet(&Packet::message(bytes)).await
    }

    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send_message(text.as_bytes()).await
    }

    /// Send one already-built packet as its own transfer
    pub async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let destination = self.destination()?;
        match self.transport {
            Transport::Stream => {
                let mut stream = TcpStream::connect(destination).await?;
                write_packet(&mut stream, packet).await?;
                stream.shutdown().await?;
            }
            Transport::Datagram => send_datagram(destination, packet).await?,
        }
        debug!("Sent {} to {}", packet, destination);
        Ok(())
    }

    /// Send a file as one transfer.
    ///
    /// Returns `Ok(false)` without touching the network when `path` does not exist.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<bool> {
        self.send_file_with_progress(path, |_| {}).await
    }

    /// Like [`Sender::send_file`], calling `on_progress` with the payload bytes of each part sent
    pub async fn send_file_with_progress<F>(
        &self,
        path: impl AsRef<Path>,
        mut on_progress: F,
    ) -> Result<bool>
    where
        F: FnMut(usize),
    {
        let path = path.as_ref();
        let destination = self.destination()?;

        // Directories and unreadable paths count as missing
        let is_file = tokio::fs::metadata(path)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        if !is_file {
            warn!("Not sending {}: no such file", path.display());
            return Ok(false);
        }
        if self.transport == Transport::Datagram {
            return Err(Error::UnsupportedTransport);
        }

        let mut chunker = FileChunker::open(path, self.packet_size).await?;
        info!(
            "Sending {} ({} bytes, {} parts) to {}",
            chunker.file_name(),
            chunker.file_size(),
            chunker.max_part(),
            destination
        );

        let stream = TcpStream::connect(destination).await?;
        let mut writer = BufWriter::new(stream);
        while let Some(packet) = chunker.next_packet().await? {
            write_packet(&mut writer, &packet).await?;
            if packet.part > 0 {
                on_progress(packet.payload.len());
            }
        }
        writer.shutdown().await?;

        info!("Finished sending {}", chunker.file_name());
        Ok(true)
    }
}

async fn send_datagram(destination: SocketAddr, packet: &Packet) -> Result<()> {
    let frame = packet.encode();
    if frame.len() > MAX_DATAGRAM_SIZE {
        return Err(Error::PacketTooLarge {
            size: frame.len(),
            budget: MAX_DATAGRAM_SIZE,
        });
    }

    let local: SocketAddr = match destination {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(destination).await?;
    socket.send(&frame).await?;
    Ok(())
}
