use std::path::{Path, PathBuf};

use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::error::Result;
use crate::file_transfer::FileAssembler;
use crate::infrastructure::events::{EventPublisher, TransferEvent};
use crate::protocol::{Packet, PacketKind, read_packet};

/// How a transfer read off a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Message packets were delivered; carries how many
    Messages(usize),
    /// A file was rebuilt at this path
    File(PathBuf),
}

/// Reads one transfer off a stream connection and dispatches what it carries
#[derive(Debug, Clone)]
pub struct ConnectionReader {
    download_dir: PathBuf,
    events: EventPublisher,
}

impl ConnectionReader {
    pub fn new(download_dir: impl Into<PathBuf>, events: EventPublisher) -> Self {
        Self {
            download_dir: download_dir.into(),
            events,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Decode packets until one has `part == max_part`.
    ///
    /// The first packet's kind decides the mode for the whole transfer. Message packets
    /// are published as they arrive; file packets go to a [`FileAssembler`] and a
    /// `FileReceived` event fires once the file is rebuilt. Any error ends the read and
    /// no file event is published for the incomplete transfer.
    pub async fn read_transfer<R>(&self, reader: &mut R) -> Result<TransferOutcome>
    where
        R: AsyncRead + Unpin,
    {
        let first = read_packet(reader).await?;

        if first.kind != PacketKind::File {
            let mut delivered = 0;
            let mut done = first.is_last();
            self.events.publish(TransferEvent::MessageReceived(first));
            delivered += 1;

            while !done {
                let packet = read_packet(reader).await?;
                done = packet.is_last();
                self.events.publish(TransferEvent::MessageReceived(packet));
                delivered += 1;
            }
            return Ok(TransferOutcome::Messages(delivered));
        }

        let mut assembler = FileAssembler::new(&self.download_dir);
        match self.assemble(&mut assembler, first, reader).await {
            Ok(path) => {
                info!("Received file {}", path.display());
                self.events.publish(TransferEvent::FileReceived(path.clone()));
                Ok(TransferOutcome::File(path))
            }
            Err(e) => {
                debug!("Abandoning file transfer: {}", e);
                assembler.discard().await;
                Err(e)
            }
        }
    }

    async fn assemble<R>(
        &self,
        assembler: &mut FileAssembler,
        first: Packet,
        reader: &mut R,
    ) -> Result<PathBuf>
    where
        R: AsyncRead + Unpin,
    {
        // Later packets are not re-inspected for kind; the first one governs
        let mut done = first.is_last();
        assembler.accept(&first).await?;

        while !done {
            let mut packet = read_packet(reader).await?;
            packet.kind = PacketKind::File;
            done = packet.is_last();
            assembler.accept(&packet).await?;
        }

        assembler.finish().await
    }
}
