use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{OVERHEAD_SIZE, Packet, PacketKind, digits, max_payload_for};
use crate::utils;

/// Smallest packet budget that still leaves room for payload with the widest header
pub const MIN_PACKET_SIZE: usize = 64;

/// Payload bytes that part `part` of `max_part` can carry within `packet_size`.
///
/// The header grows by one byte every time `part` gains a decimal digit, so the
/// capacity drops by one at 10, 100, 1000 and so on.
pub fn payload_capacity(part: u32, max_part: u32, packet_size: usize) -> usize {
    let fixed = OVERHEAD_SIZE
        + digits(u8::from(PacketKind::File) as u64)
        + digits(part as u64)
        + digits(max_part as u64);
    max_payload_for(packet_size.saturating_sub(fixed))
}

/// Sum of the capacities of parts `1..=max_part`, one digit band at a time
fn total_capacity(max_part: u32, packet_size: usize) -> u64 {
    let max_part = max_part as u64;
    let mut total = 0u64;
    let mut band_start = 1u64;
    while band_start <= max_part {
        let band_end = (band_start * 10 - 1).min(max_part);
        let per_part = payload_capacity(band_start as u32, max_part as u32, packet_size) as u64;
        total += per_part * (band_end - band_start + 1);
        band_start *= 10;
    }
    total
}

/// Number of parts needed to carry `file_size` bytes within `packet_size` frames.
///
/// Starts from `ceil(file_size / packet_size)` and grows until the header overhead
/// of every part has been paid for. An empty file still takes one (empty) part.
pub fn plan_max_part(file_size: u64, packet_size: usize) -> Result<u32> {
    if packet_size < MIN_PACKET_SIZE {
        return Err(Error::Config(format!(
            "packet size {packet_size} is below the minimum of {MIN_PACKET_SIZE}"
        )));
    }
    if file_size == 0 {
        return Ok(1);
    }

    let too_many = || {
        Error::Config(format!(
            "{file_size} bytes need more than {} parts at packet size {packet_size}",
            u32::MAX
        ))
    };

    let mut max_part =
        u32::try_from(file_size.div_ceil(packet_size as u64)).map_err(|_| too_many())?;
    while total_capacity(max_part, packet_size) < file_size {
        max_part = max_part.checked_add(1).ok_or_else(too_many)?;
    }
    Ok(max_part)
}

/// Splits a byte source into a file transfer: the name header (part 0)
/// followed by parts `1..=max_part`, each frame at most `packet_size` bytes.
pub struct FileChunker<R> {
    source: R,
    file_name: String,
    file_size: u64,
    packet_size: usize,
    max_part: u32,
    header_sent: bool,
    next_part: u32,
    bytes_read: u64,
}

impl FileChunker<File> {
    /// Open `path` for chunking; the transfer carries its final path component as the name
    pub async fn open(path: impl AsRef<Path>, packet_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file_name = utils::file_name_of(path)
            .ok_or_else(|| Error::Config(format!("{} has no file name", path.display())))?;

        let file = File::open(path).await?;
        let file_size = file.metadata().await?.len();

        Self::new(file_name, file_size, file, packet_size)
    }
}

impl<R> FileChunker<R>
where
    R: AsyncRead + Unpin,
{
    /// `source` must yield at least `file_size` bytes
    pub fn new(
        file_name: impl Into<String>,
        file_size: u64,
        source: R,
        packet_size: usize,
    ) -> Result<Self> {
        let file_name = file_name.into();
        let max_part = plan_max_part(file_size, packet_size)?;

        let header_size = Packet::file_header(&file_name, max_part).encoded_len();
        if header_size > packet_size {
            return Err(Error::PacketTooLarge {
                size: header_size,
                budget: packet_size,
            });
        }

        debug!(
            "Chunking {} ({} bytes) into {} parts of at most {} bytes",
            file_name, file_size, max_part, packet_size
        );

        Ok(Self {
            source,
            file_name,
            file_size,
            packet_size,
            max_part,
            header_sent: false,
            next_part: 1,
            bytes_read: 0,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn max_part(&self) -> u32 {
        self.max_part
    }

    /// Next packet of the transfer, or `None` once the last part has been produced
    pub async fn next_packet(&mut self) -> Result<Option<Packet>> {
        if !self.header_sent {
            self.header_sent = true;
            return Ok(Some(Packet::file_header(&self.file_name, self.max_part)));
        }
        if self.next_part > self.max_part {
            return Ok(None);
        }

        let part = self.next_part;
        // Recomputed for every part so the frame stays inside the budget as digits grow
        let capacity = payload_capacity(part, self.max_part, self.packet_size) as u64;
        let remaining = self.file_size - self.bytes_read;
        let len = capacity.min(remaining) as usize;

        let mut chunk = vec![0u8; len];
        self.source.read_exact(&mut chunk).await?;

        self.bytes_read += len as u64;
        self.next_part += 1;

        Ok(Some(Packet::new(PacketKind::File, part, self.max_part, chunk)))
    }

    /// Drain the chunker into a vector of packets
    pub async fn collect(mut self) -> Result<Vec<Packet>> {
        let mut packets = Vec::with_capacity(self.max_part as usize + 1);
        while let Some(packet) = self.next_packet().await? {
            packets.push(packet);
        }
        Ok(packets)
    }
}
