use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::packet::{DELIMITER, HEADER_FIELDS, Header, MAX_HEADER_LEN, Packet};
use crate::error::{Error, Result};

// Upper bound for the up-front payload allocation; longer payloads grow as bytes arrive.
const PREALLOC_LIMIT: usize = 64 * 1024;

/// Read one packet from a byte stream.
///
/// Header bytes are consumed one at a time until the fourth delimiter, so the
/// reader never consumes anything belonging to the next frame. Wrap raw sockets
/// in a `BufReader` to keep this cheap.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let header = read_header(reader).await?;

    let mut payload = Vec::with_capacity(header.payload_len.min(PREALLOC_LIMIT));
    (&mut *reader)
        .take(header.payload_len as u64)
        .read_to_end(&mut payload)
        .await?;

    if payload.len() < header.payload_len {
        return Err(Error::incomplete(format!(
            "stream ended after {} of {} payload bytes",
            payload.len(),
            header.payload_len
        )));
    }

    Ok(header.into_packet(payload))
}

async fn read_header<R>(reader: &mut R) -> Result<Header>
where
    R: AsyncRead + Unpin,
{
    let mut raw = Vec::with_capacity(MAX_HEADER_LEN);
    let mut seen = 0;
    let mut byte = [0u8; 1];

    while seen < HEADER_FIELDS {
        if raw.len() == MAX_HEADER_LEN {
            return Err(Error::protocol(format!(
                "no complete header within {MAX_HEADER_LEN} bytes"
            )));
        }

        let n = match reader.read(&mut byte).await {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return Err(Error::incomplete(format!(
                "stream ended after {seen} of {HEADER_FIELDS} header delimiters"
            )));
        }

        raw.push(byte[0]);
        if byte[0] == DELIMITER {
            seen += 1;
        }
    }

    Header::parse(&raw)
}

/// Write one encoded packet and flush it
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    // Header and payload go out in a single write to avoid split frames
    writer.write_all(&packet.encode()).await?;
    writer.flush().await?;
    Ok(())
}
