use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Separator between header fields; the header ends with one as well.
pub const DELIMITER: u8 = b'|';

/// Number of numeric fields in a header (kind, part, max part, payload length)
pub const HEADER_FIELDS: usize = 4;

/// Delimiter bytes every header carries. The numeric fields add their decimal
/// width on top of this.
pub const OVERHEAD_SIZE: usize = HEADER_FIELDS;

/// Widest header the decoder will buffer: u8 kind, u32 part and max part, u64 length.
pub const MAX_HEADER_LEN: usize = OVERHEAD_SIZE + 3 + 10 + 10 + 20;

/// What a packet carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PacketKind {
    #[default]
    Undefined = 0,
    Message = 1,
    File = 2,
}

impl TryFrom<u8> for PacketKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketKind::Undefined),
            1 => Ok(PacketKind::Message),
            2 => Ok(PacketKind::File),
            other => Err(Error::protocol(format!("unknown packet kind {other}"))),
        }
    }
}

impl From<PacketKind> for u8 {
    fn from(kind: PacketKind) -> u8 {
        kind as u8
    }
}

/// The atomic protocol unit.
///
/// `part` is 1-based; part 0 of a file transfer carries the file name.
/// `part == max_part` marks the last packet of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub part: u32,
    pub max_part: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketKind, part: u32, max_part: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            part,
            max_part,
            payload: payload.into(),
        }
    }

    /// Single-packet message (`part == max_part == 1`)
    pub fn message(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(PacketKind::Message, 1, 1, payload)
    }

    /// Part 0 of a file transfer, announcing the name and the part count
    pub fn file_header(file_name: &str, max_part: u32) -> Self {
        Self::new(PacketKind::File, 0, max_part, file_name.as_bytes())
    }

    pub fn is_last(&self) -> bool {
        self.part == self.max_part
    }

    pub fn is_file_header(&self) -> bool {
        self.kind == PacketKind::File && self.part == 0
    }

    /// Byte length of the textual header for this packet
    pub fn header_len(&self) -> usize {
        header_len(self.kind, self.part, self.max_part, self.payload.len())
    }

    /// Total bytes this packet occupies on the wire
    pub fn encoded_len(&self) -> usize {
        self.header_len() + self.payload.len()
    }

    /// Encode into header text followed by the raw payload
    pub fn encode(&self) -> Vec<u8> {
        let header = format!(
            "{}|{}|{}|{}|",
            u8::from(self.kind),
            self.part,
            self.max_part,
            self.payload.len()
        );
        let mut out = Vec::with_capacity(header.len() + self.payload.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a buffer that holds exactly one frame (the datagram case).
    ///
    /// Bytes left over after the payload are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (packet, consumed) = Self::decode_prefix(bytes)?;
        if consumed != bytes.len() {
            return Err(Error::protocol(format!(
                "{} trailing bytes after payload",
                bytes.len() - consumed
            )));
        }
        Ok(packet)
    }

    /// Decode one frame from the front of `bytes`, returning it with the number of bytes consumed.
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Self, usize)> {
        let header_end = find_header_end(bytes)?;
        let header = Header::parse(&bytes[..header_end])?;

        let body = &bytes[header_end..];
        if body.len() < header.payload_len {
            return Err(Error::incomplete(format!(
                "expected {} payload bytes, {} available",
                header.payload_len,
                body.len()
            )));
        }

        let payload = body[..header.payload_len].to_vec();
        Ok((header.into_packet(payload), header_end + header.payload_len))
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {}/{} ({} bytes)",
            self.kind,
            self.part,
            self.max_part,
            self.payload.len()
        )
    }
}

/// Parsed header fields, before the payload has been read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub kind: PacketKind,
    pub part: u32,
    pub max_part: u32,
    pub payload_len: usize,
}

impl Header {
    /// Parse raw header bytes including the four trailing delimiters
    pub(crate) fn parse(raw: &[u8]) -> Result<Self> {
        let text =
            std::str::from_utf8(raw).map_err(|_| Error::protocol("header is not ASCII text"))?;
        let mut fields = text.split(DELIMITER as char);

        let kind: u8 = parse_field(fields.next(), "kind")?;
        let part: u32 = parse_field(fields.next(), "part")?;
        let max_part: u32 = parse_field(fields.next(), "max part")?;
        let payload_len: usize = parse_field(fields.next(), "payload length")?;

        if fields.next() != Some("") || fields.next().is_some() {
            return Err(Error::protocol("header must end after the fourth delimiter"));
        }

        let kind = PacketKind::try_from(kind)?;
        if max_part == 0 {
            return Err(Error::protocol("max part must be at least 1"));
        }
        if part > max_part {
            return Err(Error::protocol(format!(
                "part {part} exceeds max part {max_part}"
            )));
        }

        Ok(Self {
            kind,
            part,
            max_part,
            payload_len,
        })
    }

    pub(crate) fn into_packet(self, payload: Vec<u8>) -> Packet {
        Packet {
            kind: self.kind,
            part: self.part,
            max_part: self.max_part,
            payload,
        }
    }
}

fn parse_field<T: FromStr>(field: Option<&str>, name: &str) -> Result<T> {
    let field = field.ok_or_else(|| Error::protocol(format!("missing {name} field")))?;
    // Plain decimal digits only; `parse` alone would accept a leading '+'
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::protocol(format!(
            "{name} field {field:?} is not an integer"
        )));
    }
    field
        .parse()
        .map_err(|_| Error::protocol(format!("{name} field {field:?} is not an integer")))
}

/// Index one past the fourth delimiter
fn find_header_end(bytes: &[u8]) -> Result<usize> {
    let mut seen = 0;
    for (i, &byte) in bytes.iter().take(MAX_HEADER_LEN).enumerate() {
        if byte == DELIMITER {
            seen += 1;
            if seen == HEADER_FIELDS {
                return Ok(i + 1);
            }
        }
    }

    if bytes.len() >= MAX_HEADER_LEN {
        Err(Error::protocol(format!(
            "no complete header within {MAX_HEADER_LEN} bytes"
        )))
    } else {
        Err(Error::incomplete(format!(
            "found {seen} of {HEADER_FIELDS} header delimiters"
        )))
    }
}

/// Decimal digit count of `n` (`digits(0) == 1`)
pub fn digits(n: u64) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

/// Exact header length for the given field values
pub fn header_len(kind: PacketKind, part: u32, max_part: u32, payload_len: usize) -> usize {
    OVERHEAD_SIZE
        + digits(u8::from(kind) as u64)
        + digits(part as u64)
        + digits(max_part as u64)
        + digits(payload_len as u64)
}

/// Largest payload length `len` with `len + digits(len) <= budget`.
///
/// `budget` is what remains of a packet after everything in the header
/// except the payload length field.
pub fn max_payload_for(budget: usize) -> usize {
    let mut len = budget.saturating_sub(digits(budget as u64));
    while len + 1 + digits(len as u64 + 1) <= budget {
        len += 1;
    }
    len
}
