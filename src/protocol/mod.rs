//! Wire framing: `"<kind>|<part>|<maxPart>|<payloadLength>|"` followed by exactly
//! `payloadLength` raw bytes. Header fields are ASCII decimal integers; there is no
//! trailing delimiter and no escaping.

pub mod codec;
pub mod packet;

pub use codec::{read_packet, write_packet};
pub use packet::{
    DELIMITER, MAX_HEADER_LEN, OVERHEAD_SIZE, Packet, PacketKind, digits, header_len,
    max_payload_for,
};
