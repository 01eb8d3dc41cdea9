pub mod error;
pub mod file_transfer;
pub mod infrastructure;
pub mod network;
pub mod protocol;
pub mod utils;

// Re-export key types for easier access in integration tests
pub use error::{Error, Result};
pub use file_transfer::{FileAssembler, FileChunker};
pub use infrastructure::events::{EventPublisher, TransferEvent};
pub use network::{Listener, ListenerConfig, ListenerState, Sender, Transport};
pub use protocol::{Packet, PacketKind};
