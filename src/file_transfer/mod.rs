pub mod assembler;
pub mod chunker;

// Re-exports for easier access from crate::file_transfer::{...}
pub use assembler::{FileAssembler, TransferState, part_path};
pub use chunker::{FileChunker, MIN_PACKET_SIZE, payload_capacity, plan_max_part};
