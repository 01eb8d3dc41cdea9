use thiserror::Error;

/// Errors produced by the codec, the transfer machinery and the listeners
#[derive(Error, Debug)]
pub enum Error {
    /// A frame header could not be interpreted
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The byte source ended before a whole frame was available
    #[error("incomplete frame: {0}")]
    IncompleteFrame(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("no destination configured")]
    NoDestination,

    /// Reassembly found a hole in the part sequence
    #[error("missing part {part} of {max_part} for {file_name}")]
    MissingPart {
        file_name: String,
        part: u32,
        max_part: u32,
    },

    #[error("frame of {size} bytes exceeds the {budget} byte budget")]
    PacketTooLarge { size: usize, budget: usize },

    #[error("listener is already running")]
    AlreadyRunning,

    #[error("file transfer is not supported over the datagram transport")]
    UnsupportedTransport,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub(crate) fn incomplete(msg: impl Into<String>) -> Self {
        Error::IncompleteFrame(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
