use hdlc_common::ChannelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("underlying channel failed: {0}")]
    Channel(#[from] ChannelError),

    #[error("gave up after {retries} retransmissions")]
    MaxRetriesExceeded { retries: u32 },

    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("expected a START packet to begin the session")]
    MissingStart,

    #[error("expected an END packet to close the session")]
    MissingEnd,

    #[error("application sequence number mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u8, got: u8 },

    #[error("declared file size {declared} does not match {received} bytes received")]
    SizeMismatch { declared: u64, received: u64 },

    #[error("malformed TLV in control packet")]
    MalformedControlPacket,

    #[error("file name of {len} bytes exceeds the maximum TLV length of {max}")]
    FileNameTooLong { len: usize, max: usize },

    #[error("unrecognized application packet type {0}")]
    UnknownPacketType(u8),
}
