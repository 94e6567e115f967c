use std::time::Duration;
use thiserror::Error;

/// Result of a single `ByteChannel::read_byte` call.
///
/// Mirrors the poll-based shape of `dxkb-common`'s `BusRead`, but blocking
/// with a caller-supplied timeout instead of returning `WouldBlock`: the
/// link layer always wants to wait up to a deadline for the next octet,
/// never to busy-poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Byte(u8),
    Timeout,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("channel is closed")]
    Closed,
}

/// A bidirectional byte pipe with a per-read inter-byte timeout.
///
/// Implementations are assumed full-duplex, single-reader/single-writer.
/// `read_byte` must return within `timeout` even if no byte arrives.
pub trait ByteChannel {
    fn read_byte(&mut self, timeout: Duration) -> Result<ReadOutcome, ChannelError>;
    fn write_all(&mut self, buf: &[u8]) -> Result<(), ChannelError>;
    fn close(&mut self) -> Result<(), ChannelError>;
}
