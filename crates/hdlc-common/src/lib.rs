pub mod channel;

#[cfg(feature = "test-util")]
pub mod loopback;

pub use channel::{ByteChannel, ChannelError, ReadOutcome};
