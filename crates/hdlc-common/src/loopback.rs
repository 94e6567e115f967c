//! In-memory `ByteChannel` pair with scriptable fault injection, used by
//! `hdlc-link`'s integration tests to drive whole sessions without a real
//! serial device.
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::time::{Duration, Instant};

use crate::channel::{ByteChannel, ChannelError, ReadOutcome};

/// A fault a `LoopbackChannel` applies to bytes as they are written.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Drop the byte at this zero-based index in the overall write stream.
    DropByte(usize),
    /// Flip all bits of the byte at this index (simulates line corruption).
    CorruptByte(usize),
}

struct FaultScript {
    faults: Vec<Fault>,
    written: usize,
}

impl FaultScript {
    fn apply(&mut self, buf: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(buf.len());
        for &b in buf {
            let idx = self.written;
            self.written += 1;
            let drop = self.faults.iter().any(|f| matches!(f, Fault::DropByte(i) if *i == idx));
            if drop {
                continue;
            }
            let corrupt = self.faults.iter().any(|f| matches!(f, Fault::CorruptByte(i) if *i == idx));
            out.push(if corrupt { !b } else { b });
        }
        out
    }
}

/// One end of an in-memory loopback pair.
pub struct LoopbackChannel {
    tx: Sender<u8>,
    rx: Receiver<u8>,
    faults: FaultScript,
    closed: bool,
}

/// Creates a connected pair of `LoopbackChannel`s: bytes written on one are
/// read from the other.
pub fn pair() -> (LoopbackChannel, LoopbackChannel) {
    let (a_tx, a_rx) = channel();
    let (b_tx, b_rx) = channel();
    (
        LoopbackChannel {
            tx: a_tx,
            rx: b_rx,
            faults: FaultScript { faults: Vec::new(), written: 0 },
            closed: false,
        },
        LoopbackChannel {
            tx: b_tx,
            rx: a_rx,
            faults: FaultScript { faults: Vec::new(), written: 0 },
            closed: false,
        },
    )
}

impl LoopbackChannel {
    /// Installs a fault script applied to bytes written FROM this end.
    pub fn set_faults(&mut self, faults: Vec<Fault>) {
        self.faults = FaultScript { faults, written: 0 };
    }
}

impl ByteChannel for LoopbackChannel {
    fn read_byte(&mut self, timeout: Duration) -> Result<ReadOutcome, ChannelError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.rx.try_recv() {
                Ok(b) => return Ok(ReadOutcome::Byte(b)),
                Err(TryRecvError::Empty) => {
                    if Instant::now() >= deadline {
                        return Ok(ReadOutcome::Timeout);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(TryRecvError::Disconnected) => return Err(ChannelError::Closed),
            }
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        for b in self.faults.apply(buf) {
            self.tx.send(b).map_err(|_| ChannelError::Closed)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.closed = true;
        Ok(())
    }
}
