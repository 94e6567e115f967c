//! Session statistics, reported at `close`. Grounded on the original
//! implementation's open/write/read/close counters and byte-stuffing
//! counter, here collected in one record instead of loose globals.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub retransmissions: u64,
    pub stuffed_bytes_sent: u64,
    pub payload_bytes_delivered: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent_frame(&mut self, wire_len: usize) {
        self.frames_sent += 1;
        self.stuffed_bytes_sent += wire_len as u64;
    }

    pub fn record_retransmission(&mut self) {
        self.retransmissions += 1;
    }

    pub fn record_delivered_payload(&mut self, len: usize) {
        self.frames_received += 1;
        self.payload_bytes_delivered += len as u64;
    }
}
