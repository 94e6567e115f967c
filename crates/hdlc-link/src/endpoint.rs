//! Stop-and-wait link endpoint: connection setup, data exchange with
//! alternating-bit acknowledgement, and teardown. A single `next_event`
//! step function backs `open`, `send_packet`, `receive_packet` and `close`,
//! so the endpoint owns its `ByteChannel` exclusively and there is no
//! separate send/receive loop to keep in sync.

use std::time::Duration;

use hdlc_common::{ByteChannel, ReadOutcome};
use log::{debug, info, warn};

use crate::error::LinkError;
use crate::frame::{self, A_RECEIVER, A_TRANSMITTER, Control, DecodeError, Frame, FrameDecoder};
use crate::stats::Stats;
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Transmitter,
    Receiver,
}

#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    pub role: Role,
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_payload: usize,
}

impl LinkConfig {
    pub fn new(role: Role, timeout: Duration, max_retries: u32, max_payload: usize) -> Self {
        LinkConfig { role, timeout, max_retries, max_payload }
    }
}

enum Event {
    Frame(Frame),
    DecodeError(DecodeError),
    Timeout,
}

/// How long a single `read_byte` call is allowed to block while the
/// endpoint is waiting indefinitely (no retransmission timer armed), e.g.
/// a receiver waiting for the initial `SET`.
const IDLE_POLL_CHUNK: Duration = Duration::from_millis(200);

pub struct LinkEndpoint<C: ByteChannel> {
    channel: C,
    config: LinkConfig,
    decoder: FrameDecoder,
    timer: Timer,
    send_seq: u8,
    expected_seq: u8,
    stats: Stats,
}

impl<C: ByteChannel> LinkEndpoint<C> {
    pub fn new(channel: C, config: LinkConfig) -> Self {
        LinkEndpoint {
            channel,
            decoder: FrameDecoder::new(config.max_payload),
            config,
            timer: Timer::new(),
            send_seq: 0,
            expected_seq: 0,
            stats: Stats::new(),
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn max_payload(&self) -> usize {
        self.config.max_payload
    }

    fn send_frame(&mut self, address: u8, control: Control, payload: Option<&[u8]>) -> Result<usize, LinkError> {
        let wire = frame::encode(address, control, payload);
        self.stats.record_sent_frame(wire.len());
        self.channel.write_all(&wire)?;
        Ok(wire.len())
    }

    fn next_event(&mut self) -> Result<Event, LinkError> {
        loop {
            if self.timer.expired() {
                return Ok(Event::Timeout);
            }
            let chunk = self.timer.remaining().map(|r| r.min(IDLE_POLL_CHUNK)).unwrap_or(IDLE_POLL_CHUNK);
            match self.channel.read_byte(chunk)? {
                ReadOutcome::Timeout => continue,
                ReadOutcome::Byte(b) => {
                    if let Some(result) = self.decoder.push_byte(b) {
                        return Ok(match result {
                            Ok(frame) => Event::Frame(frame),
                            Err(e) => Event::DecodeError(e),
                        });
                    }
                }
            }
        }
    }

    pub fn open(&mut self) -> Result<(), LinkError> {
        match self.config.role {
            Role::Transmitter => self.open_as_transmitter(),
            Role::Receiver => self.open_as_receiver(),
        }
    }

    fn open_as_transmitter(&mut self) -> Result<(), LinkError> {
        let mut retry_count = 0u32;
        self.send_frame(A_TRANSMITTER, Control::Set, None)?;
        self.timer.arm(self.config.timeout);
        loop {
            match self.next_event()? {
                Event::Frame(Frame { address: A_TRANSMITTER, control: Control::Ua, .. }) => {
                    self.timer.cancel();
                    self.send_seq = 0;
                    debug!("link open (transmitter)");
                    return Ok(());
                }
                Event::Timeout => {
                    retry_count += 1;
                    if retry_count >= self.config.max_retries {
                        let _ = self.channel.close();
                        return Err(LinkError::MaxRetriesExceeded { retries: retry_count });
                    }
                    warn!("SET timed out, retrying ({retry_count}/{})", self.config.max_retries);
                    self.stats.record_retransmission();
                    self.send_frame(A_TRANSMITTER, Control::Set, None)?;
                    self.timer.arm(self.config.timeout);
                }
                _ => {}
            }
        }
    }

    fn open_as_receiver(&mut self) -> Result<(), LinkError> {
        self.timer.cancel();
        loop {
            if let Event::Frame(Frame { address: A_TRANSMITTER, control: Control::Set, .. }) = self.next_event()? {
                self.send_frame(A_TRANSMITTER, Control::Ua, None)?;
                self.expected_seq = 0;
                debug!("link open (receiver)");
                return Ok(());
            }
        }
    }

    pub fn send_packet(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        if payload.len() > self.config.max_payload {
            return Err(LinkError::ProtocolViolation("payload exceeds configured maximum"));
        }
        let control = Control::Info(self.send_seq);
        let expected_ack = 1 - self.send_seq;
        let mut wire_len = self.send_frame(A_TRANSMITTER, control, Some(payload))?;
        self.timer.arm(self.config.timeout);
        let mut retry_count = 0u32;
        loop {
            match self.next_event()? {
                Event::Frame(Frame { address: A_TRANSMITTER, control: Control::Rr(s), .. }) if s == expected_ack => {
                    self.timer.cancel();
                    self.send_seq = expected_ack;
                    return Ok(wire_len);
                }
                Event::Frame(Frame { control: Control::Rej(s), .. }) if s == self.send_seq => {
                    debug!("peer rejected sequence {s}, resending");
                    wire_len = self.send_frame(A_TRANSMITTER, control, Some(payload))?;
                    self.stats.record_retransmission();
                    self.timer.arm(self.config.timeout);
                }
                Event::Timeout => {
                    retry_count += 1;
                    if retry_count >= self.config.max_retries {
                        let _ = self.channel.close();
                        return Err(LinkError::MaxRetriesExceeded { retries: retry_count });
                    }
                    warn!("I-frame timed out, retrying ({retry_count}/{})", self.config.max_retries);
                    wire_len = self.send_frame(A_TRANSMITTER, control, Some(payload))?;
                    self.stats.record_retransmission();
                    self.timer.arm(self.config.timeout);
                }
                _ => {}
            }
        }
    }

    pub fn receive_packet(&mut self, out: &mut Vec<u8>) -> Result<usize, LinkError> {
        self.timer.cancel();
        loop {
            match self.next_event()? {
                Event::Frame(Frame { address: A_TRANSMITTER, control: Control::Info(seq), payload: Some(payload) }) => {
                    if seq == self.expected_seq {
                        out.clear();
                        out.extend_from_slice(&payload);
                        self.stats.record_delivered_payload(payload.len());
                        let ack = Control::Rr(1 - self.expected_seq);
                        self.expected_seq = 1 - self.expected_seq;
                        self.send_frame(A_TRANSMITTER, ack, None)?;
                        return Ok(out.len());
                    }
                    debug!("duplicate frame with sequence {seq}, re-acknowledging");
                    let ack = Control::Rr(1 - self.expected_seq);
                    self.send_frame(A_TRANSMITTER, ack, None)?;
                    return Ok(0);
                }
                Event::DecodeError(err) => {
                    warn!("frame decode error, rejecting: {err}");
                    let rej = Control::Rej(self.expected_seq);
                    self.send_frame(A_TRANSMITTER, rej, None)?;
                    return Ok(0);
                }
                Event::Timeout => return Ok(0),
                _ => {}
            }
        }
    }

    pub fn close(&mut self, show_stats: bool) -> Result<Stats, LinkError> {
        let result = match self.config.role {
            Role::Transmitter => self.close_as_transmitter(),
            Role::Receiver => self.close_as_receiver(),
        };
        let _ = self.channel.close();
        if show_stats {
            info!(
                "session closed: {} frames sent, {} received, {} retransmissions, {} bytes delivered",
                self.stats.frames_sent,
                self.stats.frames_received,
                self.stats.retransmissions,
                self.stats.payload_bytes_delivered
            );
        }
        result.map(|_| self.stats)
    }

    fn close_as_transmitter(&mut self) -> Result<(), LinkError> {
        let mut retry_count = 0u32;
        self.send_frame(A_TRANSMITTER, Control::Disc, None)?;
        self.timer.arm(self.config.timeout);
        loop {
            match self.next_event()? {
                Event::Frame(Frame { address: A_RECEIVER, control: Control::Disc, .. }) => {
                    self.timer.cancel();
                    self.send_frame(A_RECEIVER, Control::Ua, None)?;
                    return Ok(());
                }
                Event::Timeout => {
                    retry_count += 1;
                    if retry_count >= self.config.max_retries {
                        return Err(LinkError::MaxRetriesExceeded { retries: retry_count });
                    }
                    self.send_frame(A_TRANSMITTER, Control::Disc, None)?;
                    self.stats.record_retransmission();
                    self.timer.arm(self.config.timeout);
                }
                _ => {}
            }
        }
    }

    fn close_as_receiver(&mut self) -> Result<(), LinkError> {
        self.timer.cancel();
        loop {
            if let Event::Frame(Frame { address: A_TRANSMITTER, control: Control::Disc, .. }) = self.next_event()? {
                break;
            }
        }
        let mut retry_count = 0u32;
        self.send_frame(A_RECEIVER, Control::Disc, None)?;
        self.timer.arm(self.config.timeout);
        loop {
            match self.next_event()? {
                Event::Frame(Frame { address: A_RECEIVER, control: Control::Ua, .. }) => {
                    self.timer.cancel();
                    return Ok(());
                }
                Event::Timeout => {
                    retry_count += 1;
                    if retry_count >= self.config.max_retries {
                        return Err(LinkError::MaxRetriesExceeded { retries: retry_count });
                    }
                    self.send_frame(A_RECEIVER, Control::Disc, None)?;
                    self.stats.record_retransmission();
                    self.timer.arm(self.config.timeout);
                }
                _ => {}
            }
        }
    }
}
