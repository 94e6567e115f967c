//! Wire-level frame grammar: byte stuffing, header/payload checksums and the
//! byte-driven decode state machine. Pure, context-free functions: this
//! module does not know which address or control values are admissible at
//! any given point in a session — that judgment belongs to `LinkEndpoint`.

use thiserror::Error;

pub const FLAG: u8 = 0x7E;
pub const ESC: u8 = 0x7D;
pub const XOR_MASK: u8 = 0x20;

pub const A_TRANSMITTER: u8 = 0x03;
pub const A_RECEIVER: u8 = 0x01;

const SET: u8 = 0x03;
const UA: u8 = 0x07;
const RR0: u8 = 0xAA;
const RR1: u8 = 0xAB;
const REJ0: u8 = 0x54;
const REJ1: u8 = 0x55;
const DISC: u8 = 0x0B;
const I0: u8 = 0x00;
const I1: u8 = 0x80;

/// Decoded meaning of a frame's control octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Set,
    Ua,
    Rr(u8),
    Rej(u8),
    Disc,
    Info(u8),
}

impl Control {
    fn from_byte(b: u8) -> Option<Control> {
        match b {
            SET => Some(Control::Set),
            UA => Some(Control::Ua),
            RR0 => Some(Control::Rr(0)),
            RR1 => Some(Control::Rr(1)),
            REJ0 => Some(Control::Rej(0)),
            REJ1 => Some(Control::Rej(1)),
            DISC => Some(Control::Disc),
            I0 => Some(Control::Info(0)),
            I1 => Some(Control::Info(1)),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Control::Set => SET,
            Control::Ua => UA,
            Control::Rr(0) => RR0,
            Control::Rr(_) => RR1,
            Control::Rej(0) => REJ0,
            Control::Rej(_) => REJ1,
            Control::Disc => DISC,
            Control::Info(0) => I0,
            Control::Info(_) => I1,
        }
    }

    /// True for control values that never carry a payload.
    fn is_supervisory(self) -> bool {
        !matches!(self, Control::Info(_))
    }
}

/// A fully decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u8,
    pub control: Control,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("header check failed")]
    HeaderCorrupt,
    #[error("payload checksum mismatch")]
    Bcc2Mismatch,
    #[error("frame exceeds maximum payload size")]
    Oversize,
    #[error("escape byte immediately followed by FLAG")]
    EscapeViolation,
    #[error("unrecognized control octet 0x{0:02X}")]
    UnknownControl(u8),
}

fn stuff_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        if b == FLAG || b == ESC {
            out.push(ESC);
            out.push(b ^ XOR_MASK);
        } else {
            out.push(b);
        }
    }
}

/// Encodes a logical frame into its on-wire byte-stuffed representation.
pub fn encode(address: u8, control: Control, payload: Option<&[u8]>) -> Vec<u8> {
    let control_byte = control.to_byte();
    let bcc1 = address ^ control_byte;
    let mut out = Vec::with_capacity(payload.map_or(5, |p| p.len() * 2 + 8));
    out.push(FLAG);
    out.push(address);
    out.push(control_byte);
    out.push(bcc1);
    if let Some(p) = payload {
        let bcc2 = p.iter().fold(0u8, |acc, &b| acc ^ b);
        stuff_into(p, &mut out);
        stuff_into(&[bcc2], &mut out);
    }
    out.push(FLAG);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    FlagRcv,
    ARcv(u8),
    WaitBcc1(u8, u8),
    WaitClosingFlag(u8, Control),
}

/// Byte-driven decoder. Feed it one byte at a time via `push_byte`; it
/// yields a decoded frame or error exactly when a frame boundary (FLAG)
/// completes, and silently resynchronizes on anything else.
pub struct FrameDecoder {
    state: State,
    buf: Vec<u8>,
    escape: bool,
    max_payload: usize,
}

impl FrameDecoder {
    pub fn new(max_payload: usize) -> Self {
        FrameDecoder {
            state: State::Start,
            buf: Vec::new(),
            escape: false,
            max_payload,
        }
    }

    /// Feeds one byte to the state machine. Returns `Some` exactly when a
    /// frame attempt has just concluded, successfully or not.
    pub fn push_byte(&mut self, b: u8) -> Option<Result<Frame, DecodeError>> {
        match self.state {
            State::Start => {
                if b == FLAG {
                    self.state = State::FlagRcv;
                }
                None
            }
            State::FlagRcv => {
                if b == FLAG {
                    None
                } else {
                    self.state = State::ARcv(b);
                    None
                }
            }
            State::ARcv(address) => {
                if b == FLAG {
                    self.state = State::FlagRcv;
                    None
                } else {
                    self.state = State::WaitBcc1(address, b);
                    None
                }
            }
            State::WaitBcc1(address, control_byte) => {
                if b == FLAG {
                    self.state = State::FlagRcv;
                    return None;
                }
                if b != (address ^ control_byte) {
                    self.state = State::Start;
                    return Some(Err(DecodeError::HeaderCorrupt));
                }
                let Some(control) = Control::from_byte(control_byte) else {
                    self.state = State::Start;
                    return Some(Err(DecodeError::UnknownControl(control_byte)));
                };
                if control.is_supervisory() {
                    self.state = State::WaitClosingFlag(address, control);
                    None
                } else {
                    self.buf.clear();
                    self.escape = false;
                    self.state = State::WaitClosingFlag(address, control);
                    None
                }
            }
            State::WaitClosingFlag(address, control) => {
                if control.is_supervisory() {
                    if b == FLAG {
                        self.state = State::FlagRcv;
                        Some(Ok(Frame { address, control, payload: None }))
                    } else {
                        self.state = State::Start;
                        Some(Err(DecodeError::HeaderCorrupt))
                    }
                } else {
                    self.push_data_byte(address, control, b)
                }
            }
        }
    }

    fn push_data_byte(
        &mut self,
        address: u8,
        control: Control,
        b: u8,
    ) -> Option<Result<Frame, DecodeError>> {
        if self.escape {
            self.escape = false;
            if b == FLAG {
                self.state = State::Start;
                return Some(Err(DecodeError::EscapeViolation));
            }
            self.buf.push(b ^ XOR_MASK);
        } else if b == ESC {
            self.escape = true;
        } else if b == FLAG {
            self.state = State::FlagRcv;
            return Some(self.finish_data_frame(address, control));
        } else {
            self.buf.push(b);
        }

        if self.buf.len() > self.max_payload + 1 {
            self.state = State::Start;
            return Some(Err(DecodeError::Oversize));
        }
        None
    }

    fn finish_data_frame(&mut self, address: u8, control: Control) -> Result<Frame, DecodeError> {
        if self.buf.is_empty() {
            return Err(DecodeError::Bcc2Mismatch);
        }
        let bcc2 = self.buf[self.buf.len() - 1];
        let payload = &self.buf[..self.buf.len() - 1];
        let expected = payload.iter().fold(0u8, |acc, &b| acc ^ b);
        if bcc2 != expected {
            return Err(DecodeError::Bcc2Mismatch);
        }
        Ok(Frame { address, control, payload: Some(payload.to_vec()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8], max_payload: usize) -> Vec<Result<Frame, DecodeError>> {
        let mut dec = FrameDecoder::new(max_payload);
        bytes.iter().filter_map(|&b| dec.push_byte(b)).collect()
    }

    #[test]
    fn round_trips_supervisory_frame() {
        let wire = encode(A_TRANSMITTER, Control::Set, None);
        let results = decode_all(&wire, 1000);
        assert_eq!(results, vec![Ok(Frame { address: A_TRANSMITTER, control: Control::Set, payload: None })]);
    }

    #[test]
    fn round_trips_payload_with_flag_and_escape_bytes() {
        let payload = vec![FLAG, ESC, FLAG ^ XOR_MASK];
        let wire = encode(A_TRANSMITTER, Control::Info(0), Some(&payload));
        let results = decode_all(&wire, 1000);
        assert_eq!(
            results,
            vec![Ok(Frame { address: A_TRANSMITTER, control: Control::Info(0), payload: Some(payload) })]
        );
    }

    #[test]
    fn detects_bcc2_corruption() {
        let payload = vec![1, 2, 3];
        let mut wire = encode(A_TRANSMITTER, Control::Info(1), Some(&payload));
        let last_data_idx = wire.len() - 2;
        wire[last_data_idx] ^= 0xFF;
        let results = decode_all(&wire, 1000);
        assert_eq!(results, vec![Err(DecodeError::Bcc2Mismatch)]);
    }

    #[test]
    fn resyncs_after_leading_garbage() {
        let payload = vec![9, 9, 9];
        let wire = encode(A_TRANSMITTER, Control::Info(0), Some(&payload));
        let mut noisy = vec![0x11, 0x22, 0x33, FLAG, 0x44];
        noisy.extend_from_slice(&wire);
        let results = decode_all(&noisy, 1000);
        assert_eq!(
            results,
            vec![Ok(Frame { address: A_TRANSMITTER, control: Control::Info(0), payload: Some(payload) })]
        );
    }

    #[test]
    fn rejects_oversize_payload() {
        let payload = vec![0xAB; 20];
        let wire = encode(A_TRANSMITTER, Control::Info(0), Some(&payload));
        let results = decode_all(&wire, 4);
        assert_eq!(results, vec![Err(DecodeError::Oversize)]);
    }
}
