//! Application-layer packetization on top of a `LinkEndpoint`: START/DATA/END
//! packets, TLV-encoded file metadata, and the sender/receiver drivers that
//! stream a file across an open link.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use hdlc_common::ByteChannel;
use log::info;

use crate::endpoint::LinkEndpoint;
use crate::error::AppError;
use crate::stats::Stats;

const PACKET_START: u8 = 1;
const PACKET_DATA: u8 = 2;
const PACKET_END: u8 = 3;

const TLV_FILE_SIZE: u8 = 0;
const TLV_FILE_NAME: u8 = 1;
const MAX_FILE_NAME: usize = 255;

struct ControlPacket {
    file_size: u64,
    #[allow(dead_code)]
    file_name: Vec<u8>,
}

fn build_control_packet(packet_type: u8, file_size: u64, file_name: &[u8]) -> Result<Vec<u8>, AppError> {
    if file_name.len() > MAX_FILE_NAME {
        return Err(AppError::FileNameTooLong { len: file_name.len(), max: MAX_FILE_NAME });
    }
    let mut out = vec![packet_type];
    let size_bytes = (file_size as u32).to_le_bytes();
    out.push(TLV_FILE_SIZE);
    out.push(size_bytes.len() as u8);
    out.extend_from_slice(&size_bytes);
    out.push(TLV_FILE_NAME);
    out.push(file_name.len() as u8);
    out.extend_from_slice(file_name);
    Ok(out)
}

fn parse_control_packet(expected_type: u8, bytes: &[u8]) -> Result<ControlPacket, AppError> {
    if bytes.is_empty() || bytes[0] != expected_type {
        return Err(if expected_type == PACKET_START { AppError::MissingStart } else { AppError::MissingEnd });
    }
    let mut file_size = None;
    let mut file_name = None;
    let mut i = 1;
    while i < bytes.len() {
        if i + 2 > bytes.len() {
            return Err(AppError::MalformedControlPacket);
        }
        let t = bytes[i];
        let l = bytes[i + 1] as usize;
        let start = i + 2;
        let end = start + l;
        if end > bytes.len() {
            return Err(AppError::MalformedControlPacket);
        }
        let value = &bytes[start..end];
        match t {
            TLV_FILE_SIZE => {
                if value.len() != 4 {
                    return Err(AppError::MalformedControlPacket);
                }
                file_size = Some(u32::from_le_bytes([value[0], value[1], value[2], value[3]]) as u64);
            }
            TLV_FILE_NAME => file_name = Some(value.to_vec()),
            _ => {}
        }
        i = end;
    }
    Ok(ControlPacket {
        file_size: file_size.ok_or(AppError::MalformedControlPacket)?,
        file_name: file_name.ok_or(AppError::MalformedControlPacket)?,
    })
}

/// Drives a file transfer over an already-configured `LinkEndpoint`.
pub struct AppSession<C: ByteChannel> {
    endpoint: LinkEndpoint<C>,
}

impl<C: ByteChannel> AppSession<C> {
    pub fn new(endpoint: LinkEndpoint<C>) -> Self {
        AppSession { endpoint }
    }

    fn max_chunk(&self) -> usize {
        self.endpoint.max_payload().saturating_sub(4)
    }

    fn recv_one(&mut self) -> Result<Vec<u8>, AppError> {
        let mut buf = Vec::new();
        loop {
            let n = self.endpoint.receive_packet(&mut buf)?;
            if n > 0 {
                return Ok(buf);
            }
        }
    }

    pub fn send_file(&mut self, path: &Path) -> Result<Stats, AppError> {
        self.endpoint.open()?;

        let file_size = std::fs::metadata(path)?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let start = build_control_packet(PACKET_START, file_size, file_name.as_bytes())?;
        self.endpoint.send_packet(&start)?;

        let mut reader = BufReader::new(File::open(path)?);
        let max_chunk = self.max_chunk();
        let mut chunk = vec![0u8; max_chunk];
        let mut app_seq: u8 = 0;
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            let mut packet = Vec::with_capacity(n + 4);
            packet.push(PACKET_DATA);
            packet.push(app_seq);
            packet.push((n >> 8) as u8);
            packet.push((n & 0xFF) as u8);
            packet.extend_from_slice(&chunk[..n]);
            self.endpoint.send_packet(&packet)?;
            app_seq = (app_seq + 1) % 100;
        }

        let end = build_control_packet(PACKET_END, file_size, file_name.as_bytes())?;
        self.endpoint.send_packet(&end)?;
        let stats = self.endpoint.close(true)?;
        info!("sent {file_size} bytes from {}", path.display());
        Ok(stats)
    }

    pub fn receive_file(&mut self, out_path: &Path) -> Result<Stats, AppError> {
        self.endpoint.open()?;

        let start_buf = self.recv_one()?;
        let start = parse_control_packet(PACKET_START, &start_buf)?;

        let mut writer = BufWriter::new(File::create(out_path)?);
        let mut received: u64 = 0;
        let mut expected_seq: u8 = 0;

        loop {
            let buf = self.recv_one()?;
            match buf.first() {
                Some(&PACKET_END) => {
                    let end = parse_control_packet(PACKET_END, &buf)?;
                    if end.file_size != start.file_size || received != start.file_size {
                        return Err(AppError::SizeMismatch { declared: start.file_size, received });
                    }
                    break;
                }
                Some(&PACKET_DATA) => {
                    if buf.len() < 4 {
                        return Err(AppError::MalformedControlPacket);
                    }
                    let seq = buf[1];
                    if seq != expected_seq {
                        return Err(AppError::SequenceMismatch { expected: expected_seq, got: seq });
                    }
                    let len = ((buf[2] as usize) << 8) | buf[3] as usize;
                    if 4 + len > buf.len() {
                        return Err(AppError::MalformedControlPacket);
                    }
                    let data = &buf[4..4 + len];
                    if received + data.len() as u64 > start.file_size {
                        return Err(AppError::SizeMismatch {
                            declared: start.file_size,
                            received: received + data.len() as u64,
                        });
                    }
                    writer.write_all(data)?;
                    received += data.len() as u64;
                    expected_seq = (expected_seq + 1) % 100;
                }
                Some(&other) => return Err(AppError::UnknownPacketType(other)),
                None => return Err(AppError::MalformedControlPacket),
            }
        }

        writer.flush()?;
        let stats = self.endpoint.close(true)?;
        info!("received {received} bytes into {}", out_path.display());
        Ok(stats)
    }
}
