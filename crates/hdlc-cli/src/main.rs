//! Thin harness binary: wires a real serial port into `hdlc-link`'s
//! `ByteChannel` trait and drives one file transfer. Grounded on
//! `dxkb-split-link-tester`'s `clap::Parser` args and `serial2::SerialPort`
//! setup; the link protocol itself lives entirely in `hdlc-link`.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use hdlc_common::{ByteChannel, ChannelError, ReadOutcome};
use hdlc_link::{AppSession, LinkConfig, LinkEndpoint, Role};
use log::error;
use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};

const DEFAULT_MAX_PAYLOAD: usize = 1000;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Tx,
    Rx,
}

/// Reliable file transfer over a serial link.
#[derive(Debug, Parser)]
struct Args {
    /// Serial device path, e.g. /dev/ttyUSB0.
    serial_port: String,
    /// "tx" to send `file`, "rx" to receive into `file`.
    mode: Mode,
    baud_rate: u32,
    max_retries: u32,
    /// Per-byte read timeout, in seconds.
    timeout_secs: u64,
    file: PathBuf,
}

/// `ByteChannel` backed by a raw, non-canonical serial port.
struct SerialChannel {
    port: SerialPort,
}

impl SerialChannel {
    fn open(path: &str, baud_rate: u32) -> std::io::Result<SerialChannel> {
        let port = SerialPort::open(path, |mut settings: Settings| {
            settings.set_raw();
            settings.set_baud_rate(baud_rate)?;
            settings.set_char_size(CharSize::Bits8);
            settings.set_parity(Parity::None);
            settings.set_stop_bits(StopBits::One);
            settings.set_flow_control(FlowControl::None);
            Ok(settings)
        })?;
        Ok(SerialChannel { port })
    }
}

impl ByteChannel for SerialChannel {
    fn read_byte(&mut self, timeout: Duration) -> Result<ReadOutcome, ChannelError> {
        self.port.set_read_timeout(timeout)?;
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(ReadOutcome::Timeout),
            Ok(_) => Ok(ReadOutcome::Byte(buf[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(ReadOutcome::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), ChannelError> {
        self.port.write_all(buf)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let channel = SerialChannel::open(&args.serial_port, args.baud_rate)?;
    let (role, mode_name) = match args.mode {
        Mode::Tx => (Role::Transmitter, "tx"),
        Mode::Rx => (Role::Receiver, "rx"),
    };
    let config = LinkConfig::new(
        role,
        Duration::from_secs(args.timeout_secs),
        args.max_retries,
        DEFAULT_MAX_PAYLOAD,
    );
    let endpoint = LinkEndpoint::new(channel, config);
    let mut session = AppSession::new(endpoint);

    log::info!("starting {mode_name} session on {} at {} baud", args.serial_port, args.baud_rate);
    match args.mode {
        Mode::Tx => {
            session.send_file(&args.file)?;
        }
        Mode::Rx => {
            session.receive_file(&args.file)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::builder().parse_default_env().init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
