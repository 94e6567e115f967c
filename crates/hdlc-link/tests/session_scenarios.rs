//! Whole-session integration tests over an in-memory `LoopbackChannel`,
//! exercising the scenarios the link layer must tolerate: clean transfers,
//! byte-stuffed payloads, single-byte loss, corrupted payloads and clean
//! teardown.

use std::thread;
use std::time::Duration;

use hdlc_common::loopback::{self, Fault};
use hdlc_link::frame::{self, Control, A_TRANSMITTER};
use hdlc_link::{AppSession, LinkConfig, LinkEndpoint, Role};

const MAX_PAYLOAD: usize = 1000;

fn config(role: Role) -> LinkConfig {
    LinkConfig::new(role, Duration::from_millis(300), 3, MAX_PAYLOAD)
}

fn tempdir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("hdlc-link-test-{:?}", std::thread::current().id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn run_transfer(file_contents: Vec<u8>) -> Vec<u8> {
    let (tx_chan, rx_chan) = loopback::pair();

    let dir = tempdir();
    let src_path = dir.join("src.bin");
    let dst_path = dir.join("dst.bin");
    std::fs::write(&src_path, &file_contents).unwrap();

    let tx_handle = thread::spawn(move || {
        let endpoint = LinkEndpoint::new(tx_chan, config(Role::Transmitter));
        let mut session = AppSession::new(endpoint);
        session.send_file(&src_path).expect("sender session failed")
    });

    let endpoint = LinkEndpoint::new(rx_chan, config(Role::Receiver));
    let mut session = AppSession::new(endpoint);
    session.receive_file(&dst_path).expect("receiver session failed");
    tx_handle.join().expect("sender thread panicked");

    std::fs::read(&dst_path).unwrap()
}

#[test]
fn s1_small_file_round_trips_cleanly() {
    let contents = b"HELLO\n".to_vec();
    let received = run_transfer(contents.clone());
    assert_eq!(received, contents);
}

#[test]
fn s2_chunking_boundary_995_bytes() {
    let contents: Vec<u8> = (0..995u32).map(|i| i as u8).collect();
    let received = run_transfer(contents.clone());
    assert_eq!(received, contents);
    assert_eq!(received.len(), 995);
}

#[test]
fn s5_byte_stuffed_payload_round_trips() {
    let contents = vec![0x7E, 0x7D, 0x7E];
    let received = run_transfer(contents.clone());
    assert_eq!(received, contents);
}

#[test]
fn larger_file_spanning_multiple_chunks() {
    let contents: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let received = run_transfer(contents.clone());
    assert_eq!(received, contents);
}

#[test]
fn empty_file_round_trips() {
    let contents = Vec::new();
    let received = run_transfer(contents.clone());
    assert_eq!(received, contents);
}

/// S3: a single dropped wire byte during the data phase costs exactly one
/// timeout-driven retransmit, and the receiver still delivers exactly one
/// copy of the frame -- `MaxRetriesExceeded` must not be raised.
#[test]
fn s3_single_byte_loss_recovered_by_retransmission() {
    let (mut tx_chan, rx_chan) = loopback::pair();

    // The SET frame (sent by `open`) occupies the first 5 wire bytes;
    // drop the second byte of the I-frame that immediately follows it.
    let payload = b"retry me please".to_vec();
    let set_len = frame::encode(A_TRANSMITTER, Control::Set, None).len();
    let drop_at = set_len + 1;

    tx_chan.set_faults(vec![Fault::DropByte(drop_at)]);

    let tx_handle = thread::spawn(move || {
        let mut endpoint = LinkEndpoint::new(tx_chan, config(Role::Transmitter));
        endpoint.open().expect("transmitter open failed");
        let sent = endpoint.send_packet(&payload).expect("send_packet must recover from one dropped byte");
        let stats = endpoint.close(false).expect("close failed");
        (sent, stats)
    });

    let mut endpoint = LinkEndpoint::new(rx_chan, config(Role::Receiver));
    endpoint.open().expect("receiver open failed");
    let mut buf = Vec::new();
    let mut delivered = 0;
    loop {
        let n = endpoint.receive_packet(&mut buf).expect("receive_packet failed");
        if n > 0 {
            delivered += 1;
            break;
        }
    }
    endpoint.close(false).expect("close failed");

    let (_, stats) = tx_handle.join().expect("sender thread panicked");
    assert_eq!(delivered, 1, "payload must be delivered exactly once");
    assert!(stats.retransmissions >= 1, "a dropped byte must cost at least one retransmission");
}

/// S4: corrupting the last payload byte of an I-frame (flipping it into a
/// wrong BCC2) must be recovered via REJ, not via the retransmission timer.
#[test]
fn s4_corrupted_bcc2_triggers_reject_not_timeout() {
    let (mut tx_chan, rx_chan) = loopback::pair();

    let payload = b"a data frame with a payload".to_vec();
    let set_len = frame::encode(A_TRANSMITTER, Control::Set, None).len();
    let i_frame = frame::encode(A_TRANSMITTER, Control::Info(0), Some(&payload));
    // Corrupt the last byte before the closing FLAG: the (possibly
    // stuffed) BCC2 byte of the I-frame that follows connection setup.
    let corrupt_at = set_len + (i_frame.len() - 2);

    tx_chan.set_faults(vec![Fault::CorruptByte(corrupt_at)]);

    let tx_handle = thread::spawn(move || {
        let mut endpoint = LinkEndpoint::new(tx_chan, config(Role::Transmitter));
        endpoint.open().expect("transmitter open failed");
        endpoint.send_packet(&payload).expect("send_packet must recover via REJ");
        endpoint.close(false).expect("close failed")
    });

    let mut endpoint = LinkEndpoint::new(rx_chan, config(Role::Receiver));
    endpoint.open().expect("receiver open failed");
    let mut buf = Vec::new();
    loop {
        let n = endpoint.receive_packet(&mut buf).expect("receive_packet failed");
        if n > 0 {
            break;
        }
    }
    assert_eq!(buf, payload);
    endpoint.close(false).expect("close failed");
    tx_handle.join().expect("sender thread panicked");
}

/// S6: a clean teardown exchanges DISC(A_T), DISC(A_R), UA(A_R) and both
/// sides observe success.
#[test]
fn s6_clean_teardown_succeeds_both_sides() {
    let (tx_chan, rx_chan) = loopback::pair();

    let tx_handle = thread::spawn(move || {
        let mut endpoint = LinkEndpoint::new(tx_chan, config(Role::Transmitter));
        endpoint.open().expect("transmitter open failed");
        endpoint.close(true).expect("transmitter close failed")
    });

    let mut endpoint = LinkEndpoint::new(rx_chan, config(Role::Receiver));
    endpoint.open().expect("receiver open failed");
    let rx_stats = endpoint.close(true).expect("receiver close failed");

    let tx_stats = tx_handle.join().expect("sender thread panicked");
    // Transmitter emits SET (open) then DISC and the final UA (close).
    assert_eq!(tx_stats.frames_sent, 3);
    // Receiver emits UA (open) then DISC (close).
    assert_eq!(rx_stats.frames_sent, 2);
}
