//! Live source tests against a loopback fake CTP7 board
//!
//! The fake board answers `dumpContiguousBuffer` requests with words that
//! encode their own origin: `(link << 16) | word_index`, where `word_index`
//! is the position in the link's capture RAM. This lets the tests check
//! interleaving and RAM offsets directly.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ctp7_digi::common::DecoderError;
use ctp7_digi::reader::decoder::MappingScheme;
use ctp7_digi::reader::source::live::{parse_request, LiveConfig, LiveSource, REQUEST_LEN};
use ctp7_digi::reader::{CycleOutcome, Reader, ReaderConfig, SourceConfig};

/// How the fake board answers
#[derive(Clone, Copy)]
enum Behavior {
    /// Full reply for every request
    Normal,
    /// Read requests but never reply
    Silent,
    /// Reply with half the requested bytes, then stall
    Short,
    /// Hold the first reply for the given time, then answer normally
    Late(Duration),
}

/// What the fake board saw during the session
#[derive(Debug, Default)]
struct Session {
    /// (link, byte_offset, count) per request
    requests: Vec<(u32, u32, u32)>,
    hangup: bool,
}

fn board_word(link: u32, index: u32) -> u32 {
    (link << 16) | index
}

/// Read one message: a full request, or a shorter HANGUP before EOF
fn read_message(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut msg = vec![0u8; REQUEST_LEN];
    let mut got = 0;
    while got < REQUEST_LEN {
        match stream.read(&mut msg[got..]) {
            Ok(0) | Err(_) => break,
            Ok(n) => got += n,
        }
    }
    msg.truncate(got);
    (!msg.is_empty()).then_some(msg)
}

fn spawn_board(behavior: Behavior) -> (u16, JoinHandle<Session>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let mut session = Session::default();
        let (mut stream, _) = listener.accept().unwrap();

        let mut replies = 0;
        while let Some(msg) = read_message(&mut stream) {
            if msg.starts_with(b"HANGUP") {
                session.hangup = true;
                break;
            }
            let (kind, link, byte_offset, count) = parse_request(&msg).unwrap();
            assert_eq!(kind, 0);
            session.requests.push((link, byte_offset, count));

            let start = byte_offset / 4;
            let reply: Vec<u8> = (start..start + count)
                .flat_map(|i| board_word(link, i).to_le_bytes())
                .collect();

            replies += 1;
            match behavior {
                Behavior::Normal => stream.write_all(&reply).unwrap(),
                Behavior::Late(delay) => {
                    if replies == 1 {
                        thread::sleep(delay);
                    }
                    stream.write_all(&reply).unwrap();
                }
                Behavior::Silent => {}
                Behavior::Short => {
                    stream.write_all(&reply[..reply.len() / 2]).unwrap();
                }
            }
        }
        session
    });

    (port, handle)
}

fn live_config(port: u16, timeout_ms: u64) -> LiveConfig {
    LiveConfig {
        host: "127.0.0.1".to_string(),
        port,
        read_timeout: Duration::from_millis(timeout_ms),
    }
}

#[test]
fn test_interleaves_links_crossing_major() {
    let (port, board) = spawn_board(Behavior::Normal);
    let scheme = MappingScheme::Legacy;
    let words_per_frame = scheme.words_per_frame();

    let mut source = LiveSource::new(live_config(port, 2000), scheme, 2);
    let buffer = source.acquire().unwrap();

    assert_eq!(buffer.crossings(), 2);
    assert_eq!(buffer.len(), 2 * scheme.slice_width());
    for bx in 0..2 {
        for link in 0..36 {
            for w in 0..words_per_frame {
                let pos = bx * scheme.slice_width() + link * words_per_frame + w;
                let expected = board_word(link as u32, (bx * words_per_frame + w) as u32);
                assert_eq!(buffer.words()[pos], expected, "bx {bx} link {link} word {w}");
            }
        }
    }

    drop(source);
    let session = board.join().unwrap();
    assert_eq!(session.requests.len(), 36);
    assert!(session.hangup);
}

#[test]
fn test_offset_advances_between_cycles() {
    let (port, board) = spawn_board(Behavior::Normal);
    let mut source = LiveSource::new(live_config(port, 2000), MappingScheme::Legacy, 1);

    let first = source.acquire().unwrap();
    let second = source.acquire().unwrap();
    assert_eq!(first.words()[0], board_word(0, 0));
    assert_eq!(second.words()[0], board_word(0, 6));

    drop(source);
    let session = board.join().unwrap();
    let offsets: Vec<u32> = session.requests.iter().map(|r| r.1).collect();
    assert!(offsets[..36].iter().all(|&o| o == 0));
    assert!(offsets[36..].iter().all(|&o| o == 24));
}

#[test]
fn test_offset_wraps_at_end_of_capture_ram() {
    let (port, board) = spawn_board(Behavior::Normal);
    // 170 crossings x 6 words = 1020 words: the second read would overrun
    let mut source = LiveSource::new(live_config(port, 2000), MappingScheme::Legacy, 170);

    source.acquire().unwrap();
    source.acquire().unwrap();

    drop(source);
    let session = board.join().unwrap();
    assert_eq!(session.requests.len(), 72);
    assert!(session.requests.iter().all(|&(_, offset, count)| offset == 0 && count == 1020));
}

#[test]
fn test_silent_board_times_out_and_keeps_connection() {
    let (port, board) = spawn_board(Behavior::Silent);
    let mut source = LiveSource::new(live_config(port, 100), MappingScheme::Legacy, 1);

    let err = source.acquire().unwrap_err();
    assert!(matches!(err, DecoderError::Timeout(_)), "{err}");
    assert!(source.is_connected());

    drop(source);
    let session = board.join().unwrap();
    assert!(session.hangup);
}

#[test]
fn test_late_reply_is_discarded_before_next_cycle() {
    let (port, board) = spawn_board(Behavior::Late(Duration::from_millis(300)));
    let mut source = LiveSource::new(live_config(port, 100), MappingScheme::Legacy, 1);

    let err = source.acquire().unwrap_err();
    assert!(matches!(err, DecoderError::Timeout(_)), "{err}");

    // let the late reply land before the next cycle
    thread::sleep(Duration::from_millis(400));

    let buffer = source.acquire().unwrap();
    for link in 0..36u32 {
        let word = buffer.words()[link as usize * 6];
        assert_eq!(word, board_word(link, 0), "link {link} got another link's data");
    }

    drop(source);
    let session = board.join().unwrap();
    // one timed-out request plus a full cycle
    assert_eq!(session.requests.len(), 37);
    assert!(session.hangup);
}

#[test]
fn test_missing_late_reply_drops_connection() {
    let (port, board) = spawn_board(Behavior::Silent);
    let mut source = LiveSource::new(live_config(port, 100), MappingScheme::Legacy, 1);

    assert!(matches!(source.acquire(), Err(DecoderError::Timeout(_))));

    let err = source.acquire().unwrap_err();
    assert!(matches!(err, DecoderError::Protocol(_)), "{err}");
    assert!(!source.is_connected());

    drop(source);
    let session = board.join().unwrap();
    assert_eq!(session.requests.len(), 1);
    assert!(!session.hangup);
}

#[test]
fn test_short_reply_is_protocol_error() {
    let (port, board) = spawn_board(Behavior::Short);
    let mut source = LiveSource::new(live_config(port, 100), MappingScheme::Legacy, 1);

    let err = source.acquire().unwrap_err();
    assert!(matches!(err, DecoderError::Protocol(_)), "{err}");
    assert!(!source.is_connected());

    drop(source);
    board.join().unwrap();
}

#[test]
fn test_peer_close_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let board = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let _ = read_message(&mut stream);
        // close without replying
    });

    let mut source = LiveSource::new(live_config(port, 2000), MappingScheme::Legacy, 1);
    let err = source.acquire().unwrap_err();
    assert!(matches!(err, DecoderError::Connection(_)), "{err}");
    assert!(!source.is_connected());

    board.join().unwrap();
}

#[test]
fn test_reader_decodes_live_buffer() {
    let (port, board) = spawn_board(Behavior::Normal);
    let mut reader = Reader::new(ReaderConfig {
        source: SourceConfig::Live(live_config(port, 2000)),
        scheme: MappingScheme::Mp7,
        crossings: 3,
        link_file: None,
        dump_file: None,
    })
    .unwrap();

    match reader.run_cycle().unwrap() {
        CycleOutcome::Digis(digis) => {
            assert_eq!(digis.num_crossings(), 3);
            assert_eq!(digis.len(), 3 * reader.mapping().channel_count());
        }
        CycleOutcome::EndOfData => panic!("live source never ends"),
    }

    drop(reader);
    let session = board.join().unwrap();
    assert!(session.requests.iter().all(|&(_, _, count)| count == 30));
    assert!(session.hangup);
}
