//! Live capture from a CTP7 board over TCP
//!
//! # Protocol
//! Each request is an ASCII command NUL-padded to [`REQUEST_LEN`] bytes:
//!
//! ```text
//! dumpContiguousBuffer(<type>,<link>,<offset>,<count>)   all hex
//! ```
//!
//! `type` 0 selects the input capture RAM, `offset` is a byte offset into
//! the link's RAM and `count` a word count. The board answers with exactly
//! `count * 4` bytes of little-endian words. Closing the session is announced
//! with `HANGUP\0`.

use crate::common::{DecoderError, DecoderResult, RawBuffer, WORD_SIZE};
use crate::reader::decoder::{MappingScheme, CAPTURE_WORDS_PER_LINK, NUM_LINKS};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Size of one request message
pub const REQUEST_LEN: usize = 64;

/// Buffer type selector for the input capture RAM
pub const INPUT_BUFFER: u32 = 0;

/// Session close message
pub const HANGUP: &[u8] = b"HANGUP\0";

/// Live source settings
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub host: String,
    pub port: u16,
    /// Bound on connect and on every socket read
    pub read_timeout: Duration,
}

/// Format a capture RAM request
pub fn format_request(link: u32, byte_offset: u32, count: u32) -> [u8; REQUEST_LEN] {
    let text = format!(
        "dumpContiguousBuffer({:x},{:x},{:x},{:x})",
        INPUT_BUFFER, link, byte_offset, count
    );
    let mut msg = [0u8; REQUEST_LEN];
    let len = text.len().min(REQUEST_LEN - 1);
    msg[..len].copy_from_slice(&text.as_bytes()[..len]);
    msg
}

/// Parse a request produced by [`format_request`] into
/// `(type, link, byte_offset, count)`
pub fn parse_request(msg: &[u8]) -> Option<(u32, u32, u32, u32)> {
    let end = msg.iter().position(|&b| b == 0).unwrap_or(msg.len());
    let text = std::str::from_utf8(&msg[..end]).ok()?;
    let args = text
        .strip_prefix("dumpContiguousBuffer(")?
        .strip_suffix(')')?;

    let mut values = args.split(',').map(|v| u32::from_str_radix(v.trim(), 16));
    let mut next = || values.next()?.ok();
    let parsed = (next()?, next()?, next()?, next()?);
    Some(parsed)
}

/// Live CTP7 buffer source
///
/// The connection is opened on the first [`LiveSource::acquire`] and kept
/// across cycles. A protocol or connection failure drops it; the next call
/// reconnects. The late reply to a timed-out request is discarded before the
/// next request; if it never arrives the connection is dropped with a
/// protocol error.
pub struct LiveSource {
    config: LiveConfig,
    scheme: MappingScheme,
    crossings: u32,
    /// Word offset of the next read in each link's capture RAM
    offset: usize,
    stream: Option<TcpStream>,
    /// Reply bytes still owed by the board for a timed-out request
    pending: usize,
}

impl LiveSource {
    pub fn new(config: LiveConfig, scheme: MappingScheme, crossings: u32) -> Self {
        Self {
            config,
            scheme,
            crossings,
            offset: 0,
            stream: None,
            pending: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Host and port this source reads from
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Words requested from each link per cycle
    pub fn words_per_link(&self) -> usize {
        self.crossings as usize * self.scheme.words_per_frame()
    }

    /// Read one cycle's worth of frames from every link
    pub fn acquire(&mut self) -> DecoderResult<RawBuffer> {
        let count = self.words_per_link();
        if count > CAPTURE_WORDS_PER_LINK {
            return Err(DecoderError::protocol(format!(
                "{} words per link exceeds the {}-word capture RAM",
                count, CAPTURE_WORDS_PER_LINK
            )));
        }
        if self.offset + count > CAPTURE_WORDS_PER_LINK {
            debug!(offset = self.offset, "Capture RAM offset wrapped");
            self.offset = 0;
        }

        if let Err(e) = self.drain_pending() {
            self.disconnect();
            return Err(e);
        }

        let mut per_link = Vec::with_capacity(NUM_LINKS);
        for link in 0..NUM_LINKS {
            let result = self.request_link(link, count);
            match result {
                Ok(words) => per_link.push(words),
                Err(e) => {
                    if matches!(e, DecoderError::Timeout(_)) {
                        self.pending = count * WORD_SIZE;
                    } else {
                        self.disconnect();
                    }
                    return Err(e);
                }
            }
        }
        self.offset += count;

        Ok(RawBuffer::new(
            interleave(&per_link, self.scheme.words_per_frame()),
            self.crossings,
        ))
    }

    fn connect(&mut self) -> DecoderResult<&mut TcpStream> {
        if self.stream.is_none() {
            let endpoint = self.endpoint();
            let addrs = (self.config.host.as_str(), self.config.port)
                .to_socket_addrs()
                .map_err(|e| DecoderError::connection(format!("{endpoint}: {e}")))?;

            let mut last_error = None;
            for addr in addrs {
                match TcpStream::connect_timeout(&addr, self.config.read_timeout) {
                    Ok(stream) => {
                        stream.set_read_timeout(Some(self.config.read_timeout))?;
                        stream.set_nodelay(true)?;
                        info!(endpoint = %endpoint, "Connected to CTP7");
                        self.stream = Some(stream);
                        break;
                    }
                    Err(e) => last_error = Some(e),
                }
            }

            if self.stream.is_none() {
                let reason = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no address resolved".to_string());
                return Err(DecoderError::connection(format!("{endpoint}: {reason}")));
            }
        }

        self.stream
            .as_mut()
            .ok_or_else(|| DecoderError::connection("not connected"))
    }

    fn request_link(&mut self, link: usize, count: usize) -> DecoderResult<Vec<u32>> {
        let byte_offset = (self.offset * WORD_SIZE) as u32;
        let request = format_request(link as u32, byte_offset, count as u32);
        let timeout = self.config.read_timeout;
        let stream = self.connect()?;

        stream
            .write_all(&request)
            .map_err(|e| DecoderError::connection(format!("send to link {link}: {e}")))?;

        let expected = count * WORD_SIZE;
        let mut bytes = vec![0u8; expected];
        let mut received = 0;
        while received < expected {
            match stream.read(&mut bytes[received..]) {
                Ok(0) => {
                    return Err(DecoderError::connection(format!(
                        "peer closed connection after {received} of {expected} bytes (link {link})"
                    )))
                }
                Ok(n) => received += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if received == 0 {
                        return Err(DecoderError::Timeout(timeout));
                    }
                    return Err(DecoderError::protocol(format!(
                        "short reply from link {link}: {received} of {expected} bytes"
                    )));
                }
                Err(e) => {
                    return Err(DecoderError::connection(format!(
                        "receive from link {link}: {e}"
                    )))
                }
            }
        }

        debug!(link, offset = self.offset, count, "Link buffer received");

        Ok(bytes
            .chunks_exact(WORD_SIZE)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Consume the late reply to a timed-out request
    fn drain_pending(&mut self) -> DecoderResult<()> {
        let pending = self.pending;
        if pending == 0 {
            return Ok(());
        }
        let Some(stream) = self.stream.as_mut() else {
            self.pending = 0;
            return Ok(());
        };

        let mut scratch = vec![0u8; pending];
        let mut drained = 0;
        while drained < pending {
            match stream.read(&mut scratch[drained..]) {
                Ok(0) => {
                    return Err(DecoderError::connection(format!(
                        "peer closed connection while {} late reply bytes were owed",
                        pending - drained
                    )))
                }
                Ok(n) => drained += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(DecoderError::protocol(format!(
                        "late reply incomplete: {drained} of {pending} bytes"
                    )))
                }
                Err(e) => {
                    return Err(DecoderError::connection(format!(
                        "receive late reply: {e}"
                    )))
                }
            }
        }

        self.pending = 0;
        debug!(bytes = pending, "Discarded late reply");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.pending = 0;
        if self.stream.take().is_some() {
            warn!(endpoint = %self.endpoint(), "Dropped CTP7 connection");
        }
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.write_all(HANGUP) {
                debug!(error = %e, "HANGUP not delivered");
            }
            let _ = stream.shutdown(Shutdown::Both);
            info!(endpoint = %self.endpoint(), "Closed CTP7 connection");
        }
    }
}

/// Merge per-link word streams into crossing-major order
fn interleave(per_link: &[Vec<u32>], words_per_frame: usize) -> Vec<u32> {
    let total: usize = per_link.iter().map(Vec::len).sum();
    let crossings = per_link.first().map_or(0, |w| w.len() / words_per_frame);

    let mut words = Vec::with_capacity(total);
    for bx in 0..crossings {
        let frame = bx * words_per_frame..(bx + 1) * words_per_frame;
        for link_words in per_link {
            words.extend_from_slice(&link_words[frame.clone()]);
        }
    }
    words
}
