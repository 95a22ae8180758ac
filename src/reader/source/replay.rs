//! Replay of captured buffers from a test-vector file
//!
//! # Format
//! ```text
//! # comment lines and trailing comments are ignored
//! 00000000 0x0001a2b3 ...     whitespace-separated hex words
//!                             a blank line ends a buffer
//! ```
//! Comment-only lines do not end a buffer.

use crate::common::{DecoderError, DecoderResult, RawBuffer};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Words per line when writing buffers
pub const WORDS_PER_LINE: usize = 6;

/// Block parser over any buffered reader
pub struct BlockReader<R> {
    reader: R,
    line_no: usize,
    line: Vec<u8>,
}

impl<R: BufRead> BlockReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            line: Vec::new(),
        }
    }

    /// Current 1-based line number
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// Next buffer, or None at end of input
    pub fn next_block(&mut self) -> DecoderResult<Option<Vec<u32>>> {
        let mut words = Vec::new();

        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                return Ok((!words.is_empty()).then_some(words));
            }
            self.line_no += 1;

            let line = std::str::from_utf8(&self.line)
                .map_err(|e| DecoderError::format(self.line_no, format!("not valid text: {e}")))?;

            if line.trim().is_empty() {
                if words.is_empty() {
                    continue;
                }
                return Ok(Some(words));
            }

            let content = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line,
            };

            for token in content.split_whitespace() {
                let digits = token
                    .strip_prefix("0x")
                    .or_else(|| token.strip_prefix("0X"))
                    .unwrap_or(token);
                let word = u32::from_str_radix(digits, 16).map_err(|e| {
                    DecoderError::format(self.line_no, format!("invalid word {token:?}: {e}"))
                })?;
                words.push(word);
            }
        }
    }
}

/// Write one buffer in replay format, terminated by a blank line
pub fn write_block<W: Write>(writer: &mut W, words: &[u32]) -> io::Result<()> {
    for line in words.chunks(WORDS_PER_LINE) {
        let text: Vec<String> = line.iter().map(|w| format!("{w:08x}")).collect();
        writeln!(writer, "{}", text.join(" "))?;
    }
    writeln!(writer)
}

/// Sequential replay source
///
/// Every block is tagged with the configured crossing count; the frame
/// decoder rejects blocks whose size does not match.
pub struct ReplaySource {
    path: PathBuf,
    crossings: u32,
    reader: Option<BlockReader<BufReader<File>>>,
    blocks: u64,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, crossings: u32) -> Self {
        Self {
            path: path.into(),
            crossings,
            reader: None,
            blocks: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of buffers returned so far
    pub fn blocks_read(&self) -> u64 {
        self.blocks
    }

    pub fn acquire(&mut self) -> DecoderResult<RawBuffer> {
        if self.reader.is_none() {
            let file = File::open(&self.path)?;
            info!(path = %self.path.display(), "Opened replay file");
            self.reader = Some(BlockReader::new(BufReader::new(file)));
        }

        let reader = self
            .reader
            .as_mut()
            .ok_or(DecoderError::EndOfData)?;

        match reader.next_block()? {
            Some(words) => {
                self.blocks += 1;
                debug!(block = self.blocks, words = words.len(), "Replay block read");
                Ok(RawBuffer::new(words, self.crossings))
            }
            None => {
                info!(blocks = self.blocks, "Replay file exhausted");
                Err(DecoderError::EndOfData)
            }
        }
    }
}
