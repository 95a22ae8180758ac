//! Raw buffer dump in replay format
//!
//! A dump written during a live session can be fed back through the replay
//! source with the same mapping and crossing count.

use crate::common::{DecoderError, DecoderResult, RawBuffer};
use crate::reader::source::write_block;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct RawDumpWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    buffers: u64,
}

impl RawDumpWriter {
    /// Open (or create) the dump file for appending
    pub fn open(path: impl AsRef<Path>) -> DecoderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "Opened raw dump file");

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            buffers: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn buffers_written(&self) -> u64 {
        self.buffers
    }

    /// Append one buffer and flush it to disk
    pub fn write(&mut self, buffer: &RawBuffer) -> DecoderResult<()> {
        write_block(&mut self.writer, buffer.words()).map_err(DecoderError::DiagnosticsWrite)?;
        self.writer.flush().map_err(DecoderError::DiagnosticsWrite)?;
        self.buffers += 1;
        Ok(())
    }
}
