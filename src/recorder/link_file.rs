//! Per-field decode trace ("link file")
//!
//! ```text
//! # ctp7-digi link trace, legacy mapping, opened 2026-10-19T08:00:00+00:00
//! ===== BC Cycle: 0
//! link 15 slot 00 word 0x0001a2b3 -> crate00/region00
//! link 15 slot 16 word 0x00c00000 -> unmapped
//! ```

use crate::common::{ChannelId, DecoderError, DecoderResult};
use crate::reader::decoder::MappingScheme;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Append-only trace writer
pub struct LinkFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl LinkFileWriter {
    /// Open (or create) the trace file for appending and write a header line
    pub fn open(path: impl AsRef<Path>, scheme: MappingScheme) -> DecoderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "# ctp7-digi link trace, {} mapping, opened {}",
            scheme,
            Utc::now().to_rfc3339()
        )?;

        info!(path = %path.display(), "Opened link trace file");

        Ok(Self {
            path,
            writer,
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written since open (header excluded)
    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Write the separator that opens a crossing
    pub fn begin_crossing(&mut self, bx: u32) -> DecoderResult<()> {
        writeln!(self.writer, "===== BC Cycle: {bx}").map_err(DecoderError::DiagnosticsWrite)?;
        self.lines += 1;
        Ok(())
    }

    /// Write one decoded field
    pub fn record(
        &mut self,
        link: usize,
        slot: usize,
        raw_word: u32,
        channel: Option<ChannelId>,
    ) -> DecoderResult<()> {
        let result = match channel {
            Some(channel) => writeln!(
                self.writer,
                "link {link:2} slot {slot:02} word 0x{raw_word:08x} -> {channel}"
            ),
            None => writeln!(
                self.writer,
                "link {link:2} slot {slot:02} word 0x{raw_word:08x} -> unmapped"
            ),
        };
        result.map_err(DecoderError::DiagnosticsWrite)?;
        self.lines += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> DecoderResult<()> {
        self.writer.flush().map_err(DecoderError::DiagnosticsWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ChannelKind;

    #[test]
    fn test_trace_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.txt");

        let mut writer = LinkFileWriter::open(&path, MappingScheme::Legacy).unwrap();
        writer.begin_crossing(0).unwrap();
        writer
            .record(15, 0, 0x0001_a2b3, Some(ChannelId::new(0, ChannelKind::Region, 0)))
            .unwrap();
        writer.record(15, 16, 0x00c0_0000, None).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.lines_written(), 3);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("# ctp7-digi link trace, legacy mapping"));
        assert_eq!(lines[1], "===== BC Cycle: 0");
        assert_eq!(lines[2], "link 15 slot 00 word 0x0001a2b3 -> crate00/region00");
        assert_eq!(lines[3], "link 15 slot 16 word 0x00c00000 -> unmapped");
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.txt");

        for bx in 0..2 {
            let mut writer = LinkFileWriter::open(&path, MappingScheme::Mp7).unwrap();
            writer.begin_crossing(bx).unwrap();
            writer.flush().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with('#')).count(), 2);
        assert!(text.contains("===== BC Cycle: 1"));
    }

    #[test]
    fn test_open_in_missing_directory() {
        let result = LinkFileWriter::open("/nonexistent/dir/links.txt", MappingScheme::Legacy);
        assert!(matches!(result, Err(DecoderError::Io(_))));
    }
}
