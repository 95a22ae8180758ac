//! Reader: one acquire/decode cycle per call
//!
//! This module provides:
//! - Link mapping tables and the frame decoder (decoder)
//! - Live and replay buffer sources (source)
//! - The orchestrator tying them to the diagnostic writers ([`Reader`])

pub mod decoder;
pub mod source;

pub use decoder::{decode, decode_with, DecodeObserver, FieldTrace, LinkMapping, MappingScheme};
pub use source::{BufferSource, LiveConfig, LiveSource, ReplaySource};

use crate::common::{DecoderError, DecoderResult, DigiCollection};
use crate::config::{Config, ConfigError};
use crate::recorder::{LinkFileWriter, RawDumpWriter};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Buffer source selection
#[derive(Debug, Clone)]
pub enum SourceConfig {
    Live(LiveConfig),
    Replay { path: PathBuf },
}

/// Runtime reader configuration
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub source: SourceConfig,
    pub scheme: MappingScheme,
    /// Bunch crossings per cycle
    pub crossings: u32,
    /// Per-field decode trace (None = disabled)
    pub link_file: Option<PathBuf>,
    /// Raw buffer dump in replay format (None = disabled)
    pub dump_file: Option<PathBuf>,
}

impl ReaderConfig {
    /// Create ReaderConfig from a validated file configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let decoder = &config.decoder;

        let source = if decoder.test {
            SourceConfig::Replay {
                path: decoder.test_file.clone(),
            }
        } else {
            SourceConfig::Live(LiveConfig {
                host: decoder.ctp7_host.clone(),
                port: decoder.port()?,
                read_timeout: Duration::from_millis(decoder.read_timeout_ms),
            })
        };

        Ok(Self {
            source,
            scheme: decoder.scheme(),
            crossings: decoder.crossings,
            link_file: decoder
                .create_link_file
                .then(|| decoder.link_file.clone()),
            dump_file: decoder.dump_file.clone(),
        })
    }

    /// Replay configuration without diagnostics
    pub fn replay(path: impl Into<PathBuf>, scheme: MappingScheme, crossings: u32) -> Self {
        Self {
            source: SourceConfig::Replay { path: path.into() },
            scheme,
            crossings,
            link_file: None,
            dump_file: None,
        }
    }
}

/// Result of one successful cycle
#[derive(Debug)]
pub enum CycleOutcome {
    Digis(DigiCollection),
    /// Replay file exhausted
    EndOfData,
}

/// Counters over the reader's lifetime
#[derive(Debug, Clone, Default)]
pub struct ReaderStats {
    /// Cycles that produced a collection
    pub cycles: u64,
    pub digis: u64,
    /// Raw bytes acquired
    pub bytes: u64,
    /// Cycles whose trace or dump write failed
    pub diagnostics_failures: u64,
}

/// Decode orchestrator
///
/// Owns the buffer source and the optional diagnostic writers. Dropping the
/// reader closes the connection or replay file and flushes the trace.
pub struct Reader {
    source: BufferSource,
    mapping: LinkMapping,
    link_file: Option<LinkFileWriter>,
    dump: Option<RawDumpWriter>,
    stats: ReaderStats,
}

impl Reader {
    /// Build a reader; trace and dump files are opened immediately
    pub fn new(config: ReaderConfig) -> DecoderResult<Self> {
        let source = match config.source {
            SourceConfig::Live(live) => {
                BufferSource::Live(LiveSource::new(live, config.scheme, config.crossings))
            }
            SourceConfig::Replay { path } => {
                BufferSource::Replay(ReplaySource::new(path, config.crossings))
            }
        };

        let mut reader = Self::from_parts(source, LinkMapping::new(config.scheme));
        if let Some(path) = &config.link_file {
            reader = reader.with_link_file(LinkFileWriter::open(path, config.scheme)?);
        }
        if let Some(path) = &config.dump_file {
            reader = reader.with_dump(RawDumpWriter::open(path)?);
        }

        info!(
            source = %reader.source.describe(),
            scheme = %config.scheme,
            crossings = config.crossings,
            link_file = reader.link_file.is_some(),
            dump = reader.dump.is_some(),
            "Reader initialized"
        );

        Ok(reader)
    }

    /// Assemble a reader from an existing source and mapping
    pub fn from_parts(source: BufferSource, mapping: LinkMapping) -> Self {
        Self {
            source,
            mapping,
            link_file: None,
            dump: None,
            stats: ReaderStats::default(),
        }
    }

    pub fn with_link_file(mut self, writer: LinkFileWriter) -> Self {
        self.link_file = Some(writer);
        self
    }

    pub fn with_dump(mut self, writer: RawDumpWriter) -> Self {
        self.dump = Some(writer);
        self
    }

    pub fn mapping(&self) -> &LinkMapping {
        &self.mapping
    }

    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    /// Acquire one buffer and decode it
    ///
    /// `EndOfData` from a replay source becomes [`CycleOutcome::EndOfData`];
    /// every other source or decode error is returned as is.
    pub fn run_cycle(&mut self) -> DecoderResult<CycleOutcome> {
        let buffer = match self.source.acquire() {
            Ok(buffer) => buffer,
            Err(DecoderError::EndOfData) => return Ok(CycleOutcome::EndOfData),
            Err(e) => return Err(e),
        };

        let mut diagnostics_failed = false;

        if let Some(dump) = &mut self.dump {
            if let Err(e) = dump.write(&buffer) {
                warn!(error = %e, path = %dump.path().display(), "Raw dump write failed");
                diagnostics_failed = true;
            }
        }

        let digis = match &mut self.link_file {
            Some(writer) => {
                let mut sink = TraceSink::new(writer);
                let result = decode_with(&buffer, &self.mapping, &mut sink);
                if let Some(e) = sink.finish() {
                    warn!(error = %e, path = %writer.path().display(), "Link trace write failed");
                    diagnostics_failed = true;
                }
                result?
            }
            None => decode(&buffer, &self.mapping)?,
        };

        self.stats.cycles += 1;
        self.stats.digis += digis.len() as u64;
        self.stats.bytes += buffer.byte_len() as u64;
        if diagnostics_failed {
            self.stats.diagnostics_failures += 1;
        }

        debug!(
            cycle = self.stats.cycles,
            crossings = digis.num_crossings(),
            digis = digis.len(),
            "Cycle decoded"
        );

        Ok(CycleOutcome::Digis(digis))
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        if let Some(writer) = &mut self.link_file {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "Link trace flush failed");
            }
        }
        info!(
            cycles = self.stats.cycles,
            digis = self.stats.digis,
            bytes = self.stats.bytes,
            diagnostics_failures = self.stats.diagnostics_failures,
            "Reader closed"
        );
    }
}

/// Forwards decode traces to the link file, stopping at the first failure
struct TraceSink<'a> {
    writer: &'a mut LinkFileWriter,
    error: Option<DecoderError>,
}

impl<'a> TraceSink<'a> {
    fn new(writer: &'a mut LinkFileWriter) -> Self {
        Self {
            writer,
            error: None,
        }
    }

    fn check(&mut self, result: DecoderResult<()>) {
        if let Err(e) = result {
            self.error = Some(e);
        }
    }

    /// Flush and return the first failure, if any
    fn finish(mut self) -> Option<DecoderError> {
        if self.error.is_none() {
            let result = self.writer.flush();
            self.check(result);
        }
        self.error
    }
}

impl DecodeObserver for TraceSink<'_> {
    fn begin_crossing(&mut self, bx: u32) {
        if self.error.is_none() {
            let result = self.writer.begin_crossing(bx);
            self.check(result);
        }
    }

    fn field(&mut self, trace: &FieldTrace) {
        if self.error.is_none() {
            let result = self
                .writer
                .record(trace.link, trace.slot, trace.raw_word, trace.channel);
            self.check(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::source::write_block;

    fn write_vectors(path: &std::path::Path, mapping: &LinkMapping, buffers: &[u32]) {
        let mut out = Vec::new();
        for fill in buffers {
            write_block(&mut out, &vec![*fill; mapping.slice_width()]).unwrap();
        }
        std::fs::write(path, out).unwrap();
    }

    #[test]
    fn test_from_config_replay() {
        let config = Config::from_toml(
            "[decoder]\ntest = true\ntestFile = \"v.txt\"\ncreateLinkFile = true\n",
        )
        .unwrap();
        let reader_config = ReaderConfig::from_config(&config).unwrap();

        assert!(matches!(
            reader_config.source,
            SourceConfig::Replay { ref path } if path == &PathBuf::from("v.txt")
        ));
        assert_eq!(reader_config.link_file, Some(PathBuf::from("linkFile.txt")));
        assert_eq!(reader_config.scheme, MappingScheme::Legacy);
    }

    #[test]
    fn test_from_config_live() {
        let config =
            Config::from_toml("[decoder]\nctp7Host = \"ctp7\"\nctp7Port = \"6000\"\n").unwrap();
        let reader_config = ReaderConfig::from_config(&config).unwrap();

        match reader_config.source {
            SourceConfig::Live(live) => {
                assert_eq!(live.host, "ctp7");
                assert_eq!(live.port, 6000);
                assert_eq!(live.read_timeout, Duration::from_millis(1000));
            }
            other => panic!("unexpected source: {other:?}"),
        }
        assert!(reader_config.link_file.is_none());
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = Config::from_toml("[decoder]\ncrossings = 0\n").unwrap();
        assert!(ReaderConfig::from_config(&config).is_err());
    }

    #[test]
    fn test_replay_cycles_until_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        let mapping = LinkMapping::legacy();
        write_vectors(&path, &mapping, &[0, 0]);

        let mut reader =
            Reader::new(ReaderConfig::replay(&path, MappingScheme::Legacy, 1)).unwrap();

        for _ in 0..2 {
            match reader.run_cycle().unwrap() {
                CycleOutcome::Digis(digis) => assert_eq!(digis.len(), mapping.channel_count()),
                CycleOutcome::EndOfData => panic!("replay ended early"),
            }
        }
        assert!(matches!(reader.run_cycle().unwrap(), CycleOutcome::EndOfData));
        assert_eq!(reader.stats().cycles, 2);
        assert_eq!(reader.stats().bytes, 2 * 216 * 4);
    }

    #[test]
    fn test_malformed_block_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        std::fs::write(&path, "1 2 3\n").unwrap();

        let mut reader =
            Reader::new(ReaderConfig::replay(&path, MappingScheme::Legacy, 1)).unwrap();
        assert!(matches!(
            reader.run_cycle(),
            Err(DecoderError::MalformedBuffer(_))
        ));
        assert_eq!(reader.stats().cycles, 0);
    }

    #[test]
    fn test_link_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = dir.path().join("vectors.txt");
        let trace = dir.path().join("links.txt");
        let mapping = LinkMapping::mp7();
        write_vectors(&vectors, &mapping, &[0xffff_ffff]);

        let mut config = ReaderConfig::replay(&vectors, MappingScheme::Mp7, 1);
        config.link_file = Some(trace.clone());
        let mut reader = Reader::new(config).unwrap();
        assert!(matches!(reader.run_cycle().unwrap(), CycleOutcome::Digis(_)));
        drop(reader);

        let text = std::fs::read_to_string(&trace).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("=====")).count(), 1);
        // one line per slot: 36 links x 20 lanes
        assert_eq!(text.lines().filter(|l| l.starts_with("link")).count(), 36 * 20);
        assert!(text.contains("-> unmapped"));
    }

    // /dev/full accepts opens and fails every write with ENOSPC
    #[cfg(target_os = "linux")]
    #[test]
    fn test_link_file_failure_keeps_digis() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = dir.path().join("vectors.txt");
        let mapping = LinkMapping::legacy();
        write_vectors(&vectors, &mapping, &[0]);

        let mut config = ReaderConfig::replay(&vectors, MappingScheme::Legacy, 1);
        config.link_file = Some(PathBuf::from("/dev/full"));
        let mut reader = Reader::new(config).unwrap();

        match reader.run_cycle() {
            Ok(CycleOutcome::Digis(digis)) => assert_eq!(digis.len(), mapping.channel_count()),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(reader.stats().cycles, 1);
        assert_eq!(reader.stats().diagnostics_failures, 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dump_and_trace_failures_count_once_per_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = dir.path().join("vectors.txt");
        let mapping = LinkMapping::legacy();
        write_vectors(&vectors, &mapping, &[0, 1]);

        let mut config = ReaderConfig::replay(&vectors, MappingScheme::Legacy, 1);
        config.link_file = Some(PathBuf::from("/dev/full"));
        config.dump_file = Some(PathBuf::from("/dev/full"));
        let mut reader = Reader::new(config).unwrap();

        for _ in 0..2 {
            assert!(matches!(reader.run_cycle(), Ok(CycleOutcome::Digis(_))));
        }
        assert!(matches!(reader.run_cycle(), Ok(CycleOutcome::EndOfData)));
        assert_eq!(reader.stats().cycles, 2);
        assert_eq!(reader.stats().diagnostics_failures, 2);
    }

    #[test]
    fn test_missing_replay_file_is_io_error() {
        let mut reader = Reader::new(ReaderConfig::replay(
            "/nonexistent/vectors.txt",
            MappingScheme::Legacy,
            1,
        ))
        .unwrap();
        assert!(matches!(reader.run_cycle(), Err(DecoderError::Io(_))));
    }
}
