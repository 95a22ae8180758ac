//! Error types for buffer acquisition and decoding
//!
//! # Propagation
//! - `EndOfData` is the normal end of a replay run, not a failure
//! - `DiagnosticsWrite` is recovered locally by the reader
//! - Everything else is fatal to the current cycle and is surfaced to the
//!   caller, which owns retry/abort policy

use std::time::Duration;
use thiserror::Error;

/// Errors raised by buffer sources, the frame decoder and the trace writers
#[derive(Error, Debug)]
pub enum DecoderError {
    /// Peer unreachable, refused, or closed the connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// No data arrived within the bounded wait
    #[error("Timed out after {0:?} waiting for data")]
    Timeout(Duration),

    /// Reply does not match the request (byte count, word count)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Buffer cannot be split into whole crossings
    #[error("Malformed buffer: {0}")]
    MalformedBuffer(String),

    /// Replay file parse failure
    #[error("Format error at line {line}: {message}")]
    Format { line: usize, message: String },

    /// Replay file exhausted
    #[error("End of replay data")]
    EndOfData,

    /// Link trace could not be written (non-fatal)
    #[error("Diagnostics write failed: {0}")]
    DiagnosticsWrite(#[source] std::io::Error),

    /// I/O error (opening files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecoderError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a malformed buffer error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedBuffer(msg.into())
    }

    /// Create a replay format error for a 1-based line number
    pub fn format(line: usize, msg: impl Into<String>) -> Self {
        Self::Format {
            line,
            message: msg.into(),
        }
    }

    /// Check if this is the replay end-of-data signal
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::EndOfData)
    }

    /// Check if this error aborts the current cycle
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EndOfData | Self::DiagnosticsWrite(_))
    }
}

/// Result type alias using DecoderError
pub type DecoderResult<T> = Result<T, DecoderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_names_line() {
        let err = DecoderError::format(17, "invalid word \"zz\"");
        let msg = err.to_string();
        assert!(msg.contains("line 17"));
        assert!(msg.contains("zz"));
    }

    #[test]
    fn test_timeout_error() {
        let err = DecoderError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("Timed out"));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_malformed_error() {
        let err = DecoderError::malformed("217 words is not a multiple of 216");
        assert!(err.to_string().contains("Malformed buffer"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DecoderError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_fatality() {
        assert!(!DecoderError::EndOfData.is_fatal());
        assert!(DecoderError::EndOfData.is_end_of_data());

        let diag = DecoderError::DiagnosticsWrite(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        ));
        assert!(!diag.is_fatal());

        assert!(DecoderError::connection("refused").is_fatal());
        assert!(DecoderError::protocol("short reply").is_fatal());
        assert!(DecoderError::Timeout(Duration::from_secs(1)).is_fatal());
    }
}
