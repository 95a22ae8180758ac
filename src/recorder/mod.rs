//! Diagnostic file writers
//!
//! - [`LinkFileWriter`]: per-field decode trace
//! - [`RawDumpWriter`]: raw buffers in replay format
//!
//! Write failures surface as `DecoderError::DiagnosticsWrite`; the reader
//! logs them and keeps decoding.

pub mod dump;
pub mod link_file;

pub use dump::RawDumpWriter;
pub use link_file::LinkFileWriter;
