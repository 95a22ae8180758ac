//! ctp7-digi: CTP7 capture buffer acquisition and RCT digi decoding
//!
//! Raw link buffers are read from a CTP7 board (or replayed from a
//! test-vector file) and decoded into per-channel, per-crossing digis
//! through a selectable link mapping.

pub mod common;
pub mod config;
pub mod reader;
pub mod recorder;
