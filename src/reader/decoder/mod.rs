//! Decoder module for CTP7 capture buffers
//!
//! Converts raw link frames into per-channel, per-crossing digis.

pub mod frame;
pub mod mapping;

pub use frame::{decode, decode_with, extract_bits, DecodeObserver, FieldTrace};
pub use mapping::{
    Bc0Check, FieldSpec, Fiber, LinkMapping, MappingScheme, Slot, CAPTURE_WORDS_PER_LINK,
    NUM_LINKS,
};
