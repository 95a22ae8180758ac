//! Common data types shared across components
//!
//! This module defines the raw capture buffer handed from a buffer source to
//! the frame decoder, and the digi collection handed back to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod cli;
pub mod error;
pub mod shutdown;

pub use error::{DecoderError, DecoderResult};

/// Number of RCT crates read out by one CTP7
pub const NUM_CRATES: usize = 18;

/// Width of one transport word in bytes
pub const WORD_SIZE: usize = 4;

/// Kind of logical channel carried on an oRSC fiber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Barrel/endcap region ET (10 bits), index = card * 2 + side
    Region,
    /// Forward (HF) region ET (8 bits), index = side * 4 + eta
    HfRegion,
    /// Isolated EM candidate (card | region | rank, 10 bits)
    IsoEm,
    /// Non-isolated EM candidate (card | region | rank, 10 bits)
    NonIsoEm,
    /// Per-region tau veto mask (14 bits)
    TauBits,
    /// Per-region overflow mask (14 bits)
    OverflowBits,
    /// Per-region MIP mask (14 bits)
    MipBits,
    /// HF fine-grain mask (8 bits)
    HfFineGrain,
}

impl ChannelKind {
    /// Short name used in trace files and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Region => "region",
            ChannelKind::HfRegion => "hf_region",
            ChannelKind::IsoEm => "iso_em",
            ChannelKind::NonIsoEm => "non_iso_em",
            ChannelKind::TauBits => "tau_bits",
            ChannelKind::OverflowBits => "overflow_bits",
            ChannelKind::MipBits => "mip_bits",
            ChannelKind::HfFineGrain => "hf_fine_grain",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical channel identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    /// RCT crate (0-17)
    pub crate_id: u8,
    /// Channel kind
    pub kind: ChannelKind,
    /// Index within the kind for this crate
    pub index: u8,
}

impl ChannelId {
    pub const fn new(crate_id: u8, kind: ChannelKind, index: u8) -> Self {
        Self {
            crate_id,
            kind,
            index,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "crate{:02}/{}{:02}", self.crate_id, self.kind, self.index)
    }
}

/// One logical channel's value at one bunch crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digi {
    /// Channel identity
    pub channel: ChannelId,
    /// Crossing index within the decoded buffer
    pub bx: u32,
    /// Decoded payload
    pub value: u16,
    /// False when the crate's two fibers disagree on the cable-4 BC0 marker
    pub valid: bool,
}

impl Digi {
    pub fn new(channel: ChannelId, bx: u32, value: u16) -> Self {
        Self {
            channel,
            bx,
            value,
            valid: true,
        }
    }
}

/// Raw capture buffer from the readout board
///
/// Words are laid out crossing-major: for each crossing, one frame per link
/// in link order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBuffer {
    words: Vec<u32>,
    crossings: u32,
}

impl RawBuffer {
    /// Create a buffer spanning `crossings` bunch crossings
    pub fn new(words: Vec<u32>, crossings: u32) -> Self {
        Self { words, crossings }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Number of bunch crossings this buffer claims to span
    pub fn crossings(&self) -> u32 {
        self.crossings
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Size on the wire in bytes
    pub fn byte_len(&self) -> usize {
        self.words.len() * WORD_SIZE
    }
}

/// Ordered digis grouped by bunch crossing
///
/// Insertion order is decode order. Crossings are opened in sequence with
/// [`DigiCollection::begin_crossing`]; digis pushed afterwards belong to the
/// most recently opened crossing. Serialize-only: the crossing index is
/// built by the decoder and never read back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DigiCollection {
    digis: Vec<Digi>,
    crossing_starts: Vec<usize>,
}

impl DigiCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection with pre-allocated capacity
    pub fn with_capacity(crossings: usize, digis: usize) -> Self {
        Self {
            digis: Vec::with_capacity(digis),
            crossing_starts: Vec::with_capacity(crossings),
        }
    }

    /// Open the next crossing and return its index
    pub fn begin_crossing(&mut self) -> u32 {
        self.crossing_starts.push(self.digis.len());
        (self.crossing_starts.len() - 1) as u32
    }

    /// Append a digi to the current crossing
    pub fn push(&mut self, digi: Digi) {
        debug_assert_eq!(
            Some(digi.bx as usize),
            self.crossing_starts.len().checked_sub(1),
            "digi pushed outside its crossing"
        );
        self.digis.push(digi);
    }

    /// Total number of digis
    pub fn len(&self) -> usize {
        self.digis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digis.is_empty()
    }

    /// Number of crossings opened
    pub fn num_crossings(&self) -> usize {
        self.crossing_starts.len()
    }

    /// Digis of one crossing (empty if out of range)
    pub fn crossing(&self, bx: u32) -> &[Digi] {
        let bx = bx as usize;
        let Some(&start) = self.crossing_starts.get(bx) else {
            return &[];
        };
        let end = self
            .crossing_starts
            .get(bx + 1)
            .copied()
            .unwrap_or(self.digis.len());
        &self.digis[start..end]
    }

    /// Iterate crossings in order
    pub fn crossings(&self) -> impl Iterator<Item = &[Digi]> + '_ {
        (0..self.crossing_starts.len() as u32).map(move |bx| self.crossing(bx))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Digi> {
        self.digis.iter()
    }

    pub fn as_slice(&self) -> &[Digi] {
        &self.digis
    }
}

impl<'a> IntoIterator for &'a DigiCollection {
    type Item = &'a Digi;
    type IntoIter = std::slice::Iter<'a, Digi>;

    fn into_iter(self) -> Self::IntoIter {
        self.digis.iter()
    }
}
