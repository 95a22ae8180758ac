//! Link mapping tables for CTP7 input links
//!
//! Each RCT crate drives two oRSC fibers (even and odd). A mapping scheme
//! fixes which CTP7 link each fiber lands on, how many words a link carries
//! per bunch crossing, and where every field sits inside that frame.
//!
//! # Legacy (CTP7) frame
//!
//! Six 32-bit words per link, read as one 192-bit little-endian stream
//! (bit `n` is bit `n % 32` of word `n / 32`):
//!
//! ```text
//! even fiber: [8..148)   14 x region ET (10 bits)
//!             [148..162) tau mask   [162..176) overflow mask
//!             [178..184) cable 4/5/6 BC0 (unmapped)
//! odd fiber:  [8..72)    8 x HF ET (8 bits)
//!             [72..80)   HF fine-grain mask
//!             [80..120)  4 x iso EM      [120..160) 4 x non-iso EM
//!             [160..174) MIP mask        [176..184) cable 1-4 BC0 (unmapped)
//! ```
//!
//! # MP7 frame
//!
//! Ten 32-bit words per link, each word two 16-bit lanes (low lane first),
//! one field per lane, value right-aligned. Fiber of crate `c` lands on link
//! `2c` (even) and `2c + 1` (odd).
//!
//! # Fiber agreement
//!
//! Both legacy fibers of a crate carry the cable-4 BC0 marker (even bit 178,
//! odd bit 182). When the two disagree the crate's digis for that crossing
//! are flagged invalid. MP7 frames carry no markers and are never flagged.

use crate::common::{ChannelId, ChannelKind, NUM_CRATES};
use serde::{Deserialize, Serialize};

/// Number of CTP7 input links carrying RCT data
pub const NUM_LINKS: usize = 36;

/// Words per link in the CTP7 capture RAM
pub const CAPTURE_WORDS_PER_LINK: usize = 1024;

mod constants {
    pub mod legacy {
        pub const WORDS_PER_FRAME: usize = 6;
        pub const FIELD_BASE: u16 = 8;

        pub const REGION_WIDTH: u8 = 10;
        pub const TAU_OFFSET: u16 = 148;
        pub const OVERFLOW_OFFSET: u16 = 162;
        pub const EVEN_BC0_OFFSETS: [u16; 3] = [178, 180, 182];

        pub const HF_WIDTH: u8 = 8;
        /// HF index (side * 4 + eta) in stream order
        pub const HF_ORDER: [u8; 8] = [0, 1, 4, 5, 2, 3, 6, 7];
        pub const HF_FINE_GRAIN_OFFSET: u16 = 72;
        pub const ISO_EM_OFFSET: u16 = 80;
        pub const NON_ISO_EM_OFFSET: u16 = 120;
        pub const EM_WIDTH: u8 = 10;
        pub const MIP_OFFSET: u16 = 160;
        pub const ODD_BC0_OFFSETS: [u16; 4] = [176, 178, 180, 182];
        /// Cable 4 appears on both fibers
        pub const EVEN_CABLE4_BC0: u16 = EVEN_BC0_OFFSETS[0];
        pub const ODD_CABLE4_BC0: u16 = ODD_BC0_OFFSETS[3];

        pub const MASK_WIDTH: u8 = 14;
        pub const BC0_WIDTH: u8 = 2;

        /// CTP7 cabling: crate -> (even link, odd link)
        pub const LINKS: [(u8, u8); 18] = [
            (15, 16),
            (18, 19),
            (20, 21),
            (12, 14),
            (13, 23),
            (17, 22),
            (2, 4),
            (5, 7),
            (10, 8),
            (0, 3),
            (1, 9),
            (6, 11),
            (27, 28),
            (30, 31),
            (32, 33),
            (24, 26),
            (25, 35),
            (29, 34),
        ];
    }

    pub mod mp7 {
        pub const WORDS_PER_FRAME: usize = 10;
        pub const LANE_WIDTH: u16 = 16;
        pub const LANES: usize = WORDS_PER_FRAME * 2;
    }
}

/// Link mapping scheme, fixed for the lifetime of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingScheme {
    /// CTP7 firmware cabling and oRSC fiber bit layout
    #[default]
    Legacy,
    /// Alternate (MP7) firmware layout
    Mp7,
}

impl MappingScheme {
    /// Select the scheme from the `mp7Mapping` flag
    pub fn from_mp7_flag(mp7: bool) -> Self {
        if mp7 {
            Self::Mp7
        } else {
            Self::Legacy
        }
    }

    /// Words carried by one link for one bunch crossing
    pub fn words_per_frame(&self) -> usize {
        match self {
            Self::Legacy => constants::legacy::WORDS_PER_FRAME,
            Self::Mp7 => constants::mp7::WORDS_PER_FRAME,
        }
    }

    /// Words per bunch crossing across all links
    pub fn slice_width(&self) -> usize {
        NUM_LINKS * self.words_per_frame()
    }

    /// Largest crossing count one capture RAM read can return
    pub fn max_crossings(&self) -> usize {
        CAPTURE_WORDS_PER_LINK / self.words_per_frame()
    }

    /// Link carrying the given fiber of a crate
    pub fn link_for(&self, crate_id: usize, fiber: Fiber) -> usize {
        match self {
            Self::Legacy => {
                let (even, odd) = constants::legacy::LINKS[crate_id];
                match fiber {
                    Fiber::Even => even as usize,
                    Fiber::Odd => odd as usize,
                }
            }
            Self::Mp7 => 2 * crate_id + fiber as usize,
        }
    }

    /// Cable-4 BC0 fields (even, odd), if the scheme carries them
    fn cable4_bc0(&self) -> Option<(FieldSpec, FieldSpec)> {
        use constants::legacy::{BC0_WIDTH, EVEN_CABLE4_BC0, ODD_CABLE4_BC0};
        match self {
            Self::Legacy => Some((
                FieldSpec::new(EVEN_CABLE4_BC0, BC0_WIDTH),
                FieldSpec::new(ODD_CABLE4_BC0, BC0_WIDTH),
            )),
            Self::Mp7 => None,
        }
    }

    fn fields(&self, fiber: Fiber) -> Vec<FieldLayout> {
        match (self, fiber) {
            (Self::Legacy, Fiber::Even) => legacy_even_fields(),
            (Self::Legacy, Fiber::Odd) => legacy_odd_fields(),
            (Self::Mp7, Fiber::Even) => mp7_even_fields(),
            (Self::Mp7, Fiber::Odd) => mp7_odd_fields(),
        }
    }
}

impl std::fmt::Display for MappingScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Mp7 => write!(f, "mp7"),
        }
    }
}

/// oRSC fiber parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fiber {
    Even = 0,
    Odd = 1,
}

/// Bit position of a field inside one link frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Offset from bit 0 of the first frame word
    pub offset: u16,
    /// Width in bits (1-16)
    pub width: u8,
}

impl FieldSpec {
    pub const fn new(offset: u16, width: u8) -> Self {
        Self { offset, width }
    }

    /// Index of the frame word holding the field's lowest bit
    pub fn first_word(&self) -> usize {
        self.offset as usize / 32
    }

    /// One past the field's highest bit
    pub fn end(&self) -> usize {
        self.offset as usize + self.width as usize
    }
}

/// Field position plus the channel it feeds (None = unmapped)
#[derive(Debug, Clone, Copy)]
struct FieldLayout {
    field: FieldSpec,
    role: Option<(ChannelKind, u8)>,
}

impl FieldLayout {
    fn mapped(offset: u16, width: u8, kind: ChannelKind, index: u8) -> Self {
        Self {
            field: FieldSpec::new(offset, width),
            role: Some((kind, index)),
        }
    }

    fn unmapped(offset: u16, width: u8) -> Self {
        Self {
            field: FieldSpec::new(offset, width),
            role: None,
        }
    }
}

fn legacy_even_fields() -> Vec<FieldLayout> {
    use constants::legacy::*;

    let mut fields: Vec<FieldLayout> = (0..14u8)
        .map(|r| {
            FieldLayout::mapped(
                FIELD_BASE + r as u16 * REGION_WIDTH as u16,
                REGION_WIDTH,
                ChannelKind::Region,
                r,
            )
        })
        .collect();
    fields.push(FieldLayout::mapped(TAU_OFFSET, MASK_WIDTH, ChannelKind::TauBits, 0));
    fields.push(FieldLayout::mapped(
        OVERFLOW_OFFSET,
        MASK_WIDTH,
        ChannelKind::OverflowBits,
        0,
    ));
    fields.extend(
        EVEN_BC0_OFFSETS
            .iter()
            .map(|&offset| FieldLayout::unmapped(offset, BC0_WIDTH)),
    );
    fields
}

fn legacy_odd_fields() -> Vec<FieldLayout> {
    use constants::legacy::*;

    let mut fields: Vec<FieldLayout> = HF_ORDER
        .iter()
        .enumerate()
        .map(|(i, &index)| {
            FieldLayout::mapped(
                FIELD_BASE + i as u16 * HF_WIDTH as u16,
                HF_WIDTH,
                ChannelKind::HfRegion,
                index,
            )
        })
        .collect();
    fields.push(FieldLayout::mapped(
        HF_FINE_GRAIN_OFFSET,
        HF_WIDTH,
        ChannelKind::HfFineGrain,
        0,
    ));
    for (base, kind) in [
        (ISO_EM_OFFSET, ChannelKind::IsoEm),
        (NON_ISO_EM_OFFSET, ChannelKind::NonIsoEm),
    ] {
        fields.extend((0..4u8).map(|i| {
            FieldLayout::mapped(base + i as u16 * EM_WIDTH as u16, EM_WIDTH, kind, i)
        }));
    }
    fields.push(FieldLayout::mapped(MIP_OFFSET, MASK_WIDTH, ChannelKind::MipBits, 0));
    fields.extend(
        ODD_BC0_OFFSETS
            .iter()
            .map(|&offset| FieldLayout::unmapped(offset, BC0_WIDTH)),
    );
    fields
}

/// Lay out `roles` one per 16-bit lane, padding the frame with spare lanes
fn mp7_lanes(roles: &[(ChannelKind, u8)]) -> Vec<FieldLayout> {
    use constants::mp7::*;

    (0..LANES)
        .map(|lane| {
            let offset = lane as u16 * LANE_WIDTH;
            match roles.get(lane) {
                Some(&(kind, index)) => {
                    FieldLayout::mapped(offset, natural_width(kind), kind, index)
                }
                None => FieldLayout::unmapped(offset, LANE_WIDTH as u8),
            }
        })
        .collect()
}

fn natural_width(kind: ChannelKind) -> u8 {
    match kind {
        ChannelKind::Region | ChannelKind::IsoEm | ChannelKind::NonIsoEm => 10,
        ChannelKind::HfRegion | ChannelKind::HfFineGrain => 8,
        ChannelKind::TauBits | ChannelKind::OverflowBits | ChannelKind::MipBits => 14,
    }
}

fn mp7_even_fields() -> Vec<FieldLayout> {
    let mut roles: Vec<(ChannelKind, u8)> = (0..14).map(|r| (ChannelKind::Region, r)).collect();
    roles.push((ChannelKind::TauBits, 0));
    roles.push((ChannelKind::OverflowBits, 0));
    mp7_lanes(&roles)
}

fn mp7_odd_fields() -> Vec<FieldLayout> {
    let mut roles: Vec<(ChannelKind, u8)> = (0..8).map(|i| (ChannelKind::HfRegion, i)).collect();
    roles.push((ChannelKind::HfFineGrain, 0));
    roles.extend((0..4).map(|i| (ChannelKind::IsoEm, i)));
    roles.extend((0..4).map(|i| (ChannelKind::NonIsoEm, i)));
    roles.push((ChannelKind::MipBits, 0));
    mp7_lanes(&roles)
}

/// One decodable slot of a link frame
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub field: FieldSpec,
    pub channel: Option<ChannelId>,
}

/// BC0 marker pair that must agree between a crate's two fibers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bc0Check {
    pub crate_id: u8,
    pub even_link: usize,
    pub even_field: FieldSpec,
    pub odd_link: usize,
    pub odd_field: FieldSpec,
}

/// Immutable (link, slot) -> channel table for one scheme
///
/// Lookup is a direct index into a per-link slot table.
#[derive(Debug, Clone)]
pub struct LinkMapping {
    scheme: MappingScheme,
    links: Vec<Vec<Slot>>,
    bc0_checks: Vec<Bc0Check>,
    channel_count: usize,
}

impl LinkMapping {
    /// Build the table for a scheme
    pub fn new(scheme: MappingScheme) -> Self {
        let mut links: Vec<Vec<Slot>> = vec![Vec::new(); NUM_LINKS];

        for crate_id in 0..NUM_CRATES {
            for fiber in [Fiber::Even, Fiber::Odd] {
                let link = scheme.link_for(crate_id, fiber);
                links[link] = scheme
                    .fields(fiber)
                    .into_iter()
                    .map(|layout| Slot {
                        field: layout.field,
                        channel: layout
                            .role
                            .map(|(kind, index)| ChannelId::new(crate_id as u8, kind, index)),
                    })
                    .collect();
            }
        }

        let bc0_checks = match scheme.cable4_bc0() {
            Some((even_field, odd_field)) => (0..NUM_CRATES)
                .map(|crate_id| Bc0Check {
                    crate_id: crate_id as u8,
                    even_link: scheme.link_for(crate_id, Fiber::Even),
                    even_field,
                    odd_link: scheme.link_for(crate_id, Fiber::Odd),
                    odd_field,
                })
                .collect(),
            None => Vec::new(),
        };

        let channel_count = links
            .iter()
            .flatten()
            .filter(|slot| slot.channel.is_some())
            .count();

        Self {
            scheme,
            links,
            bc0_checks,
            channel_count,
        }
    }

    /// Legacy CTP7 mapping
    pub fn legacy() -> Self {
        Self::new(MappingScheme::Legacy)
    }

    /// Alternate MP7 mapping
    pub fn mp7() -> Self {
        Self::new(MappingScheme::Mp7)
    }

    pub fn scheme(&self) -> MappingScheme {
        self.scheme
    }

    /// Resolve a (link, slot) pair; None if unmapped or out of range
    #[inline]
    pub fn resolve(&self, link: usize, slot: usize) -> Option<ChannelId> {
        self.links.get(link)?.get(slot)?.channel
    }

    /// Slots of one link in frame order
    pub fn slots(&self, link: usize) -> &[Slot] {
        self.links.get(link).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    pub fn words_per_frame(&self) -> usize {
        self.scheme.words_per_frame()
    }

    /// Words per bunch crossing across all links
    pub fn slice_width(&self) -> usize {
        self.num_links() * self.words_per_frame()
    }

    /// Per-crate fiber agreement checks (empty for MP7)
    pub fn bc0_checks(&self) -> &[Bc0Check] {
        &self.bc0_checks
    }

    /// Number of mapped channels per bunch crossing
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// All mapped channels in link/slot order
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.links
            .iter()
            .flatten()
            .filter_map(|slot| slot.channel)
    }
}
