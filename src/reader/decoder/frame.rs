//! Frame decoder: raw capture buffer -> digi collection
//!
//! The buffer is cut into crossing slices of `links * words_per_frame`
//! words. Within a slice each link owns a contiguous frame; every slot of
//! the link's layout is extracted and resolved through the mapping table.
//! Digis of a crate whose fibers disagree on the cable-4 BC0 marker are
//! emitted with `valid = false`.

use super::mapping::{FieldSpec, LinkMapping};
use crate::common::{
    ChannelId, DecoderError, DecoderResult, Digi, DigiCollection, RawBuffer, NUM_CRATES,
};
use tracing::warn;

/// One extracted field, reported to a [`DecodeObserver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTrace {
    pub bx: u32,
    pub link: usize,
    pub slot: usize,
    /// Frame word holding the field's lowest bit
    pub raw_word: u32,
    pub value: u16,
    /// None for unmapped slots
    pub channel: Option<ChannelId>,
}

/// Receives every extracted field in decode order
pub trait DecodeObserver {
    fn begin_crossing(&mut self, _bx: u32) {}

    fn field(&mut self, trace: &FieldTrace);
}

impl DecodeObserver for () {
    #[inline]
    fn field(&mut self, _trace: &FieldTrace) {}
}

/// Extract a field from a link frame
///
/// Bits are numbered little-endian across words, so a field may straddle
/// two adjacent words.
#[inline]
pub fn extract_bits(frame: &[u32], field: FieldSpec) -> u16 {
    let word = field.first_word();
    let shift = field.offset as u32 % 32;

    let low = frame.get(word).copied().unwrap_or(0) as u64;
    let high = frame.get(word + 1).copied().unwrap_or(0) as u64;
    let combined = low | (high << 32);

    let mask = (1u64 << field.width) - 1;
    ((combined >> shift) & mask) as u16
}

#[inline]
fn link_frame(slice: &[u32], link: usize, words_per_frame: usize) -> &[u32] {
    &slice[link * words_per_frame..(link + 1) * words_per_frame]
}

/// Decode a buffer against a mapping
pub fn decode(buffer: &RawBuffer, mapping: &LinkMapping) -> DecoderResult<DigiCollection> {
    decode_with(buffer, mapping, &mut ())
}

/// Decode a buffer, reporting every field (mapped or not) to `observer`
pub fn decode_with<O: DecodeObserver + ?Sized>(
    buffer: &RawBuffer,
    mapping: &LinkMapping,
    observer: &mut O,
) -> DecoderResult<DigiCollection> {
    let slice_width = mapping.slice_width();
    let words = buffer.words();

    if words.len() % slice_width != 0 {
        return Err(DecoderError::malformed(format!(
            "{} words is not a multiple of the {}-word crossing slice",
            words.len(),
            slice_width
        )));
    }

    let slices = words.len() / slice_width;
    if slices != buffer.crossings() as usize {
        return Err(DecoderError::malformed(format!(
            "buffer holds {} crossings, expected {}",
            slices,
            buffer.crossings()
        )));
    }

    let words_per_frame = mapping.words_per_frame();
    let mut digis = DigiCollection::with_capacity(slices, slices * mapping.channel_count());

    for slice in words.chunks_exact(slice_width) {
        let bx = digis.begin_crossing();
        observer.begin_crossing(bx);

        let mut crate_valid = [true; NUM_CRATES];
        for check in mapping.bc0_checks() {
            let even_frame = link_frame(slice, check.even_link, words_per_frame);
            let odd_frame = link_frame(slice, check.odd_link, words_per_frame);
            let even = extract_bits(even_frame, check.even_field);
            let odd = extract_bits(odd_frame, check.odd_field);
            if even != odd {
                warn!(
                    crate_id = check.crate_id,
                    bx,
                    even,
                    odd,
                    "Even and odd fibers disagree on cable 4 BC0"
                );
                crate_valid[check.crate_id as usize] = false;
            }
        }

        for (link, frame) in slice.chunks_exact(words_per_frame).enumerate() {
            for (slot_index, slot) in mapping.slots(link).iter().enumerate() {
                let value = extract_bits(frame, slot.field);

                observer.field(&FieldTrace {
                    bx,
                    link,
                    slot: slot_index,
                    raw_word: frame[slot.field.first_word()],
                    value,
                    channel: slot.channel,
                });

                if let Some(channel) = slot.channel {
                    digis.push(Digi {
                        valid: crate_valid[channel.crate_id as usize],
                        ..Digi::new(channel, bx, value)
                    });
                }
            }
        }
    }

    Ok(digis)
}
