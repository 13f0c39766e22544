//! Small shared helpers: byte-sequence identity, nibble encoding and alignment math.

mod bytes;
mod nibble;

pub use bytes::{ByteSequenceComparer, ByteSequenceHasher};
pub use nibble::NibbleWriter;

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two; an alignment of 0 or 1 returns `value` unchanged.
#[must_use]
pub fn align_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return value;
    }
    (value + alignment - 1) & !(alignment - 1)
}

/// Pads `data` with zero bytes until its length is a multiple of `alignment`.
pub fn pad_to_alignment(data: &mut Vec<u8>, alignment: usize) {
    let aligned = align_up(data.len(), alignment);
    data.resize(aligned, 0);
}
