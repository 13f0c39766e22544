//! Nibble-granular encoder for method fixup lists.
//!
//! Values are written most-significant group first in 3-bit groups; every nibble except
//! the last carries the continuation bit `0x8`. Two nibbles share a byte, low half first.

/// Accumulates nibbles and flushes them into bytes.
#[derive(Debug, Default)]
pub struct NibbleWriter {
    data: Vec<u8>,
    pending: Option<u8>,
}

impl NibbleWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a single nibble (only the low 4 bits of `nibble` are used).
    pub fn write_nibble(&mut self, nibble: u8) {
        let nibble = nibble & 0x0F;
        match self.pending.take() {
            Some(low) => self.data.push(low | (nibble << 4)),
            None => self.pending = Some(nibble),
        }
    }

    /// Appends `value` in the variable-length 3-bit group encoding.
    pub fn write_unsigned(&mut self, value: u32) {
        let mut groups = 0;
        let mut rest = value >> 3;
        while rest != 0 {
            groups += 1;
            rest >>= 3;
        }

        for i in (1..=groups).rev() {
            self.write_nibble((((value >> (3 * i)) & 0x7) | 0x8) as u8);
        }
        self.write_nibble((value & 0x7) as u8);
    }

    /// Finishes the stream, padding a trailing half byte with zero.
    #[must_use]
    pub fn into_bytes(mut self) -> Vec<u8> {
        if let Some(low) = self.pending.take() {
            self.data.push(low);
        }
        self.data
    }
}
