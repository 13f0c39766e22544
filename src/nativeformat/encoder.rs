//! Byte-level encoder for the native layout format.
//!
//! Unsigned values use a prefix-length encoding in the low bits of the first byte:
//!
//! | range            | first byte         | total size |
//! |------------------|--------------------|------------|
//! | `< 2^7`          | `v << 1`           | 1          |
//! | `< 2^14`         | `(v << 2) \| 0b01` | 2          |
//! | `< 2^21`         | `(v << 3) \| 0b011`| 3          |
//! | `< 2^28`         | `(v << 4) \| 0b0111`| 4         |
//! | otherwise        | `0x0F` + `u32` LE  | 5          |
//!
//! Signed values use the same layout over a biased range.

/// Growable byte buffer with native-format primitive writers
#[derive(Debug, Default, Clone)]
pub struct NativeEncoder {
    buffer: Vec<u8>,
}

impl NativeEncoder {
    /// Creates an empty encoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discards all written bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Truncates the buffer back to `offset`
    pub fn rollback_to(&mut self, offset: usize) {
        self.buffer.truncate(offset);
    }

    /// Appends one byte
    pub fn write_byte(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Appends raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Appends a little-endian `u16`
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `u32`
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends `count` zero bytes
    pub fn pad(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0);
    }

    /// Overwrites a previously written byte
    pub fn patch_byte(&mut self, offset: usize, value: u8) {
        if let Some(slot) = self.buffer.get_mut(offset) {
            *slot = value;
        }
    }

    /// Appends an unsigned value in the variable-length encoding
    pub fn write_unsigned(&mut self, value: u32) {
        if value < 0x80 {
            self.write_byte((value << 1) as u8);
        } else if value < 0x4000 {
            self.write_byte(((value << 2) | 0x1) as u8);
            self.write_byte((value >> 6) as u8);
        } else if value < 0x20_0000 {
            self.write_byte(((value << 3) | 0x3) as u8);
            self.write_byte((value >> 5) as u8);
            self.write_byte((value >> 13) as u8);
        } else if value < 0x1000_0000 {
            self.write_byte(((value << 4) | 0x7) as u8);
            self.write_byte((value >> 4) as u8);
            self.write_byte((value >> 12) as u8);
            self.write_byte((value >> 20) as u8);
        } else {
            self.write_byte(0x0F);
            self.write_u32(value);
        }
    }

    /// Appends a signed value in the variable-length encoding
    pub fn write_signed(&mut self, value: i32) {
        let v = value as u32;
        if (value.wrapping_add(0x40) as u32) < 0x80 {
            self.write_byte((v << 1) as u8);
        } else if (value.wrapping_add(0x2000) as u32) < 0x4000 {
            self.write_byte(((v << 2) | 0x1) as u8);
            self.write_byte((value >> 6) as u8);
        } else if (value.wrapping_add(0x10_0000) as u32) < 0x20_0000 {
            self.write_byte(((v << 3) | 0x3) as u8);
            self.write_byte((value >> 5) as u8);
            self.write_byte((value >> 13) as u8);
        } else if (value.wrapping_add(0x800_0000) as u32) < 0x1000_0000 {
            self.write_byte(((v << 4) | 0x7) as u8);
            self.write_byte((value >> 4) as u8);
            self.write_byte((value >> 12) as u8);
            self.write_byte((value >> 20) as u8);
        } else {
            self.write_byte(0x0F);
            self.write_u32(v);
        }
    }

    /// The written bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the encoder, returning the written bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Size in bytes of `value` in the unsigned variable-length encoding
#[must_use]
pub fn unsigned_encoding_size(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsigned(value: u32) -> Vec<u8> {
        let mut enc = NativeEncoder::new();
        enc.write_unsigned(value);
        enc.into_bytes()
    }

    fn signed(value: i32) -> Vec<u8> {
        let mut enc = NativeEncoder::new();
        enc.write_signed(value);
        enc.into_bytes()
    }

    #[test]
    fn unsigned_boundaries() {
        assert_eq!(unsigned(0), vec![0x00]);
        assert_eq!(unsigned(0x7F), vec![0xFE]);
        assert_eq!(unsigned(0x80), vec![0x01, 0x02]);
        assert_eq!(unsigned(0x3FFF), vec![0xFD, 0xFF]);
        assert_eq!(unsigned(0x4000), vec![0x03, 0x00, 0x02]);
        assert_eq!(unsigned(0x1000_0000), vec![0x0F, 0x00, 0x00, 0x00, 0x10]);
    }

    #[test]
    fn unsigned_sizes_agree_with_encoding() {
        for value in [0, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000, 0x0FFF_FFFF, u32::MAX] {
            assert_eq!(unsigned(value).len(), unsigned_encoding_size(value), "value {value:#x}");
        }
    }

    #[test]
    fn signed_boundaries() {
        assert_eq!(signed(0), vec![0x00]);
        assert_eq!(signed(-1), vec![0xFE]);
        assert_eq!(signed(63), vec![0x7E]);
        assert_eq!(signed(-64), vec![0x80]);
        assert_eq!(signed(64).len(), 2);
        assert_eq!(signed(-65).len(), 2);
        assert_eq!(signed(i32::MAX).len(), 5);
        assert_eq!(signed(i32::MIN).len(), 5);
    }

    #[test]
    fn patch_and_rollback() {
        let mut enc = NativeEncoder::new();
        enc.write_u32(0x0403_0201);
        enc.patch_byte(0, 0xAA);
        assert_eq!(enc.as_bytes(), &[0xAA, 0x02, 0x03, 0x04]);
        enc.rollback_to(2);
        assert_eq!(enc.len(), 2);
        enc.pad(3);
        assert_eq!(enc.as_bytes(), &[0xAA, 0x02, 0, 0, 0]);
    }
}
