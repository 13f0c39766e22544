//! Content identity for byte sequences.
//!
//! Every place that deduplicates binary blobs by value (fixup lists, signatures, GC info)
//! keys its map through [`ByteSequenceComparer`]. The comparer is an ordinary value: the
//! owner of a map constructs one and hands it to the map as its [`BuildHasher`], so no
//! process-wide state is involved.
//!
//! The hash mixes the length first and then folds every byte:
//!
//! ```text
//! hash = 5381 + (len << 7)
//! for b in bytes: hash = ((hash << 5) + hash) ^ b
//! ```

use std::hash::{BuildHasher, Hasher};

/// Equality and hashing strategy for variable-length byte sequences.
///
/// # Examples
///
/// ```rust
/// use readytorun::utils::ByteSequenceComparer;
/// use std::collections::HashMap;
///
/// let comparer = ByteSequenceComparer::new();
/// assert!(comparer.equals(&[1, 2, 3], &vec![1, 2, 3]));
/// assert_eq!(comparer.hash_code(&[1, 2, 3]), comparer.hash_code(&[1, 2, 3]));
///
/// let mut map: HashMap<Vec<u8>, usize, ByteSequenceComparer> = HashMap::with_hasher(comparer);
/// map.insert(vec![1, 2, 3], 0);
/// assert_eq!(map.get([1u8, 2, 3].as_slice()), Some(&0));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct ByteSequenceComparer;

impl ByteSequenceComparer {
    /// Creates a comparer.
    #[must_use]
    pub const fn new() -> Self {
        ByteSequenceComparer
    }

    /// Returns `true` if both sequences have the same length and identical bytes.
    ///
    /// Two slices over the same memory compare equal without looking at the contents.
    #[must_use]
    pub fn equals(&self, a: &[u8], b: &[u8]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        if std::ptr::eq(a.as_ptr(), b.as_ptr()) {
            return true;
        }
        a == b
    }

    /// Computes the content hash of `bytes`.
    #[must_use]
    pub fn hash_code(&self, bytes: &[u8]) -> i32 {
        let mut hasher = ByteSequenceHasher::default();
        hasher.begin(bytes.len());
        hasher.fold(bytes);
        hasher.state
    }
}

impl BuildHasher for ByteSequenceComparer {
    type Hasher = ByteSequenceHasher;

    fn build_hasher(&self) -> Self::Hasher {
        ByteSequenceHasher::default()
    }
}

/// Streaming form of [`ByteSequenceComparer::hash_code`].
///
/// `Hash for [u8]` writes the length prefix through `write_usize` before the bytes, which
/// seeds the state exactly like the one-shot function does.
#[derive(Clone, Copy, Debug)]
pub struct ByteSequenceHasher {
    state: i32,
}

impl Default for ByteSequenceHasher {
    fn default() -> Self {
        ByteSequenceHasher { state: 5381 }
    }
}

impl ByteSequenceHasher {
    fn begin(&mut self, len: usize) {
        self.state = 5381_i32.wrapping_add((len as i32).wrapping_shl(7));
    }

    fn fold(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state = (self.state.wrapping_shl(5).wrapping_add(self.state)) ^ i32::from(b);
        }
    }
}

impl Hasher for ByteSequenceHasher {
    fn finish(&self) -> u64 {
        u64::from(self.state as u32)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.fold(bytes);
    }

    fn write_usize(&mut self, len: usize) {
        self.begin(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn equals_compares_content() {
        let cmp = ByteSequenceComparer::new();
        let a = vec![1u8, 2, 3];
        let b = vec![1u8, 2, 3];
        assert!(cmp.equals(&a, &b));
        assert!(cmp.equals(&a, &a));
        assert!(!cmp.equals(&a, &[1, 2]));
        assert!(!cmp.equals(&a, &[1, 2, 4]));
        assert!(cmp.equals(&[], &[]));
    }

    #[test]
    fn hash_code_known_values() {
        let cmp = ByteSequenceComparer::new();
        assert_eq!(cmp.hash_code(&[]), 5381);
        assert_eq!(cmp.hash_code(&[1, 2, 3]) as u32, 0x0c59_4065);
    }

    #[test]
    fn hash_depends_on_length() {
        let cmp = ByteSequenceComparer::new();
        assert_ne!(cmp.hash_code(&[0]), cmp.hash_code(&[0, 0]));
    }

    #[test]
    fn build_hasher_matches_hash_code() {
        let cmp = ByteSequenceComparer::new();
        let bytes: &[u8] = &[9, 8, 7, 6, 5];
        assert_eq!(
            cmp.hash_one(bytes),
            u64::from(cmp.hash_code(bytes) as u32)
        );
    }

    #[test]
    fn usable_as_map_hasher() {
        let mut map: HashMap<Vec<u8>, usize, ByteSequenceComparer> =
            HashMap::with_hasher(ByteSequenceComparer::new());
        map.insert(vec![1, 2, 3], 0);
        map.insert(vec![4, 5], 1);
        assert_eq!(map.get([1u8, 2, 3].as_slice()), Some(&0));
        assert_eq!(map.get(vec![4u8, 5].as_slice()), Some(&1));
        assert_eq!(map.get([4u8].as_slice()), None);
    }
}
