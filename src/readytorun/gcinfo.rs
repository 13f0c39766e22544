//! Deduplicated GC-info storage.

use std::collections::HashMap;

use crate::utils::ByteSequenceComparer;

/// Concatenation of distinct GC-info blobs.
///
/// GC info is referenced by absolute byte offset, so [`GcInfoPool::add`] returns where a
/// blob starts in the final buffer. Methods with identical GC info share one copy.
///
/// # Examples
///
/// ```rust
/// use readytorun::readytorun::GcInfoPool;
///
/// let mut pool = GcInfoPool::new();
/// assert_eq!(pool.add(&[1, 2, 3]), 0);
/// assert_eq!(pool.add(&[4]), 3);
/// assert_eq!(pool.add(&[1, 2, 3]), 0);
/// assert_eq!(pool.data(), &[1, 2, 3, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct GcInfoPool {
    offsets: HashMap<Vec<u8>, usize, ByteSequenceComparer>,
    data: Vec<u8>,
}

impl Default for GcInfoPool {
    fn default() -> Self {
        GcInfoPool {
            offsets: HashMap::with_hasher(ByteSequenceComparer::new()),
            data: Vec::new(),
        }
    }
}

impl GcInfoPool {
    /// Creates an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the offset of `blob`, appending it if no equal blob is present
    pub fn add(&mut self, blob: &[u8]) -> usize {
        if let Some(&offset) = self.offsets.get(blob) {
            return offset;
        }
        let offset = self.data.len();
        self.data.extend_from_slice(blob);
        self.offsets.insert(blob.to_vec(), offset);
        offset
    }

    /// The concatenated blobs
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the concatenated blobs in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing was added yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
