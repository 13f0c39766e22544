//! Value-deduplicated blob storage.

use std::collections::HashMap;

use crate::utils::ByteSequenceComparer;

/// Append-only pool assigning one stable index per distinct byte sequence.
///
/// Blobs are compared by content, so adding equal bytes from different buffers yields
/// the same index. Indices are assigned sequentially from 0 and never change.
///
/// # Examples
///
/// ```rust
/// use readytorun::readytorun::BlobPool;
///
/// let mut pool = BlobPool::new();
/// assert_eq!(pool.add(&[1, 2, 3]), 0);
/// assert_eq!(pool.add(&[4, 5]), 1);
/// assert_eq!(pool.add(&vec![1, 2, 3]), 0);
/// assert_eq!(pool.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct BlobPool {
    index: HashMap<Vec<u8>, u32, ByteSequenceComparer>,
    blobs: Vec<Vec<u8>>,
}

impl Default for BlobPool {
    fn default() -> Self {
        Self::with_comparer(ByteSequenceComparer::new())
    }
}

impl BlobPool {
    /// Creates an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty pool keyed through `comparer`
    #[must_use]
    pub fn with_comparer(comparer: ByteSequenceComparer) -> Self {
        BlobPool {
            index: HashMap::with_hasher(comparer),
            blobs: Vec::new(),
        }
    }

    /// Returns the index of `blob`, adding it if no equal blob is present
    pub fn add(&mut self, blob: &[u8]) -> u32 {
        if let Some(&index) = self.index.get(blob) {
            return index;
        }
        let index = self.blobs.len() as u32;
        self.blobs.push(blob.to_vec());
        self.index.insert(blob.to_vec(), index);
        index
    }

    /// Like [`BlobPool::add`], passing an absent blob through as `None`
    pub fn add_optional(&mut self, blob: Option<&[u8]>) -> Option<u32> {
        blob.map(|blob| self.add(blob))
    }

    /// Blob stored at `index`
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&[u8]> {
        self.blobs.get(index as usize).map(Vec::as_slice)
    }

    /// Number of distinct blobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns `true` if nothing was added yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Blobs in index order
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.blobs.iter().map(Vec::as_slice)
    }
}
