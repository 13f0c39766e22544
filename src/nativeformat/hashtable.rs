//! Hashtable vertex.
//!
//! Layout, starting at the vertex:
//!
//! ```text
//! u8                       (log2(bucket count) << 2) | entry index size
//! index[bucket count + 1]  1, 2 or 4 byte offsets of each bucket's first entry,
//!                          relative to the start of the index table
//! entries                  per entry: low byte of the hash, signed relative offset
//!                          of the entry's vertex
//! ```
//!
//! Entries are bucketed by bits 8 and up of the hash and sorted by the low byte inside
//! a bucket so lookups can stop early.

use crate::nativeformat::writer::{NativeWriter, VertexId, VertexKind};

/// Average number of entries per bucket the layout aims for
const FILL_FACTOR: usize = 13;

#[derive(Debug, Clone, Copy)]
struct HashtableEntry {
    hashcode: u32,
    vertex: VertexId,
    offset: i64,
}

#[derive(Debug, Default)]
pub(crate) struct HashtableState {
    entries: Vec<HashtableEntry>,
    buckets: u32,
    entry_index_size: u32,
}

/// Returns 1 + floor(log2(x)), or 0 for 0
fn highest_bit(mut x: u32) -> u32 {
    let mut bits = 0;
    while x != 0 {
        x >>= 1;
        bits += 1;
    }
    bits
}

fn patch_entry_index(writer: &mut NativeWriter, offset: usize, size: u32, value: i64) {
    let bytes = (value as u32).to_le_bytes();
    for i in 0..(1usize << size) {
        writer.encoder.patch_byte(offset + i, bytes[i]);
    }
}

impl HashtableState {
    fn compute_layout(&mut self) {
        let estimate = (self.entries.len() / FILL_FACTOR) as u32;
        self.buckets = 1 << highest_bit(estimate);

        let mask = ((self.buckets - 1) << 8) | 0xFF;
        self.entries.sort_by_key(|entry| entry.hashcode & mask);

        // start with the widest index entries and let the save loop shrink them
        self.entry_index_size = 2;
    }
}

impl NativeWriter {
    /// Creates an empty hashtable vertex
    pub fn new_hashtable(&mut self) -> VertexId {
        self.add_vertex(VertexKind::Hashtable(HashtableState::default()))
    }

    /// Adds `element` under `hashcode`.
    ///
    /// The element must be placed in a section; the table refers to it by offset.
    /// Colliding hash codes are allowed and kept as separate entries.
    pub fn hashtable_append(&mut self, table: VertexId, hashcode: u32, element: VertexId) {
        if let VertexKind::Hashtable(state) = &mut self.vertices[table.0].kind {
            state.entries.push(HashtableEntry {
                hashcode,
                vertex: element,
                offset: -1,
            });
            state.buckets = 0;
        }
    }

    pub(crate) fn save_hashtable(&mut self, state: &mut HashtableState) {
        if state.buckets == 0 {
            state.compute_layout();
        }

        let bucket_mask = state.buckets - 1;
        let buckets_shift = highest_bit(state.buckets) - 1;
        self.encoder
            .write_byte(((buckets_shift << 2) | state.entry_index_size) as u8);

        let buckets_offset = self.current_offset();
        self.encoder
            .pad(((state.buckets + 1) as usize) << state.entry_index_size);

        // the first bucket's index is redundant but kept for faster lookups
        let first = self.current_offset() - buckets_offset;
        patch_entry_index(self, buckets_offset as usize, state.entry_index_size, first);

        let mut entry_index = 0;
        for bucket in 0..state.buckets {
            while entry_index < state.entries.len() {
                let entry = state.entries[entry_index];
                if (entry.hashcode >> 8) & bucket_mask != bucket {
                    break;
                }

                let current = self.current_offset();
                self.update_offset_adjustment(current - entry.offset);
                state.entries[entry_index].offset = current;

                self.encoder.write_byte(entry.hashcode as u8);
                self.write_relative_offset(entry.vertex);
                entry_index += 1;
            }

            let patch_offset = buckets_offset as usize + (((bucket + 1) as usize) << state.entry_index_size);
            let value = self.current_offset() - buckets_offset;
            patch_entry_index(self, patch_offset, state.entry_index_size, value);
        }

        let max_index_entry = self.current_offset() - buckets_offset;
        let new_entry_index_size = if max_index_entry > 0xFFFF {
            2
        } else if max_index_entry > 0xFF {
            1
        } else {
            0
        };

        if self.is_growing() {
            if new_entry_index_size > state.entry_index_size {
                // force another pass with the wider index
                self.update_offset_adjustment(1);
                state.entry_index_size = new_entry_index_size;
            }
        } else if new_entry_index_size < state.entry_index_size {
            self.update_offset_adjustment(-1);
            state.entry_index_size = new_entry_index_size;
        }
    }
}
