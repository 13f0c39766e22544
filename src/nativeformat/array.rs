//! Sparse array vertex.
//!
//! The array is split into blocks of [`BLOCK_SIZE`] entries. The array vertex writes
//! `(count << 2) | index size` followed by one offset per block; each block is a binary
//! tree over the bits of the index inside the block:
//!
//! ```text
//! node  = unsigned: bit 0 - left child follows inline
//!                   bit 1 - right child at (value >> 2) bytes from the node start
//! leaf  = unsigned (index << 2) + item   a subtree collapsed to its single entry
//! ```
//!
//! Empty subtrees are omitted, so absent entries cost nothing. Blocks without any entry
//! share one placed null block that never matches a lookup.

use crate::nativeformat::writer::{NativeWriter, SavePhase, SectionId, VertexId, VertexKind};

/// Number of entries per block
pub const BLOCK_SIZE: u32 = 16;
/// log2 of [`BLOCK_SIZE`]
const BLOCK_DEPTH: u32 = 4;
/// Forward distance used before the target of a tree node has an offset
const UNRESOLVED_DELTA: u32 = 0x0400_0000;

#[derive(Debug)]
pub(crate) struct ArrayState {
    section: SectionId,
    entries: Vec<Option<VertexId>>,
    blocks: Vec<VertexId>,
    entry_index_size: u32,
}

struct Expanded {
    vertex: Option<VertexId>,
    is_leaf: bool,
}

impl NativeWriter {
    /// Creates an empty array whose blocks will be placed into `section`
    pub fn new_array(&mut self, section: SectionId) -> VertexId {
        self.add_vertex(VertexKind::Array(ArrayState {
            section,
            entries: Vec::new(),
            blocks: Vec::new(),
            entry_index_size: 2,
        }))
    }

    /// Stores `element` at `index`, growing the array with empty slots as needed.
    ///
    /// The element is embedded in the array's blocks and must not be placed itself.
    pub fn array_set(&mut self, array: VertexId, index: usize, element: VertexId) {
        if let VertexKind::Array(state) = &mut self.vertices[array.0].kind {
            if index >= state.entries.len() {
                state.entries.resize(index + 1, None);
            }
            state.entries[index] = Some(element);
        }
    }

    /// Builds and places the block trees; must run after the last [`NativeWriter::array_set`]
    pub fn array_expand_layout(&mut self, array: VertexId) {
        let mut kind = std::mem::take(&mut self.vertices[array.0].kind);
        if let VertexKind::Array(state) = &mut kind {
            let mut null_block = None;
            state.blocks.clear();

            let mut index = 0;
            while index < state.entries.len() {
                let expanded = self.expand_block(state, index, BLOCK_DEPTH, true);
                let block = match expanded.vertex {
                    Some(block) => block,
                    None => *null_block.get_or_insert_with(|| {
                        let null = self.add_vertex(VertexKind::NullBlock);
                        self.place(state.section, null)
                    }),
                };
                state.blocks.push(block);
                index += BLOCK_SIZE as usize;
            }
        }
        self.vertices[array.0].kind = kind;
    }

    fn expand_block(&mut self, state: &ArrayState, index: usize, depth: u32, place: bool) -> Expanded {
        let entry = |i: usize| state.entries.get(i).copied().flatten();
        let block_index = |i: usize| (i as u32) & (BLOCK_SIZE - 1);

        if depth == 1 {
            let first = entry(index);
            let second = entry(index + 1);

            return match (first, second) {
                (None, None) => Expanded {
                    vertex: None,
                    is_leaf: true,
                },
                (Some(item), None) | (None, Some(item)) => {
                    let at = if first.is_some() { index } else { index + 1 };
                    let leaf = self.add_vertex(VertexKind::Leaf {
                        item,
                        index: Some(block_index(at)),
                    });
                    if place {
                        self.place(state.section, leaf);
                    }
                    Expanded {
                        vertex: Some(leaf),
                        is_leaf: true,
                    }
                }
                (Some(first), Some(second)) => {
                    let first_leaf = self.add_vertex(VertexKind::Leaf {
                        item: first,
                        index: None,
                    });
                    let second_leaf = self.add_vertex(VertexKind::Leaf {
                        item: second,
                        index: None,
                    });
                    let tree = self.add_vertex(VertexKind::Tree {
                        first: Some(first_leaf),
                        second: Some(second_leaf),
                    });
                    if place {
                        self.place(state.section, tree);
                    }
                    self.place(state.section, second_leaf);
                    Expanded {
                        vertex: Some(tree),
                        is_leaf: false,
                    }
                }
            };
        }

        let tree = self.add_vertex(VertexKind::Tree {
            first: None,
            second: None,
        });
        if place {
            self.place(state.section, tree);
        }

        let first = self.expand_block(state, index, depth - 1, false);
        let second = self.expand_block(state, index + (1 << (depth - 1)), depth - 1, true);

        match (first.vertex, second.vertex) {
            (None, None) => {
                if place {
                    self.pop(state.section);
                }
                Expanded {
                    vertex: None,
                    is_leaf: true,
                }
            }
            (None, Some(leaf)) if second.is_leaf => {
                self.pop(state.section);
                if place {
                    self.pop(state.section);
                    self.place(state.section, leaf);
                }
                Expanded {
                    vertex: Some(leaf),
                    is_leaf: true,
                }
            }
            (Some(leaf), None) if first.is_leaf => {
                if place {
                    self.pop(state.section);
                    self.place(state.section, leaf);
                }
                Expanded {
                    vertex: Some(leaf),
                    is_leaf: true,
                }
            }
            (first, second) => {
                self.vertices[tree.0].kind = VertexKind::Tree { first, second };
                Expanded {
                    vertex: Some(tree),
                    is_leaf: false,
                }
            }
        }
    }

    pub(crate) fn save_array(&mut self, state: &mut ArrayState) {
        let header = ((state.entries.len() as u32) << 2) | state.entry_index_size;
        self.encoder.write_unsigned(header);

        let blocks_offset = self.current_offset();
        self.encoder
            .pad(state.blocks.len() << state.entry_index_size);

        let mut max_offset = 0;
        for (i, &block) in state.blocks.iter().enumerate() {
            let offset = self
                .resolved_offset(block)
                .map_or(0, |target| (target - blocks_offset).max(0));
            max_offset = max_offset.max(offset);

            let bytes = (offset as u32).to_le_bytes();
            let at = blocks_offset as usize + (i << state.entry_index_size);
            for (j, byte) in bytes.iter().take(1 << state.entry_index_size).enumerate() {
                self.encoder.patch_byte(at + j, *byte);
            }
        }

        let new_entry_index_size = if max_offset > 0xFFFF {
            2
        } else if max_offset > 0xFF {
            1
        } else {
            0
        };

        if self.is_growing() {
            if new_entry_index_size > state.entry_index_size {
                self.update_offset_adjustment(1);
                state.entry_index_size = new_entry_index_size;
            }
        } else if self.phase != SavePhase::Initial && new_entry_index_size < state.entry_index_size {
            // block offsets are unknown during the initial pass
            self.update_offset_adjustment(-1);
            state.entry_index_size = new_entry_index_size;
        }
    }

    pub(crate) fn save_tree(&mut self, first: Option<VertexId>, second: Option<VertexId>) {
        let start = self.current_offset();
        let mut value = u32::from(first.is_some());
        if let Some(second) = second {
            let delta = self
                .resolved_offset(second)
                .map_or(UNRESOLVED_DELTA, |target| (target - start).max(0) as u32);
            value |= 2 | (delta << 2);
        }
        self.encoder.write_unsigned(value);
        if let Some(first) = first {
            self.save_vertex(first);
        }
    }

    pub(crate) fn save_null_block(&mut self) {
        // an index outside the block never matches a lookup
        self.encoder.write_unsigned(BLOCK_SIZE << 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decodes one unsigned value, returning it and the offset after it
    fn decode_unsigned(bytes: &[u8], offset: usize) -> (u32, usize) {
        let b0 = u32::from(bytes[offset]);
        if b0 & 1 == 0 {
            (b0 >> 1, offset + 1)
        } else if b0 & 2 == 0 {
            ((b0 >> 2) | (u32::from(bytes[offset + 1]) << 6), offset + 2)
        } else if b0 & 4 == 0 {
            (
                (b0 >> 3) | (u32::from(bytes[offset + 1]) << 5) | (u32::from(bytes[offset + 2]) << 13),
                offset + 3,
            )
        } else if b0 & 8 == 0 {
            (
                (b0 >> 4)
                    | (u32::from(bytes[offset + 1]) << 4)
                    | (u32::from(bytes[offset + 2]) << 12)
                    | (u32::from(bytes[offset + 3]) << 20),
                offset + 4,
            )
        } else {
            let v = u32::from_le_bytes([
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
                bytes[offset + 4],
            ]);
            (v, offset + 5)
        }
    }

    /// Reads element `index` of the array starting at `offset` the way the runtime does
    fn lookup(bytes: &[u8], offset: usize, index: u32) -> Option<u32> {
        let (header, base) = decode_unsigned(bytes, offset);
        let count = header >> 2;
        let index_size = header & 3;
        if index >= count {
            return None;
        }

        let slot = base + (((index / BLOCK_SIZE) as usize) << index_size);
        let mut block = 0usize;
        for i in 0..(1usize << index_size) {
            block |= usize::from(bytes[slot + i]) << (8 * i);
        }
        let mut offset = base + block;

        let mut bit = BLOCK_SIZE >> 1;
        while bit > 0 {
            let (val, next) = decode_unsigned(bytes, offset);
            if index & bit != 0 {
                if val & 2 != 0 {
                    offset += (val >> 2) as usize;
                    bit >>= 1;
                    continue;
                }
            } else if val & 1 != 0 {
                offset = next;
                bit >>= 1;
                continue;
            }

            if val & 3 == 0 && (val >> 2) == (index & (BLOCK_SIZE - 1)) {
                offset = next;
                break;
            }
            return None;
        }

        Some(decode_unsigned(bytes, offset).0)
    }

    fn build(entries: &[(usize, u32)]) -> (Vec<u8>, usize, NativeWriter) {
        let mut writer = NativeWriter::new();
        let section = writer.new_section();
        let array = writer.new_array(section);
        writer.place(section, array);
        for &(index, value) in entries {
            let v = writer.new_unsigned(value);
            writer.array_set(array, index, v);
        }
        writer.array_expand_layout(array);
        let bytes = writer.save();
        let offset = writer.vertex_offset(array).unwrap();
        (bytes, offset, writer)
    }

    #[test]
    fn dense_entries_round_trip_through_lookup() {
        let entries: Vec<(usize, u32)> = (0..20).map(|i| (i, 100 + i as u32)).collect();
        let (bytes, offset, _) = build(&entries);
        for (index, value) in entries {
            assert_eq!(lookup(&bytes, offset, index as u32), Some(value), "index {index}");
        }
        assert_eq!(lookup(&bytes, offset, 20), None);
    }

    #[test]
    fn sparse_entries_skip_absent_slots() {
        let (bytes, offset, _) = build(&[(1, 11), (5, 55), (6, 66), (40, 4000)]);
        assert_eq!(lookup(&bytes, offset, 1), Some(11));
        assert_eq!(lookup(&bytes, offset, 5), Some(55));
        assert_eq!(lookup(&bytes, offset, 6), Some(66));
        assert_eq!(lookup(&bytes, offset, 40), Some(4000));
        for absent in [0, 2, 3, 4, 7, 15, 16, 20, 31, 32, 39] {
            assert_eq!(lookup(&bytes, offset, absent), None, "index {absent}");
        }
    }

    #[test]
    fn single_entry_collapses_to_leaf() {
        let (bytes, offset, _) = build(&[(5, 7)]);
        // header, one block index, then a leaf: (5 << 2) and the item
        assert_eq!(bytes[offset], (6 << 2) << 1);
        assert_eq!(lookup(&bytes, offset, 5), Some(7));
        assert_eq!(lookup(&bytes, offset, 4), None);
        assert_eq!(bytes.len(), 4);
    }

    #[test]
    fn empty_blocks_share_null_block() {
        let (bytes, offset, writer) = build(&[(70, 1)]);
        assert_eq!(lookup(&bytes, offset, 70), Some(1));
        for absent in [0, 17, 33, 50, 69] {
            assert_eq!(lookup(&bytes, offset, absent), None);
        }
        // array vertex, one null block, one leaf
        assert_eq!(writer.sections[0].len(), 3);
    }
}
