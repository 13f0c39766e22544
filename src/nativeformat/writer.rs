//! Arena of vertices, sections and the offset-resolving save loop.
//!
//! Vertices live in an arena owned by the [`NativeWriter`] and are addressed by
//! [`VertexId`]. A vertex is either *placed* in a [`SectionId`] (it is written at top
//! level in placement order and other vertices may refer to its offset) or *embedded*
//! (it is written inline by the vertex that owns it).
//!
//! Offsets between placed vertices are variable-length encoded, so the final layout is
//! found iteratively: an initial pass writes conservative encodings, a shrinking phase
//! lets offsets move down until stable (bounded), and a growing phase that pads instead
//! of moving down is guaranteed to converge.

use crate::nativeformat::{
    array::ArrayState, encoder::NativeEncoder, hashtable::HashtableState,
};

/// Maximum number of shrinking iterations before switching to the growing phase
const MAX_SHRINK_ITERATIONS: u32 = 10;

/// Handle of a vertex inside a [`NativeWriter`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub(crate) usize);

/// Handle of a section inside a [`NativeWriter`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SectionId(pub(crate) usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SavePhase {
    Initial,
    Shrinking,
    Growing,
}

#[derive(Debug, Default)]
pub(crate) enum VertexKind {
    /// Temporarily moved out of the arena while being saved
    #[default]
    Detached,
    Unsigned(u32),
    Signed(i32),
    Blob(Vec<u8>),
    Tuple(Vec<VertexId>),
    EntryPoint {
        method_index: u32,
        fixups: Option<VertexId>,
    },
    EntryPointWithBlob {
        method_index: u32,
        fixups: Option<VertexId>,
        blob: Vec<u8>,
    },
    Hashtable(HashtableState),
    Array(ArrayState),
    Tree {
        first: Option<VertexId>,
        second: Option<VertexId>,
    },
    Leaf {
        item: VertexId,
        index: Option<u32>,
    },
    NullBlock,
}

#[derive(Debug)]
pub(crate) struct VertexSlot {
    pub(crate) kind: VertexKind,
    pub(crate) offset: i64,
    pub(crate) iteration: Option<u32>,
}

/// Builder and serializer for native layout data
#[derive(Debug)]
pub struct NativeWriter {
    pub(crate) sections: Vec<Vec<VertexId>>,
    pub(crate) vertices: Vec<VertexSlot>,
    pub(crate) encoder: NativeEncoder,
    pub(crate) phase: SavePhase,
    pub(crate) iteration: u32,
    pub(crate) offset_adjustment: i64,
    padding: usize,
}

impl Default for NativeWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeWriter {
    /// Creates an empty writer
    #[must_use]
    pub fn new() -> Self {
        NativeWriter {
            sections: Vec::new(),
            vertices: Vec::new(),
            encoder: NativeEncoder::new(),
            phase: SavePhase::Initial,
            iteration: 0,
            offset_adjustment: 0,
            padding: 0,
        }
    }

    /// Appends a new section; sections are written in creation order
    pub fn new_section(&mut self) -> SectionId {
        self.sections.push(Vec::new());
        SectionId(self.sections.len() - 1)
    }

    pub(crate) fn add_vertex(&mut self, kind: VertexKind) -> VertexId {
        self.vertices.push(VertexSlot {
            kind,
            offset: -1,
            iteration: None,
        });
        VertexId(self.vertices.len() - 1)
    }

    /// Places `vertex` at the end of `section`
    pub fn place(&mut self, section: SectionId, vertex: VertexId) -> VertexId {
        self.sections[section.0].push(vertex);
        vertex
    }

    /// Removes the most recently placed vertex of `section`
    pub fn pop(&mut self, section: SectionId) -> Option<VertexId> {
        self.sections[section.0].pop()
    }

    /// Creates a raw byte blob vertex
    pub fn new_blob(&mut self, bytes: Vec<u8>) -> VertexId {
        self.add_vertex(VertexKind::Blob(bytes))
    }

    /// Creates an unsigned constant vertex
    pub fn new_unsigned(&mut self, value: u32) -> VertexId {
        self.add_vertex(VertexKind::Unsigned(value))
    }

    /// Creates a signed constant vertex
    pub fn new_signed(&mut self, value: i32) -> VertexId {
        self.add_vertex(VertexKind::Signed(value))
    }

    /// Creates a vertex writing `items` back to back
    pub fn new_tuple(&mut self, items: Vec<VertexId>) -> VertexId {
        self.add_vertex(VertexKind::Tuple(items))
    }

    /// Creates a method entry point.
    ///
    /// `fixups` must be a blob placed before the entry point; it is referenced by a
    /// backward offset.
    pub fn new_entry_point(&mut self, method_index: u32, fixups: Option<VertexId>) -> VertexId {
        self.add_vertex(VertexKind::EntryPoint {
            method_index,
            fixups,
        })
    }

    /// Creates a method entry point preceded by an inline signature blob
    pub fn new_entry_point_with_blob(
        &mut self,
        method_index: u32,
        fixups: Option<VertexId>,
        blob: Vec<u8>,
    ) -> VertexId {
        self.add_vertex(VertexKind::EntryPointWithBlob {
            method_index,
            fixups,
            blob,
        })
    }

    /// Offset at which a placed vertex was written by the last [`NativeWriter::save`]
    #[must_use]
    pub fn vertex_offset(&self, vertex: VertexId) -> Option<usize> {
        let slot = self.vertices.get(vertex.0)?;
        slot.iteration.map(|_| slot.offset as usize)
    }

    /// Bytes of padding inserted by the last growing pass
    #[must_use]
    pub fn padding(&self) -> usize {
        self.padding
    }

    pub(crate) fn current_offset(&self) -> i64 {
        self.encoder.len() as i64
    }

    pub(crate) fn is_growing(&self) -> bool {
        self.phase == SavePhase::Growing
    }

    /// Records that some offset in the current pass moved by `delta`
    pub(crate) fn update_offset_adjustment(&mut self, delta: i64) {
        match self.phase {
            SavePhase::Shrinking => self.offset_adjustment = self.offset_adjustment.min(delta),
            SavePhase::Growing => self.offset_adjustment = self.offset_adjustment.max(delta),
            SavePhase::Initial => {}
        }
    }

    /// Best estimate of a placed vertex's offset in the current pass
    pub(crate) fn resolved_offset(&self, vertex: VertexId) -> Option<i64> {
        let slot = &self.vertices[vertex.0];
        let iteration = slot.iteration?;
        let mut offset = slot.offset;
        if iteration < self.iteration {
            offset += self.offset_adjustment;
        }
        Some(offset)
    }

    /// Writes the signed distance from the current position to `target`
    pub(crate) fn write_relative_offset(&mut self, target: VertexId) {
        match self.resolved_offset(target) {
            Some(offset) => {
                let delta = offset - self.current_offset();
                self.encoder.write_signed(delta as i32);
            }
            None => self.encoder.write_signed(i32::MAX),
        }
    }

    pub(crate) fn save_vertex(&mut self, vertex: VertexId) {
        let mut kind = std::mem::take(&mut self.vertices[vertex.0].kind);
        match &mut kind {
            VertexKind::Detached => {}
            VertexKind::Unsigned(value) => self.encoder.write_unsigned(*value),
            VertexKind::Signed(value) => self.encoder.write_signed(*value),
            VertexKind::Blob(bytes) => self.encoder.write_bytes(bytes),
            VertexKind::Tuple(items) => {
                for item in items.iter() {
                    self.save_vertex(*item);
                }
            }
            VertexKind::EntryPoint {
                method_index,
                fixups,
            } => self.save_entry_point(*method_index, *fixups),
            VertexKind::EntryPointWithBlob {
                method_index,
                fixups,
                blob,
            } => {
                self.encoder.write_bytes(blob);
                self.save_entry_point(*method_index, *fixups);
            }
            VertexKind::Hashtable(state) => self.save_hashtable(state),
            VertexKind::Array(state) => self.save_array(state),
            VertexKind::Tree { first, second } => self.save_tree(*first, *second),
            VertexKind::Leaf { item, index } => {
                if let Some(index) = index {
                    self.encoder.write_unsigned(*index << 2);
                }
                self.save_vertex(*item);
            }
            VertexKind::NullBlock => self.save_null_block(),
        }
        self.vertices[vertex.0].kind = kind;
    }

    fn save_entry_point(&mut self, method_index: u32, fixups: Option<VertexId>) {
        match fixups {
            Some(blob) => {
                self.encoder.write_unsigned((method_index << 2) | 3);
                let delta = self
                    .resolved_offset(blob)
                    .map_or(u32::MAX, |target| (self.current_offset() - target).max(0) as u32);
                self.encoder.write_unsigned(delta);
            }
            None => self.encoder.write_unsigned(method_index << 1),
        }
    }

    fn placed_vertices(&self) -> Vec<VertexId> {
        self.sections.iter().flatten().copied().collect()
    }

    /// Lays out and serializes every placed vertex.
    ///
    /// Can be called again after more vertices were placed; the layout is recomputed.
    pub fn save(&mut self) -> Vec<u8> {
        let placed = self.placed_vertices();

        self.encoder.clear();
        self.phase = SavePhase::Initial;
        self.iteration = 0;
        self.offset_adjustment = 0;
        for &vertex in &placed {
            let offset = self.current_offset();
            let slot = &mut self.vertices[vertex.0];
            slot.offset = offset;
            slot.iteration = Some(0);
            self.save_vertex(vertex);
        }

        self.phase = SavePhase::Shrinking;
        loop {
            self.iteration += 1;
            self.encoder.clear();
            self.offset_adjustment = 0;

            for &vertex in &placed {
                let current = self.current_offset();
                self.offset_adjustment = self
                    .offset_adjustment
                    .min(current - self.vertices[vertex.0].offset);
                let offset = self.vertices[vertex.0].offset + self.offset_adjustment;
                if offset < current {
                    // A relative offset grew in this pass; it disappears again next time.
                    self.encoder.rollback_to(offset as usize);
                }
                let slot = &mut self.vertices[vertex.0];
                slot.offset = offset;
                slot.iteration = Some(self.iteration);
                self.save_vertex(vertex);
            }

            if self.offset_adjustment == 0 || self.iteration > MAX_SHRINK_ITERATIONS {
                break;
            }
        }

        self.phase = SavePhase::Growing;
        loop {
            self.iteration += 1;
            self.encoder.clear();
            self.offset_adjustment = 0;
            self.padding = 0;

            for &vertex in &placed {
                let current = self.current_offset();
                self.offset_adjustment = self
                    .offset_adjustment
                    .max(current - self.vertices[vertex.0].offset);
                let offset = self.vertices[vertex.0].offset + self.offset_adjustment;
                if offset > current {
                    let padding = (offset - current) as usize;
                    self.padding += padding;
                    self.encoder.pad(padding);
                }
                let slot = &mut self.vertices[vertex.0];
                slot.offset = offset;
                slot.iteration = Some(self.iteration);
                self.save_vertex(vertex);
            }

            if self.offset_adjustment == 0 {
                return self.encoder.as_bytes().to_vec();
            }
        }
    }
}
