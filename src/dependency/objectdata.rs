//! Final bytes of a node: payload, relocations and defined symbols.

use strum::Display;

use crate::{dependency::NodeId, utils::pad_to_alignment};

/// Output section a node's data is placed in
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum ObjectNodeSection {
    /// Executable code: method bodies and import thunks
    Text,
    /// Read-only data: tables on targets that map them read-only
    ReadOnlyData,
    /// Writable data: import cells, and tables on non-Windows targets
    Data,
}

/// How a relocation's target address is written into the data
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum RelocationKind {
    /// 32-bit image-relative address (RVA)
    Addr32Nb,
    /// 32-bit displacement relative to the end of the relocated field
    Rel32,
    /// 32-bit size of the target symbol's data
    SymbolSize,
    /// 64-bit absolute address
    Dir64,
    /// 32-bit absolute address
    HighLow,
}

impl RelocationKind {
    /// Number of bytes the relocation patches
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            RelocationKind::Dir64 => 8,
            RelocationKind::Addr32Nb
            | RelocationKind::Rel32
            | RelocationKind::SymbolSize
            | RelocationKind::HighLow => 4,
        }
    }
}

/// A reference from a node's data to another node's symbol.
///
/// The addend is not stored here; it is the little-endian value already present in the
/// data at `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Relocation {
    /// Offset of the patched field within the node's data
    pub offset: usize,
    /// Encoding of the patched field
    pub kind: RelocationKind,
    /// Symbol the field refers to
    pub target: NodeId,
}

/// Bytes, relocations and symbol definitions produced by a node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectData {
    /// Raw payload
    pub data: Vec<u8>,
    /// Required alignment of the payload's start
    pub alignment: usize,
    /// Fields patched with symbol addresses at link time
    pub relocs: Vec<Relocation>,
    /// Symbols defined at offsets of the payload, the node's own symbol at 0 included
    pub defined_symbols: Vec<(NodeId, usize)>,
}

impl ObjectData {
    /// Data with no relocations that defines only the owning node's symbol
    #[must_use]
    pub fn blob(owner: NodeId, data: Vec<u8>, alignment: usize) -> Self {
        ObjectData {
            data,
            alignment,
            relocs: Vec::new(),
            defined_symbols: vec![(owner, 0)],
        }
    }

    /// Payload size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for an empty payload
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Incremental builder for [`ObjectData`].
///
/// # Examples
///
/// ```rust
/// use readytorun::dependency::{NodeId, ObjectDataBuilder, RelocationKind};
///
/// let mut builder = ObjectDataBuilder::new(NodeId::new(0), 4);
/// builder.emit_u32(0x0052_5452);
/// builder.emit_reloc(RelocationKind::Addr32Nb, NodeId::new(7), 0);
/// let data = builder.finish();
///
/// assert_eq!(data.data.len(), 8);
/// assert_eq!(data.relocs[0].offset, 4);
/// ```
#[derive(Debug)]
pub struct ObjectDataBuilder {
    data: ObjectData,
}

impl ObjectDataBuilder {
    /// Starts the data of `owner`, whose symbol is defined at offset 0
    #[must_use]
    pub fn new(owner: NodeId, alignment: usize) -> Self {
        ObjectDataBuilder {
            data: ObjectData {
                data: Vec::new(),
                alignment,
                relocs: Vec::new(),
                defined_symbols: vec![(owner, 0)],
            },
        }
    }

    /// Current offset
    #[must_use]
    pub fn position(&self) -> usize {
        self.data.data.len()
    }

    /// Appends one byte
    pub fn emit_u8(&mut self, value: u8) {
        self.data.data.push(value);
    }

    /// Appends a little-endian `u16`
    pub fn emit_u16(&mut self, value: u16) {
        self.data.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `u32`
    pub fn emit_u32(&mut self, value: u32) {
        self.data.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `u64`
    pub fn emit_u64(&mut self, value: u64) {
        self.data.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends raw bytes
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.data.data.extend_from_slice(bytes);
    }

    /// Appends `count` zero bytes
    pub fn emit_zeros(&mut self, count: usize) {
        self.data.data.resize(self.data.data.len() + count, 0);
    }

    /// Appends a relocated field holding `addend`
    pub fn emit_reloc(&mut self, kind: RelocationKind, target: NodeId, addend: i32) {
        let offset = self.position();
        match kind {
            RelocationKind::Dir64 => self.emit_u64(i64::from(addend) as u64),
            _ => self.emit_u32(addend as u32),
        }
        self.data.relocs.push(Relocation { offset, kind, target });
    }

    /// Appends a pointer-sized field relocated to `target`
    pub fn emit_pointer_reloc(&mut self, target: NodeId, pointer_size: usize) {
        if pointer_size == 8 {
            self.emit_reloc(RelocationKind::Dir64, target, 0);
        } else {
            self.emit_reloc(RelocationKind::HighLow, target, 0);
        }
    }

    /// Records that `symbol` starts at the current offset
    pub fn define_symbol(&mut self, symbol: NodeId) {
        let offset = self.position();
        self.data.defined_symbols.push((symbol, offset));
    }

    /// Pads with zeros to `alignment`
    pub fn align(&mut self, alignment: usize) {
        pad_to_alignment(&mut self.data.data, alignment);
    }

    /// Returns the finished data
    #[must_use]
    pub fn finish(self) -> ObjectData {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocations_hold_their_addend() {
        let mut builder = ObjectDataBuilder::new(NodeId::new(1), 8);
        builder.emit_u8(0xFF);
        builder.emit_reloc(RelocationKind::Rel32, NodeId::new(2), -4);
        builder.emit_reloc(RelocationKind::Dir64, NodeId::new(3), 0);
        let data = builder.finish();

        assert_eq!(&data.data[1..5], &(-4i32).to_le_bytes());
        assert_eq!(data.relocs.len(), 2);
        assert_eq!(data.relocs[0].offset, 1);
        assert_eq!(data.relocs[1].offset, 5);
        assert_eq!(data.len(), 13);
    }

    #[test]
    fn symbols_defined_at_positions() {
        let mut builder = ObjectDataBuilder::new(NodeId::new(0), 8);
        builder.define_symbol(NodeId::new(10));
        builder.emit_zeros(8);
        builder.define_symbol(NodeId::new(11));
        builder.emit_zeros(8);
        let data = builder.finish();

        assert_eq!(
            data.defined_symbols,
            vec![(NodeId::new(0), 0), (NodeId::new(10), 0), (NodeId::new(11), 8)]
        );
    }

    #[test]
    fn pointer_relocs_follow_pointer_size() {
        let mut builder = ObjectDataBuilder::new(NodeId::new(0), 4);
        builder.emit_pointer_reloc(NodeId::new(1), 4);
        builder.emit_pointer_reloc(NodeId::new(1), 8);
        let data = builder.finish();
        assert_eq!(data.relocs[0].kind, RelocationKind::HighLow);
        assert_eq!(data.relocs[1].kind, RelocationKind::Dir64);
        assert_eq!(data.len(), 12);
    }

    #[test]
    fn align_pads_with_zeros() {
        let mut builder = ObjectDataBuilder::new(NodeId::new(0), 4);
        builder.emit_u8(1);
        builder.align(4);
        assert_eq!(builder.position(), 4);
        builder.align(4);
        assert_eq!(builder.finish().data, vec![1, 0, 0, 0]);
    }
}
