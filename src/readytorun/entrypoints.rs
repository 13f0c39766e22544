//! Method entry-point tables.
//!
//! The runtime finds the precompiled code of a method through one of two tables:
//!
//! - [`EntryPointTable`] maps `MethodDef` rids to entries. It is normally laid out as a
//!   sparse native array indexed by rid; the hashtable layout keyed by method hash is
//!   available for callers that cannot address by rid.
//! - [`InstanceEntryPointTable`] holds generic instantiations. Instantiations share the
//!   rid of their generic definition, so entries are keyed by version-resilient method
//!   hash and carry the method signature that disambiguates them.
//!
//! Each entry records the method's row in the runtime-functions table and, optionally,
//! a fixup blob listing the import cells that must be resolved before the method first
//! runs. Fixup blobs and signature blobs are deduplicated by content through two
//! independent [`BlobPool`]s; equal blobs are written once and referenced backwards by
//! every entry that uses them.

use std::collections::HashMap;

use crate::{
    nativeformat::{NativeWriter, SectionId, VertexId},
    readytorun::blobpool::BlobPool,
};

/// Serialization layout of an [`EntryPointTable`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryPointLayout {
    /// Sparse native array indexed by rid
    Array,
    /// Hashtable keyed by method hash
    Hashtable,
}

/// One method's record in an entry-point table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryPointEntry {
    /// Row of the method in the runtime-functions table
    pub method_index: u32,
    /// Index into the fixup pool, `None` if the method needs no fixups
    pub fixups: Option<u32>,
    /// Index into the signature pool, `None` if the entry has no signature
    pub signature: Option<u32>,
    /// Version-resilient hash of the method
    pub hash_code: u32,
}

/// Entry points indexed by `MethodDef` rid.
///
/// # Examples
///
/// ```rust
/// use readytorun::readytorun::{EntryPointLayout, EntryPointTable};
///
/// let mut table = EntryPointTable::new(EntryPointLayout::Array);
/// table.add(5, 0, None, None, 0x1234);
/// assert_eq!(table.slot_count(), 6);
/// assert!(table.entry(4).is_none());
/// assert_eq!(table.entry(5).map(|e| e.method_index), Some(0));
/// ```
#[derive(Debug)]
pub struct EntryPointTable {
    layout: EntryPointLayout,
    slots: Vec<Option<EntryPointEntry>>,
    fixups: BlobPool,
    signatures: BlobPool,
}

impl EntryPointTable {
    /// Creates an empty table serialized with `layout`
    #[must_use]
    pub fn new(layout: EntryPointLayout) -> Self {
        EntryPointTable {
            layout,
            slots: Vec::new(),
            fixups: BlobPool::new(),
            signatures: BlobPool::new(),
        }
    }

    /// Records the entry point of the method with row id `rid`.
    ///
    /// The table grows to include `rid`, leaving skipped rids empty. Adding a rid twice
    /// replaces the earlier entry.
    pub fn add(
        &mut self,
        rid: u32,
        method_index: u32,
        fixups: Option<&[u8]>,
        signature: Option<&[u8]>,
        hash_code: u32,
    ) {
        let slot = rid as usize;
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }

        self.slots[slot] = Some(EntryPointEntry {
            method_index,
            fixups: self.fixups.add_optional(fixups),
            signature: self.signatures.add_optional(signature),
            hash_code,
        });
    }

    /// Serialization layout
    #[must_use]
    pub fn layout(&self) -> EntryPointLayout {
        self.layout
    }

    /// Number of rid slots, including empty ones
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Entry stored for `rid`
    #[must_use]
    pub fn entry(&self, rid: u32) -> Option<&EntryPointEntry> {
        self.slots.get(rid as usize).and_then(Option::as_ref)
    }

    /// Populated entries with their rids
    pub fn entries(&self) -> impl Iterator<Item = (u32, &EntryPointEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(rid, slot)| slot.as_ref().map(|entry| (rid as u32, entry)))
    }

    /// Returns `true` if no entry was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Deduplicated fixup blobs
    #[must_use]
    pub fn fixups(&self) -> &BlobPool {
        &self.fixups
    }

    /// Deduplicated signature blobs
    #[must_use]
    pub fn signatures(&self) -> &BlobPool {
        &self.signatures
    }

    /// Serializes the table
    #[must_use]
    pub fn get_data(&self) -> Vec<u8> {
        match self.layout {
            EntryPointLayout::Array => self.save_array(),
            EntryPointLayout::Hashtable => save_hashtable(
                self.slots.iter().flatten(),
                &self.fixups,
                &self.signatures,
            ),
        }
    }

    fn save_array(&self) -> Vec<u8> {
        let mut writer = NativeWriter::new();
        let section = writer.new_section();

        let array = writer.new_array(section);
        writer.place(section, array);

        // fixup blobs go between the array header and its blocks so entries can refer back
        let fixup_vertices = place_fixup_blobs(&mut writer, section, &self.fixups);

        for (rid, entry) in self.entries() {
            let fixups = entry.fixups.map(|index| fixup_vertices[index as usize]);
            let vertex = writer.new_entry_point(entry.method_index, fixups);
            writer.array_set(array, rid as usize, vertex);
        }
        writer.array_expand_layout(array);

        writer.save()
    }
}

/// Entry points of generic instantiations, keyed by method hash.
///
/// Entries are identified by their rid together with their signature, so distinct
/// instantiations of one generic method coexist while re-adding the same
/// instantiation replaces its entry.
#[derive(Debug, Default)]
pub struct InstanceEntryPointTable {
    entries: Vec<EntryPointEntry>,
    keys: HashMap<(u32, Option<u32>), usize>,
    fixups: BlobPool,
    signatures: BlobPool,
}

impl InstanceEntryPointTable {
    /// Creates an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the entry point of an instantiation of the generic method `rid`
    pub fn add(
        &mut self,
        rid: u32,
        method_index: u32,
        fixups: Option<&[u8]>,
        signature: Option<&[u8]>,
        hash_code: u32,
    ) {
        let entry = EntryPointEntry {
            method_index,
            fixups: self.fixups.add_optional(fixups),
            signature: self.signatures.add_optional(signature),
            hash_code,
        };

        match self.keys.get(&(rid, entry.signature)) {
            Some(&position) => self.entries[position] = entry,
            None => {
                self.keys.insert((rid, entry.signature), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Entries in insertion order
    #[must_use]
    pub fn entries(&self) -> &[EntryPointEntry] {
        &self.entries
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entry was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deduplicated fixup blobs
    #[must_use]
    pub fn fixups(&self) -> &BlobPool {
        &self.fixups
    }

    /// Deduplicated signature blobs
    #[must_use]
    pub fn signatures(&self) -> &BlobPool {
        &self.signatures
    }

    /// Serializes the table as a hashtable keyed by method hash
    #[must_use]
    pub fn get_data(&self) -> Vec<u8> {
        save_hashtable(self.entries.iter(), &self.fixups, &self.signatures)
    }
}

fn place_fixup_blobs(writer: &mut NativeWriter, section: SectionId, pool: &BlobPool) -> Vec<VertexId> {
    pool.iter()
        .map(|blob| {
            let vertex = writer.new_blob(blob.to_vec());
            writer.place(section, vertex)
        })
        .collect()
}

fn save_hashtable<'a>(
    entries: impl Iterator<Item = &'a EntryPointEntry>,
    fixups: &BlobPool,
    signatures: &BlobPool,
) -> Vec<u8> {
    let mut writer = NativeWriter::new();
    let section = writer.new_section();

    let table = writer.new_hashtable();
    writer.place(section, table);

    let fixup_vertices = place_fixup_blobs(&mut writer, section, fixups);

    for entry in entries {
        let fixups = entry.fixups.map(|index| fixup_vertices[index as usize]);
        let signature = entry
            .signature
            .and_then(|index| signatures.get(index))
            .map(<[u8]>::to_vec);

        let vertex = match signature {
            Some(blob) => writer.new_entry_point_with_blob(entry.method_index, fixups, blob),
            None => writer.new_entry_point(entry.method_index, fixups),
        };
        writer.place(section, vertex);
        writer.hashtable_append(table, entry.hash_code, vertex);
    }

    writer.save()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_growth_fills_with_empty_slots() {
        let mut table = EntryPointTable::new(EntryPointLayout::Array);
        table.add(5, 3, None, None, 0);
        assert_eq!(table.slot_count(), 6);
        for rid in 0..5 {
            assert!(table.entry(rid).is_none());
        }
        assert_eq!(table.entries().count(), 1);
        assert!(!table.is_empty());
    }

    #[test]
    fn duplicate_rid_last_write_wins() {
        let mut table = EntryPointTable::new(EntryPointLayout::Array);
        table.add(2, 10, None, None, 0xAAAA);
        table.add(2, 99, None, None, 0xAAAA);
        assert_eq!(table.entry(2).map(|e| e.method_index), Some(99));
        assert_eq!(table.entries().count(), 1);
    }

    #[test]
    fn fixup_blobs_are_shared() {
        let mut table = EntryPointTable::new(EntryPointLayout::Array);
        table.add(1, 0, Some(&[0x21, 0x03]), None, 0);
        table.add(2, 1, Some(&[0x21, 0x03]), None, 0);
        table.add(3, 2, Some(&[0x11]), None, 0);
        assert_eq!(table.fixups().len(), 2);
        assert_eq!(table.entry(1).unwrap().fixups, table.entry(2).unwrap().fixups);
        assert_ne!(table.entry(1).unwrap().fixups, table.entry(3).unwrap().fixups);
        assert_eq!(table.entry(3).unwrap().signature, None);
    }

    #[test]
    fn array_layout_skips_empty_slots() {
        let mut table = EntryPointTable::new(EntryPointLayout::Array);
        table.add(1, 0, None, None, 0);
        let single = table.get_data();

        let mut table = EntryPointTable::new(EntryPointLayout::Array);
        table.add(1, 0, None, None, 0);
        table.add(2, 1, None, None, 0);
        let dense = table.get_data();

        // header, one-byte block offset, then a single leaf: (1 << 2) and entry (0 << 1)
        assert_eq!(single, vec![(2 << 2) << 1, 1, 4 << 1, 0]);
        assert!(dense.len() > single.len());
    }

    #[test]
    fn array_entry_refers_back_to_fixups() {
        let mut table = EntryPointTable::new(EntryPointLayout::Array);
        table.add(0, 7, Some(&[0xAB, 0xCD]), None, 0);
        let bytes = table.get_data();
        // the fixup blob is written once, ahead of the entry that uses it
        let blob_at = bytes.windows(2).position(|w| w == [0xAB, 0xCD]);
        let entry_at = bytes.iter().position(|&b| b == ((7 << 2) | 3) << 1);
        assert!(blob_at.is_some());
        assert!(entry_at.is_some());
        assert!(blob_at < entry_at);
    }

    #[test]
    fn hashtable_layout_has_one_entry_per_method() {
        let mut table = EntryPointTable::new(EntryPointLayout::Hashtable);
        table.add(1, 0, None, None, 0x0000_0011);
        table.add(4, 1, None, None, 0x0000_0022);
        let bytes = table.get_data();
        // single bucket, 1-byte index table with two offsets, then low-hash bytes
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[3], 0x11);
        assert_eq!(bytes[5], 0x22);
    }

    #[test]
    fn instantiations_of_one_rid_coexist() {
        let mut table = InstanceEntryPointTable::new();
        table.add(7, 0, None, Some(&[0x04, 0x07, 0x01, 0x08]), 0x1111);
        table.add(7, 1, None, Some(&[0x04, 0x07, 0x01, 0x0E]), 0x2222);
        table.add(7, 2, None, Some(&[0x04, 0x07, 0x01, 0x08]), 0x1111);
        assert_eq!(table.len(), 2);
        assert_eq!(table.entries()[0].method_index, 2);
        assert_eq!(table.signatures().len(), 2);
    }

    #[test]
    fn instance_table_writes_signature_before_entry() {
        let mut table = InstanceEntryPointTable::new();
        table.add(3, 5, None, Some(&[0xEE, 0xFF]), 0x0000_0042);
        let bytes = table.get_data();
        let signature_at = bytes.windows(2).position(|w| w == [0xEE, 0xFF]).unwrap();
        assert_eq!(bytes[signature_at + 2], 5 << 2);
    }

    #[test]
    fn empty_tables_serialize() {
        assert!(!EntryPointTable::new(EntryPointLayout::Array).get_data().is_empty());
        assert!(!InstanceEntryPointTable::new().get_data().is_empty());
    }
}
