//! Available-types table.
//!
//! A hashtable keyed by the version-resilient hash of each type defined in the image.
//! Every entry stores `rid << 1` of the `TypeDef` row; the runtime resolves hash
//! collisions by comparing names through the rid, so several types may share a bucket.

use crate::{
    metadata::typesystem::{hash::type_hash_code, TypeDesc},
    nativeformat::NativeWriter,
};

/// Types of the image, keyed by structural hash
#[derive(Debug, Default)]
pub struct TypesTable {
    entries: Vec<(u32, u32)>,
}

impl TypesTable {
    /// Creates an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the type defined by row `rid`
    pub fn add(&mut self, rid: u32, ty: &TypeDesc) {
        self.add_hashed(rid, type_hash_code(ty) as u32);
    }

    /// Adds row `rid` under a precomputed hash
    pub fn add_hashed(&mut self, rid: u32, hash_code: u32) {
        self.entries.push((rid, hash_code));
    }

    /// `(rid, hash)` pairs in insertion order
    #[must_use]
    pub fn entries(&self) -> &[(u32, u32)] {
        &self.entries
    }

    /// Number of types
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no type was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the table
    #[must_use]
    pub fn get_data(&self) -> Vec<u8> {
        let mut writer = NativeWriter::new();
        let section = writer.new_section();
        let table = writer.new_hashtable();
        writer.place(section, table);

        for &(rid, hash_code) in &self.entries {
            let vertex = writer.new_unsigned(rid << 1);
            writer.place(section, vertex);
            writer.hashtable_append(table, hash_code, vertex);
        }

        writer.save()
    }
}
