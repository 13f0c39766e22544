//! ReadyToRun format building blocks.
//!
//! This module holds everything that is specific to the ReadyToRun image format but
//! independent of the node graph: the format constants, fixup signature encoding, and
//! the deduplicating table builders whose serialized bytes end up in the header tables.
//!
//! # Key Components
//!
//! - [`constants`] - section ids, fixup kinds, helper numbers and signature flags
//! - [`SignatureBuilder`] / [`FixupSignature`] - load-time fixup encodings
//! - [`BlobPool`] - value-deduplicated blob indices
//! - [`EntryPointTable`] / [`InstanceEntryPointTable`] - method entry points
//! - [`TypesTable`] - available types keyed by version-resilient hash
//! - [`GcInfoPool`] - deduplicated GC info referenced by offset
//! - [`GcRefMapBuilder`] / [`TransitionBlock`] - argument GC maps of stub dispatch cells

mod blobpool;
pub mod constants;
mod entrypoints;
mod fixup;
mod gcinfo;
mod gcrefmap;
mod signature;
mod types;

pub use blobpool::BlobPool;
pub use entrypoints::{EntryPointEntry, EntryPointLayout, EntryPointTable, InstanceEntryPointTable};
pub use fixup::{Fixup, FixupSignature, LookupTarget};
pub use gcinfo::GcInfoPool;
pub use gcrefmap::{GcRefMapBuilder, GcRefMapToken, TransitionBlock, GCREFMAP_LOOKUP_STRIDE};
pub use signature::{method_signature_flags, SignatureBuilder, SignatureContext};
pub use types::TypesTable;
