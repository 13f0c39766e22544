//! Native layout format used by ReadyToRun lookup tables.
//!
//! The format is a graph of *vertices* serialized into a compact byte stream. Integers
//! use a variable-length prefix encoding, and references between vertices are relative
//! offsets, so the final layout is computed by an iterative save loop until every offset
//! settles.
//!
//! # Key Components
//!
//! - [`NativeEncoder`] - byte buffer with the unsigned/signed variable-length encodings
//! - [`NativeWriter`] - vertex arena, sections and the save loop
//! - Hashtable vertices - bucketed lookup by 32-bit hash code
//! - Array vertices - sparse index lookup split into 16-entry blocks
//!
//! # Usage Examples
//!
//! ```rust
//! use readytorun::nativeformat::NativeWriter;
//!
//! let mut writer = NativeWriter::new();
//! let section = writer.new_section();
//!
//! let table = writer.new_hashtable();
//! writer.place(section, table);
//!
//! let entry = writer.new_entry_point(3, None);
//! writer.place(section, entry);
//! writer.hashtable_append(table, 0x1234_5678, entry);
//!
//! let bytes = writer.save();
//! assert!(!bytes.is_empty());
//! ```

mod array;
mod encoder;
mod hashtable;
mod writer;

pub use array::BLOCK_SIZE;
pub use encoder::{unsigned_encoding_size, NativeEncoder};
pub use writer::{NativeWriter, SectionId, VertexId};
