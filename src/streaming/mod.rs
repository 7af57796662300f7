//! Source-file chunking for part uploads.
//!
//! Two splitting strategies feed the part uploader:
//!
//! - [`byte_chunker`]: gzip the source, then cut the compressed stream into
//!   fixed-size blocks, base64-encoded for the text-safe transport.
//! - [`csv_chunker`]: split the source CSV on record boundaries into files of
//!   a derived row count, for uploads that must keep rows intact per part.

pub mod byte_chunker;
pub mod csv_chunker;

pub use byte_chunker::{ChunkPlan, ChunkSpec, EncodedPart, PART_BYTE_LIMIT};
pub use csv_chunker::ChunkResult;
