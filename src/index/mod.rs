//! Offline index construction.
//!
//! Extraction writes every chord into a bucket shard keyed by its lowest
//! note (`NNN.dat`), then the chunk builder folds the shards into immutable
//! chunk files with an embedded key index. The run ends by persisting the
//! chunk list and the file map next to the chunks.

pub mod bucket;
pub mod chunk;
pub mod files;
pub mod pipeline;
pub mod report;

pub use bucket::{BucketReader, BucketStore};
pub use chunk::{read_chunk_index, ByteRange, ChunkBuilder, ChunkIndex, ChunkOverview};
pub use files::{create_file_num_map, gather_midi_paths, FileNumMap};
pub use pipeline::{IndexSummary, Indexer};
pub use report::{inspect_chunk, ChunkInspection, IndexReport};

/// Persisted list of chunk overviews
pub const CHUNKS_FILENAME: &str = "chunks.json";

/// Persisted file id -> relative path map
pub const FILES_FILENAME: &str = "files.json";
