// QueryEngine - exact chord lookup over chunk files
//
// The chunk list is ascending and disjoint, so the owning chunk is found by
// binary search. Each lookup opens its own file handle; chunk files are
// immutable and need no locking.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::load_json_artifact;
use crate::chord::ChordKey;
use crate::index::chunk::{decode_entries, read_chunk_index, ChunkOverview, CHUNK_ENTRY_SIZE};
use crate::index::CHUNKS_FILENAME;
use crate::error::QueryError;

/// One stored occurrence of a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMatch {
    pub tick_offset: u32,
    pub file_id: u32,
}

#[derive(Debug, Clone)]
pub struct QueryEngine {
    index_dir: PathBuf,
    chunks: Vec<ChunkOverview>,
}

impl QueryEngine {
    pub fn new<P: Into<PathBuf>>(index_dir: P, chunks: Vec<ChunkOverview>) -> Self {
        Self {
            index_dir: index_dir.into(),
            chunks,
        }
    }

    /// Load the persisted chunk list from `index_dir`.
    pub fn load(index_dir: &Path) -> Result<Self, QueryError> {
        let chunks = load_json_artifact(&index_dir.join(CHUNKS_FILENAME))?;
        Ok(Self::new(index_dir, chunks))
    }

    pub fn chunks(&self) -> &[ChunkOverview] {
        &self.chunks
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Chunk whose key range contains `key`.
    pub fn locate(&self, key: &ChordKey) -> Option<&ChunkOverview> {
        self.chunks
            .binary_search_by(|chunk| chunk.cmp_key(key))
            .ok()
            .map(|i| &self.chunks[i])
    }

    /// All stored occurrences of exactly `notes`, in rank order.
    ///
    /// An empty request, a key outside every chunk and a key missing from
    /// its chunk's index all yield an empty list.
    pub fn find(&self, notes: &[u8]) -> Result<Vec<RawMatch>, QueryError> {
        if notes.is_empty() {
            return Ok(Vec::new());
        }
        let key = ChordKey::from_notes(notes);
        let Some(chunk) = self.locate(&key) else {
            log::debug!("[QueryEngine] {} is outside every chunk", key);
            return Ok(Vec::new());
        };
        self.find_in_chunk(&chunk.filename, &key)
    }

    fn find_in_chunk(&self, filename: &str, key: &ChordKey) -> Result<Vec<RawMatch>, QueryError> {
        let path = self.index_dir.join(filename);
        let file = File::open(&path).map_err(|err| QueryError::ChunkRead {
            filename: filename.to_string(),
            details: err.to_string(),
        })?;
        let mut reader = BufReader::new(file);

        let (index, _) = read_chunk_index(&mut reader, filename)?;
        let Some(range) = index.get(key) else {
            return Ok(Vec::new());
        };
        if range.end < range.start || range.len() as usize % CHUNK_ENTRY_SIZE != 0 {
            return Err(QueryError::CorruptIndex {
                filename: filename.to_string(),
                details: format!("bad range {}..{} for {}", range.start, range.end, key),
            });
        }

        reader
            .seek(SeekFrom::Current(i64::from(range.start)))
            .map_err(|err| QueryError::ChunkRead {
                filename: filename.to_string(),
                details: err.to_string(),
            })?;
        let mut data = vec![0u8; range.len() as usize];
        reader
            .read_exact(&mut data)
            .map_err(|err| QueryError::CorruptIndex {
                filename: filename.to_string(),
                details: format!("range {}..{} past end of data: {}", range.start, range.end, err),
            })?;

        Ok(decode_entries(&data)
            .map(|(tick_offset, file_id)| RawMatch {
                tick_offset,
                file_id,
            })
            .collect())
    }
}
