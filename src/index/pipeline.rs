// Indexer - one complete indexing run
//
// media root -> file map -> parallel extraction -> bucket shards (appended in
// file id order) -> chunk files -> chunks.json + files.json

use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::bucket::{shard_id, BucketStore};
use super::chunk::{ChunkBuilder, ChunkOverview};
use super::files::{create_file_num_map, gather_midi_paths, FileNumMap};
use super::{CHUNKS_FILENAME, FILES_FILENAME};
use crate::chord::extract_file;
use crate::config::{IndexingConfig, StorageConfig};
use crate::error::{log_index_error, IndexError};
use crate::query::MetadataStore;

/// Files extracted in parallel before their chords are written out
const EXTRACT_BATCH_SIZE: usize = 64;

/// Outcome of an indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub files_found: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chords: usize,
    pub chunks: usize,
    pub elapsed_ms: u64,
}

pub struct Indexer {
    storage: StorageConfig,
    indexing: IndexingConfig,
    metadata: Arc<dyn MetadataStore>,
}

impl Indexer {
    pub fn new(
        storage: StorageConfig,
        indexing: IndexingConfig,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            storage,
            indexing,
            metadata,
        }
    }

    /// Rebuild the index from scratch.
    ///
    /// # Returns
    /// Counts of files, chords and chunks written.
    ///
    /// # Errors
    /// - `MediaRootMissing` when the media root is absent
    /// - `TickOverflow` when any file has a chord past tick 2^32
    /// - I/O and serialization failures on the index directory
    ///
    /// Unreadable or undecodable MIDI files are logged and skipped.
    pub fn run(&self) -> Result<IndexSummary, IndexError> {
        let started = Instant::now();
        let media_root = &self.storage.media_root;
        let index_dir = &self.storage.index_dir;

        let paths = gather_midi_paths(media_root)?;
        prepare_index_dir(index_dir)?;
        let files = create_file_num_map(paths);
        tracing::info!(
            files = files.len(),
            media_root = %media_root.display(),
            "[Indexer] Gathered MIDI files"
        );

        let store = BucketStore::new(index_dir);
        let mut summary = IndexSummary {
            files_found: files.len(),
            ..IndexSummary::default()
        };

        let jobs: Vec<(u32, &String, bool)> = files
            .iter()
            .map(|(&id, path)| (id, path, self.has_metadata(path)))
            .collect();

        for (batch_no, batch) in jobs.chunks(EXTRACT_BATCH_SIZE).enumerate() {
            let extracted: Vec<(u32, &String, Result<_, IndexError>)> = batch
                .par_iter()
                .map(|&(id, path, has_metadata)| {
                    let full_path = media_root.join(path);
                    (id, path, extract_file(&full_path, id, has_metadata, &self.indexing))
                })
                .collect();

            // par_iter().collect() keeps input order, so appends stay in file id order
            for (id, path, result) in extracted {
                match result {
                    Ok(chords) => {
                        store.append_all(&chords)?;
                        summary.files_indexed += 1;
                        summary.chords += chords.len();
                    }
                    Err(err) if err.is_skippable() => {
                        tracing::warn!(file_id = id, path = %path, "[Indexer] Skipping file: {}", err);
                        summary.files_skipped += 1;
                    }
                    Err(err) => {
                        log_index_error(&err, &format!("extracting {}", path));
                        return Err(err);
                    }
                }
            }
            tracing::debug!(
                batch = batch_no + 1,
                processed = summary.files_indexed + summary.files_skipped,
                total = summary.files_found,
                "[Indexer] Batch done"
            );
        }

        let chunks = ChunkBuilder::new(index_dir, self.indexing.preferred_chunk_size).build(&store)?;
        summary.chunks = chunks.len();

        if self.indexing.delete_buckets {
            let removed = store.delete_all()?;
            tracing::debug!(removed, "[Indexer] Deleted bucket shards");
        }

        write_artifacts(index_dir, &chunks, &files)?;

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            files_indexed = summary.files_indexed,
            files_skipped = summary.files_skipped,
            chords = summary.chords,
            chunks = summary.chunks,
            elapsed_ms = summary.elapsed_ms,
            "[Indexer] Index complete"
        );
        Ok(summary)
    }

    /// Presence lookup; a failing store counts as "no metadata".
    fn has_metadata(&self, path: &str) -> bool {
        match self.metadata.has_metadata(path) {
            Ok(found) => found,
            Err(err) => {
                let err = IndexError::Metadata {
                    details: err.to_string(),
                };
                log_index_error(&err, &format!("metadata lookup for {}", path));
                false
            }
        }
    }
}

/// Create the index directory and clear what a previous run left there:
/// bucket shards, chunk files and the two artifacts.
fn prepare_index_dir(dir: &Path) -> Result<(), IndexError> {
    fs::create_dir_all(dir).map_err(|err| IndexError::io_at("creating", dir, err))?;
    let entries = fs::read_dir(dir).map_err(|err| IndexError::io_at("listing", dir, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| IndexError::io_at("listing", dir, err))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if is_index_file(name) {
            let path = entry.path();
            fs::remove_file(&path).map_err(|err| IndexError::io_at("removing", &path, err))?;
        }
    }
    Ok(())
}

fn is_index_file(name: &str) -> bool {
    if name == CHUNKS_FILENAME || name == FILES_FILENAME || shard_id(name).is_some() {
        return true;
    }
    name.strip_suffix(".dat")
        .map(|stem| Uuid::parse_str(stem).is_ok())
        .unwrap_or(false)
}

fn write_artifacts(
    dir: &Path,
    chunks: &[ChunkOverview],
    files: &FileNumMap,
) -> Result<(), IndexError> {
    for (name, encoded) in [
        (CHUNKS_FILENAME, serde_json::to_vec_pretty(chunks)?),
        (FILES_FILENAME, serde_json::to_vec_pretty(files)?),
    ] {
        let path = dir.join(name);
        fs::write(&path, encoded).map_err(|err| IndexError::io_at("writing", &path, err))?;
    }
    Ok(())
}
