// AppContext: everything a search front end needs, loaded once at startup
//
// Holds the chunk list, the file map and the metadata store. All fields are
// read-only after load, so one context is shared across request handlers
// behind an Arc without locking.

use anyhow::Context;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{log_query_error, IndexError, QueryError};
use crate::excerpt::excerpt;
use crate::index::{FileNumMap, FILES_FILENAME};
use crate::query::{
    build_response, load_json_artifact, open_store, MetadataStore, QueryEngine, SearchRequest,
    SearchResponse,
};

/// Shared state for search, file download and excerpt requests
pub struct AppContext {
    config: AppConfig,
    engine: QueryEngine,
    files: FileNumMap,
    metadata: Arc<dyn MetadataStore>,
}

impl AppContext {
    /// Load the persisted index described by `config`
    ///
    /// # Arguments
    /// * `config` - Storage paths and server parameters
    ///
    /// # Returns
    /// A ready context, or an error when the media root is missing or an
    /// artifact (chunks.json, files.json, metadata store) cannot be loaded.
    pub fn load(config: AppConfig) -> anyhow::Result<Self> {
        let storage = &config.storage;
        if !storage.media_root.is_dir() {
            return Err(IndexError::MediaRootMissing {
                path: storage.media_root.display().to_string(),
            })
            .context("checking media root");
        }

        let engine = QueryEngine::load(&storage.index_dir).context("loading chunk list")?;
        let files: FileNumMap = load_json_artifact(&storage.index_dir.join(FILES_FILENAME))
            .context("loading file map")?;
        let metadata =
            open_store(storage.metadata_path.as_deref()).context("opening metadata store")?;

        log::info!(
            "[AppContext] Loaded index from {:?}: {} chunks, {} files",
            storage.index_dir,
            engine.chunks().len(),
            files.len()
        );

        Ok(Self::from_parts(config, engine, files, metadata))
    }

    pub fn from_parts(
        config: AppConfig,
        engine: QueryEngine,
        files: FileNumMap,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            config,
            engine,
            files,
            metadata,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn files(&self) -> &FileNumMap {
        &self.files
    }

    /// Run one search and shape the page starting at file group `start`
    ///
    /// # Errors
    /// - `InvalidChordCount` unless the request carries exactly one chord
    /// - `ChunkRead` / `CorruptIndex` when the chunk holding the key is unusable
    ///
    /// An unknown chord is not an error: it yields an empty response.
    pub fn search(
        &self,
        request: &SearchRequest,
        start: usize,
    ) -> Result<SearchResponse, QueryError> {
        let notes = request.single_chord()?;
        let matches = self.engine.find(notes).map_err(|err| {
            log_query_error(&err, "search");
            err
        })?;
        tracing::debug!(
            chord = ?notes,
            matches = matches.len(),
            start,
            "[AppContext] Search"
        );
        Ok(build_response(
            &matches,
            start,
            self.config.server.page_size,
            &self.files,
            self.metadata.as_ref(),
        ))
    }

    /// Absolute path of the source file registered under `file_id`
    pub fn file_path(&self, file_id: u32) -> Result<PathBuf, QueryError> {
        self.files
            .get(&file_id)
            .map(|relative| self.config.storage.media_root.join(relative))
            .ok_or(QueryError::FileNotFound { file_id })
    }

    /// Raw bytes of the source file registered under `file_id`
    pub fn file_bytes(&self, file_id: u32) -> Result<Vec<u8>, QueryError> {
        let path = self.file_path(file_id)?;
        fs::read(&path).map_err(|err| QueryError::FileRead {
            file_id,
            details: format!("{}: {}", path.display(), err),
        })
    }

    /// Excerpt of file `file_id` starting at tick `offset`
    pub fn excerpt(&self, file_id: u32, offset: u32) -> Result<Vec<u8>, QueryError> {
        let bytes = self.file_bytes(file_id)?;
        excerpt(&bytes, offset, self.config.server.excerpt_note_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::index::Indexer;
    use crate::query::NoMetadata;
    use crate::testing::chord_progression_fixture;
    use tempfile::{tempdir, TempDir};

    fn indexed_context() -> (TempDir, TempDir, AppContext) {
        let media = tempdir().unwrap();
        let out = tempdir().unwrap();
        fs::write(media.path().join("song.mid"), chord_progression_fixture()).unwrap();

        let mut config = AppConfig::default();
        config.storage = StorageConfig {
            index_dir: out.path().to_path_buf(),
            media_root: media.path().to_path_buf(),
            metadata_path: None,
        };
        Indexer::new(
            config.storage.clone(),
            config.indexing.clone(),
            Arc::new(NoMetadata),
        )
        .run()
        .unwrap();

        let ctx = AppContext::load(config).unwrap();
        (media, out, ctx)
    }

    #[test]
    fn test_search_finds_repeated_chord() {
        let (_media, _out, ctx) = indexed_context();
        let response = ctx.search(&SearchRequest::single(vec![60, 64, 67]), 0).unwrap();
        assert_eq!(response.num_matches, 2);
        assert_eq!(response.num_files, 1);
        assert_eq!(response.results[0].file_id, 1);
        let mut offsets = response.results[0].offsets.clone();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 960]);
    }

    #[test]
    fn test_search_unknown_chord_is_empty() {
        let (_media, _out, ctx) = indexed_context();
        let response = ctx.search(&SearchRequest::single(vec![61, 66]), 0).unwrap();
        assert_eq!(response.num_matches, 0);
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_search_rejects_multiple_chords() {
        let (_media, _out, ctx) = indexed_context();
        let request = SearchRequest {
            chords: vec![vec![60, 64], vec![65, 69]],
        };
        assert!(matches!(
            ctx.search(&request, 0),
            Err(QueryError::InvalidChordCount { count: 2 })
        ));
    }

    #[test]
    fn test_file_access() {
        let (_media, _out, ctx) = indexed_context();
        assert_eq!(ctx.file_bytes(1).unwrap(), chord_progression_fixture());
        assert_eq!(
            ctx.file_bytes(7).unwrap_err(),
            QueryError::FileNotFound { file_id: 7 }
        );
        assert!(ctx.excerpt(1, 480).unwrap().starts_with(b"MThd"));
    }

    #[test]
    fn test_load_requires_media_root() {
        let out = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.index_dir = out.path().to_path_buf();
        config.storage.media_root = out.path().join("absent");
        assert!(AppContext::load(config).is_err());
    }
}
