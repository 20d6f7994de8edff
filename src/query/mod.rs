//! Read side: chord lookup, result shaping and metadata.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::error::QueryError;

pub mod engine;
pub mod metadata;
pub mod results;

pub use engine::{QueryEngine, RawMatch};
pub use metadata::{
    open_store, JsonMetadataStore, MetadataStore, MidiMetadata, NoMetadata, METADATA_BATCH_LIMIT,
};
pub use results::{
    build_response, group_by_file, paginate, FileMatches, SearchRequest, SearchResponse,
    SearchResult, DEFAULT_PAGE_SIZE,
};

/// Read a JSON artifact written by the indexer.
pub fn load_json_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, QueryError> {
    let contents = fs::read(path).map_err(|err| QueryError::ArtifactLoad {
        path: path.display().to_string(),
        details: err.to_string(),
    })?;
    serde_json::from_slice(&contents).map_err(|err| QueryError::ArtifactLoad {
        path: path.display().to_string(),
        details: err.to_string(),
    })
}
