// Per-file metadata lookup
//
// Keys are file paths relative to the media root, the same strings the
// file map stores. Batch lookups are capped at METADATA_BATCH_LIMIT keys;
// larger requests are rejected rather than truncated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::QueryError;

/// Maximum keys per `get_many` call
pub const METADATA_BATCH_LIMIT: usize = 10;

/// Descriptive metadata of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MidiMetadata {
    #[serde(default)]
    pub year: u32,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub release: String,
}

/// Metadata lookup seam shared by indexing (presence flag) and search
/// (result enrichment).
pub trait MetadataStore: Send + Sync {
    fn has_metadata(&self, key: &str) -> Result<bool, QueryError>;

    /// Look up at most [`METADATA_BATCH_LIMIT`] keys. Unknown keys are
    /// simply absent from the result.
    fn get_many(&self, keys: &[String]) -> Result<HashMap<String, MidiMetadata>, QueryError>;
}

fn check_batch(keys: &[String]) -> Result<(), QueryError> {
    if keys.len() > METADATA_BATCH_LIMIT {
        return Err(QueryError::MetadataBatchTooLarge {
            requested: keys.len(),
            limit: METADATA_BATCH_LIMIT,
        });
    }
    Ok(())
}

/// Store with no entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataStore for NoMetadata {
    fn has_metadata(&self, _key: &str) -> Result<bool, QueryError> {
        Ok(false)
    }

    fn get_many(&self, keys: &[String]) -> Result<HashMap<String, MidiMetadata>, QueryError> {
        check_batch(keys)?;
        Ok(HashMap::new())
    }
}

/// Store backed by a JSON object of `relative path -> metadata`.
#[derive(Debug, Clone, Default)]
pub struct JsonMetadataStore {
    entries: HashMap<String, MidiMetadata>,
}

impl JsonMetadataStore {
    pub fn from_entries(entries: HashMap<String, MidiMetadata>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, QueryError> {
        let contents = fs::read_to_string(path).map_err(|err| QueryError::ArtifactLoad {
            path: path.display().to_string(),
            details: err.to_string(),
        })?;
        let entries = serde_json::from_str(&contents).map_err(|err| QueryError::ArtifactLoad {
            path: path.display().to_string(),
            details: err.to_string(),
        })?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataStore for JsonMetadataStore {
    fn has_metadata(&self, key: &str) -> Result<bool, QueryError> {
        Ok(self.entries.contains_key(key))
    }

    fn get_many(&self, keys: &[String]) -> Result<HashMap<String, MidiMetadata>, QueryError> {
        check_batch(keys)?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                self.entries
                    .get(key)
                    .map(|metadata| (key.clone(), metadata.clone()))
            })
            .collect())
    }
}

/// JSON store when a path is configured, otherwise the empty store.
pub fn open_store(path: Option<&Path>) -> Result<Arc<dyn MetadataStore>, QueryError> {
    match path {
        Some(path) => {
            let store = JsonMetadataStore::load(path)?;
            log::info!(
                "[Metadata] Loaded {} entries from {}",
                store.len(),
                path.display()
            );
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(NoMetadata)),
    }
}
