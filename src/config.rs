//! Configuration management for indexing and serving
//!
//! Runtime configuration is loaded from a JSON file so index layout and
//! extraction thresholds can be tuned without recompilation. Command-line
//! flags override the storage paths after loading.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::chord::DEFAULT_NEW_CHORD_THRESHOLD_US;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where index artifacts and source files live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding bucket shards, chunk files, chunks.json and files.json
    pub index_dir: PathBuf,
    /// Root of the MIDI corpus; file map paths are relative to it
    pub media_root: PathBuf,
    /// Optional JSON metadata store (relative path -> metadata)
    #[serde(default)]
    pub metadata_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("out"),
            media_root: PathBuf::from("media"),
            metadata_path: None,
        }
    }
}

/// Chord extraction and chunking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Minimum separation between onsets, in microseconds
    pub new_chord_threshold_us: u64,
    /// Preferred chunk size in bytes
    pub preferred_chunk_size: usize,
    /// 0-based channel dropped as percussion; `None` keeps every channel
    pub percussion_channel: Option<u8>,
    /// Delete bucket shards once chunks are written
    pub delete_buckets: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            new_chord_threshold_us: DEFAULT_NEW_CHORD_THRESHOLD_US,
            preferred_chunk_size: 64 * 1024 * 1024,
            // General MIDI channel 10
            percussion_channel: Some(9),
            delete_buckets: true,
        }
    }
}

/// HTTP front end parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Distinct files per search result page
    pub page_size: usize,
    /// Note events per track in served excerpts
    pub excerpt_note_events: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            page_size: 10,
            excerpt_note_events: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults when the file is missing or
    /// invalid (a warning is logged in both cases).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Apply command-line overrides for the storage paths.
    pub fn with_overrides(mut self, index_dir: Option<PathBuf>, media_root: Option<PathBuf>) -> Self {
        if let Some(dir) = index_dir {
            self.storage.index_dir = dir;
        }
        if let Some(root) = media_root {
            self.storage.media_root = root;
        }
        self
    }
}
