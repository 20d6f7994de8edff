// Query error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Query error code constants
///
/// Error code range: 2001-2009
pub struct QueryErrorCodes {}

impl QueryErrorCodes {
    /// Search request did not carry exactly one chord
    pub const INVALID_CHORD_COUNT: i32 = 2001;

    /// Chunk file could not be opened or read
    pub const CHUNK_READ_FAILED: i32 = 2002;

    /// Chunk index could not be decoded or points outside the file
    pub const CORRUPT_INDEX: i32 = 2003;

    /// No source file is registered under the requested id
    pub const FILE_NOT_FOUND: i32 = 2004;

    /// Source file exists in the map but could not be read
    pub const FILE_READ_FAILED: i32 = 2005;

    /// Persisted chunk list or file map could not be loaded
    pub const ARTIFACT_LOAD_FAILED: i32 = 2006;

    /// More than 10 keys passed to a metadata batch lookup
    pub const METADATA_BATCH_TOO_LARGE: i32 = 2007;

    /// Metadata store is unreachable or returned garbage
    pub const METADATA_UNAVAILABLE: i32 = 2008;

    /// Source file could not be decoded or re-encoded as an excerpt
    pub const EXCERPT_FAILED: i32 = 2009;
}

/// Log a query error with structured context
pub fn log_query_error(err: &QueryError, context: &str) {
    error!(
        "Query error in {}: code={}, component=QueryEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Query-related errors
///
/// A chord key that is absent from the index is not an error; it yields an
/// empty result set.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Request carried zero or several chords
    InvalidChordCount { count: usize },

    /// I/O failure on a chunk file
    ChunkRead { filename: String, details: String },

    /// Embedded chunk index is unreadable
    CorruptIndex { filename: String, details: String },

    /// Unknown file id
    FileNotFound { file_id: u32 },

    /// Known file id, unreadable source file
    FileRead { file_id: u32, details: String },

    /// chunks.json / files.json missing or malformed
    ArtifactLoad { path: String, details: String },

    /// Batch lookup above the store limit
    MetadataBatchTooLarge { requested: usize, limit: usize },

    /// Store failure
    MetadataUnavailable { details: String },

    /// Excerpt could not be produced from a source file
    Excerpt { details: String },
}

impl QueryError {
    /// Errors caused by the caller rather than the index.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidChordCount { .. } | QueryError::FileNotFound { .. }
        )
    }
}

impl ErrorCode for QueryError {
    fn code(&self) -> i32 {
        match self {
            QueryError::InvalidChordCount { .. } => QueryErrorCodes::INVALID_CHORD_COUNT,
            QueryError::ChunkRead { .. } => QueryErrorCodes::CHUNK_READ_FAILED,
            QueryError::CorruptIndex { .. } => QueryErrorCodes::CORRUPT_INDEX,
            QueryError::FileNotFound { .. } => QueryErrorCodes::FILE_NOT_FOUND,
            QueryError::FileRead { .. } => QueryErrorCodes::FILE_READ_FAILED,
            QueryError::ArtifactLoad { .. } => QueryErrorCodes::ARTIFACT_LOAD_FAILED,
            QueryError::MetadataBatchTooLarge { .. } => QueryErrorCodes::METADATA_BATCH_TOO_LARGE,
            QueryError::MetadataUnavailable { .. } => QueryErrorCodes::METADATA_UNAVAILABLE,
            QueryError::Excerpt { .. } => QueryErrorCodes::EXCERPT_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            QueryError::InvalidChordCount { count } => {
                format!("Exactly one chord per search is supported (got {})", count)
            }
            QueryError::ChunkRead { filename, details } => {
                format!("Could not read chunk {}: {}", filename, details)
            }
            QueryError::CorruptIndex { filename, details } => {
                format!("Chunk {} has a corrupt index: {}", filename, details)
            }
            QueryError::FileNotFound { file_id } => {
                format!("No file with id {}", file_id)
            }
            QueryError::FileRead { file_id, details } => {
                format!("Could not read file {}: {}", file_id, details)
            }
            QueryError::ArtifactLoad { path, details } => {
                format!("Could not load {}: {}", path, details)
            }
            QueryError::MetadataBatchTooLarge { requested, limit } => {
                format!(
                    "Metadata batch of {} keys exceeds the limit of {}",
                    requested, limit
                )
            }
            QueryError::MetadataUnavailable { details } => {
                format!("Metadata store unavailable: {}", details)
            }
            QueryError::Excerpt { details } => {
                format!("Could not build excerpt: {}", details)
            }
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for QueryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_codes() {
        assert_eq!(
            QueryError::InvalidChordCount { count: 2 }.code(),
            QueryErrorCodes::INVALID_CHORD_COUNT
        );
        assert_eq!(QueryError::FileNotFound { file_id: 9 }.code(), 2004);
        assert_eq!(
            QueryError::MetadataBatchTooLarge {
                requested: 11,
                limit: 10
            }
            .code(),
            2007
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(QueryError::InvalidChordCount { count: 0 }.is_client_error());
        assert!(QueryError::FileNotFound { file_id: 3 }.is_client_error());
        assert!(!QueryError::ChunkRead {
            filename: "a.dat".to_string(),
            details: "gone".to_string()
        }
        .is_client_error());
    }

    #[test]
    fn test_query_error_messages() {
        let err = QueryError::InvalidChordCount { count: 3 };
        assert_eq!(
            err.message(),
            "Exactly one chord per search is supported (got 3)"
        );
        assert!(format!("{}", err).contains("2001"));
    }
}
