// Indexing error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;
use std::path::Path;

/// Indexing error code constants
///
/// Error code range: 1001-1010
pub struct IndexErrorCodes {}

impl IndexErrorCodes {
    /// MIDI file could not be read from disk
    pub const MIDI_READ_FAILED: i32 = 1001;

    /// MIDI file could not be decoded
    pub const MIDI_PARSE_FAILED: i32 = 1002;

    /// Absolute tick offset does not fit in 32 bits
    pub const TICK_OVERFLOW: i32 = 1003;

    /// Chord has a note count or note value the record layout cannot hold
    pub const INVALID_CHORD: i32 = 1004;

    /// Configured media root does not exist
    pub const MEDIA_ROOT_MISSING: i32 = 1005;

    /// Filesystem I/O failed on bucket, chunk or artifact files
    pub const IO_FAILURE: i32 = 1006;

    /// Bucket file length is not a multiple of the record size
    pub const CORRUPT_BUCKET: i32 = 1007;

    /// Chunk index or artifact could not be (de)serialized
    pub const SERIALIZATION_FAILED: i32 = 1008;

    /// Chunk data section exceeds the 32-bit byte range
    pub const CHUNK_TOO_LARGE: i32 = 1009;

    /// Metadata store lookup failed while indexing
    pub const METADATA_FAILURE: i32 = 1010;
}

/// Log an indexing error with structured context
pub fn log_index_error(err: &IndexError, context: &str) {
    error!(
        "Index error in {}: code={}, component=Indexer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Indexing-related errors
///
/// `MidiRead` and `MidiParse` are per-file and skippable: the batch logs them
/// and keeps going. Everything else aborts the indexing run.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexError {
    /// Source file could not be read
    MidiRead { path: String, reason: String },

    /// Source file is not a decodable standard MIDI file
    MidiParse { path: String, reason: String },

    /// Tick offset of a chord is >= 2^32
    TickOverflow { tick: u64 },

    /// Note count outside 2..=16 or a note value of 0 / above 127
    InvalidChord { notes: Vec<u8> },

    /// Media root directory is absent
    MediaRootMissing { path: String },

    /// I/O failure with the operation that triggered it
    Io { context: String, details: String },

    /// Trailing partial record in a bucket file
    CorruptBucket { path: String, len: u64 },

    /// JSON encoding or decoding failed
    Serialization { details: String },

    /// Data section larger than u32 offsets can address
    ChunkTooLarge { bytes: u64 },

    /// Metadata store could not be consulted
    Metadata { details: String },
}

impl IndexError {
    /// Wrap an I/O error with the operation and path it belongs to.
    pub fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        IndexError::Io {
            context: context.into(),
            details: err.to_string(),
        }
    }

    pub fn io_at(action: &str, path: &Path, err: std::io::Error) -> Self {
        Self::io(format!("{} {}", action, path.display()), err)
    }

    /// Per-file failures that must never abort the batch.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            IndexError::MidiRead { .. } | IndexError::MidiParse { .. }
        )
    }
}

impl ErrorCode for IndexError {
    fn code(&self) -> i32 {
        match self {
            IndexError::MidiRead { .. } => IndexErrorCodes::MIDI_READ_FAILED,
            IndexError::MidiParse { .. } => IndexErrorCodes::MIDI_PARSE_FAILED,
            IndexError::TickOverflow { .. } => IndexErrorCodes::TICK_OVERFLOW,
            IndexError::InvalidChord { .. } => IndexErrorCodes::INVALID_CHORD,
            IndexError::MediaRootMissing { .. } => IndexErrorCodes::MEDIA_ROOT_MISSING,
            IndexError::Io { .. } => IndexErrorCodes::IO_FAILURE,
            IndexError::CorruptBucket { .. } => IndexErrorCodes::CORRUPT_BUCKET,
            IndexError::Serialization { .. } => IndexErrorCodes::SERIALIZATION_FAILED,
            IndexError::ChunkTooLarge { .. } => IndexErrorCodes::CHUNK_TOO_LARGE,
            IndexError::Metadata { .. } => IndexErrorCodes::METADATA_FAILURE,
        }
    }

    fn message(&self) -> String {
        match self {
            IndexError::MidiRead { path, reason } => {
                format!("Could not read MIDI file {}: {}", path, reason)
            }
            IndexError::MidiParse { path, reason } => {
                format!("Could not parse MIDI file {}: {}", path, reason)
            }
            IndexError::TickOverflow { tick } => {
                format!("Tick offset {} does not fit in 32 bits", tick)
            }
            IndexError::InvalidChord { notes } => {
                format!("Chord {:?} cannot be stored (2-16 notes in 1..=127)", notes)
            }
            IndexError::MediaRootMissing { path } => {
                format!("Media root {} does not exist", path)
            }
            IndexError::Io { context, details } => {
                format!("I/O failure while {}: {}", context, details)
            }
            IndexError::CorruptBucket { path, len } => {
                format!("Bucket {} has a partial record ({} bytes)", path, len)
            }
            IndexError::Serialization { details } => {
                format!("Serialization failed: {}", details)
            }
            IndexError::ChunkTooLarge { bytes } => {
                format!("Chunk data section of {} bytes exceeds 4 GiB", bytes)
            }
            IndexError::Metadata { details } => {
                format!("Metadata store failure: {}", details)
            }
        }
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for IndexError {}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization {
            details: err.to_string(),
        }
    }
}
