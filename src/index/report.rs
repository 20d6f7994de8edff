// Index directory statistics and chunk inspection

use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use uuid::Uuid;

use super::bucket::shard_id;
use super::chunk::{read_chunk_index, ByteRange, CHUNK_ENTRY_SIZE};
use crate::chord::{ChordKey, RECORD_SIZE};
use crate::error::IndexError;

/// Size breakdown of an index directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexReport {
    pub bucket_files: usize,
    pub bucket_bytes: u64,
    pub bucket_chords: u64,
    pub chunk_files: usize,
    pub chunk_bytes: u64,
    pub data_bytes: u64,
    /// Entry count per chunk, in directory order
    pub chords_per_chunk: Vec<u64>,
    /// Share of chunk bytes spent on length prefixes and indexes
    pub index_share: f64,
}

impl IndexReport {
    pub fn chunk_chords(&self) -> u64 {
        self.chords_per_chunk.iter().sum()
    }

    /// Scan `dir` for bucket shards and chunk files.
    pub fn collect(dir: &Path) -> Result<Self, IndexError> {
        let mut report = IndexReport::default();
        let entries = fs::read_dir(dir).map_err(|err| IndexError::io_at("listing", dir, err))?;
        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| IndexError::io_at("listing", dir, err))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();

        for name in names {
            let path = dir.join(&name);
            if shard_id(&name).is_some() {
                let len = file_len(&path)?;
                report.bucket_files += 1;
                report.bucket_bytes += len;
                report.bucket_chords += len / RECORD_SIZE as u64;
            } else if is_chunk_name(&name) {
                let inspection = inspect_chunk(&path)?;
                report.chunk_files += 1;
                report.chunk_bytes += inspection.file_bytes;
                report.data_bytes += inspection.data_bytes();
                report.chords_per_chunk.push(inspection.entry_count());
            }
        }

        if report.chunk_bytes > 0 {
            report.index_share =
                (report.chunk_bytes - report.data_bytes) as f64 / report.chunk_bytes as f64;
        }
        Ok(report)
    }
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "buckets: {} files, {} bytes, {} chords",
            self.bucket_files, self.bucket_bytes, self.bucket_chords
        )?;
        writeln!(
            f,
            "chunks:  {} files, {} bytes ({} data), {} chords",
            self.chunk_files,
            self.chunk_bytes,
            self.data_bytes,
            self.chunk_chords()
        )?;
        writeln!(f, "index share: {:.2}%", self.index_share * 100.0)?;
        write!(f, "chords per chunk: {:?}", self.chords_per_chunk)
    }
}

fn is_chunk_name(name: &str) -> bool {
    name.strip_suffix(".dat")
        .map(|stem| Uuid::parse_str(stem).is_ok())
        .unwrap_or(false)
}

fn file_len(path: &Path) -> Result<u64, IndexError> {
    fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|err| IndexError::io_at("inspecting", path, err))
}

/// Embedded index of one chunk file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkInspection {
    pub filename: String,
    pub file_bytes: u64,
    pub index_len: u32,
    pub keys: Vec<(ChordKey, ByteRange)>,
}

impl ChunkInspection {
    pub fn data_bytes(&self) -> u64 {
        self.file_bytes
            .saturating_sub(4 + u64::from(self.index_len))
    }

    pub fn entry_count(&self) -> u64 {
        self.data_bytes() / CHUNK_ENTRY_SIZE as u64
    }
}

impl fmt::Display for ChunkInspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} keys, index {} bytes, data {} bytes",
            self.filename,
            self.keys.len(),
            self.index_len,
            self.data_bytes()
        )?;
        for (key, range) in &self.keys {
            writeln!(
                f,
                "  {:<24} {:>10}..{:<10} {} matches",
                key.to_string(),
                range.start,
                range.end,
                range.entry_count()
            )?;
        }
        Ok(())
    }
}

/// Read the index of the chunk at `path`.
pub fn inspect_chunk(path: &Path) -> Result<ChunkInspection, IndexError> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = File::open(path).map_err(|err| IndexError::io_at("opening chunk", path, err))?;
    let file_bytes = file
        .metadata()
        .map_err(|err| IndexError::io_at("inspecting", path, err))?
        .len();
    let (index, index_len) =
        read_chunk_index(&mut BufReader::new(file), &filename).map_err(|err| {
            IndexError::Serialization {
                details: err.to_string(),
            }
        })?;

    Ok(ChunkInspection {
        filename,
        file_bytes,
        index_len,
        keys: index.into_iter().collect(),
    })
}
