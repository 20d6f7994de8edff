// ChunkBuilder - fold bucket shards into immutable chunk files
//
// Chunk file layout:
//   [u32 LE index length][JSON index: key -> {start, end}][data section]
// The data section is a run of 8-byte entries (tick_offset u32 LE,
// file_id u32 LE). Byte ranges are relative to the start of the data
// section; every key's entries are rank sorted.
//
// Shards are consumed in ascending shard id. A chunk can be cut anywhere in
// the buffered keys once it is large enough; keys left over from earlier
// shards always sort below the next shard's keys, so chunk key ranges come
// out ascending and disjoint.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::bucket::BucketStore;
use crate::chord::{rank_sort, ChordKey, ChordObservation};
use crate::error::{IndexError, QueryError};

/// Bytes per data section entry
pub const CHUNK_ENTRY_SIZE: usize = 8;

/// Bytes of the index length prefix
const INDEX_LEN_PREFIX: usize = 4;

/// Key range and file name of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOverview {
    pub start: ChordKey,
    pub end: ChordKey,
    pub filename: String,
}

impl ChunkOverview {
    /// Position of `key` relative to this chunk's range.
    pub fn cmp_key(&self, key: &ChordKey) -> Ordering {
        if key < &self.start {
            Ordering::Greater
        } else if key > &self.end {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }

    pub fn contains(&self, key: &ChordKey) -> bool {
        self.cmp_key(key) == Ordering::Equal
    }
}

/// Half-open byte range inside a chunk's data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u32,
    pub end: u32,
}

impl ByteRange {
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry_count(&self) -> usize {
        self.len() as usize / CHUNK_ENTRY_SIZE
    }
}

pub type ChunkIndex = BTreeMap<ChordKey, ByteRange>;

/// Decode data section entries into `(tick_offset, file_id)` pairs.
pub fn decode_entries(data: &[u8]) -> impl Iterator<Item = (u32, u32)> + '_ {
    data.chunks_exact(CHUNK_ENTRY_SIZE).map(|entry| {
        let tick = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
        let file_id = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]);
        (tick, file_id)
    })
}

/// Read the length prefix and the index, leaving `reader` at the first byte
/// of the data section. Returns the index and its encoded length.
pub fn read_chunk_index<R: Read>(
    reader: &mut R,
    filename: &str,
) -> Result<(ChunkIndex, u32), QueryError> {
    let mut prefix = [0u8; INDEX_LEN_PREFIX];
    reader
        .read_exact(&mut prefix)
        .map_err(|err| QueryError::CorruptIndex {
            filename: filename.to_string(),
            details: format!("missing index length: {}", err),
        })?;
    let index_len = u32::from_le_bytes(prefix);

    let mut encoded = vec![0u8; index_len as usize];
    reader
        .read_exact(&mut encoded)
        .map_err(|err| QueryError::CorruptIndex {
            filename: filename.to_string(),
            details: format!("truncated index of {} bytes: {}", index_len, err),
        })?;
    let index = serde_json::from_slice(&encoded).map_err(|err| QueryError::CorruptIndex {
        filename: filename.to_string(),
        details: err.to_string(),
    })?;
    Ok((index, index_len))
}

/// Buffers observations per key across shards and cuts chunk files.
pub struct ChunkBuilder {
    output_dir: PathBuf,
    preferred_size: usize,
    pending: BTreeMap<ChordKey, Vec<ChordObservation>>,
}

impl ChunkBuilder {
    pub fn new<P: Into<PathBuf>>(output_dir: P, preferred_size: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            preferred_size,
            pending: BTreeMap::new(),
        }
    }

    /// Number of keys not yet written to a chunk.
    pub fn pending_keys(&self) -> usize {
        self.pending.len()
    }

    /// Buffer every record of one shard. Returns how many were read.
    pub fn add_shard<I>(&mut self, records: I) -> Result<usize, IndexError>
    where
        I: IntoIterator<Item = Result<ChordObservation, IndexError>>,
    {
        let mut count = 0;
        for record in records {
            let chord = record?;
            self.pending.entry(chord.key()).or_default().push(chord);
            count += 1;
        }
        Ok(count)
    }

    /// Walk buffered keys in order and cut a chunk each time the running
    /// size estimate exceeds the preferred size. With `force`, whatever is
    /// left after the walk becomes one final chunk.
    pub fn flush(&mut self, force: bool) -> Result<Vec<ChunkOverview>, IndexError> {
        let keys: Vec<ChordKey> = self.pending.keys().cloned().collect();
        let mut created = Vec::new();
        let mut size = 0usize;
        let mut current: Vec<ChordKey> = Vec::new();

        for (i, key) in keys.iter().enumerate() {
            let count = self.pending.get(key).map(Vec::len).unwrap_or(0);
            size += count * CHUNK_ENTRY_SIZE + key.encoded_len() + INDEX_LEN_PREFIX;
            current.push(key.clone());

            let is_last = i + 1 == keys.len();
            if size > self.preferred_size || (is_last && force) {
                let groups = current
                    .drain(..)
                    .filter_map(|key| self.pending.remove_entry(&key))
                    .collect();
                created.push(write_chunk(&self.output_dir, groups)?);
                size = 0;
            }
        }
        Ok(created)
    }

    /// Consume every shard of `store` in ascending order.
    pub fn build(mut self, store: &BucketStore) -> Result<Vec<ChunkOverview>, IndexError> {
        let shards = store.shard_paths()?;
        let mut chunks = Vec::new();
        for (i, path) in shards.iter().enumerate() {
            let records = self.add_shard(store.read_shard(path)?)?;
            log::debug!(
                "[ChunkBuilder] Shard {} of {} ({}): {} records",
                i + 1,
                shards.len(),
                path.display(),
                records
            );
            let is_last = i + 1 == shards.len();
            chunks.extend(self.flush(is_last)?);
        }
        Ok(chunks)
    }
}

/// Write one chunk file from key-ordered groups.
fn write_chunk(
    dir: &Path,
    mut groups: Vec<(ChordKey, Vec<ChordObservation>)>,
) -> Result<ChunkOverview, IndexError> {
    let (start, end) = match (groups.first(), groups.last()) {
        (Some((first, _)), Some((last, _))) => (first.clone(), last.clone()),
        _ => {
            return Err(IndexError::Serialization {
                details: "refusing to write an empty chunk".to_string(),
            })
        }
    };

    let mut index = ChunkIndex::new();
    let mut data = Vec::new();
    for (key, chords) in groups.iter_mut() {
        rank_sort(chords);
        let start = data_offset(&data)?;
        for chord in chords.iter() {
            data.extend_from_slice(&chord.tick_offset.to_le_bytes());
            data.extend_from_slice(&chord.file_id.to_le_bytes());
        }
        let end = data_offset(&data)?;
        index.insert(key.clone(), ByteRange { start, end });
    }

    let encoded_index = serde_json::to_vec(&index)?;
    let index_len = u32::try_from(encoded_index.len()).map_err(|_| IndexError::ChunkTooLarge {
        bytes: encoded_index.len() as u64,
    })?;

    let mut bytes = Vec::with_capacity(INDEX_LEN_PREFIX + encoded_index.len() + data.len());
    bytes.extend_from_slice(&index_len.to_le_bytes());
    bytes.extend_from_slice(&encoded_index);
    bytes.extend_from_slice(&data);

    let filename = format!("{}.dat", Uuid::new_v4());
    let path = dir.join(&filename);
    fs::write(&path, &bytes).map_err(|err| IndexError::io_at("writing chunk", &path, err))?;

    log::info!(
        "[ChunkBuilder] Wrote {} ({} keys, {} entries, {} to {})",
        filename,
        index.len(),
        data.len() / CHUNK_ENTRY_SIZE,
        start,
        end
    );

    Ok(ChunkOverview {
        start,
        end,
        filename,
    })
}

fn data_offset(data: &[u8]) -> Result<u32, IndexError> {
    u32::try_from(data.len()).map_err(|_| IndexError::ChunkTooLarge {
        bytes: data.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::ChordFlags;
    use std::fs::File;
    use std::io::{Seek, SeekFrom};
    use tempfile::tempdir;

    fn chord(notes: &[u8], tick_offset: u32, file_id: u32, note_on: bool) -> ChordObservation {
        ChordObservation {
            notes: notes.to_vec(),
            tick_offset,
            file_id,
            flags: ChordFlags {
                formed_by_note_on: note_on,
                ..ChordFlags::default()
            },
            rank_score: 0,
        }
    }

    fn open_chunk(dir: &Path, overview: &ChunkOverview) -> (ChunkIndex, Vec<u8>) {
        let mut file = File::open(dir.join(&overview.filename)).unwrap();
        let (index, _) = read_chunk_index(&mut file, &overview.filename).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        (index, data)
    }

    #[test]
    fn test_single_chunk_layout() {
        let dir = tempdir().unwrap();
        let store = BucketStore::new(dir.path());
        store
            .append_all(&[
                chord(&[60, 64, 67], 0, 1, false),
                chord(&[60, 65, 69], 480, 1, true),
                chord(&[60, 64, 67], 960, 2, true),
            ])
            .unwrap();

        let chunks = ChunkBuilder::new(dir.path(), 1 << 20).build(&store).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start.to_string(), "60-64-67");
        assert_eq!(chunks[0].end.to_string(), "60-65-69");
        assert!(chunks[0].filename.ends_with(".dat"));

        let (index, data) = open_chunk(dir.path(), &chunks[0]);
        let c_major = index[&ChordKey::from_notes(&[60, 64, 67])];
        assert_eq!(c_major, ByteRange { start: 0, end: 16 });
        assert_eq!(index[&ChordKey::from_notes(&[60, 65, 69])], ByteRange { start: 16, end: 24 });
        assert_eq!(data.len(), 24);

        // rank sorted: the note-on occurrence comes first
        let entries: Vec<(u32, u32)> =
            decode_entries(&data[c_major.start as usize..c_major.end as usize]).collect();
        assert_eq!(entries, vec![(960, 2), (0, 1)]);
    }

    #[test]
    fn test_index_length_prefix_matches() {
        let dir = tempdir().unwrap();
        let store = BucketStore::new(dir.path());
        store.append(&chord(&[50, 55], 7, 3, true)).unwrap();
        let chunks = ChunkBuilder::new(dir.path(), 1 << 20).build(&store).unwrap();

        let path = dir.path().join(&chunks[0].filename);
        let mut file = File::open(&path).unwrap();
        let (_, index_len) = read_chunk_index(&mut file, &chunks[0].filename).unwrap();
        let position = file.seek(SeekFrom::Current(0)).unwrap();
        assert_eq!(position, 4 + u64::from(index_len));
        assert_eq!(fs::metadata(&path).unwrap().len(), position + 8);
    }

    #[test]
    fn test_small_preferred_size_cuts_within_buffered_keys() {
        let dir = tempdir().unwrap();
        let store = BucketStore::new(dir.path());
        let mut chords = Vec::new();
        for low in [40u8, 50, 60] {
            for upper in 1..=3u8 {
                chords.push(chord(&[low, low + upper], u32::from(upper), 1, true));
            }
        }
        store.append_all(&chords).unwrap();

        // each key is 8 + 5 + 4 = 17 bytes, so 30 bytes cuts every second key
        let chunks = ChunkBuilder::new(dir.path(), 30).build(&store).unwrap();
        let ranges: Vec<(String, String)> = chunks
            .iter()
            .map(|c| (c.start.to_string(), c.end.to_string()))
            .collect();
        // the leftover 40-43 is carried into the next shard's first chunk
        assert_eq!(
            ranges,
            vec![
                ("40-41".to_string(), "40-42".to_string()),
                ("40-43".to_string(), "50-51".to_string()),
                ("50-52".to_string(), "50-53".to_string()),
                ("60-61".to_string(), "60-62".to_string()),
                ("60-63".to_string(), "60-63".to_string()),
            ]
        );
        for pair in chunks.windows(2) {
            assert!(pair[0].start <= pair[0].end);
            assert!(pair[0].end < pair[1].start);
        }

        let mut seen = 0;
        for overview in &chunks {
            let (index, _) = open_chunk(dir.path(), overview);
            assert_eq!(index.keys().next(), Some(&overview.start));
            assert_eq!(index.keys().last(), Some(&overview.end));
            seen += index.len();
        }
        assert_eq!(seen, 9);
    }

    #[test]
    fn test_unforced_flush_keeps_small_remainder() {
        let dir = tempdir().unwrap();
        let mut builder = ChunkBuilder::new(dir.path(), 1 << 20);
        builder
            .add_shard(vec![Ok(chord(&[60, 64], 0, 1, true))])
            .unwrap();
        assert!(builder.flush(false).unwrap().is_empty());
        assert_eq!(builder.pending_keys(), 1);
        assert_eq!(builder.flush(true).unwrap().len(), 1);
        assert_eq!(builder.pending_keys(), 0);
    }

    #[test]
    fn test_no_shards_no_chunks() {
        let dir = tempdir().unwrap();
        let store = BucketStore::new(dir.path());
        let chunks = ChunkBuilder::new(dir.path(), 1 << 20).build(&store).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_overview_key_comparison() {
        let overview = ChunkOverview {
            start: ChordKey::from_notes(&[50, 60]),
            end: ChordKey::from_notes(&[55, 60]),
            filename: "x.dat".to_string(),
        };
        assert!(overview.contains(&ChordKey::from_notes(&[52, 70])));
        assert_eq!(overview.cmp_key(&ChordKey::from_notes(&[40, 41])), Ordering::Greater);
        assert_eq!(overview.cmp_key(&ChordKey::from_notes(&[56, 57])), Ordering::Less);
    }

    #[test]
    fn test_truncated_index_is_corrupt() {
        let mut bytes: &[u8] = &[200, 0, 0, 0, b'{'];
        let err = read_chunk_index(&mut bytes, "bad.dat").unwrap_err();
        assert!(matches!(err, QueryError::CorruptIndex { .. }));
    }
}
