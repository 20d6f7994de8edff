// BucketStore - append-only shard files grouped by lowest note
//
// Shard `n` lives at `<dir>/NNN.dat` (zero padded) and holds a plain
// concatenation of 25-byte records. Appends open the shard, write and close
// it again; nothing is cached between calls.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::chord::{decode, encode, ChordObservation, RECORD_SIZE};
use crate::error::IndexError;

#[derive(Debug, Clone)]
pub struct BucketStore {
    dir: PathBuf,
}

impl BucketStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shard_path(&self, shard: u8) -> PathBuf {
        self.dir.join(format!("{:03}.dat", shard))
    }

    /// Append one observation to the shard of its lowest note.
    pub fn append(&self, chord: &ChordObservation) -> Result<(), IndexError> {
        let record = encode(chord)?;
        // encode guarantees at least two notes
        let shard = chord.lowest_note().unwrap_or_default();
        self.write_records(shard, &[record])
    }

    /// Append many observations, opening each touched shard once.
    ///
    /// Records keep their relative order inside every shard.
    pub fn append_all(&self, chords: &[ChordObservation]) -> Result<usize, IndexError> {
        let mut by_shard: BTreeMap<u8, Vec<[u8; RECORD_SIZE]>> = BTreeMap::new();
        for chord in chords {
            let record = encode(chord)?;
            let shard = chord.lowest_note().unwrap_or_default();
            by_shard.entry(shard).or_default().push(record);
        }
        for (shard, records) in &by_shard {
            self.write_records(*shard, records)?;
        }
        Ok(chords.len())
    }

    fn write_records(&self, shard: u8, records: &[[u8; RECORD_SIZE]]) -> Result<(), IndexError> {
        let path = self.shard_path(shard);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| IndexError::io_at("opening bucket", &path, err))?;
        let mut buf = Vec::with_capacity(records.len() * RECORD_SIZE);
        for record in records {
            buf.extend_from_slice(record);
        }
        file.write_all(&buf)
            .map_err(|err| IndexError::io_at("writing bucket", &path, err))
    }

    /// Existing shard files, ascending by shard id.
    pub fn shard_paths(&self) -> Result<Vec<PathBuf>, IndexError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(IndexError::io_at("listing buckets in", &self.dir, err)),
        };

        let mut shards = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| IndexError::io_at("listing buckets in", &self.dir, err))?;
            if let Some(id) = entry.file_name().to_str().and_then(shard_id) {
                shards.push((id, entry.path()));
            }
        }
        shards.sort_by_key(|(id, _)| *id);
        Ok(shards.into_iter().map(|(_, path)| path).collect())
    }

    pub fn read_shard(&self, path: &Path) -> Result<BucketReader, IndexError> {
        BucketReader::open(path)
    }

    /// Remove every `NNN.dat` shard and nothing else.
    pub fn delete_all(&self) -> Result<usize, IndexError> {
        let paths = self.shard_paths()?;
        for path in &paths {
            fs::remove_file(path).map_err(|err| IndexError::io_at("deleting bucket", path, err))?;
        }
        Ok(paths.len())
    }
}

/// Shard id of a `NNN.dat` file name.
pub fn shard_id(name: &str) -> Option<u16> {
    let digits = name.strip_suffix(".dat")?;
    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Sequential record scan over one shard.
///
/// A trailing partial record yields `CorruptBucket` once and ends the scan.
pub struct BucketReader {
    path: PathBuf,
    reader: BufReader<File>,
    consumed: u64,
    done: bool,
}

impl BucketReader {
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let file = File::open(path).map_err(|err| IndexError::io_at("opening bucket", path, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            consumed: 0,
            done: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for BucketReader {
    type Item = Result<ChordObservation, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(IndexError::io_at("reading bucket", &self.path, err)));
                }
            }
        }

        match filled {
            0 => {
                self.done = true;
                None
            }
            RECORD_SIZE => {
                self.consumed += RECORD_SIZE as u64;
                Some(Ok(decode(&buf)))
            }
            partial => {
                self.done = true;
                Some(Err(IndexError::CorruptBucket {
                    path: self.path.display().to_string(),
                    len: self.consumed + partial as u64,
                }))
            }
        }
    }
}
