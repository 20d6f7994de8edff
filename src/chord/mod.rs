//! Chord model shared by extraction, storage and search.
//!
//! A chord is identified by its [`ChordKey`]: the sorted, de-duplicated note
//! numbers, rendered as `"60-64-67"`. Keys order by note sequence rather than
//! by their string form, so every key whose lowest note is `n` sorts before
//! every key whose lowest note is `n + 1`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub mod codec;
pub mod extractor;
pub mod ranking;
pub mod reducer;

pub use codec::{decode, encode, RECORD_SIZE};
pub use extractor::{extract_file, extract_smf, ChordExtractor, HeldNotes};
pub use ranking::{rank_score, rank_sort};
pub use reducer::{reduce_tracks, sort_events, ReducedEvent, TempoMap};

/// Smallest note count that forms a chord
pub const MIN_CHORD_NOTES: usize = 2;

/// Largest note count a record can hold
pub const MAX_CHORD_NOTES: usize = 16;

/// Default minimum separation between onsets, in microseconds
pub const DEFAULT_NEW_CHORD_THRESHOLD_US: u64 = 10_000;

/// Window for the `oldest_event_within_1s` flag, in microseconds
pub const RECENT_WINDOW_US: u64 = 1_000_000;

/// True when `count` notes may be materialized as a chord.
pub fn is_chord_cardinality(count: usize) -> bool {
    (MIN_CHORD_NOTES..=MAX_CHORD_NOTES).contains(&count)
}

/// Canonical lookup key of a chord.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChordKey(Vec<u8>);

impl ChordKey {
    /// Build a key from notes in any order; duplicates collapse.
    pub fn from_notes(notes: &[u8]) -> Self {
        let mut sorted = notes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        ChordKey(sorted)
    }

    pub fn notes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Byte length of the `-`-joined form.
    pub fn encoded_len(&self) -> usize {
        let digits: usize = self
            .0
            .iter()
            .map(|note| match note {
                0..=9 => 1,
                10..=99 => 2,
                _ => 3,
            })
            .sum();
        digits + self.0.len().saturating_sub(1)
    }
}

/// Key string of `notes`, e.g. `[64, 60, 67]` -> `"60-64-67"`.
pub fn chord_key(notes: &[u8]) -> String {
    ChordKey::from_notes(notes).to_string()
}

impl fmt::Display for ChordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, note) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{}", note)?;
        }
        Ok(())
    }
}

/// Error returned when a key string is not `-`-joined note numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChordKeyError(String);

impl fmt::Display for ParseChordKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid chord key {:?}", self.0)
    }
}

impl std::error::Error for ParseChordKeyError {}

impl FromStr for ChordKey {
    type Err = ParseChordKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(ChordKey::default());
        }
        let notes = s
            .split('-')
            .map(|part| part.parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ParseChordKeyError(s.to_string()))?;
        Ok(ChordKey::from_notes(&notes))
    }
}

impl Serialize for ChordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChordKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-observation flags used for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChordFlags {
    /// Source file has an entry in the metadata store
    pub has_external_metadata: bool,
    /// Chord changed because a note was pressed, not released
    pub formed_by_note_on: bool,
    /// Earliest held note started at most 1s before the trigger
    pub oldest_event_within_1s: bool,
}

/// One committed chord occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChordObservation {
    /// Sorted ascending, 2..=16 distinct notes
    pub notes: Vec<u8>,
    pub tick_offset: u32,
    /// 1-based; 0 means unassigned
    pub file_id: u32,
    pub flags: ChordFlags,
    /// Only meaningful after [`rank_sort`]
    pub rank_score: u8,
}

impl ChordObservation {
    pub fn key(&self) -> ChordKey {
        ChordKey::from_notes(&self.notes)
    }

    /// Shard id of this observation.
    pub fn lowest_note(&self) -> Option<u8> {
        self.notes.iter().copied().min()
    }
}
