// Search request/response model, grouping and pagination

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::engine::RawMatch;
use super::metadata::{MetadataStore, MidiMetadata, METADATA_BATCH_LIMIT};
use crate::error::{log_query_error, QueryError};
use crate::index::FileNumMap;

/// Distinct files per result page
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Body of `POST /search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(rename = "Chords", alias = "chords")]
    pub chords: Vec<Vec<u8>>,
}

impl SearchRequest {
    pub fn single(notes: Vec<u8>) -> Self {
        Self {
            chords: vec![notes],
        }
    }

    /// The one requested chord; any other count is rejected.
    pub fn single_chord(&self) -> Result<&[u8], QueryError> {
        match self.chords.as_slice() {
            [notes] => Ok(notes.as_slice()),
            other => Err(QueryError::InvalidChordCount { count: other.len() }),
        }
    }
}

/// Offsets of one file, in rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatches {
    pub file_id: u32,
    pub offsets: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_id: u32,
    /// Tick offsets
    pub offsets: Vec<u32>,
    #[serde(default)]
    pub midi_metadata: Option<MidiMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub start: usize,
    pub num_matches: usize,
    pub num_files: usize,
    pub results: Vec<SearchResult>,
}

impl SearchResponse {
    pub fn empty(start: usize) -> Self {
        Self {
            start,
            num_matches: 0,
            num_files: 0,
            results: Vec::new(),
        }
    }
}

/// Group matches per file. Files appear in order of their first match, so
/// rank order carries over to the grouping.
pub fn group_by_file(matches: &[RawMatch]) -> Vec<FileMatches> {
    let mut positions: HashMap<u32, usize> = HashMap::new();
    let mut groups: Vec<FileMatches> = Vec::new();
    for m in matches {
        let idx = *positions.entry(m.file_id).or_insert_with(|| {
            groups.push(FileMatches {
                file_id: m.file_id,
                offsets: Vec::new(),
            });
            groups.len() - 1
        });
        groups[idx].offsets.push(m.tick_offset);
    }
    groups
}

/// Page of `page_size` groups starting at group `start`.
pub fn paginate(groups: &[FileMatches], start: usize, page_size: usize) -> &[FileMatches] {
    let begin = start.min(groups.len());
    let end = begin.saturating_add(page_size).min(groups.len());
    &groups[begin..end]
}

/// Group, paginate and attach metadata.
///
/// Metadata failures are logged and leave `midi_metadata` empty; they never
/// fail the search.
pub fn build_response(
    matches: &[RawMatch],
    start: usize,
    page_size: usize,
    files: &FileNumMap,
    metadata: &dyn MetadataStore,
) -> SearchResponse {
    let groups = group_by_file(matches);
    let page = paginate(&groups, start, page_size);
    let found = lookup_metadata(page, files, metadata);

    let results = page
        .iter()
        .map(|group| SearchResult {
            file_id: group.file_id,
            offsets: group.offsets.clone(),
            midi_metadata: files
                .get(&group.file_id)
                .and_then(|path| found.get(path))
                .cloned(),
        })
        .collect();

    SearchResponse {
        start,
        num_matches: matches.len(),
        num_files: groups.len(),
        results,
    }
}

fn lookup_metadata(
    page: &[FileMatches],
    files: &FileNumMap,
    metadata: &dyn MetadataStore,
) -> HashMap<String, MidiMetadata> {
    let keys: Vec<String> = page
        .iter()
        .filter_map(|group| files.get(&group.file_id).cloned())
        .collect();

    let mut found = HashMap::new();
    for batch in keys.chunks(METADATA_BATCH_LIMIT) {
        match metadata.get_many(batch) {
            Ok(entries) => found.extend(entries),
            Err(err) => log_query_error(&err, "metadata lookup"),
        }
    }
    found
}
