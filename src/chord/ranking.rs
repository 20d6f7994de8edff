// Match ranking
//
// score = 1 * has_external_metadata + 3 * formed_by_note_on + 3 * oldest_event_within_1s

use std::cmp::Reverse;

use super::{ChordFlags, ChordObservation};

const METADATA_WEIGHT: u8 = 1;
const NOTE_ON_WEIGHT: u8 = 3;
const WITHIN_1S_WEIGHT: u8 = 3;

pub fn rank_score(flags: ChordFlags) -> u8 {
    let mut score = 0;
    if flags.has_external_metadata {
        score += METADATA_WEIGHT;
    }
    if flags.formed_by_note_on {
        score += NOTE_ON_WEIGHT;
    }
    if flags.oldest_event_within_1s {
        score += WITHIN_1S_WEIGHT;
    }
    score
}

/// Assign `rank_score` and sort descending by it, keeping insertion order
/// among equal scores.
pub fn rank_sort(chords: &mut [ChordObservation]) {
    for chord in chords.iter_mut() {
        chord.rank_score = rank_score(chord.flags);
    }
    chords.sort_by_key(|chord| Reverse(chord.rank_score));
}
