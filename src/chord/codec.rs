// Fixed-width record codec for bucket files
//
// Layout (25 bytes):
//   0..16  notes ascending, zero padded (0 marks "absent")
//   16..20 tick_offset u32 LE
//   20..24 file_id u32 LE
//   24     flags: bit 7 metadata, bit 6 note-on, bit 5 within 1s

use super::{is_chord_cardinality, ChordFlags, ChordObservation, MAX_CHORD_NOTES};
use crate::error::IndexError;

/// Size of one encoded observation in bytes
pub const RECORD_SIZE: usize = 25;

const FLAG_METADATA: u8 = 1 << 7;
const FLAG_NOTE_ON: u8 = 1 << 6;
const FLAG_WITHIN_1S: u8 = 1 << 5;

pub fn encode_flags(flags: ChordFlags) -> u8 {
    let mut bits = 0;
    if flags.has_external_metadata {
        bits |= FLAG_METADATA;
    }
    if flags.formed_by_note_on {
        bits |= FLAG_NOTE_ON;
    }
    if flags.oldest_event_within_1s {
        bits |= FLAG_WITHIN_1S;
    }
    bits
}

/// Reserved bits 0-4 are ignored.
pub fn decode_flags(bits: u8) -> ChordFlags {
    ChordFlags {
        has_external_metadata: bits & FLAG_METADATA != 0,
        formed_by_note_on: bits & FLAG_NOTE_ON != 0,
        oldest_event_within_1s: bits & FLAG_WITHIN_1S != 0,
    }
}

/// Encode an observation. Notes are written in ascending order regardless of
/// how they are stored on the observation, and repeated notes count once.
pub fn encode(chord: &ChordObservation) -> Result<[u8; RECORD_SIZE], IndexError> {
    let mut notes = chord.notes.clone();
    notes.sort_unstable();
    notes.dedup();
    if !is_chord_cardinality(notes.len()) || notes.iter().any(|&n| n == 0 || n > 127) {
        return Err(IndexError::InvalidChord { notes });
    }

    let mut buf = [0u8; RECORD_SIZE];
    buf[..notes.len()].copy_from_slice(&notes);
    buf[16..20].copy_from_slice(&chord.tick_offset.to_le_bytes());
    buf[20..24].copy_from_slice(&chord.file_id.to_le_bytes());
    buf[24] = encode_flags(chord.flags);
    Ok(buf)
}

pub fn decode(buf: &[u8; RECORD_SIZE]) -> ChordObservation {
    let notes = buf[..MAX_CHORD_NOTES]
        .iter()
        .copied()
        .filter(|&n| n != 0)
        .collect();
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[16..20]);
    let tick_offset = u32::from_le_bytes(word);
    word.copy_from_slice(&buf[20..24]);
    let file_id = u32::from_le_bytes(word);

    ChordObservation {
        notes,
        tick_offset,
        file_id,
        flags: decode_flags(buf[24]),
        rank_score: 0,
    }
}
