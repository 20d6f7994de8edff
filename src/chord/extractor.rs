// ChordExtractor - held-notes state machine over reduced events
//
// State is the reference-counted multiset of sounding notes. After every
// transition the current state becomes the pending candidate; the pending
// candidate is committed only once the next event is more than the
// threshold away, which coalesces near-simultaneous events into one onset.
// The last pending candidate is flushed at end of stream.

use midly::Smf;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::reducer::{reduce_tracks, sort_events, ReducedEvent, TempoMap};
use super::{
    is_chord_cardinality, ChordFlags, ChordObservation, DEFAULT_NEW_CHORD_THRESHOLD_US,
    RECENT_WINDOW_US,
};
use crate::config::IndexingConfig;
use crate::error::IndexError;

/// Currently sounding notes.
///
/// The same note can be struck again before its previous note-off arrives
/// (overlapping tracks, sloppy sequencing), so each note carries a reference
/// count and is only released once every press has been matched.
#[derive(Debug, Clone, Default)]
pub struct HeldNotes {
    counts: BTreeMap<u8, u32>,
    /// (tick, micros) of the first press of the current run
    held_since: BTreeMap<u8, (u64, u64)>,
}

impl HeldNotes {
    /// Returns true when `note` was not sounding before this press.
    pub fn press(&mut self, note: u8, tick: u64, micros: u64) -> bool {
        let count = self.counts.entry(note).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.held_since.insert(note, (tick, micros));
            return true;
        }
        false
    }

    /// Stray note-offs for notes that are not held are ignored.
    pub fn release(&mut self, note: u8) {
        if let Some(count) = self.counts.get_mut(&note) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&note);
                self.held_since.remove(&note);
            }
        }
    }

    pub fn count(&self, note: u8) -> u32 {
        self.counts.get(&note).copied().unwrap_or(0)
    }

    /// Distinct held notes, ascending.
    pub fn notes(&self) -> Vec<u8> {
        self.counts.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn held_since(&self, note: u8) -> Option<u64> {
        self.held_since.get(&note).map(|(tick, _)| *tick)
    }

    fn earliest_micros(&self) -> Option<u64> {
        self.held_since.values().map(|(_, micros)| *micros).min()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.held_since.clear();
    }
}

/// Held state right after one event, waiting to be committed.
#[derive(Debug, Clone)]
struct Candidate {
    notes: Vec<u8>,
    tick: u64,
    micros: u64,
    formed_by_note_on: bool,
    oldest_within_window: bool,
    /// a note started sounding since the previous flush
    struck: bool,
}

/// Turns sorted reduced events into chord observations.
#[derive(Debug, Clone, Copy)]
pub struct ChordExtractor {
    threshold_us: u64,
}

impl Default for ChordExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_NEW_CHORD_THRESHOLD_US)
    }
}

impl ChordExtractor {
    pub fn new(threshold_us: u64) -> Self {
        Self { threshold_us }
    }

    /// Walk `events` (already ordered by [`sort_events`]) and emit chords.
    ///
    /// A pending state is flushed when the next event is more than the
    /// threshold after it. A flushed state whose key equals the previously
    /// flushed key and that saw no new note-on is a no-op and is skipped.
    /// Only states with 2..=16 notes are emitted.
    pub fn extract(
        &self,
        events: &[ReducedEvent],
        file_id: u32,
        has_external_metadata: bool,
    ) -> Result<Vec<ChordObservation>, IndexError> {
        let mut held = HeldNotes::default();
        let mut chords = Vec::new();
        let mut last_flushed: Option<Vec<u8>> = None;
        let mut pending: Option<Candidate> = None;
        let mut struck = false;

        for event in events {
            if let Some(candidate) = pending.take() {
                if event.micros.saturating_sub(candidate.micros) > self.threshold_us {
                    let is_noop = !candidate.struck
                        && last_flushed.as_deref() == Some(candidate.notes.as_slice());
                    last_flushed = Some(candidate.notes.clone());
                    struck = false;
                    if !is_noop {
                        push_chord(&mut chords, candidate, file_id, has_external_metadata)?;
                    }
                } else {
                    pending = Some(candidate);
                }
            }

            if event.is_note_off {
                held.release(event.note);
            } else if held.press(event.note, event.tick, event.micros) {
                struck = true;
            }

            let oldest_within_window = held
                .earliest_micros()
                .map(|earliest| event.micros.saturating_sub(earliest) <= RECENT_WINDOW_US)
                .unwrap_or(false);
            pending = Some(Candidate {
                notes: held.notes(),
                tick: event.tick,
                micros: event.micros,
                formed_by_note_on: !event.is_note_off,
                oldest_within_window,
                struck,
            });
        }

        if let Some(candidate) = pending {
            push_chord(&mut chords, candidate, file_id, has_external_metadata)?;
        }

        Ok(chords)
    }
}

fn push_chord(
    chords: &mut Vec<ChordObservation>,
    candidate: Candidate,
    file_id: u32,
    has_external_metadata: bool,
) -> Result<(), IndexError> {
    if !is_chord_cardinality(candidate.notes.len()) {
        return Ok(());
    }
    let tick_offset = u32::try_from(candidate.tick).map_err(|_| IndexError::TickOverflow {
        tick: candidate.tick,
    })?;
    chords.push(ChordObservation {
        notes: candidate.notes,
        tick_offset,
        file_id,
        flags: ChordFlags {
            has_external_metadata,
            formed_by_note_on: candidate.formed_by_note_on,
            oldest_event_within_1s: candidate.oldest_within_window,
        },
        rank_score: 0,
    });
    Ok(())
}

/// Extract chords from a decoded file.
pub fn extract_smf(
    smf: &Smf<'_>,
    file_id: u32,
    has_external_metadata: bool,
    config: &IndexingConfig,
) -> Result<Vec<ChordObservation>, IndexError> {
    let tempo = TempoMap::from_tracks(smf.header.timing, &smf.tracks);
    let mut events = reduce_tracks(&smf.tracks, &tempo, config.percussion_channel);
    sort_events(&mut events);
    ChordExtractor::new(config.new_chord_threshold_us).extract(
        &events,
        file_id,
        has_external_metadata,
    )
}

/// Read, decode and extract one MIDI file.
///
/// Read and decode failures come back as skippable `MidiRead` / `MidiParse`
/// errors.
pub fn extract_file(
    path: &Path,
    file_id: u32,
    has_external_metadata: bool,
    config: &IndexingConfig,
) -> Result<Vec<ChordObservation>, IndexError> {
    let bytes = fs::read(path).map_err(|err| IndexError::MidiRead {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    let smf = Smf::parse(&bytes).map_err(|err| IndexError::MidiParse {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    extract_smf(&smf, file_id, has_external_metadata, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(micros: u64, note: u8) -> ReducedEvent {
        ReducedEvent {
            tick: micros / 1000,
            micros,
            note,
            is_note_off: false,
        }
    }

    fn off(micros: u64, note: u8) -> ReducedEvent {
        ReducedEvent {
            tick: micros / 1000,
            micros,
            note,
            is_note_off: true,
        }
    }

    fn notes(chords: &[ChordObservation]) -> Vec<Vec<u8>> {
        chords.iter().map(|c| c.notes.clone()).collect()
    }

    #[test]
    fn test_held_notes_reference_counting() {
        let mut held = HeldNotes::default();
        assert!(held.press(60, 0, 0));
        assert!(!held.press(60, 10, 10_000));
        assert_eq!(held.count(60), 2);
        assert_eq!(held.held_since(60), Some(0));

        held.release(60);
        assert_eq!(held.notes(), vec![60]);
        held.release(60);
        assert!(held.is_empty());
        assert_eq!(held.held_since(60), None);

        held.release(61);
        assert!(held.is_empty());
    }

    #[test]
    fn test_close_onsets_coalesce_into_one_chord() {
        let events = vec![on(0, 60), on(1_000, 64), off(500_000, 60), off(500_000, 64)];
        let chords = ChordExtractor::default().extract(&events, 1, false).unwrap();
        assert_eq!(notes(&chords), vec![vec![60, 64]]);
        assert_eq!(chords[0].tick_offset, 1);
        assert!(chords[0].flags.formed_by_note_on);
    }

    #[test]
    fn test_separated_onsets_emit_each_state() {
        let events = vec![
            on(0, 60),
            on(0, 64),
            on(100_000, 67),
            off(200_000, 60),
            off(200_000, 64),
            off(200_000, 67),
        ];
        let chords = ChordExtractor::default().extract(&events, 1, false).unwrap();
        assert_eq!(notes(&chords), vec![vec![60, 64], vec![60, 64, 67]]);
    }

    #[test]
    fn test_cardinality_filter() {
        // single notes never form a chord
        let single = vec![on(0, 60), off(100_000, 60), on(200_000, 62), off(300_000, 62)];
        assert!(ChordExtractor::default()
            .extract(&single, 1, false)
            .unwrap()
            .is_empty());

        // 17 simultaneous notes are dropped, the 16-note state after a release is kept
        let mut big: Vec<ReducedEvent> = (40..57).map(|n| on(0, n)).collect();
        big.push(off(100_000, 56));
        big.extend((40..56).map(|n| off(200_000, n)));
        let chords = ChordExtractor::default().extract(&big, 1, false).unwrap();
        assert_eq!(chords.len(), 1);
        assert_eq!(chords[0].notes.len(), 16);
        assert!(!chords[0].flags.formed_by_note_on);
    }

    #[test]
    fn test_retrigger_without_release_is_suppressed() {
        // 60 pressed twice, one release leaves the chord unchanged
        let events = vec![
            on(0, 60),
            on(0, 64),
            on(0, 60),
            off(100_000, 60),
            off(300_000, 60),
            off(300_000, 64),
        ];
        let chords = ChordExtractor::default().extract(&events, 1, false).unwrap();
        assert_eq!(notes(&chords), vec![vec![60, 64]]);
    }

    #[test]
    fn test_retrigger_of_held_note_adds_no_chord() {
        // 60 struck again mid-chord while still sounding
        let events = vec![
            on(0, 60),
            on(0, 64),
            on(0, 67),
            on(500_000, 60),
            off(1_000_000, 60),
            off(1_000_000, 60),
            off(1_000_000, 64),
            off(1_000_000, 67),
        ];
        let chords = ChordExtractor::default().extract(&events, 1, false).unwrap();
        assert_eq!(notes(&chords), vec![vec![60, 64, 67]]);
        assert_eq!(chords[0].tick_offset, 0);
    }

    #[test]
    fn test_restruck_chord_is_a_new_onset() {
        let events = vec![
            on(0, 60),
            on(0, 64),
            off(500_000, 60),
            off(500_000, 64),
            on(500_000, 60),
            on(500_000, 64),
            off(1_000_000, 60),
            off(1_000_000, 64),
        ];
        let chords = ChordExtractor::default().extract(&events, 3, false).unwrap();
        let offsets: Vec<u32> = chords.iter().map(|c| c.tick_offset).collect();
        assert_eq!(notes(&chords), vec![vec![60, 64], vec![60, 64]]);
        assert_eq!(offsets, vec![0, 500]);
        assert!(chords.iter().all(|c| c.file_id == 3));
    }

    #[test]
    fn test_oldest_event_window() {
        let events = vec![
            on(0, 48),
            on(500_000, 60),
            on(1_500_000, 64),
            off(2_000_000, 48),
            off(2_000_000, 60),
            off(2_000_000, 64),
        ];
        let chords = ChordExtractor::default().extract(&events, 1, true).unwrap();
        assert_eq!(notes(&chords), vec![vec![48, 60], vec![48, 60, 64]]);
        assert!(chords[0].flags.oldest_event_within_1s);
        assert!(!chords[1].flags.oldest_event_within_1s);
        assert!(chords.iter().all(|c| c.flags.has_external_metadata));
    }

    #[test]
    fn test_final_state_is_flushed() {
        let events = vec![on(0, 60), on(0, 64), on(0, 67)];
        let chords = ChordExtractor::default().extract(&events, 1, false).unwrap();
        assert_eq!(notes(&chords), vec![vec![60, 64, 67]]);
    }

    #[test]
    fn test_custom_threshold() {
        let events = vec![on(0, 60), on(0, 64), on(50_000, 67), off(200_000, 60)];
        let wide = ChordExtractor::new(100_000).extract(&events, 1, false).unwrap();
        assert_eq!(notes(&wide), vec![vec![60, 64, 67], vec![64, 67]]);
    }

    #[test]
    fn test_tick_overflow_is_rejected() {
        let events = vec![
            ReducedEvent { tick: 1 << 32, micros: 0, note: 60, is_note_off: false },
            ReducedEvent { tick: 1 << 32, micros: 0, note: 64, is_note_off: false },
        ];
        let err = ChordExtractor::default().extract(&events, 1, false).unwrap_err();
        assert_eq!(err, IndexError::TickOverflow { tick: 1 << 32 });
    }
}
