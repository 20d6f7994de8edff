//! Synthetic MIDI fixtures.
//!
//! Unit tests, integration tests and the CLI smoke tests build small
//! standard MIDI files here instead of shipping binary fixtures.

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::io;
use std::path::Path;

/// Ticks per quarter used by the stock fixtures
pub const FIXTURE_TICKS_PER_BEAT: u16 = 480;

/// One sounding note, in absolute ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteSpan {
    pub channel: u8,
    pub key: u8,
    pub start: u32,
    pub end: u32,
}

impl NoteSpan {
    pub fn new(key: u8, start: u32, end: u32) -> Self {
        Self {
            channel: 0,
            key,
            start,
            end,
        }
    }

    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }
}

/// Builds a metrical SMF from note spans.
#[derive(Debug, Clone)]
pub struct MidiFileBuilder {
    ticks_per_beat: u16,
    micros_per_beat: Option<u32>,
    tracks: Vec<Vec<NoteSpan>>,
}

impl MidiFileBuilder {
    pub fn new(ticks_per_beat: u16) -> Self {
        Self {
            ticks_per_beat,
            micros_per_beat: None,
            tracks: Vec::new(),
        }
    }

    /// Emit a tempo event at tick 0 of the first track.
    pub fn tempo(mut self, micros_per_beat: u32) -> Self {
        self.micros_per_beat = Some(micros_per_beat);
        self
    }

    pub fn track(mut self, notes: Vec<NoteSpan>) -> Self {
        self.tracks.push(notes);
        self
    }

    /// Add a block chord to the first track.
    pub fn chord(mut self, keys: &[u8], start: u32, end: u32) -> Self {
        if self.tracks.is_empty() {
            self.tracks.push(Vec::new());
        }
        self.tracks[0].extend(keys.iter().map(|&key| NoteSpan::new(key, start, end)));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let tracks: Vec<Vec<TrackEvent<'static>>> = self
            .tracks
            .iter()
            .enumerate()
            .map(|(i, notes)| {
                let tempo = if i == 0 { self.micros_per_beat } else { None };
                encode_track(notes, tempo)
            })
            .collect();
        let format = if tracks.len() > 1 {
            Format::Parallel
        } else {
            Format::SingleTrack
        };
        let smf = Smf {
            header: Header::new(format, Timing::Metrical(u15::from(self.ticks_per_beat))),
            tracks,
        };

        let mut bytes = Vec::new();
        // writing into a Vec cannot fail for well-formed tracks
        if let Err(err) = smf.write_std(&mut bytes) {
            log::error!("[Fixtures] Failed to encode synthetic MIDI: {}", err);
        }
        bytes
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.build())
    }
}

fn encode_track(notes: &[NoteSpan], micros_per_beat: Option<u32>) -> Vec<TrackEvent<'static>> {
    // (tick, is_note_on, channel, key): releases sort before presses at a tick
    let mut timeline: Vec<(u32, bool, u8, u8)> = Vec::with_capacity(notes.len() * 2);
    for note in notes {
        timeline.push((note.start, true, note.channel, note.key));
        timeline.push((note.end, false, note.channel, note.key));
    }
    timeline.sort_by_key(|&(tick, is_on, _, _)| (tick, is_on));

    let mut events = Vec::with_capacity(timeline.len() + 2);
    if let Some(tempo) = micros_per_beat {
        events.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(tempo))),
        });
    }

    let mut last = 0u32;
    for (tick, is_on, channel, key) in timeline {
        let message = if is_on {
            MidiMessage::NoteOn {
                key: u7::from(key),
                vel: u7::from(100),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::from(key),
                vel: u7::from(0),
            }
        };
        events.push(TrackEvent {
            delta: u28::from(tick - last),
            kind: TrackEventKind::Midi {
                channel: u4::from(channel),
                message,
            },
        });
        last = tick;
    }
    events.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    events
}

/// C major, F major, C major, one quarter each at 120 BPM.
///
/// Chords start at ticks 0, 480 and 960 (0 s, 0.5 s and 1 s).
pub fn chord_progression_fixture() -> Vec<u8> {
    MidiFileBuilder::new(FIXTURE_TICKS_PER_BEAT)
        .tempo(500_000)
        .chord(&[60, 64, 67], 0, 480)
        .chord(&[60, 65, 69], 480, 960)
        .chord(&[60, 64, 67], 960, 1440)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_parses_back() {
        let bytes = chord_progression_fixture();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::from(480)));

        let note_ons = smf.tracks[0]
            .iter()
            .filter(|e| matches!(e.kind, TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. }))
            .count();
        assert_eq!(note_ons, 9);
    }

    #[test]
    fn test_release_precedes_press_at_same_tick() {
        let bytes = MidiFileBuilder::new(96)
            .chord(&[60, 64], 0, 96)
            .chord(&[62, 65], 96, 192)
            .build();
        let smf = Smf::parse(&bytes).unwrap();
        let kinds: Vec<bool> = smf.tracks[0]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. } => Some(true),
                TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. } => Some(false),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![true, true, false, false, true, true, false, false]);
    }

    #[test]
    fn test_multi_track_is_parallel() {
        let bytes = MidiFileBuilder::new(480)
            .track(vec![NoteSpan::new(60, 0, 480)])
            .track(vec![NoteSpan::new(36, 0, 480).on_channel(9)])
            .build();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.tracks.len(), 2);
    }
}
