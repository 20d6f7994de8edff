// Event reduction - flatten MIDI tracks into absolute-time note transitions
//
// Every track accumulates its own absolute tick counter; note-on/note-off
// messages become ReducedEvents stamped with both the tick and the
// microsecond time from the file's tempo map. The result spans all tracks
// and is not ordered until `sort_events` runs.

use midly::{MetaMessage, MidiMessage, Timing, Track, TrackEventKind};

/// MIDI default tempo (120 BPM) when a file carries no tempo event
const DEFAULT_MICROS_PER_BEAT: u64 = 500_000;

/// One note transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReducedEvent {
    pub tick: u64,
    pub micros: u64,
    pub note: u8,
    pub is_note_off: bool,
}

#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    micros: u64,
    micros_per_beat: u64,
}

#[derive(Debug, Clone, Copy)]
enum Resolution {
    Metrical { ticks_per_beat: u64 },
    Timecode { micros_per_tick: f64 },
}

/// Tick -> microsecond mapping for one file.
#[derive(Debug, Clone)]
pub struct TempoMap {
    resolution: Resolution,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    /// Build from the header timing and the tempo events of every track.
    pub fn from_tracks(timing: Timing, tracks: &[Track<'_>]) -> Self {
        let resolution = match timing {
            Timing::Metrical(tpb) => Resolution::Metrical {
                ticks_per_beat: u64::from(tpb.as_int()).max(1),
            },
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = f64::from(fps.as_f32()) * f64::from(subframes.max(1));
                Resolution::Timecode {
                    micros_per_tick: 1_000_000.0 / ticks_per_second,
                }
            }
        };

        let mut changes: Vec<(u64, u64)> = Vec::new();
        for track in tracks {
            let mut tick = 0u64;
            for event in track {
                tick += u64::from(event.delta.as_int());
                if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                    changes.push((tick, u64::from(tempo.as_int())));
                }
            }
        }
        // stable: a later track's change at the same tick wins
        changes.sort_by_key(|(tick, _)| *tick);

        Self::with_changes(resolution, &changes)
    }

    /// Metrical map with explicit `(tick, micros_per_beat)` tempo changes.
    pub fn metrical(ticks_per_beat: u16, changes: &[(u64, u64)]) -> Self {
        Self::with_changes(
            Resolution::Metrical {
                ticks_per_beat: u64::from(ticks_per_beat).max(1),
            },
            changes,
        )
    }

    fn with_changes(resolution: Resolution, changes: &[(u64, u64)]) -> Self {
        let mut segments = vec![TempoSegment {
            tick: 0,
            micros: 0,
            micros_per_beat: DEFAULT_MICROS_PER_BEAT,
        }];
        if let Resolution::Metrical { ticks_per_beat } = resolution {
            for &(tick, micros_per_beat) in changes {
                let last = segments[segments.len() - 1];
                let micros = last.micros + scale(tick - last.tick, last.micros_per_beat, ticks_per_beat);
                if tick == last.tick {
                    segments.pop();
                }
                segments.push(TempoSegment {
                    tick,
                    micros,
                    micros_per_beat,
                });
            }
        }
        Self {
            resolution,
            segments,
        }
    }

    pub fn micros_at(&self, tick: u64) -> u64 {
        match self.resolution {
            Resolution::Timecode { micros_per_tick } => (tick as f64 * micros_per_tick) as u64,
            Resolution::Metrical { ticks_per_beat } => {
                let idx = self.segments.partition_point(|seg| seg.tick <= tick);
                let seg = self.segments[idx.saturating_sub(1)];
                seg.micros + scale(tick - seg.tick, seg.micros_per_beat, ticks_per_beat)
            }
        }
    }
}

fn scale(ticks: u64, micros_per_beat: u64, ticks_per_beat: u64) -> u64 {
    (u128::from(ticks) * u128::from(micros_per_beat) / u128::from(ticks_per_beat)) as u64
}

/// Flatten note transitions of every track.
///
/// Note-on with velocity 0 counts as note-off. Note number 0 is skipped since
/// the record layout uses 0 as padding. Events on `percussion_channel`
/// (0-based, as midly reports channels) are dropped.
pub fn reduce_tracks(
    tracks: &[Track<'_>],
    tempo: &TempoMap,
    percussion_channel: Option<u8>,
) -> Vec<ReducedEvent> {
    let mut events = Vec::new();
    for track in tracks {
        let mut tick = 0u64;
        for event in track {
            tick += u64::from(event.delta.as_int());
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            if percussion_channel == Some(channel.as_int()) {
                continue;
            }
            let (key, is_note_off) = match message {
                MidiMessage::NoteOn { key, vel } => (key.as_int(), vel.as_int() == 0),
                MidiMessage::NoteOff { key, .. } => (key.as_int(), true),
                _ => continue,
            };
            if key == 0 {
                continue;
            }
            events.push(ReducedEvent {
                tick,
                micros: tempo.micros_at(tick),
                note: key,
                is_note_off,
            });
        }
    }
    events
}

/// Order by time; at the same instant note-offs go first so a note released
/// and re-pressed together stays held.
pub fn sort_events(events: &mut [ReducedEvent]) {
    events.sort_by_key(|event| (event.micros, !event.is_note_off));
}
