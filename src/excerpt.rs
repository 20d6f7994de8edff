// Excerpt - short playable slice of a source file starting at a match
//
// Per track, non-note events before the offset are kept with their delta
// collapsed to at most one tick, so tempo, program and controller state
// still apply. From the offset onward events keep their real spacing, and
// the track ends after `max_note_events` note-on/note-off events.

use midly::num::u28;
use midly::{MetaMessage, MidiMessage, Smf, TrackEvent, TrackEventKind};

use crate::error::QueryError;

/// Default note events per track
pub const DEFAULT_EXCERPT_NOTE_EVENTS: usize = 10;

fn is_note_event(kind: &TrackEventKind<'_>) -> bool {
    matches!(
        kind,
        TrackEventKind::Midi {
            message: MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. },
            ..
        }
    )
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

/// Re-encode `bytes` as an excerpt starting at `tick_offset`.
pub fn excerpt(bytes: &[u8], tick_offset: u32, max_note_events: usize) -> Result<Vec<u8>, QueryError> {
    let smf = Smf::parse(bytes).map_err(|err| QueryError::Excerpt {
        details: err.to_string(),
    })?;
    let offset = u64::from(tick_offset);

    let mut tracks = Vec::with_capacity(smf.tracks.len());
    for track in &smf.tracks {
        let mut out: Vec<TrackEvent<'_>> = Vec::new();
        let mut tick = 0u64;
        let mut anchor = offset;
        let mut notes = 0usize;

        for event in track {
            tick += u64::from(event.delta.as_int());
            if matches!(event.kind, TrackEventKind::Meta(MetaMessage::EndOfTrack)) {
                break;
            }

            if tick < offset {
                if !is_note_event(&event.kind) {
                    out.push(TrackEvent {
                        delta: u28::from(event.delta.as_int().min(1)),
                        kind: event.kind,
                    });
                }
                continue;
            }

            let delta = u32::try_from(tick - anchor).unwrap_or(u32::MAX);
            anchor = tick;
            out.push(TrackEvent {
                delta: u28::from(delta),
                kind: event.kind,
            });
            if is_note_event(&event.kind) {
                notes += 1;
                if notes >= max_note_events {
                    break;
                }
            }
        }
        out.push(end_of_track());
        tracks.push(out);
    }

    let clipped = Smf {
        header: smf.header,
        tracks,
    };
    let mut buf = Vec::new();
    clipped.write_std(&mut buf).map_err(|err| QueryError::Excerpt {
        details: err.to_string(),
    })?;
    Ok(buf)
}
