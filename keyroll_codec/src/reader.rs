// Event reader: Standard MIDI File bytes -> note events for one track.
//
// Tracks are numbered from 1 in file order (track 1 is the first `MTrk`
// chunk), so the default selector of 2 picks the first track after the
// conductor track, which is where single-instrument piano files keep their
// notes and where `writer.rs` puts them.
//
// Only note activity survives: `NoteOn` (velocity 0 means release) and,
// when enabled in `ReaderConfig`, `NoteOff` as a release. Everything else
// is dropped. An event at or past `max_rows` ends the track. Absolute
// ticks are the running sum of delta times, so the output is in
// non-decreasing tick order.
//
// Malformed input is absorbed with a warning wherever the file structure
// allows it. Only an unreadable file or a broken header is an error.

use crate::config::ReaderConfig;
use crate::error::{CodecError, Result};
use crate::roll::key_index;
use midly::{MidiMessage, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// One note-activity event on one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Absolute tick from the start of the track.
    pub tick: u32,
    pub pitch: u8,
    /// 0 means release.
    pub velocity: u8,
    /// 1-based track number the event came from.
    pub track: usize,
}

/// Read the note events of the configured track from a file.
pub fn read_file(path: &Path, config: &ReaderConfig) -> Result<Vec<NoteEvent>> {
    let bytes = std::fs::read(path).map_err(|e| CodecError::io(path, e))?;
    let events = read_events(&bytes, config)?;
    debug!(
        path = %path.display(),
        track = config.track,
        events = events.len(),
        "read note events"
    );
    Ok(events)
}

/// Read the note events of the configured track from in-memory SMF bytes.
pub fn read_events(bytes: &[u8], config: &ReaderConfig) -> Result<Vec<NoteEvent>> {
    let (_header, mut tracks) = midly::parse(bytes)?;

    let Some(index) = config.track.checked_sub(1) else {
        warn!("track numbers start at 1; track 0 selects nothing");
        return Ok(Vec::new());
    };

    let track_events = match tracks.nth(index) {
        Some(Ok(events)) => events,
        Some(Err(err)) => {
            warn!(track = config.track, %err, "selected track is unreadable, skipping");
            return Ok(Vec::new());
        }
        None => {
            warn!(track = config.track, "file has no such track");
            return Ok(Vec::new());
        }
    };

    let mut out = Vec::new();
    let mut tick: u32 = 0;

    for (position, event) in track_events.enumerate() {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                // Delta times are variable-length, so nothing after a bad
                // event can be located reliably.
                warn!(
                    track = config.track,
                    position,
                    %err,
                    "malformed event, dropping the rest of the track"
                );
                break;
            }
        };
        tick = tick.saturating_add(event.delta.as_int());
        if tick as usize >= config.max_rows {
            warn!(
                track = config.track,
                tick,
                max_rows = config.max_rows,
                "event past the row limit, dropping the rest of the track"
            );
            break;
        }

        let TrackEventKind::Midi { message, .. } = event.kind else {
            continue;
        };
        let (pitch, velocity) = match message {
            MidiMessage::NoteOn { key, vel } => (key.as_int(), vel.as_int()),
            MidiMessage::NoteOff { key, .. } if config.note_off_as_release => (key.as_int(), 0),
            _ => continue,
        };

        if key_index(pitch).is_none() {
            warn!(tick, pitch, "pitch outside the 88-key window, skipping");
            continue;
        }

        out.push(NoteEvent {
            tick,
            pitch,
            velocity,
            track: config.track,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u7, u15, u28};
    use midly::{Format, Header, MetaMessage, Smf, Timing, Track, TrackEvent};

    fn note(delta: u32, message: MidiMessage) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        }
    }

    fn end() -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }
    }

    fn two_track_file(body: Track<'static>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(240)),
        ));
        smf.tracks.push(vec![end()]);
        smf.tracks.push(body);
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        buf
    }

    fn on(key: u8, vel: u8) -> MidiMessage {
        MidiMessage::NoteOn {
            key: u7::new(key),
            vel: u7::new(vel),
        }
    }

    #[test]
    fn accumulates_delta_times_into_absolute_ticks() {
        let bytes = two_track_file(vec![
            note(5, on(60, 100)),
            note(0, on(64, 90)),
            note(10, on(60, 0)),
            end(),
        ]);
        let events = read_events(&bytes, &ReaderConfig::default()).unwrap();
        let triples: Vec<_> = events.iter().map(|e| (e.tick, e.pitch, e.velocity)).collect();
        assert_eq!(triples, vec![(5, 60, 100), (5, 64, 90), (15, 60, 0)]);
        assert!(events.iter().all(|e| e.track == 2));
    }

    #[test]
    fn note_off_counts_as_release_only_when_enabled() {
        let bytes = two_track_file(vec![
            note(0, on(60, 100)),
            note(4, MidiMessage::NoteOff {
                key: u7::new(60),
                vel: u7::new(64),
            }),
            end(),
        ]);

        let events = read_events(&bytes, &ReaderConfig::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].velocity, 100);

        let config = ReaderConfig {
            note_off_as_release: true,
            ..ReaderConfig::default()
        };
        let events = read_events(&bytes, &config).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!((events[1].tick, events[1].velocity), (4, 0));
    }

    #[test]
    fn events_past_the_row_limit_end_the_track() {
        let bytes = two_track_file(vec![
            note(3, on(60, 100)),
            note(0x0FFF_FFFF, on(60, 0)),
            note(0, on(62, 80)),
            end(),
        ]);
        let events = read_events(&bytes, &ReaderConfig::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tick, 3);

        let config = ReaderConfig {
            max_rows: 3,
            ..ReaderConfig::default()
        };
        assert!(read_events(&bytes, &config).unwrap().is_empty());
    }

    #[test]
    fn non_note_messages_and_off_keyboard_pitches_are_dropped() {
        let bytes = two_track_file(vec![
            note(0, MidiMessage::ProgramChange {
                program: u7::new(3),
            }),
            note(1, on(5, 80)),
            note(1, on(60, 80)),
            end(),
        ]);
        let events = read_events(&bytes, &ReaderConfig::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tick, 2);
    }

    #[test]
    fn missing_track_yields_no_events() {
        let bytes = two_track_file(vec![note(0, on(60, 100)), end()]);
        let config = ReaderConfig {
            track: 7,
            ..ReaderConfig::default()
        };
        assert!(read_events(&bytes, &config).unwrap().is_empty());

        let config = ReaderConfig {
            track: 0,
            ..ReaderConfig::default()
        };
        assert!(read_events(&bytes, &config).unwrap().is_empty());
    }

    #[test]
    fn garbage_header_is_an_error() {
        assert!(matches!(
            read_events(b"not a midi file", &ReaderConfig::default()),
            Err(CodecError::Midi(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_file(Path::new("/nonexistent/keyroll.mid"), &ReaderConfig::default())
            .unwrap_err();
        assert!(matches!(err, CodecError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/keyroll.mid"));
    }
}
