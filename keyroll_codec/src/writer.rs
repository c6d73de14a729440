// MIDI output from piano rolls.
//
// Converts a (normally repaired) PianoRoll into a Standard MIDI File with a
// fixed layout:
// - Header: SMF Format 1 (multi-track), 2 tracks, `ticks_per_quarter`
//   (240 by default).
// - Track 1: time signature meta event (4/4 by default), end of track.
// - Track 2: one `NoteOn` per non-idle cell in tick then key order. A press
//   carries its velocity, a release carries velocity 0. End of track falls
//   one tick past the last row.
//
// A roll row is one MIDI tick, so delta times are plain row differences.
// Uses the `midly` crate for MIDI writing.

use crate::config::WriterConfig;
use crate::error::{CodecError, Result};
use crate::roll::{KeyAction, PianoRoll, key_pitch};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u28},
};
use std::path::Path;
use tracing::debug;

/// Largest delta time a track event can carry.
const MAX_DELTA: u32 = (1 << 28) - 1;

/// Convert a roll to MIDI and write to a file.
pub fn write_midi(roll: &PianoRoll, path: &Path, config: &WriterConfig) -> Result<()> {
    let smf = roll_to_smf(roll, config);
    let mut buf = Vec::new();
    smf.write_std(&mut buf).map_err(|e| CodecError::io(path, e))?;
    std::fs::write(path, &buf).map_err(|e| CodecError::io(path, e))?;
    debug!(path = %path.display(), rows = roll.len(), bytes = buf.len(), "wrote MIDI file");
    Ok(())
}

/// Convert a roll to an in-memory SMF.
pub fn roll_to_smf(roll: &PianoRoll, config: &WriterConfig) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(config.ticks_per_quarter.min(0x7FFF))),
    ));

    // Track 1: meter
    let [numerator, denominator_log2, clocks_per_click, thirty_seconds] = config.time_signature;
    let meter_track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
                numerator,
                denominator_log2,
                clocks_per_click,
                thirty_seconds,
            )),
        },
        end_of_track(0),
    ];
    smf.tracks.push(meter_track);

    // Track 2: notes
    let channel = u4::new(config.channel.min(15));
    let mut track: Track<'static> = Vec::new();
    let mut last_event_tick = 0;

    for (tick, key, cell) in roll.active_cells() {
        let vel = match cell.action {
            // A zero-velocity NoteOn would read back as a release.
            KeyAction::Press => cell.velocity.clamp(1, 127),
            _ => 0,
        };
        track.push(TrackEvent {
            delta: delta(tick - last_event_tick),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key: u7::new(key_pitch(key)),
                    vel: u7::new(vel),
                },
            },
        });
        last_event_tick = tick;
    }

    track.push(end_of_track(roll.len() - last_event_tick));
    smf.tracks.push(track);

    smf
}

fn end_of_track(ticks: usize) -> TrackEvent<'static> {
    TrackEvent {
        delta: delta(ticks),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

fn delta(ticks: usize) -> u28 {
    u28::new(u32::try_from(ticks).unwrap_or(MAX_DELTA).min(MAX_DELTA))
}
