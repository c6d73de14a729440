// The symbol codec: piano rolls to symbol ids and back.
//
// A `Codec` owns the two dictionaries (note vectors, velocity lists) and is
// the only way symbols are made or read. The lifecycle is:
//
// 1. `build` expands note events into a roll and interns every row's two
//    projections, growing the dictionaries in first-seen order.
// 2. `encode_notes` / `encode_speeds` map rows to ids. Encoding a row that
//    was never interned is a lookup failure; encoding is only defined for
//    rolls this codec has already seen.
// 3. Ids go out to external collaborators (predictors, filters) and come
//    back, possibly as physically impossible sequences.
// 4. `decode_*` maps ids back; `repair` makes the result valid; `write_midi`
//    serializes it.
//
// Ids are meaningless outside the codec that assigned them. `save`/`load`
// persist both dictionaries as JSON so a later process can decode ids
// against the same dictionaries.
//
// See also: `held.rs` for the feature-deriving variant that composes a
// `Codec`, `repair.rs` for the repair state machine.

use crate::config::{ReaderConfig, WriterConfig};
use crate::dictionary::{SymbolDictionary, SymbolId};
use crate::error::{CodecError, Result, SymbolKind};
use crate::held::{self, HeldState};
use crate::reader::{self, NoteEvent};
use crate::repair::{RepairedRoll, Repairer};
use crate::roll::{KeyAction, NUM_KEYS, NoteVector, PianoRoll, SpeedVector};
use crate::writer;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Paired note and speed id sequences for one piece.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSequence {
    pub notes: Vec<SymbolId>,
    pub speeds: Vec<SymbolId>,
}

impl SymbolSequence {
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Append another sequence (multi-file corpora are concatenated).
    pub fn extend(&mut self, other: SymbolSequence) {
        self.notes.extend(other.notes);
        self.speeds.extend(other.speeds);
    }
}

/// On-disk form of both dictionaries: values in id order.
#[derive(Serialize, Deserialize)]
struct DictionaryFile {
    notes: Vec<NoteVector>,
    speeds: Vec<SpeedVector>,
}

/// The capability interface shared by `Codec` and the codecs that
/// compose it.
pub trait SymbolCodec {
    fn codec(&self) -> &Codec;

    fn codec_mut(&mut self) -> &mut Codec;

    /// Expand events into a roll, registering its rows.
    fn build(&mut self, events: &[NoteEvent]) -> PianoRoll {
        Codec::build(self.codec_mut(), events)
    }

    fn intern_note(&mut self, notes: NoteVector) -> SymbolId {
        self.codec_mut().notes.intern(notes)
    }

    fn intern_speed(&mut self, speeds: SpeedVector) -> SymbolId {
        self.codec_mut().speeds.intern(speeds)
    }

    fn resolve_note(&self, id: SymbolId) -> Result<&NoteVector> {
        self.codec().notes.resolve(id)
    }

    fn resolve_speed(&self, id: SymbolId) -> Result<&SpeedVector> {
        self.codec().speeds.resolve(id)
    }
}

#[derive(Debug, Clone)]
pub struct Codec {
    notes: SymbolDictionary<NoteVector>,
    speeds: SymbolDictionary<SpeedVector>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolCodec for Codec {
    fn codec(&self) -> &Codec {
        self
    }

    fn codec_mut(&mut self) -> &mut Codec {
        self
    }
}

impl Codec {
    /// A codec with empty dictionaries.
    pub fn new() -> Self {
        Self {
            notes: SymbolDictionary::new(SymbolKind::Note),
            speeds: SymbolDictionary::new(SymbolKind::Speed),
        }
    }

    pub fn notes(&self) -> &SymbolDictionary<NoteVector> {
        &self.notes
    }

    pub fn speeds(&self) -> &SymbolDictionary<SpeedVector> {
        &self.speeds
    }

    /// Expand events into a roll and register every row.
    pub fn build(&mut self, events: &[NoteEvent]) -> PianoRoll {
        let roll = PianoRoll::from_events(events);
        self.register(&roll);
        roll
    }

    /// Intern both projections of every row of `roll`, in row order.
    pub fn register(&mut self, roll: &PianoRoll) {
        let (notes_before, speeds_before) = (self.notes.len(), self.speeds.len());
        for t in 0..roll.len() {
            self.notes.intern(roll.note_vector(t));
            self.speeds.intern(roll.speed_vector(t));
        }
        debug!(
            rows = roll.len(),
            new_notes = self.notes.len() - notes_before,
            new_speeds = self.speeds.len() - speeds_before,
            "registered roll"
        );
    }

    pub fn encode_notes(&self, roll: &PianoRoll) -> Result<Vec<SymbolId>> {
        (0..roll.len())
            .map(|row| {
                self.notes
                    .lookup(&roll.note_vector(row))
                    .ok_or(CodecError::UnknownNoteVector { row })
            })
            .collect()
    }

    pub fn encode_speeds(&self, roll: &PianoRoll) -> Result<Vec<SymbolId>> {
        (0..roll.len())
            .map(|row| {
                self.speeds
                    .lookup(&roll.speed_vector(row))
                    .ok_or(CodecError::UnknownSpeedVector { row })
            })
            .collect()
    }

    pub fn encode(&self, roll: &PianoRoll) -> Result<SymbolSequence> {
        Ok(SymbolSequence {
            notes: self.encode_notes(roll)?,
            speeds: self.encode_speeds(roll)?,
        })
    }

    pub fn decode_notes(&self, ids: &[SymbolId]) -> Result<Vec<NoteVector>> {
        ids.iter()
            .map(|&id| self.notes.resolve(id).cloned())
            .collect()
    }

    pub fn decode_speeds(&self, ids: &[SymbolId]) -> Result<Vec<SpeedVector>> {
        ids.iter()
            .map(|&id| self.speeds.resolve(id).cloned())
            .collect()
    }

    /// Scatter decoded velocity lists onto the pressed keys of `notes`.
    ///
    /// Assumes the pair is already consistent: each list must have one
    /// entry per pressed key. Use `repair` for sequences that may not be.
    pub fn decode_velocities(
        &self,
        speed_ids: &[SymbolId],
        notes: &[NoteVector],
    ) -> Result<Vec<[u8; NUM_KEYS]>> {
        if speed_ids.len() != notes.len() {
            return Err(CodecError::SequenceLengthMismatch {
                notes: notes.len(),
                speeds: speed_ids.len(),
            });
        }
        speed_ids
            .iter()
            .zip(notes)
            .enumerate()
            .map(|(step, (&id, v))| -> Result<[u8; NUM_KEYS]> {
                let speeds = self.speeds.resolve(id)?;
                let pressed = v.press_count();
                if speeds.len() != pressed {
                    return Err(CodecError::VelocityCountMismatch {
                        step,
                        pressed,
                        velocities: speeds.len(),
                    });
                }
                let mut given = speeds.velocities().iter().copied();
                Ok(v.actions().map(|a| match a {
                    KeyAction::Press => given.next().unwrap_or(0),
                    _ => 0,
                }))
            })
            .collect()
    }

    /// Replay note ids through the unclamped hold transition.
    ///
    /// Step `t`'s feature is the hold state before step `t` is applied.
    pub fn derive_held_features(&self, note_ids: &[SymbolId]) -> Result<Vec<HeldState>> {
        held::hold_states(self, note_ids)
    }

    /// Decode and repair a pair of id sequences.
    pub fn repair(&self, note_ids: &[SymbolId], speed_ids: &[SymbolId]) -> Result<RepairedRoll> {
        if note_ids.len() != speed_ids.len() {
            return Err(CodecError::SequenceLengthMismatch {
                notes: note_ids.len(),
                speeds: speed_ids.len(),
            });
        }
        let notes = self.decode_notes(note_ids)?;
        let speeds = self.decode_speeds(speed_ids)?;
        Ok(Repairer::repair(&notes, &speeds))
    }

    /// Repair a pair of id sequences and write the result as MIDI.
    pub fn write_midi(
        &self,
        note_ids: &[SymbolId],
        speed_ids: &[SymbolId],
        path: &Path,
        config: &WriterConfig,
    ) -> Result<RepairedRoll> {
        let repaired = self.repair(note_ids, speed_ids)?;
        writer::write_midi(&repaired.roll, path, config)?;
        Ok(repaired)
    }

    /// Read a file, register its rows and encode it.
    pub fn read_file(&mut self, path: &Path, config: &ReaderConfig) -> Result<SymbolSequence> {
        let events = reader::read_file(path, config)?;
        let roll = self.build(&events);
        self.encode(&roll)
    }

    /// Serialize both dictionaries.
    pub fn to_json(&self) -> Result<String> {
        let file = DictionaryFile {
            notes: self.notes.values().to_vec(),
            speeds: self.speeds.values().to_vec(),
        };
        Ok(serde_json::to_string(&file)?)
    }

    /// Rebuild a codec from `to_json` output.
    ///
    /// Speed entries must hold velocities in 1..=127 only: a zero would be
    /// dropped from the row it was assigned to, so repair would not be
    /// stable over its own output.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: DictionaryFile = serde_json::from_str(json)?;
        for (index, speeds) in file.speeds.iter().enumerate() {
            if let Some(&v) = speeds.velocities().iter().find(|&&v| v == 0 || v > 127) {
                return Err(CodecError::InvalidDictionary(format!(
                    "speed entry {index} has velocity {v}, expected 1..=127"
                )));
            }
        }
        Ok(Self {
            notes: SymbolDictionary::from_entries(SymbolKind::Note, file.notes)?,
            speeds: SymbolDictionary::from_entries(SymbolKind::Speed, file.speeds)?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| CodecError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| CodecError::io(path, e))?;
        Self::from_json(&data)
    }
}
