// Held-key features for sequence predictors.
//
// A `HeldState` is one signed magnitude per key describing how long the key
// has been in its current state: positive while held (1 on the press step,
// growing by one each step), zero or negative while released (shrinking by
// one each step). External predictors consume these vectors as input and
// answer with the next note symbol. Unlike the repair counters in
// `repair.rs`, the magnitude is never clamped.
//
// Transition for one step with note vector `v`:
// - continue: a positive magnitude grows by one, anything else shrinks by one;
// - a held key (positive after continuing) that `v` releases drops to 0;
// - a released key (zero or negative) that `v` presses jumps to 1.
// Presses of held keys and releases of released keys are ignored.
//
// `HoldFeatureCodec` is the codec variant that works purely in note symbols:
// it composes a `Codec`, derives these features while ingesting files, and
// writes MIDI from note symbols alone by pairing every step with one fixed
// "special speed" symbol.

use crate::codec::{Codec, SymbolCodec};
use crate::config::{KeyrollConfig, ReaderConfig, WriterConfig};
use crate::dictionary::SymbolId;
use crate::error::Result;
use crate::reader;
use crate::repair::RepairedRoll;
use crate::roll::{KeyAction, NUM_KEYS, NoteVector, SpeedVector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Per-key hold magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<i32>", try_from = "Vec<i32>")]
pub struct HeldState([i32; NUM_KEYS]);

impl Default for HeldState {
    fn default() -> Self {
        Self::zero()
    }
}

impl HeldState {
    /// Nothing played yet.
    pub fn zero() -> Self {
        HeldState([0; NUM_KEYS])
    }

    pub fn values(&self) -> &[i32; NUM_KEYS] {
        &self.0
    }

    pub fn get(&self, key: usize) -> i32 {
        self.0[key]
    }

    pub fn is_held(&self, key: usize) -> bool {
        self.0[key] > 0
    }

    /// Apply one step's note vector.
    pub fn advance(&self, notes: &NoteVector) -> HeldState {
        let mut next = self.0;
        for (state, &action) in next.iter_mut().zip(notes.actions()) {
            *state = if *state > 0 { *state + 1 } else { *state - 1 };
            if *state > 0 && action == KeyAction::Release {
                *state = 0;
            }
            if *state <= 0 && action == KeyAction::Press {
                *state = 1;
            }
        }
        HeldState(next)
    }
}

impl From<HeldState> for Vec<i32> {
    fn from(state: HeldState) -> Self {
        state.0.to_vec()
    }
}

impl TryFrom<Vec<i32>> for HeldState {
    type Error = String;

    fn try_from(v: Vec<i32>) -> std::result::Result<Self, Self::Error> {
        let len = v.len();
        <[i32; NUM_KEYS]>::try_from(v)
            .map(HeldState)
            .map_err(|_| format!("held state must have {NUM_KEYS} entries, got {len}"))
    }
}

/// Features for a note id sequence: entry `t` is the state before step `t`.
pub fn hold_states(codec: &Codec, note_ids: &[SymbolId]) -> Result<Vec<HeldState>> {
    let mut states = Vec::with_capacity(note_ids.len());
    let mut current = HeldState::zero();
    for &id in note_ids {
        states.push(current);
        current = current.advance(codec.resolve_note(id)?);
    }
    Ok(states)
}

/// Features, note ids and per-file lengths for a batch of files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBatch {
    pub states: Vec<HeldState>,
    pub notes: Vec<SymbolId>,
    pub lengths: Vec<usize>,
}

/// Codec variant working in note symbols plus held-key features.
#[derive(Debug, Clone)]
pub struct HoldFeatureCodec {
    codec: Codec,
    special_speed: SymbolId,
    reader: ReaderConfig,
    writer: WriterConfig,
}

impl SymbolCodec for HoldFeatureCodec {
    fn codec(&self) -> &Codec {
        &self.codec
    }

    fn codec_mut(&mut self) -> &mut Codec {
        &mut self.codec
    }
}

impl HoldFeatureCodec {
    /// A fresh codec whose speed dictionary starts with `[special_speed]`.
    pub fn new(special_speed: u8) -> Self {
        Self::with_codec(Codec::new(), special_speed)
    }

    pub fn from_config(config: &KeyrollConfig) -> Self {
        let mut this = Self::new(config.special_speed);
        this.reader = config.reader.clone();
        this.writer = config.writer.clone();
        this
    }

    /// Wrap an existing codec (e.g. loaded dictionaries), interning the
    /// special speed symbol if it is not there yet. The velocity is clamped
    /// to 1..=127 so the speed dictionary stays loadable.
    pub fn with_codec(mut codec: Codec, special_speed: u8) -> Self {
        let velocity = special_speed.clamp(1, 127);
        if velocity != special_speed {
            warn!(special_speed, velocity, "special speed outside 1..=127, clamping");
        }
        let special_speed = codec.intern_speed(SpeedVector::new(vec![velocity]));
        Self {
            codec,
            special_speed,
            reader: ReaderConfig::default(),
            writer: WriterConfig::default(),
        }
    }

    pub fn special_speed_id(&self) -> SymbolId {
        self.special_speed
    }

    pub fn into_codec(self) -> Codec {
        self.codec
    }

    /// Read one file: held-state features and note ids.
    pub fn read_file(&mut self, path: &Path) -> Result<(Vec<HeldState>, Vec<SymbolId>)> {
        let events = reader::read_file(path, &self.reader)?;
        let roll = self.codec.build(&events);
        let notes = self.codec.encode_notes(&roll)?;
        let states = hold_states(&self.codec, &notes)?;
        Ok((states, notes))
    }

    /// Read files one after another, concatenating their features and ids.
    /// Each file's features start from a zero state.
    pub fn read_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<FeatureBatch> {
        let mut batch = FeatureBatch::default();
        for path in paths {
            let (states, notes) = self.read_file(path.as_ref())?;
            batch.lengths.push(notes.len());
            batch.states.extend(states);
            batch.notes.extend(notes);
        }
        debug!(
            files = paths.len(),
            steps = batch.notes.len(),
            note_symbols = self.codec.notes().len(),
            "read feature batch"
        );
        Ok(batch)
    }

    /// Features for an arbitrary note id sequence.
    pub fn hold_states(&self, note_ids: &[SymbolId]) -> Result<Vec<HeldState>> {
        hold_states(&self.codec, note_ids)
    }

    /// Apply one note symbol to a state, for generation loops.
    pub fn advance(&self, state: &HeldState, note_id: SymbolId) -> Result<HeldState> {
        Ok(state.advance(self.codec.resolve_note(note_id)?))
    }

    /// Repair note ids paired with the special speed and write them as MIDI.
    pub fn write_midi(&self, note_ids: &[SymbolId], path: &Path) -> Result<RepairedRoll> {
        let speeds = vec![self.special_speed; note_ids.len()];
        self.codec.write_midi(note_ids, &speeds, path, &self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::NoteEvent;
    use crate::roll::KeyAction::{Press, Release};

    fn ev(tick: u32, pitch: u8, velocity: u8) -> NoteEvent {
        NoteEvent {
            tick,
            pitch,
            velocity,
            track: 2,
        }
    }

    #[test]
    fn magnitudes_grow_while_state_is_unchanged() {
        let idle = NoteVector::idle();
        let press = NoteVector::with(&[(0, Press)]);
        let release = NoteVector::with(&[(0, Release)]);

        let s = HeldState::zero().advance(&idle);
        assert_eq!(s.get(0), -1);
        let s = s.advance(&idle);
        assert_eq!(s.get(0), -2);

        let s = s.advance(&press);
        assert_eq!(s.get(0), 1);
        let s = s.advance(&idle).advance(&idle);
        assert_eq!(s.get(0), 3);

        let s = s.advance(&release);
        assert_eq!(s.get(0), 0);
        let s = s.advance(&idle);
        assert_eq!(s.get(0), -1);
    }

    #[test]
    fn redundant_presses_and_releases_are_ignored() {
        let press = NoteVector::with(&[(5, Press)]);
        let release = NoteVector::with(&[(5, Release)]);

        let s = HeldState::zero().advance(&release);
        assert_eq!(s.get(5), -1);

        let s = s.advance(&press).advance(&press);
        assert_eq!(s.get(5), 2);
        assert!(s.is_held(5));
    }

    #[test]
    fn features_lag_the_sequence_by_one_step() {
        let mut codec = Codec::new();
        let roll = codec.build(&[ev(0, 20, 90), ev(2, 20, 0)]);
        let ids = codec.encode_notes(&roll).unwrap();
        let features = codec.derive_held_features(&ids).unwrap();

        assert_eq!(features.len(), 3);
        assert_eq!(features[0], HeldState::zero());
        assert_eq!(features[1].get(0), 1);
        assert_eq!(features[2].get(0), 2);
        assert_eq!(features[1].get(1), -1);
    }

    #[test]
    fn special_speed_is_interned_once() {
        let hf = HoldFeatureCodec::new(120);
        assert_eq!(hf.special_speed_id(), SymbolId(0));
        assert_eq!(hf.resolve_speed(SymbolId(0)).unwrap().velocities(), &[120]);

        let mut codec = Codec::new();
        codec.intern_speed(SpeedVector::new(vec![]));
        codec.intern_speed(SpeedVector::new(vec![120]));
        let hf = HoldFeatureCodec::with_codec(codec, 120);
        assert_eq!(hf.special_speed_id(), SymbolId(1));
        assert_eq!(hf.codec().speeds().len(), 2);
    }

    #[test]
    fn special_speed_is_clamped_to_a_loadable_velocity() {
        let hf = HoldFeatureCodec::new(0);
        assert_eq!(hf.resolve_speed(hf.special_speed_id()).unwrap().velocities(), &[1]);
        let hf = HoldFeatureCodec::new(200);
        assert_eq!(hf.resolve_speed(hf.special_speed_id()).unwrap().velocities(), &[127]);
        assert!(Codec::from_json(&hf.codec().to_json().unwrap()).is_ok());
    }

    #[test]
    fn advance_resolves_through_the_codec() {
        let mut hf = HoldFeatureCodec::new(100);
        let roll = hf.build(&[ev(0, 21, 64)]);
        let ids = hf.codec().encode_notes(&roll).unwrap();
        let next = hf.advance(&HeldState::zero(), ids[0]).unwrap();
        assert_eq!(next.get(1), 1);
        assert!(hf.advance(&next, SymbolId(99)).is_err());
        assert_eq!(hf.hold_states(&ids).unwrap(), vec![HeldState::zero()]);
    }

    #[test]
    fn held_state_json_round_trip() {
        let s = HeldState::zero().advance(&NoteVector::with(&[(3, Press)]));
        let json = serde_json::to_string(&s).unwrap();
        let back: HeldState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
        assert!(serde_json::from_str::<HeldState>("[1, 2]").is_err());
    }
}
