// The piano roll: the dense key-state grid everything else is built on.
//
// One row per integer tick, 88 columns (key index k is MIDI pitch k + 20).
// Each cell records what happened to that key at that tick: pressed,
// released, or nothing, plus the press velocity. Rows between explicit
// events are all-idle, so a roll's length is the last event tick + 1.
//
// Two projections of a row feed the symbol dictionaries (see `codec.rs`):
// - `NoteVector`: the 88 key actions, ignoring velocities.
// - `SpeedVector`: the velocities of the pressed keys, ascending key order,
//   zeros excluded.
//
// The roll is the source of truth on both sides of the codec. Events are
// expanded into it, MIDI is written from it, and repair produces it.

use crate::reader::NoteEvent;
use serde::{Deserialize, Serialize};

/// Number of keys (columns) in every row.
pub const NUM_KEYS: usize = 88;

/// MIDI pitch of key index 0.
pub const PITCH_OFFSET: u8 = 20;

/// Map a MIDI pitch to a key index, or `None` if it falls off the keyboard.
pub fn key_index(pitch: u8) -> Option<usize> {
    let k = pitch.checked_sub(PITCH_OFFSET)? as usize;
    (k < NUM_KEYS).then_some(k)
}

/// MIDI pitch for a key index.
pub fn key_pitch(key: usize) -> u8 {
    debug_assert!(key < NUM_KEYS);
    PITCH_OFFSET + key as u8
}

/// What happens to one key at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum KeyAction {
    Release = -1,
    #[default]
    Idle = 0,
    Press = 1,
}

impl KeyAction {
    pub fn as_i8(self) -> i8 {
        self as i8
    }
}

impl From<KeyAction> for i8 {
    fn from(action: KeyAction) -> i8 {
        action.as_i8()
    }
}

impl TryFrom<i8> for KeyAction {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(KeyAction::Release),
            0 => Ok(KeyAction::Idle),
            1 => Ok(KeyAction::Press),
            other => Err(format!("key action must be -1, 0 or 1, got {other}")),
        }
    }
}

/// The 88 key actions of one row. Interned as a note symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<KeyAction>", try_from = "Vec<KeyAction>")]
pub struct NoteVector([KeyAction; NUM_KEYS]);

impl NoteVector {
    /// A vector with every key idle.
    pub fn idle() -> Self {
        NoteVector([KeyAction::Idle; NUM_KEYS])
    }

    pub fn from_actions(actions: [KeyAction; NUM_KEYS]) -> Self {
        NoteVector(actions)
    }

    /// Build a vector from `(key, action)` pairs; unlisted keys stay idle.
    pub fn with(pairs: &[(usize, KeyAction)]) -> Self {
        let mut v = Self::idle();
        for &(key, action) in pairs {
            v.0[key] = action;
        }
        v
    }

    pub fn actions(&self) -> &[KeyAction; NUM_KEYS] {
        &self.0
    }

    pub fn get(&self, key: usize) -> KeyAction {
        self.0[key]
    }

    pub fn set(&mut self, key: usize, action: KeyAction) {
        self.0[key] = action;
    }

    /// Number of keys pressed in this vector.
    pub fn press_count(&self) -> usize {
        self.0.iter().filter(|&&a| a == KeyAction::Press).count()
    }
}

impl From<NoteVector> for Vec<KeyAction> {
    fn from(v: NoteVector) -> Self {
        v.0.to_vec()
    }
}

impl TryFrom<Vec<KeyAction>> for NoteVector {
    type Error = String;

    fn try_from(v: Vec<KeyAction>) -> Result<Self, Self::Error> {
        let len = v.len();
        <[KeyAction; NUM_KEYS]>::try_from(v)
            .map(NoteVector)
            .map_err(|_| format!("note vector must have {NUM_KEYS} entries, got {len}"))
    }
}

/// Velocities of the pressed keys of one row. Interned as a speed symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeedVector(Vec<u8>);

impl SpeedVector {
    pub fn new(velocities: Vec<u8>) -> Self {
        SpeedVector(velocities)
    }

    pub fn velocities(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Average velocity rounded half away from zero; 0 for an empty list.
    pub fn rounded_mean(&self) -> u8 {
        if self.0.is_empty() {
            return 0;
        }
        let sum: u32 = self.0.iter().map(|&v| u32::from(v)).sum();
        let mean = f64::from(sum) / self.0.len() as f64;
        mean.round() as u8
    }
}

/// A single cell of the roll.
///
/// `velocity` is non-zero only when `action` is `Press` (a repaired press
/// may carry velocity 0, see `repair.rs`). The writer emits such a press
/// with velocity 1, since a zero-velocity `NoteOn` would read back as a
/// release; the roll itself keeps the 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    pub action: KeyAction,
    pub velocity: u8,
}

impl Cell {
    pub fn idle() -> Self {
        Cell::default()
    }

    pub fn press(velocity: u8) -> Self {
        Cell {
            action: KeyAction::Press,
            velocity,
        }
    }

    pub fn release() -> Self {
        Cell {
            action: KeyAction::Release,
            velocity: 0,
        }
    }
}

pub type Row = [Cell; NUM_KEYS];

/// The dense tick x key grid.
///
/// Indexed as `rows[tick][key]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PianoRoll {
    rows: Vec<Row>,
}

impl PianoRoll {
    /// Create an all-idle roll with the given number of rows.
    pub fn new(num_rows: usize) -> Self {
        PianoRoll {
            rows: vec![[Cell::idle(); NUM_KEYS]; num_rows],
        }
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        PianoRoll { rows }
    }

    /// Expand note events into a roll with `last tick + 1` rows.
    ///
    /// Velocity 0 marks a release. When two events hit the same (tick, key)
    /// the later one wins. Events are expected in non-decreasing tick order,
    /// but the roll is sized from the largest tick, so order only matters
    /// for the overwrite rule. Off-keyboard pitches are skipped.
    pub fn from_events(events: &[NoteEvent]) -> Self {
        let num_rows = events
            .iter()
            .map(|e| e.tick as usize + 1)
            .max()
            .unwrap_or(0);
        let mut roll = PianoRoll::new(num_rows);

        for event in events {
            let Some(key) = key_index(event.pitch) else {
                tracing::warn!(
                    tick = event.tick,
                    pitch = event.pitch,
                    "pitch outside the 88-key window, skipping"
                );
                continue;
            };
            let cell = if event.velocity > 0 {
                Cell::press(event.velocity)
            } else {
                Cell::release()
            };
            roll.rows[event.tick as usize][key] = cell;
        }

        roll
    }

    /// Number of rows (ticks).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn cell(&self, tick: usize, key: usize) -> Cell {
        self.rows[tick][key]
    }

    pub fn set_cell(&mut self, tick: usize, key: usize, cell: Cell) {
        self.rows[tick][key] = cell;
    }

    /// The key actions of one row.
    pub fn note_vector(&self, tick: usize) -> NoteVector {
        NoteVector(self.rows[tick].map(|c| c.action))
    }

    /// The non-zero velocities of one row, ascending key order.
    pub fn speed_vector(&self, tick: usize) -> SpeedVector {
        SpeedVector(
            self.rows[tick]
                .iter()
                .map(|c| c.velocity)
                .filter(|&v| v != 0)
                .collect(),
        )
    }

    pub fn note_vectors(&self) -> Vec<NoteVector> {
        (0..self.len()).map(|t| self.note_vector(t)).collect()
    }

    pub fn speed_vectors(&self) -> Vec<SpeedVector> {
        (0..self.len()).map(|t| self.speed_vector(t)).collect()
    }

    /// Every non-idle cell as `(tick, key, cell)`, in tick then key order.
    pub fn active_cells(&self) -> impl Iterator<Item = (usize, usize, Cell)> + '_ {
        self.rows.iter().enumerate().flat_map(|(tick, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, c)| c.action != KeyAction::Idle)
                .map(move |(key, &c)| (tick, key, c))
        })
    }

    /// Count note statistics for the roll.
    pub fn stats(&self) -> RollStats {
        let mut presses = 0;
        let mut releases = 0;
        let mut active_rows = 0;

        for row in &self.rows {
            let mut active = false;
            for cell in row {
                match cell.action {
                    KeyAction::Press => presses += 1,
                    KeyAction::Release => releases += 1,
                    KeyAction::Idle => continue,
                }
                active = true;
            }
            if active {
                active_rows += 1;
            }
        }

        RollStats {
            rows: self.len(),
            presses,
            releases,
            active_rows,
        }
    }
}

/// Statistics about a roll's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollStats {
    pub rows: usize,
    pub presses: usize,
    pub releases: usize,
    pub active_rows: usize,
}
