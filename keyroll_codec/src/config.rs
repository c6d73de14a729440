// Data-driven codec configuration.
//
// Every tunable of the reader, the MIDI writer and the feature codec lives
// in `KeyrollConfig`, loadable from JSON at startup. Missing fields fall
// back to the defaults below, so a config file only needs to name what it
// changes. The defaults reproduce the fixed file layout the codec was
// designed around: notes on track 2, NoteOn messages only, 240 ticks per
// quarter note, channel 0, 4/4 time.

use crate::error::{CodecError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How note events are pulled out of an input file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// 1-based track number to read.
    pub track: usize,
    /// Also treat `NoteOff` messages as releases. Off by default: only
    /// `NoteOn` messages (velocity 0 = release) count as note activity.
    pub note_off_as_release: bool,
    /// Events at or past this tick are dropped, which bounds the size of
    /// the roll built from a file.
    pub max_rows: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            track: 2,
            note_off_as_release: false,
            max_rows: 1 << 21,
        }
    }
}

/// Fixed boilerplate of written files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub ticks_per_quarter: u16,
    /// MIDI channel (0-15) of every note event.
    pub channel: u8,
    /// Time signature meta event fields: numerator, log2(denominator),
    /// MIDI clocks per click, 32nd notes per quarter.
    pub time_signature: [u8; 4],
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            ticks_per_quarter: 240,
            channel: 0,
            time_signature: [4, 2, 24, 8],
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyrollConfig {
    pub reader: ReaderConfig,
    pub writer: WriterConfig,
    /// Velocity used for every press when saving note symbols without
    /// speed symbols (see `held.rs`).
    pub special_speed: u8,
}

impl Default for KeyrollConfig {
    fn default() -> Self {
        Self {
            reader: ReaderConfig::default(),
            writer: WriterConfig::default(),
            special_speed: 120,
        }
    }
}

impl KeyrollConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| CodecError::io(path, e))?;
        Self::from_json(&data)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
