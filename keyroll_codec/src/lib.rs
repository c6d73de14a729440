// Keyroll piano-roll symbol codec
//
// Turns one track of a MIDI file into a dense per-tick key-state grid,
// compresses the grid's rows into two small dictionaries of recurring
// vectors (note symbols and speed symbols), and turns symbol sequences back
// into MIDI. Sequences that did not come from real data (for example ones
// sampled from a statistical model) pass through a repair step that makes
// them physically playable before they are written.
//
// Architecture:
// - reader.rs: SMF bytes -> note events for one track (lenient, warns)
// - roll.rs: PianoRoll grid (88 keys x ticks), NoteVector / SpeedVector rows
// - dictionary.rs: content-addressed, append-only symbol dictionary
// - codec.rs: Codec owning both dictionaries; build/encode/decode/persist
// - repair.rs: hold-counter state machine that makes any sequence valid
// - held.rs: unclamped held-key features and the notes-only codec variant
// - writer.rs: MIDI file output from repaired rolls
// - config.rs: JSON-loadable reader/writer configuration
// - error.rs: CodecError taxonomy
//
// Everything is synchronous and single-threaded. A Codec exclusively owns
// its dictionaries; symbol ids are only meaningful against the codec that
// assigned them.

pub mod codec;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod held;
pub mod reader;
pub mod repair;
pub mod roll;
pub mod writer;

pub use codec::{Codec, SymbolCodec, SymbolSequence};
pub use config::{KeyrollConfig, ReaderConfig, WriterConfig};
pub use dictionary::{SymbolDictionary, SymbolId};
pub use error::{CodecError, Result, SymbolKind};
pub use held::{FeatureBatch, HeldState, HoldFeatureCodec};
pub use reader::NoteEvent;
pub use repair::{RepairStats, RepairedRoll, Repairer};
pub use roll::{Cell, KeyAction, NUM_KEYS, NoteVector, PITCH_OFFSET, PianoRoll, SpeedVector};
