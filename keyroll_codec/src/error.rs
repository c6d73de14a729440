// Error taxonomy for the codec.
//
// Three classes of failure exist, and only two of them surface here:
// - Parse warnings (a malformed event, an off-keyboard pitch) are logged
//   with `tracing::warn!` inside `reader.rs` and never become errors.
// - Lookup failures (encoding a vector that was never registered, decoding
//   an id that was never assigned) are programmer errors: ids must be
//   decoded against the same `Codec` whose dictionaries produced them.
// - I/O and format failures carry the offending path.
//
// Repair (`repair.rs`) has no error variants at all; it always succeeds.

use std::path::PathBuf;
use thiserror::Error;

/// Which of the two dictionaries a symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Note,
    Speed,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolKind::Note => write!(f, "note"),
            SymbolKind::Speed => write!(f, "speed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    /// A row's note vector was never interned by this codec.
    #[error("row {row}: note vector is not registered in the note dictionary")]
    UnknownNoteVector { row: usize },

    /// A row's velocity list was never interned by this codec.
    #[error("row {row}: velocity list is not registered in the speed dictionary")]
    UnknownSpeedVector { row: usize },

    /// An id outside the dictionary's assigned range.
    #[error("{kind} symbol {id} is out of range (dictionary holds {len} entries)")]
    SymbolOutOfRange { kind: SymbolKind, id: u32, len: usize },

    /// A decoded velocity list cannot be scattered onto a note vector
    /// because the number of pressed keys differs.
    #[error("step {step}: {pressed} pressed keys but {velocities} velocities")]
    VelocityCountMismatch {
        step: usize,
        pressed: usize,
        velocities: usize,
    },

    /// A persisted dictionary violates the content-addressing invariant.
    #[error("invalid dictionary: {0}")]
    InvalidDictionary(String),

    #[error("note and speed sequences differ in length ({notes} vs {speeds})")]
    SequenceLengthMismatch { notes: usize, speeds: usize },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("MIDI error: {0}")]
    Midi(#[from] midly::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CodecError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_message_names_the_dictionary() {
        let err = CodecError::SymbolOutOfRange {
            kind: SymbolKind::Speed,
            id: 9,
            len: 3,
        };
        assert_eq!(
            err.to_string(),
            "speed symbol 9 is out of range (dictionary holds 3 entries)"
        );
    }

    #[test]
    fn io_error_carries_path() {
        let err = CodecError::io(
            "out/song.mid",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("out/song.mid"));
    }
}
