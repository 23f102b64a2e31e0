//! Error types for songcraft

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SongcraftError {
    #[error("Progression has no chords")]
    EmptyProgression,
    #[error("Tempo must be positive, got {0} BPM")]
    InvalidTempo(u32),
    #[error("Beats per chord must be 2, 4 or 8, got {0}")]
    InvalidBeatsPerChord(u8),
    #[error("Unknown {kind}: {name}")]
    UnknownStyle { kind: &'static str, name: String },
}

pub type Result<T> = std::result::Result<T, SongcraftError>;
