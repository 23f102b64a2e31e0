//! songcraft-core: Musical domain types for the songcraft playback engine

pub mod chord;
mod error;
pub mod instrument;
pub mod pattern;
pub mod scheduler;
pub mod tempo;
mod transport;

pub use chord::{
    note_name, resolve, resolve_in_octave, resolve_names, root_pitch,
    ChordQuality, ChordSymbol, VoicingStyle, BASS_OCTAVE, HARMONY_OCTAVE,
};
pub use error::{Result, SongcraftError};
pub use instrument::{
    EffectSend, Envelope, FmModulation, InstrumentKind, InstrumentRecipe, OscillatorShape, Waveform, BASS_RECIPE,
};
pub use pattern::{BassAction, BassPattern, ChordRhythm, DrumGrid, DrumPart, DrumPattern, RhythmAction, STEPS_PER_BAR};
pub use scheduler::{
    validate_beats_per_chord, Arrangement, ChordCue, PlaybackStyle, ResolvedChord, ScheduleBatch, Scheduler,
    VoiceAction, VoiceEvent, VoiceId, BEATS_PER_CHORD_OPTIONS,
};
pub use tempo::{TempoMap, TICKS_PER_BEAT};
pub use transport::{validate_bpm, Transport, TransportState, DEFAULT_BPM};
