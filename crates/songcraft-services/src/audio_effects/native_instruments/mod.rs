//! Native instruments

pub mod drum_kit;
pub mod poly_synth;

pub use drum_kit::{DrumKit, CLOSED_HAT, KICK, SNARE};
pub use poly_synth::PolySynth;
