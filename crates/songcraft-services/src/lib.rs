//! songcraft-services: audio engine, instruments, and the playback facade

pub mod audio_effects;
pub mod audio_engine;
pub mod audio_io;
pub mod offline;
pub mod output;
pub mod player;

pub use audio_effects::{AudioEffect, AudioInstrument, EffectChain, EffectParam, EffectRack};
pub use audio_effects::{ChorusEffect, GainEffect, LowPassEffect, ReverbEffect};
pub use audio_effects::{DrumKit, PolySynth};
pub use audio_engine::{AudioEngine, EngineState, Renderer};
pub use audio_io::{default_output_device, AudioOutputError, OutputDeviceInfo, RealtimeOutputStream};
pub use offline::OfflineOutput;
pub use output::AudioOutput;
pub use player::{ChordPlayer, EVENT_QUEUE_CAPACITY, PlaybackError, PlaybackRequest, PlaybackSnapshot, PlayerConfig, PlayerEvent};
