//! Audio effects, the shared effect rack and the built-in instruments

mod native;
pub mod native_instruments;

pub use native::{ChorusEffect, GainEffect, LowPassEffect, ReverbEffect};
pub use native_instruments::{DrumKit, PolySynth, CLOSED_HAT, KICK, SNARE};

use std::fmt::Debug;

use songcraft_core::EffectSend;

/// Audio effect that can process samples in-place
pub trait AudioEffect: Send + Debug {
    fn name(&self) -> &str;
    fn process(&mut self, samples: &mut [f32]);
    fn set_param(&mut self, name: &str, value: f32);
    fn get_params(&self) -> Vec<EffectParam>;
    fn set_bypass(&mut self, bypass: bool);
    fn is_bypassed(&self) -> bool;
    /// Update sample rate for effects that depend on it
    fn set_sample_rate(&mut self, _sample_rate: f32) {}
}

/// Sound generator driven by note groups at sample offsets
pub trait AudioInstrument: Send {
    fn name(&self) -> &str;
    /// Queue a note group to start at the given sample offset within the next block
    fn queue_note_on(&mut self, pitches: &[u8], velocity: u8, sample_offset: u32);
    /// Queue a release of everything currently held
    fn queue_note_off(&mut self, sample_offset: u32);
    /// Release every voice now and drop queued events
    fn all_notes_off(&mut self);
    /// Render the next block (mono)
    fn process(&mut self, num_frames: usize) -> &[f32];
    fn set_sample_rate(&mut self, sample_rate: f32);
    /// Free render buffers; the instrument is silent afterwards. Safe to call twice.
    fn dispose(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectParam {
    pub name: String,
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub unit: String,
}

impl EffectParam {
    pub fn new(name: &str, value: f32, min: f32, max: f32, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            min,
            max,
            unit: unit.to_string(),
        }
    }
}

/// Chain of audio effects processed in order
#[derive(Debug, Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn AudioEffect>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Box<dyn AudioEffect>) {
        self.effects.push(effect);
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        for effect in &mut self.effects {
            if !effect.is_bypassed() {
                effect.process(samples);
            }
        }
    }

    pub fn effects(&self) -> &[Box<dyn AudioEffect>] {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut [Box<dyn AudioEffect>] {
        &mut self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        for effect in &mut self.effects {
            effect.set_sample_rate(sample_rate);
        }
    }
}

const CHORUS_SLOT: usize = 0;
const REVERB_SLOT: usize = 1;

/// The harmony bus effects: one chorus into one reverb.
///
/// Built once per output. Switching instruments only changes bypass and wet levels.
#[derive(Debug)]
pub struct EffectRack {
    chain: EffectChain,
    send: EffectSend,
}

impl EffectRack {
    pub fn new(sample_rate: f32) -> Self {
        let mut chain = EffectChain::new();
        chain.add(Box::new(ChorusEffect::new(1.5, 3.5, 0.7, 0.0, sample_rate)));
        chain.add(Box::new(ReverbEffect::new(2.5, 0.3, 0.0, sample_rate)));
        let mut rack = Self { chain, send: EffectSend::Dry };
        rack.apply_send(EffectSend::Dry);
        rack
    }

    pub fn apply_send(&mut self, send: EffectSend) {
        let (chorus, reverb) = match send {
            EffectSend::Dry => (None, None),
            EffectSend::ReverbOnly { reverb_wet } => (None, Some(reverb_wet)),
            EffectSend::ChorusReverb { chorus_wet, reverb_wet } => (Some(chorus_wet), Some(reverb_wet)),
        };
        for (slot, wet) in [(CHORUS_SLOT, chorus), (REVERB_SLOT, reverb)] {
            let effect = &mut self.chain.effects_mut()[slot];
            effect.set_bypass(wet.is_none());
            if let Some(wet) = wet {
                effect.set_param("mix", wet);
            }
        }
        self.send = send;
    }

    pub fn send(&self) -> EffectSend {
        self.send
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        self.chain.process(samples);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.chain.set_sample_rate(sample_rate);
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }
}
