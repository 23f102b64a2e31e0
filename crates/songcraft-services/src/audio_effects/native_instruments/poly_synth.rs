//! Polyphonic recipe synth for the harmony and bass voices
//!
//! One instance plays one note group at a time: a note-off releases every held
//! voice, and the next note-on starts a fresh group while the old one rings out.

use std::fmt;

use fundsp::hacker::{db_amp, midi_hz};
use songcraft_core::{Envelope, FmModulation, InstrumentRecipe, OscillatorShape, Waveform};

use crate::audio_effects::AudioInstrument;

const MAX_VOICES: usize = 16;
const MAX_BLOCK_SIZE: usize = 4096;
/// Headroom so a four-note chord stays below full scale
const VOICE_GAIN: f64 = 0.25;
const MAX_UNISON: usize = 8;

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear ADSR; release starts from whatever level the envelope had reached
#[derive(Debug, Clone, Copy)]
struct Adsr {
    shape: Envelope,
    stage: Stage,
    level: f64,
    release_step: f64,
}

impl Adsr {
    fn new(shape: Envelope) -> Self {
        Self { shape, stage: Stage::Idle, level: 0.0, release_step: 0.0 }
    }

    fn gate_on(&mut self) {
        self.stage = Stage::Attack;
        self.level = 0.0;
    }

    fn gate_off(&mut self, sample_rate: f64) {
        if matches!(self.stage, Stage::Idle | Stage::Release) {
            return;
        }
        self.stage = Stage::Release;
        let samples = (self.shape.release as f64 * sample_rate).max(1.0);
        self.release_step = self.level / samples;
    }

    fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    fn next(&mut self, sample_rate: f64) -> f64 {
        let sustain = self.shape.sustain as f64;
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.level += 1.0 / (self.shape.attack as f64 * sample_rate).max(1.0);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level -= (1.0 - sustain) / (self.shape.decay as f64 * sample_rate).max(1.0);
                if self.level <= sustain {
                    self.level = sustain;
                    self.stage = if sustain > 0.0 { Stage::Sustain } else { Stage::Idle };
                }
            }
            Stage::Sustain => {}
            Stage::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

// ============================================================================
// Oscillators
// ============================================================================

/// Naive waveform at phase 0..1
fn waveform(shape: Waveform, phase: f64) -> f64 {
    match shape {
        Waveform::Sine => (phase * std::f64::consts::TAU).sin(),
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        Waveform::Square => if phase < 0.5 { 1.0 } else { -1.0 },
        Waveform::Sawtooth => 2.0 * phase - 1.0,
    }
}

/// Amplitude of harmonic `k` (1-based) when a waveform is built additively.
///
/// Sine partials roll off at 1/k², giving a soft drawbar-like tone.
fn partial_amplitude(shape: Waveform, k: usize) -> f64 {
    let k = k as f64;
    let odd = k as usize % 2 == 1;
    match shape {
        Waveform::Sine => 1.0 / (k * k),
        Waveform::Triangle if odd => {
            let sign = if (k as usize / 2) % 2 == 0 { 1.0 } else { -1.0 };
            sign / (k * k)
        }
        Waveform::Square if odd => 1.0 / k,
        Waveform::Sawtooth => 1.0 / k,
        _ => 0.0,
    }
}

/// Per-recipe oscillator tables computed once
#[derive(Debug, Clone)]
struct OscillatorBank {
    shape: OscillatorShape,
    /// Frequency multipliers, one per phase accumulator
    ratios: Vec<f64>,
    /// Matching amplitudes, normalized to sum to 1
    gains: Vec<f64>,
}

impl OscillatorBank {
    fn new(shape: OscillatorShape) -> Self {
        let (ratios, gains): (Vec<f64>, Vec<f64>) = match shape {
            OscillatorShape::Basic(_) => (vec![1.0], vec![1.0]),
            OscillatorShape::Partials { waveform, count } => (1..=count.max(1) as usize)
                .map(|k| (k as f64, partial_amplitude(waveform, k)))
                .unzip(),
            OscillatorShape::Fat { count, spread_cents, .. } => {
                let count = (count.max(1) as usize).min(MAX_UNISON);
                (0..count)
                    .map(|i| {
                        let cents = if count == 1 {
                            0.0
                        } else {
                            -(spread_cents as f64) / 2.0 + spread_cents as f64 * i as f64 / (count - 1) as f64
                        };
                        (2f64.powf(cents / 1200.0), 1.0)
                    })
                    .unzip()
            }
        };
        let total: f64 = gains.iter().map(|g| g.abs()).sum();
        let gains = gains.into_iter().map(|g| g / total.max(f64::EPSILON)).collect();
        Self { shape, ratios, gains }
    }

    fn sample(&self, phases: &[f64]) -> f64 {
        let phases = phases.iter().zip(&self.gains);
        match self.shape {
            OscillatorShape::Basic(shape) | OscillatorShape::Fat { waveform: shape, .. } => {
                phases.map(|(&p, g)| waveform(shape, p) * g).sum()
            }
            // Partials are summed sine harmonics
            OscillatorShape::Partials { .. } => {
                phases.map(|(&p, g)| (p * std::f64::consts::TAU).sin() * g).sum()
            }
        }
    }
}

// ============================================================================
// Voices
// ============================================================================

#[derive(Debug, Clone)]
struct SynthVoice {
    pitch: u8,
    freq: f64,
    velocity: f64,
    age: u64,
    phases: Vec<f64>,
    mod_phase: f64,
    amp_env: Adsr,
    mod_env: Option<Adsr>,
    /// Set while the voice belongs to the current (unreleased) note group
    held: bool,
}

impl SynthVoice {
    fn new(recipe: &InstrumentRecipe, partials: usize) -> Self {
        Self {
            pitch: 0,
            freq: 0.0,
            velocity: 0.0,
            age: 0,
            phases: vec![0.0; partials],
            mod_phase: 0.0,
            amp_env: Adsr::new(recipe.envelope),
            mod_env: recipe.fm.map(|fm| Adsr::new(fm.envelope)),
            held: false,
        }
    }

    fn start(&mut self, pitch: u8, velocity: u8, age: u64) {
        self.pitch = pitch;
        self.freq = midi_hz(pitch as f64);
        self.velocity = velocity as f64 / 127.0;
        self.age = age;
        self.phases.fill(0.0);
        self.mod_phase = 0.0;
        self.amp_env.gate_on();
        if let Some(env) = &mut self.mod_env {
            env.gate_on();
        }
        self.held = true;
    }

    fn release(&mut self, sample_rate: f64) {
        self.held = false;
        self.amp_env.gate_off(sample_rate);
        if let Some(env) = &mut self.mod_env {
            env.gate_off(sample_rate);
        }
    }

    fn is_active(&self) -> bool {
        !self.amp_env.is_idle()
    }

    fn tick(&mut self, bank: &OscillatorBank, fm: Option<&FmModulation>, sample_rate: f64) -> f64 {
        let dt = 1.0 / sample_rate;

        let mut freq = self.freq;
        if let (Some(fm), Some(env)) = (fm, self.mod_env.as_mut()) {
            let mod_freq = self.freq * fm.harmonicity as f64;
            self.mod_phase = (self.mod_phase + mod_freq * dt).fract();
            let deviation = mod_freq * fm.index as f64 * env.next(sample_rate);
            freq += waveform(fm.modulator, self.mod_phase) * deviation;
        }

        for (phase, ratio) in self.phases.iter_mut().zip(&bank.ratios) {
            *phase = (*phase + freq * ratio * dt).rem_euclid(1.0);
        }

        bank.sample(&self.phases) * self.amp_env.next(sample_rate) * self.velocity
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SynthEvent {
    On(Vec<u8>, u8),
    Off,
}

/// Polyphonic synth voiced by an `InstrumentRecipe`
pub struct PolySynth {
    name: String,
    recipe: InstrumentRecipe,
    bank: OscillatorBank,
    sample_rate: f32,
    level: f64,
    voices: Vec<SynthVoice>,
    pending_events: Vec<(SynthEvent, u32)>,
    output: Vec<f32>,
    note_counter: u64,
}

impl fmt::Debug for PolySynth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolySynth")
            .field("name", &self.name)
            .field("sample_rate", &self.sample_rate)
            .field("active_voices", &self.active_voices())
            .finish()
    }
}

impl PolySynth {
    pub fn new(name: &str, recipe: InstrumentRecipe, sample_rate: f32) -> Self {
        let bank = OscillatorBank::new(recipe.oscillator);
        let voices = (0..MAX_VOICES)
            .map(|_| SynthVoice::new(&recipe, bank.ratios.len()))
            .collect();

        Self {
            name: name.to_string(),
            recipe,
            bank,
            sample_rate,
            level: db_amp(recipe.volume_db) as f64 * VOICE_GAIN,
            voices,
            pending_events: Vec::new(),
            output: vec![0.0; MAX_BLOCK_SIZE],
            note_counter: 0,
        }
    }

    pub fn recipe(&self) -> &InstrumentRecipe {
        &self.recipe
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn held_pitches(&self) -> Vec<u8> {
        self.voices.iter().filter(|v| v.held).map(|v| v.pitch).collect()
    }

    fn note_on(&mut self, pitches: &[u8], velocity: u8) {
        for &pitch in pitches {
            self.note_counter += 1;
            // Free voice first, then steal the oldest
            let idx = self
                .voices
                .iter()
                .position(|v| !v.is_active())
                .or_else(|| {
                    self.voices
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, v)| v.age)
                        .map(|(i, _)| i)
                })
                .unwrap_or(0);
            self.voices[idx].start(pitch, velocity, self.note_counter);
        }
    }

    fn note_off(&mut self) {
        let sample_rate = self.sample_rate as f64;
        for voice in self.voices.iter_mut().filter(|v| v.held) {
            voice.release(sample_rate);
        }
    }

    fn apply(&mut self, event: SynthEvent) {
        match event {
            SynthEvent::On(pitches, velocity) => self.note_on(&pitches, velocity),
            SynthEvent::Off => self.note_off(),
        }
    }
}

impl AudioInstrument for PolySynth {
    fn name(&self) -> &str {
        &self.name
    }

    fn queue_note_on(&mut self, pitches: &[u8], velocity: u8, sample_offset: u32) {
        self.pending_events.push((SynthEvent::On(pitches.to_vec(), velocity), sample_offset));
    }

    fn queue_note_off(&mut self, sample_offset: u32) {
        self.pending_events.push((SynthEvent::Off, sample_offset));
    }

    fn all_notes_off(&mut self) {
        self.pending_events.clear();
        self.note_off();
    }

    fn process(&mut self, num_frames: usize) -> &[f32] {
        let frames = num_frames.min(self.output.len());
        let sample_rate = self.sample_rate as f64;

        // Stable: a release queued before a strike at the same offset stays first
        self.pending_events.sort_by_key(|e| e.1);

        for frame_idx in 0..frames {
            while self
                .pending_events
                .first()
                .is_some_and(|(_, offset)| *offset as usize <= frame_idx)
            {
                let (event, _) = self.pending_events.remove(0);
                self.apply(event);
            }

            let mut mix = 0.0;
            for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
                mix += voice.tick(&self.bank, self.recipe.fm.as_ref(), sample_rate);
            }
            self.output[frame_idx] = (mix * self.level) as f32;
        }

        self.pending_events.retain(|e| e.1 as usize >= frames);
        for event in &mut self.pending_events {
            event.1 -= frames as u32;
        }

        &self.output[..frames]
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    fn dispose(&mut self) {
        self.pending_events.clear();
        self.voices.clear();
        self.output = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use songcraft_core::{InstrumentKind, BASS_RECIPE};

    use super::*;

    const SR: f32 = 48000.0;

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_adsr_shape() {
        let mut env = Adsr::new(Envelope::new(0.001, 0.001, 0.5, 0.001));
        env.gate_on();
        let levels: Vec<f64> = (0..200).map(|_| env.next(1000.0)).collect();
        assert_eq!(levels[0], 1.0);
        assert_eq!(levels[1], 0.5);
        assert_eq!(levels[199], 0.5);
        env.gate_off(1000.0);
        assert_eq!(env.next(1000.0), 0.0);
        assert!(env.is_idle());
    }

    #[test]
    fn test_release_from_partial_level() {
        let mut env = Adsr::new(Envelope::new(0.01, 0.1, 0.5, 0.004));
        env.gate_on();
        for _ in 0..5 {
            env.next(1000.0);
        }
        // Halfway through the attack
        env.gate_off(1000.0);
        assert!((env.next(1000.0) - 0.375).abs() < 1e-9);
    }

    #[test]
    fn test_zero_sustain_finishes_on_its_own() {
        let mut env = Adsr::new(InstrumentKind::Bell.recipe().envelope);
        env.gate_on();
        for _ in 0..(2.0 * SR) as usize {
            env.next(SR as f64);
        }
        assert!(env.is_idle());
    }

    #[test]
    fn test_every_recipe_sounds() {
        for kind in InstrumentKind::ALL {
            let mut synth = PolySynth::new(kind.as_str(), kind.recipe(), SR);
            synth.queue_note_on(&[48, 52, 55], 100, 0);
            let out = synth.process(4096);
            let level = peak(out);
            assert!(level > 0.0, "{kind} is silent");
            assert!(level < 1.0, "{kind} clips");
        }
    }

    #[test]
    fn test_note_on_at_offset() {
        let mut synth = PolySynth::new("piano", InstrumentKind::Piano.recipe(), SR);
        synth.queue_note_on(&[60], 100, 256);
        let out = synth.process(512).to_vec();
        assert!(out[..256].iter().all(|&s| s == 0.0));
        assert!(peak(&out[256..]) > 0.0);
    }

    #[test]
    fn test_note_off_releases_whole_group() {
        let mut synth = PolySynth::new("organ", InstrumentKind::Organ.recipe(), SR);
        synth.queue_note_on(&[48, 52, 55], 100, 0);
        synth.process(512);
        assert_eq!(synth.held_pitches().len(), 3);

        synth.queue_note_off(0);
        synth.queue_note_on(&[50, 53, 57], 100, 0);
        synth.process(512);
        let mut held = synth.held_pitches();
        held.sort();
        assert_eq!(held, vec![50, 53, 57]);

        // Organ release is 0.3 s
        synth.queue_note_off(0);
        for _ in 0..8 {
            synth.process(4096);
        }
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn test_voice_stealing_caps_polyphony() {
        let mut synth = PolySynth::new("pad", InstrumentKind::SynthPad.recipe(), SR);
        let cluster: Vec<u8> = (40..60).collect();
        synth.queue_note_on(&cluster, 100, 0);
        synth.process(64);
        assert_eq!(synth.active_voices(), MAX_VOICES);
        // The four oldest were stolen
        let mut held = synth.held_pitches();
        held.sort();
        assert_eq!(held, (44..60).collect::<Vec<u8>>());
    }

    #[test]
    fn test_all_notes_off_drops_queued_events() {
        let mut synth = PolySynth::new("bass", BASS_RECIPE, SR);
        synth.queue_note_on(&[36], 100, 1000);
        synth.all_notes_off();
        assert_eq!(peak(synth.process(2048)), 0.0);
    }

    #[test]
    fn test_dispose_twice_is_noop() {
        let mut synth = PolySynth::new("bell", InstrumentKind::Bell.recipe(), SR);
        synth.queue_note_on(&[72], 100, 0);
        synth.dispose();
        synth.dispose();
        assert!(synth.process(128).is_empty());
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn test_fat_oscillator_spread() {
        let bank = OscillatorBank::new(OscillatorShape::Fat {
            waveform: Waveform::Sawtooth,
            count: 3,
            spread_cents: 30.0,
        });
        assert_eq!(bank.ratios.len(), 3);
        assert!((bank.ratios[1] - 1.0).abs() < 1e-12);
        assert!(bank.ratios[0] < 1.0 && bank.ratios[2] > 1.0);
        assert!((bank.gains.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}
