//! Three-piece synthesized drum kit: membrane kick, noise snare, metallic hi-hat

use std::fmt;

use fundsp::hacker::*;

use crate::audio_effects::AudioInstrument;

/// MIDI note mappings (GM drum map compatible)
pub const KICK: u8 = 36;       // C1
pub const SNARE: u8 = 38;      // D1
pub const CLOSED_HAT: u8 = 42; // F#1

const KICK_DB: f32 = -6.0;
const SNARE_DB: f32 = -10.0;
const HAT_DB: f32 = -18.0;

/// Kick: pitch falls from `octaves` times the base to the base
const KICK_BASE_HZ: f64 = 32.7;
const KICK_OCTAVES: f64 = 6.0;
const KICK_PITCH_DECAY: f64 = 0.05;
const KICK_DECAY: f64 = 0.4;

const SNARE_DECAY: f64 = 0.2;

/// Hat: six inharmonic square partials above a 200 Hz fundamental
const HAT_BASE_HZ: f64 = 200.0;
const HAT_HARMONICITY: f64 = 5.1;
const HAT_RATIOS: [f64; 6] = [1.0, 1.342, 1.2312, 1.6532, 1.9523, 2.1523];
const HAT_RESONANCE_HZ: f32 = 4000.0;
const HAT_DECAY: f64 = 0.05;

/// Amplitude below which a voice is considered finished
const SILENCE: f64 = 0.0001;
/// Extra decay applied to a choked voice, short enough to sound like a cut without clicking
const CHOKE_DECAY: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrumKind {
    Kick,
    Snare,
    Hat,
}

impl DrumKind {
    fn from_pitch(pitch: u8) -> Option<Self> {
        match pitch {
            KICK => Some(Self::Kick),
            SNARE => Some(Self::Snare),
            CLOSED_HAT => Some(Self::Hat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct DrumVoice {
    kind: DrumKind,
    active: bool,
    phases: [f64; 6],
    amp_env: f64,
    pitch_env: f64,
    velocity: f64,
    choked: bool,
}

impl DrumVoice {
    fn new(kind: DrumKind) -> Self {
        Self {
            kind,
            active: false,
            phases: [0.0; 6],
            amp_env: 0.0,
            pitch_env: 0.0,
            velocity: 1.0,
            choked: false,
        }
    }

    fn trigger(&mut self, velocity: u8) {
        self.active = true;
        self.phases = [0.0; 6];
        self.amp_env = 1.0;
        self.pitch_env = 1.0;
        self.velocity = velocity as f64 / 127.0;
        self.choked = false;
    }

    fn choke(&mut self) {
        self.choked = self.active;
    }

    fn tick(&mut self, dt: f64) -> f64 {
        if !self.active {
            return 0.0;
        }

        let sample = match self.kind {
            DrumKind::Kick => self.tick_kick(dt),
            DrumKind::Snare => self.tick_snare(dt),
            DrumKind::Hat => self.tick_hat(dt),
        };
        if self.choked {
            self.amp_env *= (-dt / CHOKE_DECAY).exp();
        }

        if self.amp_env < SILENCE {
            self.active = false;
        }

        sample * self.velocity
    }

    fn tick_kick(&mut self, dt: f64) -> f64 {
        self.pitch_env *= (-dt / KICK_PITCH_DECAY).exp();
        let freq = KICK_BASE_HZ * (1.0 + self.pitch_env * (KICK_OCTAVES - 1.0));

        self.phases[0] += freq * dt;
        let osc = (self.phases[0] * std::f64::consts::TAU).sin();

        self.amp_env *= (-dt / KICK_DECAY).exp();
        osc * self.amp_env
    }

    fn tick_snare(&mut self, dt: f64) -> f64 {
        let noise = fastrand::f64() * 2.0 - 1.0;
        self.amp_env *= (-dt / SNARE_DECAY).exp();
        noise * self.amp_env
    }

    /// Raw metallic partials; the kit band-limits them through its resonance filter
    fn tick_hat(&mut self, dt: f64) -> f64 {
        let base = HAT_BASE_HZ * HAT_HARMONICITY;
        let mut sum = 0.0;
        for (phase, ratio) in self.phases.iter_mut().zip(HAT_RATIOS) {
            *phase = (*phase + base * ratio * dt).fract();
            sum += if *phase < 0.5 { 1.0 } else { -1.0 };
        }
        self.amp_env *= (-dt / HAT_DECAY).exp();
        sum / HAT_RATIOS.len() as f64 * self.amp_env
    }
}

const MAX_BLOCK_SIZE: usize = 4096;

/// Kick, snare and closed hat with fixed levels
pub struct DrumKit {
    sample_rate: f32,
    kick: DrumVoice,
    snare: DrumVoice,
    hat: DrumVoice,
    hat_filter: An<FixedSvf<f64, HighpassMode<f64>>>,
    levels: [f64; 3],
    pending_events: Vec<(u8, u8, u32)>, // (pitch, velocity, offset)
    output: Vec<f32>,
}

impl fmt::Debug for DrumKit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrumKit")
            .field("sample_rate", &self.sample_rate)
            .field("pending", &self.pending_events.len())
            .finish()
    }
}

impl DrumKit {
    pub fn new(sample_rate: f32) -> Self {
        let mut hat_filter = highpass_hz(HAT_RESONANCE_HZ, 0.707);
        hat_filter.set_sample_rate(sample_rate as f64);

        Self {
            sample_rate,
            kick: DrumVoice::new(DrumKind::Kick),
            snare: DrumVoice::new(DrumKind::Snare),
            hat: DrumVoice::new(DrumKind::Hat),
            hat_filter,
            levels: [KICK_DB, SNARE_DB, HAT_DB].map(|db| db_amp(db) as f64),
            pending_events: Vec::new(),
            output: vec![0.0; MAX_BLOCK_SIZE],
        }
    }

    fn trigger_drum(&mut self, pitch: u8, velocity: u8) {
        match DrumKind::from_pitch(pitch) {
            Some(DrumKind::Kick) => self.kick.trigger(velocity),
            Some(DrumKind::Snare) => self.snare.trigger(velocity),
            Some(DrumKind::Hat) => self.hat.trigger(velocity),
            None => {}
        }
    }

    /// Fade out whatever is ringing and drop hits not yet started
    pub fn choke(&mut self) {
        self.pending_events.clear();
        for voice in [&mut self.kick, &mut self.snare, &mut self.hat] {
            voice.choke();
        }
    }

    pub fn is_silent(&self) -> bool {
        !(self.kick.active || self.snare.active || self.hat.active)
    }
}

impl AudioInstrument for DrumKit {
    fn name(&self) -> &str {
        "Drum Kit"
    }

    fn queue_note_on(&mut self, pitches: &[u8], velocity: u8, sample_offset: u32) {
        for &pitch in pitches {
            self.pending_events.push((pitch, velocity, sample_offset));
        }
    }

    fn queue_note_off(&mut self, _sample_offset: u32) {
        // One-shot voices decay on their own
    }

    fn all_notes_off(&mut self) {
        self.pending_events.clear();
        for voice in [&mut self.kick, &mut self.snare, &mut self.hat] {
            voice.active = false;
        }
    }

    fn process(&mut self, num_frames: usize) -> &[f32] {
        let frames = std::cmp::Ord::min(num_frames, self.output.len());
        let dt = 1.0 / self.sample_rate as f64;

        self.pending_events.sort_by_key(|e| e.2);

        for frame_idx in 0..frames {
            while let Some(&(pitch, velocity, offset)) = self.pending_events.first() {
                if offset as usize > frame_idx {
                    break;
                }
                self.pending_events.remove(0);
                self.trigger_drum(pitch, velocity);
            }

            let hat = self.hat_filter.tick(&Frame::from([self.hat.tick(dt) as f32]))[0] as f64;
            let mix = self.kick.tick(dt) * self.levels[0]
                + self.snare.tick(dt) * self.levels[1]
                + hat * self.levels[2];
            self.output[frame_idx] = mix as f32;
        }

        self.pending_events.retain(|e| e.2 as usize >= frames);
        for event in &mut self.pending_events {
            event.2 -= frames as u32;
        }

        &self.output[..frames]
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.hat_filter.set_sample_rate(sample_rate as f64);
    }

    fn dispose(&mut self) {
        self.all_notes_off();
        self.output = Vec::new();
    }
}
