//! Native audio effects using fundsp

use std::fmt;

use fundsp::hacker::*;

use super::{AudioEffect, EffectParam};

/// Output gain, used as the master level
#[derive(Debug)]
pub struct GainEffect {
    gain_db: f32,
    gain_linear: f32,
    bypassed: bool,
}

impl GainEffect {
    pub fn new(gain_db: f32) -> Self {
        Self {
            gain_db,
            gain_linear: db_amp(gain_db),
            bypassed: false,
        }
    }
}

impl AudioEffect for GainEffect {
    fn name(&self) -> &str { "Gain" }

    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample *= self.gain_linear;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        if name != "gain" {
            return;
        }
        self.gain_db = value;
        self.gain_linear = db_amp(value);
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![EffectParam::new("gain", self.gain_db, -60.0, 12.0, "dB")]
    }

    fn set_bypass(&mut self, bypass: bool) { self.bypassed = bypass; }
    fn is_bypassed(&self) -> bool { self.bypassed }
}

/// Resonant low-pass filter; tames the bass voice's upper partials
pub struct LowPassEffect {
    cutoff_hz: f32,
    q: f32,
    filter: An<FixedSvf<f64, LowpassMode<f64>>>,
    bypassed: bool,
}

impl LowPassEffect {
    pub fn new(cutoff_hz: f32, q: f32, sample_rate: f32) -> Self {
        let mut filter = lowpass_hz(cutoff_hz, q);
        filter.set_sample_rate(sample_rate as f64);
        Self { cutoff_hz, q, filter, bypassed: false }
    }
}

impl fmt::Debug for LowPassEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LowPassEffect")
            .field("cutoff_hz", &self.cutoff_hz)
            .field("q", &self.q)
            .field("bypassed", &self.bypassed)
            .finish()
    }
}

impl AudioEffect for LowPassEffect {
    fn name(&self) -> &str { "Low Pass" }

    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let output = self.filter.tick(&Frame::from([*sample]));
            *sample = output[0];
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "cutoff" => self.cutoff_hz = value,
            "q" => self.q = value,
            _ => return,
        }
        self.filter.set(Setting::center_q(self.cutoff_hz, self.q));
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("cutoff", self.cutoff_hz, 40.0, 20000.0, "Hz"),
            EffectParam::new("q", self.q, 0.1, 10.0, ""),
        ]
    }

    fn set_bypass(&mut self, bypass: bool) { self.bypassed = bypass; }
    fn is_bypassed(&self) -> bool { self.bypassed }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.filter.set_sample_rate(sample_rate as f64);
    }
}

/// Comb delays (ms) of the reverb tank; mutually prime-ish so echoes smear
const COMB_DELAYS_MS: [f32; 4] = [29.7, 37.1, 41.1, 43.7];
const ALLPASS_DELAYS_MS: [f32; 2] = [5.0, 1.7];
const ALLPASS_GAIN: f32 = 0.7;

#[derive(Debug, Clone)]
struct DelayLine {
    buffer: Vec<f32>,
    pos: usize,
}

impl DelayLine {
    fn new(ms: f32, sample_rate: f32) -> Self {
        let len = std::cmp::Ord::max((ms * sample_rate / 1000.0) as usize, 1);
        Self { buffer: vec![0.0; len], pos: 0 }
    }

    fn read(&self) -> f32 {
        self.buffer[self.pos]
    }

    fn write_advance(&mut self, value: f32) {
        self.buffer[self.pos] = value;
        self.pos = (self.pos + 1) % self.buffer.len();
    }
}

/// Schroeder reverb: four damped combs into two allpasses.
///
/// Comb feedback is derived from `decay` so the tail falls 60 dB in that many seconds.
pub struct ReverbEffect {
    decay: f32,
    damping: f32,
    mix: f32,
    combs: Vec<DelayLine>,
    comb_feedback: Vec<f32>,
    comb_filter: Vec<f32>,
    allpasses: Vec<DelayLine>,
    sample_rate: f32,
    bypassed: bool,
}

impl ReverbEffect {
    pub fn new(decay: f32, damping: f32, mix: f32, sample_rate: f32) -> Self {
        let mut effect = Self {
            decay: decay.max(0.1),
            damping: damping.clamp(0.0, 1.0),
            mix: mix.clamp(0.0, 1.0),
            combs: Vec::new(),
            comb_feedback: Vec::new(),
            comb_filter: Vec::new(),
            allpasses: Vec::new(),
            sample_rate,
            bypassed: false,
        };
        effect.rebuild_delays();
        effect
    }

    fn rebuild_delays(&mut self) {
        self.combs = COMB_DELAYS_MS
            .iter()
            .map(|&ms| DelayLine::new(ms, self.sample_rate))
            .collect();
        self.comb_filter = vec![0.0; self.combs.len()];
        self.allpasses = ALLPASS_DELAYS_MS
            .iter()
            .map(|&ms| DelayLine::new(ms, self.sample_rate))
            .collect();
        self.update_feedback();
    }

    fn update_feedback(&mut self) {
        self.comb_feedback = COMB_DELAYS_MS
            .iter()
            .map(|&ms| 0.001f32.powf(ms / 1000.0 / self.decay))
            .collect();
    }
}

impl fmt::Debug for ReverbEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReverbEffect")
            .field("decay", &self.decay)
            .field("damping", &self.damping)
            .field("mix", &self.mix)
            .field("bypassed", &self.bypassed)
            .finish()
    }
}

impl AudioEffect for ReverbEffect {
    fn name(&self) -> &str { "Reverb" }

    fn process(&mut self, samples: &mut [f32]) {
        let damp = self.damping * 0.4;
        let comb_count = self.combs.len() as f32;

        for sample in samples.iter_mut() {
            let dry = *sample;

            let mut wet = 0.0;
            for (i, comb) in self.combs.iter_mut().enumerate() {
                let delayed = comb.read();
                self.comb_filter[i] = delayed * (1.0 - damp) + self.comb_filter[i] * damp;
                comb.write_advance(dry + self.comb_filter[i] * self.comb_feedback[i]);
                wet += delayed;
            }
            wet /= comb_count;

            for allpass in &mut self.allpasses {
                let delayed = allpass.read();
                let input = wet + delayed * ALLPASS_GAIN;
                allpass.write_advance(input);
                wet = delayed - input * ALLPASS_GAIN;
            }

            *sample = dry * (1.0 - self.mix) + wet * self.mix;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "decay" => {
                self.decay = value.max(0.1);
                self.update_feedback();
            }
            "damping" => self.damping = value.clamp(0.0, 1.0),
            "mix" => self.mix = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("decay", self.decay, 0.1, 10.0, "s"),
            EffectParam::new("damping", self.damping, 0.0, 1.0, ""),
            EffectParam::new("mix", self.mix, 0.0, 1.0, ""),
        ]
    }

    fn set_bypass(&mut self, bypass: bool) { self.bypassed = bypass; }
    fn is_bypassed(&self) -> bool { self.bypassed }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if (sample_rate - self.sample_rate).abs() < 1.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.rebuild_delays();
    }
}

/// Longest modulated delay the chorus line must hold
const CHORUS_MAX_DELAY_MS: f32 = 30.0;

/// Mono chorus: a sine-modulated short delay mixed with the dry signal
pub struct ChorusEffect {
    rate_hz: f32,
    delay_ms: f32,
    depth: f32,
    mix: f32,
    buffer: Vec<f32>,
    write_pos: usize,
    lfo_phase: f32,
    sample_rate: f32,
    bypassed: bool,
}

impl ChorusEffect {
    pub fn new(rate_hz: f32, delay_ms: f32, depth: f32, mix: f32, sample_rate: f32) -> Self {
        let mut effect = Self {
            rate_hz: rate_hz.max(0.01),
            delay_ms: delay_ms.clamp(0.5, CHORUS_MAX_DELAY_MS / 2.0),
            depth: depth.clamp(0.0, 1.0),
            mix: mix.clamp(0.0, 1.0),
            buffer: Vec::new(),
            write_pos: 0,
            lfo_phase: 0.0,
            sample_rate,
            bypassed: false,
        };
        effect.rebuild_buffer();
        effect
    }

    fn rebuild_buffer(&mut self) {
        let len = (CHORUS_MAX_DELAY_MS * self.sample_rate / 1000.0) as usize + 2;
        self.buffer = vec![0.0; len];
        self.write_pos = 0;
    }

    /// Linear-interpolated read `delay` samples behind the write head
    fn read_behind(&self, delay: f32) -> f32 {
        let len = self.buffer.len();
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;
        let a = self.buffer[(self.write_pos + len - whole) % len];
        let b = self.buffer[(self.write_pos + len - whole - 1) % len];
        a + (b - a) * frac
    }
}

impl fmt::Debug for ChorusEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChorusEffect")
            .field("rate_hz", &self.rate_hz)
            .field("delay_ms", &self.delay_ms)
            .field("depth", &self.depth)
            .field("mix", &self.mix)
            .field("bypassed", &self.bypassed)
            .finish()
    }
}

impl AudioEffect for ChorusEffect {
    fn name(&self) -> &str { "Chorus" }

    fn process(&mut self, samples: &mut [f32]) {
        let base = self.delay_ms * self.sample_rate / 1000.0;
        let lfo_step = self.rate_hz / self.sample_rate;
        let max_delay = (self.buffer.len() - 2) as f32;

        for sample in samples.iter_mut() {
            let dry = *sample;
            self.buffer[self.write_pos] = dry;

            let lfo = (self.lfo_phase * std::f32::consts::TAU).sin();
            let delay = (base * (1.0 + self.depth * lfo)).clamp(1.0, max_delay);
            let wet = self.read_behind(delay);

            self.write_pos = (self.write_pos + 1) % self.buffer.len();
            self.lfo_phase = (self.lfo_phase + lfo_step).fract();

            *sample = dry * (1.0 - self.mix) + wet * self.mix;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "rate" => self.rate_hz = value.max(0.01),
            "delay" => self.delay_ms = value.clamp(0.5, CHORUS_MAX_DELAY_MS / 2.0),
            "depth" => self.depth = value.clamp(0.0, 1.0),
            "mix" => self.mix = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("rate", self.rate_hz, 0.01, 10.0, "Hz"),
            EffectParam::new("delay", self.delay_ms, 0.5, CHORUS_MAX_DELAY_MS / 2.0, "ms"),
            EffectParam::new("depth", self.depth, 0.0, 1.0, ""),
            EffectParam::new("mix", self.mix, 0.0, 1.0, ""),
        ]
    }

    fn set_bypass(&mut self, bypass: bool) { self.bypassed = bypass; }
    fn is_bypassed(&self) -> bool { self.bypassed }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if (sample_rate - self.sample_rate).abs() < 1.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.rebuild_buffer();
    }
}
