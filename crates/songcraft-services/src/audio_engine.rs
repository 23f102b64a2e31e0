//! Real-time audio engine: applies timestamped voice events at exact frames

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use songcraft_core::{EffectSend, InstrumentKind, VoiceAction, VoiceEvent, VoiceId, BASS_RECIPE};
use tracing::{debug, info, warn};

use crate::audio_effects::{
    AudioEffect, AudioInstrument, DrumKit, EffectRack, GainEffect, LowPassEffect, PolySynth, CLOSED_HAT, KICK, SNARE,
};
use crate::audio_io::{AudioOutputError, RealtimeOutputStream};
use crate::output::AudioOutput;

/// Sample rate assumed until the device reports its own
const NOMINAL_SAMPLE_RATE: u32 = 48000;
const MAX_BLOCK_SIZE: usize = 4096;
const NOTE_VELOCITY: u8 = 100;
const BASS_CUTOFF_HZ: f32 = 900.0;

/// Clock state shared between the control side and the audio thread
pub struct EngineState {
    /// Clock position in frames; advanced only by the audio thread while running
    pub position: AtomicU64,
    pub running: AtomicBool,
    pub sample_rate: AtomicU32,
}

impl EngineState {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            position: AtomicU64::new(0),
            running: AtomicBool::new(false),
            sample_rate: AtomicU32::new(sample_rate),
        }
    }

    pub fn now(&self) -> f64 {
        let sample_rate = self.sample_rate.load(Ordering::SeqCst).max(1);
        self.position.load(Ordering::SeqCst) as f64 / sample_rate as f64
    }
}

/// Control messages for the audio thread, applied in send order
pub enum EngineCommand {
    Schedule(VoiceEvent),
    CancelPending,
    ReleaseAll,
    Install(Box<PolySynth>, EffectSend),
    RemoveInstrument,
}

/// Audio-thread half of the engine
pub struct Renderer {
    state: Arc<EngineState>,
    commands: Receiver<EngineCommand>,
    sample_rate: u32,
    /// (frame, event), sorted by frame; ties keep arrival order
    pending: Vec<(u64, VoiceEvent)>,
    harmony: Option<Box<PolySynth>>,
    bass: PolySynth,
    bass_filter: LowPassEffect,
    drums: DrumKit,
    rack: EffectRack,
    master: GainEffect,
    harmony_buf: Vec<f32>,
    mix: Vec<f32>,
}

impl Renderer {
    pub fn new(state: Arc<EngineState>, commands: Receiver<EngineCommand>, master_gain_db: f32) -> Self {
        let sample_rate = state.sample_rate.load(Ordering::SeqCst);
        let sr = sample_rate as f32;
        Self {
            state,
            commands,
            sample_rate,
            pending: Vec::new(),
            harmony: None,
            bass: PolySynth::new("Bass", BASS_RECIPE, sr),
            bass_filter: LowPassEffect::new(BASS_CUTOFF_HZ, 0.707, sr),
            drums: DrumKit::new(sr),
            rack: EffectRack::new(sr),
            master: GainEffect::new(master_gain_db),
            harmony_buf: vec![0.0; MAX_BLOCK_SIZE],
            mix: vec![0.0; MAX_BLOCK_SIZE],
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        let sr = sample_rate as f32;
        if let Some(harmony) = &mut self.harmony {
            harmony.set_sample_rate(sr);
        }
        self.bass.set_sample_rate(sr);
        self.bass_filter.set_sample_rate(sr);
        self.drums.set_sample_rate(sr);
        self.rack.set_sample_rate(sr);
    }

    fn frame_of(&self, time: f64) -> u64 {
        (time.max(0.0) * self.sample_rate as f64).round() as u64
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::Schedule(event) => {
                    let frame = self.frame_of(event.time);
                    let idx = self.pending.partition_point(|(f, _)| *f <= frame);
                    self.pending.insert(idx, (frame, event));
                }
                EngineCommand::CancelPending => self.pending.clear(),
                EngineCommand::ReleaseAll => {
                    if let Some(harmony) = &mut self.harmony {
                        harmony.all_notes_off();
                    }
                    self.bass.all_notes_off();
                    self.drums.choke();
                }
                EngineCommand::Install(mut synth, send) => {
                    synth.set_sample_rate(self.sample_rate as f32);
                    if let Some(mut old) = self.harmony.replace(synth) {
                        old.dispose();
                    }
                    self.rack.apply_send(send);
                }
                EngineCommand::RemoveInstrument => {
                    if let Some(mut old) = self.harmony.take() {
                        old.dispose();
                    }
                }
            }
        }
    }

    /// Hand every event due before `end` to its voice at the matching offset
    fn queue_due(&mut self, start: u64, end: u64) {
        let split = self.pending.partition_point(|(f, _)| *f < end);
        for (frame, event) in self.pending.drain(..split) {
            let offset = frame.saturating_sub(start) as u32;
            let drum = match event.voice {
                VoiceId::Kick => Some(KICK),
                VoiceId::Snare => Some(SNARE),
                VoiceId::HiHat => Some(CLOSED_HAT),
                VoiceId::Harmony | VoiceId::Bass => None,
            };
            if let Some(pitch) = drum {
                self.drums.queue_note_on(&[pitch], NOTE_VELOCITY, offset);
                continue;
            }

            let synth: &mut dyn AudioInstrument = match (event.voice, &mut self.harmony) {
                (VoiceId::Harmony, Some(harmony)) => harmony.as_mut(),
                (VoiceId::Harmony, None) => continue,
                _ => &mut self.bass,
            };
            match &event.action {
                VoiceAction::NoteOn(pitches) => synth.queue_note_on(pitches, NOTE_VELOCITY, offset),
                VoiceAction::NoteOff => synth.queue_note_off(offset),
                VoiceAction::Hit => {}
            }
        }
    }

    /// Fill an interleaved output buffer (called from the audio thread)
    pub fn render(&mut self, buffer: &mut [f32], sample_rate: u32, channels: u16) {
        if sample_rate != self.sample_rate {
            self.set_sample_rate(sample_rate);
        }
        self.drain_commands();

        let channels = channels.max(1) as usize;
        for chunk in buffer.chunks_mut(MAX_BLOCK_SIZE * channels) {
            self.render_block(chunk, channels);
        }
    }

    fn render_block(&mut self, buffer: &mut [f32], channels: usize) {
        let num_frames = buffer.len() / channels;
        let running = self.state.running.load(Ordering::SeqCst);
        let pos = self.state.position.load(Ordering::SeqCst);

        if running {
            self.queue_due(pos, pos + num_frames as u64);
        }

        let harmony = &mut self.harmony_buf[..num_frames];
        harmony.fill(0.0);
        if let Some(synth) = &mut self.harmony {
            for (dst, src) in harmony.iter_mut().zip(synth.process(num_frames)) {
                *dst = *src;
            }
        }
        self.rack.process(harmony);

        let mix = &mut self.mix[..num_frames];
        mix.copy_from_slice(harmony);

        let bass = self.bass.process(num_frames);
        let mut bass_block = [0.0f32; 1];
        for (dst, src) in mix.iter_mut().zip(bass) {
            bass_block[0] = *src;
            self.bass_filter.process(&mut bass_block);
            *dst += bass_block[0];
        }

        for (dst, src) in mix.iter_mut().zip(self.drums.process(num_frames)) {
            *dst += *src;
        }

        self.master.process(mix);

        for (frame, sample) in buffer.chunks_mut(channels).zip(mix.iter()) {
            frame.fill(sample.tanh());
        }

        // A reset from the control side wins over this advance
        if running {
            let _ = self.state.position.compare_exchange(
                pos,
                pos + num_frames as u64,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Real-time output: owns the device stream and talks to the renderer over a channel
pub struct AudioEngine {
    state: Arc<EngineState>,
    stream: Option<RealtimeOutputStream>,
    commands: Option<Sender<EngineCommand>>,
    master_gain_db: f32,
}

impl AudioEngine {
    pub fn new(master_gain_db: f32) -> Self {
        Self {
            state: Arc::new(EngineState::new(NOMINAL_SAMPLE_RATE)),
            stream: None,
            commands: None,
            master_gain_db,
        }
    }

    /// Get shared state for UI access
    pub fn state(&self) -> Arc<EngineState> {
        self.state.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.state.sample_rate.load(Ordering::SeqCst)
    }

    fn send(&self, command: EngineCommand) {
        let Some(commands) = &self.commands else {
            return;
        };
        if commands.send(command).is_err() {
            warn!("Audio thread is gone; command dropped");
        }
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl AudioOutput for AudioEngine {
    fn start(&mut self) -> Result<(), AudioOutputError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (tx, rx) = unbounded();
        let mut renderer = Renderer::new(self.state.clone(), rx, self.master_gain_db);
        let stream = RealtimeOutputStream::start(move |buffer, sample_rate, channels| {
            renderer.render(buffer, sample_rate, channels);
        })?;

        self.state.sample_rate.store(stream.sample_rate(), Ordering::SeqCst);
        self.stream = Some(stream);
        self.commands = Some(tx);
        info!(sample_rate = self.sample_rate(), "Audio engine started");
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.stream.is_some()
    }

    fn now(&self) -> f64 {
        self.state.now()
    }

    fn reset_clock(&mut self) {
        self.state.position.store(0, Ordering::SeqCst);
    }

    fn set_clock_running(&mut self, running: bool) {
        self.state.running.store(running, Ordering::SeqCst);
    }

    fn install_instrument(&mut self, kind: InstrumentKind) {
        if self.commands.is_none() {
            return;
        }
        let recipe = kind.recipe();
        let synth = PolySynth::new(kind.display_name(), recipe, self.sample_rate() as f32);
        debug!(instrument = %kind, "Installing instrument");
        self.send(EngineCommand::Install(Box::new(synth), recipe.send));
    }

    fn remove_instrument(&mut self) {
        self.send(EngineCommand::RemoveInstrument);
    }

    fn dispatch(&mut self, event: VoiceEvent) {
        self.send(EngineCommand::Schedule(event));
    }

    fn cancel_pending(&mut self) {
        self.send(EngineCommand::CancelPending);
    }

    fn release_all(&mut self) {
        self.send(EngineCommand::ReleaseAll);
    }

    fn dispose(&mut self) {
        self.state.running.store(false, Ordering::SeqCst);
        self.commands = None;
        if let Some(stream) = self.stream.take() {
            stream.stop();
            info!("Audio engine stopped");
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48000;

    fn renderer() -> (Renderer, Sender<EngineCommand>, Arc<EngineState>) {
        let state = Arc::new(EngineState::new(SR));
        let (tx, rx) = unbounded();
        (Renderer::new(state.clone(), rx, 0.0), tx, state)
    }

    fn event(time: f64, voice: VoiceId, action: VoiceAction) -> VoiceEvent {
        VoiceEvent { time, tick: 0, voice, action }
    }

    fn first_sound(buffer: &[f32], channels: usize) -> Option<usize> {
        buffer.chunks(channels).position(|f| f[0] != 0.0)
    }

    #[test]
    fn test_event_lands_on_exact_frame() {
        let (mut renderer, tx, state) = renderer();
        state.running.store(true, Ordering::SeqCst);
        // 0.01 s = frame 480, inside the second block
        tx.send(EngineCommand::Schedule(event(0.01, VoiceId::Kick, VoiceAction::Hit))).unwrap();

        let mut first = vec![0.0; 256 * 2];
        renderer.render(&mut first, SR, 2);
        assert_eq!(first_sound(&first, 2), None);

        let mut second = vec![0.0; 256 * 2];
        renderer.render(&mut second, SR, 2);
        assert_eq!(first_sound(&second, 2), Some(480 - 256));
        assert_eq!(state.position.load(Ordering::SeqCst), 512);
    }

    #[test]
    fn test_clock_frozen_while_stopped() {
        let (mut renderer, tx, state) = renderer();
        tx.send(EngineCommand::Schedule(event(0.0, VoiceId::Snare, VoiceAction::Hit))).unwrap();
        let mut buffer = vec![0.0; 512];
        renderer.render(&mut buffer, SR, 1);
        assert_eq!(state.position.load(Ordering::SeqCst), 0);
        assert_eq!(renderer.pending_len(), 1);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_cancel_drops_scheduled_events() {
        let (mut renderer, tx, state) = renderer();
        state.running.store(true, Ordering::SeqCst);
        tx.send(EngineCommand::Schedule(event(0.001, VoiceId::Kick, VoiceAction::Hit))).unwrap();
        tx.send(EngineCommand::CancelPending).unwrap();
        let mut buffer = vec![0.0; 1024];
        renderer.render(&mut buffer, SR, 1);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_harmony_needs_an_instrument() {
        let (mut renderer, tx, state) = renderer();
        state.running.store(true, Ordering::SeqCst);
        tx.send(EngineCommand::Schedule(event(0.0, VoiceId::Harmony, VoiceAction::NoteOn(vec![60]))))
            .unwrap();
        let mut buffer = vec![0.0; 1024];
        renderer.render(&mut buffer, SR, 1);
        assert!(buffer.iter().all(|&s| s == 0.0));

        let kind = InstrumentKind::Organ;
        let synth = PolySynth::new("organ", kind.recipe(), SR as f32);
        tx.send(EngineCommand::Install(Box::new(synth), kind.recipe().send)).unwrap();
        tx.send(EngineCommand::Schedule(event(0.03, VoiceId::Harmony, VoiceAction::NoteOn(vec![60]))))
            .unwrap();
        renderer.render(&mut buffer, SR, 1);
        assert!(buffer.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_output_is_soft_clipped() {
        let (mut renderer, tx, state) = renderer();
        state.running.store(true, Ordering::SeqCst);
        for voice in [VoiceId::Kick, VoiceId::Snare, VoiceId::HiHat] {
            tx.send(EngineCommand::Schedule(event(0.0, voice, VoiceAction::Hit))).unwrap();
        }
        tx.send(EngineCommand::Schedule(event(0.0, VoiceId::Bass, VoiceAction::NoteOn(vec![36]))))
            .unwrap();
        let mut buffer = vec![0.0; 4096];
        renderer.render(&mut buffer, SR, 1);
        assert!(buffer.iter().all(|s| s.abs() < 1.0));
    }

    #[test]
    fn test_release_all_silences_drums() {
        let (mut renderer, tx, state) = renderer();
        state.running.store(true, Ordering::SeqCst);
        tx.send(EngineCommand::Schedule(event(0.0, VoiceId::Kick, VoiceAction::Hit))).unwrap();
        let mut buffer = vec![0.0; 256];
        renderer.render(&mut buffer, SR, 1);
        assert!(buffer.iter().any(|&s| s != 0.0));

        tx.send(EngineCommand::ReleaseAll).unwrap();
        let mut tail = vec![0.0; 4096];
        renderer.render(&mut tail, SR, 1);
        // A 400 ms kick would still ring here without the release
        assert!(tail[3000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_reset_during_render_wins() {
        let (mut renderer, _tx, state) = renderer();
        state.running.store(true, Ordering::SeqCst);
        let mut buffer = vec![0.0; 256];
        renderer.render(&mut buffer, SR, 1);
        assert_eq!(state.position.load(Ordering::SeqCst), 256);
        state.position.store(0, Ordering::SeqCst);
        assert_eq!(state.now(), 0.0);
    }
}
