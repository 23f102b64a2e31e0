//! Headless output with a manually advanced clock

use songcraft_core::{InstrumentKind, VoiceEvent};
use tracing::debug;

use crate::audio_io::AudioOutputError;
use crate::output::AudioOutput;

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Deterministic output for tests and device-less hosts.
///
/// Nothing is rendered; events are logged when dispatched and again when the
/// clock reaches their frame.
#[derive(Debug)]
pub struct OfflineOutput {
    sample_rate: u32,
    frame: u64,
    running: bool,
    started: bool,
    available: bool,
    disposed: bool,
    instrument: Option<InstrumentKind>,
    pending: Vec<VoiceEvent>,
    dispatched: Vec<VoiceEvent>,
    fired: Vec<VoiceEvent>,
    installs: Vec<InstrumentKind>,
    releases: usize,
}

impl Default for OfflineOutput {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl OfflineOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frame: 0,
            running: false,
            started: false,
            available: true,
            disposed: false,
            instrument: None,
            pending: Vec::new(),
            dispatched: Vec::new(),
            fired: Vec::new(),
            installs: Vec::new(),
            releases: 0,
        }
    }

    /// An output whose `start` fails until `grant` is called
    pub fn unavailable() -> Self {
        Self { available: false, ..Self::default() }
    }

    pub fn grant(&mut self) {
        self.available = true;
    }

    fn frame_of(&self, time: f64) -> u64 {
        (time.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Move the clock forward (only while running) and fire due events
    pub fn advance(&mut self, secs: f64) {
        if !self.running {
            return;
        }
        self.frame += self.frame_of(secs);

        let now = self.frame;
        let split = self.pending.partition_point(|e| self.frame_of(e.time) <= now);
        let due: Vec<VoiceEvent> = self.pending.drain(..split).collect();
        self.fired.extend(due);
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn instrument(&self) -> Option<InstrumentKind> {
        self.instrument
    }

    pub fn pending(&self) -> &[VoiceEvent] {
        &self.pending
    }

    pub fn dispatched(&self) -> &[VoiceEvent] {
        &self.dispatched
    }

    pub fn fired(&self) -> &[VoiceEvent] {
        &self.fired
    }

    pub fn installs(&self) -> &[InstrumentKind] {
        &self.installs
    }

    pub fn releases(&self) -> usize {
        self.releases
    }

    pub fn clear_log(&mut self) {
        self.dispatched.clear();
        self.fired.clear();
    }
}

impl AudioOutput for OfflineOutput {
    fn start(&mut self) -> Result<(), AudioOutputError> {
        if !self.available {
            return Err(AudioOutputError::NoDevices);
        }
        self.started = true;
        self.disposed = false;
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    fn reset_clock(&mut self) {
        self.frame = 0;
    }

    fn set_clock_running(&mut self, running: bool) {
        self.running = running;
    }

    fn install_instrument(&mut self, kind: InstrumentKind) {
        debug!(instrument = %kind, "Offline instrument installed");
        self.instrument = Some(kind);
        self.installs.push(kind);
    }

    fn remove_instrument(&mut self) {
        self.instrument = None;
    }

    fn dispatch(&mut self, event: VoiceEvent) {
        // Insert after every event at or before this time, keeping dispatch order for ties
        let idx = self.pending.partition_point(|e| e.time <= event.time);
        self.pending.insert(idx, event.clone());
        self.dispatched.push(event);
    }

    fn cancel_pending(&mut self) {
        self.pending.clear();
    }

    fn release_all(&mut self) {
        self.releases += 1;
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.pending.clear();
        self.instrument = None;
        self.running = false;
        self.started = false;
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use songcraft_core::{VoiceAction, VoiceId};

    use super::*;

    fn hit(time: f64, voice: VoiceId) -> VoiceEvent {
        VoiceEvent { time, tick: 0, voice, action: VoiceAction::Hit }
    }

    #[test]
    fn test_clock_only_moves_while_running() {
        let mut output = OfflineOutput::default();
        output.advance(1.0);
        assert_eq!(output.now(), 0.0);
        output.set_clock_running(true);
        output.advance(0.5);
        assert_eq!(output.now(), 0.5);
        output.set_clock_running(false);
        output.advance(0.5);
        assert_eq!(output.now(), 0.5);
    }

    #[test]
    fn test_events_fire_when_clock_reaches_them() {
        let mut output = OfflineOutput::default();
        output.start().unwrap();
        output.set_clock_running(true);
        output.dispatch(hit(0.5, VoiceId::Snare));
        output.dispatch(hit(0.25, VoiceId::Kick));
        output.advance(0.3);
        assert_eq!(output.fired().len(), 1);
        assert_eq!(output.fired()[0].voice, VoiceId::Kick);
        output.advance(0.2);
        assert_eq!(output.fired().len(), 2);
        assert!(output.pending().is_empty());
    }

    #[test]
    fn test_ties_keep_dispatch_order() {
        let mut output = OfflineOutput::default();
        output.set_clock_running(true);
        output.dispatch(VoiceEvent { time: 1.0, tick: 8, voice: VoiceId::Harmony, action: VoiceAction::NoteOff });
        output.dispatch(VoiceEvent {
            time: 1.0,
            tick: 8,
            voice: VoiceId::Harmony,
            action: VoiceAction::NoteOn(vec![60]),
        });
        output.advance(1.0);
        assert_eq!(output.fired()[0].action, VoiceAction::NoteOff);
    }

    #[test]
    fn test_cancel_drops_pending() {
        let mut output = OfflineOutput::default();
        output.set_clock_running(true);
        output.dispatch(hit(0.1, VoiceId::HiHat));
        output.cancel_pending();
        output.advance(1.0);
        assert!(output.fired().is_empty());
        assert_eq!(output.dispatched().len(), 1);
    }

    #[test]
    fn test_unavailable_until_granted() {
        let mut output = OfflineOutput::unavailable();
        assert_eq!(output.start(), Err(AudioOutputError::NoDevices));
        assert!(!output.is_started());
        output.grant();
        assert!(output.start().is_ok());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut output = OfflineOutput::default();
        output.start().unwrap();
        output.install_instrument(InstrumentKind::Organ);
        output.dispose();
        output.dispose();
        assert!(output.is_disposed());
        assert_eq!(output.instrument(), None);
    }
}
