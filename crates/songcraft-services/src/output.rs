//! The seam between the playback facade and whatever makes sound

use songcraft_core::{InstrumentKind, VoiceEvent};

use crate::audio_io::AudioOutputError;

/// Timestamped voice output with its own clock.
///
/// Times are seconds on the output clock, which only advances while running.
/// Events sent with `dispatch` must be applied at their exact time; events
/// for one voice at the same time apply in dispatch order.
pub trait AudioOutput {
    /// Acquire the device. Idempotent once it has succeeded.
    fn start(&mut self) -> Result<(), AudioOutputError>;
    fn is_started(&self) -> bool;
    /// Current clock position in seconds
    fn now(&self) -> f64;
    fn reset_clock(&mut self);
    fn set_clock_running(&mut self, running: bool);
    /// Build the harmony generator for `kind`, replacing any previous one
    fn install_instrument(&mut self, kind: InstrumentKind);
    /// Dispose the harmony generator
    fn remove_instrument(&mut self);
    fn dispatch(&mut self, event: VoiceEvent);
    /// Drop every event that has not fired yet
    fn cancel_pending(&mut self);
    /// Release every sounding voice now
    fn release_all(&mut self);
    /// Free all generators and the device. Safe to call more than once.
    fn dispose(&mut self);
}
