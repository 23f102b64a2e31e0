//! Playback facade: the transport controls a UI drives

use std::collections::VecDeque;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use songcraft_core::{
    validate_bpm, Arrangement, BassPattern, ChordCue, ChordRhythm, DrumPattern, InstrumentKind, PlaybackStyle,
    ScheduleBatch, Scheduler, SongcraftError, TransportState, VoicingStyle, DEFAULT_BPM,
};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::audio_io::AudioOutputError;
use crate::output::AudioOutput;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error(transparent)]
    Invalid(#[from] SongcraftError),
    #[error("Audio output unavailable: {0}")]
    AudioUnavailable(#[from] AudioOutputError),
    #[error("Player has been disposed")]
    Disposed,
}

/// Player tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// How far ahead of the output clock events are committed
    pub lookahead_ms: u32,
    pub master_gain_db: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { lookahead_ms: 100, master_gain_db: 0.0 }
    }
}

impl PlayerConfig {
    fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }
}

/// Everything needed to start playback
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub chords: Vec<String>,
    pub tempo_bpm: u32,
    pub instrument: InstrumentKind,
    pub style: PlaybackStyle,
}

impl PlaybackRequest {
    pub fn new<S: Into<String>>(chords: impl IntoIterator<Item = S>) -> Self {
        Self {
            chords: chords.into_iter().map(Into::into).collect(),
            tempo_bpm: DEFAULT_BPM,
            instrument: InstrumentKind::default(),
            style: PlaybackStyle::default(),
        }
    }

    pub fn with_tempo(mut self, bpm: u32) -> Self {
        self.tempo_bpm = bpm;
        self
    }

    pub fn with_beats_per_chord(mut self, beats: u8) -> Self {
        self.style.beats_per_chord = beats;
        self
    }

    pub fn with_voicing(mut self, voicing: VoicingStyle) -> Self {
        self.style.voicing = voicing;
        self
    }

    pub fn with_instrument(mut self, instrument: InstrumentKind) -> Self {
        self.instrument = instrument;
        self
    }

    pub fn with_drums(mut self, drums: DrumPattern) -> Self {
        self.style.drum_pattern = drums;
        self
    }

    pub fn with_bass(mut self, bass: BassPattern) -> Self {
        self.style.bass_pattern = bass;
        self
    }

    pub fn with_rhythm(mut self, rhythm: ChordRhythm) -> Self {
        self.style.chord_rhythm = rhythm;
        self
    }

    pub fn with_style(mut self, style: PlaybackStyle) -> Self {
        self.style = style;
        self
    }
}

/// Notifications for the UI, in the order they happen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// The chord at `index` started sounding at output time `time`
    ChordChanged { index: usize, time: f64 },
    Paused,
    Resumed,
    Stopped,
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: TransportState,
    pub is_playing: bool,
    pub current_chord_index: Option<usize>,
    pub tempo_bpm: u32,
    pub position_ticks: u64,
    pub instrument: InstrumentKind,
    pub style: PlaybackStyle,
}

/// Chord progression player driving one audio output
pub struct ChordPlayer<O: AudioOutput> {
    output: O,
    config: PlayerConfig,
    scheduler: Scheduler,
    tempo_bpm: u32,
    instrument: InstrumentKind,
    installed: Option<InstrumentKind>,
    style: PlaybackStyle,
    current_chord_index: Option<usize>,
    batch: ScheduleBatch,
    cues: VecDeque<ChordCue>,
    events_tx: Option<Sender<PlayerEvent>>,
    disposed: bool,
}

/// Undelivered notifications kept for a subscriber that falls behind
pub const EVENT_QUEUE_CAPACITY: usize = 256;

impl<O: AudioOutput> ChordPlayer<O> {
    pub fn new(output: O, config: PlayerConfig) -> Self {
        Self {
            output,
            config,
            scheduler: Scheduler::new(DEFAULT_BPM),
            tempo_bpm: DEFAULT_BPM,
            instrument: InstrumentKind::default(),
            installed: None,
            style: PlaybackStyle::default(),
            current_chord_index: None,
            batch: ScheduleBatch::default(),
            cues: VecDeque::new(),
            events_tx: None,
            disposed: false,
        }
    }

    /// Subscribe to chord changes and transport notifications.
    ///
    /// Replaces any earlier subscriber. Without a subscriber nothing is queued;
    /// a subscriber that stops draining keeps at most `EVENT_QUEUE_CAPACITY`
    /// events and misses later ones.
    pub fn events(&mut self) -> Receiver<PlayerEvent> {
        let (tx, rx) = bounded(EVENT_QUEUE_CAPACITY);
        self.events_tx = Some(tx);
        rx
    }

    fn notify(&mut self, event: PlayerEvent) {
        let Some(tx) = &self.events_tx else { return };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!(?event, "Event queue full, dropping"),
            Err(TrySendError::Disconnected(_)) => {
                debug!("Event subscriber gone");
                self.events_tx = None;
            }
        }
    }

    /// Start the progression from the top, replacing anything already playing
    pub fn play(&mut self, request: PlaybackRequest) -> Result<(), PlaybackError> {
        if self.disposed {
            return Err(PlaybackError::Disposed);
        }
        validate_bpm(request.tempo_bpm)?;
        let arrangement = Arrangement::new(request.chords.as_slice(), &request.style)?;

        if self.scheduler.state() != TransportState::Idle {
            self.stop();
        }

        if let Err(e) = self.output.start() {
            warn!(error = %e, "Audio output unavailable");
            return Err(e.into());
        }

        if self.installed != Some(request.instrument) {
            self.output.install_instrument(request.instrument);
            self.installed = Some(request.instrument);
        }

        self.instrument = request.instrument;
        self.style = request.style;
        self.tempo_bpm = request.tempo_bpm;

        self.output.reset_clock();
        self.scheduler.play(arrangement, request.tempo_bpm)?;
        self.output.set_clock_running(true);

        info!(
            chords = request.chords.len(),
            bpm = request.tempo_bpm,
            instrument = %request.instrument,
            drums = %request.style.drum_pattern,
            bass = %request.style.bass_pattern,
            rhythm = %request.style.chord_rhythm,
            "Playback started"
        );

        self.tick();
        Ok(())
    }

    /// Silence everything and return to idle. Always safe.
    pub fn stop(&mut self) {
        let was_active = self.scheduler.state() != TransportState::Idle;

        self.output.cancel_pending();
        self.output.release_all();
        self.output.set_clock_running(false);
        self.output.reset_clock();
        self.scheduler.stop();
        self.cues.clear();
        self.batch.clear();
        self.current_chord_index = None;

        if was_active {
            info!("Playback stopped");
            self.notify(PlayerEvent::Stopped);
        }
    }

    pub fn pause(&mut self) {
        if !self.scheduler.pause() {
            return;
        }
        self.output.set_clock_running(false);
        self.output.release_all();
        debug!(position = self.output.now(), "Playback paused");
        self.notify(PlayerEvent::Paused);
    }

    /// No-op unless paused
    pub fn resume(&mut self) {
        if !self.scheduler.resume() {
            return;
        }
        self.output.set_clock_running(true);
        debug!(position = self.output.now(), "Playback resumed");
        self.notify(PlayerEvent::Resumed);
        self.tick();
    }

    /// Change tempo for every step not yet committed
    pub fn set_tempo(&mut self, bpm: u32) -> Result<(), PlaybackError> {
        self.scheduler.set_tempo(bpm)?;
        self.tempo_bpm = bpm;
        info!(bpm, "Tempo set");
        Ok(())
    }

    /// Commit events up to the look-ahead horizon and deliver due chord cues.
    ///
    /// Hosts call this regularly, e.g. once per UI frame.
    pub fn tick(&mut self) {
        let now = self.output.now();

        if self.scheduler.transport().is_running() {
            self.scheduler.commit_until(now + self.config.lookahead_secs(), &mut self.batch);
            for event in self.batch.events.drain(..) {
                self.output.dispatch(event);
            }
            self.cues.extend(self.batch.cues.drain(..));
        }

        while self.cues.front().is_some_and(|cue| cue.time <= now) {
            let Some(cue) = self.cues.pop_front() else { break };
            self.current_chord_index = Some(cue.index);
            self.notify(PlayerEvent::ChordChanged { index: cue.index, time: cue.time });
        }
    }

    fn stop_if_active(&mut self, what: &str) {
        if self.scheduler.state() != TransportState::Idle {
            debug!(setting = what, "Setting changed during playback; stopping");
            self.stop();
        }
    }

    pub fn set_voicing(&mut self, voicing: VoicingStyle) {
        if self.style.voicing != voicing {
            self.stop_if_active("voicing");
            self.style.voicing = voicing;
        }
    }

    /// Switch instruments; the new generator is built on the next `play`
    pub fn set_instrument(&mut self, instrument: InstrumentKind) {
        if self.instrument == instrument {
            return;
        }
        self.stop_if_active("instrument");
        self.instrument = instrument;
        if self.installed.take().is_some() {
            self.output.remove_instrument();
        }
    }

    pub fn set_drum_pattern(&mut self, drums: DrumPattern) {
        if self.style.drum_pattern != drums {
            self.stop_if_active("drum pattern");
            self.style.drum_pattern = drums;
        }
    }

    pub fn set_bass_pattern(&mut self, bass: BassPattern) {
        if self.style.bass_pattern != bass {
            self.stop_if_active("bass pattern");
            self.style.bass_pattern = bass;
        }
    }

    pub fn set_chord_rhythm(&mut self, rhythm: ChordRhythm) {
        if self.style.chord_rhythm != rhythm {
            self.stop_if_active("chord rhythm");
            self.style.chord_rhythm = rhythm;
        }
    }

    /// Request pre-filled with the session's current settings
    pub fn request<S: Into<String>>(&self, chords: impl IntoIterator<Item = S>) -> PlaybackRequest {
        PlaybackRequest::new(chords)
            .with_tempo(self.tempo_bpm)
            .with_instrument(self.instrument)
            .with_style(self.style)
    }

    pub fn state(&self) -> PlaybackSnapshot {
        let state = self.scheduler.state();
        PlaybackSnapshot {
            state,
            is_playing: state == TransportState::Running,
            current_chord_index: self.current_chord_index,
            tempo_bpm: self.tempo_bpm,
            position_ticks: self.scheduler.transport().position_ticks(self.output.now()),
            instrument: self.instrument,
            style: self.style,
        }
    }

    pub fn current_chord_index(&self) -> Option<usize> {
        self.current_chord_index
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.state() == TransportState::Running
    }

    /// Stop and free every generator. Later `play` calls fail.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.stop();
        self.output.dispose();
        self.installed = None;
        self.disposed = true;
        debug!("Player disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}

impl<O: AudioOutput> Drop for ChordPlayer<O> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use songcraft_core::{VoiceAction, VoiceEvent, VoiceId};

    use super::*;
    use crate::offline::OfflineOutput;

    const FRAME: f64 = 0.02;

    fn player() -> ChordPlayer<OfflineOutput> {
        ChordPlayer::new(OfflineOutput::default(), PlayerConfig::default())
    }

    /// Advance the offline clock in UI-frame steps, ticking after each
    fn run(player: &mut ChordPlayer<OfflineOutput>, secs: f64) {
        let steps = (secs / FRAME).round() as usize;
        for _ in 0..steps {
            player.output_mut().advance(FRAME);
            player.tick();
        }
    }

    fn chord_changes(rx: &Receiver<PlayerEvent>) -> Vec<(usize, f64)> {
        rx.try_iter()
            .filter_map(|e| match e {
                PlayerEvent::ChordChanged { index, time } => Some((index, time)),
                _ => None,
            })
            .collect()
    }

    fn voice_events(events: &[VoiceEvent], voice: VoiceId) -> Vec<&VoiceEvent> {
        events.iter().filter(|e| e.voice == voice).collect()
    }

    #[test]
    fn test_progression_over_ten_seconds() {
        let mut player = player();
        let rx = player.events();
        player
            .play(PlaybackRequest::new(["C", "Am", "F", "G"]).with_tempo(120).with_beats_per_chord(4))
            .unwrap();
        run(&mut player, 10.0);

        let changes: Vec<_> = chord_changes(&rx).into_iter().filter(|(_, t)| *t < 10.0).collect();
        assert_eq!(changes, vec![(0, 0.0), (1, 2.0), (2, 4.0), (3, 6.0), (0, 8.0)]);
    }

    #[test]
    fn test_chord_index_follows_audio_clock() {
        let mut player = player();
        player.play(PlaybackRequest::new(["C", "G"])).unwrap();
        assert_eq!(player.current_chord_index(), Some(0));

        // Committed ahead, but not yet audible
        run(&mut player, 1.94);
        assert_eq!(player.current_chord_index(), Some(0));
        assert!(player.output().pending().iter().any(|e| e.time == 2.0));

        run(&mut player, 0.06);
        assert_eq!(player.current_chord_index(), Some(1));
    }

    #[test]
    fn test_lookahead_bounds_dispatch() {
        let mut player = player();
        player.play(PlaybackRequest::new(["C"]).with_drums(DrumPattern::Pop)).unwrap();
        run(&mut player, 3.0);
        let now = player.output().now();
        assert!(player.output().dispatched().iter().all(|e| e.time < now + 0.1 + 1e-9));
    }

    #[test]
    fn test_invalid_requests_rejected() {
        let mut player = player();
        let empty: [&str; 0] = [];
        assert_eq!(
            player.play(PlaybackRequest::new(empty)),
            Err(PlaybackError::Invalid(SongcraftError::EmptyProgression))
        );
        assert_eq!(
            player.play(PlaybackRequest::new(["C"]).with_tempo(0)),
            Err(PlaybackError::Invalid(SongcraftError::InvalidTempo(0)))
        );
        assert_eq!(
            player.play(PlaybackRequest::new(["C"]).with_beats_per_chord(3)),
            Err(PlaybackError::Invalid(SongcraftError::InvalidBeatsPerChord(3)))
        );
        assert!(!player.output().is_started());
        assert_eq!(player.state().state, TransportState::Idle);
    }

    #[test]
    fn test_stop_is_complete() {
        let mut player = player();
        let rx = player.events();
        player
            .play(PlaybackRequest::new(["C", "F"]).with_drums(DrumPattern::Rock).with_bass(BassPattern::Root))
            .unwrap();
        run(&mut player, 1.0);
        let releases = player.output().releases();

        player.stop();
        assert_eq!(player.current_chord_index(), None);
        assert!(player.output().pending().is_empty());
        assert_eq!(player.output().releases(), releases + 1);
        assert_eq!(player.state().position_ticks, 0);
        assert!(!player.is_playing());

        let fired = player.output().fired().len();
        run(&mut player, 2.0);
        assert_eq!(player.output().fired().len(), fired);
        assert!(rx.try_iter().any(|e| e == PlayerEvent::Stopped));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut player = player();
        let rx = player.events();
        player.stop();
        player.play(PlaybackRequest::new(["C"])).unwrap();
        player.stop();
        player.stop();
        let stops = rx.try_iter().filter(|e| *e == PlayerEvent::Stopped).count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_restart_uses_new_parameters_only() {
        let mut player = player();
        player.play(PlaybackRequest::new(["C", "G"]).with_tempo(120)).unwrap();
        run(&mut player, 1.5);

        player.output_mut().clear_log();
        player.play(PlaybackRequest::new(["D"]).with_tempo(60)).unwrap();
        assert_eq!(player.output().now(), 0.0);
        run(&mut player, 5.0);

        let strikes: Vec<_> = player
            .output()
            .fired()
            .iter()
            .filter(|e| e.voice == VoiceId::Harmony)
            .filter_map(|e| match &e.action {
                VoiceAction::NoteOn(p) => Some(p.clone()),
                _ => None,
            })
            .collect();
        assert!(!strikes.is_empty());
        assert!(strikes.iter().all(|p| p == &vec![50, 54, 57]));
        assert_eq!(player.state().tempo_bpm, 60);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut player = player();
        let rx = player.events();
        player.play(PlaybackRequest::new(["C", "Am"])).unwrap();
        run(&mut player, 1.0);

        player.pause();
        let frozen = player.output().now();
        let position = player.state().position_ticks;
        assert!(!player.is_playing());
        assert_eq!(player.state().state, TransportState::Paused);
        run(&mut player, 3.0);
        assert_eq!(player.output().now(), frozen);
        assert_eq!(player.state().position_ticks, position);
        assert_eq!(player.current_chord_index(), Some(0));

        player.resume();
        run(&mut player, 1.0);
        assert_eq!(player.current_chord_index(), Some(1));

        let transport: Vec<_> = rx
            .try_iter()
            .filter(|e| !matches!(e, PlayerEvent::ChordChanged { .. }))
            .collect();
        assert_eq!(transport, vec![PlayerEvent::Paused, PlayerEvent::Resumed]);
    }

    #[test]
    fn test_resume_without_play_is_noop() {
        let mut player = player();
        let rx = player.events();
        player.resume();
        player.pause();
        assert_eq!(player.state().state, TransportState::Idle);
        assert!(rx.try_iter().next().is_none());
    }

    #[test]
    fn test_audio_unavailable_then_retry() {
        let mut player = ChordPlayer::new(OfflineOutput::unavailable(), PlayerConfig::default());
        let request = PlaybackRequest::new(["C"]);
        assert_eq!(
            player.play(request.clone()),
            Err(PlaybackError::AudioUnavailable(AudioOutputError::NoDevices))
        );
        assert_eq!(player.state().state, TransportState::Idle);
        assert!(player.output().installs().is_empty());

        player.output_mut().grant();
        player.play(request).unwrap();
        assert!(player.is_playing());
    }

    #[test]
    fn test_instrument_installed_lazily() {
        let mut player = player();
        assert!(player.output().installs().is_empty());

        player
            .play(PlaybackRequest::new(["C"]).with_instrument(InstrumentKind::Strings))
            .unwrap();
        player
            .play(PlaybackRequest::new(["G"]).with_instrument(InstrumentKind::Strings))
            .unwrap();
        assert_eq!(player.output().installs(), &[InstrumentKind::Strings]);

        player.set_instrument(InstrumentKind::Bell);
        assert!(!player.is_playing());
        assert_eq!(player.output().instrument(), None);
        assert_eq!(player.output().installs().len(), 1);

        let request = player.request(["C"]);
        player.play(request).unwrap();
        assert_eq!(player.output().installs(), &[InstrumentKind::Strings, InstrumentKind::Bell]);
    }

    #[test]
    fn test_setters_force_stop_while_playing() {
        let mut player = player();
        player.play(PlaybackRequest::new(["C"])).unwrap();
        player.set_voicing(VoicingStyle::Standard);
        assert!(player.is_playing(), "unchanged value keeps playing");

        player.set_voicing(VoicingStyle::Power);
        assert!(!player.is_playing());

        let changes: [fn(&mut ChordPlayer<OfflineOutput>); 3] = [
            |p| p.set_drum_pattern(DrumPattern::Ballad),
            |p| p.set_bass_pattern(BassPattern::WalkingBlues),
            |p| p.set_chord_rhythm(ChordRhythm::Arpeggio),
        ];
        for change in changes {
            let request = player.request(["C"]);
            player.play(request).unwrap();
            change(&mut player);
            assert!(!player.is_playing());
        }

        let style = player.state().style;
        assert_eq!(style.voicing, VoicingStyle::Power);
        assert_eq!(style.drum_pattern, DrumPattern::Ballad);
        assert_eq!(style.bass_pattern, BassPattern::WalkingBlues);
        assert_eq!(style.chord_rhythm, ChordRhythm::Arpeggio);
    }

    #[test]
    fn test_set_tempo_mid_playback() {
        let mut player = player();
        let rx = player.events();
        player
            .play(PlaybackRequest::new(["C", "Am", "F", "G"]).with_tempo(120))
            .unwrap();
        run(&mut player, 1.0);
        let committed: Vec<VoiceEvent> = player.output().dispatched().to_vec();

        player.set_tempo(90).unwrap();
        assert_eq!(player.state().tempo_bpm, 90);
        run(&mut player, 5.0);

        // Everything dispatched before the change is untouched
        assert_eq!(&player.output().dispatched()[..committed.len()], committed.as_slice());

        let changes = chord_changes(&rx);
        let beat_90 = 60.0 / 90.0;
        let (_, second) = changes[1];
        let (_, third) = changes[2];
        assert!(second > 2.0);
        assert!((third - second - 4.0 * beat_90).abs() < 1e-9);
        assert!(player.set_tempo(0).is_err());
        assert_eq!(player.state().tempo_bpm, 90);
    }

    #[test]
    fn test_no_overlapping_harmony() {
        let mut player = player();
        player
            .play(
                PlaybackRequest::new(["C", "G7", "Am", "F"])
                    .with_rhythm(ChordRhythm::Syncopated)
                    .with_bass(BassPattern::TexasBass)
                    .with_tempo(160),
            )
            .unwrap();
        run(&mut player, 12.0);
        for voice in [VoiceId::Harmony, VoiceId::Bass] {
            let mut sounding = false;
            for event in voice_events(player.output().fired(), voice) {
                match event.action {
                    VoiceAction::NoteOn(_) => {
                        assert!(!sounding);
                        sounding = true;
                    }
                    VoiceAction::NoteOff => sounding = false,
                    VoiceAction::Hit => unreachable!(),
                }
            }
        }
    }

    #[test]
    fn test_undrained_events_stay_bounded() {
        let mut player = player();
        let rx = player.events();
        player
            .play(PlaybackRequest::new(["C", "G"]).with_tempo(240).with_beats_per_chord(2))
            .unwrap();
        // Two chord changes per second for ten minutes
        run(&mut player, 600.0);
        assert_eq!(rx.len(), EVENT_QUEUE_CAPACITY);
        assert_eq!(player.current_chord_index(), Some(0));

        // The queue holds the oldest events
        assert_eq!(rx.try_recv(), Ok(PlayerEvent::ChordChanged { index: 0, time: 0.0 }));
    }

    #[test]
    fn test_dropped_subscriber_stops_queueing() {
        let mut player = player();
        drop(player.events());
        player.play(PlaybackRequest::new(["C", "G"])).unwrap();
        run(&mut player, 5.0);
        assert!(player.events_tx.is_none());

        // A later subscriber only sees what happens after it subscribed
        let rx = player.events();
        player.stop();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![PlayerEvent::Stopped]);
    }

    #[test]
    fn test_new_subscriber_replaces_old() {
        let mut player = player();
        let old = player.events();
        let new = player.events();
        player.play(PlaybackRequest::new(["C"])).unwrap();
        assert!(old.try_recv().is_err());
        assert_eq!(new.try_recv(), Ok(PlayerEvent::ChordChanged { index: 0, time: 0.0 }));
    }

    #[test]
    fn test_dispose() {
        let mut player = player();
        player.play(PlaybackRequest::new(["C"])).unwrap();
        player.dispose();
        player.dispose();
        assert!(player.is_disposed());
        assert!(player.output().is_disposed());
        assert_eq!(player.play(PlaybackRequest::new(["C"])), Err(PlaybackError::Disposed));
        player.stop();
    }
}
