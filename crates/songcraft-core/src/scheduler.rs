//! Look-ahead scheduler: turns an arrangement into timestamped voice events
//!
//! All layers (harmony, bass, drums) share the transport's tick origin and
//! tempo map. The host asks for everything up to a time horizon; ticks are
//! committed in order and never revisited, so a tempo change only affects
//! ticks that have not been handed out yet.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::chord::{BASS_OCTAVE, ChordSymbol, HARMONY_OCTAVE, VoicingStyle};
use crate::error::{Result, SongcraftError};
use crate::pattern::{BassAction, BassPattern, ChordRhythm, DrumGrid, DrumPart, DrumPattern, RhythmAction};
use crate::tempo::TICKS_PER_BEAT;
use crate::transport::{Transport, TransportState};

/// Allowed chord lengths in beats
pub const BEATS_PER_CHORD_OPTIONS: [u8; 3] = [2, 4, 8];

pub fn validate_beats_per_chord(beats: u8) -> Result<()> {
    if !BEATS_PER_CHORD_OPTIONS.contains(&beats) {
        return Err(SongcraftError::InvalidBeatsPerChord(beats));
    }
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

/// Sound-producing voice of the arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoiceId {
    Harmony,
    Bass,
    Kick,
    Snare,
    HiHat,
}

impl From<DrumPart> for VoiceId {
    fn from(part: DrumPart) -> Self {
        match part {
            DrumPart::Kick => Self::Kick,
            DrumPart::Snare => Self::Snare,
            DrumPart::HiHat => Self::HiHat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceAction {
    /// Start a note group
    NoteOn(Vec<u8>),
    /// Release whatever the voice is sounding
    NoteOff,
    /// One-shot percussion trigger
    Hit,
}

/// Voice action at an absolute time on the output clock
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceEvent {
    pub time: f64,
    pub tick: u64,
    pub voice: VoiceId,
    pub action: VoiceAction,
}

/// Chord-change marker, stamped with the same time as the chord's first event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChordCue {
    pub time: f64,
    pub tick: u64,
    pub index: usize,
}

/// Output of one commit pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleBatch {
    pub events: Vec<VoiceEvent>,
    pub cues: Vec<ChordCue>,
}

impl ScheduleBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.cues.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.cues.clear();
    }
}

// ============================================================================
// Arrangement
// ============================================================================

/// Musical choices that stay fixed for one play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackStyle {
    pub voicing: VoicingStyle,
    pub chord_rhythm: ChordRhythm,
    pub bass_pattern: BassPattern,
    pub drum_pattern: DrumPattern,
    pub beats_per_chord: u8,
    pub harmony_octave: u8,
    pub bass_octave: u8,
}

impl Default for PlaybackStyle {
    fn default() -> Self {
        Self {
            voicing: VoicingStyle::default(),
            chord_rhythm: ChordRhythm::default(),
            bass_pattern: BassPattern::default(),
            drum_pattern: DrumPattern::default(),
            beats_per_chord: 4,
            harmony_octave: HARMONY_OCTAVE,
            bass_octave: BASS_OCTAVE,
        }
    }
}

/// A chord with its pitches worked out ahead of playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChord {
    pub symbol: String,
    /// Empty for unparseable symbols
    pub pitches: Vec<u8>,
    pub bass_root: Option<u8>,
}

/// Validated progression plus the pattern layers that loop over it
#[derive(Debug, Clone)]
pub struct Arrangement {
    chords: Vec<ResolvedChord>,
    beats_per_chord: u8,
    chord_rhythm: ChordRhythm,
    bass_pattern: BassPattern,
    drum_grid: Option<DrumGrid>,
}

impl Arrangement {
    pub fn new<S: AsRef<str>>(chords: &[S], style: &PlaybackStyle) -> Result<Self> {
        if chords.is_empty() {
            return Err(SongcraftError::EmptyProgression);
        }
        validate_beats_per_chord(style.beats_per_chord)?;

        let chords = chords
            .iter()
            .map(|symbol| {
                let symbol = symbol.as_ref();
                let parsed = ChordSymbol::parse(symbol);
                ResolvedChord {
                    symbol: symbol.to_string(),
                    pitches: parsed
                        .map(|c| c.pitches(style.harmony_octave, style.voicing))
                        .unwrap_or_default(),
                    bass_root: parsed.and_then(|c| c.root_pitch(style.bass_octave)),
                }
            })
            .collect();

        Ok(Self {
            chords,
            beats_per_chord: style.beats_per_chord,
            chord_rhythm: style.chord_rhythm,
            bass_pattern: style.bass_pattern,
            drum_grid: style.drum_pattern.grid(),
        })
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    pub fn chords(&self) -> &[ResolvedChord] {
        &self.chords
    }

    pub fn beats_per_chord(&self) -> u8 {
        self.beats_per_chord
    }

    /// Ticks in one chord step
    pub fn step_ticks(&self) -> u64 {
        self.beats_per_chord as u64 * TICKS_PER_BEAT
    }

    /// Chord index sounding at `tick`
    pub fn chord_index_at(&self, tick: u64) -> usize {
        ((tick / self.step_ticks()) % self.chords.len() as u64) as usize
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Which voices currently hold a note group
#[derive(Debug, Clone, Copy, Default)]
struct Sounding {
    harmony: bool,
    bass: bool,
}

/// Drives the transport and generates events for every layer
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    transport: Transport,
    arrangement: Option<Arrangement>,
    sounding: Sounding,
}

impl Scheduler {
    pub fn new(bpm: u32) -> Self {
        Self {
            transport: Transport::new(bpm),
            arrangement: None,
            sounding: Sounding::default(),
        }
    }

    /// Start `arrangement` from tick 0, replacing anything already playing
    pub fn play(&mut self, arrangement: Arrangement, bpm: u32) -> Result<()> {
        self.transport.play(bpm)?;
        debug!(chords = arrangement.len(), bpm, beats_per_chord = arrangement.beats_per_chord, "Scheduler started");
        self.arrangement = Some(arrangement);
        self.sounding = Sounding::default();
        Ok(())
    }

    /// Return to idle. The arrangement is kept so its settings can be inspected.
    pub fn stop(&mut self) {
        self.transport.stop();
        self.sounding = Sounding::default();
    }

    pub fn pause(&mut self) -> bool {
        self.transport.pause()
    }

    /// No-op without an arrangement
    pub fn resume(&mut self) -> bool {
        if self.arrangement.is_none() {
            return false;
        }
        self.transport.resume()
    }

    pub fn set_tempo(&mut self, bpm: u32) -> Result<()> {
        self.transport.set_tempo(bpm)?;
        debug!(bpm, from_tick = self.transport.cursor(), "Tempo changed");
        Ok(())
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn arrangement(&self) -> Option<&Arrangement> {
        self.arrangement.as_ref()
    }

    /// Commit every tick that starts before `horizon` (seconds on the output clock)
    pub fn commit_until(&mut self, horizon: f64, batch: &mut ScheduleBatch) {
        if !self.transport.is_running() {
            return;
        }
        let Some(arrangement) = self.arrangement.as_ref() else {
            return;
        };

        let first = self.transport.cursor();
        loop {
            let tick = self.transport.cursor();
            let time = self.transport.next_tick_time();
            if time >= horizon {
                break;
            }
            emit_tick(arrangement, &mut self.sounding, tick, time, batch);
            self.transport.advance_cursor();
        }
        trace!(from = first, to = self.transport.cursor(), horizon, "Committed ticks");
    }
}

/// Appends events that all share one tick
struct TickWriter<'a> {
    tick: u64,
    time: f64,
    events: &'a mut Vec<VoiceEvent>,
}

impl TickWriter<'_> {
    fn push(&mut self, voice: VoiceId, action: VoiceAction) {
        self.events.push(VoiceEvent { time: self.time, tick: self.tick, voice, action });
    }

    fn release(&mut self, voice: VoiceId, sounding: &mut bool) {
        if std::mem::take(sounding) {
            self.push(voice, VoiceAction::NoteOff);
        }
    }

    fn strike(&mut self, voice: VoiceId, pitches: Vec<u8>, sounding: &mut bool) {
        self.release(voice, sounding);
        if !pitches.is_empty() {
            self.push(voice, VoiceAction::NoteOn(pitches));
            *sounding = true;
        }
    }
}

fn emit_tick(
    arrangement: &Arrangement,
    sounding: &mut Sounding,
    tick: u64,
    time: f64,
    batch: &mut ScheduleBatch,
) {
    let sub_beat = (tick % arrangement.step_ticks()) as usize;
    let index = arrangement.chord_index_at(tick);
    let chord = &arrangement.chords[index];
    let mut out = TickWriter { tick, time, events: &mut batch.events };

    // Every chord step starts from silence
    if sub_beat == 0 {
        out.release(VoiceId::Harmony, &mut sounding.harmony);
    }
    match arrangement.chord_rhythm.action(sub_beat, chord.pitches.len()) {
        RhythmAction::Strike => out.strike(VoiceId::Harmony, chord.pitches.clone(), &mut sounding.harmony),
        RhythmAction::Arpeggiate(tone) => {
            let pitches = chord.pitches.get(tone).map(|&p| vec![p]).unwrap_or_default();
            out.strike(VoiceId::Harmony, pitches, &mut sounding.harmony);
        }
        RhythmAction::Rest => out.release(VoiceId::Harmony, &mut sounding.harmony),
        RhythmAction::Hold => {}
    }

    // Bass lines run on the global tick so multi-bar walks span chord steps
    match arrangement.bass_pattern.action(tick as usize, chord.bass_root) {
        BassAction::Play(pitch) => out.strike(VoiceId::Bass, vec![pitch], &mut sounding.bass),
        BassAction::Rest => out.release(VoiceId::Bass, &mut sounding.bass),
        BassAction::Hold => {}
    }

    // Drums loop per bar, independent of the chord step
    if let Some(grid) = arrangement.drum_grid {
        for part in grid.hits(tick as usize) {
            out.push(part.into(), VoiceAction::Hit);
        }
    }

    if sub_beat == 0 {
        batch.cues.push(ChordCue { time, tick, index });
    }
}
