//! Transport state and controls

use serde::{Deserialize, Serialize};

use crate::error::{Result, SongcraftError};
use crate::tempo::{TICKS_PER_BEAT, TempoMap};

pub const DEFAULT_BPM: u32 = 120;

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    Idle,
    Running,
    Paused,
}

/// Reject tempos the tempo map cannot represent
pub fn validate_bpm(bpm: u32) -> Result<()> {
    if bpm == 0 {
        return Err(SongcraftError::InvalidTempo(bpm));
    }
    Ok(())
}

/// Transport controls and musical position
#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    bpm: u32,
    tempo: TempoMap,
    /// First tick not yet handed to the output
    cursor: u64,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl Transport {
    pub fn new(bpm: u32) -> Self {
        let bpm = bpm.max(1);
        Self {
            state: TransportState::Idle,
            bpm,
            tempo: TempoMap::new(bpm as f64),
            cursor: 0,
        }
    }

    /// Start from tick 0 at `bpm`, whatever the current state
    pub fn play(&mut self, bpm: u32) -> Result<()> {
        validate_bpm(bpm)?;
        self.bpm = bpm;
        self.tempo = TempoMap::new(bpm as f64);
        self.cursor = 0;
        self.state = TransportState::Running;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Idle;
        self.tempo = TempoMap::new(self.bpm as f64);
        self.cursor = 0;
    }

    /// Returns `true` if the transport was running
    pub fn pause(&mut self) -> bool {
        if self.state != TransportState::Running {
            return false;
        }
        self.state = TransportState::Paused;
        true
    }

    /// Returns `true` if the transport was paused
    pub fn resume(&mut self) -> bool {
        if self.state != TransportState::Paused {
            return false;
        }
        self.state = TransportState::Running;
        true
    }

    /// Change tempo from the first uncommitted tick onward
    pub fn set_tempo(&mut self, bpm: u32) -> Result<()> {
        validate_bpm(bpm)?;
        self.bpm = bpm;
        self.tempo.change_tempo(self.cursor, bpm as f64);
        Ok(())
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TransportState::Running
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub(crate) fn advance_cursor(&mut self) {
        self.cursor += 1;
    }

    /// Time of the next tick to commit
    pub fn next_tick_time(&self) -> f64 {
        self.tempo.time_at(self.cursor)
    }

    /// Whole ticks elapsed at output time `now`; 0 when idle
    pub fn position_ticks(&self, now: f64) -> u64 {
        match self.state {
            TransportState::Idle => 0,
            _ => self.tempo.tick_at(now).floor() as u64,
        }
    }

    /// Format a tick position as `bar.beat.sixteenth`, 1-indexed
    pub fn format_position(ticks: u64, beats_per_bar: u64) -> String {
        let ticks_per_bar = TICKS_PER_BEAT * beats_per_bar.max(1);
        let bar = ticks / ticks_per_bar + 1;
        let beat = (ticks % ticks_per_bar) / TICKS_PER_BEAT + 1;
        let sixteenth = ticks % TICKS_PER_BEAT + 1;
        format!("{bar}.{beat}.{sixteenth}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut transport = Transport::default();
        assert_eq!(transport.state(), TransportState::Idle);
        assert!(!transport.pause());
        assert!(!transport.resume());

        transport.play(100).unwrap();
        assert!(transport.is_running());
        assert!(transport.pause());
        assert_eq!(transport.state(), TransportState::Paused);
        assert!(!transport.pause());
        assert!(transport.resume());
        assert!(transport.is_running());

        transport.stop();
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(transport.cursor(), 0);
    }

    #[test]
    fn test_invalid_tempo() {
        let mut transport = Transport::default();
        assert_eq!(transport.play(0), Err(SongcraftError::InvalidTempo(0)));
        assert_eq!(transport.state(), TransportState::Idle);
        assert!(transport.set_tempo(0).is_err());
        assert_eq!(transport.bpm(), DEFAULT_BPM);
    }

    #[test]
    fn test_tempo_change_anchors_at_cursor() {
        let mut transport = Transport::default();
        transport.play(120).unwrap();
        for _ in 0..8 {
            transport.advance_cursor();
        }
        transport.set_tempo(60).unwrap();
        assert_eq!(transport.tempo_map().time_at(4), 0.5);
        assert_eq!(transport.next_tick_time(), 1.0);
        assert_eq!(transport.tempo_map().time_at(9), 1.25);
    }

    #[test]
    fn test_position() {
        let mut transport = Transport::default();
        assert_eq!(transport.position_ticks(3.0), 0);
        transport.play(120).unwrap();
        assert_eq!(transport.position_ticks(0.3), 2);
        assert_eq!(Transport::format_position(0, 4), "1.1.1");
        assert_eq!(Transport::format_position(21, 4), "2.2.2");
    }
}
