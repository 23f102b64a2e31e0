//! Pattern tables for the drum, bass and chord-rhythm layers
//!
//! Every layer works on the shared 16th-note grid. The functions here are
//! pure: the scheduler supplies the grid position and the resolved pitches.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SongcraftError;

/// Steps in one drum bar (16th notes)
pub const STEPS_PER_BAR: usize = 16;

/// Implements `as_str`-backed `Display` and `FromStr` for a style enum with an `ALL` table.
macro_rules! impl_style_names {
    ($ty:ty, $kind:expr) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = SongcraftError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|p| p.as_str() == s)
                    .ok_or_else(|| SongcraftError::UnknownStyle { kind: $kind, name: s.to_string() })
            }
        }
    };
}

// ============================================================================
// Drums
// ============================================================================

/// Percussion voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrumPart {
    Kick,
    Snare,
    HiHat,
}

/// One bar of hits per percussion voice, `x` = hit, `.` = rest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrumGrid {
    pub kick: &'static str,
    pub snare: &'static str,
    pub hihat: &'static str,
}

impl DrumGrid {
    /// Parts that hit on the given step (wraps every bar)
    pub fn hits(&self, step: usize) -> impl Iterator<Item = DrumPart> + '_ {
        let idx = step % STEPS_PER_BAR;
        [
            (DrumPart::Kick, self.kick),
            (DrumPart::Snare, self.snare),
            (DrumPart::HiHat, self.hihat),
        ]
        .into_iter()
        .filter(move |(_, lane)| lane.as_bytes().get(idx) == Some(&b'x'))
        .map(|(part, _)| part)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrumPattern {
    #[default]
    None,
    Rock,
    Pop,
    Ballad,
    Shuffle,
    Metronome,
    TexasBlues,
    SlowBlues,
}

impl DrumPattern {
    pub const ALL: [Self; 8] = [
        Self::None,
        Self::Rock,
        Self::Pop,
        Self::Ballad,
        Self::Shuffle,
        Self::Metronome,
        Self::TexasBlues,
        Self::SlowBlues,
    ];

    /// Hit grid, `None` for no drums at all
    pub fn grid(&self) -> Option<DrumGrid> {
        let grid = match self {
            Self::None => return None,
            Self::Rock => DrumGrid {
                kick: "x...x...x...x...",
                snare: "....x.......x...",
                hihat: "x.x.x.x.x.x.x.x.",
            },
            Self::Pop => DrumGrid {
                kick: "x...x...x...x...",
                snare: "....x.......x...",
                hihat: "xxxxxxxxxxxxxxxx",
            },
            Self::Ballad => DrumGrid {
                kick: "x.......x.......",
                snare: "........x.......",
                hihat: "x...x...x...x...",
            },
            Self::Shuffle => DrumGrid {
                kick: "x..x..x..x..x..x",
                snare: "...x.....x.....x",
                hihat: "x.xx.xx.xx.xx.x.",
            },
            Self::Metronome => DrumGrid {
                kick: "x...x...x...x...",
                snare: "................",
                hihat: "................",
            },
            Self::TexasBlues => DrumGrid {
                kick: "x.....x.x.....x.",
                snare: "....x.......x...",
                hihat: "x..xx..xx..xx..x",
            },
            Self::SlowBlues => DrumGrid {
                kick: "x.......x..x....",
                snare: "....x.......x...",
                hihat: "x.xx.xx.xx.xx.xx",
            },
        };
        Some(grid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rock => "rock",
            Self::Pop => "pop",
            Self::Ballad => "ballad",
            Self::Shuffle => "shuffle",
            Self::Metronome => "metronome",
            Self::TexasBlues => "texas_blues",
            Self::SlowBlues => "slow_blues",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::None => "No Drums",
            Self::Rock => "Rock",
            Self::Pop => "Pop",
            Self::Ballad => "Ballad",
            Self::Shuffle => "Shuffle",
            Self::Metronome => "Click",
            Self::TexasBlues => "Texas Blues",
            Self::SlowBlues => "Slow Blues",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::None => "Chords only",
            Self::Rock => "Classic kick-snare pattern",
            Self::Pop => "Four on the floor with hi-hats",
            Self::Ballad => "Soft, half-time feel",
            Self::Shuffle => "Swing triplet feel",
            Self::Metronome => "Simple metronome click",
            Self::TexasBlues => "Driving shuffle with a pushed kick",
            Self::SlowBlues => "Lazy backbeat with a triplet ride",
        }
    }
}

impl_style_names!(DrumPattern, "drum pattern");

// ============================================================================
// Bass
// ============================================================================

/// What the bass voice does on a sub-beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BassAction {
    /// Release the previous note and sound this pitch
    Play(u8),
    /// Keep whatever is sounding
    Hold,
    /// Release and stay silent
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BassStep {
    Note(u8),
    Rest,
}

use BassStep::{Note, Rest};

/// Template: (sub-beat, step) pairs and the loop length in sub-beats
type BassTemplate = (&'static [(usize, BassStep)], usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BassPattern {
    #[default]
    None,
    Root,
    BluesShuffle,
    WalkingBlues,
    TexasBass,
}

impl BassPattern {
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Root,
        Self::BluesShuffle,
        Self::WalkingBlues,
        Self::TexasBass,
    ];

    fn template(&self) -> Option<BassTemplate> {
        let template: BassTemplate = match self {
            Self::None => return None,
            // Detached quarter notes
            Self::Root => (
                &[
                    (0, Note(0)), (3, Rest),
                    (4, Note(0)), (7, Rest),
                    (8, Note(0)), (11, Rest),
                    (12, Note(0)), (15, Rest),
                ],
                16,
            ),
            // 1-5-6-5, long-short
            Self::BluesShuffle => (
                &[
                    (0, Note(0)), (2, Rest), (3, Note(0)),
                    (4, Note(7)), (6, Rest), (7, Note(7)),
                    (8, Note(9)), (10, Rest), (11, Note(9)),
                    (12, Note(7)), (14, Rest), (15, Note(7)),
                ],
                16,
            ),
            // Two bars: 1-3-5-6 up, b7-6-5-3 down
            Self::WalkingBlues => (
                &[
                    (0, Note(0)), (4, Note(4)), (8, Note(7)), (12, Note(9)),
                    (16, Note(10)), (20, Note(9)), (24, Note(7)), (28, Note(4)),
                ],
                32,
            ),
            // Root-octave-b7-5 shuffle
            Self::TexasBass => (
                &[
                    (0, Note(0)), (2, Rest), (3, Note(0)),
                    (4, Note(12)), (6, Rest), (7, Note(12)),
                    (8, Note(10)), (10, Rest), (11, Note(10)),
                    (12, Note(7)), (14, Rest), (15, Note(7)),
                ],
                16,
            ),
        };
        Some(template)
    }

    /// Bass decision at a position on the 16th grid.
    ///
    /// `step` counts from the start of playback, so templates longer than
    /// a chord step keep going across chord changes.
    ///
    /// `root` is the chord's bass-register root; `None` (unparseable chord)
    /// turns every note of the template into a rest.
    pub fn action(&self, step: usize, root: Option<u8>) -> BassAction {
        let Some((steps, period)) = self.template() else {
            return BassAction::Hold;
        };
        let pos = step % period;
        let Some(&(_, step)) = steps.iter().find(|(at, _)| *at == pos) else {
            return BassAction::Hold;
        };
        match (step, root) {
            (Note(interval), Some(root)) => root
                .checked_add(interval)
                .filter(|&p| p <= 127)
                .map_or(BassAction::Rest, BassAction::Play),
            _ => BassAction::Rest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Root => "root",
            Self::BluesShuffle => "blues_shuffle",
            Self::WalkingBlues => "walking_blues",
            Self::TexasBass => "texas_bass",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::None => "No Bass",
            Self::Root => "Root Notes",
            Self::BluesShuffle => "Blues Shuffle",
            Self::WalkingBlues => "Walking Blues",
            Self::TexasBass => "Texas Bass",
        }
    }
}

impl_style_names!(BassPattern, "bass pattern");

// ============================================================================
// Chord rhythm
// ============================================================================

/// What the harmony voice does on a sub-beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RhythmAction {
    /// Release and strike the whole chord
    Strike,
    Hold,
    Rest,
    /// Release and sound only the chord tone at this index
    Arpeggiate(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordRhythm {
    #[default]
    Sustain,
    Quarter,
    Eighth,
    Offbeat,
    Syncopated,
    Arpeggio,
}

/// Strike positions of the syncopated rhythm within a bar (3-3-2 plus a push)
const SYNCOPATED_STRIKES: [usize; 5] = [0, 3, 6, 10, 12];

impl ChordRhythm {
    pub const ALL: [Self; 6] = [
        Self::Sustain,
        Self::Quarter,
        Self::Eighth,
        Self::Offbeat,
        Self::Syncopated,
        Self::Arpeggio,
    ];

    /// Harmony decision for a sub-beat of the current chord step
    pub fn action(&self, sub_beat: usize, tone_count: usize) -> RhythmAction {
        match self {
            Self::Sustain if sub_beat == 0 => RhythmAction::Strike,
            Self::Quarter if sub_beat % 4 == 0 => RhythmAction::Strike,
            Self::Eighth if sub_beat % 2 == 0 => RhythmAction::Strike,
            Self::Offbeat if sub_beat % 4 == 2 => RhythmAction::Strike,
            Self::Offbeat if sub_beat % 4 == 0 => RhythmAction::Rest,
            Self::Syncopated if SYNCOPATED_STRIKES.contains(&(sub_beat % STEPS_PER_BAR)) => {
                RhythmAction::Strike
            }
            Self::Arpeggio if sub_beat % 2 == 0 => {
                if tone_count == 0 {
                    RhythmAction::Rest
                } else {
                    RhythmAction::Arpeggiate((sub_beat / 2) % tone_count)
                }
            }
            _ => RhythmAction::Hold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sustain => "sustain",
            Self::Quarter => "quarter",
            Self::Eighth => "eighth",
            Self::Offbeat => "offbeat",
            Self::Syncopated => "syncopated",
            Self::Arpeggio => "arpeggio",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sustain => "Sustain",
            Self::Quarter => "Quarter Notes",
            Self::Eighth => "Eighth Notes",
            Self::Offbeat => "Offbeat",
            Self::Syncopated => "Syncopated",
            Self::Arpeggio => "Arpeggio",
        }
    }
}

impl_style_names!(ChordRhythm, "chord rhythm");
