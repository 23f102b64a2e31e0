//! Chord symbol parsing and voicing (chord name -> MIDI pitches)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SongcraftError;

/// Octave used for the harmony voice
pub const HARMONY_OCTAVE: u8 = 3;
/// Octave used for the bass voice
pub const BASS_OCTAVE: u8 = 2;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Pitch class index for a root spelling, `None` for spellings outside the table
fn pitch_class(root: &str) -> Option<u8> {
    let pc = match root {
        "C" => 0,
        "C#" | "Db" => 1,
        "D" => 2,
        "D#" | "Eb" => 3,
        "E" => 4,
        "F" => 5,
        "F#" | "Gb" => 6,
        "G" => 7,
        "G#" | "Ab" => 8,
        "A" => 9,
        "A#" | "Bb" => 10,
        "B" => 11,
        _ => return None,
    };
    Some(pc)
}

// ============================================================================
// Chord Quality
// ============================================================================

/// Chord quality, parsed from the suffix after the root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Dominant7,
    Major7,
    Minor7,
    Diminished7,
    Sus2,
    Sus4,
    Add9,
    Major6,
    Minor6,
}

impl ChordQuality {
    /// Parse a quality suffix; `M`/`maj` and `min`/`minor` are aliases
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let quality = match suffix {
            "" | "M" | "maj" => Self::Major,
            "m" | "min" | "minor" => Self::Minor,
            "dim" => Self::Diminished,
            "aug" => Self::Augmented,
            "7" => Self::Dominant7,
            "maj7" => Self::Major7,
            "m7" => Self::Minor7,
            "dim7" => Self::Diminished7,
            "sus2" => Self::Sus2,
            "sus4" => Self::Sus4,
            "add9" => Self::Add9,
            "6" => Self::Major6,
            "m6" => Self::Minor6,
            _ => return None,
        };
        Some(quality)
    }

    /// Get chord intervals from root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Minor => &[0, 3, 7],
            Self::Diminished => &[0, 3, 6],
            Self::Augmented => &[0, 4, 8],
            Self::Dominant7 => &[0, 4, 7, 10],
            Self::Major7 => &[0, 4, 7, 11],
            Self::Minor7 => &[0, 3, 7, 10],
            Self::Diminished7 => &[0, 3, 6, 9],
            Self::Sus2 => &[0, 2, 7],
            Self::Sus4 => &[0, 5, 7],
            Self::Add9 => &[0, 4, 7, 14],
            Self::Major6 => &[0, 4, 7, 9],
            Self::Minor6 => &[0, 3, 7, 9],
        }
    }

    /// Root, third and fifth of the quality
    pub fn triad(&self) -> &'static [u8] {
        &self.intervals()[..3]
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Major => "",
            Self::Minor => "m",
            Self::Diminished => "dim",
            Self::Augmented => "aug",
            Self::Dominant7 => "7",
            Self::Major7 => "maj7",
            Self::Minor7 => "m7",
            Self::Diminished7 => "dim7",
            Self::Sus2 => "sus2",
            Self::Sus4 => "sus4",
            Self::Add9 => "add9",
            Self::Major6 => "6",
            Self::Minor6 => "m6",
        }
    }
}

// ============================================================================
// Voicing Styles
// ============================================================================

/// Guitar-inspired voicing applied to a chord before note generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoicingStyle {
    #[default]
    Standard,
    Power,
    Octave,
    Sus2,
    Sus4,
    FifthOctave,
    Open,
}

impl VoicingStyle {
    pub const ALL: [Self; 7] = [
        Self::Standard,
        Self::Power,
        Self::Octave,
        Self::Sus2,
        Self::Sus4,
        Self::FifthOctave,
        Self::Open,
    ];

    /// Intervals to sound for a chord of the given quality.
    ///
    /// Every style except `Standard` drops 7ths and extensions.
    pub fn intervals(&self, quality: ChordQuality) -> Vec<u8> {
        match self {
            Self::Standard => quality.intervals().to_vec(),
            Self::Power => vec![0, 7],
            Self::Octave => vec![0, 12],
            Self::Sus2 => vec![0, 2, 7],
            Self::Sus4 => vec![0, 5, 7],
            Self::FifthOctave => vec![0, 7, 12],
            Self::Open => {
                let mut intervals = quality.triad().to_vec();
                intervals.push(14);
                intervals
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Power => "power",
            Self::Octave => "octave",
            Self::Sus2 => "sus2",
            Self::Sus4 => "sus4",
            Self::FifthOctave => "fifth_octave",
            Self::Open => "open",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::Power => "Power Chord",
            Self::Octave => "Octave",
            Self::Sus2 => "Sus2",
            Self::Sus4 => "Sus4",
            Self::FifthOctave => "5th + Octave",
            Self::Open => "Open/Add9",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Standard => "Full chord voicings with 3rd included",
            Self::Power => "Root + 5th only, no major/minor quality",
            Self::Octave => "Root + octave, clean and cutting",
            Self::Sus2 => "3rd replaced with the 2nd, open and ambiguous",
            Self::Sus4 => "3rd replaced with the 4th, tension that wants to resolve",
            Self::FifthOctave => "Root + 5th + octave, thick rock sound",
            Self::Open => "Triad with an added 9th, jangly and open",
        }
    }
}

impl fmt::Display for VoicingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoicingStyle {
    type Err = SongcraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| SongcraftError::UnknownStyle { kind: "voicing", name: s.to_string() })
    }
}

// ============================================================================
// Chord Symbols
// ============================================================================

/// A parsed chord symbol such as `Am`, `G7` or `Bbmaj7`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordSymbol {
    /// Pitch class of the root (C = 0)
    pub root: u8,
    /// `None` when the suffix is not in the quality table
    pub quality: Option<ChordQuality>,
}

impl ChordSymbol {
    /// Parse `[A-G][#b]?` followed by a quality suffix.
    ///
    /// Returns `None` when the root does not resolve to a pitch class.
    pub fn parse(symbol: &str) -> Option<Self> {
        symbol.chars().next().filter(|c| ('A'..='G').contains(c))?;
        let accidental = symbol[1..].chars().next().filter(|&c| c == '#' || c == 'b');
        let root_len = 1 + accidental.map_or(0, |c| c.len_utf8());
        let root = pitch_class(&symbol[..root_len])?;
        let quality = ChordQuality::from_suffix(&symbol[root_len..]);
        Some(Self { root, quality })
    }

    /// Quality used for note generation; unknown suffixes fall back to a major triad
    pub fn effective_quality(&self) -> ChordQuality {
        self.quality.unwrap_or(ChordQuality::Major)
    }

    /// MIDI pitch of the root in the given octave
    pub fn root_pitch(&self, octave: u8) -> Option<u8> {
        to_pitch(base_midi(self.root, octave))
    }

    /// MIDI pitches for this chord in the given octave and voicing
    pub fn pitches(&self, octave: u8, voicing: VoicingStyle) -> Vec<u8> {
        let base = base_midi(self.root, octave);
        voicing
            .intervals(self.effective_quality())
            .into_iter()
            .filter_map(|interval| to_pitch(base + interval as i32))
            .collect()
    }
}

fn base_midi(root: u8, octave: u8) -> i32 {
    12 * (octave as i32 + 1) + root as i32
}

fn to_pitch(midi: i32) -> Option<u8> {
    u8::try_from(midi).ok().filter(|&p| p <= 127)
}

/// Resolve a chord symbol to MIDI pitches in the harmony octave.
///
/// Unparseable symbols resolve to an empty list.
pub fn resolve(symbol: &str, voicing: VoicingStyle) -> Vec<u8> {
    resolve_in_octave(symbol, HARMONY_OCTAVE, voicing)
}

pub fn resolve_in_octave(symbol: &str, octave: u8, voicing: VoicingStyle) -> Vec<u8> {
    ChordSymbol::parse(symbol)
        .map(|chord| chord.pitches(octave, voicing))
        .unwrap_or_default()
}

/// Root pitch of a chord symbol in the given octave
pub fn root_pitch(symbol: &str, octave: u8) -> Option<u8> {
    ChordSymbol::parse(symbol)?.root_pitch(octave)
}

/// Note name with octave, e.g. 61 -> `C#4`
pub fn note_name(pitch: u8) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

/// Note names for a chord symbol, e.g. `Am` -> `["A3", "C4", "E4"]`
pub fn resolve_names(symbol: &str, octave: u8, voicing: VoicingStyle) -> Vec<String> {
    resolve_in_octave(symbol, octave, voicing)
        .into_iter()
        .map(note_name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pitch_classes(pitches: &[u8]) -> Vec<u8> {
        let mut pcs: Vec<u8> = pitches.iter().map(|p| p % 12).collect();
        pcs.sort();
        pcs
    }

    #[test]
    fn test_major_and_minor_triads() {
        assert_eq!(resolve("C", VoicingStyle::Standard), vec![48, 52, 55]);
        assert_eq!(resolve("Am", VoicingStyle::Standard), vec![57, 60, 64]);
    }

    #[test]
    fn test_dominant_seventh() {
        let g7 = resolve("G7", VoicingStyle::Standard);
        assert_eq!(g7, vec![55, 59, 62, 65]);
        // G B D F
        assert_eq!(pitch_classes(&g7), vec![2, 5, 7, 11]);
    }

    #[test]
    fn test_sharp_and_flat_spellings() {
        assert_eq!(resolve("C#m", VoicingStyle::Standard), resolve("Dbm", VoicingStyle::Standard));
        assert_eq!(resolve("Bbmaj7", VoicingStyle::Standard), vec![58, 62, 65, 69]);
        // Bare `B` is a root, not a flat on nothing
        assert_eq!(resolve("B", VoicingStyle::Standard), vec![59, 63, 66]);
    }

    #[test]
    fn test_quality_aliases() {
        assert_eq!(resolve("CM", VoicingStyle::Standard), resolve("C", VoicingStyle::Standard));
        assert_eq!(resolve("Cmaj", VoicingStyle::Standard), resolve("C", VoicingStyle::Standard));
        assert_eq!(resolve("Cmin", VoicingStyle::Standard), resolve("Cm", VoicingStyle::Standard));
        assert_eq!(resolve("Cminor", VoicingStyle::Standard), resolve("Cm", VoicingStyle::Standard));
    }

    #[test]
    fn test_unknown_quality_falls_back_to_major() {
        assert_eq!(resolve("C13b9", VoicingStyle::Standard), vec![48, 52, 55]);
        assert_eq!(resolve("D/F#", VoicingStyle::Standard), resolve("D", VoicingStyle::Standard));
    }

    #[test]
    fn test_malformed_symbols_are_silent() {
        for symbol in ["", "H", "c", "xyz", "#", "Cb", "E#", "🎸", "A\u{301}"] {
            let _ = resolve(symbol, VoicingStyle::Standard);
        }
        assert!(resolve("", VoicingStyle::Standard).is_empty());
        assert!(resolve("H7", VoicingStyle::Standard).is_empty());
        assert!(resolve("Cb", VoicingStyle::Standard).is_empty());
    }

    #[test]
    fn test_power_voicing() {
        let power = resolve("C", VoicingStyle::Power);
        assert_eq!(pitch_classes(&power), vec![0, 7]);
        assert_eq!(power[1] - power[0], 7);
    }

    #[test]
    fn test_sus2_ignores_quality() {
        assert_eq!(resolve("Cm", VoicingStyle::Sus2), resolve("C", VoicingStyle::Sus2));
        assert_eq!(resolve("C", VoicingStyle::Sus2), vec![48, 50, 55]);
    }

    #[test]
    fn test_voicings_drop_extensions() {
        assert_eq!(resolve("G7", VoicingStyle::FifthOctave), vec![55, 62, 67]);
        assert_eq!(resolve("Cmaj7", VoicingStyle::Octave), vec![48, 60]);
    }

    #[test]
    fn test_open_voicing_adds_ninth_to_triad() {
        assert_eq!(resolve("C", VoicingStyle::Open), vec![48, 52, 55, 62]);
        assert_eq!(resolve("Am", VoicingStyle::Open), vec![57, 60, 64, 71]);
        assert_eq!(resolve("Am7", VoicingStyle::Open), vec![57, 60, 64, 71]);
    }

    #[test]
    fn test_open_voicing_keeps_quality_triad() {
        assert_eq!(VoicingStyle::Open.intervals(ChordQuality::Diminished), vec![0, 3, 6, 14]);
        assert_eq!(VoicingStyle::Open.intervals(ChordQuality::Augmented), vec![0, 4, 8, 14]);
        assert_eq!(VoicingStyle::Open.intervals(ChordQuality::Minor7), vec![0, 3, 7, 14]);
    }

    #[test]
    fn test_octave_placement_and_range() {
        assert_eq!(resolve_in_octave("C", 4, VoicingStyle::Standard), vec![60, 64, 67]);
        assert_eq!(root_pitch("E", BASS_OCTAVE), Some(40));
        // Top octave drops pitches past 127
        assert_eq!(resolve_in_octave("G", 9, VoicingStyle::Standard), vec![127]);
    }

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(resolve_names("Am", 3, VoicingStyle::Standard), vec!["A3", "C4", "E4"]);
    }

    #[test]
    fn test_voicing_names() {
        assert_eq!("fifth_octave".parse::<VoicingStyle>(), Ok(VoicingStyle::FifthOctave));
        assert!("drop2".parse::<VoicingStyle>().is_err());
        let json = serde_json::to_string(&VoicingStyle::FifthOctave).unwrap();
        assert_eq!(json, "\"fifth_octave\"");
        for voicing in VoicingStyle::ALL {
            assert_eq!(voicing.to_string().parse::<VoicingStyle>(), Ok(voicing));
        }
    }
}
