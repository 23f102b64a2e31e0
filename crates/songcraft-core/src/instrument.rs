//! Instrument presets: table-driven synthesis recipes for the harmony and bass voices

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SongcraftError;

/// Basic oscillator waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

/// Oscillator construction for a recipe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OscillatorShape {
    /// Single naive oscillator
    Basic(Waveform),
    /// Additive: the first `count` harmonics of the waveform's series
    Partials { waveform: Waveform, count: u8 },
    /// `count` copies of the waveform detuned across `spread_cents`
    Fat { waveform: Waveform, count: u8, spread_cents: f32 },
}

/// ADSR envelope, times in seconds, sustain as level 0..1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Envelope {
    pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self { attack, decay, sustain, release }
    }
}

/// Frequency modulation applied to the carrier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FmModulation {
    /// Modulator frequency as a ratio of the carrier
    pub harmonicity: f32,
    /// Peak deviation as a multiple of the modulator frequency
    pub index: f32,
    pub modulator: Waveform,
    pub envelope: Envelope,
}

/// Which shared effects the voice is routed through
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EffectSend {
    Dry,
    ReverbOnly { reverb_wet: f32 },
    ChorusReverb { chorus_wet: f32, reverb_wet: f32 },
}

/// Full description of how an instrument sounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRecipe {
    pub oscillator: OscillatorShape,
    pub envelope: Envelope,
    pub fm: Option<FmModulation>,
    pub send: EffectSend,
    pub volume_db: f32,
}

/// Harmony bus level shared by every instrument
const HARMONY_VOLUME_DB: f32 = -8.0;

/// Recipe for the bass voice; not user-selectable
pub const BASS_RECIPE: InstrumentRecipe = InstrumentRecipe {
    oscillator: OscillatorShape::Partials { waveform: Waveform::Sawtooth, count: 6 },
    envelope: Envelope::new(0.005, 0.2, 0.6, 0.08),
    fm: None,
    send: EffectSend::Dry,
    volume_db: -4.0,
};

/// Selectable harmony instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    #[default]
    Piano,
    ElectricPiano,
    AcousticGuitar,
    CleanGuitar,
    Organ,
    SynthPad,
    Strings,
    Bell,
}

impl InstrumentKind {
    pub const ALL: [Self; 8] = [
        Self::Piano,
        Self::ElectricPiano,
        Self::AcousticGuitar,
        Self::CleanGuitar,
        Self::Organ,
        Self::SynthPad,
        Self::Strings,
        Self::Bell,
    ];

    pub fn recipe(&self) -> InstrumentRecipe {
        use OscillatorShape::{Basic, Fat, Partials};
        use Waveform::{Sawtooth, Sine, Square, Triangle};

        let (oscillator, envelope, fm, send) = match self {
            Self::Piano => (
                Partials { waveform: Triangle, count: 8 },
                Envelope::new(0.005, 0.4, 0.2, 1.2),
                None,
                EffectSend::ReverbOnly { reverb_wet: 0.2 },
            ),
            Self::ElectricPiano => (
                Basic(Sine),
                Envelope::new(0.002, 0.5, 0.1, 1.0),
                Some(FmModulation {
                    harmonicity: 3.01,
                    index: 14.0,
                    modulator: Square,
                    envelope: Envelope::new(0.002, 0.2, 0.0, 0.2),
                }),
                EffectSend::ChorusReverb { chorus_wet: 0.3, reverb_wet: 0.25 },
            ),
            Self::AcousticGuitar => (
                Basic(Triangle),
                Envelope::new(0.01, 0.3, 0.1, 0.8),
                Some(FmModulation {
                    harmonicity: 1.5,
                    index: 2.0,
                    modulator: Sine,
                    envelope: Envelope::new(0.01, 0.3, 0.1, 0.8),
                }),
                EffectSend::ReverbOnly { reverb_wet: 0.2 },
            ),
            Self::CleanGuitar => (
                Fat { waveform: Sawtooth, count: 2, spread_cents: 10.0 },
                Envelope::new(0.01, 0.2, 0.3, 0.6),
                None,
                EffectSend::ReverbOnly { reverb_wet: 0.2 },
            ),
            Self::Organ => (
                Partials { waveform: Sine, count: 4 },
                Envelope::new(0.01, 0.1, 0.9, 0.3),
                None,
                EffectSend::ChorusReverb { chorus_wet: 0.3, reverb_wet: 0.25 },
            ),
            Self::SynthPad => (
                Fat { waveform: Sawtooth, count: 3, spread_cents: 30.0 },
                Envelope::new(0.4, 0.3, 0.8, 2.0),
                None,
                EffectSend::ChorusReverb { chorus_wet: 0.4, reverb_wet: 0.5 },
            ),
            Self::Strings => (
                Fat { waveform: Sawtooth, count: 4, spread_cents: 20.0 },
                Envelope::new(0.3, 0.2, 0.7, 1.5),
                None,
                EffectSend::ChorusReverb { chorus_wet: 0.4, reverb_wet: 0.5 },
            ),
            Self::Bell => (
                Basic(Sine),
                Envelope::new(0.001, 1.5, 0.0, 2.0),
                Some(FmModulation {
                    harmonicity: 5.1,
                    index: 3.0,
                    modulator: Sine,
                    envelope: Envelope::new(0.001, 0.5, 0.0, 0.5),
                }),
                EffectSend::ReverbOnly { reverb_wet: 0.6 },
            ),
        };

        InstrumentRecipe { oscillator, envelope, fm, send, volume_db: HARMONY_VOLUME_DB }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Piano => "piano",
            Self::ElectricPiano => "electric_piano",
            Self::AcousticGuitar => "acoustic_guitar",
            Self::CleanGuitar => "clean_guitar",
            Self::Organ => "organ",
            Self::SynthPad => "synth_pad",
            Self::Strings => "strings",
            Self::Bell => "bell",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Piano => "Piano",
            Self::ElectricPiano => "Electric Piano",
            Self::AcousticGuitar => "Acoustic Guitar",
            Self::CleanGuitar => "Clean Electric",
            Self::Organ => "Organ",
            Self::SynthPad => "Synth Pad",
            Self::Strings => "Strings",
            Self::Bell => "Bell/Chime",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Piano => "Warm acoustic piano sound",
            Self::ElectricPiano => "Rhodes-style electric piano",
            Self::AcousticGuitar => "Nylon string guitar feel",
            Self::CleanGuitar => "Clean electric guitar tone",
            Self::Organ => "Classic rock organ sound",
            Self::SynthPad => "Lush synthesizer pad",
            Self::Strings => "Orchestral string ensemble",
            Self::Bell => "Bright bell-like tones",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentKind {
    type Err = SongcraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| SongcraftError::UnknownStyle { kind: "instrument", name: s.to_string() })
    }
}
