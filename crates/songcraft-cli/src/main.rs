//! songcraft: play a chord progression with drums and bass from the terminal

mod config;

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use songcraft_core::{
    resolve_names, BassPattern, ChordRhythm, DrumPattern, InstrumentKind, Transport, VoicingStyle, TICKS_PER_BEAT,
};
use songcraft_services::{
    default_output_device, AudioEngine, AudioOutput, ChordPlayer, OfflineOutput, PlaybackRequest, PlayerEvent,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::PlaybackDefaults;

/// Host refresh interval, roughly one UI frame
const FRAME_SECS: f64 = 0.02;

/// Chord progression player
#[derive(Parser, Debug)]
#[command(name = "songcraft")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Play a chord progression with drums and bass", long_about = None)]
struct Args {
    /// Chord symbols, e.g. C Am F G7
    #[arg(value_name = "CHORD", required_unless_present = "list")]
    chords: Vec<String>,

    /// Tempo in beats per minute
    #[arg(short, long)]
    tempo: Option<u32>,

    /// Beats each chord lasts (2, 4 or 8)
    #[arg(short, long)]
    beats: Option<u8>,

    #[arg(long)]
    voicing: Option<VoicingStyle>,

    #[arg(short, long)]
    instrument: Option<InstrumentKind>,

    #[arg(short, long)]
    drums: Option<DrumPattern>,

    #[arg(long)]
    bass: Option<BassPattern>,

    #[arg(short, long)]
    rhythm: Option<ChordRhythm>,

    /// How long to play; defaults to two passes through the progression
    #[arg(short, long)]
    seconds: Option<f64>,

    /// List voicings, instruments and patterns, then exit
    #[arg(long)]
    list: bool,

    /// Run on a simulated clock without opening an audio device
    #[arg(long)]
    offline: bool,
}

impl Args {
    fn request(&self, defaults: &PlaybackDefaults) -> PlaybackRequest {
        let style = defaults.style;
        PlaybackRequest::new(self.chords.iter().cloned())
            .with_style(style)
            .with_tempo(self.tempo.unwrap_or(defaults.tempo_bpm))
            .with_instrument(self.instrument.unwrap_or(defaults.instrument))
            .with_beats_per_chord(self.beats.unwrap_or(style.beats_per_chord))
            .with_voicing(self.voicing.unwrap_or(style.voicing))
            .with_drums(self.drums.unwrap_or(style.drum_pattern))
            .with_bass(self.bass.unwrap_or(style.bass_pattern))
            .with_rhythm(self.rhythm.unwrap_or(style.chord_rhythm))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    if args.list {
        print_catalog();
        return Ok(());
    }

    let settings = config::load_settings();
    let request = args.request(&settings.playback);
    let seconds = args.seconds.unwrap_or_else(|| two_passes(&request));

    if args.offline {
        let mut player = ChordPlayer::new(OfflineOutput::default(), settings.player);
        drive(&mut player, request, seconds, |p| p.output_mut().advance(FRAME_SECS))?;
    } else {
        let mut player = ChordPlayer::new(AudioEngine::new(settings.player.master_gain_db), settings.player);
        drive(&mut player, request, seconds, |_| thread::sleep(Duration::from_secs_f64(FRAME_SECS)))?;
    }
    Ok(())
}

fn init_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("songcraft=debug".parse()?))
        .init();
    Ok(())
}

fn two_passes(request: &PlaybackRequest) -> f64 {
    let beats = request.chords.len() as f64 * request.style.beats_per_chord as f64 * 2.0;
    beats * 60.0 / request.tempo_bpm.max(1) as f64
}

/// Play `request` until the output clock reaches `seconds`, printing each chord as it sounds.
///
/// Returns the number of chord changes printed.
fn drive<O: AudioOutput>(
    player: &mut ChordPlayer<O>,
    request: PlaybackRequest,
    seconds: f64,
    mut wait: impl FnMut(&mut ChordPlayer<O>),
) -> Result<usize> {
    let events = player.events();
    let chords = request.chords.clone();
    let style = request.style;

    player.play(request).context("Failed to start playback")?;
    info!(seconds, "Playing");

    let mut printed = 0;

    while player.output().now() < seconds {
        wait(player);
        player.tick();

        for event in events.try_iter() {
            let PlayerEvent::ChordChanged { index, .. } = event else { continue };
            let Some(symbol) = chords.get(index) else { continue };
            let position = Transport::format_position(player.state().position_ticks, 4);
            let notes = resolve_names(symbol, style.harmony_octave, style.voicing);
            println!("{position:>8}  {symbol:<8} {}", notes.join(" "));
            printed += 1;
        }
    }

    let beats = player.state().position_ticks / TICKS_PER_BEAT;
    player.dispose();
    info!(beats, chords = printed, "Finished");
    Ok(printed)
}

fn print_catalog() {
    println!("Voicings:");
    for v in VoicingStyle::ALL {
        println!("  {:<14} {:<16} {}", v.as_str(), v.display_name(), v.description());
    }
    println!("\nInstruments:");
    for i in InstrumentKind::ALL {
        println!("  {:<14} {:<16} {}", i.as_str(), i.display_name(), i.description());
    }
    println!("\nDrum patterns:");
    for d in DrumPattern::ALL {
        println!("  {:<14} {:<16} {}", d.as_str(), d.display_name(), d.description());
    }
    println!("\nBass patterns:");
    for b in BassPattern::ALL {
        println!("  {:<14} {}", b.as_str(), b.display_name());
    }
    println!("\nChord rhythms:");
    for r in ChordRhythm::ALL {
        println!("  {:<14} {}", r.as_str(), r.display_name());
    }
    match default_output_device() {
        Ok(device) => println!("\nOutput: {} ({} Hz, {} ch)", device.name, device.sample_rate, device.channels),
        Err(e) => println!("\nOutput: unavailable ({e})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_settings() {
        let args = Args::parse_from(["songcraft", "C", "G", "--tempo", "90", "--drums", "texas_blues"]);
        let mut defaults = PlaybackDefaults::default();
        defaults.style.bass_pattern = BassPattern::WalkingBlues;
        defaults.tempo_bpm = 140;

        let request = args.request(&defaults);
        assert_eq!(request.chords, vec!["C", "G"]);
        assert_eq!(request.tempo_bpm, 90);
        assert_eq!(request.style.drum_pattern, DrumPattern::TexasBlues);
        assert_eq!(request.style.bass_pattern, BassPattern::WalkingBlues);
    }

    #[test]
    fn test_unknown_style_rejected() {
        assert!(Args::try_parse_from(["songcraft", "C", "--voicing", "jazz"]).is_err());
        assert!(Args::try_parse_from(["songcraft"]).is_err());
        assert!(Args::try_parse_from(["songcraft", "--list"]).is_ok());
    }

    #[test]
    fn test_offline_run_prints_every_chord() {
        let request = PlaybackRequest::new(["C", "F"]).with_tempo(240);
        let mut player = ChordPlayer::new(OfflineOutput::default(), Default::default());
        let printed = drive(&mut player, request, 2.0, |p| p.output_mut().advance(FRAME_SECS)).unwrap();

        // Chords at 0.0, 1.0 and 2.0 seconds
        assert_eq!(printed, 3);
        assert!(player.is_disposed());
    }

    #[test]
    fn test_two_passes() {
        let request = PlaybackRequest::new(["C", "Am", "F", "G"]).with_tempo(120);
        assert_eq!(two_passes(&request), 16.0);
    }
}
