//! TOML song descriptions.
//!
//! A song file declares tempo, time signature, bar count and a list of
//! tracks (synth note grids and drum patterns). `ritmo bounce` and
//! `ritmo play` build an engine from it; without a file a small demo
//! groove is used.

use anyhow::{Context, bail};
use ritmo_core::{DrumTimbre, Sample};
use ritmo_engine::{DrumKit, Engine, SynthPatch, Waveform};
use serde::Deserialize;
use std::path::Path;

fn default_signature() -> [u32; 2] {
    [4, 4]
}

fn default_bars() -> u32 {
    1
}

fn default_steps_per_bar() -> u32 {
    16
}

fn default_volume() -> f32 {
    1.0
}

fn default_note_length() -> usize {
    1
}

/// A complete song description.
#[derive(Debug, Deserialize)]
pub struct Song {
    /// Tempo in BPM.
    pub tempo: f64,
    /// Time signature as `[beat_amount, beat_unit]`.
    #[serde(default = "default_signature")]
    pub time_signature: [u32; 2],
    /// Number of bars in the loop.
    #[serde(default = "default_bars")]
    pub bars: u32,
    /// Step grid resolution.
    #[serde(default = "default_steps_per_bar")]
    pub steps_per_bar: u32,
    /// The song's tracks.
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// One instrument track.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Track {
    /// A synthesizer playing a note grid.
    Synth {
        /// Track fader (`0..=1`).
        #[serde(default = "default_volume")]
        volume: f32,
        /// Oscillator waveform.
        #[serde(default)]
        waveform: WaveformName,
        /// The notes to sequence.
        #[serde(default)]
        notes: Vec<Note>,
    },
    /// A drum machine playing the standard kit.
    Drums {
        /// Track fader (`0..=1`).
        #[serde(default = "default_volume")]
        volume: f32,
        /// The pattern's hits.
        #[serde(default)]
        hits: Vec<Hit>,
    },
}

/// A sequenced synth note.
#[derive(Debug, Deserialize)]
pub struct Note {
    /// Step the note starts on.
    pub step: usize,
    /// Note length in steps.
    #[serde(default = "default_note_length")]
    pub length: usize,
    /// Pitch in Hz.
    pub frequency: f32,
}

/// A drum hit.
#[derive(Debug, Deserialize)]
pub struct Hit {
    /// Step the hit lands on.
    pub step: usize,
    /// Which drum sounds.
    pub timbre: TimbreName,
}

/// Serializable waveform names.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformName {
    /// Sine wave.
    #[default]
    Sine,
    /// Sawtooth wave.
    Saw,
    /// Square wave.
    Square,
    /// Triangle wave.
    Triangle,
}

impl From<WaveformName> for Waveform {
    fn from(name: WaveformName) -> Self {
        match name {
            WaveformName::Sine => Waveform::Sine,
            WaveformName::Saw => Waveform::Saw,
            WaveformName::Square => Waveform::Square,
            WaveformName::Triangle => Waveform::Triangle,
        }
    }
}

/// Serializable drum timbre names.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimbreName {
    /// Bass drum.
    Kick,
    /// Side stick.
    Stick,
    /// Snare drum.
    Snare,
    /// Closed hi-hat.
    Hihat,
}

impl From<TimbreName> for DrumTimbre {
    fn from(name: TimbreName) -> Self {
        match name {
            TimbreName::Kick => DrumTimbre::Kick,
            TimbreName::Stick => DrumTimbre::Stick,
            TimbreName::Snare => DrumTimbre::Snare,
            TimbreName::Hihat => DrumTimbre::HiHat,
        }
    }
}

impl Song {
    /// Load a song from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading song file {}", path.display()))?;
        let song: Song =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        if song.tempo <= 0.0 {
            bail!("song tempo must be positive");
        }
        Ok(song)
    }

    /// A one-bar demo groove: kick/snare/hats plus a square bassline.
    pub fn demo() -> Self {
        Self {
            tempo: 120.0,
            time_signature: [4, 4],
            bars: 1,
            steps_per_bar: 16,
            tracks: vec![
                Track::Drums {
                    volume: 0.9,
                    hits: [
                        (0, TimbreName::Kick),
                        (4, TimbreName::Snare),
                        (8, TimbreName::Kick),
                        (10, TimbreName::Kick),
                        (12, TimbreName::Snare),
                        (2, TimbreName::Hihat),
                        (6, TimbreName::Hihat),
                        (10, TimbreName::Hihat),
                        (14, TimbreName::Hihat),
                    ]
                    .into_iter()
                    .map(|(step, timbre)| Hit { step, timbre })
                    .collect(),
                },
                Track::Synth {
                    volume: 0.6,
                    waveform: WaveformName::Square,
                    notes: [(0, 110.0), (4, 110.0), (8, 82.41), (12, 110.0)]
                        .into_iter()
                        .map(|(step, frequency)| Note {
                            step,
                            length: 2,
                            frequency,
                        })
                        .collect(),
                },
            ],
        }
    }

    /// Total loop length in frames for the given sample rate.
    pub fn loop_frames(&self, sample_rate: u32) -> usize {
        let samples_per_bar = ((f64::from(sample_rate) * 60.0) / self.tempo)
            * f64::from(self.time_signature[0]);
        (samples_per_bar as usize) * self.bars as usize
    }

    /// Register this song's instruments and events on an engine.
    pub fn build(&self, engine: &mut Engine) -> anyhow::Result<()> {
        engine.set_tempo_now(self.tempo, self.time_signature[0], self.time_signature[1])?;
        engine.update_measures(self.bars, self.steps_per_bar)?;

        for track in &self.tracks {
            match track {
                Track::Synth {
                    volume,
                    waveform,
                    notes,
                } => {
                    let patch = SynthPatch {
                        waveform: (*waveform).into(),
                        ..SynthPatch::default()
                    };
                    let id = engine.register_synth(patch);
                    {
                        let instrument = engine
                            .sequencer_mut()
                            .instrument_mut(id)
                            .expect("freshly registered");
                        instrument.volume = (*volume as Sample).clamp(0.0, 1.0);
                        // synth voices render mono, fan out to the device layout
                        instrument.channel.is_mono = true;
                    }
                    for note in notes {
                        engine.add_synth_event(
                            id,
                            note.frequency as Sample,
                            note.step,
                            note.length.max(1),
                        )?;
                    }
                }
                Track::Drums { volume, hits } => {
                    let sample_rate = engine.config().sample_rate;
                    let id = engine.register_drum_machine(DrumKit::standard(sample_rate));
                    {
                        let instrument = engine
                            .sequencer_mut()
                            .instrument_mut(id)
                            .expect("freshly registered");
                        instrument.volume = (*volume as Sample).clamp(0.0, 1.0);
                        instrument.channel.is_mono = true;
                    }
                    let pattern = engine.add_drum_pattern(id)?;
                    for hit in hits {
                        engine.add_drum_event(id, pattern, hit.timbre.into(), hit.step)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_song_toml() {
        let text = r#"
            tempo = 100.0
            bars = 2

            [[tracks]]
            kind = "synth"
            waveform = "saw"
            notes = [{ step = 0, length = 4, frequency = 220.0 }]

            [[tracks]]
            kind = "drums"
            hits = [{ step = 0, timbre = "kick" }, { step = 4, timbre = "snare" }]
        "#;
        let song: Song = toml::from_str(text).unwrap();
        assert_eq!(song.tempo, 100.0);
        assert_eq!(song.bars, 2);
        assert_eq!(song.time_signature, [4, 4]);
        assert_eq!(song.tracks.len(), 2);
    }

    #[test]
    fn test_demo_builds_on_engine() {
        let song = Song::demo();
        let (mut engine, _controller, _notifications) = ritmo_engine::Engine::new(
            ritmo_engine::EngineConfig::default(),
            song.tempo,
            song.time_signature[0],
            song.time_signature[1],
        )
        .unwrap();

        song.build(&mut engine).unwrap();
        assert_eq!(engine.sequencer().instrument_count(), 2);
    }

    #[test]
    fn test_loop_frames_at_120_bpm() {
        let song = Song::demo();
        assert_eq!(song.loop_frames(44100), 88200);
    }
}
