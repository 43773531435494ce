//! Minimal synthesis for synth events.
//!
//! Waveform quality is not the point here: the engine treats oscillator
//! algorithms as replaceable collaborators. This module provides just
//! enough (phase-accumulator oscillators and a linear ADSR) for synth
//! events to produce deterministic audio end to end.

use ritmo_core::{AudioBuffer, AudioEvent, EventSource, Sample};

/// Oscillator waveforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    /// Sine wave.
    #[default]
    Sine,
    /// Rising sawtooth.
    Saw,
    /// Square wave.
    Square,
    /// Triangle wave.
    Triangle,
}

/// Attack / decay / sustain / release envelope settings, times in seconds.
#[derive(Debug, Clone, Copy)]
pub struct Adsr {
    /// Attack time in seconds.
    pub attack: f64,
    /// Decay time in seconds.
    pub decay: f64,
    /// Sustain level (linear, `0..=1`).
    pub sustain: Sample,
    /// Release time in seconds.
    pub release: f64,
}

impl Default for Adsr {
    fn default() -> Self {
        Self {
            attack: 0.002,
            decay: 0.01,
            sustain: 0.8,
            release: 0.05,
        }
    }
}

/// The voice settings of a synth instrument.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthPatch {
    /// Oscillator waveform.
    pub waveform: Waveform,
    /// Amplitude envelope.
    pub adsr: Adsr,
}

/// Renders synth events: full buffers for sequenced events, one chunk per
/// render cycle for live events.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    sample_rate: u32,
}

impl Synthesizer {
    /// Create a synthesizer at the engine sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Render a sequenced synth event's full buffer. Called when the event
    /// is added and whenever tempo changes resize it.
    pub fn render_event(&self, event: &mut AudioEvent, patch: &SynthPatch) {
        let length = event.event_length();
        if length == 0 {
            return;
        }
        if let EventSource::Synth {
            frequency,
            phase,
            buffer,
            ..
        } = &mut event.source
        {
            if buffer.buffer_size() != length || buffer.amount_of_channels() != 1 {
                *buffer = AudioBuffer::new(1, length);
            }
            let rate = f64::from(self.sample_rate);
            let increment = f64::from(*frequency) / rate;
            let envelope = SequencedEnvelope::new(&patch.adsr, rate, length);

            let mut current_phase = 0.0;
            for i in 0..length {
                buffer.channel_mut(0)[i] =
                    oscillator_sample(patch.waveform, current_phase) * envelope.level_at(i);
                current_phase += increment;
                if current_phase >= 1.0 {
                    current_phase -= 1.0;
                }
            }
            *phase = current_phase;
        }
    }

    /// Render the next live chunk of a synth event, carrying phase and
    /// envelope state across cycles. Returns whether the released voice
    /// has fully decayed and can be removed from live playback.
    pub fn render_live_chunk(
        &self,
        event: &mut AudioEvent,
        patch: &SynthPatch,
        frames: usize,
    ) -> bool {
        let mut finished = false;

        if let EventSource::Synth {
            frequency,
            phase,
            envelope,
            envelope_offset,
            released,
            buffer,
            ..
        } = &mut event.source
        {
            if buffer.buffer_size() != frames || buffer.amount_of_channels() != 1 {
                *buffer = AudioBuffer::new(1, frames);
            }
            let rate = f64::from(self.sample_rate);
            let increment = f64::from(*frequency) / rate;
            let attack_frames = (patch.adsr.attack * rate).max(1.0);
            let decay_frames = (patch.adsr.decay * rate).max(1.0);
            let release_frames = (patch.adsr.release * rate).max(1.0);
            let release_coeff = (0.001f64.powf(1.0 / release_frames)) as Sample;
            let sustain = patch.adsr.sustain;

            for i in 0..frames {
                if *released {
                    *envelope *= release_coeff;
                } else {
                    let offset = *envelope_offset as f64;
                    *envelope = if offset < attack_frames {
                        (offset / attack_frames) as Sample
                    } else if offset < attack_frames + decay_frames {
                        let progress = ((offset - attack_frames) / decay_frames) as Sample;
                        1.0 - (1.0 - sustain) * progress
                    } else {
                        sustain
                    };
                }
                buffer.channel_mut(0)[i] =
                    oscillator_sample(patch.waveform, *phase) * *envelope;
                *phase += increment;
                if *phase >= 1.0 {
                    *phase -= 1.0;
                }
                *envelope_offset += 1;
            }

            if *released && *envelope < 0.001 {
                finished = true;
            }
        }
        finished
    }
}

fn oscillator_sample(waveform: Waveform, phase: f64) -> Sample {
    let value = match waveform {
        Waveform::Sine => (phase * std::f64::consts::TAU).sin(),
        Waveform::Saw => 2.0 * phase - 1.0,
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
    };
    value as Sample
}

struct SequencedEnvelope {
    attack_frames: f64,
    decay_frames: f64,
    sustain: Sample,
    release_start: f64,
    release_frames: f64,
}

impl SequencedEnvelope {
    fn new(adsr: &Adsr, sample_rate: f64, length: usize) -> Self {
        let length = length as f64;
        let release_frames = (adsr.release * sample_rate).max(1.0).min(length);
        Self {
            attack_frames: (adsr.attack * sample_rate).max(1.0),
            decay_frames: (adsr.decay * sample_rate).max(1.0),
            sustain: adsr.sustain,
            release_start: length - release_frames,
            release_frames,
        }
    }

    fn level_at(&self, frame: usize) -> Sample {
        let position = frame as f64;
        let base = if position < self.attack_frames {
            (position / self.attack_frames) as Sample
        } else if position < self.attack_frames + self.decay_frames {
            let progress = ((position - self.attack_frames) / self.decay_frames) as Sample;
            1.0 - (1.0 - self.sustain) * progress
        } else {
            self.sustain
        };

        if position >= self.release_start {
            let remaining = ((self.release_start + self.release_frames - position)
                / self.release_frames) as Sample;
            base * remaining.clamp(0.0, 1.0)
        } else {
            base
        }
    }
}
