//! Instruments: event owners routed through an audio channel.

use std::collections::HashMap;
use std::sync::Arc;

use ritmo_core::{AudioBuffer, AudioEvent, DrumTimbre, EventSource, Sample};

use crate::channel::AudioChannel;
use crate::synth::SynthPatch;

/// One step pattern of a drum machine.
#[derive(Default)]
pub struct DrumPattern {
    /// The pattern's drum events, positioned by step index.
    pub events: Vec<AudioEvent>,
}

/// Pre-rendered drum samples plus the patterns that trigger them.
pub struct DrumKit {
    samples: HashMap<DrumTimbre, Arc<AudioBuffer>>,
    /// All patterns of this kit; only the active one is collected.
    pub patterns: Vec<DrumPattern>,
    active_pattern: usize,
}

impl DrumKit {
    /// An empty kit without samples or patterns.
    pub fn new() -> Self {
        Self {
            samples: HashMap::new(),
            patterns: Vec::new(),
            active_pattern: 0,
        }
    }

    /// A four-piece kit with procedurally rendered samples, enough to
    /// sequence a beat without shipping sample files.
    pub fn standard(sample_rate: u32) -> Self {
        let mut kit = Self::new();
        kit.set_sample(DrumTimbre::Kick, Arc::new(render_kick(sample_rate)));
        kit.set_sample(DrumTimbre::Stick, Arc::new(render_tone(sample_rate, 1200.0, 0.03, 40.0)));
        kit.set_sample(DrumTimbre::Snare, Arc::new(render_snare(sample_rate)));
        kit.set_sample(DrumTimbre::HiHat, Arc::new(render_tone(sample_rate, 6200.0, 0.05, 90.0)));
        kit
    }

    /// Assign the sample a timbre triggers.
    pub fn set_sample(&mut self, timbre: DrumTimbre, sample: Arc<AudioBuffer>) {
        self.samples.insert(timbre, sample);
    }

    /// The sample behind a timbre.
    pub fn sample(&self, timbre: DrumTimbre) -> Option<&Arc<AudioBuffer>> {
        self.samples.get(&timbre)
    }

    /// Append an empty pattern, returning its index.
    pub fn add_pattern(&mut self) -> usize {
        self.patterns.push(DrumPattern::default());
        self.patterns.len() - 1
    }

    /// Select which pattern the sequencer collects from.
    pub fn set_active_pattern(&mut self, index: usize) {
        if index < self.patterns.len() {
            self.active_pattern = index;
        }
    }

    /// Index of the active pattern.
    pub fn active_pattern(&self) -> usize {
        self.active_pattern
    }

    /// Events of the active pattern, if any pattern exists.
    pub fn active_events_mut(&mut self) -> Option<&mut Vec<AudioEvent>> {
        self.patterns
            .get_mut(self.active_pattern)
            .map(|pattern| &mut pattern.events)
    }
}

impl Default for DrumKit {
    fn default() -> Self {
        Self::new()
    }
}

/// What kind of voice an instrument produces.
pub enum InstrumentKind {
    /// Synthesized voice with a patch shared by all its events.
    Synth(SynthPatch),
    /// Plays back (regions of) sample buffers.
    Sampler,
    /// Pattern-based drum machine with a one-bar channel-local loop.
    DrumMachine(DrumKit),
}

/// An instrument owns its events and the [`AudioChannel`] they are mixed
/// through. Events reference their instrument by index (see
/// [`crate::Sequencer`]); instruments are the sole owners of event memory.
pub struct Instrument {
    /// Instrument fader, copied into the channel's mix volume every pass.
    pub volume: Sample,
    /// The voice kind and its settings.
    pub kind: InstrumentKind,
    /// The mix bus this instrument renders through.
    pub channel: AudioChannel,
    pub(crate) events: Vec<AudioEvent>,
    pub(crate) old_tempo: f64,
}

impl Instrument {
    /// Create an instrument with a channel sized for the engine's output.
    pub fn new(
        kind: InstrumentKind,
        output_channels: usize,
        buffer_size: usize,
        tempo: f64,
    ) -> Self {
        Self {
            volume: ritmo_core::MAX_PHASE,
            kind,
            channel: AudioChannel::new(output_channels, buffer_size, ritmo_core::MAX_PHASE),
            events: Vec::new(),
            old_tempo: tempo,
        }
    }

    /// The instrument's own (non-pattern) events.
    pub fn events(&self) -> &[AudioEvent] {
        &self.events
    }

    /// Mutable access to the instrument's own events. Mutations from
    /// control threads must go through the engine's command queue so they
    /// land at a pass boundary.
    pub fn events_mut(&mut self) -> &mut Vec<AudioEvent> {
        &mut self.events
    }

    /// Add a sequenced event, returning its index.
    pub fn add_event(&mut self, event: AudioEvent) -> usize {
        self.events.push(event);
        self.events.len() - 1
    }

    /// Add an event and immediately start live playback of it.
    pub fn add_live_event(&mut self, mut event: AudioEvent) -> usize {
        event.set_sequenced(false);
        event.play();
        self.events.push(event);
        self.events.len() - 1
    }

    /// Remove an event by index, reclaiming its memory.
    pub fn remove_event(&mut self, index: usize) -> Option<AudioEvent> {
        if index < self.events.len() {
            Some(self.events.remove(index))
        } else {
            None
        }
    }

    /// Drop all events (own list and patterns).
    pub fn clear_events(&mut self) {
        self.events.clear();
        if let InstrumentKind::DrumMachine(kit) = &mut self.kind {
            for pattern in &mut kit.patterns {
                pattern.events.clear();
            }
        }
    }

    /// Whether any sequenced events exist.
    pub fn has_events(&self) -> bool {
        match &self.kind {
            InstrumentKind::DrumMachine(kit) => {
                kit.patterns.iter().any(|p| !p.events.is_empty())
            }
            _ => !self.events.is_empty(),
        }
    }

    /// Place a drum event in a pattern at the given step. Returns its
    /// index within the pattern, or `None` when this is not a drum
    /// machine, the pattern is missing or the timbre has no sample.
    pub fn add_drum_event(
        &mut self,
        pattern_index: usize,
        timbre: DrumTimbre,
        position_index: usize,
        samples_per_step: f64,
    ) -> Option<usize> {
        let InstrumentKind::DrumMachine(kit) = &mut self.kind else {
            return None;
        };
        let sample = Arc::clone(kit.samples.get(&timbre)?);
        let pattern = kit.patterns.get_mut(pattern_index)?;

        let mut event = AudioEvent::drum(sample, timbre, position_index);
        event.set_event_start((position_index as f64 * samples_per_step).round() as usize);
        pattern.events.push(event);
        Some(pattern.events.len() - 1)
    }

    /// Reposition events after a tempo change. Pattern-based (drum)
    /// events are recomputed from their step index; every other event is
    /// scaled by `old_tempo / new_tempo`.
    pub fn update_events(&mut self, new_tempo: f64, samples_per_step: f64) {
        match &mut self.kind {
            InstrumentKind::DrumMachine(kit) => {
                for pattern in &mut kit.patterns {
                    for event in &mut pattern.events {
                        if let EventSource::Drum { position_index, .. } = &event.source {
                            let start = (*position_index as f64 * samples_per_step).round();
                            event.set_event_start(start as usize);
                        }
                    }
                }
            }
            _ => {
                if self.old_tempo != new_tempo {
                    let ratio = self.old_tempo / new_tempo;
                    for event in &mut self.events {
                        let start = (event.event_start() as f64 * ratio).round() as usize;
                        let length = (event.event_length() as f64 * ratio).round() as usize;
                        event.set_event_start(start);
                        event.set_event_length(length);
                    }
                }
            }
        }
        self.old_tempo = new_tempo;
    }
}

fn render_kick(sample_rate: u32) -> AudioBuffer {
    let rate = f64::from(sample_rate);
    let frames = (rate * 0.3) as usize;
    let mut buffer = AudioBuffer::new(1, frames.max(1));

    let mut phase = 0.0f64;
    for (i, sample) in buffer.channel_mut(0).iter_mut().enumerate() {
        let progress = i as f64 / frames as f64;
        // pitch sweep from 110 Hz down to 45 Hz with an exponential decay
        let frequency = 45.0 + 65.0 * (1.0 - progress).powi(2);
        phase += frequency / rate;
        let decay = (-6.0 * progress).exp();
        *sample = ((phase * std::f64::consts::TAU).sin() * decay) as Sample;
    }
    buffer
}

fn render_snare(sample_rate: u32) -> AudioBuffer {
    let rate = f64::from(sample_rate);
    let frames = (rate * 0.15) as usize;
    let mut buffer = AudioBuffer::new(1, frames.max(1));

    for (i, sample) in buffer.channel_mut(0).iter_mut().enumerate() {
        let t = i as f64 / rate;
        let progress = i as f64 / frames as f64;
        let body = (t * 190.0 * std::f64::consts::TAU).sin() * 0.5;
        // stand-in for the noise burst of a real snare
        let rattle = (t * 1700.0 * std::f64::consts::TAU).sin().signum() * 0.3;
        let decay = (-8.0 * progress).exp();
        *sample = ((body + rattle) * decay) as Sample;
    }
    buffer
}

fn render_tone(sample_rate: u32, frequency: f64, seconds: f64, decay_rate: f64) -> AudioBuffer {
    let rate = f64::from(sample_rate);
    let frames = (rate * seconds) as usize;
    let mut buffer = AudioBuffer::new(1, frames.max(1));

    for (i, sample) in buffer.channel_mut(0).iter_mut().enumerate() {
        let t = i as f64 / rate;
        let decay = (-decay_rate * t).exp();
        *sample = ((t * frequency * std::f64::consts::TAU).sin() * decay) as Sample;
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler() -> Instrument {
        Instrument::new(InstrumentKind::Sampler, 1, 64, 120.0)
    }

    fn constant_sample(frames: usize) -> Arc<AudioBuffer> {
        let mut buffer = AudioBuffer::new(1, frames);
        buffer.channel_mut(0).fill(1.0);
        Arc::new(buffer)
    }

    #[test]
    fn test_add_and_remove_events() {
        let mut instrument = sampler();
        let index = instrument.add_event(AudioEvent::sample(constant_sample(10), 0, 10));
        assert!(instrument.has_events());

        let removed = instrument.remove_event(index);
        assert!(removed.is_some());
        assert!(!instrument.has_events());
    }

    #[test]
    fn test_tempo_change_scales_event_positions() {
        let mut instrument = sampler();
        instrument.add_event(AudioEvent::sample(constant_sample(100), 1000, 100));

        // halving the tempo doubles every position and length
        instrument.update_events(60.0, 0.0);
        let event = &instrument.events()[0];
        assert_eq!(event.event_start(), 2000);
        assert_eq!(event.event_length(), 200);
        assert_eq!(event.event_end(), 2199);
    }

    #[test]
    fn test_tempo_change_is_anchored_to_previous_tempo() {
        let mut instrument = sampler();
        instrument.add_event(AudioEvent::sample(constant_sample(100), 1000, 100));

        // a no-op "change" to the same tempo must not move anything
        instrument.update_events(120.0, 0.0);
        assert_eq!(instrument.events()[0].event_start(), 1000);
    }

    #[test]
    fn test_drum_events_reposition_from_steps() {
        let mut instrument = Instrument::new(
            InstrumentKind::DrumMachine(DrumKit::standard(44100)),
            1,
            64,
            120.0,
        );
        let InstrumentKind::DrumMachine(kit) = &mut instrument.kind else {
            panic!()
        };
        let pattern = kit.add_pattern();

        instrument
            .add_drum_event(pattern, DrumTimbre::Kick, 4, 100.0)
            .unwrap();
        {
            let InstrumentKind::DrumMachine(kit) = &instrument.kind else {
                panic!()
            };
            assert_eq!(kit.patterns[pattern].events[0].event_start(), 400);
        }

        // drums recompute from the step grid instead of scaling
        instrument.update_events(60.0, 250.0);
        let InstrumentKind::DrumMachine(kit) = &instrument.kind else {
            panic!()
        };
        assert_eq!(kit.patterns[pattern].events[0].event_start(), 1000);
    }

    #[test]
    fn test_standard_kit_has_all_timbres() {
        let kit = DrumKit::standard(44100);
        for timbre in [
            DrumTimbre::Kick,
            DrumTimbre::Stick,
            DrumTimbre::Snare,
            DrumTimbre::HiHat,
        ] {
            let sample = kit.sample(timbre).expect("timbre rendered");
            assert!(sample.buffer_size() > 0);
        }
    }

    #[test]
    fn test_live_event_flags() {
        let mut instrument = sampler();
        let index = instrument.add_live_event(AudioEvent::sample(constant_sample(10), 0, 10));
        let event = &instrument.events()[index];
        assert!(event.is_live());
        assert!(!event.is_sequenced());
    }
}
