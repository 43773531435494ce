//! The render loop.

use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use ritmo_core::{
    AudioBuffer, AudioEvent, DrumTimbre, MAX_PHASE, Notification, Notifier, ProcessingChain,
    Sample,
};
use ritmo_io::DiskWriter;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::controller::{Command, Controller, validate_signature, validate_tempo};
use crate::instrument::{DrumKit, Instrument, InstrumentKind};
use crate::sequencer::{InstrumentId, Sequencer};
use crate::synth::{SynthPatch, Synthesizer};
use crate::timeline::Timeline;
use crate::{EngineError, Result};

#[derive(Debug, Default, Clone)]
struct RecordingState {
    record_output: bool,
    record_from_device: bool,
    monitor_recording: bool,
    bouncing: bool,
    halt_recording: bool,
    file_id: usize,
}

/// The audio engine: everything one render pass touches, owned in one
/// place and driven by [`render`](Engine::render).
///
/// Constructed together with its [`Controller`] (the thread-safe control
/// surface) and the notification receiver. The engine itself is moved into
/// whatever drives rendering: a device callback, an offline bounce loop,
/// or a test.
pub struct Engine {
    config: EngineConfig,
    sequencer: Sequencer,
    timeline: Timeline,
    synthesizer: Synthesizer,
    master_chain: ProcessingChain,
    master_volume: Sample,
    in_buffer: AudioBuffer,
    record_buffer: Option<AudioBuffer>,
    recording: RecordingState,
    disk_writer: Option<DiskWriter>,
    notifier: Notifier,
    commands: Receiver<Command>,
}

impl Engine {
    /// Prepare an engine at the given tempo and time signature.
    ///
    /// Returns the engine, the controller handle for control threads, and
    /// the receiver on which the host observes notifications.
    pub fn new(
        config: EngineConfig,
        tempo: f64,
        beat_amount: u32,
        beat_unit: u32,
    ) -> Result<(Self, Controller, Receiver<Notification>)> {
        config.validate()?;
        validate_tempo(tempo)?;
        validate_signature(beat_amount, beat_unit)?;

        let (notifier, notifications) = Notifier::new(256);
        let (command_sender, commands) = crossbeam_channel::unbounded();

        let record_buffer = (config.input_channels > 0)
            .then(|| AudioBuffer::new(config.input_channels, config.buffer_size));

        let engine = Self {
            timeline: Timeline::new(config.sample_rate, tempo, beat_amount, beat_unit),
            synthesizer: Synthesizer::new(config.sample_rate),
            sequencer: Sequencer::new(),
            master_chain: ProcessingChain::new(),
            master_volume: 0.85,
            in_buffer: AudioBuffer::new(config.output_channels, config.buffer_size),
            record_buffer,
            recording: RecordingState::default(),
            disk_writer: None,
            notifier,
            commands,
            config,
        };
        info!(
            "engine prepared: {} Hz, {}-frame buffers, {} out / {} in channels",
            engine.config.sample_rate,
            engine.config.buffer_size,
            engine.config.output_channels,
            engine.config.input_channels
        );
        Ok((engine, Controller::new(command_sender), notifications))
    }

    /// The configuration latched at construction.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The sequencer (instrument registry and transport flag).
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Mutable sequencer access for hosts that own the engine directly.
    pub fn sequencer_mut(&mut self) -> &mut Sequencer {
        &mut self.sequencer
    }

    /// The tempo / position bookkeeping.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// The master bus effect chain.
    pub fn master_chain_mut(&mut self) -> &mut ProcessingChain {
        &mut self.master_chain
    }

    /// The render thread's notification handle.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Master output volume (linear, `0..=1`).
    pub fn master_volume(&self) -> Sample {
        self.master_volume
    }

    /// Set the master output volume.
    pub fn set_master_volume(&mut self, volume: Sample) {
        self.master_volume = volume.clamp(0.0, MAX_PHASE);
    }

    /// Register a synth instrument.
    pub fn register_synth(&mut self, patch: SynthPatch) -> InstrumentId {
        self.register(InstrumentKind::Synth(patch))
    }

    /// Register a sample-playback instrument.
    pub fn register_sampler(&mut self) -> InstrumentId {
        self.register(InstrumentKind::Sampler)
    }

    /// Register a drum machine built around `kit`.
    pub fn register_drum_machine(&mut self, kit: DrumKit) -> InstrumentId {
        self.register(InstrumentKind::DrumMachine(kit))
    }

    fn register(&mut self, kind: InstrumentKind) -> InstrumentId {
        let instrument = Instrument::new(
            kind,
            self.config.output_channels,
            self.config.buffer_size,
            self.timeline.tempo(),
        );
        self.sequencer.register_instrument(instrument)
    }

    /// Add a sequenced sample event playing `sample` at `start` for
    /// `length` frames.
    pub fn add_sample_event(
        &mut self,
        id: InstrumentId,
        sample: Arc<AudioBuffer>,
        start: usize,
        length: usize,
    ) -> Result<usize> {
        let instrument = self
            .sequencer
            .instrument_mut(id)
            .ok_or(EngineError::UnknownInstrument)?;
        Ok(instrument.add_event(AudioEvent::sample(sample, start, length)))
    }

    /// Add a sequenced synth event positioned on the step grid.
    pub fn add_synth_event(
        &mut self,
        id: InstrumentId,
        frequency: Sample,
        step_position: usize,
        step_length: usize,
    ) -> Result<usize> {
        let samples_per_step = self.timeline.samples_per_step();
        let start = (step_position as f64 * samples_per_step).round() as usize;
        let length = ((step_length as f64 * samples_per_step).round() as usize).max(1);

        let patch = self.synth_patch(id)?;
        let mut event = AudioEvent::synth(frequency, start, length);
        self.synthesizer.render_event(&mut event, &patch);

        let instrument = self
            .sequencer
            .instrument_mut(id)
            .ok_or(EngineError::UnknownInstrument)?;
        Ok(instrument.add_event(event))
    }

    /// Start a live synth note on the given instrument. Returns the event
    /// index to pass to [`stop_live_note`](Self::stop_live_note).
    pub fn play_live_note(&mut self, id: InstrumentId, frequency: Sample) -> Result<usize> {
        self.synth_patch(id)?;
        let buffer_size = self.config.buffer_size;
        let instrument = self
            .sequencer
            .instrument_mut(id)
            .ok_or(EngineError::UnknownInstrument)?;
        Ok(instrument.add_live_event(AudioEvent::synth(frequency, 0, buffer_size)))
    }

    /// Release a live note; it decays through its release envelope and is
    /// then reclaimed.
    pub fn stop_live_note(&mut self, id: InstrumentId, event_index: usize) -> Result<()> {
        let instrument = self
            .sequencer
            .instrument_mut(id)
            .ok_or(EngineError::UnknownInstrument)?;
        let event = instrument
            .events_mut()
            .get_mut(event_index)
            .ok_or_else(|| EngineError::InvalidConfig("event index out of range".into()))?;
        event.stop();
        Ok(())
    }

    fn synth_patch(&self, id: InstrumentId) -> Result<SynthPatch> {
        let instrument = self
            .sequencer
            .instrument(id)
            .ok_or(EngineError::UnknownInstrument)?;
        match &instrument.kind {
            InstrumentKind::Synth(patch) => Ok(*patch),
            _ => Err(EngineError::InvalidConfig(
                "instrument is not a synthesizer".into(),
            )),
        }
    }

    /// Add an empty pattern to a drum machine.
    pub fn add_drum_pattern(&mut self, id: InstrumentId) -> Result<usize> {
        let instrument = self
            .sequencer
            .instrument_mut(id)
            .ok_or(EngineError::UnknownInstrument)?;
        match &mut instrument.kind {
            InstrumentKind::DrumMachine(kit) => Ok(kit.add_pattern()),
            _ => Err(EngineError::InvalidConfig(
                "instrument is not a drum machine".into(),
            )),
        }
    }

    /// Place a drum hit in a pattern at the given step.
    pub fn add_drum_event(
        &mut self,
        id: InstrumentId,
        pattern: usize,
        timbre: DrumTimbre,
        step: usize,
    ) -> Result<usize> {
        let samples_per_step = self.timeline.samples_per_step();
        let instrument = self
            .sequencer
            .instrument_mut(id)
            .ok_or(EngineError::UnknownInstrument)?;
        instrument
            .add_drum_event(pattern, timbre, step, samples_per_step)
            .ok_or_else(|| EngineError::InvalidConfig("no such pattern or timbre".into()))
    }

    /// Start or pause the sequenced grid.
    pub fn set_playing(&mut self, playing: bool) {
        self.sequencer.playing = playing;
    }

    /// Queue a tempo / time-signature change, latched at the end of the
    /// current render iteration.
    pub fn set_tempo(&mut self, bpm: f64, beat_amount: u32, beat_unit: u32) -> Result<()> {
        validate_tempo(bpm)?;
        validate_signature(beat_amount, beat_unit)?;
        self.timeline.queue_tempo(bpm, beat_amount, beat_unit);
        Ok(())
    }

    /// Apply a tempo / time-signature change immediately.
    pub fn set_tempo_now(&mut self, bpm: f64, beat_amount: u32, beat_unit: u32) -> Result<()> {
        self.set_tempo(bpm, beat_amount, beat_unit)?;
        if self.timeline.has_queued_update() {
            self.apply_tempo_update();
        }
        Ok(())
    }

    /// Loop the sequencer between two frame offsets.
    pub fn set_loop_range(&mut self, start: usize, end: usize, steps_per_bar: u32) -> Result<()> {
        if start >= end {
            return Err(EngineError::InvalidLoopRange { start, end });
        }
        if steps_per_bar == 0 {
            return Err(EngineError::InvalidConfig(
                "steps per bar must be at least 1".into(),
            ));
        }
        self.timeline.set_loop_range(start, end, steps_per_bar);
        self.invalidate_channel_caches();
        Ok(())
    }

    /// Change the measure count and step grid.
    pub fn update_measures(&mut self, amount_of_bars: u32, steps_per_bar: u32) -> Result<()> {
        if amount_of_bars == 0 || steps_per_bar == 0 {
            return Err(EngineError::InvalidConfig(
                "measures and steps per bar must be at least 1".into(),
            ));
        }
        self.timeline.update_measures(amount_of_bars, steps_per_bar);
        self.invalidate_channel_caches();
        Ok(())
    }

    /// Move the playhead (clamped into the loop range).
    pub fn set_buffer_position(&mut self, frame: usize) {
        self.timeline.set_buffer_position(frame);
        self.notifier
            .broadcast(Notification::SequencerPositionUpdated { buffer_offset: 0 });
    }

    /// Move the playhead back to the loop start.
    pub fn rewind(&mut self) {
        self.set_buffer_position(self.timeline.min_buffer_position());
    }

    /// Place (`Some(frame)`) or clear (`None`) the notification marker.
    pub fn set_notification_marker(&mut self, marker: Option<usize>) {
        self.timeline.set_marker(marker);
    }

    /// Mirror device input into the master bus while recording from it.
    pub fn set_monitor_recording(&mut self, monitor: bool) {
        self.recording.monitor_recording = monitor;
    }

    /// Enter or leave bounce mode: offline rendering of the loop range to
    /// `directory/output.wav`, no device output, synchronous snippet
    /// writes. Rendering stops once the loop restarts.
    pub fn set_bounce_state<P: AsRef<Path>>(
        &mut self,
        active: bool,
        max_buffers: usize,
        directory: P,
    ) -> Result<()> {
        self.recording.bouncing = active;
        if active {
            self.timeline.set_buffer_position(0);
        }
        self.configure_output_recording(active, max_buffers, directory.as_ref())
    }

    /// Start or stop recording the engine output to
    /// `directory/output.wav`. `max_buffers` engine buffers are gathered
    /// in memory per snippet before it is handed to the writer thread.
    pub fn set_recording_state<P: AsRef<Path>>(
        &mut self,
        active: bool,
        max_buffers: usize,
        directory: P,
    ) -> Result<()> {
        self.configure_output_recording(active, max_buffers, directory.as_ref())
    }

    fn configure_output_recording(
        &mut self,
        active: bool,
        max_buffers: usize,
        directory: &Path,
    ) -> Result<()> {
        let was_recording = self.recording.record_output;

        if active {
            // output recording and device recording are mutually exclusive
            if self.recording.record_from_device {
                self.recording.record_from_device = false;
                self.finish_recording_detached();
            }
            let chunk_size = max_buffers.max(1) * self.config.buffer_size;
            let writer = DiskWriter::prepare(
                directory.join("output.wav"),
                chunk_size,
                self.config.output_channels,
                self.config.sample_rate,
                self.recording.bouncing,
                self.notifier.clone(),
            )?;
            self.disk_writer = Some(writer);
            self.recording.record_output = true;
            self.recording.file_id = 0;
        } else if was_recording {
            self.recording.record_output = false;
            if self.sequencer.playing {
                // flush happens on the next render pass
                self.recording.halt_recording = true;
            } else {
                self.finish_recording_detached();
            }
        }
        Ok(())
    }

    /// Start or stop recording the device input (requires input channels;
    /// mutually exclusive with output recording).
    pub fn set_recording_from_device_state<P: AsRef<Path>>(
        &mut self,
        active: bool,
        max_buffers: usize,
        directory: P,
    ) -> Result<()> {
        if active && self.config.input_channels == 0 {
            return Err(EngineError::InvalidConfig(
                "engine was prepared without input channels".into(),
            ));
        }
        let was_recording = self.recording.record_from_device;

        if active {
            if self.recording.record_output {
                self.recording.record_output = false;
                self.finish_recording_detached();
            }
            let chunk_size = max_buffers.max(1) * self.config.buffer_size;
            let writer = DiskWriter::prepare(
                directory.as_ref().join("output.wav"),
                chunk_size,
                self.config.input_channels,
                self.config.sample_rate,
                false,
                self.notifier.clone(),
            )?;
            self.disk_writer = Some(writer);
            self.recording.record_from_device = true;
            self.recording.file_id = 0;
        } else if was_recording {
            self.recording.record_from_device = false;
            if self.sequencer.playing {
                self.recording.halt_recording = true;
            } else {
                self.finish_recording_detached();
            }
        }
        Ok(())
    }

    /// Take the recorder out of the engine so the host can drive
    /// [`DiskWriter::finish`] on a thread of its choosing. Recording flags
    /// are cleared and the partial snippet flushed.
    pub fn stop_recording(&mut self) -> Option<DiskWriter> {
        self.recording.record_output = false;
        self.recording.record_from_device = false;
        self.recording.halt_recording = false;
        let mut writer = self.disk_writer.take()?;
        writer.flush_partial();
        Some(writer)
    }

    fn finish_recording_detached(&mut self) {
        if let Some(mut writer) = self.disk_writer.take() {
            writer.flush_partial();
            std::thread::spawn(move || match writer.finish() {
                Ok(path) => info!("recording finished: {}", path.display()),
                Err(err) => error!("recording could not be finished: {err}"),
            });
        }
    }

    /// Stop transport, clear all events and recording state. The engine
    /// stays prepared and can be rendered again.
    pub fn reset(&mut self) {
        info!("engine reset");
        self.sequencer.playing = false;
        self.sequencer.clear_events();
        self.timeline.set_buffer_position(0);
        self.recording = RecordingState::default();
        self.disk_writer = None;
    }

    fn invalidate_channel_caches(&mut self) {
        for slot in self.sequencer.slots_mut().iter_mut().flatten() {
            slot.channel.clear_cached_buffer();
        }
    }

    fn apply_tempo_update(&mut self) {
        self.timeline.apply_queued_tempo();
        let new_tempo = self.timeline.tempo();
        let samples_per_step = self.timeline.samples_per_step();
        self.sequencer.update_events(new_tempo, samples_per_step);
        self.refresh_synth_buffers();
        self.notifier.broadcast(Notification::SequencerTempoUpdated);
    }

    /// Re-render sequenced synth buffers after events were repositioned.
    fn refresh_synth_buffers(&mut self) {
        let Self {
            sequencer,
            synthesizer,
            ..
        } = self;
        for slot in sequencer.slots_mut().iter_mut().flatten() {
            let patch = match &slot.kind {
                InstrumentKind::Synth(patch) => *patch,
                _ => continue,
            };
            for event in slot.events_mut().iter_mut() {
                if event.is_sequenced() {
                    synthesizer.render_event(event, &patch);
                }
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            if let Err(err) = self.apply_command(command) {
                warn!("control command rejected: {err}");
            }
        }
    }

    fn apply_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::SetPlaying(playing) => self.set_playing(playing),
            Command::SetTempo {
                bpm,
                beat_amount,
                beat_unit,
            } => self.set_tempo(bpm, beat_amount, beat_unit)?,
            Command::SetTempoNow {
                bpm,
                beat_amount,
                beat_unit,
            } => self.set_tempo_now(bpm, beat_amount, beat_unit)?,
            Command::SetLoopRange {
                start,
                end,
                steps_per_bar,
            } => self.set_loop_range(start, end, steps_per_bar)?,
            Command::UpdateMeasures {
                amount_of_bars,
                steps_per_bar,
            } => self.update_measures(amount_of_bars, steps_per_bar)?,
            Command::SetBufferPosition(frame) => self.set_buffer_position(frame),
            Command::Rewind => self.rewind(),
            Command::SetVolume(volume) => self.set_master_volume(volume),
            Command::SetNotificationMarker(marker) => self.set_notification_marker(marker),
            Command::SetInstrumentVolume { id, volume } => {
                let instrument = self
                    .sequencer
                    .instrument_mut(id)
                    .ok_or(EngineError::UnknownInstrument)?;
                instrument.volume = volume.clamp(0.0, MAX_PHASE);
            }
            Command::SetBounceState {
                active,
                max_buffers,
                directory,
            } => self.set_bounce_state(active, max_buffers, directory)?,
            Command::SetRecordingState {
                active,
                max_buffers,
                directory,
            } => self.set_recording_state(active, max_buffers, directory)?,
            Command::SetRecordingFromDeviceState {
                active,
                max_buffers,
                directory,
            } => self.set_recording_from_device_state(active, max_buffers, directory)?,
            Command::SetMonitorRecording(monitor) => self.set_monitor_recording(monitor),
        }
        Ok(())
    }

    /// Render one buffer of interleaved output without device input.
    /// Returns `false` when rendering should stop (bounce completed).
    pub fn render(&mut self, output: &mut [Sample]) -> bool {
        self.render_with_input(None, output)
    }

    /// Render one buffer, optionally consuming one buffer of interleaved
    /// device input. `output` must hold `buffer_size * output_channels`
    /// samples.
    pub fn render_with_input(&mut self, input: Option<&[Sample]>, output: &mut [Sample]) -> bool {
        self.drain_commands();

        let buffer_size = self.config.buffer_size;
        let output_channels = self.config.output_channels;
        let is_mono = output_channels == 1;
        debug_assert!(output.len() >= buffer_size * output_channels);

        self.in_buffer.silence();

        let buffer_position = self.timeline.buffer_position();
        let min_position = self.timeline.min_buffer_position();
        let max_position = self.timeline.max_buffer_position();
        let samples_per_bar = self.timeline.samples_per_bar();

        // gather the audio events overlapping the current buffer range
        let loop_started = self.sequencer.collect(
            buffer_position,
            buffer_size,
            max_position,
            samples_per_bar,
            true,
            true,
        );

        // frame index within this buffer at which the loop restarts, and
        // how many frames must come from the loop start
        let loop_offset = if loop_started {
            (max_position - buffer_position) + 1
        } else {
            0
        };
        let loop_amount = buffer_size.saturating_sub(loop_offset);

        // when bouncing, the pass that reaches the loop end renders (and
        // records) only the frames up to the wrap, then finishes
        let mut bounce_tail: Option<usize> = None;
        if loop_started {
            if self.recording.bouncing {
                bounce_tail = Some(loop_offset.min(buffer_size));
            } else {
                // collect the extra events sounding at the loop start
                self.sequencer.collect(
                    min_position,
                    loop_amount,
                    max_position,
                    samples_per_bar,
                    false,
                    false,
                );
            }
        }

        // device input: keep a copy for the recorder, optionally monitor
        if self.recording.record_from_device {
            if let (Some(record_buffer), Some(input)) = (self.record_buffer.as_mut(), input) {
                let input_channels = self.config.input_channels;
                let frames = (input.len() / input_channels.max(1)).min(buffer_size);
                for frame in 0..frames {
                    for c in 0..input_channels.min(record_buffer.amount_of_channels()) {
                        record_buffer.channel_mut(c)[frame] = input[frame * input_channels + c];
                    }
                }
                if self.recording.monitor_recording {
                    for c in 0..output_channels {
                        self.in_buffer.channel_mut(c)[..frames]
                            .copy_from_slice(&record_buffer.channel(0)[..frames]);
                    }
                }
            }
        }

        let playing = self.sequencer.playing;
        let caching_enabled = self.config.channel_caching;

        {
            let Self {
                sequencer,
                synthesizer,
                in_buffer,
                ..
            } = self;

            for slot in sequencer.slots_mut().iter_mut().flatten() {
                let Instrument {
                    kind,
                    channel,
                    events,
                    ..
                } = slot;

                if channel.muted {
                    continue;
                }

                channel.create_output_buffer(output_channels, buffer_size);
                channel.maybe_invalidate_cache();
                channel.output_buffer_mut().silence();

                let use_channel_range = channel.max_buffer_position != 0;
                let channel_max = if use_channel_range {
                    channel.max_buffer_position
                } else {
                    max_position
                };

                // fold the playhead into the channel's own range; local
                // ranges are whole measures, so we fold by bars
                let mut channel_position = buffer_position;
                if samples_per_bar > 0 {
                    while channel_position > channel_max {
                        match channel_position.checked_sub(samples_per_bar) {
                            Some(position) => channel_position = position,
                            None => break,
                        }
                    }
                }

                let is_cached = channel.has_cache();
                let must_cache = caching_enabled && channel.can_cache() && !is_cached;
                let channel_volume = channel.mix_volume;

                // sequenced events only sound while the transport runs and
                // the fader is audible
                if playing && !channel.sequenced_events().is_empty() && channel_volume > 0.0 {
                    if is_cached {
                        channel.read_cache_into_output(channel_position);
                    } else {
                        let list: &mut Vec<AudioEvent> = match kind {
                            InstrumentKind::DrumMachine(kit) => match kit.active_events_mut() {
                                Some(pattern_events) => pattern_events,
                                None => &mut *events,
                            },
                            _ => &mut *events,
                        };
                        channel.mix_sequenced(
                            list,
                            channel_position,
                            min_position,
                            channel_max,
                            loop_started,
                            loop_offset,
                            use_channel_range,
                        );
                    }
                }

                // live events play at unity regardless of the channel
                // fader: their gain is divided back out before the merge
                if channel.has_live_events {
                    let live_amp = if channel_volume > 0.0 {
                        MAX_PHASE / channel_volume
                    } else {
                        MAX_PHASE
                    };
                    let patch = match kind {
                        InstrumentKind::Synth(patch) => Some(*patch),
                        _ => None,
                    };

                    for k in 0..channel.live_events().len() {
                        let index = channel.live_events()[k];
                        let Some(event) = events.get_mut(index) else {
                            continue;
                        };
                        let finished = match &patch {
                            Some(patch) => {
                                synthesizer.render_live_chunk(event, patch, buffer_size)
                            }
                            None => {
                                event.synthesize_chunk(buffer_size);
                                false
                            }
                        };
                        if let Some(chunk) = event.live_chunk() {
                            channel.output_buffer_mut().merge_from(chunk, 0, 0, live_amp);
                        }
                        // fully decayed voices are reclaimed by the next
                        // collection sweep
                        if finished {
                            event.set_deletable(true);
                        }
                    }
                }

                channel.run_processors(must_cache);

                // mono sources fan channel 0 out across the output layout
                if channel.is_mono {
                    channel.output_buffer_mut().apply_mono_source();
                }

                let merge_volume = if channel.has_live_events && channel_volume == 0.0 {
                    MAX_PHASE
                } else {
                    channel_volume
                };
                in_buffer.merge_from(channel.output_buffer(), 0, 0, merge_volume);
            }
        }

        // master bus processors (e.g. filter, limiter)
        self.master_chain.process(&mut self.in_buffer, is_mono);

        // interleave at master volume, hard-clipped as a final safety net
        // (a limiter in the master chain does the musical work)
        for frame in 0..buffer_size {
            for c in 0..output_channels {
                let sample = (self.in_buffer.channel(c)[frame] * self.master_volume)
                    .clamp(-MAX_PHASE, MAX_PHASE);
                output[frame * output_channels + c] = sample;
            }
        }

        // playhead advancement and position notifications
        if playing {
            for frame in 0..buffer_size {
                let events = self.timeline.advance_frame();
                if events.step {
                    self.notifier
                        .broadcast(Notification::SequencerPositionUpdated {
                            buffer_offset: frame,
                        });
                }
                if events.marker {
                    self.notifier.broadcast(Notification::MarkerPositionReached);
                }
            }
        }

        // recording: append to the in-memory snippet, never to disk
        if playing && (self.recording.record_output || self.recording.record_from_device) {
            let record_frames = bounce_tail.unwrap_or(buffer_size);
            if let Some(writer) = self.disk_writer.as_mut() {
                if self.recording.record_from_device {
                    if let Some(record_buffer) = &self.record_buffer {
                        writer.append_buffer(record_buffer);
                    }
                } else {
                    writer.append_interleaved(
                        &output[..record_frames * output_channels],
                        record_frames,
                        output_channels,
                    );
                }
            }
        }

        if self.recording.halt_recording {
            self.recording.halt_recording = false;
            self.finish_recording_detached();
        }

        if bounce_tail.is_some() {
            return self.complete_bounce(output);
        }

        // a queued tempo change is latched between iterations
        if self.timeline.has_queued_update() {
            self.apply_tempo_update();
        }

        true
    }

    fn complete_bounce(&mut self, output: &mut [Sample]) -> bool {
        output.fill(0.0);
        if let Some(mut writer) = self.disk_writer.take() {
            match writer.finish() {
                Ok(path) => {
                    info!("bounce complete: {}", path.display());
                    self.notifier.broadcast(Notification::BounceComplete {
                        id: self.recording.file_id,
                    });
                }
                Err(err) => error!("bounce failed: {err}"),
            }
        }
        self.recording.bouncing = false;
        self.recording.record_output = false;
        false
    }
}
