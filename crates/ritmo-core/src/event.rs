//! Audio events: positioned sources of samples on the sequencer timeline.
//!
//! An [`AudioEvent`] couples a positioning header (start / end / length in
//! sample frames, volume, enable/loop/delete/lock flags) with an
//! [`EventSource`] describing where its samples come from. The single
//! [`mix_into`](AudioEvent::mix_into) function implements the mix contract
//! shared by every event kind, including the loop-boundary wrap rules.

use std::sync::Arc;

use crate::buffer::AudioBuffer;
use crate::volume;
use crate::Sample;

/// Timbre selector for drum events. Each timbre maps to a pre-rendered
/// sample owned by the drum kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrumTimbre {
    /// Bass drum.
    Kick,
    /// Side stick.
    Stick,
    /// Snare drum.
    Snare,
    /// Closed hi-hat.
    HiHat,
}

/// Where an event's samples come from.
#[derive(Debug, Clone)]
pub enum EventSource {
    /// References a sample buffer shared with its owning instrument. The
    /// range offsets allow playback of a sub-region of the source.
    Sample {
        /// Shared source audio.
        sample: Arc<AudioBuffer>,
        /// First playable frame within the source buffer.
        range_start: usize,
        /// Last playable frame within the source buffer (inclusive).
        range_end: usize,
        /// Read position used during live playback.
        playback_position: usize,
        /// Scratch buffer for live chunk rendering, allocated on first use.
        live_buffer: Option<AudioBuffer>,
    },
    /// Synthesized audio. The buffer is owned by the event and (re)rendered
    /// by the engine's synthesizer: in full for sequenced events, one
    /// engine-buffer-sized chunk per cycle for live events.
    Synth {
        /// Current oscillator frequency in Hz.
        frequency: Sample,
        /// Reference frequency to return to after pitch modulation.
        base_frequency: Sample,
        /// Oscillator phase accumulator.
        phase: f64,
        /// Cached envelope level, carried across live chunks.
        envelope: Sample,
        /// Frames of the envelope consumed so far (live playback).
        envelope_offset: usize,
        /// Whether the live note has been released.
        released: bool,
        /// Rendered audio.
        buffer: AudioBuffer,
    },
    /// References a pre-rendered drum sample selected by timbre; positioned
    /// by step index within the drum pattern.
    Drum {
        /// Step index within the owning pattern.
        position_index: usize,
        /// Which kit sample this event triggers.
        timbre: DrumTimbre,
        /// Shared pre-rendered sample.
        sample: Arc<AudioBuffer>,
    },
}

/// A positioned, enableable, optionally loopable source of samples.
#[derive(Debug, Clone)]
pub struct AudioEvent {
    start: usize,
    end: usize,
    length: usize,
    /// Volume on the logarithmic fader scale (see [`crate::volume`]).
    volume: Sample,
    enabled: bool,
    loopable: bool,
    deletable: bool,
    locked: bool,
    sequenced: bool,
    live: bool,
    read_pointer: usize,
    /// The event's sample source.
    pub source: EventSource,
}

impl AudioEvent {
    /// Create a sequenced sample event playing `sample` at `start` for
    /// `length` frames.
    pub fn sample(sample: Arc<AudioBuffer>, start: usize, length: usize) -> Self {
        let range_end = sample.buffer_size().saturating_sub(1);
        let mut event = Self::with_source(EventSource::Sample {
            sample,
            range_start: 0,
            range_end,
            playback_position: 0,
            live_buffer: None,
        });
        event.set_event_start(start);
        event.set_event_length(length);
        event
    }

    /// Create a sequenced synth event at `start` for `length` frames. The
    /// audio buffer starts silent; the engine's synthesizer renders it.
    pub fn synth(frequency: Sample, start: usize, length: usize) -> Self {
        let mut event = Self::with_source(EventSource::Synth {
            frequency,
            base_frequency: frequency,
            phase: 0.0,
            envelope: 0.0,
            envelope_offset: 0,
            released: false,
            buffer: AudioBuffer::new(1, length.max(1)),
        });
        event.set_event_start(start);
        event.set_event_length(length);
        event
    }

    /// Create a drum event triggering `timbre` at pattern step
    /// `position_index`. Timeline positioning is derived by the owning
    /// instrument from the step index and the current tempo.
    pub fn drum(sample: Arc<AudioBuffer>, timbre: DrumTimbre, position_index: usize) -> Self {
        let length = sample.buffer_size();
        let mut event = Self::with_source(EventSource::Drum {
            position_index,
            timbre,
            sample,
        });
        event.set_event_length(length);
        event
    }

    fn with_source(source: EventSource) -> Self {
        Self {
            start: 0,
            end: 0,
            length: 0,
            volume: volume::to_log(crate::MAX_PHASE),
            enabled: true,
            loopable: false,
            deletable: false,
            locked: false,
            sequenced: true,
            live: false,
            read_pointer: 0,
            source,
        }
    }

    /// First timeline frame at which this event sounds.
    pub fn event_start(&self) -> usize {
        self.start
    }

    /// Last timeline frame at which this event sounds (inclusive). For
    /// loopable events this may exceed `start + length - 1`; the read
    /// pointer wraps through the source buffer.
    pub fn event_end(&self) -> usize {
        self.end
    }

    /// Event length in frames.
    pub fn event_length(&self) -> usize {
        self.length
    }

    /// Position the event start. For non-loopable events the end is
    /// re-derived so that `end == start + length - 1` keeps holding.
    pub fn set_event_start(&mut self, value: usize) {
        self.start = value;
        if !self.loopable && self.length > 0 {
            self.end = self.start + self.length - 1;
        } else if self.end < self.start {
            self.end = self.start;
        }
    }

    /// Set the event length in frames, re-deriving the end position for
    /// non-loopable events.
    pub fn set_event_length(&mut self, value: usize) {
        self.length = value;
        if !self.loopable {
            self.end = self.start + self.length.saturating_sub(1);
        }
    }

    /// Set the end position. For non-loopable events the value is silently
    /// clamped so the event never sounds past `start + length - 1` (a
    /// shorter end for cut-off playback is allowed).
    pub fn set_event_end(&mut self, value: usize) {
        if !self.loopable && self.length > 0 && value >= self.start + self.length {
            self.end = self.start + self.length - 1;
        } else {
            self.end = value.max(self.start);
        }
    }

    /// Position the event on a musical grid: at measure `start_measure`,
    /// offset by `offset` units of a bar divided into `subdivisions`.
    pub fn position_event(
        &mut self,
        start_measure: usize,
        subdivisions: usize,
        offset: usize,
        samples_per_bar: usize,
    ) {
        let mut start_offset = samples_per_bar * start_measure;
        if subdivisions > 0 {
            start_offset += offset * samples_per_bar / subdivisions;
        }
        self.set_event_start(start_offset);
        self.set_event_end(start_offset + self.length.saturating_sub(1));
    }

    /// Fader volume (logarithmic scale).
    pub fn volume(&self) -> Sample {
        self.volume
    }

    /// Linear gain applied when mixing.
    pub fn gain(&self) -> Sample {
        volume::to_linear(self.volume)
    }

    /// Set the fader volume (logarithmic scale, `0..=1`).
    pub fn set_volume(&mut self, value: Sample) {
        self.volume = value.clamp(0.0, crate::MAX_PHASE);
    }

    /// Whether the event participates in collection at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the event.
    pub fn set_enabled(&mut self, value: bool) {
        self.enabled = value;
    }

    /// Whether the event loops through its source buffer.
    pub fn is_loopable(&self) -> bool {
        self.loopable
    }

    /// Toggle looping. The flag is forwarded onto an owned source buffer so
    /// downstream merges wrap accordingly.
    pub fn set_loopable(&mut self, value: bool) {
        self.loopable = value;
        if let EventSource::Synth { buffer, .. } = &mut self.source {
            buffer.loopable = value;
        }
    }

    /// Whether the event is queued for removal on the next collection pass.
    pub fn is_deletable(&self) -> bool {
        self.deletable
    }

    /// Mark the event for removal. The sequencer reclaims it on the next
    /// pass that visits it.
    pub fn set_deletable(&mut self, value: bool) {
        self.deletable = value;
    }

    /// Whether a writer currently holds the event. Locked events are
    /// skipped by the render pass (never waited on).
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Take the event lock.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Release the event lock.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Whether the event belongs to the sequenced grid (as opposed to being
    /// live-only).
    pub fn is_sequenced(&self) -> bool {
        self.sequenced
    }

    /// Mark the event as sequenced or live-only.
    pub fn set_sequenced(&mut self, value: bool) {
        self.sequenced = value;
    }

    /// Whether the event is currently sounding as a live voice.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Start live playback of this event outside the sequenced grid.
    pub fn play(&mut self) {
        if self.live {
            return;
        }
        self.deletable = false;
        match &mut self.source {
            EventSource::Sample {
                range_start,
                playback_position,
                ..
            } => *playback_position = *range_start,
            EventSource::Synth {
                envelope,
                envelope_offset,
                released,
                ..
            } => {
                *envelope = 0.0;
                *envelope_offset = 0;
                *released = false;
            }
            EventSource::Drum { .. } => {}
        }
        self.live = true;
    }

    /// Stop live playback. Synth events enter their release phase and stay
    /// live until the engine has rendered the release tail.
    pub fn stop(&mut self) {
        if !self.live {
            return;
        }
        if let EventSource::Synth { released, .. } = &mut self.source {
            *released = true;
        } else {
            self.live = false;
        }
    }

    /// Force live playback off without a release tail.
    pub fn halt_live(&mut self) {
        self.live = false;
    }

    /// First playable frame of the source sub-range (sample events).
    pub fn buffer_range_start(&self) -> usize {
        match &self.source {
            EventSource::Sample { range_start, .. } => *range_start,
            _ => 0,
        }
    }

    /// Last playable frame of the source sub-range (sample events).
    pub fn buffer_range_end(&self) -> usize {
        match &self.source {
            EventSource::Sample { range_end, .. } => *range_end,
            EventSource::Synth { buffer, .. } => buffer.buffer_size().saturating_sub(1),
            EventSource::Drum { sample, .. } => sample.buffer_size().saturating_sub(1),
        }
    }

    /// Restrict playback of a sample event to start at the given source
    /// frame. Clamped against the range end and the source length.
    pub fn set_buffer_range_start(&mut self, value: usize) {
        if let EventSource::Sample {
            sample,
            range_start,
            range_end,
            playback_position,
            ..
        } = &mut self.source
        {
            let max_index = sample.buffer_size().saturating_sub(1);
            *range_start = if *range_end > 0 {
                value.min(*range_end - 1)
            } else {
                value.min(max_index)
            };
            if *range_end <= *range_start {
                *range_end = (*range_start).max(*range_start + 1).min(max_index);
            }
            if *playback_position < *range_start {
                *playback_position = *range_start;
            }
        }
    }

    /// Restrict playback of a sample event to end at the given source frame
    /// (inclusive). Clamped against the source length and the range start.
    pub fn set_buffer_range_end(&mut self, value: usize) {
        if let EventSource::Sample {
            sample,
            range_start,
            range_end,
            playback_position,
            ..
        } = &mut self.source
        {
            let max_index = sample.buffer_size().saturating_sub(1);
            *range_end = value.min(max_index);
            if *range_start >= *range_end {
                *range_start = range_end.saturating_sub(1);
            }
            if *playback_position > *range_end {
                *playback_position = *range_end;
            }
        }
    }

    /// Length of the playable source sub-range in frames.
    pub fn buffer_range_length(&self) -> usize {
        self.buffer_range_end() - self.buffer_range_start() + 1
    }

    /// Resolve the source buffer, the read-index base within it and the
    /// last valid read index (inclusive).
    fn source_view(&self) -> (&AudioBuffer, usize, usize) {
        match &self.source {
            EventSource::Sample {
                sample,
                range_start,
                range_end,
                ..
            } => (
                sample.as_ref(),
                *range_start,
                (*range_end).min(sample.buffer_size().saturating_sub(1)),
            ),
            EventSource::Synth { buffer, .. } => {
                (buffer, 0, buffer.buffer_size().saturating_sub(1))
            }
            EventSource::Drum { sample, .. } => (
                sample.as_ref(),
                0,
                sample.buffer_size().saturating_sub(1),
            ),
        }
    }

    /// Mix this event's samples into `output` for the window starting at
    /// `buffer_position`.
    ///
    /// For each output frame `i`, the timeline position is `pointer = i +
    /// buffer_position` and the event contributes `source[pointer - start] *
    /// gain` while `start <= pointer <= end`. Wrap-around:
    ///
    /// 1. outside the event window nothing is contributed;
    /// 2. when the sequencer loops inside this window (`loop_started`),
    ///    frames at `i >= loop_offset` are retried at
    ///    `min_buffer_position + (i - loop_offset)`;
    /// 3. on a channel with a local loop (`use_channel_range`), positions
    ///    past `max_buffer_position` wrap by subtracting it;
    /// 4. loopable events read through an internal pointer that wraps
    ///    through the source buffer, decoupled from the timeline position.
    ///
    /// The event lock is held for the duration of the call. When the source
    /// has fewer channels than `output`, only the shared channels are mixed
    /// (loopable events fan channel 0 out instead).
    #[allow(clippy::too_many_arguments)]
    pub fn mix_into(
        &mut self,
        output: &mut AudioBuffer,
        buffer_position: usize,
        min_buffer_position: usize,
        max_buffer_position: usize,
        loop_started: bool,
        loop_offset: usize,
        use_channel_range: bool,
    ) {
        self.locked = true;

        let buffer_size = output.buffer_size();
        let gain = volume::to_linear(self.volume);
        let start = self.start;
        let end = self.end;
        let loopable = self.loopable;
        let mut read_pointer = self.read_pointer;

        {
            let (source, read_base, last_index) = self.source_view();

            if !loopable {
                let channel_amount = source
                    .amount_of_channels()
                    .min(output.amount_of_channels());

                for i in 0..buffer_size {
                    let mut pointer = i + buffer_position;

                    // past the loop end? a channel-local loop wraps in place,
                    // a sequencer loop is handled by the retry branch below
                    if pointer > max_buffer_position {
                        if use_channel_range {
                            pointer -= max_buffer_position;
                        } else if !loop_started {
                            break;
                        }
                    }

                    if pointer >= start && pointer <= end {
                        let read = pointer - start + read_base;
                        if read <= last_index {
                            for c in 0..channel_amount {
                                output.channel_mut(c)[i] += source.channel(c)[read] * gain;
                            }
                        }
                    } else if loop_started && i >= loop_offset {
                        let pointer = min_buffer_position + (i - loop_offset);
                        if pointer >= start && pointer <= end {
                            let read = pointer - start + read_base;
                            if read <= last_index {
                                for c in 0..channel_amount {
                                    output.channel_mut(c)[i] += source.channel(c)[read] * gain;
                                }
                            }
                        }
                    }
                }
            } else {
                // loopable events traverse their source through an internal
                // read pointer, independent of the sequencer position
                let fan_out = source.amount_of_channels() < output.amount_of_channels();
                let channel_amount = output.amount_of_channels();
                read_pointer = read_pointer.clamp(read_base, last_index);

                let mut position = buffer_position;
                let mut i = 0;
                while i < buffer_size {
                    let pointer = i + position;

                    if pointer >= start && pointer <= end {
                        for c in 0..channel_amount {
                            let source_channel = if fan_out { 0 } else { c };
                            output.channel_mut(c)[i] +=
                                source.channel(source_channel)[read_pointer] * gain;
                        }
                        read_pointer += 1;
                        if read_pointer > last_index {
                            read_pointer = read_base;
                        }
                    } else if loop_started && loop_offset > 0 && pointer > max_buffer_position {
                        // sequencer wrapped inside this window: shift the
                        // window origin and retry this frame
                        position = position.saturating_sub(loop_offset);
                        continue;
                    }
                    i += 1;
                }
            }
        }

        self.read_pointer = read_pointer;
        self.locked = false;
    }

    /// Render the next live chunk of `frames` frames into the internal live
    /// buffer (sample events only; synth live chunks are rendered by the
    /// engine's synthesizer). One-shot events switch themselves off once
    /// the source range is exhausted.
    pub fn synthesize_chunk(&mut self, frames: usize) {
        let loopable = self.loopable;
        let mut finished = false;

        if let EventSource::Sample {
            sample,
            range_start,
            range_end,
            playback_position,
            live_buffer,
        } = &mut self.source
        {
            let channels = sample.amount_of_channels();
            if !matches!(live_buffer.as_ref(), Some(buffer) if buffer.buffer_size() == frames) {
                *live_buffer = Some(AudioBuffer::new(channels, frames));
            }
            let Some(live) = live_buffer.as_mut() else {
                return;
            };
            live.silence();

            let merged = live.merge_from(sample, *playback_position, 0, 1.0);
            let merged_frames = merged / channels.max(1);

            // one full pass through the range rendered? append from the
            // range start to fill the remainder of the chunk
            if loopable && merged_frames < frames {
                live.merge_from(sample, *range_start, merged_frames, 1.0);
            }

            *playback_position += frames;
            if *playback_position > *range_end {
                if loopable {
                    let range_length = *range_end - *range_start + 1;
                    *playback_position -= range_length;
                } else {
                    finished = true;
                }
            }
        }

        if finished {
            self.live = false;
        }
    }

    /// The most recently rendered live chunk, if any.
    pub fn live_chunk(&self) -> Option<&AudioBuffer> {
        match &self.source {
            EventSource::Sample { live_buffer, .. } => live_buffer.as_ref(),
            EventSource::Synth { buffer, .. } => Some(buffer),
            EventSource::Drum { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_sample(frames: usize, value: Sample) -> Arc<AudioBuffer> {
        let mut buffer = AudioBuffer::new(1, frames);
        buffer.channel_mut(0).fill(value);
        Arc::new(buffer)
    }

    #[test]
    fn test_non_loopable_end_tracks_start_and_length() {
        let mut event = AudioEvent::sample(constant_sample(50, 1.0), 100, 50);
        assert_eq!(event.event_end(), 149);

        event.set_event_start(10);
        assert_eq!(event.event_end(), 59);

        event.set_event_length(20);
        assert_eq!(event.event_end(), 29);
    }

    #[test]
    fn test_event_end_clamped_for_non_loopable() {
        let mut event = AudioEvent::sample(constant_sample(50, 1.0), 0, 50);
        event.set_event_end(1000);
        assert_eq!(event.event_end(), 49);

        // a shorter end for cut-off playback is allowed
        event.set_event_end(25);
        assert_eq!(event.event_end(), 25);
    }

    #[test]
    fn test_loopable_end_may_exceed_length() {
        let mut event = AudioEvent::sample(constant_sample(10, 1.0), 0, 10);
        event.set_loopable(true);
        event.set_event_end(499);
        assert_eq!(event.event_end(), 499);
    }

    #[test]
    fn test_mix_within_range() {
        let mut event = AudioEvent::sample(constant_sample(50, 1.0), 100, 50);
        let mut output = AudioBuffer::new(1, 50);

        event.mix_into(&mut output, 100, 0, 999, false, 0, false);
        for &sample in output.channel(0) {
            assert_eq!(sample, 1.0);
        }
    }

    #[test]
    fn test_mix_outside_range_is_silent() {
        let mut event = AudioEvent::sample(constant_sample(50, 1.0), 100, 50);
        let mut output = AudioBuffer::new(1, 50);

        event.mix_into(&mut output, 200, 0, 999, false, 0, false);
        assert!(output.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mix_applies_volume_taper() {
        let mut event = AudioEvent::sample(constant_sample(10, 1.0), 0, 10);
        event.set_volume(0.5);
        let mut output = AudioBuffer::new(1, 10);

        event.mix_into(&mut output, 0, 0, 999, false, 0, false);
        let expected = crate::volume::to_linear(0.5);
        for &sample in output.channel(0) {
            assert!((sample - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mix_across_sequencer_loop() {
        // loop range [0, 199], event of ten frames at the loop start,
        // window of 50 frames starting at position 180
        let mut event = AudioEvent::sample(constant_sample(10, 1.0), 0, 10);
        let mut output = AudioBuffer::new(1, 50);

        let loop_offset = (199 - 180) + 1;
        event.mix_into(&mut output, 180, 0, 199, true, loop_offset, false);

        let channel = output.channel(0);
        assert!(channel[..20].iter().all(|&s| s == 0.0));
        assert!(channel[20..30].iter().all(|&s| s == 1.0));
        assert!(channel[30..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_loop_wrap_equals_two_contiguous_renders() {
        let make_event = || {
            let mut sample = AudioBuffer::new(1, 40);
            for (i, s) in sample.channel_mut(0).iter_mut().enumerate() {
                *s = (i as Sample) / 40.0;
            }
            AudioEvent::sample(Arc::new(sample), 170, 40)
        };

        // single render straddling max_buffer_position = 199
        let mut wrapped = AudioBuffer::new(1, 50);
        let mut event = make_event();
        event.mix_into(&mut wrapped, 180, 0, 199, true, 20, false);

        // same region rendered as two contiguous non-wrapping calls
        let mut first = AudioBuffer::new(1, 20);
        let mut second = AudioBuffer::new(1, 30);
        let mut event = make_event();
        event.mix_into(&mut first, 180, 0, 199, false, 0, false);
        event.mix_into(&mut second, 0, 0, 199, false, 0, false);

        for i in 0..20 {
            assert!((wrapped.channel(0)[i] - first.channel(0)[i]).abs() < 1e-9);
        }
        for i in 0..30 {
            assert!((wrapped.channel(0)[20 + i] - second.channel(0)[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_mix_channel_local_range() {
        // event in the first "bar" of a channel looping every 100 frames
        let mut event = AudioEvent::sample(constant_sample(10, 1.0), 0, 10);
        let mut output = AudioBuffer::new(1, 20);

        // positions 95..115 against a channel-local range of 100: frames at
        // pointer > 100 wrap as pointer - 100 => pointers 1..15
        event.mix_into(&mut output, 95, 0, 100, false, 0, true);

        let channel = output.channel(0);
        // frames 0..5 cover pointers 95..99 (outside the event)
        assert!(channel[..5].iter().all(|&s| s == 0.0));
        // wrapped pointers 1..10 fall inside the event
        assert!(channel[6..15].iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_loopable_event_wraps_source() {
        let mut sample = AudioBuffer::new(1, 4);
        for (i, s) in sample.channel_mut(0).iter_mut().enumerate() {
            *s = (i + 1) as Sample;
        }
        let mut event = AudioEvent::sample(Arc::new(sample), 0, 4);
        event.set_loopable(true);
        event.set_event_end(9);

        let mut output = AudioBuffer::new(1, 10);
        event.mix_into(&mut output, 0, 0, 999, false, 0, false);

        assert_eq!(
            output.channel(0),
            &[1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0, 1.0, 2.0]
        );
    }

    #[test]
    fn test_buffer_range_clamping() {
        let mut event = AudioEvent::sample(constant_sample(100, 1.0), 0, 100);

        event.set_buffer_range_end(499);
        assert_eq!(event.buffer_range_end(), 99);

        event.set_buffer_range_start(50);
        assert_eq!(event.buffer_range_start(), 50);
        assert_eq!(event.buffer_range_length(), 50);

        // start may never cross the end
        event.set_buffer_range_start(200);
        assert!(event.buffer_range_start() < event.buffer_range_end());
    }

    #[test]
    fn test_live_one_shot_finishes() {
        let mut event = AudioEvent::sample(constant_sample(16, 0.5), 0, 16);
        event.set_sequenced(false);
        event.play();
        assert!(event.is_live());

        event.synthesize_chunk(8);
        assert!(event.is_live());
        let chunk = event.live_chunk().expect("live chunk rendered");
        assert!(chunk.channel(0).iter().all(|&s| s == 0.5));

        event.synthesize_chunk(8);
        // range exhausted, one-shot event removed itself from live playback
        assert!(!event.is_live());
    }

    #[test]
    fn test_live_loopable_sample_wraps() {
        let mut sample = AudioBuffer::new(1, 6);
        for (i, s) in sample.channel_mut(0).iter_mut().enumerate() {
            *s = (i + 1) as Sample;
        }
        let mut event = AudioEvent::sample(Arc::new(sample), 0, 6);
        event.set_sequenced(false);
        event.set_loopable(true);
        event.play();

        event.synthesize_chunk(8);
        assert!(event.is_live());
        let chunk = event.live_chunk().expect("live chunk rendered");
        assert_eq!(
            chunk.channel(0),
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 1.0, 2.0]
        );
    }

    #[test]
    fn test_locked_flag_cycles_during_mix() {
        let mut event = AudioEvent::sample(constant_sample(10, 1.0), 0, 10);
        assert!(!event.is_locked());
        let mut output = AudioBuffer::new(1, 10);
        event.mix_into(&mut output, 0, 0, 999, false, 0, false);
        assert!(!event.is_locked());
    }
}
