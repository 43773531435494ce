//! Tempo, time-signature and playhead bookkeeping.
//!
//! All sequencer timing derives from four numbers: tempo (BPM), the time
//! signature, the step subdivision and the sample rate. From these the
//! timeline maintains `samples_per_beat`, `samples_per_step` (fractional)
//! and `samples_per_bar`, plus the loop range and the playhead.
//!
//! Step boundaries are detected with a fractional accumulator rather than
//! an integer modulo: `next_step_at` advances by the exact (fractional)
//! step size, so exactly one position notification fires per step even
//! when the step size is not a whole number of frames.

use tracing::debug;

/// Things that happened while advancing the playhead by one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameEvents {
    /// The playhead crossed a step boundary.
    pub step: bool,
    /// The playhead reached the notification marker.
    pub marker: bool,
    /// The playhead wrapped from the loop end to the loop start.
    pub wrapped: bool,
}

/// Sample-rate-synchronized tempo and position state.
#[derive(Debug, Clone)]
pub struct Timeline {
    sample_rate: u32,

    tempo: f64,
    queued_tempo: f64,
    beat_amount: u32,
    beat_unit: u32,
    queued_beat_amount: u32,
    queued_beat_unit: u32,

    amount_of_bars: u32,
    /// Steps per beat: the smallest note size the sequencer acknowledges.
    beat_subdivision: u32,
    steps_per_bar: u32,

    samples_per_beat: usize,
    samples_per_step: f64,
    samples_per_bar: usize,

    min_buffer_position: usize,
    max_buffer_position: usize,
    min_step_position: u32,
    max_step_position: u32,

    buffer_position: usize,
    step_position: u32,
    marked_position: Option<usize>,
    next_step_at: f64,
}

impl Timeline {
    /// Create a timeline at the given tempo and time signature, looping
    /// over one bar as a sixteen-step sequence.
    pub fn new(sample_rate: u32, tempo: f64, beat_amount: u32, beat_unit: u32) -> Self {
        let mut timeline = Self {
            sample_rate,
            tempo,
            queued_tempo: tempo,
            beat_amount,
            beat_unit,
            queued_beat_amount: beat_amount,
            queued_beat_unit: beat_unit,
            amount_of_bars: 1,
            beat_subdivision: 4,
            steps_per_bar: 16,
            samples_per_beat: 0,
            samples_per_step: 0.0,
            samples_per_bar: 0,
            min_buffer_position: 0,
            max_buffer_position: 0,
            min_step_position: 0,
            max_step_position: 15,
            buffer_position: 0,
            step_position: 0,
            marked_position: None,
            next_step_at: 0.0,
        };
        timeline.beat_subdivision = (timeline.steps_per_bar / beat_amount.max(1)).max(1);
        timeline.recalculate();
        timeline.max_step_position = timeline.steps_per_bar - 1;
        timeline
    }

    /// Recompute the derived sample counts from the current tempo and
    /// signature, and the loop end from the bar count.
    fn recalculate(&mut self) {
        let samples_per_bar =
            ((f64::from(self.sample_rate) * 60.0) / self.tempo) * f64::from(self.beat_amount);
        self.samples_per_beat = (samples_per_bar / f64::from(self.beat_amount)) as usize;
        self.samples_per_step = self.samples_per_beat as f64 / f64::from(self.beat_subdivision);
        self.samples_per_bar = (self.samples_per_step
            * f64::from(self.beat_subdivision)
            * f64::from(self.beat_amount)) as usize;
        self.max_buffer_position =
            (self.samples_per_bar * self.amount_of_bars as usize).saturating_sub(1);
    }

    /// Queue a tempo / time-signature change to be latched at the end of
    /// the current render iteration.
    pub fn queue_tempo(&mut self, tempo: f64, beat_amount: u32, beat_unit: u32) {
        self.queued_tempo = tempo;
        self.queued_beat_amount = beat_amount;
        self.queued_beat_unit = beat_unit;
    }

    /// Whether a queued tempo or signature differs from the active one.
    pub fn has_queued_update(&self) -> bool {
        self.queued_tempo != self.tempo
            || self.queued_beat_amount != self.beat_amount
            || self.queued_beat_unit != self.beat_unit
    }

    /// Adopt the queued tempo and signature, preserving the playhead's
    /// relative position within the loop. Returns the previous tempo so
    /// callers can rescale event positions.
    pub fn apply_queued_tempo(&mut self) -> f64 {
        let old_tempo = self.tempo;
        let old_position = if self.max_buffer_position > 0 {
            self.buffer_position as f64 / self.max_buffer_position as f64
        } else {
            0.0
        };

        self.tempo = self.queued_tempo;
        self.beat_amount = self.queued_beat_amount;
        self.beat_unit = self.queued_beat_unit;
        self.beat_subdivision = (self.steps_per_bar / self.beat_amount.max(1)).max(1);

        self.recalculate();

        // keep the relative playhead position in sync with the new ranges
        self.buffer_position = (self.max_buffer_position as f64 * old_position).round() as usize;
        self.resync_step_accumulator();

        debug!(
            "tempo updated {old_tempo} -> {} ({} samples per bar)",
            self.tempo, self.samples_per_bar
        );
        old_tempo
    }

    /// Loop between two frame offsets. `steps_per_bar` selects the step
    /// grid used for position notifications within the range.
    pub fn set_loop_range(&mut self, start: usize, end: usize, steps_per_bar: u32) {
        self.min_buffer_position = start;
        self.max_buffer_position = end;

        if self.buffer_position < self.min_buffer_position
            || self.buffer_position > self.max_buffer_position
        {
            self.buffer_position = self.min_buffer_position;
        }

        let bar = self.samples_per_bar.max(1) as f64;
        self.min_step_position = ((start as f64 / bar) * f64::from(steps_per_bar)).round() as u32;
        self.max_step_position =
            (((end as f64 / bar) * f64::from(steps_per_bar)) - 1.0).max(0.0).round() as u32;

        if self.step_position < self.min_step_position
            || self.step_position > self.max_step_position
        {
            self.step_position = self.min_step_position;
        }
        self.update_steps_per_bar(steps_per_bar);
        self.resync_step_accumulator();
    }

    /// Change the measure count (and optionally the step grid).
    pub fn update_measures(&mut self, amount_of_bars: u32, steps_per_bar: u32) {
        let steps_per_bar = steps_per_bar.max(1);
        self.amount_of_bars = amount_of_bars.max(1);
        self.max_step_position = steps_per_bar * self.amount_of_bars - 1;
        self.max_buffer_position =
            self.samples_per_bar * self.amount_of_bars as usize - 1;
        self.update_steps_per_bar(steps_per_bar);
    }

    fn update_steps_per_bar(&mut self, steps_per_bar: u32) {
        self.steps_per_bar = steps_per_bar.max(1);
        self.beat_subdivision = (self.steps_per_bar / self.beat_amount.max(1)).max(1);
        self.samples_per_step = self.samples_per_beat as f64 / f64::from(self.beat_subdivision);
    }

    /// Move the playhead, clamped into the loop range.
    pub fn set_buffer_position(&mut self, position: usize) {
        self.buffer_position = position.clamp(self.min_buffer_position, self.max_buffer_position);
        self.step_position = ((self.buffer_position as f64 / self.samples_per_step.max(1.0))
            .floor() as u32)
            .clamp(self.min_step_position, self.max_step_position);
        self.resync_step_accumulator();
    }

    /// Place (or with `None` remove) the notification marker.
    pub fn set_marker(&mut self, position: Option<usize>) {
        self.marked_position = position;
    }

    /// Re-anchor the fractional step accumulator to the next step boundary
    /// at or after the current playhead.
    fn resync_step_accumulator(&mut self) {
        let step = self.samples_per_step.max(1.0);
        self.next_step_at = (self.buffer_position as f64 / step).ceil() * step;
    }

    /// Advance the playhead by one frame, reporting step boundaries,
    /// marker hits and loop wraps. Checks are evaluated at the position
    /// before the increment, mirroring when the frame actually sounds.
    pub fn advance_frame(&mut self) -> FrameEvents {
        let mut events = FrameEvents::default();
        let position = self.buffer_position as f64;

        if position >= self.next_step_at {
            events.step = true;
            self.step_position = (position / self.samples_per_step.max(1.0)).floor() as u32;
            if self.step_position > self.max_step_position {
                self.step_position = self.min_step_position;
            }
            self.next_step_at += self.samples_per_step;
        }

        if self.marked_position == Some(self.buffer_position) {
            events.marker = true;
        }

        self.buffer_position += 1;
        if self.buffer_position > self.max_buffer_position {
            self.buffer_position = self.min_buffer_position;
            self.next_step_at = self.min_buffer_position as f64;
            events.wrapped = true;
        }
        events
    }

    /// Current tempo in BPM.
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Active time signature as (beat amount, beat unit).
    pub fn time_signature(&self) -> (u32, u32) {
        (self.beat_amount, self.beat_unit)
    }

    /// The playhead in sample frames.
    pub fn buffer_position(&self) -> usize {
        self.buffer_position
    }

    /// The playhead's step index.
    pub fn step_position(&self) -> u32 {
        self.step_position
    }

    /// Frames per beat.
    pub fn samples_per_beat(&self) -> usize {
        self.samples_per_beat
    }

    /// Frames per step (fractional).
    pub fn samples_per_step(&self) -> f64 {
        self.samples_per_step
    }

    /// Frames per bar.
    pub fn samples_per_bar(&self) -> usize {
        self.samples_per_bar
    }

    /// Loop start frame (inclusive).
    pub fn min_buffer_position(&self) -> usize {
        self.min_buffer_position
    }

    /// Loop end frame (inclusive).
    pub fn max_buffer_position(&self) -> usize {
        self.max_buffer_position
    }

    /// Steps per bar of the current grid.
    pub fn steps_per_bar(&self) -> u32 {
        self.steps_per_bar
    }

    /// Number of bars in the sequence.
    pub fn amount_of_bars(&self) -> u32 {
        self.amount_of_bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline_120() -> Timeline {
        Timeline::new(44100, 120.0, 4, 4)
    }

    #[test]
    fn test_derived_sample_counts() {
        let timeline = timeline_120();
        // 120 BPM at 44.1 kHz: 22050 samples per beat, 88200 per 4/4 bar
        assert_eq!(timeline.samples_per_beat(), 22050);
        assert_eq!(timeline.samples_per_bar(), 88200);
        assert_eq!(timeline.max_buffer_position(), 88199);
        assert!((timeline.samples_per_step() - 5512.5).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_round_trip_restores_ranges() {
        let mut timeline = timeline_120();
        let bar = timeline.samples_per_bar();
        let step = timeline.samples_per_step();
        let max = timeline.max_buffer_position();

        timeline.queue_tempo(140.0, 3, 4);
        timeline.apply_queued_tempo();
        timeline.queue_tempo(120.0, 4, 4);
        timeline.apply_queued_tempo();

        assert_eq!(timeline.samples_per_bar(), bar);
        assert_eq!(timeline.max_buffer_position(), max);
        assert!((timeline.samples_per_step() - step).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_change_preserves_relative_position() {
        let mut timeline = timeline_120();
        timeline.set_buffer_position(timeline.max_buffer_position() / 2);

        timeline.queue_tempo(60.0, 4, 4);
        timeline.apply_queued_tempo();

        let ratio = timeline.buffer_position() as f64 / timeline.max_buffer_position() as f64;
        assert!((ratio - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_playhead_wraps_at_loop_end() {
        let mut timeline = timeline_120();
        timeline.set_buffer_position(timeline.max_buffer_position());

        let events = timeline.advance_frame();
        assert!(events.wrapped);
        assert_eq!(timeline.buffer_position(), 0);
    }

    #[test]
    fn test_one_step_notification_per_step() {
        let mut timeline = timeline_120();
        let frames_per_bar = timeline.samples_per_bar();

        let mut steps = 0;
        for _ in 0..frames_per_bar {
            if timeline.advance_frame().step {
                steps += 1;
            }
        }
        // sixteen steps per bar, despite the fractional step size
        assert_eq!(steps, 16);
    }

    #[test]
    fn test_marker_fires_at_exact_frame() {
        let mut timeline = timeline_120();
        timeline.set_marker(Some(3));

        let mut hits = 0;
        for expect in [false, false, false, true, false] {
            let events = timeline.advance_frame();
            assert_eq!(events.marker, expect);
            if events.marker {
                hits += 1;
            }
        }
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_set_buffer_position_clamps_to_loop() {
        let mut timeline = timeline_120();
        timeline.set_loop_range(100, 1000, 16);

        timeline.set_buffer_position(5);
        assert_eq!(timeline.buffer_position(), 100);

        timeline.set_buffer_position(5000);
        assert_eq!(timeline.buffer_position(), 1000);
    }

    #[test]
    fn test_update_measures_extends_loop() {
        let mut timeline = timeline_120();
        let bar = timeline.samples_per_bar();

        timeline.update_measures(4, 16);
        assert_eq!(timeline.max_buffer_position(), bar * 4 - 1);
        assert_eq!(timeline.amount_of_bars(), 4);
    }
}
