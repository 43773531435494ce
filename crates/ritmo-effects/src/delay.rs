//! Feedback delay line.

use ritmo_core::{AudioBuffer, Processor, Sample};

/// Circular-buffer delay with feedback and dry/wet mix.
///
/// Each channel keeps its own write index into a shared delay buffer sized
/// for `max_delay_ms`. High feedback settings are tamed by scaling the wet
/// signal down once feedback exceeds 0.5.
///
/// Not cacheable: the delay tail depends on everything that came before,
/// so freezing one loop pass of output would freeze the tail with it.
pub struct Delay {
    time: usize,
    max_time: usize,
    mix: Sample,
    feedback: Sample,
    sample_rate: u32,
    delay_buffer: AudioBuffer,
    delay_indices: Vec<usize>,
}

impl Delay {
    /// Create a delay line.
    ///
    /// `delay_ms` is the time between repeats, `max_delay_ms` the largest
    /// delay time the internal buffer must accommodate, `mix` the wet
    /// amount (`0..=1`) and `feedback` the repeat amount (`0..=1`).
    pub fn new(
        delay_ms: u32,
        max_delay_ms: u32,
        mix: Sample,
        feedback: Sample,
        sample_rate: u32,
        amount_of_channels: usize,
    ) -> Self {
        let max_time = ms_to_samples(max_delay_ms.max(delay_ms).max(1), sample_rate);
        Self {
            time: ms_to_samples(delay_ms.max(1), sample_rate),
            max_time,
            mix: mix.clamp(0.0, 1.0),
            feedback: feedback.clamp(0.0, 1.0),
            sample_rate,
            delay_buffer: AudioBuffer::new(amount_of_channels.max(1), max_time),
            delay_indices: vec![0; amount_of_channels.max(1)],
        }
    }

    /// Delay time in milliseconds.
    pub fn delay_time_ms(&self) -> u32 {
        (self.time as u64 * 1000 / u64::from(self.sample_rate)) as u32
    }

    /// Set the delay time in milliseconds, bounded by the buffer size
    /// chosen at construction.
    pub fn set_delay_time_ms(&mut self, delay_ms: u32) {
        self.time = ms_to_samples(delay_ms.max(1), self.sample_rate).min(self.max_time);
    }

    /// Set the wet mix amount (`0..=1`).
    pub fn set_mix(&mut self, mix: Sample) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    /// Set the feedback amount (`0..=1`).
    pub fn set_feedback(&mut self, feedback: Sample) {
        self.feedback = feedback.clamp(0.0, 1.0);
    }
}

impl Processor for Delay {
    fn process(&mut self, buffer: &mut AudioBuffer, is_mono_source: bool) {
        let buffer_size = buffer.buffer_size();
        let channels = buffer
            .amount_of_channels()
            .min(self.delay_buffer.amount_of_channels());

        for c in 0..channels {
            let channel_buffer = buffer.channel_mut(c);
            let delay_buffer = self.delay_buffer.channel_mut(c);
            let mut delay_index = self.delay_indices[c];

            for i in 0..buffer_size {
                let read_index = (delay_index + 1) % self.time;

                // read the previously delayed sample (for feedback) and
                // write the current sample plus its feedback share
                let delay_sample = delay_buffer[read_index];
                delay_buffer[delay_index] = channel_buffer[i] + delay_sample * self.feedback;

                delay_index += 1;
                if delay_index >= self.time {
                    delay_index = 0;
                }

                // high feedback quickly piles up, scale the wet share down
                if self.feedback > 0.5 {
                    channel_buffer[i] += delay_sample * self.mix * (1.5 - self.feedback);
                } else {
                    channel_buffer[i] += delay_sample * self.mix;
                }
            }
            self.delay_indices[c] = delay_index;

            if is_mono_source {
                buffer.apply_mono_source();
                break;
            }
        }
    }

    fn reset(&mut self) {
        self.delay_buffer.silence();
        self.delay_indices.fill(0);
    }
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    ((u64::from(sample_rate) * u64::from(ms)) / 1000).max(1) as usize
}
