//! One-pole low-pass / high-pass filter.

use ritmo_core::{AudioBuffer, Processor, Sample};

/// Filter response selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Attenuate content above the cutoff.
    LowPass,
    /// Attenuate content below the cutoff.
    HighPass,
}

/// First-order IIR filter with per-channel history.
///
/// Uses the bilinear-transform one-pole coefficients:
/// `y[n] = a0 * x[n] + a1 * x[n-1] + b1 * y[n-1]`. Cheap enough to run on
/// every channel every cycle; time-invariant, so cacheable.
#[derive(Debug, Clone)]
pub struct OnePoleFilter {
    mode: FilterMode,
    cutoff: f64,
    sample_rate: f64,
    a0: Sample,
    a1: Sample,
    b1: Sample,
    in_history: Vec<Sample>,
    out_history: Vec<Sample>,
}

impl OnePoleFilter {
    /// Create a filter for buffers of up to `amount_of_channels` channels.
    pub fn new(mode: FilterMode, cutoff: f64, sample_rate: u32, amount_of_channels: usize) -> Self {
        let mut filter = Self {
            mode,
            cutoff,
            sample_rate: f64::from(sample_rate),
            a0: 0.0,
            a1: 0.0,
            b1: 0.0,
            in_history: vec![0.0; amount_of_channels.max(1)],
            out_history: vec![0.0; amount_of_channels.max(1)],
        };
        filter.calculate_coefficients();
        filter
    }

    /// Cutoff frequency in Hz.
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Set the cutoff frequency, clamped to `(0, nyquist)`.
    pub fn set_cutoff(&mut self, cutoff: f64) {
        self.cutoff = cutoff.clamp(1.0, self.sample_rate / 2.0);
        self.calculate_coefficients();
    }

    fn calculate_coefficients(&mut self) {
        let warped = 2.0 * self.sample_rate;
        let wc = self.cutoff * std::f64::consts::TAU;
        let norm = 1.0 / (wc + warped);

        match self.mode {
            FilterMode::LowPass => {
                self.a0 = (wc * norm) as Sample;
                self.a1 = self.a0;
            }
            FilterMode::HighPass => {
                self.a0 = (warped * norm) as Sample;
                self.a1 = -self.a0;
            }
        }
        self.b1 = ((warped - wc) * norm) as Sample;
    }
}

impl Processor for OnePoleFilter {
    fn process(&mut self, buffer: &mut AudioBuffer, is_mono_source: bool) {
        let buffer_size = buffer.buffer_size();
        let channels = buffer.amount_of_channels().min(self.in_history.len());

        for c in 0..channels {
            let channel_buffer = buffer.channel_mut(c);

            for i in 0..buffer_size {
                let sample = channel_buffer[i];
                channel_buffer[i] =
                    sample * self.a0 + self.in_history[c] * self.a1 + self.out_history[c] * self.b1;
                self.in_history[c] = sample;
                self.out_history[c] = channel_buffer[i];
            }

            if is_mono_source {
                buffer.apply_mono_source();
                break;
            }
        }
    }

    fn is_cacheable(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.in_history.fill(0.0);
        self.out_history.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_tone(filter: &mut OnePoleFilter, frequency: f64, sample_rate: f64) -> Sample {
        let frames = 4096;
        let mut buffer = AudioBuffer::new(1, frames);
        for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
            *s = ((i as f64) * frequency * std::f64::consts::TAU / sample_rate).sin() as Sample;
        }
        filter.process(&mut buffer, false);
        // measure the settled half of the buffer
        buffer.channel(0)[frames / 2..]
            .iter()
            .fold(0.0, |acc: Sample, s| acc.max(s.abs()))
    }

    #[test]
    fn test_lowpass_attenuates_high_frequencies() {
        let mut filter = OnePoleFilter::new(FilterMode::LowPass, 500.0, 44100, 1);
        let low = render_tone(&mut filter, 100.0, 44100.0);
        filter.reset();
        let high = render_tone(&mut filter, 8000.0, 44100.0);

        assert!(low > 0.9, "passband should be mostly untouched, got {low}");
        assert!(high < 0.2, "stopband should be attenuated, got {high}");
    }

    #[test]
    fn test_highpass_attenuates_low_frequencies() {
        let mut filter = OnePoleFilter::new(FilterMode::HighPass, 2000.0, 44100, 1);
        let low = render_tone(&mut filter, 100.0, 44100.0);
        filter.reset();
        let high = render_tone(&mut filter, 8000.0, 44100.0);

        assert!(high > 0.8, "passband should be mostly untouched, got {high}");
        assert!(low < 0.2, "stopband should be attenuated, got {low}");
    }

    #[test]
    fn test_reset_clears_history() {
        let mut filter = OnePoleFilter::new(FilterMode::LowPass, 500.0, 44100, 1);
        let mut buffer = AudioBuffer::new(1, 64);
        buffer.channel_mut(0).fill(1.0);
        filter.process(&mut buffer, false);

        filter.reset();
        assert!(filter.in_history.iter().all(|&s| s == 0.0));
        assert!(filter.out_history.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_cutoff_clamped_to_nyquist() {
        let mut filter = OnePoleFilter::new(FilterMode::LowPass, 500.0, 44100, 1);
        filter.set_cutoff(100_000.0);
        assert!(filter.cutoff() <= 22050.0);
    }
}
