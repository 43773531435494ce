//! Stereo tremolo.

use ritmo_core::{AudioBuffer, Processor, Sample};

/// Amplitude modulation with independent rate and depth per side.
///
/// When both sides share their settings the effect is mono (both channels
/// pulse together); diverging settings give a stereo shimmer. Runs its
/// oscillator in real time, so its output depends on when it runs:
/// not cacheable.
#[derive(Debug, Clone)]
pub struct Tremolo {
    left_rate: f64,
    right_rate: f64,
    left_depth: Sample,
    right_depth: Sample,
    sample_rate: f64,
    left_phase: f64,
    right_phase: f64,
}

impl Tremolo {
    /// Create a tremolo; rates in Hz, depths in `0..=1`.
    pub fn new(
        left_rate: f64,
        left_depth: Sample,
        right_rate: f64,
        right_depth: Sample,
        sample_rate: u32,
    ) -> Self {
        Self {
            left_rate: left_rate.clamp(0.1, 20.0),
            right_rate: right_rate.clamp(0.1, 20.0),
            left_depth: left_depth.clamp(0.0, 1.0),
            right_depth: right_depth.clamp(0.0, 1.0),
            sample_rate: f64::from(sample_rate),
            left_phase: 0.0,
            right_phase: 0.0,
        }
    }

    /// Whether both sides modulate differently.
    pub fn is_stereo(&self) -> bool {
        self.left_rate != self.right_rate || self.left_depth != self.right_depth
    }

    /// Set the modulation rate of both sides (Hz).
    pub fn set_rate(&mut self, rate: f64) {
        self.left_rate = rate.clamp(0.1, 20.0);
        self.right_rate = self.left_rate;
    }

    /// Set the modulation depth of both sides (`0..=1`).
    pub fn set_depth(&mut self, depth: Sample) {
        self.left_depth = depth.clamp(0.0, 1.0);
        self.right_depth = self.left_depth;
    }
}

impl Processor for Tremolo {
    fn process(&mut self, buffer: &mut AudioBuffer, is_mono_source: bool) {
        let buffer_size = buffer.buffer_size();
        let channels = buffer.amount_of_channels().min(2);
        // when modulating both sides identically a mono source only needs
        // one pass
        let fan_out = is_mono_source && !self.is_stereo();

        for c in 0..channels {
            let (rate, depth, phase) = if c == 0 {
                (self.left_rate, self.left_depth, &mut self.left_phase)
            } else {
                (self.right_rate, self.right_depth, &mut self.right_phase)
            };
            let increment = rate / self.sample_rate;
            let channel_buffer = buffer.channel_mut(c);

            for sample in channel_buffer[..buffer_size].iter_mut() {
                let modulation =
                    0.5 + 0.5 * ((*phase * std::f64::consts::TAU).sin() as Sample);
                *sample *= 1.0 - depth * modulation;
                *phase += increment;
                if *phase >= 1.0 {
                    *phase -= 1.0;
                }
            }

            if fan_out {
                buffer.apply_mono_source();
                break;
            }
        }
    }

    fn reset(&mut self) {
        self.left_phase = 0.0;
        self.right_phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulates_amplitude_over_time() {
        let mut tremolo = Tremolo::new(5.0, 1.0, 5.0, 1.0, 1000);
        let mut buffer = AudioBuffer::new(1, 400); // two full cycles at 5 Hz
        buffer.channel_mut(0).fill(1.0);

        tremolo.process(&mut buffer, false);

        let min = buffer.channel(0).iter().fold(Sample::MAX, |a, &s| a.min(s));
        let max = buffer.channel(0).iter().fold(Sample::MIN, |a, &s| a.max(s));
        assert!(max > 0.9, "modulation must pass the signal at the trough");
        assert!(min < 0.1, "full depth must pull the signal near silence");
    }

    #[test]
    fn test_zero_depth_is_transparent() {
        let mut tremolo = Tremolo::new(5.0, 0.0, 5.0, 0.0, 1000);
        let mut buffer = AudioBuffer::new(1, 100);
        buffer.channel_mut(0).fill(0.5);

        tremolo.process(&mut buffer, false);
        assert!(buffer.channel(0).iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_stereo_detection() {
        assert!(!Tremolo::new(5.0, 0.5, 5.0, 0.5, 44100).is_stereo());
        assert!(Tremolo::new(5.0, 0.5, 7.0, 0.5, 44100).is_stereo());
    }

    #[test]
    fn test_not_cacheable() {
        assert!(!Tremolo::new(5.0, 0.5, 5.0, 0.5, 44100).is_cacheable());
    }
}
