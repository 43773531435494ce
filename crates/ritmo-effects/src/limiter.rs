//! Envelope-follower limiter.

use ritmo_core::{AudioBuffer, Processor, Sample};

/// Per-channel amplitude envelope with independent attack / release
/// ballistics.
#[derive(Debug, Clone)]
struct EnvelopeFollower {
    attack_coeff: Sample,
    release_coeff: Sample,
    envelope: Sample,
}

impl EnvelopeFollower {
    fn new(attack_ms: f64, release_ms: f64, sample_rate: u32) -> Self {
        Self {
            attack_coeff: ballistics_coeff(attack_ms, sample_rate),
            release_coeff: ballistics_coeff(release_ms, sample_rate),
            envelope: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, sample: Sample) -> Sample {
        let magnitude = sample.abs();
        let coeff = if magnitude > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * (self.envelope - magnitude) + magnitude;
        self.envelope
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// `coeff = 0.01^(1 / (time_ms * sample_rate / 1000))`: the classic
/// -40 dB-in-`time_ms` envelope constant.
fn ballistics_coeff(time_ms: f64, sample_rate: u32) -> Sample {
    let samples = (time_ms * f64::from(sample_rate) / 1000.0).max(1.0);
    (0.01f64.powf(1.0 / samples)) as Sample
}

/// Keeps peaks below a ceiling by dividing the signal through its own
/// envelope whenever the envelope exceeds the ceiling.
///
/// Attack around 10 ms with a 500 ms release works well for general use.
/// The division approach means gain reduction is proportional to overshoot,
/// so the limiter is transparent until driven. Time-invariant for a given
/// input, so its output may be cached.
#[derive(Debug, Clone)]
pub struct Limiter {
    ceiling: Sample,
    followers: Vec<EnvelopeFollower>,
}

impl Limiter {
    /// Create a limiter for buffers of up to `amount_of_channels` channels.
    pub fn new(
        attack_ms: f64,
        release_ms: f64,
        sample_rate: u32,
        amount_of_channels: usize,
    ) -> Self {
        Self {
            ceiling: 0.85,
            followers: vec![
                EnvelopeFollower::new(attack_ms, release_ms, sample_rate);
                amount_of_channels.max(1)
            ],
        }
    }

    /// The ceiling above which gain reduction engages (linear).
    pub fn ceiling(&self) -> Sample {
        self.ceiling
    }

    /// Set the ceiling (linear, clamped to `0.05..=1`).
    pub fn set_ceiling(&mut self, ceiling: Sample) {
        self.ceiling = ceiling.clamp(0.05, 1.0);
    }

    /// Current gain reduction on channel 0 as a linear factor (1.0 = none).
    pub fn linear_gain_reduction(&self) -> Sample {
        let envelope = self.followers[0].envelope;
        if envelope > 1.0 { 1.0 / envelope } else { 1.0 }
    }
}

impl Processor for Limiter {
    fn process(&mut self, buffer: &mut AudioBuffer, is_mono_source: bool) {
        let channels = buffer.amount_of_channels().min(self.followers.len());

        for c in 0..channels {
            let channel_buffer = buffer.channel_mut(c);
            let follower = &mut self.followers[c];

            for sample in channel_buffer.iter_mut() {
                let envelope = follower.process(*sample);
                if envelope > self.ceiling {
                    *sample /= envelope;
                }
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
        for follower in &mut self.followers {
            follower.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overdriven_signal_is_pulled_to_unity() {
        let mut limiter = Limiter::new(1.0, 500.0, 44100, 1);
        let mut buffer = AudioBuffer::new(1, 4096);
        buffer.channel_mut(0).fill(1.5);

        limiter.process(&mut buffer, false);
        let settled = buffer.channel(0)[2048..]
            .iter()
            .fold(0.0, |acc: Sample, s| acc.max(s.abs()));
        assert!(
            settled < 1.1,
            "sustained +3.5 dB input must settle near unity, got {settled}"
        );
    }

    #[test]
    fn test_quiet_signal_passes() {
        let mut limiter = Limiter::new(10.0, 500.0, 44100, 1);
        let mut buffer = AudioBuffer::new(1, 1024);
        buffer.channel_mut(0).fill(0.1);

        limiter.process(&mut buffer, false);
        assert!(buffer.channel(0).iter().all(|&s| (s - 0.1).abs() < 1e-6));
    }

    #[test]
    fn test_gain_reduction_reporting() {
        let mut limiter = Limiter::new(1.0, 500.0, 44100, 1);
        assert_eq!(limiter.linear_gain_reduction(), 1.0);

        let mut buffer = AudioBuffer::new(1, 4096);
        buffer.channel_mut(0).fill(1.5);
        limiter.process(&mut buffer, false);
        assert!(limiter.linear_gain_reduction() < 1.0);
    }

    #[test]
    fn test_reset_releases_envelope() {
        let mut limiter = Limiter::new(1.0, 500.0, 44100, 1);
        let mut buffer = AudioBuffer::new(1, 1024);
        buffer.channel_mut(0).fill(1.0);
        limiter.process(&mut buffer, false);

        limiter.reset();
        assert_eq!(limiter.linear_gain_reduction(), 1.0);
    }
}
