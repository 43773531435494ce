//! Static amplitude scaling.

use ritmo_core::{AudioBuffer, Processor, Sample};

/// Multiplies every sample by a fixed linear factor.
///
/// The most basic processor in the set, mostly useful for trimming a
/// channel before further processing. Time-invariant, so its output may be
/// cached.
#[derive(Debug, Clone)]
pub struct Gain {
    amount: Sample,
}

impl Gain {
    /// Create a gain stage with the given linear factor.
    pub fn new(amount: Sample) -> Self {
        Self {
            amount: amount.clamp(0.0, 4.0),
        }
    }

    /// Current linear gain factor.
    pub fn amount(&self) -> Sample {
        self.amount
    }

    /// Set the linear gain factor. Clamped to `0..=4` (+12 dB).
    pub fn set_amount(&mut self, amount: Sample) {
        self.amount = amount.clamp(0.0, 4.0);
    }
}

impl Processor for Gain {
    fn process(&mut self, buffer: &mut AudioBuffer, _is_mono_source: bool) {
        buffer.adjust_volumes(self.amount);
    }

    fn is_cacheable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales_samples() {
        let mut gain = Gain::new(0.5);
        let mut buffer = AudioBuffer::new(2, 4);
        buffer.channel_mut(0).fill(1.0);
        buffer.channel_mut(1).fill(-1.0);

        gain.process(&mut buffer, false);
        assert!(buffer.channel(0).iter().all(|&s| s == 0.5));
        assert!(buffer.channel(1).iter().all(|&s| s == -0.5));
    }

    #[test]
    fn test_amount_is_clamped() {
        let gain = Gain::new(100.0);
        assert_eq!(gain.amount(), 4.0);
    }

    #[test]
    fn test_is_cacheable() {
        assert!(Gain::new(1.0).is_cacheable());
    }
}
