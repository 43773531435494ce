//! Bit-depth reduction.

use ritmo_core::{AudioBuffer, Processor, Sample};

/// Quantizes samples to a reduced bit depth for lo-fi grit.
///
/// The amount parameter sweeps the resolution from 16 bits (transparent)
/// down to 1 bit. Quantization happens in the float domain; at very low
/// resolutions the output level is automatically pulled down to keep the
/// stairstepped signal from overwhelming the mix.
#[derive(Debug, Clone)]
pub struct BitCrusher {
    amount: Sample,
    level: Sample,
    bits: u32,
    level_correction: Sample,
}

impl BitCrusher {
    /// Create a bitcrusher. `amount` (`0..=1`) sweeps from transparent to
    /// single-bit; `level` (`0..=1`) trims the output.
    pub fn new(amount: Sample, level: Sample) -> Self {
        let mut crusher = Self {
            amount: 0.0,
            level: level.clamp(0.0, 1.0),
            bits: 16,
            level_correction: 1.0,
        };
        crusher.set_amount(amount);
        crusher
    }

    /// Crush amount (`0..=1`).
    pub fn amount(&self) -> Sample {
        self.amount
    }

    /// Set the crush amount, scaling to the 1..=16 bit range.
    pub fn set_amount(&mut self, amount: Sample) {
        self.amount = amount.clamp(0.0, 1.0);
        self.bits = 16 - (self.amount * 15.0) as u32;
        self.set_level(self.level);
    }

    /// Output level (`0..=1`).
    pub fn level(&self) -> Sample {
        self.level
    }

    /// Set the output level. Single-bit output is additionally attenuated
    /// to keep it from going through the ceiling.
    pub fn set_level(&mut self, level: Sample) {
        self.level = level.clamp(0.0, 1.0);
        self.level_correction = if self.bits < 2 {
            self.level * 0.35
        } else {
            self.level
        };
    }
}

impl Processor for BitCrusher {
    fn process(&mut self, buffer: &mut AudioBuffer, is_mono_source: bool) {
        // 2^(bits-1) quantization steps per polarity
        let steps = (1u32 << (self.bits - 1)).max(1) as Sample;
        let channels = buffer.amount_of_channels();

        for c in 0..channels {
            for sample in buffer.channel_mut(c).iter_mut() {
                let quantized = (*sample * steps).floor() / steps;
                *sample = quantized * self.level_correction;
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_at_zero_amount() {
        let mut crusher = BitCrusher::new(0.0, 1.0);
        let mut buffer = AudioBuffer::new(1, 64);
        for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
            *s = (i as Sample) / 64.0;
        }
        let original = buffer.channel(0).to_vec();

        crusher.process(&mut buffer, false);
        for (a, b) in original.iter().zip(buffer.channel(0).iter()) {
            // 16-bit quantization error is inaudible
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_full_amount_reduces_resolution() {
        let mut crusher = BitCrusher::new(1.0, 1.0);
        let mut buffer = AudioBuffer::new(1, 64);
        for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
            *s = (i as Sample) / 64.0;
        }

        crusher.process(&mut buffer, false);
        let distinct: std::collections::BTreeSet<i64> = buffer
            .channel(0)
            .iter()
            .map(|s| (s * 1_000_000.0) as i64)
            .collect();
        assert!(
            distinct.len() <= 3,
            "single-bit audio holds at most a few levels, got {}",
            distinct.len()
        );
    }

    #[test]
    fn test_level_correction_at_low_bits() {
        let crusher = BitCrusher::new(1.0, 1.0);
        assert!(crusher.level_correction < 1.0);
    }

    #[test]
    fn test_is_cacheable() {
        assert!(BitCrusher::new(0.5, 1.0).is_cacheable());
    }
}
