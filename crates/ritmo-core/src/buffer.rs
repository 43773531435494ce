//! Multi-channel sample buffer.

use crate::Sample;

/// A block of normalized floating-point audio, one `Vec<Sample>` per channel.
///
/// All channels share a single frame count fixed at construction. The buffer
/// owns its sample storage exclusively; [`Clone`] produces an independent
/// deep copy (including the `loopable` flag).
///
/// The `loopable` flag does not change storage, it only affects how
/// [`merge_from`](AudioBuffer::merge_from) wraps the read pointer when a
/// consumer reads past the end of this buffer's source.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    channels: Vec<Vec<Sample>>,
    buffer_size: usize,
    /// Whether consumers reading from this buffer wrap around to the start
    /// once the read pointer reaches `buffer_size`.
    pub loopable: bool,
}

impl AudioBuffer {
    /// Create a silent buffer of `amount_of_channels` channels holding
    /// `buffer_size` frames each.
    ///
    /// # Panics
    /// Panics when either dimension is zero.
    pub fn new(amount_of_channels: usize, buffer_size: usize) -> Self {
        assert!(amount_of_channels >= 1, "buffers hold at least one channel");
        assert!(buffer_size >= 1, "buffers hold at least one frame");
        Self {
            channels: vec![vec![0.0; buffer_size]; amount_of_channels],
            buffer_size,
            loopable: false,
        }
    }

    /// Number of channels.
    pub fn amount_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames per channel.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Samples of a single channel.
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index]
    }

    /// Mutable samples of a single channel.
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        &mut self.channels[index]
    }

    /// Zero all samples in all channels.
    pub fn silence(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Multiply every sample by `amp`.
    pub fn adjust_volumes(&mut self, amp: Sample) {
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample *= amp;
            }
        }
    }

    /// Copy channel 0 verbatim onto every other channel.
    pub fn apply_mono_source(&mut self) {
        if self.channels.len() < 2 {
            return;
        }
        let (mono, rest) = self.channels.split_first_mut().expect("channel count >= 1");
        for channel in rest {
            channel.copy_from_slice(mono);
        }
    }

    /// Additively mix `source` into this buffer.
    ///
    /// For each of `min(self, source)` channels, `source[read_offset + k] *
    /// mix_volume` is added into `self[write_offset + k]` for as many frames
    /// as fit before either buffer is exhausted. When the read pointer
    /// reaches the end of `source` and `self.loopable` is set, the read
    /// pointer wraps to 0 and mixing continues; otherwise that channel stops.
    ///
    /// Returns the total number of samples written, counting each channel
    /// once per frame (i.e. `frames * channels` for a full mix).
    pub fn merge_from(
        &mut self,
        source: &AudioBuffer,
        read_offset: usize,
        write_offset: usize,
        mix_volume: Sample,
    ) -> usize {
        if write_offset >= self.buffer_size {
            return 0;
        }
        let source_length = source.buffer_size;
        let write_length = source_length.min(self.buffer_size - write_offset);
        let channel_amount = self.channels.len().min(source.channels.len());

        let mut written_samples = 0;

        for c in 0..channel_amount {
            let source_buffer = source.channel(c);
            let target_buffer = &mut self.channels[c];

            let mut read = read_offset;
            for target in &mut target_buffer[write_offset..write_offset + write_length] {
                if read >= source_length {
                    if self.loopable {
                        read = 0;
                    } else {
                        break;
                    }
                }
                *target += source_buffer[read] * mix_volume;
                read += 1;
                written_samples += 1;
            }
        }
        written_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn max_abs(buffer: &AudioBuffer) -> Sample {
        (0..buffer.amount_of_channels())
            .flat_map(|c| buffer.channel(c).iter())
            .fold(0.0, |acc: Sample, s| acc.max(s.abs()))
    }

    #[test]
    fn test_silence() {
        let mut buffer = AudioBuffer::new(2, 16);
        buffer.channel_mut(0).fill(0.5);
        buffer.channel_mut(1).fill(-0.25);

        buffer.silence();
        assert_eq!(max_abs(&buffer), 0.0);
    }

    #[test]
    fn test_adjust_volumes() {
        let mut buffer = AudioBuffer::new(1, 8);
        buffer.channel_mut(0).fill(0.5);

        buffer.adjust_volumes(0.5);
        for &sample in buffer.channel(0) {
            assert!((sample - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn test_apply_mono_source() {
        let mut buffer = AudioBuffer::new(3, 4);
        for (i, sample) in buffer.channel_mut(0).iter_mut().enumerate() {
            *sample = i as Sample;
        }
        buffer.apply_mono_source();

        for c in 1..3 {
            assert_eq!(buffer.channel(c), buffer.channel(0).to_vec().as_slice());
        }
    }

    #[test]
    fn test_clone_is_deep() {
        let mut original = AudioBuffer::new(2, 4);
        original.loopable = true;
        original.channel_mut(0).fill(0.75);

        let mut copy = original.clone();
        assert_eq!(copy.amount_of_channels(), 2);
        assert_eq!(copy.buffer_size(), 4);
        assert!(copy.loopable);
        assert_eq!(copy.channel(0), original.channel(0));

        // mutating the copy must not touch the original
        copy.channel_mut(0).fill(0.0);
        assert_eq!(original.channel(0)[0], 0.75);
    }

    #[test]
    fn test_merge_adds_with_volume() {
        let mut target = AudioBuffer::new(1, 8);
        let mut source = AudioBuffer::new(1, 8);
        source.channel_mut(0).fill(1.0);

        let written = target.merge_from(&source, 0, 0, 0.5);
        assert_eq!(written, 8);
        for &sample in target.channel(0) {
            assert!((sample - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_merge_respects_offsets() {
        let mut target = AudioBuffer::new(1, 8);
        let mut source = AudioBuffer::new(1, 4);
        for (i, sample) in source.channel_mut(0).iter_mut().enumerate() {
            *sample = (i + 1) as Sample;
        }

        // read from source index 2, write at target index 5
        let written = target.merge_from(&source, 2, 5, 1.0);
        assert_eq!(written, 2);
        assert_eq!(target.channel(0)[5], 3.0);
        assert_eq!(target.channel(0)[6], 4.0);
        assert_eq!(target.channel(0)[7], 0.0);
    }

    #[test]
    fn test_merge_wraps_when_loopable() {
        let mut target = AudioBuffer::new(1, 6);
        target.loopable = true;
        let mut source = AudioBuffer::new(1, 3);
        for (i, sample) in source.channel_mut(0).iter_mut().enumerate() {
            *sample = (i + 1) as Sample;
        }

        let written = target.merge_from(&source, 0, 0, 1.0);
        assert_eq!(written, 6);
        assert_eq!(target.channel(0), &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_merge_stops_when_not_loopable() {
        let mut target = AudioBuffer::new(1, 6);
        let mut source = AudioBuffer::new(1, 3);
        source.channel_mut(0).fill(1.0);

        let written = target.merge_from(&source, 0, 0, 1.0);
        assert_eq!(written, 3);
        assert_eq!(target.channel(0)[2], 1.0);
        assert_eq!(target.channel(0)[3], 0.0);
    }

    #[test]
    fn test_merge_channel_mismatch_uses_minimum() {
        let mut target = AudioBuffer::new(2, 4);
        let mut source = AudioBuffer::new(1, 4);
        source.channel_mut(0).fill(1.0);

        target.merge_from(&source, 0, 0, 1.0);
        assert_eq!(target.channel(0)[0], 1.0);
        assert_eq!(target.channel(1)[0], 0.0);
    }

    #[test]
    fn test_merge_with_zero_volume_is_noop() {
        let mut target = AudioBuffer::new(1, 4);
        let mut source = AudioBuffer::new(1, 4);
        source.channel_mut(0).fill(1.0);

        target.merge_from(&source, 0, 0, 0.0);
        assert_eq!(max_abs(&target), 0.0);
    }

    proptest! {
        #[test]
        fn prop_gain_scales_max_abs(amp in 0.0f32..4.0, samples in proptest::collection::vec(-1.0f32..1.0, 1..64)) {
            let mut buffer = AudioBuffer::new(1, samples.len());
            for (slot, value) in buffer.channel_mut(0).iter_mut().zip(samples.iter()) {
                *slot = *value as Sample;
            }
            let before = max_abs(&buffer);
            buffer.adjust_volumes(amp as Sample);
            let after = max_abs(&buffer);
            prop_assert!((after - before * amp as Sample).abs() < 1e-4);
        }

        #[test]
        fn prop_merge_into_silence_matches_source(volume in 0.01f32..1.0, samples in proptest::collection::vec(-1.0f32..1.0, 1..64)) {
            let mut source = AudioBuffer::new(1, samples.len());
            for (slot, value) in source.channel_mut(0).iter_mut().zip(samples.iter()) {
                *slot = *value as Sample;
            }
            let mut target = AudioBuffer::new(1, samples.len());
            target.merge_from(&source, 0, 0, volume as Sample);
            prop_assert!((max_abs(&target) - max_abs(&source) * volume as Sample).abs() < 1e-4);
        }
    }
}
