//! The effect processor contract.

use crate::buffer::AudioBuffer;

/// An audio processor applied in-place to a channel (or master) buffer.
///
/// Processors run on the render thread: implementations must not allocate,
/// block or perform I/O inside [`process`](Processor::process).
pub trait Processor: Send {
    /// Process `buffer` in place. When `is_mono_source` is set the caller
    /// guarantees all channels carry identical content, so implementations
    /// may process channel 0 only and fan it out via
    /// [`AudioBuffer::apply_mono_source`].
    fn process(&mut self, buffer: &mut AudioBuffer, is_mono_source: bool);

    /// Whether this processor's output may be captured into a channel
    /// cache. Time-invariant processors (gain, static filters) return
    /// `true`; anything whose output depends on position or time (delays,
    /// modulated effects) must return `false`.
    fn is_cacheable(&self) -> bool {
        false
    }

    /// Clear internal state (delay lines, filter history) without touching
    /// parameters.
    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inverter;

    impl Processor for Inverter {
        fn process(&mut self, buffer: &mut AudioBuffer, _is_mono_source: bool) {
            buffer.adjust_volumes(-1.0);
        }
    }

    #[test]
    fn test_object_safety() {
        let mut processor: Box<dyn Processor> = Box::new(Inverter);
        let mut buffer = AudioBuffer::new(1, 4);
        buffer.channel_mut(0).fill(0.5);
        processor.process(&mut buffer, false);
        assert!(buffer.channel(0).iter().all(|&s| s == -0.5));
        assert!(!processor.is_cacheable());
    }
}
