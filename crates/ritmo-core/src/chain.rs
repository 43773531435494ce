//! Ordered chains of effect processors.

use crate::buffer::AudioBuffer;
use crate::processor::Processor;

struct Slot {
    processor: Box<dyn Processor>,
    enabled: bool,
    bypassed: bool,
}

/// An ordered sequence of processors applied to one channel (or to the
/// master bus).
///
/// The chain exposes its active subset (enabled and not bypassed) in
/// declared order. Every structural mutation bumps a revision counter so
/// channel caches built against an older chain layout can be invalidated.
#[derive(Default)]
pub struct ProcessingChain {
    slots: Vec<Slot>,
    revision: u64,
}

impl ProcessingChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a processor, returning its index within the chain.
    pub fn add(&mut self, processor: Box<dyn Processor>) -> usize {
        self.revision += 1;
        self.slots.push(Slot {
            processor,
            enabled: true,
            bypassed: false,
        });
        self.slots.len() - 1
    }

    /// Remove all processors.
    pub fn clear(&mut self) {
        if !self.slots.is_empty() {
            self.revision += 1;
        }
        self.slots.clear();
    }

    /// Enable or disable the processor at `index`.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.enabled != enabled {
                slot.enabled = enabled;
                self.revision += 1;
            }
        }
    }

    /// Bypass or un-bypass the processor at `index` (kept in the chain but
    /// excluded from the active subset).
    pub fn set_bypassed(&mut self, index: usize, bypassed: bool) {
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.bypassed != bypassed {
                slot.bypassed = bypassed;
                self.revision += 1;
            }
        }
    }

    /// Total number of processors, active or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the chain holds no processors at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of processors in the active subset.
    pub fn active_len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.enabled && !s.bypassed)
            .count()
    }

    /// Iterate the active processors in declared order.
    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut (dyn Processor + 'static)> {
        self.slots
            .iter_mut()
            .filter(|s| s.enabled && !s.bypassed)
            .map(|s| s.processor.as_mut())
    }

    /// Run the whole active subset over `buffer` in order.
    pub fn process(&mut self, buffer: &mut AudioBuffer, is_mono_source: bool) {
        for processor in self.active_mut() {
            processor.process(buffer, is_mono_source);
        }
    }

    /// Reset the internal state of every processor.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.processor.reset();
        }
    }

    /// Structural revision, bumped on every add / clear / enable / bypass.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
