//! Per-instrument mix bus.

use ritmo_core::{AudioBuffer, AudioEvent, ProcessingChain, Sample};
use tracing::debug;

/// One instrument's mix bus: an output buffer, an effect chain, an
/// optional pre-rendered cache, and the per-pass event lists filled by the
/// sequencer.
///
/// The event lists hold indices into the owning instrument's event
/// storage, valid only for the render pass they were collected in.
///
/// # Cache state machine
///
/// `set_caching(true, ..)` arms the cache and allocates the cache buffer.
/// While caching, the engine mirrors the channel buffer into the cache
/// (before any non-cacheable processor runs). Once the write pointer
/// reaches the cache size the cache is ready and sequenced events plus
/// cacheable processors are skipped, the cache being merged into the
/// output instead. `clear_cached_buffer()` returns to the unarmed state.
pub struct AudioChannel {
    /// Channel fader (linear). Copied from the instrument every pass.
    pub mix_volume: Sample,
    /// Muted channels are skipped during collection and rendering.
    pub muted: bool,
    /// All channels carry identical content; processors may shortcut.
    pub is_mono: bool,
    /// Nonzero gives this channel a local loop of that length, independent
    /// of the sequencer loop (drum patterns). Zero tracks the sequencer.
    pub max_buffer_position: usize,
    /// Whether any live events were collected this pass.
    pub has_live_events: bool,
    /// The channel's effect chain.
    pub processing_chain: ProcessingChain,

    sequenced: Vec<usize>,
    live: Vec<usize>,
    output_buffer: AudioBuffer,
    cached_buffer: Option<AudioBuffer>,
    can_cache: bool,
    is_caching: bool,
    has_cache: bool,
    cache_read_pointer: usize,
    cache_write_pointer: usize,
    cache_start_offset: usize,
    cache_end_offset: usize,
    chain_revision_seen: u64,
}

impl AudioChannel {
    /// Create a channel rendering into `output_channels` x `buffer_size`
    /// buffers.
    pub fn new(output_channels: usize, buffer_size: usize, mix_volume: Sample) -> Self {
        Self {
            mix_volume,
            muted: false,
            is_mono: false,
            max_buffer_position: 0,
            has_live_events: false,
            processing_chain: ProcessingChain::new(),
            sequenced: Vec::new(),
            live: Vec::new(),
            output_buffer: AudioBuffer::new(output_channels, buffer_size),
            cached_buffer: None,
            can_cache: false,
            is_caching: false,
            has_cache: false,
            cache_read_pointer: 0,
            cache_write_pointer: 0,
            cache_start_offset: 0,
            cache_end_offset: 0,
            chain_revision_seen: 0,
        }
    }

    /// Clear the per-pass event lists. Called at the start of collection.
    pub fn reset(&mut self) {
        self.sequenced.clear();
        self.live.clear();
        self.has_live_events = false;
    }

    /// Schedule a sequenced event (by index into the instrument's event
    /// list) for this pass.
    pub fn add_event(&mut self, index: usize) {
        self.sequenced.push(index);
    }

    /// Schedule a live event for this pass.
    pub fn add_live_event(&mut self, index: usize) {
        self.has_live_events = true;
        self.live.push(index);
    }

    /// Sequenced event indices collected for this pass.
    pub fn sequenced_events(&self) -> &[usize] {
        &self.sequenced
    }

    /// Live event indices collected for this pass.
    pub fn live_events(&self) -> &[usize] {
        &self.live
    }

    /// Compact stored sequenced indices after the list they point into
    /// removed the event at `removed`: all larger indices shift down by
    /// one.
    pub fn shift_sequenced_above(&mut self, removed: usize) {
        for index in &mut self.sequenced {
            if *index > removed {
                *index -= 1;
            }
        }
    }

    /// Compact stored live indices, see
    /// [`shift_sequenced_above`](Self::shift_sequenced_above).
    pub fn shift_live_above(&mut self, removed: usize) {
        for index in &mut self.live {
            if *index > removed {
                *index -= 1;
            }
        }
    }

    /// (Re)create the output buffer for the engine's current buffer size
    /// and channel count. Idempotent: an up-to-date buffer is kept.
    pub fn create_output_buffer(&mut self, output_channels: usize, buffer_size: usize) {
        if self.output_buffer.buffer_size() == buffer_size
            && self.output_buffer.amount_of_channels() == output_channels
        {
            return;
        }
        self.output_buffer = AudioBuffer::new(output_channels, buffer_size);
    }

    /// The channel's output buffer for the current pass.
    pub fn output_buffer(&self) -> &AudioBuffer {
        &self.output_buffer
    }

    /// Mutable access to the output buffer.
    pub fn output_buffer_mut(&mut self) -> &mut AudioBuffer {
        &mut self.output_buffer
    }

    /// Mix the collected sequenced events into the output buffer. Locked
    /// events are skipped for this pass.
    #[allow(clippy::too_many_arguments)]
    pub fn mix_sequenced(
        &mut self,
        events: &mut [AudioEvent],
        buffer_position: usize,
        min_buffer_position: usize,
        max_buffer_position: usize,
        loop_started: bool,
        loop_offset: usize,
        use_channel_range: bool,
    ) {
        let Self {
            sequenced,
            output_buffer,
            ..
        } = self;

        for &index in sequenced.iter() {
            let Some(event) = events.get_mut(index) else {
                continue;
            };
            if event.is_locked() {
                continue;
            }
            event.mix_into(
                output_buffer,
                buffer_position,
                min_buffer_position,
                max_buffer_position,
                loop_started,
                loop_offset,
                use_channel_range,
            );
        }
    }

    /// Whether caching has been requested for this channel.
    pub fn can_cache(&self) -> bool {
        self.can_cache
    }

    /// Whether the cache is currently being filled.
    pub fn is_caching(&self) -> bool {
        self.is_caching
    }

    /// Whether a complete cache is available.
    pub fn has_cache(&self) -> bool {
        self.has_cache
    }

    /// Arm or disarm caching.
    ///
    /// Arming allocates (or reuses) a cache of exactly `buffer_size`
    /// frames covering the sequencer range `[start_offset, end_offset]`
    /// and resets the write pointer; a previous cache of a different size
    /// is dropped. Disarming clears any cache.
    pub fn set_caching(
        &mut self,
        enabled: bool,
        buffer_size: usize,
        start_offset: usize,
        end_offset: usize,
    ) {
        if !self.can_cache {
            self.cache_write_pointer = 0;
        }
        self.can_cache = enabled;
        self.cache_start_offset = start_offset;
        self.cache_end_offset = end_offset;

        let size_changed = self
            .cached_buffer
            .as_ref()
            .is_some_and(|cache| cache.buffer_size() != buffer_size);
        if !enabled || size_changed {
            self.clear_cached_buffer();
        }

        if enabled {
            if self.cached_buffer.is_none() {
                self.cached_buffer = Some(AudioBuffer::new(
                    self.output_buffer.amount_of_channels(),
                    buffer_size,
                ));
            }
            self.is_caching = true;
            self.cache_write_pointer = 0;
        } else {
            self.is_caching = false;
        }
    }

    /// Append the channel buffer into the cache. Marks the cache ready
    /// once full. Returns whether anything was written.
    pub fn write_cache(&mut self, buffer: &AudioBuffer, read_offset: usize) -> bool {
        write_cache_parts(
            &mut self.cached_buffer,
            &mut self.is_caching,
            &mut self.has_cache,
            &mut self.cache_write_pointer,
            &mut self.cache_read_pointer,
            buffer,
            read_offset,
        )
    }

    /// Merge the cache into the output buffer when `read_offset` falls
    /// within the cached range.
    pub fn read_cache_into_output(&mut self, read_offset: usize) {
        if !self.has_cache {
            return;
        }
        if read_offset < self.cache_start_offset || read_offset > self.cache_end_offset {
            return;
        }
        let Some(cache) = self.cached_buffer.as_ref() else {
            return;
        };
        // anchor the read pointer to the requested offset so a sequencer
        // loop restart resumes from the right cache position
        self.cache_read_pointer = read_offset - self.cache_start_offset;
        self.output_buffer
            .merge_from(cache, self.cache_read_pointer, 0, 1.0);
        self.cache_read_pointer += self.output_buffer.buffer_size();
    }

    /// Drop the cache and return to the unarmed state.
    pub fn clear_cached_buffer(&mut self) {
        self.cached_buffer = None;
        self.has_cache = false;
        self.is_caching = false;
        self.cache_write_pointer = 0;
        self.cache_read_pointer = 0;
    }

    /// Drop a cache built against a chain layout that has since changed,
    /// re-arming when caching is still requested.
    pub fn maybe_invalidate_cache(&mut self) {
        let revision = self.processing_chain.revision();
        if revision == self.chain_revision_seen {
            return;
        }
        self.chain_revision_seen = revision;
        if self.has_cache || self.is_caching {
            let size = self
                .cached_buffer
                .as_ref()
                .map_or(0, AudioBuffer::buffer_size);
            self.clear_cached_buffer();
            if self.can_cache && size > 0 {
                self.set_caching(true, size, self.cache_start_offset, self.cache_end_offset);
            }
        }
    }

    /// Run the active processors over the output buffer, mirroring the
    /// buffer into the cache before the first non-cacheable processor when
    /// a cache is being built. With a ready cache, cacheable processors
    /// are skipped (their effect is part of the cache).
    pub fn run_processors(&mut self, mut must_cache: bool) {
        let Self {
            processing_chain,
            output_buffer,
            cached_buffer,
            is_caching,
            has_cache,
            cache_write_pointer,
            cache_read_pointer,
            is_mono,
            ..
        } = self;
        let is_cached = *has_cache;

        for processor in processing_chain.active_mut() {
            let cacheable = processor.is_cacheable();
            if !is_cached || !cacheable {
                if must_cache && !cacheable {
                    must_cache = !write_cache_parts(
                        cached_buffer,
                        is_caching,
                        has_cache,
                        cache_write_pointer,
                        cache_read_pointer,
                        output_buffer,
                        0,
                    );
                }
                processor.process(output_buffer, *is_mono);
            }
        }

        // cache write did not happen mid-chain (no non-cacheable
        // processors, or none at all): commit now
        if must_cache {
            write_cache_parts(
                cached_buffer,
                is_caching,
                has_cache,
                cache_write_pointer,
                cache_read_pointer,
                output_buffer,
                0,
            );
        }
    }
}

fn write_cache_parts(
    cached_buffer: &mut Option<AudioBuffer>,
    is_caching: &mut bool,
    has_cache: &mut bool,
    cache_write_pointer: &mut usize,
    cache_read_pointer: &mut usize,
    source: &AudioBuffer,
    read_offset: usize,
) -> bool {
    if !*is_caching {
        return false;
    }
    let Some(cache) = cached_buffer.as_mut() else {
        return false;
    };

    let merged = cache.merge_from(source, read_offset, *cache_write_pointer, 1.0);
    let channels = cache
        .amount_of_channels()
        .min(source.amount_of_channels())
        .max(1);
    *cache_write_pointer += merged / channels;

    if *cache_write_pointer >= cache.buffer_size() {
        debug!("channel cache filled ({} frames)", cache.buffer_size());
        *has_cache = true;
        *is_caching = false;
        *cache_read_pointer = 0;
        *cache_write_pointer = 0;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ritmo_core::Processor;

    fn channel() -> AudioChannel {
        AudioChannel::new(1, 8, 1.0)
    }

    #[test]
    fn test_reset_clears_pass_state() {
        let mut channel = channel();
        channel.add_event(0);
        channel.add_live_event(1);
        assert!(channel.has_live_events);

        channel.reset();
        assert!(channel.sequenced_events().is_empty());
        assert!(channel.live_events().is_empty());
        assert!(!channel.has_live_events);
    }

    #[test]
    fn test_create_output_buffer_is_idempotent() {
        let mut channel = channel();
        channel.output_buffer_mut().channel_mut(0)[0] = 0.5;

        // same dimensions: buffer kept
        channel.create_output_buffer(1, 8);
        assert_eq!(channel.output_buffer().channel(0)[0], 0.5);

        // new dimensions: reallocated
        channel.create_output_buffer(2, 16);
        assert_eq!(channel.output_buffer().amount_of_channels(), 2);
        assert_eq!(channel.output_buffer().buffer_size(), 16);
    }

    #[test]
    fn test_cache_fills_and_becomes_ready() {
        let mut channel = channel();
        channel.set_caching(true, 16, 0, 15);
        assert!(channel.is_caching());
        assert!(!channel.has_cache());

        let mut block = AudioBuffer::new(1, 8);
        block.channel_mut(0).fill(0.5);

        assert!(channel.write_cache(&block, 0));
        assert!(channel.is_caching());

        assert!(channel.write_cache(&block, 0));
        assert!(channel.has_cache());
        assert!(!channel.is_caching());
    }

    #[test]
    fn test_cache_read_merges_within_range() {
        let mut channel = channel();
        channel.set_caching(true, 16, 0, 15);

        let mut block = AudioBuffer::new(1, 8);
        block.channel_mut(0).fill(0.25);
        channel.write_cache(&block, 0);
        channel.write_cache(&block, 0);

        channel.output_buffer_mut().silence();
        channel.read_cache_into_output(0);
        assert!(channel.output_buffer().channel(0).iter().all(|&s| s == 0.25));

        // outside the cached range nothing is merged
        channel.output_buffer_mut().silence();
        channel.read_cache_into_output(64);
        assert!(channel.output_buffer().channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_clear_cache_returns_to_off() {
        let mut channel = channel();
        channel.set_caching(true, 8, 0, 7);
        let block = AudioBuffer::new(1, 8);
        channel.write_cache(&block, 0);
        assert!(channel.has_cache());

        channel.clear_cached_buffer();
        assert!(!channel.has_cache());
        assert!(!channel.is_caching());
    }

    #[test]
    fn test_chain_mutation_invalidates_cache() {
        struct Noop;
        impl Processor for Noop {
            fn process(&mut self, _: &mut AudioBuffer, _: bool) {}
            fn is_cacheable(&self) -> bool {
                true
            }
        }

        let mut channel = channel();
        channel.set_caching(true, 8, 0, 7);
        channel.maybe_invalidate_cache();
        let block = AudioBuffer::new(1, 8);
        channel.write_cache(&block, 0);
        assert!(channel.has_cache());

        channel.processing_chain.add(Box::new(Noop));
        channel.maybe_invalidate_cache();

        // cache dropped but re-armed, ready to fill against the new chain
        assert!(!channel.has_cache());
        assert!(channel.is_caching());
    }

    #[test]
    fn test_shift_indices_above() {
        let mut channel = channel();
        channel.add_event(0);
        channel.add_event(2);
        channel.add_event(5);

        channel.shift_sequenced_above(2);
        assert_eq!(channel.sequenced_events(), &[0, 2, 4]);
    }
}
