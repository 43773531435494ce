//! Event collection across all registered instruments.

use ritmo_core::AudioEvent;
use tracing::debug;

use crate::instrument::{Instrument, InstrumentKind};
use crate::{EngineError, Result};

/// Stable handle to a registered instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrumentId(usize);

impl InstrumentId {
    /// The slot index behind this handle.
    pub fn index(self) -> usize {
        self.0
    }
}

/// The instrument registry and the event-collection algorithm.
///
/// Instruments live in slots so their handles stay valid across
/// unregistration. For every render pass, [`collect`](Sequencer::collect)
/// fills each instrument's channel with the indices of the events that
/// must sound in the requested sample window, reclaiming events marked
/// deletable along the way.
pub struct Sequencer {
    /// Whether the sequenced grid is advancing. Live events sound
    /// regardless.
    pub playing: bool,
    slots: Vec<Option<Instrument>>,
    removals: Vec<usize>,
}

impl Sequencer {
    /// An empty, stopped sequencer.
    pub fn new() -> Self {
        Self {
            playing: false,
            slots: Vec::new(),
            removals: Vec::new(),
        }
    }

    /// Register an instrument, returning its handle. Empty slots left by
    /// unregistered instruments are reused.
    pub fn register_instrument(&mut self, instrument: Instrument) -> InstrumentId {
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            self.slots[index] = Some(instrument);
            return InstrumentId(index);
        }
        self.slots.push(Some(instrument));
        InstrumentId(self.slots.len() - 1)
    }

    /// Remove an instrument (and all events it owns).
    pub fn unregister_instrument(&mut self, id: InstrumentId) -> Option<Instrument> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    /// Look up an instrument.
    pub fn instrument(&self, id: InstrumentId) -> Option<&Instrument> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Look up an instrument mutably.
    pub fn instrument_mut(&mut self, id: InstrumentId) -> Option<&mut Instrument> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Number of registered instruments.
    pub fn instrument_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Option<Instrument>] {
        &mut self.slots
    }

    /// Select the events that must sound in the window
    /// `[buffer_position, buffer_position + buffer_size)` and route their
    /// indices into each instrument's channel.
    ///
    /// An event overlaps the window when its start lies inside it, or when
    /// it started earlier and has not ended before the window begins.
    /// Loopable events are collected regardless (their read pointer keeps
    /// its own position). Deletable events are removed from their
    /// instrument instead of being collected.
    ///
    /// With `flush_channels` the per-pass channel lists are cleared first;
    /// the wrap-region re-collection after a loop restart passes `false`
    /// to merge into the same channels. Returns whether the window
    /// straddles `max_buffer_position + 1`, i.e. the sequencer loops
    /// inside this buffer.
    pub fn collect(
        &mut self,
        buffer_position: usize,
        buffer_size: usize,
        max_buffer_position: usize,
        samples_per_bar: usize,
        add_live_instruments: bool,
        flush_channels: bool,
    ) -> bool {
        let Self {
            slots, removals, ..
        } = self;

        for instrument in slots.iter_mut().flatten() {
            let Instrument {
                volume,
                kind,
                channel,
                events,
                ..
            } = instrument;

            if flush_channels {
                channel.reset();
            }
            if channel.muted {
                continue;
            }
            // mix properties may change during playback, refresh per pass
            channel.mix_volume = *volume;

            // drums loop by pattern: give the channel a one-bar local
            // range and fold the window into it
            let mut window_start = buffer_position;
            let mut window_stop = buffer_position + buffer_size;
            let is_pattern_based = matches!(kind, InstrumentKind::DrumMachine(_));
            if is_pattern_based && samples_per_bar > 0 {
                channel.max_buffer_position = samples_per_bar;
                while window_start >= samples_per_bar {
                    window_start -= samples_per_bar;
                    window_stop -= samples_per_bar;
                }
            }

            // sequenced events
            removals.clear();
            {
                let list: &mut Vec<AudioEvent> = match kind {
                    InstrumentKind::DrumMachine(kit) => match kit.active_events_mut() {
                        Some(pattern_events) => pattern_events,
                        None => &mut *events,
                    },
                    _ => &mut *events,
                };

                for (index, event) in list.iter().enumerate() {
                    if !event.is_sequenced() || !event.is_enabled() {
                        continue;
                    }
                    let start = event.event_start();
                    let end = event.event_end();
                    let in_window = event.is_loopable()
                        || (start >= window_start && start < window_stop)
                        || (start < window_start && end >= window_start);
                    if !in_window {
                        continue;
                    }
                    if event.is_deletable() {
                        removals.push(index);
                    } else {
                        channel.add_event(index);
                    }
                }

                // process the removal queue after the sweep so collected
                // indices stay stable while we shift them
                for &index in removals.iter().rev() {
                    list.remove(index);
                    channel.shift_sequenced_above(index);
                    if !is_pattern_based {
                        channel.shift_live_above(index);
                    }
                }
                if !removals.is_empty() {
                    debug!("reclaimed {} deletable events", removals.len());
                }
            }

            // live events always come from the instrument's own list
            if add_live_instruments {
                removals.clear();
                for (index, event) in events.iter().enumerate() {
                    if !event.is_live() {
                        continue;
                    }
                    if event.is_deletable() {
                        removals.push(index);
                    } else {
                        channel.add_live_event(index);
                    }
                }
                for &index in removals.iter().rev() {
                    events.remove(index);
                    channel.shift_live_above(index);
                    if !is_pattern_based {
                        channel.shift_sequenced_above(index);
                    }
                }
            }
        }

        buffer_position + buffer_size > max_buffer_position + 1
    }

    /// Reposition every instrument's events for a new tempo.
    pub fn update_events(&mut self, new_tempo: f64, samples_per_step: f64) {
        for instrument in self.slots.iter_mut().flatten() {
            instrument.update_events(new_tempo, samples_per_step);
        }
    }

    /// Drop every event of every instrument.
    pub fn clear_events(&mut self) {
        for instrument in self.slots.iter_mut().flatten() {
            instrument.clear_events();
        }
    }

    /// Move an event from one instrument to another in a single step, so
    /// it is never observable in both or neither.
    pub fn reassign_event(
        &mut self,
        from: InstrumentId,
        event_index: usize,
        to: InstrumentId,
    ) -> Result<usize> {
        if from == to {
            return Ok(event_index);
        }
        if self.instrument(to).is_none() {
            return Err(EngineError::UnknownInstrument);
        }
        let event = self
            .instrument_mut(from)
            .ok_or(EngineError::UnknownInstrument)?
            .remove_event(event_index)
            .ok_or_else(|| EngineError::InvalidConfig("event index out of range".into()))?;

        let target = self
            .instrument_mut(to)
            .ok_or(EngineError::UnknownInstrument)?;
        Ok(target.add_event(event))
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}
