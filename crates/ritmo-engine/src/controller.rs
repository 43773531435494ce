//! The host-facing control surface.
//!
//! A [`Controller`] is a clone-able handle that serializes control
//! mutations through a command queue. The engine drains the queue at the
//! start of each render pass, so every mutation lands at a pass boundary
//! and the render thread never contends on a lock. Calls validate their
//! arguments synchronously: an invalid call fails without enqueueing
//! anything.

use std::path::PathBuf;

use crossbeam_channel::Sender;
use ritmo_core::Sample;

use crate::sequencer::InstrumentId;
use crate::{EngineError, Result};

#[derive(Debug)]
pub(crate) enum Command {
    SetPlaying(bool),
    SetTempo {
        bpm: f64,
        beat_amount: u32,
        beat_unit: u32,
    },
    SetTempoNow {
        bpm: f64,
        beat_amount: u32,
        beat_unit: u32,
    },
    SetLoopRange {
        start: usize,
        end: usize,
        steps_per_bar: u32,
    },
    UpdateMeasures {
        amount_of_bars: u32,
        steps_per_bar: u32,
    },
    SetBufferPosition(usize),
    Rewind,
    SetVolume(Sample),
    SetNotificationMarker(Option<usize>),
    SetInstrumentVolume {
        id: InstrumentId,
        volume: Sample,
    },
    SetBounceState {
        active: bool,
        max_buffers: usize,
        directory: PathBuf,
    },
    SetRecordingState {
        active: bool,
        max_buffers: usize,
        directory: PathBuf,
    },
    SetRecordingFromDeviceState {
        active: bool,
        max_buffers: usize,
        directory: PathBuf,
    },
    SetMonitorRecording(bool),
}

pub(crate) fn validate_tempo(bpm: f64) -> Result<()> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidTempo(bpm))
    }
}

pub(crate) fn validate_signature(amount: u32, unit: u32) -> Result<()> {
    if (1..=32).contains(&amount) && (1..=32).contains(&unit) {
        Ok(())
    } else {
        Err(EngineError::InvalidTimeSignature { amount, unit })
    }
}

/// Thread-safe handle onto a running [`crate::Engine`].
///
/// All operations are synchronous and non-blocking; they take effect at
/// the start of the engine's next render pass.
#[derive(Clone)]
pub struct Controller {
    commands: Sender<Command>,
}

impl Controller {
    pub(crate) fn new(commands: Sender<Command>) -> Self {
        Self { commands }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::Disconnected)
    }

    /// Start or pause the sequencer transport.
    pub fn set_playing(&self, playing: bool) -> Result<()> {
        self.send(Command::SetPlaying(playing))
    }

    /// Queue a tempo / time-signature change (latched per render
    /// iteration).
    pub fn set_tempo(&self, bpm: f64, beat_amount: u32, beat_unit: u32) -> Result<()> {
        validate_tempo(bpm)?;
        validate_signature(beat_amount, beat_unit)?;
        self.send(Command::SetTempo {
            bpm,
            beat_amount,
            beat_unit,
        })
    }

    /// Apply a tempo / time-signature change on the next pass without
    /// waiting for the end-of-iteration latch.
    pub fn set_tempo_now(&self, bpm: f64, beat_amount: u32, beat_unit: u32) -> Result<()> {
        validate_tempo(bpm)?;
        validate_signature(beat_amount, beat_unit)?;
        self.send(Command::SetTempoNow {
            bpm,
            beat_amount,
            beat_unit,
        })
    }

    /// Loop the sequencer between two frame offsets.
    pub fn set_loop_range(&self, start: usize, end: usize, steps_per_bar: u32) -> Result<()> {
        if start >= end {
            return Err(EngineError::InvalidLoopRange { start, end });
        }
        if steps_per_bar == 0 {
            return Err(EngineError::InvalidConfig(
                "steps per bar must be at least 1".into(),
            ));
        }
        self.send(Command::SetLoopRange {
            start,
            end,
            steps_per_bar,
        })
    }

    /// Change the measure count and step grid.
    pub fn update_measures(&self, amount_of_bars: u32, steps_per_bar: u32) -> Result<()> {
        if amount_of_bars == 0 || steps_per_bar == 0 {
            return Err(EngineError::InvalidConfig(
                "measures and steps per bar must be at least 1".into(),
            ));
        }
        self.send(Command::UpdateMeasures {
            amount_of_bars,
            steps_per_bar,
        })
    }

    /// Move the playhead; the engine clamps into the loop range.
    pub fn set_buffer_position(&self, frame: usize) -> Result<()> {
        self.send(Command::SetBufferPosition(frame))
    }

    /// Move the playhead back to the loop start.
    pub fn rewind(&self) -> Result<()> {
        self.send(Command::Rewind)
    }

    /// Set the master output volume (`0..=1`).
    pub fn set_volume(&self, volume: Sample) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(EngineError::InvalidConfig(
                "volume must lie within 0..=1".into(),
            ));
        }
        self.send(Command::SetVolume(volume))
    }

    /// Place (`Some(frame)`) or clear (`None`) the notification marker.
    pub fn set_notification_marker(&self, marker: Option<usize>) -> Result<()> {
        self.send(Command::SetNotificationMarker(marker))
    }

    /// Set an instrument's fader volume (`0..=1`).
    pub fn set_instrument_volume(&self, id: InstrumentId, volume: Sample) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(EngineError::InvalidConfig(
                "volume must lie within 0..=1".into(),
            ));
        }
        self.send(Command::SetInstrumentVolume { id, volume })
    }

    /// Enter or leave bounce mode (offline render of the loop range into
    /// `directory/output.wav`).
    pub fn set_bounce_state(
        &self,
        active: bool,
        max_buffers: usize,
        directory: impl Into<PathBuf>,
    ) -> Result<()> {
        self.send(Command::SetBounceState {
            active,
            max_buffers,
            directory: directory.into(),
        })
    }

    /// Start or stop recording the engine output.
    pub fn set_recording_state(
        &self,
        active: bool,
        max_buffers: usize,
        directory: impl Into<PathBuf>,
    ) -> Result<()> {
        self.send(Command::SetRecordingState {
            active,
            max_buffers,
            directory: directory.into(),
        })
    }

    /// Start or stop recording the device input (mutually exclusive with
    /// output recording).
    pub fn set_recording_from_device_state(
        &self,
        active: bool,
        max_buffers: usize,
        directory: impl Into<PathBuf>,
    ) -> Result<()> {
        self.send(Command::SetRecordingFromDeviceState {
            active,
            max_buffers,
            directory: directory.into(),
        })
    }

    /// Mirror the device input into the master bus while recording it.
    pub fn set_monitor_recording(&self, monitor: bool) -> Result<()> {
        self.send(Command::SetMonitorRecording(monitor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (Controller, crossbeam_channel::Receiver<Command>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Controller::new(sender), receiver)
    }

    #[test]
    fn test_invalid_tempo_fails_without_enqueueing() {
        let (controller, receiver) = controller();
        assert!(controller.set_tempo(0.0, 4, 4).is_err());
        assert!(controller.set_tempo(f64::NAN, 4, 4).is_err());
        assert!(controller.set_tempo(120.0, 0, 4).is_err());
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_invalid_loop_range_fails() {
        let (controller, receiver) = controller();
        assert!(controller.set_loop_range(100, 100, 16).is_err());
        assert!(controller.set_loop_range(200, 100, 16).is_err());
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_valid_calls_enqueue_commands() {
        let (controller, receiver) = controller();
        controller.set_playing(true).unwrap();
        controller.set_tempo(130.0, 4, 4).unwrap();
        assert_eq!(receiver.try_iter().count(), 2);
    }

    #[test]
    fn test_disconnected_engine_reports_error() {
        let (controller, receiver) = controller();
        drop(receiver);
        assert!(matches!(
            controller.set_playing(true),
            Err(EngineError::Disconnected)
        ));
    }
}
