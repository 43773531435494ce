//! The ritmo render pipeline and sequencer.
//!
//! [`Engine`] owns everything the audio callback touches: the instrument
//! registry, the step-sequencer timeline, per-channel mix buses with
//! effect-chain caching, the master bus, and the disk recorder. One call to
//! [`Engine::render`] produces one hardware buffer of interleaved output.
//!
//! # Threads
//!
//! - the *render thread* calls [`Engine::render`] once per hardware
//!   callback; it never allocates buffers, blocks or performs file I/O
//!   (recording appends are in-memory copies)
//! - *control threads* talk to the engine through a [`Controller`], whose
//!   commands are drained at the start of the next render pass
//! - *writer threads* persist recording snippets off the render thread
//!   (see [`ritmo_io::DiskWriter`])
//!
//! Notifications flow the other way, from the render thread to the host,
//! through the [`ritmo_core::Notifier`] queue handed out at construction.
//!
//! ```no_run
//! use ritmo_engine::{Engine, EngineConfig};
//!
//! let config = EngineConfig::default();
//! let buffer_size = config.buffer_size;
//! let channels = config.output_channels;
//! let (mut engine, controller, notifications) =
//!     Engine::new(config, 120.0, 4, 4).unwrap();
//!
//! controller.set_playing(true).unwrap();
//! let mut out = vec![0.0; buffer_size * channels];
//! engine.render(&mut out);
//! # let _ = notifications;
//! ```

pub mod channel;
pub mod config;
pub mod controller;
pub mod engine;
pub mod instrument;
pub mod sequencer;
pub mod synth;
pub mod timeline;

pub use channel::AudioChannel;
pub use config::EngineConfig;
pub use controller::Controller;
pub use engine::Engine;
pub use instrument::{DrumKit, DrumPattern, Instrument, InstrumentKind};
pub use sequencer::{InstrumentId, Sequencer};
pub use synth::{Adsr, SynthPatch, Synthesizer, Waveform};
pub use timeline::Timeline;

/// Error type for engine control operations.
///
/// Invalid control calls fail without touching engine state. The render
/// thread itself never surfaces errors; it only emits notifications.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A configuration value was rejected at `prepare` time.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Tempo must be a positive, finite BPM value.
    #[error("invalid tempo: {0} BPM")]
    InvalidTempo(f64),

    /// Time signatures are bounded to 1..=32 over 1..=32.
    #[error("invalid time signature: {amount}/{unit}")]
    InvalidTimeSignature {
        /// Beats per bar.
        amount: u32,
        /// Beat unit (note value of one beat).
        unit: u32,
    },

    /// Loop ranges must satisfy `start < end`.
    #[error("invalid loop range: {start}..{end}")]
    InvalidLoopRange {
        /// Requested loop start frame.
        start: usize,
        /// Requested loop end frame.
        end: usize,
    },

    /// The addressed instrument is not registered.
    #[error("unknown instrument")]
    UnknownInstrument,

    /// The engine behind this controller is gone.
    #[error("engine disconnected")]
    Disconnected,

    /// Recorder setup failed.
    #[error(transparent)]
    Io(#[from] ritmo_io::Error),
}

/// Convenience result type for engine control operations.
pub type Result<T> = std::result::Result<T, EngineError>;
