//! Ritmo Core - primitives shared by every layer of the ritmo audio engine.
//!
//! This crate holds the data types that flow through the render pipeline:
//!
//! - [`AudioBuffer`] - a multi-channel block of normalized samples with the
//!   fractional-loop merge contract used throughout the engine
//! - [`AudioEvent`] - a positioned, enableable source of samples; the
//!   [`EventSource`] variants cover sampled, synthesized and drum audio
//! - [`Processor`] / [`ProcessingChain`] - the per-channel effect chain
//! - [`Notification`] / [`Notifier`] - the one-way message bus from the
//!   render thread to the host
//!
//! # Sample precision
//!
//! Samples are normalized floating-point values in `[-1.0, +1.0]`. The
//! engine-wide precision is selected at compile time: [`Sample`] is `f32`
//! by default and `f64` with the `f64-samples` feature.
//!
//! # Real-time constraints
//!
//! Everything invoked from the render path (buffer mixing, event mixing,
//! chain traversal, notification broadcast) is allocation-free and never
//! blocks. Allocation happens at construction time only.

pub mod buffer;
pub mod chain;
pub mod event;
pub mod notify;
pub mod processor;
pub mod volume;

pub use buffer::AudioBuffer;
pub use chain::ProcessingChain;
pub use event::{AudioEvent, DrumTimbre, EventSource};
pub use notify::{Notification, Notifier};
pub use processor::Processor;

/// The engine-wide sample type (32-bit float by default).
#[cfg(not(feature = "f64-samples"))]
pub type Sample = f32;

/// The engine-wide sample type (64-bit float via the `f64-samples` feature).
#[cfg(feature = "f64-samples")]
pub type Sample = f64;

/// Full-scale sample magnitude. Output is hard-limited to `±MAX_PHASE`
/// after the master chain.
pub const MAX_PHASE: Sample = 1.0;
