//! Effect processors for the ritmo audio engine.
//!
//! Every effect implements [`ritmo_core::Processor`] and is applied
//! in-place to a channel or master buffer by the render loop. Processors
//! declare via `is_cacheable()` whether their output may be captured into a
//! channel cache: time-invariant effects ([`Gain`], [`OnePoleFilter`],
//! [`BitCrusher`], [`Limiter`]) are cacheable, time-variant effects
//! ([`Delay`], [`Tremolo`]) are not and run every cycle.

mod bitcrusher;
mod delay;
mod filter;
mod gain;
mod limiter;
mod tremolo;

pub use bitcrusher::BitCrusher;
pub use delay::Delay;
pub use filter::{FilterMode, OnePoleFilter};
pub use gain::Gain;
pub use limiter::Limiter;
pub use tremolo::Tremolo;
