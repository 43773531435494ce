//! Engine configuration.

use crate::{EngineError, Result};

/// Constants latched when the engine is prepared.
///
/// The render loop sizes every scratch buffer from these values; changing
/// them requires tearing the engine down and preparing a new one.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per render callback.
    pub buffer_size: usize,
    /// Output channel count (1 = mono).
    pub output_channels: usize,
    /// Input channel count; 0 disables device recording.
    pub input_channels: usize,
    /// Master toggle for per-channel effect-chain caching.
    pub channel_caching: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 512,
            output_channels: 2,
            input_channels: 0,
            channel_caching: false,
        }
    }
}

impl EngineConfig {
    /// Reject unusable configurations before any state is built.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidConfig("sample rate must be > 0".into()));
        }
        if self.buffer_size == 0 {
            return Err(EngineError::InvalidConfig("buffer size must be > 0".into()));
        }
        if self.output_channels == 0 {
            return Err(EngineError::InvalidConfig(
                "at least one output channel is required".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_buffer_size_rejected() {
        let config = EngineConfig {
            buffer_size: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_output_channels_rejected() {
        let config = EngineConfig {
            output_channels: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
