//! Real-time device streaming via cpal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host};
use tracing::warn;

use crate::{Error, Result};

/// Audio device information.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device name as reported by the host API.
    pub name: String,
    /// Whether the device offers input channels.
    pub is_input: bool,
    /// Whether the device offers output channels.
    pub is_output: bool,
    /// The device's default sample rate in Hz.
    pub default_sample_rate: u32,
}

/// Stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Requested sample rate in Hz.
    pub sample_rate: u32,
    /// Engine render block size in frames.
    pub buffer_size: usize,
    /// Output channel count.
    pub channels: usize,
    /// Output device name; `None` selects the system default.
    pub output_device: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 512,
            channels: 2,
            output_device: None,
        }
    }
}

/// List all available audio devices.
pub fn list_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                let sample_rate = device
                    .default_input_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(44100);
                let is_output = device.default_output_config().is_ok();
                devices.push(AudioDevice {
                    name,
                    is_input: true,
                    is_output,
                    default_sample_rate: sample_rate,
                });
            }
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                if devices.iter().any(|d| d.name == name) {
                    continue;
                }
                let sample_rate = device
                    .default_output_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(44100);
                devices.push(AudioDevice {
                    name,
                    is_input: false,
                    is_output: true,
                    default_sample_rate: sample_rate,
                });
            }
        }
    }

    Ok(devices)
}

/// Name and sample rate of the default output device, if any.
pub fn default_output_device() -> Option<AudioDevice> {
    let host = cpal::default_host();
    host.default_output_device().and_then(|d| {
        d.name().ok().map(|name| AudioDevice {
            name,
            is_input: false,
            is_output: true,
            default_sample_rate: d
                .default_output_config()
                .map(|c| c.sample_rate())
                .unwrap_or(44100),
        })
    })
}

/// A running output stream. Dropping it (or calling
/// [`stop`](OutputStream::stop)) ends playback.
pub struct OutputStream {
    _stream: cpal::Stream,
    running: Arc<AtomicBool>,
}

impl OutputStream {
    /// Signal the callback to go silent and stop driving the engine.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the stream is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Bridges the engine's fixed render block size onto whatever buffer sizes
/// the device callback delivers.
struct BlockAdapter<F> {
    render: F,
    block: Vec<f32>,
    carry: Vec<f32>,
}

impl<F: FnMut(&mut [f32]) -> bool> BlockAdapter<F> {
    fn new(render: F, block_samples: usize) -> Self {
        Self {
            render,
            block: vec![0.0; block_samples],
            carry: Vec::with_capacity(block_samples),
        }
    }

    fn fill(&mut self, data: &mut [f32]) {
        let mut filled = 0;

        // spend any samples carried over from the previous callback first
        if !self.carry.is_empty() {
            let take = self.carry.len().min(data.len());
            data[..take].copy_from_slice(&self.carry[..take]);
            self.carry.drain(..take);
            filled = take;
        }

        while filled < data.len() {
            if !(self.render)(&mut self.block) {
                data[filled..].fill(0.0);
                return;
            }
            let remaining = data.len() - filled;
            let take = remaining.min(self.block.len());
            data[filled..filled + take].copy_from_slice(&self.block[..take]);
            self.carry.extend_from_slice(&self.block[take..]);
            filled += take;
        }
    }
}

/// Open the default (or named) output device and drive `render` from its
/// callback.
///
/// `render` fills one engine block of interleaved `f32` samples
/// (`buffer_size * channels` values) per invocation and returns whether
/// rendering should continue. Device buffer sizes are adapted to the
/// engine block size internally.
pub fn run_output<F>(config: &StreamConfig, render: F) -> Result<OutputStream>
where
    F: FnMut(&mut [f32]) -> bool + Send + 'static,
{
    let host = cpal::default_host();
    let device = match &config.output_device {
        Some(name) => find_output_device(&host, name)?,
        None => host.default_output_device().ok_or(Error::NoDevice)?,
    };

    let device_config = device
        .default_output_config()
        .map_err(|e| Error::Stream(e.to_string()))?;

    let running = Arc::new(AtomicBool::new(true));
    let callback_running = Arc::clone(&running);
    let mut adapter = BlockAdapter::new(render, config.buffer_size * config.channels);

    let stream = device
        .build_output_stream(
            &device_config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if callback_running.load(Ordering::SeqCst) {
                    adapter.fill(data);
                } else {
                    data.fill(0.0);
                }
            },
            |err| warn!("output stream error: {err}"),
            None,
        )
        .map_err(|e| Error::Stream(e.to_string()))?;

    stream.play().map_err(|e| Error::Stream(e.to_string()))?;

    Ok(OutputStream {
        _stream: stream,
        running,
    })
}

fn find_output_device(host: &Host, name: &str) -> Result<Device> {
    host.output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| Error::DeviceNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices_does_not_panic() {
        // device availability depends on the machine running the tests
        let result = list_devices();
        assert!(result.is_ok());
    }

    #[test]
    fn test_block_adapter_spans_callback_sizes() {
        let mut counter = 0u32;
        let mut adapter = BlockAdapter::new(
            move |block: &mut [f32]| {
                for sample in block.iter_mut() {
                    *sample = counter as f32;
                    counter += 1;
                }
                true
            },
            4,
        );

        let mut first = [0.0f32; 6];
        adapter.fill(&mut first);
        assert_eq!(first, [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

        // the two carried samples lead the next callback
        let mut second = [0.0f32; 4];
        adapter.fill(&mut second);
        assert_eq!(second, [6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_block_adapter_silence_after_stop() {
        let mut adapter = BlockAdapter::new(|_block: &mut [f32]| false, 4);
        let mut data = [1.0f32; 8];
        adapter.fill(&mut data);
        assert!(data.iter().all(|&s| s == 0.0));
    }
}
