//! WAV encoding and decoding of engine buffers.
//!
//! Output is canonical PCM WAV ("RIFF"/"WAVE"/"fmt "/"data"): 16-bit
//! signed little-endian samples, interleaved channel layout, at the
//! engine's sample rate.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ritmo_core::{AudioBuffer, Sample};

use crate::{Error, Result};

const PCM_MAX: Sample = 32767.0;

fn pcm_spec(channels: usize, sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write an entire buffer as a 16-bit PCM WAV file. Returns the number of
/// frames written.
pub fn write_buffer<P: AsRef<Path>>(
    path: P,
    buffer: &AudioBuffer,
    sample_rate: u32,
) -> Result<usize> {
    write_buffer_frames(path, buffer, buffer.buffer_size(), sample_rate)
}

/// Write the first `frames` frames of a buffer as a 16-bit PCM WAV file.
/// Used for partially filled recording snippets.
pub fn write_buffer_frames<P: AsRef<Path>>(
    path: P,
    buffer: &AudioBuffer,
    frames: usize,
    sample_rate: u32,
) -> Result<usize> {
    let frames = frames.min(buffer.buffer_size());
    let channels = buffer.amount_of_channels();
    let mut writer = WavWriter::create(path, pcm_spec(channels, sample_rate))?;

    for i in 0..frames {
        for c in 0..channels {
            writer.write_sample(to_pcm(buffer.channel(c)[i]))?;
        }
    }
    writer.finalize()?;
    Ok(frames)
}

/// Read a 16-bit PCM WAV file back into an [`AudioBuffer`]. Returns the
/// buffer and the file's sample rate.
pub fn read_buffer<P: AsRef<Path>>(path: P) -> Result<(AudioBuffer, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::UnsupportedFormat(format!(
            "{:?} at {} bits (engine snippets are 16-bit PCM)",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let channels = spec.channels as usize;
    let total_samples = reader.len() as usize;
    let frames = (total_samples / channels).max(1);
    let mut buffer = AudioBuffer::new(channels, frames);

    for (index, sample) in reader.samples::<i16>().enumerate() {
        let sample = sample?;
        let frame = index / channels;
        let channel = index % channels;
        if frame < frames {
            buffer.channel_mut(channel)[frame] = from_pcm(sample);
        }
    }

    Ok((buffer, spec.sample_rate))
}

#[inline]
fn to_pcm(sample: Sample) -> i16 {
    (sample * PCM_MAX).clamp(-PCM_MAX, PCM_MAX) as i16
}

#[inline]
fn from_pcm(sample: i16) -> Sample {
    Sample::from(sample) / PCM_MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_round_trip_preserves_samples() {
        let mut buffer = AudioBuffer::new(2, 1000);
        for c in 0..2 {
            for (i, s) in buffer.channel_mut(c).iter_mut().enumerate() {
                *s = ((i as Sample) / 100.0).sin() * 0.9;
            }
        }

        let file = NamedTempFile::new().unwrap();
        let written = write_buffer(file.path(), &buffer, 44100).unwrap();
        assert_eq!(written, 1000);

        let (loaded, sample_rate) = read_buffer(file.path()).unwrap();
        assert_eq!(sample_rate, 44100);
        assert_eq!(loaded.amount_of_channels(), 2);
        assert_eq!(loaded.buffer_size(), 1000);

        for c in 0..2 {
            for (a, b) in buffer.channel(c).iter().zip(loaded.channel(c).iter()) {
                // 16-bit quantization
                assert!((a - b).abs() < 0.001);
            }
        }
    }

    #[test]
    fn test_out_of_range_samples_are_clipped() {
        let mut buffer = AudioBuffer::new(1, 4);
        buffer.channel_mut(0).copy_from_slice(&[2.0, -2.0, 0.5, -0.5]);

        let file = NamedTempFile::new().unwrap();
        write_buffer(file.path(), &buffer, 44100).unwrap();

        let (loaded, _) = read_buffer(file.path()).unwrap();
        assert!((loaded.channel(0)[0] - 1.0).abs() < 0.001);
        assert!((loaded.channel(0)[1] + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_partial_write() {
        let mut buffer = AudioBuffer::new(1, 100);
        buffer.channel_mut(0).fill(0.25);

        let file = NamedTempFile::new().unwrap();
        let written = write_buffer_frames(file.path(), &buffer, 40, 48000).unwrap();
        assert_eq!(written, 40);

        let (loaded, _) = read_buffer(file.path()).unwrap();
        assert_eq!(loaded.buffer_size(), 40);
    }
}
