//! Disk and device I/O for the ritmo audio engine.
//!
//! This crate provides:
//!
//! - **WAV snippet codec**: [`write_buffer`] / [`read_buffer`] encode
//!   engine buffers as canonical 16-bit PCM WAV files
//! - **DiskWriter**: [`DiskWriter`] streams the render output to disk as a
//!   sequence of fixed-size snippets without blocking the render thread,
//!   and concatenates them into a single file on finish
//! - **Device streaming**: [`run_output`] and friends wrap `cpal` streams
//!   around a render callback

pub mod disk_writer;
pub mod stream;
pub mod wav;

pub use disk_writer::DiskWriter;
pub use stream::{AudioDevice, OutputStream, StreamConfig, default_output_device, list_devices, run_output};
pub use wav::{read_buffer, write_buffer, write_buffer_frames};

/// Error type for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV encode/decode error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The WAV file uses a sample format the engine does not consume.
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Audio stream setup or runtime error.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("no audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A recorder was configured with an unusable parameter.
    #[error("invalid recorder configuration: {0}")]
    InvalidRecorderConfig(String),

    /// A recording snippet could not be persisted.
    #[error("snippet write failed: {0}")]
    SnippetWrite(String),

    /// `finish()` was called on a recorder that produced no snippets.
    #[error("nothing was recorded")]
    NothingRecorded,
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;
