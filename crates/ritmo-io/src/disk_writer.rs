//! Off-thread recording of the engine output.
//!
//! The render thread appends samples into a fixed-size in-memory snippet
//! buffer. When a snippet fills up it is rotated out: the full buffer is
//! handed to a dedicated writer thread (so the render thread never touches
//! the filesystem) and a fresh buffer takes its place. Each snippet is
//! persisted as a temporary WAV file; [`DiskWriter::finish`] concatenates
//! the snippets into the final output file, deleting each temp file after
//! its samples have been appended. Peak disk use is therefore bounded by
//! the in-flight snippet plus the growing output.
//!
//! While bouncing the engine writes no device output, so snippet writes
//! happen synchronously on the render thread instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ritmo_core::{AudioBuffer, Notification, Notifier, Sample};
use tracing::{debug, error};

use crate::{Error, Result, wav};

struct SnippetJob {
    buffer: AudioBuffer,
    frames: usize,
    ordinal: usize,
}

struct SnippetFile {
    ordinal: usize,
    path: PathBuf,
    frames: usize,
}

#[derive(Default)]
struct WrittenState {
    files: Vec<SnippetFile>,
    error: Option<String>,
}

/// Streams the render output to disk as rotating fixed-size WAV snippets.
pub struct DiskWriter {
    output_file: PathBuf,
    temp_directory: PathBuf,
    chunk_size: usize,
    channels: usize,
    sample_rate: u32,
    synchronous: bool,
    active: Option<AudioBuffer>,
    current_index: usize,
    writer_index: usize,
    next_ordinal: usize,
    written: Arc<Mutex<WrittenState>>,
    jobs: Option<Sender<SnippetJob>>,
    worker: Option<JoinHandle<()>>,
    notifier: Notifier,
}

impl DiskWriter {
    /// Set up a recording session.
    ///
    /// `chunk_size` is the snippet length in frames; temporary snippets are
    /// placed next to `output_file`. With `synchronous` set (bouncing),
    /// snippet writes happen inline instead of on the writer thread.
    pub fn prepare<P: AsRef<Path>>(
        output_file: P,
        chunk_size: usize,
        channels: usize,
        sample_rate: u32,
        synchronous: bool,
        notifier: Notifier,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidRecorderConfig(
                "chunk size must be at least one frame".into(),
            ));
        }
        if channels == 0 {
            return Err(Error::InvalidRecorderConfig(
                "recordings need at least one channel".into(),
            ));
        }

        let output_file = output_file.as_ref().to_path_buf();
        let temp_directory = output_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let written = Arc::new(Mutex::new(WrittenState::default()));

        let (jobs, worker) = if synchronous {
            (None, None)
        } else {
            let (sender, receiver) = crossbeam_channel::bounded::<SnippetJob>(4);
            let written = Arc::clone(&written);
            let notifier = notifier.clone();
            let temp_directory = temp_directory.clone();
            let worker = std::thread::Builder::new()
                .name("ritmo-disk-writer".into())
                .spawn(move || {
                    for job in receiver {
                        persist_snippet(&temp_directory, sample_rate, &written, &notifier, job, true);
                    }
                })
                .map_err(Error::Io)?;
            (Some(sender), Some(worker))
        };

        Ok(Self {
            output_file,
            temp_directory,
            chunk_size,
            channels,
            sample_rate,
            synchronous,
            active: Some(AudioBuffer::new(channels, chunk_size)),
            current_index: 0,
            writer_index: 0,
            next_ordinal: 0,
            written,
            jobs,
            worker,
            notifier,
        })
    }

    /// Snippet length in frames.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Frames accumulated in the active snippet buffer.
    pub fn pending_frames(&self) -> usize {
        self.writer_index
    }

    /// Append interleaved samples (`frames * channels` values) from the
    /// render thread. Rotates the snippet buffer whenever it fills; never
    /// blocks.
    pub fn append_interleaved(&mut self, samples: &[Sample], frames: usize, channels: usize) {
        if self.active.is_none() {
            return;
        }
        let copy_channels = channels.min(self.channels);
        let mut base = 0;

        for _ in 0..frames {
            if self.writer_index == self.chunk_size {
                self.rotate();
            }
            if base + copy_channels > samples.len() {
                break;
            }
            let Some(active) = self.active.as_mut() else {
                return;
            };
            for c in 0..copy_channels {
                active.channel_mut(c)[self.writer_index] = samples[base + c];
            }
            self.writer_index += 1;
            base += channels;
        }
    }

    /// Append a (device input) buffer from the render thread.
    pub fn append_buffer(&mut self, buffer: &AudioBuffer) {
        if self.active.is_none() {
            return;
        }
        let copy_channels = buffer.amount_of_channels().min(self.channels);

        for frame in 0..buffer.buffer_size() {
            if self.writer_index == self.chunk_size {
                self.rotate();
            }
            let Some(active) = self.active.as_mut() else {
                return;
            };
            for c in 0..copy_channels {
                active.channel_mut(c)[self.writer_index] = buffer.channel(c)[frame];
            }
            self.writer_index += 1;
        }
    }

    /// Force the partially filled active snippet out (used when recording
    /// halts mid-snippet).
    pub fn flush_partial(&mut self) {
        if self.writer_index > 0 {
            self.rotate();
        }
    }

    fn rotate(&mut self) {
        let frames = self.writer_index;
        let Some(buffer) = self.active.take() else {
            return;
        };
        let rotated_index = self.current_index;
        self.current_index ^= 1;
        self.active = Some(AudioBuffer::new(self.channels, self.chunk_size));
        self.writer_index = 0;

        if frames == 0 {
            return;
        }
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        let job = SnippetJob {
            buffer,
            frames,
            ordinal,
        };

        if self.synchronous {
            persist_snippet(
                &self.temp_directory,
                self.sample_rate,
                &self.written,
                &self.notifier,
                job,
                false,
            );
        } else {
            self.notifier.broadcast(Notification::RecordedSnippetReady {
                buffer_index: rotated_index,
            });
            if let Some(jobs) = &self.jobs {
                if jobs.try_send(job).is_err() {
                    error!("disk writer queue full, snippet {ordinal} dropped");
                    if let Ok(mut state) = self.written.lock() {
                        state.error = Some(format!("snippet {ordinal} dropped, writer overloaded"));
                    }
                }
            }
        }
    }

    /// Flush the active snippet, stop the writer thread and concatenate all
    /// temporary snippets into the output file (in recording order). Each
    /// temp file is deleted once its samples have been appended.
    ///
    /// Returns the path of the completed WAV. Fails when any snippet could
    /// not be written or read back; partial output is left on disk for
    /// inspection.
    pub fn finish(&mut self) -> Result<PathBuf> {
        self.flush_partial();
        self.active = None;

        // closing the job queue lets the writer thread drain and exit
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        let mut state = self
            .written
            .lock()
            .map_err(|_| Error::Stream("disk writer state poisoned".into()))?;

        if let Some(message) = state.error.take() {
            return Err(Error::SnippetWrite(message));
        }
        if state.files.is_empty() {
            return Err(Error::NothingRecorded);
        }
        state.files.sort_by_key(|file| file.ordinal);

        let spec = WavSpec {
            channels: self.channels as u16,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&self.output_file, spec)?;

        for file in &state.files {
            let mut reader = WavReader::open(&file.path)?;
            for sample in reader.samples::<i16>() {
                writer.write_sample(sample?)?;
            }
            fs::remove_file(&file.path)?;
        }
        writer.finalize()?;

        let total_frames: usize = state.files.iter().map(|f| f.frames).sum();
        debug!(
            "recording finished, {} snippets / {} frames concatenated into {}",
            state.files.len(),
            total_frames,
            self.output_file.display()
        );
        state.files.clear();

        Ok(self.output_file.clone())
    }
}

fn persist_snippet(
    temp_directory: &Path,
    sample_rate: u32,
    written: &Arc<Mutex<WrittenState>>,
    notifier: &Notifier,
    job: SnippetJob,
    broadcast: bool,
) {
    let path = temp_directory.join(format!("rec_snippet_{}.wav", job.ordinal));

    match wav::write_buffer_frames(&path, &job.buffer, job.frames, sample_rate) {
        Ok(frames) => {
            debug!("saved snippet {} ({frames} frames)", path.display());
            if let Ok(mut state) = written.lock() {
                state.files.push(SnippetFile {
                    ordinal: job.ordinal,
                    path,
                    frames,
                });
            }
            if broadcast {
                notifier.broadcast(Notification::RecordedSnippetSaved {
                    file_id: job.ordinal,
                });
            }
        }
        Err(err) => {
            error!("failed to save snippet {}: {err}", path.display());
            if let Ok(mut state) = written.lock() {
                state.error = Some(err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ritmo_core::Notifier;
    use tempfile::tempdir;

    fn frames_of(path: &Path) -> usize {
        let (buffer, _) = wav::read_buffer(path).unwrap();
        buffer.buffer_size()
    }

    #[test]
    fn test_synchronous_recording_concatenates_snippets() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("output.wav");
        let (notifier, _receiver) = Notifier::new(16);

        let mut writer = DiskWriter::prepare(&output, 100, 1, 44100, true, notifier).unwrap();

        let samples = vec![0.5; 250];
        writer.append_interleaved(&samples, 250, 1);
        let path = writer.finish().unwrap();

        assert_eq!(path, output);
        assert_eq!(frames_of(&output), 250);

        // temp snippets are gone
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("rec_snippet"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_threaded_recording_notifies_and_saves() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("take.wav");
        let (notifier, receiver) = Notifier::new(16);

        let mut writer = DiskWriter::prepare(&output, 128, 2, 48000, false, notifier).unwrap();

        let chunk = vec![0.25; 128 * 2];
        for _ in 0..3 {
            writer.append_interleaved(&chunk, 128, 2);
        }
        writer.finish().unwrap();
        assert_eq!(frames_of(&output), 384);

        let notifications: Vec<_> = receiver.try_iter().collect();
        let ready = notifications
            .iter()
            .filter(|n| matches!(n, Notification::RecordedSnippetReady { .. }))
            .count();
        let saved = notifications
            .iter()
            .filter(|n| matches!(n, Notification::RecordedSnippetSaved { .. }))
            .count();
        assert!(ready >= 2, "expected rotations to be announced, got {ready}");
        assert_eq!(saved, 3, "every snippet write should be announced");
    }

    #[test]
    fn test_device_buffer_append() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("input.wav");
        let (notifier, _receiver) = Notifier::new(16);

        let mut writer = DiskWriter::prepare(&output, 64, 1, 44100, true, notifier).unwrap();

        let mut input = AudioBuffer::new(1, 48);
        input.channel_mut(0).fill(-0.25);
        writer.append_buffer(&input);
        writer.append_buffer(&input);
        writer.finish().unwrap();

        assert_eq!(frames_of(&output), 96);
    }

    #[test]
    fn test_finish_without_data_fails() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("empty.wav");
        let (notifier, _receiver) = Notifier::new(16);

        let mut writer = DiskWriter::prepare(&output, 64, 1, 44100, true, notifier).unwrap();
        assert!(matches!(writer.finish(), Err(Error::NothingRecorded)));
        assert!(!output.exists());
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let dir = tempdir().unwrap();
        let (notifier, _receiver) = Notifier::new(16);
        let result = DiskWriter::prepare(dir.path().join("x.wav"), 0, 1, 44100, true, notifier);
        assert!(matches!(result, Err(Error::InvalidRecorderConfig(_))));
    }
}
