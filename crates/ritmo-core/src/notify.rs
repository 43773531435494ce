//! One-way message bus from the render thread to the host.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Lifecycle messages emitted by the render thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The audio device could not be opened; the render loop did not start.
    HardwareUnavailable,
    /// The playhead crossed a step boundary. Carries the frame offset
    /// within the current output buffer at which the step begins.
    SequencerPositionUpdated {
        /// Frame index within the buffer being rendered.
        buffer_offset: usize,
    },
    /// A queued tempo / time-signature change has been applied.
    SequencerTempoUpdated,
    /// The playhead reached the position set via the notification marker.
    MarkerPositionReached,
    /// A recording snippet buffer filled up and was rotated out; the host
    /// should persist it.
    RecordedSnippetReady {
        /// Index of the rotated snippet buffer.
        buffer_index: usize,
    },
    /// A snippet was written to disk.
    RecordedSnippetSaved {
        /// Ordinal of the saved snippet file.
        file_id: usize,
    },
    /// An offline bounce finished and the output file is complete.
    BounceComplete {
        /// Identifier of the finished recording.
        id: usize,
    },
}

/// Broadcast handle used by the render thread.
///
/// Backed by a bounded channel written with `try_send`: the render thread
/// never blocks on a slow host. Messages that do not fit are dropped and
/// counted.
#[derive(Clone)]
pub struct Notifier {
    sender: Sender<Notification>,
    dropped: Arc<AtomicU64>,
}

impl Notifier {
    /// Create a notifier and the receiving end the host listens on.
    /// `capacity` bounds how many undelivered notifications may be queued.
    pub fn new(capacity: usize) -> (Self, Receiver<Notification>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Broadcast a notification. Never blocks; returns whether the message
    /// was delivered into the queue.
    pub fn broadcast(&self, notification: Notification) -> bool {
        match self.sender.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// How many notifications have been dropped because the queue was full
    /// or the host hung up.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_delivers_in_order() {
        let (notifier, receiver) = Notifier::new(8);
        notifier.broadcast(Notification::SequencerTempoUpdated);
        notifier.broadcast(Notification::MarkerPositionReached);

        assert_eq!(receiver.recv().unwrap(), Notification::SequencerTempoUpdated);
        assert_eq!(receiver.recv().unwrap(), Notification::MarkerPositionReached);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (notifier, receiver) = Notifier::new(1);
        assert!(notifier.broadcast(Notification::SequencerTempoUpdated));
        assert!(!notifier.broadcast(Notification::MarkerPositionReached));
        assert_eq!(notifier.dropped(), 1);

        // the first message is still intact
        assert_eq!(receiver.recv().unwrap(), Notification::SequencerTempoUpdated);
    }

    #[test]
    fn test_disconnected_receiver_counts_drops() {
        let (notifier, receiver) = Notifier::new(4);
        drop(receiver);
        assert!(!notifier.broadcast(Notification::SequencerTempoUpdated));
        assert_eq!(notifier.dropped(), 1);
    }
}
