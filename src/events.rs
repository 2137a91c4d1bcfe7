//! Notifications sent from background workers to the UI thread.
//!
//! All cross-thread signalling goes through a single
//! [`std::sync::mpsc`] channel of [`Notification`] values. Workers only
//! ever send; the receiving side is polled (or blocked on) by whoever
//! owns the [`std::sync::mpsc::Receiver`] handed out at construction.

use crate::book::ChapterId;
use crate::package::OutputArtifacts;
use std::sync::mpsc::Sender;

/// Events emitted by the conversion worker and the preview player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A step of the running job started. `percent` is monotonically
    /// non-decreasing over the life of a job and reaches 100 only on
    /// successful completion.
    Progress { percent: u8, label: String },
    /// The job finished and all requested outputs exist.
    Completed { outputs: OutputArtifacts },
    /// The job stopped early; partial outputs may remain on disk.
    Failed { message: String },
    /// Preview audio for this chapter started playing.
    PreviewStarted { chapter: ChapterId },
    /// Preview audio for this chapter ran to the end or was stopped.
    PreviewFinished { chapter: ChapterId },
    /// Preview synthesis or playback failed before audio could start.
    PreviewFailed { chapter: ChapterId, message: String },
}

/// Sending half of the notification channel, cloned into every worker.
pub type NotificationSender = Sender<Notification>;
