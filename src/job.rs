//! Job description and output options.
//!
//! A [`ConversionJob`] is a fully resolved request: the chapters to speak,
//! the voice settings, where output goes and which formats to produce.
//! Validation happens before the job is handed to the worker, so the
//! pipeline itself never sees an out-of-range speed or an empty selection.

use crate::book::{BookMeta, Chapter};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Which output formats a job should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatFlags {
    pub want_m4b: bool,
    pub want_mp3: bool,
    /// Keep the intermediate per-chapter WAV files after packaging.
    pub keep_wav: bool,
}

impl Default for FormatFlags {
    fn default() -> Self {
        Self {
            want_m4b: true,
            want_mp3: false,
            keep_wav: false,
        }
    }
}

/// MP3 encoding quality, mapped to a LAME bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mp3Quality {
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl Mp3Quality {
    /// Bitrate argument passed to the encoder.
    pub fn bitrate(self) -> &'static str {
        match self {
            Mp3Quality::Low => "64k",
            Mp3Quality::Medium => "128k",
            Mp3Quality::High => "192k",
            Mp3Quality::VeryHigh => "256k",
        }
    }

    /// Label shown in quality pickers.
    pub fn label(self) -> &'static str {
        match self {
            Mp3Quality::Low => "Low (64 kbps)",
            Mp3Quality::Medium => "Medium (128 kbps)",
            Mp3Quality::High => "High (192 kbps)",
            Mp3Quality::VeryHigh => "Very High (256 kbps)",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [
            Mp3Quality::Low,
            Mp3Quality::Medium,
            Mp3Quality::High,
            Mp3Quality::VeryHigh,
        ]
        .into_iter()
        .find(|q| q.label() == label)
    }
}

impl fmt::Display for Mp3Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-book output preferences persisted across sessions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Last chosen output folder, if any.
    pub output_folder: Option<PathBuf>,
    pub formats: FormatFlags,
    pub mp3_quality: Mp3Quality,
}

/// A resolved conversion request.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Chapters to convert, in book order. Chapter numbering in output
    /// filenames follows the position in this list, starting at 1.
    pub chapters: Vec<Chapter>,
    pub meta: BookMeta,
    pub voice: String,
    /// Playback-rate multiplier, must lie in [`MIN_SPEED`]..=[`MAX_SPEED`].
    pub speed: f32,
    pub use_acceleration: bool,
    /// Folder under which the `wav/`, `mp3/` and `m4b/` subfolders are
    /// created.
    pub output_root: PathBuf,
    /// Stem used for all output filenames, typically derived from the
    /// book title.
    pub basename: String,
    pub formats: FormatFlags,
    pub mp3_quality: Mp3Quality,
}

impl ConversionJob {
    /// Check the job is acceptable before any work starts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(ValidationError::SpeedOutOfRange(self.speed));
        }
        if self.chapters.is_empty() {
            return Err(ValidationError::EmptySelection);
        }
        Ok(())
    }

    /// Number of progress steps the job will report against.
    ///
    /// One step per chapter, plus index and m4b steps when an m4b is
    /// requested, plus one step per chapter when MP3s are requested.
    pub fn total_steps(&self) -> usize {
        let n = self.chapters.len();
        let mut total = n;
        if self.formats.want_m4b {
            total += 2;
        }
        if self.formats.want_mp3 {
            total += n;
        }
        total
    }

    /// Whether the per-chapter WAV files survive the job.
    ///
    /// A job that requests no packaged format keeps its WAVs regardless of
    /// the flag, since deleting them would leave no output at all.
    pub fn keeps_wav(&self) -> bool {
        self.formats.keep_wav || (!self.formats.want_m4b && !self.formats.want_mp3)
    }
}
