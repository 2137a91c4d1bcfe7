//! Turns an EPUB's chapters into an audiobook.
//!
//! The crate is the conversion engine behind a chapter-picking UI: callers
//! hand a [`ConversionJob`] (chapters, voice, speed, formats) to a
//! [`Pipeline`], which synthesizes each chapter to WAV on a worker thread,
//! packages the result as m4b and/or MP3 through an external `ffmpeg`, and
//! streams [`Notification`]s back over a channel. A separate
//! [`preview::PreviewPlayer`] speaks short excerpts so users can audition
//! a voice before committing to a full conversion.

pub mod book;
pub mod cache;
pub mod cleanup;
pub mod convert;
pub mod error;
pub mod events;
pub mod job;
pub mod package;
pub mod pipeline;
pub mod preview;
pub mod synth;
pub mod tempfiles;

pub use book::{BookMeta, Chapter, ChapterId};
pub use convert::WavArtifact;
pub use error::{PipelineError, StartError, ValidationError};
pub use events::Notification;
pub use job::{ConversionJob, FormatFlags, Mp3Quality, OutputOptions};
pub use package::OutputArtifacts;
pub use pipeline::{JobState, Pipeline};
pub use preview::PreviewPlayer;
pub use synth::{SAMPLE_RATE, Synthesizer};
