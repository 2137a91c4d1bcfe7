//! Error types shared across the pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Rejections raised before a job is accepted.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("speed {0} is outside the supported range 0.5\u{2013}2.0")]
    SpeedOutOfRange(f32),
    #[error("no chapters selected for conversion")]
    EmptySelection,
}

/// Failures produced while a job (or a preview) is running.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("speech synthesis failed for {chapter}: {reason}")]
    SynthesisFailed {
        chapter: String,
        reason: anyhow::Error,
    },
    #[error("failed to write audio to {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("failed to create {path}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encoder failed for {artifact}: {detail}")]
    PackagingFailed { artifact: String, detail: String },
    #[error("all preview slots are in use; try again shortly")]
    ResourceBusy,
    #[error("No chapters were converted.")]
    NoChaptersConverted,
}

/// Why a call to start a conversion was refused.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("a conversion is already running")]
    AlreadyRunning,
}
