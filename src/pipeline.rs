//! Job orchestration: state machine, worker thread and progress reporting.
//!
//! A [`Pipeline`] owns one background worker at a time. Starting a job
//! validates it, flips the state to [`JobState::Running`] and spawns a
//! thread that converts chapters in order, packages the requested formats
//! and reports every step through the notification channel. Cancellation
//! is cooperative: the flag is checked between chapters, so the chapter
//! being synthesized always finishes before the job stops.

use crate::cleanup;
use crate::convert::{WavArtifact, convert_chapter};
use crate::error::StartError;
use crate::events::{Notification, NotificationSender};
use crate::job::ConversionJob;
use crate::package::{self, OutputArtifacts, Packager};
use crate::synth::Synthesizer;
use crate::tempfiles::{OutputKind, OutputLayout};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Lifecycle of the most recent job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Conversion driver. One job runs at a time.
pub struct Pipeline {
    state: Arc<Mutex<JobState>>,
    cancel: Arc<AtomicBool>,
    events: NotificationSender,
    worker: Option<JoinHandle<()>>,
    encoder: PathBuf,
}

impl Pipeline {
    /// Create a pipeline and the receiving end of its notification
    /// channel.
    pub fn new() -> (Self, Receiver<Notification>) {
        Self::with_encoder("ffmpeg")
    }

    /// Same as [`Pipeline::new`] but with a different encoder binary.
    pub fn with_encoder(encoder: impl Into<PathBuf>) -> (Self, Receiver<Notification>) {
        let (events, receiver) = mpsc::channel();
        let pipeline = Self {
            state: Arc::new(Mutex::new(JobState::Idle)),
            cancel: Arc::new(AtomicBool::new(false)),
            events,
            worker: None,
            encoder: encoder.into(),
        };
        (pipeline, receiver)
    }

    pub fn state(&self) -> JobState {
        *self.state.lock().expect("pipeline state lock")
    }

    pub fn is_running(&self) -> bool {
        self.state() == JobState::Running
    }

    /// Validate `job` and hand it to a fresh worker thread.
    pub fn start(
        &mut self,
        job: ConversionJob,
        synth: Arc<dyn Synthesizer>,
    ) -> Result<(), StartError> {
        if self.is_running() {
            return Err(StartError::AlreadyRunning);
        }
        job.validate()?;

        self.cancel.store(false, Ordering::SeqCst);
        *self.state.lock().expect("pipeline state lock") = JobState::Running;

        let state = Arc::clone(&self.state);
        let cancel = Arc::clone(&self.cancel);
        let events = self.events.clone();
        let encoder = self.encoder.clone();
        info!(
            chapters = job.chapters.len(),
            m4b = job.formats.want_m4b,
            mp3 = job.formats.want_mp3,
            "Starting conversion"
        );
        self.worker = Some(thread::spawn(move || {
            let outcome = run_job(&job, synth.as_ref(), &events, &cancel, &encoder);
            *state.lock().expect("pipeline state lock") = outcome;
        }));
        Ok(())
    }

    /// Ask the running job to stop at the next chapter boundary.
    pub fn cancel(&self) {
        if self.is_running() {
            info!("Cancellation requested");
            self.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Block until the current worker (if any) has finished.
    pub fn wait(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.wait();
    }
}

fn percent(completed: usize, total: usize) -> u8 {
    ((completed * 100) / total.max(1)) as u8
}

/// Run `job` to completion on the current thread.
///
/// Emits [`Notification`]s along the way and returns the terminal state.
pub(crate) fn run_job(
    job: &ConversionJob,
    synth: &dyn Synthesizer,
    events: &NotificationSender,
    cancel: &AtomicBool,
    encoder: &std::path::Path,
) -> JobState {
    let progress = |completed: usize, label: String| {
        let _ = events.send(Notification::Progress {
            percent: percent(completed, job.total_steps()),
            label,
        });
    };
    let fail = |message: String| {
        error!("Conversion failed: {message}");
        let _ = events.send(Notification::Failed { message });
        JobState::Failed
    };

    let layout = OutputLayout::new(job.output_root.clone(), job.basename.clone());
    if let Err(err) = layout.ensure_dirs(&job.formats) {
        return fail(err.to_string());
    }
    synth.set_acceleration(job.use_acceleration);

    let chapter_count = job.chapters.len();
    let announcement = format!("{} by {}.", job.meta.title, job.meta.author);
    let mut artifacts: Vec<WavArtifact> = Vec::new();
    let mut completed = 0usize;

    for (position, chapter) in job.chapters.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            info!(converted = artifacts.len(), "Conversion cancelled");
            return JobState::Cancelled;
        }
        let number = position + 1;
        progress(completed, format!("Converting chapter {number} of {chapter_count}"));

        let dest = layout.chapter_wav(number);
        let intro = (number == 1).then_some(announcement.as_str());
        match convert_chapter(
            synth,
            &chapter.display_name,
            intro,
            &chapter.text,
            &job.voice,
            job.speed,
            &dest,
        ) {
            Ok(true) => {
                info!(chapter = %chapter.display_name, path = %dest.display(), "Converted chapter");
                artifacts.push(WavArtifact {
                    chapter_index: number,
                    title: chapter.display_name.clone(),
                    path: dest,
                });
            }
            Ok(false) => {}
            Err(err) => {
                // Keep going; remaining chapters may still convert.
                warn!(chapter = %chapter.display_name, "Chapter conversion failed: {err}");
            }
        }
        completed += 1;
    }

    if artifacts.is_empty() {
        return fail(crate::error::PipelineError::NoChaptersConverted.to_string());
    }
    if cancel.load(Ordering::SeqCst) {
        info!(converted = artifacts.len(), "Conversion cancelled before packaging");
        return JobState::Cancelled;
    }

    let packager = Packager::new(encoder);
    let mut outputs = OutputArtifacts::default();

    if job.formats.want_m4b {
        progress(completed, "Creating index file".to_string());
        if let Err(err) = package::write_index_file(&layout.index_file(), &job.meta, &artifacts) {
            return fail(err.to_string());
        }
        completed += 1;

        progress(completed, "Creating m4b file".to_string());
        if let Err(err) = packager.create_m4b(
            &artifacts,
            &layout.index_file(),
            job.meta.cover.as_deref(),
            &layout.m4b_file(),
        ) {
            return fail(err.to_string());
        }
        outputs.m4b = Some(layout.m4b_file());
        completed += 1;
    }

    if job.formats.want_mp3 {
        let count = artifacts.len();
        for (i, artifact) in artifacts.iter().enumerate() {
            progress(completed, format!("Creating MP3 {} of {}", i + 1, count));
            match packager.create_mp3(artifact, job.mp3_quality, &layout) {
                Ok(path) => outputs.mp3s.push(path),
                Err(err) => return fail(err.to_string()),
            }
            completed += 1;
        }
        // Skipped chapters produce no MP3 but were counted as steps.
        completed += chapter_count - count;
    }

    if job.keeps_wav() {
        outputs.wavs = artifacts.iter().map(|a| a.path.clone()).collect();
    } else {
        progress(completed, "Cleaning up temporary files".to_string());
        cleanup::remove_wav_files(&artifacts, &layout.dir(OutputKind::Wav));
    }

    let _ = events.send(Notification::Progress {
        percent: 100,
        label: "Conversion complete".to_string(),
    });
    info!(chapters = artifacts.len(), "Conversion complete");
    let _ = events.send(Notification::Completed { outputs });
    JobState::Completed
}
