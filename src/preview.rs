//! Preview playback of chapter excerpts.
//!
//! A [`PreviewPlayer`] owns the audio output for its whole lifetime and a
//! small pool of temporary WAV slots. Each preview synthesizes a short
//! excerpt on a background thread, writes it into a pool slot and plays it
//! through a rodio sink. A monitor thread polls the sink every 100 ms and
//! reports the playing-to-stopped transition as
//! [`Notification::PreviewFinished`], so the UI can reset its play button
//! without owning any audio state.

use crate::book::{Chapter, ChapterId};
use crate::convert;
use crate::error::PipelineError;
use crate::events::{Notification, NotificationSender};
use crate::synth::Synthesizer;
use crate::tempfiles::PreviewPool;
use anyhow::Context;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

struct ActivePreview {
    chapter: ChapterId,
    slot: usize,
    sink: Sink,
}

struct Shared {
    events: NotificationSender,
    pool: Mutex<PreviewPool>,
    current: Mutex<Option<ActivePreview>>,
    /// Bumped on every play/stop; in-flight synthesis from an older
    /// request discards its result instead of playing stale audio.
    request: AtomicU64,
    shutdown: AtomicBool,
}

/// Plays short chapter excerpts through the default audio output.
pub struct PreviewPlayer {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    shared: Arc<Shared>,
    monitor: Option<JoinHandle<()>>,
}

impl PreviewPlayer {
    /// Open the default audio output and start the playback monitor.
    pub fn new(events: NotificationSender, preview_dir: PathBuf) -> anyhow::Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("Failed to open the default audio output")?;
        let shared = Arc::new(Shared {
            events,
            pool: Mutex::new(PreviewPool::new(preview_dir)),
            current: Mutex::new(None),
            request: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        });
        let monitor = thread::spawn({
            let shared = Arc::clone(&shared);
            move || monitor_loop(&shared)
        });
        Ok(Self {
            _stream: stream,
            handle,
            shared,
            monitor: Some(monitor),
        })
    }

    /// Start (or restart) preview playback for `chapter`.
    ///
    /// Any preview already playing is stopped first. Fails with
    /// [`PipelineError::ResourceBusy`] when every temp slot is still held
    /// by the audio backend.
    pub fn play(
        &self,
        chapter: &Chapter,
        voice: &str,
        speed: f32,
        synth: Arc<dyn Synthesizer>,
    ) -> Result<(), PipelineError> {
        self.stop();
        let text = chapter.preview_text();
        if text.is_empty() {
            debug!(chapter = %chapter.id, "Nothing to preview");
            return Ok(());
        }
        let (slot, path) = self.shared.pool.lock().expect("preview pool lock").acquire()?;
        let request = self.shared.request.fetch_add(1, Ordering::SeqCst) + 1;

        let shared = Arc::clone(&self.shared);
        let handle = self.handle.clone();
        let id = chapter.id;
        let voice = voice.to_string();
        thread::spawn(move || {
            let played = synth_and_play(
                &shared, &handle, request, id, slot, &path, &text, &voice, speed,
                synth.as_ref(),
            );
            if let Err(message) = played {
                warn!(chapter = %id, "Preview failed: {message}");
                shared.pool.lock().expect("preview pool lock").release(slot);
                let _ = shared
                    .events
                    .send(Notification::PreviewFailed { chapter: id, message });
            }
        });
        Ok(())
    }

    /// Stop the current preview, if any.
    pub fn stop(&self) {
        self.shared.request.fetch_add(1, Ordering::SeqCst);
        let mut current = self.shared.current.lock().expect("preview state lock");
        if let Some(active) = current.take() {
            active.sink.stop();
            self.shared.pool.lock().expect("preview pool lock").release(active.slot);
            let _ = self.shared.events.send(Notification::PreviewFinished {
                chapter: active.chapter,
            });
            debug!(chapter = %active.chapter, "Preview stopped");
        }
    }
}

impl Drop for PreviewPlayer {
    fn drop(&mut self) {
        self.stop();
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn synth_and_play(
    shared: &Shared,
    handle: &OutputStreamHandle,
    request: u64,
    chapter: ChapterId,
    slot: usize,
    path: &Path,
    text: &str,
    voice: &str,
    speed: f32,
    synth: &dyn Synthesizer,
) -> Result<(), String> {
    let blocks = synth
        .synthesize(text, voice, speed)
        .map_err(|err| format!("synthesis failed: {err}"))?;
    convert::write_wav(path, &blocks).map_err(|err| err.to_string())?;

    let mut current = shared.current.lock().expect("preview state lock");
    if shared.request.load(Ordering::SeqCst) != request {
        // Superseded while synthesizing; drop the result quietly.
        drop(current);
        shared.pool.lock().expect("preview pool lock").release(slot);
        debug!(%chapter, "Discarding stale preview audio");
        return Ok(());
    }

    let file = File::open(path).map_err(|err| format!("could not open preview audio: {err}"))?;
    let source =
        Decoder::new(BufReader::new(file)).map_err(|err| format!("could not decode preview audio: {err}"))?;
    let sink = Sink::try_new(handle).map_err(|err| format!("could not open playback sink: {err}"))?;
    sink.append(source);
    *current = Some(ActivePreview { chapter, slot, sink });
    let _ = shared.events.send(Notification::PreviewStarted { chapter });
    info!(%chapter, "Preview playing");
    Ok(())
}

/// Poll the active sink and report when playback has run out.
fn monitor_loop(shared: &Shared) {
    while !shared.shutdown.load(Ordering::SeqCst) {
        {
            let mut current = shared.current.lock().expect("preview state lock");
            let finished = current.as_ref().is_some_and(|active| active.sink.empty());
            if finished {
                let active = current.take().expect("checked above");
                shared.pool.lock().expect("preview pool lock").release(active.slot);
                let _ = shared.events.send(Notification::PreviewFinished {
                    chapter: active.chapter,
                });
                debug!(chapter = %active.chapter, "Preview finished");
            }
        }
        thread::sleep(MONITOR_INTERVAL);
    }
}
