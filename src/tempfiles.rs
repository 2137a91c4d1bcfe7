//! On-disk layout of conversion output and the preview slot pool.

use crate::error::PipelineError;
use crate::job::FormatFlags;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Output subfolder per artifact kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Wav,
    Mp3,
    M4b,
}

impl OutputKind {
    pub fn subdir(self) -> &'static str {
        match self {
            OutputKind::Wav => "wav",
            OutputKind::Mp3 => "mp3",
            OutputKind::M4b => "m4b",
        }
    }
}

/// Where a job's files live.
///
/// Everything is derived from the output root and the basename, so two
/// calls with the same inputs always name the same paths.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    basename: String,
}

impl OutputLayout {
    pub fn new(root: PathBuf, basename: String) -> Self {
        Self { root, basename }
    }

    pub fn dir(&self, kind: OutputKind) -> PathBuf {
        self.root.join(kind.subdir())
    }

    /// WAV file for the 1-based chapter number `index`.
    pub fn chapter_wav(&self, index: usize) -> PathBuf {
        self.dir(OutputKind::Wav)
            .join(format!("{}_chapter_{index}.wav", self.basename))
    }

    /// MP3 file for the 1-based chapter number `index`.
    pub fn chapter_mp3(&self, index: usize) -> PathBuf {
        self.dir(OutputKind::Mp3)
            .join(format!("{}_chapter_{index}.mp3", self.basename))
    }

    pub fn m4b_file(&self) -> PathBuf {
        self.dir(OutputKind::M4b).join(format!("{}.m4b", self.basename))
    }

    /// Chapter index (FFMETADATA) file written next to the m4b.
    pub fn index_file(&self) -> PathBuf {
        self.dir(OutputKind::M4b).join("audiobook_index.txt")
    }

    /// Create the subfolders the requested formats need. The `wav/` folder
    /// is always created since every job synthesizes WAVs first.
    pub fn ensure_dirs(&self, formats: &FormatFlags) -> Result<(), PipelineError> {
        let mut dirs = vec![self.dir(OutputKind::Wav)];
        if formats.want_mp3 {
            dirs.push(self.dir(OutputKind::Mp3));
        }
        if formats.want_m4b {
            dirs.push(self.dir(OutputKind::M4b));
        }
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|source| PipelineError::CreateDirFailed {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Default number of rotating preview slots.
pub const PREVIEW_SLOTS: usize = 3;

/// Fixed pool of temporary WAV files for preview playback.
///
/// Slots rotate so a file still held open by the audio backend (common on
/// Windows right after a preview stops) is simply skipped in favour of the
/// next free slot. Traversal is bounded: if every slot is either in use or
/// undeletable, acquisition fails with [`PipelineError::ResourceBusy`]
/// instead of retrying.
#[derive(Debug)]
pub struct PreviewPool {
    dir: PathBuf,
    in_use: Vec<bool>,
    cursor: usize,
}

impl PreviewPool {
    pub fn new(dir: PathBuf) -> Self {
        Self::with_slots(dir, PREVIEW_SLOTS)
    }

    pub fn with_slots(dir: PathBuf, slots: usize) -> Self {
        assert!(slots > 0, "preview pool needs at least one slot");
        Self {
            dir,
            in_use: vec![false; slots],
            cursor: 0,
        }
    }

    fn slot_path(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("temp_audio_{slot}.wav"))
    }

    /// Claim the next free slot, deleting any stale file occupying it.
    ///
    /// Returns the slot number (for the later [`PreviewPool::release`])
    /// and the path to write into.
    pub fn acquire(&mut self) -> Result<(usize, PathBuf), PipelineError> {
        fs::create_dir_all(&self.dir).map_err(|source| PipelineError::CreateDirFailed {
            path: self.dir.clone(),
            source,
        })?;
        let slots = self.in_use.len();
        for offset in 0..slots {
            let slot = (self.cursor + offset) % slots;
            if self.in_use[slot] {
                continue;
            }
            let path = self.slot_path(slot);
            if path.exists() {
                if let Err(err) = fs::remove_file(&path) {
                    // Likely still locked by the audio backend.
                    debug!(path = %path.display(), "Preview slot busy: {err}");
                    continue;
                }
            }
            self.in_use[slot] = true;
            self.cursor = (slot + 1) % slots;
            return Ok((slot, path));
        }
        warn!("All preview slots are in use");
        Err(PipelineError::ResourceBusy)
    }

    /// Return a slot to the pool once its file is no longer being played.
    pub fn release(&mut self, slot: usize) {
        if let Some(flag) = self.in_use.get_mut(slot) {
            *flag = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn layout() -> OutputLayout {
        OutputLayout::new(PathBuf::from("/out"), "My Book".to_string())
    }

    #[test]
    fn paths_follow_the_documented_layout() {
        let l = layout();
        assert_eq!(l.chapter_wav(3), Path::new("/out/wav/My Book_chapter_3.wav"));
        assert_eq!(l.chapter_mp3(12), Path::new("/out/mp3/My Book_chapter_12.mp3"));
        assert_eq!(l.m4b_file(), Path::new("/out/m4b/My Book.m4b"));
        assert_eq!(l.index_file(), Path::new("/out/m4b/audiobook_index.txt"));
    }

    #[test]
    fn ensure_dirs_creates_only_requested_folders() {
        let dir = tempfile::tempdir().unwrap();
        let l = OutputLayout::new(dir.path().to_path_buf(), "b".to_string());
        l.ensure_dirs(&FormatFlags {
            want_m4b: true,
            want_mp3: false,
            keep_wav: false,
        })
        .unwrap();
        assert!(l.dir(OutputKind::Wav).is_dir());
        assert!(l.dir(OutputKind::M4b).is_dir());
        assert!(!l.dir(OutputKind::Mp3).exists());
    }

    #[test]
    fn pool_rotates_and_reuses_released_slots() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = PreviewPool::with_slots(dir.path().to_path_buf(), 3);

        let (s0, p0) = pool.acquire().unwrap();
        let (s1, _) = pool.acquire().unwrap();
        let (s2, _) = pool.acquire().unwrap();
        assert_eq!((s0, s1, s2), (0, 1, 2));

        pool.release(s0);
        let (again, path) = pool.acquire().unwrap();
        assert_eq!(again, 0);
        assert_eq!(path, p0);
    }

    #[test]
    fn exhausted_pool_reports_busy_instead_of_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = PreviewPool::with_slots(dir.path().to_path_buf(), 2);
        pool.acquire().unwrap();
        pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(PipelineError::ResourceBusy)));
    }

    #[test]
    fn stale_files_are_deleted_before_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = PreviewPool::with_slots(dir.path().to_path_buf(), 2);
        let (slot, path) = pool.acquire().unwrap();
        fs::write(&path, b"stale").unwrap();
        pool.release(slot);

        // Force rotation back to slot 0.
        pool.acquire().unwrap();
        let (again, path2) = pool.acquire().unwrap();
        assert_eq!(again, slot);
        assert_eq!(path, path2);
        assert!(!path.exists(), "stale file should be removed on reuse");
    }
}
