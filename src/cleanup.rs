//! Removal of intermediate WAV files after packaging.

use crate::convert::WavArtifact;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Delete the chapter WAVs a job produced, then the `wav/` folder itself
/// if nothing else is in it.
///
/// Everything here is best-effort: a file that cannot be removed is logged
/// and left behind, and never fails the job.
pub fn remove_wav_files(artifacts: &[WavArtifact], wav_dir: &Path) {
    for artifact in artifacts {
        match fs::remove_file(&artifact.path) {
            Ok(()) => debug!(path = %artifact.path.display(), "Removed chapter WAV"),
            Err(err) => {
                warn!(path = %artifact.path.display(), "Could not remove chapter WAV: {err}")
            }
        }
    }
    match fs::read_dir(wav_dir) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                if let Err(err) = fs::remove_dir(wav_dir) {
                    warn!(path = %wav_dir.display(), "Could not remove WAV folder: {err}");
                }
            } else {
                debug!(path = %wav_dir.display(), "WAV folder not empty, leaving it");
            }
        }
        Err(err) => debug!(path = %wav_dir.display(), "Could not inspect WAV folder: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn artifact(path: PathBuf) -> WavArtifact {
        WavArtifact {
            chapter_index: 1,
            title: "Chapter 1".to_string(),
            path,
        }
    }

    #[test]
    fn removes_listed_wavs_and_the_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        let wav_dir = dir.path().join("wav");
        fs::create_dir_all(&wav_dir).unwrap();
        let file = wav_dir.join("b_chapter_1.wav");
        fs::write(&file, b"riff").unwrap();

        remove_wav_files(&[artifact(file.clone())], &wav_dir);
        assert!(!file.exists());
        assert!(!wav_dir.exists());
    }

    #[test]
    fn keeps_the_folder_when_unrelated_files_remain() {
        let dir = tempfile::tempdir().unwrap();
        let wav_dir = dir.path().join("wav");
        fs::create_dir_all(&wav_dir).unwrap();
        let mine = wav_dir.join("b_chapter_1.wav");
        let other = wav_dir.join("keep.txt");
        fs::write(&mine, b"riff").unwrap();
        fs::write(&other, b"notes").unwrap();

        remove_wav_files(&[artifact(mine.clone())], &wav_dir);
        assert!(!mine.exists());
        assert!(other.exists());
        assert!(wav_dir.exists());
    }

    #[test]
    fn missing_files_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let wav_dir = dir.path().join("wav");
        // Neither file nor folder exists; must not panic.
        remove_wav_files(&[artifact(wav_dir.join("gone.wav"))], &wav_dir);
    }
}
