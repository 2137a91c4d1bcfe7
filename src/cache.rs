//! Per-book cache for output preferences and preview scratch space.
//!
//! Each book gets a directory under `.cache/` named by a hash of its path,
//! holding a small TOML file with the last-used output options plus a
//! `preview/` subfolder for temporary preview audio.

use crate::job::OutputOptions;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CACHE_DIR: &str = ".cache";

/// Cache directory for a given book path, rooted at `root`.
pub fn hash_dir(root: &Path, book_path: &Path) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(book_path.as_os_str().to_string_lossy().as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    root.join(CACHE_DIR).join(hash)
}

/// Scratch directory for preview audio of a given book.
pub fn preview_dir(root: &Path, book_path: &Path) -> PathBuf {
    hash_dir(root, book_path).join("preview")
}

fn options_path(root: &Path, book_path: &Path) -> PathBuf {
    hash_dir(root, book_path).join("options.toml")
}

/// Load the saved output options for a book, if present and parseable.
pub fn load_options(root: &Path, book_path: &Path) -> Option<OutputOptions> {
    let path = options_path(root, book_path);
    let data = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(
                path = %path.display(),
                "No cached output options found or unreadable: {err}"
            );
            return None;
        }
    };
    match toml::from_str(&data) {
        Ok(options) => {
            debug!("Loaded cached output options");
            Some(options)
        }
        Err(err) => {
            warn!("Cached output options invalid: {err}");
            None
        }
    }
}

/// Persist the output options for a book. Errors are logged and ignored to
/// keep the UI responsive.
pub fn save_options(root: &Path, book_path: &Path, options: &OutputOptions) {
    let path = options_path(root, book_path);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Ok(contents) = toml::to_string(options) {
        if let Err(err) = fs::write(&path, contents) {
            warn!(path = %path.display(), "Failed to save output options: {err}");
        } else {
            debug!(path = %path.display(), "Persisted output options");
        }
    }
}
