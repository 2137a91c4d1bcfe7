//! Packaging of chapter WAVs into the final audiobook formats.
//!
//! All encoding is delegated to an external `ffmpeg` binary. The m4b path
//! concatenates every chapter through a concat list and attaches an
//! FFMETADATA chapter index (and the cover image when one exists); the MP3
//! path encodes each chapter file individually.

use crate::book::BookMeta;
use crate::convert::WavArtifact;
use crate::error::PipelineError;
use crate::job::Mp3Quality;
use crate::synth::SAMPLE_RATE;
use crate::tempfiles::OutputLayout;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

static CHAPTER_INDEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_chapter_(\d+)\.wav$").expect("chapter index regex"));

/// Paths of everything a finished job produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputArtifacts {
    pub m4b: Option<PathBuf>,
    pub mp3s: Vec<PathBuf>,
    /// Chapter WAVs, populated only when the job keeps them.
    pub wavs: Vec<PathBuf>,
}

/// Wraps the external encoder binary.
#[derive(Debug, Clone)]
pub struct Packager {
    encoder: PathBuf,
}

impl Default for Packager {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Packager {
    pub fn new(encoder: impl Into<PathBuf>) -> Self {
        Self {
            encoder: encoder.into(),
        }
    }

    /// Concatenate the chapter WAVs into a single m4b with chapter marks.
    pub fn create_m4b(
        &self,
        artifacts: &[WavArtifact],
        index_file: &Path,
        cover: Option<&[u8]>,
        dest: &Path,
    ) -> Result<(), PipelineError> {
        let artifact = dest.display().to_string();
        let fail = |detail: String| PipelineError::PackagingFailed {
            artifact: artifact.clone(),
            detail,
        };

        let mut list = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .map_err(|err| fail(format!("could not create concat list: {err}")))?;
        for entry in artifacts {
            // Paths in a concat list resolve relative to the list file, so
            // they must be absolute here.
            let abs = entry
                .path
                .canonicalize()
                .unwrap_or_else(|_| entry.path.clone());
            writeln!(list, "file '{}'", escape_concat_path(&abs))
                .map_err(|err| fail(format!("could not write concat list: {err}")))?;
        }
        list.flush()
            .map_err(|err| fail(format!("could not write concat list: {err}")))?;

        let cover_file = match cover {
            Some(bytes) => {
                let mut file = tempfile::Builder::new()
                    .suffix(cover_suffix(bytes))
                    .tempfile()
                    .map_err(|err| fail(format!("could not stage cover image: {err}")))?;
                file.write_all(bytes)
                    .map_err(|err| fail(format!("could not stage cover image: {err}")))?;
                Some(file)
            }
            None => None,
        };

        let args = build_m4b_args(
            list.path(),
            index_file,
            cover_file.as_ref().map(|f| f.path()),
            dest,
        );
        self.run(&args, &artifact)?;
        info!(path = %dest.display(), chapters = artifacts.len(), "Created m4b file");
        Ok(())
    }

    /// Encode one chapter WAV to MP3, numbering the output after the
    /// chapter number in the WAV filename.
    pub fn create_mp3(
        &self,
        artifact: &WavArtifact,
        quality: Mp3Quality,
        layout: &OutputLayout,
    ) -> Result<PathBuf, PipelineError> {
        let index = chapter_index_from_path(&artifact.path).unwrap_or(artifact.chapter_index);
        let dest = layout.chapter_mp3(index);
        let args = build_mp3_args(&artifact.path, quality.bitrate(), &dest);
        self.run(&args, &dest.display().to_string())?;
        debug!(path = %dest.display(), "Created MP3 file");
        Ok(dest)
    }

    fn run(&self, args: &[OsString], artifact: &str) -> Result<(), PipelineError> {
        let output = Command::new(&self.encoder).args(args).output().map_err(|err| {
            PipelineError::PackagingFailed {
                artifact: artifact.to_string(),
                detail: format!(
                    "failed to run {}: {err}. Is ffmpeg installed?",
                    self.encoder.display()
                ),
            }
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = match stderr.trim() {
                "" => format!("encoder exited with {}", output.status),
                text => text.to_string(),
            };
            return Err(PipelineError::PackagingFailed {
                artifact: artifact.to_string(),
                detail,
            });
        }
        Ok(())
    }
}

/// Write the FFMETADATA chapter index for the given artifacts.
///
/// Chapter boundaries come from the actual WAV durations, so the index
/// stays correct even when chapters were skipped.
pub fn write_index_file(
    dest: &Path,
    meta: &BookMeta,
    artifacts: &[WavArtifact],
) -> Result<(), PipelineError> {
    let fail = |detail: String| PipelineError::PackagingFailed {
        artifact: dest.display().to_string(),
        detail,
    };

    let mut contents = String::from(";FFMETADATA1\n");
    contents.push_str(&format!("title={}\n", escape_metadata(&meta.title)));
    contents.push_str(&format!("artist={}\n", escape_metadata(&meta.author)));

    let mut start_ms: u64 = 0;
    for artifact in artifacts {
        let duration = wav_duration_ms(&artifact.path)?;
        let end_ms = start_ms + duration;
        contents.push_str("\n[CHAPTER]\nTIMEBASE=1/1000\n");
        contents.push_str(&format!("START={start_ms}\n"));
        contents.push_str(&format!("END={end_ms}\n"));
        contents.push_str(&format!("title={}\n", escape_metadata(&artifact.title)));
        start_ms = end_ms;
    }

    std::fs::write(dest, contents).map_err(|err| fail(format!("could not write index: {err}")))?;
    debug!(path = %dest.display(), chapters = artifacts.len(), "Created index file");
    Ok(())
}

/// Duration of a WAV file in milliseconds, from its header.
pub fn wav_duration_ms(path: &Path) -> Result<u64, PipelineError> {
    let reader = hound::WavReader::open(path).map_err(|err| PipelineError::PackagingFailed {
        artifact: path.display().to_string(),
        detail: format!("could not read WAV duration: {err}"),
    })?;
    let rate = match reader.spec().sample_rate {
        0 => SAMPLE_RATE,
        rate => rate,
    };
    Ok(u64::from(reader.duration()) * 1000 / u64::from(rate))
}

/// The 1-based chapter number encoded in a WAV filename, if present.
pub fn chapter_index_from_path(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    let captures = CHAPTER_INDEX_RE.captures(name)?;
    captures[1].parse().ok()
}

fn build_m4b_args(
    concat_list: &Path,
    index_file: &Path,
    cover: Option<&Path>,
    dest: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        concat_list.into(),
        "-i".into(),
        index_file.into(),
    ];
    if let Some(cover) = cover {
        args.push("-i".into());
        args.push(cover.into());
    }
    args.push("-map_metadata".into());
    args.push("1".into());
    args.push("-map".into());
    args.push("0:a".into());
    if cover.is_some() {
        for arg in [
            "-map",
            "2:v",
            "-c:v",
            "mjpeg",
            "-disposition:v:0",
            "attached_pic",
        ] {
            args.push(arg.into());
        }
    }
    args.push("-c:a".into());
    args.push("aac".into());
    args.push("-b:a".into());
    args.push("64k".into());
    args.push(dest.into());
    args
}

fn build_mp3_args(wav: &Path, bitrate: &str, dest: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        wav.into(),
        "-codec:a".into(),
        "libmp3lame".into(),
        "-b:a".into(),
        bitrate.into(),
        "-y".into(),
        dest.into(),
    ]
}

/// File suffix for a cover image, sniffed from its magic bytes.
fn cover_suffix(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG") {
        ".png"
    } else {
        ".jpg"
    }
}

/// Escape a value for an FFMETADATA file.
fn escape_metadata(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '=' | ';' | '#' | '\\' | '\n') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escape a path for a `file '...'` line in an ffmpeg concat list.
fn escape_concat_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "'\\''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::write_wav;

    fn wav_artifact(dir: &Path, index: usize, title: &str, samples: usize) -> WavArtifact {
        let path = dir.join(format!("book_chapter_{index}.wav"));
        write_wav(&path, &[vec![0.1; samples]]).unwrap();
        WavArtifact {
            chapter_index: index,
            title: title.to_string(),
            path,
        }
    }

    #[test]
    fn chapter_numbers_parse_from_filenames() {
        assert_eq!(
            chapter_index_from_path(Path::new("/out/wav/Dune_chapter_12.wav")),
            Some(12)
        );
        assert_eq!(
            chapter_index_from_path(Path::new("my_book_chapter_1.wav")),
            Some(1)
        );
        assert_eq!(chapter_index_from_path(Path::new("no_marker.wav")), None);
        assert_eq!(chapter_index_from_path(Path::new("x_chapter_n.wav")), None);
    }

    #[test]
    fn metadata_escaping_covers_reserved_characters() {
        assert_eq!(escape_metadata("a=b;c#d\\e"), "a\\=b\\;c\\#d\\\\e");
        assert_eq!(escape_metadata("plain title"), "plain title");
    }

    #[test]
    fn concat_paths_escape_single_quotes() {
        assert_eq!(
            escape_concat_path(Path::new("/o'brien/ch.wav")),
            "/o'\\''brien/ch.wav"
        );
    }

    #[test]
    fn wav_duration_reflects_sample_count() {
        let dir = tempfile::tempdir().unwrap();
        // 24 000 samples at 24 kHz is exactly one second.
        let a = wav_artifact(dir.path(), 1, "One", SAMPLE_RATE as usize);
        assert_eq!(wav_duration_ms(&a.path).unwrap(), 1000);
        let b = wav_artifact(dir.path(), 2, "Two", SAMPLE_RATE as usize / 2);
        assert_eq!(wav_duration_ms(&b.path).unwrap(), 500);
    }

    #[test]
    fn index_file_accumulates_chapter_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = vec![
            wav_artifact(dir.path(), 1, "Opening", SAMPLE_RATE as usize),
            wav_artifact(dir.path(), 3, "Closing = End", SAMPLE_RATE as usize / 2),
        ];
        let meta = BookMeta {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            cover: None,
        };
        let dest = dir.path().join("audiobook_index.txt");
        write_index_file(&dest, &meta, &artifacts).unwrap();

        let contents = std::fs::read_to_string(&dest).unwrap();
        assert!(contents.starts_with(";FFMETADATA1\n"));
        assert!(contents.contains("title=Dune\n"));
        assert!(contents.contains("artist=Frank Herbert\n"));
        assert!(contents.contains("START=0\nEND=1000\ntitle=Opening\n"));
        assert!(contents.contains("START=1000\nEND=1500\ntitle=Closing \\= End\n"));
        assert_eq!(contents.matches("[CHAPTER]").count(), 2);
    }

    #[test]
    fn m4b_args_reference_all_inputs() {
        let args = build_m4b_args(
            Path::new("/tmp/list.txt"),
            Path::new("/out/m4b/audiobook_index.txt"),
            Some(Path::new("/tmp/cover.jpg")),
            Path::new("/out/m4b/book.m4b"),
        );
        let text: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(text[0], "-y");
        assert!(text.windows(2).any(|w| w == ["-i", "/tmp/list.txt"]));
        assert!(text.windows(2).any(|w| w == ["-i", "/tmp/cover.jpg"]));
        assert!(text.windows(2).any(|w| w == ["-map_metadata", "1"]));
        assert!(text.windows(2).any(|w| w == ["-disposition:v:0", "attached_pic"]));
        assert!(text.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert_eq!(text.last().unwrap(), "/out/m4b/book.m4b");

        let no_cover = build_m4b_args(
            Path::new("/tmp/list.txt"),
            Path::new("/out/m4b/audiobook_index.txt"),
            None,
            Path::new("/out/m4b/book.m4b"),
        );
        let text: Vec<String> = no_cover
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(!text.iter().any(|a| a == "attached_pic"));
    }

    #[test]
    fn cover_suffix_detected_from_magic_bytes() {
        assert_eq!(cover_suffix(b"\x89PNG\r\n\x1a\nrest"), ".png");
        assert_eq!(cover_suffix(b"\xff\xd8\xff\xe0jfif"), ".jpg");
    }

    #[test]
    fn mp3_output_is_numbered_after_the_wav_filename() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path().to_path_buf(), "book".to_string());
        std::fs::create_dir_all(dir.path().join("mp3")).unwrap();
        let artifact = wav_artifact(dir.path(), 7, "Seven", 10);

        // `true` stands in for the encoder so no audio tooling is needed.
        let packager = Packager::new("true");
        let dest = packager
            .create_mp3(&artifact, Mp3Quality::Medium, &layout)
            .unwrap();
        assert_eq!(dest, layout.chapter_mp3(7));
    }

    #[test]
    fn encoder_failure_surfaces_as_packaging_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path().to_path_buf(), "book".to_string());
        let artifact = wav_artifact(dir.path(), 1, "One", 10);

        let packager = Packager::new("false");
        let err = packager
            .create_mp3(&artifact, Mp3Quality::Low, &layout)
            .unwrap_err();
        assert!(matches!(err, PipelineError::PackagingFailed { .. }));
    }

    #[test]
    fn missing_encoder_is_reported_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = vec![wav_artifact(dir.path(), 1, "One", 10)];
        let index = dir.path().join("audiobook_index.txt");
        write_index_file(&index, &BookMeta::default(), &artifacts).unwrap();

        let packager = Packager::new("/nonexistent/encoder-binary");
        let err = packager
            .create_m4b(&artifacts, &index, None, &dir.path().join("book.m4b"))
            .unwrap_err();
        assert!(err.to_string().contains("Is ffmpeg installed?"));
    }
}
