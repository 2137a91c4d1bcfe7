//! Single-chapter conversion: synthesize text and write a WAV file.

use crate::error::PipelineError;
use crate::synth::{SAMPLE_RATE, Synthesizer};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A chapter WAV produced by the conversion phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavArtifact {
    /// 1-based position of the chapter in the job's selection. Gaps appear
    /// where chapters were skipped or failed.
    pub chapter_index: usize,
    /// Chapter title embedded into the audiobook index.
    pub title: String,
    pub path: PathBuf,
}

/// Synthesize one chapter into `dest`.
///
/// Returns `Ok(false)` without touching the filesystem when the chapter
/// text is empty or whitespace-only. `announcement`, when given, is spoken
/// before the chapter text (used for the title/author line on the first
/// chapter).
pub fn convert_chapter(
    synth: &dyn Synthesizer,
    chapter: &str,
    announcement: Option<&str>,
    text: &str,
    voice: &str,
    speed: f32,
    dest: &Path,
) -> Result<bool, PipelineError> {
    if text.trim().is_empty() {
        debug!(chapter, "Skipping chapter with no text");
        return Ok(false);
    }
    let spoken = match announcement {
        Some(intro) => format!("{intro}\n{text}"),
        None => text.to_string(),
    };
    let blocks = synth
        .synthesize(&spoken, voice, speed)
        .map_err(|reason| PipelineError::SynthesisFailed {
            chapter: chapter.to_string(),
            reason,
        })?;
    write_wav(dest, &blocks)?;
    Ok(true)
}

/// Write mono f32 sample blocks as a 16-bit WAV at [`SAMPLE_RATE`].
pub(crate) fn write_wav(dest: &Path, blocks: &[Vec<f32>]) -> Result<(), PipelineError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let write = || -> Result<(), hound::Error> {
        let mut writer = hound::WavWriter::create(dest, spec)?;
        for block in blocks {
            for &sample in block {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(value)?;
            }
        }
        writer.finalize()
    };
    write().map_err(|source| PipelineError::WriteFailed {
        path: dest.to_path_buf(),
        source,
    })
}
