//! The text-to-speech seam.
//!
//! The pipeline never talks to a concrete TTS engine directly; it goes
//! through [`Synthesizer`], which keeps the conversion and preview code
//! independent of whichever backend is wired in (and lets tests substitute
//! a deterministic fake).

/// Sample rate of all synthesized audio, in Hz.
pub const SAMPLE_RATE: u32 = 24_000;

/// A text-to-speech backend.
///
/// Implementations must be callable from worker threads.
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into mono f32 sample blocks at [`SAMPLE_RATE`].
    ///
    /// Blocks are returned in playback order; callers concatenate them.
    /// `speed` is a playback-rate multiplier, already validated to lie in
    /// 0.5..=2.0.
    fn synthesize(&self, text: &str, voice: &str, speed: f32) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Hint that hardware acceleration should be used (or not) for
    /// subsequent calls. Backends without the capability ignore it.
    fn set_acceleration(&self, _enabled: bool) {}
}
