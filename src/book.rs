//! Book-side data consumed by the conversion pipeline.
//!
//! Chapters arrive here already extracted from the EPUB: plain text plus a
//! display name. A [`ChapterId`] is assigned at extraction time and stays
//! stable for the lifetime of the book, so UI rows and playback events can
//! refer to a chapter without caring about its position in a filtered list.

use std::fmt;

/// Number of words read aloud when previewing a chapter.
pub const PREVIEW_WORD_LIMIT: usize = 25;

/// Stable identifier for a chapter within a loaded book.
///
/// Assigned once when the book is loaded and never reused, even if the
/// visible chapter list is filtered or reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChapterId(pub u32);

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One chapter of the source book, ready for synthesis.
#[derive(Debug, Clone)]
pub struct Chapter {
    pub id: ChapterId,
    /// Human-readable name shown in listings and embedded as the chapter
    /// title in the final audiobook.
    pub display_name: String,
    /// Extracted plain text. May be empty for image-only or decorative
    /// chapters; those are skipped during conversion.
    pub text: String,
}

impl Chapter {
    /// Whether this chapter has any speakable content.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// A short excerpt of the chapter used for preview playback, capped at
    /// [`PREVIEW_WORD_LIMIT`] words with a trailing ellipsis when truncated.
    pub fn preview_text(&self) -> String {
        let words: Vec<&str> = self.text.split_whitespace().collect();
        if words.len() <= PREVIEW_WORD_LIMIT {
            words.join(" ")
        } else {
            let mut out = words[..PREVIEW_WORD_LIMIT].join(" ");
            out.push_str("...");
            out
        }
    }
}

/// Book-level metadata carried into the packaged audiobook.
#[derive(Debug, Clone, Default)]
pub struct BookMeta {
    pub title: String,
    pub author: String,
    /// Raw cover image bytes (JPEG or PNG), embedded into the m4b when
    /// present.
    pub cover: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(text: &str) -> Chapter {
        Chapter {
            id: ChapterId(1),
            display_name: "Chapter 1".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn whitespace_only_chapter_has_no_text() {
        assert!(!chapter("   \n\t ").has_text());
        assert!(chapter("words").has_text());
    }

    #[test]
    fn preview_text_keeps_short_chapters_whole() {
        let c = chapter("just a few words\nacross lines");
        assert_eq!(c.preview_text(), "just a few words across lines");
    }

    #[test]
    fn preview_text_truncates_long_chapters() {
        let long = (1..=40)
            .map(|n| format!("w{n}"))
            .collect::<Vec<_>>()
            .join(" ");
        let preview = chapter(&long).preview_text();
        assert!(preview.ends_with("w25..."));
        assert_eq!(preview.split_whitespace().count(), PREVIEW_WORD_LIMIT);
    }
}
