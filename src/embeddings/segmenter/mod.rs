
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default character budget per segment
pub const DEFAULT_MAX_SEGMENT_LENGTH: usize = 8000;

/// Configuration for segmenting source texts before embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SegmentingConfig {
    /// Character count a segment may exceed only by the word that closed it
    pub max_segment_length: usize,
}

impl Default for SegmentingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_segment_length: DEFAULT_MAX_SEGMENT_LENGTH,
        }
    }
}

/// Split text into word-bounded segments.
///
/// Words are appended to a growing candidate. As soon as the candidate, joined
/// with single spaces, holds more than `max_length` characters it is emitted and
/// a fresh candidate is started. The length is a character count, not a token
/// count. A word longer than `max_length` is emitted on its own, never split.
#[inline]
pub fn segment(text: &str, max_length: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    // Character length of `current.join(" ")`
    let mut current_len = 0;

    for word in text.split_whitespace() {
        if !current.is_empty() {
            current_len += 1;
        }
        current_len += word.chars().count();
        current.push(word);

        if current_len > max_length {
            segments.push(current.join(" "));
            current.clear();
            current_len = 0;
        }
    }

    if !current.is_empty() {
        segments.push(current.join(" "));
    }

    debug!(
        "Segmented {} characters into {} segments (max length {})",
        text.len(),
        segments.len(),
        max_length
    );

    segments
}

/// Whether a segment carries anything worth embedding
#[inline]
pub fn is_embeddable(segment: &str) -> bool {
    !segment.trim().is_empty()
}
