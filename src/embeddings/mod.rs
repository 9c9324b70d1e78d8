// Embeddings module
// Text segmentation and the embedding gateway

pub mod openai;
pub mod segmenter;

pub use openai::OpenAiEmbedder;
pub use segmenter::{SegmentingConfig, is_embeddable, segment};

use crate::Result;

/// Turns a text into a fixed-dimension vector.
///
/// Every vector produced by one provider has the same length.
pub trait EmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
