// Generation module
// Prompt-to-text gateway used for explanations and examples

pub mod openai;

pub use openai::OpenAiGenerator;

use crate::Result;

/// Produces a completion for a single user prompt
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}
