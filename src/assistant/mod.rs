//! Query-serving entry point.
//!
//! A question is embedded, the nearest records are retrieved as context, the
//! explanation model answers from that context, and the example model
//! illustrates the explanation. Per-query failures never escape as errors:
//! they become fixed texts or a notice on the returned [`Answer`].


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigError};
use crate::database::KnowledgeBase;
use crate::embeddings::{EmbeddingProvider, OpenAiEmbedder};
use crate::generation::{OpenAiGenerator, TextGenerator};
use crate::retriever::{Retriever, ScoredRecord, context_for};
use crate::{RagError, Result};

pub const EXPLANATION_FAILURE: &str = "Error while querying the explanation model.";
pub const EXAMPLE_FAILURE: &str = "Error while querying the example model.";
pub const NO_CONTEXT_NOTICE: &str =
    "Relevant passages could not be retrieved; the answer was generated without context.";

const QUESTION: &str = "{question}";
const CONTEXT: &str = "{context}";
const EXPLANATION: &str = "{explanation}";

const DEFAULT_EXPLANATION_PROMPT: &str = "You are a teaching assistant specialised in mathematics and science.
Here is a question to explain in detail:

### Question:
{question}

### Context:
{context}

Give a clear and detailed explanation in simple terms, using LaTeX notation for mathematics where needed.";

const DEFAULT_EXAMPLE_PROMPT: &str = "You are a teaching assistant who writes examples to clarify concepts.
Here is an explanation of a mathematical or scientific concept:

### Explanation:
{explanation}

Give one concrete and clear example that illustrates this explanation.";

/// Templates for the two generation calls, stored in the `[prompts]` config section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptTemplates {
    /// Must contain `{question}` and `{context}`
    pub explanation: String,
    /// Must contain `{explanation}`
    pub example: String,
}

impl Default for PromptTemplates {
    #[inline]
    fn default() -> Self {
        Self {
            explanation: DEFAULT_EXPLANATION_PROMPT.to_string(),
            example: DEFAULT_EXAMPLE_PROMPT.to_string(),
        }
    }
}

impl PromptTemplates {
    #[inline]
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let required = [
            ("explanation", &self.explanation, QUESTION),
            ("explanation", &self.explanation, CONTEXT),
            ("example", &self.example, EXPLANATION),
        ];

        for (name, template, placeholder) in required {
            if !template.contains(placeholder) {
                return Err(ConfigError::InvalidPromptTemplate { name, placeholder });
            }
        }
        Ok(())
    }

    #[inline]
    pub fn explanation_prompt(&self, question: &str, context: &str) -> String {
        fill(
            &self.explanation,
            &[(QUESTION, question), (CONTEXT, context)],
        )
    }

    #[inline]
    pub fn example_prompt(&self, explanation: &str) -> String {
        fill(&self.example, &[(EXPLANATION, explanation)])
    }
}

/// Substitute placeholders in one pass, so values containing placeholder text stay literal
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let candidate = &rest[open..];

        match values
            .iter()
            .find(|(placeholder, _)| candidate.starts_with(placeholder))
        {
            Some((placeholder, value)) => {
                output.push_str(value);
                rest = &candidate[placeholder.len()..];
            }
            None => {
                output.push('{');
                rest = &candidate[1..];
            }
        }
    }

    output.push_str(rest);
    output
}

/// One answered question
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub question: String,
    /// Rendered answer as shown to the user
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

/// Conversation memory for one interactive session; dropped when the session ends
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    turns: Vec<Turn>,
}

impl Session {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Questions in the order they were asked
    #[inline]
    pub fn questions(&self) -> impl Iterator<Item = &str> {
        self.turns.iter().map(|turn| turn.question.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn record(&mut self, question: &str, answer: &Answer) {
        self.turns.push(Turn {
            question: question.to_string(),
            answer: answer.render(),
            asked_at: Utc::now(),
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub explanation: String,
    pub example: String,
    /// Retrieved records, most relevant first
    pub sources: Vec<ScoredRecord>,
    /// Set when something went wrong that the user should know about
    pub notice: Option<String>,
}

impl Answer {
    #[inline]
    pub fn render(&self) -> String {
        format!(
            "### Explanation\n{}\n\n### Example\n{}",
            self.explanation, self.example
        )
    }
}

pub struct Assistant {
    knowledge_base: KnowledgeBase,
    embedder: Box<dyn EmbeddingProvider>,
    generator: Box<dyn TextGenerator>,
    prompts: PromptTemplates,
    top_k: usize,
}

impl Assistant {
    #[inline]
    pub fn new(
        knowledge_base: KnowledgeBase,
        embedder: Box<dyn EmbeddingProvider>,
        generator: Box<dyn TextGenerator>,
    ) -> Self {
        Self {
            knowledge_base,
            embedder,
            generator,
            prompts: PromptTemplates::default(),
            top_k: Config::default().retrieval.top_k,
        }
    }

    #[inline]
    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = prompts;
        self
    }

    /// Number of passages retrieved per question, at least one
    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Load the knowledge base and connect both gateways. Any failure here is fatal.
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let knowledge_base = KnowledgeBase::open(config)?;
        let embedder = OpenAiEmbedder::from_config(config)?;
        let generator = OpenAiGenerator::from_config(config)?;

        Ok(Self::new(knowledge_base, Box::new(embedder), Box::new(generator))
            .with_prompts(config.prompts.clone())
            .with_top_k(config.retrieval.top_k))
    }

    #[inline]
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    /// Answer a question and append the turn to `session`.
    ///
    /// Only a blank question is rejected; every later failure is folded into
    /// the returned answer.
    #[inline]
    pub fn answer(&self, session: &mut Session, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuery("question is empty".to_string()));
        }

        info!("Answering question: {}", question);

        let (sources, notice) = match self.retrieve(question) {
            Ok(sources) => (sources, None),
            Err(e) => {
                warn!("Retrieval failed, continuing without context: {}", e);
                (Vec::new(), Some(NO_CONTEXT_NOTICE.to_string()))
            }
        };
        let context = context_for(&sources);

        let (explanation, example) = match self
            .generator
            .generate(&self.prompts.explanation_prompt(question, &context))
        {
            Ok(explanation) => {
                let example = self
                    .generator
                    .generate(&self.prompts.example_prompt(&explanation))
                    .unwrap_or_else(|e| {
                        error!("Example model failed: {}", e);
                        EXAMPLE_FAILURE.to_string()
                    });
                (explanation, example)
            }
            Err(e) => {
                error!("Explanation model failed: {}", e);
                (EXPLANATION_FAILURE.to_string(), EXAMPLE_FAILURE.to_string())
            }
        };

        let answer = Answer {
            explanation,
            example,
            sources,
            notice,
        };
        session.record(question, &answer);
        debug!("Session now holds {} turns", session.len());

        Ok(answer)
    }

    fn retrieve(&self, question: &str) -> Result<Vec<ScoredRecord>> {
        let query = self.embedder.embed(question)?;
        Retriever::new(&self.knowledge_base).retrieve(&query, self.top_k)
    }
}
