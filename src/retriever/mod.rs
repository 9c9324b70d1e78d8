
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::database::{IndexedRecord, KnowledgeBase};

/// A retrieved record with its distance and human-facing relevance percentage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: IndexedRecord,
    pub distance: f32,
    pub relevance: f64,
}

/// Map a distance to a percentage: 100 at distance 0, decreasing towards 0.
/// Rounded to two decimals.
#[inline]
pub fn relevance(distance: f32) -> f64 {
    let score = 100.0 / (1.0 + f64::from(distance));
    (score * 100.0).round() / 100.0
}

/// Top-k lookup over a loaded knowledge base
#[derive(Debug, Clone, Copy)]
pub struct Retriever<'a> {
    knowledge_base: &'a KnowledgeBase,
}

impl<'a> Retriever<'a> {
    #[inline]
    pub const fn new(knowledge_base: &'a KnowledgeBase) -> Self {
        Self { knowledge_base }
    }

    /// Nearest records in index order, most relevant first
    #[inline]
    pub fn retrieve(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        let neighbors = self.knowledge_base.index().search(query, k)?;
        let metadata = self.knowledge_base.metadata();

        let results: Vec<ScoredRecord> = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                let Some(record) = metadata.get(neighbor.position) else {
                    warn!(
                        "Index returned position {} beyond {} metadata records",
                        neighbor.position,
                        metadata.len()
                    );
                    return None;
                };
                Some(ScoredRecord {
                    record: record.clone(),
                    distance: neighbor.distance,
                    relevance: relevance(neighbor.distance),
                })
            })
            .collect();

        debug!(
            "Retrieved {} records: {:?}",
            results.len(),
            results
                .iter()
                .map(|r| (r.record.source_id.as_str(), r.relevance))
                .collect::<Vec<_>>()
        );

        Ok(results)
    }
}

/// Join the full contents of retrieved records into prompt context
#[inline]
pub fn context_for(results: &[ScoredRecord]) -> String {
    results
        .iter()
        .map(|result| result.record.content.as_str())
        .join("\n\n")
}
