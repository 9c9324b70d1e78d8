// Indexer module
// Offline pipeline: corpus -> segments -> embeddings file -> index + metadata


use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::corpus::{CHAPTER_KIND, Document, Source};
use crate::database::{IndexedRecord, KnowledgeBase};
use crate::embeddings::{EmbeddingProvider, is_embeddable, segment};
use crate::{RagError, Result, read_input};

/// One segment to embed together with the record that will describe its vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentEntry {
    pub segment: String,
    pub record: IndexedRecord,
}

/// A chapter in the intermediate embeddings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChapter {
    pub id: String,
    #[serde(rename = "type", default = "chapter_kind")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub start_page: Option<u32>,
    #[serde(default)]
    pub end_page: Option<u32>,
    pub content: String,
    pub embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    pub subsections: Vec<EmbeddedSubsection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedSubsection {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub start: Option<u32>,
    pub content: String,
    pub embeddings: Vec<Vec<f32>>,
}

fn chapter_kind() -> String {
    CHAPTER_KIND.to_string()
}

/// A segment whose embedding could not be produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub source_id: String,
    pub segment_index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingReport {
    pub chapters: Vec<EmbeddedChapter>,
    pub failures: Vec<ItemFailure>,
}

/// Parallel vectors and records, ready to become a knowledge base
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexBatch {
    pub vectors: Vec<Vec<f32>>,
    pub records: Vec<IndexedRecord>,
}

/// Statistics about an indexing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub chapters: usize,
    pub subsections: usize,
    pub segments: usize,
    pub embeddings: usize,
    pub failures: usize,
}

impl IndexBatch {
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl EmbeddingReport {
    #[inline]
    pub fn stats(&self) -> IndexingStats {
        let subsections = self.chapters.iter().map(|c| c.subsections.len()).sum();
        let embeddings = self
            .chapters
            .iter()
            .map(|c| {
                c.embeddings.len()
                    + c.subsections
                        .iter()
                        .map(|s| s.embeddings.len())
                        .sum::<usize>()
            })
            .sum::<usize>();

        IndexingStats {
            chapters: self.chapters.len(),
            subsections,
            segments: embeddings + self.failures.len(),
            embeddings,
            failures: self.failures.len(),
        }
    }
}

/// Walk the document in alignment order and pair every segment with its record.
///
/// Each chapter's own segments come first, then each of its subsections in
/// order, then the next chapter. `position_in_source` restarts at 0 per source.
#[inline]
pub fn flatten(document: &Document, max_length: usize) -> Vec<SegmentEntry> {
    document
        .sources()
        .flat_map(|source| {
            segment(source.content, max_length)
                .into_iter()
                .filter(|s| is_embeddable(s))
                .enumerate()
                .map(|(position, segment)| SegmentEntry {
                    record: IndexedRecord::from_source(&source, position),
                    segment,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Count what an indexing run would embed, without calling the embedder
#[inline]
pub fn plan(document: &Document, max_length: usize) -> IndexingStats {
    let segments = flatten(document, max_length).len();
    IndexingStats {
        chapters: document.data.len(),
        subsections: document.data.iter().map(|c| c.subsections.len()).sum(),
        segments,
        embeddings: 0,
        failures: 0,
    }
}

/// Segment and embed every source of the document.
///
/// A failing segment is logged, recorded and skipped; the rest of the
/// document is still embedded.
#[inline]
pub fn embed_document(
    document: &Document,
    embedder: &dyn EmbeddingProvider,
    max_length: usize,
) -> EmbeddingReport {
    embed_document_with_progress(document, embedder, max_length, &ProgressBar::hidden())
}

/// Same as [`embed_document`], advancing `bar` once per source
#[inline]
pub fn embed_document_with_progress(
    document: &Document,
    embedder: &dyn EmbeddingProvider,
    max_length: usize,
    bar: &ProgressBar,
) -> EmbeddingReport {
    let mut failures = Vec::new();
    let mut chapters = Vec::with_capacity(document.data.len());

    for (number, chapter) in document.data.iter().enumerate() {
        info!(
            "Embedding chapter {}/{}: {}",
            number + 1,
            document.data.len(),
            chapter.title
        );

        let chapter_source = chapter.source();
        bar.set_message(chapter.title.clone());
        let embeddings = embed_source(&chapter_source, embedder, max_length, &mut failures);
        bar.inc(1);

        let mut subsections = Vec::with_capacity(chapter.subsections.len());
        for subsection in &chapter.subsections {
            debug!("Embedding subsection: {}", subsection.title);
            let source = subsection.source(&chapter_source.id);
            bar.set_message(subsection.title.clone());
            let embeddings = embed_source(&source, embedder, max_length, &mut failures);
            bar.inc(1);

            subsections.push(EmbeddedSubsection {
                id: source.id,
                kind: subsection.kind.clone(),
                title: subsection.title.clone(),
                start: subsection.start,
                content: subsection.content.clone(),
                embeddings,
            });
        }

        chapters.push(EmbeddedChapter {
            id: chapter_source.id,
            kind: CHAPTER_KIND.to_string(),
            title: chapter.title.clone(),
            start_page: chapter.start_page,
            end_page: chapter.end_page,
            content: chapter.content.clone(),
            embeddings,
            subsections,
        });
    }

    if !failures.is_empty() {
        warn!("{} segments could not be embedded", failures.len());
    }

    EmbeddingReport { chapters, failures }
}

fn embed_source(
    source: &Source<'_>,
    embedder: &dyn EmbeddingProvider,
    max_length: usize,
    failures: &mut Vec<ItemFailure>,
) -> Vec<Vec<f32>> {
    let segments = segment(source.content, max_length);
    let mut embeddings = Vec::with_capacity(segments.len());

    for (segment_index, text) in segments.iter().filter(|s| is_embeddable(s)).enumerate() {
        match embedder.embed(text) {
            Ok(vector) => embeddings.push(vector),
            Err(e) => {
                warn!(
                    "Failed to embed segment {} of {}: {}",
                    segment_index, source.id, e
                );
                failures.push(ItemFailure {
                    source_id: source.id.clone(),
                    segment_index,
                    message: e.to_string(),
                });
            }
        }
    }

    embeddings
}

/// Flatten embedded chapters into parallel vectors and records.
///
/// `position_in_source` is the index of the embedding within its source's
/// list, so it stays contiguous even when a segment was skipped.
#[inline]
pub fn flatten_embedded(chapters: &[EmbeddedChapter]) -> IndexBatch {
    let mut batch = IndexBatch::default();

    for chapter in chapters {
        for (position, vector) in chapter.embeddings.iter().enumerate() {
            batch.vectors.push(vector.clone());
            batch.records.push(IndexedRecord {
                source_id: chapter.id.clone(),
                kind: CHAPTER_KIND.to_string(),
                title: chapter.title.clone(),
                content: chapter.content.clone(),
                position_in_source: position,
                start_page: chapter.start_page,
                end_page: chapter.end_page,
                start: None,
            });
        }

        for subsection in &chapter.subsections {
            for (position, vector) in subsection.embeddings.iter().enumerate() {
                batch.vectors.push(vector.clone());
                batch.records.push(IndexedRecord {
                    source_id: subsection.id.clone(),
                    kind: subsection.kind.clone(),
                    title: subsection.title.clone(),
                    content: subsection.content.clone(),
                    position_in_source: position,
                    start_page: None,
                    end_page: None,
                    start: subsection.start,
                });
            }
        }
    }

    batch
}

/// Write the intermediate embeddings file as indented JSON
#[inline]
pub fn save_embeddings(path: &Path, chapters: &[EmbeddedChapter]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, chapters)
        .map_err(|e| RagError::Other(anyhow::Error::new(e)))?;
    writer.flush()?;

    debug!(
        "Wrote {} embedded chapters to {}",
        chapters.len(),
        path.display()
    );
    Ok(())
}

#[inline]
pub fn load_embeddings(path: &Path) -> Result<Vec<EmbeddedChapter>> {
    let content = read_input(path)?;
    serde_json::from_slice(&content).map_err(|e| RagError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Runs the offline pipeline against the paths named in the configuration
pub struct Indexer<'a> {
    config: &'a Config,
    embedder: &'a dyn EmbeddingProvider,
    show_progress: bool,
}

impl<'a> Indexer<'a> {
    #[inline]
    pub fn new(config: &'a Config, embedder: &'a dyn EmbeddingProvider) -> Self {
        Self {
            config,
            embedder,
            show_progress: console::user_attended_stderr(),
        }
    }

    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Embed the configured corpus and write the embeddings file
    #[inline]
    pub fn embed_corpus(&self) -> Result<EmbeddingReport> {
        let corpus_path = self.config.corpus_path();
        let document = Document::load(&corpus_path)?;
        info!(
            "Embedding {} chapters from {}",
            document.data.len(),
            corpus_path.display()
        );

        let bar = self.progress_bar(document.sources().count());
        let report = embed_document_with_progress(
            &document,
            self.embedder,
            self.config.segmenting.max_segment_length,
            &bar,
        );
        bar.finish_and_clear();

        let embeddings_path = self.config.embeddings_path();
        save_embeddings(&embeddings_path, &report.chapters)?;

        let stats = report.stats();
        info!(
            "Saved {} embeddings for {} chapters and {} subsections to {} ({} failures)",
            stats.embeddings,
            stats.chapters,
            stats.subsections,
            embeddings_path.display(),
            stats.failures
        );

        Ok(report)
    }

    /// Embed the corpus, then build and store the knowledge base
    #[inline]
    pub fn run(&self) -> Result<(EmbeddingReport, KnowledgeBase)> {
        let report = self.embed_corpus()?;
        let knowledge_base = build_knowledge_base(self.config)?;
        Ok((report, knowledge_base))
    }

    fn progress_bar(&self, sources: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bar = ProgressBar::new(sources as u64).with_style(style);
        bar.set_position(0);
        bar
    }
}

/// Build the index and metadata from the embeddings file and store both
#[inline]
pub fn build_knowledge_base(config: &Config) -> Result<KnowledgeBase> {
    let chapters = load_embeddings(&config.embeddings_path())?;
    let batch = flatten_embedded(&chapters);
    info!(
        "Building index from {} embeddings across {} chapters",
        batch.len(),
        chapters.len()
    );

    let knowledge_base = KnowledgeBase::build(&batch.vectors, batch.records)?;
    knowledge_base.save(&config.index_path(), &config.metadata_path())?;
    Ok(knowledge_base)
}
