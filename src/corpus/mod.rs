//! Hierarchical corpus input: chapters containing typed subsections.
//!
//! The corpus file is a JSON object `{ "data": [chapter, ...] }`. Chapters and
//! subsections are immutable inputs to the offline pipeline; their ids are
//! derived from titles so the same corpus always produces the same ids.


use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{RagError, Result, read_input};

/// Record type used for chapter-level text
pub const CHAPTER_KIND: &str = "chapter";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub data: Vec<Chapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    #[serde(rename = "chapter")]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub start_page: Option<u32>,
    #[serde(default)]
    pub end_page: Option<u32>,
    #[serde(default)]
    pub subsections: Vec<Subsection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subsection {
    /// Free-form tag such as "definition" or "example"
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub start: Option<u32>,
}

/// Where a source sits in the printed corpus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
    pub start: Option<u32>,
}

/// A chapter or subsection viewed as one indexable text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source<'a> {
    pub id: String,
    pub kind: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub location: Location,
}

/// Lowercase a title and replace spaces with underscores
#[inline]
pub fn normalize_id(title: &str) -> String {
    title.replace(' ', "_").to_lowercase()
}

#[inline]
pub fn subsection_id(chapter_id: &str, kind: &str, title: &str) -> String {
    format!(
        "{}_{}_{}",
        chapter_id,
        kind.to_lowercase(),
        normalize_id(title)
    )
}

impl Document {
    /// Read and validate a corpus file
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let content = read_input(path)?;
        let document: Self = serde_json::from_slice(&content).map_err(|e| RagError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        document.validate()?;

        debug!(
            "Loaded corpus {} with {} chapters",
            path.display(),
            document.data.len()
        );

        Ok(document)
    }

    /// Chapter ids must be unique; subsection collisions are only reported
    #[inline]
    pub fn validate(&self) -> Result<()> {
        let mut chapter_ids = HashSet::new();
        let mut subsection_ids = HashSet::new();

        for chapter in &self.data {
            let chapter_id = chapter.id();
            for subsection in &chapter.subsections {
                let id = subsection.id(&chapter_id);
                if !subsection_ids.insert(id.clone()) {
                    warn!("Duplicate subsection id {} in chapter {}", id, chapter.title);
                }
            }

            if !chapter_ids.insert(chapter_id.clone()) {
                return Err(RagError::InvalidCorpus(format!(
                    "duplicate chapter id '{}' (title '{}')",
                    chapter_id, chapter.title
                )));
            }
        }

        Ok(())
    }

    /// Every source in indexing order: each chapter, then its subsections in order
    #[inline]
    pub fn sources(&self) -> impl Iterator<Item = Source<'_>> {
        self.data.iter().flat_map(|chapter| {
            let chapter_source = chapter.source();
            let chapter_id = chapter_source.id.clone();
            std::iter::once(chapter_source).chain(
                chapter
                    .subsections
                    .iter()
                    .map(move |subsection| subsection.source(&chapter_id)),
            )
        })
    }
}

impl Chapter {
    #[inline]
    pub fn id(&self) -> String {
        normalize_id(&self.title)
    }

    #[inline]
    pub fn location(&self) -> Location {
        Location {
            start_page: self.start_page,
            end_page: self.end_page,
            start: None,
        }
    }

    #[inline]
    pub fn source(&self) -> Source<'_> {
        Source {
            id: self.id(),
            kind: CHAPTER_KIND,
            title: &self.title,
            content: &self.content,
            location: self.location(),
        }
    }
}

impl Subsection {
    #[inline]
    pub fn id(&self, chapter_id: &str) -> String {
        subsection_id(chapter_id, &self.kind, &self.title)
    }

    #[inline]
    pub fn location(&self) -> Location {
        Location {
            start_page: None,
            end_page: None,
            start: self.start,
        }
    }

    #[inline]
    pub fn source(&self, chapter_id: &str) -> Source<'_> {
        Source {
            id: self.id(chapter_id),
            kind: &self.kind,
            title: &self.title,
            content: &self.content,
            location: self.location(),
        }
    }
}
