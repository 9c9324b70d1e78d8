
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::corpus::{Location, Source};
use crate::{RagError, Result, read_input};

/// Metadata for one indexed segment.
///
/// `content` is the whole source text, not just the segment that was embedded,
/// so a hit returns the full chapter or subsection as context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexedRecord {
    /// Chapter or subsection id
    #[serde(alias = "id")]
    pub source_id: String,
    /// "chapter" or the subsection's type tag
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    /// 0-based position of the segment among its source's segments
    #[serde(alias = "index")]
    pub position_in_source: usize,
    #[serde(default)]
    pub start_page: Option<u32>,
    #[serde(default)]
    pub end_page: Option<u32>,
    #[serde(default)]
    pub start: Option<u32>,
}

impl IndexedRecord {
    #[inline]
    pub fn from_source(source: &Source<'_>, position_in_source: usize) -> Self {
        Self {
            source_id: source.id.clone(),
            kind: source.kind.to_string(),
            title: source.title.to_string(),
            content: source.content.to_string(),
            position_in_source,
            start_page: source.location.start_page,
            end_page: source.location.end_page,
            start: source.location.start,
        }
    }

    #[inline]
    pub fn location(&self) -> Location {
        Location {
            start_page: self.start_page,
            end_page: self.end_page,
            start: self.start,
        }
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Ordered records; position `i` describes vector `i` of the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    records: Vec<IndexedRecord>,
}

impl MetadataStore {
    #[inline]
    pub fn new(records: Vec<IndexedRecord>) -> Self {
        Self { records }
    }

    #[inline]
    pub fn get(&self, position: usize) -> Option<&IndexedRecord> {
        self.records.get(position)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[IndexedRecord] {
        &self.records
    }

    /// Stable 64-bit FNV-1a hash of the records' canonical JSON form; ties an
    /// index file to the metadata it was written with
    #[inline]
    pub fn fingerprint(&self) -> Result<u64> {
        let bytes = serde_json::to_vec(&self.records)
            .map_err(|e| RagError::Other(anyhow::Error::new(e)))?;
        Ok(bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
        }))
    }

    /// Write the records as a pretty-printed JSON array
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &self.records).map_err(|e| {
            RagError::Other(anyhow::anyhow!(
                "Failed to write metadata {}: {}",
                path.display(),
                e
            ))
        })?;
        writer.flush()?;

        debug!("Saved {} records to {}", self.len(), path.display());
        Ok(())
    }

    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let content = read_input(path)?;
        let records: Vec<IndexedRecord> =
            serde_json::from_slice(&content).map_err(|e| RagError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        debug!("Loaded {} records from {}", records.len(), path.display());
        Ok(Self { records })
    }
}
