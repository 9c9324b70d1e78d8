// Database module
// Flat L2 vector index plus the positionally aligned metadata store


pub mod flat_index;
pub mod metadata;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub use flat_index::{FlatIndex, Neighbor};
pub use metadata::{IndexedRecord, MetadataStore};

use crate::config::Config;
use crate::{RagError, Result};

/// Index and metadata loaded together; vector `i` is described by record `i`.
///
/// Immutable once constructed. Query code borrows it, it is never shared
/// through globals.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBase {
    index: FlatIndex,
    metadata: MetadataStore,
}

impl KnowledgeBase {
    /// Pair an index with its metadata, rejecting mismatched lengths
    #[inline]
    pub fn new(index: FlatIndex, metadata: MetadataStore) -> Result<Self> {
        if index.len() != metadata.len() {
            return Err(RagError::Misaligned {
                vectors: index.len(),
                records: metadata.len(),
            });
        }
        Ok(Self { index, metadata })
    }

    /// Build from parallel vectors and records
    #[inline]
    pub fn build(vectors: &[Vec<f32>], records: Vec<IndexedRecord>) -> Result<Self> {
        let index = FlatIndex::build(vectors)?;
        Self::new(index, MetadataStore::new(records))
    }

    #[inline]
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    #[inline]
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Write both files next to their targets first and move them into place
    /// only once both writes succeeded. The index carries the metadata
    /// fingerprint so a pair mixed from different builds is caught on load.
    #[inline]
    pub fn save(&self, index_path: &Path, metadata_path: &Path) -> Result<()> {
        let fingerprint = self.metadata.fingerprint()?;
        let index_staging = staging_path(index_path);
        let metadata_staging = staging_path(metadata_path);

        let staged = self
            .index
            .write_file(&index_staging, Some(fingerprint))
            .and_then(|()| self.metadata.save(&metadata_staging));
        if let Err(e) = staged {
            let _ = fs::remove_file(&index_staging);
            let _ = fs::remove_file(&metadata_staging);
            return Err(e);
        }

        fs::rename(&index_staging, index_path)?;
        fs::rename(&metadata_staging, metadata_path)?;

        info!(
            "Stored {} vectors in {} and metadata in {}",
            self.len(),
            index_path.display(),
            metadata_path.display()
        );
        Ok(())
    }

    /// Load both files; any missing, unreadable, corrupt or mismatched file is fatal
    #[inline]
    pub fn load(index_path: &Path, metadata_path: &Path) -> Result<Self> {
        // Metadata first so its absence is reported before index parsing
        let metadata = MetadataStore::load(metadata_path)?;
        let (index, index_fingerprint) = FlatIndex::read_file(index_path)?;
        let knowledge_base = Self::new(index, metadata)?;

        if index_fingerprint != Some(knowledge_base.metadata.fingerprint()?) {
            warn!(
                "{} was not written together with {}",
                index_path.display(),
                metadata_path.display()
            );
            return Err(RagError::Misaligned {
                vectors: knowledge_base.index.len(),
                records: knowledge_base.metadata.len(),
            });
        }

        info!(
            "Loaded knowledge base with {} entries of dimension {}",
            knowledge_base.len(),
            knowledge_base.dimension()
        );
        Ok(knowledge_base)
    }

    /// Load from the paths named in the configuration
    #[inline]
    pub fn open(config: &Config) -> Result<Self> {
        Self::load(&config.index_path(), &config.metadata_path())
    }
}

/// `metadata.json` -> `metadata.json.tmp` in the same directory
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
