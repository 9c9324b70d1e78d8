
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{RagError, Result, read_input};

const INDEX_FORMAT: &str = "chapter-rag/flat-l2";
const INDEX_VERSION: u32 = 2;

/// Exact nearest-neighbour index over fixed-dimension vectors.
///
/// Vectors are stored contiguously in insertion order and searched by brute
/// force, so results are exact. Distances are squared Euclidean distances.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
}

/// A search hit: position in the index and its distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// On-disk envelope, bincode encoded
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    format: String,
    version: u32,
    dimension: u64,
    vectors: Vec<f32>,
    /// Fingerprint of the metadata written alongside, if any
    records_fingerprint: Option<u64>,
}

impl FlatIndex {
    /// Empty index accepting vectors of `dimension` components
    #[inline]
    pub const fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// Build from an ordered list of vectors; the first vector fixes the dimension
    #[inline]
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self> {
        let dimension = match vectors.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => return Err(RagError::EmptyIndex),
        };

        let mut index = Self::with_dimension(dimension);
        index.vectors.reserve(dimension * vectors.len());
        for vector in vectors {
            index.add(vector)?;
        }

        info!(
            "Built flat index with {} vectors of dimension {}",
            index.len(),
            dimension
        );
        Ok(index)
    }

    #[inline]
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                found: vector.len(),
            });
        }
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    #[inline]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len().checked_div(self.dimension).unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        self.vectors.get(start..start + self.dimension)
    }

    /// Return up to `k` nearest vectors by ascending distance, ties by position
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(RagError::InvalidQuery(
                "k must be a positive integer".to_string(),
            ));
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                distance: squared_l2(query, vector),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);

        debug!(
            "Searched {} vectors, returning {} neighbours",
            self.len(),
            neighbors.len()
        );
        Ok(neighbors)
    }

    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        self.write_file(path, None)
    }

    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        Self::read_file(path).map(|(index, _)| index)
    }

    /// Write the envelope, optionally tagged with the fingerprint of its metadata
    pub(crate) fn write_file(&self, path: &Path, records_fingerprint: Option<u64>) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let envelope = IndexFile {
            format: INDEX_FORMAT.to_string(),
            version: INDEX_VERSION,
            dimension: self.dimension as u64,
            vectors: self.vectors.clone(),
            records_fingerprint,
        };

        let mut writer = BufWriter::new(fs::File::create(path)?);
        bincode::serialize_into(&mut writer, &envelope).map_err(|e| {
            RagError::Other(anyhow::anyhow!(
                "Failed to write index {}: {}",
                path.display(),
                e
            ))
        })?;
        writer.flush()?;

        debug!("Saved {} vectors to {}", self.len(), path.display());
        Ok(())
    }

    pub(crate) fn read_file(path: &Path) -> Result<(Self, Option<u64>)> {
        let parse_error = |message: String| RagError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let bytes = read_input(path)?;
        let envelope: IndexFile =
            bincode::deserialize(&bytes).map_err(|e| parse_error(e.to_string()))?;

        if envelope.format != INDEX_FORMAT {
            return Err(parse_error(format!(
                "unknown index format '{}'",
                envelope.format
            )));
        }
        if envelope.version != INDEX_VERSION {
            return Err(parse_error(format!(
                "unsupported index version {}",
                envelope.version
            )));
        }

        let dimension = usize::try_from(envelope.dimension)
            .map_err(|_| parse_error(format!("invalid dimension {}", envelope.dimension)))?;
        if dimension == 0 || envelope.vectors.len() % dimension != 0 {
            return Err(parse_error(format!(
                "{} values do not form vectors of dimension {}",
                envelope.vectors.len(),
                dimension
            )));
        }

        let index = Self {
            dimension,
            vectors: envelope.vectors,
        };
        debug!("Loaded {} vectors from {}", index.len(), path.display());
        Ok((index, envelope.records_fingerprint))
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}
