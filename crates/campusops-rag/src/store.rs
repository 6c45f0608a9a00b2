//! Exact nearest-neighbor index over chunk embeddings, with a binary on-disk form.
//!
//! Vectors are kept row-major in one flat `Vec<f32>`. Search is brute force by
//! squared Euclidean distance; row `i` is the `i`-th vector passed to
//! [`VectorIndex::build`].
//!
//! File layout (all little-endian):
//! `b"CRAG"` | version `u32` | dim `u32` | count `u64` | `count * dim` × `f32`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

use crate::app_data;
use crate::error::PersistenceError;

const MAGIC: &[u8; 4] = b"CRAG";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// One search result: the row and its squared distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub row: usize,
    pub distance: f32,
}

impl Eq for Hit {}

impl Ord for Hit {
    /// Closer first; equal distances fall back to insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.row.cmp(&other.row))
    }
}

impl PartialOrd for Hit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dim: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build a fresh index from `vectors`. All rows must share one non-zero dimension.
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dim = vectors.first().map(Vec::len).ok_or(IndexError::Empty)?;
        if dim == 0 {
            return Err(IndexError::ZeroDimension);
        }
        let mut data = Vec::with_capacity(dim * vectors.len());
        for (row, v) in vectors.into_iter().enumerate() {
            if v.len() != dim {
                return Err(IndexError::Ragged {
                    row,
                    expected: dim,
                    got: v.len(),
                });
            }
            data.extend(v);
        }
        Ok(Self { dim, data })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row `i` as a slice, if present.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dim).nth(i)
    }

    /// The `k` rows closest to `query`, nearest first. Asking for more rows than
    /// exist returns all of them.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::QueryDimension {
                expected: self.dim,
                got: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        // Max-heap of the best k seen so far; the root is the worst of them.
        let mut best: BinaryHeap<Hit> = BinaryHeap::with_capacity(k.min(self.len()) + 1);
        for (row, v) in self.data.chunks_exact(self.dim).enumerate() {
            let hit = Hit {
                row,
                distance: squared_l2(query, v),
            };
            if best.len() < k {
                best.push(hit);
            } else if best.peek().is_some_and(|worst| hit < *worst) {
                best.pop();
                best.push(hit);
            }
        }
        Ok(best.into_sorted_vec())
    }

    /// Serialize to `path`, replacing any previous file atomically.
    pub fn persist(&self, path: &Path) -> Result<(), PersistenceError> {
        app_data::write_atomic(path, &self.to_bytes()).map_err(|e| PersistenceError::io(path, e))
    }

    /// Encoded file contents.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dim as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for v in &self.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Read an index written by [`VectorIndex::persist`].
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let bytes = std::fs::read(path).map_err(|e| PersistenceError::io(path, e))?;
        Self::from_bytes(&bytes).map_err(|detail| PersistenceError::corrupt(path, detail))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("file is {} bytes, shorter than the header", bytes.len()));
        }
        let (header, body) = bytes.split_at(HEADER_LEN);
        if &header[0..4] != MAGIC {
            return Err("bad magic".into());
        }
        let version = u32::from_le_bytes(le_array(&header[4..8]));
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }
        let dim = u32::from_le_bytes(le_array(&header[8..12])) as usize;
        let count = u64::from_le_bytes(le_array(&header[12..20]));
        if dim == 0 || count == 0 {
            return Err(format!("empty index (dim {dim}, count {count})"));
        }
        let expected = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(dim))
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| format!("header declares an impossible size ({count} x {dim})"))?;
        if body.len() != expected {
            return Err(format!("expected {expected} data bytes, found {}", body.len()));
        }
        let data = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(le_array(c)))
            .collect();
        Ok(Self { dim, data })
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
    #[error("cannot build an index from zero vectors")]
    Empty,
    #[error("vectors have zero dimension")]
    ZeroDimension,
    #[error("vector {row} has dimension {got}, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("query has dimension {got}, index has {expected}")]
    QueryDimension { expected: usize, got: usize },
}
