// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only exact nearest-neighbor index over passage embeddings.
//!
//! Every entry pairs a passage with its vector, and positions are assigned
//! in insertion order, so a position returned by `search` always resolves to
//! the passage that produced the vector.

use serde::Serialize;
use std::cmp::Ordering;
use std::ops::Range;

use crate::errors::{RagError, Result};

/// A passage of source text and its position among all ingested passages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Passage {
    pub position: usize,
    pub text: String,
}

/// One search hit: a passage position and its squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

#[derive(Debug, Clone)]
struct Entry {
    passage: Passage,
    vector: Vec<f32>,
}

/// Flat L2 index bound to a single vector dimension.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<Entry>,
}

impl VectorIndex {
    /// Creates an empty index bound to `dimension`.
    pub fn create(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidConfiguration(
                "index dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            entries: Vec::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends passages with their vectors and returns the positions assigned.
    ///
    /// The whole batch is validated first; on error the index is unchanged.
    pub fn add(&mut self, texts: Vec<String>, vectors: Vec<Vec<f32>>) -> Result<Range<usize>> {
        if texts.len() != vectors.len() {
            return Err(RagError::InvalidConfiguration(format!(
                "{} passages but {} vectors",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let first = self.entries.len();
        self.entries.reserve(texts.len());
        for (offset, (text, vector)) in texts.into_iter().zip(vectors).enumerate() {
            self.entries.push(Entry {
                passage: Passage {
                    position: first + offset,
                    text,
                },
                vector,
            });
        }

        Ok(first..self.entries.len())
    }

    /// Returns the `k` nearest entries to `query`, nearest first.
    ///
    /// Equal distances are ordered by position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(RagError::InvalidConfiguration(
                "k must be greater than 0".to_string(),
            ));
        }
        if self.entries.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .entries
            .iter()
            .map(|entry| Neighbor {
                position: entry.passage.position,
                distance: squared_l2(query, &entry.vector),
            })
            .collect();

        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, compare_neighbors);
            neighbors.truncate(k);
        }
        neighbors.sort_by(compare_neighbors);

        Ok(neighbors)
    }

    /// Looks up a passage by position.
    pub fn passage(&self, position: usize) -> Option<&Passage> {
        self.entries.get(position).map(|entry| &entry.passage)
    }

    /// Iterates passages in position order.
    pub fn passages(&self) -> impl Iterator<Item = &Passage> {
        self.entries.iter().map(|entry| &entry.passage)
    }

    /// Iterates `(passage, vector)` pairs in position order.
    pub fn entries(&self) -> impl Iterator<Item = (&Passage, &[f32])> {
        self.entries
            .iter()
            .map(|entry| (&entry.passage, entry.vector.as_slice()))
    }
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.position.cmp(&b.position))
}

/// Squared Euclidean distance, matching the flat L2 convention.
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
