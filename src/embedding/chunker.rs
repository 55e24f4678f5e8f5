// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text chunker for embedding generation.
//!
//! Splits source text into overlapping, fixed-size passages. Sizes are
//! measured in characters, so a window never splits a code point.

use rayon::prelude::*;

use crate::errors::{RagError, Result};

/// Default number of characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Maximum source size in bytes accepted for chunking.
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 20_000_000;

/// Configuration for the text chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Number of characters per chunk.
    pub chunk_size: usize,
    /// Number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Maximum source size in bytes.
    pub max_source_bytes: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

impl ChunkConfig {
    /// Creates a new ChunkConfig with the specified parameters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        })
    }

    /// Sets the maximum source size.
    pub fn with_max_source_bytes(mut self, size: usize) -> Self {
        self.max_source_bytes = size;
        self
    }
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidConfiguration(
            "chunk_size must be greater than 0".to_string(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidConfiguration(format!(
            "chunk_overlap ({}) must be less than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    Ok(())
}

/// Splits `text` into overlapping windows of `size` characters.
///
/// Algorithm:
/// ```text
/// start = 0
/// step = size - overlap
/// loop:
///   end = min(start + size, total_chars)
///   emit text[start..end]
///   if end == total_chars: stop
///   start += step
/// ```
///
/// Laying the chunks end to end while dropping the first `overlap`
/// characters of every chunk after the first reconstructs `text` exactly.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    validate(size, overlap)?;
    Ok(split(text, size, overlap))
}

fn split(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;
    let step = size - overlap;

    let mut chunks = Vec::with_capacity(total.div_ceil(step));
    let mut start = 0_usize;
    loop {
        let end = (start + size).min(total);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        if end == total {
            break;
        }
        start += step;
    }

    chunks
}

/// Splits text into overlapping passages using a validated configuration.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    /// Creates a new chunker, rejecting configurations that would never advance.
    pub fn new(config: ChunkConfig) -> Result<Self> {
        validate(config.chunk_size, config.chunk_overlap)?;
        Ok(Self { config })
    }

    /// Checks if a source is too large for chunking.
    pub fn is_source_too_large(&self, content: &str) -> bool {
        content.len() > self.config.max_source_bytes
    }

    /// Splits one source into passages.
    pub fn chunk_text(&self, content: &str) -> Result<Vec<String>> {
        if self.is_source_too_large(content) {
            return Err(RagError::InvalidConfiguration(format!(
                "source of {} bytes exceeds max_source_bytes ({})",
                content.len(),
                self.config.max_source_bytes
            )));
        }
        Ok(split(
            content,
            self.config.chunk_size,
            self.config.chunk_overlap,
        ))
    }

    /// Chunks several sources in parallel, concatenating the passages in
    /// source order.
    pub fn chunk_many<S>(&self, sources: &[S]) -> Result<Vec<String>>
    where
        S: AsRef<str> + Sync,
    {
        let per_source = sources
            .par_iter()
            .map(|source| self.chunk_text(source.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(per_source.into_iter().flatten().collect())
    }
}
