// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the retrieval engine.
//!
//! Adapters and the CLI use `anyhow`; everything that can touch the
//! passage/vector pairing reports one of these variants instead.

use thiserror::Error;

/// Result alias for engine, index and snapshot operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// Bad chunking or search parameters, rejected before any work begins.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The embedding provider could not be loaded or invoked.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index is empty")]
    EmptyIndex,

    /// An ingest failed; the index and passage store are unchanged.
    #[error("ingest failed: {0}")]
    IngestFailed(#[source] Box<RagError>),

    #[error("engine is not ready: build or load an index first")]
    NotReady,

    #[error("snapshot storage error: {0}")]
    Snapshot(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl RagError {
    pub(crate) fn embedding(err: anyhow::Error) -> Self {
        RagError::EmbeddingUnavailable(format!("{err:#}"))
    }

    pub(crate) fn ingest(err: RagError) -> Self {
        match err {
            already @ RagError::IngestFailed(_) => already,
            other => RagError::IngestFailed(Box::new(other)),
        }
    }
}
