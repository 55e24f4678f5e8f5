// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns source text into passages and passages into vectors
//!
//! The chunker is a pure function of its inputs; providers wrap a model (or a
//! stand-in for one) behind the `EmbeddingProvider` trait so the engine can
//! own whichever one it is handed.

pub mod chunker;
pub mod provider;

pub use chunker::{chunk, ChunkConfig, Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use provider::{
    provider_from_config, CommandProvider, EmbeddingProvider, FastEmbedSettings, FastEmbedder,
    HashingProvider,
};
