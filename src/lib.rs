// SPDX-License-Identifier: MIT OR Apache-2.0

//! ragdex - Local retrieval engine library
//!
//! Splits source text into overlapping passages, embeds them, keeps them in
//! a persistent nearest-neighbor index and serves top-k queries, so a front
//! end can hand the retrieved passages to a generation service.

pub mod config;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod generation;
pub mod index;
pub mod output;
pub mod sources;
pub mod utils;

pub use engine::{BuildOutcome, RetrievalEngine, RetrievedPassage};
pub use errors::{RagError, Result};
