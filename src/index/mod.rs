// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index and its on-disk snapshot.

pub mod snapshot;
pub mod vector;

pub use snapshot::{SnapshotInfo, SnapshotMeta};
pub use vector::{Neighbor, Passage, VectorIndex};
