// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval engine: chunk, embed, index and query a growing corpus.
//!
//! The engine starts Empty and becomes Ready once an index is built or a
//! snapshot is loaded. From then on it only grows. Embedding runs outside
//! the index lock; the append itself happens under the write lock, so a
//! concurrent query sees an ingest either completely or not at all.

use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::embedding::{ChunkConfig, Chunker, EmbeddingProvider};
use crate::errors::{RagError, Result};
use crate::index::{snapshot, SnapshotInfo, SnapshotMeta, VectorIndex};

/// A passage returned by a query, with its distance to the question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub position: usize,
    pub text: String,
    pub distance: f32,
}

/// How `build_or_load` reached the Ready state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The source was chunked and embedded, and a new snapshot written
    Built { passages: usize },
    /// An existing snapshot was loaded without embedding anything
    Loaded { passages: usize },
}

impl BuildOutcome {
    pub fn passages(&self) -> usize {
        match self {
            BuildOutcome::Built { passages } | BuildOutcome::Loaded { passages } => *passages,
        }
    }
}

#[derive(Debug)]
enum State {
    Empty,
    Ready(Corpus),
}

#[derive(Debug)]
struct Corpus {
    index: VectorIndex,
    source_hash: Option<String>,
}

pub struct RetrievalEngine {
    chunker: Chunker,
    embedder: Mutex<Box<dyn EmbeddingProvider>>,
    state: RwLock<State>,
}

impl RetrievalEngine {
    /// Creates an Empty engine that owns `embedder`.
    pub fn new(embedder: Box<dyn EmbeddingProvider>, chunk_config: ChunkConfig) -> Result<Self> {
        Ok(Self {
            chunker: Chunker::new(chunk_config)?,
            embedder: Mutex::new(embedder),
            state: RwLock::new(State::Empty),
        })
    }

    pub fn model_id(&self) -> String {
        self.lock_embedder().model_id().to_string()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.read_state(), State::Ready(_))
    }

    /// Number of passages (and vectors) held; zero while Empty.
    pub fn len(&self) -> usize {
        match &*self.read_state() {
            State::Empty => 0,
            State::Ready(corpus) => corpus.index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bound vector dimension, once Ready.
    pub fn dimension(&self) -> Option<usize> {
        match &*self.read_state() {
            State::Empty => None,
            State::Ready(corpus) => Some(corpus.index.dimension()),
        }
    }

    /// Chunks `text`, embeds every passage in one batch and builds a fresh index.
    ///
    /// Only valid while Empty. Text that yields no passages cannot fix a
    /// dimension and is rejected.
    pub fn build_from(&self, text: &str) -> Result<usize> {
        self.ensure_empty()?;

        let passages = self.chunker.chunk_text(text)?;
        if passages.is_empty() {
            return Err(RagError::InvalidConfiguration(
                "source text produced no passages".to_string(),
            ));
        }

        let vectors = self.embed(&passages)?;
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let mut index = VectorIndex::create(dimension)?;
        index.add(passages, vectors)?;
        let count = index.len();

        let mut state = self.write_state();
        if let State::Ready(_) = *state {
            return Err(already_ready());
        }
        *state = State::Ready(Corpus {
            index,
            source_hash: Some(source_hash(text)),
        });

        info!(passages = count, dimension, "index built");
        Ok(count)
    }

    /// Loads the snapshot at `path` if it exists, otherwise builds from
    /// `text` and writes the snapshot.
    ///
    /// An existing snapshot is authoritative: it is never rebuilt, even
    /// when `text` differs from the source it was built from.
    pub fn build_or_load(&self, path: &Path, text: &str) -> Result<BuildOutcome> {
        if path.exists() {
            let info = self.load_snapshot(path)?;
            if let Some(stored) = info.source_hash.as_deref() {
                if stored != source_hash(text) {
                    warn!(
                        path = %path.display(),
                        "source text differs from the one this snapshot was built from; using snapshot as-is"
                    );
                }
            }
            return Ok(BuildOutcome::Loaded {
                passages: info.passages,
            });
        }

        let passages = self.build_from(text)?;
        self.save(path)?;
        Ok(BuildOutcome::Built { passages })
    }

    /// Replaces the Empty state with the snapshot at `path`.
    pub fn load_snapshot(&self, path: &Path) -> Result<SnapshotInfo> {
        self.ensure_empty()?;

        let (index, info) = snapshot::load(path)?;
        let model = self.model_id();
        match info.model.as_deref() {
            Some(stored) if stored != model => warn!(
                snapshot_model = stored,
                model = %model,
                "snapshot was embedded with a different model"
            ),
            _ => {}
        }

        let mut state = self.write_state();
        if let State::Ready(_) = *state {
            return Err(already_ready());
        }
        *state = State::Ready(Corpus {
            index,
            source_hash: info.source_hash.clone(),
        });

        info!(path = %path.display(), passages = info.passages, "snapshot loaded");
        Ok(info)
    }

    /// Writes the current index and passages to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let model = self.model_id();
        let state = self.read_state();
        let State::Ready(corpus) = &*state else {
            return Err(RagError::NotReady);
        };
        snapshot::save(
            path,
            &corpus.index,
            &SnapshotMeta {
                model,
                source_hash: corpus.source_hash.clone(),
            },
        )
    }

    /// Chunks, embeds and appends `text`. Returns the number of passages added.
    ///
    /// On any failure the index and passage store are left exactly as they were.
    pub fn ingest(&self, text: &str) -> Result<usize> {
        self.ensure_ready()?;
        let passages = self.chunker.chunk_text(text).map_err(RagError::ingest)?;
        self.append(passages)
    }

    /// Ingests several sources as one batch, chunking them in parallel.
    pub fn ingest_many<S>(&self, texts: &[S]) -> Result<usize>
    where
        S: AsRef<str> + Sync,
    {
        self.ensure_ready()?;
        let passages = self.chunker.chunk_many(texts).map_err(RagError::ingest)?;
        self.append(passages)
    }

    fn append(&self, passages: Vec<String>) -> Result<usize> {
        if passages.is_empty() {
            debug!("ingest produced no passages");
            return Ok(0);
        }

        let vectors = self.embed(&passages).map_err(RagError::ingest)?;

        let mut state = self.write_state();
        let State::Ready(corpus) = &mut *state else {
            return Err(RagError::NotReady);
        };
        let added = corpus
            .index
            .add(passages, vectors)
            .map_err(RagError::ingest)?;

        info!(
            added = added.len(),
            total = corpus.index.len(),
            "passages ingested"
        );
        Ok(added.len())
    }

    /// Returns the `k` passages nearest to `question`, nearest first.
    pub fn query(&self, question: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .query_scored(question, k)?
            .into_iter()
            .map(|hit| hit.text)
            .collect())
    }

    /// Like `query`, keeping positions and distances.
    pub fn query_scored(&self, question: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        if k == 0 {
            return Err(RagError::InvalidConfiguration(
                "k must be greater than 0".to_string(),
            ));
        }
        self.ensure_ready()?;

        let query = self
            .embed(&[question.to_string()])?
            .pop()
            .ok_or_else(|| RagError::EmbeddingUnavailable("no embedding returned".to_string()))?;

        let state = self.read_state();
        let State::Ready(corpus) = &*state else {
            return Err(RagError::NotReady);
        };

        let neighbors = corpus.index.search(&query, k)?;
        let hits = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                corpus
                    .index
                    .passage(neighbor.position)
                    .map(|passage| RetrievedPassage {
                        position: passage.position,
                        text: passage.text.clone(),
                        distance: neighbor.distance,
                    })
            })
            .collect::<Vec<_>>();

        debug!(k, hits = hits.len(), "query served");
        Ok(hits)
    }

    /// Embeds `texts` in slices of the provider's batch size.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embedder = self.lock_embedder();
        let batch_size = embedder.batch_size().max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let embedded = embedder.embed_texts(batch).map_err(RagError::embedding)?;
            vectors.extend(embedded);
        }
        drop(embedder);

        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} passages",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(RagError::NotReady)
        }
    }

    fn ensure_empty(&self) -> Result<()> {
        if self.is_ready() {
            Err(already_ready())
        } else {
            Ok(())
        }
    }

    fn lock_embedder(&self) -> std::sync::MutexGuard<'_, Box<dyn EmbeddingProvider>> {
        self.embedder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // A panic while holding the lock cannot leave the index half-appended:
    // `VectorIndex::add` validates before it mutates.
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn already_ready() -> RagError {
    RagError::InvalidConfiguration("engine already holds an index; use ingest".to_string())
}

/// blake3 hex digest of a source text.
pub fn source_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{chunk, HashingProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Provider that succeeds for a fixed number of calls, then fails.
    struct FlakyProvider {
        inner: HashingProvider,
        calls_left: Arc<AtomicUsize>,
    }

    impl EmbeddingProvider for FlakyProvider {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        fn batch_size(&self) -> usize {
            self.inner.batch_size()
        }

        fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if self.calls_left.load(Ordering::SeqCst) == 0 {
                anyhow::bail!("model crashed");
            }
            self.calls_left.fetch_sub(1, Ordering::SeqCst);
            self.inner.embed_texts(texts)
        }
    }

    /// Provider whose vector width changes after the first call.
    struct ShrinkingProvider {
        calls: usize,
    }

    impl EmbeddingProvider for ShrinkingProvider {
        fn model_id(&self) -> &str {
            "shrinking"
        }

        fn batch_size(&self) -> usize {
            8
        }

        fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            let width = if self.calls == 0 { 4 } else { 3 };
            self.calls += 1;
            Ok(texts.iter().map(|_| vec![1.0; width]).collect())
        }
    }

    /// Provider that records the size of every batch it is handed.
    struct RecordingProvider {
        inner: HashingProvider,
        batches: Arc<Mutex<Vec<usize>>>,
    }

    impl EmbeddingProvider for RecordingProvider {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        fn batch_size(&self) -> usize {
            2
        }

        fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            self.inner.embed_texts(texts)
        }
    }

    fn engine(size: usize, overlap: usize) -> RetrievalEngine {
        RetrievalEngine::new(
            Box::new(HashingProvider::new(64)),
            ChunkConfig::new(size, overlap).unwrap(),
        )
        .unwrap()
    }

    fn assert_aligned(engine: &RetrievalEngine) {
        let state = engine.read_state();
        if let State::Ready(corpus) = &*state {
            for (i, (passage, vector)) in corpus.index.entries().enumerate() {
                assert_eq!(passage.position, i);
                assert_eq!(vector.len(), corpus.index.dimension());
            }
            assert_eq!(corpus.index.passages().count(), corpus.index.len());
        }
    }

    #[test]
    fn build_matches_chunk_count() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let engine = engine(40, 8);

        let built = engine.build_from(&text).unwrap();
        assert_eq!(built, chunk(&text, 40, 8).unwrap().len());
        assert_eq!(engine.len(), built);
        assert_eq!(engine.dimension(), Some(64));
        assert_aligned(&engine);
    }

    #[test]
    fn operations_before_build_are_not_ready() {
        let engine = engine(5, 0);
        assert!(!engine.is_ready());
        assert!(matches!(engine.ingest("more"), Err(RagError::NotReady)));
        assert!(matches!(engine.query("q", 1), Err(RagError::NotReady)));

        let dir = tempdir().unwrap();
        assert!(matches!(
            engine.save(&dir.path().join("s.sqlite")),
            Err(RagError::NotReady)
        ));
    }

    #[test]
    fn build_from_empty_text_is_rejected() {
        let engine = engine(5, 0);
        assert!(matches!(
            engine.build_from(""),
            Err(RagError::InvalidConfiguration(_))
        ));
        assert!(!engine.is_ready());
    }

    #[test]
    fn second_build_is_rejected() {
        let engine = engine(5, 0);
        engine.build_from("AAAAA BBBBB").unwrap();
        assert!(engine.build_from("CCCCC").is_err());
        assert_eq!(engine.len(), 3);
    }

    #[test]
    fn ingest_appends_in_order() {
        let engine = engine(5, 0);
        engine.build_from("AAAAA BBBBB").unwrap();
        assert_eq!(engine.len(), 3);

        let added = engine.ingest("CCCCCDDDDD").unwrap();
        assert_eq!(added, 2);
        assert_eq!(engine.len(), 5);
        assert_aligned(&engine);

        let hits = engine.query_scored("DDDDD", 1).unwrap();
        assert_eq!(hits[0].position, 4);
        assert_eq!(hits[0].text, "DDDDD");
    }

    #[test]
    fn ingest_empty_text_is_a_no_op() {
        let engine = engine(5, 0);
        engine.build_from("AAAAA").unwrap();
        assert_eq!(engine.ingest("").unwrap(), 0);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn failed_embedding_leaves_store_unchanged() {
        let calls_left = Arc::new(AtomicUsize::new(1));
        let engine = RetrievalEngine::new(
            Box::new(FlakyProvider {
                inner: HashingProvider::new(16),
                calls_left: Arc::clone(&calls_left),
            }),
            ChunkConfig::new(4, 1).unwrap(),
        )
        .unwrap();

        engine.build_from("0123456789").unwrap();
        assert_eq!(engine.len(), 3);

        let err = engine.ingest("abcdefgh").unwrap_err();
        assert!(matches!(err, RagError::IngestFailed(_)));
        assert!(err.to_string().contains("model crashed"));
        assert_eq!(engine.len(), 3);
        assert_aligned(&engine);
    }

    #[test]
    fn embedding_respects_provider_batch_size() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let engine = RetrievalEngine::new(
            Box::new(RecordingProvider {
                inner: HashingProvider::new(16),
                batches: Arc::clone(&batches),
            }),
            ChunkConfig::new(2, 0).unwrap(),
        )
        .unwrap();

        assert_eq!(engine.build_from("aabbccddee").unwrap(), 5);
        assert_eq!(*batches.lock().unwrap(), vec![2, 2, 1]);
        assert_eq!(engine.query("cc", 1).unwrap(), vec!["cc"]);
        assert_aligned(&engine);
    }

    #[test]
    fn failed_add_leaves_store_unchanged() {
        let engine = RetrievalEngine::new(
            Box::new(ShrinkingProvider { calls: 0 }),
            ChunkConfig::new(4, 0).unwrap(),
        )
        .unwrap();

        engine.build_from("abcdefgh").unwrap();
        let err = engine.ingest("ijkl").unwrap_err();
        match err {
            RagError::IngestFailed(cause) => assert!(matches!(
                *cause,
                RagError::DimensionMismatch {
                    expected: 4,
                    actual: 3
                }
            )),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn oversized_ingest_is_reported_as_ingest_failure() {
        let engine = RetrievalEngine::new(
            Box::new(HashingProvider::new(8)),
            ChunkConfig::new(4, 0).unwrap().with_max_source_bytes(10),
        )
        .unwrap();
        engine.build_from("small").unwrap();
        assert!(matches!(
            engine.ingest(&"x".repeat(11)),
            Err(RagError::IngestFailed(_))
        ));
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn query_orders_by_distance_and_caps_at_len() {
        let engine = engine(5, 0);
        engine.build_from("AAAAA BBBBB CCCCC").unwrap();

        let hits = engine.query_scored("CCCCC", 100).unwrap();
        assert_eq!(hits.len(), engine.len());
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

        let mut positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        positions.sort_unstable();
        assert_eq!(positions, (0..engine.len()).collect::<Vec<_>>());
    }

    #[test]
    fn query_rejects_zero_k() {
        let engine = engine(5, 0);
        engine.build_from("AAAAA").unwrap();
        assert!(matches!(
            engine.query("A", 0),
            Err(RagError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn snapshot_roundtrip_answers_identically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.sqlite");

        let original = engine(5, 0);
        let outcome = original
            .build_or_load(&path, "AAAAA BBBBB CCCCC")
            .unwrap();
        assert_eq!(outcome, BuildOutcome::Built { passages: 4 });
        assert!(path.exists());

        let reloaded = engine(5, 0);
        let outcome = reloaded
            .build_or_load(&path, "AAAAA BBBBB CCCCC")
            .unwrap();
        assert_eq!(outcome, BuildOutcome::Loaded { passages: 4 });

        assert_eq!(original.query("BBBBB", 1).unwrap(), vec![" BBBB"]);
        assert_eq!(reloaded.query("BBBBB", 1).unwrap(), vec![" BBBB"]);
        for question in ["AAAAA", "C", "B CCC", "zzz"] {
            assert_eq!(
                original.query_scored(question, 3).unwrap(),
                reloaded.query_scored(question, 3).unwrap()
            );
        }
    }

    #[test]
    fn existing_snapshot_wins_over_new_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.sqlite");

        engine(5, 0).build_or_load(&path, "AAAAA").unwrap();

        let reloaded = engine(5, 0);
        let outcome = reloaded
            .build_or_load(&path, "a completely different document")
            .unwrap();
        assert_eq!(outcome, BuildOutcome::Loaded { passages: 1 });
        assert_eq!(reloaded.query("x", 5).unwrap(), vec!["AAAAA"]);
    }

    #[test]
    fn ingested_passages_survive_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.sqlite");

        let first = engine(5, 0);
        first.build_or_load(&path, "AAAAA").unwrap();
        first.ingest("BBBBB").unwrap();
        first.save(&path).unwrap();

        let second = engine(5, 0);
        let info = second.load_snapshot(&path).unwrap();
        assert_eq!(info.passages, 2);
        assert_eq!(second.query("BBBBB", 1).unwrap(), vec!["BBBBB"]);
    }

    #[test]
    fn ingest_many_keeps_source_order() {
        let engine = engine(3, 0);
        engine.build_from("zzz").unwrap();
        let added = engine
            .ingest_many(&["aaabbb".to_string(), "ccc".to_string()])
            .unwrap();
        assert_eq!(added, 3);

        let state = engine.read_state();
        let State::Ready(corpus) = &*state else {
            panic!("engine should be ready");
        };
        let texts: Vec<&str> = corpus.index.passages().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["zzz", "aaa", "bbb", "ccc"]);
    }

    #[test]
    fn concurrent_queries_see_whole_ingests() {
        let engine = Arc::new(engine(4, 0));
        engine.build_from("abcd").unwrap();

        let writer = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for _ in 0..20 {
                    engine.ingest("efghijkl").unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let hits = engine.query_scored("abcd", 1000).unwrap();
                        // Each ingest adds two passages on top of the initial one.
                        assert_eq!(hits.len() % 2, 1);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(engine.len(), 41);
        assert_aligned(&engine);
    }
}
